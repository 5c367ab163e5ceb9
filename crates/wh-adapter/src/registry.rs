// SPDX-License-Identifier: MIT OR Apache-2.0
//! Name-to-adapter resolution, with generic fallback.

use crate::VendorAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// The name every registry falls back to when a notification names an
/// unregistered vendor.
pub const GENERIC_ADAPTER_NAME: &str = "generic";

/// Errors constructing an [`AdapterRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has at least one adapter but none named `"generic"`,
    /// which would leave unknown vendor names with nowhere to fall back to.
    #[error("adapter registry has entries but no \"generic\" fallback adapter")]
    MissingGenericFallback,
}

/// A name -> adapter map resolving unknown vendor names to `"generic"`.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn VendorAdapter>>,
}

/// Incrementally builds an [`AdapterRegistry`], enforcing the
/// generic-must-exist invariant at [`AdapterRegistryBuilder::build`].
#[derive(Default)]
pub struct AdapterRegistryBuilder {
    adapters: HashMap<String, Arc<dyn VendorAdapter>>,
}

impl AdapterRegistryBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under its own `vendor_name()`, replacing any
    /// previous entry with that name.
    pub fn register(mut self, adapter: Arc<dyn VendorAdapter>) -> Self {
        self.adapters
            .insert(adapter.vendor_name().to_string(), adapter);
        self
    }

    /// Finish building. Fails if the registry is non-empty and has no
    /// `"generic"` adapter registered.
    pub fn build(self) -> Result<AdapterRegistry, RegistryError> {
        if !self.adapters.is_empty() && !self.adapters.contains_key(GENERIC_ADAPTER_NAME) {
            return Err(RegistryError::MissingGenericFallback);
        }
        Ok(AdapterRegistry {
            adapters: self.adapters,
        })
    }
}

impl AdapterRegistry {
    /// Start building a registry.
    pub fn builder() -> AdapterRegistryBuilder {
        AdapterRegistryBuilder::new()
    }

    /// An empty registry (no adapters, no generic fallback required).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up an adapter by its exact registered name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn VendorAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Resolve a notification's `vendor_name` to an adapter, falling back
    /// to `"generic"` when the name is not registered.
    pub fn resolve(&self, vendor_name: &str) -> Option<Arc<dyn VendorAdapter>> {
        self.adapters
            .get(vendor_name)
            .or_else(|| self.adapters.get(GENERIC_ADAPTER_NAME))
            .cloned()
    }

    /// Sorted list of registered adapter names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}
