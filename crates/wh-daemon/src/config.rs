// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command-line configuration for the daemon binary.
//!
//! Every flag here corresponds to one of §6's "Configuration keys (all
//! optional, with defaults)"; no other configuration surface exists.

use clap::Parser;
use std::time::Duration;

/// CLI arguments for `wh-daemon`.
#[derive(Parser, Debug, Clone)]
#[command(name = "wh-daemon", version, about = "Webhook relay daemon")]
pub struct Args {
    /// Address the HTTP API binds to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Maximum number of retry-eligible failed attempts before a
    /// notification is marked FAILED.
    #[arg(long, default_value_t = 5)]
    pub max_retry_count: u32,

    /// Initial retry delay in milliseconds, before jitter.
    #[arg(long, default_value_t = 1_000)]
    pub initial_retry_delay_ms: u64,

    /// Upper bound on the (pre-jitter) retry delay, in milliseconds.
    #[arg(long, default_value_t = 3_600_000)]
    pub max_retry_delay_ms: u64,

    /// Outbound HTTP transport timeout (connect + read), in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub http_timeout_ms: u64,

    /// Sweeper scan interval, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    pub sweeper_interval_ms: u64,

    /// Number of parallel delivery-worker tasks.
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Directory used to snapshot notifications for crash-recovery warm
    /// start. Disabled when absent.
    #[arg(long)]
    pub snapshot_dir: Option<std::path::PathBuf>,

    /// Widen the tracing filter to `debug` for the `webhook_relay` target.
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// `initial_retry_delay_ms` as a [`Duration`].
    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    /// `max_retry_delay_ms` as a [`Duration`].
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// `http_timeout_ms` as a [`Duration`].
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// `sweeper_interval_ms` as a [`Duration`].
    pub fn sweeper_interval(&self) -> Duration {
        Duration::from_millis(self.sweeper_interval_ms)
    }
}
