// SPDX-License-Identifier: MIT OR Apache-2.0
//! Optional file-snapshot persistence, one JSON file per notification,
//! for crash-recovery warm start. Peripheral to the store proper — this is
//! not a second storage backend, just a way to repopulate an
//! [`crate::InMemoryNotificationStore`] after a restart.
//!
//! [`load_from`] is called by the daemon on startup. [`snapshot_to`] is a
//! library-only helper: nothing in this workspace calls it on the write
//! path today, so a running daemon never populates a snapshot directory on
//! its own. A caller wanting warm-start durability drives `snapshot_to`
//! itself, e.g. from an external sidecar watching the store, or a future
//! hook on [`crate::NotificationStore::save`]/`transition`.

use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;
use wh_core::Notification;

/// Errors snapshotting or reloading notifications to/from disk.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot directory could not be created or read.
    #[error("snapshot io error at {path}: {source}")]
    Io {
        /// The path the failing operation targeted.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A stored snapshot file was not valid JSON for a [`Notification`].
    #[error("snapshot decode error at {path}: {source}")]
    Decode {
        /// The path of the malformed file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

fn notification_path(root: &Path, id: Uuid) -> PathBuf {
    root.join(format!("{id}.json"))
}

/// Persist `notification` as `<root>/<id>.json`, creating `root` if needed.
///
/// Not called anywhere in this workspace's running daemon — exposed for a
/// caller that wants to drive its own snapshot cadence.
pub fn snapshot_to(root: &Path, notification: &Notification) -> Result<PathBuf, SnapshotError> {
    std::fs::create_dir_all(root).map_err(|source| SnapshotError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let path = notification_path(root, notification.id);
    let json = serde_json::to_string_pretty(notification).map_err(|source| SnapshotError::Decode {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(|source| SnapshotError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Load every notification snapshot under `root`. Missing directories yield
/// an empty list rather than an error, matching a fresh, never-persisted
/// daemon start.
pub fn load_from(root: &Path) -> Result<Vec<Notification>, SnapshotError> {
    let dir = match std::fs::read_dir(root) {
        Ok(dir) => dir,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(SnapshotError::Io {
                path: root.to_path_buf(),
                source,
            })
        }
    };

    let mut notifications = Vec::new();
    for entry in dir {
        let entry = entry.map_err(|source| SnapshotError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let json = std::fs::read_to_string(&path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        let notification: Notification =
            serde_json::from_str(&json).map_err(|source| SnapshotError::Decode { path, source })?;
        notifications.push(notification);
    }
    notifications.sort_by_key(|n| n.id);
    Ok(notifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wh_core::HttpMethod;

    fn sample() -> Notification {
        let mut n = Notification::new(
            "acme",
            "https://example.test/hook",
            HttpMethod::Post,
            BTreeMap::new(),
            None,
            None,
            chrono::Utc::now(),
        );
        n.id = Uuid::new_v4();
        n
    }

    #[test]
    fn round_trips_through_a_snapshot_directory() {
        let dir = tempfile::tempdir().unwrap();
        let notification = sample();
        snapshot_to(dir.path(), &notification).unwrap();

        let loaded = load_from(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, notification.id);
        assert_eq!(loaded[0].vendor_name, notification.vendor_name);
    }

    #[test]
    fn loading_a_missing_directory_yields_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(load_from(&missing).unwrap().is_empty());
    }

    #[test]
    fn non_json_files_in_the_directory_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "not a snapshot").unwrap();
        assert!(load_from(dir.path()).unwrap().is_empty());
    }
}
