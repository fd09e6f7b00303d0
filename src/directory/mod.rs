//! Anchor directory: the known coordinate of every fixed anchor
//!
//! The directory is an immutable snapshot. Refreshes build a new snapshot and
//! swap it in whole through [`DirectoryHandle`], so readers never observe a
//! partially updated table.

pub mod refresh;

pub use refresh::{DirectoryRefresher, DirectorySource, FileSource, FetchError, RefreshOutcome};

use crate::core::{AnchorId, Coordinate3D};
use log::warn;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that reject a whole directory document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("anchor directory must be a JSON object, got {found}")]
    NotAnObject { found: String },
    #[error("anchor directory is not valid JSON: {message}")]
    Malformed { message: String },
}

/// A single entry dropped during ingest
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEntry {
    pub key: String,
    pub reason: String,
}

/// Result of ingesting a directory document
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub directory: AnchorDirectory,
    pub rejected: Vec<RejectedEntry>,
}

/// Mapping from anchor identifier to coordinate in meters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorDirectory {
    anchors: HashMap<AnchorId, Coordinate3D>,
}

impl AnchorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_anchors(anchors: impl IntoIterator<Item = (AnchorId, Coordinate3D)>) -> Self {
        Self {
            anchors: anchors.into_iter().collect(),
        }
    }

    pub fn get(&self, id: &AnchorId) -> Option<&Coordinate3D> {
        self.anchors.get(id)
    }

    pub fn contains(&self, id: &AnchorId) -> bool {
        self.anchors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnchorId, &Coordinate3D)> {
        self.anchors.iter()
    }

    /// Parse a directory document from JSON text.
    ///
    /// Returns `Ok(None)` for a JSON `null`, meaning "no update".
    pub fn from_json_str(text: &str) -> Result<Option<Ingested>, DirectoryError> {
        let value: Value = serde_json::from_str(text).map_err(|e| DirectoryError::Malformed {
            message: e.to_string(),
        })?;
        Self::from_json_value(&value)
    }

    /// Validate a `{ "<anchor id>": [x, y, z] }` document.
    ///
    /// Entries with a malformed key or a coordinate that is not exactly three
    /// finite numbers are dropped and reported; the rest form the snapshot.
    pub fn from_json_value(value: &Value) -> Result<Option<Ingested>, DirectoryError> {
        let object = match value {
            Value::Null => return Ok(None),
            Value::Object(object) => object,
            other => {
                return Err(DirectoryError::NotAnObject {
                    found: json_kind(other).to_string(),
                })
            }
        };

        let mut anchors = HashMap::with_capacity(object.len());
        let mut rejected = Vec::new();

        for (key, coordinate) in object {
            let parsed = key
                .parse::<AnchorId>()
                .map_err(|e| e.to_string())
                .and_then(|id| parse_coordinate(coordinate).map(|c| (id, c)));

            match parsed {
                Ok((id, c)) => {
                    if anchors.insert(id, c).is_some() {
                        warn!("Anchor {} listed twice; keeping the later entry", id);
                    }
                }
                Err(reason) => {
                    warn!("Rejected anchor entry {:?}: {}", key, reason);
                    rejected.push(RejectedEntry {
                        key: key.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(Some(Ingested {
            directory: AnchorDirectory { anchors },
            rejected,
        }))
    }
}

fn parse_coordinate(value: &Value) -> Result<Coordinate3D, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected [x, y, z], got {}", json_kind(value)))?;

    if items.len() != 3 {
        return Err(format!("expected 3 coordinates, got {}", items.len()));
    }

    let mut xyz = [0.0f64; 3];
    for (slot, item) in xyz.iter_mut().zip(items) {
        *slot = item
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("coordinate {} is not a finite number", item))?;
    }

    Ok(Coordinate3D::new(xyz[0], xyz[1], xyz[2]))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shared, atomically replaceable directory snapshot.
///
/// Starts unset; positions are not computed until the first snapshot lands.
#[derive(Debug, Clone, Default)]
pub struct DirectoryHandle {
    current: Arc<RwLock<Option<Arc<AnchorDirectory>>>>,
}

impl DirectoryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(directory: AnchorDirectory) -> Self {
        let handle = Self::new();
        handle.replace(directory);
        handle
    }

    /// Current snapshot, if any has been loaded
    pub fn snapshot(&self) -> Option<Arc<AnchorDirectory>> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    /// Swap in a new snapshot
    pub fn replace(&self, directory: AnchorDirectory) {
        let next = Arc::new(directory);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(next);
    }

    pub fn is_set(&self) -> bool {
        self.snapshot().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ingest_valid_document() {
        let text = r#"{
            "c0:98:e5:50:50:44:50:1d": [0, 2.752, 2.874],
            "c0:98:e5:50:50:44:50:0f": [0.952, 0, 2.621]
        }"#;

        let ingested = AnchorDirectory::from_json_str(text).unwrap().unwrap();
        assert!(ingested.rejected.is_empty());
        assert_eq!(ingested.directory.len(), 2);

        let id: AnchorId = "c0:98:e5:50:50:44:50:0f".parse().unwrap();
        assert_eq!(
            ingested.directory.get(&id),
            Some(&Coordinate3D::new(0.952, 0.0, 2.621))
        );
    }

    #[test]
    fn test_ingest_rejects_bad_entries() {
        let value = json!({
            "c0:98:e5:50:50:44:50:1d": [1.0, 2.0, 3.0],
            "c0:98:e5:50:50:44:50:0f": [1.0, 2.0],
            "c0:98:e5:50:50:44:50:19": [1.0, "2", 3.0],
            "c0:98:e5:50:50:44:50:18": {"x": 1},
            "not-an-anchor": [1.0, 2.0, 3.0],
            "c0:98:e5:50:50:44:50:0a": [1.0, 2.0, 3.0, 4.0]
        });

        let ingested = AnchorDirectory::from_json_value(&value).unwrap().unwrap();
        assert_eq!(ingested.directory.len(), 1);
        assert_eq!(ingested.rejected.len(), 5);
        assert!(ingested
            .rejected
            .iter()
            .any(|entry| entry.key == "not-an-anchor"));
    }

    #[test]
    fn test_null_document_means_no_update() {
        assert_eq!(AnchorDirectory::from_json_str("null").unwrap(), None);
    }

    #[test]
    fn test_non_object_document_is_an_error() {
        assert!(matches!(
            AnchorDirectory::from_json_value(&json!([1, 2, 3])),
            Err(DirectoryError::NotAnObject { .. })
        ));
        assert!(matches!(
            AnchorDirectory::from_json_str("{not json"),
            Err(DirectoryError::Malformed { .. })
        ));
    }

    #[test]
    fn test_handle_replaces_whole_snapshot() {
        let handle = DirectoryHandle::new();
        assert!(handle.snapshot().is_none());

        let a: AnchorId = "00:00:00:00:00:00:00:01".parse().unwrap();
        let b: AnchorId = "00:00:00:00:00:00:00:02".parse().unwrap();

        handle.replace(AnchorDirectory::from_anchors([(a, Coordinate3D::zeros())]));
        let first = handle.snapshot().unwrap();

        handle.replace(AnchorDirectory::from_anchors([(b, Coordinate3D::x())]));
        let second = handle.snapshot().unwrap();

        // Readers holding the old snapshot keep a complete, unchanged table
        assert!(first.contains(&a));
        assert!(!first.contains(&b));
        assert!(second.contains(&b));
        assert!(!second.contains(&a));
    }
}
