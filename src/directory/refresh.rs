//! Periodic anchor directory refresh
//!
//! One fetch is in flight at a time. The next fetch is scheduled only after
//! the previous one has completed or timed out.

use crate::directory::{AnchorDirectory, DirectoryHandle};
use crate::utils::config::RefreshConfig;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::time;

/// Errors reported by a directory source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("directory source unavailable: {0}")]
    Unavailable(String),
    #[error("directory source returned malformed data: {0}")]
    Malformed(String),
}

/// Where directory documents come from (HTTP endpoint, file, test fixture).
///
/// `Ok(None)` means the source had nothing to offer; the current snapshot is
/// kept.
#[async_trait]
pub trait DirectorySource: Send {
    async fn fetch(&mut self) -> Result<Option<Value>, FetchError>;
}

/// Reads the directory document from a JSON file on every fetch
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DirectorySource for FileSource {
    async fn fetch(&mut self) -> Result<Option<Value>, FetchError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FetchError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        let value = serde_json::from_str(&text).map_err(|e| FetchError::Malformed(e.to_string()))?;
        Ok(Some(value))
    }
}

/// What a single refresh attempt did
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Updated { anchors: usize, rejected: usize },
    Unchanged,
    Failed(String),
    TimedOut,
}

/// Drives periodic refreshes of a [`DirectoryHandle`]
pub struct DirectoryRefresher<S: DirectorySource> {
    source: S,
    handle: DirectoryHandle,
    initial_delay: Duration,
    interval: Duration,
    fetch_timeout: Duration,
}

impl<S: DirectorySource> DirectoryRefresher<S> {
    pub fn new(source: S, handle: DirectoryHandle, config: &RefreshConfig) -> Self {
        Self {
            source,
            handle,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            interval: Duration::from_millis(config.interval_ms),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
        }
    }

    /// Fetch once and swap in the result if it is usable
    pub async fn refresh_once(&mut self) -> RefreshOutcome {
        let fetched = match time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Err(_) => {
                warn!("Anchor directory fetch timed out after {:?}", self.fetch_timeout);
                return RefreshOutcome::TimedOut;
            }
            Ok(Err(e)) => {
                warn!("Anchor directory fetch failed: {}", e);
                return RefreshOutcome::Failed(e.to_string());
            }
            Ok(Ok(fetched)) => fetched,
        };

        let Some(value) = fetched else {
            debug!("Anchor directory source returned nothing; keeping current snapshot");
            return RefreshOutcome::Unchanged;
        };

        match AnchorDirectory::from_json_value(&value) {
            Ok(Some(ingested)) if ingested.directory.is_empty() => {
                warn!(
                    "Anchor directory has no usable entries ({} rejected); keeping current snapshot",
                    ingested.rejected.len()
                );
                RefreshOutcome::Failed(format!("no usable anchors, {} rejected", ingested.rejected.len()))
            }
            Ok(Some(ingested)) => {
                let anchors = ingested.directory.len();
                let rejected = ingested.rejected.len();
                self.handle.replace(ingested.directory);
                info!("Anchor directory updated: {} anchors, {} rejected", anchors, rejected);
                RefreshOutcome::Updated { anchors, rejected }
            }
            Ok(None) => {
                debug!("Anchor directory document was null; keeping current snapshot");
                RefreshOutcome::Unchanged
            }
            Err(e) => {
                warn!("Anchor directory rejected: {}", e);
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }

    /// Refresh forever: wait the initial delay, then fetch, wait, repeat
    pub async fn run(mut self) {
        time::sleep(self.initial_delay).await;
        loop {
            self.refresh_once().await;
            time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AnchorId;
    use serde_json::json;
    use std::collections::VecDeque;

    struct ScriptedSource {
        responses: VecDeque<Result<Option<Value>, FetchError>>,
        hang: bool,
    }

    #[async_trait]
    impl DirectorySource for ScriptedSource {
        async fn fetch(&mut self) -> Result<Option<Value>, FetchError> {
            if self.hang {
                time::sleep(Duration::from_secs(3600)).await;
            }
            self.responses.pop_front().unwrap_or(Ok(None))
        }
    }

    fn config() -> RefreshConfig {
        RefreshConfig {
            enabled: true,
            initial_delay_ms: 0,
            interval_ms: 15_000,
            fetch_timeout_ms: 50,
        }
    }

    #[tokio::test]
    async fn test_refresh_updates_then_keeps_snapshot_on_null() {
        let handle = DirectoryHandle::new();
        let source = ScriptedSource {
            responses: VecDeque::from(vec![
                Ok(Some(json!({ "00:00:00:00:00:00:00:01": [1.0, 2.0, 3.0] }))),
                Ok(Some(Value::Null)),
                Ok(None),
            ]),
            hang: false,
        };
        let mut refresher = DirectoryRefresher::new(source, handle.clone(), &config());

        assert_eq!(
            refresher.refresh_once().await,
            RefreshOutcome::Updated { anchors: 1, rejected: 0 }
        );
        assert_eq!(refresher.refresh_once().await, RefreshOutcome::Unchanged);
        assert_eq!(refresher.refresh_once().await, RefreshOutcome::Unchanged);

        let id: AnchorId = "00:00:00:00:00:00:00:01".parse().unwrap();
        assert!(handle.snapshot().unwrap().contains(&id));
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_unset_directory_unset() {
        let handle = DirectoryHandle::new();
        let source = ScriptedSource {
            responses: VecDeque::from(vec![
                Err(FetchError::Unavailable("offline".to_string())),
                Ok(Some(json!("not a map"))),
            ]),
            hang: false,
        };
        let mut refresher = DirectoryRefresher::new(source, handle.clone(), &config());

        assert!(matches!(refresher.refresh_once().await, RefreshOutcome::Failed(_)));
        assert!(matches!(refresher.refresh_once().await, RefreshOutcome::Failed(_)));
        assert!(handle.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_all_rejected_document_keeps_snapshot() {
        let id: AnchorId = "00:00:00:00:00:00:00:01".parse().unwrap();
        let handle = DirectoryHandle::with_directory(AnchorDirectory::from_anchors(vec![(
            id,
            crate::core::Coordinate3D::new(1.0, 2.0, 3.0),
        )]));
        let source = ScriptedSource {
            responses: VecDeque::from(vec![Ok(Some(json!({ "bad": [1, 2] }))), Ok(Some(json!({})))]),
            hang: false,
        };
        let mut refresher = DirectoryRefresher::new(source, handle.clone(), &config());

        assert_eq!(
            refresher.refresh_once().await,
            RefreshOutcome::Failed("no usable anchors, 1 rejected".to_string())
        );
        assert!(matches!(refresher.refresh_once().await, RefreshOutcome::Failed(_)));

        let snapshot = handle.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&id));
    }

    #[tokio::test]
    async fn test_hung_fetch_times_out() {
        let handle = DirectoryHandle::new();
        let source = ScriptedSource {
            responses: VecDeque::new(),
            hang: true,
        };
        let mut refresher = DirectoryRefresher::new(source, handle.clone(), &config());

        assert_eq!(refresher.refresh_once().await, RefreshOutcome::TimedOut);
        assert!(!handle.is_set());
    }
}
