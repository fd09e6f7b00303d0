//! Link error classification

use crate::core::PERIPHERAL_NOT_FOUND_SIGNATURE;
use crate::hardware::LinkOp;
use thiserror::Error;

/// Whether the peripheral is still reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorKind {
    /// The stack no longer knows the peripheral; it must be rediscovered
    TargetUnreachable,
    /// Anything else; the same operation may be retried
    Transient,
}

/// A failed radio operation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{op} failed ({kind:?}): {reason}")]
pub struct LinkError {
    pub op: LinkOp,
    pub kind: LinkErrorKind,
    pub reason: String,
}

/// How the session recovers from a failed connect or subscribe
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryStrategy {
    /// Scan for the peripheral again before reconnecting
    Rescan,
    /// Retry the same operation after a backoff
    RetryWithBackoff,
}

impl LinkError {
    /// Classify a failure reason reported by the platform
    pub fn classify(op: LinkOp, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let kind = if reason.to_lowercase().contains(PERIPHERAL_NOT_FOUND_SIGNATURE) {
            LinkErrorKind::TargetUnreachable
        } else {
            LinkErrorKind::Transient
        };

        Self { op, kind, reason }
    }

    pub fn is_target_unreachable(&self) -> bool {
        self.kind == LinkErrorKind::TargetUnreachable
    }

    /// Get the recommended recovery strategy for this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self.op {
            LinkOp::Connect | LinkOp::Subscribe if self.is_target_unreachable() => RecoveryStrategy::Rescan,
            _ => RecoveryStrategy::RetryWithBackoff,
        }
    }
}
