//! CSI error types.
//!
//! Every RPC handler returns [`CsiError`]. The enum derives
//! [`thiserror::Error`] and is [`Serialize`]/[`Deserialize`] so the same
//! value can be sent back over the QUIC transport. [`CsiError::code`] maps a
//! variant onto the coarse [`StatusCode`] the orchestrator acts on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status categories surfaced to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusCode {
    /// The request itself is malformed.
    InvalidArgument,
    /// The object the request refers to does not exist.
    NotFound,
    /// Catch-all for metadata, subprocess, and filesystem failures.
    Internal,
    /// The plugin could not be reached.
    Unavailable,
}

/// Unified error type for CSI operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum CsiError {
    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced target or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A bind mount could not be established.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Target path of the attempted mount.
        path: String,
        /// Failure reason, including the helper's captured output.
        reason: String,
    },

    /// An unmount operation failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Target path of the attempted unmount.
        path: String,
        /// Failure reason, including the helper's captured output.
        reason: String,
    },

    /// A cluster metadata lookup failed (not found, transport, decode).
    #[error("metadata lookup failed: {0}")]
    Metadata(String),

    /// The claim backing a volume carries no host-path annotation.
    #[error("claim {namespace}/{name} has no `{key}` annotation")]
    HostPathUnset {
        /// Claim namespace.
        namespace: String,
        /// Claim name.
        name: String,
        /// Annotation key that was expected.
        key: String,
    },

    /// A QUIC / transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CsiError {
    /// Status category of this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::TransportError(_) => StatusCode::Unavailable,
            Self::MountFailed { .. }
            | Self::UnmountFailed { .. }
            | Self::Metadata(_)
            | Self::HostPathUnset { .. }
            | Self::Internal(_) => StatusCode::Internal,
        }
    }

    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CsiError::HostPathUnset {
            namespace: "default".into(),
            name: "data".into(),
            key: "csi-hostpath-path".into(),
        };
        assert_eq!(
            err.to_string(),
            "claim default/data has no `csi-hostpath-path` annotation"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            CsiError::InvalidArgument("x".into()).code(),
            StatusCode::InvalidArgument
        );
        assert_eq!(CsiError::NotFound("x".into()).code(), StatusCode::NotFound);
        assert_eq!(CsiError::Metadata("x".into()).code(), StatusCode::Internal);
        assert_eq!(
            CsiError::MountFailed {
                path: "/mnt".into(),
                reason: "busy".into()
            }
            .code(),
            StatusCode::Internal
        );
        assert_eq!(
            CsiError::transport("reset").code(),
            StatusCode::Unavailable
        );
    }

    #[test]
    fn error_serde_keeps_variant() {
        let err = CsiError::UnmountFailed {
            path: "/mnt/test".into(),
            reason: "target is busy".into(),
        };
        let json = serde_json::to_string(&err).expect("serialize");
        let de: CsiError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err.to_string(), de.to_string());
        assert_eq!(de.code(), StatusCode::Internal);
    }
}
