//! Cluster metadata records consulted to find a volume's host directory.
//!
//! Two record kinds matter: the PersistentVolume named after the volume id,
//! whose claim reference points at a PersistentVolumeClaim, and that claim,
//! whose annotations carry the host path. [`ClusterMetadata`] is the lookup
//! seam; implementations are passed to the node backend rather than held in
//! a global.
//!
//! | Implementation | Backing |
//! |---|---|
//! | [`KubeApiMetadata`] | Kubernetes API server over HTTPS (`reqwest`). |
//! | [`MemoryMetadata`] | In-process maps, for tests and static setups. |

pub mod kube;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use kube::{KubeApiConfig, KubeApiMetadata};
pub use memory::MemoryMetadata;

/// Namespace + name reference from a volume to its claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimRef {
    pub namespace: String,
    pub name: String,
}

/// The claim-binding record of a volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistentVolume {
    pub name: String,
    /// `None` while the volume is not bound to any claim.
    #[serde(default)]
    pub claim_ref: Option<ClaimRef>,
}

/// The claim record carrying the host-path annotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistentVolumeClaim {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// Failure of a metadata lookup.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The record does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// The request could not be completed (connection, TLS, auth).
    #[error("request for {kind} {name} failed: {reason}")]
    Request {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("{kind} {name}: server returned {status}: {body}")]
    Status {
        kind: &'static str,
        name: String,
        status: u16,
        body: String,
    },

    /// The response body was not a valid record.
    #[error("decoding {kind} {name}: {reason}")]
    Decode {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// The client could not be configured.
    #[error("metadata client configuration: {0}")]
    Config(String),
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Read-only access to the cluster metadata store.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait ClusterMetadata: Send + Sync {
    /// Fetch the PersistentVolume called `name`.
    async fn get_persistent_volume(&self, name: &str) -> Result<PersistentVolume, MetadataError>;

    /// Fetch the PersistentVolumeClaim `namespace/name`.
    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, MetadataError>;
}
