//! Volume id → host directory resolution.
//!
//! The host path of a volume is never stored by the plugin. It is found by
//! following the volume's PersistentVolume to its bound claim and reading a
//! well-known annotation from that claim. Every call goes to the metadata
//! store; nothing is cached.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::HOST_PATH_ANNOTATION;
use crate::error::CsiError;
use crate::metadata::ClusterMetadata;
use crate::types::VolumeId;

/// Resolves the host directory backing a volume.
#[derive(Clone)]
pub struct HostPathResolver {
    metadata: Arc<dyn ClusterMetadata>,
    annotation_key: String,
}

impl HostPathResolver {
    pub fn new(metadata: Arc<dyn ClusterMetadata>) -> Self {
        Self::with_annotation_key(metadata, HOST_PATH_ANNOTATION)
    }

    pub fn with_annotation_key(
        metadata: Arc<dyn ClusterMetadata>,
        annotation_key: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            annotation_key: annotation_key.into(),
        }
    }

    pub fn annotation_key(&self) -> &str {
        &self.annotation_key
    }

    /// Return the literal host path recorded for `volume_id`.
    ///
    /// Every failure maps to a status of `Internal`: lookup errors become
    /// [`CsiError::Metadata`], an unbound volume or a claim without the
    /// annotation become [`CsiError::Metadata`] / [`CsiError::HostPathUnset`].
    #[instrument(skip(self), fields(%volume_id))]
    pub async fn resolve(&self, volume_id: &VolumeId) -> Result<PathBuf, CsiError> {
        let pv = self
            .metadata
            .get_persistent_volume(volume_id.as_str())
            .await
            .map_err(|e| {
                warn!(error = %e, "persistent volume lookup failed");
                CsiError::Metadata(e.to_string())
            })?;

        let claim_ref = pv.claim_ref.ok_or_else(|| {
            CsiError::Metadata(format!(
                "persistentvolume {volume_id} is not bound to a claim"
            ))
        })?;

        let pvc = self
            .metadata
            .get_persistent_volume_claim(&claim_ref.namespace, &claim_ref.name)
            .await
            .map_err(|e| {
                warn!(
                    namespace = %claim_ref.namespace,
                    claim = %claim_ref.name,
                    error = %e,
                    "persistent volume claim lookup failed",
                );
                CsiError::Metadata(e.to_string())
            })?;

        match pvc.annotations.get(&self.annotation_key) {
            Some(path) if !path.is_empty() => {
                debug!(host_path = %path, "host path resolved");
                Ok(PathBuf::from(path))
            }
            _ => Err(CsiError::HostPathUnset {
                namespace: pvc.namespace,
                name: pvc.name,
                key: self.annotation_key.clone(),
            }),
        }
    }
}
