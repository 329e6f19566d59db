//! In-process metadata store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ClaimRef, ClusterMetadata, MetadataError, PersistentVolume, PersistentVolumeClaim};

/// [`ClusterMetadata`] backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryMetadata {
    volumes: DashMap<String, PersistentVolume>,
    /// Keyed by `(namespace, name)`.
    claims: DashMap<(String, String), PersistentVolumeClaim>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_volume(&self, volume: PersistentVolume) {
        self.volumes.insert(volume.name.clone(), volume);
    }

    pub fn insert_claim(&self, claim: PersistentVolumeClaim) {
        self.claims
            .insert((claim.namespace.clone(), claim.name.clone()), claim);
    }

    pub fn remove_volume(&self, name: &str) -> Option<PersistentVolume> {
        self.volumes.remove(name).map(|(_, v)| v)
    }

    /// Record a volume bound to `namespace/claim` whose claim carries
    /// `annotation_key = host_path`.
    pub fn bind(
        &self,
        volume: &str,
        namespace: &str,
        claim: &str,
        annotation_key: &str,
        host_path: &str,
    ) {
        self.insert_volume(PersistentVolume {
            name: volume.to_owned(),
            claim_ref: Some(ClaimRef {
                namespace: namespace.to_owned(),
                name: claim.to_owned(),
            }),
        });
        let mut pvc = PersistentVolumeClaim {
            namespace: namespace.to_owned(),
            name: claim.to_owned(),
            ..Default::default()
        };
        pvc.annotations
            .insert(annotation_key.to_owned(), host_path.to_owned());
        self.insert_claim(pvc);
    }
}

#[async_trait]
impl ClusterMetadata for MemoryMetadata {
    async fn get_persistent_volume(&self, name: &str) -> Result<PersistentVolume, MetadataError> {
        self.volumes
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| MetadataError::NotFound {
                kind: "persistentvolume",
                name: name.to_owned(),
            })
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, MetadataError> {
        self.claims
            .get(&(namespace.to_owned(), name.to_owned()))
            .map(|r| r.clone())
            .ok_or_else(|| MetadataError::NotFound {
                kind: "persistentvolumeclaim",
                name: format!("{namespace}/{name}"),
            })
    }
}
