//! CSI Controller service trait.
//!
//! For host-path volumes the controller is bookkeeping only: it validates
//! requests and echoes descriptors back. No space is reserved and nothing is
//! persisted; the binding between a volume and its host directory lives in
//! cluster metadata and is resolved by the node at publish time.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    ControllerCapability, ControllerExpandVolumeRequest, CreateVolumeRequest,
    ExpandVolumeResponse, Volume, VolumeCapability, VolumeDescriptor, VolumeId,
};

/// Controller service: logical volume lifecycle.
#[async_trait]
pub trait CsiController: Send + Sync {
    /// Validate the request and return a [`Volume`] whose id is the
    /// requested name.
    ///
    /// Repeated calls with the same name yield the same id.
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError>;

    /// Acknowledge deletion of a volume. There is no record to check, so
    /// this never fails for an unknown id.
    async fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), CsiError>;

    /// Report the requested size as granted and ask for a node-side step.
    async fn expand_volume(
        &self,
        req: ControllerExpandVolumeRequest,
    ) -> Result<ExpandVolumeResponse, CsiError>;

    /// Describe a volume.
    async fn get_volume(&self, volume_id: &VolumeId) -> Result<VolumeDescriptor, CsiError>;

    /// Check whether the given capabilities are compatible with the volume.
    async fn validate_volume_capabilities(
        &self,
        volume_id: &VolumeId,
        capabilities: &[VolumeCapability],
    ) -> Result<bool, CsiError>;

    /// RPCs this controller advertises.
    async fn get_controller_capabilities(&self) -> Result<Vec<ControllerCapability>, CsiError>;
}
