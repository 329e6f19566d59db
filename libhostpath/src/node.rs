//! CSI Node service trait.
//!
//! The Node service runs on every worker and makes a volume visible to a
//! workload:
//!
//! 1. **Publish**: resolve the volume's host directory and bind-mount it at
//!    the target path.
//! 2. **Unpublish**: remove the bind mount.
//!
//! Stage, unstage and expand are part of the protocol but carry no work for
//! host-path volumes.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    NodeCapability, NodeExpandVolumeRequest, NodeInfo, NodePublishVolumeRequest,
    NodeStageVolumeRequest, VolumeId,
};

/// Node service: local mount / unmount operations.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Stage a volume at a global path.
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError>;

    /// Undo [`CsiNode::stage_volume`].
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError>;

    /// Bind-mount the volume's host directory at `req.target_path`.
    ///
    /// Idempotent: publishing an already-mounted target succeeds without
    /// mounting again.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Remove the bind mount at `target_path`.
    ///
    /// Idempotent for an existing but unmounted target. A target that does
    /// not exist at all is reported as [`CsiError::NotFound`].
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError>;

    /// Grow a volume on the node.
    async fn node_expand_volume(&self, req: NodeExpandVolumeRequest) -> Result<(), CsiError>;

    /// RPCs this node service advertises.
    async fn get_node_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;
}
