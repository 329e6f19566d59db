//! Host-path storage backend for CSI.
//!
//! [`HostPathBackend`] implements [`CsiIdentity`], [`CsiController`], and
//! [`CsiNode`] for volumes that are plain directories on the node. The
//! directory is created and named out-of-band; a claim annotation records
//! it and [`HostPathResolver`] looks it up at publish time.
//!
//! # Publish / unpublish
//!
//! Mount state is never stored. Each call derives the [`TargetState`] of the
//! target path from the host mount table and acts on it:
//!
//! ```text
//!              publish                      unpublish
//! Absent    -> mkdir 0750, bind mount    -> NotFound
//! Unmounted -> bind mount                -> no-op
//! Mounted   -> no-op                     -> umount
//! ```
//!
//! The query and the action run under a per-target lock, so concurrent calls
//! on the same path observe each other's effects.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::config::DriverConfig;
use crate::controller::CsiController;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::lock::TargetLocks;
use crate::metadata::ClusterMetadata;
use crate::mount::{MountError, MountExecutor, NsenterExecutor, create_target_dir};
use crate::node::CsiNode;
use crate::resolver::HostPathResolver;
use crate::types::*;

/// Access modes host-path volumes can be published with.
const SUPPORTED_ACCESS_MODES: &[AccessMode] = &[AccessMode::MultiNodeMultiWriter];

/// RPCs the controller advertises.
const CONTROLLER_CAPABILITIES: &[ControllerCapability] = &[
    ControllerCapability::CreateDeleteVolume,
    ControllerCapability::PublishUnpublishVolume,
    ControllerCapability::GetVolume,
];

/// Mount state of a target path as seen in the host mount table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// The path does not exist.
    Absent,
    /// The path exists and nothing is mounted on it.
    Unmounted,
    /// The path is a mount point.
    Mounted,
}

/// Concrete CSI backend serving host directories.
///
/// # Thread safety
///
/// The only mutable state is the per-target lock table; metadata lookups and
/// helper invocations for different targets run concurrently.
pub struct HostPathBackend {
    config: DriverConfig,
    resolver: HostPathResolver,
    mounter: Arc<dyn MountExecutor>,
    locks: TargetLocks,
    controller_capabilities: Vec<ControllerCapability>,
}

impl HostPathBackend {
    /// Create a backend from explicit collaborators.
    pub fn new(
        config: DriverConfig,
        metadata: Arc<dyn ClusterMetadata>,
        mounter: Arc<dyn MountExecutor>,
    ) -> Self {
        let resolver = HostPathResolver::with_annotation_key(metadata, &config.annotation_key);
        Self {
            config,
            resolver,
            mounter,
            locks: TargetLocks::new(),
            controller_capabilities: CONTROLLER_CAPABILITIES.to_vec(),
        }
    }

    /// Create a backend that mounts through the configured nsenter helper.
    pub fn with_nsenter(config: DriverConfig, metadata: Arc<dyn ClusterMetadata>) -> Self {
        let mounter = Arc::new(NsenterExecutor::from_config(&config));
        Self::new(config, metadata, mounter)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Number of target paths with an operation in flight.
    pub fn targets_in_flight(&self) -> usize {
        self.locks.len()
    }

    /// Query the mount state of `target`.
    pub async fn target_state(&self, target: &Path) -> Result<TargetState, MountError> {
        match self.mounter.is_mounted(target).await {
            Ok(true) => Ok(TargetState::Mounted),
            Ok(false) => Ok(TargetState::Unmounted),
            Err(MountError::TargetMissing(_)) => Ok(TargetState::Absent),
            Err(e) => Err(e),
        }
    }

    fn validate_controller_request(&self, cap: ControllerCapability) -> Result<(), CsiError> {
        if self.controller_capabilities.contains(&cap) {
            return Ok(());
        }
        Err(CsiError::InvalidArgument(format!("unsupported capability: {cap:?}")))
    }

    fn topology(&self) -> Topology {
        Topology {
            segments: HashMap::from([(self.config.topology_key.clone(), self.config.node_id.clone())]),
        }
    }
}

// ---------------------------------------------------------------------------
// CsiIdentity
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiIdentity for HostPathBackend {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: self.config.driver_name.clone(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
        })
    }

    async fn probe(&self) -> Result<bool, CsiError> {
        Ok(true)
    }

    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        Ok(vec![
            PluginCapability::ControllerService,
            PluginCapability::VolumeAccessibilityConstraints,
        ])
    }
}

// ---------------------------------------------------------------------------
// CsiController
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiController for HostPathBackend {
    #[instrument(skip(self, req), fields(name = %req.name))]
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError> {
        self.validate_controller_request(ControllerCapability::CreateDeleteVolume)?;
        if req.name.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volume name cannot be empty".into(),
            ));
        }
        if req.volume_capabilities.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volume capabilities cannot be empty".into(),
            ));
        }

        let capacity_bytes = req.capacity_range.map(|r| r.required_bytes).unwrap_or(0);
        let volume = Volume {
            volume_id: VolumeId(req.name),
            capacity_bytes,
            volume_context: req.parameters.clone(),
            parameters: req.parameters,
            accessible_topology: Vec::new(),
        };

        info!(volume_id = %volume.volume_id, capacity_bytes, "volume created");
        Ok(volume)
    }

    #[instrument(skip(self))]
    async fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), CsiError> {
        // Nothing is recorded per volume, so there is nothing to check or
        // release here.
        info!("volume deleted");
        Ok(())
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id))]
    async fn expand_volume(
        &self,
        req: ControllerExpandVolumeRequest,
    ) -> Result<ExpandVolumeResponse, CsiError> {
        let capacity_bytes = req.capacity_range.map(|r| r.required_bytes).unwrap_or(0);
        info!(capacity_bytes, "volume expansion accepted");
        Ok(ExpandVolumeResponse {
            capacity_bytes,
            node_expansion_required: true,
        })
    }

    #[instrument(skip(self))]
    async fn get_volume(&self, volume_id: &VolumeId) -> Result<VolumeDescriptor, CsiError> {
        debug!("no volume records kept, returning empty descriptor");
        Ok(VolumeDescriptor::default())
    }

    async fn validate_volume_capabilities(
        &self,
        volume_id: &VolumeId,
        capabilities: &[VolumeCapability],
    ) -> Result<bool, CsiError> {
        if volume_id.as_str().is_empty() {
            return Err(CsiError::InvalidArgument("volume id cannot be empty".into()));
        }
        if capabilities.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volume capabilities cannot be empty".into(),
            ));
        }
        Ok(capabilities
            .iter()
            .all(|c| SUPPORTED_ACCESS_MODES.contains(&c.access_mode)))
    }

    async fn get_controller_capabilities(&self) -> Result<Vec<ControllerCapability>, CsiError> {
        Ok(self.controller_capabilities.clone())
    }
}

// ---------------------------------------------------------------------------
// CsiNode
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiNode for HostPathBackend {
    #[instrument(skip(self, req), fields(volume_id = %req.volume_id))]
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError> {
        // Host-path volumes need no staging area; all work happens at publish.
        debug!(staging_target_path = %req.staging_target_path, "stage is a no-op");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError> {
        debug!("unstage is a no-op");
        Ok(())
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id, target_path = %req.target_path))]
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        if req.target_path.is_empty() {
            return Err(CsiError::Internal("target path is empty".into()));
        }
        let target = Path::new(&req.target_path);
        let _guard = self.locks.lock(&req.target_path).await;

        let state = match self.target_state(target).await.map_err(CsiError::internal)? {
            TargetState::Absent => {
                // First publish for this target: create it and mount below.
                create_target_dir(target).await.map_err(CsiError::internal)?;
                TargetState::Unmounted
            }
            state => state,
        };

        let host_path = self.resolver.resolve(&req.volume_id).await?;

        if state == TargetState::Mounted {
            debug!(host_path = %host_path.display(), "target already mounted, assuming idempotent retry");
            return Ok(());
        }

        self.mounter
            .bind_mount(&host_path, target)
            .await
            .map_err(|e| CsiError::MountFailed {
                path: req.target_path.clone(),
                reason: e.to_string(),
            })?;

        info!(
            host_path = %host_path.display(),
            read_only = req.read_only,
            "volume published (bind-mount)",
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError> {
        if target_path.is_empty() {
            return Err(CsiError::InvalidArgument("target path is empty".into()));
        }
        let target = Path::new(target_path);
        let _guard = self.locks.lock(target_path).await;

        match self.target_state(target).await.map_err(CsiError::internal)? {
            TargetState::Absent => {
                Err(CsiError::NotFound(format!("target path {target_path} not found")))
            }
            TargetState::Unmounted => {
                debug!("target not mounted, nothing to unpublish");
                Ok(())
            }
            TargetState::Mounted => {
                self.mounter
                    .unmount(target)
                    .await
                    .map_err(|e| CsiError::UnmountFailed {
                        path: target_path.to_owned(),
                        reason: e.to_string(),
                    })?;
                info!("volume unpublished");
                Ok(())
            }
        }
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id))]
    async fn node_expand_volume(&self, req: NodeExpandVolumeRequest) -> Result<(), CsiError> {
        debug!(volume_path = %req.volume_path, "node expansion is a no-op");
        Ok(())
    }

    async fn get_node_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError> {
        // Advertised for compatibility with existing deployments even though
        // stage and unstage do nothing.
        Ok(vec![NodeCapability::StageUnstageVolume])
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.config.node_id.clone(),
            max_volumes: 0,
            accessible_topology: Some(self.topology()),
        })
    }
}
