//! Core CSI types: volumes, capabilities, requests, and topology.
//!
//! These types are shared by the service traits, the transport envelope, and
//! the host-path backend. All of them are [`Serialize`]/[`Deserialize`] so
//! they can travel over QUIC as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Caller-chosen, immutable identifier for a volume.
///
/// For this plugin the id is also the name of the PersistentVolume record
/// that binds the volume to its claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeId(pub String);

impl VolumeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Access mode & capabilities
// ---------------------------------------------------------------------------

/// Describes how a volume may be accessed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessMode {
    /// Single-node read-write.
    ReadWriteOnce,
    /// Multi-node read-only.
    ReadOnlyMany,
    /// Multi-node read-write.
    ReadWriteMany,
    /// Multi-node, multiple concurrent writers.
    MultiNodeMultiWriter,
}

/// Describes the capabilities required from a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeCapability {
    /// Requested access mode.
    pub access_mode: AccessMode,
    /// Additional mount flags (e.g. `"noatime"`).
    #[serde(default)]
    pub mount_flags: Vec<String>,
    /// Filesystem type. Host-path volumes are plain directories, so this is
    /// informational only.
    #[serde(default)]
    pub fs_type: String,
}

impl Default for VolumeCapability {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::MultiNodeMultiWriter,
            mount_flags: Vec::new(),
            fs_type: String::new(),
        }
    }
}

/// Requested capacity bounds in bytes. Advisory only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacityRange {
    /// Minimum size the volume must have.
    #[serde(default)]
    pub required_bytes: u64,
    /// Maximum size; `0` means unbounded.
    #[serde(default)]
    pub limit_bytes: u64,
}

// ---------------------------------------------------------------------------
// Volume metadata
// ---------------------------------------------------------------------------

/// Volume descriptor returned by `CreateVolume`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    /// Volume identifier; equal to the requested name.
    pub volume_id: VolumeId,
    /// Requested capacity in bytes. Not enforced.
    pub capacity_bytes: u64,
    /// User-supplied parameters from the storage class / request.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Opaque context passed from Controller to Node operations.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
    /// Topology constraints (e.g. node affinity).
    #[serde(default)]
    pub accessible_topology: Vec<Topology>,
}

/// Topology constraint expressed as key-value segments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topology {
    /// Topology segments, e.g. `{"topology.hostpath.csi/hostname": "node-01"}`.
    #[serde(default)]
    pub segments: HashMap<String, String>,
}

/// Response payload of `ControllerGetVolume`.
///
/// The controller keeps no volume records, so the descriptor is always empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeDescriptor {
    #[serde(default)]
    pub volume: Option<Volume>,
}

/// Response payload of `ControllerExpandVolume`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpandVolumeResponse {
    /// Capacity reported as granted.
    pub capacity_bytes: u64,
    /// Whether a follow-up `NodeExpandVolume` is needed.
    pub node_expansion_required: bool,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to create a new volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    /// Volume name; becomes the volume id.
    pub name: String,
    /// Desired capacity.
    #[serde(default)]
    pub capacity_range: Option<CapacityRange>,
    /// Required capabilities. Must not be empty.
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
    /// Arbitrary parameters, echoed back verbatim.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Request to grow a volume (controller side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerExpandVolumeRequest {
    pub volume_id: VolumeId,
    #[serde(default)]
    pub capacity_range: Option<CapacityRange>,
}

/// Request to stage a volume on a node. Accepted but not acted upon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStageVolumeRequest {
    /// Volume to stage.
    pub volume_id: VolumeId,
    /// Global staging mount point.
    pub staging_target_path: String,
    /// Requested capability.
    #[serde(default)]
    pub volume_capability: VolumeCapability,
    /// Opaque context carried from `CreateVolume`.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
}

/// Request to bind-mount a volume's host directory at `target_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePublishVolumeRequest {
    /// Volume to publish.
    pub volume_id: VolumeId,
    /// Target path inside the workload's view, e.g.
    /// `/var/lib/kubelet/pods/<pod-uid>/volumes/<vol-name>/mount`.
    pub target_path: String,
    /// Requested capability.
    #[serde(default)]
    pub volume_capability: VolumeCapability,
    /// Whether the caller asked for a read-only mount. Recorded in logs only;
    /// host-path volumes are always published read-write.
    #[serde(default)]
    pub read_only: bool,
    /// Opaque context carried from `CreateVolume`.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
}

/// Request to grow a volume on the node. Accepted but not acted upon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExpandVolumeRequest {
    pub volume_id: VolumeId,
    #[serde(default)]
    pub volume_path: String,
    #[serde(default)]
    pub capacity_range: Option<CapacityRange>,
}

// ---------------------------------------------------------------------------
// Plugin & node info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginInfo {
    /// Plugin name, e.g. `"hostpath.csi.kubernetes.io"`.
    pub name: String,
    /// Vendor-provided version string.
    pub vendor_version: String,
}

/// Capabilities advertised by the Identity service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PluginCapability {
    /// Plugin provides a Controller service.
    ControllerService,
    /// Plugin supports volume topology constraints.
    VolumeAccessibilityConstraints,
}

/// RPCs the Controller service claims to support.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControllerCapability {
    CreateDeleteVolume,
    PublishUnpublishVolume,
    ExpandVolume,
    GetVolume,
}

/// RPCs the Node service claims to support.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeCapability {
    StageUnstageVolume,
    ExpandVolume,
}

/// Information about the node on which the CSI Node service runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    /// Unique node identifier.
    pub node_id: String,
    /// Maximum number of volumes the node can host; `0` means no limit.
    pub max_volumes: u64,
    /// Topology of this node.
    #[serde(default)]
    pub accessible_topology: Option<Topology>,
}
