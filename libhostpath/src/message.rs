//! CSI protocol messages transmitted over QUIC.
//!
//! [`CsiMessage`] is the envelope for every request and response exchanged
//! between the orchestrator side ([`CsiClient`](crate::transport::client::CsiClient))
//! and the plugin ([`CsiServer`](crate::transport::server::CsiServer)).

use serde::{Deserialize, Serialize};

use crate::error::CsiError;
use crate::types::*;

/// Top-level message envelope for CSI over QUIC.
///
/// Each QUIC bi-stream carries exactly one request followed by one response.
/// The client sends a *request* variant and the server replies with the
/// corresponding *response* variant (or [`CsiMessage::Error`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CsiMessage {
    // ----- Identity requests ----------------------------------------------
    GetPluginInfo,
    Probe,
    GetPluginCapabilities,

    // ----- Controller requests --------------------------------------------
    CreateVolume(CreateVolumeRequest),
    DeleteVolume(VolumeId),
    ControllerExpandVolume(ControllerExpandVolumeRequest),
    ControllerGetVolume(VolumeId),
    ControllerGetCapabilities,
    ValidateVolumeCapabilities {
        volume_id: VolumeId,
        capabilities: Vec<VolumeCapability>,
    },

    // ----- Node requests --------------------------------------------------
    NodeStageVolume(NodeStageVolumeRequest),
    NodeUnstageVolume {
        volume_id: VolumeId,
        staging_target_path: String,
    },
    NodePublishVolume(NodePublishVolumeRequest),
    NodeUnpublishVolume {
        volume_id: VolumeId,
        target_path: String,
    },
    NodeExpandVolume(NodeExpandVolumeRequest),
    NodeGetCapabilities,
    NodeGetInfo,

    // ----- Responses ------------------------------------------------------
    PluginInfoResponse(PluginInfo),
    ProbeResult(bool),
    PluginCapabilitiesResponse(Vec<PluginCapability>),
    VolumeCreated(Volume),
    VolumeExpanded(ExpandVolumeResponse),
    VolumeDescribed(VolumeDescriptor),
    ControllerCapabilitiesResponse(Vec<ControllerCapability>),
    CapabilitiesValid(bool),
    NodeCapabilitiesResponse(Vec<NodeCapability>),
    NodeInfoResponse(NodeInfo),

    /// Generic success acknowledgement (no payload).
    Ok,
    /// An error occurred.
    Error(CsiError),
}

impl CsiMessage {
    /// Whether this variant is something a client may send.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::GetPluginInfo
                | Self::Probe
                | Self::GetPluginCapabilities
                | Self::CreateVolume(_)
                | Self::DeleteVolume(_)
                | Self::ControllerExpandVolume(_)
                | Self::ControllerGetVolume(_)
                | Self::ControllerGetCapabilities
                | Self::ValidateVolumeCapabilities { .. }
                | Self::NodeStageVolume(_)
                | Self::NodeUnstageVolume { .. }
                | Self::NodePublishVolume(_)
                | Self::NodeUnpublishVolume { .. }
                | Self::NodeExpandVolume(_)
                | Self::NodeGetCapabilities
                | Self::NodeGetInfo
        )
    }
}

impl std::fmt::Display for CsiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetPluginInfo => f.write_str("GetPluginInfo"),
            Self::Probe => f.write_str("Probe"),
            Self::GetPluginCapabilities => f.write_str("GetPluginCapabilities"),
            Self::CreateVolume(req) => write!(f, "CreateVolume(name={})", req.name),
            Self::DeleteVolume(id) => write!(f, "DeleteVolume({id})"),
            Self::ControllerExpandVolume(req) => {
                write!(f, "ControllerExpandVolume({})", req.volume_id)
            }
            Self::ControllerGetVolume(id) => write!(f, "ControllerGetVolume({id})"),
            Self::ControllerGetCapabilities => f.write_str("ControllerGetCapabilities"),
            Self::ValidateVolumeCapabilities { volume_id, .. } => {
                write!(f, "ValidateVolumeCapabilities({volume_id})")
            }
            Self::NodeStageVolume(req) => write!(f, "NodeStageVolume({})", req.volume_id),
            Self::NodeUnstageVolume { volume_id, .. } => {
                write!(f, "NodeUnstageVolume({volume_id})")
            }
            Self::NodePublishVolume(req) => write!(
                f,
                "NodePublishVolume({}, target={})",
                req.volume_id, req.target_path
            ),
            Self::NodeUnpublishVolume {
                volume_id,
                target_path,
            } => write!(f, "NodeUnpublishVolume({volume_id}, target={target_path})"),
            Self::NodeExpandVolume(req) => write!(f, "NodeExpandVolume({})", req.volume_id),
            Self::NodeGetCapabilities => f.write_str("NodeGetCapabilities"),
            Self::NodeGetInfo => f.write_str("NodeGetInfo"),
            Self::PluginInfoResponse(info) => write!(f, "PluginInfo(name={})", info.name),
            Self::ProbeResult(ok) => write!(f, "ProbeResult({ok})"),
            Self::PluginCapabilitiesResponse(caps) => {
                write!(f, "PluginCapabilities(count={})", caps.len())
            }
            Self::VolumeCreated(v) => write!(f, "VolumeCreated({})", v.volume_id),
            Self::VolumeExpanded(r) => write!(f, "VolumeExpanded({})", r.capacity_bytes),
            Self::VolumeDescribed(_) => f.write_str("VolumeDescribed"),
            Self::ControllerCapabilitiesResponse(caps) => {
                write!(f, "ControllerCapabilities(count={})", caps.len())
            }
            Self::CapabilitiesValid(v) => write!(f, "CapabilitiesValid({v})"),
            Self::NodeCapabilitiesResponse(caps) => {
                write!(f, "NodeCapabilities(count={})", caps.len())
            }
            Self::NodeInfoResponse(info) => write!(f, "NodeInfo({})", info.node_id),
            Self::Ok => f.write_str("Ok"),
            Self::Error(e) => write!(f, "Error({e})"),
        }
    }
}
