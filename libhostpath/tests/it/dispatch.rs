use std::collections::HashMap;

use libhostpath::message::CsiMessage;
use libhostpath::transport::server::dispatch;
use libhostpath::{
    AccessMode, CreateVolumeRequest, NodePublishVolumeRequest, StatusCode, VolumeCapability,
    VolumeId,
};

use crate::common::{Harness, NODE_ID};

fn error_code(response: CsiMessage) -> StatusCode {
    match response {
        CsiMessage::Error(e) => e.code(),
        other => panic!("expected error response, got {other}"),
    }
}

#[tokio::test]
async fn identity_requests() {
    let h = Harness::new();
    match dispatch(&h.backend, CsiMessage::GetPluginInfo).await {
        CsiMessage::PluginInfoResponse(info) => {
            assert_eq!(info.name, "hostpath.csi.kubernetes.io")
        }
        other => panic!("unexpected {other}"),
    }
    assert!(matches!(
        dispatch(&h.backend, CsiMessage::Probe).await,
        CsiMessage::ProbeResult(true)
    ));
}

#[tokio::test]
async fn node_info_request() {
    let h = Harness::new();
    match dispatch(&h.backend, CsiMessage::NodeGetInfo).await {
        CsiMessage::NodeInfoResponse(info) => assert_eq!(info.node_id, NODE_ID),
        other => panic!("unexpected {other}"),
    }
}

#[tokio::test]
async fn create_volume_round_trip() {
    let h = Harness::new();
    let req = CreateVolumeRequest {
        name: "pv-a".into(),
        capacity_range: None,
        volume_capabilities: vec![VolumeCapability::default()],
        parameters: HashMap::from([("k".into(), "v".into())]),
    };
    match dispatch(&h.backend, CsiMessage::CreateVolume(req)).await {
        CsiMessage::VolumeCreated(vol) => {
            assert_eq!(vol.volume_id.as_str(), "pv-a");
            assert_eq!(vol.volume_context["k"], "v");
        }
        other => panic!("unexpected {other}"),
    }

    let invalid = CreateVolumeRequest {
        name: String::new(),
        capacity_range: None,
        volume_capabilities: vec![VolumeCapability::default()],
        parameters: HashMap::new(),
    };
    assert_eq!(
        error_code(dispatch(&h.backend, CsiMessage::CreateVolume(invalid)).await),
        StatusCode::InvalidArgument
    );
}

#[tokio::test]
async fn validate_capabilities_request() {
    let h = Harness::new();
    let response = dispatch(
        &h.backend,
        CsiMessage::ValidateVolumeCapabilities {
            volume_id: VolumeId::from("pv-a"),
            capabilities: vec![VolumeCapability {
                access_mode: AccessMode::ReadOnlyMany,
                ..Default::default()
            }],
        },
    )
    .await;
    assert!(matches!(response, CsiMessage::CapabilitiesValid(false)));
}

#[tokio::test]
async fn publish_and_unpublish_requests() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    let target = h.target("t1");

    let publish = CsiMessage::NodePublishVolume(NodePublishVolumeRequest {
        volume_id: VolumeId::from("pv-a"),
        target_path: target.clone(),
        volume_capability: VolumeCapability::default(),
        read_only: false,
        volume_context: HashMap::new(),
    });
    assert!(matches!(dispatch(&h.backend, publish).await, CsiMessage::Ok));

    let unpublish = CsiMessage::NodeUnpublishVolume {
        volume_id: VolumeId::from("pv-a"),
        target_path: target,
    };
    assert!(matches!(dispatch(&h.backend, unpublish).await, CsiMessage::Ok));

    let missing = CsiMessage::NodeUnpublishVolume {
        volume_id: VolumeId::from("pv-a"),
        target_path: h.target("missing"),
    };
    assert_eq!(
        error_code(dispatch(&h.backend, missing).await),
        StatusCode::NotFound
    );
}

#[tokio::test]
async fn response_variant_is_rejected() {
    let h = Harness::new();
    assert_eq!(
        error_code(dispatch(&h.backend, CsiMessage::Ok).await),
        StatusCode::InvalidArgument
    );
    assert_eq!(
        error_code(dispatch(&h.backend, CsiMessage::ProbeResult(true)).await),
        StatusCode::InvalidArgument
    );
}
