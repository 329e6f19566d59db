use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use libhostpath::backend::TargetState;
use libhostpath::{
    CsiError, CsiNode, NodePublishVolumeRequest, StatusCode, VolumeCapability, VolumeId,
};

use crate::common::{FakeMounter, Harness};

fn publish_request(volume: &str, target: &str) -> NodePublishVolumeRequest {
    NodePublishVolumeRequest {
        volume_id: VolumeId::from(volume),
        target_path: target.to_owned(),
        volume_capability: VolumeCapability::default(),
        read_only: false,
        volume_context: HashMap::new(),
    }
}

#[tokio::test]
async fn publish_unpublish_lifecycle() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    let t1 = h.target("mnt/t1");
    let id = VolumeId::from("pv-a");

    h.backend.publish_volume(publish_request("pv-a", &t1)).await.unwrap();
    assert!(Path::new(&t1).is_dir());
    assert_eq!(h.mounter.source_of(Path::new(&t1)), Some(PathBuf::from("/data/a")));

    // Retry of the same publish is a no-op.
    h.backend.publish_volume(publish_request("pv-a", &t1)).await.unwrap();
    assert_eq!(h.mounter.bind_calls.load(Ordering::SeqCst), 1);

    h.backend.unpublish_volume(&id, &t1).await.unwrap();
    assert_eq!(h.mounter.mount_count(), 0);

    // Second unpublish finds the directory unmounted.
    h.backend.unpublish_volume(&id, &t1).await.unwrap();
    assert_eq!(h.mounter.unmount_calls.load(Ordering::SeqCst), 1);

    // The target directory is left in place.
    assert!(Path::new(&t1).is_dir());
    assert_eq!(h.backend.targets_in_flight(), 0);
}

#[tokio::test]
async fn publish_creates_nested_target() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    let target = h.target("pods/uid/volumes/pv-a/mount");

    h.backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap();

    assert!(Path::new(&target).is_dir());
    assert_eq!(
        h.backend.target_state(Path::new(&target)).await.unwrap(),
        TargetState::Mounted
    );
}

#[cfg(unix)]
#[tokio::test]
async fn publish_creates_target_with_restricted_mode() {
    use std::os::unix::fs::PermissionsExt;

    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    let target = h.target("t1");

    h.backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o777;
    // The process umask can only clear bits.
    assert_eq!(mode & !0o750, 0);
}

#[tokio::test]
async fn publish_onto_existing_empty_dir() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    let target = h.target("existing");
    std::fs::create_dir_all(&target).unwrap();

    h.backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap();
    assert_eq!(h.mounter.mount_count(), 1);
}

#[tokio::test]
async fn unpublish_unknown_target_is_not_found() {
    let h = Harness::new();
    let target = h.target("never-created");

    let err = h
        .backend
        .unpublish_volume(&VolumeId::from("pv-a"), &target)
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::NotFound);
    assert_eq!(h.mounter.unmount_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unpublish_rejects_empty_target() {
    let h = Harness::new();
    let err = h
        .backend
        .unpublish_volume(&VolumeId::from("pv-a"), "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn publish_unknown_volume_leaves_target_unmounted() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    let target = h.target("t1");

    // pv-b has no record at all.
    let err = h
        .backend
        .publish_volume(publish_request("pv-b", &target))
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Internal);
    assert!(matches!(err, CsiError::Metadata(_)));

    // The directory created before resolution is not rolled back.
    assert!(Path::new(&target).is_dir());
    assert_eq!(h.mounter.bind_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn publish_with_empty_annotation_is_internal() {
    let h = Harness::new();
    h.bind("pv-a", "");
    let target = h.target("t1");

    let err = h
        .backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Internal);
    assert!(matches!(err, CsiError::HostPathUnset { .. }));
    assert_eq!(h.mounter.bind_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mount_failure_surfaces_helper_output() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    h.mounter.fail_mount.store(true, Ordering::SeqCst);
    let target = h.target("t1");

    let err = h
        .backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Internal);
    assert!(err.to_string().contains("special device /data/a does not exist"));

    // A later attempt after the host recovers succeeds.
    h.mounter.fail_mount.store(false, Ordering::SeqCst);
    h.backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap();
    assert_eq!(h.mounter.mount_count(), 1);
}

#[tokio::test]
async fn unmount_failure_is_internal() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    let target = h.target("t1");
    h.backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap();

    h.mounter.fail_unmount.store(true, Ordering::SeqCst);
    let err = h
        .backend
        .unpublish_volume(&VolumeId::from("pv-a"), &target)
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Internal);
    assert!(matches!(err, CsiError::UnmountFailed { .. }));
    assert!(err.to_string().contains("target is busy"));
    assert_eq!(h.mounter.mount_count(), 1);
}

#[tokio::test]
async fn mount_query_failure_is_internal() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    h.mounter.fail_query.store(true, Ordering::SeqCst);
    let target = h.target("t1");

    let err = h
        .backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Internal);

    let err = h
        .backend
        .unpublish_volume(&VolumeId::from("pv-a"), &target)
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Internal);
    assert_eq!(h.mounter.bind_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn annotation_change_does_not_remount() {
    let h = Harness::new();
    h.bind("pv-a", "/data/a");
    let target = h.target("t1");
    h.backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap();

    h.bind("pv-a", "/data/b");
    h.backend
        .publish_volume(publish_request("pv-a", &target))
        .await
        .unwrap();
    assert_eq!(
        h.mounter.source_of(Path::new(&target)),
        Some(PathBuf::from("/data/a"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishes_mount_once() {
    let h = Arc::new(Harness::with_mounter(FakeMounter::with_query_delay(
        Duration::from_millis(20),
    )));
    h.bind("pv-a", "/data/a");
    let target = h.target("t1");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&h);
            let target = target.clone();
            tokio::spawn(async move {
                h.backend
                    .publish_volume(publish_request("pv-a", &target))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(h.mounter.bind_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.targets_in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_targets_publish_independently() {
    let h = Arc::new(Harness::with_mounter(FakeMounter::with_query_delay(
        Duration::from_millis(10),
    )));
    h.bind("pv-a", "/data/a");

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let h = Arc::clone(&h);
            let target = h.target(&format!("t{i}"));
            tokio::spawn(async move {
                h.backend
                    .publish_volume(publish_request("pv-a", &target))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(h.mounter.mount_count(), 4);
}
