use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use libhostpath::config::HOST_PATH_ANNOTATION;
use libhostpath::metadata::MemoryMetadata;
use libhostpath::mount::{MountError, MountExecutor, create_target_dir};
use libhostpath::{DriverConfig, HostPathBackend};

pub const NODE_ID: &str = "node-01";

/// In-memory stand-in for the host mount namespace.
///
/// Target directories are real (created under a temp dir) so existence
/// checks behave like the nsenter executor; the mount table is a map.
#[derive(Default)]
pub struct FakeMounter {
    mounts: Mutex<HashMap<PathBuf, PathBuf>>,
    pub bind_calls: AtomicUsize,
    pub unmount_calls: AtomicUsize,
    pub fail_mount: AtomicBool,
    pub fail_unmount: AtomicBool,
    pub fail_query: AtomicBool,
    /// Pause inside `is_mounted` to widen check-then-act windows.
    pub query_delay: Option<Duration>,
}

impl FakeMounter {
    pub fn with_query_delay(delay: Duration) -> Self {
        Self {
            query_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn source_of(&self, target: &Path) -> Option<PathBuf> {
        self.mounts.lock().unwrap().get(target).cloned()
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.lock().unwrap().len()
    }

    fn failed(command: &str, output: &str) -> MountError {
        MountError::CommandFailed {
            command: command.to_owned(),
            status: "exit status: 32".to_owned(),
            output: output.to_owned(),
        }
    }
}

#[async_trait]
impl MountExecutor for FakeMounter {
    async fn bind_mount(&self, source: &Path, target: &Path) -> Result<(), MountError> {
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        create_target_dir(target).await?;
        if self.fail_mount.load(Ordering::SeqCst) {
            return Err(Self::failed(
                "mount --bind",
                "mount: special device /data/a does not exist",
            ));
        }
        let mut mounts = self.mounts.lock().unwrap();
        if mounts.contains_key(target) {
            return Err(Self::failed("mount --bind", "mount: target is busy"));
        }
        mounts.insert(target.to_owned(), source.to_owned());
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> Result<(), MountError> {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unmount.load(Ordering::SeqCst) {
            return Err(Self::failed("umount", "umount: target is busy"));
        }
        match self.mounts.lock().unwrap().remove(target) {
            Some(_) => Ok(()),
            None => Err(Self::failed("umount", "umount: not mounted")),
        }
    }

    async fn is_mounted(&self, target: &Path) -> Result<bool, MountError> {
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(Self::failed("cat /proc/self/mounts", "cat: permission denied"));
        }
        if !target.exists() {
            return Err(MountError::TargetMissing(target.to_owned()));
        }
        Ok(self.mounts.lock().unwrap().contains_key(target))
    }
}

pub struct Harness {
    pub backend: HostPathBackend,
    pub mounter: Arc<FakeMounter>,
    pub metadata: Arc<MemoryMetadata>,
    pub root: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_mounter(FakeMounter::default())
    }

    pub fn with_mounter(mounter: FakeMounter) -> Self {
        let mounter = Arc::new(mounter);
        let metadata = Arc::new(MemoryMetadata::new());
        let backend = HostPathBackend::new(
            DriverConfig::new(NODE_ID),
            metadata.clone(),
            mounter.clone(),
        );
        Self {
            backend,
            mounter,
            metadata,
            root: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Bind `volume` to a claim annotated with `host_path`.
    pub fn bind(&self, volume: &str, host_path: &str) {
        self.metadata.bind(
            volume,
            "default",
            &format!("{volume}-claim"),
            HOST_PATH_ANNOTATION,
            host_path,
        );
    }

    /// A target path under the scratch root, as a string.
    pub fn target(&self, rel: &str) -> String {
        self.root.path().join(rel).display().to_string()
    }
}
