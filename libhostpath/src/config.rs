//! Driver configuration.
//!
//! [`DriverConfig`] gathers the knobs shared by the three CSI services. The
//! binary fills it from command-line flags and environment variables; tests
//! build it directly with [`DriverConfig::new`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CsiError;

/// Plugin name reported by `GetPluginInfo`.
pub const DRIVER_NAME: &str = "hostpath.csi.kubernetes.io";

/// Topology key pinning a volume's consumers to the node holding its
/// directory.
pub const TOPOLOGY_NODE_KEY: &str = "topology.hostpath.csi/hostname";

/// Claim annotation holding the literal host directory of a volume.
pub const HOST_PATH_ANNOTATION: &str = "csi-hostpath-path";

/// Helper prefix entering the host's root mount namespace.
pub const DEFAULT_NSENTER: &[&str] = &["/nsenter", "--mount=/proc/1/ns/mnt"];

/// Mount table read (inside the helper's namespace) to detect mounts.
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/self/mounts";

/// Configuration for the host-path driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Name advertised by the Identity service.
    pub driver_name: String,
    /// Identifier of the node this plugin instance runs on.
    pub node_id: String,
    /// Topology segment key returned by `NodeGetInfo`.
    pub topology_key: String,
    /// Claim annotation that carries the host path.
    pub annotation_key: String,
    /// Command prefix used to run `mount`, `umount` and `cat` in the host
    /// mount namespace. Empty runs the commands directly.
    pub nsenter: Vec<String>,
    /// Mount table consulted by the mount-state query.
    pub mount_table: PathBuf,
    /// Upper bound for a single helper invocation. `None` waits forever.
    #[serde(with = "opt_secs")]
    pub command_timeout: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            driver_name: DRIVER_NAME.to_owned(),
            node_id: String::new(),
            topology_key: TOPOLOGY_NODE_KEY.to_owned(),
            annotation_key: HOST_PATH_ANNOTATION.to_owned(),
            nsenter: DEFAULT_NSENTER.iter().map(|s| (*s).to_owned()).collect(),
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
            command_timeout: None,
        }
    }
}

impl DriverConfig {
    /// Default configuration for the node `node_id`.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// Default configuration using this machine's hostname as node id.
    pub fn for_this_host() -> Result<Self, CsiError> {
        let hostname = nix::unistd::gethostname()
            .map_err(|e| CsiError::Internal(format!("gethostname: {e}")))?;
        let node_id = hostname
            .into_string()
            .map_err(|_| CsiError::Internal("non-UTF8 hostname".into()))?;
        Ok(Self::new(node_id))
    }

    /// Reject configurations the driver cannot run with.
    pub fn validate(&self) -> Result<(), CsiError> {
        if self.node_id.is_empty() {
            return Err(CsiError::InvalidArgument("node id must not be empty".into()));
        }
        if self.driver_name.is_empty() {
            return Err(CsiError::InvalidArgument(
                "driver name must not be empty".into(),
            ));
        }
        if self.annotation_key.is_empty() {
            return Err(CsiError::InvalidArgument(
                "host path annotation key must not be empty".into(),
            ));
        }
        Ok(())
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
