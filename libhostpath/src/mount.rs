//! Privileged mount operations.
//!
//! The plugin normally runs inside a container with its own mount namespace,
//! so mounts made directly by the process would never be seen by the host or
//! by workloads. [`NsenterExecutor`] therefore runs `mount`, `umount` and the
//! mount-table read through a helper prefix (by default
//! `/nsenter --mount=/proc/1/ns/mnt`) that enters the host's root mount
//! namespace.
//!
//! The node backend only depends on the [`MountExecutor`] trait, which keeps
//! the publish/unpublish state machine testable without privileges.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::DriverConfig;

/// Mode for directories created at target paths.
pub const TARGET_DIR_MODE: u32 = 0o750;

/// Failure of a mount executor operation.
#[derive(Debug, Error)]
pub enum MountError {
    /// The queried target path does not exist.
    #[error("target {} does not exist", .0.display())]
    TargetMissing(PathBuf),

    /// A required path argument was empty.
    #[error("{0} is not specified")]
    MissingArgument(&'static str),

    /// The helper could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The helper exited unsuccessfully.
    #[error("`{command}` failed ({status}), output: {output:?}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    /// The helper did not finish within the configured timeout.
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    /// A local filesystem operation failed.
    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Narrow capability interface over the host's mount namespace.
#[async_trait]
pub trait MountExecutor: Send + Sync {
    /// Bind-mount `source` at `target`, creating `target` when missing.
    async fn bind_mount(&self, source: &Path, target: &Path) -> Result<(), MountError>;

    /// Unmount whatever is mounted at `target`.
    async fn unmount(&self, target: &Path) -> Result<(), MountError>;

    /// Whether the host mount table has an entry whose mount point is
    /// exactly `target`.
    ///
    /// Returns [`MountError::TargetMissing`] when `target` does not exist.
    async fn is_mounted(&self, target: &Path) -> Result<bool, MountError>;
}

/// Create `path` and its parents with mode [`TARGET_DIR_MODE`]. A no-op when
/// the directory already exists.
pub async fn create_target_dir(path: &Path) -> Result<(), MountError> {
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(TARGET_DIR_MODE)
        .create(path)
        .await
        .map_err(|source| MountError::Io {
            op: "create dir",
            path: path.to_owned(),
            source,
        })
}

/// [`MountExecutor`] that shells out through a namespace-entry helper.
#[derive(Debug, Clone)]
pub struct NsenterExecutor {
    prefix: Vec<String>,
    mount_table: PathBuf,
    timeout: Option<Duration>,
}

impl NsenterExecutor {
    /// Executor running every command as `<prefix> <command…>`.
    pub fn new(prefix: Vec<String>) -> Self {
        Self {
            prefix,
            mount_table: PathBuf::from(crate::config::DEFAULT_MOUNT_TABLE),
            timeout: None,
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.nsenter.clone())
            .with_mount_table(config.mount_table.clone())
            .with_timeout(config.command_timeout)
    }

    /// Read `path` instead of `/proc/self/mounts` when querying mount state.
    pub fn with_mount_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_table = path.into();
        self
    }

    /// Kill helper invocations that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `args` behind the prefix and return its stdout.
    async fn run(&self, args: &[&OsStr]) -> Result<String, MountError> {
        let mut argv: Vec<OsString> = self.prefix.iter().map(OsString::from).collect();
        argv.extend(args.iter().map(|a| a.to_os_string()));
        let command = argv
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        let Some((program, rest)) = argv.split_first() else {
            return Err(MountError::MissingArgument("command"));
        };

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(%command, "running mount helper");
        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, cmd.output())
                .await
                .map_err(|_| MountError::TimedOut {
                    command: command.clone(),
                    timeout,
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| MountError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(MountError::CommandFailed {
                command,
                status: output.status.to_string(),
                output: combined.trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for NsenterExecutor {
    fn default() -> Self {
        Self::from_config(&DriverConfig::default())
    }
}

#[async_trait]
impl MountExecutor for NsenterExecutor {
    async fn bind_mount(&self, source: &Path, target: &Path) -> Result<(), MountError> {
        if source.as_os_str().is_empty() {
            return Err(MountError::MissingArgument("mount source"));
        }
        if target.as_os_str().is_empty() {
            return Err(MountError::MissingArgument("mount target"));
        }

        create_target_dir(target).await?;
        self.run(&[
            OsStr::new("mount"),
            OsStr::new("--bind"),
            source.as_os_str(),
            target.as_os_str(),
        ])
        .await?;

        info!(source = %source.display(), target = %target.display(), "bind mount established");
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> Result<(), MountError> {
        if target.as_os_str().is_empty() {
            return Err(MountError::MissingArgument("unmount target"));
        }

        self.run(&[OsStr::new("umount"), target.as_os_str()]).await?;

        info!(target = %target.display(), "unmounted");
        Ok(())
    }

    async fn is_mounted(&self, target: &Path) -> Result<bool, MountError> {
        if target.as_os_str().is_empty() {
            return Err(MountError::MissingArgument("mount check target"));
        }

        match tokio::fs::metadata(target).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MountError::TargetMissing(target.to_owned()));
            }
            Err(source) => {
                return Err(MountError::Io {
                    op: "stat",
                    path: target.to_owned(),
                    source,
                });
            }
        }

        let table = self
            .run(&[OsStr::new("cat"), self.mount_table.as_os_str()])
            .await?;
        Ok(mount_table_contains(&table, target))
    }
}

// ---------------------------------------------------------------------------
// Mount table parsing
// ---------------------------------------------------------------------------

/// Return `true` if any line of `table` (in `/proc/mounts` format) has
/// `target` as its mount-point field.
///
/// Format: `<device> <mountpoint> <fstype> <options> <dump> <pass>`. The
/// mount point is compared as a whole field, so `/mnt/t1` does not match an
/// entry for `/mnt/t10`.
pub fn mount_table_contains(table: &str, target: &Path) -> bool {
    let target = target.to_string_lossy();
    let target = trim_trailing_slash(&target);
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|field| trim_trailing_slash(&unescape_mount_field(field)) == target)
}

fn trim_trailing_slash(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Decode the octal escapes (`\040`, `\011`, `\012`, `\134`) the kernel uses
/// for whitespace and backslashes in mount table fields.
pub fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..=i + 3].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = bytes[i + 1..=i + 3]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
