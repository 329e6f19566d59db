//! # libhostpath: host-directory volumes over CSI
//!
//! `libhostpath` exposes existing host directories as CSI volumes. A volume
//! id names a PersistentVolume; the claim bound to it carries a
//! `csi-hostpath-path` annotation with the directory to publish. The node
//! service resolves that path and bind-mounts it at the caller's target path
//! inside the host mount namespace. Requests travel over QUIC (via
//! [`quinn`]) as JSON envelopes; the crate uses Tokio, `tracing` for
//! observability and `thiserror` for structured errors.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `Volume`, `VolumeId`, capabilities, requests. |
//! | [`error`] | [`CsiError`] and its [`StatusCode`]. |
//! | [`config`] | [`DriverConfig`] and well-known names. |
//! | [`message`] | [`CsiMessage`] protocol envelope for QUIC transport. |
//! | [`identity`] | [`CsiIdentity`] trait: plugin discovery & health. |
//! | [`controller`] | [`CsiController`] trait: volume create/delete/expand. |
//! | [`node`] | [`CsiNode`] trait: publish, unpublish, node info. |
//! | [`mount`] | [`MountExecutor`] and the nsenter-based implementation. |
//! | [`metadata`] | Cluster metadata records and clients. |
//! | [`resolver`] | [`HostPathResolver`]: volume id to host directory. |
//! | [`lock`] | Per-target-path locks. |
//! | [`transport`] | QUIC client/server built on `quinn`. |
//! | [`backend`] | [`HostPathBackend`], implementing all three services. |

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod lock;
pub mod message;
pub mod metadata;
pub mod mount;
pub mod node;
pub mod resolver;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use backend::HostPathBackend;
pub use config::DriverConfig;
pub use controller::CsiController;
pub use error::{CsiError, StatusCode};
pub use identity::CsiIdentity;
pub use message::CsiMessage;
pub use metadata::ClusterMetadata;
pub use mount::MountExecutor;
pub use node::CsiNode;
pub use resolver::HostPathResolver;
pub use types::*;
