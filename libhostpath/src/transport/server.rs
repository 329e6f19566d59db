//! QUIC server that runs on each node and dispatches incoming CSI requests
//! to the backend.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::crypto::rustls::QuicServerConfig;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::CsiController;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::message::CsiMessage;
use crate::node::CsiNode;

use super::MAX_MESSAGE_BYTES;

/// A CSI server that accepts QUIC connections and dispatches
/// [`CsiMessage`] requests to an [`CsiIdentity`] + [`CsiController`] +
/// [`CsiNode`] implementation.
pub struct CsiServer<T> {
    endpoint: quinn::Endpoint,
    handler: Arc<T>,
}

impl<T> CsiServer<T>
where
    T: CsiIdentity + CsiController + CsiNode + 'static,
{
    /// Create a new server bound to `addr`.
    pub fn new(
        addr: SocketAddr,
        tls_config: rustls::ServerConfig,
        handler: Arc<T>,
    ) -> Result<Self, CsiError> {
        let quic_server_config = QuicServerConfig::try_from(tls_config)
            .map_err(|e| CsiError::TransportError(format!("invalid TLS config: {e}")))?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_server_config));
        let endpoint = quinn::Endpoint::server(server_config, addr).map_err(CsiError::transport)?;
        info!(%addr, "CSI QUIC server listening");
        Ok(Self { endpoint, handler })
    }

    /// Accept connections until the endpoint is closed.
    ///
    /// Every connection and every bi-stream within it gets its own task, so
    /// requests are handled concurrently.
    pub async fn serve(&self) -> Result<(), CsiError> {
        while let Some(incoming) = self.endpoint.accept().await {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                match incoming.await {
                    Ok(conn) => {
                        let remote = conn.remote_address();
                        debug!(%remote, "CSI connection accepted");
                        if let Err(e) = Self::handle_connection(conn, handler).await {
                            warn!(%remote, error = %e, "CSI connection error");
                        }
                    }
                    Err(e) => warn!(error = %e, "CSI incoming connection failed"),
                }
            });
        }
        Ok(())
    }

    /// Stop accepting connections and close existing ones.
    pub fn shutdown(&self) {
        self.endpoint
            .close(quinn::VarInt::from_u32(0), b"server shutdown");
    }

    /// Return a reference to the underlying QUIC endpoint.
    pub fn endpoint(&self) -> &quinn::Endpoint {
        &self.endpoint
    }

    async fn handle_connection(conn: quinn::Connection, handler: Arc<T>) -> Result<(), CsiError> {
        loop {
            let (send, recv) = match conn.accept_bi().await {
                Ok(stream) => stream,
                Err(quinn::ConnectionError::ApplicationClosed(_))
                | Err(quinn::ConnectionError::LocallyClosed) => return Ok(()),
                Err(e) => return Err(CsiError::transport(e)),
            };

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = Self::handle_stream(send, recv, &handler).await {
                    error!(error = %e, "CSI stream handler error");
                }
            });
        }
    }

    #[instrument(skip_all)]
    async fn handle_stream(
        mut send: quinn::SendStream,
        mut recv: quinn::RecvStream,
        handler: &T,
    ) -> Result<(), CsiError> {
        let buf = recv
            .read_to_end(MAX_MESSAGE_BYTES)
            .await
            .map_err(CsiError::transport)?;

        let response = match serde_json::from_slice::<CsiMessage>(&buf) {
            Ok(request) => {
                debug!(%request, "CSI request received");
                dispatch(handler, request).await
            }
            Err(e) => CsiMessage::Error(CsiError::InvalidArgument(format!(
                "malformed request: {e}"
            ))),
        };

        let payload = serde_json::to_vec(&response).map_err(CsiError::internal)?;
        send.write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        send.finish().map_err(CsiError::transport)?;
        Ok(())
    }
}

/// Map a request onto the matching trait method and wrap the result.
///
/// Response variants arriving as requests are answered with
/// [`CsiError::InvalidArgument`].
pub async fn dispatch<T>(handler: &T, request: CsiMessage) -> CsiMessage
where
    T: CsiIdentity + CsiController + CsiNode,
{
    fn reply<V>(result: Result<V, CsiError>, wrap: impl FnOnce(V) -> CsiMessage) -> CsiMessage {
        match result {
            Ok(v) => wrap(v),
            Err(e) => CsiMessage::Error(e),
        }
    }
    let ack = |()| CsiMessage::Ok;

    match request {
        // --- Identity -------------------------------------------------------
        CsiMessage::GetPluginInfo => {
            reply(handler.get_plugin_info().await, CsiMessage::PluginInfoResponse)
        }
        CsiMessage::Probe => reply(handler.probe().await, CsiMessage::ProbeResult),
        CsiMessage::GetPluginCapabilities => reply(
            handler.get_plugin_capabilities().await,
            CsiMessage::PluginCapabilitiesResponse,
        ),

        // --- Controller -----------------------------------------------------
        CsiMessage::CreateVolume(req) => {
            reply(handler.create_volume(req).await, CsiMessage::VolumeCreated)
        }
        CsiMessage::DeleteVolume(id) => reply(handler.delete_volume(&id).await, ack),
        CsiMessage::ControllerExpandVolume(req) => {
            reply(handler.expand_volume(req).await, CsiMessage::VolumeExpanded)
        }
        CsiMessage::ControllerGetVolume(id) => {
            reply(handler.get_volume(&id).await, CsiMessage::VolumeDescribed)
        }
        CsiMessage::ControllerGetCapabilities => reply(
            handler.get_controller_capabilities().await,
            CsiMessage::ControllerCapabilitiesResponse,
        ),
        CsiMessage::ValidateVolumeCapabilities {
            volume_id,
            capabilities,
        } => reply(
            handler
                .validate_volume_capabilities(&volume_id, &capabilities)
                .await,
            CsiMessage::CapabilitiesValid,
        ),

        // --- Node -----------------------------------------------------------
        CsiMessage::NodeStageVolume(req) => reply(handler.stage_volume(req).await, ack),
        CsiMessage::NodeUnstageVolume {
            volume_id,
            staging_target_path,
        } => reply(
            handler
                .unstage_volume(&volume_id, &staging_target_path)
                .await,
            ack,
        ),
        CsiMessage::NodePublishVolume(req) => reply(handler.publish_volume(req).await, ack),
        CsiMessage::NodeUnpublishVolume {
            volume_id,
            target_path,
        } => reply(
            handler.unpublish_volume(&volume_id, &target_path).await,
            ack,
        ),
        CsiMessage::NodeExpandVolume(req) => reply(handler.node_expand_volume(req).await, ack),
        CsiMessage::NodeGetCapabilities => reply(
            handler.get_node_capabilities().await,
            CsiMessage::NodeCapabilitiesResponse,
        ),
        CsiMessage::NodeGetInfo => reply(handler.get_info().await, CsiMessage::NodeInfoResponse),

        // --- Response variants should never arrive as requests --------------
        other => {
            warn!(msg = %other, "unexpected message variant received as request");
            CsiMessage::Error(CsiError::InvalidArgument(format!(
                "unexpected message: {other}"
            )))
        }
    }
}
