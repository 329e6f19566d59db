//! QUIC client used by the orchestrator side to issue CSI requests.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use quinn::crypto::rustls::QuicClientConfig;
use tracing::{debug, instrument};

use crate::error::CsiError;
use crate::message::CsiMessage;
use crate::types::*;

use super::MAX_MESSAGE_BYTES;

/// Sends [`CsiMessage`] requests over a single QUIC connection.
///
/// Besides the raw [`CsiClient::request`], one typed method per RPC unwraps
/// the expected response variant and turns [`CsiMessage::Error`] back into
/// a [`CsiError`].
pub struct CsiClient {
    connection: quinn::Connection,
}

impl CsiClient {
    /// Establish a new QUIC connection to the CSI server at `addr`.
    ///
    /// * `server_name`: TLS SNI name that must match a SAN in the server's
    ///   certificate
    /// * `tls_config`: client TLS configuration trusting the server's CA
    pub async fn connect(
        addr: SocketAddr,
        server_name: &str,
        tls_config: rustls::ClientConfig,
    ) -> Result<Self, CsiError> {
        let quic_client_config = QuicClientConfig::try_from(tls_config)
            .map_err(|e| CsiError::TransportError(format!("invalid TLS config: {e}")))?;
        let client_config = quinn::ClientConfig::new(Arc::new(quic_client_config));

        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let mut endpoint = quinn::Endpoint::client(bind).map_err(CsiError::transport)?;
        endpoint.set_default_client_config(client_config);

        let connection = endpoint
            .connect(addr, server_name)
            .map_err(CsiError::transport)?
            .await
            .map_err(CsiError::transport)?;

        debug!(%addr, %server_name, "CSI QUIC connection established");
        Ok(Self { connection })
    }

    /// Send a request and wait for the corresponding response.
    ///
    /// Each call opens a new bi-directional stream, writes the JSON request,
    /// finishes the send side, then reads and decodes the full response.
    #[instrument(skip(self), fields(msg = %msg))]
    pub async fn request(&self, msg: &CsiMessage) -> Result<CsiMessage, CsiError> {
        let (mut send, mut recv) = self
            .connection
            .open_bi()
            .await
            .map_err(CsiError::transport)?;

        let payload = serde_json::to_vec(msg).map_err(CsiError::internal)?;
        send.write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        send.finish().map_err(CsiError::transport)?;

        let buf = recv
            .read_to_end(MAX_MESSAGE_BYTES)
            .await
            .map_err(CsiError::transport)?;

        let response: CsiMessage = serde_json::from_slice(&buf).map_err(CsiError::transport)?;
        debug!(%response, "CSI response received");
        Ok(response)
    }

    /// Close the underlying QUIC connection gracefully.
    pub fn close(&self) {
        self.connection
            .close(quinn::VarInt::from_u32(0), b"client shutdown");
    }

    // --- Identity -----------------------------------------------------------

    pub async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        match self.request(&CsiMessage::GetPluginInfo).await? {
            CsiMessage::PluginInfoResponse(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }

    pub async fn probe(&self) -> Result<bool, CsiError> {
        match self.request(&CsiMessage::Probe).await? {
            CsiMessage::ProbeResult(ok) => Ok(ok),
            other => Err(unexpected(other)),
        }
    }

    // --- Controller ---------------------------------------------------------

    pub async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError> {
        match self.request(&CsiMessage::CreateVolume(req)).await? {
            CsiMessage::VolumeCreated(volume) => Ok(volume),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete_volume(&self, volume_id: VolumeId) -> Result<(), CsiError> {
        expect_ok(self.request(&CsiMessage::DeleteVolume(volume_id)).await?)
    }

    pub async fn expand_volume(
        &self,
        req: ControllerExpandVolumeRequest,
    ) -> Result<ExpandVolumeResponse, CsiError> {
        match self.request(&CsiMessage::ControllerExpandVolume(req)).await? {
            CsiMessage::VolumeExpanded(resp) => Ok(resp),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_volume(&self, volume_id: VolumeId) -> Result<VolumeDescriptor, CsiError> {
        match self.request(&CsiMessage::ControllerGetVolume(volume_id)).await? {
            CsiMessage::VolumeDescribed(desc) => Ok(desc),
            other => Err(unexpected(other)),
        }
    }

    // --- Node ---------------------------------------------------------------

    pub async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        expect_ok(self.request(&CsiMessage::NodePublishVolume(req)).await?)
    }

    pub async fn unpublish_volume(
        &self,
        volume_id: VolumeId,
        target_path: String,
    ) -> Result<(), CsiError> {
        expect_ok(
            self.request(&CsiMessage::NodeUnpublishVolume {
                volume_id,
                target_path,
            })
            .await?,
        )
    }

    pub async fn get_node_info(&self) -> Result<NodeInfo, CsiError> {
        match self.request(&CsiMessage::NodeGetInfo).await? {
            CsiMessage::NodeInfoResponse(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }
}

fn expect_ok(response: CsiMessage) -> Result<(), CsiError> {
    match response {
        CsiMessage::Ok => Ok(()),
        other => Err(unexpected(other)),
    }
}

/// Turn an error response back into its [`CsiError`]; any other variant is a
/// protocol violation.
fn unexpected(response: CsiMessage) -> CsiError {
    match response {
        CsiMessage::Error(e) => e,
        other => CsiError::TransportError(format!("unexpected response: {other}")),
    }
}
