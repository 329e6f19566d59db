mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use libhostpath::HostPathBackend;
use libhostpath::metadata::KubeApiMetadata;
use libhostpath::transport::server::CsiServer;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    // quinn and reqwest both build on rustls; pin the provider once.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = args.driver_config()?;
    let metadata = KubeApiMetadata::new(args.kube_config()?)
        .context("create Kubernetes API client")?;
    let tls = server_tls(&args.tls_cert, &args.tls_key)?;

    info!(
        driver = %config.driver_name,
        node_id = %config.node_id,
        annotation = %config.annotation_key,
        nsenter = ?config.nsenter,
        "starting host-path CSI plugin",
    );

    let backend = Arc::new(HostPathBackend::with_nsenter(config, Arc::new(metadata)));
    let server = CsiServer::new(args.endpoint, tls, backend)
        .with_context(|| format!("start CSI server on {}", args.endpoint))?;

    tokio::select! {
        result = server.serve() => {
            result.context("CSI server stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutting down");
            server.shutdown();
        }
    }

    server.endpoint().wait_idle().await;
    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn server_tls(cert: &Path, key: &Path) -> Result<rustls::ServerConfig> {
    let certs = CertificateDer::pem_file_iter(cert)
        .with_context(|| format!("open certificate {}", cert.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parse certificate {}", cert.display()))?;
    let key = PrivateKeyDer::from_pem_file(key)
        .with_context(|| format!("load private key {}", key.display()))?;

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("build TLS server config")
}
