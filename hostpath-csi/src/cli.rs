use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use libhostpath::DriverConfig;
use libhostpath::metadata::KubeApiConfig;

/// Host-path CSI plugin: publishes annotated host directories into
/// workload target paths.
#[derive(Parser, Debug)]
#[command(name = "hostpath-csi", version)]
pub struct Args {
    /// Address the QUIC endpoint listens on.
    #[arg(long, env = "CSI_ENDPOINT", default_value = "0.0.0.0:7443")]
    pub endpoint: SocketAddr,

    /// Node identifier. Defaults to the hostname.
    #[arg(long, env = "NODE_ID")]
    pub node_id: Option<String>,

    /// JSON file with a driver configuration. Flags override its fields.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Plugin name advertised by the identity service.
    #[arg(long)]
    pub driver_name: Option<String>,

    /// Claim annotation carrying the host directory.
    #[arg(long)]
    pub annotation_key: Option<String>,

    /// Command prefix entering the host mount namespace. An empty string
    /// runs mount helpers directly.
    #[arg(long, value_name = "CMD")]
    pub nsenter: Option<String>,

    /// Mount table read to detect existing mounts.
    #[arg(long, value_name = "FILE")]
    pub mount_table: Option<PathBuf>,

    /// Timeout in seconds for a single mount helper invocation.
    #[arg(long, value_name = "SECS")]
    pub command_timeout: Option<u64>,

    /// PEM certificate chain for the QUIC endpoint.
    #[arg(long, env = "CSI_TLS_CERT", value_name = "FILE")]
    pub tls_cert: PathBuf,

    /// PEM private key for the QUIC endpoint.
    #[arg(long, env = "CSI_TLS_KEY", value_name = "FILE")]
    pub tls_key: PathBuf,

    /// Kubernetes API server URL. Without it the in-cluster service
    /// account is used.
    #[arg(long, env = "KUBE_API_SERVER")]
    pub kube_server: Option<String>,

    /// File holding the bearer token for the API server.
    #[arg(long, value_name = "FILE", requires = "kube_server")]
    pub kube_token_file: Option<PathBuf>,

    /// PEM bundle trusted for the API server.
    #[arg(long, value_name = "FILE", requires = "kube_server")]
    pub kube_ca: Option<PathBuf>,

    /// Skip API server certificate verification.
    #[arg(long, requires = "kube_server")]
    pub kube_insecure: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    pub fn driver_config(&self) -> Result<DriverConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                serde_json::from_slice::<DriverConfig>(&raw)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => DriverConfig::default(),
        };

        if let Some(node_id) = &self.node_id {
            config.node_id = node_id.clone();
        }
        if config.node_id.is_empty() {
            config.node_id = DriverConfig::for_this_host()
                .context("determine node id from hostname")?
                .node_id;
        }
        if let Some(name) = &self.driver_name {
            config.driver_name = name.clone();
        }
        if let Some(key) = &self.annotation_key {
            config.annotation_key = key.clone();
        }
        if let Some(prefix) = &self.nsenter {
            config.nsenter = prefix.split_whitespace().map(str::to_owned).collect();
        }
        if let Some(table) = &self.mount_table {
            config.mount_table = table.clone();
        }
        if let Some(secs) = self.command_timeout {
            if secs == 0 {
                bail!("--command-timeout must be positive");
            }
            config.command_timeout = Some(Duration::from_secs(secs));
        }

        config.validate().context("invalid driver configuration")?;
        Ok(config)
    }

    pub fn kube_config(&self) -> Result<KubeApiConfig> {
        let Some(server) = &self.kube_server else {
            return KubeApiConfig::in_cluster().context("load in-cluster API config");
        };

        let ca_cert_pem = self
            .kube_ca
            .as_ref()
            .map(|path| {
                std::fs::read(path).with_context(|| format!("read CA bundle {}", path.display()))
            })
            .transpose()?;

        Ok(KubeApiConfig {
            server: server.clone(),
            token: None,
            token_file: self.kube_token_file.clone(),
            ca_cert_pem,
            accept_invalid_certs: self.kube_insecure,
            timeout: Some(Duration::from_secs(30)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "hostpath-csi",
            "--tls-cert",
            "/etc/csi/tls.crt",
            "--tls-key",
            "/etc/csi/tls.key",
            "--kube-server",
            "https://127.0.0.1:6443",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "--node-id",
            "node-7",
            "--nsenter",
            "",
            "--command-timeout",
            "15",
        ]);
        let config = args.driver_config().unwrap();
        assert_eq!(config.node_id, "node-7");
        assert!(config.nsenter.is_empty());
        assert_eq!(config.command_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.annotation_key, "csi-hostpath-path");
    }

    #[test]
    fn config_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driver.json");
        std::fs::write(
            &path,
            r#"{"node_id":"from-file","annotation_key":"example.com/dir","command_timeout":5}"#,
        )
        .unwrap();

        let path = path.display().to_string();
        let config = parse(&["--config", &path]).driver_config().unwrap();
        assert_eq!(config.node_id, "from-file");
        assert_eq!(config.annotation_key, "example.com/dir");
        assert_eq!(config.command_timeout, Some(Duration::from_secs(5)));

        let config = parse(&["--config", &path, "--node-id", "flag"])
            .driver_config()
            .unwrap();
        assert_eq!(config.node_id, "flag");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let args = parse(&["--node-id", "n", "--command-timeout", "0"]);
        assert!(args.driver_config().is_err());
    }

    #[test]
    fn explicit_api_server() {
        let config = parse(&["--kube-insecure"]).kube_config().unwrap();
        assert_eq!(config.server, "https://127.0.0.1:6443");
        assert!(config.accept_invalid_certs);
        assert!(config.ca_cert_pem.is_none());
    }
}
