use anyhow::Result;
use clap::Parser;
use github_proxy_core::tracing::{config::InstrumentationConfig, init::init_tracing};
use github_proxy_core::HostsFile;
use github_proxy_daemon::{Settings, listen_for_signals};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::debug;

/// github-proxy - serve GitHub through a mirror on this machine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML or YAML)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// TLS certificate path [default: github.com.pem]
    #[arg(long = "cert-file")]
    cert_file: Option<PathBuf>,

    /// TLS private key path [default: github.com-key.pem]
    #[arg(long = "key-file")]
    key_file: Option<PathBuf>,

    /// Mirror base URL [default: https://mirror.ghproxy.com]
    #[arg(long = "proxy")]
    proxy: Option<String>,

    /// Address to listen on [default: 0.0.0.0:443]
    #[arg(long = "listen")]
    listen: Option<SocketAddr>,

    /// Hosts file to edit [default: the system hosts file]
    #[arg(long = "hosts-file")]
    hosts_file: Option<PathBuf>,

    /// Log level when RUST_LOG is unset [default: info]
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Seconds to wait for in-flight requests on shutdown [default: 5]
    #[arg(long = "shutdown-timeout")]
    shutdown_timeout: Option<u64>,
}

impl Cli {
    /// Flags win over the file and the environment
    fn apply(self, settings: &mut Settings) {
        if let Some(cert_file) = self.cert_file {
            settings.server.cert_file = cert_file;
        }
        if let Some(key_file) = self.key_file {
            settings.server.key_file = key_file;
        }
        if let Some(proxy) = self.proxy {
            settings.proxy.target = proxy;
        }
        if let Some(listen) = self.listen {
            settings.server.listen = listen;
        }
        if let Some(hosts_file) = self.hosts_file {
            settings.hosts.file = hosts_file;
        }
        if let Some(log_level) = self.log_level {
            settings.log_level = log_level;
        }
        if let Some(secs) = self.shutdown_timeout {
            settings.server.shutdown_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    settings.validate()?;

    // Initialize instrumentation
    let instrumentation_config = InstrumentationConfig {
        service_name: "github-proxy".to_string(),
        service_version: env!("CARGO_PKG_VERSION").to_string(),
        ..InstrumentationConfig::default()
    }
    .with_log_level(settings.log_level.clone());
    init_tracing(&instrumentation_config)?;

    // Handlers go in before the hosts file is touched
    let signals = listen_for_signals()?;
    let hosts_file = HostsFile::load(settings.hosts.file.clone()).await?;

    if let Some(signal) = github_proxy_daemon::run(settings, hosts_file, signals).await? {
        debug!("exiting on {}", signal);
    }

    Ok(())
}
