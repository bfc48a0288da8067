use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use dohfwd::config::Config;
use dohfwd::error::ProxyError;
use dohfwd::proxy::Proxy;

#[derive(Parser)]
#[command(name = "dohfwd")]
#[command(about = "Forward UDP, TCP and DoT DNS queries to DNS-over-HTTPS upstreams", long_about = None)]
struct Args {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long)]
    listen: Option<std::net::IpAddr>,

    /// UDP port
    #[arg(long)]
    udp_port: Option<u16>,

    /// TCP port
    #[arg(long)]
    tcp_port: Option<u16>,

    /// DNS-over-TLS port
    #[arg(long)]
    dot_port: Option<u16>,

    /// Upstream request timeout in seconds
    #[arg(short, long)]
    timeout_secs: Option<u64>,

    /// Upstreams raced per query
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// PEM certificate chain for DoT
    #[arg(long)]
    tls_cert: Option<PathBuf>,

    /// PEM private key for DoT
    #[arg(long)]
    tls_key: Option<PathBuf>,

    /// DoH upstream URL (repeatable, replaces the configured list)
    #[arg(short, long = "upstream")]
    upstreams: Vec<String>,

    /// Enable verbose logging (per-query outcome, timing)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<Config, ProxyError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(ip) = self.listen {
            config.listen_ip = ip;
        }
        if let Some(port) = self.udp_port {
            config.udp_port = port;
        }
        if let Some(port) = self.tcp_port {
            config.tcp_port = port;
        }
        if let Some(port) = self.dot_port {
            config.dot_port = port;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if self.tls_cert.is_some() {
            config.tls_cert = self.tls_cert;
        }
        if self.tls_key.is_some() {
            config.tls_key = self.tls_key;
        }
        if !self.upstreams.is_empty() {
            config.upstreams = self.upstreams;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "dohfwd=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(config: Config) -> Result<(), ProxyError> {
    let proxy = Proxy::bind(&config).await?;
    proxy.run().await
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "DNS proxy stopped");
            ExitCode::FAILURE
        }
    }
}
