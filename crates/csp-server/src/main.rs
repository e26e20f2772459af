//! csp-server - CSP violation reporting service
//!
//! Receives browser violation reports and keeps an audit log of them.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use csp_server::{CspServer, ServerConfig, shutdown_on};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    /// Human-readable output
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Parser)]
#[command(name = "csp-server")]
#[command(about = "CSP violation reporting service")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "CSP_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(short, long, env = "CSP_SERVER_BIND")]
    bind: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, env = "CSP_SERVER_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = match &cli.config {
        Some(path) => {
            info!(config = %path.display(), "loading config");
            ServerConfig::from_file(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config = config.with_bind_addr(bind);
    }

    info!(
        bind = %config.bind_addr,
        rate_limit = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window.as_secs(),
        report_only = config.csp.report_only,
        "starting csp-server"
    );

    let server = CspServer::new(config.clone())?;
    server
        .serve_with_shutdown(config.bind_addr, shutdown_on(tokio::signal::ctrl_c()))
        .await?;

    Ok(())
}
