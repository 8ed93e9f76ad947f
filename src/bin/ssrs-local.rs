//! Accept-loop binary: the direct descendant of the teacher's
//! `examples/simple_socks5.rs`, wired to [`ssrs_local::tunnel::serve_connection`]
//! instead of a bare `io::copy_bidirectional`.
//!
//! CLI overrides (via `clap`) are merged on top of a TOML config file; the
//! library itself never reads a file or a flag, only the resulting
//! [`ssrs_local::config::Config`].

use anyhow::{Context, Result};
use clap::Parser;
use ssrs_local::config::Config;
use ssrs_local::{auth::NoAuth, env::Environment, server::Server, tunnel};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Client-side SOCKS5 front-end that tunnels TCP payload to an obfuscated,
/// optionally TLS-wrapped upstream.
#[derive(Parser, Debug)]
#[command(name = "ssrs-local", version, about)]
struct Cli {
    /// Path to a TOML config file providing the base configuration.
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long)]
    remote_host: Option<String>,

    #[arg(long)]
    remote_port: Option<u16>,

    #[arg(long)]
    listen_host: Option<String>,

    #[arg(long)]
    listen_port: Option<u16>,

    #[arg(long)]
    password: Option<String>,

    /// Wrap the upstream connection in TLS.
    #[arg(long)]
    over_tls: bool,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path).with_context(|| format!("loading config from {path}"))?,
        None => Config {
            remote_host: cli.remote_host.clone().context("remote_host required (no config file given)")?,
            remote_port: cli.remote_port.context("remote_port required (no config file given)")?,
            listen_host: "127.0.0.1".to_owned(),
            listen_port: 1080,
            udp: false,
            over_tls_enable: false,
            tls_sni: None,
            cipher_method: "rc4".to_owned(),
            protocol: "origin".to_owned(),
            obfs: "plain".to_owned(),
            password: cli.password.clone().unwrap_or_default(),
        },
    };

    if let Some(host) = &cli.remote_host {
        config.remote_host = host.clone();
    }
    if let Some(port) = cli.remote_port {
        config.remote_port = port;
    }
    if let Some(host) = &cli.listen_host {
        config.listen_host = host.clone();
    }
    if let Some(port) = cli.listen_port {
        config.listen_port = port;
    }
    if let Some(password) = &cli.password {
        config.password = password.clone();
    }
    if cli.over_tls {
        config.over_tls_enable = true;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let listen_addr = format!("{}:{}", config.listen_host, config.listen_port);

    let env = Environment::new(config);
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding listener on {listen_addr}"))?;
    let auth = Arc::new(NoAuth) as ssrs_local::AuthAdaptor<()>;
    let server = Server::from((listener, auth));

    tracing::info!(addr = %listen_addr, "listening");

    loop {
        tokio::select! {
            accepted = server.accept() => {
                let (conn, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(%err, "accept failed");
                        continue;
                    }
                };
                tracing::debug!(%peer, "accepted connection");
                let env = env.clone();
                tokio::spawn(async move {
                    tunnel::serve_connection(env, conn).await;
                });
            }
            _ = signal::ctrl_c() => {
                tracing::info!("shutting down, cancelling all live tunnels");
                env.registry.shutdown_all();
                break;
            }
        }
    }

    Ok(())
}
