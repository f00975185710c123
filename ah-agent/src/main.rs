//! `ah-agentd` — per-host NDN peer-discovery and auto-routing agent (§4.9
//! Lifecycle). Wires together the Multicast Bootstrap, Discovery Engine,
//! Keepalive & Reaper, and Control Socket around a single messaging `Face`,
//! following the bootstrap/shutdown sequencing grounded on
//! `examples/original_source/src/nd-client.cpp`'s `Program` class and, for
//! the signal-driven shutdown this crate adds (§9 "Global mutable state"),
//! `examples/isalcedo-FamilyCom/crates/familycomd/src/main.rs`'s
//! spawn-a-ctrl_c-listener-that-feeds-a-channel pattern.

mod config;
mod control_socket;
mod engine;
mod fcc;
mod keepalive;
mod local_identity;
mod multicast;
mod peer_table;
mod retry;
mod status;

use ah_common::keychain::{HmacKeyChain, KeyChain};
use ah_common::metrics::AgentMetrics;
use ah_common::name::Name;
use ah_transport::Face;
use anyhow::{Context, Result};
use clap::Parser;
use config::{CliOverrides, Config};
use control_socket::ControlSocket;
use engine::DiscoveryEngine;
use fcc::Fcc;
use keepalive::KeepaliveReaper;
use log::{error, info, warn};
use multicast::{MbState, MulticastBootstrap};
use peer_table::PeerTable;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Per-host NDN peer-discovery and auto-routing agent.
#[derive(Parser, Debug)]
#[command(name = "ah-agentd", about = "Per-host NDN peer-discovery and auto-routing agent")]
struct Cli {
    /// This agent's own NDN name prefix, e.g. `/node-a`.
    own_prefix: Option<String>,

    /// Path to a TOML configuration file (default:
    /// `$XDG_CONFIG_HOME/ah-agent/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// UDP port the local forwarder listens on.
    #[arg(long)]
    forwarder_port: Option<u16>,

    /// Path to the control socket.
    #[arg(long)]
    control_socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        own_prefix: cli.own_prefix,
        config_path: cli.config,
        forwarder_port: cli.forwarder_port,
        control_socket_path: cli.control_socket.map(|p| p.to_string_lossy().into_owned()),
    };

    let config = match Config::load(&overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ah-agentd: configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_filter)).init();

    if let Err(e) = run(config).await {
        error!("ah-agentd exiting on error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    info!("starting ah-agentd for prefix {}", config.own_prefix);

    let local_ip = local_identity::detect_local_ipv4().context("detecting local IPv4 address")?;
    info!("detected local IPv4 address {local_ip}");

    let metrics = Arc::new(AgentMetrics::new());

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.forwarder_port);
    let face = Arc::new(
        Face::bind(bind_addr, Arc::clone(&metrics))
            .await
            .with_context(|| format!("binding messaging face to {bind_addr}"))?,
    );

    let keychain: Arc<dyn KeyChain> = Arc::new(
        HmacKeyChain::generate(key_locator_name(&config.own_prefix))
            .map_err(|_| anyhow::anyhow!("generating signing key"))?,
    );

    let forwarder_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.forwarder_port);
    let fcc = Arc::new(Fcc::new(Arc::clone(&face), forwarder_addr, keychain.clone()));

    let peers = Arc::new(Mutex::new(PeerTable::new()));

    let multicast = Arc::new(MulticastBootstrap::new(
        Arc::clone(&fcc),
        Arc::clone(&face),
        config.broadcast_prefix.clone(),
    ));

    let engine = Arc::new(DiscoveryEngine::new(
        Arc::clone(&face),
        Arc::clone(&fcc),
        Arc::clone(&multicast),
        Arc::clone(&peers),
        config.own_prefix.clone(),
        config.broadcast_prefix.clone(),
        local_ip,
        config.forwarder_port,
        config.forwarder_port,
        keychain,
        Arc::clone(&metrics),
    ));

    // Unmatched inbound Interests (arrival/departure/nd-info/nd-keepalive/
    // ping/nd-status) are forwarded here from the Face's receive loop and
    // dispatched one at a time onto the Discovery Engine (§4.10, §5).
    let (interest_tx, mut interest_rx) = mpsc::channel(256);
    face.set_interest_handler(interest_tx).await;
    let dispatch_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        while let Some(incoming) = interest_rx.recv().await {
            let engine = Arc::clone(&dispatch_engine);
            tokio::spawn(async move { engine.handle_incoming(incoming).await });
        }
    });

    // Bootstrap order (§4.9): nd-info, nd-keepalive, ping, nd-status, then
    // the broadcast prefix via Multicast Bootstrap, then the first arrival.
    engine
        .register_local_prefix(&prefix_with(&config.own_prefix, "nd-info"))
        .await
        .context("registering nd-info prefix")?;
    engine
        .register_local_prefix(&prefix_with(&config.own_prefix, "nd-keepalive"))
        .await
        .context("registering nd-keepalive prefix")?;
    engine
        .register_local_prefix(&prefix_with(&config.own_prefix, "ping"))
        .await
        .context("registering ping prefix")?;
    engine
        .register_local_prefix(&prefix_with(&config.own_prefix, "nd-status"))
        .await
        .context("registering nd-status prefix")?;

    match multicast.reset().await {
        MbState::Ready => info!("multicast bootstrap ready"),
        other => {
            // §7 kind 3: bootstrap-fatal. The node cannot serve its role
            // without multicast routing in place, so the process aborts.
            anyhow::bail!("multicast bootstrap ended in state {other:?}, aborting");
        }
    }

    engine.emit_arrival().await;

    let keepalive = Arc::new(KeepaliveReaper::new(
        Arc::clone(&engine),
        Duration::from_secs(config.keepalive_interval_secs),
    ));
    let keepalive_handle = tokio::spawn({
        let keepalive = Arc::clone(&keepalive);
        async move { keepalive.run().await }
    });

    let control_socket = ControlSocket::bind(
        &config.control_socket_path,
        Arc::clone(&engine),
        Arc::clone(&metrics),
        config.max_control_clients,
    )
    .await
    .context("binding control socket")?;
    let control_handle = tokio::spawn(async move { control_socket.accept_loop().await });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    engine.emit_departure().await;

    let live_peers: Vec<_> = {
        let table = peers.lock().await;
        let mut entries = Vec::new();
        table.visit_live(|e| entries.push((e.face_id, e.prefix.clone())));
        entries
    };
    let drain = async {
        for (face_id, prefix) in live_peers {
            engine.teardown_peer(face_id, &prefix).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        warn!("shutdown drain exceeded 5s, exiting anyway");
    }

    keepalive_handle.abort();
    control_handle.abort();

    log_shutdown_metrics(&metrics);
    info!("ah-agentd stopped");
    Ok(())
}

fn key_locator_name(own_prefix: &Name) -> Name {
    let mut name = own_prefix.clone();
    name.push_str("KEY");
    name
}

fn prefix_with(base: &Name, verb: &str) -> Name {
    let mut name = base.clone();
    name.push_str(verb);
    name
}

/// Resolves once SIGINT or SIGTERM is observed (§4.9, §9 "Global mutable
/// state"): confined to this one task rather than a process-wide flag set
/// from an async-signal-handler context.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn log_shutdown_metrics(metrics: &AgentMetrics) {
    info!(
        "final metrics: interests_sent={} interests_satisfied={} interests_nacked={} interests_timed_out={} \
         faces_created={} faces_destroyed={} routes_registered={} routes_unregistered={} peers_added={} \
         peers_removed={}",
        metrics.interests_sent.value(),
        metrics.interests_satisfied.value(),
        metrics.interests_nacked.value(),
        metrics.interests_timed_out.value(),
        metrics.faces_created.value(),
        metrics.faces_destroyed.value(),
        metrics.routes_registered.value(),
        metrics.routes_unregistered.value(),
        metrics.peers_added.value(),
        metrics.peers_removed.value(),
    );
}
