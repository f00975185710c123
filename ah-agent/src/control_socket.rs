//! Control Socket (§4.8), grounded in structure on
//! `examples/isalcedo-FamilyCom/crates/familycomd/src/ipc_server.rs`'s
//! `UnixListener`/per-client-task accept loop, adapted to this agent's own
//! line-command-in/NUL-terminated-reply-out protocol and a hard cap on
//! concurrent clients instead of that server's broadcast/subscribe model.

use crate::engine::DiscoveryEngine;
use ah_common::metrics::AgentMetrics;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Local stream-socket server dispatching `status`/`piers`/`pier-status
/// <id>`/`exit` commands to the Discovery Engine and Status Reporter.
pub struct ControlSocket {
    socket_path: PathBuf,
    listener: UnixListener,
    engine: Arc<DiscoveryEngine>,
    metrics: Arc<AgentMetrics>,
    max_clients: usize,
    active_clients: Arc<AtomicUsize>,
}

impl ControlSocket {
    pub async fn bind(
        socket_path: &Path,
        engine: Arc<DiscoveryEngine>,
        metrics: Arc<AgentMetrics>,
        max_clients: usize,
    ) -> Result<Self> {
        if socket_path.exists() {
            info!("removing stale control socket at {}", socket_path.display());
            std::fs::remove_file(socket_path)
                .with_context(|| format!("removing stale socket at {}", socket_path.display()))?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("binding control socket at {}", socket_path.display()))?;
        info!("control socket listening at {}", socket_path.display());

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            engine,
            metrics,
            max_clients,
            active_clients: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Runs the accept loop until cancelled (§5 "Local I/O" failures close
    /// the offending slot and keep running).
    pub async fn accept_loop(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    if self.active_clients.fetch_add(1, Ordering::SeqCst) >= self.max_clients {
                        self.active_clients.fetch_sub(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            let mut stream = stream;
                            let _ = stream.write_all(b"CONNECT REJECTED\0").await;
                        });
                        continue;
                    }

                    self.metrics.control_clients_active.set(self.active_clients.load(Ordering::SeqCst) as u64);

                    let engine = Arc::clone(&self.engine);
                    let metrics = Arc::clone(&self.metrics);
                    let active_clients = Arc::clone(&self.active_clients);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, &engine, &metrics).await {
                            debug!("control socket client disconnected: {e}");
                        }
                        let remaining = active_clients.fetch_sub(1, Ordering::SeqCst) - 1;
                        metrics.control_clients_active.set(remaining as u64);
                    });
                }
                Err(e) => {
                    warn!("failed to accept control socket connection: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("failed to remove control socket at {}: {e}", self.socket_path.display());
            }
        }
    }
}

async fn handle_client(stream: UnixStream, engine: &Arc<DiscoveryEngine>, metrics: &Arc<AgentMetrics>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(());
        }
        let command = line.trim();

        match dispatch(command, engine, metrics).await {
            Dispatch::Reply(bytes) => {
                writer.write_all(&bytes).await?;
                writer.write_all(b"\0").await?;
            }
            Dispatch::Goodbye => {
                writer.write_all(b"GOODBYE!\0").await?;
                return Ok(());
            }
        }
    }
}

enum Dispatch {
    Reply(Vec<u8>),
    Goodbye,
}

async fn dispatch(command: &str, engine: &Arc<DiscoveryEngine>, metrics: &Arc<AgentMetrics>) -> Dispatch {
    if command == "exit" {
        return Dispatch::Goodbye;
    }

    if command == "status" {
        return Dispatch::Reply(render_status(engine, metrics).await);
    }

    if command == "piers" {
        return Dispatch::Reply(render_piers(engine).await);
    }

    if let Some(rest) = command.strip_prefix("pier-status ") {
        return Dispatch::Reply(render_pier_status(rest.trim(), engine, metrics).await);
    }

    Dispatch::Reply(b"ERROR: Invalid command".to_vec())
}

async fn render_status(engine: &Arc<DiscoveryEngine>, metrics: &Arc<AgentMetrics>) -> Vec<u8> {
    match crate::status::build_status(engine.fcc(), metrics).await {
        Ok(json) => serde_json::to_vec(&json).unwrap_or_default(),
        Err(e) => format!("ERROR: {e}").into_bytes(),
    }
}

async fn render_piers(engine: &Arc<DiscoveryEngine>) -> Vec<u8> {
    let peers = engine.peers();
    let entries: Vec<_> = {
        let table = peers.lock().await;
        let mut out = Vec::new();
        table.visit_all(|e| {
            out.push(json!({
                "id": e.id,
                "faceId": e.face_id,
                "prefix": e.prefix.to_string(),
                "ip": e.ip.to_string(),
                "port": e.port,
            }));
        });
        out
    };
    serde_json::to_vec(&json!(entries)).unwrap_or_default()
}

async fn render_pier_status(id_str: &str, engine: &Arc<DiscoveryEngine>, metrics: &Arc<AgentMetrics>) -> Vec<u8> {
    let id: u64 = match id_str.parse() {
        Ok(v) => v,
        Err(_) => return b"ERROR getting status".to_vec(),
    };

    if id == 0 {
        return render_status(engine, metrics).await;
    }

    let peer = engine.peers().lock().await.lookup_by_id(id);
    let Some(peer) = peer else {
        return b"ERROR getting status".to_vec();
    };

    match engine.query_pier_status(&peer).await {
        Ok(json) => serde_json::to_vec(&json).unwrap_or_default(),
        Err(_) => b"ERROR getting status".to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_parses_pier_status_argument() {
        assert_eq!("pier-status 42".strip_prefix("pier-status ").unwrap().trim(), "42");
    }
}
