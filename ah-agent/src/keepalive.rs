//! Keepalive & Reaper (§4.6), grounded on the original's periodic
//! `AHClient::onTimeout` re-announce loop
//! (`examples/original_source/src/ahclient.cpp`): on each tick, re-announces
//! this agent's own arrival and probes every live peer with an
//! `nd-keepalive` interest, reaping any peer that fails to answer.

use crate::engine::DiscoveryEngine;
use ah_common::name::{build_discovery_name, DiscoveryVerb};
use ah_common::packet::Interest;
use ah_transport::FaceEvent;
use log::{debug, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const KEEPALIVE_INTEREST_LIFETIME_MS: u32 = 30_000;

/// Drives the periodic re-announce + peer-liveness sweep.
pub struct KeepaliveReaper {
    engine: Arc<DiscoveryEngine>,
    interval: Duration,
}

impl KeepaliveReaper {
    pub fn new(engine: Arc<DiscoveryEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Runs the tick loop until cancelled. Intended to be spawned as its own
    /// task by the agent's lifecycle (§5).
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(&self) {
        debug!("keepalive tick");
        self.engine.emit_arrival().await;

        let peers = self.engine.peers();
        let live: Vec<_> = {
            let table = peers.lock().await;
            let mut entries = Vec::new();
            table.visit_live(|e| entries.push(e.clone()));
            entries
        };

        for peer in live {
            let dest = SocketAddr::new(std::net::IpAddr::V4(peer.ip), peer.port);
            let name = build_discovery_name(
                &peer.prefix,
                DiscoveryVerb::NdKeepalive,
                peer.ip,
                peer.port,
                &peer.prefix,
            );
            let interest = Interest::new(name).with_lifetime(KEEPALIVE_INTEREST_LIFETIME_MS).with_must_be_fresh(true);

            let alive = match self.engine.send_keepalive(dest, interest).await {
                Ok(FaceEvent::Data(_)) => true,
                Ok(FaceEvent::Nack(_)) | Ok(FaceEvent::Timeout) | Err(_) => false,
            };

            if !alive {
                warn!("peer {} failed keepalive, reaping", peer.prefix);
                let mut table = peers.lock().await;
                if table.remove_by_prefix(&peer.prefix).is_some() {
                    drop(table);
                    self.engine.metrics().peers_removed.increment();
                    self.engine.teardown_peer(peer.face_id, &peer.prefix).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_interest_uses_expected_lifetime_and_freshness() {
        let name = ah_common::name::Name::from_string("/node-b/nd-keepalive");
        let interest = Interest::new(name).with_lifetime(KEEPALIVE_INTEREST_LIFETIME_MS).with_must_be_fresh(true);
        assert_eq!(interest.lifetime_ms, 30_000);
        assert!(interest.must_be_fresh);
    }
}
