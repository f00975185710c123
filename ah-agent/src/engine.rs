//! Discovery Engine (§4.5), grounded on the original's `AHClient` class
//! (`examples/original_source/src/ahclient.cpp`): owns the local listening
//! prefixes, decodes and answers arrival/departure/info interests, and
//! drives face + route creation for newly-seen peers.

use crate::fcc::Fcc;
use crate::multicast::MulticastBootstrap;
use crate::peer_table::PeerTable;
use crate::retry::{fixed_backoff_3s, linear_backoff_3s, retry_with_backoff, Outcome};
use crate::status;
use ah_common::keychain::KeyChain;
use ah_common::metrics::AgentMetrics;
use ah_common::name::{build_discovery_name, decode_discovery_name, DiscoveryVerb, Name};
use ah_common::packet::Data;
use ah_transport::{Face, FaceEvent, IncomingInterest};
use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, warn};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::Mutex;

const PING_PAYLOAD: &[u8; 5] = b"pong!";
const ACK_FRESHNESS_MS: u32 = 4000;
const SEND_DATA_MAX_ATTEMPTS: u32 = 4;

/// The peer-lifecycle engine (§4.5).
pub struct DiscoveryEngine {
    face: Arc<Face>,
    fcc: Arc<Fcc>,
    multicast: Arc<MulticastBootstrap>,
    peers: Arc<Mutex<PeerTable>>,
    own_prefix: Name,
    broadcast_prefix: Name,
    local_ip: Ipv4Addr,
    local_port: u16,
    forwarder_port: u16,
    keychain: Arc<dyn KeyChain>,
    metrics: Arc<AgentMetrics>,
}

impl DiscoveryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        face: Arc<Face>,
        fcc: Arc<Fcc>,
        multicast: Arc<MulticastBootstrap>,
        peers: Arc<Mutex<PeerTable>>,
        own_prefix: Name,
        broadcast_prefix: Name,
        local_ip: Ipv4Addr,
        local_port: u16,
        forwarder_port: u16,
        keychain: Arc<dyn KeyChain>,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        Self {
            face,
            fcc,
            multicast,
            peers,
            own_prefix,
            broadcast_prefix,
            local_ip,
            local_port,
            forwarder_port,
            keychain,
            metrics,
        }
    }

    pub fn peers(&self) -> Arc<Mutex<PeerTable>> {
        Arc::clone(&self.peers)
    }

    pub fn fcc(&self) -> &Fcc {
        &self.fcc
    }

    pub fn metrics(&self) -> &Arc<AgentMetrics> {
        &self.metrics
    }

    /// Sends a direct (unicast) interest to a known peer, e.g. the
    /// Keepalive & Reaper's `nd-keepalive` probe (§4.6).
    pub async fn send_keepalive(&self, dest: SocketAddr, interest: ah_common::packet::Interest) -> Result<FaceEvent> {
        self.face.express_interest(dest, interest).await
    }

    /// `pier-status <id>` (§4.8): unicasts an `nd-status` interest to the
    /// given peer and returns its decoded JSON body.
    pub async fn query_pier_status(&self, peer: &crate::peer_table::PeerEntry) -> Result<serde_json::Value> {
        let dest = SocketAddr::new(std::net::IpAddr::V4(peer.ip), peer.port);
        let name = build_discovery_name(&peer.prefix, DiscoveryVerb::NdStatus, peer.ip, peer.port, &peer.prefix);
        let interest = ah_common::packet::Interest::new(name).with_lifetime(4000).with_must_be_fresh(true);

        match self.face.express_interest(dest, interest).await? {
            FaceEvent::Data(data) => {
                serde_json::from_slice(&data.content).context("decoding pier-status response")
            }
            FaceEvent::Nack(_) => Err(anyhow::anyhow!("pier-status request was NACKed")),
            FaceEvent::Timeout => Err(anyhow::anyhow!("pier-status request timed out")),
        }
    }

    /// Registers one of this agent's own listening prefixes against the
    /// local forwarder, retrying at a fixed 3s backoff on failure (§4.9,
    /// §7 kind 2). A `face_id` of 0 asks the forwarder to route to whatever
    /// face the command interest itself arrived on.
    pub async fn register_local_prefix(&self, prefix: &Name) -> Result<()> {
        let prefix = prefix.clone();
        retry_with_backoff(
            |_attempt| {
                let prefix = prefix.clone();
                async move {
                    match self.fcc.rib_register_default(&prefix, 0).await {
                        Ok(()) => Outcome::Success(()),
                        Err(e) => {
                            warn!("registering local prefix {prefix} failed, retrying: {e}");
                            Outcome::Retry
                        }
                    }
                }
            },
            fixed_backoff_3s,
        )
        .await
        .context("registering local prefix (never succeeded)")
    }

    /// Emits an arrival interest on the broadcast prefix (startup and every
    /// keepalive tick, §4.5/§4.6).
    pub async fn emit_arrival(&self) {
        self.emit_broadcast(DiscoveryVerb::Arrival).await;
    }

    /// Emits a departure interest on the broadcast prefix (shutdown, §4.9).
    pub async fn emit_departure(&self) {
        self.emit_broadcast(DiscoveryVerb::Departure).await;
    }

    async fn emit_broadcast(&self, verb: DiscoveryVerb) {
        let name = build_discovery_name(&self.broadcast_prefix, verb, self.local_ip, self.local_port, &self.own_prefix);
        let interest = ah_common::packet::Interest::new(name)
            .with_can_be_prefix(true)
            .with_lifetime(4000);

        let forwarder_addr = self.forwarder_addr();
        match self.multicast.express_interest(forwarder_addr, interest).await {
            Ok(_) => debug!("emitted {verb:?} on broadcast prefix"),
            Err(e) => warn!("failed to emit {verb:?}: {e}"),
        }
    }

    fn forwarder_addr(&self) -> SocketAddr {
        // The broadcast/arrival interest is forwarded by the local
        // forwarder, which is always reachable via loopback on its own
        // configured port.
        SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), self.forwarder_port)
    }

    /// Dispatches one inbound interest, demultiplexing on its decoded verb
    /// (§4.5 "Response protocol").
    pub async fn handle_incoming(&self, incoming: IncomingInterest) {
        let IncomingInterest { from, interest } = incoming;

        let decoded = match decode_discovery_name(&interest.name) {
            Ok(d) => d,
            Err(e) => {
                debug!("discarding malformed discovery name: {e}");
                return;
            }
        };

        let send_back = self.broadcast_prefix.is_prefix_of(&interest.name);

        match decoded.verb {
            DiscoveryVerb::Arrival | DiscoveryVerb::NdInfo => {
                self.handle_pier_interest(from, &interest, decoded, send_back).await;
            }
            DiscoveryVerb::Departure => {
                self.handle_departure(decoded).await;
            }
            DiscoveryVerb::NdKeepalive => {
                self.respond_empty(from, &interest).await;
            }
            DiscoveryVerb::Ping => {
                self.respond(from, &interest, Bytes::from_static(PING_PAYLOAD)).await;
            }
            DiscoveryVerb::NdStatus => {
                self.respond_status(from, &interest).await;
            }
        }
    }

    async fn handle_departure(&self, decoded: ah_common::name::DiscoveryName) {
        let mut peers = self.peers.lock().await;
        if let Some(entry) = peers.remove_by_prefix(&decoded.prefix) {
            drop(peers);
            self.metrics.peers_removed.increment();
            self.teardown_peer(entry.face_id, &entry.prefix).await;
        }
    }

    /// §4.5 policy: ack first, then (unless self-echo) create-face +
    /// register-route for a new peer, or just unicast back for a known one.
    async fn handle_pier_interest(
        &self,
        from: SocketAddr,
        interest: &ah_common::packet::Interest,
        decoded: ah_common::name::DiscoveryName,
        send_back: bool,
    ) {
        self.respond_empty(from, interest).await;

        if decoded.ip == self.local_ip {
            return; // self-echo
        }

        let (_, is_new) =
            self.peers.lock().await.insert_or_get(decoded.prefix.clone(), decoded.ip, decoded.port);

        match is_new {
            true => {
                self.metrics.peers_added.increment();

                if let Some(face_id) = self.create_face_and_register(decoded.ip, decoded.port, &decoded.prefix).await {
                    self.peers.lock().await.mark_face(&decoded.prefix, face_id);
                    if send_back {
                        self.send_data_back(decoded.ip, decoded.port, &decoded.prefix).await;
                    }
                } else {
                    // Bootstrap of this peer never succeeded; drop it so a
                    // later arrival can retry from scratch.
                    self.peers.lock().await.remove_by_prefix(&decoded.prefix);
                }
            }
            false if send_back => {
                self.send_data_back(decoded.ip, decoded.port, &decoded.prefix).await;
            }
            false => {}
        }
    }

    /// face_create precedes rib_register, strictly; each retries at a fixed
    /// 3s backoff on failure (§4.5). Returns the face id on success.
    async fn create_face_and_register(&self, ip: Ipv4Addr, port: u16, prefix: &Name) -> Option<u64> {
        let uri = crate::fcc::udp_face_uri(SocketAddr::new(std::net::IpAddr::V4(ip), port));

        let face_id = retry_with_backoff(
            |_attempt| {
                let uri = uri.clone();
                async move {
                    match self.fcc.face_create(&uri).await {
                        Ok(id) => Outcome::Success(id),
                        Err(e) => {
                            warn!("face_create({uri}) failed, retrying: {e}");
                            Outcome::Retry
                        }
                    }
                }
            },
            fixed_backoff_3s,
        )
        .await?;

        self.metrics.faces_created.increment();

        let registered = retry_with_backoff(
            |_attempt| async move {
                match self.fcc.rib_register_default(prefix, face_id).await {
                    Ok(()) => Outcome::Success(()),
                    Err(e) => {
                        warn!("rib_register({prefix}) on face {face_id} failed, retrying: {e}");
                        Outcome::Retry
                    }
                }
            },
            fixed_backoff_3s,
        )
        .await;

        if registered.is_some() {
            self.metrics.routes_registered.increment();
            Some(face_id)
        } else {
            None
        }
    }

    /// Symmetric "send data back" step: unicasts an `nd-info` interest
    /// carrying this agent's own identity, retried up to 4 times at
    /// `3*attempt`s; on exhaustion the peer is torn down (§4.5).
    async fn send_data_back(&self, ip: Ipv4Addr, port: u16, prefix: &Name) {
        let dest = SocketAddr::new(std::net::IpAddr::V4(ip), port);
        let name = build_discovery_name(prefix, DiscoveryVerb::NdInfo, self.local_ip, self.local_port, &self.own_prefix);

        let result = retry_with_backoff(
            |attempt| {
                let interest = ah_common::packet::Interest::new(name.clone()).with_lifetime(4000);
                async move {
                    if attempt > SEND_DATA_MAX_ATTEMPTS {
                        return Outcome::Abandon;
                    }
                    match self.face.express_interest(dest, interest).await {
                        Ok(FaceEvent::Data(_)) => Outcome::Success(()),
                        Ok(FaceEvent::Nack(_)) | Ok(FaceEvent::Timeout) | Err(_) => Outcome::Retry,
                    }
                }
            },
            linear_backoff_3s,
        )
        .await;

        if result.is_none() {
            warn!("send-data-back to {dest} exhausted retries, tearing down peer {prefix}");
            if let Some(entry) = self.peers.lock().await.remove_by_prefix(prefix) {
                self.metrics.peers_removed.increment();
                self.teardown_peer(entry.face_id, &entry.prefix).await;
            }
        }
    }

    /// Unregisters the route and destroys the face for a departed/dead
    /// peer. Errors here are logged and abandoned — the forwarder may
    /// already have cleaned these up itself (§4.6).
    pub async fn teardown_peer(&self, face_id: u64, prefix: &Name) {
        if face_id == 0 {
            return;
        }
        if let Err(e) = self.fcc.rib_unregister(prefix, face_id).await {
            warn!("rib_unregister({prefix}, {face_id}) failed: {e}");
        } else {
            self.metrics.routes_unregistered.increment();
        }
        if let Err(e) = self.fcc.face_destroy(face_id).await {
            warn!("face_destroy({face_id}) failed: {e}");
        } else {
            self.metrics.faces_destroyed.increment();
        }
    }

    async fn respond_empty(&self, dest: SocketAddr, interest: &ah_common::packet::Interest) {
        self.respond(dest, interest, Bytes::new()).await;
    }

    async fn respond(&self, dest: SocketAddr, interest: &ah_common::packet::Interest, content: Bytes) {
        let data = Data::new(interest.name.clone(), content).with_freshness(ACK_FRESHNESS_MS);
        let signature = self.keychain.sign(&data.signed_portion());
        let data = data.with_signature(signature.as_bytes().clone());
        if let Err(e) = self.face.put_data(dest, data).await {
            warn!("failed to send response to {dest}: {e}");
        }
    }

    async fn respond_status(&self, dest: SocketAddr, interest: &ah_common::packet::Interest) {
        match status::build_status(&self.fcc, &self.metrics).await {
            Ok(json) => {
                let bytes = Bytes::from(serde_json::to_vec(&json).unwrap_or_default());
                self.respond(dest, interest, bytes).await;
            }
            Err(e) => warn!("failed to build status for nd-status reply: {e}"),
        }
    }
}
