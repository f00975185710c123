//! The UDP-backed `Face`: NDN's analogue of a socket, generalized from the
//! teacher's QUIC `Face` (`express_interest` via a `oneshot` channel keyed by
//! name, a background receive loop, `send_data`/`close`) onto a single
//! `tokio::net::UdpSocket` shared by every peer and the local forwarder.

use ah_common::error::Error as CommonError;
use ah_common::metrics::AgentMetrics;
use ah_common::name::Name;
use ah_common::packet::{peek_kind, Data, Interest, Nack, NackReason, PacketKind};
use anyhow::{anyhow, Context, Result};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

/// Outcome of an `express_interest` call.
#[derive(Debug, Clone)]
pub enum FaceEvent {
    Data(Data),
    Nack(NackReason),
    Timeout,
}

/// An inbound Interest the face couldn't match to a pending request,
/// forwarded to whoever registered as the interest handler (the Discovery
/// Engine and Forwarder Control Client's listening prefixes, per §4.10).
#[derive(Debug, Clone)]
pub struct IncomingInterest {
    pub from: SocketAddr,
    pub interest: Interest,
}

type PendingKey = (Name, u32);
type PendingMap = Arc<Mutex<HashMap<PendingKey, oneshot::Sender<FaceEvent>>>>;

/// A UDP-socket-backed request/response face.
///
/// Owns a single socket; `express_interest` multiplexes outstanding
/// requests over it via a pending-interest table, and a background task
/// demultiplexes inbound datagrams by packet kind and, for Data/Nack, by
/// `(name, nonce)` against that table. Unmatched Interests are forwarded to
/// a channel the caller installs with [`Face::set_interest_handler`].
#[derive(Debug)]
pub struct Face {
    socket: Arc<UdpSocket>,
    pending: PendingMap,
    interest_tx: Arc<Mutex<Option<mpsc::Sender<IncomingInterest>>>>,
    closed: Arc<AtomicBool>,
    metrics: Arc<AgentMetrics>,
}

impl Face {
    /// Binds a new face to `local_addr` and spawns its receive loop.
    pub async fn bind(local_addr: SocketAddr, metrics: Arc<AgentMetrics>) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .with_context(|| format!("binding messaging face to {local_addr}"))?;

        let face = Self {
            socket: Arc::new(socket),
            pending: Arc::new(Mutex::new(HashMap::new())),
            interest_tx: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
            metrics,
        };

        face.spawn_receive_loop();
        Ok(face)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Installs the channel unmatched inbound Interests are forwarded to.
    pub async fn set_interest_handler(&self, tx: mpsc::Sender<IncomingInterest>) {
        *self.interest_tx.lock().await = Some(tx);
    }

    /// Sends `interest` to `dest` and resolves to exactly one of
    /// `Data`/`Nack`/`Timeout`, enforced with `tokio::time::timeout` over
    /// `interest.lifetime()` (§4.10, §5).
    pub async fn express_interest(&self, dest: SocketAddr, interest: Interest) -> Result<FaceEvent> {
        if self.closed.load(Ordering::Acquire) {
            return Err(anyhow!("face is closed"));
        }

        let key = interest.pending_key();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.clone(), tx);

        let bytes = interest.encode().map_err(map_common_err)?;
        self.socket.send_to(&bytes, dest).await?;
        self.metrics.interests_sent.increment();
        trace!("sent interest {} to {dest}", interest.name);

        let lifetime = interest.lifetime();
        let outcome = match timeout(lifetime, rx).await {
            Ok(Ok(event)) => {
                match &event {
                    FaceEvent::Data(_) => self.metrics.interests_satisfied.increment(),
                    FaceEvent::Nack(_) => self.metrics.interests_nacked.increment(),
                    FaceEvent::Timeout => self.metrics.interests_timed_out.increment(),
                }
                event
            }
            Ok(Err(_)) => {
                // Sender dropped without a reply; treat like a timeout.
                self.metrics.interests_timed_out.increment();
                FaceEvent::Timeout
            }
            Err(_) => {
                self.metrics.interests_timed_out.increment();
                FaceEvent::Timeout
            }
        };

        self.pending.lock().await.remove(&key);
        Ok(outcome)
    }

    /// Sends a Data packet in response to an inbound interest.
    pub async fn put_data(&self, dest: SocketAddr, data: Data) -> Result<()> {
        let bytes = data.encode().map_err(map_common_err)?;
        self.socket.send_to(&bytes, dest).await?;
        trace!("sent data {} to {dest}", data.name);
        Ok(())
    }

    /// Sends a Nack in response to an inbound interest.
    pub async fn put_nack(&self, dest: SocketAddr, interest: Interest, reason: NackReason) -> Result<()> {
        let nack = Nack::new(interest, reason);
        self.socket.send_to(&nack.encode(), dest).await?;
        Ok(())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn spawn_receive_loop(&self) {
        let socket = Arc::clone(&self.socket);
        let pending = Arc::clone(&self.pending);
        let interest_tx = Arc::clone(&self.interest_tx);
        let closed = Arc::clone(&self.closed);

        tokio::spawn(async move {
            let mut buf = vec![0u8; ah_common::packet::MAX_PACKET_SIZE];
            loop {
                if closed.load(Ordering::Acquire) {
                    break;
                }

                let (len, from) = match socket.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("messaging face recv error: {e}");
                        continue;
                    }
                };

                let bytes = &buf[..len];
                match peek_kind(bytes) {
                    Some(PacketKind::Data) => match Data::decode(bytes) {
                        Ok(data) => {
                            dispatch_reply(&pending, data.name.clone(), None, FaceEvent::Data(data)).await;
                        }
                        Err(e) => debug!("discarding malformed data from {from}: {e}"),
                    },
                    Some(PacketKind::Nack) => {
                        let mut cursor = bytes::Bytes::copy_from_slice(bytes);
                        match ah_common::tlv::TlvElement::decode(&mut cursor).and_then(|el| Nack::from_tlv(&el))
                        {
                            Ok(nack) => {
                                let name = nack.interest.name.clone();
                                let nonce = nack.interest.nonce;
                                dispatch_reply(&pending, name, Some(nonce), FaceEvent::Nack(nack.reason)).await;
                            }
                            Err(e) => debug!("discarding malformed nack from {from}: {e}"),
                        }
                    }
                    Some(PacketKind::Interest) => match Interest::decode(bytes) {
                        Ok(interest) => {
                            let maybe_tx = interest_tx.lock().await.clone();
                            if let Some(tx) = maybe_tx {
                                let _ = tx.send(IncomingInterest { from, interest }).await;
                            } else {
                                debug!("no interest handler installed, dropping interest from {from}");
                            }
                        }
                        Err(e) => debug!("discarding malformed interest from {from}: {e}"),
                    },
                    None => debug!("discarding undecodable datagram from {from}"),
                }
            }
        });
    }
}

async fn dispatch_reply(pending: &PendingMap, name: Name, nonce: Option<u32>, event: FaceEvent) {
    let mut pending = pending.lock().await;
    let key = match nonce {
        Some(n) => (name, n),
        // Data packets don't carry the interest's nonce on the wire; match
        // on name alone by scanning for the single matching entry.
        None => match pending.keys().find(|(n, _)| *n == name).cloned() {
            Some(k) => k,
            None => return,
        },
    };

    if let Some(tx) = pending.remove(&key) {
        let _ = tx.send(event);
    }
}

fn map_common_err(e: CommonError) -> anyhow::Error {
    anyhow!(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ah_common::name::Name;
    use std::time::Duration as StdDuration;

    async fn bind_face() -> Face {
        Face::bind("127.0.0.1:0".parse().unwrap(), Arc::new(AgentMetrics::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn express_interest_times_out_with_no_responder() {
        let face = bind_face().await;
        let dest = "127.0.0.1:1".parse().unwrap();
        let interest = Interest::new(Name::from_string("/no/responder")).with_lifetime(50);
        let event = face.express_interest(dest, interest).await.unwrap();
        assert!(matches!(event, FaceEvent::Timeout));
        assert_eq!(face.metrics.interests_timed_out.value(), 1);
    }

    #[tokio::test]
    async fn express_interest_resolves_with_reply_data() {
        let responder = bind_face().await;
        let requester = bind_face().await;
        let responder_addr = responder.local_addr().unwrap();

        let interest = Interest::new(Name::from_string("/peer/nd-info")).with_lifetime(2000);
        let name = interest.name.clone();

        let responder = Arc::new(responder);
        let (tx, mut rx) = mpsc::channel(1);
        responder.set_interest_handler(tx).await;

        let responder_clone = Arc::clone(&responder);
        let requester_addr = requester.local_addr().unwrap();
        tokio::spawn(async move {
            let incoming = rx.recv().await.unwrap();
            let data = Data::empty(incoming.interest.name.clone());
            responder_clone.put_data(incoming.from, data).await.unwrap();
        });

        let event = tokio::time::timeout(
            StdDuration::from_secs(1),
            requester.express_interest(responder_addr, interest),
        )
        .await
        .unwrap()
        .unwrap();

        match event {
            FaceEvent::Data(data) => assert_eq!(data.name, name),
            other => panic!("expected Data, got {other:?}"),
        }
        let _ = requester_addr;
    }
}
