//! Multicast Bootstrap (§4.3), grounded on the original's `MulticastInterest`
//! class (`examples/original_source/src/multicast.cpp`): discover
//! multi-access faces, register the broadcast prefix on each, set the
//! multicast strategy, and gate outgoing multicast interests until ready.

use crate::fcc::{Fcc, LinkType, DEFAULT_ROUTE_COST, MULTICAST_ROUTE_EXPIRATION_MS, MULTICAST_STRATEGY};
use ah_common::name::Name;
use ah_common::packet::{Interest, ROUTE_FLAG_CHILD_INHERIT};
use ah_transport::{Face, FaceEvent};
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The multicast bootstrap state machine (§4.3). `ready` and `error` are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbState {
    Querying,
    Registering,
    Setting,
    Ready,
    Error,
}

struct Inner {
    state: MbState,
}

/// Coordinates the broadcast prefix's registration across every
/// multi-access face so the Discovery Engine doesn't race the multicast
/// route being in place.
pub struct MulticastBootstrap {
    fcc: Arc<Fcc>,
    face: Arc<Face>,
    broadcast_prefix: Name,
    inner: RwLock<Inner>,
}

impl MulticastBootstrap {
    pub fn new(fcc: Arc<Fcc>, face: Arc<Face>, broadcast_prefix: Name) -> Self {
        Self {
            fcc,
            face,
            broadcast_prefix,
            inner: RwLock::new(Inner { state: MbState::Querying }),
        }
    }

    pub async fn state(&self) -> MbState {
        self.inner.read().await.state
    }

    pub async fn is_ready(&self) -> bool {
        matches!(self.state().await, MbState::Ready)
    }

    /// Drives the bootstrap to completion (`Ready` or `Error`). Idempotent:
    /// calling `reset` again after `Ready` re-runs the fan-out, which the
    /// forwarder is expected to tolerate by reporting `FACE_EXISTS`-style
    /// success for routes that already exist (§8 round-trip property).
    pub async fn reset(&self) -> MbState {
        self.transition(MbState::Querying).await;

        let faces = match self.fcc.face_query(true).await {
            Ok(faces) => faces,
            Err(e) => {
                warn!("multicast bootstrap: face query failed: {e}");
                return self.transition(MbState::Error).await;
            }
        };

        if faces.is_empty() {
            warn!("multicast bootstrap: no multi-access faces available");
            return self.transition(MbState::Error).await;
        }
        debug_assert!(faces.iter().all(|f| f.link_type == LinkType::MultiAccess));

        self.transition(MbState::Registering).await;

        let mut success = 0usize;
        let mut failure = 0usize;
        for face in &faces {
            match self
                .fcc
                .rib_register(
                    &self.broadcast_prefix,
                    face.face_id,
                    DEFAULT_ROUTE_COST,
                    ROUTE_FLAG_CHILD_INHERIT,
                    Some(MULTICAST_ROUTE_EXPIRATION_MS),
                )
                .await
            {
                Ok(()) => success += 1,
                Err(e) => {
                    warn!("multicast bootstrap: rib_register on face {} failed: {e}", face.face_id);
                    failure += 1;
                }
            }
        }
        let _ = failure;

        if success == 0 {
            return self.transition(MbState::Error).await;
        }

        self.transition(MbState::Setting).await;

        match self
            .fcc
            .strategy_set(&self.broadcast_prefix, &Name::from_string(MULTICAST_STRATEGY))
            .await
        {
            Ok(()) => {
                info!("multicast bootstrap ready on {} face(s)", success);
                self.transition(MbState::Ready).await
            }
            Err(e) => {
                warn!("multicast bootstrap: strategy_set failed: {e}");
                self.transition(MbState::Error).await
            }
        }
    }

    async fn transition(&self, state: MbState) -> MbState {
        self.inner.write().await.state = state;
        state
    }

    /// Forwards `interest` to the broadcast prefix via the underlying
    /// messaging face — but only once `Ready` (§4.3). Prior to `Ready`
    /// this fails fast with "not ready" and drops the state machine into
    /// `Error`, discouraging the caller from retrying blindly.
    pub async fn express_interest(&self, dest: SocketAddr, interest: Interest) -> Result<FaceEvent> {
        if !self.is_ready().await {
            self.transition(MbState::Error).await;
            return Err(anyhow!("multicast bootstrap not ready"));
        }
        self.face.express_interest(dest, interest).await
    }
}
