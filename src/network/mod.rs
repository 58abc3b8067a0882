//! In-process network
//!
//! Nodes register by legal name and receive a [`SessionInit`] inbox. Opening
//! a session hands the far end to the counterparty's inbox, where the
//! node's dispatcher picks the responder for [`FlowKind`].

pub mod message;
pub mod session;

pub use message::{FlowKind, SessionMessage, SignatureResponse, TransferProposal};
pub use session::{Session, SessionError};

use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::identity::Party;

/// Far end of a newly opened session, delivered to the counterparty.
#[derive(Debug)]
pub struct SessionInit {
    pub flow: FlowKind,
    pub session: Session,
}

pub struct Network {
    peers: DashMap<String, mpsc::Sender<SessionInit>>,
    /// Sessions delivered per (counterparty, flow)
    opened: DashMap<(String, FlowKind), u64>,
    buffer: usize,
    timeout: Option<Duration>,
}

impl Network {
    /// `buffer` bounds every session direction; `timeout` applies to every receive.
    pub fn new(buffer: usize, timeout: Option<Duration>) -> Self {
        Self {
            peers: DashMap::new(),
            opened: DashMap::new(),
            buffer: buffer.max(1),
            timeout,
        }
    }

    /// Attach `party`, returning the inbox its dispatcher reads.
    pub fn register(&self, party: &Party) -> mpsc::Receiver<SessionInit> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.peers.insert(party.name().to_string(), tx);
        info!(party = %party, "Registered on network");
        rx
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.peers.contains_key(name)
    }

    /// Number of `flow` sessions delivered to `name` so far.
    pub fn sessions_opened(&self, name: &str, flow: FlowKind) -> u64 {
        self.opened
            .get(&(name.to_string(), flow))
            .map(|n| *n)
            .unwrap_or(0)
    }

    pub async fn open_session(
        &self,
        from: &Party,
        to: &Party,
        flow: FlowKind,
    ) -> Result<Session, SessionError> {
        // Clone the sender out so no map guard is held across the await
        let inbox = self
            .peers
            .get(to.name())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SessionError::UnknownPeer(to.name().to_string()))?;

        let (ours, theirs) = Session::pair(from.clone(), to.clone(), flow, self.buffer, self.timeout);
        inbox
            .send(SessionInit {
                flow,
                session: theirs,
            })
            .await
            .map_err(|_| SessionError::Closed {
                counterparty: to.name().to_string(),
            })?;

        *self.opened.entry((to.name().to_string(), flow)).or_insert(0) += 1;
        debug!(flow = %flow, from = %from, to = %to, "Session opened");
        Ok(ours)
    }
}
