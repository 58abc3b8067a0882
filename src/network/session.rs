//! Point-to-point protocol sessions
//!
//! A session is a pair of bounded mpsc channels, one per direction, so
//! messages arrive in send order. Sends and receives are the only
//! suspension points a protocol run has besides the commit wait.
//!
//! # Timeouts
//! `receive` honours the host-configured timeout. `None` waits until the
//! counterparty sends or drops its end.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::message::{FlowKind, SessionMessage};
use crate::identity::Party;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session with {counterparty} closed")]
    Closed { counterparty: String },

    #[error("No message from {counterparty} within {after_ms}ms")]
    Timeout { counterparty: String, after_ms: u64 },

    #[error("Expected {expected}, received {found}")]
    UnexpectedMessage {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Peer not on the network: {0}")]
    UnknownPeer(String),
}

impl SessionError {
    pub fn unexpected(expected: &'static str, found: &SessionMessage) -> Self {
        SessionError::UnexpectedMessage {
            expected,
            found: found.kind(),
        }
    }
}

/// One end of a session.
#[derive(Debug)]
pub struct Session {
    counterparty: Party,
    flow: FlowKind,
    tx: mpsc::Sender<SessionMessage>,
    rx: mpsc::Receiver<SessionMessage>,
    timeout: Option<Duration>,
}

impl Session {
    /// Connected ends: the first is held by `a`, the second by `b`.
    pub fn pair(
        a: Party,
        b: Party,
        flow: FlowKind,
        buffer: usize,
        timeout: Option<Duration>,
    ) -> (Session, Session) {
        let (a_tx, b_rx) = mpsc::channel(buffer);
        let (b_tx, a_rx) = mpsc::channel(buffer);
        (
            Session {
                counterparty: b,
                flow,
                tx: a_tx,
                rx: a_rx,
                timeout,
            },
            Session {
                counterparty: a,
                flow,
                tx: b_tx,
                rx: b_rx,
                timeout,
            },
        )
    }

    pub fn counterparty(&self) -> &Party {
        &self.counterparty
    }

    pub fn flow(&self) -> FlowKind {
        self.flow
    }

    pub async fn send(&self, message: SessionMessage) -> Result<(), SessionError> {
        debug!(
            flow = %self.flow,
            counterparty = %self.counterparty,
            message = message.kind(),
            "Session send"
        );
        self.tx.send(message).await.map_err(|_| self.closed())
    }

    pub async fn receive(&mut self) -> Result<SessionMessage, SessionError> {
        let next = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.rx.recv())
                .await
                .map_err(|_| SessionError::Timeout {
                    counterparty: self.counterparty.name().to_string(),
                    after_ms: limit.as_millis() as u64,
                })?,
            None => self.rx.recv().await,
        };

        let message = next.ok_or_else(|| self.closed())?;
        debug!(
            flow = %self.flow,
            counterparty = %self.counterparty,
            message = message.kind(),
            "Session receive"
        );
        Ok(message)
    }

    fn closed(&self) -> SessionError {
        SessionError::Closed {
            counterparty: self.counterparty.name().to_string(),
        }
    }
}
