//! Protocol Stage Definitions
//!
//! Both roles of the transfer run an explicit, linear state machine. The
//! current stage is published on a `watch` channel so hosts and tests can
//! observe progress without reaching into the run.
//!
//! ```text
//! Initiator: PREPARATION → BUILDING → SIGNING → SYNCING → COLLECTING → FINALISING → DONE
//! Responder: SYNCING → SIGNING → AWAITING_COMMIT → DONE
//! ```
//!
//! Any non-terminal stage may move to FAILED.

use std::fmt;
use tokio::sync::watch;
use tracing::{info, warn};

use super::error::TransferError;

/// Behaviour shared by both stage enums.
pub trait Stage: Copy + Eq + fmt::Display + Send + Sync + 'static {
    /// Stage that follows on success, `None` when terminal.
    fn next(&self) -> Option<Self>;
    fn is_terminal(&self) -> bool;
    fn failed() -> Self;

    fn can_transition_to(&self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::failed() || self.next() == Some(to)
    }
}

/// Transfer Initiator stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitiatorStage {
    /// Fetch and soft-lock the obligation, check the caller is its lender
    Preparation,
    /// Output state, signer set and transaction
    Building,
    /// Rule engine check and initiator signature
    Signing,
    /// Proposal fan-out and identity sync
    Syncing,
    Collecting,
    /// Past this point the run must be driven to completion
    Finalising,
    Done,
    Failed,
}

impl InitiatorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitiatorStage::Preparation => "PREPARATION",
            InitiatorStage::Building => "BUILDING",
            InitiatorStage::Signing => "SIGNING",
            InitiatorStage::Syncing => "SYNCING",
            InitiatorStage::Collecting => "COLLECTING",
            InitiatorStage::Finalising => "FINALISING",
            InitiatorStage::Done => "DONE",
            InitiatorStage::Failed => "FAILED",
        }
    }

    /// A run may be abandoned here with no effect beyond releasing its lock.
    pub fn is_cancellable(&self) -> bool {
        !matches!(
            self,
            InitiatorStage::Finalising | InitiatorStage::Done | InitiatorStage::Failed
        )
    }
}

impl Stage for InitiatorStage {
    fn next(&self) -> Option<Self> {
        match self {
            InitiatorStage::Preparation => Some(InitiatorStage::Building),
            InitiatorStage::Building => Some(InitiatorStage::Signing),
            InitiatorStage::Signing => Some(InitiatorStage::Syncing),
            InitiatorStage::Syncing => Some(InitiatorStage::Collecting),
            InitiatorStage::Collecting => Some(InitiatorStage::Finalising),
            InitiatorStage::Finalising => Some(InitiatorStage::Done),
            InitiatorStage::Done | InitiatorStage::Failed => None,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, InitiatorStage::Done | InitiatorStage::Failed)
    }

    fn failed() -> Self {
        InitiatorStage::Failed
    }
}

impl fmt::Display for InitiatorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transfer Responder stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponderStage {
    Syncing,
    Signing,
    AwaitingCommit,
    Done,
    Failed,
}

impl ResponderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponderStage::Syncing => "SYNCING",
            ResponderStage::Signing => "SIGNING",
            ResponderStage::AwaitingCommit => "AWAITING_COMMIT",
            ResponderStage::Done => "DONE",
            ResponderStage::Failed => "FAILED",
        }
    }
}

impl Stage for ResponderStage {
    fn next(&self) -> Option<Self> {
        match self {
            ResponderStage::Syncing => Some(ResponderStage::Signing),
            ResponderStage::Signing => Some(ResponderStage::AwaitingCommit),
            ResponderStage::AwaitingCommit => Some(ResponderStage::Done),
            ResponderStage::Done | ResponderStage::Failed => None,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ResponderStage::Done | ResponderStage::Failed)
    }

    fn failed() -> Self {
        ResponderStage::Failed
    }
}

impl fmt::Display for ResponderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable stage of one protocol run.
pub struct ProgressTracker<S: Stage> {
    tx: watch::Sender<S>,
}

impl<S: Stage> ProgressTracker<S> {
    pub fn new(initial: S) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> S {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    /// Move to `to`, rejecting anything but the next stage or FAILED.
    pub fn advance(&self, to: S) -> Result<(), TransferError> {
        let from = self.current();
        if !from.can_transition_to(to) {
            return Err(TransferError::InvalidStateTransition(format!(
                "{} -> {}",
                from, to
            )));
        }
        self.tx.send_replace(to);
        info!(from = %from, stage = %to, "Stage transition");
        Ok(())
    }

    /// Mark the run failed. No-op once terminal.
    pub fn fail(&self) {
        let from = self.current();
        if from.is_terminal() {
            return;
        }
        self.tx.send_replace(S::failed());
        warn!(from = %from, stage = %S::failed(), "Stage transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiator_linear_path() {
        let mut stage = InitiatorStage::Preparation;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            assert!(stage.can_transition_to(next));
            stage = next;
            visited.push(stage);
        }

        assert_eq!(
            visited.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["PREPARATION", "BUILDING", "SIGNING", "SYNCING", "COLLECTING", "FINALISING", "DONE"]
        );
    }

    #[test]
    fn test_no_skipping_or_leaving_terminal() {
        assert!(!InitiatorStage::Preparation.can_transition_to(InitiatorStage::Signing));
        assert!(!InitiatorStage::Collecting.can_transition_to(InitiatorStage::Syncing));
        assert!(!InitiatorStage::Done.can_transition_to(InitiatorStage::Failed));
        assert!(!ResponderStage::Failed.can_transition_to(ResponderStage::Syncing));
        assert!(InitiatorStage::Finalising.can_transition_to(InitiatorStage::Failed));
    }

    #[test]
    fn test_terminal_and_cancellable() {
        assert!(InitiatorStage::Done.is_terminal());
        assert!(InitiatorStage::Failed.is_terminal());
        assert!(!InitiatorStage::Finalising.is_terminal());

        assert!(InitiatorStage::Collecting.is_cancellable());
        assert!(!InitiatorStage::Finalising.is_cancellable());

        assert!(ResponderStage::Done.is_terminal());
        assert!(!ResponderStage::AwaitingCommit.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(InitiatorStage::Finalising.to_string(), "FINALISING");
        assert_eq!(ResponderStage::AwaitingCommit.to_string(), "AWAITING_COMMIT");
    }

    #[test]
    fn test_tracker_publishes_stages() {
        let tracker = ProgressTracker::new(ResponderStage::Syncing);
        let observer = tracker.subscribe();

        tracker.advance(ResponderStage::Signing).unwrap();
        assert_eq!(*observer.borrow(), ResponderStage::Signing);

        assert!(matches!(
            tracker.advance(ResponderStage::Done),
            Err(TransferError::InvalidStateTransition(_))
        ));
        assert_eq!(tracker.current(), ResponderStage::Signing);

        tracker.fail();
        assert_eq!(*observer.borrow(), ResponderStage::Failed);

        // Terminal stays terminal
        tracker.fail();
        assert!(tracker.advance(ResponderStage::AwaitingCommit).is_err());
    }
}
