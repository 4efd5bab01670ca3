//! Payout emission to the external disbursement collaborator.
//!
//! The engine guarantees the sink is called exactly once per completed
//! round and once per approved loan. Delivery is fire-and-forget from
//! the engine's perspective: a failure is reported back to the caller
//! as a [`PayoutDelivery::Failed`] and is retriable by the collaborator,
//! but the committed state transition is never rolled back.

use std::sync::Mutex;

use chama_types::PayoutEvent;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a payout sink.
#[derive(Debug, Error)]
#[error("payout delivery failed: {0}")]
pub struct PayoutError(pub String);

impl PayoutError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Destination for credit events. The implementation owns the personal
/// ledger-of-record; this engine only hands over the exact amount,
/// recipient, and reason.
pub trait PayoutSink: Send + Sync {
    fn emit(&self, event: &PayoutEvent) -> Result<(), PayoutError>;
}

/// How an individual payout emission went. Returned alongside the
/// committed state so the presentation layer can surface a delivery
/// fault without ever seeing a rolled-back transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutDelivery {
    Emitted,
    Failed(String),
}

impl PayoutDelivery {
    pub fn is_emitted(&self) -> bool {
        matches!(self, PayoutDelivery::Emitted)
    }
}

/// Reference sink that records every event it receives. Used across the
/// test suites and as the simplest possible collaborator.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PayoutEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PayoutEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl PayoutSink for RecordingSink {
    fn emit(&self, event: &PayoutEvent) -> Result<(), PayoutError> {
        self.events
            .lock()
            .map_err(|_| PayoutError::new("recording sink poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

/// Sink that refuses every event. Exercises the side-channel fault path.
pub struct FailingSink;

impl PayoutSink for FailingSink {
    fn emit(&self, _event: &PayoutEvent) -> Result<(), PayoutError> {
        Err(PayoutError::new("sink unavailable"))
    }
}
