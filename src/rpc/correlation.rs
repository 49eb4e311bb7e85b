//! Correlation table: outstanding calls keyed by correlation id.
//!
//! Each [`PendingCall`] owns a one-shot settlement slot.  Settlement is
//! check-then-remove: whichever of {matching response, deadline expiry,
//! disconnect} removes the entry first decides the outcome, and every later
//! attempt finds nothing and is a no-op.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;

use crate::error::Error;

use super::value::Value;

/// Highest correlation id handed out before wrapping back to 1.
pub const MAX_CORRELATION_ID: u16 = 0xFFFE;

/// Final outcome of a call.
pub type Outcome = Result<Value, Error>;

/// One-shot settlement slot shared between the table and the caller.
pub type Slot = Rc<Signal<NoopRawMutex, Outcome>>;

/// An outstanding request awaiting its response.
pub struct PendingCall {
    pub method_id: u8,
    pub deadline: Instant,
    slot: Slot,
}

/// Per-transport mapping from correlation id to pending call.
pub struct CorrelationTable {
    next_id: u16,
    pending: HashMap<u16, PendingCall>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Next id from the monotonically increasing `1..=0xFFFE` counter.
    ///
    /// No collision check: fewer than 65534 calls are assumed to be in
    /// flight at once.
    fn allocate(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = if id >= MAX_CORRELATION_ID { 1 } else { id + 1 };
        id
    }

    /// Allocate an id and register a pending call for it.
    pub fn register(&mut self, method_id: u8, deadline: Instant) -> (u16, Slot) {
        let id = self.allocate();
        let slot: Slot = Rc::new(Signal::new());
        self.pending.insert(
            id,
            PendingCall {
                method_id,
                deadline,
                slot: slot.clone(),
            },
        );
        (id, slot)
    }

    /// Settle a call with its outcome.  Returns `false` if the entry was
    /// already gone (timed out, cancelled or never existed).
    pub fn settle(&mut self, id: u16, outcome: Outcome) -> bool {
        match self.pending.remove(&id) {
            Some(call) => {
                call.slot.signal(outcome);
                true
            }
            None => false,
        }
    }

    /// Evict an entry without signalling; the caller reports the outcome
    /// itself.  Returns `false` if another path settled it first.
    pub fn evict(&mut self, id: u16) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Fail every outstanding call with `err` and clear the table.
    pub fn fail_all(&mut self, err: &Error) -> usize {
        let n = self.pending.len();
        for (_, call) in self.pending.drain() {
            call.slot.signal(Err(err.clone()));
        }
        n
    }

    pub fn get(&self, id: u16) -> Option<&PendingCall> {
        self.pending.get(&id)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────
