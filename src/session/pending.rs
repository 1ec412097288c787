//! Correlation ids and the table of requests awaiting a response

use std::collections::HashMap;
use std::time::Instant;

use crate::codec::{RemoteFault, Value};
use crate::error::{Error, Result};

/// Monotonic source of correlation ids for one connection
///
/// Ids start at 1 and are never handed out twice.
#[derive(Debug)]
pub(crate) struct CorrelationIds {
    next: u64,
}

impl CorrelationIds {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> Result<u64> {
        let id = self.next;
        self.next = id
            .checked_add(1)
            .ok_or_else(|| Error::Protocol("correlation ids exhausted".to_string()))?;
        Ok(id)
    }
}

type Outcome = std::result::Result<Value, RemoteFault>;

#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub command: String,
    pub issued: Instant,
    pub deadline: Instant,
    slot: Option<Outcome>,
}

/// Requests that were sent and not yet answered or abandoned
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: HashMap<u64, PendingRequest>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, command: &str, deadline: Instant) {
        let previous = self.entries.insert(
            id,
            PendingRequest {
                command: command.to_string(),
                issued: Instant::now(),
                deadline,
                slot: None,
            },
        );
        debug_assert!(previous.is_none(), "correlation id {id} reused");
    }

    /// Store the outcome for `id`
    ///
    /// Returns `false` when nobody waits for that id any more (timed out or
    /// never issued); the caller drops the response.
    pub fn complete(&mut self, id: u64, outcome: Outcome) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.slot.is_none() => {
                entry.slot = Some(outcome);
                true
            }
            _ => false,
        }
    }

    /// Remove and return the outcome for `id` if it has arrived
    pub fn take_ready(&mut self, id: u64) -> Option<Outcome> {
        if self.entries.get(&id)?.slot.is_none() {
            return None;
        }
        self.entries.remove(&id).and_then(|entry| entry.slot)
    }

    pub fn deadline(&self, id: u64) -> Option<Instant> {
        self.entries.get(&id).map(|entry| entry.deadline)
    }

    /// Abandon `id`, e.g. after its deadline passed
    pub fn remove(&mut self, id: u64) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    /// Drop every entry; returns how many were outstanding
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
