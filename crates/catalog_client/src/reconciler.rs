use std::collections::HashMap;

use serde_json::Value;
use shared::{
    domain::{CategoryId, CategoryRecord},
    protocol::ChangeOp,
};
use tracing::{debug, warn};

/// Authoritative in-memory view of the category collection for one
/// subscription lifecycle.
///
/// Two sources write here: the one-time snapshot seed and the live change
/// feed. Live events win by arrival order; the seed only fills ids no event
/// has touched yet, which makes the snapshot/subscribe overlap safe in both
/// directions. A fresh instance is created per lifecycle and `disconnect`
/// latches it shut for good.
#[derive(Debug, Default)]
pub struct Reconciler {
    entries: HashMap<CategoryId, Entry>,
    next_seq: u64,
    connected: bool,
    closed: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    record: CategoryRecord,
    // Arrival slot; breaks `order` ties deterministically.
    seq: u64,
}

/// Outcome of a routed change event, for change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub op: ChangeOp,
    pub id: CategoryId,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the snapshot and marks the instance live.
    pub fn connect(&mut self, initial: Vec<CategoryRecord>) -> usize {
        if self.closed {
            return 0;
        }
        let seeded = self.seed(initial);
        self.connected = true;
        seeded
    }

    /// Stops accepting writes, permanently. Safe to call any number of
    /// times, connected or not.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.closed = true;
    }

    /// Installs the snapshot rows, returning how many were inserted.
    ///
    /// Insert-only: an id the feed already delivered keeps its event-derived
    /// record; the snapshot row for it is stale by definition.
    pub fn seed(&mut self, initial: Vec<CategoryRecord>) -> usize {
        if self.closed {
            return 0;
        }
        let mut inserted = 0;
        for record in initial {
            if self.entries.contains_key(&record.id) {
                continue;
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.insert(record.id.clone(), Entry { record, seq });
            inserted += 1;
        }
        inserted
    }

    pub fn apply_create(&mut self, record: CategoryRecord) -> bool {
        self.upsert(record)
    }

    /// An update for an id never seen is an implicit create; the feed may
    /// deliver frames out of order.
    pub fn apply_update(&mut self, record: CategoryRecord) -> bool {
        self.upsert(record)
    }

    /// Removes unconditionally; an unknown id is a no-op. A later create or
    /// update for the same id brings it back; arrival order is the only order.
    pub fn apply_delete(&mut self, id: &CategoryId) -> bool {
        if self.closed {
            return false;
        }
        self.entries.remove(id).is_some()
    }

    fn upsert(&mut self, record: CategoryRecord) -> bool {
        if self.closed {
            return false;
        }
        match self.entries.get_mut(&record.id) {
            Some(entry) => {
                // Latest arrival wins; the original slot keeps ties stable.
                entry.record = record;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(record.id.clone(), Entry { record, seq });
            }
        }
        true
    }

    /// Routes one raw change event. Undecodable payloads are dropped with a
    /// warning, never an error; a delete for an id not held returns `None`
    /// since nothing changed.
    pub fn apply(&mut self, action: ChangeOp, payload: &Value) -> Option<AppliedChange> {
        if self.closed {
            return None;
        }
        match action {
            ChangeOp::Create | ChangeOp::Update => {
                let record = match serde_json::from_value::<CategoryRecord>(payload.clone()) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(action = ?action, "catalog: dropping undecodable change record: {err}");
                        return None;
                    }
                };
                if record.id.as_str().is_empty() {
                    warn!(action = ?action, "catalog: dropping change record without an id");
                    return None;
                }
                let id = record.id.clone();
                self.upsert(record);
                Some(AppliedChange { op: action, id })
            }
            ChangeOp::Delete => {
                let Some(id) = payload.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
                else {
                    warn!("catalog: dropping delete event without an id");
                    return None;
                };
                let id = CategoryId::new(id);
                if self.apply_delete(&id) {
                    Some(AppliedChange {
                        op: ChangeOp::Delete,
                        id,
                    })
                } else {
                    debug!(id = %id, "catalog: delete for an id not held");
                    None
                }
            }
        }
    }

    /// Materialized list: ascending by `order`, ties by arrival slot.
    pub fn items(&self) -> Vec<CategoryRecord> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| (entry.record.order, entry.seq));
        entries.into_iter().map(|entry| entry.record.clone()).collect()
    }

    pub fn get(&self, id: &CategoryId) -> Option<&CategoryRecord> {
        self.entries.get(id).map(|entry| &entry.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Suggested `order` for the next new category: one past the current
    /// maximum, never below 1.
    pub fn next_order(&self) -> i64 {
        self.entries
            .values()
            .map(|entry| entry.record.order)
            .fold(0, i64::max)
            + 1
    }
}
