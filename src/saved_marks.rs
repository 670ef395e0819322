//! Optimistic per-record bookmark state, reconciled with the remote service.
//!
//! `toggle` flips the local value immediately and hands back the remote call
//! to dispatch. While a call is in flight further toggles on the same id only
//! record intent; `complete` issues a follow-up call when the latest local
//! intent differs from what the service acknowledged (last-intent-wins), so
//! local and remote never stay divergent.

use std::collections::HashMap;
use tracing::debug;

use crate::api_client::ServiceError;

/// A remote bookmark call the caller must dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOp {
    Save(String),
    Unsave(String),
}

impl SaveOp {
    fn for_state(id: &str, saved: bool) -> Self {
        if saved {
            SaveOp::Save(id.to_string())
        } else {
            SaveOp::Unsave(id.to_string())
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SaveOp::Save(id) | SaveOp::Unsave(id) => id,
        }
    }
}

/// Outcome of applying a remote acknowledgment
#[derive(Debug, Default)]
pub struct SaveCompletion {
    /// Next call to dispatch for this id, when local intent moved on
    pub followup: Option<SaveOp>,
    /// The remote call failed
    pub failed: bool,
    /// The local value was reverted to the confirmed remote state
    pub rolled_back: bool,
}

#[derive(Debug, Default)]
pub struct SavedMarks {
    marks: HashMap<String, bool>,
    // Desired remote state of the call currently in flight, per id
    in_flight: HashMap<String, bool>,
}

impl SavedMarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.marks.get(id).copied().unwrap_or(false)
    }

    pub fn saved_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .marks
            .iter()
            .filter(|(_, saved)| **saved)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Flip the local value. Returns the remote call to dispatch, or `None`
    /// when one is already in flight for this id and the new intent is only
    /// recorded.
    pub fn toggle(&mut self, id: &str) -> Option<SaveOp> {
        let desired = !self.is_saved(id);
        self.marks.insert(id.to_string(), desired);

        if self.in_flight.contains_key(id) {
            debug!(target: "saved", id, desired, "toggle while call in flight, intent queued");
            return None;
        }

        self.in_flight.insert(id.to_string(), desired);
        Some(SaveOp::for_state(id, desired))
    }

    /// Apply the acknowledgment for the in-flight call on `id`.
    pub fn complete(&mut self, id: &str, outcome: Result<(), ServiceError>) -> SaveCompletion {
        let Some(dispatched) = self.in_flight.remove(id) else {
            // Completion for an id we no longer track (e.g. view was reset
            // while the call was outstanding); nothing to reconcile.
            debug!(target: "saved", id, "acknowledgment for untracked call, ignoring");
            return SaveCompletion::default();
        };

        match outcome {
            Ok(()) => {
                let local = self.is_saved(id);
                if local != dispatched {
                    // User toggled again while the call was in flight
                    self.in_flight.insert(id.to_string(), local);
                    SaveCompletion {
                        followup: Some(SaveOp::for_state(id, local)),
                        ..SaveCompletion::default()
                    }
                } else {
                    SaveCompletion::default()
                }
            }
            Err(err) => {
                // The remote stayed at its pre-call state; fold local back to
                // it. No automatic retry.
                let remote = !dispatched;
                let rolled_back = self.is_saved(id) != remote;
                self.marks.insert(id.to_string(), remote);
                debug!(target: "saved", id, error = %err, rolled_back, "bookmark call failed");
                SaveCompletion {
                    followup: None,
                    failed: true,
                    rolled_back,
                }
            }
        }
    }
}
