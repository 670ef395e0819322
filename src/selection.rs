//! User-chosen record ids, independent of pagination and filter changes.

use std::collections::HashSet;

/// Selected record identifiers.
///
/// Members may reference records not visible in the current page; the set is
/// never pruned on filter or page changes. It is cleared explicitly, or by
/// the view when a selection-scoped export completes.
#[derive(Debug, Default, Clone)]
pub struct SelectionSet {
    ids: HashSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership for one id. Returns the new membership state.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    /// Add every given id. Ids already selected stay selected and ids
    /// outside `visible` are never removed, so re-invoking with the same
    /// visible set is a no-op.
    pub fn select_all<'a, I>(&mut self, visible: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in visible {
            self.ids.insert(id.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Sorted snapshot, so payloads built from the selection are stable
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ids.iter().cloned().collect();
        ids.sort();
        ids
    }
}
