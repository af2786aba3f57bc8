use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::apis::PaperRecord;
use crate::search::AggregatedSearch;

/// Identifies one search request. Only the most recently issued ticket may
/// publish into the display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Holds the search currently on display and drops completions that were
/// overtaken by a newer search.
#[derive(Default)]
pub struct SearchSession {
    generation: AtomicU64,
    current: Mutex<Option<AggregatedSearch>>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new search, making every earlier ticket stale.
    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Store `search` as the displayed result unless a newer search has
    /// started since `ticket` was issued. Returns whether it was stored.
    pub fn publish(&self, ticket: Ticket, search: AggregatedSearch) -> bool {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Checked under the lock so a newer publish can't be overwritten.
        if !self.is_current(ticket) {
            tracing::debug!("Discarding stale results for '{}'", search.query);
            return false;
        }
        *current = Some(search);
        true
    }

    pub fn current(&self) -> Option<AggregatedSearch> {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Record at `index` of the displayed result list.
    pub fn record(&self, index: usize) -> Option<PaperRecord> {
        self.current()?.results.get(index).cloned()
    }
}
