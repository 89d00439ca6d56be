//! Application state shared across all route handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use medipal_chat::SessionManager;
use medipal_core::config::MediPalConfig;

/// Shared application state.
///
/// Passed to handlers via axum's State extractor; every field is cheap to
/// clone.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, read-only once the server starts.
    pub config: Arc<MediPalConfig>,
    /// The conversation served by this process.
    pub manager: Arc<SessionManager>,
    /// Held while a submitted message is being answered.
    pub submission: Arc<SubmissionSlot>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: MediPalConfig, manager: Arc<SessionManager>) -> Self {
        Self {
            config: Arc::new(config),
            manager,
            submission: Arc::new(SubmissionSlot::default()),
            start_time: Instant::now(),
        }
    }
}

/// Single-holder slot for the message currently being answered.
///
/// Each claim gets a fresh ticket. A background send releases only its own
/// ticket, so a send orphaned by a clear cannot free or block a later one.
#[derive(Debug, Default)]
pub struct SubmissionSlot {
    /// Ticket of the current holder, 0 when free.
    active: AtomicU64,
    issued: AtomicU64,
}

impl SubmissionSlot {
    /// Claim the slot. Returns the ticket, or `None` if it is already held.
    pub fn claim(&self) -> Option<u64> {
        let ticket = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        self.active
            .compare_exchange(0, ticket, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ticket)
    }

    /// Free the slot if `ticket` still holds it.
    pub fn release(&self, ticket: u64) {
        let _ = self
            .active
            .compare_exchange(ticket, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Free the slot whoever holds it.
    pub fn reset(&self) {
        self.active.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_has_single_holder() {
        let slot = SubmissionSlot::default();
        let ticket = slot.claim().unwrap();
        assert!(slot.claim().is_none());

        slot.release(ticket);
        assert!(slot.claim().is_some());
    }

    #[test]
    fn test_stale_release_keeps_new_holder() {
        let slot = SubmissionSlot::default();
        let orphaned = slot.claim().unwrap();

        slot.reset();
        let current = slot.claim().unwrap();
        assert_ne!(orphaned, current);

        slot.release(orphaned);
        assert!(slot.claim().is_none());
        slot.release(current);
        assert!(slot.claim().is_some());
    }
}
