//! Process-wide party event callbacks.
//!
//! One slot per event; registering again replaces the previous handler
//! (last registration wins). Handlers run inline on whatever task emitted
//! the event, so they must be cheap and must not block. Each handler is
//! cloned out of its slot before it runs, so a handler may re-register a
//! slot or emit further events.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::wire::PartyMessage;

/// Recommendation outcome: `(party, recommended account, resolved?)`.
/// `false` means the owner (or target) could not be located.
type RecommendedFn = Arc<dyn Fn(Uuid, &str, bool) + Send + Sync>;
/// Participation invite outcome: `(party, invited account, resolved?)`.
type ParticipatedFn = Arc<dyn Fn(Uuid, &str, bool) + Send + Sync>;
/// `(party, entering account, receiver account)`.
type EnteredFn = Arc<dyn Fn(Uuid, &str, &str) + Send + Sync>;
/// `(party, leaving account, receiver account)`.
type LeftFn = Arc<dyn Fn(Uuid, &str, &str) + Send + Sync>;
/// `(party, closing owner account)`.
type ClosedFn = Arc<dyn Fn(Uuid, &str) + Send + Sync>;

/// Single-slot registration table for party events.
#[derive(Default)]
pub struct PartyEvents {
    recommended: Mutex<Option<RecommendedFn>>,
    participated: Mutex<Option<ParticipatedFn>>,
    entered: Mutex<Option<EnteredFn>>,
    left: Mutex<Option<LeftFn>>,
    closed: Mutex<Option<ClosedFn>>,
}

impl PartyEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_recommended(&self, f: impl Fn(Uuid, &str, bool) + Send + Sync + 'static) {
        *self.recommended.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn on_participated(&self, f: impl Fn(Uuid, &str, bool) + Send + Sync + 'static) {
        *self.participated.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn on_entered(&self, f: impl Fn(Uuid, &str, &str) + Send + Sync + 'static) {
        *self.entered.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn on_left(&self, f: impl Fn(Uuid, &str, &str) + Send + Sync + 'static) {
        *self.left.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn on_closed(&self, f: impl Fn(Uuid, &str) + Send + Sync + 'static) {
        *self.closed.lock().unwrap() = Some(Arc::new(f));
    }

    pub(crate) fn emit_recommended(&self, party: Uuid, account_id: &str, resolved: bool) {
        let handler = self.recommended.lock().unwrap().clone();
        if let Some(f) = handler {
            f(party, account_id, resolved);
        }
    }

    pub(crate) fn emit_participated(&self, party: Uuid, account_id: &str, resolved: bool) {
        let handler = self.participated.lock().unwrap().clone();
        if let Some(f) = handler {
            f(party, account_id, resolved);
        }
    }

    pub(crate) fn emit_entered(&self, party: Uuid, account_id: &str, receiver_id: &str) {
        let handler = self.entered.lock().unwrap().clone();
        if let Some(f) = handler {
            f(party, account_id, receiver_id);
        }
    }

    pub(crate) fn emit_left(&self, party: Uuid, account_id: &str, receiver_id: &str) {
        let handler = self.left.lock().unwrap().clone();
        if let Some(f) = handler {
            f(party, account_id, receiver_id);
        }
    }

    pub(crate) fn emit_closed(&self, party: Uuid, account_id: &str) {
        let handler = self.closed.lock().unwrap().clone();
        if let Some(f) = handler {
            f(party, account_id);
        }
    }

    /// Fire the slot matching one delivered message. Recommendation
    /// requests have no slot; the owner reacts through their session.
    pub(crate) fn emit_for(&self, party: Uuid, message: &PartyMessage) {
        match message {
            PartyMessage::RecommendationResponse {
                account_id, result, ..
            } => self.emit_recommended(party, account_id, *result),
            PartyMessage::AskParticipation { account_id, .. } => {
                self.emit_participated(party, account_id, true)
            }
            PartyMessage::Entered {
                account_id,
                receiver_id,
                ..
            } => self.emit_entered(party, account_id, receiver_id),
            PartyMessage::Left {
                account_id,
                receiver_id,
                ..
            } => self.emit_left(party, account_id, receiver_id),
            PartyMessage::Closed { account_id, .. } => self.emit_closed(party, account_id),
            PartyMessage::RecommendationRequest { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn unregistered_slot_is_a_noop() {
        let events = PartyEvents::new();
        events.emit_closed(Uuid::new_v4(), "alice");
    }

    #[test]
    fn handler_receives_emit() {
        let events = PartyEvents::new();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        events.on_entered(move |_, account, receiver| {
            assert_eq!(account, "bob");
            assert_eq!(receiver, "alice");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.emit_entered(Uuid::new_v4(), "bob", "alice");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn last_registration_wins() {
        let events = PartyEvents::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let c = first.clone();
        events.on_closed(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = second.clone();
        events.on_closed(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        events.emit_closed(Uuid::new_v4(), "alice");
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_touch_its_own_slot() {
        let events = Arc::new(PartyEvents::new());
        let hits = Arc::new(AtomicU32::new(0));

        let registry = events.clone();
        let counter = hits.clone();
        events.on_closed(move |party, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Replace ourselves and fire another event from inside the
            // handler; neither may deadlock on the slot.
            registry.on_closed(|_, _| {});
            registry.emit_entered(party, "bob", "alice");
        });

        events.emit_closed(Uuid::new_v4(), "alice");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The replacement handler is in effect now.
        events.emit_closed(Uuid::new_v4(), "alice");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
