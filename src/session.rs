//! Session seams — how the party subsystem reaches locally connected
//! players.
//!
//! Connection lifecycle is owned elsewhere; this module only defines the
//! handle the party layer borrows to push messages at a local session, and
//! the lookup trait the router uses to find one by account id.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::wire::PartyMessage;

/// Handle to push party messages at a locally connected session.
///
/// Clones share the same underlying channel. The party layer never owns the
/// session — dropping a handle does not tear the connection down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub account_id: String,
    tx: mpsc::UnboundedSender<PartyMessage>,
}

impl SessionHandle {
    pub fn new(account_id: impl Into<String>, tx: mpsc::UnboundedSender<PartyMessage>) -> Self {
        Self {
            account_id: account_id.into(),
            tx,
        }
    }

    /// Handle plus the receiving end — the shape tests and in-process
    /// session layers want.
    pub fn pair(account_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<PartyMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(account_id, tx), rx)
    }

    /// Deliver a message. Returns `false` if the session is gone; the
    /// caller treats that the same as "no local session".
    pub fn send(&self, message: PartyMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Lookup of locally connected sessions by account id.
///
/// Implemented by the host's session layer; [`SessionMap`] is the in-process
/// implementation.
pub trait SessionLookup: Send + Sync {
    fn find_local(&self, account_id: &str) -> Option<SessionHandle>;
}

/// Mutex-protected account → session map.
#[derive(Default)]
pub struct SessionMap {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; an existing handle for the account is replaced
    /// (reconnect wins).
    pub fn register(&self, handle: SessionHandle) {
        self.sessions
            .lock()
            .unwrap()
            .insert(handle.account_id.clone(), handle);
    }

    /// Remove a session at disconnect.
    pub fn unregister(&self, account_id: &str) {
        self.sessions.lock().unwrap().remove(account_id);
    }
}

impl SessionLookup for SessionMap {
    fn find_local(&self, account_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().get(account_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn closed_message() -> PartyMessage {
        PartyMessage::Closed {
            party_id: Uuid::new_v4().to_string(),
            account_id: "alice".into(),
        }
    }

    #[tokio::test]
    async fn register_find_send() {
        let map = SessionMap::new();
        let (handle, mut rx) = SessionHandle::pair("alice");
        map.register(handle);

        let found = map.find_local("alice").unwrap();
        assert!(found.send(closed_message()));
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn unregister_removes() {
        let map = SessionMap::new();
        let (handle, _rx) = SessionHandle::pair("alice");
        map.register(handle);
        map.unregister("alice");
        assert!(map.find_local("alice").is_none());
    }

    #[test]
    fn reconnect_replaces_handle() {
        let map = SessionMap::new();
        let (first, first_rx) = SessionHandle::pair("alice");
        let (second, _second_rx) = SessionHandle::pair("alice");
        map.register(first);
        map.register(second);

        drop(first_rx); // old channel closed
        let found = map.find_local("alice").unwrap();
        assert!(found.send(closed_message())); // lands on the new channel
    }

    #[test]
    fn send_to_dropped_session_reports_failure() {
        let (handle, rx) = SessionHandle::pair("alice");
        drop(rx);
        assert!(!handle.send(closed_message()));
    }
}
