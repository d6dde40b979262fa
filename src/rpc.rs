//! Cross-node messaging for the party subsystem.
//!
//! Outbound, the router serializes a [`PartyMessage`] and hands the text
//! frame to the host's transport, addressed to a node and a target account
//! on that node. Inbound, it parses, validates, and resolves the party id
//! before anything else happens; an envelope that fails any of those steps
//! is dropped with a log and no response. Valid envelopes are pushed at the
//! target's local session — if the session is gone the message is dropped,
//! never queued or forwarded.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{RpcError, ValidationError};
use crate::events::PartyEvents;
use crate::session::SessionLookup;
use crate::wire::PartyMessage;

/// Node-to-node frame delivery, implemented by the host.
///
/// `target_account` is an address header: the receiving node uses it to pick
/// the local session, without re-deriving the recipient from the payload.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(
        &self,
        node_id: &str,
        target_account: &str,
        frame: &str,
    ) -> Result<(), RpcError>;
}

/// Outbound sender and inbound dispatcher for party envelopes.
pub struct RpcRouter {
    transport: Arc<dyn RpcTransport>,
    sessions: Arc<dyn SessionLookup>,
    events: Arc<PartyEvents>,
}

impl RpcRouter {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        sessions: Arc<dyn SessionLookup>,
        events: Arc<PartyEvents>,
    ) -> Self {
        Self {
            transport,
            sessions,
            events,
        }
    }

    /// Serialize and forward a message to `target_account` on `node_id`.
    pub async fn send(
        &self,
        node_id: &str,
        target_account: &str,
        message: &PartyMessage,
    ) -> Result<(), RpcError> {
        let frame = message
            .to_json()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        self.transport.call(node_id, target_account, &frame).await
    }

    /// Inbound entry point: one text frame addressed to `target_account`.
    ///
    /// The returned error is the drop reason; the frame has already been
    /// logged and discarded when `Err` comes back.
    pub fn handle_frame(
        &self,
        target_account: &str,
        frame: &str,
    ) -> Result<(), ValidationError> {
        let message = PartyMessage::from_json(frame).map_err(|e| {
            warn!(target_account, "dropping unparseable party envelope: {e}");
            ValidationError::Malformed(e.to_string())
        })?;
        self.handle_message(target_account, message)
    }

    /// Dispatch an already-decoded envelope.
    pub fn handle_message(
        &self,
        target_account: &str,
        message: PartyMessage,
    ) -> Result<(), ValidationError> {
        if let Err(e) = message.validate() {
            warn!(target_account, "dropping invalid party envelope: {e}");
            return Err(e);
        }
        let party_id = match message.parsed_party_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(target_account, "dropping party envelope: {e}");
                return Err(e);
            }
        };

        self.events.emit_for(party_id, &message);

        match self.sessions.find_local(target_account) {
            Some(session) => {
                if !session.send(message) {
                    debug!(target_account, %party_id, "party envelope: session channel closed");
                }
            }
            None => {
                debug!(target_account, %party_id, "party envelope: no local session, dropped");
            }
        }
        Ok(())
    }
}
