//! The party entity: roster, ownership, and notification fan-out.
//!
//! A party lives on exactly one node. Members may be connected locally (the
//! party holds their session handle) or hosted elsewhere (the party holds
//! their node id). Fan-out is per-recipient: local members get a direct
//! session push, remote members get one RPC each. Roster mutations happen
//! under the state lock; the lock is never held across a send.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::RemoteUserCache;
use crate::error::PartyError;
use crate::events::PartyEvents;
use crate::rpc::RpcRouter;
use crate::session::{SessionHandle, SessionLookup};
use crate::wire::PartyMessage;

/// Where a member's session lives. Exactly one of the two, always.
#[derive(Clone)]
pub enum Presence {
    /// Connected to this node; the party can push at the session directly.
    Local(SessionHandle),
    /// Hosted on the named node; reachable only by RPC.
    Remote(String),
}

/// Shared plumbing every party on this node uses for delivery.
pub struct PartyContext {
    pub router: RpcRouter,
    pub cache: Arc<RemoteUserCache>,
    pub sessions: Arc<dyn SessionLookup>,
    pub events: Arc<PartyEvents>,
}

#[derive(Default)]
struct PartyState {
    owner_id: String,
    members: HashMap<String, Presence>,
    closed: bool,
}

/// One party hosted on this node.
pub struct Party {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    ctx: Arc<PartyContext>,
    state: Mutex<PartyState>,
}

impl Party {
    pub fn new(id: Uuid, ctx: Arc<PartyContext>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            ctx,
            state: Mutex::new(PartyState::default()),
        }
    }

    /// Current owner's account id; empty until ownership is assigned.
    pub fn owner_id(&self) -> String {
        self.state.lock().unwrap().owner_id.clone()
    }

    /// Assign ownership. The owner must already be a member.
    pub fn set_owner(&self, account_id: &str) -> Result<(), PartyError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(PartyError::Closed(self.id));
        }
        if !state.members.contains_key(account_id) {
            return Err(PartyError::OwnerNotMember(account_id.to_owned()));
        }
        state.owner_id = account_id.to_owned();
        Ok(())
    }

    /// Reassign ownership. The party must already have an owner; the new
    /// owner must be a member.
    pub fn change_owner(&self, account_id: &str) -> Result<(), PartyError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(PartyError::Closed(self.id));
        }
        if state.owner_id.is_empty() {
            return Err(PartyError::NoOwner(self.id));
        }
        if !state.members.contains_key(account_id) {
            return Err(PartyError::OwnerNotMember(account_id.to_owned()));
        }
        info!(party_id = %self.id, from = %state.owner_id, to = account_id, "party: owner changed");
        state.owner_id = account_id.to_owned();
        Ok(())
    }

    pub fn has(&self, account_id: &str) -> bool {
        self.state.lock().unwrap().members.contains_key(account_id)
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().unwrap().members.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Add a locally connected member and notify the resulting roster,
    /// the entrant included.
    ///
    /// Returns `false` without side effects if the account is already a
    /// member or the party is closed.
    pub async fn enter_local(&self, session: SessionHandle) -> bool {
        let account_id = session.account_id.clone();
        match self.admit(&account_id, Presence::Local(session)) {
            Some(roster) => {
                info!(party_id = %self.id, account_id, "party: member entered (local)");
                self.notify_entered(&account_id, roster).await;
                true
            }
            None => false,
        }
    }

    /// Add a member whose session lives on `location`, record the presence
    /// in the cache, and notify the resulting roster, the entrant included.
    pub async fn enter_remote(&self, account_id: &str, location: &str) -> bool {
        match self.admit(account_id, Presence::Remote(location.to_owned())) {
            Some(roster) => {
                info!(party_id = %self.id, account_id, location, "party: member entered (remote)");
                self.ctx.cache.set_user(account_id, location);
                self.notify_entered(account_id, roster).await;
                true
            }
            None => false,
        }
    }

    /// Remove a member and notify the remaining roster. Returns `false` if
    /// the account was not a member.
    pub async fn leave(&self, account_id: &str) -> bool {
        let remaining = {
            let mut state = self.state.lock().unwrap();
            if state.members.remove(account_id).is_none() {
                return false;
            }
            snapshot(&state.members)
        };
        info!(party_id = %self.id, account_id, "party: member left");
        for (receiver, presence) in remaining {
            let message = PartyMessage::Left {
                party_id: self.id.to_string(),
                account_id: account_id.to_owned(),
                receiver_id: receiver.clone(),
            };
            self.deliver(&receiver, &presence, message).await;
        }
        true
    }

    /// Close the party: mark it closed, drain the roster, and tell every
    /// former member. Returns `false` if already closed.
    pub async fn close(&self, closer_id: &str) -> bool {
        let drained = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return false;
            }
            state.closed = true;
            std::mem::take(&mut state.members).into_iter().collect::<Vec<_>>()
        };
        info!(party_id = %self.id, closer_id, "party: closed");
        for (receiver, presence) in drained {
            let message = PartyMessage::Closed {
                party_id: self.id.to_string(),
                account_id: closer_id.to_owned(),
            };
            self.deliver(&receiver, &presence, message).await;
        }
        true
    }

    /// Deliver one message to one member. Returns `false` if the account is
    /// not a member.
    pub async fn send_message(&self, receiver_id: &str, message: PartyMessage) -> bool {
        let presence = {
            let state = self.state.lock().unwrap();
            match state.members.get(receiver_id) {
                Some(p) => p.clone(),
                None => {
                    debug!(party_id = %self.id, receiver_id, "send rejected: not a member");
                    return false;
                }
            }
        };
        self.deliver(receiver_id, &presence, message).await;
        true
    }

    /// Deliver one message per member, built by `make(receiver_id)`.
    pub async fn broadcast(&self, make: impl Fn(&str) -> PartyMessage) {
        let members = {
            let state = self.state.lock().unwrap();
            snapshot(&state.members)
        };
        for (receiver, presence) in members {
            self.deliver(&receiver, &presence, make(&receiver)).await;
        }
    }

    /// A member asks the owner to invite `account_id`.
    ///
    /// The request is routed to wherever the owner's session lives. If the
    /// owner cannot be resolved the Recommended event fires with
    /// `resolved = false`.
    pub async fn recommend(&self, recommender_id: &str, account_id: &str) {
        let owner_id = self.owner_id();
        if owner_id.is_empty() {
            warn!(party_id = %self.id, account_id, "recommend: party has no owner");
            self.ctx.events.emit_recommended(self.id, account_id, false);
            return;
        }
        let message = PartyMessage::RecommendationRequest {
            party_id: self.id.to_string(),
            account_id: account_id.to_owned(),
            recommender_id: recommender_id.to_owned(),
            owner_id: owner_id.clone(),
        };
        if !self.resolve_and_send(&owner_id, message).await {
            warn!(party_id = %self.id, owner_id, "recommend: owner unreachable");
            self.ctx.events.emit_recommended(self.id, account_id, false);
        }
    }

    /// The owner answers a recommendation; the verdict goes back to the
    /// recommender.
    pub async fn respond_recommendation(
        &self,
        recommender_id: &str,
        account_id: &str,
        result: bool,
    ) {
        let message = PartyMessage::RecommendationResponse {
            party_id: self.id.to_string(),
            account_id: account_id.to_owned(),
            recommender_id: recommender_id.to_owned(),
            owner_id: self.owner_id(),
            result,
        };
        if !self.resolve_and_send(recommender_id, message).await {
            warn!(party_id = %self.id, recommender_id, "recommendation response undeliverable");
            self.ctx.events.emit_recommended(self.id, account_id, false);
        }
    }

    /// The owner invites `account_id` to join. The invite lands on whichever
    /// node hosts that account's session; if nobody can locate the account
    /// the Participated event fires with `resolved = false`.
    pub async fn ask_participation(&self, account_id: &str) {
        let message = PartyMessage::AskParticipation {
            party_id: self.id.to_string(),
            account_id: account_id.to_owned(),
        };
        if !self.resolve_and_send(account_id, message).await {
            warn!(party_id = %self.id, account_id, "participation ask: account unresolvable");
            self.ctx.events.emit_participated(self.id, account_id, false);
        }
    }

    /// Insert a member; `None` means rejected (closed or already present),
    /// `Some` carries the post-insert roster snapshot for notification.
    fn admit(&self, account_id: &str, presence: Presence) -> Option<Vec<(String, Presence)>> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            debug!(party_id = %self.id, account_id, "enter rejected: party closed");
            return None;
        }
        if state.members.contains_key(account_id) {
            debug!(party_id = %self.id, account_id, "enter rejected: already a member");
            return None;
        }
        state.members.insert(account_id.to_owned(), presence);
        Some(snapshot(&state.members))
    }

    async fn notify_entered(&self, account_id: &str, recipients: Vec<(String, Presence)>) {
        for (receiver, presence) in recipients {
            let message = PartyMessage::Entered {
                party_id: self.id.to_string(),
                account_id: account_id.to_owned(),
                receiver_id: receiver.clone(),
            };
            self.deliver(&receiver, &presence, message).await;
        }
    }

    /// Deliver to a known presence. Local: push at the session and fire the
    /// matching event slot. Remote: one RPC; an unreachable node also evicts
    /// the target's presence cache entry.
    async fn deliver(&self, receiver_id: &str, presence: &Presence, message: PartyMessage) -> bool {
        match presence {
            Presence::Local(session) => {
                self.ctx.events.emit_for(self.id, &message);
                if !session.send(message) {
                    debug!(party_id = %self.id, receiver_id, "local delivery: session channel closed");
                    return false;
                }
                true
            }
            Presence::Remote(location) => {
                match self.ctx.router.send(location, receiver_id, &message).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(party_id = %self.id, receiver_id, location = %location, "remote delivery failed: {e}");
                        self.ctx.cache.erase_user(receiver_id);
                        false
                    }
                }
            }
        }
    }

    /// Route a message to an account that may or may not be a member:
    /// roster presence first, then a local session, then the presence cache.
    async fn resolve_and_send(&self, target: &str, message: PartyMessage) -> bool {
        let presence = {
            let state = self.state.lock().unwrap();
            state.members.get(target).cloned()
        };
        if let Some(presence) = presence {
            return self.deliver(target, &presence, message).await;
        }
        if let Some(session) = self.ctx.sessions.find_local(target) {
            return self
                .deliver(target, &Presence::Local(session), message)
                .await;
        }
        if let Some(location) = self.ctx.cache.find(target).await {
            return self
                .deliver(target, &Presence::Remote(location), message)
                .await;
        }
        false
    }
}

fn snapshot(members: &HashMap<String, Presence>) -> Vec<(String, Presence)> {
    members
        .iter()
        .map(|(account, presence)| (account.clone(), presence.clone()))
        .collect()
}
