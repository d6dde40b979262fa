//! The party service: registry of locally hosted parties plus the glue
//! between them, the directory, the presence cache, and the RPC router.
//!
//! One instance per node. Hosts construct it with their store, transport,
//! locator, and session lookup, then drive everything through it — there is
//! no process-global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{AccountLocator, RemoteUserCache};
use crate::config::PartyConfig;
use crate::directory::{Directory, KvStore};
use crate::error::{DirectoryError, PartyError, ValidationError};
use crate::events::PartyEvents;
use crate::party::{Party, PartyContext};
use crate::rpc::{RpcRouter, RpcTransport};
use crate::session::SessionLookup;

/// Node-local entry point for everything party.
pub struct PartyService {
    config: PartyConfig,
    directory: Directory,
    ctx: Arc<PartyContext>,
    parties: Mutex<HashMap<Uuid, Arc<Party>>>,
}

impl PartyService {
    pub fn new(
        config: PartyConfig,
        store: Arc<dyn KvStore>,
        transport: Arc<dyn RpcTransport>,
        locator: Arc<dyn AccountLocator>,
        sessions: Arc<dyn SessionLookup>,
    ) -> Arc<Self> {
        let events = Arc::new(PartyEvents::new());
        let cache = RemoteUserCache::new(locator, Duration::from_secs(config.cache_ttl_secs));
        let directory = Directory::new(
            store,
            config.directory_prefix.clone(),
            config.directory_ttl_secs,
        );
        let ctx = Arc::new(PartyContext {
            router: RpcRouter::new(transport, sessions.clone(), events.clone()),
            cache,
            sessions,
            events,
        });
        Arc::new(Self {
            config,
            directory,
            ctx,
            parties: Mutex::new(HashMap::new()),
        })
    }

    /// This node's cluster identity.
    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// Event registration surface.
    pub fn events(&self) -> &PartyEvents {
        &self.ctx.events
    }

    /// The presence cache, for hosts that learn account locations out of
    /// band (login/logout notifications).
    pub fn cache(&self) -> &Arc<RemoteUserCache> {
        &self.ctx.cache
    }

    /// Create a party hosted on this node and publish its location.
    ///
    /// The party is inserted locally first, then published; if the publish
    /// fails the local entry is removed again, so a party never exists
    /// half-registered.
    pub async fn create(&self) -> Result<Arc<Party>, PartyError> {
        let id = Uuid::new_v4();
        let party = Arc::new(Party::new(id, self.ctx.clone()));
        {
            let mut parties = self.parties.lock().unwrap();
            if parties.contains_key(&id) {
                return Err(PartyError::Collision(id));
            }
            parties.insert(id, party.clone());
        }

        if let Err(e) = self.directory.publish(id, &self.config.node_id).await {
            warn!(party_id = %id, "party create rolled back: {e}");
            self.parties.lock().unwrap().remove(&id);
            return Err(e.into());
        }
        info!(party_id = %id, node_id = %self.config.node_id, "party created");
        Ok(party)
    }

    /// A party hosted on this node, if any.
    pub fn find(&self, id: Uuid) -> Option<Arc<Party>> {
        self.parties.lock().unwrap().get(&id).cloned()
    }

    /// Resolve which node hosts a party: this node if we host it, otherwise
    /// whatever the directory says. `Ok(None)` means nobody knows.
    pub async fn locate(&self, id: Uuid) -> Result<Option<String>, DirectoryError> {
        if self.find(id).is_some() {
            return Ok(Some(self.config.node_id.clone()));
        }
        self.directory.lookup(id).await
    }

    /// Close a hosted party: notify the roster, drop it from the registry,
    /// and delete its directory record. Returns `false` if this node does
    /// not host the party.
    pub async fn close(&self, id: Uuid, closer_id: &str) -> bool {
        let party = match self.parties.lock().unwrap().remove(&id) {
            Some(p) => p,
            None => return false,
        };
        party.close(closer_id).await;
        self.directory.remove(id).await;
        true
    }

    /// Inbound entry point the host wires its RPC layer to.
    pub fn handle_envelope(&self, target_account: &str, frame: &str) -> Result<(), ValidationError> {
        self.ctx.router.handle_frame(target_account, frame)
    }

    /// Number of parties hosted on this node.
    pub fn hosted_count(&self) -> usize {
        self.parties.lock().unwrap().len()
    }

    /// Stop background work. Pending presence-cache timers are aborted;
    /// parties are left as-is for the host to close explicitly.
    pub fn shutdown(&self) {
        info!(node_id = %self.config.node_id, "party service shutting down");
        self.ctx.cache.cancel_not_expired_timers();
    }
}
