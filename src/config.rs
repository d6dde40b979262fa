//! Runtime configuration for the party subsystem.
//!
//! Defaults match production values; each knob can be overridden through a
//! `FLOTILLA_*` environment variable so deployments tune TTLs without a
//! rebuild.

use tracing::info;

/// Default TTL, in seconds, for directory records and presence cache entries.
const DEFAULT_TTL_SECS: u64 = 300;

/// Key prefix for party location records in the directory store.
const DEFAULT_DIRECTORY_PREFIX: &str = "party/";

/// Configuration for a [`PartyService`](crate::service::PartyService).
#[derive(Debug, Clone)]
pub struct PartyConfig {
    /// This node's cluster identity — published as the directory record
    /// value for every party hosted here.
    pub node_id: String,
    /// Key prefix for directory records (`{prefix}{party_id}`).
    pub directory_prefix: String,
    /// TTL applied to directory records, in seconds.
    pub directory_ttl_secs: u64,
    /// Sliding-expiration window for the remote-user presence cache,
    /// in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            directory_prefix: DEFAULT_DIRECTORY_PREFIX.into(),
            directory_ttl_secs: DEFAULT_TTL_SECS,
            cache_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl PartyConfig {
    /// Config for the given node id with production defaults.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Build from the environment.
    ///
    /// Reads `FLOTILLA_NODE_ID`, `FLOTILLA_DIRECTORY_TTL_SECS`, and
    /// `FLOTILLA_CACHE_TTL_SECS`. Unset or unparseable values fall back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(node_id) = std::env::var("FLOTILLA_NODE_ID") {
            if !node_id.is_empty() {
                config.node_id = node_id;
            }
        }
        if let Some(ttl) = env_secs("FLOTILLA_DIRECTORY_TTL_SECS") {
            config.directory_ttl_secs = ttl;
        }
        if let Some(ttl) = env_secs("FLOTILLA_CACHE_TTL_SECS") {
            config.cache_ttl_secs = ttl;
        }

        info!(
            node_id = %config.node_id,
            directory_ttl_secs = config.directory_ttl_secs,
            cache_ttl_secs = config.cache_ttl_secs,
            "party config loaded"
        );
        config
    }
}

fn env_secs(var: &str) -> Option<u64> {
    std::env::var(var).ok()?.parse().ok()
}
