//! Distributed party coordination for multi-node game servers.
//!
//! A party is a small, owner-led member group whose roster can span nodes.
//! Each party is hosted by exactly one node; a cluster-wide directory of
//! expiring `party → node` records lets any node find the host, and a
//! sliding-expiration presence cache tracks which node holds each remote
//! account's session. Roster changes fan out to every member — a direct
//! session push for local members, one RPC per remote member.
//!
//! Hosts plug in four seams and drive everything through [`PartyService`]:
//! a [`KvStore`] for the directory, an [`RpcTransport`] for node-to-node
//! frames, an [`AccountLocator`] for authoritative presence lookups, and a
//! [`SessionLookup`] for local session resolution.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod party;
pub mod rpc;
pub mod service;
pub mod session;
pub mod wire;

pub use cache::{AccountLocator, RemoteUserCache};
pub use config::PartyConfig;
pub use directory::{Directory, KvStore, MemoryKv};
pub use error::{DirectoryError, PartyError, RpcError, ValidationError};
pub use events::PartyEvents;
pub use party::{Party, Presence};
pub use rpc::{RpcRouter, RpcTransport};
pub use service::PartyService;
pub use session::{SessionHandle, SessionLookup, SessionMap};
pub use wire::PartyMessage;
