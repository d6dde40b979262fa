//! Error taxonomy for party coordination.
//!
//! Recoverable "not found" conditions (missing member, missing party, missing
//! session) are expressed as `bool`/`Option` returns on the operations
//! themselves — they never surface here. These types cover the failures a
//! caller can actually act on: directory store trouble, id collisions, wire
//! validation, and RPC delivery.

use uuid::Uuid;

/// Failure talking to the external expiring key-value store.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The store rejected or never answered the request.
    #[error("directory store unavailable: {0}")]
    Unavailable(String),
    /// Set-if-absent found the key already present on another node.
    #[error("directory key already published: {0}")]
    AlreadyPublished(String),
    /// The record was written but applying the TTL failed. The partial
    /// write has already been deleted when this is returned.
    #[error("directory TTL apply failed for {0}")]
    ExpireFailed(String),
}

/// Failure forwarding an envelope to a remote node.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("peer {0} unreachable")]
    Unreachable(String),
    #[error("rpc transport: {0}")]
    Transport(String),
}

/// Top-level party operation errors.
#[derive(Debug, thiserror::Error)]
pub enum PartyError {
    /// A freshly generated party id collided with a live entry. With a
    /// random 128-bit id space this is effectively impossible; it is still
    /// reported rather than silently overwriting.
    #[error("duplicate party id {0}")]
    Collision(Uuid),
    /// Directory publish or lookup failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// Ownership was assigned to an account that is not a member.
    #[error("owner {0} is not a party member")]
    OwnerNotMember(String),
    /// Ownership change requested on a party that has no owner yet.
    #[error("party {0} has no owner")]
    NoOwner(Uuid),
    /// The party is closed; no further operations are accepted.
    #[error("party {0} is closed")]
    Closed(Uuid),
}

/// Why an inbound envelope was dropped.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("envelope is not valid JSON: {0}")]
    Malformed(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("party id does not parse: {0:?}")]
    BadPartyId(String),
}
