//! Party control-plane wire protocol — tagged JSON envelopes.
//!
//! Every cross-node party notification is one [`PartyMessage`] carried by the
//! RPC transport (and delivered verbatim to local sessions). The party id
//! travels as text; it is parsed back to a [`Uuid`] during inbound dispatch,
//! and a parse failure aborts handling — a malformed id is never silently
//! replaced with a nil id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// A party control-plane message — the sole on-the-wire type.
///
/// `party_id` is the text rendering of the 128-bit party id; `account_id`
/// names the account the message is *about* (the inviter, the enterer, the
/// leaver). Delivery targets are carried per-variant (`receiver_id`,
/// `owner_id`, `recommender_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PartyMessage {
    /// A member asks the owner to invite `account_id` to the party.
    #[serde(rename = "recommendation_request")]
    RecommendationRequest {
        party_id: String,
        account_id: String,
        recommender_id: String,
        owner_id: String,
    },

    /// The owner's verdict on a recommendation, routed back to the
    /// recommender.
    #[serde(rename = "recommendation_response")]
    RecommendationResponse {
        party_id: String,
        account_id: String,
        recommender_id: String,
        owner_id: String,
        result: bool,
    },

    /// The owner invites `account_id` to join, delivered on whichever node
    /// hosts that account's session.
    #[serde(rename = "ask_participation")]
    AskParticipation { party_id: String, account_id: String },

    /// `account_id` entered the party; addressed to `receiver_id`.
    #[serde(rename = "entered")]
    Entered {
        party_id: String,
        account_id: String,
        receiver_id: String,
    },

    /// `account_id` left the party; addressed to `receiver_id`.
    #[serde(rename = "left")]
    Left {
        party_id: String,
        account_id: String,
        receiver_id: String,
    },

    /// The party was closed by `account_id` (the owner at close time).
    #[serde(rename = "closed")]
    Closed { party_id: String, account_id: String },
}

impl PartyMessage {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON text frame. Unknown `type` tags fail.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// The text-encoded party id this message refers to.
    pub fn party_id_text(&self) -> &str {
        match self {
            Self::RecommendationRequest { party_id, .. }
            | Self::RecommendationResponse { party_id, .. }
            | Self::AskParticipation { party_id, .. }
            | Self::Entered { party_id, .. }
            | Self::Left { party_id, .. }
            | Self::Closed { party_id, .. } => party_id,
        }
    }

    /// The account the message is about.
    pub fn account_id(&self) -> &str {
        match self {
            Self::RecommendationRequest { account_id, .. }
            | Self::RecommendationResponse { account_id, .. }
            | Self::AskParticipation { account_id, .. }
            | Self::Entered { account_id, .. }
            | Self::Left { account_id, .. }
            | Self::Closed { account_id, .. } => account_id,
        }
    }

    /// Check that every field required by this variant is present and
    /// non-empty. An envelope that fails validation is dropped by the
    /// router without a response.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(self.party_id_text(), "party_id")?;
        require(self.account_id(), "account_id")?;
        match self {
            Self::RecommendationRequest {
                recommender_id,
                owner_id,
                ..
            }
            | Self::RecommendationResponse {
                recommender_id,
                owner_id,
                ..
            } => {
                require(recommender_id, "recommender_id")?;
                require(owner_id, "owner_id")
            }
            Self::Entered { receiver_id, .. } | Self::Left { receiver_id, .. } => {
                require(receiver_id, "receiver_id")
            }
            Self::AskParticipation { .. } | Self::Closed { .. } => Ok(()),
        }
    }

    /// Parse the carried party id. A failure here aborts inbound handling
    /// with a logged validation error.
    pub fn parsed_party_id(&self) -> Result<Uuid, ValidationError> {
        let text = self.party_id_text();
        Uuid::parse_str(text).map_err(|_| ValidationError::BadPartyId(text.to_owned()))
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}
