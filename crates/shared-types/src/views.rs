//! # Views
//!
//! Identity records and the client-facing representations of senders and
//! events.

use crate::entities::{AccountId, BoxId, EventId, EventType, IdentityId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier kind carried by email identities.
pub const EMAIL_KIND: &str = "email";

/// Canonical identifier of an identity (e.g. an email address).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub value: String,
    pub kind: String,
}

impl Identifier {
    /// Build an email identifier.
    #[must_use]
    pub fn email(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: EMAIL_KIND.to_string(),
        }
    }

    /// Domain part of an email identifier, if any.
    #[must_use]
    pub fn email_domain(&self) -> Option<&str> {
        if self.kind != EMAIL_KIND {
            return None;
        }
        self.value.rsplit_once('@').map(|(_, domain)| domain)
    }
}

/// An identity as stored by the identity repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub identifier: Identifier,
    pub account_id: Option<AccountId>,
}

/// How an event sender (or box creator) is shown to clients.
///
/// The opaque form strips the identifier; only the acting identity or
/// internal checks get the transparent form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderView {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub identifier: Option<Identifier>,
    #[serde(skip)]
    pub account_id: Option<AccountId>,
}

impl SenderView {
    /// Id used for identities the repository does not know.
    pub const ANONYMOUS_ID: &'static str = "anonymous-user";

    /// Placeholder for identities the repository does not know.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: Self::ANONYMOUS_ID.to_string(),
            display_name: "Anonymous User".to_string(),
            avatar_url: None,
            identifier: None,
            account_id: None,
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.id == Self::ANONYMOUS_ID
    }

    /// Copy without personally identifying fields.
    #[must_use]
    pub fn opaque(&self) -> Self {
        Self {
            identifier: None,
            ..self.clone()
        }
    }
}

impl From<&Identity> for SenderView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.to_string(),
            display_name: identity.display_name.clone(),
            avatar_url: identity.avatar_url.clone(),
            identifier: Some(identity.identifier.clone()),
            account_id: identity.account_id,
        }
    }
}

/// An event as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventView {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// `None` when the stored payload is `{}`.
    pub content: Option<Value>,
    pub box_id: BoxId,
    pub id: EventId,
    #[serde(rename = "server_event_created_at")]
    pub created_at: Timestamp,
    pub referrer_id: Option<EventId>,
    pub sender: SenderView,
}
