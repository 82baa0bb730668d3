//! # Content Registry
//!
//! Per-type payload schemas. `validate` is the single entry point used on the
//! write path: it parses the raw JSON payload of a candidate event into its
//! typed form and rejects it with `BadRequest` before anything is persisted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{is_empty_content, Event, EventType, IdentityId, OrgId};
use uuid::Uuid;

use super::errors::BoxError;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 50;

/// Payload of `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationContent {
    pub owner_org_id: OrgId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatag_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_identity_id: Option<IdentityId>,
    pub public_key: String,
    pub title: String,
}

/// Kind of an access rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionType {
    /// Exact identifier value.
    Identifier,
    /// Domain part of an email identifier.
    EmailDomain,
}

impl RestrictionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionType::Identifier => "identifier",
            RestrictionType::EmailDomain => "email_domain",
        }
    }
}

/// Payload of `access.add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContent {
    pub restriction_type: RestrictionType,
    pub value: String,
    #[serde(default)]
    pub auto_invite: bool,
}

impl AccessContent {
    #[must_use]
    pub fn identifier(value: impl Into<String>) -> Self {
        Self {
            restriction_type: RestrictionType::Identifier,
            value: value.into(),
            auto_invite: false,
        }
    }

    #[must_use]
    pub fn email_domain(value: impl Into<String>) -> Self {
        Self {
            restriction_type: RestrictionType::EmailDomain,
            value: value.into(),
            auto_invite: false,
        }
    }
}

/// Payload of `msg.text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTextContent {
    pub encrypted: String,
    pub public_key: String,
}

/// Payload of `msg.file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgFileContent {
    pub encrypted: String,
    pub public_key: String,
    pub encrypted_file_id: Uuid,
}

/// Payload of `msg.edit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEditContent {
    pub new_encrypted: String,
    pub new_public_key: String,
}

/// Who may join a box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Public,
    #[default]
    Limited,
}

/// Payload of `state.access_mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessModeContent {
    pub value: AccessMode,
}

/// Payload of `member.kick`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberKickContent {
    pub kicker_id: IdentityId,
}

/// A validated payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Creation(CreationContent),
    Access(AccessContent),
    MsgText(MsgTextContent),
    MsgFile(MsgFileContent),
    MsgEdit(MsgEditContent),
    AccessMode(AccessModeContent),
    MemberKick(MemberKickContent),
    /// Types without a schema.
    Empty,
}

/// Parse and validate the payload of a candidate event.
pub fn validate(event_type: EventType, raw: &Value) -> Result<Content, BoxError> {
    let content = match event_type {
        EventType::Create => {
            let c: CreationContent = parse(event_type, raw)?;
            validate_creation(&c)?;
            Content::Creation(c)
        }
        EventType::AccessAdd => {
            let c: AccessContent = parse(event_type, raw)?;
            require_non_empty("value", &c.value)?;
            Content::Access(c)
        }
        EventType::MsgText => {
            let c: MsgTextContent = parse(event_type, raw)?;
            validate_ciphertext("encrypted", &c.encrypted)?;
            require_non_empty("public_key", &c.public_key)?;
            Content::MsgText(c)
        }
        EventType::MsgFile => {
            let c: MsgFileContent = parse(event_type, raw)?;
            validate_ciphertext("encrypted", &c.encrypted)?;
            require_non_empty("public_key", &c.public_key)?;
            require_v4("encrypted_file_id", &c.encrypted_file_id)?;
            Content::MsgFile(c)
        }
        EventType::MsgEdit => {
            let c: MsgEditContent = parse(event_type, raw)?;
            validate_ciphertext("new_encrypted", &c.new_encrypted)?;
            require_non_empty("new_public_key", &c.new_public_key)?;
            Content::MsgEdit(c)
        }
        EventType::StateAccessMode => Content::AccessMode(parse(event_type, raw)?),
        EventType::MemberKick => Content::MemberKick(parse(event_type, raw)?),
        EventType::AccessRm
        | EventType::MemberJoin
        | EventType::MemberLeave
        | EventType::MsgDelete
        | EventType::StateKeyShare => {
            if !is_empty_content(raw) {
                return Err(BoxError::bad_request(format!(
                    "{event_type} events take no content"
                )));
            }
            Content::Empty
        }
    };
    Ok(content)
}

/// Decode the payload of an already stored event.
///
/// A stored payload that does not parse means the log is corrupt.
pub fn parse_stored<T: DeserializeOwned>(event: &Event) -> Result<T, BoxError> {
    serde_json::from_value(event.content.clone()).map_err(|e| {
        BoxError::internal(format!(
            "corrupt {} content on event {}: {e}",
            event.event_type, event.id
        ))
    })
}

fn parse<T: DeserializeOwned>(event_type: EventType, raw: &Value) -> Result<T, BoxError> {
    serde_json::from_value(raw.clone())
        .map_err(|e| BoxError::bad_request(format!("invalid {event_type} content: {e}")))
}

fn validate_creation(c: &CreationContent) -> Result<(), BoxError> {
    if let Some(datatag_id) = &c.datatag_id {
        require_v4("datatag_id", datatag_id)?;
    }
    if let Some(subject) = &c.subject_identity_id {
        require_v4("subject_identity_id", subject)?;
    }
    require_non_empty("public_key", &c.public_key)?;
    if !is_unpadded_url_safe(&c.public_key) {
        return Err(BoxError::bad_request(
            "public_key must be unpadded url-safe base64",
        ));
    }
    let len = c.title.chars().count();
    if len == 0 || len > MAX_TITLE_LEN {
        return Err(BoxError::bad_request(format!(
            "title must be 1 to {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

/// Alphabet check of unpadded url-safe base64. Key material is opaque, so the
/// length is not checked.
fn is_unpadded_url_safe(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn validate_ciphertext(field: &str, value: &str) -> Result<(), BoxError> {
    require_non_empty(field, value)?;
    if STANDARD.decode(value).is_err() {
        return Err(BoxError::bad_request(format!("{field} must be base64")));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), BoxError> {
    if value.is_empty() {
        return Err(BoxError::bad_request(format!("{field} is required")));
    }
    Ok(())
}

fn require_v4(field: &str, id: &Uuid) -> Result<(), BoxError> {
    if id.get_version_num() != 4 {
        return Err(BoxError::bad_request(format!("{field} must be a uuid v4")));
    }
    Ok(())
}
