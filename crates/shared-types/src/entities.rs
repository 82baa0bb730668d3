//! # Core Entities
//!
//! The append-only event record and its closed type set.

use crate::errors::TypeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of an event.
pub type EventId = Uuid;

/// Identifier of a box. A box only exists through its `create` event.
pub type BoxId = Uuid;

/// Identifier of an identity (event sender, box member).
pub type IdentityId = Uuid;

/// Identifier of an organization owning boxes.
pub type OrgId = Uuid;

/// Identifier of an end-user account (one account may own several identities).
pub type AccountId = Uuid;

/// UTC timestamp used for event creation times.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// EVENT TYPE
// =============================================================================

/// The closed set of event types a box log may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "create")]
    Create,
    #[serde(rename = "access.add")]
    AccessAdd,
    #[serde(rename = "access.rm")]
    AccessRm,
    #[serde(rename = "member.join")]
    MemberJoin,
    #[serde(rename = "member.leave")]
    MemberLeave,
    #[serde(rename = "member.kick")]
    MemberKick,
    #[serde(rename = "msg.text")]
    MsgText,
    #[serde(rename = "msg.file")]
    MsgFile,
    #[serde(rename = "msg.edit")]
    MsgEdit,
    #[serde(rename = "msg.delete")]
    MsgDelete,
    #[serde(rename = "state.access_mode")]
    StateAccessMode,
    #[serde(rename = "state.key_share")]
    StateKeyShare,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 12] = [
        EventType::Create,
        EventType::AccessAdd,
        EventType::AccessRm,
        EventType::MemberJoin,
        EventType::MemberLeave,
        EventType::MemberKick,
        EventType::MsgText,
        EventType::MsgFile,
        EventType::MsgEdit,
        EventType::MsgDelete,
        EventType::StateAccessMode,
        EventType::StateKeyShare,
    ];

    /// Types replayed to compute the declarative state of a box.
    pub const REQUIRED_TO_BUILD: [EventType; 2] = [EventType::Create, EventType::StateAccessMode];

    /// Types members see in the box history.
    pub const VISIBLE: [EventType; 7] = [
        EventType::Create,
        EventType::MsgText,
        EventType::MsgFile,
        EventType::MemberJoin,
        EventType::MemberLeave,
        EventType::MemberKick,
        EventType::StateAccessMode,
    ];

    /// Wire name of the type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Create => "create",
            EventType::AccessAdd => "access.add",
            EventType::AccessRm => "access.rm",
            EventType::MemberJoin => "member.join",
            EventType::MemberLeave => "member.leave",
            EventType::MemberKick => "member.kick",
            EventType::MsgText => "msg.text",
            EventType::MsgFile => "msg.file",
            EventType::MsgEdit => "msg.edit",
            EventType::MsgDelete => "msg.delete",
            EventType::StateAccessMode => "state.access_mode",
            EventType::StateKeyShare => "state.key_share",
        }
    }

    /// Whether the box projector replays this type.
    #[must_use]
    pub fn requires_to_build(&self) -> bool {
        Self::REQUIRED_TO_BUILD.contains(self)
    }

    /// Whether members see this type in the history.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        Self::VISIBLE.contains(self)
    }

    /// Whether this type initiates a message aggregate.
    #[must_use]
    pub fn is_message(&self) -> bool {
        matches!(self, EventType::MsgText | EventType::MsgFile)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TypeError::UnknownEventType(s.to_string()))
    }
}

// =============================================================================
// EVENT
// =============================================================================

/// An immutable entry of a box log.
///
/// Events are never updated. An event is superseded by the later events whose
/// `referrer_id` equals its `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub created_at: Timestamp,
    pub box_id: BoxId,
    pub sender_id: IdentityId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub referrer_id: Option<EventId>,
    /// Type-tagged payload. Types without a schema carry `{}`.
    pub content: Value,
}

impl Event {
    /// Build a new event stamped with a fresh v4 id and the current time.
    ///
    /// A `null` content is normalised to the empty object.
    #[must_use]
    pub fn new(
        event_type: EventType,
        box_id: BoxId,
        sender_id: IdentityId,
        content: Value,
        referrer_id: Option<EventId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            box_id,
            sender_id,
            event_type,
            referrer_id,
            content: normalize_content(content),
        }
    }

    /// True when the payload is `{}`.
    #[must_use]
    pub fn has_empty_content(&self) -> bool {
        is_empty_content(&self.content)
    }
}

/// The empty payload `{}`.
#[must_use]
pub fn empty_content() -> Value {
    Value::Object(Map::new())
}

/// True for `{}` and `null`.
#[must_use]
pub fn is_empty_content(content: &Value) -> bool {
    match content {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Map a `null` payload to `{}` and leave anything else untouched.
#[must_use]
pub fn normalize_content(content: Value) -> Value {
    if content.is_null() {
        empty_content()
    } else {
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_round_trips_through_wire_name() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert_eq!(
            "msg.unknown".parse::<EventType>(),
            Err(TypeError::UnknownEventType("msg.unknown".to_string()))
        );
    }

    #[test]
    fn test_event_type_families() {
        assert!(EventType::Create.requires_to_build());
        assert!(EventType::StateAccessMode.requires_to_build());
        assert!(!EventType::MsgText.requires_to_build());

        assert!(EventType::MemberKick.is_visible());
        assert!(!EventType::StateKeyShare.is_visible());
        assert!(!EventType::MsgEdit.is_visible());
        assert!(!EventType::AccessAdd.is_visible());

        assert!(EventType::MsgFile.is_message());
        assert!(!EventType::MsgEdit.is_message());
    }

    #[test]
    fn test_event_serializes_type_with_wire_name() {
        let event = Event::new(
            EventType::StateAccessMode,
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({"value": "public"}),
            None,
        );
        let raw = serde_json::to_value(&event).unwrap();
        assert_eq!(raw["type"], "state.access_mode");
        assert!(raw["referrer_id"].is_null());
    }

    #[test]
    fn test_null_content_is_normalized() {
        let event = Event::new(
            EventType::MemberJoin,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Value::Null,
            None,
        );
        assert_eq!(event.content, json!({}));
        assert!(event.has_empty_content());
    }
}
