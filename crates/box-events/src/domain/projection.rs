//! # Box Projection
//!
//! A box only exists as the replay of its `create` and `state.access_mode`
//! events. Nothing in this module is persisted.

use serde::{Deserialize, Serialize};
use shared_types::{BoxId, Event, EventType, EventView, IdentityId, OrgId, SenderView, Timestamp};
use uuid::Uuid;

use super::content::{parse_stored, AccessMode, AccessModeContent, CreationContent};
use super::errors::BoxError;

/// Declarative state of a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxState {
    pub id: BoxId,
    #[serde(rename = "server_created_at")]
    pub created_at: Timestamp,
    pub owner_org_id: OrgId,
    pub datatag_id: Option<Uuid>,
    pub public_key: String,
    pub title: String,
    pub access_mode: AccessMode,
    #[serde(skip)]
    pub creator_id: IdentityId,
    #[serde(skip)]
    pub subject_identity_id: Option<IdentityId>,
}

impl BoxState {
    /// Replay build events given newest first, as the store returns them.
    ///
    /// Returns `NotFound` when the log holds no `create` event.
    pub fn replay(box_id: BoxId, newest_first: &[Event]) -> Result<Self, BoxError> {
        let mut state: Option<BoxState> = None;
        let mut access_mode = AccessMode::default();

        for event in newest_first.iter().rev() {
            match event.event_type {
                EventType::Create => {
                    let content: CreationContent = parse_stored(event)?;
                    state = Some(BoxState {
                        id: box_id,
                        created_at: event.created_at,
                        owner_org_id: content.owner_org_id,
                        datatag_id: content.datatag_id,
                        public_key: content.public_key,
                        title: content.title,
                        access_mode,
                        creator_id: event.sender_id,
                        subject_identity_id: content.subject_identity_id,
                    });
                }
                EventType::StateAccessMode => {
                    let content: AccessModeContent = parse_stored(event)?;
                    access_mode = content.value;
                }
                _ => {}
            }
        }

        let mut state = state.ok_or_else(|| BoxError::not_found(format!("box {box_id}")))?;
        state.access_mode = access_mode;
        Ok(state)
    }
}

/// Per identity and box preferences. Not event-sourced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSetting {
    pub identity_id: IdentityId,
    pub box_id: BoxId,
    pub muted: bool,
}

impl BoxSetting {
    /// The setting a missing row reads as.
    #[must_use]
    pub fn default_for(identity_id: IdentityId, box_id: BoxId) -> Self {
        Self {
            identity_id,
            box_id,
            muted: false,
        }
    }
}

/// A box as returned to readers. Rebuilt on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxView {
    #[serde(flatten)]
    pub state: BoxState,
    pub creator: SenderView,
    pub subject: Option<SenderView>,
    pub last_event: EventView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<BoxSetting>,
}

impl BoxView {
    #[must_use]
    pub fn id(&self) -> BoxId {
        self.state.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn create_event(box_id: BoxId, creator: IdentityId) -> Event {
        let mut e = Event::new(EventType::Create, box_id, creator, json!({}), None);
        e.content = json!({
            "owner_org_id": Uuid::new_v4(),
            "public_key": "pk",
            "title": "Lunch",
        });
        e
    }

    fn mode_event(create: &Event, mode: &str, offset: i64) -> Event {
        let mut e = Event::new(
            EventType::StateAccessMode,
            create.box_id,
            create.sender_id,
            json!({ "value": mode }),
            None,
        );
        e.created_at = create.created_at + Duration::seconds(offset);
        e
    }

    #[test]
    fn test_replay_defaults_to_limited() {
        let box_id = Uuid::new_v4();
        let creator = Uuid::new_v4();
        let create = create_event(box_id, creator);

        let state = BoxState::replay(box_id, &[create]).unwrap();
        assert_eq!(state.access_mode, AccessMode::Limited);
        assert_eq!(state.creator_id, creator);
        assert_eq!(state.title, "Lunch");
    }

    #[test]
    fn test_replay_latest_mode_wins() {
        let box_id = Uuid::new_v4();
        let create = create_event(box_id, Uuid::new_v4());
        let public = mode_event(&create, "public", 1);
        let limited = mode_event(&create, "limited", 2);
        let public_again = mode_event(&create, "public", 3);

        let newest_first = vec![public_again, limited.clone(), public, create.clone()];
        let state = BoxState::replay(box_id, &newest_first).unwrap();
        assert_eq!(state.access_mode, AccessMode::Public);

        let state = BoxState::replay(box_id, &[limited, create]).unwrap();
        assert_eq!(state.access_mode, AccessMode::Limited);
    }

    #[test]
    fn test_replay_without_create_is_not_found() {
        let box_id = Uuid::new_v4();
        let create = create_event(box_id, Uuid::new_v4());
        let mode = mode_event(&create, "public", 1);
        assert!(BoxState::replay(box_id, &[mode]).unwrap_err().is_not_found());
        assert!(BoxState::replay(box_id, &[]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_state_serializes_without_private_ids() {
        let box_id = Uuid::new_v4();
        let state = BoxState::replay(box_id, &[create_event(box_id, Uuid::new_v4())]).unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("server_created_at").is_some());
        assert!(json.get("creator_id").is_none());
        assert_eq!(json["access_mode"], "limited");
    }
}
