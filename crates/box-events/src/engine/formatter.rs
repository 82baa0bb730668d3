//! Client views of events.

use serde_json::Value;
use shared_types::{is_empty_content, Event, EventType, EventView, IdentityId};

use crate::domain::errors::BoxError;
use crate::engine::identity_mapper::IdentityMapper;

/// Turn an event into its client view.
///
/// Identity ids embedded in the content (the deleter of a message, the
/// kicker of a member) are replaced by sender views resolved with the same
/// transparency as the event sender.
pub async fn format_event(
    mapper: &IdentityMapper,
    event: Event,
    transparent: bool,
) -> Result<EventView, BoxError> {
    let sender = mapper
        .get(&event.sender_id, transparent)
        .await
        .map_err(|e| e.describe("getting sender"))?;

    let mut content = event.content;
    match event.event_type {
        EventType::MsgText | EventType::MsgFile => {
            let deleter = content
                .get_mut("deleted")
                .and_then(Value::as_object_mut)
                .and_then(|deleted| deleted.remove("by_identity_id"));
            if let Some(id) = deleter.as_ref().and_then(parse_identity_id) {
                let view = mapper
                    .get(&id, transparent)
                    .await
                    .map_err(|e| e.describe("getting deleter"))?;
                if let Some(deleted) = content.get_mut("deleted").and_then(Value::as_object_mut) {
                    deleted.insert("by_identity".into(), serde_json::to_value(view).map_err(encode_error)?);
                }
            }
        }
        EventType::MemberKick => {
            let kicker = content
                .as_object_mut()
                .and_then(|map| map.remove("kicker_id"));
            if let Some(id) = kicker.as_ref().and_then(parse_identity_id) {
                let view = mapper
                    .get(&id, transparent)
                    .await
                    .map_err(|e| e.describe("getting kicker"))?;
                if let Some(map) = content.as_object_mut() {
                    map.insert("kicker".into(), serde_json::to_value(view).map_err(encode_error)?);
                }
            }
        }
        _ => {}
    }

    Ok(EventView {
        event_type: event.event_type,
        content: (!is_empty_content(&content)).then_some(content),
        box_id: event.box_id,
        id: event.id,
        created_at: event.created_at,
        referrer_id: event.referrer_id,
        sender,
    })
}

fn parse_identity_id(value: &Value) -> Option<IdentityId> {
    value.as_str().and_then(|s| s.parse().ok())
}

fn encode_error(e: serde_json::Error) -> BoxError {
    BoxError::internal(format!("encoding sender view: {e}"))
}
