//! # Message Aggregator
//!
//! Rebuilds a `Message` from its initiating event and referrers, and
//! overlays the result onto the initiating event for display.

use shared_types::{Event, EventId, EventType};
use tracing::warn;

use crate::domain::content::{parse_stored, MsgFileContent, MsgTextContent};
use crate::domain::errors::{BoxError, ForbiddenReason, RepoError};
use crate::domain::message::Message;
use crate::ports::outbound::{EventReader, FileStorageRepo};

/// Seed a message from its initiating event.
///
/// A missing blob is tolerated: the message then has no file id and size 0.
pub async fn seed_message(event: &Event, files: &dyn FileStorageRepo) -> Result<Message, BoxError> {
    match event.event_type {
        EventType::MsgText => {
            let content: MsgTextContent = parse_stored(event)?;
            Ok(Message::seed_text(event, &content))
        }
        EventType::MsgFile => {
            let content: MsgFileContent = parse_stored(event)?;
            let blob_size = match files.size(&content.encrypted_file_id).await {
                Ok(size) => Some(size),
                Err(RepoError::NotFound(_)) => None,
                Err(e) => return Err(BoxError::from(e).describe("getting file")),
            };
            Ok(Message::seed_file(event, &content, blob_size))
        }
        other => Err(BoxError::forbidden(
            ForbiddenReason::NotEditable,
            format!("wrong initial event type {other}"),
        )),
    }
}

/// Build the message initiated by `event_id`, folding its referrers oldest
/// first. A delete is terminal: referrers committed after it are skipped.
pub async fn build_message<R: EventReader + ?Sized>(
    reader: &R,
    files: &dyn FileStorageRepo,
    event_id: &EventId,
) -> Result<Message, BoxError> {
    let events = reader.event_and_referrers(event_id).await?;
    let Some((initial, referrers)) = events.split_first() else {
        return Err(BoxError::not_found(format!("event {event_id}")));
    };

    let mut msg = seed_message(initial, files).await?;
    for referrer in referrers {
        if msg.is_deleted() {
            warn!(
                message_id = %event_id,
                referrer_id = %referrer.id,
                event_type = %referrer.event_type,
                "Skipping referrer committed after delete"
            );
            continue;
        }
        msg.fold(referrer)?;
    }
    Ok(msg)
}

/// Replace the content of a message event by its current aggregate.
/// Non-message events are left untouched.
pub async fn build_aggregate<R: EventReader + ?Sized>(
    reader: &R,
    files: &dyn FileStorageRepo,
    event: &mut Event,
) -> Result<(), BoxError> {
    if !event.event_type.is_message() {
        return Ok(());
    }
    let msg = build_message(reader, files, &event.id)
        .await
        .map_err(|e| e.describe(format!("building message {}", event.id)))?;
    msg.overlay(&mut event.content);
    Ok(())
}
