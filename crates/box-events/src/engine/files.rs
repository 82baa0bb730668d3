//! Files shared in boxes.

use shared_types::{BoxId, Event, EventType};
use uuid::Uuid;

use crate::domain::errors::BoxError;
use crate::domain::filters::{EventFilter, Unreferred};
use crate::ports::outbound::{EventReader, FileStorageRepo};

/// Filter for the `msg.file` events of a box that were not deleted.
#[must_use]
pub fn active_files_filter(box_id: BoxId) -> EventFilter {
    EventFilter::for_box(box_id)
        .of_type(EventType::MsgFile)
        .unreferred(Unreferred::by_types(&[EventType::MsgDelete]))
}

/// Active `msg.file` events of a box, newest first.
pub async fn list_files<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<Vec<Event>, BoxError> {
    let events = reader
        .find(&active_files_filter(*box_id).paginate(offset, limit))
        .await?;
    Ok(events)
}

/// A blob is orphan once nobody saved it and every `msg.file` event
/// pointing at it, in any box, is deleted.
pub async fn is_orphan<R: EventReader + ?Sized>(
    reader: &R,
    files: &dyn FileStorageRepo,
    file_id: &Uuid,
) -> Result<bool, BoxError> {
    let saved = files
        .saved_references(file_id)
        .await
        .map_err(|e| BoxError::from(e).describe("counting saved files"))?;
    if saved > 0 {
        return Ok(false);
    }

    let live = reader
        .count(
            &EventFilter::new()
                .of_type(EventType::MsgFile)
                .file(*file_id)
                .unreferred(Unreferred::by_types(&[EventType::MsgDelete])),
        )
        .await?;
    Ok(live == 0)
}
