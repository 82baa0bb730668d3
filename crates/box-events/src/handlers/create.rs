//! `create` Do step.

use shared_types::Event;

use super::{forbid_referrer, DoContext};
use crate::domain::errors::BoxError;
use crate::domain::outbox::Metadata;
use crate::engine::access::create_event_of;

/// A box is created once: a second `create` for the same id is a conflict.
pub async fn do_create(ctx: &mut DoContext<'_>, event: &mut Event) -> Result<Metadata, BoxError> {
    forbid_referrer(event)?;

    match create_event_of(&*ctx.txn, &event.box_id).await {
        Ok(_) => {
            return Err(BoxError::conflict(format!(
                "box {} already exists",
                event.box_id
            )))
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.describe("checking box existence")),
    }

    ctx.txn.insert(event.clone()).await?;
    Ok(Metadata::None)
}
