//! `msg.*` Do steps.

use shared_types::Event;

use super::{forbid_referrer, require_referrer, DoContext};
use crate::domain::errors::{BoxError, ForbiddenReason};
use crate::domain::message::Message;
use crate::domain::outbox::Metadata;
use crate::engine::access::must_be_admin;
use crate::engine::aggregator::{build_message, seed_message};
use crate::engine::members::must_be_member;

/// Post a text or file message. The seeded message feeds the quota step.
pub async fn do_message(ctx: &mut DoContext<'_>, event: &mut Event) -> Result<Metadata, BoxError> {
    must_be_member(&*ctx.txn, ctx.cache, &event.box_id, &event.sender_id).await?;
    forbid_referrer(event)?;

    let msg = seed_message(event, ctx.files).await?;
    ctx.txn.insert(event.clone()).await?;
    Ok(Metadata::Message(msg))
}

/// Message referred to by a modifier, checked to live in the same box.
async fn referred_message(ctx: &DoContext<'_>, event: &Event) -> Result<Message, BoxError> {
    let referrer_id = require_referrer(event)?;
    let msg = build_message(&*ctx.txn, ctx.files, &referrer_id)
        .await
        .map_err(|e| e.describe("building message"))?;
    if msg.box_id != event.box_id {
        return Err(BoxError::bad_request(format!(
            "message {referrer_id} belongs to another box"
        )));
    }
    Ok(msg)
}

/// Edit a text message. Only its author can, until it is deleted.
pub async fn do_edit(ctx: &mut DoContext<'_>, event: &mut Event) -> Result<Metadata, BoxError> {
    must_be_member(&*ctx.txn, ctx.cache, &event.box_id, &event.sender_id).await?;

    let mut msg = referred_message(ctx, event).await?;
    msg.ensure_author(&event.sender_id)?;
    msg.ensure_not_deleted()?;
    if msg.is_file() {
        return Err(BoxError::forbidden(
            ForbiddenReason::NotEditable,
            format!("cannot edit event type {}", msg.event_type),
        ));
    }

    ctx.txn.insert(event.clone()).await?;
    msg.fold(event)?;
    Ok(Metadata::Message(msg))
}

/// Delete a message. Box admins can delete messages of other members.
pub async fn do_delete(ctx: &mut DoContext<'_>, event: &mut Event) -> Result<Metadata, BoxError> {
    must_be_member(&*ctx.txn, ctx.cache, &event.box_id, &event.sender_id).await?;

    let mut msg = referred_message(ctx, event).await?;
    if msg.initial_sender_id != event.sender_id {
        must_be_admin(&*ctx.txn, &msg.box_id, &event.sender_id)
            .await
            .map_err(|e| e.describe("checking admins"))?;
    }
    if msg.is_deleted() {
        return Err(BoxError::gone("cannot delete an already deleted message"));
    }

    ctx.txn.insert(event.clone()).await?;
    msg.fold(event)?;
    Ok(Metadata::Message(msg))
}
