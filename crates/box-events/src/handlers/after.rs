//! After steps: post-commit side effects, run by the outbox.
//!
//! Each step is independent. A failing step is reported to the outbox, which
//! logs it and retries or dead-letters it; the committed event stays.

use serde_json::{json, Value};
use shared_bus::{RealtimeUpdate, EVENT_NEW_KIND};
use shared_types::{Event, EventView};
use std::collections::BTreeSet;
use tracing::warn;

use box_telemetry::{metric_inc, REALTIME_UPDATES_SENT};

use crate::domain::cache_keys;
use crate::domain::errors::BoxError;
use crate::domain::message::Message;
use crate::domain::outbox::{AfterStep, Metadata};
use crate::engine::counts::{increment_counts, muted_members};
use crate::engine::files::is_orphan;
use crate::engine::formatter::format_event;
use crate::engine::identity_mapper::IdentityMapper;
use crate::engine::members::list_member_ids;
use crate::engine::projector::compute_box_state;
use crate::ports::outbound::{BoxSettingRepo, CacheService, EventStore, FileStorageRepo, QuotaRepo};

/// Collaborators available to After steps.
pub struct AfterContext<'a> {
    pub store: &'a dyn EventStore,
    pub cache: &'a dyn CacheService,
    pub mapper: &'a IdentityMapper,
    pub files: &'a dyn FileStorageRepo,
    pub quota: &'a dyn QuotaRepo,
    pub settings: &'a dyn BoxSettingRepo,
}

/// Run one After step.
pub async fn run_after(
    ctx: &AfterContext<'_>,
    step: AfterStep,
    event: &Event,
    metadata: &Metadata,
) -> Result<(), BoxError> {
    match step {
        AfterStep::SendRealtimeUpdate => send_realtime_update(ctx, event).await,
        AfterStep::CountActivity => count_activity(ctx, event).await,
        AfterStep::InvalidateCaches => invalidate_caches(ctx, event).await,
        AfterStep::ComputeUsedSpace => compute_used_space(ctx, event, metadata).await,
        AfterStep::NotifyKick => notify_kick(ctx, event).await,
        AfterStep::DeleteOrphanFile => delete_orphan_file(ctx, metadata).await,
    }
}

fn message_of<'m>(metadata: &'m Metadata, event: &Event) -> Result<&'m Message, BoxError> {
    metadata.message().ok_or_else(|| {
        BoxError::internal(format!("no message metadata for {} {}", event.event_type, event.id))
    })
}

fn with_owner_org(view: &EventView, owner_org_id: &shared_types::OrgId) -> Result<Value, BoxError> {
    let mut object = serde_json::to_value(view)
        .map_err(|e| BoxError::internal(format!("encoding event view: {e}")))?;
    if let Some(map) = object.as_object_mut() {
        map.insert("owner_org_id".into(), json!(owner_org_id));
    }
    Ok(object)
}

/// Push the event to every member and to its sender. The creator gets the
/// transparent view.
async fn send_realtime_update(ctx: &AfterContext<'_>, event: &Event) -> Result<(), BoxError> {
    let member_ids = list_member_ids(ctx.store, ctx.cache, &event.box_id)
        .await
        .map_err(|e| e.describe("notifying member: listing members"))?;
    let mut recipients: BTreeSet<_> = member_ids.into_iter().collect();
    recipients.insert(event.sender_id);

    let state = compute_box_state(ctx.store, &event.box_id)
        .await
        .map_err(|e| e.describe("getting creator"))?;
    let opaque = format_event(ctx.mapper, event.clone(), false)
        .await
        .map_err(|e| e.describe("formatting event"))?;
    let transparent = format_event(ctx.mapper, event.clone(), true)
        .await
        .map_err(|e| e.describe("formatting event"))?;
    let opaque = with_owner_org(&opaque, &state.owner_org_id)?;
    let transparent = with_owner_org(&transparent, &state.owner_org_id)?;

    for identity_id in recipients {
        let object = if identity_id == state.creator_id {
            transparent.clone()
        } else {
            opaque.clone()
        };
        ctx.cache
            .publish(RealtimeUpdate::for_identity(&identity_id, EVENT_NEW_KIND, object))
            .await?;
        metric_inc!(REALTIME_UPDATES_SENT);
    }
    Ok(())
}

/// Bump unread and digest counters of members other than the sender who
/// did not mute the box.
async fn count_activity(ctx: &AfterContext<'_>, event: &Event) -> Result<(), BoxError> {
    let member_ids = list_member_ids(ctx.store, ctx.cache, &event.box_id)
        .await
        .map_err(|e| e.describe("counting activity: listing members"))?;
    let muted = muted_members(ctx.settings, &event.box_id).await?;

    let recipients: Vec<_> = member_ids
        .into_iter()
        .filter(|id| id != &event.sender_id && !muted.contains(id))
        .collect();
    increment_counts(ctx.cache, &recipients, &event.box_id).await
}

/// Drop the members set of the box and every box list of the sender.
async fn invalidate_caches(ctx: &AfterContext<'_>, event: &Event) -> Result<(), BoxError> {
    if let Err(e) = ctx
        .cache
        .delete(&[cache_keys::members_key(&event.box_id)])
        .await
    {
        warn!(box_id = %event.box_id, error = %e, "Could not clean box members cache");
    }
    if let Err(e) = ctx
        .cache
        .delete_matching(&cache_keys::user_boxes_prefix(&event.sender_id), "")
        .await
    {
        warn!(box_id = %event.box_id, identity_id = %event.sender_id, error = %e, "Could not clean user boxes cache");
    }
    Ok(())
}

async fn compute_used_space(
    ctx: &AfterContext<'_>,
    event: &Event,
    metadata: &Metadata,
) -> Result<(), BoxError> {
    let msg = message_of(metadata, event)?;
    ctx.quota
        .update_used_space(&msg.box_id, msg.new_size, msg.old_size)
        .await
        .map_err(|e| BoxError::from(e).describe("updating used space"))
}

/// Tell the kicked identity (the kick sender) which box it was removed from.
async fn notify_kick(ctx: &AfterContext<'_>, event: &Event) -> Result<(), BoxError> {
    let state = compute_box_state(ctx.store, &event.box_id)
        .await
        .map_err(|e| e.describe("computing box"))?;
    let details = json!({
        "id": state.id,
        "title": state.title,
        "owner_org_id": state.owner_org_id,
    });
    ctx.mapper
        .notify_bulk(&[event.sender_id], event.event_type.as_str(), details)
        .await;
    Ok(())
}

/// Delete the blob of a deleted file message once it is orphan.
async fn delete_orphan_file(ctx: &AfterContext<'_>, metadata: &Metadata) -> Result<(), BoxError> {
    let Some(file_id) = metadata.message().and_then(|m| m.file_id) else {
        return Ok(());
    };
    if is_orphan(ctx.store, ctx.files, &file_id)
        .await
        .map_err(|e| e.describe("checking if file is orphan"))?
    {
        ctx.files
            .delete(&file_id)
            .await
            .map_err(|e| BoxError::from(e).describe("deleting stored file"))?;
    }
    Ok(())
}
