//! `access.add` and `access.rm` Do steps.

use serde_json::{json, Value};
use shared_types::{Event, EventType};

use super::{require_referrer, DoContext};
use crate::domain::content::{parse_stored, AccessContent, RestrictionType};
use crate::domain::errors::BoxError;
use crate::domain::filters::{EventFilter, Unreferred};
use crate::domain::outbox::Metadata;
use crate::engine::access::must_be_admin;
use crate::engine::projector::compute_box_state;
use crate::ports::outbound::EventReader;

/// Active rule with the same restriction type and value, if any.
pub async fn find_active_rule<R: EventReader + ?Sized>(
    reader: &R,
    event: &Event,
    rule: &AccessContent,
) -> Result<Option<Event>, BoxError> {
    let found = reader
        .find(
            &EventFilter::for_box(event.box_id)
                .of_type(EventType::AccessAdd)
                .content_contains(json!({
                    "restriction_type": rule.restriction_type,
                    "value": rule.value,
                }))
                .unreferred(Unreferred::by_types(&[EventType::AccessRm]))
                .limit(1),
        )
        .await?;
    Ok(found.into_iter().next())
}

/// Add an access rule. Identifier rules may auto-invite the identifier,
/// which requires the invitation material in `extra`.
pub async fn do_add_access(
    ctx: &mut DoContext<'_>,
    event: &mut Event,
    extra: Option<&Value>,
) -> Result<Metadata, BoxError> {
    must_be_admin(&*ctx.txn, &event.box_id, &event.sender_id)
        .await
        .map_err(|e| e.describe("checking admin"))?;

    let rule: AccessContent = parse_stored(event)?;
    if find_active_rule(&*ctx.txn, event, &rule).await?.is_some() {
        return Err(BoxError::conflict("this access already exists"));
    }

    let invite = rule.restriction_type == RestrictionType::Identifier && rule.auto_invite;
    if rule.restriction_type == RestrictionType::Identifier {
        match (rule.auto_invite, extra) {
            (true, None) => return Err(BoxError::bad_request("extra is required for auto_invite")),
            (false, Some(_)) => return Err(BoxError::bad_request("extra given without auto_invite")),
            _ => {}
        }
    }

    ctx.txn.insert(event.clone()).await?;

    if let (true, Some(extra)) = (invite, extra) {
        let state = compute_box_state(&*ctx.txn, &event.box_id)
            .await
            .map_err(|e| e.describe("computing the box"))?;
        ctx.crypto
            .create_invitation_actions(&event.sender_id, &event.box_id, &state.title, &rule.value, extra)
            .await
            .map_err(|e| BoxError::from(e).describe("creating crypto actions"))?;
    }
    Ok(Metadata::None)
}

/// Remove an active access rule of the box.
pub async fn do_rm_access(ctx: &mut DoContext<'_>, event: &mut Event) -> Result<Metadata, BoxError> {
    must_be_admin(&*ctx.txn, &event.box_id, &event.sender_id)
        .await
        .map_err(|e| e.describe("checking admin"))?;

    let referrer_id = require_referrer(event)?;
    if !event.has_empty_content() {
        return Err(BoxError::bad_request("content should be empty"));
    }

    let rule = ctx
        .txn
        .find(
            &EventFilter::for_box(event.box_id)
                .id(referrer_id)
                .of_type(EventType::AccessAdd)
                .unreferred(Unreferred::any())
                .limit(1),
        )
        .await?;
    if rule.is_empty() {
        return Err(BoxError::not_found(format!(
            "active access.add {referrer_id}"
        )));
    }

    ctx.txn.insert(event.clone()).await?;
    Ok(Metadata::None)
}
