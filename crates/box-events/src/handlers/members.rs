//! Membership Do steps and the kick sweep.

use serde_json::json;
use shared_types::{BoxId, Event, EventType, IdentityId};
use tracing::debug;

use super::DoContext;
use crate::domain::content::AccessContent;
use crate::domain::errors::{BoxError, ForbiddenReason};
use crate::domain::outbox::Metadata;
use crate::engine::access::{is_admin, must_be_able_to_join};
use crate::engine::identity_mapper::IdentityMapper;
use crate::engine::members::{active_join_of, active_joins, is_member, must_be_member};
use crate::handlers::access::find_active_rule;
use crate::ports::outbound::EventTransaction;

/// Join a box. A joiner with an identifier also gets an identifier rule of
/// its own when none exists yet.
pub async fn do_join(ctx: &mut DoContext<'_>, event: &mut Event) -> Result<Metadata, BoxError> {
    if is_member(&*ctx.txn, ctx.cache, &event.box_id, &event.sender_id)
        .await
        .map_err(|e| e.describe("checking membership"))?
    {
        return Err(BoxError::conflict("already box member"));
    }
    must_be_able_to_join(
        &*ctx.txn,
        ctx.mapper,
        ctx.config.first_rule_only,
        &event.box_id,
        &event.sender_id,
    )
    .await
    .map_err(|e| e.describe("checking joinability"))?;

    let identity = ctx
        .mapper
        .get(&event.sender_id, true)
        .await
        .map_err(|e| e.describe("doing join"))?;
    if let Some(identifier) = identity.identifier {
        let rule = AccessContent::identifier(identifier.value);
        if find_active_rule(&*ctx.txn, event, &rule).await?.is_none() {
            let content = serde_json::to_value(&rule)
                .map_err(|e| BoxError::internal(format!("encoding access rule: {e}")))?;
            let access = Event::new(
                EventType::AccessAdd,
                event.box_id,
                event.sender_id,
                content,
                None,
            );
            debug!(box_id = %event.box_id, identity_id = %event.sender_id, "Provisioning identifier rule for joiner");
            ctx.txn.insert(access).await?;
        }
    }

    ctx.txn.insert(event.clone()).await?;
    Ok(Metadata::None)
}

/// Leave a box. The event is made to refer to the sender's active join.
pub async fn do_leave(ctx: &mut DoContext<'_>, event: &mut Event) -> Result<Metadata, BoxError> {
    must_be_member(&*ctx.txn, ctx.cache, &event.box_id, &event.sender_id).await?;
    if is_admin(&*ctx.txn, &event.box_id, &event.sender_id).await? {
        return Err(BoxError::forbidden(
            ForbiddenReason::AdminCannotLeave,
            "admin can't leave their own box",
        ));
    }

    let join = active_join_of(&*ctx.txn, &event.box_id, &event.sender_id)
        .await?
        .ok_or_else(|| BoxError::not_found("getting last join event"))?;
    event.referrer_id = Some(join.id);

    ctx.txn.insert(event.clone()).await?;
    Ok(Metadata::None)
}

/// Supersede every active join whose sender no longer passes the access
/// policy with a system `member.kick` sent in the kicked identity's name.
///
/// Returns the staged kicks; the caller commits them.
pub async fn kick_deprecated_members(
    txn: &mut dyn EventTransaction,
    mapper: &IdentityMapper,
    first_rule_only: bool,
    box_id: &BoxId,
    kicker_id: &IdentityId,
) -> Result<Vec<Event>, BoxError> {
    let joins = active_joins(&*txn, box_id).await?;
    let mut kicks = Vec::new();

    for join in joins {
        match must_be_able_to_join(&*txn, mapper, first_rule_only, box_id, &join.sender_id).await {
            Ok(()) => {}
            Err(e) if e.is_forbidden() => {
                let kick = Event::new(
                    EventType::MemberKick,
                    *box_id,
                    join.sender_id,
                    json!({ "kicker_id": kicker_id }),
                    Some(join.id),
                );
                txn.insert(kick.clone()).await?;
                kicks.push(kick);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(kicks)
}
