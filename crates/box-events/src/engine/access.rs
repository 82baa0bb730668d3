//! # Access Control
//!
//! Admin, public mode and access rule evaluation. Every check reads through
//! an `EventReader`, so inside a transaction it also sees the transaction's
//! own pending events.

use shared_types::{BoxId, Event, EventType, IdentityId};
use tracing::warn;

use crate::domain::content::{
    parse_stored, AccessContent, AccessMode, AccessModeContent, RestrictionType,
};
use crate::domain::errors::{BoxError, ForbiddenReason};
use crate::domain::filters::{EventFilter, Unreferred};
use crate::engine::identity_mapper::IdentityMapper;
use crate::ports::outbound::EventReader;

/// The `create` event of a box, `NotFound` when the box does not exist.
pub async fn create_event_of<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
) -> Result<Event, BoxError> {
    reader
        .find(&EventFilter::for_box(*box_id).of_type(EventType::Create).limit(1))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| BoxError::not_found(format!("box {box_id}")))
}

/// Whether the identity created the box.
pub async fn is_admin<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
    identity_id: &IdentityId,
) -> Result<bool, BoxError> {
    let create = create_event_of(reader, box_id).await?;
    Ok(&create.sender_id == identity_id)
}

pub async fn must_be_admin<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
    identity_id: &IdentityId,
) -> Result<(), BoxError> {
    if is_admin(reader, box_id, identity_id).await? {
        return Ok(());
    }
    Err(BoxError::forbidden(
        ForbiddenReason::NotAdmin,
        "must be an admin",
    ))
}

/// Whether the latest access mode is `public`. A corrupt payload fails closed.
pub async fn is_public<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
) -> Result<bool, BoxError> {
    let latest = reader
        .find(
            &EventFilter::for_box(*box_id)
                .of_type(EventType::StateAccessMode)
                .limit(1),
        )
        .await?;
    let Some(event) = latest.first() else {
        return Ok(false);
    };
    match parse_stored::<AccessModeContent>(event) {
        Ok(content) => Ok(content.value == AccessMode::Public),
        Err(e) => {
            warn!(box_id = %box_id, event_id = %event.id, error = %e, "Corrupt access mode, box considered limited");
            Ok(false)
        }
    }
}

/// Access rules not removed by an `access.rm`, newest first.
pub async fn active_access_rules<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
) -> Result<Vec<(Event, AccessContent)>, BoxError> {
    let events = reader
        .find(
            &EventFilter::for_box(*box_id)
                .of_type(EventType::AccessAdd)
                .unreferred(Unreferred::by_types(&[EventType::AccessRm])),
        )
        .await?;
    events
        .into_iter()
        .map(|e| {
            let content = parse_stored::<AccessContent>(&e)?;
            Ok((e, content))
        })
        .collect()
}

/// Whether the identity passes the box access policy.
///
/// Public boxes grant access. Otherwise the active rules are inspected newest
/// first: `identifier` rules match the exact identifier value, `email_domain`
/// rules match the domain of an email identifier and are skipped when
/// `identifier_only`. With `first_rule_only`, evaluation stops after the
/// first inspected rule.
pub async fn has_access<R: EventReader + ?Sized>(
    reader: &R,
    mapper: &IdentityMapper,
    first_rule_only: bool,
    box_id: &BoxId,
    identity_id: &IdentityId,
    identifier_only: bool,
) -> Result<(), BoxError> {
    if is_public(reader, box_id).await? {
        return Ok(());
    }

    let rules = active_access_rules(reader, box_id).await?;
    if rules.is_empty() {
        return Err(BoxError::forbidden(
            ForbiddenReason::NoAccess,
            "no access rule on this box",
        ));
    }

    let identity = mapper
        .get(identity_id, true)
        .await
        .map_err(|e| e.describe("getting identity for access check"))?;
    let Some(identifier) = identity.identifier else {
        return Err(BoxError::forbidden(
            ForbiddenReason::NoAccess,
            "unknown identity",
        ));
    };

    for (_, rule) in &rules {
        match rule.restriction_type {
            RestrictionType::Identifier => {
                if identifier.value == rule.value {
                    return Ok(());
                }
            }
            RestrictionType::EmailDomain => {
                if identifier_only {
                    continue;
                }
                if identifier.email_domain() == Some(rule.value.as_str()) {
                    return Ok(());
                }
            }
        }
        if first_rule_only {
            break;
        }
    }

    Err(BoxError::forbidden(
        ForbiddenReason::NoAccess,
        "must match a restriction rule",
    ))
}

/// Public box, or a matching rule of any kind.
pub async fn must_be_able_to_join<R: EventReader + ?Sized>(
    reader: &R,
    mapper: &IdentityMapper,
    first_rule_only: bool,
    box_id: &BoxId,
    identity_id: &IdentityId,
) -> Result<(), BoxError> {
    has_access(reader, mapper, first_rule_only, box_id, identity_id, false).await
}

/// Admins always have access; others go through the rules.
pub async fn must_have_access<R: EventReader + ?Sized>(
    reader: &R,
    mapper: &IdentityMapper,
    first_rule_only: bool,
    box_id: &BoxId,
    identity_id: &IdentityId,
) -> Result<(), BoxError> {
    if is_admin(reader, box_id, identity_id).await? {
        return Ok(());
    }
    has_access(reader, mapper, first_rule_only, box_id, identity_id, false).await
}
