//! Boxes of an identity within an organization.
//!
//! The id set is cached under `cache:user_<id>:boxIDs:org_<org>` and dropped
//! whenever the identity creates, joins or leaves a box.

use serde_json::json;
use shared_types::{BoxId, EventType, IdentityId, OrgId};
use std::collections::BTreeSet;
use tracing::warn;

use crate::domain::cache_keys;
use crate::domain::errors::BoxError;
use crate::domain::filters::{EventFilter, Unreferred};
use crate::engine::members::JOIN_SUPERSEDERS;
use crate::ports::outbound::{CacheService, EventReader};

/// Ids of the boxes the identity created or actively joined in `owner_org_id`.
pub async fn box_ids_for_identity<R: EventReader + ?Sized>(
    reader: &R,
    cache: &dyn CacheService,
    identity_id: &IdentityId,
    owner_org_id: &OrgId,
) -> Result<Vec<BoxId>, BoxError> {
    let key = cache_keys::user_boxes_key(identity_id, owner_org_id);
    match cache.set_members(&key).await {
        Ok(Some(members)) if !members.is_empty() => {
            let parsed: Result<Vec<BoxId>, _> = members.iter().map(|m| m.parse()).collect();
            match parsed {
                Ok(ids) => return Ok(ids),
                Err(e) => warn!(identity_id = %identity_id, error = %e, "Corrupt user boxes cache, rebuilding"),
            }
        }
        Ok(_) => {}
        Err(e) => warn!(identity_id = %identity_id, error = %e, "Could not read user boxes cache"),
    }

    let ids = box_ids_from_log(reader, identity_id, owner_org_id).await?;
    if !ids.is_empty() {
        let members: Vec<String> = ids.iter().map(ToString::to_string).collect();
        if let Err(e) = cache.set_add(&key, &members).await {
            warn!(identity_id = %identity_id, error = %e, "Could not store user boxes cache");
        }
    }
    Ok(ids)
}

async fn box_ids_from_log<R: EventReader + ?Sized>(
    reader: &R,
    identity_id: &IdentityId,
    owner_org_id: &OrgId,
) -> Result<Vec<BoxId>, BoxError> {
    let in_org = json!({ "owner_org_id": owner_org_id });

    let created = reader
        .find(
            &EventFilter::new()
                .of_type(EventType::Create)
                .sender(*identity_id)
                .content_contains(in_org.clone()),
        )
        .await?;
    let mut ids: BTreeSet<BoxId> = created.iter().map(|e| e.box_id).collect();

    let joins = reader
        .find(
            &EventFilter::new()
                .of_type(EventType::MemberJoin)
                .sender(*identity_id)
                .unreferred(Unreferred::by_types(&JOIN_SUPERSEDERS).from_sender(*identity_id)),
        )
        .await?;
    let joined: BTreeSet<BoxId> = joins.iter().map(|e| e.box_id).collect();

    // an empty box list means no box constraint
    if !joined.is_empty() {
        let joined_in_org = reader
            .find(
                &EventFilter::new()
                    .boxes(joined)
                    .of_type(EventType::Create)
                    .content_contains(in_org),
            )
            .await?;
        ids.extend(joined_in_org.iter().map(|e| e.box_id));
    }
    Ok(ids.into_iter().collect())
}
