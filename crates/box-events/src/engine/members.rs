//! # Membership
//!
//! Members of a box are its creator plus the senders of the joins no
//! `member.leave` / `member.kick` refers to. The member set is cached under
//! `cache:box_<id>:membersIDs`; the log stays authoritative.

use shared_types::{BoxId, Event, EventType, IdentityId};
use tracing::{debug, warn};

use crate::domain::cache_keys;
use crate::domain::errors::{BoxError, ForbiddenReason};
use crate::domain::filters::{EventFilter, Unreferred};
use crate::engine::access::create_event_of;
use crate::ports::outbound::{CacheService, EventReader};

pub(crate) const JOIN_SUPERSEDERS: [EventType; 2] = [EventType::MemberLeave, EventType::MemberKick];

/// Joins not superseded by a leave or a kick, newest first.
pub async fn active_joins<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
) -> Result<Vec<Event>, BoxError> {
    let joins = reader
        .find(
            &EventFilter::for_box(*box_id)
                .of_type(EventType::MemberJoin)
                .unreferred(Unreferred::by_types(&JOIN_SUPERSEDERS)),
        )
        .await?;
    Ok(joins)
}

/// The active join of one identity. Only its own leave or a kick issued in
/// its name supersedes it.
pub async fn active_join_of<R: EventReader + ?Sized>(
    reader: &R,
    box_id: &BoxId,
    identity_id: &IdentityId,
) -> Result<Option<Event>, BoxError> {
    let joins = reader
        .find(
            &EventFilter::for_box(*box_id)
                .of_type(EventType::MemberJoin)
                .sender(*identity_id)
                .unreferred(Unreferred::by_types(&JOIN_SUPERSEDERS).from_sender(*identity_id))
                .limit(1),
        )
        .await?;
    Ok(joins.into_iter().next())
}

/// Creator first, then the other members by id.
fn creator_first(creator: IdentityId, mut ids: Vec<IdentityId>) -> Vec<IdentityId> {
    ids.retain(|id| *id != creator);
    ids.sort_unstable();
    ids.dedup();
    ids.insert(0, creator);
    ids
}

/// Member ids, creator first, the rest ordered by id. Rebuilt from the log on
/// cache miss; a hit and a miss give the same order.
pub async fn list_member_ids<R: EventReader + ?Sized>(
    reader: &R,
    cache: &dyn CacheService,
    box_id: &BoxId,
) -> Result<Vec<IdentityId>, BoxError> {
    let key = cache_keys::members_key(box_id);
    match cache.set_members(&key).await {
        Ok(Some(members)) if !members.is_empty() => {
            let ids: Result<Vec<IdentityId>, _> = members.iter().map(|m| m.parse()).collect();
            match ids {
                Ok(ids) => {
                    let create = create_event_of(reader, box_id).await?;
                    return Ok(creator_first(create.sender_id, ids));
                }
                Err(e) => warn!(box_id = %box_id, error = %e, "Corrupt members cache, rebuilding"),
            }
        }
        Ok(_) => {}
        Err(e) => warn!(box_id = %box_id, error = %e, "Members cache unavailable"),
    }

    debug!(box_id = %box_id, "Regenerating members cache");
    let create = create_event_of(reader, box_id).await?;
    let joined = active_joins(reader, box_id)
        .await?
        .into_iter()
        .map(|join| join.sender_id)
        .collect();
    let ids = creator_first(create.sender_id, joined);

    let members: Vec<String> = ids.iter().map(ToString::to_string).collect();
    if let Err(e) = cache.delete(&[key.clone()]).await {
        warn!(box_id = %box_id, error = %e, "Could not reset members cache");
    } else if let Err(e) = cache.set_add(&key, &members).await {
        warn!(box_id = %box_id, error = %e, "Could not build members cache");
    }
    Ok(ids)
}

/// Membership check: a positive cache hit is trusted, anything else goes to
/// the log (active join, then creator).
pub async fn must_be_member<R: EventReader + ?Sized>(
    reader: &R,
    cache: &dyn CacheService,
    box_id: &BoxId,
    identity_id: &IdentityId,
) -> Result<(), BoxError> {
    let key = cache_keys::members_key(box_id);
    match cache.exists(&key).await {
        Ok(true) => match cache.set_is_member(&key, &identity_id.to_string()).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => warn!(box_id = %box_id, error = %e, "Members cache unavailable"),
        },
        Ok(false) => {
            list_member_ids(reader, cache, box_id).await?;
        }
        Err(e) => warn!(box_id = %box_id, error = %e, "Members cache unavailable"),
    }

    if active_join_of(reader, box_id, identity_id).await?.is_some() {
        return Ok(());
    }
    let create = create_event_of(reader, box_id).await?;
    if &create.sender_id == identity_id {
        return Ok(());
    }
    Err(BoxError::forbidden(
        ForbiddenReason::NotMember,
        "must be a member",
    ))
}

/// `must_be_member` as a boolean. Only `Forbidden` maps to `false`.
pub async fn is_member<R: EventReader + ?Sized>(
    reader: &R,
    cache: &dyn CacheService,
    box_id: &BoxId,
    identity_id: &IdentityId,
) -> Result<bool, BoxError> {
    match must_be_member(reader, cache, box_id, identity_id).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_forbidden() => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryCache, InMemoryEventStore};
    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        store: InMemoryEventStore,
        cache: InMemoryCache,
        box_id: BoxId,
        admin: IdentityId,
        create: Event,
        clock: i64,
    }

    impl Fixture {
        fn new() -> Self {
            let admin = Uuid::new_v4();
            let box_id = Uuid::new_v4();
            let create = Event::new(
                EventType::Create,
                box_id,
                admin,
                json!({"owner_org_id": Uuid::new_v4(), "public_key": "k", "title": "T"}),
                None,
            );
            let store = InMemoryEventStore::new();
            store.seed([create.clone()]);
            Self {
                store,
                cache: InMemoryCache::default(),
                box_id,
                admin,
                create,
                clock: 0,
            }
        }

        fn add(&mut self, event_type: EventType, sender: IdentityId, referrer: Option<Uuid>) -> Event {
            self.clock += 1;
            let mut e = Event::new(event_type, self.box_id, sender, json!({}), referrer);
            e.created_at = self.create.created_at + Duration::seconds(self.clock);
            self.store.seed([e.clone()]);
            e
        }
    }

    #[tokio::test]
    async fn test_member_ids_rebuilt_and_cached() {
        let mut f = Fixture::new();
        let bob = Uuid::new_v4();
        f.add(EventType::MemberJoin, bob, None);

        let ids = list_member_ids(&f.store, &f.cache, &f.box_id).await.unwrap();
        assert_eq!(ids, vec![f.admin, bob]);

        let key = cache_keys::members_key(&f.box_id);
        assert!(f.cache.set_is_member(&key, &bob.to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn test_member_order_stable_across_cache_hits() {
        let mut f = Fixture::new();
        for _ in 0..5 {
            f.add(EventType::MemberJoin, Uuid::new_v4(), None);
        }

        let rebuilt = list_member_ids(&f.store, &f.cache, &f.box_id).await.unwrap();
        let cached = list_member_ids(&f.store, &f.cache, &f.box_id).await.unwrap();
        assert_eq!(rebuilt, cached);
        assert_eq!(rebuilt.len(), 6);
        assert_eq!(rebuilt[0], f.admin);
        assert!(rebuilt[1..].windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_leave_supersedes_join() {
        let mut f = Fixture::new();
        let bob = Uuid::new_v4();
        let join = f.add(EventType::MemberJoin, bob, None);
        assert!(is_member(&f.store, &f.cache, &f.box_id, &bob).await.unwrap());

        f.add(EventType::MemberLeave, bob, Some(join.id));
        f.cache.delete(&[cache_keys::members_key(&f.box_id)]).await.unwrap();

        let err = must_be_member(&f.store, &f.cache, &f.box_id, &bob).await.unwrap_err();
        assert_eq!(err.forbidden_reason(), Some(ForbiddenReason::NotMember));
        assert!(active_joins(&f.store, &f.box_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_negative_cache_falls_back_to_log() {
        let mut f = Fixture::new();
        list_member_ids(&f.store, &f.cache, &f.box_id).await.unwrap();

        let bob = Uuid::new_v4();
        f.add(EventType::MemberJoin, bob, None);
        assert!(must_be_member(&f.store, &f.cache, &f.box_id, &bob).await.is_ok());
    }

    #[tokio::test]
    async fn test_cache_outage_uses_log() {
        let mut f = Fixture::new();
        let bob = Uuid::new_v4();
        f.add(EventType::MemberJoin, bob, None);
        f.cache.set_failing(true);

        assert!(must_be_member(&f.store, &f.cache, &f.box_id, &bob).await.is_ok());
        assert!(must_be_member(&f.store, &f.cache, &f.box_id, &f.admin).await.is_ok());
        let ids = list_member_ids(&f.store, &f.cache, &f.box_id).await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_kick_in_member_name_supersedes() {
        let mut f = Fixture::new();
        let bob = Uuid::new_v4();
        let join = f.add(EventType::MemberJoin, bob, None);
        f.add(EventType::MemberKick, bob, Some(join.id));

        assert!(active_join_of(&f.store, &f.box_id, &bob).await.unwrap().is_none());
        assert!(!is_member(&f.store, &f.cache, &f.box_id, &bob).await.unwrap());
    }
}
