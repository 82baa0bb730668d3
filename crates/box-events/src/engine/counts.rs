//! Unread and digest counters, kept in the cache per identity and box.

use shared_types::{BoxId, IdentityId};
use std::collections::HashSet;

use crate::domain::cache_keys;
use crate::domain::errors::BoxError;
use crate::ports::outbound::{BoxSettingRepo, CacheService};

/// Identities that muted the box.
pub async fn muted_members(
    settings: &dyn BoxSettingRepo,
    box_id: &BoxId,
) -> Result<HashSet<IdentityId>, BoxError> {
    let stored = settings
        .list_for_box(box_id)
        .await
        .map_err(|e| BoxError::from(e).describe("listing box settings"))?;
    Ok(stored
        .into_iter()
        .filter(|s| s.muted)
        .map(|s| s.identity_id)
        .collect())
}

/// Increment the unread and digest counters of every recipient.
pub async fn increment_counts(
    cache: &dyn CacheService,
    recipients: &[IdentityId],
    box_id: &BoxId,
) -> Result<(), BoxError> {
    for identity_id in recipients {
        cache
            .incr(&cache_keys::events_count_key(identity_id, box_id))
            .await?;
        cache
            .incr(&cache_keys::digest_count_key(identity_id, box_id))
            .await?;
    }
    Ok(())
}

/// Unread counter of every box the identity has one for.
pub async fn counts_for_identity(
    cache: &dyn CacheService,
    identity_id: &IdentityId,
) -> Result<Vec<(BoxId, i64)>, BoxError> {
    let counters = cache
        .counters_with_prefix(&cache_keys::events_count_prefix(identity_id))
        .await?;
    let mut counts: Vec<(BoxId, i64)> = counters
        .into_iter()
        .filter_map(|(key, count)| cache_keys::box_id_of_counter(&key).map(|id| (id, count)))
        .collect();
    counts.sort();
    Ok(counts)
}

/// Reset the unread counter of an identity for a box.
pub async fn reset_count(
    cache: &dyn CacheService,
    identity_id: &IdentityId,
    box_id: &BoxId,
) -> Result<(), BoxError> {
    cache
        .delete(&[cache_keys::events_count_key(identity_id, box_id)])
        .await?;
    Ok(())
}

/// Drop every counter of a box, for every identity.
pub async fn delete_box_counters(cache: &dyn CacheService, box_id: &BoxId) -> Result<usize, BoxError> {
    let suffix = cache_keys::box_counter_suffix(box_id);
    let unread = cache.delete_matching("eventCounts:", &suffix).await?;
    let digest = cache.delete_matching("digestCount:", &suffix).await?;
    Ok(unread + digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryBoxSettingRepo, InMemoryCache};
    use crate::domain::projection::BoxSetting;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_increment_and_reset() {
        let cache = InMemoryCache::default();
        let alice = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        increment_counts(&cache, &[alice], &first).await.unwrap();
        increment_counts(&cache, &[alice], &first).await.unwrap();
        increment_counts(&cache, &[alice], &second).await.unwrap();

        let counts = counts_for_identity(&cache, &alice).await.unwrap();
        assert_eq!(counts.len(), 2);
        assert!(counts.contains(&(first, 2)));
        assert!(counts.contains(&(second, 1)));

        reset_count(&cache, &alice, &first).await.unwrap();
        let counts = counts_for_identity(&cache, &alice).await.unwrap();
        assert_eq!(counts, vec![(second, 1)]);

        // digest survives the acknowledgement
        let digest = cache
            .get_counter(&cache_keys::digest_count_key(&alice, &first))
            .await
            .unwrap();
        assert_eq!(digest, 2);
    }

    #[tokio::test]
    async fn test_delete_box_counters() {
        let cache = InMemoryCache::default();
        let box_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let members = [Uuid::new_v4(), Uuid::new_v4()];
        increment_counts(&cache, &members, &box_id).await.unwrap();
        increment_counts(&cache, &members, &other).await.unwrap();

        assert_eq!(delete_box_counters(&cache, &box_id).await.unwrap(), 4);
        let left = counts_for_identity(&cache, &members[0]).await.unwrap();
        assert_eq!(left, vec![(other, 1)]);
    }

    #[tokio::test]
    async fn test_muted_members() {
        let settings = InMemoryBoxSettingRepo::new();
        let box_id = Uuid::new_v4();
        let quiet = Uuid::new_v4();
        let loud = Uuid::new_v4();
        let mut muted = BoxSetting::default_for(quiet, box_id);
        muted.muted = true;
        settings.upsert(muted).await.unwrap();
        settings.upsert(BoxSetting::default_for(loud, box_id)).await.unwrap();

        let set = muted_members(&settings, &box_id).await.unwrap();
        assert!(set.contains(&quiet));
        assert!(!set.contains(&loud));
    }
}
