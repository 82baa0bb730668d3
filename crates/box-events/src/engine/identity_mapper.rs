//! # Identity Mapper
//!
//! Request-scoped, memoizing view of the identity service. Each identity is
//! queried at most once per mapper; unknown identities resolve to the
//! anonymous placeholder and are never queried again.

use parking_lot::RwLock;
use serde_json::Value;
use shared_types::{AccountId, IdentityId, SenderView};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::domain::errors::{BoxError, RepoError};
use crate::ports::outbound::IdentityRepo;

/// Lock-guarded sender views, indexed by identity id.
#[derive(Debug, Default)]
pub struct SenderCache {
    by_id: RwLock<HashMap<IdentityId, SenderView>>,
}

impl SenderCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &IdentityId) -> Option<SenderView> {
        self.by_id.read().get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &IdentityId) -> bool {
        self.by_id.read().contains_key(id)
    }

    pub fn insert(&self, id: IdentityId, view: SenderView) {
        self.by_id.write().insert(id, view);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expose(view: SenderView, transparent: bool) -> SenderView {
    if transparent {
        view
    } else {
        view.opaque()
    }
}

/// Memoizing identity resolver.
///
/// `transparent` views carry the identifier; opaque ones strip it. Use
/// transparent views for internal checks and for identities looking at
/// themselves.
pub struct IdentityMapper {
    repo: Arc<dyn IdentityRepo>,
    cache: SenderCache,
}

impl IdentityMapper {
    #[must_use]
    pub fn new(repo: Arc<dyn IdentityRepo>) -> Self {
        Self {
            repo,
            cache: SenderCache::new(),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &SenderCache {
        &self.cache
    }

    pub async fn get(&self, id: &IdentityId, transparent: bool) -> Result<SenderView, BoxError> {
        if let Some(view) = self.cache.get(id) {
            return Ok(expose(view, transparent));
        }

        let view = match self.repo.get(id).await {
            Ok(identity) => SenderView::from(&identity),
            Err(RepoError::NotFound(_)) => SenderView::anonymous(),
            Err(e) => return Err(BoxError::from(e).describe("getting identity")),
        };
        self.cache.insert(*id, view.clone());
        Ok(expose(view, transparent))
    }

    /// Views for `ids`, in order. Unknown ids are fetched in one batch.
    pub async fn list(
        &self,
        ids: &[IdentityId],
        transparent: bool,
    ) -> Result<Vec<SenderView>, BoxError> {
        let mut unknown: Vec<IdentityId> = ids
            .iter()
            .filter(|id| !self.cache.contains(id))
            .copied()
            .collect();
        unknown.sort();
        unknown.dedup();

        if !unknown.is_empty() {
            let identities = self
                .repo
                .list(&unknown)
                .await
                .map_err(|e| BoxError::from(e).describe("listing identities"))?;
            for identity in &identities {
                self.cache.insert(identity.id, SenderView::from(identity));
            }
            for id in &unknown {
                if !self.cache.contains(id) {
                    self.cache.insert(*id, SenderView::anonymous());
                }
            }
        }

        Ok(ids
            .iter()
            .map(|id| {
                let view = self.cache.get(id).unwrap_or_else(SenderView::anonymous);
                expose(view, transparent)
            })
            .collect())
    }

    /// Best effort: failures are logged, never returned.
    pub async fn notify_bulk(&self, ids: &[IdentityId], notif_type: &str, details: Value) {
        if let Err(e) = self.repo.notify_bulk(ids, notif_type, details).await {
            warn!(notif_type, recipients = ids.len(), error = %e, "Creating notifications failed");
        }
    }

    /// Account of each identity that has one.
    pub async fn map_to_account_ids(
        &self,
        ids: &[IdentityId],
    ) -> Result<HashMap<IdentityId, AccountId>, BoxError> {
        let identities = self
            .repo
            .list(ids)
            .await
            .map_err(|e| BoxError::from(e).describe("listing identities"))?;
        Ok(identities
            .into_iter()
            .filter_map(|i| i.account_id.map(|account| (i.id, account)))
            .collect())
    }
}
