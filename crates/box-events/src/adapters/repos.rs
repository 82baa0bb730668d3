//! In-memory collaborator repositories.
//!
//! Each repository records what it was asked to do so tests can assert on
//! side effects without a real identity, crypto or blob service.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared_types::{BoxId, IdentityId, Identity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

use crate::domain::errors::RepoError;
use crate::domain::projection::BoxSetting;
use crate::ports::outbound::{
    BoxSettingRepo, CryptoAction, CryptoActionRepo, FileStorageRepo, IdentityRepo, KeyShare,
    QuotaRepo,
};

// =============================================================================
// IDENTITIES
// =============================================================================

/// A notification recorded by `InMemoryIdentityRepo`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub identity_ids: Vec<IdentityId>,
    pub notif_type: String,
    pub details: Value,
}

/// In-memory `IdentityRepo`.
#[derive(Default)]
pub struct InMemoryIdentityRepo {
    identities: RwLock<HashMap<IdentityId, Identity>>,
    notifications: Mutex<Vec<SentNotification>>,
    /// Number of `get` and `list` calls served.
    lookups: AtomicUsize,
}

impl InMemoryIdentityRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: Identity) {
        self.identities.write().insert(identity.id, identity);
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<SentNotification> {
        self.notifications.lock().clone()
    }

    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityRepo for InMemoryIdentityRepo {
    async fn get(&self, id: &IdentityId) -> Result<Identity, RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.identities
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("identity {id}")))
    }

    async fn list(&self, ids: &[IdentityId]) -> Result<Vec<Identity>, RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let identities = self.identities.read();
        Ok(ids.iter().filter_map(|id| identities.get(id).cloned()).collect())
    }

    async fn notify_bulk(
        &self,
        ids: &[IdentityId],
        notif_type: &str,
        details: Value,
    ) -> Result<(), RepoError> {
        self.notifications.lock().push(SentNotification {
            identity_ids: ids.to_vec(),
            notif_type: notif_type.to_string(),
            details,
        });
        Ok(())
    }
}

// =============================================================================
// CRYPTO ACTIONS
// =============================================================================

/// An invitation recorded by `InMemoryCryptoRepo`.
#[derive(Debug, Clone, PartialEq)]
pub struct SentInvitation {
    pub sender_id: IdentityId,
    pub box_id: BoxId,
    pub box_title: String,
    pub identifier_value: String,
    pub extra: Value,
}

/// In-memory `CryptoActionRepo`.
#[derive(Default)]
pub struct InMemoryCryptoRepo {
    actions: Mutex<Vec<CryptoAction>>,
    invitations: Mutex<Vec<SentInvitation>>,
    key_shares: RwLock<HashMap<BoxId, KeyShare>>,
    failing: AtomicBool,
}

impl InMemoryCryptoRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn actions(&self) -> Vec<CryptoAction> {
        self.actions.lock().clone()
    }

    #[must_use]
    pub fn invitations(&self) -> Vec<SentInvitation> {
        self.invitations.lock().clone()
    }

    #[must_use]
    pub fn key_share(&self, box_id: &BoxId) -> Option<KeyShare> {
        self.key_shares.read().get(box_id).cloned()
    }

    /// Simulate an outage of the crypto service.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("crypto service is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CryptoActionRepo for InMemoryCryptoRepo {
    async fn create_actions(&self, actions: Vec<CryptoAction>) -> Result<(), RepoError> {
        self.check()?;
        self.actions.lock().extend(actions);
        Ok(())
    }

    async fn create_invitation_actions(
        &self,
        sender_id: &IdentityId,
        box_id: &BoxId,
        box_title: &str,
        identifier_value: &str,
        extra: &Value,
    ) -> Result<(), RepoError> {
        self.check()?;
        self.invitations.lock().push(SentInvitation {
            sender_id: *sender_id,
            box_id: *box_id,
            box_title: box_title.to_string(),
            identifier_value: identifier_value.to_string(),
            extra: extra.clone(),
        });
        Ok(())
    }

    async fn replace_key_share(&self, share: KeyShare) -> Result<(), RepoError> {
        self.check()?;
        self.key_shares.write().insert(share.box_id, share);
        Ok(())
    }
}

// =============================================================================
// FILES
// =============================================================================

/// In-memory `FileStorageRepo`.
#[derive(Default)]
pub struct InMemoryFileStorage {
    sizes: RwLock<HashMap<Uuid, u64>>,
    saved: RwLock<HashMap<Uuid, usize>>,
}

impl InMemoryFileStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, file_id: Uuid, size: u64) {
        self.sizes.write().insert(file_id, size);
    }

    /// Record `count` saved-file references to a blob.
    pub fn set_saved_references(&self, file_id: Uuid, count: usize) {
        self.saved.write().insert(file_id, count);
    }

    #[must_use]
    pub fn contains(&self, file_id: &Uuid) -> bool {
        self.sizes.read().contains_key(file_id)
    }
}

#[async_trait]
impl FileStorageRepo for InMemoryFileStorage {
    async fn size(&self, file_id: &Uuid) -> Result<u64, RepoError> {
        self.sizes
            .read()
            .get(file_id)
            .copied()
            .ok_or_else(|| RepoError::NotFound(format!("file {file_id}")))
    }

    async fn delete(&self, file_id: &Uuid) -> Result<(), RepoError> {
        self.sizes.write().remove(file_id);
        Ok(())
    }

    async fn saved_references(&self, file_id: &Uuid) -> Result<usize, RepoError> {
        Ok(self.saved.read().get(file_id).copied().unwrap_or(0))
    }
}

// =============================================================================
// QUOTA
// =============================================================================

/// In-memory `QuotaRepo`.
#[derive(Default)]
pub struct InMemoryQuotaRepo {
    used: RwLock<HashMap<BoxId, u64>>,
}

impl InMemoryQuotaRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaRepo for InMemoryQuotaRepo {
    async fn update_used_space(
        &self,
        box_id: &BoxId,
        increment: u64,
        decrement: u64,
    ) -> Result<(), RepoError> {
        let mut used = self.used.write();
        let value = used.entry(*box_id).or_insert(0);
        *value = value.saturating_add(increment).saturating_sub(decrement);
        Ok(())
    }

    async fn used_space(&self, box_id: &BoxId) -> Result<u64, RepoError> {
        Ok(self.used.read().get(box_id).copied().unwrap_or(0))
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// In-memory `BoxSettingRepo`.
#[derive(Default)]
pub struct InMemoryBoxSettingRepo {
    settings: RwLock<HashMap<(IdentityId, BoxId), BoxSetting>>,
}

impl InMemoryBoxSettingRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BoxSettingRepo for InMemoryBoxSettingRepo {
    async fn get(
        &self,
        identity_id: &IdentityId,
        box_id: &BoxId,
    ) -> Result<Option<BoxSetting>, RepoError> {
        Ok(self.settings.read().get(&(*identity_id, *box_id)).cloned())
    }

    async fn upsert(&self, setting: BoxSetting) -> Result<(), RepoError> {
        self.settings
            .write()
            .insert((setting.identity_id, setting.box_id), setting);
        Ok(())
    }

    async fn list_for_box(&self, box_id: &BoxId) -> Result<Vec<BoxSetting>, RepoError> {
        Ok(self
            .settings
            .read()
            .values()
            .filter(|s| &s.box_id == box_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quota_clamps_at_zero() {
        let quota = InMemoryQuotaRepo::new();
        let box_id = Uuid::new_v4();
        quota.update_used_space(&box_id, 10, 0).await.unwrap();
        quota.update_used_space(&box_id, 0, 25).await.unwrap();
        assert_eq!(quota.used_space(&box_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settings_upsert() {
        let repo = InMemoryBoxSettingRepo::new();
        let identity = Uuid::new_v4();
        let box_id = Uuid::new_v4();
        assert!(repo.get(&identity, &box_id).await.unwrap().is_none());

        let mut setting = BoxSetting::default_for(identity, box_id);
        setting.muted = true;
        repo.upsert(setting.clone()).await.unwrap();
        assert_eq!(repo.get(&identity, &box_id).await.unwrap(), Some(setting));
        assert_eq!(repo.list_for_box(&box_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let files = InMemoryFileStorage::new();
        let id = Uuid::new_v4();
        assert!(matches!(files.size(&id).await, Err(RepoError::NotFound(_))));
        files.put(id, 7);
        assert_eq!(files.size(&id).await.unwrap(), 7);
        files.delete(&id).await.unwrap();
        assert!(!files.contains(&id));
    }
}
