//! # Outbound Ports (Driven Ports)
//!
//! Collaborators the box engine requires the host application to provide.
//!
//! Production implementations live in the host (SQL store, Redis cache,
//! identity service). The in-memory versions in `adapters/` back tests and
//! embedded use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_bus::RealtimeUpdate;
use shared_types::{AccountId, BoxId, Event, EventId, EventType, IdentityId, Identity, Timestamp};
use uuid::Uuid;

use crate::domain::errors::{CacheError, RepoError, StoreError};
use crate::domain::filters::EventFilter;
use crate::domain::projection::BoxSetting;

// =============================================================================
// EVENT STORE
// =============================================================================

/// Read side of the event log.
///
/// Every query returns events ordered newest first unless stated otherwise.
#[async_trait]
pub trait EventReader: Send + Sync {
    /// Events matching the filter, paginated by its offset and limit.
    async fn find(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;

    /// Number of events matching the filter, ignoring pagination.
    async fn count(&self, filter: &EventFilter) -> Result<usize, StoreError>;

    /// An event followed by the events referring to it, oldest first.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: no event with this id
    async fn event_and_referrers(&self, id: &EventId) -> Result<Vec<Event>, StoreError>;

    /// For each box, its most recent event among `types`.
    async fn latest_per_box(
        &self,
        box_ids: &[BoxId],
        types: &[EventType],
    ) -> Result<Vec<Event>, StoreError>;
}

/// A write transaction.
///
/// Reads see committed events plus the transaction's own pending inserts.
/// Dropping a transaction without committing discards its inserts.
#[async_trait]
pub trait EventTransaction: EventReader {
    /// Stage an event.
    async fn insert(&mut self, event: Event) -> Result<(), StoreError>;

    /// Apply every staged event and its referrer index entries atomically.
    ///
    /// Returns the committed events in insertion order.
    async fn commit(&mut self) -> Result<Vec<Event>, StoreError>;
}

/// The append-only event log.
#[async_trait]
pub trait EventStore: EventReader {
    /// Open a write transaction.
    async fn begin(&self) -> Result<Box<dyn EventTransaction>, StoreError>;

    /// Remove the whole log of a box. The only destructive operation.
    async fn delete_box(&self, box_id: &BoxId) -> Result<usize, StoreError>;
}

// =============================================================================
// CACHE
// =============================================================================

/// Advisory cache, counters and realtime fan-out.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), CacheError>;

    /// Members of a set, `None` when the key is missing.
    async fn set_members(&self, key: &str) -> Result<Option<Vec<String>>, CacheError>;

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Delete every key starting with `prefix` and ending with `suffix`.
    async fn delete_matching(&self, prefix: &str, suffix: &str) -> Result<usize, CacheError>;

    /// Atomically increment a counter, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Counter value, 0 when missing.
    async fn get_counter(&self, key: &str) -> Result<i64, CacheError>;

    /// Every counter whose key starts with `prefix`.
    async fn counters_with_prefix(&self, prefix: &str) -> Result<Vec<(String, i64)>, CacheError>;

    /// Publish on the update's channel. Returns the number of receivers.
    async fn publish(&self, update: RealtimeUpdate) -> Result<usize, CacheError>;
}

// =============================================================================
// IDENTITIES
// =============================================================================

/// Identity service.
#[async_trait]
pub trait IdentityRepo: Send + Sync {
    /// ## Errors
    ///
    /// - `NotFound`: unknown identity
    async fn get(&self, id: &IdentityId) -> Result<Identity, RepoError>;

    /// Known identities among `ids`. Unknown ids are silently skipped.
    async fn list(&self, ids: &[IdentityId]) -> Result<Vec<Identity>, RepoError>;

    async fn notify_bulk(
        &self,
        ids: &[IdentityId],
        notif_type: &str,
        details: Value,
    ) -> Result<(), RepoError>;
}

// =============================================================================
// CRYPTO ACTIONS
// =============================================================================

/// Kind of a crypto action delivered to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoActionKind {
    SetBoxKeyShare,
    Invitation,
}

/// Encrypted material an account must process on its next login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoAction {
    pub account_id: AccountId,
    pub kind: CryptoActionKind,
    pub sender_identity_id: IdentityId,
    pub box_id: BoxId,
    pub encrypted: String,
    pub encryption_public_key: String,
    pub created_at: Timestamp,
}

/// Server-side key share of a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    pub box_id: BoxId,
    pub creator_id: IdentityId,
    pub misakey_share: String,
    pub other_share_hash: String,
    pub encrypted_invitation_key_share: String,
}

/// Crypto action and key share storage.
#[async_trait]
pub trait CryptoActionRepo: Send + Sync {
    async fn create_actions(&self, actions: Vec<CryptoAction>) -> Result<(), RepoError>;

    /// Create the invitation actions (and notification) for an identifier.
    async fn create_invitation_actions(
        &self,
        sender_id: &IdentityId,
        box_id: &BoxId,
        box_title: &str,
        identifier_value: &str,
        extra: &Value,
    ) -> Result<(), RepoError>;

    /// Drop every key share of the box and store this one.
    async fn replace_key_share(&self, share: KeyShare) -> Result<(), RepoError>;
}

// =============================================================================
// FILES, QUOTA, SETTINGS
// =============================================================================

/// Encrypted blob storage.
#[async_trait]
pub trait FileStorageRepo: Send + Sync {
    /// ## Errors
    ///
    /// - `NotFound`: blob already deleted
    async fn size(&self, file_id: &Uuid) -> Result<u64, RepoError>;

    async fn delete(&self, file_id: &Uuid) -> Result<(), RepoError>;

    /// Number of identities that saved the blob to their own storage.
    async fn saved_references(&self, file_id: &Uuid) -> Result<usize, RepoError>;
}

/// Per-box used space accounting.
#[async_trait]
pub trait QuotaRepo: Send + Sync {
    /// Add `increment` and remove `decrement`, clamped at 0.
    async fn update_used_space(
        &self,
        box_id: &BoxId,
        increment: u64,
        decrement: u64,
    ) -> Result<(), RepoError>;

    async fn used_space(&self, box_id: &BoxId) -> Result<u64, RepoError>;
}

/// Box settings storage.
#[async_trait]
pub trait BoxSettingRepo: Send + Sync {
    async fn get(
        &self,
        identity_id: &IdentityId,
        box_id: &BoxId,
    ) -> Result<Option<BoxSetting>, RepoError>;

    async fn upsert(&self, setting: BoxSetting) -> Result<(), RepoError>;

    /// Every stored setting of a box.
    async fn list_for_box(&self, box_id: &BoxId) -> Result<Vec<BoxSetting>, RepoError>;
}
