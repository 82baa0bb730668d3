//! In-memory harness: a `BoxEventsService` wired to the in-memory adapters,
//! with handles on every collaborator for assertions.

use serde_json::{json, Value};
use shared_bus::{InMemoryRealtimeBus, Subscription, UpdateFilter};
use shared_types::{BoxId, Identifier, Identity, IdentityId, OrgId};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::{
    InMemoryBoxSettingRepo, InMemoryCache, InMemoryCryptoRepo, InMemoryEventStore,
    InMemoryFileStorage, InMemoryIdentityRepo, InMemoryQuotaRepo,
};
use crate::domain::config::EngineConfig;
use crate::domain::content::CreationContent;
use crate::domain::context::RequestContext;
use crate::service::{BoxEventsDependencies, BoxEventsService};

/// A valid unpadded url-safe public key.
pub const TEST_PUBLIC_KEY: &str = "b3BlbiBzZXNhbWU";

/// `"hello"` in standard base64.
pub const TEST_CIPHERTEXT: &str = "aGVsbG8=";

pub fn make_identity(email: &str) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        display_name: email.split('@').next().unwrap_or(email).to_string(),
        avatar_url: None,
        identifier: Identifier::email(email),
        account_id: Some(Uuid::new_v4()),
    }
}

pub fn creation_content(owner_org_id: OrgId, title: &str) -> CreationContent {
    CreationContent {
        owner_org_id,
        datatag_id: None,
        subject_identity_id: None,
        public_key: TEST_PUBLIC_KEY.to_string(),
        title: title.to_string(),
    }
}

pub fn text_content(encrypted: &str) -> Value {
    json!({ "encrypted": encrypted, "public_key": "pk" })
}

pub fn file_content(file_id: Uuid) -> Value {
    json!({
        "encrypted": TEST_CIPHERTEXT,
        "public_key": "pk",
        "encrypted_file_id": file_id,
    })
}

pub fn edit_content(new_encrypted: &str) -> Value {
    json!({ "new_encrypted": new_encrypted, "new_public_key": "pk2" })
}

pub fn key_share_extra() -> Value {
    json!({
        "misakey_share": "share",
        "other_share_hash": "hash",
        "encrypted_invitation_key_share": "encrypted",
    })
}

/// Service plus its in-memory collaborators.
pub struct TestHarness {
    pub service: Arc<BoxEventsService>,
    pub store: InMemoryEventStore,
    pub cache: Arc<InMemoryCache>,
    pub identities: Arc<InMemoryIdentityRepo>,
    pub crypto: Arc<InMemoryCryptoRepo>,
    pub files: Arc<InMemoryFileStorage>,
    pub quota: Arc<InMemoryQuotaRepo>,
    pub settings: Arc<InMemoryBoxSettingRepo>,
    pub org_id: OrgId,
}

impl TestHarness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let store = InMemoryEventStore::new();
        let bus = Arc::new(InMemoryRealtimeBus::with_capacity(config.realtime_channel_capacity));
        let cache = Arc::new(InMemoryCache::new(bus));
        let identities = Arc::new(InMemoryIdentityRepo::new());
        let crypto = Arc::new(InMemoryCryptoRepo::new());
        let files = Arc::new(InMemoryFileStorage::new());
        let quota = Arc::new(InMemoryQuotaRepo::new());
        let settings = Arc::new(InMemoryBoxSettingRepo::new());

        let deps = BoxEventsDependencies {
            store: Arc::new(store.clone()),
            cache: cache.clone(),
            identities: identities.clone(),
            crypto: crypto.clone(),
            files: files.clone(),
            quota: quota.clone(),
            settings: settings.clone(),
        };

        Self {
            service: Arc::new(BoxEventsService::new(deps, config)),
            store,
            cache,
            identities,
            crypto,
            files,
            quota,
            settings,
            org_id: Uuid::new_v4(),
        }
    }

    /// Register an identity and return a request context acting as it.
    pub fn register(&self, email: &str) -> (Identity, RequestContext) {
        let identity = make_identity(email);
        self.identities.insert(identity.clone());
        let ctx = RequestContext::new(identity.id);
        (identity, ctx)
    }

    /// Receive the realtime updates of an identity.
    #[must_use]
    pub fn subscribe(&self, identity_id: &IdentityId) -> Subscription {
        self.cache.bus().subscribe(UpdateFilter::for_identity(identity_id))
    }

    #[must_use]
    pub fn creation(&self, title: &str) -> CreationContent {
        creation_content(self.org_id, title)
    }

    #[must_use]
    pub fn new_box_id() -> BoxId {
        Uuid::new_v4()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
