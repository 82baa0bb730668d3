//! # Box Events Service
//!
//! The application service implementing `BoxEventsApi`.
//!
//! ## Architecture
//!
//! This service:
//! 1. Validates payloads through the content registry
//! 2. Runs the Do step of each event inside one store transaction
//! 3. Hands the After steps of committed events to the outbox
//! 4. Projects boxes and events for readers
//!
//! Collaborators are injected as trait objects so the host can plug its own
//! store, cache and identity service.

mod api;
mod dispatch;

use serde_json::Value;
use shared_types::{normalize_content, BoxId, Event, EventView, IdentityId};
use std::sync::Arc;

use box_telemetry::{log_box_event, metric_inc, EVENTS_CREATED, EVENTS_REJECTED};

use crate::domain::config::EngineConfig;
use crate::domain::content::validate;
use crate::domain::context::RequestContext;
use crate::domain::errors::BoxError;
use crate::domain::outbox::{Metadata, Outbox};
use crate::engine::formatter::format_event;
use crate::engine::identity_mapper::IdentityMapper;
use crate::engine::projector::Projector;
use crate::handlers::{after_steps, run_do, DoContext};
use crate::ports::inbound::NewEvent;
use crate::ports::outbound::{
    BoxSettingRepo, CacheService, CryptoActionRepo, EventStore, EventTransaction, FileStorageRepo,
    IdentityRepo, QuotaRepo,
};

/// Collaborators of `BoxEventsService`.
#[derive(Clone)]
pub struct BoxEventsDependencies {
    pub store: Arc<dyn EventStore>,
    pub cache: Arc<dyn CacheService>,
    pub identities: Arc<dyn IdentityRepo>,
    pub crypto: Arc<dyn CryptoActionRepo>,
    pub files: Arc<dyn FileStorageRepo>,
    pub quota: Arc<dyn QuotaRepo>,
    pub settings: Arc<dyn BoxSettingRepo>,
}

/// The box engine.
pub struct BoxEventsService {
    pub(crate) deps: BoxEventsDependencies,
    pub(crate) config: EngineConfig,
    pub(crate) outbox: Outbox,
}

impl BoxEventsService {
    #[must_use]
    pub fn new(deps: BoxEventsDependencies, config: EngineConfig) -> Self {
        let outbox = Outbox::new(config.outbox_max_attempts, config.outbox_dead_letter_capacity);
        Self {
            deps,
            config,
            outbox,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Identity mapper scoped to one request.
    pub(crate) fn mapper(&self) -> IdentityMapper {
        IdentityMapper::new(Arc::clone(&self.deps.identities))
    }

    pub(crate) fn projector<'a>(&'a self, mapper: &'a IdentityMapper) -> Projector<'a, dyn EventStore> {
        Projector {
            reader: self.deps.store.as_ref(),
            mapper,
            files: self.deps.files.as_ref(),
            cache: self.deps.cache.as_ref(),
            settings: self.deps.settings.as_ref(),
        }
    }

    /// Validate, authorize and persist one event, then run its After steps.
    ///
    /// Returns the committed event as seen by its sender.
    pub(crate) async fn append(
        &self,
        ctx: &RequestContext,
        new: NewEvent,
    ) -> Result<(Event, EventView), BoxError> {
        let event_type = new.event_type;
        let result = self.append_inner(ctx, new).await;
        if let Err(e) = &result {
            metric_inc!(EVENTS_REJECTED, &[event_type.as_str(), e.class()]);
        }
        result
    }

    async fn append_inner(
        &self,
        ctx: &RequestContext,
        new: NewEvent,
    ) -> Result<(Event, EventView), BoxError> {
        ctx.check()?;

        let content = normalize_content(new.content);
        validate(new.event_type, &content)?;
        let event = Event::new(
            new.event_type,
            new.box_id,
            ctx.identity_id,
            content,
            new.referrer_id,
        );

        let mapper = self.mapper();
        let (event, metadata) = self
            .commit_one(ctx, &mapper, event, new.extra.as_ref())
            .await
            .map_err(|e| e.describe(format!("creating {}", new.event_type)))?;

        self.outbox
            .enqueue(&event, &metadata, after_steps(event.event_type));
        self.drain_outbox().await;

        let view = format_event(&mapper, event.clone(), true).await?;
        Ok((event, view))
    }

    /// Run the Do step in a fresh transaction and commit it.
    async fn commit_one(
        &self,
        ctx: &RequestContext,
        mapper: &IdentityMapper,
        mut event: Event,
        extra: Option<&Value>,
    ) -> Result<(Event, Metadata), BoxError> {
        let mut txn = self.deps.store.begin().await?;
        let (metadata, external_written) = {
            let mut do_ctx = DoContext {
                txn: &mut *txn,
                cache: self.deps.cache.as_ref(),
                mapper,
                crypto: self.deps.crypto.as_ref(),
                files: self.deps.files.as_ref(),
                config: &self.config,
                request: ctx,
                external_written: false,
            };
            let metadata = run_do(&mut do_ctx, &mut event, extra).await?;
            (metadata, do_ctx.external_written)
        };

        // nothing is applied once the caller gave up, unless the Do step
        // already wrote outside the log
        if !external_written {
            ctx.check()?;
        }
        txn.commit().await?;

        metric_inc!(EVENTS_CREATED, &[event.event_type.as_str()]);
        log_box_event!(
            info,
            "Event created",
            event.box_id,
            event.id,
            event_type = %event.event_type,
            sender_id = %event.sender_id
        );
        Ok((event, metadata))
    }

    /// Whether `identity_id` created the box, read from the committed log.
    pub(crate) async fn is_admin(
        &self,
        box_id: &BoxId,
        identity_id: &IdentityId,
    ) -> Result<bool, BoxError> {
        crate::engine::access::is_admin(self.deps.store.as_ref(), box_id, identity_id).await
    }
}
