//! # Box Events API Implementation
//!
//! Implements the `BoxEventsApi` trait on top of the engine.

use async_trait::async_trait;
use shared_types::{BoxId, Event, EventId, EventType, EventView, IdentityId, OrgId, SenderView};
use tracing::{info, warn};

use box_telemetry::{log_identity_event, metric_inc, MEMBERS_KICKED};

use super::BoxEventsService;
use crate::domain::cache_keys;
use crate::domain::content::CreationContent;
use crate::domain::context::RequestContext;
use crate::domain::errors::BoxError;
use crate::domain::filters::EventFilter;
use crate::domain::message::Message;
use crate::domain::outbox::Metadata;
use crate::domain::projection::{BoxSetting, BoxView};
use crate::engine::aggregator::{build_aggregate, build_message};
use crate::engine::counts::{counts_for_identity, delete_box_counters, reset_count};
use crate::engine::formatter::format_event;
use crate::engine::identity_mapper::IdentityMapper;
use crate::engine::listing::box_ids_for_identity;
use crate::engine::{access, files, members};
use crate::handlers::after_steps;
use crate::handlers::members::kick_deprecated_members;
use crate::ports::inbound::{BoxEventsApi, NewEvent};
use crate::ports::outbound::{
    BoxSettingRepo, CacheService, EventReader, EventStore, EventTransaction,
};

impl BoxEventsService {
    fn page(&self, offset: Option<usize>, limit: Option<usize>) -> (Option<usize>, Option<usize>) {
        (offset, Some(limit.unwrap_or(self.config.default_list_limit)))
    }

    async fn must_be_member_of(&self, box_id: &BoxId, identity_id: &IdentityId) -> Result<(), BoxError> {
        members::must_be_member(
            self.deps.store.as_ref(),
            self.deps.cache.as_ref(),
            box_id,
            identity_id,
        )
        .await
    }

    /// Visible events with their message chains folded.
    async fn format_events(
        &self,
        mapper: &IdentityMapper,
        events: Vec<Event>,
    ) -> Result<Vec<EventView>, BoxError> {
        let mut views = Vec::with_capacity(events.len());
        for mut event in events {
            build_aggregate(self.deps.store.as_ref(), self.deps.files.as_ref(), &mut event)
                .await
                .map_err(|e| e.describe("building aggregate"))?;
            views.push(format_event(mapper, event, false).await?);
        }
        Ok(views)
    }
}

#[async_trait]
impl BoxEventsApi for BoxEventsService {
    async fn create_box(
        &self,
        ctx: &RequestContext,
        content: CreationContent,
    ) -> Result<BoxView, BoxError> {
        let raw = serde_json::to_value(&content)
            .map_err(|e| BoxError::internal(format!("encoding creation content: {e}")))?;
        let new = NewEvent::new(EventType::Create, uuid::Uuid::new_v4(), raw);
        let (event, _) = self.append(ctx, new).await?;

        let mapper = self.mapper();
        self.projector(&mapper)
            .compute_box(&event.box_id, Some(&ctx.identity_id), Some(event.clone()))
            .await
    }

    async fn create_event(
        &self,
        ctx: &RequestContext,
        new: NewEvent,
    ) -> Result<EventView, BoxError> {
        let (_, view) = self.append(ctx, new).await?;
        Ok(view)
    }

    async fn compute_box(&self, ctx: &RequestContext, box_id: &BoxId) -> Result<BoxView, BoxError> {
        ctx.check()?;
        let mapper = self.mapper();
        let store = self.deps.store.as_ref();
        // non-members may look at a box they are allowed to join
        if !members::is_member(store, self.deps.cache.as_ref(), box_id, &ctx.identity_id).await? {
            access::must_be_able_to_join(
                store,
                &mapper,
                self.config.first_rule_only,
                box_id,
                &ctx.identity_id,
            )
            .await?;
        }
        self.projector(&mapper)
            .compute_box(box_id, Some(&ctx.identity_id), None)
            .await
    }

    async fn list_events(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<EventView>, BoxError> {
        ctx.check()?;
        self.must_be_member_of(box_id, &ctx.identity_id).await?;
        let (offset, limit) = self.page(offset, limit);
        let events = self
            .deps
            .store
            .find(
                &EventFilter::for_box(*box_id)
                    .of_types(&EventType::VISIBLE)
                    .paginate(offset, limit),
            )
            .await?;
        let mapper = self.mapper();
        self.format_events(&mapper, events).await
    }

    async fn count_events(&self, ctx: &RequestContext, box_id: &BoxId) -> Result<usize, BoxError> {
        ctx.check()?;
        self.must_be_member_of(box_id, &ctx.identity_id).await?;
        let count = self
            .deps
            .store
            .count(&EventFilter::for_box(*box_id).of_types(&EventType::VISIBLE))
            .await?;
        Ok(count)
    }

    async fn list_files(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<EventView>, BoxError> {
        ctx.check()?;
        self.must_be_member_of(box_id, &ctx.identity_id).await?;
        let (offset, limit) = self.page(offset, limit);
        let events = files::list_files(self.deps.store.as_ref(), box_id, offset, limit).await?;
        let mapper = self.mapper();
        self.format_events(&mapper, events).await
    }

    async fn list_boxes_for_identity(
        &self,
        ctx: &RequestContext,
        owner_org_id: &OrgId,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<BoxView>, BoxError> {
        ctx.check()?;
        let store = self.deps.store.as_ref();
        let ids = box_ids_for_identity(store, self.deps.cache.as_ref(), &ctx.identity_id, owner_org_id).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (offset, limit) = self.page(offset, limit);
        let latest = store.latest_per_box(&ids, &EventType::VISIBLE).await?;
        let mapper = self.mapper();
        let projector = self.projector(&mapper);

        let mut boxes = Vec::new();
        for last in latest
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
        {
            let box_id = last.box_id;
            let view = projector
                .compute_box(&box_id, Some(&ctx.identity_id), Some(last))
                .await
                .map_err(|e| e.describe(format!("computing box {box_id}")))?;
            boxes.push(view);
        }
        Ok(boxes)
    }

    async fn count_boxes_for_identity(
        &self,
        ctx: &RequestContext,
        owner_org_id: &OrgId,
    ) -> Result<usize, BoxError> {
        Ok(self.list_box_ids_for_identity(ctx, owner_org_id).await?.len())
    }

    async fn has_access(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        identity_id: &IdentityId,
    ) -> Result<(), BoxError> {
        ctx.check()?;
        let mapper = self.mapper();
        access::must_have_access(
            self.deps.store.as_ref(),
            &mapper,
            self.config.first_rule_only,
            box_id,
            identity_id,
        )
        .await
    }

    async fn must_be_member(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        identity_id: &IdentityId,
    ) -> Result<(), BoxError> {
        ctx.check()?;
        self.must_be_member_of(box_id, identity_id).await
    }

    async fn must_be_admin(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        identity_id: &IdentityId,
    ) -> Result<(), BoxError> {
        ctx.check()?;
        access::must_be_admin(self.deps.store.as_ref(), box_id, identity_id).await
    }

    async fn list_member_ids(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
    ) -> Result<Vec<IdentityId>, BoxError> {
        ctx.check()?;
        self.must_be_member_of(box_id, &ctx.identity_id).await?;
        members::list_member_ids(self.deps.store.as_ref(), self.deps.cache.as_ref(), box_id).await
    }

    async fn list_members(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
    ) -> Result<Vec<SenderView>, BoxError> {
        let ids = self.list_member_ids(ctx, box_id).await?;
        let transparent = self.is_admin(box_id, &ctx.identity_id).await?;
        self.mapper().list(&ids, transparent).await
    }

    async fn kick_deprecated_members(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
    ) -> Result<Vec<EventView>, BoxError> {
        ctx.check()?;
        let store = self.deps.store.as_ref();
        access::must_be_admin(store, box_id, &ctx.identity_id).await?;

        let mapper = self.mapper();
        let mut txn = store.begin().await?;
        let kicks = kick_deprecated_members(
            &mut *txn,
            &mapper,
            self.config.first_rule_only,
            box_id,
            &ctx.identity_id,
        )
        .await
        .map_err(|e| e.describe("kicking deprecated members"))?;
        if kicks.is_empty() {
            return Ok(Vec::new());
        }

        ctx.check()?;
        txn.commit().await?;

        let mut views = Vec::with_capacity(kicks.len());
        for kick in &kicks {
            metric_inc!(MEMBERS_KICKED);
            log_identity_event!(info, "Member kicked", kick.box_id, kick.sender_id, event_id = %kick.id);
            self.outbox
                .enqueue(kick, &Metadata::None, after_steps(EventType::MemberKick));
        }
        self.drain_outbox().await;

        for kick in kicks {
            views.push(format_event(&mapper, kick, false).await?);
        }
        Ok(views)
    }

    async fn events_count_for(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<(BoxId, i64)>, BoxError> {
        ctx.check()?;
        counts_for_identity(self.deps.cache.as_ref(), &ctx.identity_id).await
    }

    async fn ack_new_events(&self, ctx: &RequestContext, box_id: &BoxId) -> Result<(), BoxError> {
        ctx.check()?;
        self.must_be_member_of(box_id, &ctx.identity_id).await?;
        reset_count(self.deps.cache.as_ref(), &ctx.identity_id, box_id).await
    }

    async fn get_box_settings(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
    ) -> Result<BoxSetting, BoxError> {
        ctx.check()?;
        self.must_be_member_of(box_id, &ctx.identity_id).await?;
        let stored = self
            .deps
            .settings
            .get(&ctx.identity_id, box_id)
            .await
            .map_err(|e| BoxError::from(e).describe("getting box setting"))?;
        Ok(stored.unwrap_or_else(|| BoxSetting::default_for(ctx.identity_id, *box_id)))
    }

    async fn update_box_settings(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        muted: bool,
    ) -> Result<BoxSetting, BoxError> {
        ctx.check()?;
        self.must_be_member_of(box_id, &ctx.identity_id).await?;
        let mut setting = BoxSetting::default_for(ctx.identity_id, *box_id);
        setting.muted = muted;
        self.deps
            .settings
            .upsert(setting.clone())
            .await
            .map_err(|e| BoxError::from(e).describe("storing box setting"))?;
        Ok(setting)
    }

    async fn delete_box(&self, ctx: &RequestContext, box_id: &BoxId) -> Result<usize, BoxError> {
        ctx.check()?;
        let store = self.deps.store.as_ref();
        let cache = self.deps.cache.as_ref();
        access::must_be_admin(store, box_id, &ctx.identity_id).await?;
        let member_ids = members::list_member_ids(store, cache, box_id).await?;

        ctx.check()?;
        let removed = store.delete_box(box_id).await?;
        info!(box_id = %box_id, removed, identity_id = %ctx.identity_id, "Box deleted");

        if let Err(e) = cache.delete(&[cache_keys::members_key(box_id)]).await {
            warn!(box_id = %box_id, error = %e, "Could not clean box members cache");
        }
        for member_id in &member_ids {
            if let Err(e) = cache
                .delete_matching(&cache_keys::user_boxes_prefix(member_id), "")
                .await
            {
                warn!(box_id = %box_id, identity_id = %member_id, error = %e, "Could not clean user boxes cache");
            }
        }
        if let Err(e) = delete_box_counters(cache, box_id).await {
            warn!(box_id = %box_id, error = %e, "Could not clean box counters");
        }
        Ok(removed)
    }

    async fn build_message(
        &self,
        ctx: &RequestContext,
        event_id: &EventId,
    ) -> Result<Message, BoxError> {
        ctx.check()?;
        let msg = build_message(self.deps.store.as_ref(), self.deps.files.as_ref(), event_id).await?;
        self.must_be_member_of(&msg.box_id, &ctx.identity_id).await?;
        Ok(msg)
    }

    async fn list_box_ids_for_identity(
        &self,
        ctx: &RequestContext,
        owner_org_id: &OrgId,
    ) -> Result<Vec<BoxId>, BoxError> {
        ctx.check()?;
        box_ids_for_identity(
            self.deps.store.as_ref(),
            self.deps.cache.as_ref(),
            &ctx.identity_id,
            owner_org_id,
        )
        .await
    }
}
