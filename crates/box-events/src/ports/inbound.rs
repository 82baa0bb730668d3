//! # Inbound Ports (Driving Ports)
//!
//! The API the box engine exposes to transport layers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{BoxId, EventId, EventType, EventView, IdentityId, OrgId, SenderView};

use crate::domain::content::CreationContent;
use crate::domain::context::RequestContext;
use crate::domain::errors::BoxError;
use crate::domain::message::Message;
use crate::domain::projection::{BoxSetting, BoxView};

/// A client request to append an event to a box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub box_id: BoxId,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub referrer_id: Option<EventId>,
    /// Data consumed by the Do step and never stored in the log.
    #[serde(default)]
    pub extra: Option<Value>,
}

impl NewEvent {
    #[must_use]
    pub fn new(event_type: EventType, box_id: BoxId, content: Value) -> Self {
        Self {
            event_type,
            box_id,
            content,
            referrer_id: None,
            extra: None,
        }
    }

    #[must_use]
    pub fn referring_to(mut self, referrer_id: EventId) -> Self {
        self.referrer_id = Some(referrer_id);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Primary API of the box engine.
///
/// Every operation acts on behalf of `ctx.identity_id` and fails with
/// `Cancelled` once the context token fired.
#[async_trait]
pub trait BoxEventsApi: Send + Sync {
    /// Create a box. The caller becomes its creator and only admin.
    async fn create_box(
        &self,
        ctx: &RequestContext,
        content: CreationContent,
    ) -> Result<BoxView, BoxError>;

    /// Validate, authorize and append an event, then run its side effects.
    ///
    /// ## Errors
    ///
    /// - `BadRequest`: invalid content or referrer
    /// - `Forbidden`: authorization failure, nothing was written
    /// - `Conflict`: duplicate member, rule or box
    /// - `NotFound`: missing box or referrer
    /// - `Gone`: the referred message is deleted
    async fn create_event(&self, ctx: &RequestContext, new: NewEvent)
        -> Result<EventView, BoxError>;

    /// Project a box for the acting identity.
    async fn compute_box(&self, ctx: &RequestContext, box_id: &BoxId) -> Result<BoxView, BoxError>;

    /// Visible events of a box, newest first, with messages aggregated.
    async fn list_events(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<EventView>, BoxError>;

    async fn count_events(&self, ctx: &RequestContext, box_id: &BoxId) -> Result<usize, BoxError>;

    /// Active `msg.file` events of a box, newest first.
    async fn list_files(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<EventView>, BoxError>;

    /// Boxes the acting identity created or joined in an organization,
    /// most recently active first.
    async fn list_boxes_for_identity(
        &self,
        ctx: &RequestContext,
        owner_org_id: &OrgId,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<BoxView>, BoxError>;

    async fn count_boxes_for_identity(
        &self,
        ctx: &RequestContext,
        owner_org_id: &OrgId,
    ) -> Result<usize, BoxError>;

    async fn has_access(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        identity_id: &IdentityId,
    ) -> Result<(), BoxError>;

    async fn must_be_member(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        identity_id: &IdentityId,
    ) -> Result<(), BoxError>;

    async fn must_be_admin(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        identity_id: &IdentityId,
    ) -> Result<(), BoxError>;

    async fn list_member_ids(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
    ) -> Result<Vec<IdentityId>, BoxError>;

    /// Member views. Identifiers are only disclosed to the box admin.
    async fn list_members(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
    ) -> Result<Vec<SenderView>, BoxError>;

    /// Supersede every join that no longer passes the access rules.
    ///
    /// Returns the created `member.kick` events.
    async fn kick_deprecated_members(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
    ) -> Result<Vec<EventView>, BoxError>;

    /// Unread counters of the acting identity, by box.
    async fn events_count_for(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<(BoxId, i64)>, BoxError>;

    /// Reset the unread counter of the acting identity in a box.
    async fn ack_new_events(&self, ctx: &RequestContext, box_id: &BoxId) -> Result<(), BoxError>;

    async fn get_box_settings(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
    ) -> Result<BoxSetting, BoxError>;

    async fn update_box_settings(
        &self,
        ctx: &RequestContext,
        box_id: &BoxId,
        muted: bool,
    ) -> Result<BoxSetting, BoxError>;

    /// Remove a box and its whole log. Admin only.
    async fn delete_box(&self, ctx: &RequestContext, box_id: &BoxId) -> Result<usize, BoxError>;

    /// Rebuild a message aggregate from its initiating event.
    async fn build_message(&self, ctx: &RequestContext, event_id: &EventId)
        -> Result<Message, BoxError>;

    /// Box ids an identity belongs to within an organization.
    async fn list_box_ids_for_identity(
        &self,
        ctx: &RequestContext,
        owner_org_id: &OrgId,
    ) -> Result<Vec<BoxId>, BoxError>;
}
