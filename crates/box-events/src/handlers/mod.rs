//! # Handlers
//!
//! Every event type maps to exactly one Do step and an ordered list of
//! After steps. The mapping is an exhaustive `match`, so adding an event type
//! does not compile until it is routed here.
//!
//! Do steps run inside the creating transaction: they authorize first, then
//! run structural checks and persist. After steps run post-commit through
//! the outbox and never undo the event.

pub mod access;
pub mod after;
pub mod create;
pub mod members;
pub mod messages;
pub mod state;

use serde_json::Value;
use shared_types::{Event, EventType};

use crate::domain::config::EngineConfig;
use crate::domain::context::RequestContext;
use crate::domain::errors::{BoxError, ForbiddenReason};
use crate::domain::outbox::{AfterStep, Metadata};
use crate::engine::identity_mapper::IdentityMapper;
use crate::ports::outbound::{CacheService, CryptoActionRepo, EventTransaction, FileStorageRepo};

pub use after::AfterContext;

/// Collaborators available to a Do step.
pub struct DoContext<'a> {
    pub txn: &'a mut dyn EventTransaction,
    pub cache: &'a dyn CacheService,
    pub mapper: &'a IdentityMapper,
    pub crypto: &'a dyn CryptoActionRepo,
    pub files: &'a dyn FileStorageRepo,
    pub config: &'a EngineConfig,
    pub request: &'a RequestContext,
    /// Set once the step wrote state outside the log; the event then commits
    /// even if the request is cancelled afterwards.
    pub external_written: bool,
}

/// Run the Do step of `event`. The event may be completed in place (a leave
/// gets its referrer) before it is persisted.
pub async fn run_do(
    ctx: &mut DoContext<'_>,
    event: &mut Event,
    extra: Option<&Value>,
) -> Result<Metadata, BoxError> {
    match event.event_type {
        EventType::Create => create::do_create(ctx, event).await,
        EventType::AccessAdd => access::do_add_access(ctx, event, extra).await,
        EventType::AccessRm => access::do_rm_access(ctx, event).await,
        EventType::MemberJoin => members::do_join(ctx, event).await,
        EventType::MemberLeave => members::do_leave(ctx, event).await,
        // never added by end-users directly but by the kick sweep
        EventType::MemberKick => Err(BoxError::forbidden(
            ForbiddenReason::SystemOnly,
            "member.kick events are created by the system",
        )),
        EventType::MsgText | EventType::MsgFile => messages::do_message(ctx, event).await,
        EventType::MsgEdit => messages::do_edit(ctx, event).await,
        EventType::MsgDelete => messages::do_delete(ctx, event).await,
        EventType::StateAccessMode => state::do_access_mode(ctx, event).await,
        EventType::StateKeyShare => state::do_key_share(ctx, event, extra).await,
    }
}

/// Post-commit side effects of an event type, in execution order.
#[must_use]
pub fn after_steps(event_type: EventType) -> &'static [AfterStep] {
    use AfterStep::*;

    match event_type {
        EventType::Create => &[InvalidateCaches, SendRealtimeUpdate],
        EventType::AccessAdd | EventType::AccessRm | EventType::StateKeyShare => &[],
        EventType::MemberJoin | EventType::MemberLeave => {
            &[SendRealtimeUpdate, CountActivity, InvalidateCaches]
        }
        EventType::MemberKick => &[NotifyKick, SendRealtimeUpdate, CountActivity, InvalidateCaches],
        EventType::MsgText | EventType::MsgFile => {
            &[SendRealtimeUpdate, CountActivity, ComputeUsedSpace]
        }
        EventType::MsgEdit => &[SendRealtimeUpdate, ComputeUsedSpace],
        EventType::MsgDelete => &[SendRealtimeUpdate, ComputeUsedSpace, DeleteOrphanFile],
        EventType::StateAccessMode => &[SendRealtimeUpdate, CountActivity],
    }
}

/// Referrer id of an event that must refer to another one.
pub(crate) fn require_referrer(event: &Event) -> Result<shared_types::EventId, BoxError> {
    event
        .referrer_id
        .ok_or_else(|| BoxError::bad_request("referrer_id is required"))
}

/// Reject a referrer on event types that start a chain.
pub(crate) fn forbid_referrer(event: &Event) -> Result<(), BoxError> {
    if event.referrer_id.is_some() {
        return Err(BoxError::bad_request(format!(
            "referrer_id is forbidden on {}",
            event.event_type
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_route() {
        for event_type in EventType::ALL {
            let steps = after_steps(event_type);
            let mut unique = steps.to_vec();
            unique.dedup();
            assert_eq!(unique.len(), steps.len(), "{event_type}");
        }
    }

    #[test]
    fn test_kick_notifies_first() {
        assert_eq!(after_steps(EventType::MemberKick)[0], AfterStep::NotifyKick);
        assert!(after_steps(EventType::StateKeyShare).is_empty());
        assert!(after_steps(EventType::MsgDelete).contains(&AfterStep::DeleteOrphanFile));
    }

    #[test]
    fn test_referrer_rules() {
        let box_id = uuid::Uuid::new_v4();
        let sender = uuid::Uuid::new_v4();
        let text = Event::new(EventType::MsgText, box_id, sender, serde_json::json!({}), None);
        assert!(forbid_referrer(&text).is_ok());
        assert_eq!(require_referrer(&text).unwrap_err().class(), "bad_request");

        let edit = Event::new(EventType::MsgEdit, box_id, sender, serde_json::json!({}), Some(text.id));
        assert_eq!(require_referrer(&edit).unwrap(), text.id);
        assert!(forbid_referrer(&edit).is_err());
    }
}
