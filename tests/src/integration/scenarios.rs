//! # Box Lifecycle Scenarios
//!
//! Walks a box through its life using only the public API:
//!
//! ```text
//! create ──→ join refused ──→ access.add ──→ join ──→ msg.text
//!                                                        │
//!               kick sweep ←── access.rm ←── msg.delete ←┘
//! ```

#[cfg(test)]
mod tests {
    use box_events::test_utils::{TestHarness, TEST_CIPHERTEXT};
    use box_events::{
        AccessContent, AccessMode, BoxError, BoxEventsApi, EventFilter, EventReader,
        ForbiddenReason, NewEvent, RequestContext,
    };
    use serde_json::json;
    use shared_types::{BoxId, EventType, Identity};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct World {
        h: TestHarness,
        s1: Identity,
        ctx1: RequestContext,
        s2: Identity,
        ctx2: RequestContext,
    }

    fn world() -> World {
        let h = TestHarness::new();
        let (s1, ctx1) = h.register("s1@acme.io");
        let (s2, ctx2) = h.register("s2@acme.io");
        World {
            h,
            s1,
            ctx1,
            s2,
            ctx2,
        }
    }

    async fn create_box(w: &World) -> BoxId {
        let mut content = w.h.creation("T");
        content.public_key = "k".to_string();
        w.h.service.create_box(&w.ctx1, content).await.unwrap().id()
    }

    async fn allow_s2(w: &World, box_id: BoxId) {
        let rule = serde_json::to_value(AccessContent::identifier(&w.s2.identifier.value)).unwrap();
        w.h.service
            .create_event(&w.ctx1, NewEvent::new(EventType::AccessAdd, box_id, rule))
            .await
            .unwrap();
    }

    async fn join(w: &World, ctx: &RequestContext, box_id: BoxId) -> Result<(), BoxError> {
        w.h.service
            .create_event(ctx, NewEvent::new(EventType::MemberJoin, box_id, json!({})))
            .await
            .map(|_| ())
    }

    // =============================================================================
    // SCENARIOS
    // =============================================================================

    #[tokio::test]
    async fn test_created_box_is_limited_and_owned_by_its_creator() {
        let w = world();
        let box_id = create_box(&w).await;

        let view = w.h.service.compute_box(&w.ctx1, &box_id).await.unwrap();
        assert_eq!(view.state.access_mode, AccessMode::Limited);
        assert_eq!(view.state.title, "T");
        assert_eq!(view.state.public_key, "k");
        assert_eq!(view.creator.id, w.s1.id.to_string());
    }

    #[tokio::test]
    async fn test_join_without_any_rule_is_refused() {
        let w = world();
        let box_id = create_box(&w).await;

        let err = join(&w, &w.ctx2, box_id).await.unwrap_err();
        assert_eq!(err.forbidden_reason(), Some(ForbiddenReason::NoAccess));
    }

    #[tokio::test]
    async fn test_join_through_identifier_rule_then_conflict() {
        let w = world();
        let box_id = create_box(&w).await;
        allow_s2(&w, box_id).await;

        join(&w, &w.ctx2, box_id).await.unwrap();
        let err = join(&w, &w.ctx2, box_id).await.unwrap_err();
        assert!(matches!(err, BoxError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_admin_deletion_empties_the_message() {
        let w = world();
        let box_id = create_box(&w).await;
        allow_s2(&w, box_id).await;
        join(&w, &w.ctx2, box_id).await.unwrap();

        let text = w
            .h
            .service
            .create_event(
                &w.ctx2,
                NewEvent::new(
                    EventType::MsgText,
                    box_id,
                    json!({"encrypted": TEST_CIPHERTEXT, "public_key": "pk"}),
                ),
            )
            .await
            .unwrap();
        w.h.service
            .create_event(
                &w.ctx1,
                NewEvent::new(EventType::MsgDelete, box_id, json!({})).referring_to(text.id),
            )
            .await
            .unwrap();

        let msg = w.h.service.build_message(&w.ctx1, &text.id).await.unwrap();
        assert_eq!(msg.encrypted, "");
        assert!(msg.deleted_at.is_some());
        assert_eq!(msg.old_size, TEST_CIPHERTEXT.len() as u64);
        assert_eq!(msg.new_size, 0);
    }

    #[tokio::test]
    async fn test_rule_removal_and_sweep_kicks_the_member() {
        let w = world();
        let box_id = create_box(&w).await;
        allow_s2(&w, box_id).await;
        join(&w, &w.ctx2, box_id).await.unwrap();

        let rule = w
            .h
            .store
            .find(&EventFilter::for_box(box_id).of_type(EventType::AccessAdd))
            .await
            .unwrap()
            .remove(0);
        let join_event = w
            .h
            .store
            .find(&EventFilter::for_box(box_id).of_type(EventType::MemberJoin))
            .await
            .unwrap()
            .remove(0);
        w.h.service
            .create_event(
                &w.ctx1,
                NewEvent::new(EventType::AccessRm, box_id, json!({})).referring_to(rule.id),
            )
            .await
            .unwrap();

        let kicks = w
            .h
            .service
            .kick_deprecated_members(&w.ctx1, &box_id)
            .await
            .unwrap();
        assert_eq!(kicks.len(), 1);
        assert_eq!(kicks[0].referrer_id, Some(join_event.id));

        let err = w
            .h
            .service
            .must_be_member(&w.ctx1, &box_id, &w.s2.id)
            .await
            .unwrap_err();
        assert!(err.is_forbidden());
    }

    // =============================================================================
    // FULL LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_kicked_member_loses_access_everywhere() {
        let w = world();
        let box_id = create_box(&w).await;
        allow_s2(&w, box_id).await;
        join(&w, &w.ctx2, box_id).await.unwrap();
        assert_eq!(
            w.h.service
                .list_box_ids_for_identity(&w.ctx2, &w.h.org_id)
                .await
                .unwrap(),
            vec![box_id]
        );

        let rule = w
            .h
            .store
            .find(&EventFilter::for_box(box_id).of_type(EventType::AccessAdd))
            .await
            .unwrap()
            .remove(0);
        w.h.service
            .create_event(
                &w.ctx1,
                NewEvent::new(EventType::AccessRm, box_id, json!({})).referring_to(rule.id),
            )
            .await
            .unwrap();
        w.h.service
            .kick_deprecated_members(&w.ctx1, &box_id)
            .await
            .unwrap();

        // cached box lists were invalidated by the kick
        assert!(w
            .h
            .service
            .list_box_ids_for_identity(&w.ctx2, &w.h.org_id)
            .await
            .unwrap()
            .is_empty());
        assert!(w
            .h
            .service
            .list_events(&w.ctx2, &box_id, None, None)
            .await
            .is_err());
        let err = join(&w, &w.ctx2, box_id).await.unwrap_err();
        assert_eq!(err.forbidden_reason(), Some(ForbiddenReason::NoAccess));
    }
}
