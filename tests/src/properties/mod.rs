//! # Engine Properties
//!
//! Properties that hold for any log the engine accepts:
//!
//! 1. **Determinism**: projecting the same log twice gives identical bytes
//! 2. **Supersession**: an event is inactive iff a later event refers to it
//! 3. **Fold order**: an edit chain ends on the last edit's payload
//! 4. **Access evaluation**: identifier rules match exactly

#[cfg(test)]
mod tests {
    use box_events::engine::members::active_joins;
    use box_events::test_utils::{edit_content, text_content, TestHarness, TEST_CIPHERTEXT};
    use box_events::{
        AccessContent, BoxEventsApi, EngineConfig, EventFilter, EventReader, NewEvent, QuotaRepo,
        RequestContext, RestrictionType, Unreferred,
    };
    use serde_json::json;
    use shared_types::{BoxId, EventType};

    async fn box_with_rule(h: &TestHarness, admin: &RequestContext, rule: AccessContent) -> BoxId {
        let box_id = h
            .service
            .create_box(admin, h.creation("Props"))
            .await
            .unwrap()
            .id();
        h.service
            .create_event(
                admin,
                NewEvent::new(EventType::AccessAdd, box_id, serde_json::to_value(rule).unwrap()),
            )
            .await
            .unwrap();
        box_id
    }

    // =========================================================================
    // DETERMINISM
    // =========================================================================

    #[tokio::test]
    async fn test_projection_is_byte_identical_across_calls() {
        let h = TestHarness::new();
        let (_, admin) = h.register("a@b.com");
        let (_, bob) = h.register("bob@b.com");
        let box_id = box_with_rule(&h, &admin, AccessContent::identifier("bob@b.com")).await;
        h.service
            .create_event(&bob, NewEvent::new(EventType::MemberJoin, box_id, json!({})))
            .await
            .unwrap();
        h.service
            .create_event(
                &bob,
                NewEvent::new(EventType::MsgText, box_id, text_content(TEST_CIPHERTEXT)),
            )
            .await
            .unwrap();

        let first = h.service.compute_box(&admin, &box_id).await.unwrap();
        let second = h.service.compute_box(&admin, &box_id).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    // =========================================================================
    // SUPERSESSION
    // =========================================================================

    #[tokio::test]
    async fn test_leave_supersedes_exactly_its_join() {
        let h = TestHarness::new();
        let (_, admin) = h.register("a@b.com");
        let (bob, bob_ctx) = h.register("bob@b.com");
        let box_id = box_with_rule(&h, &admin, AccessContent::identifier("bob@b.com")).await;
        let join = NewEvent::new(EventType::MemberJoin, box_id, json!({}));

        let first_join = h.service.create_event(&bob_ctx, join.clone()).await.unwrap();
        let leave = h
            .service
            .create_event(&bob_ctx, NewEvent::new(EventType::MemberLeave, box_id, json!({})))
            .await
            .unwrap();
        assert_eq!(leave.referrer_id, Some(first_join.id));

        let second_join = h.service.create_event(&bob_ctx, join).await.unwrap();
        let active: Vec<_> = active_joins(&h.store, &box_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.sender_id == bob.id)
            .map(|e| e.id)
            .collect();
        assert_eq!(active, vec![second_join.id]);

        let unreferred = h
            .store
            .find(
                &EventFilter::for_box(box_id)
                    .of_type(EventType::MemberJoin)
                    .unreferred(Unreferred::any()),
            )
            .await
            .unwrap();
        assert_eq!(unreferred.len(), 1);
        assert_eq!(unreferred[0].id, second_join.id);
    }

    // =========================================================================
    // FOLD ORDER
    // =========================================================================

    #[tokio::test]
    async fn test_edit_chain_ends_on_last_edit() {
        let h = TestHarness::new();
        let (_, admin) = h.register("a@b.com");
        let box_id = h
            .service
            .create_box(&admin, h.creation("Props"))
            .await
            .unwrap()
            .id();
        let text = h
            .service
            .create_event(
                &admin,
                NewEvent::new(EventType::MsgText, box_id, text_content(TEST_CIPHERTEXT)),
            )
            .await
            .unwrap();

        let edit1 = "YWJj";
        let edit2 = "YWJjZGVmZ2g=";
        for payload in [edit1, edit2] {
            h.service
                .create_event(
                    &admin,
                    NewEvent::new(EventType::MsgEdit, box_id, edit_content(payload))
                        .referring_to(text.id),
                )
                .await
                .unwrap();
        }

        let msg = h.service.build_message(&admin, &text.id).await.unwrap();
        assert_eq!(msg.encrypted, edit2);
        assert_eq!(msg.new_size, edit2.len() as u64);
        assert_eq!(msg.old_size, edit1.len() as u64);
        assert!(msg.last_edited_at.is_some());
        assert_eq!(h.quota.used_space(&box_id).await.unwrap(), edit2.len() as u64);
    }

    // =========================================================================
    // ACCESS EVALUATION
    // =========================================================================

    #[tokio::test]
    async fn test_identifier_rule_matches_exactly() {
        let h = TestHarness::new();
        let (_, admin) = h.register("owner@b.com");
        let (allowed, ctx) = h.register("a@b.com");
        let (lookalike, _) = h.register("a@b.co");
        let (other, _) = h.register("z@b.com");
        let box_id = box_with_rule(&h, &admin, AccessContent::identifier("a@b.com")).await;

        assert!(h.service.has_access(&ctx, &box_id, &allowed.id).await.is_ok());
        assert!(h.service.has_access(&ctx, &box_id, &lookalike.id).await.is_err());
        assert!(h.service.has_access(&ctx, &box_id, &other.id).await.is_err());
    }

    #[tokio::test]
    async fn test_first_rule_only_inspects_newest_rule() {
        let domain_rule = AccessContent {
            restriction_type: RestrictionType::EmailDomain,
            value: "b.com".to_string(),
            auto_invite: false,
        };

        for (first_rule_only, expect_access) in [(true, false), (false, true)] {
            let h = TestHarness::with_config(EngineConfig {
                first_rule_only,
                ..EngineConfig::default()
            });
            let (_, admin) = h.register("owner@c.org");
            let (carol, ctx) = h.register("carol@b.com");
            let box_id = box_with_rule(&h, &admin, domain_rule.clone()).await;
            // newest rule does not match carol
            h.service
                .create_event(
                    &admin,
                    NewEvent::new(
                        EventType::AccessAdd,
                        box_id,
                        serde_json::to_value(AccessContent::identifier("dan@c.org")).unwrap(),
                    ),
                )
                .await
                .unwrap();

            let result = h.service.has_access(&ctx, &box_id, &carol.id).await;
            assert_eq!(result.is_ok(), expect_access, "first_rule_only={first_rule_only}");
        }
    }

    #[tokio::test]
    async fn test_admin_bypasses_rules() {
        let h = TestHarness::new();
        let (admin, ctx) = h.register("owner@b.com");
        let box_id = h
            .service
            .create_box(&ctx, h.creation("Props"))
            .await
            .unwrap()
            .id();
        assert!(h.service.has_access(&ctx, &box_id, &admin.id).await.is_ok());
    }
}
