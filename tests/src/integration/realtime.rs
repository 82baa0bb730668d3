//! # Realtime Delivery
//!
//! A committed event travels from the After steps through the bus to the
//! listener of every member connection:
//!
//! ```text
//! create_event ──→ SendRealtimeUpdate ──→ InMemoryRealtimeBus ──→ run_listener ──→ client
//! ```

#[cfg(test)]
mod tests {
    use box_events::test_utils::{text_content, TestHarness, TEST_CIPHERTEXT};
    use box_events::{AccessContent, BoxEventsApi, NewEvent};
    use serde_json::json;
    use shared_bus::{
        run_listener, ClientFrame, ListenerError, ServerFrame, EVENT_NEW_KIND,
    };
    use shared_types::EventType;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_message_reaches_member_connection() {
        let h = TestHarness::new();
        let (admin, admin_ctx) = h.register("admin@acme.io");
        let (bob, bob_ctx) = h.register("bob@acme.io");
        let box_id = h
            .service
            .create_box(&admin_ctx, h.creation("Lunch"))
            .await
            .unwrap()
            .id();
        let rule = serde_json::to_value(AccessContent::identifier("bob@acme.io")).unwrap();
        h.service
            .create_event(&admin_ctx, NewEvent::new(EventType::AccessAdd, box_id, rule))
            .await
            .unwrap();
        h.service
            .create_event(&bob_ctx, NewEvent::new(EventType::MemberJoin, box_id, json!({})))
            .await
            .unwrap();

        // bob connects
        let (client_tx, client_rx) = mpsc::channel(8);
        let (server_tx, mut server_rx) = mpsc::channel(8);
        let listener = tokio::spawn(run_listener(
            h.subscribe(&bob.id),
            client_rx,
            server_tx,
            h.service.config().listener_config(),
        ));

        let text = h
            .service
            .create_event(
                &admin_ctx,
                NewEvent::new(EventType::MsgText, box_id, text_content(TEST_CIPHERTEXT)),
            )
            .await
            .unwrap();

        let frame = timeout(Duration::from_secs(1), server_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let ServerFrame::Update(update) = frame else {
            panic!("expected an update, got {frame:?}");
        };
        assert_eq!(update.kind, EVENT_NEW_KIND);
        assert_eq!(update.object["id"], text.id.to_string());
        assert_eq!(update.object["box_id"], box_id.to_string());
        // bob is not the creator: the admin's identifier stays hidden
        assert!(update.object["sender"]["identifier"].is_null());

        client_tx.send(ClientFrame::Close).await.unwrap();
        assert_eq!(server_rx.recv().await, Some(ServerFrame::Close));
        assert_eq!(
            listener.await.unwrap(),
            Err(ListenerError::ClientDisconnected)
        );
    }

    #[tokio::test]
    async fn test_outsider_connection_receives_nothing() {
        let h = TestHarness::new();
        let (_, admin_ctx) = h.register("admin@acme.io");
        let (eve, _) = h.register("eve@evil.io");
        let box_id = h
            .service
            .create_box(&admin_ctx, h.creation("Lunch"))
            .await
            .unwrap()
            .id();

        let mut eve_updates = h.subscribe(&eve.id);
        h.service
            .create_event(
                &admin_ctx,
                NewEvent::new(EventType::MsgText, box_id, text_content(TEST_CIPHERTEXT)),
            )
            .await
            .unwrap();

        assert!(matches!(eve_updates.try_recv(), Ok(None)));
    }
}
