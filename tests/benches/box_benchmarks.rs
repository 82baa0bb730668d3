//! # Box Engine Benchmarks
//!
//! | Path | Operation | Grows with |
//! |------|-----------|------------|
//! | Write | `msg.text` append + After steps | members |
//! | Read | `compute_box` | log length |
//! | Read | `build_message` | edit chain length |

use box_events::test_utils::{edit_content, text_content, TestHarness, TEST_CIPHERTEXT};
use box_events::{
    AccessContent, BoxEventsApi, EngineConfig, NewEvent, RequestContext, RestrictionType,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use shared_types::{BoxId, EventType};
use std::time::Duration;
use tokio::runtime::Runtime;

/// A box open to `acme.io` with `members` joined identities besides the admin.
///
/// Every join provisions an identifier rule, so all rules are evaluated.
fn populated_box(rt: &Runtime, members: usize) -> (TestHarness, RequestContext, BoxId) {
    rt.block_on(async {
        let h = TestHarness::with_config(EngineConfig {
            first_rule_only: false,
            ..EngineConfig::default()
        });
        let (_, admin) = h.register("admin@acme.io");
        let box_id = h
            .service
            .create_box(&admin, h.creation("Bench"))
            .await
            .unwrap()
            .id();
        let rule = AccessContent {
            restriction_type: RestrictionType::EmailDomain,
            value: "acme.io".to_string(),
            auto_invite: false,
        };
        h.service
            .create_event(
                &admin,
                NewEvent::new(EventType::AccessAdd, box_id, serde_json::to_value(rule).unwrap()),
            )
            .await
            .unwrap();
        for i in 0..members {
            let (_, ctx) = h.register(&format!("member{i}@acme.io"));
            h.service
                .create_event(&ctx, NewEvent::new(EventType::MemberJoin, box_id, json!({})))
                .await
                .unwrap();
        }
        (h, admin, box_id)
    })
}

// ============================================================================
// WRITE PATH
// ============================================================================

fn bench_append_text(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("write-path");
    group.measurement_time(Duration::from_secs(5));

    for members in [1, 10, 50] {
        let (h, admin, box_id) = populated_box(&rt, members);
        group.bench_with_input(BenchmarkId::new("msg_text", members), &members, |b, _| {
            b.to_async(&rt).iter(|| async {
                let view = h
                    .service
                    .create_event(
                        &admin,
                        NewEvent::new(EventType::MsgText, box_id, text_content(TEST_CIPHERTEXT)),
                    )
                    .await
                    .unwrap();
                black_box(view)
            })
        });
    }

    group.finish();
}

// ============================================================================
// READ PATH
// ============================================================================

fn bench_compute_box(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("read-path");

    for messages in [10, 100, 1000] {
        let (h, admin, box_id) = populated_box(&rt, 5);
        rt.block_on(async {
            for _ in 0..messages {
                h.service
                    .create_event(
                        &admin,
                        NewEvent::new(EventType::MsgText, box_id, text_content(TEST_CIPHERTEXT)),
                    )
                    .await
                    .unwrap();
            }
        });
        group.bench_with_input(BenchmarkId::new("compute_box", messages), &messages, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(h.service.compute_box(&admin, &box_id).await.unwrap()) })
        });
    }

    group.finish();
}

fn bench_build_message(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("read-path");

    for edits in [1, 10, 100] {
        let (h, admin, box_id) = populated_box(&rt, 1);
        let text_id = rt.block_on(async {
            let text = h
                .service
                .create_event(
                    &admin,
                    NewEvent::new(EventType::MsgText, box_id, text_content(TEST_CIPHERTEXT)),
                )
                .await
                .unwrap();
            for _ in 0..edits {
                h.service
                    .create_event(
                        &admin,
                        NewEvent::new(EventType::MsgEdit, box_id, edit_content("Ynll"))
                            .referring_to(text.id),
                    )
                    .await
                    .unwrap();
            }
            text.id
        });
        group.bench_with_input(BenchmarkId::new("build_message", edits), &edits, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(h.service.build_message(&admin, &text_id).await.unwrap()) })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append_text, bench_compute_box, bench_build_message);
criterion_main!(benches);
