//! # Box Events Engine
//!
//! A box is a conversation whose state (title, access policy, membership,
//! last message) is never stored: it is derived by replaying an append-only
//! log of typed events.
//!
//! ## Write Path
//!
//! ```text
//! NewEvent ──→ Content Registry ──→ Do step (authorize + persist in txn) ──→ commit
//!                                                                              │
//!                                         Outbox ←── After steps enqueued ←────┘
//!                                           │
//!                                           └──→ realtime push, counters, cache
//!                                                invalidation, quota, notifications
//! ```
//!
//! ## Read Path
//!
//! `compute_box` replays the `create` and `state.access_mode` events, resolves
//! the last visible event, folds its edit/delete chain and formats it through
//! the identity mapper.
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Description |
//! |----|-----------|-------------|
//! | 1 | Append-only | Events are never updated; only box deletion removes rows |
//! | 2 | Supersession | An event is inactive iff a later event of its box refers to it |
//! | 3 | Authorize first | Do steps reject before any write of the transaction |
//! | 4 | Atomic creation | An event and its referrer index entry commit together |
//! | 5 | Deterministic projection | Same log, same `BoxView` |
//! | 6 | Terminal deletion | A deleted message accepts no further edit or delete |
//! | 7 | Best-effort side effects | After-step failures never undo a committed event |
//! | 8 | Cache advisory | Every cache miss falls back to the log |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Entities, content schemas, filters, folds, errors
//! - `ports/` - Inbound API and outbound collaborator traits
//! - `adapters/` - In-memory store, cache and collaborator repositories
//! - `engine/` - Access control, projector, aggregator, identity mapper
//! - `handlers/` - Per-type Do steps and post-commit After steps
//! - `service/` - Application service implementing `BoxEventsApi`

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod engine;
pub mod handlers;
pub mod ports;
pub mod service;

/// Fixtures and a fully wired in-memory service.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export key types for convenience
pub use domain::config::EngineConfig;
pub use domain::content::{
    AccessContent, AccessMode, AccessModeContent, Content, CreationContent, MemberKickContent,
    MsgEditContent, MsgFileContent, MsgTextContent, RestrictionType,
};
pub use domain::context::RequestContext;
pub use domain::errors::{BoxError, CacheError, ForbiddenReason, RepoError, StoreError};
pub use domain::filters::{EventFilter, Unreferred};
pub use domain::message::Message;
pub use domain::outbox::{AfterStep, DrainReport, Metadata, OutboxEntry};
pub use domain::projection::{BoxSetting, BoxState, BoxView};
pub use ports::inbound::{BoxEventsApi, NewEvent};
pub use ports::outbound::{
    BoxSettingRepo, CacheService, CryptoAction, CryptoActionKind, CryptoActionRepo, EventReader,
    EventStore, EventTransaction, FileStorageRepo, IdentityRepo, KeyShare, QuotaRepo,
};
pub use service::{BoxEventsDependencies, BoxEventsService};
