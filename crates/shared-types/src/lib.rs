//! # Shared Types Crate
//!
//! Entities shared by every crate of the box workspace: the append-only
//! `Event` record, the closed `EventType` set and the identity/event views
//! handed to clients.
//!
//! ## Design Principles
//!
//! - **Closed type set**: every event type is a variant of `EventType`;
//!   dispatch on it is an exhaustive `match`.
//! - **Explicit absence**: optional ids (`referrer_id`, datatag, subject) are
//!   `Option`, never empty strings.
//! - **Opaque payloads**: ciphertext travels as an untyped JSON payload; its
//!   shape is only interpreted by the content registry of `box-events`.

pub mod entities;
pub mod errors;
pub mod views;

pub use entities::*;
pub use errors::*;
pub use views::*;
