//! # Engine
//!
//! Read-side logic shared by the handlers and the service: access control,
//! membership, message aggregation, box projection, box listing and counters.
//!
//! Functions taking an `EventReader` work both on the store and on an open
//! transaction, so checks made during a Do step see its pending writes.

pub mod access;
pub mod aggregator;
pub mod counts;
pub mod files;
pub mod formatter;
pub mod identity_mapper;
pub mod listing;
pub mod members;
pub mod projector;

pub use identity_mapper::{IdentityMapper, SenderCache};
pub use projector::Projector;
