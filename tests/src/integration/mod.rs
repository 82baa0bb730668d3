//! # Integration Tests
//!
//! Full flows through the public `BoxEventsApi` with the in-memory adapters.

pub mod realtime;
pub mod scenarios;
