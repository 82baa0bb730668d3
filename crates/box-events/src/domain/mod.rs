//! # Domain Layer
//!
//! Pure types and folds of the box engine. Nothing here performs I/O.

pub mod cache_keys;
pub mod config;
pub mod content;
pub mod context;
pub mod errors;
pub mod filters;
pub mod message;
pub mod outbox;
pub mod projection;
