//! # Ports Layer
//!
//! Hexagonal boundaries of the box engine.

pub mod inbound;
pub mod outbound;
