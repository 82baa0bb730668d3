//! # Adapters Layer
//!
//! In-memory implementations of the outbound ports.

pub mod cache;
pub mod event_store;
pub mod repos;

pub use cache::InMemoryCache;
pub use event_store::{InMemoryEventStore, InMemoryTransaction};
pub use repos::{
    InMemoryBoxSettingRepo, InMemoryCryptoRepo, InMemoryFileStorage, InMemoryIdentityRepo,
    InMemoryQuotaRepo, SentInvitation, SentNotification,
};
