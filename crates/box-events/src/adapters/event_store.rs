//! In-memory event store.
//!
//! Implements `EventStore` over a single lock-guarded log. The referrer index
//! (`referrer_id -> referrers`) is updated under the same write lock as the
//! inserts of a commit, so supersession queries are index lookups.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{BoxId, Event, EventId, EventType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::StoreError;
use crate::domain::filters::EventFilter;
use crate::ports::outbound::{EventReader, EventStore, EventTransaction};

/// Committed log and its indexes.
#[derive(Debug, Default)]
struct StoreState {
    /// Insertion order; the position is the tie-breaker of equal timestamps.
    events: Vec<Event>,
    by_id: HashMap<EventId, usize>,
    referrers: HashMap<EventId, Vec<usize>>,
}

impl StoreState {
    fn push(&mut self, event: Event) {
        let seq = self.events.len();
        self.by_id.insert(event.id, seq);
        if let Some(referrer_id) = event.referrer_id {
            self.referrers.entry(referrer_id).or_default().push(seq);
        }
        self.events.push(event);
    }

    fn rebuild_indexes(&mut self) {
        let events = std::mem::take(&mut self.events);
        self.by_id.clear();
        self.referrers.clear();
        for event in events {
            self.push(event);
        }
    }
}

/// Committed state seen together with the pending inserts of a transaction.
struct LogView<'a> {
    state: &'a StoreState,
    pending: &'a [Event],
}

impl<'a> LogView<'a> {
    fn entries(&self) -> impl Iterator<Item = (usize, &'a Event)> + '_ {
        let base = self.state.events.len();
        self.state
            .events
            .iter()
            .enumerate()
            .chain(self.pending.iter().enumerate().map(move |(i, e)| (base + i, e)))
    }

    fn get(&self, id: &EventId) -> Option<(usize, &'a Event)> {
        if let Some(&seq) = self.state.by_id.get(id) {
            return Some((seq, &self.state.events[seq]));
        }
        let base = self.state.events.len();
        self.pending
            .iter()
            .enumerate()
            .find(|(_, e)| &e.id == id)
            .map(|(i, e)| (base + i, e))
    }

    fn referrers(&self, id: &EventId) -> Vec<(usize, &'a Event)> {
        let mut out: Vec<(usize, &'a Event)> = self
            .state
            .referrers
            .get(id)
            .map(|seqs| seqs.iter().map(|&s| (s, &self.state.events[s])).collect())
            .unwrap_or_default();
        let base = self.state.events.len();
        out.extend(
            self.pending
                .iter()
                .enumerate()
                .filter(|(_, e)| e.referrer_id.as_ref() == Some(id))
                .map(|(i, e)| (base + i, e)),
        );
        out
    }

    fn is_superseded(&self, event: &Event, filter: &EventFilter) -> bool {
        match &filter.unreferred {
            None => false,
            Some(unreferred) => self
                .referrers(&event.id)
                .iter()
                .any(|(_, r)| r.box_id == event.box_id && unreferred.supersedes(r)),
        }
    }

    /// Matching events, newest first, before pagination.
    fn select(&self, filter: &EventFilter) -> Vec<(usize, &'a Event)> {
        let mut hits: Vec<(usize, &'a Event)> = self
            .entries()
            .filter(|(_, e)| filter.matches(e) && !self.is_superseded(e, filter))
            .collect();
        newest_first(&mut hits);
        hits
    }

    fn find(&self, filter: &EventFilter) -> Vec<Event> {
        self.select(filter)
            .into_iter()
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|(_, e)| e.clone())
            .collect()
    }

    fn count(&self, filter: &EventFilter) -> usize {
        self.select(filter).len()
    }

    fn event_and_referrers(&self, id: &EventId) -> Result<Vec<Event>, StoreError> {
        let (_, event) = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("event {id}")))?;
        let mut referrers = self.referrers(id);
        referrers.sort_by(|(sa, a), (sb, b)| a.created_at.cmp(&b.created_at).then(sa.cmp(sb)));

        let mut out = Vec::with_capacity(referrers.len() + 1);
        out.push(event.clone());
        out.extend(referrers.into_iter().map(|(_, e)| e.clone()));
        Ok(out)
    }

    fn latest_per_box(&self, box_ids: &[BoxId], types: &[EventType]) -> Vec<Event> {
        let mut latest: HashMap<BoxId, (usize, &'a Event)> = HashMap::new();
        for (seq, event) in self.entries() {
            if !box_ids.contains(&event.box_id)
                || (!types.is_empty() && !types.contains(&event.event_type))
            {
                continue;
            }
            let newer = latest
                .get(&event.box_id)
                .map_or(true, |(s, e)| (event.created_at, seq) > (e.created_at, *s));
            if newer {
                latest.insert(event.box_id, (seq, event));
            }
        }
        let mut hits: Vec<(usize, &'a Event)> = latest.into_values().collect();
        newest_first(&mut hits);
        hits.into_iter().map(|(_, e)| e.clone()).collect()
    }
}

fn newest_first(hits: &mut [(usize, &Event)]) {
    hits.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
}

/// In-memory `EventStore`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append events directly, bypassing handlers. Test fixtures only.
    pub fn seed(&self, events: impl IntoIterator<Item = Event>) {
        let mut state = self.state.write();
        for event in events {
            state.push(event);
        }
    }

    /// Number of committed events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_view<T>(&self, f: impl FnOnce(&LogView<'_>) -> T) -> T {
        let state = self.state.read();
        f(&LogView {
            state: &state,
            pending: &[],
        })
    }

    fn remove_box(&self, box_id: &BoxId) -> usize {
        let mut state = self.state.write();
        let before = state.events.len();
        state.events.retain(|e| &e.box_id != box_id);
        let removed = before - state.events.len();
        state.rebuild_indexes();
        removed
    }
}

#[async_trait]
impl EventReader for InMemoryEventStore {
    async fn find(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        Ok(self.with_view(|v| v.find(filter)))
    }

    async fn count(&self, filter: &EventFilter) -> Result<usize, StoreError> {
        Ok(self.with_view(|v| v.count(filter)))
    }

    async fn event_and_referrers(&self, id: &EventId) -> Result<Vec<Event>, StoreError> {
        self.with_view(|v| v.event_and_referrers(id))
    }

    async fn latest_per_box(
        &self,
        box_ids: &[BoxId],
        types: &[EventType],
    ) -> Result<Vec<Event>, StoreError> {
        Ok(self.with_view(|v| v.latest_per_box(box_ids, types)))
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn begin(&self) -> Result<Box<dyn EventTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            committed: false,
        }))
    }

    async fn delete_box(&self, box_id: &BoxId) -> Result<usize, StoreError> {
        let removed = self.remove_box(box_id);
        debug!(box_id = %box_id, removed, "Box log deleted");
        Ok(removed)
    }
}

/// Write transaction of the in-memory store.
pub struct InMemoryTransaction {
    state: Arc<RwLock<StoreState>>,
    pending: Vec<Event>,
    committed: bool,
}

impl InMemoryTransaction {
    fn with_view<T>(&self, f: impl FnOnce(&LogView<'_>) -> T) -> T {
        let state = self.state.read();
        f(&LogView {
            state: &state,
            pending: &self.pending,
        })
    }

    fn stage(&mut self, event: Event) -> Result<(), StoreError> {
        if self.committed {
            return Err(StoreError::AlreadyCommitted);
        }
        let duplicate = self.with_view(|v| v.get(&event.id).is_some());
        if duplicate {
            return Err(StoreError::Duplicate(event.id.to_string()));
        }
        self.pending.push(event);
        Ok(())
    }

    fn apply(&mut self) -> Result<Vec<Event>, StoreError> {
        if self.committed {
            return Err(StoreError::AlreadyCommitted);
        }
        let mut state = self.state.write();
        if let Some(dup) = self.pending.iter().find(|e| state.by_id.contains_key(&e.id)) {
            return Err(StoreError::Duplicate(dup.id.to_string()));
        }
        let events = std::mem::take(&mut self.pending);
        for event in &events {
            state.push(event.clone());
        }
        self.committed = true;
        Ok(events)
    }
}

#[async_trait]
impl EventReader for InMemoryTransaction {
    async fn find(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        Ok(self.with_view(|v| v.find(filter)))
    }

    async fn count(&self, filter: &EventFilter) -> Result<usize, StoreError> {
        Ok(self.with_view(|v| v.count(filter)))
    }

    async fn event_and_referrers(&self, id: &EventId) -> Result<Vec<Event>, StoreError> {
        self.with_view(|v| v.event_and_referrers(id))
    }

    async fn latest_per_box(
        &self,
        box_ids: &[BoxId],
        types: &[EventType],
    ) -> Result<Vec<Event>, StoreError> {
        Ok(self.with_view(|v| v.latest_per_box(box_ids, types)))
    }
}

#[async_trait]
impl EventTransaction for InMemoryTransaction {
    async fn insert(&mut self, event: Event) -> Result<(), StoreError> {
        self.stage(event)
    }

    async fn commit(&mut self) -> Result<Vec<Event>, StoreError> {
        self.apply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filters::Unreferred;
    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    fn at(base: &Event, event_type: EventType, referrer: Option<EventId>, secs: i64) -> Event {
        let mut e = Event::new(event_type, base.box_id, base.sender_id, json!({}), referrer);
        e.created_at = base.created_at + Duration::seconds(secs);
        e
    }

    fn join_event() -> Event {
        Event::new(EventType::MemberJoin, Uuid::new_v4(), Uuid::new_v4(), json!({}), None)
    }

    #[tokio::test]
    async fn test_find_is_newest_first_with_insertion_tie_break() {
        let store = InMemoryEventStore::new();
        let first = join_event();
        let mut same_time = at(&first, EventType::MemberJoin, None, 0);
        same_time.created_at = first.created_at;
        let later = at(&first, EventType::MemberLeave, None, 5);
        store.seed([first.clone(), same_time.clone(), later.clone()]);

        let found = store.find(&EventFilter::for_box(first.box_id)).await.unwrap();
        let ids: Vec<EventId> = found.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![later.id, same_time.id, first.id]);
    }

    #[tokio::test]
    async fn test_unreferred_uses_referrer_index() {
        let store = InMemoryEventStore::new();
        let join = join_event();
        let leave = at(&join, EventType::MemberLeave, Some(join.id), 1);
        let other = at(&join, EventType::MemberJoin, None, 2);
        store.seed([join.clone(), leave, other.clone()]);

        let filter = EventFilter::for_box(join.box_id)
            .of_type(EventType::MemberJoin)
            .unreferred(Unreferred::by_types(&[EventType::MemberLeave]));
        let active = store.find(&filter).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, other.id);

        let filter = EventFilter::for_box(join.box_id)
            .of_type(EventType::MemberJoin)
            .unreferred(Unreferred::by_types(&[EventType::AccessRm]));
        assert_eq!(store.count(&filter).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_transaction_reads_its_own_writes() {
        let store = InMemoryEventStore::new();
        let join = join_event();
        store.seed([join.clone()]);

        let mut txn = store.begin().await.unwrap();
        let leave = at(&join, EventType::MemberLeave, Some(join.id), 1);
        txn.insert(leave.clone()).await.unwrap();

        let filter = EventFilter::for_box(join.box_id)
            .of_type(EventType::MemberJoin)
            .unreferred(Unreferred::any());
        assert_eq!(txn.count(&filter).await.unwrap(), 0);
        assert_eq!(store.count(&filter).await.unwrap(), 1);

        let committed = txn.commit().await.unwrap();
        assert_eq!(committed, vec![leave]);
        assert_eq!(store.count(&filter).await.unwrap(), 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_transaction_applies_nothing() {
        let store = InMemoryEventStore::new();
        {
            let mut txn = store.begin().await.unwrap();
            txn.insert(join_event()).await.unwrap();
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_commit_twice_fails() {
        let store = InMemoryEventStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(txn.commit().await, Err(StoreError::AlreadyCommitted));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = InMemoryEventStore::new();
        let join = join_event();
        store.seed([join.clone()]);
        let mut txn = store.begin().await.unwrap();
        assert!(matches!(
            txn.insert(join).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_event_and_referrers_ascending() {
        let store = InMemoryEventStore::new();
        let msg = Event::new(EventType::MsgText, Uuid::new_v4(), Uuid::new_v4(), json!({}), None);
        let delete = at(&msg, EventType::MsgDelete, Some(msg.id), 9);
        let edit = at(&msg, EventType::MsgEdit, Some(msg.id), 3);
        store.seed([msg.clone(), delete.clone(), edit.clone()]);

        let chain = store.event_and_referrers(&msg.id).await.unwrap();
        let ids: Vec<EventId> = chain.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![msg.id, edit.id, delete.id]);

        let missing = store.event_and_referrers(&Uuid::new_v4()).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_latest_per_box_and_delete_box() {
        let store = InMemoryEventStore::new();
        let a = join_event();
        let a_later = at(&a, EventType::MsgText, None, 4);
        let a_hidden = at(&a, EventType::MsgEdit, None, 8);
        let b = join_event();
        store.seed([a.clone(), a_later.clone(), a_hidden, b.clone()]);

        let latest = store
            .latest_per_box(&[a.box_id, b.box_id], &EventType::VISIBLE)
            .await
            .unwrap();
        let ids: Vec<EventId> = latest.iter().map(|e| e.id).collect();
        assert!(ids.contains(&a_later.id));
        assert!(ids.contains(&b.id));
        assert_eq!(ids.len(), 2);

        assert_eq!(store.delete_box(&a.box_id).await.unwrap(), 3);
        assert_eq!(store.len(), 1);
        assert!(store.event_and_referrers(&a.id).await.is_err());
        assert!(store.event_and_referrers(&b.id).await.is_ok());
    }
}
