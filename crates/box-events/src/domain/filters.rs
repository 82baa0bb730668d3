//! # Event Filters
//!
//! Query description shared by every event store adapter. All criteria are
//! conjunctive; an empty list or `None` means "no constraint".

use serde_json::Value;
use shared_types::{BoxId, Event, EventId, EventType, IdentityId};
use uuid::Uuid;

/// Restrict results to events no later event refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unreferred {
    /// Only referrers of these types supersede. Empty: any type.
    pub by_types: Vec<EventType>,
    /// Only referrers sent by this identity supersede.
    pub by_sender: Option<IdentityId>,
}

impl Unreferred {
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn by_types(types: &[EventType]) -> Self {
        Self {
            by_types: types.to_vec(),
            by_sender: None,
        }
    }

    #[must_use]
    pub fn from_sender(mut self, sender_id: IdentityId) -> Self {
        self.by_sender = Some(sender_id);
        self
    }

    /// Whether `referrer` supersedes its target under this restriction.
    #[must_use]
    pub fn supersedes(&self, referrer: &Event) -> bool {
        (self.by_types.is_empty() || self.by_types.contains(&referrer.event_type))
            && self.by_sender.map_or(true, |s| s == referrer.sender_id)
    }
}

/// Filtered event query. Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub id: Option<EventId>,
    pub box_ids: Vec<BoxId>,
    pub types: Vec<EventType>,
    pub sender_id: Option<IdentityId>,
    pub referrer_ids: Vec<EventId>,
    /// JSON containment on the payload.
    pub content: Option<Value>,
    /// `msg.file` events pointing at this blob.
    pub file_id: Option<Uuid>,
    pub unreferred: Option<Unreferred>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl EventFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_box(box_id: BoxId) -> Self {
        Self {
            box_ids: vec![box_id],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn boxes(mut self, box_ids: impl IntoIterator<Item = BoxId>) -> Self {
        self.box_ids = box_ids.into_iter().collect();
        self
    }

    #[must_use]
    pub fn of_type(mut self, event_type: EventType) -> Self {
        self.types = vec![event_type];
        self
    }

    #[must_use]
    pub fn of_types(mut self, types: &[EventType]) -> Self {
        self.types = types.to_vec();
        self
    }

    #[must_use]
    pub fn sender(mut self, sender_id: IdentityId) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    #[must_use]
    pub fn referring_to(mut self, referrer_id: EventId) -> Self {
        self.referrer_ids = vec![referrer_id];
        self
    }

    #[must_use]
    pub fn content_contains(mut self, needle: Value) -> Self {
        self.content = Some(needle);
        self
    }

    #[must_use]
    pub fn file(mut self, file_id: Uuid) -> Self {
        self.file_id = Some(file_id);
        self
    }

    #[must_use]
    pub fn unreferred(mut self, unreferred: Unreferred) -> Self {
        self.unreferred = Some(unreferred);
        self
    }

    #[must_use]
    pub fn paginate(mut self, offset: Option<usize>, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Row-level criteria. Supersession and pagination are applied by the
    /// store, which owns the referrer index.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if self.id.is_some_and(|id| id != event.id) {
            return false;
        }
        if !self.box_ids.is_empty() && !self.box_ids.contains(&event.box_id) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&event.event_type) {
            return false;
        }
        if self.sender_id.is_some_and(|s| s != event.sender_id) {
            return false;
        }
        if !self.referrer_ids.is_empty()
            && !event
                .referrer_id
                .is_some_and(|r| self.referrer_ids.contains(&r))
        {
            return false;
        }
        if let Some(needle) = &self.content {
            if !json_contains(&event.content, needle) {
                return false;
            }
        }
        if let Some(file_id) = &self.file_id {
            if event.event_type != EventType::MsgFile {
                return false;
            }
            let target = file_id.to_string();
            if event.content.get("encrypted_file_id").and_then(Value::as_str) != Some(&target) {
                return false;
            }
        }
        true
    }
}

/// JSON containment: every key of `needle` is present in `haystack` with a
/// contained value; arrays contain every element of the needle array.
#[must_use]
pub fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, nv)| h.get(k).is_some_and(|hv| json_contains(hv, nv))),
        (Value::Array(h), Value::Array(n)) => n
            .iter()
            .all(|nv| h.iter().any(|hv| json_contains(hv, nv))),
        (Value::Array(h), scalar) if !scalar.is_object() => h.iter().any(|hv| hv == scalar),
        (h, n) => h == n,
    }
}
