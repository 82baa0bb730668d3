//! # Message Aggregate
//!
//! A message is keyed by its initiating `msg.text` / `msg.file` event and
//! rebuilt by folding the `msg.edit` / `msg.delete` events referring to it,
//! oldest first. Once a delete is folded the message is terminal.

use serde_json::{json, Value};
use shared_types::{BoxId, Event, EventId, EventType, IdentityId, Timestamp};
use uuid::Uuid;

use super::content::{parse_stored, MsgEditContent, MsgFileContent, MsgTextContent};
use super::errors::{BoxError, ForbiddenReason};

/// Volatile aggregate of a message and its edit/delete chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub initial_event_id: EventId,
    pub box_id: BoxId,
    pub event_type: EventType,
    /// Current ciphertext. Empty once deleted; never set for file messages.
    pub encrypted: String,
    pub public_key: String,
    /// Blob id, only set while the blob still exists.
    pub file_id: Option<Uuid>,
    pub initial_sender_id: IdentityId,
    /// Sender of the last folded event.
    pub last_sender_id: Option<IdentityId>,
    pub old_size: u64,
    pub new_size: u64,
    pub last_edited_at: Option<Timestamp>,
    pub deleted_at: Option<Timestamp>,
}

impl Message {
    fn empty(event: &Event) -> Self {
        Self {
            initial_event_id: event.id,
            box_id: event.box_id,
            event_type: event.event_type,
            encrypted: String::new(),
            public_key: String::new(),
            file_id: None,
            initial_sender_id: event.sender_id,
            last_sender_id: None,
            old_size: 0,
            new_size: 0,
            last_edited_at: None,
            deleted_at: None,
        }
    }

    /// Seed from a `msg.text` event.
    #[must_use]
    pub fn seed_text(event: &Event, content: &MsgTextContent) -> Self {
        let mut msg = Self::empty(event);
        msg.encrypted = content.encrypted.clone();
        msg.public_key = content.public_key.clone();
        msg.new_size = content.encrypted.len() as u64;
        msg
    }

    /// Seed from a `msg.file` event.
    ///
    /// `blob_size` is `None` when the blob is gone; the message then carries
    /// no file id and a zero size.
    #[must_use]
    pub fn seed_file(event: &Event, content: &MsgFileContent, blob_size: Option<u64>) -> Self {
        let mut msg = Self::empty(event);
        msg.public_key = content.public_key.clone();
        if let Some(size) = blob_size {
            msg.new_size = size;
            msg.file_id = Some(content.encrypted_file_id);
        }
        msg
    }

    /// Fold one referrer event. Folding onto a deleted message is `Gone`;
    /// any type other than edit or delete means the log is corrupt.
    pub fn fold(&mut self, event: &Event) -> Result<(), BoxError> {
        self.ensure_not_deleted()?;
        match event.event_type {
            EventType::MsgEdit => {
                let content: MsgEditContent = parse_stored(event)?;
                self.encrypted = content.new_encrypted;
                self.public_key = content.new_public_key;
                self.last_edited_at = Some(event.created_at);
                self.old_size = self.new_size;
                self.new_size = self.encrypted.len() as u64;
            }
            EventType::MsgDelete => {
                self.encrypted.clear();
                self.deleted_at = Some(event.created_at);
                self.old_size = self.new_size;
                self.new_size = 0;
            }
            other => {
                return Err(BoxError::internal(format!(
                    "unexpected {other} referrer {} on message {}",
                    event.id, self.initial_event_id
                )));
            }
        }
        self.last_sender_id = Some(event.sender_id);
        Ok(())
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.event_type == EventType::MsgFile
    }

    /// `Gone` once a delete has been folded.
    pub fn ensure_not_deleted(&self) -> Result<(), BoxError> {
        if self.is_deleted() {
            return Err(BoxError::gone(format!(
                "message {} is deleted",
                self.initial_event_id
            )));
        }
        Ok(())
    }

    /// Only the author may edit.
    pub fn ensure_author(&self, sender_id: &IdentityId) -> Result<(), BoxError> {
        if &self.initial_sender_id != sender_id {
            return Err(BoxError::forbidden(
                ForbiddenReason::NotAuthor,
                "only the author can edit a message",
            ));
        }
        Ok(())
    }

    /// Rewrite the content of the initiating event to reflect the fold.
    pub fn overlay(&self, content: &mut Value) {
        if let Some(at) = self.deleted_at {
            *content = json!({
                "deleted": {
                    "at": at,
                    "by_identity_id": self.last_sender_id,
                }
            });
        } else if let Some(edited_at) = self.last_edited_at {
            if let Value::Object(map) = content {
                map.insert("encrypted".into(), Value::String(self.encrypted.clone()));
                map.insert("public_key".into(), Value::String(self.public_key.clone()));
                map.insert("last_edited_at".into(), json!(edited_at));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn text_event() -> Event {
        Event::new(
            EventType::MsgText,
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({"encrypted": "aGVsbG8=", "public_key": "pk"}),
            None,
        )
    }

    fn referrer(initial: &Event, event_type: EventType, content: Value, offset: i64) -> Event {
        let mut e = Event::new(event_type, initial.box_id, initial.sender_id, content, Some(initial.id));
        e.created_at = initial.created_at + Duration::seconds(offset);
        e
    }

    fn seed(event: &Event) -> Message {
        let content: MsgTextContent = parse_stored(event).unwrap();
        Message::seed_text(event, &content)
    }

    #[test]
    fn test_text_seed_sizes() {
        let initial = text_event();
        let msg = seed(&initial);
        assert_eq!(msg.new_size, 8);
        assert_eq!(msg.old_size, 0);
        assert!(msg.last_sender_id.is_none());
    }

    #[test]
    fn test_edit_then_delete() {
        let initial = text_event();
        let mut msg = seed(&initial);

        let edit = referrer(
            &initial,
            EventType::MsgEdit,
            json!({"new_encrypted": "aGVsbG8gd29ybGQ=", "new_public_key": "pk2"}),
            1,
        );
        msg.fold(&edit).unwrap();
        assert_eq!(msg.public_key, "pk2");
        assert_eq!(msg.old_size, 8);
        assert_eq!(msg.new_size, 16);
        assert_eq!(msg.last_edited_at, Some(edit.created_at));

        let delete = referrer(&initial, EventType::MsgDelete, json!({}), 2);
        msg.fold(&delete).unwrap();
        assert!(msg.encrypted.is_empty());
        assert_eq!(msg.old_size, 16);
        assert_eq!(msg.new_size, 0);
        assert!(msg.ensure_not_deleted().is_err());
    }

    #[test]
    fn test_deleted_message_rejects_further_folds() {
        let initial = text_event();
        let mut msg = seed(&initial);
        msg.fold(&referrer(&initial, EventType::MsgDelete, json!({}), 1))
            .unwrap();

        let edit = referrer(
            &initial,
            EventType::MsgEdit,
            json!({"new_encrypted": "YWJj", "new_public_key": "pk2"}),
            2,
        );
        assert_eq!(msg.fold(&edit).unwrap_err().class(), "gone");
        let delete = referrer(&initial, EventType::MsgDelete, json!({}), 3);
        assert_eq!(msg.fold(&delete).unwrap_err().class(), "gone");

        assert!(msg.encrypted.is_empty());
        assert_eq!(msg.new_size, 0);
        assert_eq!(msg.public_key, "pk");
        assert_eq!(msg.last_sender_id, Some(initial.sender_id));
    }

    #[test]
    fn test_unexpected_referrer_is_corruption() {
        let initial = text_event();
        let mut msg = seed(&initial);
        let join = referrer(&initial, EventType::MemberJoin, json!({}), 1);
        assert_eq!(msg.fold(&join).unwrap_err().class(), "internal");
    }

    #[test]
    fn test_file_seed_without_blob() {
        let file_id = Uuid::new_v4();
        let event = Event::new(
            EventType::MsgFile,
            Uuid::new_v4(),
            Uuid::new_v4(),
            json!({"encrypted": "aGk=", "public_key": "pk", "encrypted_file_id": file_id}),
            None,
        );
        let content: MsgFileContent = parse_stored(&event).unwrap();

        let gone = Message::seed_file(&event, &content, None);
        assert_eq!(gone.new_size, 0);
        assert!(gone.file_id.is_none());

        let present = Message::seed_file(&event, &content, Some(42));
        assert_eq!(present.new_size, 42);
        assert_eq!(present.file_id, Some(file_id));
    }

    #[test]
    fn test_overlay_deleted_and_edited() {
        let initial = text_event();
        let deleter = Uuid::new_v4();

        let mut msg = seed(&initial);
        let mut delete = referrer(&initial, EventType::MsgDelete, json!({}), 3);
        delete.sender_id = deleter;
        msg.fold(&delete).unwrap();
        let mut content = initial.content.clone();
        msg.overlay(&mut content);
        assert_eq!(content["deleted"]["by_identity_id"], json!(deleter));
        assert!(content.get("encrypted").is_none());

        let mut msg = seed(&initial);
        let edit = referrer(
            &initial,
            EventType::MsgEdit,
            json!({"new_encrypted": "Ynll", "new_public_key": "pk3"}),
            1,
        );
        msg.fold(&edit).unwrap();
        let mut content = initial.content.clone();
        msg.overlay(&mut content);
        assert_eq!(content["encrypted"], "Ynll");
        assert_eq!(content["public_key"], "pk3");
        assert!(content.get("last_edited_at").is_some());
    }

    #[test]
    fn test_untouched_message_overlay_is_noop() {
        let initial = text_event();
        let msg = seed(&initial);
        let mut content = initial.content.clone();
        msg.overlay(&mut content);
        assert_eq!(content, initial.content);
    }
}
