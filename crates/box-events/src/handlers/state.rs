//! `state.*` Do steps.

use serde::Deserialize;
use serde_json::Value;
use shared_types::Event;
use std::collections::HashSet;

use super::DoContext;
use crate::domain::errors::BoxError;
use crate::domain::outbox::Metadata;
use crate::engine::access::must_be_admin;
use crate::engine::members::list_member_ids;
use crate::engine::projector::compute_box_state;
use crate::ports::outbound::{CryptoAction, CryptoActionKind, KeyShare};

/// Only admins switch the access mode.
pub async fn do_access_mode(ctx: &mut DoContext<'_>, event: &mut Event) -> Result<Metadata, BoxError> {
    must_be_admin(&*ctx.txn, &event.box_id, &event.sender_id)
        .await
        .map_err(|e| e.describe("checking admin"))?;

    ctx.txn.insert(event.clone()).await?;
    Ok(Metadata::None)
}

/// Key share material carried in `extra`. Never stored in the log.
#[derive(Debug, Deserialize)]
struct KeyShareExtra {
    #[serde(default)]
    misakey_share: String,
    #[serde(default)]
    other_share_hash: String,
    #[serde(default)]
    encrypted_invitation_key_share: String,
}

impl KeyShareExtra {
    fn parse(extra: Option<&Value>) -> Result<Self, BoxError> {
        let raw = extra.ok_or_else(|| BoxError::bad_request("extra is required"))?;
        let parsed: Self = serde_json::from_value(raw.clone())
            .map_err(|e| BoxError::bad_request(format!("invalid extra: {e}")))?;

        for (field, value) in [
            ("misakey_share", &parsed.misakey_share),
            ("other_share_hash", &parsed.other_share_hash),
            ("encrypted_invitation_key_share", &parsed.encrypted_invitation_key_share),
        ] {
            if value.is_empty() {
                return Err(BoxError::bad_request(format!("extra.{field} is required")));
            }
        }
        Ok(parsed)
    }
}

/// Rotate the server key share and hand the new invitation share to every
/// member account but the sender's. A crypto failure aborts the event.
///
/// Everything is read before the first crypto write, and cancellation is
/// checked right before it: a cancelled request writes nothing.
pub async fn do_key_share(
    ctx: &mut DoContext<'_>,
    event: &mut Event,
    extra: Option<&Value>,
) -> Result<Metadata, BoxError> {
    must_be_admin(&*ctx.txn, &event.box_id, &event.sender_id)
        .await
        .map_err(|e| e.describe("checking admin"))?;
    let extra = KeyShareExtra::parse(extra)?;

    let state = compute_box_state(&*ctx.txn, &event.box_id)
        .await
        .map_err(|e| e.describe("getting box public key"))?;
    let member_ids = list_member_ids(&*ctx.txn, ctx.cache, &event.box_id)
        .await
        .map_err(|e| e.describe("listing box members"))?;
    let accounts = ctx.mapper.map_to_account_ids(&member_ids).await?;

    let mut processed = HashSet::new();
    let mut actions = Vec::new();
    for identity_id in &member_ids {
        if identity_id == &event.sender_id {
            continue;
        }
        let Some(account_id) = accounts.get(identity_id) else {
            continue;
        };
        if !processed.insert(*account_id) {
            continue;
        }
        actions.push(CryptoAction {
            account_id: *account_id,
            kind: CryptoActionKind::SetBoxKeyShare,
            sender_identity_id: event.sender_id,
            box_id: event.box_id,
            encrypted: extra.encrypted_invitation_key_share.clone(),
            encryption_public_key: state.public_key.clone(),
            created_at: event.created_at,
        });
    }

    ctx.request.check()?;
    ctx.crypto
        .replace_key_share(KeyShare {
            box_id: event.box_id,
            creator_id: event.sender_id,
            misakey_share: extra.misakey_share,
            other_share_hash: extra.other_share_hash,
            encrypted_invitation_key_share: extra.encrypted_invitation_key_share,
        })
        .await
        .map_err(|e| BoxError::from(e).describe("creating key share"))?;
    ctx.external_written = true;

    ctx.crypto
        .create_actions(actions)
        .await
        .map_err(|e| BoxError::from(e).describe("creating crypto actions"))?;

    ctx.txn.insert(event.clone()).await?;
    Ok(Metadata::None)
}
