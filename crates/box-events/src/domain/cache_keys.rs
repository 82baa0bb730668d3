//! Cache key layout.
//!
//! The cache is advisory: every key can be dropped at any time and is rebuilt
//! from the log on the next miss.

use shared_types::{BoxId, IdentityId, OrgId};

/// Set of member identity ids of a box.
#[must_use]
pub fn members_key(box_id: &BoxId) -> String {
    format!("cache:box_{box_id}:membersIDs")
}

/// Set of box ids an identity belongs to within an organization.
#[must_use]
pub fn user_boxes_key(identity_id: &IdentityId, owner_org_id: &OrgId) -> String {
    format!("cache:user_{identity_id}:boxIDs:org_{owner_org_id}")
}

/// Every per-org box set of an identity.
#[must_use]
pub fn user_boxes_prefix(identity_id: &IdentityId) -> String {
    format!("cache:user_{identity_id}:boxIDs")
}

/// Unread counter of an identity in a box.
#[must_use]
pub fn events_count_key(identity_id: &IdentityId, box_id: &BoxId) -> String {
    format!("eventCounts:user_{identity_id}:box_{box_id}")
}

/// Digest counter of an identity in a box.
#[must_use]
pub fn digest_count_key(identity_id: &IdentityId, box_id: &BoxId) -> String {
    format!("digestCount:user_{identity_id}:box_{box_id}")
}

/// Every unread counter of an identity.
#[must_use]
pub fn events_count_prefix(identity_id: &IdentityId) -> String {
    format!("eventCounts:user_{identity_id}:")
}

/// Suffix shared by every counter of a box.
#[must_use]
pub fn box_counter_suffix(box_id: &BoxId) -> String {
    format!(":box_{box_id}")
}

/// Extract the box id from a counter key.
#[must_use]
pub fn box_id_of_counter(key: &str) -> Option<BoxId> {
    key.rsplit_once(":box_")
        .and_then(|(_, id)| id.parse().ok())
}
