//! Notification feed model: normalization, dedup, merge and sort.
//!
//! The aggregator never mutates read-state; it only reads the locally cached
//! read-id list to annotate `is_read` while normalizing.

#![forbid(unsafe_code)]

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::{RawFeatureAnnouncement, RawOnChainNotification};
use crate::triggers::TriggerKind;

/// A normalized feed item, as cached by the controller and shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    /// Source-provided identifier, unique within its source.
    pub id: String,
    pub kind: TriggerKind,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub address: Option<String>,
    /// Opaque source payload for the renderer.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NotificationItem {
    pub fn is_feature_announcement(&self) -> bool {
        self.kind == TriggerKind::FeatureAnnouncement
    }
}

/// Normalize a raw on-chain notification. Items missing an id or timestamp
/// are dropped; a single malformed item must not blank the whole feed.
pub fn normalize_on_chain(raw: RawOnChainNotification) -> Option<NotificationItem> {
    if raw.id.is_empty() {
        warn!("dropping on-chain notification without id");
        return None;
    }
    if !raw.kind.is_on_chain() {
        warn!(id = %raw.id, "dropping on-chain notification with announcement kind");
        return None;
    }
    let Some(created_at) = raw.created_at else {
        warn!(id = %raw.id, "dropping on-chain notification without timestamp");
        return None;
    };
    Some(NotificationItem {
        id: raw.id,
        kind: raw.kind,
        created_at,
        // On-chain read-state is owned by the server.
        is_read: !raw.unread,
        address: raw.address,
        payload: raw.data,
    })
}

/// Normalize a raw feature announcement, joining against the locally
/// persisted read-id set.
pub fn normalize_feature_announcement(
    raw: RawFeatureAnnouncement,
    read_ids: &HashSet<String>,
) -> Option<NotificationItem> {
    if raw.id.is_empty() {
        warn!("dropping feature announcement without id");
        return None;
    }
    let Some(created_at) = raw.created_at else {
        warn!(id = %raw.id, "dropping feature announcement without timestamp");
        return None;
    };
    let is_read = read_ids.contains(&raw.id);
    Some(NotificationItem {
        id: raw.id,
        kind: TriggerKind::FeatureAnnouncement,
        created_at,
        is_read,
        address: None,
        payload: raw.data,
    })
}

/// Concatenate both sources and sort descending by creation time. The sort
/// is stable, so items with equal timestamps keep their source order.
pub fn merge_and_sort(
    feature: Vec<NotificationItem>,
    on_chain: Vec<NotificationItem>,
) -> Vec<NotificationItem> {
    let mut merged = feature;
    merged.extend(on_chain);
    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    merged
}

/// Reference for mark-as-read requests: the fields the caller must echo back
/// from a displayed [`NotificationItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkAsRead {
    pub id: String,
    pub kind: TriggerKind,
    pub is_read: bool,
}

impl From<&NotificationItem> for MarkAsRead {
    fn from(item: &NotificationItem) -> Self {
        Self {
            id: item.id.clone(),
            kind: item.kind,
            is_read: item.is_read,
        }
    }
}
