//! Collaborator ports consumed by the synchronization engine.
//!
//! Each trait wraps one external service at its boundary: remote encrypted
//! storage, authentication, push transport, the on-chain notification
//! service, the feature-announcement service, and the wallet account source.
//! Hosts wire concrete clients in; tests use the in-memory implementations
//! from [`memory`].

#![forbid(unsafe_code)]

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::triggers::{Trigger, TriggerKind, UserStorageDocument};
use crate::Result;

pub use memory::{
    InMemoryUserStorage, MockAccountSource, MockAuthService, MockFeatureAnnouncementService,
    MockOnChainService, RecordingPushTransport,
};

/// Remote encrypted key-value storage holding the trigger document.
#[async_trait]
pub trait UserStorageService: Send + Sync {
    /// Storage key used to encrypt/address the blob. `None` means the key
    /// has not been derived yet (user not fully authenticated).
    async fn get_storage_key(&self) -> Result<Option<String>>;
    async fn get(&self, entry_key: &str) -> Result<Option<String>>;
    async fn set(&self, entry_key: &str, value: String) -> Result<()>;
    /// Idempotent; turning syncing on twice is a no-op.
    async fn enable_profile_syncing(&self) -> Result<()>;
}

/// Authentication service issuing bearer tokens.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// `None` means not authenticated.
    async fn get_bearer_token(&self) -> Result<Option<String>>;
    fn is_signed_in(&self) -> bool;
}

/// Push-notification transport keyed by trigger ids. All operations are
/// consumed best-effort; implementations may fail freely.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn enable_push(&self, trigger_ids: &[String]) -> Result<()>;
    async fn disable_push(&self, trigger_ids: &[String]) -> Result<()>;
    async fn update_push(&self, trigger_ids: &[String]) -> Result<()>;
}

/// Remote on-chain notification service.
#[async_trait]
pub trait OnChainNotificationService: Send + Sync {
    async fn create_triggers(
        &self,
        document: &UserStorageDocument,
        storage_key: &str,
        bearer_token: &str,
        triggers: &[Trigger],
    ) -> Result<()>;

    async fn delete_triggers(
        &self,
        document: &UserStorageDocument,
        storage_key: &str,
        bearer_token: &str,
        trigger_ids: &[Uuid],
    ) -> Result<()>;

    async fn list_notifications(
        &self,
        document: &UserStorageDocument,
        bearer_token: &str,
    ) -> Result<Vec<RawOnChainNotification>>;

    async fn mark_read(&self, bearer_token: &str, notification_ids: &[String]) -> Result<()>;
}

/// Feature-announcement source. Unauthenticated; fetched independently of
/// the on-chain path.
#[async_trait]
pub trait FeatureAnnouncementService: Send + Sync {
    async fn list(&self) -> Result<Vec<RawFeatureAnnouncement>>;
}

/// Wallet account source. Account-set-changed events are delivered by the
/// host calling `NotificationController::handle_account_set_changed`.
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn list_addresses(&self) -> Result<Vec<String>>;
}

/// Raw on-chain notification as returned by the remote service. Only the
/// normalized fields participate in dedup/sort/read-state; `data` is kept
/// opaque for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOnChainNotification {
    pub id: String,
    pub kind: TriggerKind,
    pub address: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Server-side read flag; on-chain read-state lives remotely.
    pub unread: bool,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Raw feature announcement as returned by the announcement service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFeatureAnnouncement {
    pub id: String,
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Value,
}
