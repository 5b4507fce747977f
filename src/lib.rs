//! Notification synchronization engine for a cryptocurrency wallet.
//!
//! Keeps a versioned trigger document in remote encrypted user storage in
//! sync with the wallet's account set, registers those triggers with an
//! on-chain notification service, manages push subscriptions best-effort,
//! and aggregates the notification feed from the on-chain and
//! feature-announcement sources.
//!
//! The engine is host-agnostic: all external services are injected behind
//! the traits in [`services`], and the host drives lifecycle events
//! (account-set changes, wallet lock/unlock) by calling into
//! [`NotificationController`].

#![forbid(unsafe_code)]

pub mod accounts;
pub mod config;
pub mod controller;
pub mod error;
pub mod feed;
pub mod push;
pub mod services;
pub mod triggers;

pub use accounts::{AccountDelta, SeenAccounts};
pub use config::{ControllerConfig, NOTIFICATION_SETTINGS_ENTRY, USER_STORAGE_VERSION};
pub use controller::{
    ControllerDeps, ControllerEvent, NotificationController, PersistedState, ProgressFlags,
};
pub use error::{Error, Result};
pub use feed::{MarkAsRead, NotificationItem};
pub use push::PushSubscriptionManager;
pub use triggers::{
    normalize_address, Trigger, TriggerEntry, TriggerFilter, TriggerKind, UserStorageDocument,
};
