//! In-memory collaborator implementations for tests and embedding hosts.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    AccountSource, AuthService, FeatureAnnouncementService, OnChainNotificationService,
    PushTransport, RawFeatureAnnouncement, RawOnChainNotification, UserStorageService,
};
use crate::triggers::{Trigger, UserStorageDocument};
use crate::{Error, Result};

/// Remote storage backed by a single in-memory blob per entry key.
pub struct InMemoryUserStorage {
    storage_key: RwLock<Option<String>>,
    entries: RwLock<std::collections::HashMap<String, String>>,
    syncing_enabled: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryUserStorage {
    pub fn new() -> Self {
        Self {
            storage_key: RwLock::new(Some("storage-key".to_string())),
            entries: RwLock::new(std::collections::HashMap::new()),
            syncing_enabled: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn without_storage_key() -> Self {
        let storage = Self::new();
        *storage.storage_key.write() = None;
        storage
    }

    pub fn set_storage_key(&self, key: Option<String>) {
        *self.storage_key.write() = key;
    }

    pub fn set_entry(&self, entry_key: &str, value: String) {
        self.entries.write().insert(entry_key.to_string(), value);
    }

    pub fn entry(&self, entry_key: &str) -> Option<String> {
        self.entries.read().get(entry_key).cloned()
    }

    pub fn is_syncing_enabled(&self) -> bool {
        self.syncing_enabled.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryUserStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStorageService for InMemoryUserStorage {
    async fn get_storage_key(&self) -> Result<Option<String>> {
        Ok(self.storage_key.read().clone())
    }

    async fn get(&self, entry_key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage("injected read failure".into()));
        }
        Ok(self.entries.read().get(entry_key).cloned())
    }

    async fn set(&self, entry_key: &str, value: String) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("injected write failure".into()));
        }
        self.entries.write().insert(entry_key.to_string(), value);
        Ok(())
    }

    async fn enable_profile_syncing(&self) -> Result<()> {
        self.syncing_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Auth service with a toggleable signed-in state and static token.
pub struct MockAuthService {
    signed_in: AtomicBool,
    token: RwLock<Option<String>>,
}

impl MockAuthService {
    pub fn signed_in() -> Self {
        Self {
            signed_in: AtomicBool::new(true),
            token: RwLock::new(Some("bearer-token".to_string())),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            signed_in: AtomicBool::new(false),
            token: RwLock::new(None),
        }
    }

    pub fn set_signed_in(&self, signed_in: bool) {
        self.signed_in.store(signed_in, Ordering::SeqCst);
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn get_bearer_token(&self) -> Result<Option<String>> {
        Ok(self.token.read().clone())
    }

    fn is_signed_in(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }
}

/// Push transport recording every call, with an injectable failure mode.
pub struct RecordingPushTransport {
    enabled: RwLock<Vec<Vec<String>>>,
    disabled: RwLock<Vec<Vec<String>>>,
    updated: RwLock<Vec<Vec<String>>>,
    fail: AtomicBool,
}

impl RecordingPushTransport {
    pub fn new() -> Self {
        Self {
            enabled: RwLock::new(Vec::new()),
            disabled: RwLock::new(Vec::new()),
            updated: RwLock::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn enabled_calls(&self) -> Vec<Vec<String>> {
        self.enabled.read().clone()
    }

    pub fn disabled_calls(&self) -> Vec<Vec<String>> {
        self.disabled.read().clone()
    }

    pub fn updated_calls(&self) -> Vec<Vec<String>> {
        self.updated.read().clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Push("injected push failure".into()));
        }
        Ok(())
    }
}

impl Default for RecordingPushTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for RecordingPushTransport {
    async fn enable_push(&self, trigger_ids: &[String]) -> Result<()> {
        self.check()?;
        self.enabled.write().push(trigger_ids.to_vec());
        Ok(())
    }

    async fn disable_push(&self, trigger_ids: &[String]) -> Result<()> {
        self.check()?;
        self.disabled.write().push(trigger_ids.to_vec());
        Ok(())
    }

    async fn update_push(&self, trigger_ids: &[String]) -> Result<()> {
        self.check()?;
        self.updated.write().push(trigger_ids.to_vec());
        Ok(())
    }
}

/// On-chain notification service tracking registered trigger ids in memory.
pub struct MockOnChainService {
    registered: RwLock<std::collections::HashSet<Uuid>>,
    notifications: RwLock<Vec<RawOnChainNotification>>,
    marked_read: RwLock<Vec<String>>,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    fail_list: AtomicBool,
    fail_mark_read: AtomicBool,
}

impl MockOnChainService {
    pub fn new() -> Self {
        Self {
            registered: RwLock::new(std::collections::HashSet::new()),
            notifications: RwLock::new(Vec::new()),
            marked_read: RwLock::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
        }
    }

    pub fn set_notifications(&self, notifications: Vec<RawOnChainNotification>) {
        *self.notifications.write() = notifications;
    }

    pub fn registered_ids(&self) -> std::collections::HashSet<Uuid> {
        self.registered.read().clone()
    }

    pub fn marked_read_ids(&self) -> Vec<String> {
        self.marked_read.read().clone()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mark_read(&self, fail: bool) {
        self.fail_mark_read.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockOnChainService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OnChainNotificationService for MockOnChainService {
    async fn create_triggers(
        &self,
        _document: &UserStorageDocument,
        _storage_key: &str,
        _bearer_token: &str,
        triggers: &[Trigger],
    ) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::TriggerSync("injected create failure".into()));
        }
        let mut registered = self.registered.write();
        registered.extend(triggers.iter().map(|t| t.id));
        Ok(())
    }

    async fn delete_triggers(
        &self,
        _document: &UserStorageDocument,
        _storage_key: &str,
        _bearer_token: &str,
        trigger_ids: &[Uuid],
    ) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::TriggerSync("injected delete failure".into()));
        }
        let mut registered = self.registered.write();
        for id in trigger_ids {
            registered.remove(id);
        }
        Ok(())
    }

    async fn list_notifications(
        &self,
        _document: &UserStorageDocument,
        _bearer_token: &str,
    ) -> Result<Vec<RawOnChainNotification>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::FeedFetch("injected list failure".into()));
        }
        Ok(self.notifications.read().clone())
    }

    async fn mark_read(&self, _bearer_token: &str, notification_ids: &[String]) -> Result<()> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(Error::FeedFetch("injected mark-read failure".into()));
        }
        self.marked_read
            .write()
            .extend(notification_ids.iter().cloned());
        Ok(())
    }
}

/// Feature-announcement source serving a static list.
pub struct MockFeatureAnnouncementService {
    announcements: RwLock<Vec<RawFeatureAnnouncement>>,
    fail: AtomicBool,
}

impl MockFeatureAnnouncementService {
    pub fn new(announcements: Vec<RawFeatureAnnouncement>) -> Self {
        Self {
            announcements: RwLock::new(announcements),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_announcements(&self, announcements: Vec<RawFeatureAnnouncement>) {
        *self.announcements.write() = announcements;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockFeatureAnnouncementService {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl FeatureAnnouncementService for MockFeatureAnnouncementService {
    async fn list(&self) -> Result<Vec<RawFeatureAnnouncement>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::FeedFetch("injected announcement failure".into()));
        }
        Ok(self.announcements.read().clone())
    }
}

/// Wallet account source with a mutable address list.
pub struct MockAccountSource {
    addresses: RwLock<Vec<String>>,
}

impl MockAccountSource {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: RwLock::new(addresses.into_iter().map(Into::into).collect()),
        }
    }

    pub fn set_addresses<I, S>(&self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.addresses.write() = addresses.into_iter().map(Into::into).collect();
    }
}

#[async_trait]
impl AccountSource for MockAccountSource {
    async fn list_addresses(&self) -> Result<Vec<String>> {
        Ok(self.addresses.read().clone())
    }
}
