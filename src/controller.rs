//! Synchronization controller: owns process-wide state, gates every
//! privileged operation on authentication, and orchestrates the trigger
//! registry, push subscriptions, account reconciliation, and the feed.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::accounts::{AccountDelta, SeenAccounts};
use crate::config::ControllerConfig;
use crate::feed::{
    merge_and_sort, normalize_feature_announcement, normalize_on_chain, MarkAsRead,
    NotificationItem,
};
use crate::push::PushSubscriptionManager;
use crate::services::{
    AccountSource, AuthService, FeatureAnnouncementService, OnChainNotificationService,
    PushTransport, RawOnChainNotification, UserStorageService,
};
use crate::triggers::{normalize_address, TriggerFilter, TriggerKind, UserStorageDocument};
use crate::{Error, Result};

/// Events emitted over the outbound port. Hosts subscribe and forward to
/// whatever UI messaging layer they own.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    FeedUpdated(Vec<NotificationItem>),
    ReadStateUpdated(Vec<NotificationItem>),
}

/// The subset of controller state the host persists across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub notifications_enabled: bool,
    pub feature_announcements_enabled: bool,
    pub snap_notifications_enabled: bool,
    pub feature_seen: bool,
    /// Cached feed, newest first.
    pub notifications: Vec<NotificationItem>,
    /// Read ids for feature announcements (no remote read-state exists for
    /// that source) plus confirmed on-chain reads.
    pub read_ids: Vec<String>,
}

/// Transient progress flags for UI spinners. Never persisted; always
/// false/empty after construction so a crash mid-operation cannot leave a
/// stale "in progress" indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressFlags {
    pub is_updating: bool,
    pub is_fetching: bool,
    pub is_checking_presence: bool,
    pub updating_accounts: HashSet<String>,
}

struct ControllerState {
    persisted: PersistedState,
    flags: ProgressFlags,
    seen_accounts: SeenAccounts,
}

/// Collaborators the controller is wired with by the host.
pub struct ControllerDeps {
    pub storage: Arc<dyn UserStorageService>,
    pub auth: Arc<dyn AuthService>,
    pub push: Arc<dyn PushTransport>,
    pub on_chain: Arc<dyn OnChainNotificationService>,
    pub feature_announcements: Arc<dyn FeatureAnnouncementService>,
    pub accounts: Arc<dyn AccountSource>,
}

pub struct NotificationController {
    storage: Arc<dyn UserStorageService>,
    auth: Arc<dyn AuthService>,
    on_chain: Arc<dyn OnChainNotificationService>,
    feature_announcements: Arc<dyn FeatureAnnouncementService>,
    accounts: Arc<dyn AccountSource>,
    push: PushSubscriptionManager,
    config: ControllerConfig,
    state: RwLock<ControllerState>,
    events: broadcast::Sender<ControllerEvent>,
}

enum Flag {
    Updating,
    Fetching,
    CheckingPresence,
    Accounts(Vec<String>),
}

/// Clears a progress flag on drop, so every exit path (including errors)
/// resets it.
struct FlagGuard<'a> {
    state: &'a RwLock<ControllerState>,
    flag: Flag,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write();
        match &self.flag {
            Flag::Updating => state.flags.is_updating = false,
            Flag::Fetching => state.flags.is_fetching = false,
            Flag::CheckingPresence => state.flags.is_checking_presence = false,
            Flag::Accounts(addresses) => {
                for address in addresses {
                    state.flags.updating_accounts.remove(address);
                }
            }
        }
    }
}

impl NotificationController {
    /// Transient flags start false/empty regardless of what `persisted`
    /// carries; only the persisted subset is restored.
    pub fn new(
        deps: ControllerDeps,
        persisted: Option<PersistedState>,
        config: ControllerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer);
        Self {
            storage: deps.storage,
            auth: deps.auth,
            on_chain: deps.on_chain,
            feature_announcements: deps.feature_announcements,
            accounts: deps.accounts,
            push: PushSubscriptionManager::new(deps.push),
            config,
            state: RwLock::new(ControllerState {
                persisted: persisted.unwrap_or_default(),
                flags: ProgressFlags::default(),
                seen_accounts: SeenAccounts::new(),
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.read().persisted.notifications_enabled
    }

    pub fn feed(&self) -> Vec<NotificationItem> {
        self.state.read().persisted.notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.state
            .read()
            .persisted
            .notifications
            .iter()
            .filter(|n| !n.is_read)
            .count()
    }

    pub fn persisted_state(&self) -> PersistedState {
        self.state.read().persisted.clone()
    }

    pub fn progress(&self) -> ProgressFlags {
        self.state.read().flags.clone()
    }

    // ---- authorization gate ------------------------------------------------

    /// Fail closed: any auth failure during a privileged operation turns
    /// notifications off rather than leaving them ambiguously enabled.
    fn assert_signed_in(&self) -> Result<()> {
        if self.auth.is_signed_in() {
            return Ok(());
        }
        self.state.write().persisted.notifications_enabled = false;
        Err(Error::NotSignedIn)
    }

    /// The single authorization gate for all mutating operations.
    async fn credentials(&self) -> Result<(String, String)> {
        self.assert_signed_in()?;
        let bearer_token = self
            .auth
            .get_bearer_token()
            .await?
            .ok_or_else(|| Error::MissingCredentials("bearer token".into()))?;
        let storage_key = self
            .storage
            .get_storage_key()
            .await?
            .ok_or_else(|| Error::MissingCredentials("storage key".into()))?;
        Ok((bearer_token, storage_key))
    }

    // ---- document plumbing -------------------------------------------------

    async fn load_document(&self) -> Result<Option<UserStorageDocument>> {
        let Some(blob) = self.storage.get(&self.config.storage_entry_key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&blob) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                warn!(error = %e, "unable to parse user storage document");
                Ok(None)
            }
        }
    }

    /// Only `enable` may fabricate a fresh document; every other operation
    /// requires one to exist.
    async fn require_document(&self) -> Result<UserStorageDocument> {
        self.load_document().await?.ok_or(Error::NoUserStorage)
    }

    async fn persist_document(&self, document: &UserStorageDocument) -> Result<()> {
        let blob = serde_json::to_string(document)?;
        self.storage.set(&self.config.storage_entry_key, blob).await
    }

    // ---- progress flags ----------------------------------------------------

    fn begin_updating(&self) -> FlagGuard<'_> {
        self.state.write().flags.is_updating = true;
        FlagGuard {
            state: &self.state,
            flag: Flag::Updating,
        }
    }

    fn begin_fetching(&self) -> FlagGuard<'_> {
        self.state.write().flags.is_fetching = true;
        FlagGuard {
            state: &self.state,
            flag: Flag::Fetching,
        }
    }

    fn begin_checking_presence(&self) -> FlagGuard<'_> {
        self.state.write().flags.is_checking_presence = true;
        FlagGuard {
            state: &self.state,
            flag: Flag::CheckingPresence,
        }
    }

    fn begin_updating_accounts(&self, addresses: &[String]) -> FlagGuard<'_> {
        let normalized: Vec<String> = addresses.iter().map(|a| normalize_address(a)).collect();
        {
            let mut state = self.state.write();
            state
                .flags
                .updating_accounts
                .extend(normalized.iter().cloned());
        }
        FlagGuard {
            state: &self.state,
            flag: Flag::Accounts(normalized),
        }
    }

    fn emit(&self, event: ControllerEvent) {
        if self.events.receiver_count() > 0 {
            let _ = self.events.send(event);
        }
    }

    // ---- lifecycle actions -------------------------------------------------

    /// Enable notifications end to end: ensure profile syncing, ensure the
    /// remote trigger document exists (creating it disabled-first), register
    /// all triggers with the on-chain service, enable push subscriptions,
    /// flip the triggers on, and re-persist.
    ///
    /// Partial remote state from a crash between steps is self-healing on
    /// retry: document initialization and trigger creation are idempotent.
    pub async fn enable(&self) -> Result<UserStorageDocument> {
        self.assert_signed_in()?;
        let _guard = self.begin_updating();

        let document = self.create_on_chain_triggers().await.map_err(|e| {
            error!(error = %e, "failed to enable notifications");
            e
        })?;

        {
            let mut state = self.state.write();
            state.persisted.notifications_enabled = true;
            state.persisted.feature_seen = true;
            if self.config.enable_feature_announcements {
                state.persisted.feature_announcements_enabled = true;
            }
        }
        info!(
            addresses = document.addresses.len(),
            "notifications enabled"
        );
        Ok(document)
    }

    async fn create_on_chain_triggers(&self) -> Result<UserStorageDocument> {
        self.storage
            .enable_profile_syncing()
            .await
            .map_err(|e| Error::TriggerSync(format!("unable to enable profile syncing: {e}")))?;
        let (bearer_token, storage_key) = self.credentials().await?;
        let addresses = self.accounts.list_addresses().await?;

        let mut document = match self.load_document().await? {
            Some(document) if document.is_initialized() => document,
            _ => {
                let mut fresh = UserStorageDocument::initialize(&addresses, false);
                fresh.version = Some(self.config.document_version);
                fresh
            }
        };
        for address in &addresses {
            document.upsert_address_triggers(address);
        }
        // Persist before registering remotely: the remote document must exist
        // before any trigger-creation call so a crash between steps can be
        // resumed by re-running from here.
        self.persist_document(&document).await?;

        let triggers = document.collect_triggers(&TriggerFilter::default());
        self.on_chain
            .create_triggers(&document, &storage_key, &bearer_token, &triggers)
            .await
            .map_err(|e| Error::TriggerSync(e.to_string()))?;

        self.push.enable(&document.all_trigger_ids()).await;

        document.set_all_enabled(true);
        self.persist_document(&document).await?;
        Ok(document)
    }

    /// Disable notifications locally: clears the enabled flags and tears down
    /// push subscriptions best-effort. The remote document, including its
    /// (now dormant) triggers, is left intact for rehydration on re-enable.
    pub async fn disable(&self) -> Result<()> {
        let _guard = self.begin_updating();

        let trigger_ids = match self.load_document().await {
            Ok(Some(document)) => document.all_trigger_ids(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "unable to load document while disabling");
                Vec::new()
            }
        };
        if !trigger_ids.is_empty() {
            self.push.disable(&trigger_ids).await;
        }

        let mut state = self.state.write();
        state.persisted.notifications_enabled = false;
        state.persisted.feature_announcements_enabled = false;
        info!("notifications disabled");
        Ok(())
    }

    // ---- trigger registry actions -------------------------------------------

    /// Upsert triggers for newly added wallet accounts, register them with
    /// the on-chain service, refresh push subscriptions, then enable the new
    /// triggers and re-persist.
    pub async fn update_triggers_for_accounts(
        &self,
        addresses: &[String],
    ) -> Result<UserStorageDocument> {
        let (bearer_token, storage_key) = self.credentials().await?;
        let _guard = self.begin_updating_accounts(addresses);

        let mut document = self.require_document().await?;
        for address in addresses {
            document.upsert_address_triggers(address);
        }
        self.persist_document(&document).await?;

        let triggers = document.collect_triggers(&TriggerFilter::for_addresses(addresses));
        self.on_chain
            .create_triggers(&document, &storage_key, &bearer_token, &triggers)
            .await
            .map_err(|e| Error::TriggerSync(e.to_string()))?;

        self.push.update(&document.all_trigger_ids()).await;

        document.set_addresses_enabled(addresses, true);
        self.persist_document(&document).await?;
        Ok(document)
    }

    /// Delete every trigger owned by the given accounts, remotely first,
    /// then from the document. Trigger lifetime equals address lifetime:
    /// removed addresses are deleted, not merely disabled.
    pub async fn delete_triggers_for_accounts(
        &self,
        addresses: &[String],
    ) -> Result<UserStorageDocument> {
        let (bearer_token, storage_key) = self.credentials().await?;
        let _guard = self.begin_updating_accounts(addresses);

        let mut document = self.require_document().await?;
        let trigger_ids = document.trigger_ids_for_addresses(addresses);
        if trigger_ids.is_empty() {
            return Ok(document);
        }

        self.on_chain
            .delete_triggers(&document, &storage_key, &bearer_token, &trigger_ids)
            .await
            .map_err(|e| Error::TriggerSync(e.to_string()))?;

        document.delete_address_triggers(addresses);
        self.push.disable(&trigger_ids).await;
        self.persist_document(&document).await?;

        // Teardown complete; the reconciler may re-add these later.
        self.state.write().seen_accounts.forget(addresses);
        Ok(document)
    }

    /// Ensure a trigger kind exists for every address in the document and
    /// register the new entries remotely.
    pub async fn update_triggers_for_kind(
        &self,
        kind: TriggerKind,
    ) -> Result<UserStorageDocument> {
        let (bearer_token, storage_key) = self.credentials().await?;
        let _guard = self.begin_updating();

        let mut document = self.require_document().await?;
        document.upsert_kind_triggers(kind);
        self.persist_document(&document).await?;

        let triggers = document.collect_triggers(&TriggerFilter::for_kind(kind));
        self.on_chain
            .create_triggers(&document, &storage_key, &bearer_token, &triggers)
            .await
            .map_err(|e| Error::TriggerSync(e.to_string()))?;

        self.push.update(&document.all_trigger_ids()).await;

        for trigger in &triggers {
            document.set_trigger_enabled(&trigger.address, kind, true);
        }
        self.persist_document(&document).await?;
        Ok(document)
    }

    /// Delete every trigger of the given kind across all addresses.
    pub async fn delete_triggers_for_kind(
        &self,
        kind: TriggerKind,
    ) -> Result<UserStorageDocument> {
        let (bearer_token, storage_key) = self.credentials().await?;
        let _guard = self.begin_updating();

        let mut document = self.require_document().await?;
        let trigger_ids = document.trigger_ids_for_kind(kind);
        if trigger_ids.is_empty() {
            return Ok(document);
        }

        self.on_chain
            .delete_triggers(&document, &storage_key, &bearer_token, &trigger_ids)
            .await
            .map_err(|e| Error::TriggerSync(e.to_string()))?;

        document.delete_kind_triggers(kind);
        self.push.disable(&trigger_ids).await;
        self.persist_document(&document).await?;
        Ok(document)
    }

    // ---- account reconciliation ----------------------------------------------

    /// Normalize the wallet's current accounts and diff them against the
    /// seen-set.
    pub async fn list_accounts(&self) -> Result<AccountDelta> {
        let current = self
            .accounts
            .list_addresses()
            .await
            .map_err(|e| Error::Accounts(e.to_string()))?;
        Ok(self.state.write().seen_accounts.diff(current))
    }

    /// Host-delivered account-set-changed event. No-op while notifications
    /// are disabled. Creation and deletion for the same event run
    /// concurrently; both complete before this returns, so completion
    /// implies the registry is consistent with the new account set.
    pub async fn handle_account_set_changed(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let delta = self.list_accounts().await?;

        let update = async {
            if delta.accounts_added.is_empty() {
                Ok(())
            } else {
                self.update_triggers_for_accounts(&delta.accounts_added)
                    .await
                    .map(|_| ())
            }
        };
        let delete = async {
            if delta.accounts_removed.is_empty() {
                Ok(())
            } else {
                self.delete_triggers_for_accounts(&delta.accounts_removed)
                    .await
                    .map(|_| ())
            }
        };

        let (updated, deleted) = tokio::join!(update, delete);
        if let Err(e) = &updated {
            error!(error = %e, "failed to create triggers for added accounts");
        }
        if let Err(e) = &deleted {
            error!(error = %e, "failed to delete triggers for removed accounts");
        }
        updated.and(deleted)
    }

    // ---- feed actions --------------------------------------------------------

    /// Fetch both notification sources, normalize, merge, sort, and replace
    /// the cached feed. Each source degrades to an empty list on failure
    /// rather than aborting the whole operation; a single malformed item is
    /// dropped, not the batch.
    pub async fn fetch_feed(&self) -> Result<Vec<NotificationItem>> {
        let _guard = self.begin_fetching();

        let (announcements_enabled, read_ids) = {
            let state = self.state.read();
            (
                state.persisted.feature_announcements_enabled,
                state
                    .persisted
                    .read_ids
                    .iter()
                    .cloned()
                    .collect::<HashSet<String>>(),
            )
        };

        let raw_feature = if announcements_enabled {
            self.feature_announcements
                .list()
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "feature announcement fetch failed");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        let document = self.load_document().await.unwrap_or_else(|e| {
            warn!(error = %e, "user storage fetch failed while building feed");
            None
        });
        let bearer_token = self.auth.get_bearer_token().await.unwrap_or_else(|e| {
            warn!(error = %e, "bearer token fetch failed while building feed");
            None
        });

        let raw_on_chain = match (document.as_ref(), bearer_token.as_deref()) {
            (Some(document), Some(token)) => self
                .on_chain
                .list_notifications(document, token)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "on-chain notification fetch failed");
                    Vec::new()
                }),
            _ => Vec::new(),
        };

        let feature: Vec<NotificationItem> = raw_feature
            .into_iter()
            .filter_map(|raw| normalize_feature_announcement(raw, &read_ids))
            .collect();
        let on_chain: Vec<NotificationItem> =
            raw_on_chain.into_iter().filter_map(normalize_on_chain).collect();

        let merged = merge_and_sort(feature, on_chain);

        self.state.write().persisted.notifications = merged.clone();
        self.emit(ControllerEvent::FeedUpdated(merged.clone()));
        debug!(count = merged.len(), "notification feed updated");
        Ok(merged)
    }

    /// Mark notifications as read. On-chain ids are flagged locally only
    /// after the remote mark-read call is confirmed; feature-announcement
    /// read-state is purely local.
    pub async fn mark_read(&self, notifications: &[MarkAsRead]) -> Result<()> {
        let mut on_chain_ids: Vec<String> = notifications
            .iter()
            .filter(|n| n.kind.is_on_chain() && !n.is_read)
            .map(|n| n.id.clone())
            .collect();
        let feature_ids: Vec<String> = notifications
            .iter()
            .filter(|n| !n.kind.is_on_chain() && !n.is_read)
            .map(|n| n.id.clone())
            .collect();

        if !on_chain_ids.is_empty() {
            let bearer_token = self.auth.get_bearer_token().await.unwrap_or_else(|e| {
                warn!(error = %e, "bearer token fetch failed while marking read");
                None
            });
            match bearer_token {
                Some(token) => {
                    if let Err(e) = self.on_chain.mark_read(&token, &on_chain_ids).await {
                        warn!(error = %e, "unable to mark on-chain notifications as read");
                        on_chain_ids.clear();
                    }
                }
                None => {
                    warn!("missing bearer token; on-chain notifications stay unread");
                    on_chain_ids.clear();
                }
            }
        }

        let snapshot = {
            let mut state = self.state.write();
            let newly_read: HashSet<String> =
                on_chain_ids.into_iter().chain(feature_ids).collect();
            for id in &newly_read {
                if !state.persisted.read_ids.contains(id) {
                    state.persisted.read_ids.push(id.clone());
                }
            }
            for item in &mut state.persisted.notifications {
                if newly_read.contains(&item.id) {
                    item.is_read = true;
                }
            }
            state.persisted.notifications.clone()
        };
        self.emit(ControllerEvent::ReadStateUpdated(snapshot));
        Ok(())
    }

    /// Live push delivery path: prepend a freshly pushed notification to the
    /// cached feed without re-sorting. Duplicates are ignored; out-of-order
    /// push delivery may transiently violate strict timestamp ordering until
    /// the next full `fetch_feed`.
    pub fn append_incoming_notification(&self, raw: RawOnChainNotification) {
        if self
            .state
            .read()
            .persisted
            .notifications
            .iter()
            .any(|n| n.id == raw.id)
        {
            debug!(id = %raw.id, "ignoring duplicate pushed notification");
            return;
        }
        let Some(item) = normalize_on_chain(raw) else {
            return;
        };

        let mut state = self.state.write();
        if state.persisted.notifications.iter().any(|n| n.id == item.id) {
            return;
        }
        state.persisted.notifications.insert(0, item);
        let snapshot = state.persisted.notifications.clone();
        drop(state);

        self.emit(ControllerEvent::FeedUpdated(snapshot));
    }

    // ---- settings surface ------------------------------------------------------

    /// Report, per input address, whether the document records at least one
    /// trigger for it. Read-only; used by settings UI to render toggle
    /// defaults.
    pub async fn check_accounts_presence(
        &self,
        addresses: &[String],
    ) -> Result<IndexMap<String, bool>> {
        let _guard = self.begin_checking_presence();
        let document = self.require_document().await?;
        Ok(addresses
            .iter()
            .map(|a| (normalize_address(a), document.contains_address(a)))
            .collect())
    }

    pub fn set_feature_announcements_enabled(&self, enabled: bool) -> Result<()> {
        self.assert_signed_in()?;
        self.state.write().persisted.feature_announcements_enabled = enabled;
        Ok(())
    }

    pub fn set_snap_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.assert_signed_in()?;
        self.state.write().persisted.snap_notifications_enabled = enabled;
        Ok(())
    }

    pub fn mark_feature_seen(&self) -> Result<()> {
        self.assert_signed_in()?;
        self.state.write().persisted.feature_seen = true;
        Ok(())
    }

    // ---- unlock cycle ------------------------------------------------------------

    /// Host-delivered unlock event: refresh push registrations at most once
    /// per unlock cycle, provided notifications are enabled and a trigger
    /// document exists.
    pub async fn handle_wallet_unlocked(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let Some(document) = self.load_document().await? else {
            debug!("no trigger document yet; skipping push initialization");
            return Ok(());
        };
        self.push.initialize(&document.all_trigger_ids()).await;
        Ok(())
    }

    /// Host-delivered lock event: allow push initialization on next unlock.
    pub fn handle_wallet_locked(&self) {
        self.push.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        InMemoryUserStorage, MockAccountSource, MockAuthService, MockFeatureAnnouncementService,
        MockOnChainService, RecordingPushTransport,
    };
    use crate::NOTIFICATION_SETTINGS_ENTRY;

    struct Harness {
        storage: Arc<InMemoryUserStorage>,
        auth: Arc<MockAuthService>,
        push: Arc<RecordingPushTransport>,
        on_chain: Arc<MockOnChainService>,
        announcements: Arc<MockFeatureAnnouncementService>,
        accounts: Arc<MockAccountSource>,
    }

    impl Harness {
        fn new(addresses: &[&str]) -> Self {
            Self {
                storage: Arc::new(InMemoryUserStorage::new()),
                auth: Arc::new(MockAuthService::signed_in()),
                push: Arc::new(RecordingPushTransport::new()),
                on_chain: Arc::new(MockOnChainService::new()),
                announcements: Arc::new(MockFeatureAnnouncementService::default()),
                accounts: Arc::new(MockAccountSource::new(addresses.iter().copied())),
            }
        }

        fn controller(&self) -> NotificationController {
            self.controller_with_state(None)
        }

        fn controller_with_state(
            &self,
            persisted: Option<PersistedState>,
        ) -> NotificationController {
            NotificationController::new(
                ControllerDeps {
                    storage: self.storage.clone(),
                    auth: self.auth.clone(),
                    push: self.push.clone(),
                    on_chain: self.on_chain.clone(),
                    feature_announcements: self.announcements.clone(),
                    accounts: self.accounts.clone(),
                },
                persisted,
                ControllerConfig::default(),
            )
        }

        fn stored_document(&self) -> UserStorageDocument {
            let blob = self.storage.entry(NOTIFICATION_SETTINGS_ENTRY).unwrap();
            serde_json::from_str(&blob).unwrap()
        }
    }

    #[tokio::test]
    async fn test_enable_requires_sign_in() {
        let harness = Harness::new(&["0xabc"]);
        harness.auth.set_signed_in(false);
        let controller = harness.controller();

        let err = controller.enable().await.unwrap_err();
        assert!(matches!(err, Error::NotSignedIn));
        assert!(!controller.is_enabled());
        assert!(harness.storage.entry(NOTIFICATION_SETTINGS_ENTRY).is_none());
    }

    #[tokio::test]
    async fn test_enable_builds_and_enables_document() {
        let harness = Harness::new(&["0xAbC", "0xDeF"]);
        let controller = harness.controller();

        let document = controller.enable().await.unwrap();

        assert!(controller.is_enabled());
        assert!(harness.storage.is_syncing_enabled());
        assert!(document.contains_address("0xabc"));
        assert!(document.contains_address("0xdef"));
        // Every persisted trigger ends up enabled and registered remotely.
        let stored = harness.stored_document();
        assert!(stored
            .collect_triggers(&TriggerFilter::default())
            .iter()
            .all(|t| t.enabled));
        assert_eq!(
            harness.on_chain.registered_ids().len(),
            stored.all_trigger_ids().len()
        );
        assert_eq!(harness.push.enabled_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_enable_is_idempotent_on_trigger_ids() {
        let harness = Harness::new(&["0xabc"]);
        let controller = harness.controller();

        let first = controller.enable().await.unwrap();
        let second = controller.enable().await.unwrap();

        let mut first_ids = first.all_trigger_ids();
        let mut second_ids = second.all_trigger_ids();
        first_ids.sort();
        second_ids.sort();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_enable_propagates_remote_create_failure() {
        let harness = Harness::new(&["0xabc"]);
        harness.on_chain.fail_create(true);
        let controller = harness.controller();

        let err = controller.enable().await.unwrap_err();
        assert!(matches!(err, Error::TriggerSync(_)));
        assert!(!controller.is_enabled());
        // The document was persisted disabled before the remote call, so a
        // retry resumes instead of starting over.
        let stored = harness.stored_document();
        assert!(stored.is_initialized());
        assert!(stored
            .collect_triggers(&TriggerFilter::default())
            .iter()
            .all(|t| !t.enabled));
    }

    #[tokio::test]
    async fn test_push_failure_does_not_block_enable() {
        let harness = Harness::new(&["0xabc"]);
        harness.push.fail(true);
        let controller = harness.controller();

        controller.enable().await.unwrap();
        assert!(controller.is_enabled());
    }

    #[tokio::test]
    async fn test_disable_keeps_remote_document() {
        let harness = Harness::new(&["0xabc"]);
        let controller = harness.controller();
        controller.enable().await.unwrap();

        controller.disable().await.unwrap();

        assert!(!controller.is_enabled());
        assert!(!controller.persisted_state().feature_announcements_enabled);
        assert_eq!(harness.push.disabled_calls().len(), 1);
        assert!(harness.stored_document().contains_address("0xabc"));
    }

    #[tokio::test]
    async fn test_update_triggers_requires_existing_document() {
        let harness = Harness::new(&["0xabc"]);
        let controller = harness.controller();

        let err = controller
            .update_triggers_for_accounts(&["0xabc".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoUserStorage));
    }

    #[tokio::test]
    async fn test_missing_storage_key_is_missing_credentials() {
        let harness = Harness::new(&["0xabc"]);
        harness.storage.set_storage_key(None);
        let controller = harness.controller();

        let err = controller.enable().await.unwrap_err();
        assert!(matches!(err, Error::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn test_check_accounts_presence() {
        let harness = Harness::new(&["0xabc"]);
        let controller = harness.controller();
        controller.enable().await.unwrap();

        let presence = controller
            .check_accounts_presence(&["0xABC".to_string(), "0xdef".to_string()])
            .await
            .unwrap();
        assert_eq!(presence["0xabc"], true);
        assert_eq!(presence["0xdef"], false);
    }

    #[tokio::test]
    async fn test_transient_flags_reset_on_construction() {
        let harness = Harness::new(&["0xabc"]);
        let persisted = PersistedState {
            notifications_enabled: true,
            ..Default::default()
        };
        let controller = harness.controller_with_state(Some(persisted));

        assert!(controller.is_enabled());
        assert_eq!(controller.progress(), ProgressFlags::default());
    }

    #[tokio::test]
    async fn test_append_incoming_ignores_duplicates() {
        let harness = Harness::new(&["0xabc"]);
        let controller = harness.controller();

        let raw = RawOnChainNotification {
            id: "n1".to_string(),
            kind: TriggerKind::EthReceived,
            address: Some("0xabc".to_string()),
            created_at: Some(chrono::Utc::now()),
            unread: true,
            data: serde_json::Value::Null,
        };
        controller.append_incoming_notification(raw.clone());
        controller.append_incoming_notification(raw);

        assert_eq!(controller.feed().len(), 1);
        assert_eq!(controller.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_settings_toggles_are_auth_gated() {
        let harness = Harness::new(&[]);
        harness.auth.set_signed_in(false);
        let controller = harness.controller();

        assert!(controller.set_feature_announcements_enabled(true).is_err());
        assert!(controller.set_snap_notifications_enabled(true).is_err());
        assert!(controller.mark_feature_seen().is_err());

        harness.auth.set_signed_in(true);
        controller.set_snap_notifications_enabled(true).unwrap();
        assert!(controller.persisted_state().snap_notifications_enabled);
    }

    #[tokio::test]
    async fn test_wallet_unlock_initializes_push_once() {
        let harness = Harness::new(&["0xabc"]);
        let controller = harness.controller();
        controller.enable().await.unwrap();
        let calls_after_enable = harness.push.enabled_calls().len();

        controller.handle_wallet_unlocked().await.unwrap();
        controller.handle_wallet_unlocked().await.unwrap();
        assert_eq!(harness.push.enabled_calls().len(), calls_after_enable + 1);

        controller.handle_wallet_locked();
        controller.handle_wallet_unlocked().await.unwrap();
        assert_eq!(harness.push.enabled_calls().len(), calls_after_enable + 2);
    }
}
