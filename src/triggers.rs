//! Trigger document model: the versioned per-address trigger map persisted
//! in remote user storage. Pure data and invariants, no I/O.

#![forbid(unsafe_code)]

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::USER_STORAGE_VERSION;

/// On-chain trigger kinds plus the synthetic feature-announcement kind.
///
/// `FeatureAnnouncement` never appears in the trigger document; it marks
/// feed items sourced from the announcement service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    EthReceived,
    EthSent,
    Erc20Received,
    Erc20Sent,
    Erc721Received,
    Erc721Sent,
    SwapCompleted,
    StakeCompleted,
    UnstakeCompleted,
    FeatureAnnouncement,
}

impl TriggerKind {
    /// Every kind the on-chain notification service supports. New addresses
    /// get one trigger per entry in this slice.
    pub const ON_CHAIN: [TriggerKind; 9] = [
        TriggerKind::EthReceived,
        TriggerKind::EthSent,
        TriggerKind::Erc20Received,
        TriggerKind::Erc20Sent,
        TriggerKind::Erc721Received,
        TriggerKind::Erc721Sent,
        TriggerKind::SwapCompleted,
        TriggerKind::StakeCompleted,
        TriggerKind::UnstakeCompleted,
    ];

    pub fn is_on_chain(&self) -> bool {
        !matches!(self, TriggerKind::FeatureAnnouncement)
    }
}

/// Lowercase-normalize an address for document keys and comparisons.
/// Original case is preserved wherever an address is displayed.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// A flattened trigger, as handed to the on-chain service and push transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Uuid,
    pub address: String,
    pub kind: TriggerKind,
    pub enabled: bool,
}

/// Per-kind entry stored in the document. Field names are shortened on the
/// wire to keep the remote blob small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEntry {
    #[serde(rename = "i")]
    pub id: Uuid,
    #[serde(rename = "e")]
    pub enabled: bool,
}

/// The versioned trigger document held in remote encrypted storage.
///
/// A document without a version marker is treated as uninitialized and is
/// rebuilt from scratch on enable. Address keys are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStorageDocument {
    #[serde(rename = "v", skip_serializing_if = "Option::is_none", default)]
    pub version: Option<u32>,
    #[serde(rename = "a", default)]
    pub addresses: IndexMap<String, IndexMap<TriggerKind, TriggerEntry>>,
}

/// Optional constraints applied by [`UserStorageDocument::collect_triggers`].
#[derive(Debug, Clone, Default)]
pub struct TriggerFilter {
    pub addresses: Option<HashSet<String>>,
    pub kinds: Option<HashSet<TriggerKind>>,
    pub enabled: Option<bool>,
}

impl TriggerFilter {
    pub fn for_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            addresses: Some(
                addresses
                    .into_iter()
                    .map(|a| normalize_address(a.as_ref()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn for_kind(kind: TriggerKind) -> Self {
        Self {
            kinds: Some(HashSet::from([kind])),
            ..Default::default()
        }
    }

    pub fn enabled_only(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    fn matches(&self, trigger: &Trigger) -> bool {
        if let Some(addresses) = &self.addresses {
            if !addresses.contains(&trigger.address) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&trigger.kind) {
                return false;
            }
        }
        if let Some(enabled) = self.enabled {
            if trigger.enabled != enabled {
                return false;
            }
        }
        true
    }
}

impl UserStorageDocument {
    /// Build a fresh document with one trigger per supported kind per address.
    /// Triggers are created with the given enabled default (`false` during
    /// the enable flow; they are switched on only after the remote service
    /// and push transport have been updated).
    pub fn initialize<I, S>(addresses: I, enabled_default: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut doc = Self {
            version: Some(USER_STORAGE_VERSION),
            addresses: IndexMap::new(),
        };
        for address in addresses {
            let key = normalize_address(address.as_ref());
            if key.is_empty() {
                continue;
            }
            let entry = doc.addresses.entry(key).or_default();
            for kind in TriggerKind::ON_CHAIN {
                entry.entry(kind).or_insert_with(|| TriggerEntry {
                    id: Uuid::new_v4(),
                    enabled: enabled_default,
                });
            }
        }
        doc
    }

    pub fn is_initialized(&self) -> bool {
        self.version.is_some()
    }

    /// Idempotently ensure every supported kind exists for `address`.
    /// Existing entries keep their id and enabled flag.
    pub fn upsert_address_triggers(&mut self, address: &str) {
        let key = normalize_address(address);
        if key.is_empty() {
            return;
        }
        let entry = self.addresses.entry(key).or_default();
        for kind in TriggerKind::ON_CHAIN {
            entry.entry(kind).or_insert_with(|| TriggerEntry {
                id: Uuid::new_v4(),
                enabled: false,
            });
        }
    }

    /// Ensure `kind` exists for every address already in the document.
    pub fn upsert_kind_triggers(&mut self, kind: TriggerKind) {
        if !kind.is_on_chain() {
            return;
        }
        for entry in self.addresses.values_mut() {
            entry.entry(kind).or_insert_with(|| TriggerEntry {
                id: Uuid::new_v4(),
                enabled: false,
            });
        }
    }

    /// Flatten the document into a trigger list, optionally filtered.
    pub fn collect_triggers(&self, filter: &TriggerFilter) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        for (address, kinds) in &self.addresses {
            for (kind, entry) in kinds {
                let trigger = Trigger {
                    id: entry.id,
                    address: address.clone(),
                    kind: *kind,
                    enabled: entry.enabled,
                };
                if filter.matches(&trigger) {
                    triggers.push(trigger);
                }
            }
        }
        triggers
    }

    pub fn all_trigger_ids(&self) -> Vec<Uuid> {
        self.collect_triggers(&TriggerFilter::default())
            .into_iter()
            .map(|t| t.id)
            .collect()
    }

    pub fn trigger_ids_for_addresses<I, S>(&self, addresses: I) -> Vec<Uuid>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.collect_triggers(&TriggerFilter::for_addresses(addresses))
            .into_iter()
            .map(|t| t.id)
            .collect()
    }

    pub fn trigger_ids_for_kind(&self, kind: TriggerKind) -> Vec<Uuid> {
        self.collect_triggers(&TriggerFilter::for_kind(kind))
            .into_iter()
            .map(|t| t.id)
            .collect()
    }

    /// Remove every trigger for the given addresses, returning the removed
    /// triggers so remote registrations and push subscriptions can be torn
    /// down.
    pub fn delete_address_triggers<I, S>(&mut self, addresses: I) -> Vec<Trigger>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = Vec::new();
        for address in addresses {
            let key = normalize_address(address.as_ref());
            if let Some(kinds) = self.addresses.shift_remove(&key) {
                for (kind, entry) in kinds {
                    removed.push(Trigger {
                        id: entry.id,
                        address: key.clone(),
                        kind,
                        enabled: entry.enabled,
                    });
                }
            }
        }
        removed
    }

    /// Remove every trigger of `kind` across all addresses.
    pub fn delete_kind_triggers(&mut self, kind: TriggerKind) -> Vec<Trigger> {
        let mut removed = Vec::new();
        for (address, kinds) in &mut self.addresses {
            if let Some(entry) = kinds.shift_remove(&kind) {
                removed.push(Trigger {
                    id: entry.id,
                    address: address.clone(),
                    kind,
                    enabled: entry.enabled,
                });
            }
        }
        removed
    }

    pub fn set_trigger_enabled(&mut self, address: &str, kind: TriggerKind, enabled: bool) {
        let key = normalize_address(address);
        if let Some(entry) = self
            .addresses
            .get_mut(&key)
            .and_then(|kinds| kinds.get_mut(&kind))
        {
            entry.enabled = enabled;
        }
    }

    /// Flip every trigger in the document. Used once remote registrations
    /// and push subscriptions have been confirmed.
    pub fn set_all_enabled(&mut self, enabled: bool) {
        for kinds in self.addresses.values_mut() {
            for entry in kinds.values_mut() {
                entry.enabled = enabled;
            }
        }
    }

    /// Set every trigger belonging to the given addresses.
    pub fn set_addresses_enabled<I, S>(&mut self, addresses: I, enabled: bool)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for address in addresses {
            let key = normalize_address(address.as_ref());
            if let Some(kinds) = self.addresses.get_mut(&key) {
                for entry in kinds.values_mut() {
                    entry.enabled = enabled;
                }
            }
        }
    }

    /// Whether the address has at least one trigger recorded.
    pub fn contains_address(&self, address: &str) -> bool {
        self.addresses
            .get(&normalize_address(address))
            .map(|kinds| !kinds.is_empty())
            .unwrap_or(false)
    }

    /// Kinds present anywhere in the document. Callers needing group-level
    /// presence answers derive them from this set.
    pub fn present_kinds(&self) -> HashSet<TriggerKind> {
        let mut kinds = HashSet::new();
        for entry in self.addresses.values() {
            kinds.extend(entry.keys().copied());
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_all_kinds_per_address() {
        let doc = UserStorageDocument::initialize(["0xAbC1", "0xDef2"], false);
        assert!(doc.is_initialized());
        assert_eq!(doc.addresses.len(), 2);
        for kinds in doc.addresses.values() {
            assert_eq!(kinds.len(), TriggerKind::ON_CHAIN.len());
            assert!(kinds.values().all(|e| !e.enabled));
        }
        assert!(doc.addresses.contains_key("0xabc1"));
    }

    #[test]
    fn test_initialize_skips_empty_addresses() {
        let doc = UserStorageDocument::initialize(["", "  ", "0xabc"], false);
        assert_eq!(doc.addresses.len(), 1);
    }

    #[test]
    fn test_upsert_preserves_existing_ids() {
        let mut doc = UserStorageDocument::initialize(["0xabc"], false);
        let before = doc.collect_triggers(&TriggerFilter::default());

        doc.upsert_address_triggers("0xABC");
        let after = doc.collect_triggers(&TriggerFilter::default());

        assert_eq!(before, after);
    }

    #[test]
    fn test_upsert_fills_missing_kinds() {
        let mut doc = UserStorageDocument::initialize(["0xabc"], false);
        doc.addresses
            .get_mut("0xabc")
            .unwrap()
            .shift_remove(&TriggerKind::SwapCompleted);

        doc.upsert_address_triggers("0xabc");
        assert_eq!(
            doc.addresses["0xabc"].len(),
            TriggerKind::ON_CHAIN.len(),
        );
    }

    #[test]
    fn test_upsert_kind_triggers_covers_all_addresses() {
        let mut doc = UserStorageDocument::initialize(["0xabc", "0xdef"], false);
        for kinds in doc.addresses.values_mut() {
            kinds.shift_remove(&TriggerKind::StakeCompleted);
        }

        doc.upsert_kind_triggers(TriggerKind::StakeCompleted);
        for kinds in doc.addresses.values() {
            assert!(kinds.contains_key(&TriggerKind::StakeCompleted));
        }
    }

    #[test]
    fn test_collect_with_filters() {
        let mut doc = UserStorageDocument::initialize(["0xabc", "0xdef"], false);
        doc.set_trigger_enabled("0xabc", TriggerKind::EthReceived, true);

        let for_abc = doc.collect_triggers(&TriggerFilter::for_addresses(["0xABC"]));
        assert_eq!(for_abc.len(), TriggerKind::ON_CHAIN.len());

        let enabled = doc.collect_triggers(&TriggerFilter::default().enabled_only(true));
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].kind, TriggerKind::EthReceived);

        let swaps = doc.collect_triggers(&TriggerFilter::for_kind(TriggerKind::SwapCompleted));
        assert_eq!(swaps.len(), 2);
    }

    #[test]
    fn test_delete_address_triggers_returns_removed() {
        let mut doc = UserStorageDocument::initialize(["0xabc", "0xdef"], false);
        let removed = doc.delete_address_triggers(["0xABC"]);

        assert_eq!(removed.len(), TriggerKind::ON_CHAIN.len());
        assert!(!doc.contains_address("0xabc"));
        assert!(doc.contains_address("0xdef"));
    }

    #[test]
    fn test_delete_kind_triggers() {
        let mut doc = UserStorageDocument::initialize(["0xabc", "0xdef"], false);
        let removed = doc.delete_kind_triggers(TriggerKind::EthSent);

        assert_eq!(removed.len(), 2);
        assert!(!doc.present_kinds().contains(&TriggerKind::EthSent));
    }

    #[test]
    fn test_set_all_enabled() {
        let mut doc = UserStorageDocument::initialize(["0xabc"], false);
        doc.set_all_enabled(true);
        assert!(doc
            .collect_triggers(&TriggerFilter::default())
            .iter()
            .all(|t| t.enabled));
    }

    #[test]
    fn test_json_round_trip_uses_short_keys() {
        let doc = UserStorageDocument::initialize(["0xabc"], true);
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"v\":1"));
        assert!(json.contains("\"e\":true"));

        let parsed: UserStorageDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_uninitialized_document_has_no_version() {
        let parsed: UserStorageDocument = serde_json::from_str("{}").unwrap();
        assert!(!parsed.is_initialized());
    }
}
