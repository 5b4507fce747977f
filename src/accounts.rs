//! Account change reconciliation: diffing the wallet's current account set
//! against the set of addresses this engine has already seen.

#![forbid(unsafe_code)]

use std::collections::HashSet;

use crate::triggers::normalize_address;

/// Result of diffing the current wallet accounts against the seen-set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountDelta {
    pub accounts_added: Vec<String>,
    pub accounts_removed: Vec<String>,
    /// The full normalized current account list.
    pub accounts: Vec<String>,
}

/// Tracker for addresses already observed by the reconciler.
///
/// The seen-set is only used to compute added/removed deltas; it is not a
/// source of truth for trigger existence. It is transient and starts empty
/// on every controller construction.
#[derive(Debug, Default)]
pub struct SeenAccounts {
    seen: HashSet<String>,
}

impl SeenAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `current` against the seen-set and fold the added addresses in.
    ///
    /// Removed addresses are not evicted here; eviction is implicit in the
    /// caller consuming `accounts_removed` and deleting their triggers. An
    /// empty current list means the wallet is still initializing, so the
    /// seen-set is left untouched and an all-empty delta is returned rather
    /// than treating every account as removed.
    pub fn diff<I, S>(&mut self, current: I) -> AccountDelta
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accounts: Vec<String> = current
            .into_iter()
            .map(|a| normalize_address(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();

        if accounts.is_empty() {
            return AccountDelta::default();
        }

        let current_set: HashSet<&String> = accounts.iter().collect();
        let accounts_added: Vec<String> = accounts
            .iter()
            .filter(|a| !self.seen.contains(*a))
            .cloned()
            .collect();
        let accounts_removed: Vec<String> = self
            .seen
            .iter()
            .filter(|a| !current_set.contains(*a))
            .cloned()
            .collect();

        self.seen.extend(accounts_added.iter().cloned());

        AccountDelta {
            accounts_added,
            accounts_removed,
            accounts,
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.seen.contains(&normalize_address(address))
    }

    /// Drop addresses whose trigger teardown has completed.
    pub fn forget<I, S>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for address in addresses {
            self.seen.remove(&normalize_address(address.as_ref()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_detects_added() {
        let mut seen = SeenAccounts::new();
        seen.diff(["0xA"]);

        let delta = seen.diff(["0xA", "0xB"]);
        assert_eq!(delta.accounts_added, ["0xb"]);
        assert!(delta.accounts_removed.is_empty());
        assert_eq!(delta.accounts, ["0xa", "0xb"]);
    }

    #[test]
    fn test_diff_detects_removed() {
        let mut seen = SeenAccounts::new();
        seen.diff(["0xA", "0xB"]);

        let delta = seen.diff(["0xA"]);
        assert!(delta.accounts_added.is_empty());
        assert_eq!(delta.accounts_removed, ["0xb"]);
    }

    #[test]
    fn test_empty_current_list_is_a_guard() {
        let mut seen = SeenAccounts::new();
        seen.diff(["0xA"]);

        let delta = seen.diff(Vec::<String>::new());
        assert_eq!(delta, AccountDelta::default());
        // Seen-set untouched: a later non-empty diff still knows 0xa.
        let delta = seen.diff(["0xA", "0xB"]);
        assert_eq!(delta.accounts_added, ["0xb"]);
    }

    #[test]
    fn test_removed_stays_in_seen_until_forgotten() {
        let mut seen = SeenAccounts::new();
        seen.diff(["0xA", "0xB"]);
        seen.diff(["0xA"]);

        // Still reported as removed on the next diff; eviction is explicit.
        let delta = seen.diff(["0xA"]);
        assert_eq!(delta.accounts_removed, ["0xb"]);

        seen.forget(["0xB"]);
        let delta = seen.diff(["0xA"]);
        assert!(delta.accounts_removed.is_empty());
    }

    #[test]
    fn test_normalization_is_case_insensitive() {
        let mut seen = SeenAccounts::new();
        seen.diff(["0xAbC"]);
        let delta = seen.diff(["0xABC"]);
        assert!(delta.accounts_added.is_empty());
        assert!(seen.contains("0xabc"));
    }
}
