#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Storage entry under which the trigger document lives in remote user storage.
pub const NOTIFICATION_SETTINGS_ENTRY: &str = "notification_settings";

/// Current schema version of the trigger document.
pub const USER_STORAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Remote storage entry key for the trigger document.
    pub storage_entry_key: String,
    /// Schema version written into newly initialized documents.
    pub document_version: u32,
    /// Whether feature announcements are turned on when notifications are enabled.
    pub enable_feature_announcements: bool,
    /// Capacity of the outbound event channel.
    pub event_buffer: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            storage_entry_key: NOTIFICATION_SETTINGS_ENTRY.to_string(),
            document_version: USER_STORAGE_VERSION,
            enable_feature_announcements: true,
            event_buffer: 64,
        }
    }
}

impl ControllerConfig {
    pub fn with_storage_entry_key(mut self, key: impl Into<String>) -> Self {
        self.storage_entry_key = key.into();
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}
