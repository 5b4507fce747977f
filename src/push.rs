//! Push subscription management. Push is an enhancement, not a correctness
//! requirement for the feed, so every operation here is best-effort: failures
//! are logged and never propagate to the trigger state machine.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::PushTransport;

pub struct PushSubscriptionManager {
    transport: Arc<dyn PushTransport>,
    initialized: AtomicBool,
}

impl PushSubscriptionManager {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self {
            transport,
            initialized: AtomicBool::new(false),
        }
    }

    pub async fn enable(&self, trigger_ids: &[Uuid]) {
        let ids = to_strings(trigger_ids);
        if let Err(e) = self.transport.enable_push(&ids).await {
            warn!(error = %e, count = ids.len(), "failed to enable push subscriptions");
        }
    }

    pub async fn disable(&self, trigger_ids: &[Uuid]) {
        let ids = to_strings(trigger_ids);
        if let Err(e) = self.transport.disable_push(&ids).await {
            warn!(error = %e, count = ids.len(), "failed to disable push subscriptions");
        }
    }

    pub async fn update(&self, trigger_ids: &[Uuid]) {
        let ids = to_strings(trigger_ids);
        if let Err(e) = self.transport.update_push(&ids).await {
            warn!(error = %e, count = ids.len(), "failed to update push subscriptions");
        }
    }

    /// Refresh push registrations once per unlock cycle. Callers gate this on
    /// notifications being enabled and a trigger document existing; the
    /// one-shot flag here makes repeat calls a no-op.
    pub async fn initialize(&self, trigger_ids: &[Uuid]) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("push subscriptions already initialized this cycle");
            return;
        }
        self.enable(trigger_ids).await;
    }

    /// Allow a fresh `initialize` on the next unlock.
    pub fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }
}

fn to_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::RecordingPushTransport;

    #[tokio::test]
    async fn test_failures_never_propagate() {
        let transport = Arc::new(RecordingPushTransport::new());
        transport.fail(true);
        let manager = PushSubscriptionManager::new(transport.clone());

        // No panic, no error surface.
        manager.enable(&[Uuid::new_v4()]).await;
        manager.disable(&[Uuid::new_v4()]).await;
        manager.update(&[Uuid::new_v4()]).await;
        assert!(transport.enabled_calls().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_is_one_shot() {
        let transport = Arc::new(RecordingPushTransport::new());
        let manager = PushSubscriptionManager::new(transport.clone());

        let ids = [Uuid::new_v4()];
        manager.initialize(&ids).await;
        manager.initialize(&ids).await;
        assert_eq!(transport.enabled_calls().len(), 1);

        manager.reset();
        manager.initialize(&ids).await;
        assert_eq!(transport.enabled_calls().len(), 2);
    }
}
