//! Temp-key generation and delayed cleanup-on-failure (spec.md §4.D: "on
//! pipeline failure, the engine schedules temp cleanup after a short delay
//! to let OS file handles settle").
//!
//! The delay/detach shape follows the teacher's `ScopedContainer::drop`,
//! which spawns a detached task to finish cleanup work it cannot await
//! inline.

use crate::{ObjectStore, StorageKey};
use std::sync::Arc;
use std::time::Duration;

pub fn temp_key() -> StorageKey {
    format!("tmp-{}", uuid::Uuid::new_v4())
}

/// Spawn a detached task that deletes `key` after `delay`. Errors are
/// logged, not propagated — there is no caller left to hand them to by the
/// time the task runs.
pub fn schedule_cleanup(store: Arc<dyn ObjectStore>, key: StorageKey, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(err) = store.delete_by_name(&[key.clone()]).await {
            tracing::warn!(key = %key, error = %err, "temp cleanup failed");
        } else {
            tracing::debug!(key = %key, "cleaned up temp object after pipeline failure");
        }
    });
}
