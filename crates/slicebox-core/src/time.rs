//! Epoch-millisecond time, matching the `created`/`updated` columns in §3.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochMillis(pub i64);

impl EpochMillis {
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self(ms)
    }

    pub fn elapsed_ms(&self, now: EpochMillis) -> i64 {
        (now.0 - self.0).max(0)
    }

    pub fn is_older_than(&self, now: EpochMillis, timeout_ms: i64) -> bool {
        self.elapsed_ms(now) >= timeout_ms
    }
}
