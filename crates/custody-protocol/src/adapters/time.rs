//! Wall-clock time source.

use std::time::{SystemTime, UNIX_EPOCH};

use shared_types::Timestamp;

use crate::ports::TimeSource;

/// Production time source using system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
