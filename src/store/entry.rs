use crate::types::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored value together with its expiration.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    /// Expiry time as seconds since UNIX epoch. 0 = no expiry.
    pub expire_at: u64,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Entry {
            value,
            expire_at: 0,
        }
    }

    pub fn has_ttl(&self) -> bool {
        self.expire_at != 0
    }

    /// Check if this entry has expired as of `now` (epoch seconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expire_at != 0 && self.expire_at <= now
    }

    /// Time-to-live in seconds, or -1 if no expiry, or -2 if expired.
    pub fn ttl_seconds(&self, now: u64) -> i64 {
        if !self.has_ttl() {
            -1
        } else if self.is_expired_at(now) {
            -2
        } else {
            (self.expire_at - now) as i64
        }
    }
}

/// Get current time in seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
