//! Cache validity for stored function intelligence
//!
//! A stored record answers a request only when it is younger than the TTL
//! and was computed for the same fingerprint. A record that fails either
//! check is a miss, never an error.
//!
//! **Stale vs changed:** an expired record with a matching fingerprint and a
//! fresh record with a different fingerprint are both treated as a full miss.
//! The verdict keeps them apart for logging only.

use crate::model::FunctionIntelligence;
use chrono::{DateTime, Duration, Utc};

/// Default time-to-live for stored records
pub const DEFAULT_TTL_HOURS: i64 = 24;

pub fn default_ttl() -> Duration {
    Duration::hours(DEFAULT_TTL_HOURS)
}

/// Outcome of checking one stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
    Hit,
    Expired,
    FingerprintChanged,
}

impl CacheVerdict {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheVerdict::Hit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheVerdict::Hit => "hit",
            CacheVerdict::Expired => "expired",
            CacheVerdict::FingerprintChanged => "fingerprint_changed",
        }
    }
}

/// Classify a stored record against the current time and fingerprint
///
/// A record stamped in the future (clock skew) is treated as age zero.
pub fn evaluate(
    record: &FunctionIntelligence,
    now: DateTime<Utc>,
    current_fingerprint: &str,
    ttl: Duration,
) -> CacheVerdict {
    if record.fingerprint() != current_fingerprint {
        return CacheVerdict::FingerprintChanged;
    }
    let age = now.signed_duration_since(record.created_at);
    if age < ttl {
        CacheVerdict::Hit
    } else {
        CacheVerdict::Expired
    }
}

/// `now - created_at < 24h` and the fingerprints match
pub fn is_valid(record: &FunctionIntelligence, now: DateTime<Utc>, current_fingerprint: &str) -> bool {
    evaluate(record, now, current_fingerprint, default_ttl()).is_hit()
}
