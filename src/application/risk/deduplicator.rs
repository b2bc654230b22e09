//! Signal deduplication: suppresses repeat signals for the same instrument/side/price/time
//! bucket within a TTL window, so a jittery strategy cannot fire the same trade twice.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::domain::trading::types::{OrderSide, Signal};

const DEFAULT_TTL_SECONDS: i64 = 600;
const DEFAULT_ROUND_DECIMALS: u32 = 0;
const DEFAULT_BUCKET_SECONDS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    symbol: String,
    side_is_buy: bool,
    rounded_entry: Decimal,
    time_bucket: i64,
}

fn fingerprint_of(signal: &Signal, round_decimals: u32, bucket_seconds: i64) -> Fingerprint {
    Fingerprint {
        symbol: signal.symbol.clone(),
        side_is_buy: signal.side == OrderSide::Buy,
        rounded_entry: signal.entry_price.round_dp(round_decimals),
        time_bucket: signal.timestamp.timestamp() / bucket_seconds,
    }
}

/// A TTL cache over signal fingerprints. Not bounded explicitly — entries expire on their own as
/// the wall clock advances past `ttl`, which keeps the cache size proportional to recent signal
/// volume rather than unbounded.
pub struct SignalDeduplicator {
    ttl: Duration,
    round_decimals: u32,
    bucket_seconds: i64,
    seen: HashMap<Fingerprint, DateTime<Utc>>,
}

impl SignalDeduplicator {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds),
            round_decimals: DEFAULT_ROUND_DECIMALS,
            bucket_seconds: DEFAULT_BUCKET_SECONDS,
            seen: HashMap::new(),
        }
    }

    /// Checks whether `signal`'s fingerprint was already seen within the TTL window. Expires
    /// stale entries first, then inserts on a miss so the next identical signal is caught too.
    pub fn is_duplicate(&mut self, signal: &Signal) -> bool {
        self.expire(signal.timestamp);
        let fingerprint = fingerprint_of(signal, self.round_decimals, self.bucket_seconds);
        if self.seen.contains_key(&fingerprint) {
            true
        } else {
            self.seen.insert(fingerprint, signal.timestamp);
            false
        }
    }

    /// Refreshes the entry for a signal that actually went on to execute, extending its
    /// suppression window from the execution time rather than the original detection time.
    pub fn register_execution(&mut self, signal: &Signal) {
        let fingerprint = fingerprint_of(signal, self.round_decimals, self.bucket_seconds);
        self.seen.insert(fingerprint, signal.timestamp);
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.seen.retain(|_, inserted_at| now.signed_duration_since(*inserted_at) < ttl);
    }
}

impl Default for SignalDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECONDS)
    }
}
