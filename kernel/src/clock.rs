//! ID & Clock — opaque prefixed IDs, monotonic seconds, UTC day boundaries.
//!
//! The clock is an injected capability rather than a process-wide singleton,
//! so tests can advance time deterministically without sleeping.

use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const SECONDS_PER_DAY: u64 = 86_400;

/// Wall-clock source, truncated to whole seconds.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Current time, seconds since the Unix epoch.
    fn now_seconds(&self) -> u64;
}

/// Real wall clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs()
    }
}

/// A clock fixed to an explicit value, advanced only by the test that owns
/// it. Used to exercise TTL expiry and day-rollover without real sleeps.
#[derive(Debug)]
pub struct FixedClock {
    now: AtomicU64,
}

impl FixedClock {
    pub fn new(now_seconds: u64) -> Self {
        Self {
            now: AtomicU64::new(now_seconds),
        }
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, now_seconds: u64) {
        self.now.store(now_seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_seconds(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// UTC midnight on or before `now`.
pub fn day_start(now_seconds: u64) -> u64 {
    (now_seconds / SECONDS_PER_DAY) * SECONDS_PER_DAY
}

/// Generates an opaque identifier of the form `<prefix>_<random>`.
///
/// Monotonicity within a transaction is not assumed; callers that need a
/// stable tiebreak on identical timestamps fall back to lexicographic `id`
/// order.
pub fn new_id(prefix: &str) -> String {
    let suffix: String = {
        let mut rng = rand::thread_rng();
        (0..20)
            .map(|_| {
                const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
                ALPHABET[rng.gen_range(0..ALPHABET.len())] as char
            })
            .collect()
    };
    format!("{prefix}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_explicitly() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_seconds(), 1_000);
        clock.advance(50);
        assert_eq!(clock.now_seconds(), 1_050);
    }

    #[test]
    fn day_start_truncates_to_utc_midnight() {
        assert_eq!(day_start(0), 0);
        assert_eq!(day_start(SECONDS_PER_DAY - 1), 0);
        assert_eq!(day_start(SECONDS_PER_DAY), SECONDS_PER_DAY);
        assert_eq!(day_start(SECONDS_PER_DAY + 3_600), SECONDS_PER_DAY);
    }

    #[test]
    fn new_id_carries_the_requested_prefix() {
        let id = new_id("agent");
        assert!(id.starts_with("agent_"));
        assert_eq!(id.len(), "agent_".len() + 20);
    }

    #[test]
    fn new_id_is_not_trivially_repeated() {
        let a = new_id("quote");
        let b = new_id("quote");
        assert_ne!(a, b);
    }
}
