use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const MAX_FAILED_ATTEMPTS: u32 = 5;
pub const ATTEMPT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Copy, Debug)]
struct AttemptEntry {
    failures: u32,
    first_failure: Instant,
}

/// Failed admin authentications per client fingerprint.
///
/// A client is blocked once it reaches `max_failures` inside `window`,
/// counted from its first failure. Expired entries are dropped whenever the
/// tracker is consulted; a successful authentication clears the entry.
pub struct AttemptTracker {
    max_failures: u32,
    window: Duration,
    entries: Mutex<HashMap<String, AttemptEntry>>,
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(MAX_FAILED_ATTEMPTS, ATTEMPT_WINDOW)
    }
}

impl AttemptTracker {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn with_entries<T>(&self, now: Instant, f: impl FnOnce(&mut HashMap<String, AttemptEntry>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let window = self.window;
        entries.retain(|_, entry| now.duration_since(entry.first_failure) < window);
        f(&mut entries)
    }

    pub fn is_blocked(&self, fingerprint: &str) -> bool {
        self.is_blocked_at(fingerprint, Instant::now())
    }

    pub fn is_blocked_at(&self, fingerprint: &str, now: Instant) -> bool {
        let max = self.max_failures;
        self.with_entries(now, |entries| {
            entries.get(fingerprint).is_some_and(|entry| entry.failures >= max)
        })
    }

    /// Count a failure and return the failures inside the current window.
    pub fn record_failure(&self, fingerprint: &str) -> u32 {
        self.record_failure_at(fingerprint, Instant::now())
    }

    pub fn record_failure_at(&self, fingerprint: &str, now: Instant) -> u32 {
        self.with_entries(now, |entries| {
            let entry = entries.entry(fingerprint.to_string()).or_insert(AttemptEntry {
                failures: 0,
                first_failure: now,
            });
            entry.failures = entry.failures.saturating_add(1);
            entry.failures
        })
    }

    pub fn reset(&self, fingerprint: &str) {
        self.with_entries(Instant::now(), |entries| {
            entries.remove(fingerprint);
        });
    }

    pub fn tracked(&self) -> usize {
        self.with_entries(Instant::now(), |entries| entries.len())
    }
}

/// SHA-256 of the first forwarded address and the user agent.
pub fn client_fingerprint(headers: &HeaderMap) -> String {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown-ip");
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown-ua");

    hex::encode(Sha256::digest(format!("{}|{}", ip, user_agent).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_failures() {
        let tracker = AttemptTracker::new(3, Duration::from_secs(60));
        let now = Instant::now();
        for expected in 1..=3 {
            assert!(!tracker.is_blocked_at("fp", now));
            assert_eq!(tracker.record_failure_at("fp", now), expected);
        }
        assert!(tracker.is_blocked_at("fp", now));
        assert!(!tracker.is_blocked_at("other", now));
    }

    #[test]
    fn window_expiry_unblocks_and_prunes() {
        let tracker = AttemptTracker::new(2, Duration::from_secs(60));
        let start = Instant::now();
        tracker.record_failure_at("fp", start);
        tracker.record_failure_at("fp", start);
        assert!(tracker.is_blocked_at("fp", start + Duration::from_secs(59)));
        assert!(!tracker.is_blocked_at("fp", start + Duration::from_secs(61)));
        assert_eq!(tracker.record_failure_at("fp", start + Duration::from_secs(61)), 1);
    }

    #[test]
    fn reset_clears_entry() {
        let tracker = AttemptTracker::default();
        tracker.record_failure("fp");
        assert_eq!(tracker.tracked(), 1);
        tracker.reset("fp");
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn fingerprint_uses_first_forwarded_ip_and_agent() {
        let mut a = HeaderMap::new();
        a.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        a.insert("user-agent", "curl/8".parse().unwrap());
        let mut b = HeaderMap::new();
        b.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        b.insert("user-agent", "curl/8".parse().unwrap());

        assert_eq!(client_fingerprint(&a), client_fingerprint(&b));
        assert_eq!(client_fingerprint(&a).len(), 64);
        assert_ne!(client_fingerprint(&a), client_fingerprint(&HeaderMap::new()));
    }
}
