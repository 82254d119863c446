use std::time::{Duration, Instant};

use dashmap::DashMap;

const WINDOW_SECS: u64 = 15 * 60;
const MAX_FAILURES: u32 = 5;

/// Brute-force limiter for password checks, keyed by login identity.
pub struct LoginRateLimiter {
    /// key -> (failed_count, window_start)
    entries: DashMap<String, (u32, Instant)>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Key for a sub-user login attempt: admin email and username, case-folded.
    pub fn key(admin_email: &str, username: &str) -> String {
        format!("{}\u{1f}{}", admin_email.to_lowercase(), username.to_lowercase())
    }

    /// Check if a login attempt is allowed. 5 failures per 15 minutes.
    /// Does NOT increment the counter; call `record_failure()` on a wrong password.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let window = Duration::from_secs(WINDOW_SECS);
        let now = Instant::now();

        let Some(entry) = self.entries.get(key) else {
            return Ok(());
        };

        let (count, start) = entry.value();

        if now.duration_since(*start) > window {
            return Ok(());
        }

        if *count >= MAX_FAILURES {
            let elapsed = now.duration_since(*start).as_secs();
            return Err(WINDOW_SECS.saturating_sub(elapsed));
        }

        Ok(())
    }

    pub fn record_failure(&self, key: &str) {
        let window = Duration::from_secs(WINDOW_SECS);
        let now = Instant::now();

        let mut entry = self.entries.entry(key.to_string()).or_insert((0, now));
        let (count, start) = entry.value_mut();

        if now.duration_since(*start) > window {
            *count = 1;
            *start = now;
        } else {
            *count += 1;
        }
    }

    /// Forget failures after a successful login.
    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.entries.retain(|_, (_, start)| now.duration_since(*start) < max_age);
    }
}
