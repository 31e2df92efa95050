//! Anonymous session support: bearer tokens and per-IP rate limiting
//! (spec §4.E, §6 "Share tokens").
use ac_core::AssessmentError;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// A freshly minted anonymous access token: the cleartext is returned to
/// the caller exactly once, and only `hash` is ever persisted (spec §4.E:
/// "the cleartext token is returned once and thereafter accepted as the
/// session's bearer credential").
pub struct IssuedToken {
    pub cleartext: String,
    pub hash: String,
}

/// 32 bytes of randomness, hex-encoded both for transport and for the
/// stored hash (spec §6: "32 bytes of randomness ... stored hashed
/// (SHA-256, 64 hex chars)").
pub fn issue_token() -> IssuedToken {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let cleartext = hex_encode(&bytes);
    IssuedToken {
        hash: hash_token(&cleartext),
        cleartext,
    }
}

pub fn hash_token(cleartext: &str) -> String {
    hex_encode(&Sha256::digest(cleartext.as_bytes()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Per-IP rolling-window counter (spec §5: "a single row per IP with an
/// optimistic update; the sliding-window reset is a read-modify-write
/// guarded by a unique constraint on IP"). `version` is the same
/// optimistic-concurrency guard `TestSession` uses: the repository only
/// applies an `upsert` whose `version` still matches the stored row, so two
/// concurrent requests from one IP can't both read `count=k` and both write
/// `k+1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    ip: String,
    count: u32,
    window_started_at: DateTime<Utc>,
    blocked_until: Option<DateTime<Utc>>,
    version: u32,
}

impl RateLimitRecord {
    pub fn fresh(ip: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            ip: ip.into(),
            count: 1,
            window_started_at: now,
            blocked_until: None,
            version: 0,
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }
    pub fn count(&self) -> u32 {
        self.count
    }
    pub fn window_started_at(&self) -> DateTime<Utc> {
        self.window_started_at
    }
    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        self.blocked_until
    }
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Rehydrates a row read back from storage (repository-only).
    pub(crate) fn restore(ip: String, count: u32, window_started_at: DateTime<Utc>, blocked_until: Option<DateTime<Utc>>, version: u32) -> Self {
        Self {
            ip,
            count,
            window_started_at,
            blocked_until,
            version,
        }
    }

    /// Bumped by the repository on a successful CAS write, mirroring
    /// `TestSession::bump_version`.
    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Applies one more attempt against this record (spec §4.E: "at most N
    /// per rolling one-hour window; exceeding triggers a timed block").
    /// Mutates in place and returns the outcome; the caller persists the
    /// record regardless of outcome so the window/block state survives.
    pub fn record_attempt(
        &mut self,
        now: DateTime<Utc>,
        limit_per_hour: u32,
        block_duration: Duration,
    ) -> Result<(), AssessmentError> {
        if let Some(blocked_until) = self.blocked_until {
            if now < blocked_until {
                return Err(AssessmentError::RateLimited {
                    retry_after_secs: (blocked_until - now).num_seconds().max(0) as u64,
                });
            }
            // block has expired: fall through and start a fresh window
            self.blocked_until = None;
            self.count = 0;
            self.window_started_at = now;
        }

        if now - self.window_started_at >= Duration::hours(1) {
            self.count = 0;
            self.window_started_at = now;
        }

        self.count += 1;
        if self.count > limit_per_hour {
            self.blocked_until = Some(now + block_duration);
            return Err(AssessmentError::RateLimited {
                retry_after_secs: block_duration.num_seconds().max(0) as u64,
            });
        }
        Ok(())
    }
}

pub(crate) mod pg_schema {
    use super::*;
    use ac_pg::RATE_LIMITS;
    use ac_pg::Schema;

    impl Schema for RateLimitRecord {
        fn name() -> &'static str {
            RATE_LIMITS
        }
        fn creates() -> &'static str {
            const_format::concatcp!(
                "CREATE TABLE IF NOT EXISTS ",
                RATE_LIMITS,
                " (
                    ip                  VARCHAR(64) PRIMARY KEY,
                    count               INTEGER NOT NULL,
                    window_started_at   TIMESTAMPTZ NOT NULL,
                    blocked_until       TIMESTAMPTZ,
                    version             INTEGER NOT NULL DEFAULT 0
                );"
            )
        }
        fn indices() -> &'static str {
            ""
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_distinct_from_cleartext() {
        let token = issue_token();
        assert_eq!(hash_token(&token.cleartext), token.hash);
        assert_ne!(token.cleartext, token.hash);
        assert_eq!(token.hash.len(), 64);
    }

    #[test]
    fn eleventh_attempt_within_the_cap_of_ten_is_blocked() {
        let now = DateTime::UNIX_EPOCH;
        let mut record = RateLimitRecord::fresh("203.0.113.5", now);
        record.count = 0; // `fresh` already counts as attempt 1; reset for a clean ten-attempt loop
        for _ in 0..10 {
            record.record_attempt(now, 10, Duration::hours(1)).unwrap();
        }
        let err = record.record_attempt(now, 10, Duration::hours(1)).unwrap_err();
        assert_eq!(err.status_hint(), 429);
        assert!(record.blocked_until().is_some());
    }

    #[test]
    fn window_resets_after_an_hour() {
        let now = DateTime::UNIX_EPOCH;
        let mut record = RateLimitRecord::fresh("203.0.113.5", now);
        for _ in 0..9 {
            record.record_attempt(now, 10, Duration::hours(1)).unwrap();
        }
        let later = now + Duration::hours(2);
        assert!(record.record_attempt(later, 10, Duration::hours(1)).is_ok());
        assert_eq!(record.count(), 1);
    }
}
