use std::time::Duration;

/// Process configuration, read once at boot from the environment.
///
/// Mirrors the teacher's `DB_URL`-from-env convention (`rbp_pg::db()`) and
/// extends it with the tunables spec.md calls out by name: the delta-testing
/// skip threshold (4.C), passport max age (§3 `CompetencyPassport`), the
/// anonymous rate-limit window (§5), and retry/backoff caps (§4.A, §7).
#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub bind_addr: String,
    pub passport_max_age_days: i64,
    pub delta_skip_threshold: f64,
    pub anon_rate_limit_per_hour: u32,
    pub anon_rate_limit_block_secs: u64,
    pub sweep_interval: Duration,
    pub psychometric_min_responses: u32,
    /// Days a `FlaggedForReview` item may dwell without its discrimination
    /// flag clearing before the job retires it outright (spec §4.H).
    pub psychometric_review_dwell_days: i64,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub selector_inventory_floor: u32,
    pub selector_questions_per_indicator: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: "postgres://localhost/assessment".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            passport_max_age_days: 180,
            delta_skip_threshold: 80.0,
            anon_rate_limit_per_hour: 10,
            anon_rate_limit_block_secs: 3600,
            sweep_interval: Duration::from_secs(30),
            psychometric_min_responses: 50,
            psychometric_review_dwell_days: 30,
            retry_max_attempts: 5,
            retry_base_delay: Duration::from_millis(20),
            selector_inventory_floor: 5,
            selector_questions_per_indicator: 3,
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to defaults
    /// for anything unset. Panics only on a malformed (not missing) value,
    /// matching the teacher's fail-fast boot convention.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_url: std::env::var("DB_URL").unwrap_or(defaults.db_url),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            passport_max_age_days: env_parsed("PASSPORT_MAX_AGE_DAYS", defaults.passport_max_age_days),
            delta_skip_threshold: env_parsed("DELTA_SKIP_THRESHOLD", defaults.delta_skip_threshold),
            anon_rate_limit_per_hour: env_parsed(
                "ANON_RATE_LIMIT_PER_HOUR",
                defaults.anon_rate_limit_per_hour,
            ),
            anon_rate_limit_block_secs: env_parsed(
                "ANON_RATE_LIMIT_BLOCK_SECS",
                defaults.anon_rate_limit_block_secs,
            ),
            sweep_interval: defaults.sweep_interval,
            psychometric_min_responses: env_parsed(
                "PSYCHOMETRIC_MIN_RESPONSES",
                defaults.psychometric_min_responses,
            ),
            psychometric_review_dwell_days: env_parsed(
                "PSYCHOMETRIC_REVIEW_DWELL_DAYS",
                defaults.psychometric_review_dwell_days,
            ),
            retry_max_attempts: defaults.retry_max_attempts,
            retry_base_delay: defaults.retry_base_delay,
            selector_inventory_floor: env_parsed(
                "SELECTOR_INVENTORY_FLOOR",
                defaults.selector_inventory_floor,
            ),
            selector_questions_per_indicator: env_parsed(
                "SELECTOR_QUESTIONS_PER_INDICATOR",
                defaults.selector_questions_per_indicator,
            ),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = Config::default();
        assert_eq!(cfg.passport_max_age_days, 180);
        assert_eq!(cfg.anon_rate_limit_per_hour, 10);
        assert_eq!(cfg.psychometric_min_responses, 50);
    }
}
