//! Environment-driven configuration.
//!
//! Follows the teacher's `DatabaseConfig::default()` shape in
//! `database/mod.rs`: every field has a literal default, overridable by an
//! env var, read once at process start.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub max_db_connections: u32,

    /// §4.3 — non-terminal workers must heartbeat within this window or the
    /// sweeper marks them stuck.
    pub stale_worker_window: Duration,
    /// §4.3 — an `assigned` item with no registered worker older than this
    /// reverts to `queued`.
    pub worker_registration_grace: Duration,
    /// §4.3 — how often the staleness sweeper runs.
    pub sweep_interval: Duration,

    /// §4.2 — bounded timeout per spec-generation attempt.
    pub spec_gen_timeout: Duration,
    /// §4.2 — attempts before a generating item fails terminally.
    pub spec_gen_max_attempts: u32,
    /// §4.2 — global cap on concurrent spec-generation child processes.
    pub spec_gen_max_concurrency: usize,

    /// §4.5 — retries before an item is failed outright.
    pub retry_cap: i32,
    /// §4.5 — base of the exponential backoff curve, in seconds.
    pub retry_backoff_base_secs: i64,
    /// §4.5 — backoff ceiling.
    pub retry_backoff_cap: Duration,

    /// §4.6 — daily per-process iteration budget; dispatch is suppressed,
    /// not failed, once exhausted.
    pub daily_iteration_budget: u32,
    /// §4.6 — capacity: maximum worker processes running concurrently.
    pub max_concurrent_workers: usize,
    /// §4.6 — how often the dispatcher loop polls for claimable work.
    pub dispatch_poll_interval: Duration,

    /// §6.4 — injected into spawned worker processes.
    pub github_token: Option<String>,
    /// §6.4 — advertised back to spawned workers as `ORCHESTRATOR_URL`.
    pub orchestrator_url: String,
    /// §4.2 — external spec-generator executable.
    pub spec_generator_command: String,
    /// §4.6 — external worker-harness executable, one child process per
    /// claimed item.
    pub worker_command: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/orchestrator".to_string()),
            bind_addr: std::env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
            max_db_connections: env_or("DATABASE_POOL_SIZE", 10),

            stale_worker_window: Duration::from_secs(env_or("STALE_WORKER_WINDOW_SECS", 120)),
            worker_registration_grace: Duration::from_secs(env_or(
                "WORKER_REGISTRATION_GRACE_SECS",
                60,
            )),
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 30)),

            spec_gen_timeout: Duration::from_secs(env_or("SPEC_GEN_TIMEOUT_SECS", 300)),
            spec_gen_max_attempts: env_or("SPEC_GEN_MAX_ATTEMPTS", 3),
            spec_gen_max_concurrency: env_or("SPEC_GEN_MAX_CONCURRENCY", 4),

            retry_cap: env_or("RETRY_CAP", 3),
            retry_backoff_base_secs: env_or("RETRY_BACKOFF_BASE_SECS", 30),
            retry_backoff_cap: Duration::from_secs(env_or("RETRY_BACKOFF_CAP_SECS", 1800)),

            daily_iteration_budget: env_or("DAILY_ITERATION_BUDGET", 500),
            max_concurrent_workers: env_or("MAX_CONCURRENT_WORKERS", 4),
            dispatch_poll_interval: Duration::from_millis(env_or(
                "DISPATCH_POLL_INTERVAL_MS",
                1000,
            )),

            github_token: std::env::var("GITHUB_TOKEN").ok(),
            orchestrator_url: std::env::var("ORCHESTRATOR_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            spec_generator_command: std::env::var("SPEC_GENERATOR_COMMAND")
                .unwrap_or_else(|_| "spec-generator".to_string()),
            worker_command: std::env::var("WORKER_COMMAND")
                .unwrap_or_else(|_| "worker".to_string()),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // These mutate process-wide env vars, so they run serialized against
    // each other (and against any other env-reading test in this binary).
    #[test]
    #[serial]
    fn defaults_are_sane() {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("RETRY_CAP");
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.retry_cap, 3);
        assert_eq!(cfg.stale_worker_window, Duration::from_secs(120));
        assert_eq!(cfg.worker_registration_grace, Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn env_vars_override_defaults() {
        std::env::set_var("RETRY_CAP", "7");
        std::env::set_var("DAILY_ITERATION_BUDGET", "42");
        let cfg = OrchestratorConfig::default();
        std::env::remove_var("RETRY_CAP");
        std::env::remove_var("DAILY_ITERATION_BUDGET");
        assert_eq!(cfg.retry_cap, 7);
        assert_eq!(cfg.daily_iteration_budget, 42);
    }
}
