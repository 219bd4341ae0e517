//! Run-wide tunables

use std::time::Duration;

/// Number of projects every account is topped up to
pub const DEFAULT_TARGET_PROJECTS: usize = 12;

/// Width of the per-account worker pool
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Options threaded through every operation of a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Log every mutating decision instead of performing it
    pub dry_run: bool,

    /// Concurrent projects per account
    pub max_workers: usize,

    /// Minimum number of projects per account (create only)
    pub target_projects: usize,

    /// Readiness polling for freshly created projects
    pub readiness: ReadinessConfig,

    /// Pause before retrying enablement once the ToS prompt has already
    /// been answered by another worker
    pub tos_retry_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_workers: DEFAULT_MAX_WORKERS,
            target_projects: DEFAULT_TARGET_PROJECTS,
            readiness: ReadinessConfig::default(),
            tos_retry_delay: Duration::from_secs(5),
        }
    }
}

impl RunOptions {
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_target_projects(mut self, target_projects: usize) -> Self {
        self.target_projects = target_projects;
        self
    }
}

/// Exponential backoff used while waiting for a new project to become ACTIVE
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Delay before the second check
    pub initial_delay: Duration,

    /// Upper bound for a single step
    pub max_delay: Duration,

    /// Give up after this much time in total
    pub timeout: Duration,

    pub multiplier: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(300),
            multiplier: 2.0,
        }
    }
}

impl ReadinessConfig {
    /// Delay after the `attempt`-th failed check (0-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(delay as u64).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation() {
        let config = ReadinessConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(16));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(30)); // capped at max
        assert_eq!(config.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn test_worker_width_never_zero() {
        assert_eq!(RunOptions::default().with_max_workers(0).max_workers, 1);
    }
}
