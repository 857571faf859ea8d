//! Engine configuration
//!
//! Every knob has a default; `from_env` overrides them from `REVIVE_*`
//! environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobSpec};
use crate::reliability::RevivalPolicy;
use crate::unit::SimulatedWork;
use crate::worker::WorkerPoolConfig;

/// Default units per job
pub const DEFAULT_TOTAL_UNITS: u32 = 30;

/// Default simulated cost of one unit
pub const DEFAULT_UNIT_DELAY: Duration = Duration::from_millis(300);

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a revival run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Worker pool settings
    pub pool: WorkerPoolConfig,

    /// Revival ceiling and backoff
    pub revival: RevivalPolicy,

    /// Units assigned to each job's first attempt
    pub total_units: u32,

    /// Simulated cost of one unit
    #[serde(with = "duration_millis")]
    pub unit_delay: Duration,

    /// Largest divisor drawn by simulated work
    pub max_divisor: u32,

    /// Seed for reproducible simulated failures
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPoolConfig::default(),
            revival: RevivalPolicy::default(),
            total_units: DEFAULT_TOTAL_UNITS,
            unit_delay: DEFAULT_UNIT_DELAY,
            max_divisor: 5,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `REVIVE_POOL_SIZE`: Concurrent attempts (default: 5)
    /// - `REVIVE_QUEUE_CAPACITY`: Attempts waiting for a slot (default: 64)
    /// - `REVIVE_TOTAL_UNITS`: Units per job (default: 30)
    /// - `REVIVE_UNIT_DELAY_MS`: Simulated unit cost (default: 300)
    /// - `REVIVE_MAX_DIVISOR`: Simulated divisor range (default: 5)
    /// - `REVIVE_SEED`: Seed for simulated failures (default: random)
    /// - `REVIVE_MAX_ATTEMPTS`: Attempts per job, 0 for unlimited (default: 50)
    /// - `REVIVE_REVIVAL_DELAY_MS`: Delay before each revival (default: 0)
    /// - `REVIVE_SHUTDOWN_TIMEOUT_MS`: Drain timeout (default: 30000)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut pool = defaults.pool.clone();
        if let Some(size) = env_parse::<usize>("REVIVE_POOL_SIZE") {
            pool = pool.with_max_concurrency(size);
        }
        if let Some(capacity) = env_parse::<usize>("REVIVE_QUEUE_CAPACITY") {
            pool = pool.with_queue_capacity(capacity);
        }
        if let Some(ms) = env_parse::<u64>("REVIVE_SHUTDOWN_TIMEOUT_MS") {
            pool = pool.with_shutdown_timeout(Duration::from_millis(ms));
        }

        let mut revival = defaults.revival.clone();
        match env_parse::<u32>("REVIVE_MAX_ATTEMPTS") {
            Some(0) => revival = revival.without_limit(),
            Some(max) => revival = revival.with_max_attempts(max),
            None => {}
        }
        if let Some(ms) = env_parse::<u64>("REVIVE_REVIVAL_DELAY_MS") {
            let interval = Duration::from_millis(ms);
            revival = revival
                .with_initial_interval(interval)
                .with_max_interval(interval);
        }

        Self {
            pool,
            revival,
            total_units: env_parse("REVIVE_TOTAL_UNITS").unwrap_or(defaults.total_units),
            unit_delay: env_parse("REVIVE_UNIT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.unit_delay),
            max_divisor: env_parse("REVIVE_MAX_DIVISOR").unwrap_or(defaults.max_divisor),
            seed: env_parse("REVIVE_SEED"),
        }
    }

    /// Set pool size
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool = self.pool.with_max_concurrency(size);
        self
    }

    /// Set units per job
    pub fn with_total_units(mut self, units: u32) -> Self {
        self.total_units = units;
        self
    }

    /// Set simulated unit cost
    pub fn with_unit_delay(mut self, delay: Duration) -> Self {
        self.unit_delay = delay;
        self
    }

    /// Set seed for simulated failures
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the revival policy
    pub fn with_revival(mut self, policy: RevivalPolicy) -> Self {
        self.revival = policy;
        self
    }

    /// Validate the pool and revival settings
    ///
    /// Simulation settings are not checked here; see
    /// [`EngineConfig::validate_simulation`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pool size must be at least 1".into(),
            ));
        }
        if self.revival.max_interval < self.revival.initial_interval {
            return Err(ConfigError::Invalid(
                "revival max_interval must not be below initial_interval".into(),
            ));
        }
        Ok(())
    }

    /// Validate everything, including the settings [`SimulatedWork`] uses
    pub fn validate_simulation(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.max_divisor == 0 {
            return Err(ConfigError::Invalid(
                "max_divisor of 0 makes every simulated unit fail".into(),
            ));
        }
        Ok(())
    }

    /// First-attempt specs for the given jobs, each assigned `total_units`
    pub fn job_specs<I, J>(&self, job_ids: I) -> Vec<JobSpec>
    where
        I: IntoIterator<Item = J>,
        J: Into<JobId>,
    {
        job_ids
            .into_iter()
            .map(|id| JobSpec::new(id, self.total_units))
            .collect()
    }

    /// Simulated work matching this configuration
    pub fn simulated_work(&self) -> SimulatedWork {
        let work = SimulatedWork::new()
            .with_max_divisor(self.max_divisor)
            .with_unit_delay(self.unit_delay);
        match self.seed {
            Some(seed) => work.with_seed(seed),
            None => work,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
