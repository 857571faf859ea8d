//! Simulated work: a reciprocal computation that sometimes divides by zero

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{UnitContext, UnitFault, UnitOutcome, WorkUnit};
use crate::job::JobId;

/// Demo work unit
///
/// Each attempt draws an integer in `0..=max_divisor` and computes its
/// reciprocal, sleeping `unit_delay` to simulate cost. Drawing zero is the
/// simulated failure.
///
/// Every job gets its own random stream. With a seed the stream is derived
/// from the seed and the job id, so a job fails at the same units no matter
/// how attempts of different jobs interleave on the pool.
#[derive(Debug)]
pub struct SimulatedWork {
    max_divisor: u32,
    unit_delay: Duration,
    seed: Option<u64>,
    streams: DashMap<JobId, StdRng>,
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self {
            max_divisor: 5,
            unit_delay: Duration::from_millis(300),
            seed: None,
            streams: DashMap::new(),
        }
    }
}

impl SimulatedWork {
    /// Create simulated work with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest divisor drawn (failure odds are `1 / (max_divisor + 1)`)
    pub fn with_max_divisor(mut self, max_divisor: u32) -> Self {
        self.max_divisor = max_divisor;
        self
    }

    /// Set the simulated cost of each unit
    pub fn with_unit_delay(mut self, delay: Duration) -> Self {
        self.unit_delay = delay;
        self
    }

    /// Make failures reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn stream_for(&self, job_id: &JobId) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ fnv1a(job_id.as_str().as_bytes())),
            None => StdRng::from_entropy(),
        }
    }

    fn draw(&self, job_id: &JobId) -> u32 {
        let mut stream = self
            .streams
            .entry(job_id.clone())
            .or_insert_with(|| self.stream_for(job_id));
        stream.gen_range(0..=self.max_divisor)
    }
}

#[async_trait]
impl WorkUnit for SimulatedWork {
    async fn attempt(&self, ctx: &UnitContext) -> Result<UnitOutcome, UnitFault> {
        let divisor = self.draw(&ctx.job_id);
        if divisor == 0 {
            return Ok(UnitOutcome::failure("division by zero"));
        }

        if !self.unit_delay.is_zero() {
            tokio::time::sleep(self.unit_delay).await;
        }

        Ok(UnitOutcome::success(1.0 / f64::from(divisor)))
    }
}

// Stable across builds, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
