//! End-to-end tests for the revival scheduler
//!
//! Run with: cargo test -p revive-engine --test revival_test

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use revive_engine::prelude::*;

/// Counts calls per job and fails the listed (job, call) pairs
struct Scripted {
    calls: DashMap<JobId, u32>,
    failures: Vec<(&'static str, u32)>,
}

impl Scripted {
    fn new(failures: Vec<(&'static str, u32)>) -> Self {
        Self {
            calls: DashMap::new(),
            failures,
        }
    }

    fn calls(&self, job: &str) -> u32 {
        self.calls.get(&JobId::from(job)).map_or(0, |n| *n)
    }
}

#[async_trait]
impl WorkUnit for Scripted {
    async fn attempt(&self, ctx: &UnitContext) -> Result<UnitOutcome, UnitFault> {
        let call = {
            let mut n = self.calls.entry(ctx.job_id.clone()).or_insert(0);
            *n += 1;
            *n
        };

        let fails = self
            .failures
            .iter()
            .any(|(job, at)| *job == ctx.job_id.as_str() && *at == call);
        if fails {
            Ok(UnitOutcome::failure("division by zero"))
        } else {
            Ok(UnitOutcome::success(1.0))
        }
    }
}

/// Tracks how many attempts of each job run at the same time
#[derive(Default)]
struct OverlapProbe {
    active: Mutex<HashMap<JobId, usize>>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    overlaps: AtomicUsize,
}

#[async_trait]
impl WorkUnit for OverlapProbe {
    async fn attempt(&self, ctx: &UnitContext) -> Result<UnitOutcome, UnitFault> {
        {
            let mut active = self.active.lock();
            let count = active.entry(ctx.job_id.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(2)).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.active.lock().get_mut(&ctx.job_id) {
            *count -= 1;
        }

        // Every job fails its second unit on the first two attempts.
        if ctx.unit_index == 1 && ctx.attempt <= 2 {
            Ok(UnitOutcome::failure("scripted"))
        } else {
            Ok(UnitOutcome::success(1.0))
        }
    }
}

fn scheduler(
    pool_size: usize,
    unit: Arc<dyn WorkUnit>,
    sink: Arc<MemorySink>,
    policy: RevivalPolicy,
) -> RevivalScheduler {
    RevivalScheduler::new(
        WorkerPoolConfig::new().with_max_concurrency(pool_size),
        JobRunner::new(unit, sink),
        policy,
    )
}

#[test_log::test(tokio::test)]
async fn test_two_jobs_one_revival() {
    // Job A fails on its third unit; job B never fails.
    let unit = Arc::new(Scripted::new(vec![("A", 3)]));
    let sink = Arc::new(MemorySink::new());

    let report = scheduler(2, unit.clone(), sink.clone(), RevivalPolicy::default())
        .run_to_completion(vec![JobSpec::new("A", 5), JobSpec::new("B", 5)])
        .await
        .unwrap();

    assert!(report.all_completed());

    let a = report.get(&JobId::from("A")).unwrap();
    assert_eq!(a.attempts, 2);
    assert_eq!(a.completed_units, 5);
    assert_eq!(a.remaining_units, 0);

    let b = report.get(&JobId::from("B")).unwrap();
    assert_eq!(b.attempts, 1);
    assert_eq!(b.completed_units, 5);

    // The failing call does not consume a unit, so A makes six calls in total.
    assert_eq!(unit.calls("A"), 6);
    assert_eq!(unit.calls("B"), 5);

    let a_events = sink.events_for(&JobId::from("A"));
    let names: Vec<_> = a_events.iter().map(|event| event.name()).collect();
    assert_eq!(
        names,
        vec![
            "started", "progress", "progress", "failed", "exited", "revived", "started",
            "progress", "progress", "progress", "exited",
        ]
    );
    assert!(a_events.contains(&JobEvent::Failed {
        job_id: JobId::from("A"),
        completed: 2,
        remaining: 3,
    }));
    assert!(a_events.contains(&JobEvent::Revived {
        job_id: JobId::from("A"),
        remaining: 3,
        attempt: 2,
    }));
}

#[test_log::test(tokio::test)]
async fn test_single_slot_runs_every_job() {
    let unit = Arc::new(Scripted::new(vec![("x", 1), ("y", 2), ("y", 4)]));
    let sink = Arc::new(MemorySink::new());

    let report = scheduler(1, unit, sink.clone(), RevivalPolicy::default())
        .run_to_completion(vec![
            JobSpec::new("x", 3),
            JobSpec::new("y", 3),
            JobSpec::new("z", 3),
        ])
        .await
        .unwrap();

    assert!(report.all_completed());
    assert_eq!(report.get(&JobId::from("x")).unwrap().attempts, 2);
    assert_eq!(report.get(&JobId::from("y")).unwrap().attempts, 3);
    assert_eq!(report.get(&JobId::from("z")).unwrap().attempts, 1);
    assert_eq!(report.total_attempts(), 6);
    assert_eq!(sink.count("revived"), 3);
}

#[test_log::test(tokio::test)]
async fn test_units_are_conserved_across_revivals() {
    let unit = Arc::new(OverlapProbe::default());
    let sink = Arc::new(MemorySink::new());
    let specs: Vec<_> = (0..8u32).map(|i| JobSpec::new(i, 6)).collect();

    let report = scheduler(3, unit.clone(), sink.clone(), RevivalPolicy::default())
        .run_to_completion(specs)
        .await
        .unwrap();

    assert_eq!(report.len(), 8);
    assert!(report.all_completed());
    for outcome in report.jobs.values() {
        // One unit done per failed attempt, the rest on the third.
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.completed_units, 6);
    }

    // Every attempt's result conserves the units it was assigned.
    let mut checked = 0;
    for outcome in report.jobs.values() {
        let mut assigned = None;
        let mut failed = false;
        for event in sink.events_for(&outcome.job_id) {
            match event {
                JobEvent::Started { remaining, .. } => {
                    assigned = Some(remaining);
                    failed = false;
                }
                JobEvent::Failed {
                    completed,
                    remaining,
                    job_id,
                } => {
                    assert!(remaining > 0, "{job_id} failed with nothing left");
                    assert_eq!(Some(completed + remaining), assigned, "{job_id}");
                    failed = true;
                }
                JobEvent::Exited { completed, job_id } => {
                    if !failed {
                        assert_eq!(Some(completed), assigned, "{job_id}");
                    }
                    assigned = None;
                    checked += 1;
                }
                _ => {}
            }
        }
    }
    assert_eq!(checked, report.total_attempts());

    assert_eq!(unit.overlaps.load(Ordering::SeqCst), 0);
    assert!(unit.peak_running.load(Ordering::SeqCst) <= 3);
}

#[test_log::test(tokio::test)]
async fn test_always_failing_job_is_abandoned() {
    let unit = Arc::new(FnWork::new(|ctx| {
        if ctx.job_id.as_str() == "cursed" {
            Ok(UnitOutcome::failure("division by zero"))
        } else {
            Ok(UnitOutcome::success(0.5))
        }
    }));
    let sink = Arc::new(MemorySink::new());

    let report = scheduler(
        2,
        unit,
        sink.clone(),
        RevivalPolicy::immediate().with_max_attempts(4),
    )
    .run_to_completion(vec![JobSpec::new("cursed", 3), JobSpec::new("fine", 3)])
    .await
    .unwrap();

    let cursed = report.get(&JobId::from("cursed")).unwrap();
    assert_eq!(cursed.status, JobStatus::Abandoned);
    assert_eq!(cursed.attempts, 4);
    assert_eq!(cursed.remaining_units, 3);
    assert_eq!(
        report.get(&JobId::from("fine")).unwrap().status,
        JobStatus::Completed
    );
    assert!(report.has_failures());
    assert!(sink.events_for(&JobId::from("cursed")).contains(&JobEvent::Abandoned {
        job_id: JobId::from("cursed"),
        remaining: 3,
        attempts: 4,
    }));
}

#[test_log::test(tokio::test)]
async fn test_panicking_unit_faults_only_its_job() {
    let unit = Arc::new(FnWork::new(|ctx| {
        if ctx.job_id.as_str() == "boom" && ctx.unit_index == 2 {
            panic!("unit exploded");
        }
        Ok(UnitOutcome::success(1.0))
    }));
    let sink = Arc::new(MemorySink::new());

    let result = scheduler(2, unit, sink.clone(), RevivalPolicy::default())
        .run_to_completion(vec![
            JobSpec::new("boom", 4),
            JobSpec::new("calm", 4),
            JobSpec::new("quiet", 4),
        ])
        .await;
    let report = tokio_test::assert_ok!(result);

    let boom = report.get(&JobId::from("boom")).unwrap();
    assert_eq!(boom.status, JobStatus::Faulted);
    assert!(boom.fault.as_deref().unwrap().contains("unit exploded"));
    assert_eq!(report.count(JobStatus::Completed), 2);
    assert_eq!(sink.count("faulted"), 1);
}

#[test_log::test(tokio::test)]
async fn test_revival_backoff_delays_next_attempt() {
    let unit = Arc::new(Scripted::new(vec![("slow", 1), ("slow", 2)]));
    let sink = Arc::new(MemorySink::new());
    let policy = RevivalPolicy::fixed(Duration::from_millis(30), 5);

    let started = tokio::time::Instant::now();
    let report = scheduler(1, unit, sink, policy)
        .run_to_completion(vec![JobSpec::new("slow", 2)])
        .await
        .unwrap();

    assert!(report.all_completed());
    assert_eq!(report.get(&JobId::from("slow")).unwrap().attempts, 3);
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test_log::test(tokio::test)]
async fn test_interrupt_stops_revivals() {
    let unit = Arc::new(
        SimulatedWork::new()
            .with_seed(11)
            .with_unit_delay(Duration::from_millis(5)),
    );
    let sink = Arc::new(MemorySink::new());
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        trigger.cancel();
    });

    let report = scheduler(2, unit, sink, RevivalPolicy::unlimited())
        .run_until(
            vec![
                JobSpec::new("a", 1_000),
                JobSpec::new("b", 1_000),
                JobSpec::new("c", 1_000),
            ],
            shutdown,
        )
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.count(JobStatus::Interrupted), 3);
    assert!(!report.has_failures());
    for outcome in report.jobs.values() {
        assert!(outcome.remaining_units > 0);
        assert_eq!(outcome.completed_units + outcome.remaining_units, 1_000);
    }
}

#[test_log::test(tokio::test)]
async fn test_seeded_simulation_completes() {
    let config = EngineConfig::default()
        .with_pool_size(5)
        .with_total_units(30)
        .with_unit_delay(Duration::ZERO)
        .with_seed(42)
        .with_revival(RevivalPolicy::unlimited());
    let sink = Arc::new(MemorySink::new());

    let scheduler =
        RevivalScheduler::from_config(&config, Arc::new(config.simulated_work()), sink.clone())
            .unwrap();
    let report = scheduler
        .run_to_completion(config.job_specs(1..=12u32))
        .await
        .unwrap();

    assert_eq!(report.len(), 12);
    assert!(report.all_completed());
    for outcome in report.jobs.values() {
        assert_eq!(outcome.completed_units, 30);
        assert_eq!(
            sink.events_for(&outcome.job_id)
                .iter()
                .filter(|event| event.name() == "started")
                .count() as u32,
            outcome.attempts
        );
    }
    assert_eq!(sink.count("revived") as u32, report.total_attempts() - 12);
}

#[test_log::test(tokio::test)]
async fn test_duplicate_job_ids_rejected() {
    let unit = Arc::new(FnWork::new(|_| Ok(UnitOutcome::success(1.0))));
    let sink = Arc::new(MemorySink::new());

    let result = scheduler(2, unit, sink.clone(), RevivalPolicy::default())
        .run_to_completion(vec![
            JobSpec::new("a", 1),
            JobSpec::new("b", 1),
            JobSpec::new("a", 1),
        ])
        .await;

    let err = tokio_test::assert_err!(result);
    assert!(matches!(err, SchedulerError::DuplicateJob(id) if id.as_str() == "a"));
    // Nothing starts when the job set is rejected.
    assert!(sink.events().is_empty());
}
