// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark drivers and the framework that executes them.
//!
//! A driver is a named scenario with an untimed `before`, a timed `test` run
//! once per iteration, and an untimed `after`. The framework runs drivers
//! strictly one at a time, in the order given, and guarantees that `after`
//! runs once a driver has started, whatever failed before it.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};

use snapbench_core::{BenchError, PullError, RunError};
use thiserror::Error;

use crate::metrics::{BenchmarkReport, DriverReport, IterationResult, Phase, PhaseFailure};

/// Failure of a single driver phase.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Bench(#[from] BenchError),

    #[error(transparent)]
    Pull(#[from] PullError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Test phase invoked before setup completed: {what}")]
    NotPrepared { what: &'static str },
}

pub type PhaseResult = Result<(), PhaseError>;

type Hook<'a> = Box<dyn FnMut() -> PhaseResult + 'a>;
type TestHook<'a> = Box<dyn FnMut(&mut IterationTimer) -> PhaseResult + 'a>;

/// Timing control handed to each test iteration.
///
/// Measurement starts immediately before the test body is invoked and ends
/// immediately after it returns. The body can narrow that window: `reset`
/// discards everything measured so far, `stop` freezes the measurement.
#[derive(Debug)]
pub struct IterationTimer {
    start: Instant,
    stopped_at: Option<Instant>,
}

impl IterationTimer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            stopped_at: None,
        }
    }

    /// Restart measurement, excluding setup done so far in the body.
    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.stopped_at = None;
    }

    /// Freeze measurement; work after this point is not timed.
    pub fn stop(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }

    /// Measured duration so far (up to now if still running).
    pub fn elapsed(&self) -> Duration {
        self.stopped_at
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.start)
    }

    fn finish(&mut self) -> Duration {
        self.stop();
        self.elapsed()
    }
}

/// Scenario whose phases share state, adapted into a driver by
/// [`BenchmarkTestDriver::from_scenario`].
pub trait Scenario {
    fn before(&mut self) -> PhaseResult {
        Ok(())
    }

    fn test(&mut self, timer: &mut IterationTimer) -> PhaseResult;

    fn after(&mut self) -> PhaseResult {
        Ok(())
    }
}

/// A named, repeatable benchmark scenario.
pub struct BenchmarkTestDriver<'a> {
    name: String,
    iterations: u32,
    before: Option<Hook<'a>>,
    test: TestHook<'a>,
    after: Option<Hook<'a>>,
}

impl<'a> BenchmarkTestDriver<'a> {
    /// Create a driver with only a test body. `iterations` is clamped to 1.
    pub fn new<F>(name: impl Into<String>, iterations: u32, test: F) -> Self
    where
        F: FnMut(&mut IterationTimer) -> PhaseResult + 'a,
    {
        Self {
            name: name.into(),
            iterations: iterations.max(1),
            before: None,
            test: Box::new(test),
            after: None,
        }
    }

    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> PhaseResult + 'a,
    {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> PhaseResult + 'a,
    {
        self.after = Some(Box::new(hook));
        self
    }

    /// Build a driver whose three phases are the scenario's methods.
    pub fn from_scenario<S>(name: impl Into<String>, iterations: u32, scenario: S) -> Self
    where
        S: Scenario + 'a,
    {
        let shared = Rc::new(RefCell::new(scenario));
        let before = Rc::clone(&shared);
        let after = Rc::clone(&shared);

        Self::new(name, iterations, move |timer| shared.borrow_mut().test(timer))
            .before(move || before.borrow_mut().before())
            .after(move || after.borrow_mut().after())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl std::fmt::Debug for BenchmarkTestDriver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkTestDriver")
            .field("name", &self.name)
            .field("iterations", &self.iterations)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// Execution states of one driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Pending,
    BeforeRunning,
    TestRunning { iteration: u32 },
    AfterRunning,
    Done,
    /// Absorbing: `after` still runs, but the driver stays failed.
    Failed,
}

impl DriverState {
    /// Get the state name for log messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::BeforeRunning => "BeforeRunning",
            Self::TestRunning { .. } => "TestRunning",
            Self::AfterRunning => "AfterRunning",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: DriverState) -> bool {
        use DriverState::*;
        match (self, target) {
            (Pending, BeforeRunning) | (Pending, TestRunning { iteration: 1 }) => true,
            (BeforeRunning, TestRunning { iteration: 1 }) => true,
            (TestRunning { iteration: n }, TestRunning { iteration: m }) => m == n + 1,
            (TestRunning { .. }, AfterRunning) | (TestRunning { .. }, Done) => true,
            (AfterRunning, Done) => true,
            (BeforeRunning, Failed) | (AfterRunning, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TestRunning { iteration } => write!(f, "TestRunning({})", iteration),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Tracks one driver's state and logs every transition.
struct DriverLifecycle<'n> {
    driver: &'n str,
    state: DriverState,
}

impl<'n> DriverLifecycle<'n> {
    fn new(driver: &'n str) -> Self {
        Self {
            driver,
            state: DriverState::Pending,
        }
    }

    fn advance(&mut self, target: DriverState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "invalid driver transition {} -> {}",
            self.state,
            target
        );
        tracing::debug!(driver = %self.driver, from = %self.state, to = %target, "Driver transition");
        self.state = target;
    }

    fn is_failed(&self) -> bool {
        self.state == DriverState::Failed
    }
}

/// Run a phase, turning errors and panics alike into a message.
fn guarded<T>(phase: Phase, f: impl FnOnce() -> Result<T, PhaseError>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("{} phase panicked: {}", phase, detail))
        }
    }
}

/// Execute one driver: `before`, every iteration, then `after`.
pub fn run_driver(driver: &mut BenchmarkTestDriver<'_>) -> DriverReport {
    let name = driver.name.clone();
    let mut lifecycle = DriverLifecycle::new(&name);
    let mut results = Vec::with_capacity(driver.iterations as usize);
    let mut failure = None;

    tracing::info!(driver = %name, iterations = driver.iterations, "Starting driver");

    if let Some(before) = driver.before.as_mut() {
        lifecycle.advance(DriverState::BeforeRunning);
        if let Err(message) = guarded(Phase::Before, before) {
            tracing::error!(driver = %name, error = %message, "Before phase failed, skipping iterations");
            failure = Some(PhaseFailure::new(Phase::Before, message));
            lifecycle.advance(DriverState::Failed);
        }
    }

    if !lifecycle.is_failed() {
        for iteration in 1..=driver.iterations {
            lifecycle.advance(DriverState::TestRunning { iteration });

            let test = &mut driver.test;
            let mut timer = IterationTimer::start();
            let outcome = guarded(Phase::Test, || test(&mut timer));
            let elapsed = timer.finish();

            let result = match outcome {
                Ok(()) => {
                    tracing::info!(
                        driver = %name,
                        iteration = iteration,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Iteration passed"
                    );
                    IterationResult::passed(&name, iteration, elapsed)
                }
                Err(message) => {
                    tracing::warn!(
                        driver = %name,
                        iteration = iteration,
                        error = %message,
                        "Iteration failed"
                    );
                    IterationResult::failed(&name, iteration, elapsed, message)
                }
            };
            results.push(result);
        }
    }

    if let Some(after) = driver.after.as_mut() {
        if !lifecycle.is_failed() {
            lifecycle.advance(DriverState::AfterRunning);
        }
        if let Err(message) = guarded(Phase::After, after) {
            tracing::error!(driver = %name, error = %message, "After phase failed");
            failure.get_or_insert(PhaseFailure::new(Phase::After, message));
            if !lifecycle.is_failed() {
                lifecycle.advance(DriverState::Failed);
            }
        }
    }

    if !lifecycle.is_failed() {
        lifecycle.advance(DriverState::Done);
    }

    let report = DriverReport::from_results(name.clone(), driver.iterations, results, failure);
    tracing::info!(driver = %name, status = %report.status, "Driver finished");
    report
}

/// Owns the ordered driver list for one benchmark run.
pub struct BenchmarkFramework<'a> {
    commit_id: String,
    drivers: Vec<BenchmarkTestDriver<'a>>,
}

impl<'a> BenchmarkFramework<'a> {
    pub fn new(commit_id: impl Into<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
            drivers: Vec::new(),
        }
    }

    pub fn add_driver(&mut self, driver: BenchmarkTestDriver<'a>) {
        self.drivers.push(driver);
    }

    pub fn with_drivers(mut self, drivers: impl IntoIterator<Item = BenchmarkTestDriver<'a>>) -> Self {
        self.drivers.extend(drivers);
        self
    }

    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    /// Run every driver sequentially, in order, and collect the report.
    pub fn execute(&mut self) -> BenchmarkReport {
        let mut report = BenchmarkReport::new(self.commit_id.clone());
        for driver in &mut self.drivers {
            report.add_driver(run_driver(driver));
        }
        report
    }
}
