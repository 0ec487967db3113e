// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Driver execution guarantees of the benchmark framework.

use std::cell::RefCell;
use std::thread;
use std::time::Duration;

use snapbench_benchmark::{
    BenchmarkFramework, BenchmarkTestDriver, DriverStatus, JsonReporter, Phase, PhaseError,
};
use snapbench_core::{BenchError, ConfigError, StartError};
use tempfile::TempDir;

fn start_failure() -> PhaseError {
    PhaseError::Bench(BenchError::Start(StartError::Spawn {
        program: "containerd".into(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
    }))
}

#[test]
fn test_before_failure_skips_tests_but_runs_after() {
    let events = RefCell::new(Vec::new());
    let log = |event: &str| events.borrow_mut().push(event.to_string());

    let mut framework = BenchmarkFramework::new("c1");
    framework.add_driver(
        BenchmarkTestDriver::new("Broken", 5, |_| {
            log("broken:test");
            Ok(())
        })
        .before(|| {
            log("broken:before");
            Err(start_failure())
        })
        .after(|| {
            log("broken:after");
            Ok(())
        }),
    );
    framework.add_driver(BenchmarkTestDriver::new("Healthy", 2, |_| {
        log("healthy:test");
        Ok(())
    }));

    let report = framework.execute();

    assert_eq!(
        *events.borrow(),
        vec!["broken:before", "broken:after", "healthy:test", "healthy:test"]
    );

    let broken = report.driver("Broken").unwrap();
    assert_eq!(broken.status, DriverStatus::Failed);
    assert!(broken.results.is_empty());
    let failure = broken.failure.as_ref().unwrap();
    assert_eq!(failure.phase, Phase::Before);
    assert!(failure.message.contains("containerd"));

    assert_eq!(report.driver("Healthy").unwrap().status, DriverStatus::Passed);
}

#[test]
fn test_failed_iteration_consumes_its_slot() {
    let events = RefCell::new(Vec::new());
    let mut calls = 0u32;

    let mut framework = BenchmarkFramework::new("c1");
    framework.add_driver(
        BenchmarkTestDriver::new("Flaky", 6, |_| {
            calls += 1;
            events.borrow_mut().push(format!("test{}", calls));
            if calls == 3 {
                Err(PhaseError::Bench(BenchError::Config(ConfigError::Parse {
                    message: "transient".into(),
                })))
            } else {
                Ok(())
            }
        })
        .after(|| {
            events.borrow_mut().push("after".to_string());
            Ok(())
        }),
    );

    let report = framework.execute();
    let flaky = report.driver("Flaky").unwrap();

    assert_eq!(flaky.results.len(), 6);
    for (index, result) in flaky.results.iter().enumerate() {
        assert_eq!(result.iteration as usize, index + 1);
        assert_eq!(result.passed, index != 2, "iteration {}", index + 1);
    }
    assert!(flaky.results[2].error.as_deref().unwrap().contains("transient"));
    assert_eq!(flaky.status, DriverStatus::Degraded);
    assert_eq!(flaky.latency.as_ref().unwrap().count, 5);

    let events = events.borrow();
    assert_eq!(events.last().map(String::as_str), Some("after"));
    assert_eq!(events.iter().filter(|e| *e == "after").count(), 1);
}

#[test]
fn test_drivers_never_overlap() {
    let events = RefCell::new(Vec::new());
    let log = |event: String| events.borrow_mut().push(event);

    let mut framework = BenchmarkFramework::new("c1");
    for name in ["A", "B", "C"] {
        framework.add_driver(
            BenchmarkTestDriver::new(name, 2, move |_| {
                log(format!("{name}:test"));
                Ok(())
            })
            .before(move || {
                log(format!("{name}:before"));
                Ok(())
            })
            .after(move || {
                log(format!("{name}:after"));
                Ok(())
            }),
        );
    }

    let report = framework.execute();
    let names: Vec<&str> = report.drivers.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);

    let expected: Vec<String> = ["A", "B", "C"]
        .iter()
        .flat_map(|n| {
            [
                format!("{n}:before"),
                format!("{n}:test"),
                format!("{n}:test"),
                format!("{n}:after"),
            ]
        })
        .collect();
    assert_eq!(*events.borrow(), expected);
}

#[test]
fn test_after_failure_keeps_iteration_data() {
    let mut framework = BenchmarkFramework::new("c1");
    framework.add_driver(
        BenchmarkTestDriver::new("Leaky", 2, |_| Ok(())).after(|| Err(start_failure())),
    );

    let report = framework.execute();
    let leaky = report.driver("Leaky").unwrap();
    assert_eq!(leaky.status, DriverStatus::Failed);
    assert_eq!(leaky.passed_count(), 2);
    assert_eq!(leaky.failure.as_ref().unwrap().phase, Phase::After);
}

#[test]
fn test_timed_window_excludes_reset_setup_and_stopped_teardown() {
    let mut framework = BenchmarkFramework::new("c1");
    framework.add_driver(BenchmarkTestDriver::new("Windowed", 1, |timer| {
        thread::sleep(Duration::from_millis(50));
        timer.reset();
        thread::sleep(Duration::from_millis(10));
        timer.stop();
        thread::sleep(Duration::from_millis(50));
        Ok(())
    }));

    let report = framework.execute();
    let elapsed = report.durations("Windowed").unwrap()[0];
    assert!(elapsed >= Duration::from_millis(10));
    assert!(elapsed < Duration::from_millis(50), "measured {:?}", elapsed);
}

#[test]
fn test_report_written_after_all_drivers() {
    let temp = TempDir::new().unwrap();
    let reporter = JsonReporter::new(temp.path().join("output.json"));

    let mut framework = BenchmarkFramework::new("deadbeef");
    framework.add_driver(BenchmarkTestDriver::new("OverlayFSRunAlpine", 3, |_| Ok(())));
    framework.add_driver(
        BenchmarkTestDriver::new("SociRunAlpine", 3, |_| Ok(())).before(|| Err(start_failure())),
    );

    let report = framework.execute();
    let path = reporter.save(&report).unwrap();

    let loaded = JsonReporter::load(&path).unwrap();
    assert_eq!(loaded.commit_id, "deadbeef");
    assert_eq!(loaded.drivers.len(), 2);
    assert_eq!(loaded.durations("OverlayFSRunAlpine").unwrap().len(), 3);
    // Failed drivers are reported, not omitted
    assert_eq!(loaded.failed_drivers().count(), 1);
    assert!(loaded.driver("SociRunAlpine").unwrap().results.is_empty());
}
