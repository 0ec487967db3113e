// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pull and run scenarios built from image matrix rows.
//!
//! Per row, in row order: `OverlayFSPull<short>` and `OverlayFSRun<short>`,
//! then `SociRPull<short>` and `SociRun<short>` when the row carries an index
//! digest. Rows with a ready line add `<prefix>RunPrePull<short>` after each
//! backend's run driver.

use snapbench_core::process::{Poller, SystemPoller};
use snapbench_core::runtime::Image;
use snapbench_core::{Backend, BenchConfig, ImageDescriptor, ReadinessWaiter, RuntimeClient};

use crate::harness::{BenchmarkTestDriver, IterationTimer, PhaseError, PhaseResult, Scenario};

/// Driver name for a pull scenario, e.g. `OverlayFSPullAlpine`.
pub fn pull_driver_name(backend: Backend, short_name: &str) -> String {
    let verb = match backend {
        Backend::OverlayFs => "Pull",
        Backend::Lazy => "RPull",
    };
    format!("{}{}{}", backend.driver_prefix(), verb, short_name)
}

/// Driver name for a run scenario, e.g. `SociRunAlpine`.
pub fn run_driver_name(backend: Backend, short_name: &str) -> String {
    format!("{}Run{}", backend.driver_prefix(), short_name)
}

/// Driver name for a pre-pulled, run-until-ready scenario, e.g.
/// `OverlayFSRunPrePullNginx`.
pub fn prepull_driver_name(backend: Backend, short_name: &str) -> String {
    format!("{}RunPrePull{}", backend.driver_prefix(), short_name)
}

/// Times the pull alone against a freshly started daemon each iteration.
pub struct PullScenario<'a, P: Poller = SystemPoller> {
    config: &'a BenchConfig,
    image: ImageDescriptor,
    backend: Backend,
    waiter: ReadinessWaiter<P>,
}

impl<'a> PullScenario<'a> {
    pub fn new(config: &'a BenchConfig, image: ImageDescriptor, backend: Backend) -> Self {
        Self {
            config,
            image,
            backend,
            waiter: ReadinessWaiter::system(),
        }
    }
}

impl<P: Poller> Scenario for PullScenario<'_, P> {
    fn test(&mut self, timer: &mut IterationTimer) -> PhaseResult {
        let client = RuntimeClient::start(self.config, self.backend, &self.waiter)?;

        timer.reset();
        let pulled = client.pull_image(&self.image);
        timer.stop();

        // Daemons are torn down when `client` drops, outside the timed window
        pulled?;
        Ok(())
    }
}

/// Pulls once in `before`, then times one container run per iteration.
pub struct RunScenario<'a, P: Poller = SystemPoller> {
    config: &'a BenchConfig,
    image: ImageDescriptor,
    backend: Backend,
    waiter: ReadinessWaiter<P>,
    prepared: Option<(RuntimeClient, Image)>,
}

impl<'a> RunScenario<'a> {
    pub fn new(config: &'a BenchConfig, image: ImageDescriptor, backend: Backend) -> Self {
        Self {
            config,
            image,
            backend,
            waiter: ReadinessWaiter::system(),
            prepared: None,
        }
    }
}

impl<P: Poller> Scenario for RunScenario<'_, P> {
    fn before(&mut self) -> PhaseResult {
        let client = RuntimeClient::start(self.config, self.backend, &self.waiter)?;
        let image = client.pull_image(&self.image)?;
        self.prepared = Some((client, image));
        Ok(())
    }

    fn test(&mut self, _timer: &mut IterationTimer) -> PhaseResult {
        let (client, image) = self
            .prepared
            .as_ref()
            .ok_or(PhaseError::NotPrepared { what: "runtime client" })?;
        client.run_container(image)?;
        Ok(())
    }

    fn after(&mut self) -> PhaseResult {
        if let Some((mut client, _)) = self.prepared.take() {
            client.stop();
        }
        Ok(())
    }
}

/// Times how long a container takes to print its ready line once the image
/// is pulled and a warm-up container from it is already serving.
///
/// Every iteration gets fresh daemons; only the second start is timed.
pub struct PrePullRunScenario<'a, P: Poller = SystemPoller> {
    config: &'a BenchConfig,
    image: ImageDescriptor,
    ready_line: String,
    backend: Backend,
    waiter: ReadinessWaiter<P>,
}

impl<'a> PrePullRunScenario<'a> {
    pub fn new(
        config: &'a BenchConfig,
        image: ImageDescriptor,
        ready_line: impl Into<String>,
        backend: Backend,
    ) -> Self {
        Self {
            config,
            image,
            ready_line: ready_line.into(),
            backend,
            waiter: ReadinessWaiter::system(),
        }
    }
}

impl<P: Poller> Scenario for PrePullRunScenario<'_, P> {
    fn test(&mut self, timer: &mut IterationTimer) -> PhaseResult {
        let client = RuntimeClient::start(self.config, self.backend, &self.waiter)?;
        let image = client.pull_image(&self.image)?;
        let _warm = client.start_until_ready(&image, &self.ready_line)?;

        timer.reset();
        let started = client.start_until_ready(&image, &self.ready_line);
        timer.stop();

        // Both containers are removed before `client` stops the daemons
        started?.cleanup()?;
        Ok(())
    }
}

fn backends_for(image: &ImageDescriptor) -> &'static [Backend] {
    if image.index_digest.is_some() {
        &[Backend::OverlayFs, Backend::Lazy]
    } else {
        &[Backend::OverlayFs]
    }
}

/// Build every driver for the matrix, in row order.
pub fn build_drivers<'a>(
    config: &'a BenchConfig,
    images: &[ImageDescriptor],
) -> Vec<BenchmarkTestDriver<'a>> {
    let mut drivers = Vec::new();
    for image in images {
        for &backend in backends_for(image) {
            drivers.push(BenchmarkTestDriver::from_scenario(
                pull_driver_name(backend, &image.short_name),
                config.iterations,
                PullScenario::new(config, image.clone(), backend),
            ));
            drivers.push(BenchmarkTestDriver::from_scenario(
                run_driver_name(backend, &image.short_name),
                config.iterations,
                RunScenario::new(config, image.clone(), backend),
            ));
            if let Some(ready_line) = &image.ready_line {
                drivers.push(BenchmarkTestDriver::from_scenario(
                    prepull_driver_name(backend, &image.short_name),
                    config.iterations,
                    PrePullRunScenario::new(config, image.clone(), ready_line.clone(), backend),
                ));
            }
        }
    }
    tracing::debug!(drivers = drivers.len(), rows = images.len(), "Built drivers");
    drivers
}
