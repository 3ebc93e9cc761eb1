// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fixed-interval driver around [`FanController::poll`].
//!
//! Cycles run back to back on the calling task. Time spent inside a cycle
//! (blocking sensor calls included) is taken off the following sleep, and
//! shutdown is only observed while sleeping.

use crate::controller::FanController;
use crate::error::Result;
use crate::gateway::SensorGateway;
use crate::state::ControllerState;
use tokio::sync::Notify;
use tokio::time::{self, Duration, Instant};

/// Why [`PollLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured number of polls completed.
    IterationLimit(u64),
    /// Shutdown was requested after this many polls.
    Shutdown(u64),
}

pub struct PollLoop<G> {
    controller: FanController<G>,
    interval: Duration,
    /// 0 = unbounded
    max_iterations: u64,
}

impl<G: SensorGateway> PollLoop<G> {
    pub fn new(controller: FanController<G>, interval: Duration, max_iterations: u64) -> Self {
        Self {
            controller,
            interval,
            max_iterations,
        }
    }

    pub fn controller(&self) -> &FanController<G> {
        &self.controller
    }

    /// Poll until the iteration limit, a shutdown notification, or a fatal
    /// error. Recoverable cycle errors are logged by the controller and the
    /// next cycle starts clean.
    pub async fn run(&self, state: &mut ControllerState, shutdown: &Notify) -> Result<StopReason> {
        let mut iterations = 0u64;

        loop {
            let started = Instant::now();
            let report = self.controller.poll(state);
            iterations += 1;

            if let Err(e) = report.result {
                if e.is_fatal() {
                    log::error!("Stopping after fatal error");
                    return Err(e);
                }
            }

            if self.max_iterations > 0 && iterations >= self.max_iterations {
                log::info!("Completed {iterations} poll(s)");
                return Ok(StopReason::IterationLimit(iterations));
            }

            let delay = next_delay(self.interval, started.elapsed());
            if delay.is_zero() {
                log::warn!(
                    "Poll took longer than the {}s interval, starting next poll now",
                    self.interval.as_secs_f64()
                );
            }

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.notified() => {
                    log::info!("Poll loop shutting down");
                    return Ok(StopReason::Shutdown(iterations));
                }
            }
        }
    }
}

/// Time to wait before the next cycle: whatever is left of `interval` after
/// a cycle that took `elapsed`, never negative.
pub fn next_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}
