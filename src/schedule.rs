use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulePlan {
    /// 0 = run until the process is stopped.
    pub max_iterations: u32,
    pub sleep: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ScheduleSummary {
    pub runs: u64,
    pub failures: u64,
    pub sleeps: u64,
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration) -> impl Future<Output = ()>;
}

pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// True once `loop_count` (the next run's number) is past a finite cap.
fn limit_reached(max_iterations: u32, loop_count: u64) -> bool {
    max_iterations != 0 && loop_count > u64::from(max_iterations)
}

pub struct Scheduler<S> {
    plan: SchedulePlan,
    sleeper: S,
}

impl<S: Sleeper> Scheduler<S> {
    pub fn new(plan: SchedulePlan, sleeper: S) -> Self {
        Scheduler { plan, sleeper }
    }

    /// Run `work` on a fixed cadence: `plan.max_iterations` times (or forever
    /// when 0), sleeping `plan.sleep` between runs but not after the last.
    ///
    /// A failing run is logged and does not end the loop. `work` receives the
    /// 1-based loop count.
    pub async fn run<F, Fut>(&mut self, mut work: F) -> ScheduleSummary
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.plan.max_iterations == 0 {
            info!("Unlimited iterations");
        } else {
            info!("Iterations limited to: {}", self.plan.max_iterations);
        }

        let mut summary = ScheduleSummary::default();
        let mut iteration_flag = true;
        let mut loop_count: u64 = 1;

        while iteration_flag {
            info!("Loop-Cnt: {}", loop_count);

            if let Err(e) = work(loop_count).await {
                error!("Iteration {} failed: {:#}", loop_count, e);
                summary.failures += 1;
            }
            summary.runs += 1;

            loop_count += 1;

            if limit_reached(self.plan.max_iterations, loop_count) {
                info!("Maximum iterations reached - stop processing");
                iteration_flag = false;
            }

            if iteration_flag {
                info!("Sleep for: {} seconds", self.plan.sleep.as_secs());
                self.sleeper.sleep(self.plan.sleep).await;
                summary.sleeps += 1;
            }
        }

        summary
    }
}
