// src/runtime.rs
//
// Periodic tick tasks.

use crate::config::IntervalsConfig;
use crate::resize::{BackgroundResizeQueue, WorkerPool};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Owns the interval tasks that drive the queue flush and the scheduler.
/// Dropping the ticker stops them.
#[derive(Debug, Default)]
pub struct Ticker {
    tasks: Vec<JoinHandle<()>>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush `queue` every `queue_flush_ms` and tick `pool` every
    /// `dispatch_ms`. Must be called inside a tokio runtime.
    pub fn start(queue: BackgroundResizeQueue, pool: WorkerPool, intervals: &IntervalsConfig) -> Self {
        Self::new()
            .every(intervals.queue_flush(), move || queue.tick())
            .every(intervals.dispatch(), move || pool.tick())
    }

    /// Call `tick` once per `period`. A late tick is not made up for.
    pub fn every<F>(mut self, period: Duration, tick: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick();
            }
        });
        self.tasks.push(task);
        self
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
