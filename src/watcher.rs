//! One watch task per target: resolve, sample, parse, record.
//!
//! Tasks are independent; a target that never appears or a sampler that
//! fails takes only its own task down. Results land in a shared map keyed
//! by resolved pid.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::GrapherConfig;
use crate::console::Console;
use crate::sampler::SamplerCommand;
use crate::series::{parse_sampler_output, SampleSeries};
use crate::signals::{StopController, StopToken};
use crate::target::{ResolveError, TargetResolver, WatchTarget};

/// A running group of watch tasks sharing one stop controller.
pub struct WatchSet {
    tasks: Vec<WatchHandle>,
    controller: StopController,
    results: Arc<Mutex<HashMap<i32, SampleSeries>>>,
    liveness_poll: Duration,
}

struct WatchHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl WatchSet {
    /// Spawn one task per target. Tasks start resolving immediately.
    pub fn spawn(
        targets: Vec<WatchTarget>,
        sampler: SamplerCommand,
        config: &GrapherConfig,
        console: Console,
    ) -> WatchSet {
        let controller = StopController::new();
        let results: Arc<Mutex<HashMap<i32, SampleSeries>>> = Arc::default();
        let resolver = TargetResolver::from_config(&config.resolver);

        let mut tasks = Vec::with_capacity(targets.len());
        for (index, target) in targets.into_iter().enumerate() {
            let name = format!("watch-{index}");
            let task = WatchTask {
                name: name.clone(),
                target,
                resolver: resolver.clone(),
                sampler: sampler.clone(),
                console: console.clone(),
                stop: controller.subscribe(),
                results: Arc::clone(&results),
            };
            tracing::debug!(task = %name, "spawning watch task");
            let handle = tokio::spawn(task.run());
            tasks.push(WatchHandle { name, handle });
        }

        WatchSet {
            tasks,
            controller,
            results,
            liveness_poll: Duration::from_millis(config.watcher.liveness_poll_ms),
        }
    }

    /// A stop controller for wiring up signal handlers.
    pub fn stop_handle(&self) -> StopController {
        self.controller.clone()
    }

    /// Wait until every task has finished, then hand back the collected
    /// series. Panicked tasks are logged and skipped.
    pub async fn wait(self) -> HashMap<i32, SampleSeries> {
        loop {
            if self.tasks.iter().all(|task| task.handle.is_finished()) {
                break;
            }
            tokio::time::sleep(self.liveness_poll).await;
        }
        for task in self.tasks {
            if let Err(e) = task.handle.await {
                tracing::error!(task = %task.name, error = %e, "watch task panicked");
            }
        }
        std::mem::take(&mut *self.results.lock().unwrap())
    }
}

struct WatchTask {
    name: String,
    target: WatchTarget,
    resolver: TargetResolver,
    sampler: SamplerCommand,
    console: Console,
    stop: StopToken,
    results: Arc<Mutex<HashMap<i32, SampleSeries>>>,
}

impl WatchTask {
    async fn run(mut self) {
        self.console
            .line(&self.name, &format!("start watching {}", self.target));

        let pid = match self
            .resolver
            .resolve(&self.target, &self.console, &self.name, &mut self.stop)
            .await
        {
            Ok(pid) => pid,
            Err(ResolveError::Cancelled) => {
                self.console
                    .line(&self.name, &format!("aborted while waiting for {}", self.target));
                return;
            }
            // The resolver already reported the failed attempts.
            Err(ResolveError::NotFound { .. }) => return,
            Err(ResolveError::Pattern(e)) => {
                tracing::warn!(task = %self.name, error = %e, "rejecting target");
                self.console
                    .line(&self.name, &format!("invalid {}: {e}", self.target));
                return;
            }
        };

        // A stop can race the final resolve; never start a sampler we would
        // immediately have to kill.
        if self.stop.is_stopped() {
            return;
        }

        let raw = match self.sampler.sample(pid, &mut self.stop).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(task = %self.name, pid, error = %e, "sampler failed");
                self.console
                    .line(&self.name, &format!("sampler failed for pid {pid}"));
                return;
            }
        };

        match parse_sampler_output(&raw) {
            Some(series) => {
                self.console.line(
                    &self.name,
                    &format!("stop watching pid {pid} ({} samples)", series.len()),
                );
                self.results.lock().unwrap().insert(pid, series);
            }
            None => {
                self.console
                    .line(&self.name, &format!("no samples captured for pid {pid}"));
            }
        }
    }
}
