// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Task scheduler for the periodic timer sweep and idle eviction

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

type TaskFn = Arc<dyn Fn() + Send + Sync + 'static>;

struct ScheduledTask {
    interval: Duration,
    task: TaskFn,
    enabled: Arc<AtomicBool>,
}

pub struct Scheduler {
    tasks: Arc<RwLock<HashMap<String, ScheduledTask>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add_task<F>(&self, name: &str, interval: Duration, task: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut tasks = self.tasks.write().await;
        tasks.insert(
            name.to_string(),
            ScheduledTask {
                interval,
                task: Arc::new(task),
                enabled: Arc::new(AtomicBool::new(true)),
            },
        );
        debug!("Scheduled task '{}' with interval {:?}", name, interval);
    }

    pub async fn remove_task(&self, name: &str) {
        let mut tasks = self.tasks.write().await;
        tasks.remove(name);
    }

    /// Pause or resume a task, also while it is running
    pub async fn enable_task(&self, name: &str, enabled: bool) {
        let tasks = self.tasks.read().await;
        if let Some(task) = tasks.get(name) {
            task.enabled.store(enabled, Ordering::Relaxed);
        }
    }

    pub async fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Spawn one ticking loop per task until `shutdown` fires
    pub async fn start(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let tasks = self.tasks.read().await;
        let mut handles = Vec::with_capacity(tasks.len());

        for (name, scheduled) in tasks.iter() {
            let name = name.clone();
            let period = scheduled.interval;
            let task = scheduled.task.clone();
            let enabled = scheduled.enabled.clone();
            let mut shutdown_rx = shutdown.subscribe();

            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // First tick completes immediately.
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if enabled.load(Ordering::Relaxed) {
                                trace!("Running scheduled task '{}'", name);
                                task();
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            debug!("Scheduled task '{}' stopped", name);
                            break;
                        }
                    }
                }
            }));
        }

        handles
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
