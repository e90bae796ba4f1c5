//! Per-instance scheduler workers and the runtime manager that owns them.
//!
//! A Worker pairs a broadcast stop channel with the task running the
//! instance's probe loop. Stopped workers are retained so their status stays
//! queryable, and `start` reuses the slot.

mod worker;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::constants::runtime::STOP_WAIT;
use crate::database::Database;
use crate::probe::ProbeEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Running,
    Paused,
}

/// Status snapshot for the control surface and the alert evaluator.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub instance_id: String,
    pub state: WorkerState,
    pub since_utc: DateTime<Utc>,
    pub message: String,
}

pub(crate) struct Worker {
    state: WorkerState,
    since_utc: DateTime<Utc>,
    message: String,
    stop_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn status(&self, instance_id: &str) -> WorkerStatus {
        WorkerStatus {
            instance_id: instance_id.to_string(),
            state: self.state,
            since_utc: self.since_utc,
            message: self.message.clone(),
        }
    }

    fn task_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

pub(crate) type WorkerMap = Arc<RwLock<HashMap<String, Worker>>>;

pub struct RuntimeManager {
    workers: WorkerMap,
    db: Arc<Database>,
    engine: Arc<ProbeEngine>,
}

impl RuntimeManager {
    pub fn new(db: Arc<Database>, engine: Arc<ProbeEngine>) -> Self {
        Self {
            workers: Arc::new(RwLock::new(HashMap::new())),
            db,
            engine,
        }
    }

    /// Start (or reuse) the worker for an instance. Already running with a
    /// live task is a no-op; otherwise the slot gets a fresh stop channel
    /// and a newly spawned loop.
    pub async fn start(&self, instance_id: &str) -> Result<()> {
        let mut workers = self.workers.write().await;

        if let Some(worker) = workers.get(instance_id) {
            if worker.state == WorkerState::Running && worker.task_alive() {
                return Ok(());
            }
        }

        let (stop_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(worker::run_instance_loop(
            self.db.clone(),
            self.engine.clone(),
            self.workers.clone(),
            instance_id.to_string(),
            stop_tx.clone(),
        ));

        workers.insert(
            instance_id.to_string(),
            Worker {
                state: WorkerState::Running,
                since_utc: Utc::now(),
                message: "Started".to_string(),
                stop_tx,
                handle: Some(handle),
            },
        );

        info!("Worker started for instance {}", instance_id);
        Ok(())
    }

    /// Stop an instance's worker: mark it paused, cancel the loop, and wait
    /// at most five seconds so the caller never hangs.
    pub async fn stop(&self, instance_id: &str) -> Result<()> {
        let handle = {
            let mut workers = self.workers.write().await;
            let Some(worker) = workers.get_mut(instance_id) else {
                return Ok(());
            };
            worker.state = WorkerState::Paused;
            worker.since_utc = Utc::now();
            worker.message = "Stopped".to_string();
            let _ = worker.stop_tx.send(());
            worker.handle.take()
        };

        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_WAIT, handle).await.is_err() {
                warn!(
                    "Worker for {} did not stop within {:?}; detaching",
                    instance_id, STOP_WAIT
                );
            }
        }

        info!("Worker stopped for instance {}", instance_id);
        Ok(())
    }

    pub async fn restart(&self, instance_id: &str) -> Result<()> {
        self.stop(instance_id).await?;
        self.start(instance_id).await
    }

    pub async fn try_get(&self, instance_id: &str) -> Option<WorkerStatus> {
        let workers = self.workers.read().await;
        workers.get(instance_id).map(|w| w.status(instance_id))
    }

    pub async fn get_all(&self) -> Vec<WorkerStatus> {
        let workers = self.workers.read().await;
        let mut statuses: Vec<WorkerStatus> = workers
            .iter()
            .map(|(id, worker)| worker.status(id))
            .collect();
        statuses.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        statuses
    }

    /// Boot-time pass: start every enabled instance.
    pub async fn autostart(&self) -> Result<usize> {
        let instances = self.db.list_enabled_instances().await?;
        let mut started = 0;
        for instance in &instances {
            if let Err(e) = self.start(&instance.instance_id).await {
                warn!("Autostart failed for {}: {}", instance.instance_id, e);
            } else {
                started += 1;
            }
        }
        info!("Autostart launched {} of {} instances", started, instances.len());
        Ok(started)
    }
}
