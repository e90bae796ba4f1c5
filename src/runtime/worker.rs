//! The per-instance scheduler loop: one probe cycle, then sleep the
//! instance's interval, cancellable at both points.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, warn};

use super::{WorkerMap, WorkerState};
use crate::constants::runtime::MISSING_INSTANCE_RETRY_SECONDS;
use crate::database::Database;
use crate::probe::ProbeEngine;

pub(super) async fn run_instance_loop(
    db: Arc<Database>,
    engine: Arc<ProbeEngine>,
    workers: WorkerMap,
    instance_id: String,
    stop_tx: broadcast::Sender<()>,
) {
    let mut stop_rx = stop_tx.subscribe();

    loop {
        let delay = match run_cycle(&db, &engine, &instance_id, &stop_tx).await {
            Ok(seconds) => seconds,
            Err(e) => {
                // The loop is expected to run forever; an error escaping the
                // cycle means something is genuinely broken. Surface it in
                // the worker status and stop.
                error!("Probe loop for {} crashed: {}", instance_id, e);
                mark_crashed(&workers, &instance_id, &e).await;
                return;
            }
        };

        tokio::select! {
            _ = stop_rx.recv() => {
                debug!("Probe loop for {} cancelled", instance_id);
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
        }
    }
}

/// One probe cycle. Returns the number of seconds to sleep before the next.
async fn run_cycle(
    db: &Arc<Database>,
    engine: &Arc<ProbeEngine>,
    instance_id: &str,
    stop_tx: &broadcast::Sender<()>,
) -> Result<u64> {
    let Some(instance) = db.get_instance(instance_id).await? else {
        debug!("Instance {} missing, retrying later", instance_id);
        return Ok(MISSING_INSTANCE_RETRY_SECONDS);
    };
    if !instance.enabled {
        return Ok(MISSING_INSTANCE_RETRY_SECONDS);
    }

    let interval = instance.check_interval_seconds.max(1) as u64;

    // A paused instance keeps polling its row so it can auto-resume when the
    // pause window lapses.
    if instance.is_paused_at(Utc::now()) {
        debug!("Instance {} is paused", instance_id);
        return Ok(interval);
    }

    let targets = db.enabled_targets(instance_id).await?;
    if targets.is_empty() {
        return Ok(interval);
    }

    let semaphore = Arc::new(Semaphore::new(instance.concurrency_limit.max(1) as usize));
    let mut tasks = Vec::with_capacity(targets.len());
    for target in targets {
        let semaphore = semaphore.clone();
        let engine = engine.clone();
        let mut stop_rx = stop_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return None,
            };
            tokio::select! {
                _ = stop_rx.recv() => None,
                result = engine.probe(&target) => Some(result),
            }
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => warn!("Probe task for {} panicked: {}", instance_id, e),
        }
    }

    // A failed persist drops the batch; the scheduler must keep ticking.
    if let Err(e) = db.persist_cycle(&results).await {
        error!(
            "Failed to persist cycle for {} ({} results): {}",
            instance_id,
            results.len(),
            e
        );
    }

    Ok(interval)
}

async fn mark_crashed(workers: &WorkerMap, instance_id: &str, error: &anyhow::Error) {
    let mut workers = workers.write().await;
    if let Some(worker) = workers.get_mut(instance_id) {
        worker.state = WorkerState::Paused;
        worker.since_utc = Utc::now();
        worker.message = format!("Crashed: {error}");
    }
}
