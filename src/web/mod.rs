//! Runtime control API consumed by the external UI.
//!
//! JSON only: worker status and start/stop/restart, plus read-only instance,
//! target-state and event views. The browser-facing UI itself lives
//! elsewhere.

pub mod handlers;
pub mod server;

pub use server::start_web_server;

use serde::Serialize;
use std::sync::Arc;

use crate::database::{Database, DisplayStatus, Instance, TargetState};
use crate::runtime::{RuntimeManager, WorkerStatus};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub runtime: Arc<RuntimeManager>,
}

impl AppState {
    pub fn new(db: Arc<Database>, runtime: Arc<RuntimeManager>) -> Self {
        Self { db, runtime }
    }
}

/// Instance rollup for the overview listing.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub instance_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub is_paused: bool,
    pub check_interval_seconds: i64,
    pub time_zone_id: String,
    pub worker: Option<WorkerStatus>,
    pub targets_total: usize,
    pub targets_up: usize,
    pub targets_down: usize,
    pub targets_degraded: usize,
}

/// One target joined with its state and the display projection.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStateView {
    pub target_id: i64,
    pub url: String,
    pub enabled: bool,
    pub status: String,
    pub state: TargetState,
}

pub fn summarize_instance(
    instance: &Instance,
    worker: Option<WorkerStatus>,
    states: &[(crate::database::Target, TargetState)],
) -> InstanceSummary {
    let mut up = 0;
    let mut down = 0;
    let mut degraded = 0;
    for (_, state) in states {
        match state.display_status() {
            DisplayStatus::Up => up += 1,
            DisplayStatus::Down => down += 1,
            DisplayStatus::Degraded => degraded += 1,
        }
    }

    InstanceSummary {
        instance_id: instance.instance_id.clone(),
        display_name: instance.display_name.clone(),
        enabled: instance.enabled,
        is_paused: instance.is_paused,
        check_interval_seconds: instance.check_interval_seconds,
        time_zone_id: instance.time_zone_id.clone(),
        worker,
        targets_total: states.len(),
        targets_up: up,
        targets_down: down,
        targets_degraded: degraded,
    }
}

pub fn display_status_label(status: DisplayStatus) -> &'static str {
    match status {
        DisplayStatus::Up => "Up",
        DisplayStatus::Down => "Down",
        DisplayStatus::Degraded => "Degraded",
    }
}
