//! Background sampler: periodically logs a simulated reading for a random
//! plant and runs it through the notification pipeline.
//!
//! ```text
//! Idle ──▶ Sampling ──[ok / no plants]──▶ Waiting(interval) ──▶ Sampling ...
//!              │
//!              └──[error]──▶ Waiting(retry) ──▶ Sampling ...
//! ```
//!
//! The loop only ends when the shutdown signal fires, which is honoured
//! during either wait.  Store failures never escape the loop.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::db::{now_unix, Db};
use crate::monitor::{record_reading, ReadingOutcome};
use crate::notify::NotifyPolicy;
use crate::sim::SampleGenerator;
use crate::state::SharedState;

/// Wait after a finished cycle.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Wait after a failed cycle.
pub const DEFAULT_RETRY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub retry: Duration,
    pub policy: NotifyPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            retry: DEFAULT_RETRY,
            policy: NotifyPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// No plants exist yet; nothing was sampled.
    NoPlants,
    Sampled {
        plant_id: i64,
        outcome: ReadingOutcome,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the sampling loop until `shutdown` is set to `true` (or its sender is
/// dropped).  Intended to be `tokio::spawn`-ed from main.
pub async fn run(
    db: Db,
    mut sampler: SampleGenerator,
    settings: SchedulerSettings,
    shared: SharedState,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_sec = settings.interval.as_secs(),
        retry_sec = settings.retry.as_secs(),
        policy = ?settings.policy,
        "scheduler started"
    );
    shared
        .write()
        .await
        .record_scheduler("scheduler started".to_string());

    loop {
        if *shutdown.borrow() {
            break;
        }

        let wait = match run_cycle(&db, &mut sampler, settings.policy, &shared).await {
            Ok(outcome) => {
                match outcome {
                    CycleOutcome::Sampled { plant_id, outcome } => info!(
                        plant_id,
                        status = %outcome.status,
                        notified = outcome.notification_id.is_some(),
                        "scheduler: cycle complete"
                    ),
                    CycleOutcome::NoPlants => {}
                }
                info!("scheduler: next cycle in {}s", settings.interval.as_secs());
                shared.write().await.record_cycle_ok();
                settings.interval
            }
            Err(e) => {
                error!("scheduler: cycle failed: {e:#}. retrying in {}s", settings.retry.as_secs());
                shared
                    .write()
                    .await
                    .record_cycle_failed(format!("sampling cycle failed: {e:#}"));
                settings.retry
            }
        };

        if wait_or_shutdown(wait, &mut shutdown).await {
            break;
        }
    }

    info!("scheduler stopped");
    shared
        .write()
        .await
        .record_scheduler("scheduler stopped".to_string());
}

/// Sleep for `wait`.  Returns `true` as soon as shutdown is requested or the
/// sender is gone; any other change on the channel leaves the deadline as is.
async fn wait_or_shutdown(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(wait);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// One cycle
// ---------------------------------------------------------------------------

/// Pick a random plant, log a simulated reading for it and dispatch any
/// notification.  Errors are store failures; the caller decides on retry.
pub async fn run_cycle(
    db: &Db,
    sampler: &mut SampleGenerator,
    policy: NotifyPolicy,
    shared: &SharedState,
) -> Result<CycleOutcome> {
    let plant_ids = db.list_plant_ids().await?;
    let Some(plant_id) = sampler.choose(&plant_ids) else {
        warn!("scheduler: no plants found, skipping cycle");
        shared
            .write()
            .await
            .record_scheduler("no plants to sample".to_string());
        return Ok(CycleOutcome::NoPlants);
    };

    let plant = db
        .get_plant(plant_id)
        .await?
        .with_context(|| format!("plant {plant_id} disappeared during cycle"))?;

    let reading = sampler.generate(now_unix());
    let outcome = record_reading(db, &plant, reading, policy).await?;

    {
        let mut st = shared.write().await;
        st.record_reading(plant_id, outcome.reading, outcome.status);
        if let Some(id) = outcome.notification_id {
            st.record_notification(plant_id, id, outcome.status.as_str());
        }
    }

    Ok(CycleOutcome::Sampled { plant_id, outcome })
}

// ===========================================================================
// Tests
// ===========================================================================
