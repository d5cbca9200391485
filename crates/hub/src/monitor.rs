//! Evaluate-and-dispatch pipeline shared by the background sampler and the
//! request handlers.
//!
//! A reading is logged first, then classified.  If the dispatch policy says
//! so and the owning user exists, a notification is composed and stored.

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{now_unix, Db, NewNotification, NewPlant, Plant};
use crate::notify::{compose, NotificationSeverity, NotifyPolicy};
use crate::status::{classify, PartialReading, SensorReading, SeverityClass};

#[derive(Debug, Clone, Serialize)]
pub struct ReadingOutcome {
    pub log_id: i64,
    pub reading: SensorReading,
    pub status: SeverityClass,
    pub notification_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlantStatus {
    pub plant: Plant,
    pub reading: SensorReading,
    pub status: SeverityClass,
    /// False when `reading` is the neutral placeholder for a plant that has
    /// never been sampled.
    pub has_readings: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registered {
    pub plant: Plant,
    #[serde(flatten)]
    pub outcome: ReadingOutcome,
}

/// Log `reading` for `plant`, classify it and dispatch a notification if
/// warranted.
pub async fn record_reading(
    db: &Db,
    plant: &Plant,
    reading: SensorReading,
    policy: NotifyPolicy,
) -> Result<ReadingOutcome> {
    let log_id = db.insert_reading(plant.plant_id, &reading).await?;
    let status = classify(&reading);

    info!(
        plant_id = plant.plant_id,
        temperature = reading.temperature,
        soil_moisture = reading.soil_moisture,
        air_humidity = reading.air_humidity,
        %status,
        "reading logged"
    );

    let notification_id = dispatch(db, plant, &reading, status, policy).await?;

    Ok(ReadingOutcome {
        log_id,
        reading,
        status,
        notification_id,
    })
}

/// Persist a notification for an already-classified reading.  Returns the
/// new notification id, or `None` when nothing was stored.
pub async fn dispatch(
    db: &Db,
    plant: &Plant,
    reading: &SensorReading,
    status: SeverityClass,
    policy: NotifyPolicy,
) -> Result<Option<i64>> {
    if !policy.should_notify(status) {
        return Ok(None);
    }
    let Some(severity) = NotificationSeverity::for_class(status) else {
        return Ok(None);
    };

    if db.get_user(plant.user_id).await?.is_none() {
        warn!(
            plant_id = plant.plant_id,
            user_id = plant.user_id,
            "owner not found, notification dropped"
        );
        return Ok(None);
    }

    let composed = compose(
        plant.name.as_deref(),
        reading,
        severity == NotificationSeverity::Critical,
    );

    let id = db
        .insert_notification(&NewNotification {
            plant_id: plant.plant_id,
            user_id: plant.user_id,
            ts: now_unix(),
            category: composed.category,
            severity,
            message: composed.message,
        })
        .await?;

    info!(
        plant_id = plant.plant_id,
        notification_id = id,
        category = %composed.category,
        %severity,
        "notification created"
    );

    Ok(Some(id))
}

/// Ingest an externally supplied reading.  Missing dimensions get neutral
/// defaults.
pub async fn ingest(
    db: &Db,
    plant: &Plant,
    partial: PartialReading,
    policy: NotifyPolicy,
) -> Result<ReadingOutcome> {
    record_reading(db, plant, partial.complete(now_unix()), policy).await
}

/// Latest status of a plant, or `None` if the plant does not exist.
pub async fn plant_status(db: &Db, plant_id: i64) -> Result<Option<PlantStatus>> {
    let Some(plant) = db.get_plant(plant_id).await? else {
        return Ok(None);
    };

    let (reading, has_readings) = match db.latest_reading(plant_id).await? {
        Some(r) => (r, true),
        None => (PartialReading::default().complete(now_unix()), false),
    };

    Ok(Some(PlantStatus {
        plant,
        status: classify(&reading),
        reading,
        has_readings,
    }))
}

/// Why a plant could not be registered.  Anything else is a store failure.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("user {0} does not exist")]
    UnknownUser(i64),

    #[error("you already have a plant named '{0}', please choose a different name")]
    NameTaken(String),
}

/// Create a plant and run `first` through the pipeline as its initial
/// reading.
pub async fn register_plant(
    db: &Db,
    new: &NewPlant,
    first: SensorReading,
    policy: NotifyPolicy,
) -> Result<Registered> {
    if db.get_user(new.user_id).await?.is_none() {
        return Err(RegisterError::UnknownUser(new.user_id).into());
    }
    if let Some(name) = new.name.as_deref() {
        if db.plant_name_taken(new.user_id, name).await? {
            return Err(RegisterError::NameTaken(name.trim().to_string()).into());
        }
    }

    let plant = db.create_plant(new).await?;
    info!(plant_id = plant.plant_id, user_id = plant.user_id, "plant registered");

    let outcome = record_reading(db, &plant, first, policy).await?;

    Ok(Registered { plant, outcome })
}

// ===========================================================================
// Tests
// ===========================================================================
