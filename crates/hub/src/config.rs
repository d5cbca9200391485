//! TOML config file loading, validation, and database seeding for users and
//! plants.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::db::{plant_name_key, Db, NewPlant};
use crate::notify::NotifyPolicy;
use crate::scheduler::SchedulerSettings;
use crate::sim::{BandWeights, SampleGenerator};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub plants: Vec<PlantEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub enabled: bool,
    pub interval_hours: u64,
    pub retry_minutes: u64,
    pub notify_policy: NotifyPolicy,
    /// Fixed seed for reproducible demo data.
    pub seed: Option<u64>,
    pub weights: BandWeights,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 6,
            retry_minutes: 5,
            notify_policy: NotifyPolicy::default(),
            seed: None,
            weights: BandWeights::default(),
        }
    }
}

impl SamplerConfig {
    /// Only meaningful on a validated config; out-of-range values saturate.
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_secs(self.interval_secs().unwrap_or(u64::MAX)),
            retry: Duration::from_secs(self.retry_secs().unwrap_or(u64::MAX)),
            policy: self.notify_policy,
        }
    }

    fn interval_secs(&self) -> Option<u64> {
        self.interval_hours.checked_mul(60 * 60)
    }

    fn retry_secs(&self) -> Option<u64> {
        self.retry_minutes.checked_mul(60)
    }

    /// Build a generator.  `stream` separates generators built from the same
    /// seed so they don't replay identical readings.
    pub fn generator(&self, stream: u64) -> SampleGenerator {
        let rng = match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed.wrapping_add(stream)),
            None => fastrand::Rng::new(),
        };
        SampleGenerator::with_weights(rng, self.weights)
    }
}

#[derive(Debug, Deserialize)]
pub struct UserEntry {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct PlantEntry {
    pub plant_id: i64,
    pub name: String,
    #[serde(default)]
    pub plant_type: Option<String>,
    pub user_id: i64,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_sampler(&mut errors);
        self.validate_users(&mut errors);
        self.validate_plants(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_sampler(&self, errors: &mut Vec<String>) {
        let s = &self.sampler;
        if s.interval_hours == 0 {
            errors.push("sampler: interval_hours must be positive".to_string());
        }
        if s.retry_minutes == 0 {
            errors.push("sampler: retry_minutes must be positive".to_string());
        }
        match (s.interval_secs(), s.retry_secs()) {
            (None, _) => errors.push(format!(
                "sampler: interval_hours too large, got {}",
                s.interval_hours
            )),
            (_, None) => errors.push(format!(
                "sampler: retry_minutes too large, got {}",
                s.retry_minutes
            )),
            (Some(interval), Some(retry)) if interval > 0 && retry > interval => {
                errors.push(format!(
                    "sampler: retry_minutes ({}) exceeds the sampling interval ({}h)",
                    s.retry_minutes, s.interval_hours
                ));
            }
            _ => {}
        }
        if s.weights.total() == 0 {
            errors.push("sampler.weights: at least one weight must be positive".to_string());
        }
    }

    fn validate_users(&self, errors: &mut Vec<String>) {
        let mut seen_ids: HashSet<i64> = HashSet::new();
        let mut seen_names: HashSet<&str> = HashSet::new();

        for (i, u) in self.users.iter().enumerate() {
            let ctx = format!("users[{i}]");

            if u.user_id <= 0 {
                errors.push(format!("{ctx}: user_id must be positive, got {}", u.user_id));
            } else if !seen_ids.insert(u.user_id) {
                errors.push(format!("{ctx}: duplicate user_id {}", u.user_id));
            }

            let name = u.username.trim();
            if name.is_empty() {
                errors.push(format!("{ctx}: username is empty"));
            } else if !seen_names.insert(name) {
                errors.push(format!("{ctx}: duplicate username '{name}'"));
            }
        }
    }

    fn validate_plants(&self, errors: &mut Vec<String>) {
        let user_ids: HashSet<i64> = self.users.iter().map(|u| u.user_id).collect();
        let mut seen_ids: HashSet<i64> = HashSet::new();
        let mut seen_names: HashSet<(i64, String)> = HashSet::new();

        for (i, p) in self.plants.iter().enumerate() {
            let ctx = if p.name.trim().is_empty() {
                format!("plants[{i}]")
            } else {
                format!("plant '{}'", p.name)
            };

            if p.plant_id <= 0 {
                errors.push(format!("{ctx}: plant_id must be positive, got {}", p.plant_id));
            } else if !seen_ids.insert(p.plant_id) {
                errors.push(format!("{ctx}: duplicate plant_id {}", p.plant_id));
            }

            if p.name.trim().is_empty() {
                errors.push(format!("{ctx}: name is empty"));
            } else if !seen_names.insert((p.user_id, plant_name_key(&p.name))) {
                errors.push(format!(
                    "{ctx}: user {} already has a plant with this name",
                    p.user_id
                ));
            }

            if !user_ids.contains(&p.user_id) {
                errors.push(format!(
                    "{ctx}: user_id {} does not match any defined user",
                    p.user_id
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load + apply
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    parse(&contents).with_context(|| format!("invalid config: {path}"))
}

pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse config")?;
    config.validate()?;
    Ok(config)
}

/// Upsert all seed users and plants from the config into the database.
pub async fn apply(config: &Config, db: &Db) -> Result<()> {
    for u in &config.users {
        db.upsert_user(u.user_id, u.username.trim())
            .await
            .with_context(|| format!("failed to upsert user {}", u.user_id))?;
    }

    for p in &config.plants {
        db.upsert_plant(
            p.plant_id,
            &NewPlant {
                name: Some(p.name.clone()),
                plant_type: p.plant_type.clone(),
                user_id: p.user_id,
            },
        )
        .await
        .with_context(|| format!("failed to upsert plant {}", p.plant_id))?;
    }

    tracing::info!(
        users = config.users.len(),
        plants = config.plants.len(),
        "config applied"
    );

    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
