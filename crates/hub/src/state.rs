use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::status::{SensorReading, SeverityClass};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub sampler_enabled: bool,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub last_sample: Option<LastSample>,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct LastSample {
    pub plant_id: i64,
    pub reading: SensorReading,
    pub status: SeverityClass,
}

#[derive(Clone, Debug, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Reading,
    Notification,
    Scheduler,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub sampler_enabled: bool,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub last_sample: Option<LastSample>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(sampler_enabled: bool) -> Self {
        Self {
            started_at: Instant::now(),
            sampler_enabled,
            cycles_ok: 0,
            cycles_failed: 0,
            last_sample: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared(sampler_enabled: bool) -> SharedState {
        Arc::new(RwLock::new(Self::new(sampler_enabled)))
    }

    /// Record a logged reading and its classification.
    pub fn record_reading(&mut self, plant_id: i64, reading: SensorReading, status: SeverityClass) {
        self.push_event(
            EventKind::Reading,
            format!(
                "plant {plant_id}: {:.1}°C soil {:.1}% humidity {:.1}% ({status})",
                reading.temperature, reading.soil_moisture, reading.air_humidity
            ),
        );
        self.last_sample = Some(LastSample {
            plant_id,
            reading,
            status,
        });
    }

    pub fn record_notification(&mut self, plant_id: i64, notification_id: i64, detail: &str) {
        self.push_event(
            EventKind::Notification,
            format!("plant {plant_id}: notification #{notification_id}: {detail}"),
        );
    }

    /// A sampling cycle finished (including cycles skipped for lack of plants).
    pub fn record_cycle_ok(&mut self) {
        self.cycles_ok += 1;
    }

    pub fn record_cycle_failed(&mut self, detail: String) {
        self.cycles_failed += 1;
        self.push_event(EventKind::Error, detail);
    }

    pub fn record_scheduler(&mut self, detail: String) {
        self.push_event(EventKind::Scheduler, detail);
    }

    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            sampler_enabled: self.sampler_enabled,
            cycles_ok: self.cycles_ok,
            cycles_failed: self.cycles_failed,
            last_sample: self.last_sample.clone(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_is_bounded() {
        let mut st = SystemState::new(true);
        for i in 0..(MAX_EVENTS + 25) {
            st.record_system(format!("event {i}"));
        }
        assert_eq!(st.events.len(), MAX_EVENTS);
        assert_eq!(st.events.front().unwrap().detail, "event 25");
    }

    #[test]
    fn status_lists_newest_event_first() {
        let mut st = SystemState::new(false);
        st.record_system("first".into());
        st.record_cycle_failed("boom".into());
        let status = st.to_status();
        assert_eq!(status.events[0].kind, EventKind::Error);
        assert_eq!(status.cycles_failed, 1);
        assert!(!status.sampler_enabled);
    }

    #[test]
    fn reading_updates_last_sample() {
        let mut st = SystemState::new(true);
        st.record_reading(3, SensorReading::new(0, 2.0, 50.0, 50.0), SeverityClass::Critical);
        let last = st.last_sample.as_ref().unwrap();
        assert_eq!(last.plant_id, 3);
        assert_eq!(last.status, SeverityClass::Critical);
        assert!(st.events.back().unwrap().detail.contains("Critical"));
    }
}
