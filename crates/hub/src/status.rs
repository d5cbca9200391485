//! Sensor readings and threshold classification.
//!
//! Each dimension is split into five bands.  The normal interior is
//! inclusive, the warning bands sit directly outside it and everything past
//! the warning bands is critical:
//!
//! ```text
//!              crit low | warn low |  normal  | warn high | crit high
//! temperature     <5    |  [5,10)  | [10,30]  |  (30,35]  |   >35
//! soil moisture   <10   | [10,20)  | [20,80]  |  (80,90]  |   >90
//! air humidity    <20   | [20,30)  | [30,70]  |  (70,80]  |   >80
//! ```
//!
//! A reading is as bad as its worst dimension.

use serde::{Deserialize, Serialize};

/// Neutral values substituted for dimensions an external source left out.
pub const DEFAULT_TEMPERATURE: f64 = 22.5;
pub const DEFAULT_SOIL_MOISTURE: f64 = 50.0;
pub const DEFAULT_AIR_HUMIDITY: f64 = 50.0;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// One sample of the three plant sensors.  `ts` is unix seconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub ts: i64,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Percent, 0-100.
    pub soil_moisture: f64,
    /// Percent, 0-100.
    pub air_humidity: f64,
}

impl SensorReading {
    pub fn new(ts: i64, temperature: f64, soil_moisture: f64, air_humidity: f64) -> Self {
        Self {
            ts,
            temperature,
            soil_moisture,
            air_humidity,
        }
    }

    pub fn value(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Temperature => self.temperature,
            Dimension::SoilMoisture => self.soil_moisture,
            Dimension::AirHumidity => self.air_humidity,
        }
    }
}

/// A reading as submitted by an external source, where any dimension may be
/// missing.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PartialReading {
    pub temperature: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub air_humidity: Option<f64>,
}

impl PartialReading {
    /// Fill missing dimensions with the neutral defaults.
    pub fn complete(self, ts: i64) -> SensorReading {
        SensorReading {
            ts,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            soil_moisture: self.soil_moisture.unwrap_or(DEFAULT_SOIL_MOISTURE),
            air_humidity: self.air_humidity.unwrap_or(DEFAULT_AIR_HUMIDITY),
        }
    }
}

// ---------------------------------------------------------------------------
// Dimensions and bands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Temperature,
    SoilMoisture,
    AirHumidity,
}

impl Dimension {
    /// Fixed evaluation order.  Notification categories are picked by the
    /// first matching dimension in this order.
    pub const ALL: [Dimension; 3] = [
        Dimension::Temperature,
        Dimension::SoilMoisture,
        Dimension::AirHumidity,
    ];

    pub fn limits(self) -> Limits {
        match self {
            Dimension::Temperature => Limits {
                critical_low: 5.0,
                warning_low: 10.0,
                warning_high: 30.0,
                critical_high: 35.0,
            },
            Dimension::SoilMoisture => Limits {
                critical_low: 10.0,
                warning_low: 20.0,
                warning_high: 80.0,
                critical_high: 90.0,
            },
            Dimension::AirHumidity => Limits {
                critical_low: 20.0,
                warning_low: 30.0,
                warning_high: 70.0,
                critical_high: 80.0,
            },
        }
    }
}

/// Band edges for one dimension.  `warning_low..=warning_high` is normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub critical_low: f64,
    pub warning_low: f64,
    pub warning_high: f64,
    pub critical_high: f64,
}

impl Limits {
    pub fn band(&self, value: f64) -> Band {
        if value < self.critical_low {
            Band::CriticalLow
        } else if value < self.warning_low {
            Band::WarningLow
        } else if value <= self.warning_high {
            Band::Normal
        } else if value <= self.critical_high {
            Band::WarningHigh
        } else {
            // NaN lands here too.
            Band::CriticalHigh
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    CriticalLow,
    WarningLow,
    Normal,
    WarningHigh,
    CriticalHigh,
}

impl Band {
    pub fn severity(self) -> SeverityClass {
        match self {
            Band::Normal => SeverityClass::Normal,
            Band::WarningLow | Band::WarningHigh => SeverityClass::NeedsAttention,
            Band::CriticalLow | Band::CriticalHigh => SeverityClass::Critical,
        }
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Overall classification of a reading.  Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeverityClass {
    Normal,
    NeedsAttention,
    Critical,
}

impl SeverityClass {
    pub fn as_str(self) -> &'static str {
        match self {
            SeverityClass::Normal => "Normal",
            SeverityClass::NeedsAttention => "Needs Attention",
            SeverityClass::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for SeverityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

pub fn classify_dimension(reading: &SensorReading, dim: Dimension) -> Band {
    dim.limits().band(reading.value(dim))
}

/// Worst severity across all three dimensions.
pub fn classify(reading: &SensorReading) -> SeverityClass {
    Dimension::ALL
        .iter()
        .map(|&dim| classify_dimension(reading, dim).severity())
        .max()
        .unwrap_or(SeverityClass::Normal)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature: f64, soil_moisture: f64, air_humidity: f64) -> SensorReading {
        SensorReading::new(0, temperature, soil_moisture, air_humidity)
    }

    // -- Normal interior ----------------------------------------------------

    #[test]
    fn normal_interior_is_normal() {
        for t in [10.0, 15.5, 22.0, 30.0] {
            for s in [20.0, 50.0, 80.0] {
                for h in [30.0, 45.0, 70.0] {
                    assert_eq!(
                        classify(&reading(t, s, h)),
                        SeverityClass::Normal,
                        "t={t} s={s} h={h}"
                    );
                }
            }
        }
    }

    // -- Band edges ---------------------------------------------------------

    #[test]
    fn temperature_band_edges() {
        let l = Dimension::Temperature.limits();
        assert_eq!(l.band(4.9), Band::CriticalLow);
        assert_eq!(l.band(5.0), Band::WarningLow);
        assert_eq!(l.band(9.9), Band::WarningLow);
        assert_eq!(l.band(10.0), Band::Normal);
        assert_eq!(l.band(30.0), Band::Normal);
        assert_eq!(l.band(30.1), Band::WarningHigh);
        assert_eq!(l.band(35.0), Band::WarningHigh);
        assert_eq!(l.band(35.1), Band::CriticalHigh);
    }

    #[test]
    fn soil_band_edges() {
        let l = Dimension::SoilMoisture.limits();
        assert_eq!(l.band(9.0), Band::CriticalLow);
        assert_eq!(l.band(10.0), Band::WarningLow);
        assert_eq!(l.band(20.0), Band::Normal);
        assert_eq!(l.band(80.0), Band::Normal);
        assert_eq!(l.band(90.0), Band::WarningHigh);
        assert_eq!(l.band(90.5), Band::CriticalHigh);
    }

    #[test]
    fn humidity_band_edges() {
        let l = Dimension::AirHumidity.limits();
        assert_eq!(l.band(19.9), Band::CriticalLow);
        assert_eq!(l.band(20.0), Band::WarningLow);
        assert_eq!(l.band(30.0), Band::Normal);
        assert_eq!(l.band(70.0), Band::Normal);
        assert_eq!(l.band(75.0), Band::WarningHigh);
        assert_eq!(l.band(80.1), Band::CriticalHigh);
    }

    // -- Overall classification ----------------------------------------------

    #[test]
    fn extreme_temperature_alone_is_critical() {
        assert_eq!(classify(&reading(4.0, 50.0, 50.0)), SeverityClass::Critical);
        assert_eq!(classify(&reading(36.0, 50.0, 50.0)), SeverityClass::Critical);
        assert_eq!(classify(&reading(-40.0, 50.0, 50.0)), SeverityClass::Critical);
    }

    #[test]
    fn one_warning_dimension_needs_attention() {
        assert_eq!(
            classify(&reading(22.0, 15.0, 50.0)),
            SeverityClass::NeedsAttention
        );
        assert_eq!(
            classify(&reading(22.0, 50.0, 75.0)),
            SeverityClass::NeedsAttention
        );
    }

    #[test]
    fn critical_wins_over_warning() {
        // Warning temperature, critical humidity.
        assert_eq!(classify(&reading(8.0, 50.0, 95.0)), SeverityClass::Critical);
    }

    #[test]
    fn out_of_physical_range_still_classified() {
        assert_eq!(classify(&reading(22.0, -10.0, 50.0)), SeverityClass::Critical);
        assert_eq!(classify(&reading(22.0, 50.0, 250.0)), SeverityClass::Critical);
    }

    #[test]
    fn classification_is_monotonic_per_dimension() {
        for dim in Dimension::ALL {
            let l = dim.limits();
            let mid = (l.warning_low + l.warning_high) / 2.0;
            let base = reading(22.0, 50.0, 50.0);

            let with = |v: f64| {
                let mut r = base;
                match dim {
                    Dimension::Temperature => r.temperature = v,
                    Dimension::SoilMoisture => r.soil_moisture = v,
                    Dimension::AirHumidity => r.air_humidity = v,
                }
                classify(&r)
            };

            let mut prev_up = SeverityClass::Normal;
            let mut prev_down = SeverityClass::Normal;
            for step in 0..200 {
                let delta = step as f64 * 0.5;
                let up = with(mid + delta);
                let down = with(mid - delta);
                assert!(up >= prev_up, "{dim:?} decreased going up at +{delta}");
                assert!(down >= prev_down, "{dim:?} decreased going down at -{delta}");
                prev_up = up;
                prev_down = down;
            }
            assert_eq!(prev_up, SeverityClass::Critical);
            assert_eq!(prev_down, SeverityClass::Critical);
        }
    }

    #[test]
    fn classify_is_repeatable() {
        let r = reading(31.0, 12.0, 50.0);
        assert_eq!(classify(&r), classify(&r));
    }

    // -- Partial readings ---------------------------------------------------

    #[test]
    fn partial_reading_fills_neutral_defaults() {
        let r = PartialReading {
            temperature: Some(3.0),
            ..Default::default()
        }
        .complete(42);
        assert_eq!(r.ts, 42);
        assert_eq!(r.temperature, 3.0);
        assert_eq!(r.soil_moisture, DEFAULT_SOIL_MOISTURE);
        assert_eq!(r.air_humidity, DEFAULT_AIR_HUMIDITY);
    }

    #[test]
    fn empty_partial_reading_is_normal() {
        let r = PartialReading::default().complete(0);
        assert_eq!(r.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(classify(&r), SeverityClass::Normal);
    }

    #[test]
    fn severity_display() {
        assert_eq!(SeverityClass::NeedsAttention.to_string(), "Needs Attention");
        assert_eq!(SeverityClass::Critical.to_string(), "Critical");
    }
}
