//! Notification composition and the dispatch policy.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::status::{classify_dimension, Band, Dimension, SensorReading, SeverityClass};

/// Substituted when a plant has no usable name.
pub const DEFAULT_PLANT_NAME: &str = "Your plant";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which sensor a notification is primarily about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Temperature,
    Moisture,
    Humidity,
    System,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Temperature => "Temperature",
            Category::Moisture => "Moisture",
            Category::Humidity => "Humidity",
            Category::System => "System",
        }
    }

    fn of(dim: Dimension) -> Self {
        match dim {
            Dimension::Temperature => Category::Temperature,
            Dimension::SoilMoisture => Category::Moisture,
            Dimension::AirHumidity => Category::Humidity,
        }
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Temperature" => Ok(Category::Temperature),
            "Moisture" => Ok(Category::Moisture),
            "Humidity" => Ok(Category::Humidity),
            "System" => Ok(Category::System),
            _ => Err(UnknownVariant::new("category", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity stored on a notification record.  There is no "normal"
/// notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationSeverity {
    Warning,
    Critical,
}

impl NotificationSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationSeverity::Warning => "Warning",
            NotificationSeverity::Critical => "Critical",
        }
    }

    pub fn for_class(class: SeverityClass) -> Option<Self> {
        match class {
            SeverityClass::Normal => None,
            SeverityClass::NeedsAttention => Some(NotificationSeverity::Warning),
            SeverityClass::Critical => Some(NotificationSeverity::Critical),
        }
    }
}

impl FromStr for NotificationSeverity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Warning" => Ok(NotificationSeverity::Warning),
            "Critical" => Ok(NotificationSeverity::Critical),
            _ => Err(UnknownVariant::new("severity", s)),
        }
    }
}

impl std::fmt::Display for NotificationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored category or severity string that no variant matches.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub category: Category,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Dispatch policy
// ---------------------------------------------------------------------------

/// Which classifications produce a persisted notification.
///
/// `WarningAndCritical` is the default.  Older deployments only notified on
/// critical readings; `CriticalOnly` reproduces that and is selectable from
/// config as `notify_policy = "critical_only"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    #[default]
    WarningAndCritical,
    CriticalOnly,
}

impl NotifyPolicy {
    pub fn should_notify(self, class: SeverityClass) -> bool {
        match self {
            NotifyPolicy::WarningAndCritical => class != SeverityClass::Normal,
            NotifyPolicy::CriticalOnly => class == SeverityClass::Critical,
        }
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Build the category and human-readable message for a reading.
///
/// Callers are expected to have classified the reading already; a reading
/// with every dimension normal yields `Category::System` and a generic text.
pub fn compose(plant_name: Option<&str>, reading: &SensorReading, critical: bool) -> Composed {
    let name = match plant_name.map(str::trim) {
        Some(n) if !n.is_empty() => n,
        _ => DEFAULT_PLANT_NAME,
    };

    let bands: Vec<(Dimension, Band)> = Dimension::ALL
        .iter()
        .map(|&dim| (dim, classify_dimension(reading, dim)))
        .collect();

    let clauses: Vec<String> = bands
        .iter()
        .filter_map(|&(dim, band)| clause(name, dim, band, reading.value(dim)))
        .collect();

    if clauses.is_empty() {
        return Composed {
            category: Category::System,
            message: format!("{name} needs attention"),
        };
    }

    let prefix = if critical { "Critical: " } else { "Warning: " };
    let message = format!(
        "{prefix}{} Current readings: temperature ({:.1}°C), soil ({:.1}%), humidity ({:.1}%)",
        clauses.join(" "),
        reading.temperature,
        reading.soil_moisture,
        reading.air_humidity,
    );

    Composed {
        category: category(&bands),
        message,
    }
}

/// First critical dimension, else first warning dimension, else System.
fn category(bands: &[(Dimension, Band)]) -> Category {
    let first_with = |class: SeverityClass| {
        bands
            .iter()
            .find(|(_, band)| band.severity() == class)
            .map(|&(dim, _)| Category::of(dim))
    };
    first_with(SeverityClass::Critical)
        .or_else(|| first_with(SeverityClass::NeedsAttention))
        .unwrap_or(Category::System)
}

fn clause(name: &str, dim: Dimension, band: Band, v: f64) -> Option<String> {
    let text = match (dim, band) {
        (_, Band::Normal) => return None,

        (Dimension::Temperature, Band::CriticalLow) => format!(
            "{name} has critically low temperature ({v:.1}°C). Move to a warmer location immediately!"
        ),
        (Dimension::Temperature, Band::WarningLow) => format!(
            "{name} has low temperature ({v:.1}°C). Consider moving it to a warmer spot."
        ),
        (Dimension::Temperature, Band::WarningHigh) => format!(
            "{name} has high temperature ({v:.1}°C). Consider moving it to a cooler spot."
        ),
        (Dimension::Temperature, Band::CriticalHigh) => format!(
            "{name} has critically high temperature ({v:.1}°C). Move away from heat sources immediately!"
        ),

        (Dimension::SoilMoisture, Band::CriticalLow) => {
            format!("{name} has critically dry soil ({v:.1}%). Water immediately!")
        }
        (Dimension::SoilMoisture, Band::WarningLow) => {
            format!("{name} has dry soil ({v:.1}%). Consider watering it soon.")
        }
        (Dimension::SoilMoisture, Band::WarningHigh) => format!(
            "{name} is getting over-watered ({v:.1}%). Consider letting the soil dry out."
        ),
        (Dimension::SoilMoisture, Band::CriticalHigh) => format!(
            "{name} is critically over-watered ({v:.1}%). Reduce watering immediately!"
        ),

        (Dimension::AirHumidity, Band::CriticalLow) => format!(
            "Air humidity around {name} is critically low ({v:.1}%). Use a humidifier immediately!"
        ),
        (Dimension::AirHumidity, Band::WarningLow) => format!(
            "Air humidity around {name} is low ({v:.1}%). Consider misting the plant."
        ),
        (Dimension::AirHumidity, Band::WarningHigh) => format!(
            "Air humidity around {name} is high ({v:.1}%). Consider improving air circulation."
        ),
        (Dimension::AirHumidity, Band::CriticalHigh) => format!(
            "Air humidity around {name} is critically high ({v:.1}%). Improve air circulation immediately!"
        ),
    };
    Some(text)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::classify;

    fn reading(temperature: f64, soil_moisture: f64, air_humidity: f64) -> SensorReading {
        SensorReading::new(0, temperature, soil_moisture, air_humidity)
    }

    fn compose_classified(name: Option<&str>, r: &SensorReading) -> Composed {
        compose(name, r, classify(r) == SeverityClass::Critical)
    }

    // -- Dispatch policy ----------------------------------------------------

    #[test]
    fn default_policy_notifies_on_warning_and_critical() {
        let p = NotifyPolicy::default();
        assert!(!p.should_notify(SeverityClass::Normal));
        assert!(p.should_notify(SeverityClass::NeedsAttention));
        assert!(p.should_notify(SeverityClass::Critical));
    }

    #[test]
    fn legacy_policy_only_notifies_on_critical() {
        let p = NotifyPolicy::CriticalOnly;
        assert!(!p.should_notify(SeverityClass::Normal));
        assert!(!p.should_notify(SeverityClass::NeedsAttention));
        assert!(p.should_notify(SeverityClass::Critical));
    }

    #[test]
    fn policy_parses_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrap {
            p: NotifyPolicy,
        }
        let w: Wrap = toml::from_str(r#"p = "critical_only""#).unwrap();
        assert_eq!(w.p, NotifyPolicy::CriticalOnly);
        let w: Wrap = toml::from_str(r#"p = "warning_and_critical""#).unwrap();
        assert_eq!(w.p, NotifyPolicy::WarningAndCritical);
    }

    // -- Scenarios ----------------------------------------------------------

    #[test]
    fn cold_plant_is_critical_temperature() {
        let r = reading(2.0, 50.0, 50.0);
        assert_eq!(classify(&r), SeverityClass::Critical);

        let c = compose_classified(Some("Fern"), &r);
        assert_eq!(c.category, Category::Temperature);
        assert!(c.message.starts_with("Critical: "), "{}", c.message);
        assert!(c.message.contains("critically low temperature"), "{}", c.message);
        assert!(c.message.contains("immediately"), "{}", c.message);
    }

    #[test]
    fn dry_soil_is_moisture_warning() {
        let r = reading(22.0, 15.0, 50.0);
        assert_eq!(classify(&r), SeverityClass::NeedsAttention);

        let c = compose_classified(Some("Fern"), &r);
        assert_eq!(c.category, Category::Moisture);
        assert!(c.message.starts_with("Warning: "), "{}", c.message);
        assert!(c.message.contains("dry soil"), "{}", c.message);
        assert!(c.message.contains("soon"), "{}", c.message);
        assert!(!c.message.contains("immediately"), "{}", c.message);
    }

    // -- Category precedence ------------------------------------------------

    #[test]
    fn critical_dimension_beats_earlier_warning() {
        // Temperature is only a warning; humidity is critical.
        let r = reading(8.0, 50.0, 95.0);
        let c = compose_classified(None, &r);
        assert_eq!(c.category, Category::Humidity);
    }

    #[test]
    fn first_critical_in_order_wins() {
        let r = reading(50.0, 5.0, 5.0);
        assert_eq!(compose_classified(None, &r).category, Category::Temperature);

        let r = reading(22.0, 5.0, 5.0);
        assert_eq!(compose_classified(None, &r).category, Category::Moisture);
    }

    #[test]
    fn first_warning_in_order_wins_without_critical() {
        let r = reading(22.0, 85.0, 25.0);
        assert_eq!(compose_classified(None, &r).category, Category::Moisture);
    }

    #[test]
    fn all_normal_is_system() {
        let c = compose(Some("Fern"), &reading(22.0, 50.0, 50.0), false);
        assert_eq!(c.category, Category::System);
        assert_eq!(c.message, "Fern needs attention");
    }

    // -- Message shape ------------------------------------------------------

    #[test]
    fn message_lists_every_abnormal_dimension() {
        let r = reading(33.0, 95.0, 25.0);
        let c = compose_classified(Some("Basil"), &r);
        assert!(c.message.contains("Basil has high temperature (33.0°C)"));
        assert!(c.message.contains("Basil is critically over-watered (95.0%)"));
        assert!(c.message.contains("Air humidity around Basil is low (25.0%)"));
    }

    #[test]
    fn message_restates_all_readings() {
        let r = reading(22.0, 15.0, 50.0);
        let c = compose_classified(Some("Fern"), &r);
        assert!(
            c.message.ends_with(
                "Current readings: temperature (22.0°C), soil (15.0%), humidity (50.0%)"
            ),
            "{}",
            c.message
        );
    }

    #[test]
    fn missing_or_blank_name_uses_default() {
        let r = reading(2.0, 50.0, 50.0);
        assert!(compose(None, &r, true).message.contains("Your plant has"));
        assert!(compose(Some("  "), &r, true).message.contains("Your plant has"));
    }

    #[test]
    fn humidity_warning_high_has_a_clause() {
        let r = reading(22.0, 50.0, 75.0);
        let c = compose_classified(None, &r);
        assert_eq!(c.category, Category::Humidity);
        assert!(c.message.contains("is high (75.0%)"), "{}", c.message);
    }

    #[test]
    fn unknown_strings_are_rejected() {
        let err = "bogus".parse::<Category>().unwrap_err();
        assert_eq!(err.to_string(), "unknown category 'bogus'");
        assert!("critical".parse::<NotificationSeverity>().is_err());
        assert!("".parse::<NotificationSeverity>().is_err());
    }

    // -- String round-trips used by the store --------------------------------

    #[test]
    fn category_and_severity_strings() {
        for c in [
            Category::Temperature,
            Category::Moisture,
            Category::Humidity,
            Category::System,
        ] {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        for s in [NotificationSeverity::Warning, NotificationSeverity::Critical] {
            assert_eq!(s.as_str().parse::<NotificationSeverity>().unwrap(), s);
        }
        assert_eq!(
            NotificationSeverity::for_class(SeverityClass::Critical),
            Some(NotificationSeverity::Critical)
        );
        assert_eq!(
            NotificationSeverity::for_class(SeverityClass::Normal),
            None
        );
    }
}
