//! Simulated plant sensor readings for demo data.
//!
//! Each sample first draws a target band (normal 60%, needs-attention 30%,
//! critical 10%), then draws every dimension independently from that band.
//! For the two abnormal bands each dimension flips a coin for the low or
//! high side.  Values are whole numbers, so a sample always lands inside the
//! band it was drawn for.

use std::fmt;
use std::ops::RangeInclusive;

use serde::Deserialize;

use crate::status::{Dimension, SensorReading, SeverityClass};

// ---------------------------------------------------------------------------
// Band weights
// ---------------------------------------------------------------------------

/// Relative weights for the target band of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BandWeights {
    pub normal: u32,
    pub needs_attention: u32,
    pub critical: u32,
}

impl Default for BandWeights {
    fn default() -> Self {
        Self {
            normal: 60,
            needs_attention: 30,
            critical: 10,
        }
    }
}

impl BandWeights {
    /// Always draw from a single band.
    #[cfg(test)]
    pub fn only(class: SeverityClass) -> Self {
        let mut w = Self {
            normal: 0,
            needs_attention: 0,
            critical: 0,
        };
        match class {
            SeverityClass::Normal => w.normal = 1,
            SeverityClass::NeedsAttention => w.needs_attention = 1,
            SeverityClass::Critical => w.critical = 1,
        }
        w
    }

    pub fn total(&self) -> u32 {
        self.normal + self.needs_attention + self.critical
    }
}

// ---------------------------------------------------------------------------
// Per-dimension ranges
// ---------------------------------------------------------------------------

/// Integer draw ranges for one dimension, one per band side.
struct DrawRanges {
    normal: RangeInclusive<i32>,
    warning_low: RangeInclusive<i32>,
    warning_high: RangeInclusive<i32>,
    critical_low: RangeInclusive<i32>,
    critical_high: RangeInclusive<i32>,
}

fn draw_ranges(dim: Dimension) -> DrawRanges {
    match dim {
        Dimension::Temperature => DrawRanges {
            normal: 10..=30,
            warning_low: 5..=9,
            warning_high: 31..=35,
            critical_low: -5..=4,
            critical_high: 36..=44,
        },
        Dimension::SoilMoisture => DrawRanges {
            normal: 20..=80,
            warning_low: 10..=19,
            warning_high: 81..=90,
            critical_low: 1..=9,
            critical_high: 91..=100,
        },
        Dimension::AirHumidity => DrawRanges {
            normal: 30..=70,
            warning_low: 20..=29,
            warning_high: 71..=80,
            critical_low: 1..=19,
            critical_high: 81..=100,
        },
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Produces plausible readings.  The random source is injected so tests can
/// seed it.
pub struct SampleGenerator {
    rng: fastrand::Rng,
    weights: BandWeights,
}

impl fmt::Debug for SampleGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleGenerator")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl Default for SampleGenerator {
    fn default() -> Self {
        Self::new(fastrand::Rng::new())
    }
}

impl SampleGenerator {
    pub fn new(rng: fastrand::Rng) -> Self {
        Self::with_weights(rng, BandWeights::default())
    }

    pub fn with_weights(rng: fastrand::Rng, weights: BandWeights) -> Self {
        Self { rng, weights }
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self::new(fastrand::Rng::with_seed(seed))
    }

    /// Draw a band, then a reading from it.
    pub fn generate(&mut self, ts: i64) -> SensorReading {
        let band = self.pick_band();
        self.generate_in(band, ts)
    }

    /// Draw a reading targeted at `band`.
    pub fn generate_in(&mut self, band: SeverityClass, ts: i64) -> SensorReading {
        let temperature = self.draw(Dimension::Temperature, band);
        let soil_moisture = self.draw(Dimension::SoilMoisture, band);
        let air_humidity = self.draw(Dimension::AirHumidity, band);
        SensorReading::new(ts, temperature, soil_moisture, air_humidity)
    }

    /// Pick one element uniformly, or `None` for an empty slice.
    pub fn choose<T: Copy>(&mut self, items: &[T]) -> Option<T> {
        if items.is_empty() {
            None
        } else {
            Some(items[self.rng.usize(..items.len())])
        }
    }

    fn pick_band(&mut self) -> SeverityClass {
        let total = self.weights.total();
        if total == 0 {
            return SeverityClass::Normal;
        }
        let roll = self.rng.u32(..total);
        if roll < self.weights.normal {
            SeverityClass::Normal
        } else if roll < self.weights.normal + self.weights.needs_attention {
            SeverityClass::NeedsAttention
        } else {
            SeverityClass::Critical
        }
    }

    fn draw(&mut self, dim: Dimension, band: SeverityClass) -> f64 {
        let r = draw_ranges(dim);
        let range = match band {
            SeverityClass::Normal => r.normal,
            SeverityClass::NeedsAttention => {
                if self.rng.bool() {
                    r.warning_low
                } else {
                    r.warning_high
                }
            }
            SeverityClass::Critical => {
                if self.rng.bool() {
                    r.critical_low
                } else {
                    r.critical_high
                }
            }
        };
        self.rng.i32(range) as f64
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{classify, classify_dimension, Band};

    #[test]
    fn forced_critical_lands_outside_normal() {
        let mut sim = SampleGenerator::with_weights(
            fastrand::Rng::with_seed(7),
            BandWeights::only(SeverityClass::Critical),
        );
        let mut abnormal = 0;
        for _ in 0..1000 {
            let r = sim.generate(0);
            if Dimension::ALL
                .iter()
                .any(|&d| classify_dimension(&r, d) != Band::Normal)
            {
                abnormal += 1;
            }
        }
        assert!(abnormal >= 990, "only {abnormal}/1000 critical draws were abnormal");
    }

    #[test]
    fn targeted_bands_classify_as_targeted() {
        let mut sim = SampleGenerator::seeded(11);
        for band in [
            SeverityClass::Normal,
            SeverityClass::NeedsAttention,
            SeverityClass::Critical,
        ] {
            for _ in 0..200 {
                let r = sim.generate_in(band, 0);
                assert_eq!(classify(&r), band, "{r:?}");
            }
        }
    }

    #[test]
    fn default_weights_are_biased_toward_normal() {
        let mut sim = SampleGenerator::seeded(3);
        let mut counts = [0_u32; 3];
        for _ in 0..10_000 {
            match classify(&sim.generate(0)) {
                SeverityClass::Normal => counts[0] += 1,
                SeverityClass::NeedsAttention => counts[1] += 1,
                SeverityClass::Critical => counts[2] += 1,
            }
        }
        // Expected roughly 6000 / 3000 / 1000.
        assert!((5500..6500).contains(&counts[0]), "{counts:?}");
        assert!((2500..3500).contains(&counts[1]), "{counts:?}");
        assert!((700..1300).contains(&counts[2]), "{counts:?}");
    }

    #[test]
    fn abnormal_bands_use_both_sides() {
        let mut sim = SampleGenerator::seeded(5);
        let mut low = false;
        let mut high = false;
        for _ in 0..100 {
            match classify_dimension(
                &sim.generate_in(SeverityClass::NeedsAttention, 0),
                Dimension::Temperature,
            ) {
                Band::WarningLow => low = true,
                Band::WarningHigh => high = true,
                other => panic!("unexpected band {other:?}"),
            }
        }
        assert!(low && high);
    }

    #[test]
    fn same_seed_same_readings() {
        let mut a = SampleGenerator::seeded(99);
        let mut b = SampleGenerator::seeded(99);
        for _ in 0..50 {
            assert_eq!(a.generate(1), b.generate(1));
        }
    }

    #[test]
    fn choose_is_uniform_enough() {
        let mut sim = SampleGenerator::seeded(1);
        let ids = [10_i64, 20, 30];
        let mut seen = [0_u32; 3];
        for _ in 0..3000 {
            let id = sim.choose(&ids).unwrap();
            seen[ids.iter().position(|&x| x == id).unwrap()] += 1;
        }
        assert!(seen.iter().all(|&n| n > 800), "{seen:?}");
        assert_eq!(sim.choose::<i64>(&[]), None);
    }

    #[test]
    fn zero_weights_fall_back_to_normal() {
        let mut sim = SampleGenerator::with_weights(
            fastrand::Rng::with_seed(1),
            BandWeights {
                normal: 0,
                needs_attention: 0,
                critical: 0,
            },
        );
        assert_eq!(classify(&sim.generate(0)), SeverityClass::Normal);
    }
}
