//! OEE engine
//!
//! Derives availability, performance, quality and the composite OEE score
//! from a machine's raw operating counters and its most recent production
//! sample, then buckets the score into a health classification.
//!
//! Everything here is a pure function of its inputs. The repository calls it
//! before every persist; nothing in this module touches storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// OEE score at or above which a machine is healthy
pub const HEALTHY_THRESHOLD: u8 = 70;
/// OEE score at or above which a machine is unhealthy (below healthy)
pub const UNHEALTHY_THRESHOLD: u8 = 50;
/// OEE score at or above which a machine is severely unhealthy
pub const SEVERELY_UNHEALTHY_THRESHOLD: u8 = 30;

/// Raw inputs read by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OeeInputs {
    /// Planned production time in minutes
    pub planned_production_time: f64,
    /// Time the machine actually ran, in minutes
    pub operating_time: f64,
    /// Ideal output in units per hour
    pub ideal_output_rate: f64,
    /// Piece counts of the most recent production sample, if any
    pub latest: Option<PieceCounts>,
}

/// Total and good piece counts of a single production sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PieceCounts {
    pub total_pieces: u64,
    pub good_pieces: u64,
}

/// The four derived percentages, each an integer in `0..=100`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OeeMetrics {
    pub availability: u8,
    pub performance: u8,
    pub quality: u8,
    pub oee: u8,
}

/// Health classification derived from the OEE score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "unhealthy")]
    Unhealthy,
    #[serde(rename = "severely unhealthy")]
    SeverelyUnhealthy,
    #[serde(rename = "critically unhealthy")]
    CriticallyUnhealthy,
}

impl HealthStatus {
    /// Bucket an OEE score. Lower bounds are inclusive.
    pub fn from_oee(oee: u8) -> Self {
        if oee >= HEALTHY_THRESHOLD {
            HealthStatus::Healthy
        } else if oee >= UNHEALTHY_THRESHOLD {
            HealthStatus::Unhealthy
        } else if oee >= SEVERELY_UNHEALTHY_THRESHOLD {
            HealthStatus::SeverelyUnhealthy
        } else {
            HealthStatus::CriticallyUnhealthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::SeverelyUnhealthy => "severely unhealthy",
            HealthStatus::CriticallyUnhealthy => "critically unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the four OEE percentages.
///
/// Availability, performance and quality are rounded to integers first and
/// the composite score is computed from those rounded values, so
/// `oee = round(a * p * q / 10000)` over integers.
///
/// Degenerate inputs never fail:
/// - planned production time `<= 0` gives availability 0
/// - zero theoretical output gives performance 0
/// - zero total pieces (or no sample at all) gives quality 0
/// - NaN resolves to 0 and every result is clamped to `0..=100`
pub fn compute_oee(inputs: &OeeInputs) -> OeeMetrics {
    let availability = percentage(if inputs.planned_production_time > 0.0 {
        inputs.operating_time / inputs.planned_production_time * 100.0
    } else {
        0.0
    });

    let latest = inputs.latest.unwrap_or_default();
    let actual_output = latest.total_pieces as f64;
    let theoretical_output = inputs.operating_time / 60.0 * inputs.ideal_output_rate;

    let performance = percentage(if theoretical_output > 0.0 {
        actual_output / theoretical_output * 100.0
    } else {
        0.0
    });

    let quality = percentage(if latest.total_pieces > 0 {
        latest.good_pieces as f64 / actual_output * 100.0
    } else {
        0.0
    });

    let oee = percentage(
        f64::from(availability) * f64::from(performance) * f64::from(quality) / 10_000.0,
    );

    OeeMetrics {
        availability,
        performance,
        quality,
        oee,
    }
}

/// Round half-up and clamp into `0..=100`
fn percentage(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    (raw + 0.5).floor().clamp(0.0, 100.0) as u8
}
