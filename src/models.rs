//! Data models for machines and related structures
//!
//! Defines the machine aggregate, its production and downtime records, and
//! the request payloads accepted by the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::oee::{self, HealthStatus, OeeInputs, OeeMetrics, PieceCounts};

/// Default planned production time: one 8 hour shift, in minutes
pub const DEFAULT_PLANNED_PRODUCTION_TIME: f64 = 480.0;
/// Default ideal cycle time in seconds
pub const DEFAULT_IDEAL_CYCLE_TIME: f64 = 60.0;
/// Default ideal output rate in units per hour
pub const DEFAULT_IDEAL_OUTPUT_RATE: f64 = 60.0;

/// Operational state of a machine, independent of its health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Running,
    #[default]
    Stopped,
    Maintenance,
}

/// Timestamped count of total and good pieces produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSample {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub total_pieces: u64,
    #[serde(default)]
    pub good_pieces: u64,
}

impl ProductionSample {
    /// Create a sample stamped with the current time
    pub fn new(total_pieces: u64, good_pieces: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            total_pieces,
            good_pieces,
        }
    }

    fn piece_counts(&self) -> PieceCounts {
        PieceCounts {
            total_pieces: self.total_pieces,
            good_pieces: self.good_pieces,
        }
    }
}

/// Downtime interval. An absent end time means the downtime is ongoing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DowntimeEvent {
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "Downtime reason is required"))]
    pub reason: String,
}

/// Machine aggregate as stored and served.
///
/// The OEE percentages and health status are private: they are only ever
/// written by [`Machine::calculate_oee`] and [`Machine::calculate_health_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    #[serde(rename = "_id")]
    pub id: Uuid,

    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_project: Option<String>,
    pub status: MachineStatus,

    /// Minutes
    pub planned_production_time: f64,
    /// Minutes
    pub operating_time: f64,
    /// Seconds. Stored only, the engine does not read it.
    pub ideal_cycle_time: f64,
    /// Units per hour
    pub ideal_output_rate: f64,

    pub production_data: Vec<ProductionSample>,
    pub downtime_events: Vec<DowntimeEvent>,

    #[serde(flatten)]
    metrics: OeeMetrics,
    health_status: HealthStatus,

    pub mock_data_enabled: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "__v")]
    pub version: u64,
}

impl Machine {
    /// Build an unsaved machine from a create request.
    ///
    /// Derived fields start zeroed; the repository computes them before the
    /// first persist.
    pub fn from_input(input: MachineInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            machine_type: input.machine_type,
            automation_project: input.automation_project,
            status: input.status,
            planned_production_time: input.planned_production_time,
            operating_time: input.operating_time,
            ideal_cycle_time: input.ideal_cycle_time,
            ideal_output_rate: input.ideal_output_rate,
            production_data: input.production_data,
            downtime_events: input.downtime_events,
            metrics: OeeMetrics::default(),
            health_status: HealthStatus::from_oee(0),
            mock_data_enabled: input.mock_data_enabled,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Raw inputs the engine reads
    pub fn oee_inputs(&self) -> OeeInputs {
        OeeInputs {
            planned_production_time: self.planned_production_time,
            operating_time: self.operating_time,
            ideal_output_rate: self.ideal_output_rate,
            latest: self.latest_sample().map(ProductionSample::piece_counts),
        }
    }

    /// Recompute availability, performance, quality and OEE. Returns the OEE.
    pub fn calculate_oee(&mut self) -> u8 {
        self.metrics = oee::compute_oee(&self.oee_inputs());
        self.metrics.oee
    }

    /// Reclassify health from the OEE currently held.
    ///
    /// Reads the last computed score, so it must follow `calculate_oee`.
    pub fn calculate_health_status(&mut self) {
        self.health_status = HealthStatus::from_oee(self.metrics.oee);
    }

    /// Pre-commit step: OEE first, then health status
    pub fn refresh_derived(&mut self) {
        self.calculate_oee();
        self.calculate_health_status();
    }

    pub fn metrics(&self) -> OeeMetrics {
        self.metrics
    }

    pub fn oee(&self) -> u8 {
        self.metrics.oee
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health_status
    }

    pub fn latest_sample(&self) -> Option<&ProductionSample> {
        self.production_data.last()
    }
}

fn default_planned_production_time() -> f64 {
    DEFAULT_PLANNED_PRODUCTION_TIME
}

fn default_ideal_cycle_time() -> f64 {
    DEFAULT_IDEAL_CYCLE_TIME
}

fn default_ideal_output_rate() -> f64 {
    DEFAULT_IDEAL_OUTPUT_RATE
}

fn default_true() -> bool {
    true
}

/// Input DTO for machine creation.
///
/// Derived fields (`availability`, `oee`, `healthStatus`, ...) are not part of
/// this type, so values sent by a client for them are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MachineInput {
    #[validate(length(min = 1, message = "Machine name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub automation_project: Option<String>,
    #[serde(default)]
    pub status: MachineStatus,

    #[serde(default = "default_planned_production_time")]
    #[validate(range(min = 0.0, message = "Planned production time must not be negative"))]
    pub planned_production_time: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "Operating time must not be negative"))]
    pub operating_time: f64,
    #[serde(default = "default_ideal_cycle_time")]
    #[validate(range(min = 0.0, message = "Ideal cycle time must not be negative"))]
    pub ideal_cycle_time: f64,
    #[serde(default = "default_ideal_output_rate")]
    #[validate(range(min = 0.0, message = "Ideal output rate must not be negative"))]
    pub ideal_output_rate: f64,

    #[serde(default)]
    pub production_data: Vec<ProductionSample>,
    #[serde(default)]
    #[validate(nested)]
    pub downtime_events: Vec<DowntimeEvent>,

    #[serde(default = "default_true")]
    pub mock_data_enabled: bool,
}

impl MachineInput {
    /// Minimal create request with default operating parameters
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            machine_type: None,
            automation_project: None,
            status: MachineStatus::default(),
            planned_production_time: DEFAULT_PLANNED_PRODUCTION_TIME,
            operating_time: 0.0,
            ideal_cycle_time: DEFAULT_IDEAL_CYCLE_TIME,
            ideal_output_rate: DEFAULT_IDEAL_OUTPUT_RATE,
            production_data: Vec::new(),
            downtime_events: Vec::new(),
            mock_data_enabled: true,
        }
    }
}

/// Update DTO. Every field here is on the editable allow-list; anything
/// else in the request body is dropped during deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MachineUpdate {
    #[validate(length(min = 1, message = "Machine name must not be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub machine_type: Option<String>,
    pub automation_project: Option<String>,
    pub status: Option<MachineStatus>,
    #[validate(range(min = 0.0, message = "Planned production time must not be negative"))]
    pub planned_production_time: Option<f64>,
    #[validate(range(min = 0.0, message = "Operating time must not be negative"))]
    pub operating_time: Option<f64>,
    #[validate(range(min = 0.0, message = "Ideal cycle time must not be negative"))]
    pub ideal_cycle_time: Option<f64>,
    #[validate(range(min = 0.0, message = "Ideal output rate must not be negative"))]
    pub ideal_output_rate: Option<f64>,
    pub mock_data_enabled: Option<bool>,

    /// Version the client last read; a mismatch rejects the update
    #[serde(rename = "__v", default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

impl MachineUpdate {
    /// True when the update touches an input the engine reads
    pub fn touches_oee_inputs(&self) -> bool {
        self.planned_production_time.is_some()
            || self.operating_time.is_some()
            || self.ideal_output_rate.is_some()
    }
}

/// Input DTO for appending a production sample
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionInput {
    pub total_pieces: u64,
    pub good_pieces: u64,
    /// Optional client-provided timestamp (defaults to server time)
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<ProductionInput> for ProductionSample {
    fn from(input: ProductionInput) -> Self {
        ProductionSample {
            timestamp: input.timestamp.unwrap_or_else(Utc::now),
            total_pieces: input.total_pieces,
            good_pieces: input.good_pieces,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub machine_count: usize,
}
