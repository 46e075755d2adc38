//! Machine document store
//!
//! Holds machine records keyed by id. Every write path goes through
//! [`MachineRepository::modify`] or [`MachineRepository::insert`], both of
//! which recompute the derived OEE fields before the record is stored.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    DowntimeEvent, Machine, MachineInput, MachineStatus, MachineUpdate, ProductionSample,
};
use crate::oee::HealthStatus;

/// Default number of production samples kept per machine
pub const DEFAULT_MAX_PRODUCTION_SAMPLES: usize = 1000;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Machine {id} not found")]
    NotFound { id: Uuid },

    #[error("Version conflict on machine {id}: expected version {expected}, stored version {actual}")]
    VersionConflict { id: Uuid, expected: u64, actual: u64 },
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Optional list filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineFilter {
    pub status: Option<MachineStatus>,
    pub health_status: Option<HealthStatus>,
}

impl MachineFilter {
    fn matches(&self, machine: &Machine) -> bool {
        self.status.map_or(true, |s| machine.status == s)
            && self.health_status.map_or(true, |h| machine.health_status() == h)
    }
}

/// Outcome of recomputing one stored machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recalculation {
    pub machine_id: Uuid,
    pub name: String,
    pub previous_oee: u8,
    pub oee: u8,
    pub previous_health_status: HealthStatus,
    pub health_status: HealthStatus,
}

impl Recalculation {
    pub fn changed(&self) -> bool {
        self.previous_oee != self.oee || self.previous_health_status != self.health_status
    }
}

/// In-memory machine store
#[derive(Debug)]
pub struct MachineRepository {
    machines: HashMap<Uuid, Machine>,
    max_production_samples: usize,
}

impl MachineRepository {
    pub fn new(max_production_samples: usize) -> Self {
        Self {
            machines: HashMap::new(),
            max_production_samples: max_production_samples.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Machine> {
        self.machines.get(&id)
    }

    /// Machines matching the filter, oldest first
    pub fn list(&self, filter: &MachineFilter) -> Vec<&Machine> {
        let mut machines: Vec<&Machine> =
            self.machines.values().filter(|m| filter.matches(m)).collect();
        machines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        machines
    }

    /// Ids of running machines opted into mock production data
    pub fn mock_feed_targets(&self) -> Vec<Uuid> {
        self.list(&MachineFilter {
            status: Some(MachineStatus::Running),
            health_status: None,
        })
        .into_iter()
        .filter(|m| m.mock_data_enabled)
        .map(|m| m.id)
        .collect()
    }

    /// Create a machine. Derived fields are computed before it is stored.
    pub fn insert(&mut self, input: MachineInput) -> Machine {
        let mut machine = Machine::from_input(input);
        trim_production_data(&mut machine, self.max_production_samples);
        machine.refresh_derived();

        info!(
            machine_id = %machine.id,
            oee = machine.oee(),
            health_status = %machine.health_status(),
            "Machine created"
        );

        self.machines.insert(machine.id, machine.clone());
        machine
    }

    /// Apply an allow-listed update
    pub fn update(&mut self, id: Uuid, update: MachineUpdate) -> RepositoryResult<Machine> {
        let expected_version = update.expected_version;
        self.modify(id, expected_version, move |machine| {
            if let Some(name) = update.name {
                machine.name = name;
            }
            if let Some(description) = update.description {
                machine.description = Some(description);
            }
            if let Some(machine_type) = update.machine_type {
                machine.machine_type = Some(machine_type);
            }
            if let Some(project) = update.automation_project {
                machine.automation_project = Some(project);
            }
            if let Some(status) = update.status {
                machine.status = status;
            }
            if let Some(planned) = update.planned_production_time {
                machine.planned_production_time = planned;
            }
            if let Some(operating) = update.operating_time {
                machine.operating_time = operating;
            }
            if let Some(cycle) = update.ideal_cycle_time {
                machine.ideal_cycle_time = cycle;
            }
            if let Some(rate) = update.ideal_output_rate {
                machine.ideal_output_rate = rate;
            }
            if let Some(enabled) = update.mock_data_enabled {
                machine.mock_data_enabled = enabled;
            }
        })
    }

    pub fn append_production(
        &mut self,
        id: Uuid,
        sample: ProductionSample,
    ) -> RepositoryResult<Machine> {
        self.modify(id, None, |machine| machine.production_data.push(sample))
    }

    /// Set operating time and append a sample in a single commit
    pub fn record_shift_progress(
        &mut self,
        id: Uuid,
        operating_time: f64,
        sample: ProductionSample,
    ) -> RepositoryResult<Machine> {
        self.modify(id, None, |machine| {
            machine.operating_time = operating_time;
            machine.production_data.push(sample);
        })
    }

    pub fn record_downtime(&mut self, id: Uuid, event: DowntimeEvent) -> RepositoryResult<Machine> {
        self.modify(id, None, |machine| machine.downtime_events.push(event))
    }

    pub fn delete(&mut self, id: Uuid) -> RepositoryResult<Machine> {
        let machine = self
            .machines
            .remove(&id)
            .ok_or(RepositoryError::NotFound { id })?;

        info!(machine_id = %id, "Machine deleted");
        Ok(machine)
    }

    /// Recompute every stored machine, bumping the version of those whose
    /// derived fields were stale
    pub fn recalculate_all(&mut self) -> Vec<Recalculation> {
        let now = Utc::now();
        let mut outcomes: Vec<Recalculation> = self
            .machines
            .values_mut()
            .map(|machine| {
                let previous_oee = machine.oee();
                let previous_health_status = machine.health_status();
                machine.refresh_derived();

                let outcome = Recalculation {
                    machine_id: machine.id,
                    name: machine.name.clone(),
                    previous_oee,
                    oee: machine.oee(),
                    previous_health_status,
                    health_status: machine.health_status(),
                };
                if outcome.changed() {
                    machine.version += 1;
                    machine.updated_at = now;
                }
                outcome
            })
            .collect();

        outcomes.sort_by(|a, b| a.name.cmp(&b.name).then(a.machine_id.cmp(&b.machine_id)));

        info!(
            machines = outcomes.len(),
            changed = outcomes.iter().filter(|o| o.changed()).count(),
            "Recalculated OEE for all machines"
        );
        outcomes
    }

    /// Version-check, mutate, recompute and store one machine.
    ///
    /// The mutation and the recomputation happen under the same `&mut self`
    /// borrow, so no reader can observe raw inputs without matching derived
    /// fields.
    fn modify<F>(&mut self, id: Uuid, expected_version: Option<u64>, mutate: F) -> RepositoryResult<Machine>
    where
        F: FnOnce(&mut Machine),
    {
        let max_samples = self.max_production_samples;
        let machine = self
            .machines
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound { id })?;

        if let Some(expected) = expected_version {
            if expected != machine.version {
                return Err(RepositoryError::VersionConflict {
                    id,
                    expected,
                    actual: machine.version,
                });
            }
        }

        mutate(machine);
        trim_production_data(machine, max_samples);
        machine.refresh_derived();
        machine.version += 1;
        machine.updated_at = Utc::now();

        debug!(
            machine_id = %id,
            version = machine.version,
            oee = machine.oee(),
            health_status = %machine.health_status(),
            "Machine committed"
        );

        Ok(machine.clone())
    }
}

impl Default for MachineRepository {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PRODUCTION_SAMPLES)
    }
}

/// Drop the oldest samples beyond the retention limit
fn trim_production_data(machine: &mut Machine, max_samples: usize) {
    let len = machine.production_data.len();
    if len > max_samples {
        machine.production_data.drain(..len - max_samples);
    }
}
