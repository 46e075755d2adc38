//! Mock production feed
//!
//! Stands in for a shop-floor data source during development. On every tick
//! each running machine with `mockDataEnabled` accumulates operating time and
//! reports a cumulative production sample for its current shift. Samples are
//! committed through the repository, so OEE and health are recomputed exactly
//! as for any other update.
//!
//! Machines that are stopped, in maintenance, or opted out are never touched.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::models::{Machine, ProductionSample};
use crate::oee::HealthStatus;
use crate::repository::MachineRepository;
use crate::state::SharedState;

/// Mean / standard deviation of the fraction of each tick the machine runs
const UPTIME_MEAN: f64 = 0.9;
const UPTIME_STD_DEV: f64 = 0.08;
/// Mean / standard deviation of actual speed relative to the ideal rate
const SPEED_MEAN: f64 = 0.92;
const SPEED_STD_DEV: f64 = 0.05;
/// Mean / standard deviation of the good-piece ratio
const YIELD_MEAN: f64 = 0.97;
const YIELD_STD_DEV: f64 = 0.02;

/// One machine's simulated progress for a tick
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftStep {
    pub operating_time: f64,
    pub sample: ProductionSample,
    pub new_shift: bool,
}

/// Generator of mock production samples
pub struct ProductionSimulator {
    /// Interval between ticks in milliseconds
    interval_ms: u64,
    /// Shop-floor minutes represented by one tick
    minutes_per_tick: f64,
    uptime: Normal<f64>,
    speed: Normal<f64>,
    yield_ratio: Normal<f64>,
}

impl ProductionSimulator {
    pub fn new(interval_ms: u64, minutes_per_tick: f64) -> Result<Self, NormalError> {
        info!(
            interval_ms = interval_ms,
            minutes_per_tick = minutes_per_tick,
            "Initializing mock production feed"
        );

        Ok(Self {
            interval_ms,
            minutes_per_tick: minutes_per_tick.max(0.0),
            uptime: Normal::new(UPTIME_MEAN, UPTIME_STD_DEV)?,
            speed: Normal::new(SPEED_MEAN, SPEED_STD_DEV)?,
            yield_ratio: Normal::new(YIELD_MEAN, YIELD_STD_DEV)?,
        })
    }

    /// Run the feed until the task is dropped
    pub async fn run(self, state: SharedState) {
        info!("Starting mock production feed loop");

        let mut tick_interval = interval(Duration::from_millis(self.interval_ms.max(1)));
        let mut rng = StdRng::from_entropy();
        let mut tick_count: u64 = 0;

        loop {
            tick_interval.tick().await;
            tick_count += 1;

            let updated = {
                let mut app_state = state.write().await;
                self.tick(app_state.machines_mut(), &mut rng)
            };

            debug!(tick = tick_count, machines = updated, "Mock production tick");
        }
    }

    /// Advance every eligible machine by one tick. Returns how many were updated.
    pub fn tick<R: Rng + ?Sized>(&self, machines: &mut MachineRepository, rng: &mut R) -> usize {
        let mut updated = 0;

        for id in machines.mock_feed_targets() {
            let (step, previous_health) = match machines.get(id) {
                Some(machine) => (self.next_step(machine, rng), machine.health_status()),
                None => continue,
            };
            let new_shift = step.new_shift;

            match machines.record_shift_progress(id, step.operating_time, step.sample) {
                Ok(machine) => {
                    updated += 1;

                    if new_shift {
                        info!(machine_id = %id, name = %machine.name, "Mock feed started a new shift");
                    }
                    if machine.health_status() == HealthStatus::CriticallyUnhealthy
                        && previous_health != HealthStatus::CriticallyUnhealthy
                    {
                        warn!(
                            machine_id = %id,
                            name = %machine.name,
                            oee = machine.oee(),
                            "Machine dropped to critically unhealthy"
                        );
                    }
                }
                Err(e) => warn!(machine_id = %id, error = %e, "Mock feed could not update machine"),
            }
        }

        updated
    }

    /// Compute the next operating time and cumulative shift sample.
    ///
    /// Once operating time reaches planned production time the next tick
    /// starts a fresh shift from zero.
    pub fn next_step<R: Rng + ?Sized>(&self, machine: &Machine, rng: &mut R) -> ShiftStep {
        let planned = machine.planned_production_time;
        let ran = self.minutes_per_tick * self.uptime.sample(rng).clamp(0.0, 1.0);

        let new_shift = planned > 0.0 && machine.operating_time >= planned;
        let mut operating_time = if new_shift {
            ran
        } else {
            machine.operating_time.max(0.0) + ran
        };
        if planned > 0.0 {
            operating_time = operating_time.min(planned);
        }

        let theoretical_output = operating_time / 60.0 * machine.ideal_output_rate.max(0.0);
        let speed = self.speed.sample(rng).clamp(0.0, 1.05);
        let total_pieces = (theoretical_output * speed).round().max(0.0) as u64;

        let good_ratio = self.yield_ratio.sample(rng).clamp(0.0, 1.0);
        let good_pieces = ((total_pieces as f64 * good_ratio).round() as u64).min(total_pieces);

        ShiftStep {
            operating_time,
            sample: ProductionSample::new(total_pieces, good_pieces),
            new_shift,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MachineInput, MachineStatus};
    use crate::state::AppState;

    fn running(name: &str) -> MachineInput {
        let mut input = MachineInput::named(name);
        input.status = MachineStatus::Running;
        input
    }

    #[test]
    fn test_simulator_creation() {
        let simulator = ProductionSimulator::new(1000, 2.0).unwrap();
        assert_eq!(simulator.interval_ms, 1000);
        assert_eq!(simulator.minutes_per_tick, 2.0);
    }

    #[test]
    fn test_steps_stay_within_shift() {
        let simulator = ProductionSimulator::new(1000, 30.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut repo = MachineRepository::default();
        let id = repo.insert(running("Press")).id;

        for _ in 0..40 {
            assert_eq!(simulator.tick(&mut repo, &mut rng), 1);

            let machine = repo.get(id).unwrap();
            let latest = machine.latest_sample().unwrap();
            assert!(machine.operating_time <= machine.planned_production_time);
            assert!(latest.good_pieces <= latest.total_pieces);
            assert!(machine.oee() <= 100);
        }
    }

    #[test]
    fn test_shift_rolls_over() {
        let simulator = ProductionSimulator::new(1000, 10.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut input = running("Lathe");
        input.operating_time = 480.0;
        let machine = Machine::from_input(input);

        let step = simulator.next_step(&machine, &mut rng);

        assert!(step.new_shift);
        assert!(step.operating_time <= 10.0);
    }

    #[test]
    fn test_shift_accumulates_production() {
        let simulator = ProductionSimulator::new(1000, 60.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut repo = MachineRepository::default();
        let id = repo.insert(running("Cell 4")).id;

        for _ in 0..4 {
            simulator.tick(&mut repo, &mut rng);
        }

        let machine = repo.get(id).unwrap();
        assert_eq!(machine.production_data.len(), 4);
        assert!(machine.metrics().performance > 0);
        assert!(machine.metrics().quality > 0);
        assert_eq!(machine.version, 4);
    }

    #[test]
    fn test_ineligible_machines_untouched() {
        let simulator = ProductionSimulator::new(1000, 10.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut repo = MachineRepository::default();

        let stopped = repo.insert(MachineInput::named("Stopped")).id;
        let mut opted_out = running("Opted out");
        opted_out.mock_data_enabled = false;
        let opted_out = repo.insert(opted_out).id;

        assert_eq!(simulator.tick(&mut repo, &mut rng), 0);
        assert!(repo.get(stopped).unwrap().production_data.is_empty());
        assert_eq!(repo.get(opted_out).unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_feed_loop_updates_state() {
        use std::time::Duration;
        use tokio::time::timeout;

        let state = AppState::default().shared();
        let id = {
            let mut s = state.write().await;
            s.machines_mut().insert(running("Conveyor")).id
        };

        let simulator = ProductionSimulator::new(20, 5.0).unwrap();
        let state_clone = state.clone();
        let handle = tokio::spawn(async move {
            simulator.run(state_clone).await;
        });

        timeout(Duration::from_millis(1000), async {
            loop {
                {
                    let s = state.read().await;
                    if s.machines().get(id).is_some_and(|m| !m.production_data.is_empty()) {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Timeout waiting for mock production sample");

        handle.abort();
    }
}
