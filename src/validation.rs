//! Input validation module
//!
//! Rejects out-of-domain machine inputs before they reach the repository.
//! The OEE engine itself accepts anything and clamps; this is where negative
//! or non-finite values are turned away.

use crate::error::{AppError, AppResult};
use crate::models::{DowntimeEvent, MachineInput, MachineUpdate, ProductionInput, ProductionSample};
use tracing::{debug, warn};
use validator::{Validate, ValidationErrors};

/// Validate a machine creation request
pub fn validate_machine_input(input: &MachineInput) -> AppResult<()> {
    if let Err(validation_errors) = input.validate() {
        return Err(rejected(&validation_errors));
    }

    validate_raw_input("plannedProductionTime", input.planned_production_time)?;
    validate_raw_input("operatingTime", input.operating_time)?;
    validate_raw_input("idealCycleTime", input.ideal_cycle_time)?;
    validate_raw_input("idealOutputRate", input.ideal_output_rate)?;

    for sample in &input.production_data {
        validate_sample(sample)?;
    }
    for event in &input.downtime_events {
        validate_downtime_event(event)?;
    }

    debug!("Machine input validation passed");
    Ok(())
}

/// Validate an allow-listed machine update
pub fn validate_machine_update(update: &MachineUpdate) -> AppResult<()> {
    if let Err(validation_errors) = update.validate() {
        return Err(rejected(&validation_errors));
    }

    let numeric = [
        ("plannedProductionTime", update.planned_production_time),
        ("operatingTime", update.operating_time),
        ("idealCycleTime", update.ideal_cycle_time),
        ("idealOutputRate", update.ideal_output_rate),
    ];
    for (field, value) in numeric {
        if let Some(value) = value {
            validate_raw_input(field, value)?;
        }
    }

    Ok(())
}

/// Validate a production sample submitted on its own
pub fn validate_production_input(input: &ProductionInput) -> AppResult<()> {
    check_piece_counts(input.total_pieces, input.good_pieces)
}

/// Validate a downtime event
pub fn validate_downtime_event(event: &DowntimeEvent) -> AppResult<()> {
    if let Err(validation_errors) = event.validate() {
        return Err(rejected(&validation_errors));
    }

    if event.reason.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Downtime reason is required".to_string(),
        ));
    }

    if let Some(end_time) = event.end_time {
        if end_time < event.start_time {
            return Err(AppError::ValidationError(format!(
                "Downtime end {} precedes start {}",
                end_time.to_rfc3339(),
                event.start_time.to_rfc3339()
            )));
        }
    }

    Ok(())
}

fn validate_sample(sample: &ProductionSample) -> AppResult<()> {
    check_piece_counts(sample.total_pieces, sample.good_pieces)
}

fn check_piece_counts(total_pieces: u64, good_pieces: u64) -> AppResult<()> {
    if good_pieces > total_pieces {
        return Err(AppError::ValidationError(format!(
            "goodPieces ({}) cannot exceed totalPieces ({})",
            good_pieces, total_pieces
        )));
    }
    Ok(())
}

/// Raw OEE inputs must be finite and non-negative
fn validate_raw_input(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() {
        return Err(AppError::ValidationError(format!(
            "{} must be a finite number",
            field
        )));
    }

    if value < 0.0 {
        return Err(AppError::ValidationError(format!(
            "{} must not be negative, got {}",
            field, value
        )));
    }

    Ok(())
}

fn rejected(validation_errors: &ValidationErrors) -> AppError {
    let mut error_messages: Vec<String> = validation_errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let msgs: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.message.as_ref().map(|c| c.as_ref()))
                .collect();
            format!("{}: {}", field, msgs.join(", "))
        })
        .collect();

    if error_messages.is_empty() {
        // Nested errors (downtime events) are not in field_errors()
        error_messages.push(validation_errors.to_string());
    }

    warn!(errors = ?error_messages, "Machine input validation failed");
    AppError::ValidationError(error_messages.join("; "))
}
