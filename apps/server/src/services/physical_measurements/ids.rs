//! Measurement id derivation
//!
//! Measurement ids are derived from the record id instead of being allocated, so a
//! record's whole tree can be written without extra round trips:
//! `measurement_id = physical_measurements_id * 1000 + position`.

use crate::{models::PhysicalMeasurements, Error, Result};

const MAX_MEASUREMENTS: i64 = 1000;
const WARN_MEASUREMENTS: i64 = 900;

pub fn make_measurement_id(physical_measurements_id: i64, count: i64) -> Result<i64> {
    if count >= MAX_MEASUREMENTS {
        return Err(Error::Internal(format!(
            "Physical measurements {physical_measurements_id} has more than {MAX_MEASUREMENTS} measurements"
        )));
    }
    if count == WARN_MEASUREMENTS {
        tracing::error!(
            physical_measurements_id,
            "measurement count reached {WARN_MEASUREMENTS}; nearing limit of {MAX_MEASUREMENTS}"
        );
    }
    Ok(physical_measurements_id * MAX_MEASUREMENTS + count)
}

/// Number top-level measurements in order, each followed by its components
pub fn set_measurement_ids(record: &mut PhysicalMeasurements) -> Result<()> {
    let pm_id = record.physical_measurements_id;
    let mut count = 0;
    for measurement in &mut record.measurements {
        measurement.physical_measurements_id = pm_id;
        measurement.measurement_id = make_measurement_id(pm_id, count)?;
        count += 1;
        for child in &mut measurement.measurements {
            child.physical_measurements_id = pm_id;
            child.measurement_id = make_measurement_id(pm_id, count)?;
            count += 1;
        }
    }
    Ok(())
}
