//src/export.rs
use anyhow::{Context, Result};
use std::io::Write;

use crate::model::{Performed, WorkoutLog};

pub const CSV_HEADER: [&str; 7] = [
    "Date",
    "Workout Type",
    "Exercise",
    "Set",
    "Reps",
    "Weight (lbs)",
    "Rest (s)",
];

/// Writes one CSV row per recorded set. Duration sets put their amount in the
/// reps column; completion sets count as 1.
///
/// # Errors
/// Fails if writing to `writer` fails.
pub fn export_csv<W: Write>(logs: &[WorkoutLog], writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)
        .context("Failed to write CSV header")?;

    let mut rows = 0;
    for log in logs {
        let date = log.date_key();
        for exercise in &log.exercises {
            for set in &exercise.sets {
                let quantity = match set.performed {
                    Performed::Reps(reps) => reps.to_string(),
                    other => other.quantity().to_string(),
                };
                let set_number = set.set_number.to_string();
                let weight = set.weight.to_string();
                let rest = exercise.rest.to_string();
                wtr.write_record([
                    date.as_str(),
                    log.workout_type.as_str(),
                    exercise.name.as_str(),
                    set_number.as_str(),
                    quantity.as_str(),
                    weight.as_str(),
                    rest.as_str(),
                ])
                .with_context(|| format!("Failed to write CSV row for workout {}", log.id))?;
                rows += 1;
            }
        }
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(rows)
}
