//src/history.rs
use std::fmt;
use tracing::{debug, warn};

use crate::db::{DbError, Store};
use crate::model::{ExerciseLog, WorkoutLog};
use crate::remote::RemoteLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    Remote,
    Local,
}

impl fmt::Display for HistorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => write!(f, "sheet"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// What was done the last time a workout was performed.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousPerformance {
    pub source: HistorySource,
    /// `YYYY-MM-DD`
    pub date: String,
    pub exercises: Vec<ExerciseLog>,
}

impl PreviousPerformance {
    /// Looks an exercise up by performed name or by the catalog name it replaced.
    pub fn exercise(&self, name: &str) -> Option<&ExerciseLog> {
        self.exercises
            .iter()
            .find(|e| e.name == name || e.replaces.as_deref() == Some(name))
    }

    /// Weight used for `set_number` last time, falling back to the last
    /// recorded set of that exercise. Used to pre-fill weight inputs.
    pub fn suggested_weight(&self, name: &str, set_number: u32) -> Option<f64> {
        let exercise = self.exercise(name)?;
        exercise
            .set(set_number)
            .or_else(|| exercise.sets.last())
            .map(|s| s.weight)
            .filter(|w| *w > 0.0)
    }
}

/// One row of the history listing.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub source: HistorySource,
    pub date: String,
    pub workout_id: String,
    pub workout_name: String,
    pub total_volume: f64,
    pub duration_secs: u64,
    pub exercise_count: usize,
}

impl From<&WorkoutLog> for HistoryEntry {
    fn from(log: &WorkoutLog) -> Self {
        Self {
            source: HistorySource::Local,
            date: log.date_key(),
            workout_id: log.workout_type.clone(),
            workout_name: log.workout_name.clone(),
            total_volume: log.total_volume(),
            duration_secs: log.duration,
            exercise_count: log.exercises.len(),
        }
    }
}

/// Most recent local log of `workout_id`. Dates compare as calendar day
/// strings; among logs of the same day the later one in the list wins.
pub fn latest_local<'a>(logs: &'a [WorkoutLog], workout_id: &str) -> Option<&'a WorkoutLog> {
    logs.iter()
        .filter(|log| log.workout_type == workout_id)
        .max_by(|a, b| a.date_key().cmp(&b.date_key()))
}

/// Chooses between the remote ledger and the local store: remote first when
/// connected, local whenever the remote fails or has nothing.
pub struct HistoryReconciler<'a> {
    store: &'a Store,
    ledger: Option<&'a dyn RemoteLedger>,
}

impl<'a> HistoryReconciler<'a> {
    pub fn new(store: &'a Store, ledger: Option<&'a dyn RemoteLedger>) -> Self {
        Self { store, ledger }
    }

    fn connected_ledger(&self) -> Option<&'a dyn RemoteLedger> {
        self.ledger.filter(|l| l.is_connected())
    }

    /// # Errors
    /// Only local storage errors are returned; remote failures fall back.
    pub fn previous_performance(
        &self,
        workout_id: &str,
    ) -> Result<Option<PreviousPerformance>, DbError> {
        if let Some(ledger) = self.connected_ledger() {
            match ledger.read_previous_session(workout_id) {
                Ok(Some(session)) if !session.exercises.is_empty() => {
                    return Ok(Some(PreviousPerformance {
                        source: HistorySource::Remote,
                        date: session.date,
                        exercises: session.exercises,
                    }));
                }
                Ok(_) => debug!("No remote history for '{workout_id}', using local logs"),
                Err(e) => warn!("Remote history unavailable ({e}), using local logs"),
            }
        }

        let logs = self.store.list_workout_logs()?;
        Ok(latest_local(&logs, workout_id).map(|log| PreviousPerformance {
            source: HistorySource::Local,
            date: log.date_key(),
            exercises: log.exercises.clone(),
        }))
    }

    /// All sessions, newest day first. Remote summaries come pre-aggregated;
    /// local logs are aggregated here.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, DbError> {
        let mut entries = match self.remote_history() {
            Some(entries) => entries,
            None => self
                .store
                .list_workout_logs()?
                .iter()
                .map(HistoryEntry::from)
                .collect(),
        };
        // Reverse first so the stable sort puts later same-day entries on top.
        entries.reverse();
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(entries)
    }

    fn remote_history(&self) -> Option<Vec<HistoryEntry>> {
        let ledger = self.connected_ledger()?;
        match ledger.read_all_summaries() {
            Ok(summaries) if !summaries.is_empty() => Some(
                summaries
                    .into_iter()
                    .map(|s| HistoryEntry {
                        source: HistorySource::Remote,
                        date: s.date,
                        workout_id: s.workout_id,
                        workout_name: s.workout_name,
                        total_volume: s.total_volume,
                        duration_secs: s.duration_secs,
                        exercise_count: s.exercise_count,
                    })
                    .collect(),
            ),
            Ok(_) => None,
            Err(e) => {
                warn!("Remote history unavailable ({e}), using local logs");
                None
            }
        }
    }
}
