//src/model.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};

/// How an exercise is tracked during a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TrackingMode {
    #[default]
    Reps,
    Duration,
    Completion,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DurationUnit {
    #[default]
    Seconds,
    Minutes,
}

impl DurationUnit {
    pub const fn short(self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Minutes => "min",
        }
    }

    /// Converts a whole number of seconds into this unit.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_seconds(self, seconds: u64) -> f64 {
        match self {
            Self::Seconds => seconds as f64,
            Self::Minutes => seconds as f64 / 60.0,
        }
    }
}

/// What was actually performed for one set, discriminated by tracking mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Performed {
    Reps(u32),
    Duration { amount: f64, unit: DurationUnit },
    Completed,
}

impl Performed {
    pub const fn mode(&self) -> TrackingMode {
        match self {
            Self::Reps(_) => TrackingMode::Reps,
            Self::Duration { .. } => TrackingMode::Duration,
            Self::Completed => TrackingMode::Completion,
        }
    }

    /// Unit of a duration; other modes report the default.
    pub fn unit(&self) -> DurationUnit {
        match *self {
            Self::Duration { unit, .. } => unit,
            _ => DurationUnit::default(),
        }
    }

    /// Numeric quantity as written to the remote ledger and CSV exports.
    pub fn quantity(&self) -> f64 {
        match *self {
            Self::Reps(reps) => f64::from(reps),
            Self::Duration { amount, .. } => amount,
            Self::Completed => 1.0,
        }
    }
}

impl fmt::Display for Performed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reps(reps) => write!(f, "{reps} reps"),
            Self::Duration { amount, unit } => write!(f, "{amount} {}", unit.short()),
            Self::Completed => write!(f, "done"),
        }
    }
}

/// One recorded set. Serialized in the `{setNumber, reps, weight, completed}`
/// shape of existing local logs; duration and completion sets add a `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "StoredSet", from = "StoredSet")]
pub struct SetRecord {
    pub set_number: u32,
    pub performed: Performed,
    pub weight: f64,
    pub completed: bool,
}

impl SetRecord {
    pub const fn reps(set_number: u32, reps: u32, weight: f64) -> Self {
        Self {
            set_number,
            performed: Performed::Reps(reps),
            weight,
            completed: true,
        }
    }

    pub const fn duration(amount: f64, unit: DurationUnit) -> Self {
        Self {
            set_number: 1,
            performed: Performed::Duration { amount, unit },
            weight: 0.0,
            completed: true,
        }
    }

    pub const fn completion() -> Self {
        Self {
            set_number: 1,
            performed: Performed::Completed,
            weight: 0.0,
            completed: true,
        }
    }

    /// reps x weight for rep sets, zero otherwise.
    pub fn volume(&self) -> f64 {
        match self.performed {
            Performed::Reps(reps) => f64::from(reps) * self.weight,
            _ => 0.0,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSet {
    set_number: u32,
    #[serde(default)]
    reps: u32,
    #[serde(default)]
    weight: f64,
    #[serde(default = "default_true")]
    completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<TrackingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<DurationUnit>,
}

const fn default_true() -> bool {
    true
}

impl From<SetRecord> for StoredSet {
    fn from(record: SetRecord) -> Self {
        let (reps, kind, duration, unit) = match record.performed {
            Performed::Reps(reps) => (reps, None, None, None),
            Performed::Duration { amount, unit } => {
                (0, Some(TrackingMode::Duration), Some(amount), Some(unit))
            }
            Performed::Completed => (1, Some(TrackingMode::Completion), None, None),
        };
        Self {
            set_number: record.set_number,
            reps,
            weight: record.weight,
            completed: record.completed,
            kind,
            duration,
            unit,
        }
    }
}

impl From<StoredSet> for SetRecord {
    fn from(stored: StoredSet) -> Self {
        let performed = match (stored.kind, stored.duration) {
            (_, Some(amount)) => Performed::Duration {
                amount,
                unit: stored.unit.unwrap_or_default(),
            },
            (Some(TrackingMode::Completion), None) => Performed::Completed,
            _ => Performed::Reps(stored.reps),
        };
        Self {
            set_number: stored.set_number,
            performed,
            weight: stored.weight,
            completed: stored.completed,
        }
    }
}

/// Per-exercise tracking entry; also the persisted exercise shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseLog {
    pub name: String,
    pub rest: u32,
    pub sets: Vec<SetRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substituted_with: Option<String>,
    /// Catalog name of the exercise a substitute stood in for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
}

impl ExerciseLog {
    pub fn new(name: impl Into<String>, rest: u32) -> Self {
        Self {
            name: name.into(),
            rest,
            sets: Vec::new(),
            substituted_with: None,
            replaces: None,
        }
    }

    /// Inserts or replaces the set with the same number, keeping the list
    /// sorted by set number.
    pub fn upsert_set(&mut self, record: SetRecord) {
        match self
            .sets
            .binary_search_by_key(&record.set_number, |s| s.set_number)
        {
            Ok(pos) => self.sets[pos] = record,
            Err(pos) => self.sets.insert(pos, record),
        }
    }

    pub fn remove_set(&mut self, set_number: u32) -> Option<SetRecord> {
        let pos = self
            .sets
            .binary_search_by_key(&set_number, |s| s.set_number)
            .ok()?;
        Some(self.sets.remove(pos))
    }

    pub fn replace_sets(&mut self, record: SetRecord) {
        self.sets.clear();
        self.sets.push(record);
    }

    pub fn set(&self, set_number: u32) -> Option<&SetRecord> {
        self.sets.iter().find(|s| s.set_number == set_number)
    }

    pub fn has_sets(&self) -> bool {
        !self.sets.is_empty()
    }

    pub fn volume(&self) -> f64 {
        self.sets.iter().map(SetRecord::volume).sum()
    }
}

/// A finished session. Never mutated once appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutLog {
    pub id: String,
    pub date: DateTime<Utc>,
    pub workout_type: String,
    #[serde(default)]
    pub workout_name: String,
    pub exercises: Vec<ExerciseLog>,
    /// Elapsed seconds.
    pub duration: u64,
    pub completed: bool,
    #[serde(default)]
    pub substitutions: BTreeMap<usize, String>,
}

impl WorkoutLog {
    pub fn total_volume(&self) -> f64 {
        self.exercises.iter().map(ExerciseLog::volume).sum()
    }

    pub fn set_count(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }

    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }

    /// Calendar date as `YYYY-MM-DD`, the key used for "most recent" ordering.
    pub fn date_key(&self) -> String {
        date_key(self.day())
    }

    pub fn exercise(&self, name: &str) -> Option<&ExerciseLog> {
        self.exercises
            .iter()
            .find(|e| e.name == name || e.replaces.as_deref() == Some(name))
    }
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
