//src/catalog.rs
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::model::{DurationUnit, TrackingMode};

const BUILTIN_CATALOG: &str = include_str!("../catalog.toml");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("I/O error reading catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse catalog (TOML): {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Workout id '{0}' is defined more than once")]
    DuplicateWorkout(String),
    #[error("Workout '{0}' has no exercises")]
    EmptyWorkout(String),
    #[error("Exercise '{exercise}' appears twice in workout '{workout}'")]
    DuplicateExercise { workout: String, exercise: String },
}

/// One exercise slot of a workout program.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExerciseDefinition {
    pub name: String,
    #[serde(default, rename = "type")]
    pub mode: TrackingMode,
    pub sets: u32,
    /// Target description, e.g. "8-12", "10/side", "AMRAP".
    pub reps: String,
    pub rest: u32,
    #[serde(default)]
    pub superset: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub target_duration: Option<f64>,
    #[serde(default)]
    pub duration_unit: Option<DurationUnit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkoutDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub focus: Option<String>,
    /// Set by the loader for workouts from the optional pool.
    #[serde(skip)]
    pub optional: bool,
    pub exercises: Vec<ExerciseDefinition>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// An alternative exercise, optionally with its own targets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawOption")]
pub struct SubstituteOption {
    pub name: String,
    pub sets: Option<u32>,
    pub reps: Option<String>,
    pub rest: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
    Name(String),
    Detailed {
        name: String,
        sets: Option<u32>,
        reps: Option<String>,
        rest: Option<u32>,
    },
}

impl From<RawOption> for SubstituteOption {
    fn from(raw: RawOption) -> Self {
        match raw {
            RawOption::Name(name) => Self {
                name,
                sets: None,
                reps: None,
                rest: None,
            },
            RawOption::Detailed {
                name,
                sets,
                reps,
                rest,
            } => Self {
                name,
                sets,
                reps,
                rest,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubstitutionEntry {
    pub options: Vec<SubstituteOption>,
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Targets shown for one exercise slot once any substitution is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseTargets {
    pub name: String,
    pub mode: TrackingMode,
    pub sets: u32,
    pub reps: String,
    pub rest: u32,
    pub substituted: bool,
}

impl ExerciseDefinition {
    /// Resolves the displayed targets. A substitute's own sets/reps/rest win
    /// over the definition's, rest included.
    pub fn targets_with(
        &self,
        substitute: Option<&str>,
        option: Option<&SubstituteOption>,
    ) -> ExerciseTargets {
        let Some(name) = substitute else {
            return ExerciseTargets {
                name: self.name.clone(),
                mode: self.mode,
                sets: self.sets,
                reps: self.reps.clone(),
                rest: self.rest,
                substituted: false,
            };
        };
        ExerciseTargets {
            name: name.to_string(),
            mode: self.mode,
            sets: option.and_then(|o| o.sets).unwrap_or(self.sets),
            reps: option
                .and_then(|o| o.reps.clone())
                .unwrap_or_else(|| self.reps.clone()),
            rest: option.and_then(|o| o.rest).unwrap_or(self.rest),
            substituted: true,
        }
    }
}

/// Read-only source of workout programs and exercise alternatives.
pub trait WorkoutCatalog: Send + Sync {
    fn get_workout(&self, id: &str) -> Option<&WorkoutDefinition>;
    fn list_workouts(&self) -> Vec<&WorkoutDefinition>;
    fn get_optional_workout(&self, id: &str) -> Option<&WorkoutDefinition>;
    fn list_optional_workouts(&self) -> Vec<&WorkoutDefinition>;
    fn get_substitutions(&self, exercise_name: &str) -> Option<&SubstitutionEntry>;
    /// Returns the input unchanged when no bodyweight alternative is mapped.
    fn get_bodyweight_substitution<'a>(&'a self, exercise_name: &'a str) -> &'a str;

    fn has_substitutions(&self, exercise_name: &str) -> bool {
        self.get_substitutions(exercise_name).is_some()
    }

    fn find_workout(&self, id: &str, optional: bool) -> Option<&WorkoutDefinition> {
        if optional {
            self.get_optional_workout(id)
        } else {
            self.get_workout(id)
        }
    }

    fn substitute_option(&self, original: &str, substitute: &str) -> Option<&SubstituteOption> {
        self.get_substitutions(original)?
            .options
            .iter()
            .find(|o| o.name == substitute)
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    workouts: Vec<WorkoutDefinition>,
    #[serde(default)]
    optional_workouts: Vec<WorkoutDefinition>,
    #[serde(default)]
    substitutions: BTreeMap<String, SubstitutionEntry>,
    #[serde(default)]
    bodyweight: BTreeMap<String, String>,
}

/// Catalog backed by TOML data, the embedded program by default.
#[derive(Debug, Clone)]
pub struct BuiltinCatalog {
    workouts: Vec<WorkoutDefinition>,
    optional_workouts: Vec<WorkoutDefinition>,
    substitutions: BTreeMap<String, SubstitutionEntry>,
    bodyweight: BTreeMap<String, String>,
}

impl BuiltinCatalog {
    /// Loads the program shipped with the binary.
    /// # Errors
    /// Returns `CatalogError` if the embedded data fails validation.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// # Errors
    /// Returns `CatalogError` if the file cannot be read, parsed or validated.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        debug!("Loading workout catalog from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// # Errors
    /// Returns `CatalogError` on TOML errors, duplicate ids, empty workouts or
    /// exercise names repeated within a workout.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        let mut optional_workouts = file.optional_workouts;
        for w in &mut optional_workouts {
            w.optional = true;
        }
        validate_pool(&file.workouts)?;
        validate_pool(&optional_workouts)?;
        Ok(Self {
            workouts: file.workouts,
            optional_workouts,
            substitutions: file.substitutions,
            bodyweight: file.bodyweight,
        })
    }
}

fn validate_pool(pool: &[WorkoutDefinition]) -> Result<(), CatalogError> {
    let mut ids = HashSet::new();
    for workout in pool {
        if !ids.insert(workout.id.as_str()) {
            return Err(CatalogError::DuplicateWorkout(workout.id.clone()));
        }
        if workout.exercises.is_empty() {
            return Err(CatalogError::EmptyWorkout(workout.id.clone()));
        }
        let mut names = HashSet::new();
        for exercise in &workout.exercises {
            if !names.insert(exercise.name.as_str()) {
                return Err(CatalogError::DuplicateExercise {
                    workout: workout.id.clone(),
                    exercise: exercise.name.clone(),
                });
            }
        }
    }
    Ok(())
}

impl WorkoutCatalog for BuiltinCatalog {
    fn get_workout(&self, id: &str) -> Option<&WorkoutDefinition> {
        self.workouts.iter().find(|w| w.id == id)
    }

    fn list_workouts(&self) -> Vec<&WorkoutDefinition> {
        self.workouts.iter().collect()
    }

    fn get_optional_workout(&self, id: &str) -> Option<&WorkoutDefinition> {
        self.optional_workouts.iter().find(|w| w.id == id)
    }

    fn list_optional_workouts(&self) -> Vec<&WorkoutDefinition> {
        self.optional_workouts.iter().collect()
    }

    fn get_substitutions(&self, exercise_name: &str) -> Option<&SubstitutionEntry> {
        self.substitutions.get(exercise_name)
    }

    fn get_bodyweight_substitution<'a>(&'a self, exercise_name: &'a str) -> &'a str {
        self.bodyweight
            .get(exercise_name)
            .map_or(exercise_name, String::as_str)
    }
}
