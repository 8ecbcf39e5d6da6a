//src/session.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{ExerciseTargets, SubstitutionEntry, WorkoutCatalog, WorkoutDefinition};
use crate::db::{DbError, Store};
use crate::model::{date_key, DurationUnit, ExerciseLog, SetRecord, TrackingMode, WorkoutLog};
use crate::platform::{NoopPlatform, Platform};
use crate::remote::{RemoteSync, SetRow, SummaryRecord};
use crate::timer::{Clock, RestTimer, RestTimerState, Stopwatch, TimerEvent, TimerStatus};

const DEFAULT_TICK_MS: u64 = 1000;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown workout: '{0}'")]
    UnknownWorkout(String),
    #[error("A '{0}' session is already in progress. Finish or cancel it first.")]
    SessionAlreadyActive(String),
    #[error("No workout session is in progress")]
    NoActiveSession,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No exercises completed. Cannot finish workout.")]
    NothingCompleted,
    #[error("Exercise index {0} is not part of this workout")]
    ExerciseOutOfRange(usize),
    #[error(transparent)]
    Store(#[from] DbError),
}

/// The in-progress session. Exercise entries parallel the workout
/// definition's exercise order and keep the catalog names; substitutions
/// are applied on top when displaying and when finishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub workout_id: String,
    pub workout_name: String,
    pub optional: bool,
    pub started_at: DateTime<Utc>,
    pub exercises: Vec<ExerciseLog>,
    pub substitutions: BTreeMap<usize, String>,
    #[serde(default)]
    pub bodyweight_mode: bool,
    #[serde(default)]
    pub stopwatch: Option<Stopwatch>,
}

impl SessionState {
    /// Name the user actually performs at `index`.
    pub fn display_name(&self, index: usize) -> Option<&str> {
        self.substitutions
            .get(&index)
            .map(String::as_str)
            .or_else(|| self.exercises.get(index).map(|e| e.name.as_str()))
    }

    pub fn recorded_sets(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }
}

/// Recovery snapshot: the session plus its rest countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    #[serde(default)]
    pub rest_timer: RestTimerState,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    NothingToRecover,
    Resumed,
    Declined,
    /// The snapshot was unreadable or no longer matches the catalog.
    Discarded,
}

/// Decides whether an interrupted session should be resumed.
pub trait ResumePrompt {
    fn confirm_resume(&mut self, snapshot: &SessionSnapshot) -> bool;
}

impl<F> ResumePrompt for F
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    fn confirm_resume(&mut self, snapshot: &SessionSnapshot) -> bool {
        self(snapshot)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start {
        workout_id: String,
        optional: bool,
        bodyweight_mode: bool,
    },
    RecordSet {
        exercise: usize,
        set_number: u32,
        reps: i64,
        weight: Option<f64>,
    },
    RetractSet {
        exercise: usize,
        set_number: u32,
    },
    RecordDuration {
        exercise: usize,
        amount: f64,
        unit: DurationUnit,
    },
    RecordCompletion {
        exercise: usize,
        complete: bool,
    },
    Substitute {
        exercise: usize,
        substitute: String,
    },
    ClearSubstitution {
        exercise: usize,
    },
    StartStopwatch {
        exercise: usize,
    },
    PauseStopwatch,
    StopStopwatch {
        unit: DurationUnit,
    },
    PauseRest,
    ResumeRest,
    SkipRest,
    Finish,
    Cancel,
}

/// Change notifications delivered to subscribers after each mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { workout_id: String },
    Resumed { workout_id: String },
    SetRecorded { exercise: usize, set_number: u32 },
    SetRetracted { exercise: usize, set_number: u32 },
    ExerciseCleared { exercise: usize },
    SubstitutionChanged {
        exercise: usize,
        substitute: Option<String>,
    },
    StopwatchChanged { exercise: usize, running: bool },
    RestStarted { total_secs: u32 },
    RestPaused { remaining_secs: u32 },
    RestResumed { remaining_secs: u32 },
    RestTick { remaining_secs: u32 },
    RestCompleted,
    RestDismissed,
    Finished { log_id: String },
    Cancelled,
}

pub type Listener = Box<dyn FnMut(&SessionEvent) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseProgress {
    pub index: usize,
    pub name: String,
    pub mode: TrackingMode,
    pub recorded: usize,
    pub target_sets: u32,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub exercises: Vec<ExerciseProgress>,
    pub completed: usize,
    pub total: usize,
}

/// Owns the lifecycle of one workout session at a time.
///
/// Every mutating operation validates first, then writes the recovery
/// snapshot, and only then swaps in the new state. A failed validation or
/// snapshot write therefore leaves the session exactly as it was.
pub struct SessionMachine {
    store: Store,
    catalog: Arc<dyn WorkoutCatalog>,
    clock: Arc<dyn Clock>,
    platform: Arc<dyn Platform>,
    remote: RemoteSync,
    timer: RestTimer,
    active: Option<SessionState>,
    last_log_id: Option<i64>,
    listeners: Vec<Listener>,
}

impl SessionMachine {
    pub fn new(store: Store, catalog: Arc<dyn WorkoutCatalog>, clock: Arc<dyn Clock>) -> Self {
        let timer = RestTimer::new(Arc::clone(&clock), DEFAULT_TICK_MS);
        Self {
            store,
            catalog,
            clock,
            platform: Arc::new(NoopPlatform),
            remote: RemoteSync::disabled(),
            timer,
            active: None,
            last_log_id: None,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: RemoteSync) -> Self {
        self.remote = remote;
        self
    }

    #[must_use]
    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.timer = RestTimer::new(Arc::clone(&self.clock), tick_ms);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<dyn WorkoutCatalog> {
        &self.catalog
    }

    pub fn remote(&self) -> &RemoteSync {
        &self.remote
    }

    pub fn set_remote(&mut self, remote: RemoteSync) {
        self.remote = remote;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn phase(&self) -> Phase {
        if self.active.is_some() {
            Phase::InProgress
        } else {
            Phase::Idle
        }
    }

    /// Read-only view of the active session.
    pub fn state(&self) -> Option<&SessionState> {
        self.active.as_ref()
    }

    /// The active session and rest countdown as they would be persisted now.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.active.as_ref().map(|state| SessionSnapshot {
            state: state.clone(),
            rest_timer: self.timer.state(),
            saved_at: self.clock.now(),
        })
    }

    pub fn rest_timer(&self) -> RestTimerState {
        self.timer.state()
    }

    pub fn next_timer_deadline(&self) -> Option<DateTime<Utc>> {
        self.timer.next_deadline()
    }

    /// Definition of the workout being performed.
    pub fn workout(&self) -> Option<&WorkoutDefinition> {
        let state = self.active.as_ref()?;
        self.catalog.find_workout(&state.workout_id, state.optional)
    }

    pub fn dispatch(&mut self, command: Command) -> Result<(), SessionError> {
        match command {
            Command::Start {
                workout_id,
                optional,
                bodyweight_mode,
            } => self.start(&workout_id, optional, bodyweight_mode),
            Command::RecordSet {
                exercise,
                set_number,
                reps,
                weight,
            } => self.record_reps_set(exercise, set_number, reps, weight),
            Command::RetractSet {
                exercise,
                set_number,
            } => self.retract_reps_set(exercise, set_number).map(|_| ()),
            Command::RecordDuration {
                exercise,
                amount,
                unit,
            } => self.record_duration_exercise(exercise, amount, unit),
            Command::RecordCompletion { exercise, complete } => {
                self.record_completion_exercise(exercise, complete)
            }
            Command::Substitute {
                exercise,
                substitute,
            } => self.set_substitution(exercise, &substitute),
            Command::ClearSubstitution { exercise } => {
                self.clear_substitution(exercise).map(|_| ())
            }
            Command::StartStopwatch { exercise } => self.start_stopwatch(exercise),
            Command::PauseStopwatch => self.pause_stopwatch().map(|_| ()),
            Command::StopStopwatch { unit } => self.stop_stopwatch(unit).map(|_| ()),
            Command::PauseRest => self.pause_rest().map(|_| ()),
            Command::ResumeRest => self.resume_rest().map(|_| ()),
            Command::SkipRest => self.skip_rest(),
            Command::Finish => self.finish().map(|_| ()),
            Command::Cancel => self.cancel(),
        }
    }

    /// Begins a session of `workout_id` from the main or optional pool.
    ///
    /// With bodyweight mode on, every exercise with a different bodyweight
    /// alternative gets that alternative as a substitution, fixed for the
    /// rest of the session.
    ///
    /// # Errors
    /// `UnknownWorkout`, `SessionAlreadyActive`, or `Store` if the snapshot
    /// cannot be written.
    pub fn start(
        &mut self,
        workout_id: &str,
        optional: bool,
        bodyweight_mode: bool,
    ) -> Result<(), SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::SessionAlreadyActive(active.workout_id.clone()));
        }
        let workout = self
            .catalog
            .find_workout(workout_id, optional)
            .ok_or_else(|| SessionError::UnknownWorkout(workout_id.to_string()))?;

        let exercises = workout
            .exercises
            .iter()
            .map(|e| ExerciseLog::new(e.name.as_str(), e.rest))
            .collect();

        let mut substitutions = BTreeMap::new();
        if bodyweight_mode {
            for (index, exercise) in workout.exercises.iter().enumerate() {
                let mapped = self.catalog.get_bodyweight_substitution(&exercise.name);
                if mapped != exercise.name {
                    substitutions.insert(index, mapped.to_string());
                }
            }
        }

        let state = SessionState {
            workout_id: workout.id.clone(),
            workout_name: workout.name.clone(),
            optional,
            started_at: self.clock.now(),
            exercises,
            substitutions,
            bodyweight_mode,
            stopwatch: None,
        };

        self.commit(state, Some(RestTimerState::default()))?;
        if let Err(e) = self.platform.keep_awake() {
            warn!("Could not request keep-awake: {e:#}");
        }
        info!("Started workout '{workout_id}' (bodyweight mode: {bodyweight_mode})");
        self.emit(SessionEvent::Started {
            workout_id: workout_id.to_string(),
        });
        Ok(())
    }

    /// Displayed targets for one exercise, substitution applied.
    pub fn targets(&self, index: usize) -> Result<ExerciseTargets, SessionError> {
        let state = self.active_state()?;
        self.targets_for(state, index)
    }

    /// Catalog alternatives for the exercise at `index`.
    pub fn substitution_options(
        &self,
        index: usize,
    ) -> Result<Option<SubstitutionEntry>, SessionError> {
        let state = self.active_state()?;
        let original = state
            .exercises
            .get(index)
            .ok_or(SessionError::ExerciseOutOfRange(index))?;
        Ok(self.catalog.get_substitutions(&original.name).cloned())
    }

    /// Records (or re-records) a rep set. `reps` must be positive; a missing,
    /// negative or non-finite weight is taken as 0.
    ///
    /// # Errors
    /// `InvalidInput` leaves the set list untouched.
    pub fn record_reps_set(
        &mut self,
        index: usize,
        set_number: u32,
        reps: i64,
        weight: Option<f64>,
    ) -> Result<(), SessionError> {
        let (mut next, targets) = self.prepare(index)?;
        if targets.mode != TrackingMode::Reps {
            return Err(SessionError::InvalidInput(format!(
                "'{}' is tracked by {}, not reps",
                targets.name, targets.mode
            )));
        }
        if set_number == 0 {
            return Err(SessionError::InvalidInput(
                "Set numbers start at 1".to_string(),
            ));
        }
        let reps = u32::try_from(reps)
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| {
                SessionError::InvalidInput("Please enter number of reps completed.".to_string())
            })?;
        let weight = weight.filter(|w| w.is_finite() && *w >= 0.0).unwrap_or(0.0);

        next.exercises[index].upsert_set(SetRecord::reps(set_number, reps, weight));
        let now = self.clock.now();
        let rest = (targets.rest > 0).then(|| RestTimerState::started(targets.rest, now));
        self.commit(next, rest)?;

        debug!(
            "Recorded set {set_number} of '{}': {reps} x {weight}",
            targets.name
        );
        self.remote.submit_set(SetRow {
            date: date_key(now.date_naive()),
            workout_id: self.active_workout_id(),
            exercise_name: targets.name.clone(),
            mode: TrackingMode::Reps,
            unit: DurationUnit::default(),
            set_number,
            quantity: f64::from(reps),
            weight,
            rest_secs: targets.rest,
        });
        self.emit(SessionEvent::SetRecorded {
            exercise: index,
            set_number,
        });
        if rest.is_some() {
            self.emit(SessionEvent::RestStarted {
                total_secs: targets.rest,
            });
        }
        Ok(())
    }

    /// Removes a recorded set. Returns whether one was there.
    pub fn retract_reps_set(&mut self, index: usize, set_number: u32) -> Result<bool, SessionError> {
        let (mut next, _) = self.prepare(index)?;
        if next.exercises[index].remove_set(set_number).is_none() {
            return Ok(false);
        }
        self.commit(next, None)?;
        self.emit(SessionEvent::SetRetracted {
            exercise: index,
            set_number,
        });
        Ok(true)
    }

    /// Records the single entry of a duration exercise, replacing any
    /// earlier one.
    pub fn record_duration_exercise(
        &mut self,
        index: usize,
        amount: f64,
        unit: DurationUnit,
    ) -> Result<(), SessionError> {
        let (mut next, targets) = self.prepare(index)?;
        if targets.mode != TrackingMode::Duration {
            return Err(SessionError::InvalidInput(format!(
                "'{}' is not a timed exercise",
                targets.name
            )));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(SessionError::InvalidInput(
                "Duration must be a positive number".to_string(),
            ));
        }

        next.exercises[index].replace_sets(SetRecord::duration(amount, unit));
        if next.stopwatch.is_some_and(|s| s.exercise_index == index) {
            next.stopwatch = None;
        }
        let now = self.clock.now();
        let rest = (targets.rest > 0).then(|| RestTimerState::started(targets.rest, now));
        self.commit(next, rest)?;

        self.remote.submit_set(SetRow {
            date: date_key(now.date_naive()),
            workout_id: self.active_workout_id(),
            exercise_name: targets.name.clone(),
            mode: TrackingMode::Duration,
            unit,
            set_number: 1,
            quantity: amount,
            weight: 0.0,
            rest_secs: targets.rest,
        });
        self.emit(SessionEvent::SetRecorded {
            exercise: index,
            set_number: 1,
        });
        if rest.is_some() {
            self.emit(SessionEvent::RestStarted {
                total_secs: targets.rest,
            });
        }
        Ok(())
    }

    pub fn record_completion_exercise(
        &mut self,
        index: usize,
        complete: bool,
    ) -> Result<(), SessionError> {
        let (mut next, targets) = self.prepare(index)?;
        if targets.mode != TrackingMode::Completion {
            return Err(SessionError::InvalidInput(format!(
                "'{}' is not a check-off exercise",
                targets.name
            )));
        }

        if !complete {
            if !next.exercises[index].has_sets() {
                return Ok(());
            }
            next.exercises[index].sets.clear();
            self.commit(next, None)?;
            self.emit(SessionEvent::ExerciseCleared { exercise: index });
            return Ok(());
        }

        next.exercises[index].replace_sets(SetRecord::completion());
        let now = self.clock.now();
        let rest = (targets.rest > 0).then(|| RestTimerState::started(targets.rest, now));
        self.commit(next, rest)?;

        self.remote.submit_set(SetRow {
            date: date_key(now.date_naive()),
            workout_id: self.active_workout_id(),
            exercise_name: targets.name.clone(),
            mode: TrackingMode::Completion,
            unit: DurationUnit::default(),
            set_number: 1,
            quantity: 1.0,
            weight: 0.0,
            rest_secs: targets.rest,
        });
        self.emit(SessionEvent::SetRecorded {
            exercise: index,
            set_number: 1,
        });
        if rest.is_some() {
            self.emit(SessionEvent::RestStarted {
                total_secs: targets.rest,
            });
        }
        Ok(())
    }

    /// Performs `substitute` in place of the exercise at `index`. Choosing
    /// the original name clears the substitution.
    pub fn set_substitution(&mut self, index: usize, substitute: &str) -> Result<(), SessionError> {
        let (mut next, _) = self.prepare(index)?;
        let substitute = substitute.trim();
        if substitute.is_empty() {
            return Err(SessionError::InvalidInput(
                "Substitute name cannot be empty".to_string(),
            ));
        }
        if substitute == next.exercises[index].name {
            return self.clear_substitution(index).map(|_| ());
        }
        if next.substitutions.get(&index).map(String::as_str) == Some(substitute) {
            return Ok(());
        }
        next.substitutions.insert(index, substitute.to_string());
        self.commit(next, None)?;
        self.emit(SessionEvent::SubstitutionChanged {
            exercise: index,
            substitute: Some(substitute.to_string()),
        });
        Ok(())
    }

    pub fn clear_substitution(&mut self, index: usize) -> Result<bool, SessionError> {
        let (mut next, _) = self.prepare(index)?;
        if next.substitutions.remove(&index).is_none() {
            return Ok(false);
        }
        self.commit(next, None)?;
        self.emit(SessionEvent::SubstitutionChanged {
            exercise: index,
            substitute: None,
        });
        Ok(true)
    }

    pub fn progress(&self) -> Result<Progress, SessionError> {
        let state = self.active_state()?;
        let mut exercises = Vec::with_capacity(state.exercises.len());
        for (index, log) in state.exercises.iter().enumerate() {
            let targets = self.targets_for(state, index)?;
            let recorded = log.sets.len();
            let complete = match targets.mode {
                TrackingMode::Reps => {
                    recorded > 0 && recorded >= usize::try_from(targets.sets).unwrap_or(usize::MAX)
                }
                TrackingMode::Duration | TrackingMode::Completion => log.has_sets(),
            };
            exercises.push(ExerciseProgress {
                index,
                name: targets.name,
                mode: targets.mode,
                recorded,
                target_sets: targets.sets,
                complete,
            });
        }
        let completed = exercises.iter().filter(|e| e.complete).count();
        let total = exercises.len();
        Ok(Progress {
            exercises,
            completed,
            total,
        })
    }

    /// Starts timing a duration exercise, or resumes its paused stopwatch.
    /// A stopwatch running for another exercise is discarded.
    pub fn start_stopwatch(&mut self, index: usize) -> Result<(), SessionError> {
        let (mut next, targets) = self.prepare(index)?;
        if targets.mode != TrackingMode::Duration {
            return Err(SessionError::InvalidInput(format!(
                "'{}' is not a timed exercise",
                targets.name
            )));
        }
        let now = self.clock.now();
        next.stopwatch = Some(match next.stopwatch {
            Some(watch) if watch.exercise_index == index => watch.resumed_at(now),
            _ => Stopwatch::started(index, now),
        });
        self.commit(next, None)?;
        self.emit(SessionEvent::StopwatchChanged {
            exercise: index,
            running: true,
        });
        Ok(())
    }

    /// Pauses the stopwatch and returns the whole seconds timed so far.
    pub fn pause_stopwatch(&mut self) -> Result<u64, SessionError> {
        let mut next = self.active_state()?.clone();
        let watch = next
            .stopwatch
            .ok_or_else(|| SessionError::InvalidInput("No stopwatch is running".to_string()))?;
        let now = self.clock.now();
        let paused = watch.paused_at(now);
        next.stopwatch = Some(paused);
        self.commit(next, None)?;
        self.emit(SessionEvent::StopwatchChanged {
            exercise: paused.exercise_index,
            running: false,
        });
        Ok(paused.elapsed_secs(now))
    }

    /// Stops the stopwatch and records the elapsed time for its exercise.
    /// Returns the recorded amount in `unit`.
    pub fn stop_stopwatch(&mut self, unit: DurationUnit) -> Result<f64, SessionError> {
        let state = self.active_state()?;
        let watch = state
            .stopwatch
            .ok_or_else(|| SessionError::InvalidInput("No stopwatch is running".to_string()))?;
        let secs = watch.elapsed_secs(self.clock.now());
        if secs == 0 {
            return Err(SessionError::InvalidInput(
                "Stopwatch has not recorded any time".to_string(),
            ));
        }
        let amount = unit.from_seconds(secs);
        self.record_duration_exercise(watch.exercise_index, amount, unit)?;
        Ok(amount)
    }

    /// Returns the remaining seconds, or `None` if no countdown was running.
    pub fn pause_rest(&mut self) -> Result<Option<u32>, SessionError> {
        let next = self.active_state()?.clone();
        if self.timer.status() != TimerStatus::Running {
            return Ok(None);
        }
        let paused = self.timer.state().paused_at(self.clock.now());
        self.commit(next, Some(paused))?;
        self.emit(SessionEvent::RestPaused {
            remaining_secs: paused.remaining_secs,
        });
        Ok(Some(paused.remaining_secs))
    }

    pub fn resume_rest(&mut self) -> Result<Option<u32>, SessionError> {
        let next = self.active_state()?.clone();
        if self.timer.status() != TimerStatus::Paused {
            return Ok(None);
        }
        let resumed = self.timer.state().resumed_at(self.clock.now());
        self.commit(next, Some(resumed))?;
        self.emit(SessionEvent::RestResumed {
            remaining_secs: resumed.remaining_secs,
        });
        Ok(Some(resumed.remaining_secs))
    }

    /// Dismisses the rest countdown.
    pub fn skip_rest(&mut self) -> Result<(), SessionError> {
        let next = self.active_state()?.clone();
        if !self.timer.state().is_active() {
            return Ok(());
        }
        self.commit(next, Some(RestTimerState::default()))?;
        self.emit(SessionEvent::RestDismissed);
        Ok(())
    }

    /// Advances the rest countdown. On completion the user is alerted and
    /// the idle countdown is persisted.
    pub fn poll_timer(&mut self) -> Option<TimerEvent> {
        let event = self.timer.poll()?;
        match event {
            TimerEvent::Tick { remaining_secs } => {
                self.emit(SessionEvent::RestTick { remaining_secs });
            }
            TimerEvent::Completed => {
                let next_up = self.next_up();
                if let Err(e) = self.platform.rest_over(next_up.as_deref()) {
                    warn!("Rest-over alert failed: {e:#}");
                }
                if let Some(snapshot) = self.snapshot() {
                    if let Err(e) = self.store.save_session_snapshot(&snapshot) {
                        warn!("Could not persist finished rest timer: {e}");
                    }
                }
                self.emit(SessionEvent::RestCompleted);
            }
        }
        Some(event)
    }

    /// Completes the session: keeps exercises with at least one set, appends
    /// the log, mirrors a summary, and returns to idle.
    ///
    /// # Errors
    /// `NothingCompleted` (session stays in progress) or `Store`.
    pub fn finish(&mut self) -> Result<WorkoutLog, SessionError> {
        let state = self.active_state()?;
        let now = self.clock.now();
        let duration = u64::try_from((now - state.started_at).num_seconds()).unwrap_or(0);

        let exercises: Vec<ExerciseLog> = state
            .exercises
            .iter()
            .enumerate()
            .filter(|(_, e)| e.has_sets())
            .map(|(index, e)| {
                let mut performed = e.clone();
                if let Some(substitute) = state.substitutions.get(&index) {
                    performed.replaces = Some(std::mem::replace(
                        &mut performed.name,
                        substitute.clone(),
                    ));
                    performed.substituted_with = Some(substitute.clone());
                }
                performed
            })
            .collect();
        if exercises.is_empty() {
            return Err(SessionError::NothingCompleted);
        }

        let log = WorkoutLog {
            id: self.next_log_id(now),
            date: now,
            workout_type: state.workout_id.clone(),
            workout_name: state.workout_name.clone(),
            exercises,
            duration,
            completed: true,
            substitutions: state.substitutions.clone(),
        };
        self.store.append_workout_log(&log)?;
        self.last_log_id = log.id.parse().ok();

        // Log is stored; a leftover snapshot only costs a resume prompt later.
        if let Err(e) = self.store.clear_session_snapshot() {
            warn!("Could not clear recovery snapshot: {e}");
        }
        self.remote.submit_summary(SummaryRecord {
            date: log.date_key(),
            workout_id: log.workout_type.clone(),
            workout_name: log.workout_name.clone(),
            total_volume: log.total_volume(),
            duration_secs: log.duration,
            exercise_count: log.exercises.len(),
        });
        self.close_session();
        info!(
            "Finished workout '{}' in {}s with {} exercises",
            log.workout_type,
            log.duration,
            log.exercises.len()
        );
        self.emit(SessionEvent::Finished {
            log_id: log.id.clone(),
        });
        Ok(log)
    }

    /// Discards the session without writing a log. The session closes even
    /// if the snapshot cannot be removed; the leftover is offered on the next
    /// start and can be declined there.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        let workout_id = self.active_workout_id_checked()?;
        if let Err(e) = self.store.clear_session_snapshot() {
            warn!("Could not clear recovery snapshot: {e}");
        }
        self.close_session();
        info!("Cancelled workout '{workout_id}'");
        self.emit(SessionEvent::Cancelled);
        Ok(())
    }

    /// Offers an interrupted session for resumption. Accepted sessions come
    /// back exactly as saved, start time and rest countdown included;
    /// declined ones are discarded.
    pub fn recover_if_present(
        &mut self,
        prompt: &mut dyn ResumePrompt,
    ) -> Result<RecoveryOutcome, SessionError> {
        if self.active.is_some() {
            return Ok(RecoveryOutcome::NothingToRecover);
        }
        let snapshot = match self.store.load_session_snapshot() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(RecoveryOutcome::NothingToRecover),
            Err(e @ DbError::Corrupt { .. }) => {
                warn!("Discarding unreadable session snapshot: {e}");
                self.store.clear_session_snapshot()?;
                return Ok(RecoveryOutcome::Discarded);
            }
            Err(e) => return Err(e.into()),
        };

        let matches_catalog = self
            .catalog
            .find_workout(&snapshot.state.workout_id, snapshot.state.optional)
            .is_some_and(|w| w.exercises.len() == snapshot.state.exercises.len());
        if !matches_catalog {
            warn!(
                "Discarding snapshot for '{}': workout no longer matches the catalog",
                snapshot.state.workout_id
            );
            self.store.clear_session_snapshot()?;
            return Ok(RecoveryOutcome::Discarded);
        }

        if !prompt.confirm_resume(&snapshot) {
            self.store.clear_session_snapshot()?;
            info!("Discarded interrupted '{}' session", snapshot.state.workout_id);
            return Ok(RecoveryOutcome::Declined);
        }

        let workout_id = snapshot.state.workout_id.clone();
        self.timer.apply(snapshot.rest_timer);
        self.active = Some(snapshot.state);
        if let Err(e) = self.platform.keep_awake() {
            warn!("Could not request keep-awake: {e:#}");
        }
        debug!("Resumed '{workout_id}' from snapshot");
        self.emit(SessionEvent::Resumed { workout_id });
        Ok(RecoveryOutcome::Resumed)
    }

    fn active_state(&self) -> Result<&SessionState, SessionError> {
        self.active.as_ref().ok_or(SessionError::NoActiveSession)
    }

    fn active_workout_id(&self) -> String {
        self.active
            .as_ref()
            .map(|s| s.workout_id.clone())
            .unwrap_or_default()
    }

    fn active_workout_id_checked(&self) -> Result<String, SessionError> {
        Ok(self.active_state()?.workout_id.clone())
    }

    fn targets_for(&self, state: &SessionState, index: usize) -> Result<ExerciseTargets, SessionError> {
        let workout = self
            .catalog
            .find_workout(&state.workout_id, state.optional)
            .ok_or_else(|| SessionError::UnknownWorkout(state.workout_id.clone()))?;
        let definition = workout
            .exercises
            .get(index)
            .filter(|_| index < state.exercises.len())
            .ok_or(SessionError::ExerciseOutOfRange(index))?;
        let substitute = state.substitutions.get(&index).map(String::as_str);
        let option = substitute.and_then(|s| self.catalog.substitute_option(&definition.name, s));
        Ok(definition.targets_with(substitute, option))
    }

    /// Working copy of the session plus the targets of `index`.
    fn prepare(&self, index: usize) -> Result<(SessionState, ExerciseTargets), SessionError> {
        let state = self.active_state()?;
        let targets = self.targets_for(state, index)?;
        Ok((state.clone(), targets))
    }

    /// Persists `next` (and the new countdown, if any) and then makes it
    /// current.
    fn commit(&mut self, next: SessionState, rest: Option<RestTimerState>) -> Result<(), SessionError> {
        let snapshot = SessionSnapshot {
            state: next,
            rest_timer: rest.unwrap_or_else(|| self.timer.state()),
            saved_at: self.clock.now(),
        };
        self.store.save_session_snapshot(&snapshot)?;
        if rest.is_some() {
            self.timer.apply(snapshot.rest_timer);
        }
        self.active = Some(snapshot.state);
        Ok(())
    }

    fn close_session(&mut self) {
        self.timer.stop();
        self.active = None;
        if let Err(e) = self.platform.release_awake() {
            warn!("Could not release keep-awake: {e:#}");
        }
    }

    /// First exercise whose targets are not yet met.
    fn next_up(&self) -> Option<String> {
        let progress = self.progress().ok()?;
        progress
            .exercises
            .into_iter()
            .find(|e| !e.complete)
            .map(|e| e.name)
    }

    /// Millisecond timestamp id, bumped when two sessions finish within the
    /// same millisecond.
    fn next_log_id(&self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis();
        let id = match self.last_log_id {
            Some(last) if millis <= last => last + 1,
            _ => millis,
        };
        id.to_string()
    }

    fn emit(&mut self, event: SessionEvent) {
        debug!(?event, "session event");
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}
