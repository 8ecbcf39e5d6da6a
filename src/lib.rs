use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

// --- Declare modules ---
pub mod catalog;
mod config;
pub mod db;
pub mod export;
pub mod history;
pub mod logging;
pub mod model;
pub mod platform;
pub mod remote;
pub mod session;
pub mod sheets;
pub mod timer;

// --- Expose public types ---
pub use catalog::{BuiltinCatalog, CatalogError, WorkoutCatalog};
pub use config::{
    get_config_path as get_config_path_util, load_config as load_config_util, parse_color,
    save_config as save_config_util, Config, ConfigError, ResumePolicy, StandardColor, Theme,
    ThemeConfig, Units,
};
pub use db::{get_db_path as get_db_path_util, DbError, Preference, Store};
pub use history::{HistoryEntry, HistoryReconciler, HistorySource, PreviousPerformance};
pub use model::{DurationUnit, ExerciseLog, Performed, SetRecord, TrackingMode, WorkoutLog};
pub use remote::{RemoteError, RemoteLedger, RemoteSync, SyncStatus};
pub use session::{
    Command, Phase, RecoveryOutcome, ResumePrompt, SessionError, SessionEvent, SessionMachine,
    SessionSnapshot, SessionState,
};
pub use timer::{Clock, ManualClock, SystemClock};

use model::date_key;
use platform::{NoopPlatform, Platform};
use remote::{SetRow, SummaryRecord};
use sheets::SheetsLedger;

/// Application facade: configuration, local store, catalog, the session
/// machine and the optional spreadsheet connection.
pub struct AppService {
    pub config: Config,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    session: SessionMachine,
}

impl AppService {
    /// Initializes the application service from the default config and data
    /// locations.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or
    /// initialization fails.
    pub fn initialize() -> Result<Self> {
        Self::initialize_with_platform(Arc::new(NoopPlatform))
    }

    /// Like `initialize`, with the device hooks to use during sessions.
    /// # Errors
    /// See `initialize`.
    pub fn initialize_with_platform(platform: Arc<dyn Platform>) -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = db::get_db_path().context("Failed to determine database path")?;
        let store = Store::open(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        let catalog: Arc<dyn WorkoutCatalog> = match &config.catalog_path {
            Some(path) => Arc::new(
                BuiltinCatalog::from_path(path)
                    .with_context(|| format!("Failed to load workout catalog from {path:?}"))?,
            ),
            None => Arc::new(BuiltinCatalog::builtin().context("Built-in catalog is invalid")?),
        };

        let mut service = Self::from_parts(
            config,
            config_path,
            db_path,
            store,
            catalog,
            Arc::new(SystemClock),
            platform,
        );
        service.restore_connection()?;
        Ok(service)
    }

    /// Assembles a service from already-built parts (tests, embedding).
    pub fn from_parts(
        config: Config,
        config_path: PathBuf,
        db_path: PathBuf,
        store: Store,
        catalog: Arc<dyn WorkoutCatalog>,
        clock: Arc<dyn Clock>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let session = SessionMachine::new(store, catalog, clock)
            .with_platform(platform)
            .with_tick_ms(config.timer_tick_ms);
        Self {
            config,
            db_path,
            config_path,
            session,
        }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save_config(&self.config_path, &self.config)
    }

    pub fn session(&self) -> &SessionMachine {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionMachine {
        &mut self.session
    }

    pub fn store(&self) -> &Store {
        self.session.store()
    }

    pub fn catalog(&self) -> &Arc<dyn WorkoutCatalog> {
        self.session.catalog()
    }

    /// Offers any interrupted session to `prompt`.
    /// # Errors
    /// Returns an error if the snapshot store cannot be read or cleared.
    pub fn recover_session(&mut self, prompt: &mut dyn ResumePrompt) -> Result<RecoveryOutcome> {
        self.session
            .recover_if_present(prompt)
            .context("Failed to check for an interrupted session")
    }

    /// Starts a workout using the stored bodyweight-mode preference.
    /// # Errors
    /// Propagates `SessionError`s from the session machine.
    pub fn start_workout(&mut self, workout_id: &str, optional: bool) -> Result<()> {
        let bodyweight_mode = self.bodyweight_mode()?;
        self.session.start(workout_id, optional, bodyweight_mode)?;
        Ok(())
    }

    // --- Preferences ---

    pub fn bodyweight_mode(&self) -> Result<bool> {
        self.store()
            .load_flag(Preference::BodyweightMode)
            .context("Failed to read bodyweight mode preference")
    }

    /// Takes effect from the next session start.
    pub fn set_bodyweight_mode(&self, enabled: bool) -> Result<()> {
        self.store()
            .save_flag(Preference::BodyweightMode, enabled)
            .context("Failed to save bodyweight mode preference")
    }

    pub fn theme(&self) -> Result<Theme> {
        let stored = self
            .store()
            .load_preference(Preference::Theme)
            .context("Failed to read theme preference")?;
        Ok(stored
            .and_then(|t| t.parse::<Theme>().ok())
            .unwrap_or_default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.store()
            .save_preference(Preference::Theme, &theme.to_string())
            .context("Failed to save theme preference")
    }

    /// Stored spreadsheet id, falling back to the configured default.
    pub fn sheet_id(&self) -> Result<Option<String>> {
        let stored = self
            .store()
            .load_preference(Preference::SheetId)
            .context("Failed to read sheet id preference")?;
        Ok(stored
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.config.default_sheet_id.clone()))
    }

    pub fn set_sheet_id(&self, sheet_id: &str) -> Result<()> {
        let sheet_id = sheet_id.trim();
        if sheet_id.is_empty() {
            bail!("Spreadsheet id cannot be empty");
        }
        self.store()
            .save_preference(Preference::SheetId, sheet_id)
            .context("Failed to save sheet id preference")
    }

    // --- Remote connection ---

    pub fn sync_status(&self) -> SyncStatus {
        let remote = self.session.remote();
        if remote.is_connected() {
            remote.status()
        } else {
            SyncStatus::Offline
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.remote().is_connected()
    }

    /// Reconnects with the cached token, if there is one.
    fn restore_connection(&mut self) -> Result<()> {
        let Some(token) = self
            .store()
            .load_preference(Preference::AuthToken)
            .context("Failed to read cached auth token")?
        else {
            return Ok(());
        };
        let Some(sheet_id) = self.sheet_id()? else {
            warn!("Cached auth token present but no spreadsheet id configured; staying offline");
            return Ok(());
        };
        match SheetsLedger::new(&self.config.sheets_api_url, &sheet_id, token) {
            Ok(ledger) => self.attach_ledger_quiet(Arc::new(ledger)),
            Err(e) => warn!("Could not set up spreadsheet connection: {e}"),
        }
        Ok(())
    }

    /// Caches `token`, connects to the configured spreadsheet and pushes local
    /// logs it does not have yet. Returns the number of workouts pushed.
    /// # Errors
    /// Fails if no spreadsheet id is configured or the token cannot be stored.
    pub fn connect(&mut self, token: &str) -> Result<usize> {
        let token = token.trim();
        if token.is_empty() {
            bail!("Access token cannot be empty");
        }
        let Some(sheet_id) = self.sheet_id()? else {
            bail!("No spreadsheet id configured. Use 'sheet <ID>' first.");
        };
        let ledger = SheetsLedger::new(&self.config.sheets_api_url, &sheet_id, token.to_string())
            .context("Failed to create spreadsheet client")?;
        self.store()
            .save_preference(Preference::AuthToken, token)
            .context("Failed to cache auth token")?;
        Ok(self.attach_ledger(Arc::new(ledger)))
    }

    /// Uses `ledger` for mirroring and runs an initial sync. Sync failures are
    /// logged; the count of pushed workouts is returned.
    pub fn attach_ledger(&mut self, ledger: Arc<dyn RemoteLedger>) -> usize {
        self.attach_ledger_quiet(ledger);
        match self.sync_local_to_remote() {
            Ok(pushed) => pushed,
            Err(e) => {
                warn!("Initial sync failed: {e:#}");
                0
            }
        }
    }

    fn attach_ledger_quiet(&mut self, ledger: Arc<dyn RemoteLedger>) {
        self.session.set_remote(RemoteSync::new(Some(ledger)));
    }

    /// Forgets the cached token and stops mirroring.
    pub fn disconnect(&mut self) -> Result<()> {
        self.session.set_remote(RemoteSync::disabled());
        self.store()
            .remove_preference(Preference::AuthToken)
            .context("Failed to remove cached auth token")?;
        info!("Disconnected from spreadsheet");
        Ok(())
    }

    /// Pushes local logs from the ledger's newest day onwards: one row per
    /// set, then the summary. Logs on that day whose summary the ledger
    /// already holds are skipped. Returns the number of workouts pushed.
    /// # Errors
    /// Fails if not connected or if the ledger rejects a read or write.
    pub fn sync_local_to_remote(&self) -> Result<usize> {
        let Some(ledger) = self.session.remote().ledger().filter(|l| l.is_connected()) else {
            bail!(RemoteError::NotConnected);
        };
        let last_synced = ledger
            .last_logged_date()
            .context("Failed to read last synced date")?;
        let last_day = last_synced
            .as_deref()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| {
                    RemoteError::Malformed(format!("Unreadable last synced date '{d}'"))
                })
            })
            .transpose()?;
        // Summaries already on the ledger for the boundary day
        let mut on_ledger: Vec<SummaryRecord> = match last_day {
            Some(day) => {
                let day = date_key(day);
                ledger
                    .read_all_summaries()
                    .context("Failed to read synced summaries")?
                    .into_iter()
                    .filter(|s| s.date == day)
                    .collect()
            }
            None => Vec::new(),
        };

        let logs = self.store().list_workout_logs()?;
        let pending: Vec<&WorkoutLog> = logs
            .iter()
            .filter(|log| match last_day {
                None => true,
                Some(day) if log.day() > day => true,
                Some(day) if log.day() == day => {
                    let synced = on_ledger.iter().position(|s| {
                        s.workout_id == log.workout_type
                            && (s.total_volume - log.total_volume()).abs() < 0.5
                    });
                    // Each ledger summary accounts for one local log.
                    synced.map(|i| on_ledger.remove(i)).is_none()
                }
                Some(_) => false,
            })
            .collect();
        if pending.is_empty() {
            info!("All data already synced");
            return Ok(0);
        }

        info!("Syncing {} workouts to the spreadsheet", pending.len());
        for log in &pending {
            let date = log.date_key();
            for exercise in &log.exercises {
                for set in &exercise.sets {
                    ledger
                        .append_set_record(&SetRow {
                            date: date.clone(),
                            workout_id: log.workout_type.clone(),
                            exercise_name: exercise.name.clone(),
                            mode: set.performed.mode(),
                            unit: set.performed.unit(),
                            set_number: set.set_number,
                            quantity: set.performed.quantity(),
                            weight: set.weight,
                            rest_secs: exercise.rest,
                        })
                        .with_context(|| format!("Failed to sync sets of workout {}", log.id))?;
                }
            }
            ledger
                .append_session_summary(&SummaryRecord {
                    date,
                    workout_id: log.workout_type.clone(),
                    workout_name: log.workout_name.clone(),
                    total_volume: log.total_volume(),
                    duration_secs: log.duration,
                    exercise_count: log.exercises.len(),
                })
                .with_context(|| format!("Failed to sync summary of workout {}", log.id))?;
        }
        Ok(pending.len())
    }

    /// Waits for queued mirror writes. If the ledger dropped its connection
    /// along the way the cached token is forgotten.
    pub fn flush_remote(&mut self) -> Result<()> {
        self.session.remote().flush();
        let dropped = self
            .session
            .remote()
            .ledger()
            .is_some_and(|l| !l.is_connected());
        if dropped {
            warn!("Spreadsheet authorization expired; reconnect with 'connect'");
            self.disconnect()?;
        }
        Ok(())
    }

    // --- History ---

    fn reconciler(&self) -> HistoryReconciler<'_> {
        HistoryReconciler::new(
            self.store(),
            self.session.remote().ledger().map(|l| l.as_ref()),
        )
    }

    pub fn previous_performance(&self, workout_id: &str) -> Result<Option<PreviousPerformance>> {
        self.reconciler()
            .previous_performance(workout_id)
            .with_context(|| format!("Failed to look up previous '{workout_id}' session"))
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        self.reconciler()
            .history()
            .context("Failed to load workout history")
    }

    /// Writes every stored log as CSV. Returns the number of set rows.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let logs = self.store().list_workout_logs()?;
        if logs.is_empty() {
            bail!("No workout data to export.");
        }
        export::export_csv(&logs, writer)
    }

    /// Deletes all stored workout logs. Preferences and any in-progress
    /// session are kept. Returns the number of logs removed.
    pub fn clear_all_logs(&self) -> Result<usize> {
        let removed = self
            .store()
            .clear_workout_logs()
            .context("Failed to clear workout logs")?;
        info!("Cleared {removed} workout logs");
        Ok(removed)
    }
}
