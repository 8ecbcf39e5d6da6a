// Shared fixtures for the integration tests.
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use workout_logger_lib::platform::Platform;
use workout_logger_lib::remote::{PreviousSession, SetRow, SummaryRecord};
use workout_logger_lib::{
    BuiltinCatalog, ManualClock, RemoteError, RemoteLedger, SessionMachine, Store, WorkoutCatalog,
};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap()
}

pub fn builtin_catalog() -> Arc<dyn WorkoutCatalog> {
    Arc::new(BuiltinCatalog::builtin().expect("built-in catalog should load"))
}

pub fn create_machine() -> Result<(SessionMachine, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::new(start_time()));
    let machine = SessionMachine::new(Store::open_in_memory()?, builtin_catalog(), clock.clone());
    Ok((machine, clock))
}

/// Device hooks that only count calls.
#[derive(Default)]
pub struct RecordingPlatform {
    pub awake: Mutex<Vec<bool>>,
    pub alerts: Mutex<Vec<Option<String>>>,
}

impl Platform for RecordingPlatform {
    fn keep_awake(&self) -> Result<()> {
        self.awake.lock().unwrap().push(true);
        Ok(())
    }

    fn release_awake(&self) -> Result<()> {
        self.awake.lock().unwrap().push(false);
        Ok(())
    }

    fn rest_over(&self, exercise_name: Option<&str>) -> Result<()> {
        self.alerts
            .lock()
            .unwrap()
            .push(exercise_name.map(str::to_string));
        Ok(())
    }
}

/// In-memory ledger that records every append and can be told to fail.
#[derive(Default)]
pub struct RecordingLedger {
    pub connected: Mutex<bool>,
    pub sets: Mutex<Vec<SetRow>>,
    pub summaries: Mutex<Vec<SummaryRecord>>,
    pub previous: Mutex<Option<PreviousSession>>,
    pub fail_with: Mutex<Option<RemoteError>>,
}

impl RecordingLedger {
    pub fn connected() -> Self {
        let ledger = Self::default();
        *ledger.connected.lock().unwrap() = true;
        ledger
    }

    pub fn fail_with(&self, error: RemoteError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    fn check(&self) -> Result<(), RemoteError> {
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            if error == RemoteError::AuthExpired {
                *self.connected.lock().unwrap() = false;
            }
            return Err(error);
        }
        Ok(())
    }
}

impl RemoteLedger for RecordingLedger {
    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn append_set_record(&self, row: &SetRow) -> Result<(), RemoteError> {
        self.check()?;
        self.sets.lock().unwrap().push(row.clone());
        Ok(())
    }

    fn append_session_summary(&self, summary: &SummaryRecord) -> Result<(), RemoteError> {
        self.check()?;
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }

    fn read_previous_session(
        &self,
        _workout_id: &str,
    ) -> Result<Option<PreviousSession>, RemoteError> {
        self.check()?;
        Ok(self.previous.lock().unwrap().clone())
    }

    fn read_all_summaries(&self) -> Result<Vec<SummaryRecord>, RemoteError> {
        self.check()?;
        Ok(self.summaries.lock().unwrap().clone())
    }
}
