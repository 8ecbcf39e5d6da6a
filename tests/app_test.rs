mod common;

use anyhow::Result;
use std::sync::Arc;

use common::{builtin_catalog, start_time, RecordingLedger};
use workout_logger_lib::platform::NoopPlatform;
use workout_logger_lib::remote::SummaryRecord;
use workout_logger_lib::{
    AppService, Config, DurationUnit, HistorySource, ManualClock, Preference, RemoteError,
    RemoteLedger, Store, SyncStatus, Theme,
};

fn create_test_service() -> Result<(AppService, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::new(start_time()));
    let config = Config {
        // Nothing listens here, so any real request fails fast
        sheets_api_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    };
    let service = AppService::from_parts(
        config,
        "test_config.toml".into(),
        ":memory:".into(),
        Store::open_in_memory()?,
        builtin_catalog(),
        clock.clone(),
        Arc::new(NoopPlatform),
    );
    Ok((service, clock))
}

fn log_squat_session(service: &mut AppService) -> Result<()> {
    service.start_workout("lower_a", false)?;
    service
        .session_mut()
        .record_reps_set(0, 1, 5, Some(200.0))?;
    service
        .session_mut()
        .record_reps_set(0, 2, 5, Some(205.0))?;
    service.session_mut().finish()?;
    Ok(())
}

fn summary(date: &str) -> SummaryRecord {
    SummaryRecord {
        date: date.to_string(),
        workout_id: "upper_a".to_string(),
        workout_name: "Upper A".to_string(),
        total_volume: 4000.0,
        duration_secs: 3000,
        exercise_count: 8,
    }
}

#[test]
fn test_start_workout_uses_bodyweight_preference() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    assert!(!service.bodyweight_mode()?);
    service.set_bodyweight_mode(true)?;

    service.start_workout("lower_a", false)?;
    let state = service.session().state().unwrap();
    assert!(state.bodyweight_mode);
    assert!(!state.substitutions.is_empty());
    Ok(())
}

#[test]
fn test_theme_and_sheet_preferences() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    assert_eq!(service.theme()?, Theme::Light);
    service.set_theme(Theme::Dark)?;
    assert_eq!(service.theme()?, Theme::Dark);

    assert_eq!(service.sheet_id()?, None);
    service.config.default_sheet_id = Some("from-config".to_string());
    assert_eq!(service.sheet_id()?.as_deref(), Some("from-config"));
    service.set_sheet_id("  chosen  ")?;
    assert_eq!(service.sheet_id()?.as_deref(), Some("chosen"));
    assert!(service.set_sheet_id("   ").is_err());
    Ok(())
}

#[test]
fn test_export_csv_rows() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    assert!(service.export_csv(Vec::new()).is_err());

    log_squat_session(&mut service)?;
    service.start_workout("zone2_cardio", true)?;
    service
        .session_mut()
        .record_duration_exercise(0, 32.5, DurationUnit::Minutes)?;
    service.session_mut().finish()?;

    let mut out = Vec::new();
    let rows = service.export_csv(&mut out)?;
    assert_eq!(rows, 3);
    let text = String::from_utf8(out)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Date,Workout Type,Exercise,Set,Reps,Weight (lbs),Rest (s)",
            "2024-03-04,lower_a,Back Squat,1,5,200,180",
            "2024-03-04,lower_a,Back Squat,2,5,205,180",
            "2024-03-04,zone2_cardio,Zone 2 Cardio,1,32.5,0,0",
        ]
    );
    Ok(())
}

#[test]
fn test_clear_all_logs_keeps_session() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    log_squat_session(&mut service)?;
    service.start_workout("lower_a", false)?;

    assert_eq!(service.clear_all_logs()?, 1);
    assert!(service.store().list_workout_logs()?.is_empty());
    assert!(service.session().state().is_some());
    Ok(())
}

#[test]
fn test_history_and_previous_from_local_logs() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    log_squat_session(&mut service)?;
    clock.advance_secs(3 * 24 * 3600);
    log_squat_session(&mut service)?;

    let history = service.history()?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].date, "2024-03-07");

    let previous = service.previous_performance("lower_a")?.unwrap();
    assert_eq!(previous.source, HistorySource::Local);
    assert_eq!(previous.date, "2024-03-07");
    assert_eq!(previous.suggested_weight("Back Squat", 2), Some(205.0));
    assert!(service.previous_performance("upper_b")?.is_none());
    Ok(())
}

#[test]
fn test_attach_ledger_pushes_newer_local_logs() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    log_squat_session(&mut service)?;

    let ledger = Arc::new(RecordingLedger::connected());
    ledger.summaries.lock().unwrap().push(summary("2024-03-01"));

    let pushed = service.attach_ledger(ledger.clone() as Arc<dyn RemoteLedger>);
    assert_eq!(pushed, 1);
    assert!(service.is_connected());
    assert_eq!(ledger.sets.lock().unwrap().len(), 2);
    assert_eq!(ledger.summaries.lock().unwrap().len(), 2);

    // Already synced: nothing newer than the ledger's latest date
    assert_eq!(service.sync_local_to_remote()?, 0);
    Ok(())
}

#[test]
fn test_sync_pushes_same_day_log_missing_from_ledger() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    log_squat_session(&mut service)?;

    // An earlier session of the same day is already on the sheet
    let ledger = Arc::new(RecordingLedger::connected());
    ledger.summaries.lock().unwrap().push(summary("2024-03-04"));

    let pushed = service.attach_ledger(ledger.clone() as Arc<dyn RemoteLedger>);
    assert_eq!(pushed, 1);
    assert_eq!(ledger.sets.lock().unwrap().len(), 2);
    assert_eq!(service.sync_local_to_remote()?, 0);
    Ok(())
}

#[test]
fn test_sync_skips_log_already_on_ledger_and_older_days() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    log_squat_session(&mut service)?;
    clock.advance_secs(24 * 3600);
    log_squat_session(&mut service)?;

    let ledger = Arc::new(RecordingLedger::connected());
    ledger.summaries.lock().unwrap().push(SummaryRecord {
        date: "2024-03-05".to_string(),
        workout_id: "lower_a".to_string(),
        workout_name: "Lower A".to_string(),
        total_volume: 5.0 * 200.0 + 5.0 * 205.0,
        duration_secs: 0,
        exercise_count: 1,
    });

    assert_eq!(
        service.attach_ledger(ledger.clone() as Arc<dyn RemoteLedger>),
        0
    );
    assert!(ledger.sets.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_sync_requires_connection() -> Result<()> {
    let (service, _clock) = create_test_service()?;
    let err = service.sync_local_to_remote().unwrap_err();
    assert_eq!(
        err.downcast_ref::<RemoteError>(),
        Some(&RemoteError::NotConnected)
    );
    assert_eq!(service.sync_status(), SyncStatus::Offline);
    Ok(())
}

#[test]
fn test_connect_requires_sheet_id() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    assert!(service.connect("token").is_err());
    assert_eq!(service.store().load_preference(Preference::AuthToken)?, None);
    Ok(())
}

#[test]
fn test_connect_caches_token_even_if_initial_sync_fails() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service.set_sheet_id("sheet-123")?;

    let pushed = service.connect("  token-abc ")?;
    assert_eq!(pushed, 0);
    assert!(service.is_connected());
    assert_eq!(
        service
            .store()
            .load_preference(Preference::AuthToken)?
            .as_deref(),
        Some("token-abc")
    );

    service.disconnect()?;
    assert!(!service.is_connected());
    assert_eq!(service.store().load_preference(Preference::AuthToken)?, None);
    Ok(())
}

#[test]
fn test_flush_forgets_token_when_auth_expires() -> Result<()> {
    let (mut service, _clock) = create_test_service()?;
    service
        .store()
        .save_preference(Preference::AuthToken, "stale")?;
    let ledger = Arc::new(RecordingLedger::connected());
    service.attach_ledger(ledger.clone() as Arc<dyn RemoteLedger>);
    ledger.fail_with(RemoteError::AuthExpired);

    service.start_workout("lower_a", false)?;
    service
        .session_mut()
        .record_reps_set(0, 1, 5, Some(200.0))?;
    service.flush_remote()?;

    assert!(!service.is_connected());
    assert_eq!(service.store().load_preference(Preference::AuthToken)?, None);
    // The session itself carried on locally
    assert_eq!(service.session().state().unwrap().recorded_sets(), 1);
    Ok(())
}
