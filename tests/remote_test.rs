mod common;

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

use common::{create_machine, RecordingLedger};
use workout_logger_lib::remote::{SetRow, SummaryRecord};
use workout_logger_lib::sheets::{
    previous_session_from_rows, set_row_values, summaries_from_rows, summary_row_values,
    SheetsLedger, SET_LOG_RANGE,
};
use workout_logger_lib::{
    DurationUnit, Performed, RemoteError, RemoteLedger, RemoteSync, SyncStatus, TrackingMode,
};

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| (*c).to_string()).collect()
}

/// Renders appended values the way the sheet hands them back.
fn as_cells(values: Vec<serde_json::Value>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

fn squat_row(date: &str, set: u32, reps: u32, weight: f64) -> SetRow {
    SetRow {
        date: date.to_string(),
        workout_id: "lower_a".to_string(),
        exercise_name: "Back Squat".to_string(),
        mode: TrackingMode::Reps,
        unit: DurationUnit::Seconds,
        set_number: set,
        quantity: f64::from(reps),
        weight,
        rest_secs: 180,
    }
}

#[test]
fn test_set_row_layout() -> Result<()> {
    let values = set_row_values(&squat_row("2024-03-04", 1, 5, 200.0));
    assert_eq!(
        values,
        vec![
            json!("2024-03-04"),
            json!("lower_a"),
            json!("Back Squat"),
            json!(1),
            json!(5.0),
            json!(200.0),
            json!(180),
            json!(""),
        ]
    );

    let mut timed = squat_row("2024-03-04", 1, 0, 0.0);
    timed.mode = TrackingMode::Duration;
    timed.quantity = 12.5;
    timed.unit = DurationUnit::Minutes;
    assert_eq!(set_row_values(&timed)[7], json!("duration:minutes"));
    Ok(())
}

#[test]
fn test_summary_row_rounds_minutes() -> Result<()> {
    let summary = SummaryRecord {
        date: "2024-03-04".to_string(),
        workout_id: "lower_a".to_string(),
        workout_name: "Lower A".to_string(),
        total_volume: 7250.0,
        duration_secs: 3630,
        exercise_count: 6,
    };
    let values = summary_row_values(&summary);
    assert_eq!(values[3], json!(61));
    assert_eq!(values[5], json!("Lower A"));
    Ok(())
}

#[test]
fn test_previous_session_from_rows_uses_latest_day() -> Result<()> {
    let rows = vec![
        row(&["Date", "Workout", "Exercise", "Set", "Reps", "Weight", "Rest", "Mode"]),
        row(&["2024-03-01", "lower_a", "Back Squat", "1", "5", "190", "180"]),
        row(&["2024-03-08T18:02:11.000Z", "lower_a", "Back Squat", "1", "5", "200", "180"]),
        row(&["2024-03-08", "lower_a", "Back Squat", "2", "4", "205", "180"]),
        row(&["2024-03-08", "lower_a", "HIIT Bike Intervals", "1", "10", "0", "0", "duration"]),
        row(&["2024-03-09", "upper_a", "Bench Press", "1", "8", "150", "120"]),
    ];

    let session = previous_session_from_rows(&rows, "lower_a").unwrap();
    assert_eq!(session.date, "2024-03-08");
    assert_eq!(session.exercises.len(), 2);
    let squat = &session.exercises[0];
    assert_eq!(squat.name, "Back Squat");
    assert_eq!(squat.rest, 180);
    assert_eq!(squat.sets.len(), 2);
    assert_eq!(squat.sets[1].performed, Performed::Reps(4));
    assert!((squat.sets[1].weight - 205.0).abs() < f64::EPSILON);
    assert_eq!(
        session.exercises[1].sets[0].performed,
        Performed::Duration {
            amount: 10.0,
            unit: DurationUnit::Seconds
        }
    );

    assert!(previous_session_from_rows(&rows, "lower_b").is_none());
    assert!(previous_session_from_rows(&rows[..1], "lower_a").is_none());
    Ok(())
}

#[test]
fn test_summaries_from_rows_skips_header() -> Result<()> {
    let rows = vec![
        row(&["Date", "Workout", "Volume", "Duration (min)", "Exercises", "Name"]),
        row(&["2024-03-04", "lower_a", "7250", "61", "6", "Lower A"]),
        row(&["2024-03-06", "upper_a", "5000", "", "8"]),
    ];
    let summaries = summaries_from_rows(&rows);
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].duration_secs, 61 * 60);
    assert_eq!(summaries[0].workout_name, "Lower A");
    assert_eq!(summaries[1].duration_secs, 0);
    assert_eq!(summaries[1].exercise_count, 8);
    assert_eq!(summaries[1].workout_name, "");
    Ok(())
}

#[test]
fn test_values_url_encodes_range() -> Result<()> {
    let ledger = SheetsLedger::new("https://sheets.example.com", "sheet-123", "token".into())?;
    assert_eq!(
        ledger.values_url(SET_LOG_RANGE, ":append").as_str(),
        "https://sheets.example.com/v4/spreadsheets/sheet-123/values/Workout%20Log!A:H:append"
    );
    Ok(())
}

#[test]
fn test_invalid_api_url_rejected() -> Result<()> {
    let result = SheetsLedger::new("not a url", "sheet", "token".into());
    assert!(matches!(result, Err(RemoteError::Malformed(_))));
    Ok(())
}

#[test]
fn test_disconnected_sheets_ledger_refuses_calls() -> Result<()> {
    let ledger = SheetsLedger::new("https://sheets.example.com", "sheet", "token".into())?;
    assert!(ledger.is_connected());
    ledger.disconnect();
    assert!(!ledger.is_connected());
    assert_eq!(ledger.current_token(), None);
    assert_eq!(
        ledger.append_set_record(&squat_row("2024-03-04", 1, 5, 200.0)),
        Err(RemoteError::NotConnected)
    );
    Ok(())
}

#[test]
fn test_unreachable_sheets_reports_unavailable() -> Result<()> {
    let ledger = SheetsLedger::new("http://127.0.0.1:1", "sheet", "token".into())?;
    let result = ledger.read_all_summaries();
    assert!(matches!(result, Err(RemoteError::RemoteUnavailable(_))));
    // A transport failure is not an authorization failure.
    assert!(ledger.is_connected());
    Ok(())
}

#[test]
fn test_outbox_delivers_in_order() -> Result<()> {
    let ledger = Arc::new(RecordingLedger::connected());
    let sync = RemoteSync::new(Some(ledger.clone() as Arc<dyn RemoteLedger>));
    assert_eq!(sync.status(), SyncStatus::Offline);

    for set in 1..=3 {
        sync.submit_set(squat_row("2024-03-04", set, 5, 200.0));
    }
    sync.flush();

    let numbers: Vec<u32> = ledger
        .sets
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.set_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(sync.status(), SyncStatus::Synced);
    Ok(())
}

#[test]
fn test_outbox_goes_offline_on_expired_auth() -> Result<()> {
    let ledger = Arc::new(RecordingLedger::connected());
    ledger.fail_with(RemoteError::AuthExpired);
    let sync = RemoteSync::new(Some(ledger.clone() as Arc<dyn RemoteLedger>));

    sync.submit_set(squat_row("2024-03-04", 1, 5, 200.0));
    sync.flush();
    assert_eq!(sync.status(), SyncStatus::Offline);
    assert!(!sync.is_connected());

    // Further submissions are skipped while disconnected
    sync.submit_set(squat_row("2024-03-04", 2, 5, 200.0));
    sync.flush();
    assert!(ledger.sets.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_disabled_outbox_is_inert() -> Result<()> {
    let sync = RemoteSync::disabled();
    assert!(!sync.is_connected());
    assert!(sync.ledger().is_none());
    sync.submit_set(squat_row("2024-03-04", 1, 5, 200.0));
    sync.flush();
    assert_eq!(sync.status(), SyncStatus::Offline);
    Ok(())
}

#[test]
fn test_default_last_logged_date_is_newest_summary() -> Result<()> {
    let ledger = RecordingLedger::connected();
    assert_eq!(ledger.last_logged_date()?, None);
    for date in ["2024-03-04", "2024-03-09", "2024-03-06"] {
        ledger.append_session_summary(&SummaryRecord {
            date: date.to_string(),
            workout_id: "lower_a".to_string(),
            workout_name: "Lower A".to_string(),
            total_volume: 0.0,
            duration_secs: 0,
            exercise_count: 0,
        })?;
    }
    assert_eq!(ledger.last_logged_date()?.as_deref(), Some("2024-03-09"));
    Ok(())
}

#[test]
fn test_mirrored_duration_keeps_its_unit() -> Result<()> {
    let ledger = Arc::new(RecordingLedger::connected());
    let (machine, _clock) = create_machine()?;
    let mut machine =
        machine.with_remote(RemoteSync::new(Some(ledger.clone() as Arc<dyn RemoteLedger>)));
    machine.start("lower_a", false, false)?;
    let name = machine.targets(6)?.name;
    machine.record_duration_exercise(6, 2.0, DurationUnit::Minutes)?;
    machine.remote().flush();

    let rows: Vec<Vec<String>> = ledger
        .sets
        .lock()
        .unwrap()
        .iter()
        .map(|r| as_cells(set_row_values(r)))
        .collect();
    let session = previous_session_from_rows(&rows, "lower_a").unwrap();
    let exercise = session.exercises.iter().find(|e| e.name == name).unwrap();
    assert_eq!(
        exercise.sets[0].performed,
        Performed::Duration {
            amount: 2.0,
            unit: DurationUnit::Minutes
        }
    );
    Ok(())
}

#[test]
fn test_non_rep_rows_read_back_in_their_mode() -> Result<()> {
    let mut plank = squat_row("2024-03-04", 1, 0, 0.0);
    plank.exercise_name = "Plank".to_string();
    plank.mode = TrackingMode::Duration;
    plank.quantity = 45.0;

    let mut carry = squat_row("2024-03-04", 1, 0, 0.0);
    carry.exercise_name = "Farmer Carry".to_string();
    carry.mode = TrackingMode::Completion;
    carry.quantity = 1.0;

    let rows = vec![
        as_cells(set_row_values(&squat_row("2024-03-04", 1, 5, 200.0))),
        as_cells(set_row_values(&plank)),
        as_cells(set_row_values(&carry)),
    ];
    let session = previous_session_from_rows(&rows, "lower_a").unwrap();
    let performed: Vec<Performed> = session
        .exercises
        .iter()
        .map(|e| e.sets[0].performed)
        .collect();
    assert_eq!(
        performed,
        vec![
            Performed::Reps(5),
            Performed::Duration {
                amount: 45.0,
                unit: DurationUnit::Seconds
            },
            Performed::Completed,
        ]
    );
    Ok(())
}
