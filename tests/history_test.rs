mod common;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;

use common::RecordingLedger;
use workout_logger_lib::history::latest_local;
use workout_logger_lib::remote::{PreviousSession, SummaryRecord};
use workout_logger_lib::{
    ExerciseLog, HistoryReconciler, HistorySource, RemoteError, SetRecord, Store, WorkoutLog,
};

fn log_on(id: &str, day: u32, hour: u32, workout: &str, weight: f64) -> WorkoutLog {
    let mut squat = ExerciseLog::new("Back Squat", 180);
    squat.upsert_set(SetRecord::reps(1, 5, weight));
    squat.upsert_set(SetRecord::reps(2, 5, weight + 10.0));
    WorkoutLog {
        id: id.to_string(),
        date: Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap(),
        workout_type: workout.to_string(),
        workout_name: workout.to_string(),
        exercises: vec![squat],
        duration: 1800,
        completed: true,
        substitutions: BTreeMap::new(),
    }
}

fn remote_session(date: &str, weight: f64) -> PreviousSession {
    let mut squat = ExerciseLog::new("Back Squat", 180);
    squat.upsert_set(SetRecord::reps(1, 5, weight));
    PreviousSession {
        date: date.to_string(),
        exercises: vec![squat],
    }
}

#[test]
fn test_latest_local_prefers_most_recent_day() -> Result<()> {
    let logs = vec![
        log_on("1", 10, 9, "lower_a", 200.0),
        log_on("2", 3, 9, "lower_a", 180.0),
        log_on("3", 12, 9, "upper_a", 100.0),
    ];
    let latest = latest_local(&logs, "lower_a").unwrap();
    assert_eq!(latest.id, "1");
    assert!(latest_local(&logs, "lower_b").is_none());
    Ok(())
}

#[test]
fn test_latest_local_same_day_takes_later_entry() -> Result<()> {
    let logs = vec![
        log_on("1", 10, 20, "lower_a", 200.0),
        log_on("2", 10, 8, "lower_a", 210.0),
    ];
    // Same calendar day: the later list entry wins regardless of time of day.
    assert_eq!(latest_local(&logs, "lower_a").unwrap().id, "2");
    Ok(())
}

#[test]
fn test_previous_performance_from_local_store() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.append_workout_log(&log_on("1", 3, 9, "lower_a", 180.0))?;
    store.append_workout_log(&log_on("2", 10, 9, "lower_a", 200.0))?;

    let previous = HistoryReconciler::new(&store, None)
        .previous_performance("lower_a")?
        .unwrap();
    assert_eq!(previous.source, HistorySource::Local);
    assert_eq!(previous.date, "2024-03-10");
    assert_eq!(previous.suggested_weight("Back Squat", 1), Some(200.0));
    assert_eq!(previous.suggested_weight("Back Squat", 2), Some(210.0));
    // Beyond the last recorded set the last one is suggested
    assert_eq!(previous.suggested_weight("Back Squat", 5), Some(210.0));
    assert_eq!(previous.suggested_weight("Leg Curl", 1), None);
    Ok(())
}

#[test]
fn test_previous_performance_prefers_remote() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.append_workout_log(&log_on("1", 10, 9, "lower_a", 200.0))?;
    let ledger = RecordingLedger::connected();
    *ledger.previous.lock().unwrap() = Some(remote_session("2024-03-11", 225.0));

    let previous = HistoryReconciler::new(&store, Some(&ledger))
        .previous_performance("lower_a")?
        .unwrap();
    assert_eq!(previous.source, HistorySource::Remote);
    assert_eq!(previous.date, "2024-03-11");
    assert_eq!(previous.suggested_weight("Back Squat", 1), Some(225.0));
    Ok(())
}

#[test]
fn test_previous_performance_falls_back_when_remote_fails() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.append_workout_log(&log_on("1", 10, 9, "lower_a", 200.0))?;
    let ledger = RecordingLedger::connected();
    ledger.fail_with(RemoteError::RemoteUnavailable("timeout".to_string()));

    let previous = HistoryReconciler::new(&store, Some(&ledger))
        .previous_performance("lower_a")?
        .unwrap();
    assert_eq!(previous.source, HistorySource::Local);
    Ok(())
}

#[test]
fn test_previous_performance_falls_back_when_remote_empty() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.append_workout_log(&log_on("1", 10, 9, "lower_a", 200.0))?;
    let ledger = RecordingLedger::connected();

    let previous = HistoryReconciler::new(&store, Some(&ledger))
        .previous_performance("lower_a")?
        .unwrap();
    assert_eq!(previous.source, HistorySource::Local);
    Ok(())
}

#[test]
fn test_disconnected_ledger_is_not_consulted() -> Result<()> {
    let store = Store::open_in_memory()?;
    let ledger = RecordingLedger::default();
    *ledger.previous.lock().unwrap() = Some(remote_session("2024-03-11", 225.0));

    let previous = HistoryReconciler::new(&store, Some(&ledger)).previous_performance("lower_a")?;
    assert!(previous.is_none());
    Ok(())
}

#[test]
fn test_history_newest_first() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.append_workout_log(&log_on("1", 3, 9, "lower_a", 180.0))?;
    store.append_workout_log(&log_on("2", 10, 9, "upper_a", 100.0))?;
    store.append_workout_log(&log_on("3", 10, 7, "lower_b", 150.0))?;
    store.append_workout_log(&log_on("4", 5, 9, "lower_a", 190.0))?;

    let history = HistoryReconciler::new(&store, None).history()?;
    let order: Vec<&str> = history.iter().map(|e| e.workout_id.as_str()).collect();
    // Same day: the one appended later is listed first
    assert_eq!(order, vec!["lower_b", "upper_a", "lower_a", "lower_a"]);
    assert_eq!(history[0].source, HistorySource::Local);
    assert_eq!(history[0].exercise_count, 1);
    assert!((history[0].total_volume - (5.0 * 150.0 + 5.0 * 160.0)).abs() < f64::EPSILON);
    Ok(())
}

#[test]
fn test_history_uses_remote_summaries() -> Result<()> {
    let store = Store::open_in_memory()?;
    store.append_workout_log(&log_on("1", 3, 9, "lower_a", 180.0))?;
    let ledger = RecordingLedger::connected();
    ledger.summaries.lock().unwrap().extend([
        SummaryRecord {
            date: "2024-03-01".to_string(),
            workout_id: "upper_a".to_string(),
            workout_name: "Upper A".to_string(),
            total_volume: 5000.0,
            duration_secs: 3600,
            exercise_count: 8,
        },
        SummaryRecord {
            date: "2024-03-08".to_string(),
            workout_id: "lower_a".to_string(),
            workout_name: "Lower A".to_string(),
            total_volume: 7000.0,
            duration_secs: 4200,
            exercise_count: 7,
        },
    ]);

    let history = HistoryReconciler::new(&store, Some(&ledger)).history()?;
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.source == HistorySource::Remote));
    assert_eq!(history[0].date, "2024-03-08");
    Ok(())
}
