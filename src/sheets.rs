//src/sheets.rs
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::model::{DurationUnit, ExerciseLog, SetRecord, TrackingMode};
use crate::remote::{PreviousSession, RemoteError, RemoteLedger, SetRow, SummaryRecord};

pub const SET_LOG_RANGE: &str = "Workout Log!A:H";
pub const SUMMARY_RANGE: &str = "Workout History!A:F";
const LOG_DATE_COLUMN: &str = "Workout Log!A:A";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Obtains a fresh access token when the current one is rejected.
pub trait TokenRefresh: Send + Sync {
    fn refresh(&self) -> Result<String, RemoteError>;
}

impl<F> TokenRefresh for F
where
    F: Fn() -> Result<String, RemoteError> + Send + Sync,
{
    fn refresh(&self) -> Result<String, RemoteError> {
        self()
    }
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// `RemoteLedger` backed by a spreadsheet's values API. Sets go to the
/// "Workout Log" sheet, one row each; summaries go to "Workout History".
pub struct SheetsLedger {
    client: Client,
    base_url: Url,
    sheet_id: String,
    token: Mutex<Option<String>>,
    refresher: Option<Box<dyn TokenRefresh>>,
    connected: AtomicBool,
}

impl SheetsLedger {
    /// # Errors
    /// Returns `RemoteError::Malformed` for an unusable base URL and
    /// `RemoteUnavailable` if the HTTP client cannot be built.
    pub fn new(api_url: &str, sheet_id: &str, token: String) -> Result<Self, RemoteError> {
        let base_url = Url::parse(api_url)
            .map_err(|e| RemoteError::Malformed(format!("invalid sheets API URL '{api_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Malformed(format!(
                "sheets API URL '{api_url}' cannot be used as a base"
            )));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::RemoteUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            sheet_id: sheet_id.to_string(),
            token: Mutex::new(Some(token)),
            refresher: None,
            connected: AtomicBool::new(true),
        })
    }

    #[must_use]
    pub fn with_refresher(mut self, refresher: Box<dyn TokenRefresh>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The token currently in use, which may have been refreshed.
    pub fn current_token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}`
    pub fn values_url(&self, range: &str, suffix: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v4", "spreadsheets", self.sheet_id.as_str(), "values"])
                .push(&format!("{range}{suffix}"));
        }
        url
    }

    fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, RemoteError> {
        let url = self.values_url(range, "");
        let response = self.execute(|token| self.client.get(url.clone()).bearer_auth(token))?;
        let body: ValueRange = response
            .json()
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    fn append_row(&self, range: &str, row: Vec<Value>) -> Result<(), RemoteError> {
        let mut url = self.values_url(range, ":append");
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({ "values": [row] });
        self.execute(|token| {
            self.client
                .post(url.clone())
                .bearer_auth(token)
                .json(&body)
        })?;
        debug!("Appended row to '{range}'");
        Ok(())
    }

    /// Sends a request, retrying once with a refreshed token on 401. If the
    /// token cannot be refreshed the ledger disconnects itself.
    fn execute<F>(&self, build: F) -> Result<Response, RemoteError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        if !self.is_connected() {
            return Err(RemoteError::NotConnected);
        }
        let token = self.current_token().ok_or(RemoteError::NotConnected)?;
        let response = build(&token).send().map_err(transport_error)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response);
        }

        info!("Sheets access token rejected, attempting refresh");
        let refreshed = match &self.refresher {
            Some(refresher) => refresher.refresh(),
            None => Err(RemoteError::AuthExpired),
        };
        let token = match refreshed {
            Ok(token) => token,
            Err(e) => {
                warn!("Token refresh failed ({e}); disconnecting from sheets");
                self.disconnect();
                return Err(RemoteError::AuthExpired);
            }
        };
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());

        let response = build(&token).send().map_err(transport_error)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Refreshed token rejected too; disconnecting from sheets");
            self.disconnect();
            return Err(RemoteError::AuthExpired);
        }
        check_status(response)
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::RemoteUnavailable(e.to_string())
}

fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "Could not read error body".to_string());
    Err(RemoteError::RemoteUnavailable(format!("{status}: {body}")))
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl RemoteLedger for SheetsLedger {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn append_set_record(&self, row: &SetRow) -> Result<(), RemoteError> {
        self.append_row(SET_LOG_RANGE, set_row_values(row))
    }

    fn append_session_summary(&self, summary: &SummaryRecord) -> Result<(), RemoteError> {
        self.append_row(SUMMARY_RANGE, summary_row_values(summary))
    }

    fn read_previous_session(
        &self,
        workout_id: &str,
    ) -> Result<Option<PreviousSession>, RemoteError> {
        let rows = self.read_range(SET_LOG_RANGE)?;
        Ok(previous_session_from_rows(&rows, workout_id))
    }

    fn read_all_summaries(&self) -> Result<Vec<SummaryRecord>, RemoteError> {
        let rows = self.read_range(SUMMARY_RANGE)?;
        Ok(summaries_from_rows(&rows))
    }

    fn last_logged_date(&self) -> Result<Option<String>, RemoteError> {
        let rows = self.read_range(LOG_DATE_COLUMN)?;
        // Row 1 is the header.
        Ok(rows
            .iter()
            .skip(1)
            .filter_map(|r| r.first())
            .map(|d| day_of(d))
            .filter(|d| !d.is_empty())
            .last()
            .map(str::to_string))
    }
}

/// `date, workout, exercise, set, quantity, weight, rest, mode`
///
/// Duration rows carry their unit in the mode cell, e.g. `duration:minutes`.
pub fn set_row_values(row: &SetRow) -> Vec<Value> {
    let mode = match row.mode {
        TrackingMode::Reps => String::new(),
        TrackingMode::Duration => format!("{}:{}", TrackingMode::Duration, row.unit),
        other => other.to_string(),
    };
    vec![
        json!(row.date),
        json!(row.workout_id),
        json!(row.exercise_name),
        json!(row.set_number),
        json!(row.quantity),
        json!(row.weight),
        json!(row.rest_secs),
        json!(mode),
    ]
}

/// `date, workout, volume, minutes, exercises, name`
pub fn summary_row_values(summary: &SummaryRecord) -> Vec<Value> {
    vec![
        json!(summary.date),
        json!(summary.workout_id),
        json!(summary.total_volume),
        json!((summary.duration_secs + 30) / 60),
        json!(summary.exercise_count),
        json!(summary.workout_name),
    ]
}

/// Groups the rows of the most recent date logged for `workout_id` back into
/// exercises. Rows that do not parse (the header among them) are ignored.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn previous_session_from_rows(
    rows: &[Vec<String>],
    workout_id: &str,
) -> Option<PreviousSession> {
    let matching: Vec<&Vec<String>> = rows
        .iter()
        .filter(|r| r.get(1).map(String::as_str) == Some(workout_id))
        .filter(|r| r.get(3).is_some_and(|s| s.trim().parse::<u32>().is_ok()))
        .collect();
    let latest = matching
        .iter()
        .filter_map(|r| r.first())
        .map(|d| day_of(d))
        .max()?
        .to_string();

    let mut exercises: Vec<ExerciseLog> = Vec::new();
    for row in matching.iter().filter(|r| r.first().is_some_and(|d| day_of(d) == latest)) {
        let Some(record) = parse_set_cells(row) else {
            debug!("Skipping unparseable ledger row: {row:?}");
            continue;
        };
        let name = row.get(2).cloned().unwrap_or_default();
        let rest = row
            .get(6)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map_or(0, |r| r.max(0.0).round() as u32);
        match exercises.iter_mut().find(|e| e.name == name) {
            Some(exercise) => exercise.upsert_set(record),
            None => {
                let mut exercise = ExerciseLog::new(name, rest);
                exercise.upsert_set(record);
                exercises.push(exercise);
            }
        }
    }
    Some(PreviousSession {
        date: latest,
        exercises,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_set_cells(row: &[String]) -> Option<SetRecord> {
    let number = |i: usize| row.get(i).and_then(|s| s.trim().parse::<f64>().ok());
    let set_number = row.get(3)?.trim().parse::<u32>().ok()?;
    let quantity = number(4)?;
    let weight = number(5).unwrap_or(0.0);
    let (mode, unit) = row.get(7).map_or((None, None), |cell| {
        let (mode, unit) = match cell.trim().split_once(':') {
            Some((mode, unit)) => (mode, Some(unit)),
            None => (cell.trim(), None),
        };
        (
            mode.parse::<TrackingMode>().ok(),
            unit.and_then(|u| u.trim().parse::<DurationUnit>().ok()),
        )
    });
    // Rows written before units were recorded hold seconds.
    let record = match mode.unwrap_or_default() {
        TrackingMode::Reps => SetRecord::reps(set_number, quantity.max(0.0) as u32, weight),
        TrackingMode::Duration => SetRecord::duration(quantity, unit.unwrap_or_default()),
        TrackingMode::Completion => SetRecord::completion(),
    };
    Some(record)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn summaries_from_rows(rows: &[Vec<String>]) -> Vec<SummaryRecord> {
    rows.iter()
        .filter_map(|row| {
            let number = |i: usize| row.get(i).and_then(|s| s.trim().parse::<f64>().ok());
            let total_volume = number(2)?;
            let minutes = number(3).unwrap_or(0.0).max(0.0);
            Some(SummaryRecord {
                date: day_of(row.first()?).to_string(),
                workout_id: row.get(1)?.clone(),
                workout_name: row.get(5).cloned().unwrap_or_default(),
                total_volume,
                duration_secs: (minutes * 60.0).round() as u64,
                exercise_count: number(4).map_or(0, |c| c.max(0.0) as usize),
            })
        })
        .collect()
}

/// Leading `YYYY-MM-DD` of a date or timestamp cell.
fn day_of(cell: &str) -> &str {
    let cell = cell.trim();
    cell.get(..10).unwrap_or(cell)
}
