//src/main.rs
mod cli; // Keep cli module for parsing args

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use std::fs::File;
use std::io::{stdin, stdout, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use workout_logger_lib::catalog::WorkoutDefinition;
use workout_logger_lib::platform::TerminalPlatform;
use workout_logger_lib::timer::{TimerEvent, TimerStatus};
use workout_logger_lib::{
    get_config_path_util, load_config_util, logging, AppService, DurationUnit, ExerciseLog,
    HistoryEntry, Performed, RecoveryOutcome, ResumePolicy, SessionSnapshot, SetRecord, Theme,
    TrackingMode, Units,
};

fn main() -> Result<()> {
    let cli_args = cli::parse_args();

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();
        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    let log_level = if cli_args.verbose {
        "debug".to_string()
    } else {
        get_config_path_util()
            .ok()
            .and_then(|path| load_config_util(&path).ok())
            .map_or_else(|| "warn".to_string(), |config| config.log_level)
    };
    logging::init_logging(&log_level)?;

    // Initialize the application service (loads config, opens the DB, reconnects)
    let mut service = AppService::initialize_with_platform(Arc::new(TerminalPlatform))
        .context("Failed to initialize application service")?;

    recover_interrupted(&mut service)?;
    let result = run(cli_args.command, &mut service);
    if let Err(e) = service.flush_remote() {
        warn!("Remote sync shutdown failed: {e:#}");
    }
    result
}

fn recover_interrupted(service: &mut AppService) -> Result<()> {
    let outcome = match service.config.resume {
        ResumePolicy::Always => service.recover_session(&mut |_: &SessionSnapshot| true)?,
        ResumePolicy::Never => service.recover_session(&mut |_: &SessionSnapshot| false)?,
        ResumePolicy::Ask => service.recover_session(&mut prompt_resume)?,
    };
    match outcome {
        RecoveryOutcome::Declined => println!("Discarded the interrupted session."),
        RecoveryOutcome::Discarded => {
            println!("An interrupted session could not be restored and was discarded.");
        }
        RecoveryOutcome::Resumed | RecoveryOutcome::NothingToRecover => {}
    }
    Ok(())
}

fn prompt_resume(snapshot: &SessionSnapshot) -> bool {
    let state = &snapshot.state;
    println!(
        "Found an unfinished '{}' session from {} with {} sets recorded.",
        state.workout_name,
        state.started_at.format("%Y-%m-%d %H:%M"),
        state.recorded_sets()
    );
    print!("Resume it? [Y/n]: ");
    if stdout().flush().is_err() {
        return true;
    }
    let mut input = String::new();
    if stdin().read_line(&mut input).is_err() {
        return true;
    }
    !input.trim().eq_ignore_ascii_case("n")
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N]: ");
    stdout().flush()?;
    let mut input = String::new();
    stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Exercise numbers on the command line are 1-based.
fn exercise_index(number: usize) -> Result<usize> {
    if number == 0 {
        bail!("Exercise numbers start at 1");
    }
    Ok(number - 1)
}

const fn cli_unit(unit: cli::UnitCli) -> DurationUnit {
    match unit {
        cli::UnitCli::Seconds => DurationUnit::Seconds,
        cli::UnitCli::Minutes => DurationUnit::Minutes,
    }
}

fn header_color(service: &AppService) -> Result<Color> {
    Ok(service.config.theme.header_color(service.theme()?)?)
}

#[allow(clippy::too_many_lines)]
fn run(command: cli::Commands, service: &mut AppService) -> Result<()> {
    match command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }
        cli::Commands::List { optional } => {
            let catalog = Arc::clone(service.catalog());
            let workouts = if optional {
                catalog.list_optional_workouts()
            } else {
                catalog.list_workouts()
            };
            print_workout_list(&workouts, header_color(service)?);
        }
        cli::Commands::Show { workout, optional } => {
            let catalog = Arc::clone(service.catalog());
            let Some(definition) = catalog.find_workout(&workout, optional) else {
                bail!("Unknown workout: '{workout}'");
            };
            print_workout_definition(definition, header_color(service)?);
        }
        cli::Commands::Start { workout, optional } => {
            service.start_workout(&workout, optional)?;
            if let Some(state) = service.session().state() {
                println!("Started {}.", state.workout_name);
                if !state.substitutions.is_empty() {
                    println!("Bodyweight mode substitutions:");
                    for (index, name) in &state.substitutions {
                        println!("  #{}: {} -> {}", index + 1, state.exercises[*index].name, name);
                    }
                }
            }
            print_status(service)?;
        }
        cli::Commands::Status => print_status(service)?,
        cli::Commands::Set {
            exercise,
            set,
            reps,
            weight,
        } => {
            let index = exercise_index(exercise)?;
            service
                .session_mut()
                .record_reps_set(index, set, reps, weight)?;
            let targets = service.session().targets(index)?;
            println!("Logged set {set} of {}.", targets.name);
            if weight.is_none() {
                print_weight_hint(service, &targets.name, set)?;
            }
            print_rest_started(service, targets.rest);
        }
        cli::Commands::Unset { exercise, set } => {
            let index = exercise_index(exercise)?;
            if service.session_mut().retract_reps_set(index, set)? {
                println!("Removed set {set}.");
            } else {
                println!("Set {set} was not recorded.");
            }
        }
        cli::Commands::Duration {
            exercise,
            amount,
            unit,
        } => {
            let index = exercise_index(exercise)?;
            let unit = cli_unit(unit);
            service
                .session_mut()
                .record_duration_exercise(index, amount, unit)?;
            let targets = service.session().targets(index)?;
            println!("Logged {amount} {} of {}.", unit.short(), targets.name);
            print_rest_started(service, targets.rest);
        }
        cli::Commands::Done { exercise, undo } => {
            let index = exercise_index(exercise)?;
            service
                .session_mut()
                .record_completion_exercise(index, !undo)?;
            let targets = service.session().targets(index)?;
            if undo {
                println!("Unchecked {}.", targets.name);
            } else {
                println!("Checked off {}.", targets.name);
                print_rest_started(service, targets.rest);
            }
        }
        cli::Commands::Sub { exercise, name } => {
            let index = exercise_index(exercise)?;
            match name {
                Some(name) => {
                    service.session_mut().set_substitution(index, &name)?;
                    let targets = service.session().targets(index)?;
                    println!(
                        "Exercise #{exercise} is now {} ({} x {}, rest {}s).",
                        targets.name, targets.sets, targets.reps, targets.rest
                    );
                }
                None => print_substitution_options(service, index)?,
            }
        }
        cli::Commands::Unsub { exercise } => {
            let index = exercise_index(exercise)?;
            if service.session_mut().clear_substitution(index)? {
                let targets = service.session().targets(index)?;
                println!("Back to {}.", targets.name);
            } else {
                println!("Exercise #{exercise} has no substitution.");
            }
        }
        cli::Commands::Stopwatch { action } => match action {
            cli::StopwatchAction::Start { exercise } => {
                let index = exercise_index(exercise)?;
                service.session_mut().start_stopwatch(index)?;
                println!("Stopwatch running for exercise #{exercise}.");
            }
            cli::StopwatchAction::Pause => {
                let secs = service.session_mut().pause_stopwatch()?;
                println!("Stopwatch paused at {}.", format_clock(secs));
            }
            cli::StopwatchAction::Stop { unit } => {
                let unit = cli_unit(unit);
                let amount = service.session_mut().stop_stopwatch(unit)?;
                println!("Logged {amount:.2} {}.", unit.short());
            }
        },
        cli::Commands::Rest { action } => match action {
            cli::RestAction::Wait => wait_for_rest(service)?,
            cli::RestAction::Pause => match service.session_mut().pause_rest()? {
                Some(remaining) => println!("Rest paused with {} left.", format_clock(remaining.into())),
                None => println!("No rest timer running."),
            },
            cli::RestAction::Resume => match service.session_mut().resume_rest()? {
                Some(remaining) => println!("Rest resumed, {} left.", format_clock(remaining.into())),
                None => println!("No paused rest timer."),
            },
            cli::RestAction::Skip => {
                service.session_mut().skip_rest()?;
                println!("Rest skipped.");
            }
        },
        cli::Commands::Finish => {
            let log = service.session_mut().finish()?;
            println!(
                "Workout complete!\nDuration: {} minutes\nExercises: {}\nVolume: {:.0} {}",
                (log.duration + 30) / 60,
                log.exercises.len(),
                log.total_volume(),
                service.config.units.weight_label()
            );
        }
        cli::Commands::Cancel => {
            service.session_mut().cancel()?;
            println!("Workout cancelled. Nothing was saved.");
        }
        cli::Commands::History { limit } => {
            let entries = service.history()?;
            if entries.is_empty() {
                println!("No workouts logged yet.");
            } else {
                let shown: Vec<HistoryEntry> = entries.into_iter().take(limit).collect();
                print_history_table(&shown, header_color(service)?, service.config.units);
            }
        }
        cli::Commands::Previous { workout } => match service.previous_performance(&workout)? {
            Some(previous) => {
                println!("Last '{workout}' session: {} ({})", previous.date, previous.source);
                for exercise in &previous.exercises {
                    println!("  {}: {}", exercise.name, format_sets(exercise));
                }
            }
            None => println!("No previous '{workout}' session found."),
        },
        cli::Commands::Export { output } => {
            let rows = match &output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    service.export_csv(file)?
                }
                None => service.export_csv(stdout().lock())?,
            };
            if let Some(path) = output {
                println!("Exported {rows} sets to {}.", path.display());
            }
        }
        cli::Commands::Bodyweight { enabled } => {
            if let Some(enabled) = enabled {
                service.set_bodyweight_mode(enabled)?;
            }
            let on = service.bodyweight_mode()?;
            println!(
                "Bodyweight mode is {}{}.",
                if on { "on" } else { "off" },
                if enabled.is_some() && service.session().state().is_some() {
                    " (takes effect from the next session)"
                } else {
                    ""
                }
            );
        }
        cli::Commands::Theme { theme } => {
            if let Some(theme) = theme {
                service.set_theme(match theme {
                    cli::ThemeCli::Light => Theme::Light,
                    cli::ThemeCli::Dark => Theme::Dark,
                })?;
            }
            println!("Theme: {}", service.theme()?);
        }
        cli::Commands::Sheet { id } => {
            if let Some(id) = id {
                service.set_sheet_id(&id)?;
            }
            match service.sheet_id()? {
                Some(id) => println!("Spreadsheet: {id}"),
                None => println!("No spreadsheet configured."),
            }
        }
        cli::Commands::Connect { token } => {
            let pushed = service.connect(&token)?;
            println!("Connected. Synced {pushed} workouts.");
        }
        cli::Commands::Disconnect => {
            service.disconnect()?;
            println!("Disconnected.");
        }
        cli::Commands::Sync => {
            let pushed = service.sync_local_to_remote()?;
            if pushed == 0 {
                println!("All data already synced.");
            } else {
                println!("Synced {pushed} workouts.");
            }
        }
        cli::Commands::ClearData { yes } => {
            if !yes
                && !confirm("Are you sure you want to clear all workout data? This cannot be undone.")?
            {
                println!("Nothing deleted.");
                return Ok(());
            }
            let removed = service.clear_all_logs()?;
            println!("Deleted {removed} workouts.");
        }
        cli::Commands::DbPath => println!("{}", service.get_db_path().display()),
        cli::Commands::ConfigPath => println!("{}", service.get_config_path().display()),
    }
    Ok(())
}

fn print_rest_started(service: &AppService, rest: u32) {
    let timer = service.session().rest_timer();
    if rest > 0 && timer.status == TimerStatus::Running {
        println!(
            "Rest {} (run 'rest wait' to count down).",
            format_clock(timer.remaining_secs.into())
        );
    }
}

fn print_weight_hint(service: &AppService, exercise: &str, set: u32) -> Result<()> {
    let Some(state) = service.session().state() else {
        return Ok(());
    };
    let hint = service
        .previous_performance(&state.workout_id)?
        .and_then(|p| p.suggested_weight(exercise, set));
    if let Some(weight) = hint {
        println!(
            "Logged without weight; last time set {set} used {weight} {}. Re-log with --weight to record it.",
            service.config.units.weight_label()
        );
    }
    Ok(())
}

fn wait_for_rest(service: &mut AppService) -> Result<()> {
    let session = service.session_mut();
    if session.rest_timer().status != TimerStatus::Running {
        println!("No rest timer running.");
        return Ok(());
    }
    print!("\rRest: {}   ", format_clock(session.rest_timer().remaining_secs.into()));
    stdout().flush()?;
    loop {
        match session.poll_timer() {
            Some(TimerEvent::Tick { remaining_secs }) => {
                print!("\rRest: {}   ", format_clock(remaining_secs.into()));
                stdout().flush()?;
            }
            Some(TimerEvent::Completed) => {
                // The platform hook announces the end of the rest.
                println!("\r{:<16}", "Rest: 0:00");
                return Ok(());
            }
            None if session.rest_timer().status != TimerStatus::Running => {
                println!();
                return Ok(());
            }
            None => {}
        }
        let now = session.now();
        let wait = session
            .next_timer_deadline()
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::from_millis(250))
            .clamp(Duration::from_millis(20), Duration::from_secs(1));
        std::thread::sleep(wait);
    }
}

fn format_clock(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn format_set(set: &SetRecord) -> String {
    match set.performed {
        Performed::Reps(reps) if set.weight > 0.0 => format!("{reps}x{}", set.weight),
        Performed::Reps(reps) => reps.to_string(),
        Performed::Duration { amount, unit } => format!("{amount} {}", unit.short()),
        Performed::Completed => "done".to_string(),
    }
}

fn format_sets(exercise: &ExerciseLog) -> String {
    if exercise.sets.is_empty() {
        return "-".to_string();
    }
    exercise
        .sets
        .iter()
        .map(|s| match s.performed {
            Performed::Reps(_) => format!("{}: {}", s.set_number, format_set(s)),
            _ => format_set(s),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_status(service: &AppService) -> Result<()> {
    let session = service.session();
    let Some(state) = session.state() else {
        println!("No workout in progress. Start one with 'start <workout>'.");
        return Ok(());
    };
    let header_color = header_color(service)?;
    let previous = service.previous_performance(&state.workout_id)?;
    let progress = session.progress()?;
    let elapsed = u64::try_from((session.now() - state.started_at).num_seconds()).unwrap_or(0);

    println!(
        "{} ({}) started {} UTC, {} elapsed",
        state.workout_name,
        state.workout_id,
        state.started_at.format("%Y-%m-%d %H:%M"),
        format_clock(elapsed)
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(header_color),
            Cell::new("Exercise").fg(header_color),
            Cell::new("Target").fg(header_color),
            Cell::new("Rest (s)").fg(header_color),
            Cell::new("Logged").fg(header_color),
            Cell::new("Last time").fg(header_color),
        ]);

    for entry in &progress.exercises {
        let targets = session.targets(entry.index)?;
        let log = &state.exercises[entry.index];
        let name = if targets.substituted {
            format!("{} (for {})", targets.name, log.name)
        } else {
            targets.name.clone()
        };
        let target = match targets.mode {
            TrackingMode::Reps => format!("{} x {}", targets.sets, targets.reps),
            TrackingMode::Duration | TrackingMode::Completion => targets.reps.clone(),
        };
        let last = previous
            .as_ref()
            .and_then(|p| p.exercise(&targets.name).or_else(|| p.exercise(&log.name)))
            .map_or_else(|| "-".to_string(), format_sets);
        table.add_row(vec![
            Cell::new(format!(
                "{}{}",
                entry.index + 1,
                if entry.complete { " ✓" } else { "" }
            )),
            Cell::new(name),
            Cell::new(target),
            Cell::new(targets.rest.to_string()),
            Cell::new(format_sets(log)),
            Cell::new(last),
        ]);
    }
    println!("{table}");
    println!("Progress: {}/{} exercises", progress.completed, progress.total);

    let rest = session.rest_timer();
    match rest.status {
        TimerStatus::Running if rest.remaining_secs == 0 => println!("Rest over."),
        TimerStatus::Running => println!("Rest: {} remaining", format_clock(rest.remaining_secs.into())),
        TimerStatus::Paused => println!("Rest paused: {} remaining", format_clock(rest.remaining_secs.into())),
        TimerStatus::Idle => {}
    }
    if let Some(watch) = state.stopwatch {
        println!(
            "Stopwatch on #{}: {}{}",
            watch.exercise_index + 1,
            format_clock(watch.elapsed_secs(session.now())),
            if watch.is_running() { "" } else { " (paused)" }
        );
    }
    if service.is_connected() {
        println!("Sync: {}", service.sync_status());
    }
    Ok(())
}

fn print_substitution_options(service: &AppService, index: usize) -> Result<()> {
    let session = service.session();
    let targets = session.targets(index)?;
    let Some(entry) = session.substitution_options(index)? else {
        println!("No listed alternatives for {}. You can still name one: 'sub {} <name>'.", targets.name, index + 1);
        return Ok(());
    };
    println!("Alternatives for exercise #{}:", index + 1);
    for option in &entry.options {
        let mut overrides = Vec::new();
        if let Some(sets) = option.sets {
            overrides.push(format!("{sets} sets"));
        }
        if let Some(reps) = &option.reps {
            overrides.push(format!("{reps} reps"));
        }
        if let Some(rest) = option.rest {
            overrides.push(format!("{rest}s rest"));
        }
        if overrides.is_empty() {
            println!("  - {}", option.name);
        } else {
            println!("  - {} ({})", option.name, overrides.join(", "));
        }
    }
    if !entry.avoid.is_empty() {
        println!("Avoid: {}", entry.avoid.join(", "));
    }
    if let Some(notes) = &entry.notes {
        println!("Notes: {notes}");
    }
    Ok(())
}

fn print_workout_list(workouts: &[&WorkoutDefinition], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Name").fg(header_color),
            Cell::new("Exercises").fg(header_color),
            Cell::new("Description").fg(header_color),
        ]);
    for workout in workouts {
        table.add_row(vec![
            Cell::new(&workout.id),
            Cell::new(&workout.name),
            Cell::new(workout.exercises.len().to_string()),
            Cell::new(&workout.description),
        ]);
    }
    println!("{table}");
}

fn print_workout_definition(workout: &WorkoutDefinition, header_color: Color) {
    println!("{} ({})", workout.name, workout.id);
    if !workout.description.is_empty() {
        println!("{}", workout.description);
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(header_color),
            Cell::new("Exercise").fg(header_color),
            Cell::new("Type").fg(header_color),
            Cell::new("Sets").fg(header_color),
            Cell::new("Target").fg(header_color),
            Cell::new("Rest (s)").fg(header_color),
            Cell::new("Notes").fg(header_color),
        ]);
    for (index, exercise) in workout.exercises.iter().enumerate() {
        let notes = match (&exercise.superset, &exercise.notes) {
            (Some(pair), Some(notes)) => format!("Superset with {pair}. {notes}"),
            (Some(pair), None) => format!("Superset with {pair}"),
            (None, Some(notes)) => notes.clone(),
            (None, None) => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new((index + 1).to_string()),
            Cell::new(&exercise.name),
            Cell::new(exercise.mode.to_string()),
            Cell::new(exercise.sets.to_string()),
            Cell::new(&exercise.reps),
            Cell::new(exercise.rest.to_string()),
            Cell::new(notes),
        ]);
    }
    println!("{table}");
    for note in &workout.notes {
        println!("- {note}");
    }
}

fn print_history_table(entries: &[HistoryEntry], header_color: Color, units: Units) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Date").fg(header_color),
            Cell::new("Workout").fg(header_color),
            Cell::new(format!("Volume ({})", units.weight_label())).fg(header_color),
            Cell::new("Duration (min)").fg(header_color),
            Cell::new("Exercises").fg(header_color),
            Cell::new("Source").fg(header_color),
        ]);
    for entry in entries {
        let workout = if entry.workout_name.is_empty() {
            entry.workout_id.clone()
        } else {
            entry.workout_name.clone()
        };
        table.add_row(vec![
            Cell::new(&entry.date),
            Cell::new(workout),
            Cell::new(format!("{:.0}", entry.total_volume)),
            Cell::new(((entry.duration_secs + 30) / 60).to_string()),
            Cell::new(entry.exercise_count.to_string()),
            Cell::new(entry.source.to_string()),
        ]);
    }
    println!("{table}");
}
