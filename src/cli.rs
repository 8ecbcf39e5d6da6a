// src/cli.rs
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Log predefined workout programs set by set", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitCli {
    Seconds,
    Minutes,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThemeCli {
    Light,
    Dark,
}

#[derive(Subcommand, Debug)]
pub enum RestAction {
    /// Count down the running rest period in the terminal
    Wait,
    Pause,
    Resume,
    /// Dismiss the rest timer
    Skip,
}

#[derive(Subcommand, Debug)]
pub enum StopwatchAction {
    /// Start (or resume) timing a duration exercise
    Start { exercise: usize },
    Pause,
    /// Stop timing and record the elapsed time
    Stop {
        #[arg(short, long, value_enum, default_value_t = UnitCli::Minutes)]
        unit: UnitCli,
    },
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the available workouts
    List {
        /// List the optional (supplementary) workouts instead
        #[arg(short, long)]
        optional: bool,
    },
    /// Show the exercises of a workout
    Show {
        workout: String,
        #[arg(short, long)]
        optional: bool,
    },
    /// Start a workout session
    Start {
        workout: String,
        #[arg(short, long)]
        optional: bool,
    },
    /// Show the session in progress
    Status,
    /// Record a completed set of a reps exercise
    Set {
        /// Exercise number as shown by 'status'
        exercise: usize,
        /// Set number (1-based)
        set: u32,
        /// Reps completed
        #[arg(allow_negative_numbers = true)]
        reps: i64,
        /// Weight used; defaults to 0
        #[arg(short, long)]
        weight: Option<f64>,
    },
    /// Remove a recorded set
    Unset { exercise: usize, set: u32 },
    /// Record the time of a duration exercise
    Duration {
        exercise: usize,
        amount: f64,
        #[arg(short, long, value_enum, default_value_t = UnitCli::Minutes)]
        unit: UnitCli,
    },
    /// Check off a completion exercise
    Done {
        exercise: usize,
        /// Un-check it instead
        #[arg(long)]
        undo: bool,
    },
    /// Substitute an exercise; without a name, list the alternatives
    Sub {
        exercise: usize,
        name: Option<String>,
    },
    /// Go back to the programmed exercise
    Unsub { exercise: usize },
    /// Time a duration exercise
    Stopwatch {
        #[command(subcommand)]
        action: StopwatchAction,
    },
    /// Control the rest timer
    Rest {
        #[command(subcommand)]
        action: RestAction,
    },
    /// Finish and save the session
    Finish,
    /// Discard the session without saving
    Cancel,
    /// List past sessions, newest first
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show what you did last time for a workout
    Previous { workout: String },
    /// Export all logged sets as CSV
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show or set bodyweight mode (applies from the next session)
    Bodyweight { enabled: Option<bool> },
    /// Show or set the color theme
    Theme {
        #[arg(value_enum)]
        theme: Option<ThemeCli>,
    },
    /// Show or set the spreadsheet id used for syncing
    Sheet { id: Option<String> },
    /// Connect to the spreadsheet with an access token and sync local data
    Connect { token: String },
    /// Forget the cached access token
    Disconnect,
    /// Push local sessions the spreadsheet does not have yet
    Sync,
    /// Delete all logged sessions
    ClearData {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show the path to the database file
    DbPath,
    /// Show the path to the config file
    ConfigPath,
    /// Generate shell completion scripts
    GenerateCompletion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
