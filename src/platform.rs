//src/platform.rs
use anyhow::Result;
use std::io::Write;

/// Side-effecting device hooks. Every call is best-effort: callers log
/// failures and carry on.
pub trait Platform: Send + Sync {
    /// Ask the device to keep the screen on while a session runs.
    fn keep_awake(&self) -> Result<()>;
    fn release_awake(&self) -> Result<()>;
    /// Tell the user the rest period is over.
    fn rest_over(&self, exercise_name: Option<&str>) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlatform;

impl Platform for NoopPlatform {
    fn keep_awake(&self) -> Result<()> {
        Ok(())
    }

    fn release_awake(&self) -> Result<()> {
        Ok(())
    }

    fn rest_over(&self, _exercise_name: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// Terminal flavour: there is no screen lock to hold, the alert rings the bell.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPlatform;

impl Platform for TerminalPlatform {
    fn keep_awake(&self) -> Result<()> {
        Ok(())
    }

    fn release_awake(&self) -> Result<()> {
        Ok(())
    }

    fn rest_over(&self, exercise_name: Option<&str>) -> Result<()> {
        let mut err = std::io::stderr().lock();
        match exercise_name {
            Some(name) => writeln!(err, "\x07Rest over. Next up: {name}")?,
            None => writeln!(err, "\x07Rest over.")?,
        }
        err.flush()?;
        Ok(())
    }
}
