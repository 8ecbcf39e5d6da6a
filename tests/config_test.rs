use anyhow::Result;
use comfy_table::Color;

use workout_logger_lib::{
    load_config_util, parse_color, save_config_util, Config, ConfigError, ResumePolicy,
    StandardColor, Theme, Units,
};

#[test]
fn test_missing_config_is_created_with_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("config.toml");

    let config = load_config_util(&path)?;
    assert_eq!(config, Config::default());
    assert!(path.exists());
    assert_eq!(config.units, Units::Imperial);
    assert_eq!(config.resume, ResumePolicy::Always);
    assert_eq!(config.timer_tick_ms, 1000);
    Ok(())
}

#[test]
fn test_config_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    let config = Config {
        units: Units::Metric,
        default_sheet_id: Some("sheet-1".to_string()),
        resume: ResumePolicy::Ask,
        timer_tick_ms: 250,
        ..Default::default()
    };
    save_config_util(&path, &config)?;
    assert_eq!(load_config_util(&path)?, config);
    Ok(())
}

#[test]
fn test_partial_config_fills_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "units = \"metric\"\nresume = \"never\"\n")?;

    let config = load_config_util(&path)?;
    assert_eq!(config.units, Units::Metric);
    assert_eq!(config.resume, ResumePolicy::Never);
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.theme.header_color, "Green");
    Ok(())
}

#[test]
fn test_invalid_values_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");

    std::fs::write(&path, "timer_tick_ms = 5\n")?;
    assert!(matches!(
        load_config_util(&path),
        Err(ConfigError::InvalidTick(5))
    ));

    std::fs::write(&path, "[theme]\nheader_color = \"Chartreuse\"\n")?;
    assert!(matches!(
        load_config_util(&path),
        Err(ConfigError::InvalidColor(_))
    ));

    std::fs::write(&path, "units = [")?;
    assert!(matches!(
        load_config_util(&path),
        Err(ConfigError::TomlParse(_))
    ));
    Ok(())
}

#[test]
fn test_header_color_follows_theme() -> Result<()> {
    let config = Config::default();
    assert_eq!(config.theme.header_color(Theme::Light)?, Color::Green);
    assert_eq!(config.theme.header_color(Theme::Dark)?, Color::Cyan);
    assert_eq!(parse_color("darkgrey")?, StandardColor::DarkGrey);
    Ok(())
}
