use anyhow::Result;

use workout_logger_lib::{BuiltinCatalog, CatalogError, TrackingMode, WorkoutCatalog};

#[test]
fn test_builtin_catalog_loads() -> Result<()> {
    let catalog = BuiltinCatalog::builtin()?;
    let ids: Vec<&str> = catalog.list_workouts().iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["upper_a", "lower_a", "upper_b", "lower_b"]);
    assert!(catalog
        .list_optional_workouts()
        .iter()
        .all(|w| w.optional));

    let lower_a = catalog.get_workout("lower_a").unwrap();
    assert_eq!(lower_a.name, "Lower A");
    assert_eq!(lower_a.exercises[0].name, "Back Squat");
    assert_eq!(lower_a.exercises[0].sets, 5);
    assert_eq!(lower_a.exercises[0].rest, 180);
    assert_eq!(lower_a.exercises[0].mode, TrackingMode::Reps);
    assert_eq!(lower_a.exercises[6].mode, TrackingMode::Duration);
    Ok(())
}

#[test]
fn test_pools_are_separate() -> Result<()> {
    let catalog = BuiltinCatalog::builtin()?;
    assert!(catalog.get_workout("zone2_cardio").is_none());
    assert!(catalog.get_optional_workout("zone2_cardio").is_some());
    assert!(catalog.find_workout("zone2_cardio", true).is_some());
    assert!(catalog.find_workout("lower_a", true).is_none());
    Ok(())
}

#[test]
fn test_substitution_lookup() -> Result<()> {
    let catalog = BuiltinCatalog::builtin()?;
    let entry = catalog.get_substitutions("Back Squat").unwrap();
    assert!(entry.options.len() >= 2);
    assert!(!entry.avoid.is_empty());
    assert!(catalog.has_substitutions("Back Squat"));
    assert!(!catalog.has_substitutions("Made Up Exercise"));

    let goblet = catalog
        .substitute_option(
            "Back Squat",
            "Goblet squat (lighter load, good for hypertrophy)",
        )
        .unwrap();
    assert_eq!(goblet.sets, Some(4));
    assert_eq!(goblet.rest, Some(120));

    // Plain string options carry no overrides
    let hack = catalog
        .substitute_option("Back Squat", "Hack squat machine")
        .unwrap();
    assert_eq!(hack.sets, None);
    assert_eq!(hack.reps, None);
    Ok(())
}

#[test]
fn test_bodyweight_mapping_falls_back_to_input() -> Result<()> {
    let catalog = BuiltinCatalog::builtin()?;
    assert_eq!(
        catalog.get_bodyweight_substitution("Back Squat"),
        "Pistol Squats (assisted)"
    );
    assert_eq!(catalog.get_bodyweight_substitution("Plank"), "Plank");
    assert_eq!(
        catalog.get_bodyweight_substitution("Unknown Lift"),
        "Unknown Lift"
    );
    Ok(())
}

#[test]
fn test_targets_with_substitute() -> Result<()> {
    let catalog = BuiltinCatalog::builtin()?;
    let squat = &catalog.get_workout("lower_a").unwrap().exercises[0];

    let plain = squat.targets_with(None, None);
    assert_eq!(plain.name, "Back Squat");
    assert!(!plain.substituted);

    let option = catalog.substitute_option(
        "Back Squat",
        "Goblet squat (lighter load, good for hypertrophy)",
    );
    let swapped = squat.targets_with(
        Some("Goblet squat (lighter load, good for hypertrophy)"),
        option,
    );
    assert!(swapped.substituted);
    assert_eq!(swapped.sets, 4);
    assert_eq!(swapped.reps, "10-12");
    assert_eq!(swapped.rest, 120);
    Ok(())
}

#[test]
fn test_custom_catalog_from_toml() -> Result<()> {
    let catalog = BuiltinCatalog::from_toml_str(
        r#"
        [[workouts]]
        id = "full_body"
        name = "Full Body"

        [[workouts.exercises]]
        name = "Deadlift"
        sets = 3
        reps = "5"
        rest = 240

        [[workouts.exercises]]
        name = "Farmer Carry"
        type = "completion"
        sets = 1
        reps = "40m"
        rest = 60

        [substitutions."Deadlift"]
        options = ["Trap Bar Deadlift"]
        "#,
    )?;
    let workout = catalog.get_workout("full_body").unwrap();
    assert_eq!(workout.exercises.len(), 2);
    assert_eq!(workout.exercises[1].mode, TrackingMode::Completion);
    assert!(catalog.list_optional_workouts().is_empty());
    assert_eq!(catalog.get_bodyweight_substitution("Deadlift"), "Deadlift");
    Ok(())
}

#[test]
fn test_invalid_catalogs_rejected() -> Result<()> {
    let duplicate = BuiltinCatalog::from_toml_str(
        r#"
        [[workouts]]
        id = "a"
        name = "A"
        [[workouts.exercises]]
        name = "Squat"
        sets = 3
        reps = "5"
        rest = 60

        [[workouts]]
        id = "a"
        name = "A again"
        [[workouts.exercises]]
        name = "Squat"
        sets = 3
        reps = "5"
        rest = 60
        "#,
    );
    assert!(matches!(duplicate, Err(CatalogError::DuplicateWorkout(ref id)) if id == "a"));

    let empty = BuiltinCatalog::from_toml_str(
        r#"
        [[workouts]]
        id = "empty"
        name = "Empty"
        exercises = []
        "#,
    );
    assert!(matches!(empty, Err(CatalogError::EmptyWorkout(_))));

    let repeated = BuiltinCatalog::from_toml_str(
        r#"
        [[workouts]]
        id = "twice"
        name = "Twice"
        [[workouts.exercises]]
        name = "Squat"
        sets = 3
        reps = "5"
        rest = 60
        [[workouts.exercises]]
        name = "Squat"
        sets = 2
        reps = "8"
        rest = 60
        "#,
    );
    assert!(matches!(
        repeated,
        Err(CatalogError::DuplicateExercise { .. })
    ));

    assert!(matches!(
        BuiltinCatalog::from_toml_str("workouts = 5"),
        Err(CatalogError::Parse(_))
    ));
    Ok(())
}
