use super::*;

use std::collections::HashMap;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn defaults_match_editor_behaviour() {
    let settings = EditorSettings::default();
    assert_eq!(settings.history_capacity, 50);
    assert_eq!(settings.coalesce_window, Duration::from_millis(500));
    assert_eq!(settings.autosave_debounce, Duration::from_millis(500));
    assert_eq!(settings.saved_display, Duration::from_secs(2));
    assert_eq!(settings.retry_delay, Duration::from_secs(5));
    assert_eq!(settings.form_list_ttl, Duration::from_secs(30));
}

#[test]
fn file_values_then_env_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(SETTINGS_FILE);
    fs::write(
        &path,
        r#"
database_url = "sqlite://./forms-from-file.db"
history_capacity = 20
autosave_debounce_ms = 1500
"#,
    )
    .expect("write settings");

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("APP__DATABASE_URL", "sqlite::memory:"),
            ("APP__RETRY_DELAY_MS", "250"),
        ]),
    );
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(settings.history_capacity, 20);
    assert_eq!(settings.autosave_debounce, Duration::from_millis(1500));
    assert_eq!(settings.retry_delay, Duration::from_millis(250));
    assert_eq!(settings.saved_display, Duration::from_secs(2));
}

#[test]
fn app_prefixed_url_wins_over_plain_database_url() {
    let mut settings = EditorSettings::default();
    settings
        .apply_env(env_from(&[
            ("DATABASE_URL", "sqlite://plain.db"),
            ("APP__DATABASE_URL", "sqlite://prefixed.db"),
        ]))
        .expect("env");
    assert_eq!(settings.database_url, "sqlite://prefixed.db");
}

#[test]
fn invalid_numbers_are_rejected() {
    let mut settings = EditorSettings::default();
    let err = settings
        .apply_env(env_from(&[("APP__HISTORY_CAPACITY", "lots")]))
        .expect_err("invalid value");
    assert!(matches!(
        err,
        SettingsError::InvalidValue { ref key, .. } if key == "APP__HISTORY_CAPACITY"
    ));
    assert_eq!(settings.history_capacity, 50);
}

#[test]
fn missing_or_broken_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = load_settings_from(&dir.path().join("absent.toml"), |_| None);
    assert_eq!(missing, EditorSettings::default());

    let path = dir.path().join("broken.toml");
    fs::write(&path, "history_capacity = \"many\"").expect("write settings");
    assert_eq!(load_settings_from(&path, |_| None), EditorSettings::default());
}

#[test]
fn history_capacity_is_read_as_usize() {
    let mut settings = EditorSettings::default();
    settings
        .apply_env(env_from(&[("APP__HISTORY_CAPACITY", " 12 ")]))
        .expect("env");
    assert_eq!(settings.history_capacity, 12);

    for raw in ["-1", "99999999999999999999999999"] {
        let err = settings
            .apply_env(env_from(&[("APP__HISTORY_CAPACITY", raw)]))
            .expect_err("out of range");
        assert!(matches!(err, SettingsError::InvalidValue { ref value, .. } if value == raw));
    }
    assert_eq!(settings.history_capacity, 12);
}
