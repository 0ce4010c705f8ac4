use std::{fs, path::Path, str::FromStr, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::{
    autosave::{DEFAULT_DEBOUNCE, DEFAULT_RETRY_DELAY, DEFAULT_SAVED_DISPLAY},
    cache::DEFAULT_FORM_LIST_TTL,
    history::{DEFAULT_CAPACITY, DEFAULT_COALESCE_WINDOW},
};

pub const SETTINGS_FILE: &str = "form_builder.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorSettings {
    pub database_url: String,
    pub history_capacity: usize,
    pub coalesce_window: Duration,
    pub autosave_debounce: Duration,
    pub saved_display: Duration,
    pub retry_delay: Duration,
    pub form_list_ttl: Duration,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/forms.db".into(),
            history_capacity: DEFAULT_CAPACITY,
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            autosave_debounce: DEFAULT_DEBOUNCE,
            saved_display: DEFAULT_SAVED_DISPLAY,
            retry_delay: DEFAULT_RETRY_DELAY,
            form_list_ttl: DEFAULT_FORM_LIST_TTL,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    database_url: Option<String>,
    history_capacity: Option<usize>,
    coalesce_window_ms: Option<u64>,
    autosave_debounce_ms: Option<u64>,
    saved_display_ms: Option<u64>,
    retry_delay_ms: Option<u64>,
    form_list_ttl_secs: Option<u64>,
}

impl EditorSettings {
    pub fn apply_toml(&mut self, raw: &str) -> Result<(), SettingsError> {
        let file: SettingsFile = toml::from_str(raw)?;
        if let Some(v) = file.database_url {
            self.database_url = v;
        }
        if let Some(v) = file.history_capacity {
            self.history_capacity = v;
        }
        if let Some(v) = file.coalesce_window_ms {
            self.coalesce_window = Duration::from_millis(v);
        }
        if let Some(v) = file.autosave_debounce_ms {
            self.autosave_debounce = Duration::from_millis(v);
        }
        if let Some(v) = file.saved_display_ms {
            self.saved_display = Duration::from_millis(v);
        }
        if let Some(v) = file.retry_delay_ms {
            self.retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = file.form_list_ttl_secs {
            self.form_list_ttl = Duration::from_secs(v);
        }
        Ok(())
    }

    pub fn apply_env(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(v) = env("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = env("APP__DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = parse_env::<usize>(&env, "APP__HISTORY_CAPACITY")? {
            self.history_capacity = v;
        }
        if let Some(v) = parse_env(&env, "APP__COALESCE_WINDOW_MS")? {
            self.coalesce_window = Duration::from_millis(v);
        }
        if let Some(v) = parse_env(&env, "APP__AUTOSAVE_DEBOUNCE_MS")? {
            self.autosave_debounce = Duration::from_millis(v);
        }
        if let Some(v) = parse_env(&env, "APP__SAVED_DISPLAY_MS")? {
            self.saved_display = Duration::from_millis(v);
        }
        if let Some(v) = parse_env(&env, "APP__RETRY_DELAY_MS")? {
            self.retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_env(&env, "APP__FORM_LIST_TTL_SECS")? {
            self.form_list_ttl = Duration::from_secs(v);
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, SettingsError> {
    let Some(raw) = env(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| SettingsError::InvalidValue {
            key: key.to_string(),
            value: raw,
        })
}

/// Defaults, then `form_builder.toml` in the working directory, then the
/// process environment. Unreadable or invalid sources are logged and skipped.
pub fn load_settings() -> EditorSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> EditorSettings {
    let mut settings = EditorSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Err(err) = settings.apply_toml(&raw) {
            warn!("settings: ignoring {}: {err}", path.display());
        }
    }

    if let Err(err) = settings.apply_env(env) {
        warn!("settings: ignoring environment override: {err}");
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
