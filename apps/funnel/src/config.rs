use std::{collections::HashMap, fs};

use client_core::AmbientSignals;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "funnel.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub api_base_url: String,
    pub database_url: String,
    pub global_privacy_control: bool,
    pub do_not_track: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            database_url: "sqlite://./data/funnel.db".into(),
            global_privacy_control: false,
            do_not_track: false,
        }
    }
}

impl Settings {
    pub fn signals(&self) -> AmbientSignals {
        AmbientSignals {
            global_privacy_control: self.global_privacy_control,
            do_not_track: self.do_not_track,
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the flat `funnel.toml` map, then environment variables. Later layers win.
pub fn load_settings_from(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            if let Some(v) = file_cfg.get("api_base_url") {
                settings.api_base_url = v.clone();
            }
            if let Some(v) = file_cfg.get("database_url") {
                settings.database_url = v.clone();
            }
            if let Some(v) = file_cfg.get("global_privacy_control").and_then(|v| parse_flag(v)) {
                settings.global_privacy_control = v;
            }
            if let Some(v) = file_cfg.get("do_not_track").and_then(|v| parse_flag(v)) {
                settings.do_not_track = v;
            }
        }
    }

    if let Some(v) = env("API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__GLOBAL_PRIVACY_CONTROL").and_then(|v| parse_flag(&v)) {
        settings.global_privacy_control = v;
    }
    if let Some(v) = env("APP__DO_NOT_TRACK").and_then(|v| parse_flag(&v)) {
        settings.do_not_track = v;
    }

    settings
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Accepts a bare file path or a `sqlite:` url and returns a `sqlite://` url. The parent
/// directory is created by the store when it opens.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
