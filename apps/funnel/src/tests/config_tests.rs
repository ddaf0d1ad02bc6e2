use super::{load_settings_from, normalize_database_url, Settings};

use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = load_settings_from(None, env_of(&[]));
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.api_base_url, "http://localhost:8000");
    assert!(!settings.signals().opt_out_asserted());
}

#[test]
fn file_values_override_defaults() {
    let file = r#"
api_base_url = "https://api.example.com"
database_url = "sqlite://./state/funnel.db"
do_not_track = "true"
"#;
    let settings = load_settings_from(Some(file), env_of(&[]));
    assert_eq!(settings.api_base_url, "https://api.example.com");
    assert_eq!(settings.database_url, "sqlite://./state/funnel.db");
    assert!(settings.do_not_track);
    assert!(!settings.global_privacy_control);
}

#[test]
fn prefixed_env_wins_over_plain_env_and_file() {
    let file = r#"api_base_url = "https://file.example.com""#;
    let settings = load_settings_from(
        Some(file),
        env_of(&[
            ("API_BASE_URL", "https://plain.example.com"),
            ("APP__API_BASE_URL", "https://prefixed.example.com"),
            ("APP__GLOBAL_PRIVACY_CONTROL", "1"),
        ]),
    );
    assert_eq!(settings.api_base_url, "https://prefixed.example.com");
    assert!(settings.signals().global_privacy_control);
}

#[test]
fn unparseable_flags_are_ignored() {
    let settings = load_settings_from(None, env_of(&[("APP__DO_NOT_TRACK", "maybe")]));
    assert!(!settings.do_not_track);
}

#[test]
fn malformed_file_falls_back_to_defaults() {
    let settings = load_settings_from(Some("this is = not [valid"), env_of(&[]));
    assert_eq!(settings, Settings::default());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite:local.db"), "sqlite://local.db");
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
}

#[test]
fn backslash_paths_become_forward_slashes() {
    assert_eq!(
        normalize_database_url(r"data\nested\funnel.db"),
        "sqlite://data/nested/funnel.db"
    );
    assert_eq!(
        normalize_database_url("sqlite://./data/funnel.db?mode=rwc"),
        "sqlite://./data/funnel.db?mode=rwc"
    );
}
