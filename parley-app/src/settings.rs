//! Persistent server settings (JSON file in the app data directory).
//!
//! Loaded once at startup, normalized, then overlaid with environment
//! variables so secrets can stay out of the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parley_core::{AlignThresholds, EngineConfig, LevelingPolicy, ProgressionConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub bind_addr: String,
    /// Overrides the XDG default database location.
    pub db_path: Option<String>,
    pub acceptance_threshold: u8,
    pub word_correct_cutoff: f64,
    pub word_close_cutoff: f64,
    pub medium_unlock: u32,
    pub hard_unlock: u32,
    pub easy_exchanges: usize,
    pub medium_exchanges: usize,
    pub hard_exchanges: usize,
    pub transcription_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub gemini_model: String,
    pub gemini_api_key: Option<String>,
    pub openai_transcribe_model: String,
    pub openai_api_key: Option<String>,
    pub retention_days: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            db_path: None,
            acceptance_threshold: 70,
            word_correct_cutoff: 0.9,
            word_close_cutoff: 0.7,
            medium_unlock: 5,
            hard_unlock: 10,
            easy_exchanges: 5,
            medium_exchanges: 7,
            hard_exchanges: 10,
            transcription_timeout_secs: 20,
            generation_timeout_secs: 30,
            gemini_model: "gemini-1.5-flash".into(),
            gemini_api_key: None,
            openai_transcribe_model: "gpt-4o-mini-transcribe".into(),
            openai_api_key: None,
            retention_days: 365,
        }
    }
}

/// Settings view safe to return over HTTP (no secrets).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    pub acceptance_threshold: u8,
    pub word_correct_cutoff: f64,
    pub word_close_cutoff: f64,
    pub leveling: LevelingPolicy,
    pub transcription_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub gemini_model: String,
    pub has_gemini_api_key: bool,
    pub openai_transcribe_model: String,
    pub has_openai_api_key: bool,
    pub retention_days: usize,
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let bind = self.bind_addr.trim();
        self.bind_addr = if bind.is_empty() {
            Self::default().bind_addr
        } else {
            bind.to_string()
        };
        self.db_path = normalize_secret(self.db_path.take());
        self.acceptance_threshold = self.acceptance_threshold.clamp(1, 100);

        self.word_correct_cutoff = finite_or(self.word_correct_cutoff, 0.9).clamp(0.05, 1.0);
        self.word_close_cutoff =
            finite_or(self.word_close_cutoff, 0.7).clamp(0.0, self.word_correct_cutoff);

        self.medium_unlock = self.medium_unlock.clamp(1, 1000);
        self.hard_unlock = self.hard_unlock.clamp(self.medium_unlock, 1000);

        self.easy_exchanges = self.easy_exchanges.clamp(1, 20);
        self.medium_exchanges = self.medium_exchanges.clamp(1, 20);
        self.hard_exchanges = self.hard_exchanges.clamp(1, 20);

        self.transcription_timeout_secs = self.transcription_timeout_secs.clamp(1, 120);
        self.generation_timeout_secs = self.generation_timeout_secs.clamp(1, 300);

        self.gemini_model = normalize_model_name(&self.gemini_model, "gemini-1.5-flash");
        self.openai_transcribe_model =
            normalize_model_name(&self.openai_transcribe_model, "gpt-4o-mini-transcribe");
        self.gemini_api_key = normalize_secret(self.gemini_api_key.take());
        self.openai_api_key = normalize_secret(self.openai_api_key.take());

        self.retention_days = self.retention_days.clamp(1, 3650);
    }

    /// Overlay `PARLEY_*` / `GEMINI_API_KEY` variables from the process
    /// environment, then re-normalize.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("PARLEY_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(path) = lookup("PARLEY_DB_PATH") {
            self.db_path = Some(path);
        }
        if let Some(key) = lookup("PARLEY_GEMINI_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            self.gemini_api_key = Some(key);
        }
        if let Some(key) = lookup("PARLEY_OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        self.normalize();
    }

    pub fn leveling_policy(&self) -> LevelingPolicy {
        LevelingPolicy {
            medium_unlock: self.medium_unlock,
            hard_unlock: self.hard_unlock,
            easy_exchanges: self.easy_exchanges,
            medium_exchanges: self.medium_exchanges,
            hard_exchanges: self.hard_exchanges,
        }
    }

    pub fn progression_config(&self) -> ProgressionConfig {
        ProgressionConfig {
            acceptance_threshold: self.acceptance_threshold,
            align: AlignThresholds {
                correct: self.word_correct_cutoff,
                close: self.word_close_cutoff,
            },
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            transcription_timeout: Duration::from_secs(self.transcription_timeout_secs),
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            progression: self.progression_config(),
            leveling: self.leveling_policy(),
            ..EngineConfig::default()
        }
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            acceptance_threshold: self.acceptance_threshold,
            word_correct_cutoff: self.word_correct_cutoff,
            word_close_cutoff: self.word_close_cutoff,
            leveling: self.leveling_policy(),
            transcription_timeout_secs: self.transcription_timeout_secs,
            generation_timeout_secs: self.generation_timeout_secs,
            gemini_model: self.gemini_model.clone(),
            has_gemini_api_key: self.gemini_api_key.is_some(),
            openai_transcribe_model: self.openai_transcribe_model.clone(),
            has_openai_api_key: self.openai_api_key.is_some(),
            retention_days: self.retention_days,
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn normalize_model_name(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.into()
    } else {
        trimmed.into()
    }
}

fn normalize_secret(raw: Option<String>) -> Option<String> {
    raw.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

pub fn default_data_dir() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("parley")
}

pub fn default_settings_path() -> PathBuf {
    default_data_dir().join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("nope.json"));
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn partial_file_keeps_defaults_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"acceptanceThreshold": 0, "mediumUnlock": 8, "hardUnlock": 3, "hardExchanges": 99, "wordCloseCutoff": 0.95}"#,
        )
        .unwrap();
        let settings = load_settings(&path);
        assert_eq!(settings.acceptance_threshold, 1);
        assert_eq!(settings.medium_unlock, 8);
        assert_eq!(settings.hard_unlock, 8);
        assert_eq!(settings.hard_exchanges, 20);
        assert_eq!(settings.word_close_cutoff, 0.9);
        assert_eq!(settings.easy_exchanges, 5);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = AppSettings::default();
        settings.retention_days = 30;
        settings.gemini_model = "gemini-2.0-flash".into();
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn env_overrides_win_and_blank_keys_are_dropped() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PARLEY_BIND_ADDR", "0.0.0.0:9000"),
            ("GEMINI_API_KEY", " gm-key "),
            ("PARLEY_OPENAI_API_KEY", "   "),
        ]);
        let mut settings = AppSettings::default();
        settings.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.bind_addr, "0.0.0.0:9000");
        assert_eq!(settings.gemini_api_key.as_deref(), Some("gm-key"));
        assert_eq!(settings.openai_api_key, None);
        assert!(settings.runtime_settings().has_gemini_api_key);
    }

    #[test]
    fn derived_configs_follow_settings() {
        let mut settings = AppSettings::default();
        settings.acceptance_threshold = 80;
        settings.medium_unlock = 2;
        settings.hard_unlock = 5;
        let engine = settings.engine_config();
        assert_eq!(engine.progression.acceptance_threshold, 80);
        assert_eq!(engine.leveling, LevelingPolicy::with_thresholds(2, 5));
        assert_eq!(engine.generation_timeout, Duration::from_secs(30));
    }
}
