//! Persistent application settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use laundry_core::{
    classifier::{ClassifierConfig, PEAK_THRESHOLD, SOUND_THRESHOLD},
    transport::DEFAULT_ENDPOINT,
    EventPolicy,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub endpoint: String,
    pub store_root: PathBuf,
    pub staging_dir: PathBuf,
    pub peak_threshold: f32,
    pub sound_threshold: f32,
    pub event_policy: EventPolicy,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            store_root: PathBuf::from("."),
            staging_dir: std::env::temp_dir().join("laundry-alert"),
            peak_threshold: PEAK_THRESHOLD,
            sound_threshold: SOUND_THRESHOLD,
            event_policy: EventPolicy::Combined,
            request_timeout_secs: 10,
            poll_interval_ms: 1_000,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.endpoint = normalize_endpoint(&self.endpoint);
        self.peak_threshold = if self.peak_threshold.is_finite() {
            self.peak_threshold.clamp(1.0, 1.0e9)
        } else {
            PEAK_THRESHOLD
        };
        self.sound_threshold = if self.sound_threshold.is_finite() {
            self.sound_threshold.clamp(0.0, 1.0e9)
        } else {
            SOUND_THRESHOLD
        };
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 300);
        self.poll_interval_ms = self.poll_interval_ms.clamp(50, 60_000);
    }

    /// Apply `LAUNDRY_*` overrides from `lookup` (normally the process
    /// environment). Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("LAUNDRY_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(root) = lookup("LAUNDRY_STORE_ROOT") {
            self.store_root = PathBuf::from(root);
        }
        if let Some(raw) = lookup("LAUNDRY_PEAK_THRESHOLD") {
            match raw.trim().parse::<f32>() {
                Ok(v) => self.peak_threshold = v,
                Err(e) => warn!(value = %raw, error = %e, "ignoring LAUNDRY_PEAK_THRESHOLD"),
            }
        }
        if let Some(raw) = lookup("LAUNDRY_EVENT_POLICY") {
            match raw.parse::<EventPolicy>() {
                Ok(policy) => self.event_policy = policy,
                Err(e) => warn!(value = %raw, error = %e, "ignoring LAUNDRY_EVENT_POLICY"),
            }
        }
        self.normalize();
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            sound_threshold: self.sound_threshold,
            peak_threshold: self.peak_threshold,
            policy: self.event_policy,
            ..ClassifierConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_ENDPOINT.into()
    } else {
        trimmed.into()
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("LaundryAlert")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("laundry-alert")
            .join("settings.json")
    }
}

/// Missing or unreadable settings fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "invalid settings file; using defaults");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}
