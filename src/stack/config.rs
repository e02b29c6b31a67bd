//! Stack settings
//!
//! Defaults, then an optional JSON file named by `WEBHEALTH_CONFIG`, then
//! individual environment variables:
//!
//! - WEBHEALTH_STACK_NAME=web-health
//! - WEBHEALTH_INTERVAL_MINUTES=2
//! - WEBHEALTH_URLS=https://example.com,https://example.org
//! - WEBHEALTH_NAMESPACE=WebHealth
//! - WEBHEALTH_ALARM_EMAIL=ops@example.com
//! - WEBHEALTH_ASSET_DIR=./resources

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::graph::builder::is_valid_email;
use crate::graph::{Runtime, MAX_TIMEOUT_MINUTES};

/// Static configuration of the web health stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSettings {
    /// Stack name, used as the root of every resource path
    pub stack_name: String,
    /// Polling period of the health check, in minutes
    pub interval_minutes: u32,
    /// Monitored endpoints
    pub urls: Vec<String>,
    /// Metric namespace the health check publishes into
    pub namespace: String,
    pub availability_metric: String,
    pub latency_metric: String,
    /// Address subscribed to alarm notifications
    pub alarm_email: String,
    /// Availability alarm fires below this value
    pub availability_threshold: f64,
    /// Latency alarm fires above this value, in seconds
    pub latency_threshold: f64,
    /// Consecutive breaching periods before an alarm fires
    /// (defaults to `interval_minutes`)
    pub evaluation_periods: Option<u32>,
    pub function_timeout_minutes: u32,
    pub runtime: Runtime,
    /// Directory holding both handler modules
    pub asset_dir: PathBuf,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            stack_name: "web-health".to_string(),
            interval_minutes: 2,
            urls: vec!["https://example.com".to_string()],
            namespace: "WebHealth".to_string(),
            availability_metric: "url_availability".to_string(),
            latency_metric: "url_latency".to_string(),
            alarm_email: "alerts@example.com".to_string(),
            availability_threshold: 1.0,
            latency_threshold: 0.3,
            evaluation_periods: None,
            function_timeout_minutes: 2,
            runtime: Runtime::default(),
            asset_dir: PathBuf::from("./resources"),
        }
    }
}

impl StackSettings {
    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var("WEBHEALTH_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply `WEBHEALTH_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("WEBHEALTH_STACK_NAME") {
            self.stack_name = name.trim().to_string();
        }
        if let Some(raw) = lookup("WEBHEALTH_INTERVAL_MINUTES") {
            self.interval_minutes = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "WEBHEALTH_INTERVAL_MINUTES",
                value: raw.clone(),
            })?;
        }
        // "https://a.com,https://b.com" format; an empty value means no endpoints
        if let Some(raw) = lookup("WEBHEALTH_URLS") {
            self.urls = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(namespace) = lookup("WEBHEALTH_NAMESPACE") {
            self.namespace = namespace.trim().to_string();
        }
        if let Some(email) = lookup("WEBHEALTH_ALARM_EMAIL") {
            self.alarm_email = email.trim().to_string();
        }
        if let Some(dir) = lookup("WEBHEALTH_ASSET_DIR") {
            self.asset_dir = PathBuf::from(dir.trim());
        }
        Ok(())
    }

    /// Evaluation periods applied to every alarm
    pub fn alarm_evaluation_periods(&self) -> u32 {
        self.evaluation_periods.unwrap_or(self.interval_minutes)
    }

    /// Reject settings that cannot produce a valid graph
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("stack_name", &self.stack_name),
            ("namespace", &self.namespace),
            ("availability_metric", &self.availability_metric),
            ("latency_metric", &self.latency_metric),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", field)));
            }
        }
        if self.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.alarm_evaluation_periods() == 0 {
            return Err(ConfigError::Invalid(
                "evaluation_periods must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_TIMEOUT_MINUTES).contains(&self.function_timeout_minutes) {
            return Err(ConfigError::Invalid(format!(
                "function_timeout_minutes must be between 1 and {}",
                MAX_TIMEOUT_MINUTES
            )));
        }
        if !is_valid_email(&self.alarm_email) {
            return Err(ConfigError::Invalid(format!(
                "alarm_email '{}' is not a valid address",
                self.alarm_email
            )));
        }
        if let Some(url) = self.urls.iter().find(|u| u.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("empty endpoint in urls: {:?}", url)));
        }
        Ok(())
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = StackSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.alarm_evaluation_periods(), settings.interval_minutes);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = StackSettings::default();
        settings
            .apply_overrides(lookup(&[
                ("WEBHEALTH_INTERVAL_MINUTES", "5"),
                ("WEBHEALTH_URLS", "https://a.example, https://b.example,,"),
                ("WEBHEALTH_ALARM_EMAIL", "ops@example.org"),
            ]))
            .unwrap();

        assert_eq!(settings.interval_minutes, 5);
        assert_eq!(settings.urls, vec!["https://a.example", "https://b.example"]);
        assert_eq!(settings.alarm_email, "ops@example.org");
        assert_eq!(settings.namespace, "WebHealth");
    }

    #[test]
    fn test_empty_urls_override() {
        let mut settings = StackSettings::default();
        settings.apply_overrides(lookup(&[("WEBHEALTH_URLS", "")])).unwrap();
        assert!(settings.urls.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_interval_override() {
        let mut settings = StackSettings::default();
        let result = settings.apply_overrides(lookup(&[("WEBHEALTH_INTERVAL_MINUTES", "two")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = StackSettings::default();
        settings.interval_minutes = 0;
        assert!(settings.validate().is_err());

        let mut settings = StackSettings::default();
        settings.evaluation_periods = Some(0);
        assert!(settings.validate().is_err());

        let mut settings = StackSettings::default();
        settings.alarm_email = "nobody".to_string();
        assert!(settings.validate().is_err());

        let mut settings = StackSettings::default();
        settings.latency_metric = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_file_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"interval_minutes": 10, "urls": ["https://example.net"], "runtime": "python3.12"}"#,
        )
        .unwrap();

        let settings = StackSettings::from_file(&path).unwrap();
        assert_eq!(settings.interval_minutes, 10);
        assert_eq!(settings.urls, vec!["https://example.net"]);
        assert_eq!(settings.runtime, Runtime::Python312);
        assert_eq!(settings.latency_threshold, 0.3);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            StackSettings::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            StackSettings::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
