//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use std::path::PathBuf;

use crate::models::Limits;
use crate::utils::logger::LogLevel;

/// Environment variable prefix
const ENV_PREFIX: &str = "AUTOGRADER";

/// Overrides read from `AUTOGRADER_*` variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Assignment file from AUTOGRADER_CONFIG
    pub config_file: Option<PathBuf>,
    /// Fixture root from AUTOGRADER_DATA_DIR
    pub data_dir: Option<PathBuf>,
    /// Seconds per test from AUTOGRADER_TIME_LIMIT
    pub time_limit: Option<f64>,
    /// Output cap in bytes from AUTOGRADER_OUTPUT_LIMIT
    pub output_limit: Option<usize>,
    /// Summary format from AUTOGRADER_FORMAT
    pub format: Option<String>,
    /// Log file from AUTOGRADER_LOG_FILE
    pub log_file: Option<PathBuf>,
    /// Log level from AUTOGRADER_LOG_LEVEL
    pub log_level: Option<LogLevel>,
    /// Line mode from AUTOGRADER_NO_BAR
    pub no_bar: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            config_file: get_env("CONFIG").map(PathBuf::from),
            data_dir: get_env("DATA_DIR").map(PathBuf::from),
            time_limit: get_env_parse("TIME_LIMIT"),
            output_limit: get_env_parse("OUTPUT_LIMIT"),
            format: get_env("FORMAT"),
            log_file: get_env("LOG_FILE").map(PathBuf::from),
            log_level: get_env("LOG_LEVEL").and_then(|v| LogLevel::from_str(&v)),
            no_bar: get_env_bool("NO_BAR"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.config_file.is_some()
            || self.data_dir.is_some()
            || self.time_limit.is_some()
            || self.output_limit.is_some()
            || self.format.is_some()
            || self.log_file.is_some()
            || self.log_level.is_some()
            || self.no_bar.is_some()
    }

    /// Layer the limit overrides over `limits`
    pub fn apply_limits(&self, limits: &Limits) -> Limits {
        let mut limits = limits.clone();
        if let Some(secs) = self.time_limit {
            limits.time_limit_secs = secs;
        }
        if let Some(bytes) = self.output_limit {
            limits.output_limit = bytes;
        }
        limits
    }

    pub fn format_or(&self, default: &str) -> String {
        self.format.clone().unwrap_or_else(|| default.to_string())
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

#[cfg(test)]
/// Builder for setting environment variables in tests
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn data_dir(mut self, dir: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_DATA_DIR"), dir.into()));
        self
    }

    pub fn time_limit(mut self, secs: f64) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_TIME_LIMIT"), secs.to_string()));
        self
    }

    pub fn output_limit(mut self, bytes: usize) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_OUTPUT_LIMIT"), bytes.to_string()));
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_FORMAT"), format.into()));
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_LOG_LEVEL"), level.into()));
        self
    }

    pub fn no_bar(mut self, no_bar: bool) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_NO_BAR"), no_bar.to_string()));
        self
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

#[cfg(test)]
impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Help text listing the recognised variables
pub fn env_help() -> String {
    format!(
        "Environment variables:\n  \
         {ENV_PREFIX}_CONFIG        Assignment file\n  \
         {ENV_PREFIX}_DATA_DIR      Fixture directory\n  \
         {ENV_PREFIX}_TIME_LIMIT    Seconds allowed per test\n  \
         {ENV_PREFIX}_OUTPUT_LIMIT  Bytes of output captured per test\n  \
         {ENV_PREFIX}_FORMAT        Summary format (table, json, csv)\n  \
         {ENV_PREFIX}_LOG_FILE      Append log records to this file\n  \
         {ENV_PREFIX}_LOG_LEVEL     Log level (trace, debug, info, warn, error)\n  \
         {ENV_PREFIX}_NO_BAR        Print status lines instead of a progress bar"
    )
}
