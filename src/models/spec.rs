//! Test definition models
//!
//! Categories, limits and the immutable per-test invocation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GraderError, GraderResult};

/// Grading classification of a test group
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Regular,
    #[serde(alias = "extra")]
    ExtraCredit,
    #[serde(alias = "user")]
    Personal,
}

impl Category {
    /// Report heading for the category
    pub fn name(&self) -> &'static str {
        match self {
            Category::Regular => "Regular credit",
            Category::ExtraCredit => "Extra credit",
            Category::Personal => "Personal (not graded)",
        }
    }

    pub fn is_graded(&self) -> bool {
        !matches!(self, Category::Personal)
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Regular
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Text encoding used to decode subject output and fixtures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// One char per byte; never fails on malformed output
    #[serde(alias = "latin-1", alias = "iso-8859-1")]
    Latin1,
    /// UTF-8 with invalid sequences replaced
    #[serde(alias = "utf-8")]
    Utf8,
}

impl Encoding {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Latin1
    }
}

/// Resource limits and expectations applied to a test
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Wall-clock limit in seconds
    pub time_limit_secs: f64,

    /// Maximum number of output bytes captured
    pub output_limit: usize,

    /// Maximum number of mismatched lines reported (0 = unlimited)
    pub error_limit: usize,

    /// Exit code a correct program returns
    pub expected_code: i32,

    /// Encoding of subject output and fixture files
    pub encoding: Encoding,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            time_limit_secs: 30.0,
            output_limit: 16 * 1024,
            error_limit: 5,
            expected_code: 0,
            encoding: Encoding::Latin1,
        }
    }
}

impl Limits {
    /// Wall-clock limit; values [`Limits::validate`] rejects saturate
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    #[cfg(test)]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_secs = limit.as_secs_f64();
        self
    }

    #[cfg(test)]
    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    pub fn validate(&self) -> GraderResult<()> {
        let representable = Duration::try_from_secs_f64(self.time_limit_secs).is_ok();
        if !representable || self.time_limit_secs <= 0.0 {
            return Err(GraderError::config(format!(
                "time limit must be a positive number of seconds, got {}",
                self.time_limit_secs
            )));
        }
        if self.output_limit == 0 {
            return Err(GraderError::config("output limit must be positive"));
        }
        Ok(())
    }
}

/// Partial limits, layered over a base [`Limits`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitOverrides {
    pub time_limit_secs: Option<f64>,
    pub output_limit: Option<usize>,
    pub error_limit: Option<usize>,
    pub expected_code: Option<i32>,
    pub encoding: Option<Encoding>,
}

impl LimitOverrides {
    pub fn apply(&self, base: &Limits) -> Limits {
        Limits {
            time_limit_secs: self.time_limit_secs.unwrap_or(base.time_limit_secs),
            output_limit: self.output_limit.unwrap_or(base.output_limit),
            error_limit: self.error_limit.unwrap_or(base.error_limit),
            expected_code: self.expected_code.unwrap_or(base.expected_code),
            encoding: self.encoding.unwrap_or(base.encoding),
        }
    }
}

/// Immutable description of one subject invocation
#[derive(Clone, Debug)]
pub struct TestSpec {
    args: Vec<String>,
    dir: PathBuf,
    limits: Limits,
}

impl TestSpec {
    /// Create a spec; the command must not be empty
    pub fn new(args: Vec<String>, dir: impl Into<PathBuf>, limits: Limits) -> GraderResult<Self> {
        if args.is_empty() || args[0].is_empty() {
            return Err(GraderError::Internal(
                "attempt to create a test with an empty command".to_string(),
            ));
        }
        Ok(Self {
            args,
            dir: dir.into(),
            limits,
        })
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn time_limit(&self) -> Duration {
        self.limits.time_limit()
    }

    pub fn output_limit(&self) -> usize {
        self.limits.output_limit
    }

    pub fn expected_code(&self) -> i32 {
        self.limits.expected_code
    }

    pub fn encoding(&self) -> Encoding {
        self.limits.encoding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_order_and_names() {
        assert!(Category::Regular < Category::ExtraCredit);
        assert!(Category::ExtraCredit < Category::Personal);
        assert_eq!(Category::Personal.name(), "Personal (not graded)");
        assert!(!Category::Personal.is_graded());
        assert!(Category::ExtraCredit.is_graded());
    }

    #[test]
    fn test_latin1_decodes_every_byte() {
        let text = Encoding::Latin1.decode(&[b'a', 0xff, 0x80, b'\n']);
        assert_eq!(text.chars().count(), 4);
        assert_eq!(text.chars().nth(1), Some('\u{ff}'));
    }

    #[test]
    fn test_utf8_is_lossy() {
        let text = Encoding::Utf8.decode(&[b'o', b'k', 0xff]);
        assert!(text.starts_with("ok"));
        assert!(text.contains('\u{fffd}'));
    }

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.time_limit(), Duration::from_secs(30));
        assert_eq!(limits.output_limit, 16384);
        assert_eq!(limits.error_limit, 5);
        assert!(limits.validate().is_ok());
        assert!(limits.with_output_limit(0).validate().is_err());
    }

    #[test]
    fn test_unrepresentable_time_limits_rejected() {
        for secs in [1e20, f64::INFINITY, f64::NAN, -1.0, 0.0] {
            let limits = Limits {
                time_limit_secs: secs,
                ..Limits::default()
            };
            let err = limits.validate().unwrap_err();
            assert!(matches!(err, GraderError::Configuration(_)), "{secs}");
            // Never panics, even for values validation rejects
            let _ = limits.time_limit();
        }
        assert_eq!(
            Limits {
                time_limit_secs: 1e20,
                ..Limits::default()
            }
            .time_limit(),
            Duration::MAX
        );
    }

    #[test]
    fn test_overrides() {
        let overrides = LimitOverrides {
            time_limit_secs: Some(2.5),
            encoding: Some(Encoding::Utf8),
            ..Default::default()
        };
        let limits = overrides.apply(&Limits::default());
        assert_eq!(limits.time_limit(), Duration::from_millis(2500));
        assert_eq!(limits.encoding, Encoding::Utf8);
        assert_eq!(limits.output_limit, 16384);
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(TestSpec::new(Vec::new(), ".", Limits::default()).is_err());
        let spec = TestSpec::new(vec!["./prog".into()], "/tmp", Limits::default()).unwrap();
        assert_eq!(spec.args(), ["./prog".to_string()]);
        assert_eq!(spec.expected_code(), 0);
    }
}
