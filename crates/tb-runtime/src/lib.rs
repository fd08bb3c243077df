#![forbid(unsafe_code)]

//! Runtime options threaded through every constructor and operation.
//!
//! There is no process-wide state: a `Series` or `DataFrame` carries the
//! `Options` it was built with and hands them to everything derived from it.

use std::env;

use serde::{Deserialize, Serialize};
use tb_types::NullPolicy;

pub const ENV_LOG_WARNINGS: &str = "TABULA_LOG_WARNINGS";
pub const ENV_ASYNC: &str = "TABULA_ASYNC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Emit a `log::warn!` record whenever a chained lookup soft-fails.
    pub log_warnings: bool,
    /// Fan per-group aggregation out to the rayon pool.
    pub async_aggregation: bool,
    pub null_policy: NullPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_warnings: true,
            async_aggregation: false,
            null_policy: NullPolicy::default(),
        }
    }
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by `TABULA_LOG_WARNINGS` / `TABULA_ASYNC` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(flag) = env_flag(ENV_LOG_WARNINGS) {
            options.log_warnings = flag;
        }
        if let Some(flag) = env_flag(ENV_ASYNC) {
            options.async_aggregation = flag;
        }
        options
    }

    #[must_use]
    pub fn with_log_warnings(mut self, enabled: bool) -> Self {
        self.log_warnings = enabled;
        self
    }

    #[must_use]
    pub fn with_async_aggregation(mut self, enabled: bool) -> Self {
        self.async_aggregation = enabled;
        self
    }

    #[must_use]
    pub fn with_null_sentinels<I, S>(mut self, sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_policy = NullPolicy::with_sentinels(sentinels);
        self
    }

    #[must_use]
    pub fn null_policy(&self) -> &NullPolicy {
        &self.null_policy
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = env::var(key).ok()?;
    parse_flag(&raw)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Report a soft failure from a chainable lookup.
///
/// The caller still returns its sentinel (`None`, empty `Vec`); this only
/// decides whether the miss is logged.
pub fn soft_failure(options: &Options, operation: &str, detail: impl AsRef<str>) {
    if options.log_warnings {
        log::warn!("{operation}(): {}", detail.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::{Options, parse_flag};

    #[test]
    fn defaults_log_and_run_synchronously() {
        let options = Options::default();
        assert!(options.log_warnings);
        assert!(!options.async_aggregation);
        assert!(options.null_policy().is_null_str("n/a"));
    }

    #[test]
    fn builder_overrides() {
        let options = Options::new()
            .with_log_warnings(false)
            .with_async_aggregation(true)
            .with_null_sentinels(["--"]);
        assert!(!options.log_warnings);
        assert!(options.async_aggregation);
        assert!(options.null_policy().is_null_str("--"));
        assert!(!options.null_policy().is_null_str("nil"));
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn options_round_trip_through_json() {
        let options = Options::new().with_async_aggregation(true);
        let json = serde_json::to_string(&options).expect("serialize");
        let back: Options = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, options);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let back: Options = serde_json::from_str(r#"{"async_aggregation":true}"#)
            .expect("deserialize");
        assert!(back.async_aggregation);
        assert!(back.log_warnings);
    }
}
