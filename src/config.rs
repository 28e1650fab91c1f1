use crate::error::LoaderError;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_WORKER_COUNT: usize = 50;
pub const DEFAULT_PROGRESS_EVERY: u64 = 10;
pub const DEFAULT_INTER_WRITE_DELAY_MS: u64 = 200;

fn parse_value<T>(key: &str, value: &str) -> Result<T, LoaderError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| LoaderError::Config(format!("{key}={value:?}: {err}")))
}

/// `key` parsed from `lookup`, or `None` when it is unset.
///
/// A value that is present but does not parse is a configuration error; it
/// never falls back to the default.
fn env_optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>, LoaderError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|value| parse_value(key, &value)).transpose()
}

fn env_parsed<T, F>(lookup: &F, key: &str, default: T) -> Result<T, LoaderError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(env_optional(lookup, key)?.unwrap_or(default))
}

/// What a worker does when the sink rejects a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Report the failure, drop the record and keep going.
    #[default]
    Resilient,
    /// Abort the whole load on the first failed write.
    Strict,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::Resilient => "resilient",
            FailurePolicy::Strict => "strict",
        })
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resilient" => Ok(FailurePolicy::Resilient),
            "strict" => Ok(FailurePolicy::Strict),
            other => Err(format!(
                "unknown failure policy '{other}', expected 'resilient' or 'strict'"
            )),
        }
    }
}

/// What the source does with a row it cannot turn into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsePolicy {
    #[default]
    Skip,
    Fatal,
}

impl fmt::Display for ParsePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParsePolicy::Skip => "skip",
            ParsePolicy::Fatal => "fatal",
        })
    }
}

impl FromStr for ParsePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ParsePolicy::Skip),
            "fatal" => Ok(ParsePolicy::Fatal),
            other => Err(format!(
                "unknown parse policy '{other}', expected 'skip' or 'fatal'"
            )),
        }
    }
}

/// How the source hands rows to the work channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Send each record as soon as it is parsed.
    #[default]
    Stream,
    /// Parse the whole input first, then replay the buffered records.
    Buffer,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceMode::Stream => "stream",
            SourceMode::Buffer => "buffer",
        })
    }
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" => Ok(SourceMode::Stream),
            "buffer" => Ok(SourceMode::Buffer),
            other => Err(format!(
                "unknown source mode '{other}', expected 'stream' or 'buffer'"
            )),
        }
    }
}

/// Runtime configuration for one load.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub worker_count: usize,
    /// Cap on records taken from the input; `None` reads everything.
    pub max_records: Option<usize>,
    /// Pause after every successful write. This is a self-imposed rate limit,
    /// not a signal from the sink.
    pub inter_write_delay: Duration,
    pub progress_every: u64,
    pub failure_policy: FailurePolicy,
    pub parse_policy: ParsePolicy,
    pub source_mode: SourceMode,
}

impl PipelineConfig {
    /// Read the `LOADER_*` variables, using defaults for unset ones.
    pub fn from_env() -> Result<Self, LoaderError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoaderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let delay_ms = env_parsed(&lookup, "LOADER_DELAY_MS", DEFAULT_INTER_WRITE_DELAY_MS)?;
        Ok(Self {
            worker_count: env_parsed(&lookup, "LOADER_WORKERS", DEFAULT_WORKER_COUNT)?,
            max_records: env_optional(&lookup, "LOADER_MAX_RECORDS")?,
            inter_write_delay: Duration::from_millis(delay_ms),
            progress_every: env_parsed(&lookup, "LOADER_PROGRESS_EVERY", DEFAULT_PROGRESS_EVERY)?,
            failure_policy: env_parsed(&lookup, "LOADER_FAILURE_POLICY", FailurePolicy::default())?,
            parse_policy: env_parsed(&lookup, "LOADER_PARSE_POLICY", ParsePolicy::default())?,
            source_mode: env_parsed(&lookup, "LOADER_SOURCE_MODE", SourceMode::default())?,
        })
    }

    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.worker_count == 0 {
            return Err(LoaderError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.progress_every == 0 {
            return Err(LoaderError::Config(
                "progress cadence must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            max_records: None,
            inter_write_delay: Duration::from_millis(DEFAULT_INTER_WRITE_DELAY_MS),
            progress_every: DEFAULT_PROGRESS_EVERY,
            failure_policy: FailurePolicy::default(),
            parse_policy: ParsePolicy::default(),
            source_mode: SourceMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.worker_count, 50);
        assert_eq!(config.max_records, None);
        assert_eq!(config.inter_write_delay, Duration::from_millis(200));
        assert_eq!(config.progress_every, 10);
        assert_eq!(config.failure_policy, FailurePolicy::Resilient);
        assert_eq!(config.parse_policy, ParsePolicy::Skip);
        assert_eq!(config.source_mode, SourceMode::Stream);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers_and_cadence() {
        let config = PipelineConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LoaderError::Config(_))));

        let config = PipelineConfig {
            progress_every: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LoaderError::Config(_))));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Strict".parse::<FailurePolicy>(), Ok(FailurePolicy::Strict));
        assert_eq!(" resilient ".parse::<FailurePolicy>(), Ok(FailurePolicy::Resilient));
        assert!("retry".parse::<FailurePolicy>().is_err());
        assert_eq!("FATAL".parse::<ParsePolicy>(), Ok(ParsePolicy::Fatal));
        assert_eq!("buffer".parse::<SourceMode>(), Ok(SourceMode::Buffer));
        assert_eq!(SourceMode::Buffer.to_string(), "buffer");
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("LOADER_WORKERS", "8"),
            ("LOADER_MAX_RECORDS", "1000"),
            ("LOADER_DELAY_MS", "0"),
            ("LOADER_PROGRESS_EVERY", "25"),
            ("LOADER_FAILURE_POLICY", "strict"),
            ("LOADER_PARSE_POLICY", "fatal"),
            ("LOADER_SOURCE_MODE", "buffer"),
        ]))
        .expect("valid environment");

        assert_eq!(config.worker_count, 8);
        assert_eq!(config.max_records, Some(1000));
        assert_eq!(config.inter_write_delay, Duration::ZERO);
        assert_eq!(config.progress_every, 25);
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
        assert_eq!(config.parse_policy, ParsePolicy::Fatal);
        assert_eq!(config.source_mode, SourceMode::Buffer);
    }

    #[test]
    fn test_from_lookup_defaults_when_unset() {
        let config = PipelineConfig::from_lookup(lookup(&[])).expect("empty environment");
        assert_eq!(config.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(config.max_records, None);
        assert_eq!(config.failure_policy, FailurePolicy::Resilient);
    }

    #[test]
    fn test_misspelled_failure_policy_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("LOADER_FAILURE_POLICY", "strcit")]))
            .expect_err("typo must not fall back to resilient");
        match err {
            LoaderError::Config(message) => {
                assert!(message.contains("LOADER_FAILURE_POLICY"), "{message}");
                assert!(message.contains("strcit"), "{message}");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_values_are_rejected() {
        for (key, value) in [
            ("LOADER_WORKERS", "many"),
            ("LOADER_MAX_RECORDS", "-1"),
            ("LOADER_DELAY_MS", "1.5"),
            ("LOADER_PARSE_POLICY", "ignore"),
            ("LOADER_SOURCE_MODE", "batch"),
        ] {
            let result = PipelineConfig::from_lookup(lookup(&[(key, value)]));
            assert!(
                matches!(result, Err(LoaderError::Config(_))),
                "{key}={value} accepted"
            );
        }
    }
}
