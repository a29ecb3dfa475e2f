use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

pub mod tracing_layer;

/// LogLevel mirrors the severity levels of the `tracing` crate, giving the
/// rest of the workspace a serializable level that doesn't depend on a
/// particular log sink.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Log is a single structured log entry, as emitted by [`tracing_layer::Layer`].
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Log {
    #[serde(
        rename = "ts",
        serialize_with = "time::serde::rfc3339::serialize",
        deserialize_with = "time::serde::rfc3339::deserialize"
    )]
    pub timestamp: time::OffsetDateTime,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Box<serde_json::value::RawValue>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<Log>,
}

/// stderr_log_handler writes canonical JSON log serializations to stderr,
/// one object per line.
pub fn stderr_log_handler(log: Log) {
    let mut buf = serde_json::to_vec(&log).expect("Log always serializes");
    buf.push(b'\n');
    _ = std::io::stderr().write_all(&buf); // Best-effort.
}

/// init installs a global `tracing` subscriber appropriate for a CLI driver:
/// newline-delimited JSON on stderr when `json` is set (the archive's own
/// operational logs are meant to be machine-parsed by an orchestrating
/// shell), or human-readable `fmt` output otherwise. `verbose` lowers the
/// default filter from `info` to `debug`.
pub fn init(json: bool, verbose: bool) {
    use tracing_subscriber::prelude::*;

    let default_directive = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if json {
        tracing_subscriber::registry()
            .with(tracing_layer::Layer::new(stderr_log_handler, std::time::SystemTime::now).with_filter(env_filter))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter),
            )
            .init();
    }
}

#[cfg(test)]
mod test {
    use super::{stderr_log_handler, Log};

    #[test]
    fn test_log_serializes_to_expected_shape() {
        let log = Log {
            timestamp: time::OffsetDateTime::UNIX_EPOCH,
            level: super::LogLevel::Warn,
            message: "hello world".to_string(),
            fields: [(
                "name".to_string(),
                serde_json::value::to_raw_value("value").unwrap(),
            )]
            .into_iter()
            .collect(),
            spans: Vec::new(),
        };
        let encoded = serde_json::to_string(&log).unwrap();
        assert_eq!(
            encoded,
            r#"{"ts":"1970-01-01T00:00:00Z","level":"warn","message":"hello world","fields":{"name":"value"}}"#
        );

        // stderr_log_handler is best-effort; exercise it for coverage.
        stderr_log_handler(log);
    }
}
