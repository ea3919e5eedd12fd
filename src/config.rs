//! Environment configuration, read once per invocation entry.

use crate::labels::LabelSet;
use regex::Regex;
use reqwest::Url;

/// Default flush threshold for the byte-counted push backend.
const DEFAULT_PUSH_BATCH_BYTES: usize = 131_072;
/// Default flush threshold for the entry-counted streaming backend.
const DEFAULT_STREAM_BATCH_ENTRIES: usize = 5;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid {
        var: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "required environment variable {} not set", var),
            ConfigError::Invalid { var, reason } => {
                write!(f, "invalid value for environment variable {}: {}", var, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Bulk push backend settings (`WRITE_ADDRESS`).
#[derive(Clone, Debug)]
pub struct PushConfig {
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
    pub tenant_id: Option<String>,
}

/// Streaming OTLP backend settings (`OTEL_EXPORTER_OTLP_ENDPOINT`).
#[derive(Clone, Debug)]
pub struct OtlpConfig {
    pub endpoint: String,
    pub insecure: bool,
    pub service_name: String,
}

#[derive(Clone, Debug)]
pub enum Backend {
    Push(PushConfig),
    Otlp(OtlpConfig),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub backend: Backend,
    /// Flush threshold: bytes for the push backend, entries for the
    /// streaming backend.
    pub batch_size: usize,
    pub keep_stream: bool,
    pub extra_attributes: LabelSet,
    pub drop_attributes: Vec<String>,
    pub custom_s3_path_regex: Option<Regex>,
    pub print_log_lines: bool,
    pub parse_kinesis_cw_logs: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
    }

    /// Build from an arbitrary variable lookup. Tests inject maps here.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = if let Some(address) = lookup("WRITE_ADDRESS") {
            Backend::Push(PushConfig {
                url: Url::parse(&address).map_err(|e| ConfigError::Invalid {
                    var: "WRITE_ADDRESS",
                    reason: e.to_string(),
                })?,
                username: lookup("USERNAME"),
                password: lookup("PASSWORD"),
                bearer_token: lookup("BEARER_TOKEN"),
                tenant_id: lookup("TENANT_ID"),
            })
        } else if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
            Backend::Otlp(OtlpConfig {
                endpoint,
                insecure: parse_bool(&lookup, "OTEL_EXPORTER_INSECURE")?,
                service_name: lookup("OTEL_SERVICE_NAME")
                    .ok_or(ConfigError::Missing("OTEL_SERVICE_NAME"))?,
            })
        } else {
            return Err(ConfigError::Missing(
                "WRITE_ADDRESS or OTEL_EXPORTER_OTLP_ENDPOINT",
            ));
        };

        let default_batch_size = match backend {
            Backend::Push(_) => DEFAULT_PUSH_BATCH_BYTES,
            Backend::Otlp(_) => DEFAULT_STREAM_BATCH_ENTRIES,
        };
        let batch_size = match lookup("BATCH_SIZE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "BATCH_SIZE",
                reason: format!("{:?} is not a positive integer", raw),
            })?,
            None => default_batch_size,
        };

        let custom_s3_path_regex = match lookup("CUSTOM_S3_PATH_REGEX") {
            Some(raw) => Some(Regex::new(&raw).map_err(|e| ConfigError::Invalid {
                var: "CUSTOM_S3_PATH_REGEX",
                reason: e.to_string(),
            })?),
            None => None,
        };

        Ok(Config {
            backend,
            batch_size,
            keep_stream: parse_bool(&lookup, "KEEP_STREAM")?,
            extra_attributes: parse_attribute_pairs(lookup("EXTRA_ATTRIBUTES").as_deref())?,
            drop_attributes: parse_attribute_names(lookup("DROP_ATTRIBUTES").as_deref()),
            custom_s3_path_regex,
            print_log_lines: parse_bool(&lookup, "PRINT_LOG_LINES")?,
            parse_kinesis_cw_logs: parse_bool(&lookup, "PARSE_KINESIS_CLOUDWATCH_LOGS")?,
        })
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<bool, ConfigError> {
    match lookup(var) {
        None => Ok(false),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                reason: format!("{:?} is not a boolean", raw),
            }),
        },
    }
}

/// `EXTRA_ATTRIBUTES` is a comma-separated list of name,value pairs, so the
/// entry count must be even.
fn parse_attribute_pairs(raw: Option<&str>) -> Result<LabelSet, ConfigError> {
    let mut attributes = LabelSet::new();
    let raw = match raw {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(attributes),
    };

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() % 2 != 0 {
        return Err(ConfigError::Invalid {
            var: "EXTRA_ATTRIBUTES",
            reason: "expected a comma-separated list with an even number of entries".to_string(),
        });
    }
    for pair in parts.chunks(2) {
        attributes.insert(pair[0].trim(), pair[1].trim());
    }
    Ok(attributes)
}

fn parse_attribute_names(raw: Option<&str>) -> Vec<String> {
    raw.map(|r| {
        r.split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
