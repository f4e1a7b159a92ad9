use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cloudmusic_core::cost::{HourlyRate, DEFAULT_INSTANCE_TYPE};
use cloudmusic_core::generation::{DEFAULT_MAX_SPAN_SECS, DEFAULT_OVERLAP_SECS};
use cloudmusic_core::storage::StoreLocation;
use cloudmusic_pipeline::ChunkingConfig;

/// Default inference server address.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
/// Default job-definition file.
pub const DEFAULT_PROMPTS_FILE: &str = "prompts.txt";
/// Default per-call HTTP timeout. One full-span synthesis can take minutes.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Invalid or missing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set (or set {alternative})")]
    Missing {
        var: &'static str,
        alternative: &'static str,
    },

    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Job-definition file to process.
    pub prompts_file: PathBuf,
    /// Where artifacts and ledgers are written.
    pub store: StoreLocation,
    /// Rate used to price generation time.
    pub hourly_rate: HourlyRate,
    /// Base URL of the MusicGen inference server.
    pub backend_url: String,
    /// Per-call span limit and continuation window.
    pub chunking: ChunkingConfig,
    /// Directory for encoded audio awaiting upload.
    pub scratch_dir: PathBuf,
    /// HTTP timeout for one backend call.
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                       |
    /// |---------------------------------|-------------------------------|
    /// | `MUSICGEN_PROMPTS_FILE`         | `prompts.txt`                 |
    /// | `MUSICGEN_STORE_URL`            | `s3://$MUSICGEN_S3_BUCKET`    |
    /// | `MUSICGEN_S3_BUCKET`            | (required without store URL)  |
    /// | `MUSICGEN_HOURLY_COST`          | on-demand price of `INSTANCE_TYPE` |
    /// | `INSTANCE_TYPE`                 | `g4dn.xlarge`                 |
    /// | `MUSICGEN_BACKEND_URL`          | `http://127.0.0.1:8000`       |
    /// | `MUSICGEN_MAX_SPAN_SECS`        | `30`                          |
    /// | `MUSICGEN_OVERLAP_SECS`         | `5`                           |
    /// | `MUSICGEN_SCRATCH_DIR`          | `$TMPDIR/musicgen-scratch`    |
    /// | `MUSICGEN_REQUEST_TIMEOUT_SECS` | `600`                         |
    /// | `LOG_FORMAT`                    | `text`                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(lookup_env)
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let prompts_file = PathBuf::from(
            get("MUSICGEN_PROMPTS_FILE").unwrap_or_else(|| DEFAULT_PROMPTS_FILE.into()),
        );

        let store_url = match (get("MUSICGEN_STORE_URL"), get("MUSICGEN_S3_BUCKET")) {
            (Some(url), _) => url,
            (None, Some(bucket)) => format!("s3://{}", bucket.trim()),
            (None, None) => {
                return Err(ConfigError::Missing {
                    var: "MUSICGEN_STORE_URL",
                    alternative: "MUSICGEN_S3_BUCKET",
                })
            }
        };
        let store = StoreLocation::parse(&store_url).map_err(|e| ConfigError::Invalid {
            var: "MUSICGEN_STORE_URL",
            value: store_url.clone(),
            reason: e.to_string(),
        })?;

        let hourly_rate = match get("MUSICGEN_HOURLY_COST") {
            Some(value) => {
                let usd = parse_var::<f64>("MUSICGEN_HOURLY_COST", &value)?;
                HourlyRate::new(usd).map_err(|e| ConfigError::Invalid {
                    var: "MUSICGEN_HOURLY_COST",
                    value,
                    reason: e.to_string(),
                })?
            }
            None => HourlyRate::for_instance_type(
                &get("INSTANCE_TYPE").unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.into()),
            ),
        };

        let backend_url = get("MUSICGEN_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.into());
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "MUSICGEN_BACKEND_URL",
                value: backend_url,
                reason: "must start with http:// or https://".into(),
            });
        }

        let max_span_secs = match get("MUSICGEN_MAX_SPAN_SECS") {
            Some(value) => parse_var::<f64>("MUSICGEN_MAX_SPAN_SECS", &value)?,
            None => DEFAULT_MAX_SPAN_SECS,
        };
        let overlap_secs = match get("MUSICGEN_OVERLAP_SECS") {
            Some(value) => parse_var::<f64>("MUSICGEN_OVERLAP_SECS", &value)?,
            None => DEFAULT_OVERLAP_SECS,
        };
        let chunking =
            ChunkingConfig::new(max_span_secs, overlap_secs).map_err(|e| ConfigError::Invalid {
                var: "MUSICGEN_OVERLAP_SECS",
                value: format!("{overlap_secs} (max span {max_span_secs})"),
                reason: e.to_string(),
            })?;

        let scratch_dir = get("MUSICGEN_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("musicgen-scratch"));

        let request_timeout_secs = match get("MUSICGEN_REQUEST_TIMEOUT_SECS") {
            Some(value) => parse_var::<u64>("MUSICGEN_REQUEST_TIMEOUT_SECS", &value)?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "MUSICGEN_REQUEST_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }

        let log_format = match get("LOG_FORMAT") {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                var: "LOG_FORMAT",
                value,
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            prompts_file,
            store,
            hourly_rate,
            backend_url,
            chunking,
            scratch_dir,
            request_timeout: Duration::from_secs(request_timeout_secs),
            log_format,
        })
    }
}

fn lookup_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_with_bucket_only() {
        let config = config_from(&[("MUSICGEN_S3_BUCKET", "music-out")]).unwrap();

        assert_eq!(config.prompts_file, PathBuf::from("prompts.txt"));
        assert_eq!(
            config.store,
            StoreLocation::S3 {
                bucket: "music-out".into(),
                prefix: String::new(),
            }
        );
        assert_eq!(config.hourly_rate.usd_per_hour(), 0.526);
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.chunking, ChunkingConfig::default());
        assert_eq!(config.request_timeout, Duration::from_secs(600));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn store_url_wins_over_bucket() {
        let config = config_from(&[
            ("MUSICGEN_S3_BUCKET", "ignored"),
            ("MUSICGEN_STORE_URL", "/var/lib/cloudmusic"),
        ])
        .unwrap();
        assert_eq!(
            config.store,
            StoreLocation::Local {
                root: PathBuf::from("/var/lib/cloudmusic"),
            }
        );
    }

    #[test]
    fn missing_store_is_an_error() {
        assert_matches!(
            config_from(&[]),
            Err(ConfigError::Missing {
                var: "MUSICGEN_STORE_URL",
                ..
            })
        );
        assert_matches!(
            config_from(&[("MUSICGEN_S3_BUCKET", "  ")]),
            Err(ConfigError::Missing { .. })
        );
    }

    #[test]
    fn explicit_hourly_cost_overrides_instance_type() {
        let config = config_from(&[
            ("MUSICGEN_S3_BUCKET", "b"),
            ("INSTANCE_TYPE", "p3.2xlarge"),
            ("MUSICGEN_HOURLY_COST", "1.25"),
        ])
        .unwrap();
        assert_eq!(config.hourly_rate.usd_per_hour(), 1.25);

        let config = config_from(&[("MUSICGEN_S3_BUCKET", "b"), ("INSTANCE_TYPE", "p3.2xlarge")])
            .unwrap();
        assert_eq!(config.hourly_rate.usd_per_hour(), 3.06);
    }

    #[test]
    fn invalid_hourly_cost_is_rejected() {
        for bad in ["free", "0", "-1", "NaN"] {
            assert_matches!(
                config_from(&[("MUSICGEN_S3_BUCKET", "b"), ("MUSICGEN_HOURLY_COST", bad)]),
                Err(ConfigError::Invalid {
                    var: "MUSICGEN_HOURLY_COST",
                    ..
                }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn overlap_must_be_shorter_than_span() {
        assert_matches!(
            config_from(&[
                ("MUSICGEN_S3_BUCKET", "b"),
                ("MUSICGEN_MAX_SPAN_SECS", "10"),
                ("MUSICGEN_OVERLAP_SECS", "10"),
            ]),
            Err(ConfigError::Invalid { .. })
        );

        let config = config_from(&[
            ("MUSICGEN_S3_BUCKET", "b"),
            ("MUSICGEN_MAX_SPAN_SECS", "20"),
            ("MUSICGEN_OVERLAP_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(config.chunking.max_span_secs(), 20.0);
        assert_eq!(config.chunking.overlap_secs(), 0.0);
    }

    #[test]
    fn backend_url_must_be_http() {
        assert_matches!(
            config_from(&[
                ("MUSICGEN_S3_BUCKET", "b"),
                ("MUSICGEN_BACKEND_URL", "gpu-box:8000"),
            ]),
            Err(ConfigError::Invalid {
                var: "MUSICGEN_BACKEND_URL",
                ..
            })
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert_matches!(
            config_from(&[
                ("MUSICGEN_S3_BUCKET", "b"),
                ("MUSICGEN_REQUEST_TIMEOUT_SECS", "0"),
            ]),
            Err(ConfigError::Invalid {
                var: "MUSICGEN_REQUEST_TIMEOUT_SECS",
                ..
            })
        );
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
