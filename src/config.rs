use anyhow::{Context, Result, anyhow, bail};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/reeltube-env";
pub const DEFAULT_REELTUBE_PORT: u16 = 5000;
pub const DEFAULT_REELTUBE_HOST: &str = "0.0.0.0";
pub const DEFAULT_SNAPSHOT_PATH: &str = "videos-data.json";
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 3600;

/// Output style for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}` (expected pretty or json)")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        })
    }
}

/// One layer of settings. Every field is optional so layers can be stacked
/// with [`EnvConfig::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval_secs: Option<u64>,
    pub snapshot_enabled: Option<bool>,
    pub log_format: Option<LogFormat>,
}

impl EnvConfig {
    /// Returns a layer where every value set in `overlay` wins.
    pub fn merge(self, overlay: EnvConfig) -> EnvConfig {
        EnvConfig {
            host: overlay.host.or(self.host),
            port: overlay.port.or(self.port),
            snapshot_path: overlay.snapshot_path.or(self.snapshot_path),
            snapshot_interval_secs: overlay
                .snapshot_interval_secs
                .or(self.snapshot_interval_secs),
            snapshot_enabled: overlay.snapshot_enabled.or(self.snapshot_enabled),
            log_format: overlay.log_format.or(self.log_format),
        }
    }

    /// Applies a single `KEY=VALUE` pair. Unknown keys are ignored and empty
    /// values leave the field untouched.
    fn assign(&mut self, key: &str, value: &str, origin: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        match key {
            "REELTUBE_HOST" => self.host = Some(value.to_string()),
            "REELTUBE_PORT" | "PORT" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Parsing {key} from {origin}"))?;
                self.port = Some(port);
            }
            "SNAPSHOT_PATH" => self.snapshot_path = Some(PathBuf::from(value)),
            "SNAPSHOT_INTERVAL_SECS" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Parsing {key} from {origin}"))?;
                self.snapshot_interval_secs = Some(secs);
            }
            "SNAPSHOT_ENABLED" => {
                let enabled = parse_bool(value)
                    .with_context(|| format!("Parsing {key} from {origin}"))?;
                self.snapshot_enabled = Some(enabled);
            }
            "LOG_FORMAT" => {
                let format = value
                    .parse::<LogFormat>()
                    .map_err(|err| anyhow!(err))
                    .with_context(|| format!("Parsing {key} from {origin}"))?;
                self.log_format = Some(format);
            }
            _ => {}
        }
        Ok(())
    }

    /// Builds a layer from a variable lookup, normally `std::env::var`.
    /// `REELTUBE_PORT` takes precedence over the shorter `PORT`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = EnvConfig::default();
        for key in [
            "REELTUBE_HOST",
            "PORT",
            "REELTUBE_PORT",
            "SNAPSHOT_PATH",
            "SNAPSHOT_INTERVAL_SECS",
            "SNAPSHOT_ENABLED",
            "LOG_FORMAT",
        ] {
            if let Some(value) = lookup(key) {
                cfg.assign(key, value.trim(), "environment")?;
            }
        }
        Ok(cfg)
    }

    pub fn from_process_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got `{other}`"),
    }
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let origin = path.display().to_string();
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            cfg.assign(key.trim(), value, &origin)?;
        }
    }
    Ok(Some(cfg))
}

/// Where and how often the catalog is dumped to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSettings {
    pub path: PathBuf,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    pub snapshot: Option<SnapshotSettings>,
    pub log_format: LogFormat,
}

impl RuntimeConfig {
    /// Fills in defaults for everything `cfg` leaves unset.
    pub fn resolve(cfg: EnvConfig) -> Result<Self> {
        let host = cfg
            .host
            .unwrap_or_else(|| DEFAULT_REELTUBE_HOST.to_string());
        let port = cfg.port.unwrap_or(DEFAULT_REELTUBE_PORT);

        let snapshot = if cfg.snapshot_enabled.unwrap_or(true) {
            let secs = cfg
                .snapshot_interval_secs
                .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL_SECS);
            if secs == 0 {
                bail!("SNAPSHOT_INTERVAL_SECS must be greater than zero");
            }
            Some(SnapshotSettings {
                path: cfg
                    .snapshot_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
                interval: Duration::from_secs(secs),
            })
        } else {
            None
        };

        Ok(RuntimeConfig {
            host,
            port,
            snapshot,
            log_format: cfg.log_format.unwrap_or_default(),
        })
    }
}

/// Stacks the config file, the process environment and `overrides` (usually
/// command-line flags), in that order of increasing precedence.
pub fn load_runtime_config(path: &Path, overrides: EnvConfig) -> Result<RuntimeConfig> {
    let file = read_env_config(path)?.unwrap_or_default();
    let env = EnvConfig::from_process_env()?;
    RuntimeConfig::resolve(file.merge(env).merge(overrides))
}
