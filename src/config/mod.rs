//! Global flags and runtime settings.
//!
//! GlobalArgs (clap, root-level only) + STORCTL_* env + optional config file
//!   -> Settings { target, timeout, json }
//!
//! Precedence per field: flag > env > file > default.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TARGET_ENV: &str = "STORCTL_TARGET";
pub const CONFIG_ENV: &str = "STORCTL_CONFIG";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Flags accepted before the group name.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Errors only
    #[arg(short, long)]
    pub quiet: bool,

    /// Storage service bridge command line (or STORCTL_TARGET)
    #[arg(short, long, value_name = "TARGET")]
    pub target: Option<String>,

    /// Per-call timeout in seconds; 0 disables it (default 180)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Emit traces as one JSON document per line
    #[arg(long)]
    pub json: bool,

    /// YAML or JSON settings file (or STORCTL_CONFIG)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Contents of a settings file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub target: Option<String>,
    pub timeout_secs: Option<u64>,
    pub json: Option<bool>,
}

/// Resolved settings for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub target: Option<String>,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub json: bool,
}

impl Settings {
    /// Merge flags, environment (through `env`) and the optional config file.
    pub fn resolve(args: &GlobalArgs, env: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let config_path = args
            .config
            .clone()
            .or_else(|| env(CONFIG_ENV).filter(|s| !s.is_empty()).map(PathBuf::from));
        let file = match &config_path {
            Some(path) => load_document::<FileConfig>(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, env(TARGET_ENV), file))
    }

    fn merge(args: &GlobalArgs, env_target: Option<String>, file: FileConfig) -> Settings {
        let target = args
            .target
            .clone()
            .or(env_target)
            .or(file.target)
            .filter(|t| !t.trim().is_empty());
        let timeout = match args.timeout.or(file.timeout_secs) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_TIMEOUT),
        };
        Settings {
            target,
            timeout,
            json: args.json || file.json.unwrap_or(false),
        }
    }
}

/// Read a YAML (`.yaml`/`.yml`) or JSON document into `T`.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_document(&raw, path)
}

fn parse_document<T: DeserializeOwned>(raw: &str, path: &Path) -> Result<T> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("yaml" | "yml") => serde_yaml::from_str(raw)
            .with_context(|| format!("failed to parse YAML file {}", path.display())),
        Some("json") | None => serde_json::from_str(raw)
            .with_context(|| format!("failed to parse JSON file {}", path.display())),
        Some(other) => match serde_json::from_str(raw) {
            Ok(v) => Ok(v),
            Err(e) => bail!("unrecognised extension '.{other}' and not valid JSON ({e}): {}", path.display()),
        },
    }
}
