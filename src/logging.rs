//! Structured logging for the CLI and library.
//!
//! One `tracing` registry with an optional console layer and an optional file
//! layer. Settings come from the `[logging]` config section; `ANVIL_LOG`,
//! `ANVIL_LOG_FORMAT`, `ANVIL_LOG_OUTPUT` and `ANVIL_LOG_MODULES` override them.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const ENV_FILTER: &str = "ANVIL_LOG";
const ENV_FORMAT: &str = "ANVIL_LOG_FORMAT";
const ENV_OUTPUT: &str = "ANVIL_LOG_OUTPUT";
const ENV_MODULES: &str = "ANVIL_LOG_MODULES";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ApiError::ConfigError(format!(
                "Unknown log format '{}'; expected text or json",
                other
            ))),
        }
    }
}

/// Where log lines go. stdout is left alone by default since commands print results there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    File,
    /// stderr and the log file
    Both,
}

impl LogOutput {
    fn console(self) -> Option<Console> {
        match self {
            LogOutput::Stdout => Some(Console::Stdout),
            LogOutput::Stderr | LogOutput::Both => Some(Console::Stderr),
            LogOutput::File => None,
        }
    }

    fn writes_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            "both" => Ok(LogOutput::Both),
            other => Err(ApiError::ConfigError(format!(
                "Unknown log output '{}'; expected stdout, stderr, file or both",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Console {
    Stdout,
    Stderr,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base filter: trace, debug, info, warn, error or off
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Used when output is `file` or `both`
    pub file: PathBuf,
    /// ANSI colors on the console layer (text format only)
    pub color: bool,
    /// Per-target levels, e.g. `"anvil::generation" = "debug"`
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            output: LogOutput::Stderr,
            file: PathBuf::from(".anvil/anvil.log"),
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("level cannot be empty".to_string());
        }
        if self.output.writes_file() && self.file.as_os_str().is_empty() {
            return Err("file must be set when output writes to a file".to_string());
        }
        for (target, level) in &self.modules {
            module_directive(target, level).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Config values with the `ANVIL_LOG_FORMAT` and `ANVIL_LOG_OUTPUT` overrides applied.
    fn effective(&self) -> Result<(LogFormat, LogOutput), ApiError> {
        let format = match std::env::var(ENV_FORMAT) {
            Ok(raw) => raw.parse()?,
            Err(_) => self.format,
        };
        let output = match std::env::var(ENV_OUTPUT) {
            Ok(raw) => raw.parse()?,
            Err(_) => self.output,
        };
        Ok((format, output))
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let fallback = LoggingConfig::default();
    let config = config.unwrap_or(&fallback);
    let (format, output) = config.effective()?;
    let json = format == LogFormat::Json;

    let console = output.console().map(|console| {
        let writer = match console {
            Console::Stdout => BoxMakeWriter::new(std::io::stdout),
            Console::Stderr => BoxMakeWriter::new(std::io::stderr),
        };
        boxed_layer(json, config.color, writer)
    });

    let file = if output.writes_file() {
        Some(boxed_layer(json, false, file_writer(&config.file)?))
    } else {
        None
    };

    Registry::default()
        .with(env_filter(config)?)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| ApiError::ConfigError(format!("Logging already initialized: {}", e)))
}

fn file_writer(path: &Path) -> Result<BoxMakeWriter, ApiError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            ApiError::ConfigError(format!("Cannot create log directory {}: {}", dir.display(), e))
        })?;
    }
    let handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ApiError::ConfigError(format!("Cannot open log file {}: {}", path.display(), e)))?;
    Ok(BoxMakeWriter::new(Mutex::new(handle)))
}

fn boxed_layer<S>(json: bool, ansi: bool, writer: BoxMakeWriter) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);
    if json {
        layer.json().boxed()
    } else {
        layer.with_ansi(ansi).boxed()
    }
}

/// `ANVIL_LOG` replaces the whole filter; otherwise the configured level plus
/// per-module levels, then `ANVIL_LOG_MODULES` on top.
fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER) {
        return Ok(filter);
    }

    let mut filter = EnvFilter::new(config.level.trim());
    for (target, level) in &config.modules {
        filter = filter.add_directive(module_directive(target, level)?);
    }
    if let Ok(raw) = std::env::var(ENV_MODULES) {
        for (target, level) in parse_module_directives(&raw) {
            filter = filter.add_directive(module_directive(&target, &level)?);
        }
    }
    Ok(filter)
}

fn module_directive(target: &str, level: &str) -> Result<Directive, ApiError> {
    format!("{}={}", target, level)
        .parse()
        .map_err(|e| ApiError::ConfigError(format!("Bad log level '{}' for {}: {}", level, target, e)))
}

/// `a=debug, b = warn` into `[("a", "debug"), ("b", "warn")]`; malformed entries are skipped.
fn parse_module_directives(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let (target, level) = entry.split_once('=')?;
            let (target, level) = (target.trim(), level.trim());
            (!target.is_empty() && !level.is_empty()).then(|| (target.to_string(), level.to_string()))
        })
        .collect()
}
