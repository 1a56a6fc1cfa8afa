//! Validation layer configuration with TOML, environment variable, and
//! default config sources.
//!
//! The core subsystems never read this; the layer consults it to decide
//! which checks to run at all.

use std::path::Path;
use std::{env, fmt, fs};

use serde::{Deserialize, Serialize};

// ── Errors ──────────────────────────────────────────────────────────

/// Errors produced by configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown validation layer: {0}")]
    UnknownLayer(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },
}

// ── SubBufferBounds ─────────────────────────────────────────────────

/// How accesses through a sub-buffer are bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubBufferBounds {
    /// The parent buffer's length is the only limit.
    #[default]
    Parent,
    /// The access must also stay inside the sub-buffer's own region.
    Strict,
}

impl fmt::Display for SubBufferBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for SubBufferBounds {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parent" => Ok(Self::Parent),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::InvalidEnvVar {
                key: "ACCELGUARD_SUB_BUFFER_BOUNDS".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

// ── LogLevel ────────────────────────────────────────────────────────

/// Verbosity of validation diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
    }
}

// ── TOML wrapper ────────────────────────────────────────────────────

/// Wrapper used for the `[validation]` table in TOML files.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TomlWrapper {
    validation: ValidationConfig,
}

// ── ValidationConfig ────────────────────────────────────────────────

/// Which validation checks the layer performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Null-handle, null-pointer, and zero-size argument checks.
    pub parameter_validation: bool,
    /// Reference counting of every handle, with a leak summary at teardown.
    pub leak_checking: bool,
    /// Use-after-release diagnostics. Implies `leak_checking`.
    pub lifetime_validation: bool,
    /// Bounds checks on data-movement entry points.
    pub bounds_checking: bool,
    /// Escalate lifetime diagnostics to hard errors.
    pub strict: bool,
    /// Bounding policy for sub-buffer accesses.
    pub sub_buffer_bounds: SubBufferBounds,
    pub log_level: LogLevel,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            parameter_validation: true,
            leak_checking: false,
            lifetime_validation: false,
            bounds_checking: false,
            strict: false,
            sub_buffer_bounds: SubBufferBounds::Parent,
            log_level: LogLevel::Warn,
        }
    }
}

impl ValidationConfig {
    // ── Constructors ────────────────────────────────────────────

    /// Every check enabled, lifetime problems still advisory.
    pub fn full() -> Self {
        Self {
            parameter_validation: true,
            leak_checking: true,
            lifetime_validation: true,
            bounds_checking: true,
            ..Self::default()
        }
    }

    /// All checks disabled. The layer forwards every call untouched.
    pub fn disabled() -> Self {
        Self { parameter_validation: false, ..Self::default() }
    }

    /// Load configuration from a TOML file at `path`.
    ///
    /// The file is expected to contain a `[validation]` table. If the file
    /// does not exist, returns `Ok(Self::default())`.
    pub fn from_toml(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "validation config not found; using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let wrapper: TomlWrapper = toml::from_str(&text)?;
        Ok(wrapper.validation)
    }

    /// Serialize to a TOML string (wrapped in `[validation]`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let wrapper = TomlWrapper { validation: self.clone() };
        Ok(toml::to_string_pretty(&wrapper)?)
    }

    /// Build a config from `ACCELGUARD_*` environment variables on top of
    /// `Self::default()`.
    ///
    /// `ACCELGUARD_ENABLE_LAYERS` is applied first; the per-toggle variables
    /// then override individual fields.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("ACCELGUARD_ENABLE_LAYERS") {
            cfg.enable_layers(&v)?;
        }
        if let Ok(v) = env::var("ACCELGUARD_PARAMETER_VALIDATION") {
            cfg.parameter_validation = Self::parse_env_bool("ACCELGUARD_PARAMETER_VALIDATION", &v)?;
        }
        if let Ok(v) = env::var("ACCELGUARD_LEAK_CHECKING") {
            cfg.leak_checking = Self::parse_env_bool("ACCELGUARD_LEAK_CHECKING", &v)?;
        }
        if let Ok(v) = env::var("ACCELGUARD_LIFETIME_VALIDATION") {
            cfg.lifetime_validation = Self::parse_env_bool("ACCELGUARD_LIFETIME_VALIDATION", &v)?;
        }
        if let Ok(v) = env::var("ACCELGUARD_BOUNDS_CHECKING") {
            cfg.bounds_checking = Self::parse_env_bool("ACCELGUARD_BOUNDS_CHECKING", &v)?;
        }
        if let Ok(v) = env::var("ACCELGUARD_STRICT") {
            cfg.strict = Self::parse_env_bool("ACCELGUARD_STRICT", &v)?;
        }
        if let Ok(v) = env::var("ACCELGUARD_SUB_BUFFER_BOUNDS") {
            cfg.sub_buffer_bounds = v.parse()?;
        }
        if let Ok(v) = env::var("ACCELGUARD_LOG_LEVEL") {
            cfg.log_level = v.parse()?;
        }

        Ok(cfg)
    }

    /// Turn on the layers named in a comma-separated list.
    ///
    /// Accepted names: `parameter`, `leak`, `lifetime`, `bounds`, `full`.
    pub fn enable_layers(&mut self, list: &str) -> Result<(), ConfigError> {
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name.to_ascii_lowercase().as_str() {
                "parameter" => self.parameter_validation = true,
                "leak" => self.leak_checking = true,
                "lifetime" => self.lifetime_validation = true,
                "bounds" => self.bounds_checking = true,
                "full" => {
                    self.parameter_validation = true;
                    self.leak_checking = true;
                    self.lifetime_validation = true;
                    self.bounds_checking = true;
                }
                other => return Err(ConfigError::UnknownLayer(other.to_string())),
            }
        }
        Ok(())
    }

    /// The config as the layer applies it: lifetime validation implies
    /// leak checking.
    #[must_use]
    pub fn effective(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.lifetime_validation {
            cfg.leak_checking = true;
        }
        cfg
    }

    /// Whether handles are reference counted at all.
    pub const fn tracks_references(&self) -> bool {
        self.leak_checking || self.lifetime_validation
    }

    // ── Validation ──────────────────────────────────────────────

    /// Reject combinations that cannot be honoured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strict
            && !self.parameter_validation
            && !self.tracks_references()
            && !self.bounds_checking
        {
            return Err(ConfigError::Validation(
                "strict mode requires at least one enabled check".into(),
            ));
        }
        if self.sub_buffer_bounds == SubBufferBounds::Strict && !self.bounds_checking {
            return Err(ConfigError::Validation(
                "sub_buffer_bounds = strict requires bounds_checking".into(),
            ));
        }
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn parse_env_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
        match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidEnvVar { key: key.to_string(), value: val.to_string() }),
        }
    }
}
