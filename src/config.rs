//! Viewer configuration.
//!
//! Handles loading, validating, and merging `viewer.toml`. Stock defaults are
//! overridden by the file, and the file is overridden by command-line flags.
//!
//! ## Config File Location
//!
//! The viewer looks for `viewer.toml` in the dataset root unless `--config`
//! names a file explicitly:
//!
//! ```text
//! dataset/
//! ├── viewer.toml              # optional
//! ├── dataset_index_fixed.jsonl
//! └── ...
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [index]
//! manifest = "dataset_index_fixed.jsonl"  # looked up in the root, then its parent
//! parent_fallback = true
//! progress_interval = 500
//!
//! [derivatives]
//! enabled = true
//!
//! [thumbs]
//! max_dimension = 360        # clamped to 128-4096
//! quality = 82               # clamped to 40-95
//! max_age = 86400            # Cache-Control lifetime, seconds
//!
//! [display]
//! max_dimension = 1600       # clamped to 640-8192
//! quality = 88               # clamped to 40-95
//! max_age = 3600
//!
//! [processing]
//! max_processes = 4          # prebuild workers (omit for auto = CPU cores)
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8188
//!
//! [logging]
//! level = "info"             # trace, debug, info, warn, error
//! format = "text"            # text or json
//! ```
//!
//! Unknown keys are rejected to catch typos early. Out-of-range profile values
//! are clamped rather than rejected, the same as their command-line
//! counterparts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file looked up in the dataset root.
pub const CONFIG_FILENAME: &str = "viewer.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Viewer configuration loaded from `viewer.toml`.
///
/// All fields have sensible defaults. Config files need only specify the
/// values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Manifest discovery and build progress.
    pub index: IndexConfig,
    /// Whether resized derivatives are offered at all.
    pub derivatives: DerivativesConfig,
    /// Small grid rendition.
    pub thumbs: ProfileConfig,
    /// Large single-image rendition.
    pub display: ProfileConfig,
    /// Parallel prebuild settings.
    pub processing: ProcessingConfig,
    /// Listen address.
    pub server: ServerConfig,
    /// Log level and format.
    pub logging: LoggingConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            derivatives: DerivativesConfig::default(),
            thumbs: ProfileConfig::default(),
            display: ProfileConfig::display_default(),
            processing: ProcessingConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Validate values that can't be clamped into shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.progress_interval == 0 {
            return Err(ConfigError::Validation(
                "index.progress_interval must be greater than 0".into(),
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation("server.host must not be empty".into()));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Clamp both derivative profiles into their safe ranges.
    pub fn clamp_profiles(&mut self) {
        self.thumbs = self.thumbs.clamped(THUMB_DIMENSION_RANGE);
        self.display = self.display.clamped(DISPLAY_DIMENSION_RANGE);
    }
}

/// Manifest discovery and build progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Manifest file name looked up inside the dataset root. Empty disables
    /// discovery (an explicit `--index` still works).
    pub manifest: String,
    /// Also look for the manifest in the root's parent directory.
    pub parent_fallback: bool,
    /// Update the scanned counter every this many processed records.
    pub progress_interval: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            manifest: "dataset_index_fixed.jsonl".to_string(),
            parent_fallback: true,
            progress_interval: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerivativesConfig {
    pub enabled: bool,
}

impl Default for DerivativesConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Inclusive `max_dimension` bounds for the thumb profile.
pub const THUMB_DIMENSION_RANGE: (u32, u32) = (128, 4096);
/// Inclusive `max_dimension` bounds for the display profile.
pub const DISPLAY_DIMENSION_RANGE: (u32, u32) = (640, 8192);
/// Inclusive JPEG quality bounds shared by both profiles.
pub const QUALITY_RANGE: (u32, u32) = (40, 95);

/// Size, quality and client cache lifetime of one derivative profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    /// Bound on the longer edge, in pixels.
    pub max_dimension: u32,
    /// JPEG quality.
    pub quality: u32,
    /// `Cache-Control: max-age` sent with this profile's files, in seconds.
    pub max_age: u32,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_dimension: 360,
            quality: 82,
            max_age: 86_400,
        }
    }
}

impl ProfileConfig {
    pub fn display_default() -> Self {
        Self {
            max_dimension: 1600,
            quality: 88,
            max_age: 3600,
        }
    }

    /// Clamp size and quality. `max_age` is taken as given.
    pub fn clamped(self, dimension_range: (u32, u32)) -> Self {
        Self {
            max_dimension: self
                .max_dimension
                .clamp(dimension_range.0, dimension_range.1),
            quality: self.quality.clamp(QUALITY_RANGE.0, QUALITY_RANGE.1),
            max_age: self.max_age,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel prebuild workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8188,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Log severity level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// One step more verbose per `-v`, saturating at trace.
    pub fn raised(self, steps: u8) -> Self {
        const ORDER: [LogLevel; 5] = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ];
        let current = ORDER.iter().position(|l| *l == self).unwrap_or(2);
        ORDER[(current + steps as usize).min(ORDER.len() - 1)]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ViewerConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize, clamp and
/// validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ViewerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut config: ViewerConfig = merged.try_into()?;
    config.clamp_profiles();
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or from `viewer.toml` in `root` when no path is
/// given.
///
/// An explicitly named file must exist; the implicit one is optional.
pub fn load_config(path: Option<&Path>, root: &Path) -> Result<ViewerConfig, ConfigError> {
    let overlay = match path {
        Some(explicit) => Some(toml::from_str(&fs::read_to_string(explicit)?)?),
        None => load_raw_config(&root.join(CONFIG_FILENAME))?,
    };
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `viewer.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Dataset Viewer Configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file in the dataset root as viewer.toml, or pass --config.
# Command-line flags override values from this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Index building
# ---------------------------------------------------------------------------
[index]
# JSONL manifest looked up inside the dataset root. When it is missing the
# root is scanned for images and their .caption.txt / .json side-cars.
# Set to "" to always scan.
manifest = "dataset_index_fixed.jsonl"

# Also look for the manifest next to the dataset root.
parent_fallback = true

# Publish the "scanned" counter every this many records.
progress_interval = 500

# ---------------------------------------------------------------------------
# Derivatives (resized JPEG renditions, cached under the dataset root)
# ---------------------------------------------------------------------------
[derivatives]
enabled = true

# Grid thumbnails, cached in .thumbs/
[thumbs]
# Longer edge in pixels (128-4096).
max_dimension = 360
# JPEG quality (40-95).
quality = 82
# Browser cache lifetime in seconds.
max_age = 86400

# Single-image view, cached in .display/
[display]
# Longer edge in pixels (640-8192).
max_dimension = 1600
# JPEG quality (40-95).
quality = 88
# Browser cache lifetime in seconds.
max_age = 3600

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for --prebuild.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Server
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"
port = 8188

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# trace, debug, info, warn or error. Each -v on the command line raises it.
level = "info"
# text or json
format = "text"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_profiles() {
        let config = ViewerConfig::default();
        assert_eq!(config.thumbs.max_dimension, 360);
        assert_eq!(config.thumbs.quality, 82);
        assert_eq!(config.display.max_dimension, 1600);
        assert_eq!(config.display.quality, 88);
        assert_eq!(config.thumbs.max_age, 86_400);
        assert_eq!(config.display.max_age, 3600);
    }

    #[test]
    fn default_config_has_index_and_server() {
        let config = ViewerConfig::default();
        assert_eq!(config.index.manifest, "dataset_index_fixed.jsonl");
        assert!(config.index.parent_fallback);
        assert_eq!(config.index.progress_interval, 500);
        assert_eq!(config.server.port, 8188);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.derivatives.enabled);
    }

    #[test]
    fn parse_partial_config() {
        let config: ViewerConfig = toml::from_str(
            r#"
[thumbs]
quality = 70
"#,
        )
        .unwrap();
        assert_eq!(config.thumbs.quality, 70);
        // Defaults preserved
        assert_eq!(config.thumbs.max_dimension, 360);
        assert_eq!(config.display.max_dimension, 1600);
    }

    #[test]
    fn parse_empty_display_section_keeps_display_defaults() {
        let config = resolve_config(
            stock_defaults_value(),
            Some(toml::from_str("[display]\nquality = 90\n").unwrap()),
        )
        .unwrap();
        assert_eq!(config.display.max_dimension, 1600);
        assert_eq!(config.display.quality, 90);
        assert_eq!(config.display.max_age, 3600);
    }

    #[test]
    fn profile_max_age_overrides() {
        let config = resolve_config(
            stock_defaults_value(),
            Some(toml::from_str("[display]\nmax_age = 86400\n").unwrap()),
        )
        .unwrap();
        assert_eq!(config.display.max_age, 86_400);
        assert_eq!(config.thumbs.max_age, 86_400);
    }

    // =========================================================================
    // Clamping
    // =========================================================================

    #[test]
    fn profile_clamps_dimension_and_quality() {
        let low = ProfileConfig {
            max_dimension: 10,
            quality: 5,
            max_age: 0,
        }
        .clamped(THUMB_DIMENSION_RANGE);
        assert_eq!(low.max_dimension, 128);
        assert_eq!(low.quality, 40);

        let high = ProfileConfig {
            max_dimension: 100_000,
            quality: 100,
            max_age: 600,
        }
        .clamped(DISPLAY_DIMENSION_RANGE);
        assert_eq!(high.max_dimension, 8192);
        assert_eq!(high.quality, 95);
        assert_eq!(high.max_age, 600);
    }

    #[test]
    fn resolve_config_clamps_profiles_independently() {
        let overlay: toml::Value = toml::from_str(
            r#"
[thumbs]
max_dimension = 64

[display]
max_dimension = 100
quality = 99
"#,
        )
        .unwrap();
        let config = resolve_config(stock_defaults_value(), Some(overlay)).unwrap();
        assert_eq!(config.thumbs.max_dimension, 128);
        assert_eq!(config.thumbs.quality, 82);
        assert_eq!(config.display.max_dimension, 640);
        assert_eq!(config.display.quality, 95);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(None, tmp.path()).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn load_config_reads_root_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
[server]
port = 9000

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        let config = load_config(None, tmp.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn load_config_explicit_path_must_exist() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(Some(&tmp.path().join("missing.toml")), tmp.path());
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_config_explicit_path_wins_over_root_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[server]\nport = 1111\n").unwrap();
        let explicit = tmp.path().join("other.toml");
        fs::write(&explicit, "[server]\nport = 2222\n").unwrap();

        let config = load_config(Some(&explicit), tmp.path()).unwrap();
        assert_eq!(config.server.port, 2222);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "this is not [valid toml").unwrap();
        assert!(matches!(
            load_config(None, tmp.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn unknown_key_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "[thumbs]\nsize = 300\n").unwrap();
        assert!(load_config(None, tmp.path()).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<ViewerConfig, _> = toml::from_str("[colors]\nbg = \"#000\"\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(ViewerConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_zero_progress_interval() {
        let mut config = ViewerConfig::default();
        config.index.progress_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_zero_max_processes() {
        let mut config = ViewerConfig::default();
        config.processing.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"quality = 90"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"quality = 70"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("quality").unwrap().as_integer(), Some(70));
    }

    #[test]
    fn merge_toml_preserves_base_keys() {
        let base: toml::Value = toml::from_str(
            r#"
[thumbs]
max_dimension = 360
quality = 82
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str("[thumbs]\nquality = 60\n").unwrap();
        let merged = merge_toml(base, overlay);
        let thumbs = merged.get("thumbs").unwrap();
        assert_eq!(thumbs.get("max_dimension").unwrap().as_integer(), Some(360));
        assert_eq!(thumbs.get("quality").unwrap().as_integer(), Some(60));
    }

    // =========================================================================
    // Misc
    // =========================================================================

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn log_level_raised_saturates() {
        assert_eq!(LogLevel::Info.raised(0), LogLevel::Info);
        assert_eq!(LogLevel::Info.raised(1), LogLevel::Debug);
        assert_eq!(LogLevel::Warn.raised(9), LogLevel::Trace);
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: ViewerConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }
}
