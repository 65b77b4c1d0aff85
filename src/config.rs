//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXATTACH_CONFIG` (environment variable)
//! 2. `~/.config/mboxattach/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxattach\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Command-line flags override whatever the file says.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Extraction defaults.
    pub extract: ExtractConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Extraction defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Extract `image/*` parts that are neither attachments nor forced types.
    pub inline_images: bool,
    /// Name of the subfolder (under the output directory) for inline images.
    pub inline_folder: String,
    /// Emit a progress line every this many message indexes.
    pub progress_interval: u64,
    /// Append an extension guessed from the content type to fallback names.
    pub guess_extensions: bool,
    /// Default output directory when `--output` is not given.
    pub default_output_dir: Option<PathBuf>,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Read buffer size in bytes used while scanning the archive (default: 1 MB).
    pub read_buffer_size: usize,
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            inline_images: true,
            inline_folder: "inline_images".to_string(),
            progress_interval: 1000,
            guess_extensions: false,
            default_output_dir: None,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024 * 1024,       // 1 MB
            max_message_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXATTACH_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mboxattach").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxattach")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mboxattach.log")
}
