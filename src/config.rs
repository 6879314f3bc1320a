//! Configuration file parser for ~/.config/audioport/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos. The config is loaded once at process start and
//! passed explicitly to the components that need it; environment overrides
//! are applied on top of the file.
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Backend address used when neither the file nor the environment sets one.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8880";
/// Category offered when none are configured.
pub const DEFAULT_CATEGORY: &str = "Standard";

/// Overrides `api_base_url`.
pub const ENV_API_BASE_URL: &str = "AUDIO_TRANSCRIPT_SERVER_URL";
/// Overrides `file_ttl_secs`.
pub const ENV_FILE_TTL: &str = "FILE_CLEAN_UP";
/// Base directory for the default upload directory (`$DATA_DIR/uploads`).
pub const ENV_DATA_DIR: &str = "DATA_DIR";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the transcript backend (`/import`, `/search`, `/health` hang off it).
    pub api_base_url: String,

    /// Storage root for staged uploads.
    pub upload_dir: PathBuf,

    /// Ordered category list offered to the user. Accepts a TOML array or a
    /// comma-separated string.
    #[serde(deserialize_with = "deserialize_categories")]
    pub category: Vec<String>,

    /// Maximum age of a staged file before the sweeper deletes it.
    pub file_ttl_secs: u64,

    /// Delay between retention sweeps.
    pub sweep_interval_secs: u64,

    pub timeouts: Timeouts,
}

/// Per-call timeout budgets in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Timeouts {
    pub submit_secs: u64,
    /// Search queries can be expensive on the backend, hence the large budget.
    pub search_secs: u64,
    pub health_secs: u64,
    pub feed_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            submit_secs: 60,
            search_secs: 600,
            health_secs: 10,
            feed_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn submit(&self) -> Duration {
        Duration::from_secs(self.submit_secs)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_secs)
    }

    pub fn feed(&self) -> Duration {
        Duration::from_secs(self.feed_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_dir: default_upload_dir(std::env::var_os(ENV_DATA_DIR).map(PathBuf::from)),
            category: vec![DEFAULT_CATEGORY.to_string()],
            file_ttl_secs: 30 * 60,
            sweep_interval_secs: 5 * 60,
            timeouts: Timeouts::default(),
        }
    }
}

fn default_upload_dir(data_dir: Option<PathBuf>) -> PathBuf {
    match data_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("uploads"),
        _ => PathBuf::from("uploads"),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryInput {
    List(Vec<String>),
    Csv(String),
}

fn deserialize_categories<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match CategoryInput::deserialize(deserializer)? {
        CategoryInput::List(list) => list,
        CategoryInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };
    Ok(normalize_categories(raw))
}

/// Trims entries, drops blanks and duplicates, and falls back to the default
/// category when nothing is left.
fn normalize_categories<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for entry in raw {
        let trimmed = entry.as_ref().trim();
        if !trimmed.is_empty() && !out.iter().any(|c| c == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    if out.is_empty() {
        out.push(DEFAULT_CATEGORY.to_string());
    }
    out
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "api_base_url",
        "upload_dir",
        "category",
        "file_ttl_secs",
        "sweep_interval_secs",
        "timeouts",
    ];

    /// Default config file location (`~/.config/audioport/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".config").join("audioport").join("config.toml"))
    }

    /// Load configuration from a TOML file and apply environment overrides.
    ///
    /// - Missing file → defaults
    /// - Empty file → defaults
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a TOML file without consulting the environment.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            api_base_url = %config.api_base_url,
            upload_dir = %config.upload_dir.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Applies environment overrides. Environment wins over the config file.
    ///
    /// Takes a lookup function so tests can supply variables without touching
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(api_base_url = %url, "Using backend URL from environment");
            self.api_base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_FILE_TTL) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.file_ttl_secs = secs,
                Err(e) => tracing::warn!(
                    value = %raw,
                    error = %e,
                    "Ignoring invalid {} value", ENV_FILE_TTL
                ),
            }
        }
    }

    pub fn file_ttl(&self) -> Duration {
        Duration::from_secs(self.file_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Category list, never empty.
    pub fn categories(&self) -> Vec<String> {
        normalize_categories(&self.category)
    }

    /// First configured category, used as the default for new items.
    pub fn default_category(&self) -> String {
        self.categories().remove(0)
    }

    /// Categories joined for display in a single text field.
    pub fn categories_csv(&self) -> String {
        self.categories().join(", ")
    }

    /// Replaces the category list from a comma-separated string.
    pub fn set_categories(&mut self, csv: &str) {
        self.category = normalize_categories(csv.split(','));
    }

    /// Appends a category if it is not already present.
    ///
    /// Commas would split the name on the next load, so they are replaced
    /// with semicolons. Returns `true` if the list changed.
    pub fn extend_categories(&mut self, name: &str) -> bool {
        let name = name.trim().replace(',', ";");
        if name.is_empty() || self.category.iter().any(|c| c == &name) {
            return false;
        }
        self.category.push(name);
        self.category = normalize_categories(&self.category);
        true
    }

    /// Writes the config as TOML via a temp file and rename, so a crash never
    /// leaves a truncated config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));
        let result = (|| {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::info!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
