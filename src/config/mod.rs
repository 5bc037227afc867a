use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default directory scanned when neither the CLI nor the config names one
pub const DEFAULT_ROOT_DIR: &str = "../datasets";

/// Configuration for the scrubber
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory to scan for `.csv.zip` datasets, relative to the working directory
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Directories to always exclude from scanning
    #[serde(default)]
    pub exclude_dirs: Vec<String>,

    /// Default scan depth
    #[serde(default)]
    pub default_depth: Option<usize>,

    /// Write through a temporary file and rename it over the original
    #[serde(default = "default_true")]
    pub atomic_write: bool,

    /// Prefix every rewritten table with a blank-headed row index column
    #[serde(default)]
    pub write_index: bool,

    /// Audit configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            exclude_dirs: vec![
                String::from(".git"),
                String::from(".svn"),
                String::from(".hg"),
            ],
            default_depth: None,
            atomic_write: true,
            write_index: false,
            audit: AuditConfig::default(),
        }
    }
}

/// Where and whether scrub runs are recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log file, defaults to `operations.jsonl` in the user data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT_DIR)
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load config from file, or fall back to defaults if it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("dataset-scrubber").join("config.toml")
        } else {
            PathBuf::from(".dataset-scrubber.toml")
        }
    }

    /// Create config directory if it doesn't exist
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_path = Self::default_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_save_load() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");

        let config = Config {
            root_dir: PathBuf::from("/data/raw"),
            write_index: true,
            ..Default::default()
        };

        config.save(&config_path).unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded.root_dir, PathBuf::from("/data/raw"));
        assert!(loaded.write_index);
        assert!(loaded.atomic_write);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.root_dir, PathBuf::from("../datasets"));
        assert!(config.exclude_dirs.contains(&String::from(".git")));
        assert!(config.atomic_write);
        assert!(!config.write_index);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("write_index = true\n").unwrap();
        assert_eq!(config.root_dir, PathBuf::from(DEFAULT_ROOT_DIR));
        assert!(config.atomic_write);
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_or_default(temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.root_dir, PathBuf::from(DEFAULT_ROOT_DIR));
    }
}
