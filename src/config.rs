use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Origin of the hosted backend, used when no config overrides it.
pub const DEFAULT_BASE_URL: &str = "https://library-management-backend-b5-a4.vercel.app/api";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// API base origin, e.g. "https://host/api"
  pub base_url: String,
  /// Default page size for book listings
  pub page_size: u32,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
      page_size: 10,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shelfctl.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shelfctl/config.yaml
  ///
  /// No file means defaults; SHELFCTL_BASE_URL overrides the base URL
  /// either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(base_url) = std::env::var("SHELFCTL_BASE_URL") {
      config.base_url = base_url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shelfctl.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shelfctl").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The validated base origin.
  pub fn base_url(&self) -> Result<url::Url> {
    url::Url::parse(&self.base_url)
      .map_err(|e| eyre!("Invalid base URL '{}': {}", self.base_url, e))
  }
}
