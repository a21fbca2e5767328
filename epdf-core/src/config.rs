use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{AdjustMode, Document};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Viewer defaults read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub view: ViewConfig,
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub zoom: f64,
    /// Monitor resolution; 0 means unknown.
    pub ppi: f64,
    pub device_factors: [f64; 2],
    pub adjust_mode: AdjustMode,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            ppi: 0.0,
            device_factors: [1.0, 1.0],
            adjust_mode: AdjustMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub pages_per_row: u32,
    pub first_page_column: u32,
    pub page_padding: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            pages_per_row: 1,
            first_page_column: 1,
            page_padding: 1,
        }
    }
}

impl Config {
    pub fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("org", "epdf", "epdf")
            .ok_or_else(|| anyhow!("unable to resolve platform config directories"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Loads the configuration from the platform config directory.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::default_path()?)
    }

    /// A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        if !path.is_file() {
            bail!("config path {:?} is not a file", path);
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Pushes the configured values through the document's setters.
    pub fn apply(&self, document: &mut Document) {
        document.set_zoom(self.view.zoom);
        document.set_viewport_ppi(self.view.ppi);
        let [x, y] = self.view.device_factors;
        document.set_device_factors(x, y);
        document.set_adjust_mode(self.view.adjust_mode);
        document.set_page_layout(
            self.layout.page_padding,
            self.layout.pages_per_row,
            self.layout.first_page_column,
        );
    }
}
