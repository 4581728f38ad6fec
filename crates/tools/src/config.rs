use std::fs;
use std::path::Path;

use foundation::bounds::{InvalidCoordinate, ViewState};
use layers::scene::{EARTHQUAKE_DATA_URL, EARTHQUAKE_SOURCE_ID, SceneSettings};
use serde::{Deserialize, Serialize};

pub const STYLE_URL_ENV: &str = "QUAKEMAP_STYLE_URL";
pub const DATA_URL_ENV: &str = "QUAKEMAP_DATA_URL";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    ZoomRange {
        min: f64,
        max: f64,
    },
    InitialView(InvalidCoordinate),
    ZeroClusterRadius,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "read {path}: {source}"),
            ConfigError::Parse(e) => write!(f, "config json: {e}"),
            ConfigError::ZoomRange { min, max } => {
                write!(f, "min_zoom {min} is greater than max_zoom {max}")
            }
            ConfigError::InitialView(e) => write!(f, "initial_view: {e}"),
            ConfigError::ZeroClusterRadius => write!(f, "source.cluster_radius must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::InitialView(e) => Some(e),
            ConfigError::ZoomRange { .. } | ConfigError::ZeroClusterRadius => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub id: String,
    pub data: String,
    pub cluster_radius: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id: EARTHQUAKE_SOURCE_ID.to_string(),
            data: EARTHQUAKE_DATA_URL.to_string(),
            cluster_radius: 80,
        }
    }
}

/// Startup settings of the earthquake map. Every field may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub style_url: String,
    pub initial_view: ViewState,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub source: SourceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let scene = SceneSettings::default();
        Self {
            style_url: scene.style_url,
            initial_view: scene.view,
            min_zoom: scene.min_zoom,
            max_zoom: scene.max_zoom,
            source: SourceConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Loads `path` when given, applies the process environment and validates.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(STYLE_URL_ENV).filter(|v| !v.is_empty()) {
            self.style_url = url;
        }
        if let Some(url) = lookup(DATA_URL_ENV).filter(|v| !v.is_empty()) {
            self.source.data = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_zoom <= self.max_zoom) {
            return Err(ConfigError::ZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        self.initial_view
            .center()
            .map_err(ConfigError::InitialView)?;
        if self.source.cluster_radius == 0 {
            return Err(ConfigError::ZeroClusterRadius);
        }
        Ok(())
    }

    /// The initial view with its zoom clamped into `[min_zoom, max_zoom]`.
    pub fn effective_view(&self) -> ViewState {
        let mut view = self.initial_view;
        view.zoom = view.zoom.clamp(self.min_zoom, self.max_zoom);
        view
    }

    pub fn scene_settings(&self) -> SceneSettings {
        SceneSettings {
            style_url: self.style_url.clone(),
            view: self.initial_view,
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            source_id: self.source.id.clone(),
            data_url: self.source.data.clone(),
            cluster_radius: self.source.cluster_radius,
            ..SceneSettings::default()
        }
    }
}
