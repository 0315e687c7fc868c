use std::path::PathBuf;

use dirs::home_dir;
use log::error;

use crate::map::{
  coordinates::WGS84Coordinate,
  layer::{LayerDescriptor, LayerSource, LayerSpec},
  orchestrator::{Composition, DEFAULT_ZOOM, GATE_LAYER, MapOptions},
};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Config {
  pub config_path: Option<PathBuf>,
  /// Base URL of the data backend.
  pub api_url: Option<String>,
  pub center: Option<WGS84Coordinate>,
  pub zoom: Option<f32>,
  #[serde(default)]
  pub base_layers: Vec<LayerSpec>,
  #[serde(default)]
  pub descriptors: Vec<LayerDescriptor>,
  #[serde(default)]
  pub options: Option<MapOptions>,
}

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
const DEFAULT_SATELLITE_URL: &str =
  "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}";
const DEFAULT_WMS_URL: &str = "http://localhost:8080/geoserver/wms";

impl Config {
  /// Environment first, then the config file, then defaults.
  #[must_use]
  pub fn new() -> Self {
    let from_env = Self::from_env();
    let from_file = Self::from_file();
    let default = Self::default();

    let mut merged = from_env;
    if let Some(from_file) = &from_file {
      merged = merged.merge(from_file);
    }
    merged = merged.merge(&default);

    if merged.config_path.is_some() && from_file.is_none() {
      merged.init_cfg_file();
    }

    merged
  }

  fn from_env() -> Self {
    Self {
      config_path: std::env::var("MAPOVERLAY_CONFIG").ok().map(PathBuf::from),
      api_url: std::env::var("MAPOVERLAY_API_URL").ok(),
      center: None,
      zoom: None,
      base_layers: Vec::new(),
      descriptors: Vec::new(),
      options: None,
    }
  }

  fn merge(mut self, other: &Self) -> Self {
    self.config_path = self.config_path.or(other.config_path.clone());
    self.api_url = self.api_url.or(other.api_url.clone());
    self.center = self.center.or(other.center);
    self.zoom = self.zoom.or(other.zoom);
    // Layer lists are taken as a whole so the order stays meaningful.
    if self.base_layers.is_empty() {
      self.base_layers.clone_from(&other.base_layers);
    }
    if self.descriptors.is_empty() {
      self.descriptors.clone_from(&other.descriptors);
    }
    self.options = self.options.or(other.options.clone());
    self
  }

  fn from_file() -> Option<Self> {
    let config_path = std::env::var("MAPOVERLAY_CONFIG")
      .ok()
      .map(PathBuf::from)
      .or_else(|| home_dir().map(|p| p.join(".config").join("mapoverlay")))?;
    let config_path = config_path.join("config.json");

    serde_json::from_str(&std::fs::read_to_string(&config_path).ok()?)
      .inspect_err(|e| error!("Failed to read config file: {e}"))
      .ok()?
  }

  fn init_cfg_file(&self) {
    let Some(path) = &self.config_path else {
      return;
    };
    if !path.exists() {
      let _ = std::fs::create_dir_all(path).inspect_err(|e| {
        error!("Failed to create config directory: {e}");
      });
    }

    let path = path.join("config.json");
    if !path.exists() {
      let config = serde_json::to_string_pretty(self);
      if let Ok(config) = config {
        let _ = std::fs::write(path, config).inspect_err(|e| {
          error!("Failed to write config file: {e}");
        });
      } else {
        error!("Failed to serialize config");
      }
    }
  }

  #[must_use]
  pub fn api_url(&self) -> &str {
    self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
  }

  #[must_use]
  pub fn map_options(&self) -> MapOptions {
    self.options.clone().unwrap_or_default()
  }

  /// The composition the configured map starts with.
  #[must_use]
  pub fn composition(&self) -> Composition {
    Composition {
      center: self.center.unwrap_or(WGS84Coordinate::new(52.52, 13.405)),
      zoom: self.zoom.unwrap_or(DEFAULT_ZOOM),
      frozen: false,
      layers: self.base_layers.clone(),
      descriptors: self.descriptors.clone(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      config_path: home_dir().map(|p| p.join(".config").join("mapoverlay")),
      api_url: Some(DEFAULT_API_URL.to_string()),
      center: Some(WGS84Coordinate::new(52.52, 13.405)),
      zoom: Some(DEFAULT_ZOOM),
      base_layers: vec![
        LayerSpec::new(
          "OpenStreetMap",
          LayerSource::Tile {
            url: DEFAULT_TILE_URL.to_string(),
          },
        ),
        LayerSpec::new(
          "Satellite",
          LayerSource::Tile {
            url: DEFAULT_SATELLITE_URL.to_string(),
          },
        )
        .with_visible(false),
        LayerSpec::new(
          GATE_LAYER,
          LayerSource::Wms {
            url: DEFAULT_WMS_URL.to_string(),
            layers: Some("health:hospital_birth".to_string()),
          },
        ),
      ],
      descriptors: Vec::new(),
      options: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn empty() -> Config {
    Config {
      config_path: None,
      api_url: None,
      center: None,
      zoom: None,
      base_layers: Vec::new(),
      descriptors: Vec::new(),
      options: None,
    }
  }

  #[test]
  fn earlier_sources_win() {
    let env = Config {
      api_url: Some("http://env/api".to_string()),
      ..empty()
    };
    let merged = env.merge(&Config::default());
    assert_eq!(merged.api_url(), "http://env/api");
    assert_eq!(merged.base_layers.len(), 3);
    assert_eq!(merged.center, Some(WGS84Coordinate::new(52.52, 13.405)));
  }

  #[test]
  fn layer_lists_are_not_mixed() {
    let file = Config {
      base_layers: vec![LayerSpec::new("Only", LayerSource::Vector)],
      ..empty()
    };
    let merged = empty().merge(&file).merge(&Config::default());
    assert_eq!(merged.base_layers, vec![LayerSpec::new("Only", LayerSource::Vector)]);
  }

  #[test]
  fn default_layers_include_exempt_and_gate() {
    let config = Config::default();
    let composition = config.composition();
    let names: Vec<_> = composition.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["OpenStreetMap", "Satellite", GATE_LAYER]);
    for exempt in &config.map_options().clip_exempt {
      assert!(names.contains(&exempt.as_str()));
    }
  }

  #[test]
  fn config_file_is_partial() {
    let config: Config = serde_json::from_str(
      r#"{"config_path": null, "api_url": "http://backend/api", "center": null, "zoom": 11}"#,
    )
    .unwrap();
    assert_eq!(config.api_url(), "http://backend/api");
    assert!(config.base_layers.is_empty());
  }
}
