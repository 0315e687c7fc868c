//! Collaborators the map core talks to: data backends, legend images, host callbacks.

mod http;

pub use http::{HttpLegendService, HttpMapDataService};

use std::{io::Cursor, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::map::{
  cluster::ClusterAggregate,
  coordinates::WGS84Coordinate,
  geometry::point_wkt,
  layer::{DescriptorLayerFactory, LayerFactory},
  session::SessionInfo,
};

#[derive(Error, Debug)]
pub enum ServiceError {
  #[error("Request to {url} failed with status {status}")]
  Status { url: String, status: u16 },
  #[error("Request to {url} failed: {message}")]
  Transport { url: String, message: String },
  #[error("Could not decode response from {url}: {message}")]
  Decode { url: String, message: String },
}

#[derive(Error, Debug)]
pub enum LegendError {
  #[error("Legend image is empty")]
  Empty,
  #[error("Legend image could not be decoded: {0}")]
  Decode(String),
}

/// Query for the record at a point, keyed by its WKT encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointQuery {
  pub id: String,
}

impl PointQuery {
  #[must_use]
  pub fn at(coord: WGS84Coordinate) -> Self {
    Self {
      id: point_wkt(coord),
    }
  }
}

/// Identifies which boundary polygon to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryRequest {
  pub table: String,
  pub column: String,
  pub id: String,
}

impl BoundaryRequest {
  #[must_use]
  pub fn new(table: impl Into<String>, column: impl Into<String>, id: impl Into<String>) -> Self {
    Self {
      table: table.into(),
      column: column.into(),
      id: id.into(),
    }
  }
}

/// One row returned by the boundary endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryRecord {
  #[serde(rename = "geojsonText", alias = "geojson", default)]
  pub geojson_text: Option<String>,
}

/// A fetched legend graphic. Bytes are shared, and released with the last entry using them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendImage {
  pub bytes: Arc<[u8]>,
  pub width: u32,
  pub height: u32,
}

impl LegendImage {
  /// Reads the image header to learn its size.
  pub fn decode(bytes: Vec<u8>) -> Result<Self, LegendError> {
    if bytes.is_empty() {
      return Err(LegendError::Empty);
    }
    let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
      .with_guessed_format()
      .map_err(|e| LegendError::Decode(e.to_string()))?
      .into_dimensions()
      .map_err(|e| LegendError::Decode(e.to_string()))?;
    Ok(Self {
      bytes: bytes.into(),
      width,
      height,
    })
  }
}

/// The data backend.
#[async_trait::async_trait]
pub trait MapDataService: Send + Sync {
  /// Records at a point. The first one is used.
  async fn point_data(&self, query: &PointQuery) -> Result<Vec<Value>>;

  /// Aggregated counts for the cluster overlay.
  async fn cluster_counts(&self) -> Result<Vec<ClusterAggregate>>;

  /// Boundary rows, normally exactly one.
  async fn boundary(&self, request: &BoundaryRequest) -> Result<Vec<BoundaryRecord>>;
}

/// Builds legend URLs and loads legend images.
#[async_trait::async_trait]
pub trait LegendService: Send + Sync {
  fn legend_url(&self, source_url: &str, layer_name: &str) -> String {
    wms_legend_url(source_url, layer_name)
  }

  async fn legend_image(&self, url: &str) -> Result<LegendImage>;
}

/// WMS `GetLegendGraphic` request for one layer of a WMS endpoint.
#[must_use]
pub fn wms_legend_url(source_url: &str, layer_name: &str) -> String {
  let separator = if source_url.contains('?') {
    if source_url.ends_with('?') || source_url.ends_with('&') {
      ""
    } else {
      "&"
    }
  } else {
    "?"
  };
  format!(
    "{source_url}{separator}REQUEST=GetLegendGraphic&VERSION=1.0.0&FORMAT=image/png&LAYER={}",
    urlencoding::encode(layer_name)
  )
}

/// Surfaces recoverable failures to the user.
pub trait Notifier: Send + Sync {
  fn warn(&self, message: &str);
  fn error(&self, message: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn warn(&self, message: &str) {
    log::warn!("{message}");
  }

  fn error(&self, message: &str) {
    log::error!("{message}");
  }
}

/// Callbacks the map emits towards its host.
pub trait MapHost: Send + Sync {
  /// Called exactly once per session, after it is fully built.
  fn on_map_ready(&self, _session: &SessionInfo) {}

  /// Called for every successful identification.
  fn on_point_selected(&self, _record: &Value) {}

  fn on_pointer_moved(&self, _location: WGS84Coordinate) {}
}

/// A host that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl MapHost for NoopHost {}

/// The collaborators one map needs.
#[derive(Clone)]
pub struct Services {
  pub data: Arc<dyn MapDataService>,
  pub legend: Arc<dyn LegendService>,
  pub notifier: Arc<dyn Notifier>,
  pub host: Arc<dyn MapHost>,
  pub layer_factory: Arc<dyn LayerFactory>,
}

impl Services {
  /// Logs notifications, ignores host callbacks and materializes descriptors directly.
  #[must_use]
  pub fn new(data: Arc<dyn MapDataService>, legend: Arc<dyn LegendService>) -> Self {
    Self {
      data,
      legend,
      notifier: Arc::new(LogNotifier),
      host: Arc::new(NoopHost),
      layer_factory: Arc::new(DescriptorLayerFactory),
    }
  }

  #[must_use]
  pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = notifier;
    self
  }

  #[must_use]
  pub fn with_host(mut self, host: Arc<dyn MapHost>) -> Self {
    self.host = host;
    self
  }

  #[must_use]
  pub fn with_layer_factory(mut self, layer_factory: Arc<dyn LayerFactory>) -> Self {
    self.layer_factory = layer_factory;
    self
  }
}
