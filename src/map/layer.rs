use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{cluster::ClusterSource, geometry::BoundaryGeometry};

/// Name of the clustered point-density overlay.
pub const CLUSTER_LAYER: &str = "cluster-layer";
/// Name of the outline drawn for the active clip boundary.
pub const BOUNDARY_LAYER: &str = "navigation-boundary";

/// Identifies a layer within one map session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) u64);

/// Where the pixels of a base layer come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSource {
  /// XYZ raster tiles, e.g. `https://tile.openstreetmap.org/{z}/{x}/{y}.png`.
  Tile { url: String },
  /// A WMS raster; `layers` is the queryable layer name sent as `LAYERS`.
  Wms {
    url: String,
    #[serde(default)]
    layers: Option<String>,
  },
  /// A vector layer the host draws itself.
  Vector,
}

impl LayerSource {
  /// Source URL and queryable layer name, if this is a raster that can have a legend.
  #[must_use]
  pub fn legend_params(&self) -> Option<(&str, &str)> {
    match self {
      LayerSource::Wms {
        url,
        layers: Some(layers),
      } if !url.is_empty() && !layers.is_empty() => Some((url.as_str(), layers.as_str())),
      _ => None,
    }
  }
}

/// Host-provided description of a base layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
  pub name: String,
  #[serde(default = "default_visible")]
  pub visible: bool,
  pub source: LayerSource,
}

fn default_visible() -> bool {
  true
}

impl LayerSpec {
  #[must_use]
  pub fn new(name: impl Into<String>, source: LayerSource) -> Self {
    Self {
      name: name.into(),
      visible: true,
      source,
    }
  }

  #[must_use]
  pub fn with_visible(mut self, visible: bool) -> Self {
    self.visible = visible;
    self
  }
}

/// Stroke and fill of a boundary outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineStyle {
  pub stroke: egui::Color32,
  pub stroke_width: f32,
  pub fill: egui::Color32,
}

impl Default for OutlineStyle {
  fn default() -> Self {
    Self {
      stroke: egui::Color32::from_rgb(0, 102, 204),
      stroke_width: 3.,
      fill: egui::Color32::TRANSPARENT,
    }
  }
}

/// What a layer displays.
#[derive(Debug, Clone)]
pub enum LayerContent {
  Base(LayerSource),
  Cluster(ClusterSource),
  Outline {
    geometry: Option<Arc<BoundaryGeometry>>,
    style: OutlineStyle,
  },
}

/// Restricts rendering of a layer to the inside of a polygon.
#[derive(Debug)]
pub struct MaskFilter {
  id: u64,
  geometry: Arc<BoundaryGeometry>,
  inner: bool,
  active: bool,
}

impl MaskFilter {
  /// An inner (crop) mask, active immediately.
  #[must_use]
  pub fn crop(id: u64, geometry: Arc<BoundaryGeometry>) -> Self {
    Self {
      id,
      geometry,
      inner: true,
      active: true,
    }
  }

  #[must_use]
  pub fn id(&self) -> u64 {
    self.id
  }

  #[must_use]
  pub fn is_active(&self) -> bool {
    self.active
  }

  #[must_use]
  pub fn geometry(&self) -> &Arc<BoundaryGeometry> {
    &self.geometry
  }

  /// Whether a projected point survives this filter.
  #[must_use]
  pub fn keeps(&self, pc: super::coordinates::PixelCoordinate) -> bool {
    !self.active || self.geometry.contains(pc) == self.inner
  }
}

/// A named, ordered unit of the map's layer list.
#[derive(Debug, Clone)]
pub struct MapLayer {
  pub(crate) id: LayerId,
  name: String,
  visible: bool,
  content: LayerContent,
  filters: Vec<Arc<MaskFilter>>,
}

impl MapLayer {
  /// Layer ids are assigned when the layer is added to a session.
  #[must_use]
  pub fn new(name: impl Into<String>, content: LayerContent) -> Self {
    Self {
      id: LayerId(0),
      name: name.into(),
      visible: true,
      content,
      filters: Vec::new(),
    }
  }

  #[must_use]
  pub fn from_spec(spec: &LayerSpec) -> Self {
    Self::new(spec.name.clone(), LayerContent::Base(spec.source.clone())).with_visible(spec.visible)
  }

  #[must_use]
  pub fn with_visible(mut self, visible: bool) -> Self {
    self.visible = visible;
    self
  }

  #[must_use]
  pub fn id(&self) -> LayerId {
    self.id
  }

  #[must_use]
  pub fn name(&self) -> &str {
    &self.name
  }

  #[must_use]
  pub fn visible(&self) -> bool {
    self.visible
  }

  pub fn set_visible(&mut self, visible: bool) {
    self.visible = visible;
  }

  #[must_use]
  pub fn content(&self) -> &LayerContent {
    &self.content
  }

  #[must_use]
  pub fn source(&self) -> Option<&LayerSource> {
    match &self.content {
      LayerContent::Base(source) => Some(source),
      _ => None,
    }
  }

  #[must_use]
  pub fn cluster_source(&self) -> Option<&ClusterSource> {
    match &self.content {
      LayerContent::Cluster(source) => Some(source),
      _ => None,
    }
  }

  /// Drops the outline geometry, leaving an empty source.
  pub fn clear_source(&mut self) {
    if let LayerContent::Outline { geometry, .. } = &mut self.content {
      *geometry = None;
    }
  }

  #[must_use]
  pub fn filters(&self) -> &[Arc<MaskFilter>] {
    &self.filters
  }

  #[must_use]
  pub fn has_filter(&self, id: u64) -> bool {
    self.filters.iter().any(|f| f.id() == id)
  }

  pub fn add_filter(&mut self, filter: Arc<MaskFilter>) {
    if !self.has_filter(filter.id()) {
      self.filters.push(filter);
    }
  }

  pub fn remove_filter(&mut self, id: u64) {
    self.filters.retain(|f| f.id() != id);
  }

  /// Whether a projected point is rendered by this layer after all filters.
  #[must_use]
  pub fn renders(&self, pc: super::coordinates::PixelCoordinate) -> bool {
    self.filters.iter().all(|f| f.keeps(pc))
  }
}

/// A generic layer descriptor node, as delivered by a host or a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayerDescriptor {
  Group {
    #[serde(default)]
    name: String,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default)]
    children: Vec<LayerDescriptor>,
  },
  Tile {
    name: String,
    url: String,
    #[serde(default = "default_visible")]
    visible: bool,
  },
  Wms {
    name: String,
    url: String,
    #[serde(default)]
    layers: Option<String>,
    #[serde(default = "default_visible")]
    visible: bool,
  },
}

/// Materializes descriptor nodes into map layers.
pub trait LayerFactory: Send + Sync {
  fn create(&self, descriptor: &LayerDescriptor) -> Vec<MapLayer>;
}

/// Flattens groups depth first; a hidden group hides all of its children.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptorLayerFactory;

impl DescriptorLayerFactory {
  fn collect(descriptor: &LayerDescriptor, parent_visible: bool, out: &mut Vec<MapLayer>) {
    match descriptor {
      LayerDescriptor::Group {
        visible, children, ..
      } => {
        for child in children {
          Self::collect(child, parent_visible && *visible, out);
        }
      }
      LayerDescriptor::Tile { name, url, visible } => out.push(
        MapLayer::new(
          name.clone(),
          LayerContent::Base(LayerSource::Tile { url: url.clone() }),
        )
        .with_visible(parent_visible && *visible),
      ),
      LayerDescriptor::Wms {
        name,
        url,
        layers,
        visible,
      } => out.push(
        MapLayer::new(
          name.clone(),
          LayerContent::Base(LayerSource::Wms {
            url: url.clone(),
            layers: layers.clone(),
          }),
        )
        .with_visible(parent_visible && *visible),
      ),
    }
  }
}

impl LayerFactory for DescriptorLayerFactory {
  fn create(&self, descriptor: &LayerDescriptor) -> Vec<MapLayer> {
    let mut layers = Vec::new();
    Self::collect(descriptor, true, &mut layers);
    layers
  }
}
