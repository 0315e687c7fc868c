//! Clipping the map to a boundary polygon.
//!
//! At most one clip is active. It consists of an outline layer named
//! [`BOUNDARY_LAYER`] and a crop mask shared by every layer that is not exempt.

use std::sync::Arc;

use log::{debug, info};

use super::{
  geometry::{BoundaryGeometry, GeometryError},
  layer::{BOUNDARY_LAYER, LayerContent, LayerId, MapLayer, MaskFilter, OutlineStyle},
  session::MapSession,
};
use crate::services::BoundaryRecord;

/// Parses the first boundary record that carries geometry text.
pub fn boundary_from_records(records: &[BoundaryRecord]) -> Result<BoundaryGeometry, GeometryError> {
  let text = records
    .iter()
    .find_map(|r| r.geojson_text.as_deref())
    .filter(|text| !text.trim().is_empty())
    .ok_or(GeometryError::Empty)?;
  BoundaryGeometry::from_geojson(text)
}

#[derive(Debug, Clone)]
struct ActiveClip {
  outline: LayerId,
  mask: Arc<MaskFilter>,
}

/// Owns the active clip and keeps its mask on exactly the non-exempt layers.
#[derive(Debug)]
pub struct Clipper {
  exempt: Vec<String>,
  style: OutlineStyle,
  active: Option<ActiveClip>,
  next_mask_id: u64,
}

impl Clipper {
  #[must_use]
  pub fn new(exempt: Vec<String>) -> Self {
    Self {
      exempt,
      style: OutlineStyle::default(),
      active: None,
      next_mask_id: 1,
    }
  }

  #[must_use]
  pub fn is_exempt(&self, name: &str) -> bool {
    self.exempt.iter().any(|e| e == name)
  }

  #[must_use]
  pub fn is_active(&self) -> bool {
    self.active.is_some()
  }

  #[must_use]
  pub fn active_mask(&self) -> Option<&Arc<MaskFilter>> {
    self.active.as_ref().map(|a| &a.mask)
  }

  #[must_use]
  pub fn active_geometry(&self) -> Option<&Arc<BoundaryGeometry>> {
    self.active_mask().map(|m| m.geometry())
  }

  /// Clears and removes the outline and takes the mask off every layer.
  pub fn retire(&mut self, session: &mut MapSession) {
    let Some(active) = self.active.take() else {
      return;
    };
    debug!("Retiring clip mask {}", active.mask.id());
    if let Some(outline) = session.layer_mut(active.outline) {
      outline.clear_source();
    }
    session.remove_layer(active.outline);
    for layer in session.layers_mut() {
      layer.remove_filter(active.mask.id());
    }
  }

  /// Forgets the active clip without touching a session, e.g. after it was disposed.
  pub fn forget(&mut self) -> Option<Arc<BoundaryGeometry>> {
    self.active.take().map(|a| a.mask.geometry().clone())
  }

  /// Adds the outline, builds a fresh mask and masks every non-exempt layer.
  pub fn apply(&mut self, session: &mut MapSession, geometry: Arc<BoundaryGeometry>) -> LayerId {
    self.retire(session);

    let outline = session.replace_named_layer(MapLayer::new(
      BOUNDARY_LAYER,
      LayerContent::Outline {
        geometry: Some(geometry.clone()),
        style: self.style,
      },
    ));
    let mask = Arc::new(MaskFilter::crop(self.next_mask_id, geometry));
    self.next_mask_id += 1;
    info!("Clipping map to boundary with mask {}", mask.id());

    self.active = Some(ActiveClip { outline, mask });
    self.reconcile(session);
    outline
  }

  /// Restores the mask invariant after the layer set changed.
  pub fn reconcile(&self, session: &mut MapSession) {
    let Some(active) = &self.active else {
      return;
    };
    for layer in session.layers_mut() {
      // Only one mask is ever active, so stale ones go.
      let stale: Vec<u64> = layer
        .filters()
        .iter()
        .map(|f| f.id())
        .filter(|id| *id != active.mask.id())
        .collect();
      for id in stale {
        layer.remove_filter(id);
      }
      if self.is_exempt(layer.name()) {
        layer.remove_filter(active.mask.id());
      } else {
        layer.add_filter(active.mask.clone());
      }
    }
  }

  /// Layers of the session currently carrying the active mask.
  #[must_use]
  pub fn masked_layers<'a>(&self, session: &'a MapSession) -> Vec<&'a str> {
    let Some(active) = &self.active else {
      return Vec::new();
    };
    session
      .layers()
      .iter()
      .filter(|l| l.has_filter(active.mask.id()))
      .map(MapLayer::name)
      .collect()
  }
}
