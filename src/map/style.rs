use std::{
  collections::HashMap,
  f32::consts::PI,
  sync::{Arc, LazyLock, Mutex},
};

use egui::Color32;

pub const MIN_CLUSTER_RADIUS: f32 = 8.;
pub const MAX_CLUSTER_RADIUS: f32 = 20.;
const RADIUS_PER_COUNT: f32 = 0.75;
const RING_WIDTH: f32 = 2.;

/// Number of entries in the ring's dash pattern; the first one is a zero-length dash.
pub const DASH_SEGMENTS: usize = 7;

/// Colour buckets of cluster markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterBucket {
  Small,
  Medium,
  Large,
}

impl ClusterBucket {
  #[must_use]
  pub fn for_size(size: u32) -> Self {
    match size {
      26.. => ClusterBucket::Large,
      9..=25 => ClusterBucket::Medium,
      _ => ClusterBucket::Small,
    }
  }

  #[must_use]
  pub fn color(self) -> Color32 {
    match self {
      ClusterBucket::Large => Color32::RED,
      ClusterBucket::Medium => Color32::ORANGE,
      ClusterBucket::Small => Color32::GREEN,
    }
  }
}

/// How a cluster with a given aggregated count is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStyle {
  pub bucket: ClusterBucket,
  pub fill: Color32,
  pub radius: f32,
  pub ring_width: f32,
  pub line_dash: [f32; DASH_SEGMENTS],
  pub label: String,
  pub label_color: Color32,
}

impl ClusterStyle {
  #[allow(clippy::cast_precision_loss)]
  fn compute(size: u32) -> Self {
    let bucket = ClusterBucket::for_size(size);
    let radius = (size as f32 * RADIUS_PER_COUNT).clamp(MIN_CLUSTER_RADIUS, MAX_CLUSTER_RADIUS);
    let segment = 2. * PI * radius / (DASH_SEGMENTS - 1) as f32;
    let mut line_dash = [segment; DASH_SEGMENTS];
    line_dash[0] = 0.;

    Self {
      bucket,
      fill: bucket.color(),
      radius,
      ring_width: RING_WIDTH,
      line_dash,
      label: size.to_string(),
      label_color: Color32::WHITE,
    }
  }
}

/// Keyed by exact count, never evicted. Counts are small in practice.
static STYLE_CACHE: LazyLock<Mutex<HashMap<u32, Arc<ClusterStyle>>>> =
  LazyLock::new(|| Mutex::new(HashMap::new()));

/// The memoized style for a cluster of aggregated count `size`.
/// Repeated calls with the same count return the same allocation.
pub fn cluster_style(size: u32) -> Arc<ClusterStyle> {
  let mut cache = STYLE_CACHE
    .lock()
    .unwrap_or_else(std::sync::PoisonError::into_inner);
  cache
    .entry(size)
    .or_insert_with(|| Arc::new(ClusterStyle::compute(size)))
    .clone()
}
