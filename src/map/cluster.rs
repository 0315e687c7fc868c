use std::sync::Arc;

use rstar::{AABB, RTree, primitives::GeomWithData};
use serde::{Deserialize, Serialize};

use super::{
  coordinates::{BoundingBox, PixelCoordinate, WGS84Coordinate},
  style::{ClusterStyle, cluster_style},
};

/// Screen distance, in pixels, below which points are merged into one cluster.
pub const CLUSTER_DISTANCE: f32 = 40.;

/// A number of records summarized at one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterAggregate {
  #[serde(alias = "lon")]
  pub longitude: f32,
  #[serde(alias = "lat")]
  pub latitude: f32,
  pub count: u32,
}

impl ClusterAggregate {
  #[must_use]
  pub fn new(longitude: f32, latitude: f32, count: u32) -> Self {
    Self {
      longitude,
      latitude,
      count,
    }
  }
}

/// A projected point tagged with its count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointFeature {
  pub position: PixelCoordinate,
  pub count: u32,
}

impl From<&ClusterAggregate> for PointFeature {
  fn from(aggregate: &ClusterAggregate) -> Self {
    Self {
      position: WGS84Coordinate::new(aggregate.latitude, aggregate.longitude).into(),
      count: aggregate.count,
    }
  }
}

/// A group of nearby features drawn as one marker.
#[derive(Debug, Clone)]
pub struct Cluster {
  pub center: PixelCoordinate,
  /// Indices into the source's features.
  pub members: Vec<usize>,
  /// Sum of the member counts.
  pub size: u32,
}

impl Cluster {
  #[must_use]
  pub fn style(&self) -> Arc<ClusterStyle> {
    cluster_style(self.size)
  }
}

type IndexedPoint = GeomWithData<[f32; 2], usize>;

/// Point features plus a distance based clustering transform.
#[derive(Clone)]
pub struct ClusterSource {
  features: Vec<PointFeature>,
  distance: f32,
  index: RTree<IndexedPoint>,
}

impl std::fmt::Debug for ClusterSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ClusterSource")
      .field("features", &self.features.len())
      .field("distance", &self.distance)
      .finish_non_exhaustive()
  }
}

impl ClusterSource {
  #[must_use]
  pub fn new(features: Vec<PointFeature>, distance: f32) -> Self {
    let index = RTree::bulk_load(
      features
        .iter()
        .enumerate()
        .map(|(i, f)| IndexedPoint::new([f.position.x, f.position.y], i))
        .collect(),
    );
    Self {
      features,
      distance,
      index,
    }
  }

  #[must_use]
  pub fn from_aggregates(aggregates: &[ClusterAggregate]) -> Self {
    Self::new(
      aggregates.iter().map(PointFeature::from).collect(),
      CLUSTER_DISTANCE,
    )
  }

  #[must_use]
  pub fn features(&self) -> &[PointFeature] {
    &self.features
  }

  #[must_use]
  pub fn distance(&self) -> f32 {
    self.distance
  }

  /// Groups features for a view with `resolution` map units per screen pixel.
  ///
  /// Features are visited in insertion order. Each unclustered feature collects every
  /// other unclustered feature within `distance` pixels on both axes.
  #[must_use]
  #[allow(clippy::cast_precision_loss)]
  pub fn clusters(&self, resolution: f32) -> Vec<Cluster> {
    let map_distance = self.distance * resolution;
    let mut clustered = vec![false; self.features.len()];
    let mut clusters = Vec::new();

    for (i, feature) in self.features.iter().enumerate() {
      if clustered[i] {
        continue;
      }
      let extent = BoundingBox::around(feature.position, map_distance);
      let mut members: Vec<usize> = self
        .index
        .locate_in_envelope(&AABB::from_corners(extent.min(), extent.max()))
        .map(|p| p.data)
        .filter(|&j| !clustered[j])
        .collect();
      members.sort_unstable();
      for &j in &members {
        clustered[j] = true;
      }

      let n = members.len() as f32;
      let (sx, sy) = members.iter().fold((0., 0.), |(sx, sy), &j| {
        let p = self.features[j].position;
        (sx + p.x, sy + p.y)
      });
      let size = members.iter().map(|&j| self.features[j].count).sum();
      clusters.push(Cluster {
        center: PixelCoordinate::new(sx / n, sy / n),
        members,
        size,
      });
    }

    clusters
  }
}
