use geo::Contains as _;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use thiserror::Error;

use super::coordinates::{BoundingBox, PixelCoordinate, WGS84Coordinate};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GeometryError {
  #[error("Boundary payload is not valid JSON: {0}")]
  InvalidJson(String),
  #[error("GeoJSON must be an object")]
  NotAnObject,
  #[error("Missing 'type' field for GeoJSON")]
  MissingType,
  #[error("Unsupported GeoJSON type for a boundary: {0}")]
  UnsupportedType(String),
  #[error("Boundary contains no polygon with at least three positions")]
  Empty,
}

/// A boundary multi-polygon, reprojected into the working projection.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryGeometry {
  polygons: MultiPolygon<f32>,
  bbox: BoundingBox,
}

impl BoundaryGeometry {
  /// Parses GeoJSON text (a `Polygon`, `MultiPolygon`, `Feature` or `FeatureCollection`)
  /// with lon/lat positions and reprojects it.
  pub fn from_geojson(text: &str) -> Result<Self, GeometryError> {
    let value: Value =
      serde_json::from_str(text).map_err(|e| GeometryError::InvalidJson(e.to_string()))?;
    let lonlat = parse_multipolygon(&value)?;
    Self::from_wgs84(&lonlat)
  }

  /// Reprojects a lon/lat multi-polygon (x = longitude, y = latitude).
  pub fn from_wgs84(lonlat: &MultiPolygon<f32>) -> Result<Self, GeometryError> {
    let polygons: Vec<Polygon<f32>> = lonlat
      .iter()
      .filter(|p| p.exterior().0.len() >= 3)
      .map(|p| {
        Polygon::new(
          reproject_ring(p.exterior()),
          p.interiors().iter().map(reproject_ring).collect(),
        )
      })
      .collect();
    if polygons.is_empty() {
      return Err(GeometryError::Empty);
    }

    let bbox = BoundingBox::from_iterator(
      polygons
        .iter()
        .flat_map(|p| p.exterior().coords())
        .map(|c| PixelCoordinate::new(c.x, c.y)),
    );

    Ok(Self {
      polygons: MultiPolygon::new(polygons),
      bbox,
    })
  }

  #[must_use]
  pub fn polygons(&self) -> &MultiPolygon<f32> {
    &self.polygons
  }

  #[must_use]
  pub fn bounding_box(&self) -> BoundingBox {
    self.bbox
  }

  /// Inside an exterior ring and outside all of its holes.
  #[must_use]
  pub fn contains(&self, pc: PixelCoordinate) -> bool {
    self.bbox.contains(pc) && self.polygons.contains(&Coord { x: pc.x, y: pc.y })
  }

  /// Exterior rings as projected coordinates, for drawing outlines.
  pub fn exterior_rings(&self) -> impl Iterator<Item = Vec<PixelCoordinate>> + '_ {
    self.polygons.iter().map(|p| {
      p.exterior()
        .coords()
        .map(|c| PixelCoordinate::new(c.x, c.y))
        .collect()
    })
  }
}

fn reproject_ring(ring: &LineString<f32>) -> LineString<f32> {
  ring
    .coords()
    .map(|c| {
      let pc = PixelCoordinate::from(WGS84Coordinate::new(c.y, c.x));
      Coord { x: pc.x, y: pc.y }
    })
    .collect()
}

/// Extracts every polygon of a GeoJSON document into one lon/lat multi-polygon.
pub fn parse_multipolygon(value: &Value) -> Result<MultiPolygon<f32>, GeometryError> {
  let obj = value.as_object().ok_or(GeometryError::NotAnObject)?;
  let geotype = obj
    .get("type")
    .and_then(Value::as_str)
    .ok_or(GeometryError::MissingType)?;

  let polygons = match geotype {
    "FeatureCollection" => obj
      .get("features")
      .and_then(Value::as_array)
      .map(|features| {
        features
          .iter()
          .filter_map(|f| {
            parse_multipolygon(f)
              .inspect_err(|e| log::debug!("Skipping boundary feature: {e}"))
              .ok()
          })
          .flat_map(|mp| mp.0)
          .collect()
      })
      .unwrap_or_default(),
    "Feature" => {
      let geometry = obj.get("geometry").ok_or(GeometryError::Empty)?;
      if geometry.is_null() {
        return Err(GeometryError::Empty);
      }
      parse_multipolygon(geometry)?.0
    }
    "Polygon" => obj
      .get("coordinates")
      .and_then(parse_polygon)
      .into_iter()
      .collect(),
    "MultiPolygon" => obj
      .get("coordinates")
      .and_then(Value::as_array)
      .map(|polys| polys.iter().filter_map(parse_polygon).collect())
      .unwrap_or_default(),
    other => return Err(GeometryError::UnsupportedType(other.to_string())),
  };

  if polygons.is_empty() {
    Err(GeometryError::Empty)
  } else {
    Ok(MultiPolygon::new(polygons))
  }
}

/// A polygon whose exterior ring is unusable is dropped as a whole. Unusable holes are skipped.
fn parse_polygon(rings: &Value) -> Option<Polygon<f32>> {
  let mut rings = rings.as_array()?.iter();
  let exterior = parse_ring(rings.next()?)?;
  Some(Polygon::new(exterior, rings.filter_map(parse_ring).collect()))
}

#[allow(clippy::cast_possible_truncation)]
fn parse_ring(ring: &Value) -> Option<LineString<f32>> {
  let coords: Vec<Coord<f32>> = ring
    .as_array()?
    .iter()
    .filter_map(|position| {
      let position = position.as_array()?;
      let x = position.first()?.as_f64()? as f32;
      let y = position.get(1)?.as_f64()? as f32;
      Some(Coord { x, y })
    })
    .collect();
  (coords.len() >= 3).then(|| LineString::new(coords))
}

/// Well-known-text encoding of a point, longitude first.
#[must_use]
pub fn point_wkt(coord: WGS84Coordinate) -> String {
  format!("POINT ({} {})", coord.lon, coord.lat)
}
