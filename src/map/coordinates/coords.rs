use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

use super::Coordinate;

/// Width and height of the working projection in ``PixelCoordinate`` units.
pub const WORLD_SIZE: f32 = 2048.;
/// Screen size of a tile at integer zoom levels.
pub const TILE_SIZE: f32 = 256.;
/// Web Mercator stops being useful beyond this latitude.
pub const MAX_LATITUDE: f32 = 85.051_13;

const PI: f32 = std::f32::consts::PI;

pub trait XY:
  Default + Copy + Clone + AddAssign<Self> + Mul<f32, Output = Self> + Add<Self, Output = Self>
{
  fn x(&self) -> f32;
  fn y(&self) -> f32;
  #[must_use]
  fn with_x(self, x: f32) -> Self;
  #[must_use]
  fn with_y(self, y: f32) -> Self;
}

/// Screen pixels per ``PixelCoordinate`` unit at a (fractional) zoom level.
#[must_use]
pub fn scale_for_zoom(zoom: f32) -> f32 {
  2f32.powf(zoom) * TILE_SIZE / WORLD_SIZE
}

/// The standard WGS84 coordinate system.
#[derive(Debug, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct WGS84Coordinate {
  #[serde(alias = "latitude")]
  pub lat: f32,
  #[serde(alias = "longitude")]
  pub lon: f32,
}

impl WGS84Coordinate {
  #[must_use]
  pub fn new(lat: f32, lon: f32) -> Self {
    Self { lat, lon }
  }

  #[must_use]
  pub fn is_valid(&self) -> bool {
    (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
  }
}

/// The working projection: Web Mercator scaled to a fixed ``WORLD_SIZE`` canvas.
/// `(0, 0)` is the north-west corner of the world.
#[derive(Debug, Default, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct PixelCoordinate {
  pub x: f32,
  pub y: f32,
}

impl PixelCoordinate {
  #[must_use]
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  #[must_use]
  pub fn sq_dist(&self, p: &Self) -> f32 {
    let dx = p.x - self.x;
    let dy = p.y - self.y;
    dx * dx + dy * dy
  }
}

impl From<WGS84Coordinate> for PixelCoordinate {
  fn from(coord: WGS84Coordinate) -> Self {
    let lat = coord.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (coord.lon + 180.) / 360. * WORLD_SIZE;
    let y = (1. - (lat.tan() + 1. / lat.cos()).ln() / PI) / 2. * WORLD_SIZE;
    Self { x, y }
  }
}

impl From<PixelCoordinate> for WGS84Coordinate {
  fn from(pc: PixelCoordinate) -> Self {
    let n = PI - 2. * PI * pc.y / WORLD_SIZE;
    WGS84Coordinate {
      lat: n.sinh().atan().to_degrees(),
      lon: pc.x / WORLD_SIZE * 360. - 180.,
    }
  }
}

impl Coordinate for PixelCoordinate {
  fn as_wgs84(&self) -> WGS84Coordinate {
    WGS84Coordinate::from(*self)
  }

  fn as_pixel_coordinate(&self) -> PixelCoordinate {
    *self
  }
}

impl AddAssign for PixelCoordinate {
  fn add_assign(&mut self, other: Self) {
    self.x += other.x;
    self.y += other.y;
  }
}

impl Add for PixelCoordinate {
  type Output = Self;

  fn add(self, rhs: Self) -> Self {
    Self {
      x: self.x + rhs.x,
      y: self.y + rhs.y,
    }
  }
}

impl Mul<f32> for PixelCoordinate {
  type Output = Self;

  fn mul(self, rhs: f32) -> Self {
    Self {
      x: self.x * rhs,
      y: self.y * rhs,
    }
  }
}

/// A pixel on screen, relative to the top-left corner of the map viewport.
#[derive(Debug, Default, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct PixelPosition {
  pub x: f32,
  pub y: f32,
}

impl PixelPosition {
  #[must_use]
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

impl Mul<f32> for PixelPosition {
  type Output = Self;

  fn mul(self, rhs: f32) -> Self {
    Self {
      x: self.x * rhs,
      y: self.y * rhs,
    }
  }
}

impl Add for PixelPosition {
  type Output = Self;

  fn add(self, rhs: PixelPosition) -> Self {
    Self {
      x: self.x + rhs.x,
      y: self.y + rhs.y,
    }
  }
}

impl Sub for PixelPosition {
  type Output = Self;

  fn sub(self, rhs: PixelPosition) -> Self {
    Self {
      x: self.x - rhs.x,
      y: self.y - rhs.y,
    }
  }
}

impl AddAssign for PixelPosition {
  fn add_assign(&mut self, other: Self) {
    self.x += other.x;
    self.y += other.y;
  }
}

impl From<egui::Pos2> for PixelPosition {
  fn from(pos: egui::Pos2) -> Self {
    PixelPosition { x: pos.x, y: pos.y }
  }
}

impl From<PixelPosition> for egui::Pos2 {
  fn from(pp: PixelPosition) -> Self {
    egui::Pos2::new(pp.x, pp.y)
  }
}

impl XY for PixelCoordinate {
  fn x(&self) -> f32 {
    self.x
  }

  fn y(&self) -> f32 {
    self.y
  }

  fn with_x(mut self, x: f32) -> Self {
    self.x = x;
    self
  }

  fn with_y(mut self, y: f32) -> Self {
    self.y = y;
    self
  }
}

impl XY for PixelPosition {
  fn x(&self) -> f32 {
    self.x
  }

  fn y(&self) -> f32 {
    self.y
  }

  fn with_x(mut self, x: f32) -> Self {
    self.x = x;
    self
  }

  fn with_y(mut self, y: f32) -> Self {
    self.y = y;
    self
  }
}
