use super::{Coordinate, PixelCoordinate};

/// Axis aligned extent in the working projection. Starts out invalid (empty).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  max_x: f32,
  min_x: f32,
  max_y: f32,
  min_y: f32,
}

impl Default for BoundingBox {
  fn default() -> Self {
    Self::new()
  }
}

impl BoundingBox {
  #[must_use]
  pub fn new() -> Self {
    Self {
      max_x: f32::MIN,
      min_x: f32::MAX,
      max_y: f32::MIN,
      min_y: f32::MAX,
    }
  }

  /// The square of half-width `radius` around `center`.
  #[must_use]
  pub fn around(center: PixelCoordinate, radius: f32) -> Self {
    let mut bb = Self::new();
    bb.add_coordinate(center);
    bb.frame(radius);
    bb
  }

  pub fn from_iterator<C: Coordinate, I: IntoIterator<Item = C>>(positions: I) -> Self {
    let mut bb = Self::new();
    positions
      .into_iter()
      .for_each(|pos| bb.add_coordinate(pos.as_pixel_coordinate()));
    bb
  }

  #[must_use]
  pub fn is_valid(&self) -> bool {
    self.min_y <= self.max_y && self.min_x <= self.max_x
  }

  #[must_use]
  pub fn center(&self) -> PixelCoordinate {
    PixelCoordinate {
      x: f32::midpoint(self.max_x, self.min_x),
      y: f32::midpoint(self.max_y, self.min_y),
    }
  }

  pub fn frame(&mut self, frame: f32) {
    self.min_x -= frame;
    self.min_y -= frame;
    self.max_x += frame;
    self.max_y += frame;
  }

  pub fn add_coordinate(&mut self, pp: PixelCoordinate) {
    self.min_y = self.min_y.min(pp.y);
    self.min_x = self.min_x.min(pp.x);
    self.max_y = self.max_y.max(pp.y);
    self.max_x = self.max_x.max(pp.x);
  }

  #[must_use]
  pub fn contains(&self, pp: PixelCoordinate) -> bool {
    self.is_valid()
      && (self.min_x..=self.max_x).contains(&pp.x)
      && (self.min_y..=self.max_y).contains(&pp.y)
  }

  #[must_use]
  pub fn min(&self) -> [f32; 2] {
    [self.min_x, self.min_y]
  }

  #[must_use]
  pub fn max(&self) -> [f32; 2] {
    [self.max_x, self.max_y]
  }

  #[must_use]
  pub fn width(&self) -> f32 {
    self.max_x - self.min_x
  }

  #[must_use]
  pub fn height(&self) -> f32 {
    self.max_y - self.min_y
  }
}
