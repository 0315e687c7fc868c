mod boxes;
mod coords;
mod transform;

/// Bounding boxes.
pub use boxes::*;
/// Coordinates and the projection between them.
pub use coords::*;
use transform::TTransform;

/// Maps the working projection onto the screen.
pub type Transform = TTransform<PixelCoordinate, PixelPosition>;

/// A trait generalizing types of coordinates used in this application.
pub trait Coordinate: Copy + Clone + std::fmt::Debug {
  fn as_wgs84(&self) -> WGS84Coordinate;
  fn as_pixel_coordinate(&self) -> PixelCoordinate;
}

impl Coordinate for WGS84Coordinate {
  fn as_wgs84(&self) -> WGS84Coordinate {
    *self
  }

  fn as_pixel_coordinate(&self) -> PixelCoordinate {
    PixelCoordinate::from(*self)
  }
}
