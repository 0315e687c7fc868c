use std::marker::PhantomData;

use super::XY;

/// A strongly typed similarity transform (uniform scale plus translation) between two
/// coordinate spaces, usually ``PixelCoordinate`` (map) to ``PixelPosition`` (screen).
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct TTransform<F: XY, T: XY> {
  pub zoom: f32,
  pub trans: T,
  phantom_data: PhantomData<F>,
}

impl<F: XY, T: XY> Default for TTransform<F, T> {
  fn default() -> Self {
    Self {
      zoom: 1.,
      trans: T::default(),
      phantom_data: PhantomData,
    }
  }
}

/// Keeps conversions between unrelated coordinate types inside this module.
pub trait PrivateInto<T> {
  fn conv(self) -> T;
}

impl<F: XY, T: XY> PrivateInto<T> for F {
  fn conv(self) -> T {
    T::default().with_x(self.x()).with_y(self.y())
  }
}

impl<F: XY, T: XY> TTransform<F, T>
where
  F: PrivateInto<T>,
  T: PrivateInto<F>,
{
  /// A transform with the given scale that maps `anchor` onto `target`.
  #[must_use]
  pub fn anchored(zoom: f32, anchor: F, target: T) -> Self {
    let mut transform = Self {
      zoom,
      trans: T::default(),
      phantom_data: PhantomData,
    };
    let current = transform.apply(anchor);
    transform.translate(current * (-1.) + target);
    transform
  }

  /// Multiplies the scale, keeping `fixed` at the same target position.
  pub fn zoom_around(&mut self, factor: f32, fixed: T) -> &mut Self {
    let anchor = self.invert().apply(fixed);
    *self = Self::anchored(self.zoom * factor, anchor, fixed);
    self
  }

  pub fn translate(&mut self, delta: T) -> &mut Self {
    self.trans += delta;
    self
  }

  #[must_use]
  pub fn invert(self) -> TTransform<T, F> {
    TTransform {
      zoom: 1. / self.zoom,
      trans: self.trans.conv() * (-1. / self.zoom),
      phantom_data: PhantomData,
    }
  }

  pub fn apply(&self, from: F) -> T {
    (from * self.zoom).conv() + self.trans
  }
}
