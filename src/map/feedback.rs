use std::time::{Duration, Instant};

use super::coordinates::PixelCoordinate;

pub const FEEDBACK_DURATION: Duration = Duration::from_millis(3000);
const START_RADIUS: f32 = 5.;
const END_RADIUS: f32 = 25.;

/// A transient marker played where the map was clicked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackMarker {
  pub position: PixelCoordinate,
  started: Instant,
}

impl FeedbackMarker {
  #[must_use]
  pub fn new(position: PixelCoordinate, started: Instant) -> Self {
    Self { position, started }
  }

  /// Linear progress in `[0, 1]`.
  #[must_use]
  pub fn progress(&self, now: Instant) -> f32 {
    let elapsed = now.saturating_duration_since(self.started);
    (elapsed.as_secs_f32() / FEEDBACK_DURATION.as_secs_f32()).clamp(0., 1.)
  }

  #[must_use]
  pub fn is_expired(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.started) >= FEEDBACK_DURATION
  }

  /// Ring radius in screen pixels, eased out.
  #[must_use]
  pub fn radius(&self, now: Instant) -> f32 {
    START_RADIUS + (END_RADIUS - START_RADIUS) * ease_out(self.progress(now))
  }

  #[must_use]
  pub fn opacity(&self, now: Instant) -> f32 {
    1. - self.progress(now)
  }
}

/// Cubic ease-out.
fn ease_out(t: f32) -> f32 {
  1. - (1. - t).powi(3)
}
