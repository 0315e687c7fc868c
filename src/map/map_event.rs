use serde::{Deserialize, Serialize};

use super::coordinates::PixelPosition;

/// Input forwarded by the host surface to the map, in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MapEvent {
  PointerMove(PixelPosition),
  Click(PixelPosition),
  DoubleClick(PixelPosition),
  /// Pan by a screen delta.
  Drag(PixelPosition),
  /// Scale the view by `factor`, keeping `around` fixed.
  Zoom { factor: f32, around: PixelPosition },
  /// Pan or zoom triggered from the keyboard.
  Key(KeyCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyCommand {
  PanLeft,
  PanRight,
  PanUp,
  PanDown,
  ZoomIn,
  ZoomOut,
}

/// What the session registered a listener for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
  PointerMove,
  /// The permanent click feedback handler.
  ClickFeedback,
  /// The one-shot identify handler.
  Identify,
}

/// A listener that fired for an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fired {
  PointerMove(PixelPosition),
  ClickFeedback(PixelPosition),
  Identify(PixelPosition),
}
