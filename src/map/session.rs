use std::{
  collections::HashMap,
  sync::atomic::{AtomicU64, Ordering},
  time::Instant,
};

use log::debug;

use super::{
  coordinates::{PixelCoordinate, PixelPosition, Transform, WGS84Coordinate, scale_for_zoom},
  feedback::FeedbackMarker,
  layer::{LayerId, MapLayer},
  map_event::{Fired, KeyCommand, ListenerKind, MapEvent},
};

pub const MIN_ZOOM: f32 = 1.;
pub const MAX_ZOOM: f32 = 20.;
const KEY_PAN_PIXELS: f32 = 10.;
const KEY_ZOOM_FACTOR: f32 = 1. / 0.9;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Size of the mount point in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
  pub width: f32,
  pub height: f32,
}

impl Viewport {
  #[must_use]
  pub fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }

  #[must_use]
  pub fn center(&self) -> PixelPosition {
    PixelPosition::new(self.width / 2., self.height / 2.)
  }
}

impl Default for Viewport {
  fn default() -> Self {
    Self::new(800., 600.)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
  Zoom,
  Rotate,
  Attribution,
  ScaleLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
  DragPan,
  MouseWheelZoom,
  DoubleClickZoom,
  KeyboardPan,
}

const DEFAULT_CONTROLS: [Control; 4] = [
  Control::Zoom,
  Control::Rotate,
  Control::Attribution,
  Control::ScaleLine,
];

const DEFAULT_INTERACTIONS: [Interaction; 4] = [
  Interaction::DragPan,
  Interaction::MouseWheelZoom,
  Interaction::DoubleClickZoom,
  Interaction::KeyboardPan,
];

/// Everything needed to construct a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
  pub center: WGS84Coordinate,
  pub zoom: f32,
  pub frozen: bool,
  pub viewport: Viewport,
}

#[derive(Debug, Clone, Copy)]
struct Listener {
  id: ListenerId,
  kind: ListenerKind,
  once: bool,
}

/// Summary handed to the host when a session becomes ready.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
  pub id: SessionId,
  pub center: WGS84Coordinate,
  pub zoom: f32,
  pub frozen: bool,
  pub layer_names: Vec<String>,
}

/// The live map surface: view, ordered layers, controls, interactions and listeners.
pub struct MapSession {
  id: SessionId,
  zoom: f32,
  frozen: bool,
  viewport: Viewport,
  transform: Transform,
  layers: Vec<MapLayer>,
  roles: HashMap<String, LayerId>,
  controls: Vec<Control>,
  interactions: Vec<Interaction>,
  listeners: Vec<Listener>,
  feedback: Vec<FeedbackMarker>,
  next_id: u64,
  disposed: bool,
}

impl MapSession {
  #[must_use]
  pub fn new(settings: SessionSettings) -> Self {
    let zoom = settings.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    let transform = Transform::anchored(
      scale_for_zoom(zoom),
      settings.center.into(),
      settings.viewport.center(),
    );
    let (controls, interactions) = if settings.frozen {
      (Vec::new(), Vec::new())
    } else {
      (DEFAULT_CONTROLS.to_vec(), DEFAULT_INTERACTIONS.to_vec())
    };

    let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
    debug!("Creating map session {id:?} at {:?}, zoom {zoom}", settings.center);
    Self {
      id,
      zoom,
      frozen: settings.frozen,
      viewport: settings.viewport,
      transform,
      layers: Vec::new(),
      roles: HashMap::new(),
      controls,
      interactions,
      listeners: Vec::new(),
      feedback: Vec::new(),
      next_id: 1,
      disposed: false,
    }
  }

  #[must_use]
  pub fn id(&self) -> SessionId {
    self.id
  }

  #[must_use]
  pub fn info(&self) -> SessionInfo {
    SessionInfo {
      id: self.id,
      center: self.center(),
      zoom: self.zoom,
      frozen: self.frozen,
      layer_names: self.layers.iter().map(|l| l.name().to_string()).collect(),
    }
  }

  #[must_use]
  pub fn zoom(&self) -> f32 {
    self.zoom
  }

  #[must_use]
  pub fn center(&self) -> WGS84Coordinate {
    self.to_map(self.viewport.center()).into()
  }

  #[must_use]
  pub fn viewport(&self) -> Viewport {
    self.viewport
  }

  #[must_use]
  pub fn transform(&self) -> &Transform {
    &self.transform
  }

  /// Map units per screen pixel.
  #[must_use]
  pub fn resolution(&self) -> f32 {
    1. / self.transform.zoom
  }

  /// Changes the viewport size, keeping the center.
  pub fn resize(&mut self, viewport: Viewport) {
    let center = self.to_map(self.viewport.center());
    self.viewport = viewport;
    self.transform = Transform::anchored(self.transform.zoom, center, viewport.center());
  }

  #[must_use]
  pub fn to_map(&self, pos: PixelPosition) -> PixelCoordinate {
    self.transform.invert().apply(pos)
  }

  #[must_use]
  pub fn to_wgs84(&self, pos: PixelPosition) -> WGS84Coordinate {
    self.to_map(pos).into()
  }

  #[must_use]
  pub fn to_screen(&self, pc: PixelCoordinate) -> PixelPosition {
    self.transform.apply(pc)
  }

  fn next_id(&mut self) -> u64 {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  #[must_use]
  pub fn layers(&self) -> &[MapLayer] {
    &self.layers
  }

  pub fn layers_mut(&mut self) -> impl Iterator<Item = &mut MapLayer> {
    self.layers.iter_mut()
  }

  #[must_use]
  pub fn layer(&self, id: LayerId) -> Option<&MapLayer> {
    self.layers.iter().find(|l| l.id == id)
  }

  pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut MapLayer> {
    self.layers.iter_mut().find(|l| l.id == id)
  }

  /// Registered role layers are found directly; other layers by their first occurrence.
  #[must_use]
  pub fn layer_by_name(&self, name: &str) -> Option<&MapLayer> {
    match self.roles.get(name) {
      Some(id) => self.layer(*id),
      None => self.layers.iter().find(|l| l.name() == name),
    }
  }

  #[must_use]
  pub fn is_layer_visible(&self, name: &str) -> bool {
    self.layer_by_name(name).is_some_and(MapLayer::visible)
  }

  /// Sets visibility of every layer called `name`. Returns whether any matched.
  pub fn set_layer_visible(&mut self, name: &str, visible: bool) -> bool {
    let mut found = false;
    for layer in self.layers.iter_mut().filter(|l| l.name() == name) {
      layer.set_visible(visible);
      found = true;
    }
    found
  }

  /// Appends a layer on top of the stack.
  pub fn add_layer(&mut self, mut layer: MapLayer) -> LayerId {
    layer.id = LayerId(self.next_id());
    let id = layer.id;
    self.layers.push(layer);
    id
  }

  /// Adds a layer that owns a logical role, removing any live layer with that role first.
  pub fn replace_named_layer(&mut self, layer: MapLayer) -> LayerId {
    let name = layer.name().to_string();
    if let Some(previous) = self.roles.get(&name).copied() {
      debug!("Replacing layer '{name}'");
      self.remove_layer(previous);
    }
    let id = self.add_layer(layer);
    self.roles.insert(name, id);
    id
  }

  pub fn remove_layer(&mut self, id: LayerId) -> Option<MapLayer> {
    let idx = self.layers.iter().position(|l| l.id == id)?;
    self.roles.retain(|_, role_id| *role_id != id);
    Some(self.layers.remove(idx))
  }

  pub fn on(&mut self, kind: ListenerKind) -> ListenerId {
    self.register(kind, false)
  }

  /// Registers a listener that is removed the first time it fires.
  pub fn once(&mut self, kind: ListenerKind) -> ListenerId {
    self.register(kind, true)
  }

  fn register(&mut self, kind: ListenerKind, once: bool) -> ListenerId {
    let id = ListenerId(self.next_id());
    self.listeners.push(Listener { id, kind, once });
    id
  }

  pub fn un(&mut self, id: ListenerId) -> bool {
    let before = self.listeners.len();
    self.listeners.retain(|l| l.id != id);
    before != self.listeners.len()
  }

  #[must_use]
  pub fn listener_count(&self, kind: ListenerKind) -> usize {
    self.listeners.iter().filter(|l| l.kind == kind).count()
  }

  #[must_use]
  pub fn controls(&self) -> &[Control] {
    &self.controls
  }

  #[must_use]
  pub fn interactions(&self) -> &[Interaction] {
    &self.interactions
  }

  fn has_interaction(&self, interaction: Interaction) -> bool {
    self.interactions.contains(&interaction)
  }

  /// Runs an event through the registered listeners and interactions.
  pub fn dispatch(&mut self, event: &MapEvent, now: Instant) -> Vec<Fired> {
    if self.disposed {
      return Vec::new();
    }

    match *event {
      MapEvent::PointerMove(pos) => self.fire(ListenerKind::PointerMove, Fired::PointerMove(pos)),
      MapEvent::Click(pos) => {
        let mut fired = self.fire(ListenerKind::ClickFeedback, Fired::ClickFeedback(pos));
        if !fired.is_empty() {
          self.feedback.push(FeedbackMarker::new(self.to_map(pos), now));
        }
        fired.extend(self.fire(ListenerKind::Identify, Fired::Identify(pos)));
        fired
      }
      MapEvent::DoubleClick(pos) => {
        if self.has_interaction(Interaction::DoubleClickZoom) {
          self.zoom_by(2., pos);
        }
        Vec::new()
      }
      MapEvent::Drag(delta) => {
        if self.has_interaction(Interaction::DragPan) {
          self.transform.translate(delta);
        }
        Vec::new()
      }
      MapEvent::Zoom { factor, around } => {
        if self.has_interaction(Interaction::MouseWheelZoom) {
          self.zoom_by(factor, around);
        }
        Vec::new()
      }
      MapEvent::Key(command) => {
        if self.has_interaction(Interaction::KeyboardPan) {
          self.handle_key(command);
        }
        Vec::new()
      }
    }
  }

  fn fire(&mut self, kind: ListenerKind, fired: Fired) -> Vec<Fired> {
    let matching = self.listener_count(kind);
    self.listeners.retain(|l| !(l.kind == kind && l.once));
    vec![fired; matching]
  }

  fn zoom_by(&mut self, factor: f32, around: PixelPosition) {
    let target = (self.zoom + factor.log2()).clamp(MIN_ZOOM, MAX_ZOOM);
    let factor = 2f32.powf(target - self.zoom);
    self.zoom = target;
    self.transform.zoom_around(factor, around);
  }

  fn handle_key(&mut self, command: KeyCommand) {
    let center = self.viewport.center();
    match command {
      KeyCommand::PanLeft => {
        self.transform.translate(PixelPosition::new(KEY_PAN_PIXELS, 0.));
      }
      KeyCommand::PanRight => {
        self.transform.translate(PixelPosition::new(-KEY_PAN_PIXELS, 0.));
      }
      KeyCommand::PanUp => {
        self.transform.translate(PixelPosition::new(0., KEY_PAN_PIXELS));
      }
      KeyCommand::PanDown => {
        self.transform.translate(PixelPosition::new(0., -KEY_PAN_PIXELS));
      }
      KeyCommand::ZoomIn => self.zoom_by(KEY_ZOOM_FACTOR, center),
      KeyCommand::ZoomOut => self.zoom_by(1. / KEY_ZOOM_FACTOR, center),
    }
  }

  #[must_use]
  pub fn feedback_markers(&self) -> &[FeedbackMarker] {
    &self.feedback
  }

  pub fn prune_feedback(&mut self, now: Instant) {
    self.feedback.retain(|m| !m.is_expired(now));
  }

  #[must_use]
  pub fn is_disposed(&self) -> bool {
    self.disposed
  }

  /// Detaches listeners, removes controls and interactions and releases all layers.
  pub fn dispose(&mut self) {
    debug!(
      "Disposing map session {:?} ({} listeners, {} layers)",
      self.id,
      self.listeners.len(),
      self.layers.len()
    );
    self.listeners.clear();
    self.controls.clear();
    self.interactions.clear();
    self.layers.clear();
    self.roles.clear();
    self.feedback.clear();
    self.disposed = true;
  }
}
