use std::{f32::consts::TAU, time::Instant};

use egui::{
  Color32, InputState, PointerButton, Pos2, Rect, Response, Sense, Shape, Stroke, Ui, Widget,
  epaint::{CircleShape, PathShape, PathStroke},
};
use log::debug;

use super::{
  coordinates::{PixelCoordinate, PixelPosition},
  feedback::FeedbackMarker,
  layer::LayerContent,
  map_event::{KeyCommand, MapEvent},
  orchestrator::MapOrchestrator,
  session::MapSession,
  style::ClusterStyle,
};

const RING_POINTS: usize = 48;
const FEEDBACK_COLOR: Color32 = Color32::from_rgb(0, 153, 255);

/// Draws the live session and forwards input to the orchestrator.
pub struct MapView {
  map: MapOrchestrator,
  last_pointer: Option<Pos2>,
}

impl MapView {
  #[must_use]
  pub fn new(map: MapOrchestrator) -> Self {
    Self {
      map,
      last_pointer: None,
    }
  }

  #[must_use]
  pub fn map(&self) -> &MapOrchestrator {
    &self.map
  }

  fn collect_events(&mut self, ui: &Ui, response: &Response, rect: Rect) -> Vec<MapEvent> {
    let local = |p: Pos2| PixelPosition::from(p - rect.min.to_vec2());
    let mut events = Vec::new();

    let hover = response.hover_pos();
    if hover != self.last_pointer {
      if let Some(pos) = hover {
        events.push(MapEvent::PointerMove(local(pos)));
      }
      self.last_pointer = hover;
    }

    if let Some(pos) = response.interact_pointer_pos().or(hover) {
      if response.double_clicked() {
        events.push(MapEvent::DoubleClick(local(pos)));
      } else if response.clicked() {
        events.push(MapEvent::Click(local(pos)));
      }
    }

    if response.dragged_by(PointerButton::Primary) {
      let delta = response.drag_delta();
      events.push(MapEvent::Drag(PixelPosition::new(delta.x, delta.y)));
    }

    if response.hovered() {
      let wheel = ui.input(|i| {
        i.events.iter().find_map(|e| match e {
          egui::Event::MouseWheel { delta, .. } => Some(*delta),
          _ => None,
        })
      });
      if let (Some(delta), Some(pos)) = (wheel, hover) {
        let factor = (delta.y + 1.).clamp(0.8, 1.4).sqrt();
        events.push(MapEvent::Zoom {
          factor,
          around: local(pos),
        });
      }

      ui.input(|i: &InputState| {
        for event in &i.events {
          if let egui::Event::Key {
            key, pressed: true, ..
          } = event
          {
            let command = match key {
              egui::Key::ArrowLeft => KeyCommand::PanLeft,
              egui::Key::ArrowRight => KeyCommand::PanRight,
              egui::Key::ArrowUp => KeyCommand::PanUp,
              egui::Key::ArrowDown => KeyCommand::PanDown,
              egui::Key::Plus | egui::Key::Equals => KeyCommand::ZoomIn,
              egui::Key::Minus => KeyCommand::ZoomOut,
              _ => continue,
            };
            events.push(MapEvent::Key(command));
          }
        }
      });
    }
    events
  }
}

impl Widget for &mut MapView {
  fn ui(self, ui: &mut Ui) -> Response {
    let size = ui.available_size();
    let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());
    self.map.resize(rect.width(), rect.height());

    for event in self.collect_events(ui, &response, rect) {
      if let Some(pending) = self.map.dispatch(event) {
        debug!("Identify click at {:?}", pending.location);
        let map = self.map.clone();
        let ctx = ui.ctx().clone();
        tokio::spawn(async move {
          map.resolve_identify(pending).await;
          ctx.request_repaint();
        });
      }
    }

    let now = Instant::now();
    self.map.prune_feedback(now);
    if ui.is_rect_visible(rect) {
      let painter = ui.painter_at(rect);
      painter.rect_filled(rect, egui::CornerRadius::ZERO, ui.visuals().extreme_bg_color);
      let animating = self
        .map
        .with_session(|session| paint_session(&painter, session, rect, now))
        .unwrap_or(false);
      if animating {
        ui.ctx().request_repaint();
      }
    }
    response
  }
}

fn to_screen(session: &MapSession, rect: Rect, pc: PixelCoordinate) -> Pos2 {
  Pos2::from(session.to_screen(pc)) + rect.min.to_vec2()
}

/// Paints outlines, clusters and click feedback. Returns whether an animation is running.
fn paint_session(painter: &egui::Painter, session: &MapSession, rect: Rect, now: Instant) -> bool {
  for layer in session.layers().iter().filter(|l| l.visible()) {
    match layer.content() {
      LayerContent::Outline {
        geometry: Some(geometry),
        style,
      } => {
        for ring in geometry.exterior_rings() {
          painter.add(Shape::Path(PathShape {
            points: ring.iter().map(|c| to_screen(session, rect, *c)).collect(),
            closed: true,
            fill: style.fill,
            stroke: PathStroke::new(style.stroke_width, style.stroke),
          }));
        }
      }
      LayerContent::Cluster(source) => {
        for cluster in source.clusters(session.resolution()) {
          if !layer.renders(cluster.center) {
            continue;
          }
          paint_cluster(painter, to_screen(session, rect, cluster.center), &cluster.style());
        }
      }
      _ => {}
    }
  }

  let markers = session.feedback_markers();
  for marker in markers {
    paint_feedback(painter, to_screen(session, rect, marker.position), marker, now);
  }
  !markers.is_empty()
}

fn paint_cluster(painter: &egui::Painter, center: Pos2, style: &ClusterStyle) {
  painter.add(Shape::Circle(CircleShape {
    center,
    radius: style.radius,
    fill: style.fill,
    stroke: Stroke::NONE,
  }));

  #[allow(clippy::cast_precision_loss)]
  let ring: Vec<Pos2> = (0..=RING_POINTS)
    .map(|i| {
      let angle = TAU * i as f32 / RING_POINTS as f32;
      center + style.radius * egui::vec2(angle.cos(), angle.sin())
    })
    .collect();
  let (dashes, gaps) = dash_pattern(&style.line_dash);
  painter.extend(Shape::dashed_line_with_offset(
    &ring,
    Stroke::new(style.ring_width, Color32::WHITE),
    &dashes,
    &gaps,
    0.,
  ));

  painter.text(
    center,
    egui::Align2::CENTER_CENTER,
    &style.label,
    egui::FontId::proportional(12.),
    style.label_color,
  );
}

/// Splits an alternating dash/gap array into dash and gap lengths. Odd arrays repeat once.
fn dash_pattern(line_dash: &[f32]) -> (Vec<f32>, Vec<f32>) {
  let pattern: Vec<f32> = if line_dash.len() % 2 == 1 {
    line_dash.iter().chain(line_dash).copied().collect()
  } else {
    line_dash.to_vec()
  };
  let dashes = pattern.iter().step_by(2).copied().collect();
  let gaps = pattern.iter().skip(1).step_by(2).copied().collect();
  (dashes, gaps)
}

fn paint_feedback(painter: &egui::Painter, center: Pos2, marker: &FeedbackMarker, now: Instant) {
  painter.circle_stroke(
    center,
    marker.radius(now),
    Stroke::new(2., FEEDBACK_COLOR.gamma_multiply(marker.opacity(now))),
  );
}
