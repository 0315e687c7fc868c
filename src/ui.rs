//! egui front end: the map view plus pointer location, legend, layer and identify panels.

use egui::{Widget as _, load::Bytes};

use crate::map::{
  identify::{IdentifyOutcome, IdentifyState},
  map_view::MapView,
  orchestrator::MapOrchestrator,
};

/// Shows the geographic position under the pointer.
pub struct PointerLocationPanel<'a> {
  map: &'a MapOrchestrator,
}

impl<'a> PointerLocationPanel<'a> {
  #[must_use]
  pub fn new(map: &'a MapOrchestrator) -> Self {
    Self { map }
  }

  pub fn ui(&self, ui: &mut egui::Ui) {
    ui.push_id(&self.map.options().panel_ids.pointer_location, |ui| {
      ui.horizontal(|ui| {
        ui.label("Pointer location");
        match self.map.pointer_location() {
          Some(location) => ui.monospace(location.to_string()),
          None => ui.weak("-"),
        };
      });
    });
  }
}

/// Legend thumbnails of the visible WMS layers.
pub struct LegendPanel<'a> {
  map: &'a MapOrchestrator,
}

impl<'a> LegendPanel<'a> {
  #[must_use]
  pub fn new(map: &'a MapOrchestrator) -> Self {
    Self { map }
  }

  pub fn ui(&self, ui: &mut egui::Ui) {
    ui.push_id(&self.map.options().panel_ids.legend, |ui| {
      ui.heading("Legend");
      let legend = self.map.legend();
      if legend.is_empty() {
        ui.weak("No legend for the visible layers");
      }
      for entry in legend {
        ui.label(entry.layer_name.as_str());
        #[allow(clippy::cast_precision_loss)]
        let size = egui::vec2(entry.image.width as f32, entry.image.height as f32);
        egui::Image::from_bytes(
          format!("bytes://legend/{}.png", entry.url),
          Bytes::Shared(entry.image.bytes.clone()),
        )
        .fit_to_exact_size(size)
        .ui(ui)
        .on_hover_text(entry.url.as_str());
      }
    });
  }
}

/// Arms the identify interaction and shows the last result.
pub struct IdentifyPanel<'a> {
  map: &'a MapOrchestrator,
}

impl<'a> IdentifyPanel<'a> {
  #[must_use]
  pub fn new(map: &'a MapOrchestrator) -> Self {
    Self { map }
  }

  pub fn ui(&self, ui: &mut egui::Ui) {
    let state = self.map.identify_state();
    ui.horizontal(|ui| {
      let button = ui.add_enabled(state == IdentifyState::Idle, egui::Button::new("Identify"));
      if button.clicked() {
        self.map.arm();
      }
      match state {
        IdentifyState::Idle => {}
        IdentifyState::Armed { .. } => {
          ui.label("Click on the map");
        }
        IdentifyState::Querying { .. } => {
          ui.spinner();
        }
      }
    });

    match self.map.last_outcome() {
      Some(IdentifyOutcome::Found(record)) => {
        egui::ScrollArea::vertical()
          .max_height(200.)
          .show(ui, |ui| {
            ui.monospace(serde_json::to_string_pretty(&record).unwrap_or_default());
          });
      }
      Some(IdentifyOutcome::NotFound) => {
        ui.weak("Nothing found at the clicked location");
      }
      Some(IdentifyOutcome::Error(message)) => {
        ui.colored_label(ui.visuals().error_fg_color, message);
      }
      None => {}
    }
  }
}

/// Toggles base layers. Every toggle rebuilds the session.
pub struct LayerPanel<'a> {
  map: &'a MapOrchestrator,
}

impl<'a> LayerPanel<'a> {
  #[must_use]
  pub fn new(map: &'a MapOrchestrator) -> Self {
    Self { map }
  }

  pub fn ui(&self, ui: &mut egui::Ui) {
    ui.heading("Layers");
    let Some(composition) = self.map.composition() else {
      ui.weak("Map is not mounted");
      return;
    };
    for spec in &composition.layers {
      let mut visible = spec.visible;
      if ui.checkbox(&mut visible, spec.name.as_str()).changed() {
        let map = self.map.clone();
        let ctx = ui.ctx().clone();
        let name = spec.name.clone();
        tokio::spawn(async move {
          map.set_layer_visible(&name, visible).await;
          ctx.request_repaint();
        });
      }
    }

    ui.separator();
    ui.horizontal(|ui| {
      if ui.button("Refresh clusters").clicked() {
        let map = self.map.clone();
        let ctx = ui.ctx().clone();
        tokio::spawn(async move {
          map.refresh().await;
          ctx.request_repaint();
        });
      }
      if ui
        .add_enabled(self.map.is_clipped(), egui::Button::new("Remove clip"))
        .clicked()
      {
        self.map.unclip();
      }
    });
  }
}

/// The viewer application.
pub struct OverlayApp {
  view: MapView,
}

impl OverlayApp {
  #[must_use]
  pub fn new(map: MapOrchestrator) -> Self {
    Self {
      view: MapView::new(map),
    }
  }

  #[must_use]
  pub fn map(&self) -> &MapOrchestrator {
    self.view.map()
  }
}

impl eframe::App for OverlayApp {
  // Required by eframe 0.34; rendering stays in `update`, which eframe still calls each frame.
  fn ui(&mut self, _ui: &mut egui::Ui, _frame: &mut eframe::Frame) {}

  fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
    let map = self.view.map().clone();
    egui::SidePanel::right("sidebar")
      .default_width(280.)
      .show(ctx, |ui| {
        if map.options().show_pointer_location {
          PointerLocationPanel::new(&map).ui(ui);
          ui.separator();
        }
        LayerPanel::new(&map).ui(ui);
        ui.separator();
        IdentifyPanel::new(&map).ui(ui);
        ui.separator();
        LegendPanel::new(&map).ui(ui);
      });

    egui::CentralPanel::default()
      .frame(egui::Frame::NONE)
      .show(ctx, |ui| {
        ui.push_id(&map.options().panel_ids.map, |ui| {
          (&mut self.view).ui(ui);
        });
      });
  }
}
