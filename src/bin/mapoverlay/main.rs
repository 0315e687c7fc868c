use std::sync::Arc;

use clap::Parser as _;
use mapoverlay::{
  config::Config,
  map::{
    coordinates::WGS84Coordinate,
    orchestrator::{MapOptions, MapOrchestrator},
  },
  services::{BoundaryRequest, HttpLegendService, HttpMapDataService, Services},
  ui::OverlayApp,
};

#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Base URL of the data backend. Overrides MAPOVERLAY_API_URL and the config file.
  #[arg(short, long)]
  api_url: Option<String>,

  /// Center latitude.
  #[arg(long, requires = "lon", allow_negative_numbers = true)]
  lat: Option<f32>,

  /// Center longitude.
  #[arg(long, requires = "lat", allow_negative_numbers = true)]
  lon: Option<f32>,

  /// Initial zoom level.
  #[arg(short, long)]
  zoom: Option<f32>,

  /// Disables all controls and interactions.
  #[arg(short, long, default_value_t = false)]
  frozen: bool,

  /// Boundary to clip to on startup, as `table:column:id`.
  #[arg(short, long, value_parser = parse_boundary)]
  clip: Option<BoundaryRequest>,

  /// Hides the pointer location panel.
  #[arg(long, default_value_t = false)]
  hide_pointer_location: bool,
}

fn parse_boundary(arg: &str) -> Result<BoundaryRequest, String> {
  let mut parts = arg.splitn(3, ':');
  match (parts.next(), parts.next(), parts.next()) {
    (Some(table), Some(column), Some(id)) if !table.is_empty() && !column.is_empty() => {
      Ok(BoundaryRequest::new(table, column, id))
    }
    _ => Err(format!("expected table:column:id, got '{arg}'")),
  }
}

fn main() -> eframe::Result {
  // init logger.
  env_logger::init();
  let args = Args::parse();

  let config = Config::new();
  let mut options = config.map_options();
  options.show_pointer_location &= !args.hide_pointer_location;
  if args.clip.is_some() {
    options.initial_clip.clone_from(&args.clip);
  }
  let mut composition = config.composition().with_frozen(args.frozen);
  if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
    composition.center = WGS84Coordinate::new(lat, lon);
  }
  if let Some(zoom) = args.zoom {
    composition.zoom = zoom;
  }
  let api_url = args.api_url.unwrap_or_else(|| config.api_url().to_string());

  // start tokio on another thread.
  let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
  let handle = rt.handle().clone();
  let _enter = handle.enter();
  let spawner = handle.clone();
  std::thread::spawn(move || {
    rt.block_on(async {
      loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
      }
    });
  });

  let native_options = eframe::NativeOptions {
    viewport: egui::ViewportBuilder {
      inner_size: Some(egui::vec2(1400.0, 900.0)),
      clamp_size_to_monitor_size: Some(true),
      ..Default::default()
    },
    ..Default::default()
  };

  eframe::run_native(
    "mapoverlay",
    native_options,
    Box::new(move |cc| {
      egui_extras::install_image_loaders(&cc.egui_ctx);

      let map = build_orchestrator(&api_url, options)?;
      let starter = map.clone();
      let ctx = cc.egui_ctx.clone();
      spawner.spawn(async move {
        starter.set_composition(composition).await;
        ctx.request_repaint();
      });
      Ok(Box::new(OverlayApp::new(map)))
    }),
  )
}

fn build_orchestrator(api_url: &str, options: MapOptions) -> anyhow::Result<MapOrchestrator> {
  log::info!("Using backend at {api_url}");
  let services = Services::new(
    Arc::new(HttpMapDataService::new(api_url)?),
    Arc::new(HttpLegendService::new()?),
  );
  Ok(MapOrchestrator::new(options, services))
}
