#![allow(dead_code)]

use std::{
  collections::VecDeque,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use anyhow::{Result, anyhow};
use mapoverlay::{
  map::{
    cluster::ClusterAggregate,
    coordinates::WGS84Coordinate,
    layer::{LayerSource, LayerSpec},
    orchestrator::{Composition, GATE_LAYER, MapOptions, MapOrchestrator},
    session::SessionInfo,
  },
  services::{
    BoundaryRecord, BoundaryRequest, LegendImage, LegendService, MapDataService, MapHost, Notifier,
    PointQuery, Services,
  },
};
use serde_json::Value;
use tokio::sync::oneshot;

pub const SQUARE: &str =
  r#"{"type":"Polygon","coordinates":[[[10,20],[11,20],[11,21],[10,21],[10,20]]]}"#;
pub const OTHER_SQUARE: &str =
  r#"{"type":"Polygon","coordinates":[[[12,22],[13,22],[13,23],[12,23],[12,22]]]}"#;

type Gate = Option<oneshot::Receiver<()>>;

/// Scripted backend. Each call pops the next queued response.
#[derive(Default)]
pub struct FakeData {
  clusters: Mutex<VecDeque<Result<Vec<ClusterAggregate>, String>>>,
  boundaries: Mutex<VecDeque<(Gate, Result<Vec<BoundaryRecord>, String>)>>,
  points: Mutex<VecDeque<Result<Vec<Value>, String>>>,
  queries: Mutex<Vec<PointQuery>>,
  cluster_calls: AtomicUsize,
  boundary_calls: AtomicUsize,
}

impl FakeData {
  pub fn push_clusters(&self, clusters: Result<Vec<ClusterAggregate>, &str>) {
    self
      .clusters
      .lock()
      .unwrap()
      .push_back(clusters.map_err(str::to_string));
  }

  pub fn push_boundary(&self, records: Result<Vec<BoundaryRecord>, &str>) {
    self.push_gated_boundary(None, records);
  }

  /// The fetch only completes once the returned sender fires.
  pub fn push_delayed_boundary(&self, records: Result<Vec<BoundaryRecord>, &str>) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    self.push_gated_boundary(Some(rx), records);
    tx
  }

  fn push_gated_boundary(&self, gate: Gate, records: Result<Vec<BoundaryRecord>, &str>) {
    self
      .boundaries
      .lock()
      .unwrap()
      .push_back((gate, records.map_err(str::to_string)));
  }

  pub fn push_points(&self, records: Result<Vec<Value>, &str>) {
    self
      .points
      .lock()
      .unwrap()
      .push_back(records.map_err(str::to_string));
  }

  pub fn cluster_calls(&self) -> usize {
    self.cluster_calls.load(Ordering::SeqCst)
  }

  pub fn boundary_calls(&self) -> usize {
    self.boundary_calls.load(Ordering::SeqCst)
  }

  pub fn queries(&self) -> Vec<PointQuery> {
    self.queries.lock().unwrap().clone()
  }
}

#[async_trait::async_trait]
impl MapDataService for FakeData {
  async fn point_data(&self, query: &PointQuery) -> Result<Vec<Value>> {
    self.queries.lock().unwrap().push(query.clone());
    let next = self.points.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()));
    next.map_err(|e| anyhow!(e))
  }

  async fn cluster_counts(&self) -> Result<Vec<ClusterAggregate>> {
    self.cluster_calls.fetch_add(1, Ordering::SeqCst);
    let next = self.clusters.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()));
    next.map_err(|e| anyhow!(e))
  }

  async fn boundary(&self, _request: &BoundaryRequest) -> Result<Vec<BoundaryRecord>> {
    self.boundary_calls.fetch_add(1, Ordering::SeqCst);
    let (gate, next) = self
      .boundaries
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or((None, Ok(Vec::new())));
    if let Some(gate) = gate {
      let _ = gate.await;
    }
    next.map_err(|e| anyhow!(e))
  }
}

/// Legend images that fail for every URL mentioning "broken".
pub struct FakeLegends;

#[async_trait::async_trait]
impl LegendService for FakeLegends {
  async fn legend_image(&self, url: &str) -> Result<LegendImage> {
    if url.contains("broken") {
      return Err(anyhow!("404 for {url}"));
    }
    Ok(LegendImage {
      bytes: Arc::from(url.as_bytes()),
      width: 20,
      height: 12,
    })
  }
}

/// Records everything the map reports to its host and notifier.
#[derive(Default)]
pub struct Recorder {
  pub warnings: Mutex<Vec<String>>,
  pub errors: Mutex<Vec<String>>,
  pub ready: Mutex<Vec<SessionInfo>>,
  pub selected: Mutex<Vec<Value>>,
  pub moves: AtomicUsize,
}

impl Recorder {
  pub fn warnings(&self) -> Vec<String> {
    self.warnings.lock().unwrap().clone()
  }

  pub fn errors(&self) -> Vec<String> {
    self.errors.lock().unwrap().clone()
  }

  pub fn ready_count(&self) -> usize {
    self.ready.lock().unwrap().len()
  }

  pub fn selected(&self) -> Vec<Value> {
    self.selected.lock().unwrap().clone()
  }
}

impl Notifier for Recorder {
  fn warn(&self, message: &str) {
    self.warnings.lock().unwrap().push(message.to_string());
  }

  fn error(&self, message: &str) {
    self.errors.lock().unwrap().push(message.to_string());
  }
}

impl MapHost for Recorder {
  fn on_map_ready(&self, session: &SessionInfo) {
    self.ready.lock().unwrap().push(session.clone());
  }

  fn on_point_selected(&self, record: &Value) {
    self.selected.lock().unwrap().push(record.clone());
  }

  fn on_pointer_moved(&self, _location: WGS84Coordinate) {
    self.moves.fetch_add(1, Ordering::SeqCst);
  }
}

pub struct Fixture {
  pub map: MapOrchestrator,
  pub data: Arc<FakeData>,
  pub recorder: Arc<Recorder>,
}

pub fn fixture(options: MapOptions) -> Fixture {
  let data = Arc::new(FakeData::default());
  let recorder = Arc::new(Recorder::default());
  let services = Services::new(data.clone(), Arc::new(FakeLegends))
    .with_notifier(recorder.clone())
    .with_host(recorder.clone());
  Fixture {
    map: MapOrchestrator::new(options, services),
    data,
    recorder,
  }
}

/// OpenStreetMap, a hidden Satellite layer, the visible gate layer and a district WMS
/// whose legend cannot be loaded.
pub fn composition() -> Composition {
  Composition::new(WGS84Coordinate::new(20.5, 10.5))
    .with_layer(LayerSpec::new(
      "OpenStreetMap",
      LayerSource::Tile {
        url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
      },
    ))
    .with_layer(
      LayerSpec::new(
        "Satellite",
        LayerSource::Tile {
          url: "https://sat.example/{z}/{y}/{x}".to_string(),
        },
      )
      .with_visible(false),
    )
    .with_layer(LayerSpec::new(
      GATE_LAYER,
      LayerSource::Wms {
        url: "https://wms.example/geoserver/wms".to_string(),
        layers: Some("health:births".to_string()),
      },
    ))
    .with_layer(LayerSpec::new(
      "Districts",
      LayerSource::Wms {
        url: "https://broken.example/wms".to_string(),
        layers: Some("admin:districts".to_string()),
      },
    ))
}

pub fn boundary(geojson: &str) -> Vec<BoundaryRecord> {
  vec![BoundaryRecord {
    geojson_text: Some(geojson.to_string()),
  }]
}

pub fn request() -> BoundaryRequest {
  BoundaryRequest::new("districts", "district_id", "42")
}
