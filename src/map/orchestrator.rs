//! Owns the live map session and keeps its overlays consistent.
//!
//! Every change of the [`Composition`] tears the session down and builds a new one.
//! The cluster, clip, legend and identify pipelines run against whatever session is
//! live when their fetch completes, and drop results that were superseded meanwhile.

use std::{
  fmt::Display,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Instant,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{
  clip::{Clipper, boundary_from_records},
  cluster::{Cluster, ClusterSource},
  coordinates::{PixelPosition, WGS84Coordinate},
  feedback::FeedbackMarker,
  identify::{Identify, IdentifyOutcome, IdentifyState},
  layer::{CLUSTER_LAYER, LayerContent, LayerDescriptor, LayerSpec, MapLayer},
  legend::{LegendEntry, fetch_legends, legend_requests},
  map_event::{Fired, ListenerKind, MapEvent},
  session::{MapSession, SessionId, SessionInfo, SessionSettings, Viewport},
};
use crate::{
  fetch_tracker::{FetchKind, FetchTracker},
  services::{BoundaryRequest, PointQuery, Services},
};

/// Base layer whose visibility gates the cluster overlay.
pub const GATE_LAYER: &str = "Hospital Birth";
pub const DEFAULT_ZOOM: f32 = 13.;

fn default_zoom() -> f32 {
  DEFAULT_ZOOM
}

/// The inputs that define a session. Any difference causes a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
  pub center: WGS84Coordinate,
  #[serde(default = "default_zoom")]
  pub zoom: f32,
  #[serde(default)]
  pub frozen: bool,
  #[serde(default)]
  pub layers: Vec<LayerSpec>,
  #[serde(default)]
  pub descriptors: Vec<LayerDescriptor>,
}

impl Composition {
  #[must_use]
  pub fn new(center: WGS84Coordinate) -> Self {
    Self {
      center,
      zoom: DEFAULT_ZOOM,
      frozen: false,
      layers: Vec::new(),
      descriptors: Vec::new(),
    }
  }

  #[must_use]
  pub fn with_zoom(mut self, zoom: f32) -> Self {
    self.zoom = zoom;
    self
  }

  #[must_use]
  pub fn with_frozen(mut self, frozen: bool) -> Self {
    self.frozen = frozen;
    self
  }

  #[must_use]
  pub fn with_layer(mut self, layer: LayerSpec) -> Self {
    self.layers.push(layer);
    self
  }

  #[must_use]
  pub fn with_descriptor(mut self, descriptor: LayerDescriptor) -> Self {
    self.descriptors.push(descriptor);
    self
  }

  /// Toggles a base layer spec. Returns whether one matched.
  pub fn set_layer_visible(&mut self, name: &str, visible: bool) -> bool {
    let mut found = false;
    for spec in self.layers.iter_mut().filter(|s| s.name == name) {
      spec.visible = visible;
      found = true;
    }
    found
  }
}

/// Identifiers of the rendered panels, so hosts can style or locate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelIds {
  pub map: String,
  pub pointer_location: String,
  pub legend: String,
}

impl Default for PanelIds {
  fn default() -> Self {
    Self {
      map: "mapoverlay-map".to_string(),
      pointer_location: "mapoverlay-pointer-location".to_string(),
      legend: "mapoverlay-legend".to_string(),
    }
  }
}

/// Behaviour that stays fixed for the lifetime of an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
  pub show_pointer_location: bool,
  /// Layers never masked by a clip.
  pub clip_exempt: Vec<String>,
  /// Applied once, to the first session.
  pub initial_clip: Option<BoundaryRequest>,
  pub panel_ids: PanelIds,
}

impl Default for MapOptions {
  fn default() -> Self {
    Self {
      show_pointer_location: true,
      clip_exempt: vec!["OpenStreetMap".to_string(), "Satellite".to_string()],
      initial_clip: None,
      panel_ids: PanelIds::default(),
    }
  }
}

/// Geographic position under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerLocation {
  pub longitude: f32,
  pub latitude: f32,
}

impl From<WGS84Coordinate> for PointerLocation {
  fn from(coord: WGS84Coordinate) -> Self {
    Self {
      longitude: coord.lon,
      latitude: coord.lat,
    }
  }
}

impl Display for PointerLocation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:.5}, {:.5}", self.longitude, self.latitude)
  }
}

struct State {
  session: Option<MapSession>,
  composition: Option<Composition>,
  viewport: Viewport,
  clipper: Clipper,
  pending_clip: Option<BoundaryRequest>,
  /// Built while the gate layer was hidden.
  held_cluster: Option<MapLayer>,
  identify: Identify,
  last_outcome: Option<IdentifyOutcome>,
  legend: Vec<LegendEntry>,
  pointer: Option<PointerLocation>,
}

/// An armed click whose point query has not run yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingIdentify {
  pub session: SessionId,
  pub location: WGS84Coordinate,
}

/// Handle to one embedded map. Clones share the same state.
#[derive(Clone)]
pub struct MapOrchestrator {
  state: Arc<Mutex<State>>,
  options: Arc<MapOptions>,
  services: Services,
  fetches: FetchTracker,
}

impl MapOrchestrator {
  #[must_use]
  pub fn new(options: MapOptions, services: Services) -> Self {
    let state = State {
      session: None,
      composition: None,
      viewport: Viewport::default(),
      clipper: Clipper::new(options.clip_exempt.clone()),
      pending_clip: options.initial_clip.clone(),
      held_cluster: None,
      identify: Identify::default(),
      last_outcome: None,
      legend: Vec::new(),
      pointer: None,
    };
    Self {
      state: Arc::new(Mutex::new(state)),
      options: Arc::new(options),
      services,
      fetches: FetchTracker::new(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  #[must_use]
  pub fn options(&self) -> &MapOptions {
    &self.options
  }

  #[must_use]
  pub fn fetches(&self) -> &FetchTracker {
    &self.fetches
  }

  /// Applies new composition inputs. Returns false if nothing changed.
  pub async fn set_composition(&self, composition: Composition) -> bool {
    self.update_composition(|_| Some(composition)).await
  }

  /// Shows or hides a base layer of the live composition and rebuilds the session.
  ///
  /// The toggle is applied to the composition current at the time of the call, so
  /// toggles issued in quick succession all take effect.
  pub async fn set_layer_visible(&self, name: &str, visible: bool) -> bool {
    self
      .update_composition(|current| {
        let mut next = current?.clone();
        next.set_layer_visible(name, visible).then_some(next)
      })
      .await
  }

  /// Derives the next composition from the live one under the state lock, then rebuilds.
  async fn update_composition(
    &self,
    next: impl FnOnce(Option<&Composition>) -> Option<Composition> + Send,
  ) -> bool {
    let (info, initial_clip) = {
      let mut state = self.lock();
      let current = state.session.as_ref().and(state.composition.as_ref());
      let Some(composition) = next(current) else {
        return false;
      };
      if current == Some(&composition) {
        return false;
      }
      let info = self.rebuild(&mut state, composition);
      (info, state.pending_clip.take())
    };
    self.services.host.on_map_ready(&info);

    if let Some(request) = initial_clip {
      self.clip(request).await;
    }
    futures::join!(self.refresh_clusters(true), self.rebuild_legend());
    true
  }

  fn rebuild(&self, state: &mut State, composition: Composition) -> SessionInfo {
    // The new session must not see results meant for the old one.
    self.fetches.invalidate(FetchKind::Cluster);
    if let Some(mut old) = state.session.take() {
      state.identify.reset(Some(&mut old));
      old.dispose();
    }
    state.held_cluster = None;

    let mut session = MapSession::new(SessionSettings {
      center: composition.center,
      zoom: composition.zoom,
      frozen: composition.frozen,
      viewport: state.viewport,
    });
    for spec in &composition.layers {
      session.add_layer(MapLayer::from_spec(spec));
    }
    for descriptor in &composition.descriptors {
      for layer in self.services.layer_factory.create(descriptor) {
        session.add_layer(layer);
      }
    }
    if self.options.show_pointer_location {
      session.on(ListenerKind::PointerMove);
    }
    session.on(ListenerKind::ClickFeedback);

    if let Some(geometry) = state.clipper.forget() {
      debug!("Restoring clip on rebuilt session");
      state.clipper.apply(&mut session, geometry);
    }

    info!(
      "Built map session {:?} with {} layers",
      session.id(),
      session.layers().len()
    );
    let info = session.info();
    state.session = Some(session);
    state.composition = Some(composition);
    info
  }

  /// Tears the session down. Running fetches are discarded when they complete.
  pub fn unmount(&self) {
    for kind in [
      FetchKind::Cluster,
      FetchKind::Boundary,
      FetchKind::Legend,
      FetchKind::Identify,
    ] {
      self.fetches.invalidate(kind);
    }
    let mut state = self.lock();
    if let Some(mut session) = state.session.take() {
      state.identify.reset(Some(&mut session));
      session.dispose();
    }
    state.identify.reset(None);
    state.clipper.forget();
    state.composition = None;
    state.held_cluster = None;
    state.legend.clear();
    state.pointer = None;
  }

  #[must_use]
  pub fn is_mounted(&self) -> bool {
    self.lock().session.is_some()
  }

  pub fn resize(&self, width: f32, height: f32) {
    let mut state = self.lock();
    let viewport = Viewport::new(width, height);
    if state.viewport == viewport {
      return;
    }
    state.viewport = viewport;
    if let Some(session) = state.session.as_mut() {
      session.resize(viewport);
    }
  }

  /// Feeds one input event to the session and, for an armed click, runs the identify query.
  pub async fn handle_event(&self, event: MapEvent) -> Option<IdentifyOutcome> {
    let pending = self.dispatch(event)?;
    self.resolve_identify(pending).await
  }

  /// The synchronous part of [`Self::handle_event`]. View changes, pointer reports and click
  /// feedback happen here. An armed click yields the query still to be resolved.
  pub fn dispatch(&self, event: MapEvent) -> Option<PendingIdentify> {
    let (pointer, pending) = {
      let mut state = self.lock();
      let State {
        session,
        identify,
        pointer,
        ..
      } = &mut *state;
      let session = session.as_mut()?;
      let session_id = session.id();

      let mut moved = None;
      let mut pending = None;
      for fired in session.dispatch(&event, Instant::now()) {
        match fired {
          Fired::PointerMove(pos) => {
            let location = session.to_wgs84(pos);
            *pointer = Some(location.into());
            moved = Some(location);
          }
          Fired::ClickFeedback(_) => {}
          Fired::Identify(pos) => {
            if identify.clicked(session_id) {
              pending = Some(PendingIdentify {
                session: session_id,
                location: session.to_wgs84(pos),
              });
            }
          }
        }
      }
      (moved, pending)
    };

    if let Some(location) = pointer {
      self.services.host.on_pointer_moved(location);
    }
    pending
  }

  /// Arms the single-shot identify click.
  pub fn arm(&self) -> bool {
    let mut state = self.lock();
    let State {
      session, identify, ..
    } = &mut *state;
    session.as_mut().is_some_and(|session| identify.arm(session))
  }

  /// Queries the record under an armed click and reports the outcome.
  pub async fn resolve_identify(&self, pending: PendingIdentify) -> Option<IdentifyOutcome> {
    let PendingIdentify { session, location } = pending;
    let _ticket = self.fetches.begin(FetchKind::Identify);
    let query = PointQuery::at(location);
    debug!("Identifying {}", query.id);
    let records = self.services.data.point_data(&query).await;

    let Some(outcome) = self.lock().identify.resolve(session, records) else {
      debug!("Discarding identify result for replaced session {session:?}");
      return None;
    };
    match &outcome {
      IdentifyOutcome::Found(record) => self.services.host.on_point_selected(record),
      IdentifyOutcome::NotFound => self.services.notifier.warn("No data found at this location"),
      IdentifyOutcome::Error(message) => self
        .services
        .notifier
        .error(&format!("Could not identify the location: {message}")),
    }
    self.lock().last_outcome = Some(outcome.clone());
    Some(outcome)
  }

  /// Fetches cluster counts and replaces the overlay.
  pub async fn refresh(&self) -> bool {
    self.refresh_clusters(false).await
  }

  async fn refresh_clusters(&self, gated: bool) -> bool {
    if gated {
      let gate_visible = self
        .lock()
        .session
        .as_ref()
        .is_some_and(|s| s.is_layer_visible(GATE_LAYER));
      if !gate_visible {
        debug!("'{GATE_LAYER}' is hidden, skipping cluster refresh");
        return false;
      }
    }

    let ticket = self.fetches.begin(FetchKind::Cluster);
    let result = self.services.data.cluster_counts().await;
    if !ticket.is_current() {
      debug!("Discarding stale cluster counts");
      return false;
    }
    let aggregates = match result {
      Ok(aggregates) => aggregates,
      Err(e) => {
        self
          .services
          .notifier
          .error(&format!("Could not load cluster counts: {e}"));
        return false;
      }
    };
    if aggregates.is_empty() {
      self.services.notifier.warn("No cluster data available");
    }

    let mut state = self.lock();
    let State {
      session,
      clipper,
      held_cluster,
      ..
    } = &mut *state;
    let Some(session) = session.as_mut() else {
      return false;
    };
    let layer = MapLayer::new(
      CLUSTER_LAYER,
      LayerContent::Cluster(ClusterSource::from_aggregates(&aggregates)),
    );
    if session.is_layer_visible(GATE_LAYER) {
      session.replace_named_layer(layer);
      clipper.reconcile(session);
      *held_cluster = None;
    } else {
      if let Some(id) = session.layer_by_name(CLUSTER_LAYER).map(MapLayer::id) {
        session.remove_layer(id);
      }
      debug!("'{GATE_LAYER}' is hidden, holding cluster layer");
      *held_cluster = Some(layer);
    }
    info!("Cluster overlay has {} features", aggregates.len());
    true
  }

  /// The cluster overlay, attached or held.
  #[must_use]
  pub fn cluster_layer(&self) -> Option<MapLayer> {
    let state = self.lock();
    state
      .session
      .as_ref()
      .and_then(|s| s.layer_by_name(CLUSTER_LAYER))
      .filter(|l| l.cluster_source().is_some())
      .or(state.held_cluster.as_ref())
      .cloned()
  }

  #[must_use]
  pub fn is_cluster_attached(&self) -> bool {
    self
      .lock()
      .session
      .as_ref()
      .is_some_and(|s| s.layer_by_name(CLUSTER_LAYER).is_some())
  }

  /// Clusters of the attached overlay at the current view resolution.
  #[must_use]
  pub fn clusters(&self) -> Vec<Cluster> {
    self
      .with_session(|s| {
        s.layer_by_name(CLUSTER_LAYER)
          .filter(|l| l.visible())
          .and_then(MapLayer::cluster_source)
          .map(|source| source.clusters(s.resolution()))
          .unwrap_or_default()
      })
      .unwrap_or_default()
  }

  /// Replaces the active clip with the boundary for `request`.
  ///
  /// The previous clip is retired before fetching, so a failed fetch leaves the map unclipped.
  pub async fn clip(&self, request: BoundaryRequest) -> bool {
    let ticket = self.fetches.begin(FetchKind::Boundary);
    self.retire_clip();

    info!(
      "Fetching boundary {}.{} = {}",
      request.table, request.column, request.id
    );
    let records = self.services.data.boundary(&request).await;
    if !ticket.is_current() {
      debug!("Discarding stale boundary for {request:?}");
      return false;
    }
    let records = match records {
      Ok(records) => records,
      Err(e) => {
        self
          .services
          .notifier
          .error(&format!("Could not load boundary: {e}"));
        return false;
      }
    };
    let geometry = match boundary_from_records(&records) {
      Ok(geometry) => geometry,
      Err(e) => {
        warn!("Boundary {request:?} has no usable geometry: {e}");
        self
          .services
          .notifier
          .warn("No boundary geometry found, the map is not clipped");
        return false;
      }
    };

    let mut state = self.lock();
    let State {
      session, clipper, ..
    } = &mut *state;
    let Some(session) = session.as_mut() else {
      return false;
    };
    clipper.apply(session, Arc::new(geometry));
    true
  }

  /// Removes the active clip and drops any clip still being fetched.
  pub fn unclip(&self) {
    self.fetches.invalidate(FetchKind::Boundary);
    self.retire_clip();
  }

  fn retire_clip(&self) {
    let mut state = self.lock();
    let State {
      session, clipper, ..
    } = &mut *state;
    match session.as_mut() {
      Some(session) => clipper.retire(session),
      None => {
        clipper.forget();
      }
    }
  }

  #[must_use]
  pub fn is_clipped(&self) -> bool {
    self.lock().clipper.is_active()
  }

  /// Names of the layers currently carrying the clip mask.
  #[must_use]
  pub fn masked_layers(&self) -> Vec<String> {
    let state = self.lock();
    state.session.as_ref().map_or_else(Vec::new, |s| {
      state
        .clipper
        .masked_layers(s)
        .into_iter()
        .map(str::to_string)
        .collect()
    })
  }

  /// Rebuilds the legend from the visible layers. Returns the number of entries shown.
  pub async fn rebuild_legend(&self) -> Option<usize> {
    let ticket = self.fetches.begin(FetchKind::Legend);
    let requests = self.with_session(|s| legend_requests(s.layers(), self.services.legend.as_ref()))?;
    let entries = fetch_legends(requests, self.services.legend.as_ref()).await;
    if !ticket.is_current() {
      debug!("Discarding stale legend");
      return None;
    }
    let count = entries.len();
    self.lock().legend = entries;
    Some(count)
  }

  #[must_use]
  pub fn legend(&self) -> Vec<LegendEntry> {
    self.lock().legend.clone()
  }

  #[must_use]
  pub fn pointer_location(&self) -> Option<PointerLocation> {
    self.lock().pointer
  }

  #[must_use]
  pub fn identify_state(&self) -> IdentifyState {
    self.lock().identify.state()
  }

  #[must_use]
  pub fn last_outcome(&self) -> Option<IdentifyOutcome> {
    self.lock().last_outcome.clone()
  }

  #[must_use]
  pub fn composition(&self) -> Option<Composition> {
    self.lock().composition.clone()
  }

  #[must_use]
  pub fn session_info(&self) -> Option<SessionInfo> {
    self.with_session(MapSession::info)
  }

  /// Runs `f` against the live session, if any.
  pub fn with_session<R>(&self, f: impl FnOnce(&MapSession) -> R) -> Option<R> {
    self.lock().session.as_ref().map(f)
  }

  /// Screen position of a map point in the current view.
  #[must_use]
  pub fn to_screen(&self, coord: WGS84Coordinate) -> Option<PixelPosition> {
    self.with_session(|s| s.to_screen(coord.into()))
  }

  #[must_use]
  pub fn feedback_markers(&self) -> Vec<FeedbackMarker> {
    self
      .with_session(|s| s.feedback_markers().to_vec())
      .unwrap_or_default()
  }

  pub fn prune_feedback(&self, now: Instant) {
    if let Some(session) = self.lock().session.as_mut() {
      session.prune_feedback(now);
    }
  }
}
