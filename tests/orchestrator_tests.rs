mod common;

use assert_approx_eq::assert_approx_eq;
use common::{OTHER_SQUARE, SQUARE, boundary, composition, fixture, request};
use mapoverlay::{
  MapEvent,
  map::{
    cluster::ClusterAggregate,
    coordinates::{PixelCoordinate, PixelPosition, WGS84Coordinate},
    identify::{IdentifyOutcome, IdentifyState},
    layer::{BOUNDARY_LAYER, CLUSTER_LAYER, LayerContent},
    map_event::ListenerKind,
    orchestrator::{GATE_LAYER, MapOptions, MapOrchestrator},
    style::ClusterBucket,
  },
};
use serde_json::json;

fn center_click() -> MapEvent {
  MapEvent::Click(PixelPosition::new(400., 300.))
}

/// Whether the live boundary outline covers the given point.
fn outline_contains(map: &MapOrchestrator, lat: f32, lon: f32) -> bool {
  map
    .with_session(|s| match s.layer_by_name(BOUNDARY_LAYER).map(|l| l.content()) {
      Some(LayerContent::Outline {
        geometry: Some(geometry),
        ..
      }) => geometry.contains(PixelCoordinate::from(WGS84Coordinate::new(lat, lon))),
      _ => false,
    })
    .unwrap_or(false)
}

#[tokio::test]
async fn mount_builds_layers_in_order() {
  let f = fixture(MapOptions::default());
  assert!(f.map.set_composition(composition()).await);

  let info = f.map.session_info().unwrap();
  assert_eq!(
    info.layer_names,
    vec!["OpenStreetMap", "Satellite", GATE_LAYER, "Districts", CLUSTER_LAYER]
  );
  assert_approx_eq!(info.zoom, 13.);
  assert!(!info.frozen);
  assert_eq!(f.recorder.ready_count(), 1);
  assert_eq!(f.data.cluster_calls(), 1);
}

#[tokio::test]
async fn rebuild_replaces_session_completely() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  let first = f.map.session_info().unwrap();
  f.map.arm();

  let mut next = composition();
  next.set_layer_visible("Satellite", true);
  assert!(f.map.set_composition(next).await);

  let second = f.map.session_info().unwrap();
  assert_ne!(first.id, second.id);
  assert_eq!(f.recorder.ready_count(), 2);
  assert_eq!(f.map.identify_state(), IdentifyState::Idle);
  let listeners = f
    .map
    .with_session(|s| {
      (
        s.listener_count(ListenerKind::PointerMove),
        s.listener_count(ListenerKind::ClickFeedback),
        s.listener_count(ListenerKind::Identify),
      )
    })
    .unwrap();
  assert_eq!(listeners, (1, 1, 0));
}

#[tokio::test]
async fn identical_composition_is_a_no_op() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  let id = f.map.session_info().unwrap().id;

  assert!(!f.map.set_composition(composition()).await);
  assert_eq!(f.map.session_info().unwrap().id, id);
  assert_eq!(f.recorder.ready_count(), 1);
  assert_eq!(f.data.cluster_calls(), 1);
}

#[tokio::test]
async fn repeated_rebuilds_do_not_accumulate_listeners() {
  let f = fixture(MapOptions::default());
  for zoom in [10., 11., 12., 13.] {
    f.map.set_composition(composition().with_zoom(zoom)).await;
  }
  let count = f
    .map
    .with_session(|s| s.listener_count(ListenerKind::ClickFeedback))
    .unwrap();
  assert_eq!(count, 1);
  assert_eq!(f.recorder.ready_count(), 4);
}

#[tokio::test]
async fn concurrent_layer_toggles_are_both_applied() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;

  let (satellite, districts) = tokio::join!(
    f.map.set_layer_visible("Satellite", true),
    f.map.set_layer_visible("Districts", false),
  );
  assert!(satellite && districts);

  let composition = f.map.composition().unwrap();
  let visible: Vec<_> = composition
    .layers
    .iter()
    .map(|l| (l.name.as_str(), l.visible))
    .collect();
  assert_eq!(
    visible,
    vec![
      ("OpenStreetMap", true),
      ("Satellite", true),
      (GATE_LAYER, true),
      ("Districts", false),
    ]
  );
  assert!(f.map.with_session(|s| s.is_layer_visible("Satellite")).unwrap());
  assert!(!f.map.with_session(|s| s.is_layer_visible("Districts")).unwrap());
  assert_eq!(f.recorder.ready_count(), 3);
}

#[tokio::test]
async fn layer_toggle_needs_a_mounted_map_and_a_known_layer() {
  let f = fixture(MapOptions::default());
  assert!(!f.map.set_layer_visible("Satellite", true).await);

  f.map.set_composition(composition()).await;
  assert!(!f.map.set_layer_visible("Unknown", true).await);
  assert!(!f.map.set_layer_visible("OpenStreetMap", true).await);
  assert_eq!(f.recorder.ready_count(), 1);
}

#[tokio::test]
async fn pointer_location_is_optional() {
  let f = fixture(MapOptions {
    show_pointer_location: false,
    ..MapOptions::default()
  });
  f.map.set_composition(composition()).await;
  f.map.dispatch(MapEvent::PointerMove(PixelPosition::new(10., 10.)));
  assert_eq!(f.map.pointer_location(), None);

  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.map.dispatch(MapEvent::PointerMove(PixelPosition::new(400., 300.)));
  let location = f.map.pointer_location().unwrap();
  assert_approx_eq!(location.latitude, 20.5, 1e-3);
  assert_approx_eq!(location.longitude, 10.5, 1e-3);
  assert_eq!(f.recorder.moves.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn frozen_map_ignores_navigation_but_shows_feedback() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition().with_frozen(true)).await;

  let (controls, interactions) = f
    .map
    .with_session(|s| (s.controls().len(), s.interactions().len()))
    .unwrap();
  assert_eq!((controls, interactions), (0, 0));

  let before = f.map.session_info().unwrap();
  f.map.dispatch(MapEvent::Drag(PixelPosition::new(50., 50.)));
  f.map.dispatch(MapEvent::DoubleClick(PixelPosition::new(400., 300.)));
  let after = f.map.session_info().unwrap();
  assert_eq!(before.center, after.center);
  assert_approx_eq!(before.zoom, after.zoom);

  f.map.dispatch(center_click());
  assert_eq!(f.map.feedback_markers().len(), 1);
}

#[tokio::test]
async fn clusters_are_bucketed_by_count() {
  let f = fixture(MapOptions::default());
  f.data.push_clusters(Ok(vec![
    ClusterAggregate::new(10., 20., 30),
    ClusterAggregate::new(11., 21., 5),
  ]));
  f.map.set_composition(composition()).await;

  let mut clusters = f.map.clusters();
  clusters.sort_by_key(|c| std::cmp::Reverse(c.size));
  assert_eq!(clusters.len(), 2);
  let large = clusters[0].style();
  assert_eq!(large.bucket, ClusterBucket::Large);
  assert_approx_eq!(large.radius, 20.);
  assert_eq!(large.label, "30");
  let small = clusters[1].style();
  assert_eq!(small.bucket, ClusterBucket::Small);
  assert_approx_eq!(small.radius, 8.);
}

#[tokio::test]
async fn refresh_replaces_the_overlay() {
  let f = fixture(MapOptions::default());
  f.data.push_clusters(Ok(vec![
    ClusterAggregate::new(10., 20., 3),
    ClusterAggregate::new(12., 22., 4),
    ClusterAggregate::new(14., 24., 5),
  ]));
  f.map.set_composition(composition()).await;
  assert_eq!(f.map.clusters().len(), 3);

  f.data.push_clusters(Ok(vec![ClusterAggregate::new(30., 40., 7)]));
  assert!(f.map.refresh().await);

  let overlays = f
    .map
    .with_session(|s| s.layers().iter().filter(|l| l.name() == CLUSTER_LAYER).count())
    .unwrap();
  assert_eq!(overlays, 1);
  let layer = f.map.cluster_layer().unwrap();
  let features = layer.cluster_source().unwrap().features();
  assert_eq!(features.len(), 1);
  assert_eq!(features[0].count, 7);
  let clusters = f.map.clusters();
  assert_eq!(clusters.len(), 1);
  assert_eq!(clusters[0].size, 7);
}

#[tokio::test]
async fn empty_clusters_warn() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  assert_eq!(f.recorder.warnings(), vec!["No cluster data available"]);
  assert!(f.map.is_cluster_attached());
  assert!(f.map.clusters().is_empty());
}

#[tokio::test]
async fn cluster_error_keeps_previous_overlay() {
  let f = fixture(MapOptions::default());
  f.data.push_clusters(Ok(vec![ClusterAggregate::new(10., 20., 3)]));
  f.map.set_composition(composition()).await;

  f.data.push_clusters(Err("backend down"));
  assert!(!f.map.refresh().await);
  assert_eq!(f.map.clusters().len(), 1);
  let errors = f.recorder.errors();
  assert_eq!(errors.len(), 1);
  assert!(errors[0].starts_with("Could not load cluster counts"));
}

#[tokio::test]
async fn hidden_gate_layer_skips_and_holds_clusters() {
  let f = fixture(MapOptions::default());
  let mut hidden = composition();
  hidden.set_layer_visible(GATE_LAYER, false);
  f.map.set_composition(hidden).await;
  assert_eq!(f.data.cluster_calls(), 0);
  assert!(f.map.cluster_layer().is_none());

  f.data.push_clusters(Ok(vec![ClusterAggregate::new(10., 20., 3)]));
  assert!(f.map.refresh().await);
  assert!(!f.map.is_cluster_attached());
  assert!(f.map.cluster_layer().is_some());
  assert!(f.map.clusters().is_empty());
}

#[tokio::test]
async fn clip_masks_all_but_exempt_layers() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_boundary(Ok(boundary(SQUARE)));
  assert!(f.map.clip(request()).await);

  let masked = f.map.masked_layers();
  for name in [GATE_LAYER, "Districts", CLUSTER_LAYER, BOUNDARY_LAYER] {
    assert!(masked.iter().any(|m| m == name), "{name} is not masked");
  }
  assert!(!masked.iter().any(|m| m == "OpenStreetMap" || m == "Satellite"));
  assert!(outline_contains(&f.map, 20.5, 10.5));
}

#[tokio::test]
async fn clipping_twice_keeps_one_outline() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_boundary(Ok(boundary(SQUARE)));
  f.data.push_boundary(Ok(boundary(OTHER_SQUARE)));
  f.map.clip(request()).await;
  f.map.clip(request()).await;

  let outlines = f
    .map
    .with_session(|s| s.layers().iter().filter(|l| l.name() == BOUNDARY_LAYER).count())
    .unwrap();
  assert_eq!(outlines, 1);
  assert!(outline_contains(&f.map, 22.5, 12.5));
  assert!(!outline_contains(&f.map, 20.5, 10.5));

  let filters = f
    .map
    .with_session(|s| {
      s.layer_by_name(GATE_LAYER)
        .map(|l| l.filters().len())
        .unwrap_or_default()
    })
    .unwrap();
  assert_eq!(filters, 1);
}

#[tokio::test]
async fn stale_boundary_is_discarded() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  let release = f.data.push_delayed_boundary(Ok(boundary(SQUARE)));
  f.data.push_boundary(Ok(boundary(OTHER_SQUARE)));

  let slow = tokio::spawn({
    let map = f.map.clone();
    async move { map.clip(request()).await }
  });
  while f.data.boundary_calls() < 1 {
    tokio::task::yield_now().await;
  }
  assert!(f.map.clip(request()).await);
  release.send(()).unwrap();
  assert!(!slow.await.unwrap());

  assert!(outline_contains(&f.map, 22.5, 12.5));
  assert!(!outline_contains(&f.map, 20.5, 10.5));
}

#[tokio::test]
async fn unclip_drops_pending_boundary() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  let release = f.data.push_delayed_boundary(Ok(boundary(SQUARE)));

  let slow = tokio::spawn({
    let map = f.map.clone();
    async move { map.clip(request()).await }
  });
  while f.data.boundary_calls() < 1 {
    tokio::task::yield_now().await;
  }
  f.map.unclip();
  release.send(()).unwrap();
  assert!(!slow.await.unwrap());
  assert!(!f.map.is_clipped());
  assert!(f.map.masked_layers().is_empty());
}

#[tokio::test]
async fn empty_boundary_warns_and_leaves_map_unclipped() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_boundary(Ok(boundary(SQUARE)));
  f.map.clip(request()).await;

  f.data.push_boundary(Ok(Vec::new()));
  assert!(!f.map.clip(request()).await);
  assert!(!f.map.is_clipped());
  assert!(f.map.masked_layers().is_empty());
  assert!(
    f.recorder
      .warnings()
      .contains(&"No boundary geometry found, the map is not clipped".to_string())
  );
}

#[tokio::test]
async fn boundary_error_fails_open() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_boundary(Ok(boundary(SQUARE)));
  f.map.clip(request()).await;

  f.data.push_boundary(Err("timeout"));
  assert!(!f.map.clip(request()).await);
  assert!(!f.map.is_clipped());
  assert!(f.map.with_session(|s| s.layer_by_name(BOUNDARY_LAYER).is_none()).unwrap());
  assert!(f.recorder.errors()[0].starts_with("Could not load boundary"));
}

#[tokio::test]
async fn late_cluster_layer_is_masked() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_boundary(Ok(boundary(SQUARE)));
  f.map.clip(request()).await;

  f.data.push_clusters(Ok(vec![
    ClusterAggregate::new(10.5, 20.5, 3),
    ClusterAggregate::new(40., 40., 3),
  ]));
  f.map.refresh().await;
  assert!(f.map.masked_layers().iter().any(|m| m == CLUSTER_LAYER));

  let rendered = f
    .map
    .with_session(|s| {
      let layer = s.layer_by_name(CLUSTER_LAYER).unwrap();
      let inside = layer.renders(WGS84Coordinate::new(20.5, 10.5).into());
      let outside = layer.renders(WGS84Coordinate::new(40., 40.).into());
      (inside, outside)
    })
    .unwrap();
  assert_eq!(rendered, (true, false));
}

#[tokio::test]
async fn initial_clip_is_applied_once() {
  let f = fixture(MapOptions {
    initial_clip: Some(request()),
    ..MapOptions::default()
  });
  f.data.push_boundary(Ok(boundary(SQUARE)));
  f.map.set_composition(composition()).await;
  assert!(f.map.is_clipped());
  assert_eq!(f.data.boundary_calls(), 1);

  f.map.set_composition(composition().with_zoom(9.)).await;
  assert_eq!(f.data.boundary_calls(), 1);
}

#[tokio::test]
async fn clip_survives_rebuild_without_refetch() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_boundary(Ok(boundary(SQUARE)));
  f.map.clip(request()).await;

  f.map.set_composition(composition().with_zoom(11.)).await;
  assert_eq!(f.data.boundary_calls(), 1);
  assert!(f.map.is_clipped());
  assert!(outline_contains(&f.map, 20.5, 10.5));
  let masked = f.map.masked_layers();
  assert!(masked.iter().any(|m| m == GATE_LAYER));
  assert!(masked.iter().any(|m| m == CLUSTER_LAYER));
}

#[tokio::test]
async fn identify_is_single_shot() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_points(Ok(vec![json!({"name": "Charité"}), json!({"name": "second"})]));

  assert!(f.map.arm());
  assert!(!f.map.arm());
  let outcome = f.map.handle_event(center_click()).await;
  assert_eq!(outcome, Some(IdentifyOutcome::Found(json!({"name": "Charité"}))));
  assert_eq!(f.recorder.selected(), vec![json!({"name": "Charité"})]);
  assert_eq!(f.map.identify_state(), IdentifyState::Idle);

  assert_eq!(f.map.handle_event(center_click()).await, None);
  assert_eq!(f.data.queries().len(), 1);
  assert!(f.data.queries()[0].id.starts_with("POINT ("));
  assert_eq!(f.map.feedback_markers().len(), 2);
}

#[tokio::test]
async fn identify_without_record_warns() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_points(Ok(Vec::new()));

  f.map.arm();
  assert_eq!(
    f.map.handle_event(center_click()).await,
    Some(IdentifyOutcome::NotFound)
  );
  assert!(
    f.recorder
      .warnings()
      .contains(&"No data found at this location".to_string())
  );
  assert!(f.recorder.selected().is_empty());
}

#[tokio::test]
async fn identify_error_is_reported() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_points(Err("500"));

  f.map.arm();
  let outcome = f.map.handle_event(center_click()).await;
  assert!(matches!(outcome, Some(IdentifyOutcome::Error(_))));
  assert!(f.recorder.errors()[0].starts_with("Could not identify the location"));
  assert_eq!(f.map.identify_state(), IdentifyState::Idle);
}

#[tokio::test]
async fn identify_result_for_replaced_session_is_dropped() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_points(Ok(vec![json!({"name": "late"})]));

  f.map.arm();
  let pending = f.map.dispatch(center_click()).unwrap();
  f.map.set_composition(composition().with_zoom(5.)).await;

  assert_eq!(f.map.resolve_identify(pending).await, None);
  assert!(f.recorder.selected().is_empty());
  assert_eq!(f.map.last_outcome(), None);
}

#[tokio::test]
async fn legend_skips_failed_images() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;

  let legend = f.map.legend();
  assert_eq!(legend.len(), 1);
  assert_eq!(legend[0].layer_name, GATE_LAYER);
  assert!(legend[0].url.contains("LAYER=health%3Abirths"));

  let mut hidden = composition();
  hidden.set_layer_visible(GATE_LAYER, false);
  f.map.set_composition(hidden).await;
  assert!(f.map.legend().is_empty());
}

#[tokio::test]
async fn unmount_releases_everything() {
  let f = fixture(MapOptions::default());
  f.map.set_composition(composition()).await;
  f.data.push_boundary(Ok(boundary(SQUARE)));
  f.map.clip(request()).await;
  f.map.arm();

  f.map.unmount();
  assert!(!f.map.is_mounted());
  assert!(!f.map.is_clipped());
  assert!(f.map.legend().is_empty());
  assert_eq!(f.map.identify_state(), IdentifyState::Idle);
  assert_eq!(f.map.dispatch(center_click()), None);

  assert!(f.map.set_composition(composition()).await);
  assert!(f.map.is_mounted());
  assert!(!f.map.is_clipped());
}
