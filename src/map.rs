/// Clipping layers to a boundary polygon.
pub mod clip;
/// Distance based clustering of aggregated points.
pub mod cluster;
/// Contains everything needed to handle coordinates.
pub mod coordinates;
pub mod feedback;
pub mod geometry;
pub mod identify;
pub mod layer;
pub mod legend;
/// Input forwarded to the map session.
pub mod map_event;
/// The map widget.
pub mod map_view;
pub mod orchestrator;
pub mod session;
/// Memoized cluster marker styles.
pub mod style;
