pub mod config;
/// Generation tokens for asynchronous fetches.
pub mod fetch_tracker;
pub mod map;
pub mod services;
pub mod ui;

pub use map::map_event::MapEvent;
pub use map::orchestrator::{Composition, MapOptions, MapOrchestrator};
