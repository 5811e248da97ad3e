//! # spidercluster
//!
//! Cluster layers for interactive maps, with "spidering": clicking a cluster
//! pin fans its markers out on a circle or spiral of proxy pins joined to the
//! cluster center by sticks.
//!
//! The map itself is reached through the capability traits in [`traits`], so
//! any provider can sit underneath. [`core::map::Map`] is an in-process
//! implementation built on a Web-Mercator [`Viewport`].

pub mod core;
pub mod input;
pub mod layers;
pub mod prelude;
pub mod spatial;
pub mod spider;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::Bounds,
    config::{ClusterClickAction, ClusterLayerOptions, SpiderClusterOptions, StickStyle},
    geo::{LatLng, LatLngBounds, Point},
    map::Map,
    viewport::Viewport,
};

pub use layers::{
    base::LayerTrait,
    cluster::{initialize_spider_support, ClusterLayer},
    marker::{Marker, MarkerOptions},
    spider::SpiderLayer,
};

pub use input::{
    events::{EventKind, MapEvent, Primitive, PrimitiveKind},
    handler::{Effect, LocalEventBus},
};

pub use spatial::{
    clustering::{ClusterPin, Clustering},
    index::SpatialIndex,
};

pub use spider::{compute_positions, EventCoordinator, SpiderRenderer};

pub use traits::{EventBus, MapControl, MapView};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Map not ready: {0}")]
    MapNotReady(String),
}

/// Error type alias for convenience
pub type Error = MapError;
