//! Prelude module for common spidercluster types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use spidercluster::prelude::*;`

pub use crate::core::{
    bounds::Bounds,
    config::{
        ClusterClickAction, ClusterLayerOptions, MarkerSelectedCallback,
        MarkerUnselectedCallback, SpiderClusterOptions, StickStyle,
    },
    geo::{LatLng, LatLngBounds, Point},
    map::Map,
    viewport::Viewport,
};

pub use crate::layers::{
    base::{LayerTrait, LayerType},
    cluster::{initialize_spider_support, ClusterLayer},
    marker::{ListenerId, Marker, MarkerOptions},
    spider::{OverlaySurface, ProxyId, ProxyPin, SpiderLayer, Stick, StickId},
};

pub use crate::input::{
    events::{EventKind, MapEvent, Primitive, PrimitiveKind},
    handler::{Effect, EventCallback, LocalEventBus, SubscriptionHandle},
};

pub use crate::spatial::{
    clustering::{Cluster, ClusterPin, Clustering, ClusteringConfig},
    index::{SpatialIndex, SpatialItem},
};

pub use crate::spider::{
    compute_positions, ClickCounter, EventCoordinator, LayoutKind, SpiderPhase, SpiderProxy,
    SpiderRenderer,
};

pub use crate::traits::{EventBus, MapControl, MapView};

pub use crate::{Error as MapError, Result};

pub use fxhash::FxHashMap as HashMap;
