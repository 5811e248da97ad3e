//! Capability traits at the seams between the spider engine and a map provider
//!
//! The spider logic only ever talks to a map through these traits, so a
//! different provider (or a fake in tests) can be substituted without touching
//! the state machine.

use crate::{
    core::geo::{LatLng, LatLngBounds, Point},
    input::{
        events::EventKind,
        handler::{EventCallback, SubscriptionHandle},
    },
    Result,
};
use async_trait::async_trait;

/// Read access to the map's current projection
pub trait MapView {
    /// Current zoom level
    fn zoom(&self) -> f64;

    /// Visible area in geographical coordinates
    fn bounds(&self) -> LatLngBounds;

    /// World pixel coordinates at the current zoom
    fn project(&self, lat_lng: &LatLng) -> Point;

    /// Container pixel of a location, `None` when it has no on-screen projection
    fn location_to_pixel(&self, lat_lng: &LatLng) -> Option<Point>;

    /// Location under a container pixel, `None` when the pixel is off screen
    fn pixel_to_location(&self, pixel: &Point) -> Option<LatLng>;
}

/// Subscription to map-level events
pub trait EventBus {
    fn subscribe(&self, kind: EventKind, handler: EventCallback) -> SubscriptionHandle;

    /// Removes a subscription; returns false if the handle was unknown
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}

/// A native map control: projection, events, and readiness
#[async_trait(?Send)]
pub trait MapControl: MapView + EventBus {
    /// Resolves once the underlying control can take layers and subscriptions
    async fn when_ready(&self) -> Result<()>;

    /// Changes the view so the bounds are fully visible
    fn fit_bounds(&self, bounds: &LatLngBounds);
}

/// Common layer surface
pub trait LayerOperations {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn layer_type(&self) -> crate::layers::base::LayerType;

    fn is_visible(&self) -> bool;

    fn set_visible(&mut self, visible: bool);

    fn opacity(&self) -> f32;

    fn set_opacity(&mut self, opacity: f32);

    fn z_index(&self) -> i32;

    fn set_z_index(&mut self, z_index: i32);

    /// Get layer options as JSON
    fn options(&self) -> serde_json::Value;

    /// Apply a (possibly partial) JSON options object
    fn set_options(&mut self, options: serde_json::Value) -> Result<()>;

    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
