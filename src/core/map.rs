use crate::{
    core::{
        geo::{LatLng, LatLngBounds, Point},
        viewport::Viewport,
    },
    input::{
        events::{EventKind, MapEvent, Primitive},
        handler::{EventCallback, LocalEventBus, SubscriptionHandle},
    },
    traits::{EventBus, MapControl, MapView},
    MapError, Result,
};
use async_trait::async_trait;
use futures::{
    channel::oneshot,
    future::{FutureExt, Shared},
};
use std::cell::RefCell;

/// In-process map control: a Web-Mercator viewport plus a local event bus.
///
/// Every view change goes through [`Map::set_view`], which brackets the
/// change with `ViewChangeStart` / `ViewChangeEnd`. Pointer input is fed in
/// with [`Map::click`], [`Map::mouse_over`] and [`Map::mouse_out`].
pub struct Map {
    viewport: RefCell<Viewport>,
    events: LocalEventBus,
    ready: Shared<oneshot::Receiver<()>>,
    ready_tx: RefCell<Option<oneshot::Sender<()>>>,
}

impl Map {
    /// A map that is ready immediately
    pub fn new(viewport: Viewport) -> Self {
        let map = Self::loading(viewport);
        map.mark_ready();
        map
    }

    /// A map that becomes ready once [`Map::mark_ready`] is called
    pub fn loading(viewport: Viewport) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            viewport: RefCell::new(viewport),
            events: LocalEventBus::new(),
            ready: rx.shared(),
            ready_tx: RefCell::new(Some(tx)),
        }
    }

    pub fn mark_ready(&self) {
        if let Some(tx) = self.ready_tx.borrow_mut().take() {
            // the receiver lives in self, so this cannot fail
            let _ = tx.send(());
            log::debug!("map ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready_tx.borrow().is_none()
    }

    /// Snapshot of the current viewport
    pub fn viewport(&self) -> Viewport {
        self.viewport.borrow().clone()
    }

    pub fn center(&self) -> LatLng {
        self.viewport.borrow().center
    }

    pub fn set_size(&self, size: Point) {
        self.viewport.borrow_mut().set_size(size);
    }

    /// Moves and zooms the view, emitting start and end events around it
    pub fn set_view(&self, center: LatLng, zoom: f64) {
        let (old_center, old_zoom) = {
            let viewport = self.viewport.borrow();
            (viewport.center, viewport.zoom)
        };
        self.emit(&MapEvent::ViewChangeStart {
            center: old_center,
            zoom: old_zoom,
        });

        let (center, zoom) = {
            let mut viewport = self.viewport.borrow_mut();
            viewport.set_zoom(zoom);
            viewport.set_center(center);
            (viewport.center, viewport.zoom)
        };
        log::debug!(
            "view changed to ({:.5}, {:.5}) @ {:.2}",
            center.lat,
            center.lng,
            zoom
        );

        self.emit(&MapEvent::ViewChangeEnd { center, zoom });
    }

    pub fn pan_to(&self, center: LatLng) {
        let zoom = self.viewport.borrow().zoom;
        self.set_view(center, zoom);
    }

    pub fn set_zoom(&self, zoom: f64) {
        let center = self.center();
        self.set_view(center, zoom);
    }

    /// Fits the view to `bounds` with `padding` pixels on every side
    pub fn fit_bounds_padded(&self, bounds: &LatLngBounds, padding: Option<f64>) {
        let mut target = self.viewport();
        target.fit_bounds(bounds, padding);
        self.set_view(target.center, target.zoom);
    }

    /// A click at a container pixel on `target`, or on the background
    pub fn click(&self, target: Option<Primitive>, pixel: Point) {
        let location = self.viewport.borrow().pixel_to_lat_lng(&pixel);
        self.emit(&MapEvent::Click {
            target,
            location,
            pixel,
        });
    }

    pub fn mouse_over(&self, target: Primitive, pixel: Point) {
        let location = self.viewport.borrow().pixel_to_lat_lng(&pixel);
        self.emit(&MapEvent::MouseOver {
            target,
            location,
            pixel,
        });
    }

    pub fn mouse_out(&self, target: Primitive, pixel: Point) {
        let location = self.viewport.borrow().pixel_to_lat_lng(&pixel);
        self.emit(&MapEvent::MouseOut {
            target,
            location,
            pixel,
        });
    }

    /// Delivers an event to subscribers. No viewport borrow is held here, so
    /// handlers may query or change the view.
    pub fn emit(&self, event: &MapEvent) {
        self.events.emit(event);
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.events.len()
    }
}

impl MapView for Map {
    fn zoom(&self) -> f64 {
        self.viewport.borrow().zoom
    }

    fn bounds(&self) -> LatLngBounds {
        self.viewport.borrow().bounds()
    }

    fn project(&self, lat_lng: &LatLng) -> Point {
        self.viewport.borrow().project(lat_lng, None)
    }

    fn location_to_pixel(&self, lat_lng: &LatLng) -> Option<Point> {
        self.viewport.borrow().try_lat_lng_to_pixel(lat_lng)
    }

    fn pixel_to_location(&self, pixel: &Point) -> Option<LatLng> {
        self.viewport.borrow().try_pixel_to_lat_lng(pixel)
    }
}

impl EventBus for Map {
    fn subscribe(&self, kind: EventKind, handler: EventCallback) -> SubscriptionHandle {
        self.events.subscribe(kind, handler)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.events.unsubscribe(handle)
    }
}

#[async_trait(?Send)]
impl MapControl for Map {
    async fn when_ready(&self) -> Result<()> {
        self.ready
            .clone()
            .await
            .map_err(|_| MapError::MapNotReady("readiness signal dropped".to_string()))
    }

    fn fit_bounds(&self, bounds: &LatLngBounds) {
        self.fit_bounds_padded(bounds, None);
    }
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("viewport", &self.viewport.borrow())
            .field("ready", &self.is_ready())
            .field("subscriptions", &self.events.len())
            .finish()
    }
}
