use crate::{
    core::geo::LatLng,
    input::{
        events::{EventKind, MapEvent},
        handler::EventCallback,
    },
    prelude::HashMap,
};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Visual options of a pin. Spider proxies copy these from their marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkerOptions {
    pub icon: Option<String>,
    pub label: Option<String>,
    pub color: Option<String>,
    /// Icon hot-spot in pixels, relative to the icon's top-left corner
    pub anchor: Option<(f64, f64)>,
}

impl MarkerOptions {
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_anchor(mut self, x: f64, y: f64) -> Self {
        self.anchor = Some((x, y));
        self
    }
}

/// Identifies a listener registered with [`Marker::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A point marker owned by a cluster layer.
///
/// Markers are shared as `Rc<Marker>`; location, options and listeners use
/// interior mutability so the layer and the application can both hold one.
pub struct Marker {
    id: String,
    location: Cell<LatLng>,
    options: RefCell<MarkerOptions>,
    is_first: bool,
    is_last: bool,
    listeners: RefCell<HashMap<EventKind, Vec<(ListenerId, EventCallback)>>>,
    next_listener: Cell<u64>,
}

impl Marker {
    pub fn new(id: impl Into<String>, location: LatLng, options: MarkerOptions) -> Self {
        Self {
            id: id.into(),
            location: Cell::new(location),
            options: RefCell::new(options),
            is_first: false,
            is_last: false,
            listeners: RefCell::new(HashMap::default()),
            next_listener: Cell::new(0),
        }
    }

    /// Marks this marker as the opening sentinel of a bulk add
    pub fn first_of_batch(mut self) -> Self {
        self.is_first = true;
        self
    }

    /// Marks this marker as the closing sentinel of a bulk add
    pub fn last_of_batch(mut self) -> Self {
        self.is_last = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> LatLng {
        self.location.get()
    }

    /// Moves the marker. A layer holding it only reindexes the marker when
    /// moved through [`ClusterLayer::move_entity`](crate::layers::cluster::ClusterLayer::move_entity).
    pub fn set_location(&self, location: LatLng) {
        self.location.set(location);
    }

    pub fn options(&self) -> MarkerOptions {
        self.options.borrow().clone()
    }

    pub fn set_options(&self, options: MarkerOptions) {
        *self.options.borrow_mut() = options;
    }

    pub fn is_first(&self) -> bool {
        self.is_first
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// Registers a handler for events of `kind` delivered to this marker
    pub fn add_listener<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&MapEvent) + 'static,
    {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(callback)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        for callbacks in listeners.values_mut() {
            if let Some(pos) = callbacks.iter().position(|(lid, _)| *lid == id) {
                callbacks.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listeners
            .borrow()
            .get(&kind)
            .is_some_and(|callbacks| !callbacks.is_empty())
    }

    /// Delivers `event` to every listener registered for `kind`.
    ///
    /// Callbacks run without the registry borrowed, so they may add or
    /// remove listeners on this marker.
    pub fn fire(&self, kind: EventKind, event: &MapEvent) {
        let callbacks: Vec<EventCallback> = self
            .listeners
            .borrow()
            .get(&kind)
            .map(|callbacks| callbacks.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(event);
        }
    }
}

impl std::fmt::Debug for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marker")
            .field("id", &self.id)
            .field("location", &self.location.get())
            .field("options", &self.options.borrow())
            .field("is_first", &self.is_first)
            .field("is_last", &self.is_last)
            .finish_non_exhaustive()
    }
}
