use crate::{
    core::{
        config::{MarkerSelectedCallback, MarkerUnselectedCallback},
        geo::LatLngBounds,
    },
    input::events::{EventKind, MapEvent},
    layers::marker::Marker,
    spatial::clustering::ClusterPin,
    traits::{EventBus, MapControl},
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Event listener callback type
pub type EventCallback = Rc<dyn Fn(&MapEvent)>;

/// Identifies a subscription made through [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// In-process event bus with synchronous delivery in subscription order
#[derive(Default)]
pub struct LocalEventBus {
    listeners: RefCell<Vec<(SubscriptionHandle, EventKind, EventCallback)>>,
    next_handle: Cell<u64>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers the event to every subscriber of its kind.
    ///
    /// The subscriber list is snapshotted first, so handlers may subscribe
    /// or unsubscribe while the event is being delivered.
    pub fn emit(&self, event: &MapEvent) {
        let kind = event.kind();
        let callbacks: Vec<EventCallback> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

impl EventBus for LocalEventBus {
    fn subscribe(&self, kind: EventKind, handler: EventCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.listeners.borrow_mut().push((handle, kind, handler));
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(h, _, _)| *h != handle);
        listeners.len() != before
    }
}

/// Work produced by a state transition, applied once the layer state is no
/// longer borrowed. Anything that calls back into application code goes here.
pub enum Effect {
    /// Deliver an event to a marker's own listeners
    Forward {
        marker: Rc<Marker>,
        kind: EventKind,
        event: MapEvent,
    },
    MarkerSelected {
        callback: MarkerSelectedCallback,
        marker: Rc<Marker>,
        cluster: Option<Rc<ClusterPin>>,
    },
    MarkerUnselected { callback: MarkerUnselectedCallback },
    FitBounds(LatLngBounds),
}

impl Effect {
    pub fn apply(self, map: &dyn MapControl) {
        match self {
            Effect::Forward {
                marker,
                kind,
                event,
            } => marker.fire(kind, &event),
            Effect::MarkerSelected {
                callback,
                marker,
                cluster,
            } => callback(&*marker, cluster.as_deref()),
            Effect::MarkerUnselected { callback } => callback(),
            Effect::FitBounds(bounds) => map.fit_bounds(&bounds),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Forward { marker, kind, .. } => f
                .debug_struct("Forward")
                .field("marker", &marker.id())
                .field("kind", kind)
                .finish(),
            Effect::MarkerSelected {
                marker, cluster, ..
            } => f
                .debug_struct("MarkerSelected")
                .field("marker", &marker.id())
                .field("cluster", &cluster.as_ref().map(|c| c.id.clone()))
                .finish(),
            Effect::MarkerUnselected { .. } => f.write_str("MarkerUnselected"),
            Effect::FitBounds(bounds) => f.debug_tuple("FitBounds").field(bounds).finish(),
        }
    }
}
