use crate::{
    core::geo::{LatLng, Point},
    layers::{marker::Marker, spider::ProxyId},
    spatial::clustering::ClusterPin,
};
use std::rc::Rc;

/// Event types a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    MouseOver,
    MouseOut,
    ViewChangeStart,
    ViewChangeEnd,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Click => write!(f, "click"),
            EventKind::MouseOver => write!(f, "mouseover"),
            EventKind::MouseOut => write!(f, "mouseout"),
            EventKind::ViewChangeStart => write!(f, "viewchangestart"),
            EventKind::ViewChangeEnd => write!(f, "viewchangeend"),
        }
    }
}

/// Which sort of primitive an entity event landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    ClusterPin,
    OrdinaryMarker,
    SpiderProxy,
}

/// The primitive an entity event targets.
///
/// Every pin this crate puts on the map is one of these, so dispatch is a
/// `match` on the variant.
#[derive(Debug, Clone)]
pub enum Primitive {
    ClusterPin(Rc<ClusterPin>),
    Marker(Rc<Marker>),
    SpiderProxy(ProxyId),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::ClusterPin(_) => PrimitiveKind::ClusterPin,
            Primitive::Marker(_) => PrimitiveKind::OrdinaryMarker,
            Primitive::SpiderProxy(_) => PrimitiveKind::SpiderProxy,
        }
    }

    /// Location of the primitive, unknown for proxies (they live in the overlay)
    pub fn location(&self) -> Option<LatLng> {
        match self {
            Primitive::ClusterPin(pin) => Some(pin.location),
            Primitive::Marker(marker) => Some(marker.location()),
            Primitive::SpiderProxy(_) => None,
        }
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Primitive::ClusterPin(a), Primitive::ClusterPin(b)) => {
                Rc::ptr_eq(a, b) || a.id == b.id
            }
            (Primitive::Marker(a), Primitive::Marker(b)) => Rc::ptr_eq(a, b),
            (Primitive::SpiderProxy(a), Primitive::SpiderProxy(b)) => a == b,
            _ => false,
        }
    }
}

/// Events emitted by the map control.
///
/// One physical input produces exactly one event. Entity events carry their
/// target; a click with no target landed on the map background.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    Click {
        target: Option<Primitive>,
        location: LatLng,
        pixel: Point,
    },
    MouseOver {
        target: Primitive,
        location: LatLng,
        pixel: Point,
    },
    MouseOut {
        target: Primitive,
        location: LatLng,
        pixel: Point,
    },
    /// The view is about to change (pan or zoom started)
    ViewChangeStart { center: LatLng, zoom: f64 },
    /// The view settled after a pan or zoom
    ViewChangeEnd { center: LatLng, zoom: f64 },
}

impl MapEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::Click { .. } => EventKind::Click,
            MapEvent::MouseOver { .. } => EventKind::MouseOver,
            MapEvent::MouseOut { .. } => EventKind::MouseOut,
            MapEvent::ViewChangeStart { .. } => EventKind::ViewChangeStart,
            MapEvent::ViewChangeEnd { .. } => EventKind::ViewChangeEnd,
        }
    }

    /// The targeted primitive, if this is an entity event
    pub fn target(&self) -> Option<&Primitive> {
        match self {
            MapEvent::Click { target, .. } => target.as_ref(),
            MapEvent::MouseOver { target, .. } | MapEvent::MouseOut { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Checks if this is a click on the map background
    pub fn is_background_click(&self) -> bool {
        matches!(self, MapEvent::Click { target: None, .. })
    }
}
