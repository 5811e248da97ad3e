use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    core::{config::StickStyle, geo::LatLng},
    impl_default_options_serialization, impl_layer_trait,
    layers::{
        base::{LayerProperties, LayerTrait, LayerType},
        marker::MarkerOptions,
    },
    Result,
};

/// Source of overlay primitive ids, shared by every surface in the process
static NEXT_PRIMITIVE_ID: AtomicU64 = AtomicU64::new(1);

fn next_primitive_id() -> u64 {
    NEXT_PRIMITIVE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifies a proxy pin placed on the spider overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub u64);

/// Identifies a stick (line) placed on the spider overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StickId(pub u64);

/// Rendering calls the spider needs from a map provider.
///
/// Ids are never reused, even across `clear()`.
pub trait OverlaySurface {
    fn insert_line(&mut self, from: LatLng, to: LatLng, style: &StickStyle) -> StickId;

    fn insert_pin(&mut self, location: LatLng, options: &MarkerOptions) -> ProxyId;

    /// Restyles a line; unknown ids are ignored
    fn set_line_style(&mut self, stick: StickId, style: &StickStyle);

    /// Removes every primitive at once
    fn clear(&mut self);
}

/// A pin standing in for one cluster member while the spider is open
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyPin {
    pub id: ProxyId,
    pub location: LatLng,
    pub options: MarkerOptions,
}

/// A line from the cluster center to a proxy pin
#[derive(Debug, Clone, PartialEq)]
pub struct Stick {
    pub id: StickId,
    pub from: LatLng,
    pub to: LatLng,
    pub style: StickStyle,
}

/// Dedicated overlay layer holding the spider's sticks and proxy pins
pub struct SpiderLayer {
    properties: LayerProperties,
    pins: Vec<ProxyPin>,
    sticks: Vec<Stick>,
    clears: usize,
}

impl SpiderLayer {
    pub fn new(id: String) -> Self {
        let mut properties =
            LayerProperties::new(id, "Spider Overlay".to_string(), LayerType::SpiderOverlay);
        // above the cluster pins
        properties.z_index = 1;

        Self {
            properties,
            pins: Vec::new(),
            sticks: Vec::new(),
            clears: 0,
        }
    }

    pub fn pins(&self) -> &[ProxyPin] {
        &self.pins
    }

    pub fn sticks(&self) -> &[Stick] {
        &self.sticks
    }

    pub fn stick(&self, id: StickId) -> Option<&Stick> {
        self.sticks.iter().find(|s| s.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty() && self.sticks.is_empty()
    }

    /// Number of `clear()` calls so far
    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

impl OverlaySurface for SpiderLayer {
    fn insert_line(&mut self, from: LatLng, to: LatLng, style: &StickStyle) -> StickId {
        let id = StickId(next_primitive_id());
        self.sticks.push(Stick {
            id,
            from,
            to,
            style: style.clone(),
        });
        id
    }

    fn insert_pin(&mut self, location: LatLng, options: &MarkerOptions) -> ProxyId {
        let id = ProxyId(next_primitive_id());
        self.pins.push(ProxyPin {
            id,
            location,
            options: options.clone(),
        });
        id
    }

    fn set_line_style(&mut self, stick: StickId, style: &StickStyle) {
        if let Some(line) = self.sticks.iter_mut().find(|s| s.id == stick) {
            line.style = style.clone();
        }
    }

    fn clear(&mut self) {
        self.pins.clear();
        self.sticks.clear();
        self.clears += 1;
    }
}

impl LayerTrait for SpiderLayer {
    impl_layer_trait!(SpiderLayer, properties);
    impl_default_options_serialization!(properties);

    fn set_options(&mut self, options: serde_json::Value) -> Result<()> {
        if let Some(z_index) = options.get("zIndex").and_then(|v| v.as_i64()) {
            self.properties.z_index = z_index as i32;
        }
        if let Some(visible) = options.get("visible").and_then(|v| v.as_bool()) {
            self.properties.visible = visible;
        }
        if let Some(opacity) = options.get("opacity").and_then(|v| v.as_f64()) {
            self.set_opacity(opacity as f32);
        }
        Ok(())
    }
}

impl std::fmt::Debug for SpiderLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiderLayer")
            .field("id", &self.properties.id)
            .field("pins", &self.pins.len())
            .field("sticks", &self.sticks.len())
            .finish()
    }
}
