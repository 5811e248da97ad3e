//! Clustered marker layer with optional spidering
//!
//! Markers added to the layer are grouped by the grid clusterer. All event
//! handling goes through [`ClusterState`], which sits behind a `RefCell`
//! shared with the map subscriptions. Handlers only ever hold a `Weak` to it,
//! and user callbacks run after the borrow has been released.

use crate::{
    core::{
        config::{merge_over, ClusterClickAction, ClusterLayerOptions, SpiderClusterOptions},
        geo::LatLng,
    },
    impl_layer_trait,
    input::{
        events::{EventKind, MapEvent, Primitive},
        handler::{Effect, EventCallback, SubscriptionHandle},
    },
    layers::{
        base::{LayerProperties, LayerTrait, LayerType},
        marker::Marker,
        spider::{ProxyPin, Stick},
    },
    prelude::HashMap,
    spatial::{
        clustering::{ClusterPin, Clustering},
        index::SpatialItem,
    },
    spider::{coordinator::EventCoordinator, state::SpiderPhase},
    traits::{MapControl, MapView},
    MapError, Result,
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

const SUBSCRIBED_EVENTS: [EventKind; 5] = [
    EventKind::Click,
    EventKind::MouseOver,
    EventKind::MouseOut,
    EventKind::ViewChangeStart,
    EventKind::ViewChangeEnd,
];

/// Marker buckets, the clusterer and the spider of one layer
pub struct ClusterState {
    options: ClusterLayerOptions,
    clustering: Clustering<Rc<Marker>>,
    /// Every marker owned by the layer, pending ones included
    markers: HashMap<String, Rc<Marker>>,
    /// Markers added while clustering is stopped
    pending: Vec<Rc<Marker>>,
    clustering_active: bool,
    native_revision: u64,
    clusters: Vec<Primitive>,
    spider: Option<EventCoordinator>,
}

impl ClusterState {
    pub fn new(options: ClusterLayerOptions) -> Self {
        let mut clustering = Clustering::new(options.clustering.clone());
        clustering.set_enabled(options.clustering_enabled);

        Self {
            options,
            clustering,
            markers: HashMap::default(),
            pending: Vec::new(),
            clustering_active: true,
            native_revision: 0,
            clusters: Vec::new(),
            spider: None,
        }
    }

    pub fn add_entity<V: MapView + ?Sized>(&mut self, marker: Rc<Marker>, view: &V) {
        if marker.is_first() {
            self.stop_clustering();
        }

        let is_last = marker.is_last();
        self.markers.insert(marker.id().to_string(), marker.clone());
        if self.clustering_active {
            self.clustering.add_item(item_for(&marker));
            self.native_update(view);
        } else {
            self.pending.push(marker);
        }

        if is_last {
            self.start_clustering(view);
        }
    }

    pub fn remove_entity<V: MapView + ?Sized>(
        &mut self,
        id: &str,
        view: &V,
    ) -> Option<Rc<Marker>> {
        let marker = self.markers.remove(id)?;

        if let Some(pos) = self.pending.iter().position(|m| m.id() == id) {
            self.pending.remove(pos);
        } else if self.clustering.remove_item(id).is_some() {
            self.native_update(view);
        }
        Some(marker)
    }

    /// Moves a marker and reindexes it. Returns `false` for unknown ids.
    pub fn move_entity<V: MapView + ?Sized>(
        &mut self,
        id: &str,
        location: LatLng,
        view: &V,
    ) -> bool {
        let Some(marker) = self.markers.get(id).cloned() else {
            return false;
        };
        marker.set_location(location);

        // pending markers are indexed with their new location on flush
        if self.clustering.remove_item(id).is_some() {
            self.clustering.add_item(item_for(&marker));
            self.native_update(view);
        }
        true
    }

    /// Replaces every marker in one update; nothing stays pending
    pub fn set_entities<V: MapView + ?Sized>(&mut self, markers: Vec<Rc<Marker>>, view: &V) {
        self.pending.clear();
        self.markers = markers
            .iter()
            .map(|m| (m.id().to_string(), m.clone()))
            .collect();
        self.clustering
            .set_items(markers.iter().map(item_for).collect());
        self.native_update(view);
    }

    pub fn clear<V: MapView + ?Sized>(&mut self, view: &V) {
        self.pending.clear();
        self.markers.clear();
        self.clustering.clear();
        self.native_update(view);
    }

    /// Holds back added markers until [`ClusterState::start_clustering`]
    pub fn stop_clustering(&mut self) {
        if self.clustering_active {
            log::debug!("clustering stopped, queueing additions");
        }
        self.clustering_active = false;
    }

    /// Flushes everything queued since [`ClusterState::stop_clustering`] in
    /// a single update
    pub fn start_clustering<V: MapView + ?Sized>(&mut self, view: &V) {
        self.clustering_active = true;
        if self.pending.is_empty() {
            return;
        }

        log::debug!("clustering started, flushing {} markers", self.pending.len());
        let items = std::mem::take(&mut self.pending)
            .iter()
            .map(item_for)
            .collect();
        self.clustering.extend_items(items);
        self.native_update(view);
    }

    pub fn is_clustering_active(&self) -> bool {
        self.clustering_active
    }

    /// Shows every marker on its own when `false`
    pub fn set_clustering_enabled<V: MapView + ?Sized>(&mut self, enabled: bool, view: &V) {
        self.options.clustering_enabled = enabled;
        self.clustering.set_enabled(enabled);
        self.recluster(view);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn entity_count(&self) -> usize {
        self.markers.len()
    }

    pub fn entity(&self, id: &str) -> Option<Rc<Marker>> {
        self.markers.get(id).cloned()
    }

    /// Number of updates pushed to the clusterer's marker list
    pub fn native_revision(&self) -> u64 {
        self.native_revision
    }

    /// What is currently on the map: cluster pins and unclustered markers
    pub fn clusters(&self) -> &[Primitive] {
        &self.clusters
    }

    pub fn spider(&self) -> Option<&EventCoordinator> {
        self.spider.as_ref()
    }

    /// Installs the spider. Returns `false` when it already was installed.
    pub fn install_spider(&mut self, options: SpiderClusterOptions, zoom: f64) -> Result<bool> {
        if self.spider.is_some() {
            return Ok(false);
        }
        options.validate()?;

        let mut coordinator = EventCoordinator::new(options.clone());
        coordinator.observe_zoom(zoom);
        self.spider = Some(coordinator);
        self.options.spider = options;
        self.options.click_action = ClusterClickAction::Spider;
        log::debug!("spider support installed on layer {}", self.options.id);
        Ok(true)
    }

    /// Collapses the spider if one is open
    pub fn collapse_spider(&mut self) -> Vec<Effect> {
        self.spider
            .as_mut()
            .map(EventCoordinator::collapse)
            .unwrap_or_default()
    }

    /// Collapses the spider when one of the markers it shows is `affected`
    fn collapse_if_showing<F>(&mut self, affected: F) -> Vec<Effect>
    where
        F: Fn(&Rc<Marker>) -> bool,
    {
        let showing = self
            .spider
            .as_ref()
            .and_then(|spider| spider.state().current.clone())
            .is_some_and(|current| current.members().iter().any(|m| affected(m)));
        if !showing {
            return Vec::new();
        }
        log::debug!("markers of the expanded cluster changed, collapsing spider");
        self.collapse_spider()
    }

    fn native_update<V: MapView + ?Sized>(&mut self, view: &V) {
        self.native_revision += 1;
        self.recluster(view);
    }

    fn recluster<V: MapView + ?Sized>(&mut self, view: &V) {
        self.clusters = self
            .clustering
            .get_clusters(view)
            .into_iter()
            .filter_map(|cluster| {
                if cluster.is_single() {
                    cluster
                        .items
                        .into_iter()
                        .next()
                        .map(|item| Primitive::Marker(item.data))
                } else {
                    Some(Primitive::ClusterPin(Rc::new(ClusterPin::from(cluster))))
                }
            })
            .collect();
    }

    /// Whether an event target was produced by this layer
    fn owns(&self, target: &Primitive) -> bool {
        match target {
            Primitive::ClusterPin(pin) => self
                .clusters
                .iter()
                .any(|p| matches!(p, Primitive::ClusterPin(own) if Rc::ptr_eq(own, pin))),
            Primitive::Marker(marker) => self
                .markers
                .get(marker.id())
                .is_some_and(|own| Rc::ptr_eq(own, marker)),
            Primitive::SpiderProxy(id) => self
                .spider
                .as_ref()
                .is_some_and(|spider| spider.state().proxy(*id).is_some()),
        }
    }

    /// Routes one map event and returns the work to do once the state is
    /// released
    pub fn handle_event<V: MapView + ?Sized>(
        &mut self,
        view: &V,
        event: &MapEvent,
    ) -> Vec<Effect> {
        if let Some(target) = event.target() {
            if !self.owns(target) {
                return Vec::new();
            }
        }

        let mut effects = Vec::new();
        match event {
            MapEvent::Click {
                target: Some(Primitive::ClusterPin(cluster)),
                ..
            } => match self.options.click_action {
                ClusterClickAction::None => {}
                ClusterClickAction::ZoomIntoCluster => {
                    effects.push(Effect::FitBounds(cluster.bounds.clone()));
                }
                ClusterClickAction::Spider => match self.spider.as_mut() {
                    Some(spider) => effects.extend(spider.handle(view, event)),
                    None => log::warn!(
                        "layer {} spiders on click but has no spider support",
                        self.options.id
                    ),
                },
            },
            _ => {
                if let Some(spider) = self.spider.as_mut() {
                    effects.extend(spider.handle(view, event));
                }
            }
        }

        // the marker's own listeners always hear about events on it
        if let Some(Primitive::Marker(marker)) = event.target() {
            effects.push(Effect::Forward {
                marker: marker.clone(),
                kind: event.kind(),
                event: event.clone(),
            });
        }

        if let MapEvent::ViewChangeEnd { .. } = event {
            self.recluster(view);
        }

        effects
    }
}

impl std::fmt::Debug for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterState")
            .field("entities", &self.markers.len())
            .field("pending", &self.pending.len())
            .field("clustering_active", &self.clustering_active)
            .field("native_revision", &self.native_revision)
            .field("clusters", &self.clusters.len())
            .field("spider", &self.spider)
            .finish()
    }
}

fn item_for(marker: &Rc<Marker>) -> SpatialItem<Rc<Marker>> {
    SpatialItem::from_lat_lng(marker.id().to_string(), marker.location(), marker.clone())
}

fn apply_effects(effects: Vec<Effect>, map: &dyn MapControl) {
    for effect in effects {
        log::trace!("applying {effect:?}");
        effect.apply(map);
    }
}

fn dispatch(state: &RefCell<ClusterState>, map: &dyn MapControl, event: &MapEvent) {
    // the borrow ends with this statement
    let effects = state.borrow_mut().handle_event(map, event);
    apply_effects(effects, map);
}

/// A map layer that clusters its markers and can spider clusters open
pub struct ClusterLayer {
    properties: LayerProperties,
    map: Rc<dyn MapControl>,
    state: Rc<RefCell<ClusterState>>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl ClusterLayer {
    /// Waits for the map to be ready, then attaches a new layer to it
    pub async fn create(map: &Rc<dyn MapControl>, options: ClusterLayerOptions) -> Result<Self> {
        map.when_ready().await?;

        let mut properties = LayerProperties::new(
            options.id.clone(),
            options.name.clone(),
            LayerType::Cluster,
        );
        properties.z_index = options.z_index;
        properties.visible = options.visible;

        let spider_on_click = options.click_action == ClusterClickAction::Spider;
        let spider_options = options.spider.clone();
        let state = Rc::new(RefCell::new(ClusterState::new(options)));

        let mut layer = Self {
            properties,
            map: map.clone(),
            state,
            subscriptions: Vec::new(),
        };
        layer.subscribe();

        if spider_on_click {
            layer.initialize_spider_cluster_support(Some(spider_options))?;
        }
        log::debug!("cluster layer {} created", layer.properties.id);
        Ok(layer)
    }

    fn subscribe(&mut self) {
        let handler: EventCallback = {
            let state: Weak<RefCell<ClusterState>> = Rc::downgrade(&self.state);
            let map: Weak<dyn MapControl> = Rc::downgrade(&self.map);
            Rc::new(move |event: &MapEvent| {
                if let (Some(state), Some(map)) = (state.upgrade(), map.upgrade()) {
                    dispatch(&state, &*map, event);
                }
            })
        };

        self.subscriptions = SUBSCRIBED_EVENTS
            .iter()
            .map(|kind| self.map.subscribe(*kind, handler.clone()))
            .collect();
    }

    /// Runs `f` on the state with the map as view, then applies whatever
    /// effects it produced
    fn with_state<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut ClusterState, &dyn MapControl) -> (R, Vec<Effect>),
    {
        let (result, effects) = f(&mut self.state.borrow_mut(), &*self.map);
        apply_effects(effects, &*self.map);
        result
    }

    pub fn add_entity(&self, marker: Rc<Marker>) {
        self.state.borrow_mut().add_entity(marker, &*self.map);
    }

    /// Removes a marker, collapsing the spider if it shows that marker
    pub fn remove_entity(&self, id: &str) -> Option<Rc<Marker>> {
        self.with_state(|state, map| {
            let removed = state.remove_entity(id, map);
            let effects = match removed {
                Some(_) => state.collapse_if_showing(|m| m.id() == id),
                None => Vec::new(),
            };
            (removed, effects)
        })
    }

    /// Moves a marker so the clusterer sees its new location
    pub fn move_entity(&self, id: &str, location: LatLng) -> bool {
        self.with_state(|state, map| {
            let effects = state.collapse_if_showing(|m| m.id() == id);
            (state.move_entity(id, location, map), effects)
        })
    }

    pub fn set_entities(&self, markers: Vec<Rc<Marker>>) {
        self.with_state(|state, map| {
            let effects =
                state.collapse_if_showing(|m| !markers.iter().any(|kept| Rc::ptr_eq(kept, m)));
            state.set_entities(markers, map);
            ((), effects)
        });
    }

    /// Removes every marker, closing the spider first
    pub fn clear(&self) {
        self.with_state(|state, map| {
            let effects = state.collapse_spider();
            state.clear(map);
            ((), effects)
        });
    }

    pub fn stop_clustering(&self) {
        self.state.borrow_mut().stop_clustering();
    }

    pub fn start_clustering(&self) {
        self.state.borrow_mut().start_clustering(&*self.map);
    }

    pub fn set_clustering_enabled(&self, enabled: bool) {
        self.state
            .borrow_mut()
            .set_clustering_enabled(enabled, &*self.map);
    }

    pub fn is_clustering_enabled(&self) -> bool {
        self.state.borrow().options.clustering_enabled
    }

    pub fn entity(&self, id: &str) -> Option<Rc<Marker>> {
        self.state.borrow().entity(id)
    }

    pub fn entity_count(&self) -> usize {
        self.state.borrow().entity_count()
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending_count()
    }

    pub fn native_revision(&self) -> u64 {
        self.state.borrow().native_revision()
    }

    pub fn clusters(&self) -> Vec<Primitive> {
        self.state.borrow().clusters().to_vec()
    }

    /// Only the aggregate pins among [`ClusterLayer::clusters`]
    pub fn cluster_pins(&self) -> Vec<Rc<ClusterPin>> {
        self.state
            .borrow()
            .clusters()
            .iter()
            .filter_map(|p| match p {
                Primitive::ClusterPin(pin) => Some(pin.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn click_action(&self) -> ClusterClickAction {
        self.state.borrow().options.click_action
    }

    /// Adds spidering to this layer. Options left out fall back to the ones
    /// the layer was created with. Returns `Ok(false)` if spidering was
    /// already installed.
    pub fn initialize_spider_cluster_support(
        &mut self,
        options: Option<SpiderClusterOptions>,
    ) -> Result<bool> {
        let zoom = self.map.zoom();
        let mut state = self.state.borrow_mut();
        let options = options.unwrap_or_else(|| state.options.spider.clone());
        state.install_spider(options, zoom)
    }

    pub fn has_spider_support(&self) -> bool {
        self.state.borrow().spider.is_some()
    }

    pub fn spider_phase(&self) -> SpiderPhase {
        self.state
            .borrow()
            .spider()
            .map_or(SpiderPhase::Collapsed, EventCoordinator::phase)
    }

    pub fn expanded_cluster(&self) -> Option<Rc<ClusterPin>> {
        match self.spider_phase() {
            SpiderPhase::Expanded(cluster) => Some(cluster),
            SpiderPhase::Collapsed => None,
        }
    }

    /// Proxy pins currently on the spider overlay
    pub fn spider_pins(&self) -> Vec<ProxyPin> {
        self.state
            .borrow()
            .spider()
            .map(|spider| spider.renderer().surface().pins().to_vec())
            .unwrap_or_default()
    }

    pub fn spider_sticks(&self) -> Vec<Stick> {
        self.state
            .borrow()
            .spider()
            .map(|spider| spider.renderer().surface().sticks().to_vec())
            .unwrap_or_default()
    }

    /// Current spider options, if spidering is installed
    pub fn spider_options(&self) -> Option<SpiderClusterOptions> {
        self.state
            .borrow()
            .spider()
            .map(|spider| spider.options().clone())
    }

    /// Collapses an open spider, notifying `on_marker_unselected`
    pub fn collapse_spider(&self) {
        self.with_state(|state, _| ((), state.collapse_spider()));
    }

    /// Detaches the layer from the map. The spider overlay is cleared
    /// without notifying callbacks. Also runs on drop.
    pub fn delete(&mut self) {
        for handle in self.subscriptions.drain(..) {
            self.map.unsubscribe(handle);
        }
        if let Ok(mut state) = self.state.try_borrow_mut() {
            let _ = state.collapse_spider();
        }
    }
}

impl LayerTrait for ClusterLayer {
    impl_layer_trait!(ClusterLayer, properties);

    fn options(&self) -> serde_json::Value {
        let mut options = self.state.borrow().options.clone();
        options.id = self.properties.id.clone();
        options.name = self.properties.name.clone();
        options.z_index = self.properties.z_index;
        options.visible = self.properties.visible;

        let mut value = serde_json::to_value(&options).unwrap_or_default();
        value["opacity"] = serde_json::json!(self.properties.opacity);
        value
    }

    fn set_options(&mut self, patch: serde_json::Value) -> Result<()> {
        let spider_patch = patch.get("spider").cloned();
        let mut state = self.state.borrow_mut();

        let mut merged: ClusterLayerOptions = merge_over(&state.options, patch.clone())?;
        merged.spider.validate()?;
        merged.spider.on_marker_selected = state.options.spider.on_marker_selected.clone();
        merged.spider.on_marker_unselected = state.options.spider.on_marker_unselected.clone();

        if let Some(spider) = state.spider.as_mut() {
            if let Some(spider_patch) = spider_patch {
                spider.options_mut().merge_value(spider_patch)?;
            }
        }
        if merged.clustering != state.options.clustering {
            state.clustering.set_config(merged.clustering.clone());
        }
        state.clustering.set_enabled(merged.clustering_enabled);

        self.properties.name = merged.name.clone();
        self.properties.z_index = merged.z_index;
        self.properties.visible = merged.visible;
        if let Some(opacity) = patch.get("opacity").and_then(|v| v.as_f64()) {
            self.properties.opacity = (opacity as f32).clamp(0.0, 1.0);
        }
        // the id is fixed once the layer exists
        merged.id = self.properties.id.clone();
        state.options = merged;

        state.recluster(&*self.map);
        Ok(())
    }
}

impl Drop for ClusterLayer {
    fn drop(&mut self) {
        self.delete();
    }
}

impl std::fmt::Debug for ClusterLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterLayer")
            .field("properties", &self.properties)
            .field("subscriptions", &self.subscriptions.len())
            .field("state", &self.state.try_borrow().ok())
            .finish()
    }
}

/// Adds spidering to `layer`, which must be a [`ClusterLayer`]
pub fn initialize_spider_support(
    layer: &mut dyn LayerTrait,
    options: Option<SpiderClusterOptions>,
) -> Result<bool> {
    let id = layer.id().to_string();
    match layer.as_any_mut().downcast_mut::<ClusterLayer>() {
        Some(cluster_layer) => cluster_layer.initialize_spider_cluster_support(options),
        None => Err(MapError::Layer(format!(
            "layer {id} is not a cluster layer, cannot add spider support"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            geo::{LatLng, Point},
            map::Map,
            viewport::Viewport,
        },
        layers::{marker::MarkerOptions, spider::SpiderLayer},
    };
    use futures::FutureExt;
    use serde_json::json;
    use std::cell::Cell;

    fn map() -> Rc<Map> {
        Rc::new(Map::new(Viewport::new(
            LatLng::new(47.6, -122.3),
            12.0,
            Point::new(800.0, 600.0),
        )))
    }

    fn layer(map: &Rc<Map>, options: ClusterLayerOptions) -> ClusterLayer {
        let control: Rc<dyn MapControl> = map.clone();
        ClusterLayer::create(&control, options)
            .now_or_never()
            .expect("map is ready")
            .unwrap()
    }

    fn marker(id: &str, lat: f64, lng: f64) -> Rc<Marker> {
        Rc::new(Marker::new(id, LatLng::new(lat, lng), MarkerOptions::default()))
    }

    #[test]
    fn test_add_and_remove_entities() {
        let map = map();
        let layer = layer(&map, ClusterLayerOptions::default());

        layer.add_entity(marker("a", 47.6, -122.3));
        layer.add_entity(marker("b", 47.6, -122.3));
        layer.add_entity(marker("c", 47.6, -122.23));
        assert_eq!(layer.native_revision(), 3);
        assert_eq!(layer.entity_count(), 3);
        assert_eq!(layer.cluster_pins().len(), 1);
        assert_eq!(layer.clusters().len(), 2);

        assert!(layer.remove_entity("a").is_some());
        assert!(layer.remove_entity("a").is_none());
        assert!(layer.cluster_pins().is_empty());
        assert_eq!(layer.native_revision(), 4);
    }

    #[test]
    fn test_batch_flags_flush_once() {
        let map = map();
        let layer = layer(&map, ClusterLayerOptions::default());

        let first = Rc::new(
            Marker::new("m0", LatLng::new(47.6, -122.3), MarkerOptions::default())
                .first_of_batch(),
        );
        layer.add_entity(first);
        for i in 1..4 {
            layer.add_entity(marker(&format!("m{i}"), 47.6, -122.3));
        }
        assert_eq!(layer.native_revision(), 0);
        assert_eq!(layer.pending_count(), 4);
        assert!(layer.clusters().is_empty());

        let last = Rc::new(
            Marker::new("m4", LatLng::new(47.6, -122.3), MarkerOptions::default())
                .last_of_batch(),
        );
        layer.add_entity(last);
        assert_eq!(layer.native_revision(), 1);
        assert_eq!(layer.pending_count(), 0);
        assert_eq!(layer.cluster_pins()[0].len(), 5);
    }

    #[test]
    fn test_explicit_stop_start_and_set_entities() {
        let map = map();
        let layer = layer(&map, ClusterLayerOptions::default());

        layer.stop_clustering();
        layer.add_entity(marker("a", 47.6, -122.3));
        layer.add_entity(marker("b", 47.6, -122.3));
        // pending markers can be removed before they are ever clustered
        layer.remove_entity("b");
        layer.start_clustering();
        assert_eq!(layer.native_revision(), 1);
        assert_eq!(layer.clusters().len(), 1);

        layer.set_entities(vec![marker("x", 47.6, -122.3), marker("y", 47.6, -122.3)]);
        assert_eq!(layer.native_revision(), 2);
        assert!(layer.entity("a").is_none());
        assert_eq!(layer.cluster_pins()[0].len(), 2);

        layer.clear();
        assert_eq!(layer.entity_count(), 0);
        assert!(layer.clusters().is_empty());
    }

    #[test]
    fn test_disable_clustering() {
        let map = map();
        let layer = layer(&map, ClusterLayerOptions::default());
        layer.set_entities(vec![marker("a", 47.6, -122.3), marker("b", 47.6, -122.3)]);
        assert_eq!(layer.clusters().len(), 1);

        layer.set_clustering_enabled(false);
        assert!(!layer.is_clustering_enabled());
        assert_eq!(layer.clusters().len(), 2);
        assert!(layer.cluster_pins().is_empty());
    }

    #[test]
    fn test_zoom_into_cluster() {
        let map = map();
        let layer = layer(&map, ClusterLayerOptions::default());
        layer.set_entities(vec![marker("a", 47.6, -122.3), marker("b", 47.601, -122.301)]);
        let pin = layer.cluster_pins()[0].clone();

        map.click(Some(Primitive::ClusterPin(pin)), Point::new(400.0, 300.0));

        assert!(map.zoom() > 12.0);
        assert!(!layer.has_spider_support());
    }

    #[test]
    fn test_spider_click_action_installs_support() {
        let map = map();
        let mut layer = layer(
            &map,
            ClusterLayerOptions::default().with_click_action(ClusterClickAction::Spider),
        );
        assert!(layer.has_spider_support());
        assert!(!layer.initialize_spider_cluster_support(None).unwrap());

        layer.set_entities(vec![marker("a", 47.6, -122.3), marker("b", 47.6, -122.3)]);
        let pin = layer.cluster_pins()[0].clone();
        map.click(Some(Primitive::ClusterPin(pin.clone())), Point::new(400.0, 300.0));

        assert_eq!(layer.expanded_cluster().unwrap().id, pin.id);
        assert_eq!(layer.spider_pins().len(), 2);
        assert_eq!(layer.spider_sticks().len(), 2);
        assert_eq!(map.zoom(), 12.0);
    }

    #[test]
    fn test_marker_listeners_and_selection() {
        let map = map();
        let selected = Rc::new(RefCell::new(Vec::new()));
        let sink = selected.clone();
        let options = ClusterLayerOptions::default()
            .with_click_action(ClusterClickAction::Spider)
            .with_spider(SpiderClusterOptions::default().with_marker_selected(
                move |marker, cluster| {
                    sink.borrow_mut()
                        .push((marker.id().to_string(), cluster.is_some()))
                },
            ));
        let layer = layer(&map, options);

        let solo = marker("solo", 47.6, -122.3);
        let clicks = Rc::new(Cell::new(0));
        let counter = clicks.clone();
        solo.add_listener(EventKind::Click, move |_| counter.set(counter.get() + 1));
        layer.add_entity(solo.clone());

        layer.add_entity(marker("a", 47.6, -122.23));
        layer.add_entity(marker("b", 47.6, -122.23));

        // nothing is expanded, so only the marker's listeners hear the click
        map.click(Some(Primitive::Marker(solo.clone())), Point::new(400.0, 300.0));
        assert_eq!(clicks.get(), 1);
        assert!(selected.borrow().is_empty());

        let pin = layer.cluster_pins()[0].clone();
        map.click(Some(Primitive::ClusterPin(pin)), Point::new(400.0, 300.0));
        map.click(Some(Primitive::Marker(solo.clone())), Point::new(400.0, 300.0));
        assert_eq!(clicks.get(), 2);
        assert_eq!(*selected.borrow(), vec![("solo".to_string(), false)]);

        // markers of other layers are not ours to forward
        let stranger = marker("solo", 47.6, -122.3);
        map.click(Some(Primitive::Marker(stranger)), Point::new(400.0, 300.0));
        assert_eq!(selected.borrow().len(), 1);
    }

    #[test]
    fn test_initialize_on_wrong_layer_type() {
        let mut overlay = SpiderLayer::new("overlay".to_string());
        let err = initialize_spider_support(&mut overlay, None);
        assert!(matches!(err, Err(MapError::Layer(_))));

        let map = map();
        let mut layer = layer(&map, ClusterLayerOptions::default());
        assert!(initialize_spider_support(&mut layer, None).unwrap());
        assert!(!initialize_spider_support(&mut layer, None).unwrap());
        assert_eq!(layer.click_action(), ClusterClickAction::Spider);
    }

    #[test]
    fn test_invalid_spider_options_are_rejected() {
        let map = map();
        let mut layer = layer(&map, ClusterLayerOptions::default());
        let options = SpiderClusterOptions {
            min_circle_length: 0.0,
            ..SpiderClusterOptions::default()
        };

        assert!(layer.initialize_spider_cluster_support(Some(options)).is_err());
        assert!(!layer.has_spider_support());
    }

    #[test]
    fn test_set_options_merges() {
        let map = map();
        let mut layer = layer(
            &map,
            ClusterLayerOptions::default().with_click_action(ClusterClickAction::Spider),
        );

        layer
            .set_options(json!({
                "zIndex": 3,
                "clustering": { "gridSize": 30.0 },
                "spider": { "collapseOnNthClick": 2 },
            }))
            .unwrap();

        assert_eq!(layer.z_index(), 3);
        assert_eq!(layer.spider_options().unwrap().collapse_on_nth_click, 2);
        let options = layer.options();
        assert_eq!(options["clustering"]["gridSize"], 30.0);
        assert_eq!(options["clustering"]["maxClusterSize"], 100);
        assert_eq!(options["clickAction"], "spider");

        assert!(layer.set_options(json!({ "spider": { "minCircleLength": -4 } })).is_err());
        assert_eq!(layer.spider_options().unwrap().min_circle_length, 60.0);
    }

    #[test]
    fn test_delete_unsubscribes() {
        let map = map();
        let before = map.subscription_count();
        {
            let _layer = layer(&map, ClusterLayerOptions::default());
            assert_eq!(map.subscription_count(), before + SUBSCRIBED_EVENTS.len());
        }
        assert_eq!(map.subscription_count(), before);
    }

    fn spider_layer(map: &Rc<Map>) -> (ClusterLayer, Rc<Cell<u32>>) {
        let unselected = Rc::new(Cell::new(0));
        let counter = unselected.clone();
        let options = ClusterLayerOptions::default()
            .with_click_action(ClusterClickAction::Spider)
            .with_spider(
                SpiderClusterOptions::default()
                    .with_marker_unselected(move || counter.set(counter.get() + 1)),
            );
        (layer(map, options), unselected)
    }

    fn expand_first_pin(map: &Map, layer: &ClusterLayer) -> Rc<ClusterPin> {
        let pin = layer.cluster_pins()[0].clone();
        map.click(Some(Primitive::ClusterPin(pin.clone())), Point::new(400.0, 300.0));
        pin
    }

    #[test]
    fn test_delete_clears_spider_without_callbacks() {
        let map = map();
        let before = map.subscription_count();
        let (mut layer, unselected) = spider_layer(&map);
        layer.set_entities(vec![marker("a", 47.6, -122.3), marker("b", 47.6, -122.3)]);
        let pin = expand_first_pin(&map, &layer);
        assert_eq!(layer.spider_pins().len(), 2);
        assert_eq!(layer.spider_sticks().len(), 2);

        layer.delete();

        assert!(layer.spider_pins().is_empty());
        assert!(layer.spider_sticks().is_empty());
        assert_eq!(layer.spider_phase(), SpiderPhase::Collapsed);
        assert_eq!(unselected.get(), 0);
        assert_eq!(map.subscription_count(), before);

        // detached: clicks no longer reach the layer
        map.click(Some(Primitive::ClusterPin(pin)), Point::new(400.0, 300.0));
        assert!(layer.spider_pins().is_empty());
    }

    #[test]
    fn test_removing_shown_marker_collapses() {
        let map = map();
        let (layer, unselected) = spider_layer(&map);
        layer.set_entities(vec![
            marker("a", 47.6, -122.3),
            marker("b", 47.6, -122.3),
            marker("c", 47.6, -122.3),
            marker("far", 47.6, -122.23),
        ]);
        expand_first_pin(&map, &layer);

        // not part of the spider
        layer.remove_entity("far");
        assert!(layer.expanded_cluster().is_some());

        layer.remove_entity("b");
        assert!(layer.expanded_cluster().is_none());
        assert!(layer.spider_pins().is_empty());
        assert_eq!(unselected.get(), 1);
    }

    #[test]
    fn test_replacing_shown_markers_collapses() {
        let map = map();
        let (layer, _unselected) = spider_layer(&map);
        let (a, b) = (marker("a", 47.6, -122.3), marker("b", 47.6, -122.3));
        layer.set_entities(vec![a.clone(), b.clone()]);
        expand_first_pin(&map, &layer);

        // the same markers plus one more keep the spider open
        layer.set_entities(vec![a.clone(), b, marker("far", 47.6, -122.23)]);
        assert!(layer.expanded_cluster().is_some());

        layer.set_entities(vec![a]);
        assert!(layer.expanded_cluster().is_none());
    }

    #[test]
    fn test_move_entity_reindexes() {
        let map = map();
        let layer = layer(&map, ClusterLayerOptions::default());
        layer.set_entities(vec![marker("a", 47.6, -122.3), marker("b", 47.6, -122.23)]);
        assert!(layer.cluster_pins().is_empty());
        let revision = layer.native_revision();

        assert!(layer.move_entity("b", LatLng::new(47.6, -122.3)));
        assert_eq!(layer.native_revision(), revision + 1);
        assert_eq!(layer.cluster_pins()[0].len(), 2);
        assert_eq!(layer.entity("b").unwrap().location(), LatLng::new(47.6, -122.3));

        assert!(!layer.move_entity("missing", LatLng::new(0.0, 0.0)));
    }

    fn summary(layer: &ClusterLayer) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = layer
            .clusters()
            .iter()
            .map(|p| match p {
                Primitive::ClusterPin(pin) => (pin.id.clone(), pin.len()),
                Primitive::Marker(m) => (m.id().to_string(), 1),
                Primitive::SpiderProxy(id) => (format!("{id:?}"), 0),
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_large_batch_flush_matches_set_entities() {
        let map = map();
        let markers: Vec<Rc<Marker>> = (0..3000)
            .map(|i| {
                let (row, col) = ((i / 60) as f64, (i % 60) as f64);
                marker(&format!("m{i}"), 47.58 + row * 0.0008, -122.34 + col * 0.0013)
            })
            .collect();

        let batched = layer(&map, ClusterLayerOptions::default());
        batched.add_entity(marker("m0", 47.0, -122.0));
        batched.stop_clustering();
        for m in &markers {
            batched.add_entity(m.clone());
        }
        assert_eq!(batched.pending_count(), markers.len());
        batched.start_clustering();

        let replaced = layer(&map, ClusterLayerOptions::default());
        replaced.set_entities(markers.clone());

        // the flushed m0 replaces the one added before the batch
        assert_eq!(batched.native_revision(), 2);
        assert_eq!(batched.entity_count(), markers.len());
        assert_eq!(summary(&batched), summary(&replaced));
    }
}
