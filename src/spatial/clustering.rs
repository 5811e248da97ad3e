use crate::{
    core::{
        bounds::Bounds,
        constants::{DEFAULT_DISABLE_CLUSTERING_AT_ZOOM, DEFAULT_GRID_SIZE, DEFAULT_MAX_CLUSTER_SIZE},
        geo::{LatLng, LatLngBounds},
    },
    layers::marker::Marker,
    spatial::index::{SpatialIndex, SpatialItem},
    traits::MapView,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Represents a group of items that fell into the same grid cell
#[derive(Debug, Clone)]
pub struct Cluster<T> {
    /// Unique identifier for the cluster
    pub id: String,
    /// Mean location of the items
    pub center: LatLng,
    /// Geographic bounds of the cluster
    pub bounds: LatLngBounds,
    /// Items in this cluster
    pub items: Vec<SpatialItem<T>>,
    /// Zoom level at which this cluster was created
    pub zoom_level: f64,
}

impl<T> Cluster<T> {
    pub fn new(id: String, items: Vec<SpatialItem<T>>, zoom_level: f64) -> Self {
        let locations: Vec<LatLng> = items.iter().map(|item| item.lat_lng()).collect();
        let center = LatLng::centroid(&locations).unwrap_or_default();
        let bounds = LatLngBounds::from_points(&locations)
            .unwrap_or_else(|| LatLngBounds::new(center, center));

        Self {
            id,
            center,
            bounds,
            items,
            zoom_level,
        }
    }

    fn cell_id(grid_x: i32, grid_y: i32, chunk_index: Option<usize>) -> String {
        match chunk_index {
            Some(chunk) => format!("cluster_{}_{}__{}", grid_x, grid_y, chunk),
            None => format!("cluster_{}_{}", grid_x, grid_y),
        }
    }

    /// Get the number of items in the cluster
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Check if this is a single-item cluster
    pub fn is_single(&self) -> bool {
        self.items.len() == 1
    }
}

/// Aggregate pin standing in for several markers at one grid cell.
///
/// Produced by the clusterer on every recluster; read-only afterwards. The
/// layer owns the markers, the pin only refers to them.
#[derive(Debug)]
pub struct ClusterPin {
    pub id: String,
    pub location: LatLng,
    pub bounds: LatLngBounds,
    pub zoom_level: f64,
    members: Vec<Weak<Marker>>,
}

impl ClusterPin {
    pub fn new(
        id: impl Into<String>,
        location: LatLng,
        members: Vec<Rc<Marker>>,
        zoom_level: f64,
    ) -> Self {
        let locations: Vec<LatLng> = members.iter().map(|m| m.location()).collect();
        let bounds = LatLngBounds::from_points(&locations)
            .unwrap_or_else(|| LatLngBounds::new(location, location));
        Self {
            id: id.into(),
            location,
            bounds,
            zoom_level,
            members: members.iter().map(Rc::downgrade).collect(),
        }
    }

    /// The markers folded into this pin that are still alive
    pub fn members(&self) -> Vec<Rc<Marker>> {
        self.members.iter().filter_map(Weak::upgrade).collect()
    }

    /// Number of markers the pin was built from
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl PartialEq for ClusterPin {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl From<Cluster<Rc<Marker>>> for ClusterPin {
    fn from(cluster: Cluster<Rc<Marker>>) -> Self {
        Self {
            id: cluster.id,
            location: cluster.center,
            bounds: cluster.bounds,
            zoom_level: cluster.zoom_level,
            members: cluster
                .items
                .iter()
                .map(|item| Rc::downgrade(&item.data))
                .collect(),
        }
    }
}

/// Configuration for clustering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusteringConfig {
    /// Zoom level from which clustering is disabled
    pub disable_clustering_at_zoom: f64,
    /// Maximum number of items in a single cluster
    pub max_cluster_size: usize,
    /// Grid size for clustering (in pixels)
    pub grid_size: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            disable_clustering_at_zoom: DEFAULT_DISABLE_CLUSTERING_AT_ZOOM,
            max_cluster_size: DEFAULT_MAX_CLUSTER_SIZE,
            grid_size: DEFAULT_GRID_SIZE,
        }
    }
}

/// Grid-based clustering over an R-tree of items
pub struct Clustering<T> {
    config: ClusteringConfig,
    enabled: bool,
    spatial_index: SpatialIndex<T>,
    /// Grid cells of the last run, reused while the view stays put
    cached_grid: BTreeMap<(i32, i32), Vec<SpatialItem<T>>>,
    /// The cached grid holds one cell per item
    cached_ungrouped: bool,
    last_bounds: Option<LatLngBounds>,
    last_zoom: Option<f64>,
}

impl<T: Clone> Clustering<T> {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            enabled: true,
            spatial_index: SpatialIndex::new(),
            cached_grid: BTreeMap::new(),
            cached_ungrouped: false,
            last_bounds: None,
            last_zoom: None,
        }
    }

    /// Add an item to the clustering system
    pub fn add_item(&mut self, item: SpatialItem<T>) {
        self.spatial_index.insert(item);
        self.invalidate_cache();
    }

    /// Add many items with a single rebuild of the index
    pub fn extend_items(&mut self, items: Vec<SpatialItem<T>>) {
        if items.is_empty() {
            return;
        }
        self.spatial_index.extend(items);
        self.invalidate_cache();
    }

    /// Replace every item at once
    pub fn set_items(&mut self, items: Vec<SpatialItem<T>>) {
        self.spatial_index.load(items);
        self.invalidate_cache();
    }

    /// Remove an item from the clustering system
    pub fn remove_item(&mut self, id: &str) -> Option<SpatialItem<T>> {
        let removed = self.spatial_index.remove(id);
        if removed.is_some() {
            self.invalidate_cache();
        }
        removed
    }

    /// Clear all items
    pub fn clear(&mut self) {
        self.spatial_index.clear();
        self.invalidate_cache();
    }

    fn invalidate_cache(&mut self) {
        self.cached_grid.clear();
        self.last_bounds = None;
        self.last_zoom = None;
    }

    /// Turns grouping on or off; when off every item is its own cluster
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.invalidate_cache();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Generate clusters for the visible area, reusing the last grid when
    /// neither the view nor the items changed
    pub fn get_clusters<V: MapView + ?Sized>(&mut self, view: &V) -> Vec<Cluster<T>> {
        let viewport_bounds = view.bounds();
        let zoom_level = view.zoom();

        let cache_hit = matches!(
            (&self.last_bounds, self.last_zoom),
            (Some(bounds), Some(zoom)) if *bounds == viewport_bounds && (zoom - zoom_level).abs() < 0.01
        );

        if !cache_hit {
            let mut items: Vec<SpatialItem<T>> = self
                .spatial_index
                .query(&Bounds::from_lat_lng_bounds(&viewport_bounds))
                .into_iter()
                .cloned()
                .collect();
            items.sort_by(|a, b| a.id.cmp(&b.id));

            self.build_grid(items, view);
            self.last_bounds = Some(viewport_bounds);
            self.last_zoom = Some(zoom_level);
        }

        self.clusters_from_grid(zoom_level)
    }

    fn build_grid<V: MapView + ?Sized>(&mut self, items: Vec<SpatialItem<T>>, view: &V) {
        self.cached_grid.clear();

        let ungrouped = !self.enabled || view.zoom() >= self.config.disable_clustering_at_zoom;
        let grid_size = self.config.grid_size;
        self.cached_ungrouped = ungrouped;

        for (i, item) in items.into_iter().enumerate() {
            let cell = if ungrouped {
                (i as i32, 0)
            } else {
                let pixel = view.project(&item.lat_lng());
                (
                    (pixel.x / grid_size).floor() as i32,
                    (pixel.y / grid_size).floor() as i32,
                )
            };
            self.cached_grid.entry(cell).or_default().push(item);
        }
    }

    fn clusters_from_grid(&self, zoom_level: f64) -> Vec<Cluster<T>> {
        let mut clusters = Vec::with_capacity(self.cached_grid.len());
        let max_size = self.config.max_cluster_size.max(1);

        for ((grid_x, grid_y), cell_items) in &self.cached_grid {
            if self.cached_ungrouped {
                for item in cell_items {
                    let id = format!("single_{}", item.id);
                    clusters.push(Cluster::new(id, vec![item.clone()], zoom_level));
                }
            } else if cell_items.len() <= max_size {
                let id = Cluster::<T>::cell_id(*grid_x, *grid_y, None);
                clusters.push(Cluster::new(id, cell_items.clone(), zoom_level));
            } else {
                // Too many items - split into multiple clusters
                for (i, chunk) in cell_items.chunks(max_size).enumerate() {
                    let id = Cluster::<T>::cell_id(*grid_x, *grid_y, Some(i));
                    clusters.push(Cluster::new(id, chunk.to_vec(), zoom_level));
                }
            }
        }

        clusters
    }

    /// Get all items (for debugging/inspection)
    pub fn get_all_items(&self) -> Vec<&SpatialItem<T>> {
        self.spatial_index.all_items()
    }

    pub fn len(&self) -> usize {
        self.spatial_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spatial_index.is_empty()
    }

    /// Update the clustering configuration
    pub fn set_config(&mut self, config: ClusteringConfig) {
        self.config = config;
        self.invalidate_cache();
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }
}

impl<T: Clone> Default for Clustering<T> {
    fn default() -> Self {
        Self::new(ClusteringConfig::default())
    }
}
