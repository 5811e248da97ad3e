use crate::{
    core::{
        bounds::Bounds,
        geo::{LatLng, Point},
    },
    prelude::HashMap,
};

use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// A spatial item that can be indexed via an R-tree
#[derive(Debug, Clone)]
pub struct SpatialItem<T> {
    pub id: String,
    pub bounds: Bounds,
    pub data: T,
}

impl<T> SpatialItem<T> {
    pub fn new(id: String, bounds: Bounds, data: T) -> Self {
        Self { id, bounds, data }
    }

    pub fn from_point(id: String, point: Point, data: T) -> Self {
        let bounds = Bounds::new(point, point);
        Self::new(id, bounds, data)
    }

    /// Indexes a location in planar (lng, lat) space
    pub fn from_lat_lng(id: String, lat_lng: LatLng, data: T) -> Self {
        let point = Point::new(lat_lng.lng, lat_lng.lat);
        Self::from_point(id, point, data)
    }

    /// The indexed location, back in geographical coordinates
    pub fn lat_lng(&self) -> LatLng {
        let center = self.bounds.center();
        LatLng::new(center.y, center.x)
    }
}

impl<T> PartialEq for SpatialItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for SpatialItem<T> {}

// --- rstar integration -------------------------------------------------------------------------

impl<T> RTreeObject for SpatialItem<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.bounds)
    }
}

impl<T> PointDistance for SpatialItem<T> {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let center = self.bounds.center();
        let dx = center.x - point[0];
        let dy = center.y - point[1];
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.bounds.contains(&Point::new(point[0], point[1]))
    }
}

/// R-tree index over clustered items.
///
/// Item ids are unique: inserting an id that is already indexed replaces the
/// old item.
pub struct SpatialIndex<T> {
    rtree: RTree<SpatialItem<T>>,
    /// Bounds of every indexed id, to find an item without walking the tree
    envelopes: HashMap<String, Bounds>,
}

impl<T: Clone> SpatialIndex<T> {
    pub fn new() -> Self {
        Self {
            rtree: RTree::new(),
            envelopes: HashMap::default(),
        }
    }

    /// Inserts an item, replacing any previous item with the same id
    pub fn insert(&mut self, item: SpatialItem<T>) {
        if self.envelopes.contains_key(&item.id) {
            self.remove(&item.id);
        }
        self.envelopes.insert(item.id.clone(), item.bounds.clone());
        self.rtree.insert(item);
    }

    /// Adds many items and rebuilds the tree in one bulk load. Later items
    /// win over earlier ones and over indexed items with the same id.
    pub fn extend(&mut self, items: Vec<SpatialItem<T>>) {
        let mut incoming: HashMap<String, SpatialItem<T>> = HashMap::default();
        for item in items {
            incoming.insert(item.id.clone(), item);
        }

        let mut all: Vec<SpatialItem<T>> = self
            .rtree
            .iter()
            .filter(|item| !incoming.contains_key(&item.id))
            .cloned()
            .collect();
        all.extend(incoming.into_values());

        self.envelopes = all
            .iter()
            .map(|item| (item.id.clone(), item.bounds.clone()))
            .collect();
        self.rtree = RTree::bulk_load(all);
    }

    /// Replaces the whole content in one bulk load
    pub fn load(&mut self, items: Vec<SpatialItem<T>>) {
        self.clear();
        self.extend(items);
    }

    pub fn query(&self, bounds: &Bounds) -> Vec<&SpatialItem<T>> {
        self.rtree
            .locate_in_envelope_intersecting(&envelope_of(bounds))
            .collect()
    }

    pub fn remove(&mut self, id: &str) -> Option<SpatialItem<T>> {
        let bounds = self.envelopes.remove(id)?;
        // Find the element immutably, clone it, then remove mutably.
        let found = self
            .rtree
            .locate_in_envelope_intersecting(&envelope_of(&bounds))
            .find(|item| item.id == id)
            .cloned()?;
        self.rtree.remove(&found)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.envelopes.contains_key(id)
    }

    pub fn all_items(&self) -> Vec<&SpatialItem<T>> {
        self.rtree.iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn clear(&mut self) {
        self.rtree = RTree::new();
        self.envelopes.clear();
    }
}

fn envelope_of(bounds: &Bounds) -> AABB<[f64; 2]> {
    AABB::from_corners([bounds.min.x, bounds.min.y], [bounds.max.x, bounds.max.y])
}

impl<T: Clone> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}
