//! Configuration for cluster layers and the spider
//!
//! Options are plain structs with defaults. Partial updates arrive as JSON
//! objects and are merged over the current values, so fields a caller leaves
//! out keep whatever they had before (initially the defaults).

use crate::{
    core::constants::*, layers::marker::Marker, spatial::clustering::ClusterPin,
    spatial::clustering::ClusteringConfig, MapError, Result,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::rc::Rc;

/// Called with the chosen marker and, for spider proxies, the expanded cluster
pub type MarkerSelectedCallback = Rc<dyn Fn(&Marker, Option<&ClusterPin>)>;

/// Called when the expanded spider goes away
pub type MarkerUnselectedCallback = Rc<dyn Fn()>;

/// Line style of the sticks joining proxies to the cluster center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StickStyle {
    pub stroke_color: String,
    pub stroke_thickness: f64,
}

impl StickStyle {
    pub fn new(stroke_color: impl Into<String>, stroke_thickness: f64) -> Self {
        Self {
            stroke_color: stroke_color.into(),
            stroke_thickness,
        }
    }

    pub fn hover() -> Self {
        Self::new(DEFAULT_STICK_HOVER_COLOR, DEFAULT_STICK_THICKNESS)
    }
}

impl Default for StickStyle {
    fn default() -> Self {
        Self::new(DEFAULT_STICK_COLOR, DEFAULT_STICK_THICKNESS)
    }
}

/// Spider layout, styling, collapse policy and selection callbacks
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpiderClusterOptions {
    /// Member counts above this are laid out as a spiral instead of a circle
    pub circle_spiral_switchover: usize,
    pub min_circle_length: f64,
    #[serde(alias = "minSpiralAngleSeperation")]
    pub min_spiral_angle_separation: f64,
    pub spiral_distance_factor: f64,
    pub stick_style: StickStyle,
    pub stick_hover_style: StickStyle,
    /// Collapse as soon as the map starts panning or zooming
    pub collapse_on_map_change: bool,
    /// Collapse after this many background clicks; 0 never collapses on clicks
    pub collapse_on_nth_click: u32,
    /// Hovering a proxy also forwards a click to its marker
    pub invoke_click_on_hover: bool,
    #[serde(skip)]
    pub on_marker_selected: Option<MarkerSelectedCallback>,
    #[serde(skip)]
    pub on_marker_unselected: Option<MarkerUnselectedCallback>,
}

impl Default for SpiderClusterOptions {
    fn default() -> Self {
        Self {
            circle_spiral_switchover: DEFAULT_CIRCLE_SPIRAL_SWITCHOVER,
            min_circle_length: DEFAULT_MIN_CIRCLE_LENGTH,
            min_spiral_angle_separation: DEFAULT_MIN_SPIRAL_ANGLE_SEPARATION,
            spiral_distance_factor: DEFAULT_SPIRAL_DISTANCE_FACTOR,
            stick_style: StickStyle::default(),
            stick_hover_style: StickStyle::hover(),
            collapse_on_map_change: false,
            collapse_on_nth_click: DEFAULT_COLLAPSE_ON_NTH_CLICK,
            invoke_click_on_hover: true,
            on_marker_selected: None,
            on_marker_unselected: None,
        }
    }
}

impl SpiderClusterOptions {
    /// Defaults overlaid with a partial JSON options object
    pub fn from_value(patch: serde_json::Value) -> Result<Self> {
        let mut options = Self::default();
        options.merge_value(patch)?;
        Ok(options)
    }

    /// Overlays a partial JSON options object. Missing or `null` fields keep
    /// their current value; callbacks are never touched.
    pub fn merge_value(&mut self, patch: serde_json::Value) -> Result<()> {
        let mut merged: Self = merge_over(&*self, patch)?;
        merged.validate()?;
        merged.on_marker_selected = self.on_marker_selected.take();
        merged.on_marker_unselected = self.on_marker_unselected.take();
        *self = merged;
        Ok(())
    }

    /// Rejects geometry settings the layout cannot work with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("minCircleLength", self.min_circle_length),
            ("minSpiralAngleSeparation", self.min_spiral_angle_separation),
            ("spiralDistanceFactor", self.spiral_distance_factor),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(MapError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn with_marker_selected<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Marker, Option<&ClusterPin>) + 'static,
    {
        self.on_marker_selected = Some(Rc::new(callback));
        self
    }

    pub fn with_marker_unselected<F>(mut self, callback: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.on_marker_unselected = Some(Rc::new(callback));
        self
    }

    pub fn with_collapse_on_nth_click(mut self, clicks: u32) -> Self {
        self.collapse_on_nth_click = clicks;
        self
    }

    pub fn with_collapse_on_map_change(mut self, collapse: bool) -> Self {
        self.collapse_on_map_change = collapse;
        self
    }

    pub fn with_invoke_click_on_hover(mut self, invoke: bool) -> Self {
        self.invoke_click_on_hover = invoke;
        self
    }
}

impl std::fmt::Debug for SpiderClusterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiderClusterOptions")
            .field("circle_spiral_switchover", &self.circle_spiral_switchover)
            .field("min_circle_length", &self.min_circle_length)
            .field("min_spiral_angle_separation", &self.min_spiral_angle_separation)
            .field("spiral_distance_factor", &self.spiral_distance_factor)
            .field("stick_style", &self.stick_style)
            .field("stick_hover_style", &self.stick_hover_style)
            .field("collapse_on_map_change", &self.collapse_on_map_change)
            .field("collapse_on_nth_click", &self.collapse_on_nth_click)
            .field("invoke_click_on_hover", &self.invoke_click_on_hover)
            .field("on_marker_selected", &self.on_marker_selected.is_some())
            .field("on_marker_unselected", &self.on_marker_unselected.is_some())
            .finish()
    }
}

/// What a click on a cluster pin does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClusterClickAction {
    None,
    #[default]
    ZoomIntoCluster,
    Spider,
}

/// Options of a [`crate::layers::cluster::ClusterLayer`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterLayerOptions {
    pub id: String,
    pub name: String,
    pub z_index: i32,
    pub visible: bool,
    pub clustering_enabled: bool,
    pub click_action: ClusterClickAction,
    pub clustering: ClusteringConfig,
    /// Applied when spider support is initialised from these options
    pub spider: SpiderClusterOptions,
}

impl Default for ClusterLayerOptions {
    fn default() -> Self {
        Self {
            id: "cluster".to_string(),
            name: "Cluster Layer".to_string(),
            z_index: 0,
            visible: true,
            clustering_enabled: true,
            click_action: ClusterClickAction::default(),
            clustering: ClusteringConfig::default(),
            spider: SpiderClusterOptions::default(),
        }
    }
}

impl ClusterLayerOptions {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_click_action(mut self, action: ClusterClickAction) -> Self {
        self.click_action = action;
        self
    }

    pub fn with_spider(mut self, spider: SpiderClusterOptions) -> Self {
        self.spider = spider;
        self
    }
}

/// Serializes `current`, overlays `patch`, and reads the result back
pub(crate) fn merge_over<T>(current: &T, patch: serde_json::Value) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    if !(patch.is_object() || patch.is_null()) {
        return Err(MapError::InvalidConfig(format!(
            "options must be a JSON object, got {patch}"
        )));
    }
    let mut value = serde_json::to_value(current)?;
    merge_json(&mut value, patch);
    Ok(serde_json::from_value(value)?)
}

fn merge_json(target: &mut serde_json::Value, patch: serde_json::Value) {
    use serde_json::Value;

    match (target, patch) {
        (_, Value::Null) => {}
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None if !value.is_null() => {
                        target.insert(key, value);
                    }
                    None => {}
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
