//! Spider and clustering defaults.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Member count above which the spider switches from a circle to a spiral.
pub const DEFAULT_CIRCLE_SPIRAL_SWITCHOVER: usize = 9;

/// Minimum radius of the circular layout, in screen pixels.
pub const DEFAULT_MIN_CIRCLE_LENGTH: f64 = 60.0;

/// Minimum arc length between neighbouring spiral pins, in screen pixels.
pub const DEFAULT_MIN_SPIRAL_ANGLE_SEPARATION: f64 = 25.0;

/// Growth factor of the spiral radius per revolution.
pub const DEFAULT_SPIRAL_DISTANCE_FACTOR: f64 = 5.0;

/// Extra angle added per spiral step, multiplied by the step index.
pub const SPIRAL_ANGLE_STEP_BIAS: f64 = 0.0005;

/// Background clicks needed to collapse an expanded spider.
pub const DEFAULT_COLLAPSE_ON_NTH_CLICK: u32 = 1;

/// Stick color and width when idle.
pub const DEFAULT_STICK_COLOR: &str = "black";
pub const DEFAULT_STICK_HOVER_COLOR: &str = "red";
pub const DEFAULT_STICK_THICKNESS: f64 = 2.0;

/// Grid cell edge used by the clusterer, in screen pixels.
pub const DEFAULT_GRID_SIZE: f64 = 60.0;

/// Zoom level from which every marker is shown unclustered.
pub const DEFAULT_DISABLE_CLUSTERING_AT_ZOOM: f64 = 19.0;

/// Maximum number of markers folded into a single cluster pin.
pub const DEFAULT_MAX_CLUSTER_SIZE: usize = 100;

/// Zoom deltas below this are treated as no zoom change.
pub const ZOOM_EPSILON: f64 = 1e-6;
