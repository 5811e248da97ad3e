//! Spider layout geometry
//!
//! Small groups are placed on a ring around the cluster center. Past the
//! switchover count the pins wind outwards on a spiral so neighbours keep a
//! roughly constant gap however many there are.

use crate::core::{
    config::SpiderClusterOptions, constants::SPIRAL_ANGLE_STEP_BIAS, geo::Point,
};
use std::f64::consts::PI;

/// Which shape a layout of `count` pins takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Circle,
    Spiral,
}

impl LayoutKind {
    pub fn for_count(count: usize, options: &SpiderClusterOptions) -> Self {
        if count <= options.circle_spiral_switchover {
            LayoutKind::Circle
        } else {
            LayoutKind::Spiral
        }
    }
}

/// Screen positions for `count` proxy pins around `center`, in member order.
///
/// Always returns exactly `count` points and is deterministic.
pub fn compute_positions(
    center: Point,
    count: usize,
    options: &SpiderClusterOptions,
) -> Vec<Point> {
    if count == 0 {
        return Vec::new();
    }

    match LayoutKind::for_count(count, options) {
        LayoutKind::Circle => circle(center, count, options),
        LayoutKind::Spiral => spiral(center, count, options),
    }
}

fn circle(center: Point, count: usize, options: &SpiderClusterOptions) -> Vec<Point> {
    let step = 2.0 * PI / count as f64;
    let leg = options
        .min_circle_length
        .max((options.spiral_distance_factor / step / (2.0 * PI)) * count as f64);

    (0..count)
        .map(|i| polar(center, step * i as f64, leg))
        .collect()
}

fn spiral(center: Point, count: usize, options: &SpiderClusterOptions) -> Vec<Point> {
    let mut leg = options.min_circle_length / PI;
    let mut angle = 0.0;
    let mut points = Vec::with_capacity(count);

    for i in 0..count {
        angle += options.min_spiral_angle_separation / leg + i as f64 * SPIRAL_ANGLE_STEP_BIAS;
        points.push(polar(center, angle, leg));
        leg += 2.0 * PI * options.spiral_distance_factor / angle;
    }

    points
}

fn polar(center: Point, angle: f64, leg: f64) -> Point {
    Point::new(center.x + leg * angle.cos(), center.y + leg * angle.sin())
}
