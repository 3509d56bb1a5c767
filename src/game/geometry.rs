//! Toroidal geometry shared by the server simulation and the client predictor

use serde::{Deserialize, Serialize};

use crate::ws::protocol::Direction;

/// Largest side length whose integer positions are all exact in `f32`.
/// One more and a one-unit step can round away to nothing.
pub const MAX_FIELD_SIDE: u32 = 1 << 24;

/// Field dimensions. Both axes wrap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub width: f32,
    pub height: f32,
}

impl Field {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }

    /// Number of distinct integer cells, i.e. how many same-kind pickups fit.
    pub fn capacity(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Wrap a point into `[0, width) x [0, height)`.
    pub fn wrap(&self, x: f32, y: f32) -> (f32, f32) {
        (wrap_axis(x, self.width), wrap_axis(y, self.height))
    }

    /// Advance a point by `speed` along `direction`, then wrap.
    pub fn advance(&self, x: f32, y: f32, direction: Direction, speed: f32) -> (f32, f32) {
        let (dx, dy) = direction.unit();
        self.wrap(x + dx * speed, y + dy * speed)
    }

    pub fn delta(&self, p: (f32, f32), q: (f32, f32)) -> ToroidalDelta {
        toroidal_delta(p, q, self.width, self.height)
    }
}

/// Wrap a coordinate into `[0, size)`.
pub fn wrap_axis(value: f32, size: f32) -> f32 {
    let wrapped = value.rem_euclid(size);
    // rem_euclid rounds tiny negatives up to `size` itself
    if wrapped >= size {
        0.0
    } else {
        wrapped
    }
}

/// Shortest distance between two coordinates on a wrapping axis.
///
/// Always in `[0, size / 2]` for inputs inside `[0, size)`.
pub fn wrapped_axis_distance(a: f32, b: f32, size: f32) -> f32 {
    let direct = (a - b).abs();
    direct.min(size - direct)
}

/// Signed shortest displacement from `b` to `a` on a wrapping axis.
pub fn shortest_displacement(a: f32, b: f32, size: f32) -> f32 {
    let d = a - b;
    if d > size / 2.0 {
        d - size
    } else if d < -size / 2.0 {
        d + size
    } else {
        d
    }
}

/// Per-axis distances between two points plus the renderer's bearing data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToroidalDelta {
    /// Unsigned wrapped distance on x
    pub dx: f32,
    /// Unsigned wrapped distance on y
    pub dy: f32,
    /// Signed shortest displacement on x, from q to p
    pub shortest_x: f32,
    /// Signed shortest displacement on y, from q to p
    pub shortest_y: f32,
    /// Bearing from q to p in degrees, `[0, 360)`
    pub bearing_deg: f32,
}

impl ToroidalDelta {
    /// True when both axis distances are within `reach`.
    pub fn within(&self, reach: f32) -> bool {
        self.dx <= reach && self.dy <= reach
    }
}

pub fn toroidal_delta(p: (f32, f32), q: (f32, f32), width: f32, height: f32) -> ToroidalDelta {
    let shortest_x = shortest_displacement(p.0, q.0, width);
    let shortest_y = shortest_displacement(p.1, q.1, height);
    let bearing_deg = shortest_y.atan2(shortest_x).to_degrees().rem_euclid(360.0);

    ToroidalDelta {
        dx: wrapped_axis_distance(p.0, q.0, width),
        dy: wrapped_axis_distance(p.1, q.1, height),
        shortest_x,
        shortest_y,
        bearing_deg: if bearing_deg >= 360.0 { 0.0 } else { bearing_deg },
    }
}
