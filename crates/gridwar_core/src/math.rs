//! Spatial math and grid conversion.
//!
//! The world is a right-handed 3D space with `x`/`z` as the horizontal plane
//! and `y` as height. Tiles are square cells on the horizontal plane:
//! tile `(x, y)` covers world `x` and `z` in `[x * TILE_SIZE, (x + 1) * TILE_SIZE)`.
//!
//! Positions use `f32`. Quantities that accumulate fractionally across
//! ticks (economy income, gather progress) use the [`Fixed`] type so they
//! never drift.

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for fractional accumulators.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// World units per tile edge.
pub const TILE_SIZE: f32 = 1.0;

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Convert a (possibly fractional) rate into a fixed-point increment.
///
/// Non-finite input collapses to zero; out-of-range input saturates.
#[must_use]
pub fn to_fixed(value: f64) -> Fixed {
    if value.is_finite() {
        Fixed::saturating_from_num(value)
    } else {
        Fixed::ZERO
    }
}

/// A point (or vector) in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    /// East/west.
    pub x: f32,
    /// Height.
    pub y: f32,
    /// North/south.
    pub z: f32,
}

impl Point3 {
    /// Origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Default facing used when a direction is undefined.
    pub const FORWARD: Self = Self::new(0.0, 0.0, 1.0);

    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Point on the ground plane.
    #[must_use]
    pub const fn ground(x: f32, z: f32) -> Self {
        Self::new(x, 0.0, z)
    }

    /// Squared euclidean distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let d = self - other;
        d.dot(d)
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction; the zero vector maps to [`Point3::FORWARD`].
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON || !len.is_finite() {
            return Self::FORWARD;
        }
        self * (1.0 / len)
    }

    /// Same vector with the height component dropped.
    #[must_use]
    pub const fn flatten(self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }

    /// Linearly interpolate between two points.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    /// Move toward `target` by at most `max_step`, never overshooting.
    #[must_use]
    pub fn step_towards(self, target: Self, max_step: f32) -> Self {
        let delta = target - self;
        let dist = delta.length();
        if dist <= max_step || dist <= f32::EPSILON {
            target
        } else {
            self + delta * (max_step / dist)
        }
    }

    /// Heading angle (radians, around +y) pointing from `self` to `target`.
    ///
    /// A heading of zero faces +z.
    #[must_use]
    pub fn heading_to(self, target: Self) -> f32 {
        let d = target - self;
        d.x.atan2(d.z)
    }

    /// All components are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Point3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Point3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Point3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Point3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Integer tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Tile {
    /// Column (world x).
    pub x: i32,
    /// Row (world z).
    pub y: i32,
}

impl Tile {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Tile plus sub-tile offset. Offsets are in `[0, 1)` tile units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// Containing tile.
    pub tile: Tile,
    /// Offset along x inside the tile.
    pub offset_x: f32,
    /// Offset along z inside the tile.
    pub offset_y: f32,
}

/// Convert a world position to its grid position.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn world_to_grid(world: Point3) -> GridPos {
    let gx = world.x / TILE_SIZE;
    let gy = world.z / TILE_SIZE;
    let tx = gx.floor();
    let ty = gy.floor();
    GridPos {
        tile: Tile::new(tx as i32, ty as i32),
        offset_x: gx - tx,
        offset_y: gy - ty,
    }
}

/// Convert a grid position back to a ground-level world position.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn grid_to_world(grid: GridPos) -> Point3 {
    Point3::ground(
        (grid.tile.x as f32 + grid.offset_x) * TILE_SIZE,
        (grid.tile.y as f32 + grid.offset_y) * TILE_SIZE,
    )
}

/// Centre of a tile in world space.
#[must_use]
pub fn tile_center(tile: Tile) -> Point3 {
    grid_to_world(GridPos {
        tile,
        offset_x: 0.5,
        offset_y: 0.5,
    })
}

/// Rotate a formation-relative offset into world orientation.
///
/// `relative.x` is lateral (positive = right of the facing direction) and
/// `relative.z` is along the facing direction. Height passes through.
#[must_use]
pub fn rotate_to_direction(relative: Point3, direction: Point3) -> Point3 {
    let forward = direction.flatten().normalize();
    let right = Point3::new(forward.z, 0.0, -forward.x);
    right * relative.x + forward * relative.z + Point3::new(0.0, relative.y, 0.0)
}

/// Arithmetic mean of a set of points; `None` for an empty set.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn centroid<I>(points: I) -> Option<Point3>
where
    I: IntoIterator<Item = Point3>,
{
    let mut sum = Point3::ZERO;
    let mut count = 0_u32;
    for p in points {
        sum += p;
        count += 1;
    }
    (count > 0).then(|| sum * (1.0 / count as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_distance() {
        let a = Point3::ground(3.0, 0.0);
        let b = Point3::ground(0.0, 4.0);
        assert!(approx(a.distance(b), 5.0));
        assert!(approx(a.distance_squared(b), 25.0));
    }

    #[test]
    fn test_normalize_zero_is_forward() {
        assert_eq!(Point3::ZERO.normalize(), Point3::FORWARD);
        let n = Point3::ground(3.0, 4.0).normalize();
        assert!(approx(n.length(), 1.0));
    }

    #[test]
    fn test_grid_round_trip_keeps_offset() {
        let p = Point3::ground(12.25, -3.5);
        let g = world_to_grid(p);
        assert_eq!(g.tile, Tile::new(12, -4));
        assert!(approx(g.offset_x, 0.25));
        assert!(approx(g.offset_y, 0.5));
        let back = grid_to_world(g);
        assert!(approx(back.x, 12.25));
        assert!(approx(back.z, -3.5));
    }

    #[test]
    fn test_rotate_forward_is_identity() {
        let rel = Point3::ground(2.0, -1.0);
        let rotated = rotate_to_direction(rel, Point3::FORWARD);
        assert!(approx(rotated.x, 2.0));
        assert!(approx(rotated.z, -1.0));
    }

    #[test]
    fn test_rotate_to_east() {
        // Facing +x, "right" is -z.
        let rotated = rotate_to_direction(Point3::ground(1.0, 0.0), Point3::ground(1.0, 0.0));
        assert!(approx(rotated.x, 0.0));
        assert!(approx(rotated.z, -1.0));
        let ahead = rotate_to_direction(Point3::ground(0.0, 2.0), Point3::ground(1.0, 0.0));
        assert!(approx(ahead.x, 2.0));
    }

    #[test]
    fn test_step_towards_does_not_overshoot() {
        let from = Point3::ZERO;
        let to = Point3::ground(1.0, 0.0);
        assert_eq!(from.step_towards(to, 5.0), to);
        let half = from.step_towards(to, 0.5);
        assert!(approx(half.x, 0.5));
    }

    #[test]
    fn test_centroid() {
        let c = centroid([Point3::ground(0.0, 0.0), Point3::ground(2.0, 4.0)]).unwrap();
        assert!(approx(c.x, 1.0) && approx(c.z, 2.0));
        assert!(centroid(std::iter::empty()).is_none());
    }

    #[test]
    fn test_to_fixed_guards_non_finite() {
        assert_eq!(to_fixed(f64::NAN), Fixed::ZERO);
        assert_eq!(to_fixed(0.5), Fixed::from_num(0.5));
    }
}
