//! Scalar and vector helpers shared by the whole engine.
//!
//! Everything here is a pure value operation, there's no simulation state.

use std::ops::{Add, Neg};

use vek::{Aabr, Vec2};

/// Rotation split into its sine and cosine parts.
///
/// Keeping the unit complex number around instead of an angle makes rotating
/// points a couple of multiplications instead of trigonometry calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    /// Cosine part of the rotation.
    cos: f64,
    /// Sine part of the rotation.
    sin: f64,
}

impl Rotation {
    /// No rotation, points to the right.
    pub fn identity() -> Self {
        Self { cos: 1.0, sin: 0.0 }
    }

    /// Create from radians.
    pub fn from_radians(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();

        Self { sin, cos }
    }

    /// Create from a direction vector.
    ///
    /// Vector is assumed to be normalized.
    pub fn from_direction(dir: Vec2<f64>) -> Self {
        Self {
            cos: dir.x,
            sin: dir.y,
        }
    }

    /// Convert back to radians in the range (-pi, pi].
    pub fn to_radians(self) -> f64 {
        self.sin.atan2(self.cos)
    }

    /// Rotate a point, complex number multiplication.
    pub fn rotate(&self, point: Vec2<f64>) -> Vec2<f64> {
        Vec2::new(
            point.x * self.cos - point.y * self.sin,
            point.x * self.sin + point.y * self.cos,
        )
    }

    /// Inverse of [`Self::rotate`].
    pub fn unrotate(&self, point: Vec2<f64>) -> Vec2<f64> {
        Vec2::new(
            point.x * self.cos + point.y * self.sin,
            -point.x * self.sin + point.y * self.cos,
        )
    }

    /// Sine.
    pub fn sin(&self) -> f64 {
        self.sin
    }

    /// Cosine.
    pub fn cos(&self) -> f64 {
        self.cos
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<f64> for Rotation {
    fn from(value: f64) -> Self {
        Self::from_radians(value)
    }
}

impl Add<Self> for Rotation {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            cos: self.cos * rhs.cos - self.sin * rhs.sin,
            sin: self.sin * rhs.cos + self.cos * rhs.sin,
        }
    }
}

impl Neg for Rotation {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            cos: self.cos,
            sin: -self.sin,
        }
    }
}

/// Position with a rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iso {
    /// Position applied after the rotation.
    pub pos: Vec2<f64>,
    /// Rotation.
    pub rot: Rotation,
}

impl Iso {
    /// Construct from a position and a rotation.
    pub fn new<P, R>(pos: P, rot: R) -> Self
    where
        P: Into<Vec2<f64>>,
        R: Into<Rotation>,
    {
        let pos = pos.into();
        let rot = rot.into();

        Self { pos, rot }
    }

    /// Construct from a position with a rotation of zero.
    pub fn from_pos<P>(pos: P) -> Self
    where
        P: Into<Vec2<f64>>,
    {
        Self {
            pos: pos.into(),
            rot: Rotation::identity(),
        }
    }

    /// Rotate a relative point and add the position.
    pub fn apply(&self, point: Vec2<f64>) -> Vec2<f64> {
        self.pos + self.rot.rotate(point)
    }

    /// Map a world point back into local space.
    pub fn apply_inverse(&self, point: Vec2<f64>) -> Vec2<f64> {
        self.rot.unrotate(point - self.pos)
    }
}

/// Row major 2x2 matrix, just enough for effective mass tensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat2x2 {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Mat2x2 {
    /// Construct from rows `[a b]` and `[c d]`.
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self { a, b, c, d }
    }

    /// Multiply a column vector.
    pub fn transform(&self, v: Vec2<f64>) -> Vec2<f64> {
        Vec2::new(self.a * v.x + self.b * v.y, self.c * v.x + self.d * v.y)
    }
}

/// Counter-clockwise perpendicular.
pub fn perp(v: Vec2<f64>) -> Vec2<f64> {
    Vec2::new(-v.y, v.x)
}

/// Clockwise perpendicular.
pub fn rperp(v: Vec2<f64>) -> Vec2<f64> {
    Vec2::new(v.y, -v.x)
}

/// 2D cross product, the z component of the 3D one.
pub fn cross(a: Vec2<f64>, b: Vec2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Linear interpolation between two points.
pub fn lerp(a: Vec2<f64>, b: Vec2<f64>, t: f64) -> Vec2<f64> {
    a + (b - a) * t
}

/// Normalize, mapping the zero vector to itself instead of NaN.
pub fn normalized_or_zero(v: Vec2<f64>) -> Vec2<f64> {
    v.try_normalized().unwrap_or_default()
}

/// Clamp a vector to a maximum magnitude.
pub fn clamp_magnitude(v: Vec2<f64>, limit: f64) -> Vec2<f64> {
    if v.magnitude_squared() > limit * limit {
        v * (limit / v.magnitude())
    } else {
        v
    }
}

/// Closest point to `p` on the segment `a`-`b`.
pub fn closest_point_on_segment(p: Vec2<f64>, a: Vec2<f64>, b: Vec2<f64>) -> Vec2<f64> {
    let delta = b - a;
    let len_sq = delta.magnitude_squared();
    if len_sq == 0.0 {
        return a;
    }

    let t = (delta.dot(p - a) / len_sq).clamp(0.0, 1.0);
    a + delta * t
}

/// Whether two bounding rectangles touch or overlap.
pub fn aabr_intersects(a: Aabr<f64>, b: Aabr<f64>) -> bool {
    a.min.x <= b.max.x && b.min.x <= a.max.x && a.min.y <= b.max.y && b.min.y <= a.max.y
}

/// Whether `outer` fully contains `inner`.
pub fn aabr_contains(outer: Aabr<f64>, inner: Aabr<f64>) -> bool {
    outer.min.x <= inner.min.x
        && outer.max.x >= inner.max.x
        && outer.min.y <= inner.min.y
        && outer.max.y >= inner.max.y
}

/// Smallest rectangle containing both.
pub fn aabr_merge(a: Aabr<f64>, b: Aabr<f64>) -> Aabr<f64> {
    Aabr {
        min: Vec2::new(a.min.x.min(b.min.x), a.min.y.min(b.min.y)),
        max: Vec2::new(a.max.x.max(b.max.x), a.max.y.max(b.max.y)),
    }
}

/// Surface area of a bounding rectangle.
pub fn aabr_area(bb: Aabr<f64>) -> f64 {
    (bb.max.x - bb.min.x) * (bb.max.y - bb.min.y)
}

/// Surface area of the smallest rectangle containing both.
pub fn aabr_merged_area(a: Aabr<f64>, b: Aabr<f64>) -> f64 {
    (a.max.x.max(b.max.x) - a.min.x.min(b.min.x)) * (a.max.y.max(b.max.y) - a.min.y.min(b.min.y))
}

/// Grow a bounding rectangle by a radius on every side.
pub fn aabr_expand(bb: Aabr<f64>, radius: f64) -> Aabr<f64> {
    Aabr {
        min: bb.min - Vec2::broadcast(radius),
        max: bb.max + Vec2::broadcast(radius),
    }
}

/// Fraction along `a`-`b` where the segment enters the rectangle.
///
/// Returns infinity on a miss, slab test otherwise.
pub fn aabr_segment_query(bb: Aabr<f64>, a: Vec2<f64>, b: Vec2<f64>) -> f64 {
    let idx = 1.0 / (b.x - a.x);
    let tx1 = if bb.min.x == a.x {
        f64::NEG_INFINITY
    } else {
        (bb.min.x - a.x) * idx
    };
    let tx2 = if bb.max.x == a.x {
        f64::INFINITY
    } else {
        (bb.max.x - a.x) * idx
    };
    let txmin = tx1.min(tx2);
    let txmax = tx1.max(tx2);

    let idy = 1.0 / (b.y - a.y);
    let ty1 = if bb.min.y == a.y {
        f64::NEG_INFINITY
    } else {
        (bb.min.y - a.y) * idy
    };
    let ty2 = if bb.max.y == a.y {
        f64::INFINITY
    } else {
        (bb.max.y - a.y) * idy
    };
    let tymin = ty1.min(ty2);
    let tymax = ty1.max(ty2);

    if tymin <= txmax && txmin <= tymax {
        let min = txmin.max(tymin);
        let max = txmax.min(tymax);

        if 0.0 <= max && min <= 1.0 {
            return min.max(0.0);
        }
    }

    f64::INFINITY
}

/// Moment of inertia for a hollow circle with the given mass.
///
/// `r1` and `r2` are the inner and outer radii in either order.
pub fn moment_for_circle(m: f64, r1: f64, r2: f64, offset: Vec2<f64>) -> f64 {
    m * (0.5 * (r1 * r1 + r2 * r2) + offset.magnitude_squared())
}

/// Area of a hollow circle.
pub fn area_for_circle(r1: f64, r2: f64) -> f64 {
    std::f64::consts::PI * (r1 * r1 - r2 * r2).abs()
}

/// Moment of inertia for a line segment with rounded caps.
pub fn moment_for_segment(m: f64, a: Vec2<f64>, b: Vec2<f64>, radius: f64) -> f64 {
    let offset = lerp(a, b, 0.5);

    // Approximates the rounded segment with a box.
    let length = b.distance(a) + 2.0 * radius;
    m * ((length * length + 4.0 * radius * radius) / 12.0 + offset.magnitude_squared())
}

/// Area of a line segment with rounded caps.
pub fn area_for_segment(a: Vec2<f64>, b: Vec2<f64>, radius: f64) -> f64 {
    radius * (std::f64::consts::PI * radius + 2.0 * a.distance(b))
}

/// Moment of inertia for a solid polygon offset from the rotation axis.
pub fn moment_for_poly(m: f64, verts: &[Vec2<f64>], offset: Vec2<f64>, radius: f64) -> f64 {
    if verts.len() == 2 {
        return moment_for_segment(m, verts[0], verts[1], radius);
    }

    let mut sum1 = 0.0;
    let mut sum2 = 0.0;
    for i in 0..verts.len() {
        let v1 = verts[i] + offset;
        let v2 = verts[(i + 1) % verts.len()] + offset;

        let a = cross(v2, v1);
        let b = v1.dot(v1) + v1.dot(v2) + v2.dot(v2);

        sum1 += a * b;
        sum2 += a;
    }

    (m * sum1) / (6.0 * sum2)
}

/// Signed area of a polygon, with a border strip for the rounding radius.
pub fn area_for_poly(verts: &[Vec2<f64>], radius: f64) -> f64 {
    let mut area = 0.0;
    let mut perimeter = 0.0;
    for i in 0..verts.len() {
        let v1 = verts[i];
        let v2 = verts[(i + 1) % verts.len()];

        area += cross(v1, v2);
        perimeter += v1.distance(v2);
    }

    radius * (std::f64::consts::PI * radius.abs() + perimeter) + area / 2.0
}

/// Centroid of a polygon.
pub fn centroid_for_poly(verts: &[Vec2<f64>]) -> Vec2<f64> {
    let mut sum = 0.0;
    let mut vsum = Vec2::zero();

    for i in 0..verts.len() {
        let v1 = verts[i];
        let v2 = verts[(i + 1) % verts.len()];
        let c = cross(v1, v2);

        sum += c;
        vsum += (v1 + v2) * c;
    }

    vsum / (3.0 * sum)
}

/// Moment of inertia for a solid centered box.
pub fn moment_for_box(m: f64, width: f64, height: f64) -> f64 {
    m * (width * width + height * height) / 12.0
}

/// Indices of the lexicographically smallest and largest points.
fn loop_indexes(verts: &[Vec2<f64>]) -> (usize, usize) {
    let mut start = 0;
    let mut end = 0;
    let mut min = verts[0];
    let mut max = min;

    for (i, &v) in verts.iter().enumerate().skip(1) {
        if v.x < min.x || (v.x == min.x && v.y < min.y) {
            min = v;
            start = i;
        } else if v.x > max.x || (v.x == max.x && v.y > max.y) {
            max = v;
            end = i;
        }
    }

    (start, end)
}

/// Emit the hull vertices strictly right of `a`-`b`, ending with `b`.
fn qhull_side(points: &[Vec2<f64>], a: Vec2<f64>, b: Vec2<f64>, tol: f64, out: &mut Vec<Vec2<f64>>) {
    let delta = b - a;
    let value_tol = tol * delta.magnitude();

    let mut max = value_tol;
    let mut pivot = None;
    for &p in points {
        let value = cross(p - a, delta);
        if value > max {
            max = value;
            pivot = Some(p);
        }
    }

    match pivot {
        Some(pivot) => {
            qhull_side(points, a, pivot, tol, out);
            qhull_side(points, pivot, b, tol, out);
        }
        None => out.push(b),
    }
}

/// QuickHull, the result is written back into the start of the input buffer.
///
/// Returns the number of hull vertices, wound counter-clockwise. Points
/// within a perpendicular distance of `tol` times the edge length are
/// collapsed onto the edge. A buffer where every point is equal produces a
/// single vertex hull.
pub fn convex_hull(verts: &mut [Vec2<f64>], tol: f64) -> usize {
    debug_assert!(!verts.is_empty(), "Hull of an empty point set");
    debug_assert!(tol >= 0.0, "Hull tolerance must not be negative");

    let (start, end) = loop_indexes(verts);
    if start == end {
        let v = verts[start];
        verts[0] = v;
        return 1;
    }

    let a = verts[start];
    let b = verts[end];

    let points = verts.to_vec();
    let mut out = Vec::with_capacity(verts.len());
    out.push(a);
    qhull_side(&points, a, b, tol, &mut out);
    qhull_side(&points, b, a, tol, &mut out);
    // The second sweep ends by emitting the starting vertex again.
    out.pop();

    verts[..out.len()].copy_from_slice(&out);
    out.len()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use vek::Vec2;

    use super::*;

    #[test]
    fn rotate_unrotate_roundtrip() {
        let rot = Rotation::from_radians(0.83);
        let v = Vec2::new(3.0, -7.5);

        let back = rot.unrotate(rot.rotate(v));
        assert_relative_eq!(back.x, v.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, v.y, epsilon = 1e-12);

        // The cache stays a unit complex number.
        assert_relative_eq!(rot.cos() * rot.cos() + rot.sin() * rot.sin(), 1.0);
    }

    #[test]
    fn rotation_composition() {
        let a = Rotation::from_radians(0.4);
        let b = Rotation::from_radians(1.1);

        assert_relative_eq!((a + b).to_radians(), 1.5, epsilon = 1e-12);
        assert_relative_eq!((a + -a).to_radians(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn normalize_zero_is_zero() {
        assert_eq!(normalized_or_zero(Vec2::zero()), Vec2::zero());
    }

    #[test]
    fn segment_query_hits_box() {
        let bb = Aabr {
            min: Vec2::new(-1.0, -1.0),
            max: Vec2::new(1.0, 1.0),
        };

        let t = aabr_segment_query(bb, Vec2::new(-3.0, 0.0), Vec2::new(3.0, 0.0));
        assert_relative_eq!(t, 1.0 / 3.0, epsilon = 1e-12);

        assert_eq!(
            aabr_segment_query(bb, Vec2::new(-3.0, 2.0), Vec2::new(3.0, 2.0)),
            f64::INFINITY
        );
    }

    #[test]
    fn hull_of_square_with_interior_points() {
        let mut points = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.5, 0.5),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.2, 0.8),
            Vec2::new(0.0, 1.0),
        ];

        let count = convex_hull(&mut points, 0.0);
        assert_eq!(count, 4);

        // Counter-clockwise winding: every cross product along the loop is positive.
        for i in 0..count {
            let a = points[i];
            let b = points[(i + 1) % count];
            let c = points[(i + 2) % count];
            assert!(cross(b - a, c - a) > 0.0);
        }
    }

    #[test]
    fn hull_is_idempotent() {
        let mut points: Vec<Vec2<f64>> = (0..32)
            .map(|_| Vec2::new(fastrand::f64() * 10.0, fastrand::f64() * 10.0))
            .collect();

        let count = convex_hull(&mut points, 0.0);
        let mut hull = points[..count].to_vec();
        let again = convex_hull(&mut hull, 0.0);

        assert_eq!(count, again);
        // Same loop, possibly rotated to a different starting vertex.
        let offset = hull.iter().position(|&v| v == points[0]).unwrap();
        for i in 0..count {
            assert_eq!(points[i], hull[(i + offset) % count]);
        }
    }

    #[test]
    fn hull_of_identical_points() {
        let mut points = vec![Vec2::new(2.0, 3.0); 8];
        assert_eq!(convex_hull(&mut points, 0.0), 1);
    }

    #[test]
    fn circle_moment_matches_closed_form() {
        // Solid disc: m r^2 / 2.
        assert_relative_eq!(moment_for_circle(2.0, 0.0, 3.0, Vec2::zero()), 9.0);

        // A box moment through the polygon formula.
        let verts = [
            Vec2::new(-1.0, -2.0),
            Vec2::new(1.0, -2.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(-1.0, 2.0),
        ];
        assert_relative_eq!(
            moment_for_poly(3.0, &verts, Vec2::zero(), 0.0),
            moment_for_box(3.0, 2.0, 4.0),
            epsilon = 1e-12
        );
    }
}
