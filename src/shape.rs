//! Collision geometry attached to rigid bodies.

use slotmap::new_key_type;
use smallvec::SmallVec;
use vek::{Aabr, Vec2};

use crate::{
    body::BodyKey,
    math::{
        aabr_expand, area_for_circle, area_for_poly, area_for_segment, centroid_for_poly,
        closest_point_on_segment, convex_hull, cross, lerp, moment_for_circle, moment_for_poly,
        moment_for_segment, normalized_or_zero, rperp, Iso,
    },
    UserData, MAGIC_EPSILON,
};

new_key_type! {
    /// Handle of a shape inside a space.
    pub struct ShapeKey;
}

/// Application defined category tag used to look up collision handlers.
pub type CollisionType = u64;

/// Group and category based collision filtering.
///
/// Two shapes collide when they are not in the same non-zero group and each
/// one's categories intersect the other's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeFilter {
    /// Shapes in the same non-zero group never collide.
    pub group: u64,
    /// Categories this shape belongs to.
    pub categories: u32,
    /// Categories this shape collides with.
    pub mask: u32,
}

impl ShapeFilter {
    /// Collide with everything.
    pub const ALL: Self = Self {
        group: 0,
        categories: u32::MAX,
        mask: u32::MAX,
    };

    /// Collide with nothing.
    pub const NONE: Self = Self {
        group: 0,
        categories: 0,
        mask: 0,
    };

    /// Construct a filter.
    pub fn new(group: u64, categories: u32, mask: u32) -> Self {
        Self {
            group,
            categories,
            mask,
        }
    }

    /// Whether a pair of filters rejects the collision.
    pub fn reject(&self, other: &Self) -> bool {
        (self.group != 0 && self.group == other.group)
            || (self.categories & other.mask) == 0
            || (other.categories & self.mask) == 0
    }
}

impl Default for ShapeFilter {
    fn default() -> Self {
        Self::ALL
    }
}

/// Mass, moment, centroid and area of a piece of geometry.
#[derive(Debug, Clone, Copy)]
pub struct MassInfo {
    /// Mass.
    pub m: f64,
    /// Moment of inertia about the centroid.
    pub i: f64,
    /// Centroid relative to the body origin.
    pub cog: Vec2<f64>,
    /// Surface area.
    pub area: f64,
}

/// Result of a nearest point query against a single shape.
#[derive(Debug, Clone, Copy)]
pub struct PointQueryInfo {
    /// The queried shape.
    pub shape: ShapeKey,
    /// Closest point on the surface, world space.
    pub point: Vec2<f64>,
    /// Distance to the surface, negative when the point is inside.
    pub distance: f64,
    /// Direction the distance grows in.
    ///
    /// Stays meaningful arbitrarily close to the surface where
    /// `(p - point) / distance` would blow up.
    pub gradient: Vec2<f64>,
}

/// Result of a segment cast against a single shape.
#[derive(Debug, Clone, Copy)]
pub struct SegmentQueryInfo {
    /// The shape that was hit.
    pub shape: ShapeKey,
    /// Point of impact.
    pub point: Vec2<f64>,
    /// Outward surface normal at the impact.
    pub normal: Vec2<f64>,
    /// Fraction along the queried segment, in `[0, 1]`.
    pub alpha: f64,
}

/// A polygon edge stored as its end vertex plus the edge's outward unit
/// normal and plane offset.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitPlane {
    pub v0: Vec2<f64>,
    pub n: Vec2<f64>,
    pub d: f64,
}

/// Plane storage, simple polygons fit without hitting the heap.
pub(crate) type PlaneVec = SmallVec<[SplitPlane; 6]>;

/// Geometry of a shape, local data plus the world space cache.
#[derive(Debug, Clone)]
pub(crate) enum ShapeKind {
    Circle {
        /// Center relative to the body.
        c: Vec2<f64>,
        r: f64,
        /// Cached world center.
        tc: Vec2<f64>,
    },
    Segment {
        a: Vec2<f64>,
        b: Vec2<f64>,
        n: Vec2<f64>,
        /// Rounding thickness.
        r: f64,
        ta: Vec2<f64>,
        tb: Vec2<f64>,
        tn: Vec2<f64>,
        /// Tangents of the neighboring polyline segments.
        ///
        /// End cap collisions against directions behind a tangent are dropped
        /// so chained segments don't snag objects sliding across the seam.
        a_tangent: Vec2<f64>,
        b_tangent: Vec2<f64>,
        /// World space copies of the neighbor tangents.
        ta_tangent: Vec2<f64>,
        tb_tangent: Vec2<f64>,
    },
    Polygon {
        /// Corner rounding radius.
        r: f64,
        /// One plane per vertex, the edge arriving at that vertex.
        planes: PlaneVec,
        /// World space copy of `planes`, refreshed by `cache_bb`.
        t_planes: PlaneVec,
    },
}

impl ShapeKind {
    /// Order of the shape in the collision dispatch table.
    pub fn table_index(&self) -> usize {
        match self {
            ShapeKind::Circle { .. } => 0,
            ShapeKind::Segment { .. } => 1,
            ShapeKind::Polygon { .. } => 2,
        }
    }
}

/// A collision shape attached to a body.
#[derive(Debug)]
pub struct Shape {
    /// Owning body.
    pub(crate) body: BodyKey,
    pub(crate) kind: ShapeKind,
    /// Cached world bounding rectangle.
    pub(crate) bb: Aabr<f64>,
    /// Sensors report collisions but produce no impulses.
    pub(crate) sensor: bool,
    /// Restitution.
    pub(crate) e: f64,
    /// Friction coefficient.
    pub(crate) u: f64,
    /// Conveyor belt velocity of the surface.
    pub(crate) surface_velocity: Vec2<f64>,
    pub(crate) collision_type: CollisionType,
    pub(crate) filter: ShapeFilter,
    /// Stable id handed out by the owning space, used as spatial index and
    /// contact hashing key.
    pub(crate) hashid: u64,
    pub(crate) mass_info: MassInfo,
    pub user_data: UserData,
}

impl Shape {
    fn with_kind(body: BodyKey, kind: ShapeKind, mass_info: MassInfo) -> Self {
        Self {
            body,
            kind,
            bb: Aabr {
                min: Vec2::zero(),
                max: Vec2::zero(),
            },
            sensor: false,
            e: 0.0,
            u: 0.0,
            surface_velocity: Vec2::zero(),
            collision_type: 0,
            filter: ShapeFilter::ALL,
            hashid: 0,
            mass_info,
            user_data: None,
        }
    }

    /// A circle at an offset from the body origin.
    pub fn circle(body: BodyKey, radius: f64, offset: Vec2<f64>) -> Self {
        debug_assert!(radius >= 0.0, "Circle radius must not be negative");

        let kind = ShapeKind::Circle {
            c: offset,
            r: radius,
            tc: offset,
        };
        let mass_info = MassInfo {
            m: 0.0,
            i: moment_for_circle(1.0, 0.0, radius, Vec2::zero()),
            cog: offset,
            area: area_for_circle(0.0, radius),
        };

        Self::with_kind(body, kind, mass_info)
    }

    /// A line segment with rounded caps.
    pub fn segment(body: BodyKey, a: Vec2<f64>, b: Vec2<f64>, radius: f64) -> Self {
        let n = normalized_or_zero(rperp(b - a));

        let kind = ShapeKind::Segment {
            a,
            b,
            n,
            r: radius,
            ta: a,
            tb: b,
            tn: n,
            a_tangent: Vec2::zero(),
            b_tangent: Vec2::zero(),
            ta_tangent: Vec2::zero(),
            tb_tangent: Vec2::zero(),
        };
        let mass_info = MassInfo {
            m: 0.0,
            i: moment_for_segment(1.0, a, b, radius),
            cog: lerp(a, b, 0.5),
            area: area_for_segment(a, b, radius),
        };

        Self::with_kind(body, kind, mass_info)
    }

    /// A convex polygon with rounded corners.
    ///
    /// The convex hull of the input is used, so the points can be in any
    /// order and don't have to be convex.
    pub fn poly(body: BodyKey, verts: &[Vec2<f64>], radius: f64) -> Self {
        let mut hull = verts.to_vec();
        let count = convex_hull(&mut hull, 0.0);
        hull.truncate(count);

        Self::poly_raw(body, &hull, radius)
    }

    /// A polygon from vertices that are already a counter-clockwise convex
    /// loop.
    pub fn poly_raw(body: BodyKey, verts: &[Vec2<f64>], radius: f64) -> Self {
        debug_assert!(
            poly_validate(verts),
            "Polygon vertices must form a convex counter-clockwise loop"
        );

        let planes = planes_for_verts(verts);
        let t_planes = planes.clone();

        let kind = ShapeKind::Polygon {
            r: radius,
            planes,
            t_planes,
        };
        let centroid = centroid_for_poly(verts);
        let mass_info = MassInfo {
            m: 0.0,
            i: moment_for_poly(1.0, verts, -centroid, radius),
            cog: centroid,
            area: area_for_poly(verts, radius),
        };

        Self::with_kind(body, kind, mass_info)
    }

    /// An axis-aligned box centered on the body origin.
    pub fn box_shape(body: BodyKey, width: f64, height: f64, radius: f64) -> Self {
        let hw = width / 2.0;
        let hh = height / 2.0;

        Self::box_shape_bb(
            body,
            Aabr {
                min: Vec2::new(-hw, -hh),
                max: Vec2::new(hw, hh),
            },
            radius,
        )
    }

    /// A box from a local space bounding rectangle.
    pub fn box_shape_bb(body: BodyKey, bb: Aabr<f64>, radius: f64) -> Self {
        let verts = [
            Vec2::new(bb.max.x, bb.min.y),
            Vec2::new(bb.max.x, bb.max.y),
            Vec2::new(bb.min.x, bb.max.y),
            Vec2::new(bb.min.x, bb.min.y),
        ];

        Self::poly_raw(body, &verts, radius)
    }

    /// The owning body.
    pub fn body(&self) -> BodyKey {
        self.body
    }

    /// Attach the shape to a different body.
    ///
    /// Only valid while the shape is not added to a space.
    pub fn set_body(&mut self, body: BodyKey) {
        self.body = body;
    }

    /// Cached world bounding rectangle from the last [`Self::cache_bb`].
    pub fn bb(&self) -> Aabr<f64> {
        self.bb
    }

    /// Whether this shape only reports collisions.
    pub fn sensor(&self) -> bool {
        self.sensor
    }

    /// Make this shape a sensor.
    pub fn set_sensor(&mut self, sensor: bool) {
        self.sensor = sensor;
    }

    /// Restitution.
    pub fn elasticity(&self) -> f64 {
        self.e
    }

    /// Set the restitution, `0` is no bounce, `1` a perfect bounce.
    pub fn set_elasticity(&mut self, e: f64) {
        debug_assert!(e >= 0.0, "Elasticity must not be negative");
        self.e = e;
    }

    /// Friction coefficient.
    pub fn friction(&self) -> f64 {
        self.u
    }

    /// Set the friction coefficient.
    pub fn set_friction(&mut self, u: f64) {
        debug_assert!(u >= 0.0, "Friction must not be negative");
        self.u = u;
    }

    /// Surface velocity used by the contact solver.
    pub fn surface_velocity(&self) -> Vec2<f64> {
        self.surface_velocity
    }

    /// Set the surface velocity, making the shape act like a conveyor belt.
    pub fn set_surface_velocity(&mut self, v: Vec2<f64>) {
        self.surface_velocity = v;
    }

    /// Collision type used for handler lookup.
    pub fn collision_type(&self) -> CollisionType {
        self.collision_type
    }

    /// Set the collision type.
    pub fn set_collision_type(&mut self, ty: CollisionType) {
        self.collision_type = ty;
    }

    /// Collision filter.
    pub fn filter(&self) -> ShapeFilter {
        self.filter
    }

    /// Set the collision filter.
    pub fn set_filter(&mut self, filter: ShapeFilter) {
        self.filter = filter;
    }

    /// Radius of a circle or the rounding radius of a segment or polygon.
    pub fn radius(&self) -> f64 {
        match &self.kind {
            ShapeKind::Circle { r, .. } => *r,
            ShapeKind::Segment { r, .. } => *r,
            ShapeKind::Polygon { r, .. } => *r,
        }
    }

    /// Local vertices of a polygon, empty for other kinds.
    pub fn vertices(&self) -> Vec<Vec2<f64>> {
        match &self.kind {
            ShapeKind::Polygon { planes, .. } => planes.iter().map(|plane| plane.v0).collect(),
            _ => Vec::new(),
        }
    }

    /// Suppress end cap collisions by telling a segment where its polyline
    /// neighbors are.
    pub fn set_neighbors(&mut self, prev: Vec2<f64>, next: Vec2<f64>) {
        match &mut self.kind {
            ShapeKind::Segment {
                a,
                b,
                a_tangent,
                b_tangent,
                ..
            } => {
                *a_tangent = prev - *a;
                *b_tangent = next - *b;
            }
            _ => log::warn!("Ignoring neighbor tangents on a non-segment shape"),
        }
    }

    /// Mass properties of the geometry carrying the given mass.
    pub fn mass_info(&self, mass: f64) -> MassInfo {
        MassInfo {
            m: mass,
            i: self.mass_info.i * mass,
            cog: self.mass_info.cog,
            area: self.mass_info.area,
        }
    }

    /// Recompute the world space cache for a body transform and return the
    /// new bounding rectangle.
    ///
    /// Pure in the transform: caching twice with the same `iso` is a no-op.
    pub fn cache_bb(&mut self, iso: Iso) -> Aabr<f64> {
        self.bb = match &mut self.kind {
            ShapeKind::Circle { c, r, tc } => {
                *tc = iso.apply(*c);

                aabr_expand(Aabr { min: *tc, max: *tc }, *r)
            }
            ShapeKind::Segment {
                a,
                b,
                n,
                r,
                ta,
                tb,
                tn,
                a_tangent,
                b_tangent,
                ta_tangent,
                tb_tangent,
            } => {
                *ta = iso.apply(*a);
                *tb = iso.apply(*b);
                *tn = iso.rot.rotate(*n);
                *ta_tangent = iso.rot.rotate(*a_tangent);
                *tb_tangent = iso.rot.rotate(*b_tangent);

                let bb = Aabr {
                    min: Vec2::new(ta.x.min(tb.x), ta.y.min(tb.y)),
                    max: Vec2::new(ta.x.max(tb.x), ta.y.max(tb.y)),
                };
                aabr_expand(bb, *r)
            }
            ShapeKind::Polygon { r, planes, t_planes } => {
                let mut min = Vec2::broadcast(f64::INFINITY);
                let mut max = Vec2::broadcast(f64::NEG_INFINITY);

                for (src, dst) in planes.iter().zip(t_planes.iter_mut()) {
                    let v = iso.apply(src.v0);
                    let n = iso.rot.rotate(src.n);

                    dst.v0 = v;
                    dst.n = n;
                    dst.d = n.dot(v);

                    min.x = min.x.min(v.x);
                    min.y = min.y.min(v.y);
                    max.x = max.x.max(v.x);
                    max.y = max.y.max(v.y);
                }

                aabr_expand(Aabr { min, max }, *r)
            }
        };

        self.bb
    }

    /// Closest point on the surface to `p` with the signed distance.
    pub fn point_query(&self, key: ShapeKey, p: Vec2<f64>) -> PointQueryInfo {
        match &self.kind {
            ShapeKind::Circle { r, tc, .. } => circle_point_query(key, *tc, *r, p),
            ShapeKind::Segment { r, ta, tb, tn, .. } => {
                let closest = closest_point_on_segment(p, *ta, *tb);

                let delta = p - closest;
                let d = delta.magnitude();
                let g = if d > MAGIC_EPSILON { delta / d } else { *tn };

                PointQueryInfo {
                    shape: key,
                    point: closest + g * *r,
                    distance: d - r,
                    gradient: g,
                }
            }
            ShapeKind::Polygon { r, t_planes, .. } => {
                let count = t_planes.len();

                let mut v0 = t_planes[count - 1].v0;
                let mut min_dist = f64::INFINITY;
                let mut closest_point = Vec2::zero();
                let mut closest_normal = Vec2::zero();
                let mut outside = false;

                for plane in t_planes {
                    let v1 = plane.v0;
                    if plane.n.dot(p) > plane.d {
                        outside = true;
                    }

                    let closest = closest_point_on_segment(p, v0, v1);
                    let dist = p.distance(closest);
                    if dist < min_dist {
                        min_dist = dist;
                        closest_point = closest;
                        closest_normal = plane.n;
                    }

                    v0 = v1;
                }

                let dist = if outside { min_dist } else { -min_dist };
                let g = if min_dist > MAGIC_EPSILON {
                    (p - closest_point) / dist
                } else {
                    closest_normal
                };

                PointQueryInfo {
                    shape: key,
                    point: closest_point + g * *r,
                    distance: dist - r,
                    gradient: g,
                }
            }
        }
    }

    /// Cast a thick segment from `a` to `b` against the shape.
    pub fn segment_query(
        &self,
        key: ShapeKey,
        a: Vec2<f64>,
        b: Vec2<f64>,
        radius: f64,
    ) -> Option<SegmentQueryInfo> {
        match &self.kind {
            ShapeKind::Circle { r, tc, .. } => circle_segment_query(key, *tc, *r, a, b, radius),
            ShapeKind::Segment {
                r, ta, tb, tn, ..
            } => {
                let n = *tn;
                let d = (*ta - a).dot(n);
                let rsum = r + radius;

                let flipped_n = if d > 0.0 { -n } else { n };
                let seg_offset = flipped_n * rsum - a;

                // Endpoints relative to the start, pushed out by the thickness.
                let seg_a = *ta + seg_offset;
                let seg_b = *tb + seg_offset;
                let delta = b - a;

                if cross(delta, seg_a) * cross(delta, seg_b) <= 0.0 {
                    let d_offset = d + if d > 0.0 { -rsum } else { rsum };
                    let ad = -d_offset;
                    let bd = delta.dot(n) - d_offset;

                    if ad * bd < 0.0 {
                        let t = ad / (ad - bd);

                        return Some(SegmentQueryInfo {
                            shape: key,
                            point: lerp(a, b, t) - flipped_n * radius,
                            normal: flipped_n,
                            alpha: t,
                        });
                    }

                    None
                } else if rsum != 0.0 {
                    // The query ray misses the core plane, try the end caps.
                    let info1 = circle_segment_query(key, *ta, *r, a, b, radius);
                    let info2 = circle_segment_query(key, *tb, *r, a, b, radius);

                    match (info1, info2) {
                        (Some(i1), Some(i2)) => Some(if i1.alpha < i2.alpha { i1 } else { i2 }),
                        (info1, info2) => info1.or(info2),
                    }
                } else {
                    None
                }
            }
            ShapeKind::Polygon { r, t_planes, .. } => {
                let count = t_planes.len();
                let rsum = r + radius;

                let mut best: Option<SegmentQueryInfo> = None;

                for i in 0..count {
                    let n = t_planes[i].n;
                    let an = a.dot(n);
                    let d = an - t_planes[i].d - rsum;
                    if d < 0.0 {
                        continue;
                    }

                    let bn = b.dot(n);
                    let t = d / (an - bn);
                    if !(0.0..=1.0).contains(&t) {
                        continue;
                    }

                    let point = lerp(a, b, t);
                    let dt = cross(n, point);
                    let dt_min = cross(n, t_planes[(i + count - 1) % count].v0);
                    let dt_max = cross(n, t_planes[i].v0);

                    if dt_min <= dt && dt <= dt_max {
                        if best.map_or(true, |best| t < best.alpha) {
                            best = Some(SegmentQueryInfo {
                                shape: key,
                                point: point - n * radius,
                                normal: n,
                                alpha: t,
                            });
                        }
                    }
                }

                // The beveled corners.
                if rsum > 0.0 {
                    for plane in t_planes {
                        if let Some(info) = circle_segment_query(key, plane.v0, *r, a, b, radius) {
                            if best.map_or(true, |best| info.alpha < best.alpha) {
                                best = Some(info);
                            }
                        }
                    }
                }

                best
            }
        }
    }

    /// Replace the radius in place, bypassing all caches.
    ///
    /// The shape must be reindexed before the space steps again; skipping
    /// the reindex is a precondition violation.
    pub fn unsafe_set_radius(&mut self, radius: f64) {
        match &mut self.kind {
            ShapeKind::Circle { r, .. } => *r = radius,
            ShapeKind::Segment { r, .. } => *r = radius,
            ShapeKind::Polygon { r, .. } => *r = radius,
        }
    }

    /// Replace a polygon's vertices in place, bypassing all caches.
    ///
    /// The same reindexing requirement as [`Self::unsafe_set_radius`]
    /// applies.
    pub fn unsafe_set_vertices(&mut self, verts: &[Vec2<f64>]) {
        match &mut self.kind {
            ShapeKind::Polygon { planes, t_planes, .. } => {
                let mut hull = verts.to_vec();
                let count = convex_hull(&mut hull, 0.0);
                hull.truncate(count);

                *planes = planes_for_verts(&hull);
                *t_planes = planes.clone();
            }
            _ => log::warn!("Ignoring vertex update on a non-polygon shape"),
        }
    }

    /// Replace a segment's endpoints in place, bypassing all caches.
    pub fn unsafe_set_endpoints(&mut self, new_a: Vec2<f64>, new_b: Vec2<f64>) {
        match &mut self.kind {
            ShapeKind::Segment { a, b, n, .. } => {
                *a = new_a;
                *b = new_b;
                *n = normalized_or_zero(rperp(new_b - new_a));
            }
            _ => log::warn!("Ignoring endpoint update on a non-segment shape"),
        }
    }
}

/// Nearest point query against a lone circle.
fn circle_point_query(key: ShapeKey, center: Vec2<f64>, r: f64, p: Vec2<f64>) -> PointQueryInfo {
    let delta = p - center;
    let d = delta.magnitude();

    let gradient = if d > MAGIC_EPSILON {
        delta / d
    } else {
        Vec2::new(0.0, 1.0)
    };

    PointQueryInfo {
        shape: key,
        point: center + gradient * r,
        distance: d - r,
        gradient,
    }
}

/// Cast a thick segment against a lone circle.
pub(crate) fn circle_segment_query(
    key: ShapeKey,
    center: Vec2<f64>,
    r1: f64,
    a: Vec2<f64>,
    b: Vec2<f64>,
    r2: f64,
) -> Option<SegmentQueryInfo> {
    let da = a - center;
    let db = b - center;
    let rsum = r1 + r2;

    let qa = da.dot(da) - 2.0 * da.dot(db) + db.dot(db);
    let qb = da.dot(db) - da.dot(da);
    let det = qb * qb - qa * (da.dot(da) - rsum * rsum);

    if det >= 0.0 {
        let t = (-qb - det.sqrt()) / qa;
        if (0.0..=1.0).contains(&t) {
            let n = normalized_or_zero(lerp(da, db, t));

            return Some(SegmentQueryInfo {
                shape: key,
                point: lerp(a, b, t) - n * r2,
                normal: n,
                alpha: t,
            });
        }
    }

    None
}

/// Whether the vertices form a strictly convex counter-clockwise loop.
pub(crate) fn poly_validate(verts: &[Vec2<f64>]) -> bool {
    use itertools::Itertools;

    verts.len() >= 3
        && verts
            .iter()
            .circular_tuple_windows()
            .all(|(&a, &b, &c)| cross(b - a, c - a) > 0.0)
}

/// Build the splitting planes for a counter-clockwise convex loop.
///
/// Plane `i` is the edge arriving at vertex `i`.
pub(crate) fn planes_for_verts(verts: &[Vec2<f64>]) -> PlaneVec {
    let count = verts.len();

    (0..count)
        .map(|i| {
            let a = verts[(i + count - 1) % count];
            let b = verts[i];
            let n = normalized_or_zero(rperp(b - a));

            SplitPlane {
                v0: b,
                n,
                d: n.dot(b),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use slotmap::SlotMap;
    use vek::Vec2;

    use crate::{body::Body, math::Iso};

    use super::*;

    fn dummy_key() -> (BodyKey, ShapeKey) {
        let mut bodies: SlotMap<BodyKey, Body> = SlotMap::with_key();
        let body = bodies.insert(Body::new_static());
        let mut shapes: SlotMap<ShapeKey, ()> = SlotMap::with_key();
        let shape = shapes.insert(());

        (body, shape)
    }

    #[test]
    fn filter_rejects_same_group_and_bitmask_misses() {
        let a = ShapeFilter::new(3, 0b01, 0b10);
        let b = ShapeFilter::new(3, 0b10, 0b01);
        assert!(a.reject(&b));

        let a = ShapeFilter::new(0, 0b01, 0b10);
        let b = ShapeFilter::new(0, 0b10, 0b01);
        assert!(!a.reject(&b));

        let a = ShapeFilter::new(0, 0b01, 0b01);
        let b = ShapeFilter::new(0, 0b10, 0b10);
        assert!(a.reject(&b));
    }

    #[test]
    fn circle_cache_and_point_query() {
        let (body, key) = dummy_key();
        let mut shape = Shape::circle(body, 5.0, Vec2::new(1.0, 0.0));

        let bb = shape.cache_bb(Iso::new(Vec2::new(10.0, 0.0), 0.0));
        assert_relative_eq!(bb.min.x, 6.0);
        assert_relative_eq!(bb.max.x, 16.0);

        let info = shape.point_query(key, Vec2::new(20.0, 0.0));
        assert_relative_eq!(info.distance, 4.0);
        assert_relative_eq!(info.point.x, 16.0);
        assert_relative_eq!(info.gradient.x, 1.0);

        // Inside the circle the distance is negative.
        let inside = shape.point_query(key, Vec2::new(11.0, 0.0));
        assert!(inside.distance < 0.0);
    }

    #[test]
    fn polygon_cache_rotates_normals() {
        let (body, _key) = dummy_key();
        let mut shape = Shape::box_shape(body, 2.0, 2.0, 0.0);

        shape.cache_bb(Iso::new(Vec2::zero(), std::f64::consts::FRAC_PI_4));

        // A unit box rotated 45 degrees spans sqrt(2) along each axis.
        let bb = shape.bb();
        assert_relative_eq!(bb.max.x, std::f64::consts::SQRT_2, epsilon = 1e-12);
        assert_relative_eq!(bb.max.y, std::f64::consts::SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn segment_query_through_polygon() {
        let (body, key) = dummy_key();
        let mut shape = Shape::box_shape(body, 10.0, 10.0, 0.0);
        shape.cache_bb(Iso::from_pos(Vec2::zero()));

        let info = shape
            .segment_query(key, Vec2::new(-20.0, 0.0), Vec2::new(0.0, 0.0), 0.0)
            .expect("Segment should hit the box");

        assert_relative_eq!(info.point.x, -5.0);
        assert_relative_eq!(info.normal.x, -1.0);
        assert_relative_eq!(info.alpha, 0.75);
    }

    #[test]
    fn segment_query_hits_thick_segment_from_above() {
        let (body, key) = dummy_key();

        // Two segments forming a straight polyline, query pushing into the seam.
        let mut seg = Shape::segment(body, Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 1.0);
        seg.set_neighbors(Vec2::new(-10.0, 0.0), Vec2::new(20.0, 0.0));
        seg.cache_bb(Iso::from_pos(Vec2::zero()));

        let info = seg
            .segment_query(key, Vec2::new(5.0, 10.0), Vec2::new(5.0, 0.0), 0.0)
            .expect("Query from above should hit");
        assert_relative_eq!(info.normal.y, 1.0);
    }

    #[test]
    fn poly_builds_hull_from_unordered_points() {
        let (body, _key) = dummy_key();

        let shape = Shape::poly(
            body,
            &[
                Vec2::new(1.0, 1.0),
                Vec2::new(-1.0, -1.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, -1.0),
                Vec2::new(-1.0, 1.0),
            ],
            0.0,
        );

        assert_eq!(shape.vertices().len(), 4);
    }

    #[test]
    fn validate_rejects_clockwise_and_concave() {
        let ccw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
        ];
        assert!(poly_validate(&ccw));

        let cw: Vec<_> = ccw.iter().rev().copied().collect();
        assert!(!poly_validate(&cw));

        let concave = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.1),
            Vec2::new(1.0, 2.0),
        ];
        assert!(!poly_validate(&concave));
    }

    #[test]
    fn mass_info_scales_with_mass() {
        let (body, _key) = dummy_key();
        let shape = Shape::circle(body, 10.0, Vec2::zero());

        let info = shape.mass_info(2.0);
        assert_relative_eq!(info.m, 2.0);
        assert_relative_eq!(info.i, moment_for_circle(2.0, 0.0, 10.0, Vec2::zero()));
    }
}
