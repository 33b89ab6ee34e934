//! Narrow phase collision detection.
//!
//! Shape pairs with closed form solutions get them, everything else runs
//! through the GJK/EPA pipeline in [`gjk`] followed by support edge
//! clipping.

pub(crate) mod gjk;

use arrayvec::ArrayVec;
use vek::Vec2;

use crate::{
    math::{cross, lerp},
    shape::{Shape, ShapeKind},
};

use self::gjk::{ClosestPoints, Edge, SupportShape};

/// Collisions never produce more than two contact points.
pub const MAX_CONTACTS: usize = 2;

/// Pair hashing used for contact and shape feature ids.
pub(crate) fn hash_pair(a: u64, b: u64) -> u64 {
    const HASH_COEF: u64 = 3344921057;

    a.wrapping_mul(HASH_COEF) ^ b.wrapping_mul(HASH_COEF)
}

/// A single contact produced by the narrow phase.
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    /// Contact position on the surface of the first shape.
    pub p1: Vec2<f64>,
    /// Contact position on the surface of the second shape.
    pub p2: Vec2<f64>,
    /// Stable id of the features that generated the contact, used to match
    /// contacts across steps for warm starting.
    pub hash: u64,
}

impl ContactPoint {
    /// Separation along a normal, negative when penetrating.
    pub fn separation(&self, n: Vec2<f64>) -> f64 {
        (self.p2 - self.p1).dot(n)
    }
}

/// Everything the narrow phase found out about a shape pair.
#[derive(Debug, Clone, Default)]
pub struct CollisionInfo {
    /// Collision normal pointing from the first shape to the second.
    pub n: Vec2<f64>,
    /// Up to two contact points.
    pub contacts: ArrayVec<ContactPoint, MAX_CONTACTS>,
}

impl CollisionInfo {
    fn push_contact(&mut self, p1: Vec2<f64>, p2: Vec2<f64>, hash: u64) {
        self.contacts.push(ContactPoint { p1, p2, hash });
    }

    /// Whether any contact was generated.
    pub fn colliding(&self) -> bool {
        !self.contacts.is_empty()
    }
}

/// Detect collision between two shapes with cached world data.
///
/// The shapes must be ordered circle before segment before polygon; the
/// space swaps the pair before dispatching and remembers the swap.
pub(crate) fn collide(a: &Shape, b: &Shape) -> CollisionInfo {
    debug_assert!(
        a.kind.table_index() <= b.kind.table_index(),
        "Collision pair passed in the wrong order"
    );

    match (&a.kind, &b.kind) {
        (ShapeKind::Circle { .. }, ShapeKind::Circle { .. }) => circle_to_circle(a, b),
        (ShapeKind::Circle { .. }, ShapeKind::Segment { .. }) => circle_to_segment(a, b),
        (ShapeKind::Circle { .. }, ShapeKind::Polygon { .. }) => circle_to_poly(a, b),
        (ShapeKind::Segment { .. }, ShapeKind::Segment { .. }) => segment_to_segment(a, b),
        (ShapeKind::Segment { .. }, ShapeKind::Polygon { .. }) => segment_to_poly(a, b),
        (ShapeKind::Polygon { .. }, ShapeKind::Polygon { .. }) => poly_to_poly(a, b),
        _ => unreachable!("Unsorted collision pair"),
    }
}

/// Contact between two circles given centers and radii.
///
/// Also the fallback for the corner cases of the other closed forms.
fn circle_to_circle_query(
    p1: Vec2<f64>,
    p2: Vec2<f64>,
    r1: f64,
    r2: f64,
    hash: u64,
    info: &mut CollisionInfo,
) {
    let mindist = r1 + r2;
    let delta = p2 - p1;
    let distsq = delta.magnitude_squared();

    // Exactly touching surfaces count as a zero depth contact.
    if distsq <= mindist * mindist {
        let dist = distsq.sqrt();
        let n = if dist != 0.0 {
            delta / dist
        } else {
            Vec2::new(1.0, 0.0)
        };
        info.n = n;

        info.push_contact(p1 + n * r1, p2 - n * r2, hash);
    }
}

fn circle_to_circle(a: &Shape, b: &Shape) -> CollisionInfo {
    let (ShapeKind::Circle { r: r1, tc: tc1, .. }, ShapeKind::Circle { r: r2, tc: tc2, .. }) =
        (&a.kind, &b.kind)
    else {
        unreachable!()
    };

    let mut info = CollisionInfo::default();
    circle_to_circle_query(*tc1, *tc2, *r1, *r2, 0, &mut info);
    info
}

fn circle_to_segment(a: &Shape, b: &Shape) -> CollisionInfo {
    let (
        ShapeKind::Circle { r: cr, tc, .. },
        ShapeKind::Segment {
            r: sr,
            ta,
            tb,
            tn,
            ta_tangent,
            tb_tangent,
            ..
        },
    ) = (&a.kind, &b.kind)
    else {
        unreachable!()
    };

    let seg_delta = *tb - *ta;
    let len_sq = seg_delta.magnitude_squared();
    let closest_t = if len_sq != 0.0 {
        (seg_delta.dot(*tc - *ta) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = *ta + seg_delta * closest_t;

    let mut info = CollisionInfo::default();

    let mindist = cr + sr;
    let delta = closest - *tc;
    let distsq = delta.magnitude_squared();
    if distsq <= mindist * mindist {
        let dist = distsq.sqrt();

        // Coincident centers push out along the segment normal.
        let n = if dist != 0.0 { delta / dist } else { *tn };
        info.n = n;

        // End cap contacts pointing behind a neighbor tangent would snag
        // objects crossing the seam between chained segments.
        if (closest_t != 0.0 || n.dot(*ta_tangent) >= 0.0)
            && (closest_t != 1.0 || n.dot(*tb_tangent) >= 0.0)
        {
            info.push_contact(*tc + n * *cr, closest - n * *sr, 0);
        }
    }

    info
}

fn circle_to_poly(a: &Shape, b: &Shape) -> CollisionInfo {
    let (
        ShapeKind::Circle { r: cr, tc, .. },
        ShapeKind::Polygon {
            r: pr, t_planes, ..
        },
    ) = (&a.kind, &b.kind)
    else {
        unreachable!()
    };

    let count = t_planes.len();
    let mut info = CollisionInfo::default();

    // Find the splitting plane the circle is closest to leaving through.
    let mut mini = 0;
    let mut min = f64::NEG_INFINITY;
    for (i, plane) in t_planes.iter().enumerate() {
        let dist = plane.n.dot(*tc) - plane.d - (cr + pr);
        if dist > 0.0 {
            return info;
        } else if dist > min {
            min = dist;
            mini = i;
        }
    }

    let n = t_planes[mini].n;
    let va = t_planes[(mini + count - 1) % count].v0;
    let vb = t_planes[mini].v0;
    let dta = cross(n, va);
    let dtb = cross(n, vb);
    let dt = cross(n, *tc);

    if dt < dta {
        // Past the edge start, collide with the corner.
        circle_to_circle_query(*tc, va, *cr, *pr, 0, &mut info);
    } else if dt > dtb {
        circle_to_circle_query(*tc, vb, *cr, *pr, 0, &mut info);
    } else {
        // Face region.
        info.n = -n;
        info.push_contact(
            *tc - n * *cr,
            *tc - n * (n.dot(*tc) - t_planes[mini].d - pr),
            0,
        );
    }

    info
}

/// GJK seed axis, anything roughly separating the two shapes.
fn seed_axis(a: &Shape, b: &Shape) -> Vec2<f64> {
    let ca = (a.bb.min + a.bb.max) * 0.5;
    let cb = (b.bb.min + b.bb.max) * 0.5;

    cb - ca
}

fn segment_to_segment(a: &Shape, b: &Shape) -> CollisionInfo {
    let (
        ShapeKind::Segment {
            r: r1,
            ta: ta1,
            tb: tb1,
            ta_tangent: seg1_a_tangent,
            tb_tangent: seg1_b_tangent,
            ..
        },
        ShapeKind::Segment {
            r: r2,
            ta: ta2,
            tb: tb2,
            ta_tangent: seg2_a_tangent,
            tb_tangent: seg2_b_tangent,
            ..
        },
    ) = (&a.kind, &b.kind)
    else {
        unreachable!()
    };

    let s1 = SupportShape::Segment {
        ta: *ta1,
        tb: *tb1,
        r: *r1,
        hashid: a.hashid,
    };
    let s2 = SupportShape::Segment {
        ta: *ta2,
        tb: *tb2,
        r: *r2,
        hashid: b.hashid,
    };

    let points = gjk::gjk(&s1, &s2, seed_axis(a, b));
    let n = points.n;

    let mut info = CollisionInfo::default();
    if points.d <= r1 + r2
        && ((points.a != *ta1 || n.dot(*seg1_a_tangent) <= 0.0)
            && (points.a != *tb1 || n.dot(*seg1_b_tangent) <= 0.0)
            && (points.b != *ta2 || n.dot(*seg2_a_tangent) >= 0.0)
            && (points.b != *tb2 || n.dot(*seg2_b_tangent) >= 0.0))
    {
        contact_points(s1.support_edge(n), s2.support_edge(-n), points, &mut info);
    }

    info
}

fn segment_to_poly(a: &Shape, b: &Shape) -> CollisionInfo {
    let (
        ShapeKind::Segment {
            r: sr,
            ta,
            tb,
            ta_tangent,
            tb_tangent,
            ..
        },
        ShapeKind::Polygon {
            r: pr, t_planes, ..
        },
    ) = (&a.kind, &b.kind)
    else {
        unreachable!()
    };

    let s1 = SupportShape::Segment {
        ta: *ta,
        tb: *tb,
        r: *sr,
        hashid: a.hashid,
    };
    let s2 = SupportShape::Poly {
        planes: t_planes,
        r: *pr,
        hashid: b.hashid,
    };

    let points = gjk::gjk(&s1, &s2, seed_axis(a, b));
    let n = points.n;

    let mut info = CollisionInfo::default();
    if points.d - sr - pr <= 0.0
        && ((points.a != *ta || n.dot(*ta_tangent) <= 0.0)
            && (points.a != *tb || n.dot(*tb_tangent) <= 0.0))
    {
        contact_points(s1.support_edge(n), s2.support_edge(-n), points, &mut info);
    }

    info
}

fn poly_to_poly(a: &Shape, b: &Shape) -> CollisionInfo {
    let (
        ShapeKind::Polygon {
            r: r1,
            t_planes: planes1,
            ..
        },
        ShapeKind::Polygon {
            r: r2,
            t_planes: planes2,
            ..
        },
    ) = (&a.kind, &b.kind)
    else {
        unreachable!()
    };

    let s1 = SupportShape::Poly {
        planes: planes1,
        r: *r1,
        hashid: a.hashid,
    };
    let s2 = SupportShape::Poly {
        planes: planes2,
        r: *r2,
        hashid: b.hashid,
    };

    let points = gjk::gjk(&s1, &s2, seed_axis(a, b));

    let mut info = CollisionInfo::default();
    if points.d - r1 - r2 <= 0.0 {
        contact_points(
            s1.support_edge(points.n),
            s2.support_edge(-points.n),
            points,
            &mut info,
        );
    }

    info
}

/// Generate up to two contacts by projecting each support edge's span onto
/// the other along the collision normal.
fn contact_points(e1: Edge, e2: Edge, points: ClosestPoints, info: &mut CollisionInfo) {
    let mindist = e1.r + e2.r;
    if points.d > mindist {
        return;
    }

    let n = points.n;
    info.n = n;

    // Signed positions of the endpoints along the edge direction.
    let d_e1_a = cross(e1.a.p, n);
    let d_e1_b = cross(e1.b.p, n);
    let d_e2_a = cross(e2.a.p, n);
    let d_e2_b = cross(e2.b.p, n);

    // Zero length edges still need a finite denominator.
    let e1_denom = 1.0 / (d_e1_b - d_e1_a + f64::MIN_POSITIVE);
    let e2_denom = 1.0 / (d_e2_b - d_e2_a + f64::MIN_POSITIVE);

    // One contact per end of the lateral overlap interval, kept when the
    // surfaces overlap along the normal there.
    {
        let p1 = lerp(e1.a.p, e1.b.p, ((d_e2_b - d_e1_a) * e1_denom).clamp(0.0, 1.0)) + n * e1.r;
        let p2 = lerp(e2.a.p, e2.b.p, ((d_e1_a - d_e2_a) * e2_denom).clamp(0.0, 1.0)) - n * e2.r;
        let dist = (p2 - p1).dot(n);
        if dist <= 0.0 {
            info.push_contact(p1, p2, hash_pair(e1.a.hash, e2.b.hash));
        }
    }
    {
        let p1 = lerp(e1.a.p, e1.b.p, ((d_e2_a - d_e1_a) * e1_denom).clamp(0.0, 1.0)) + n * e1.r;
        let p2 = lerp(e2.a.p, e2.b.p, ((d_e1_b - d_e2_a) * e2_denom).clamp(0.0, 1.0)) - n * e2.r;
        let dist = (p2 - p1).dot(n);
        if dist <= 0.0 {
            info.push_contact(p1, p2, hash_pair(e1.b.hash, e2.a.hash));
        }
    }
}
