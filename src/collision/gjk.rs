//! Closest points between convex shapes over their Minkowski difference.
//!
//! GJK walks support points to the closest feature pair, EPA expands the
//! simplex into a hull of the difference when the shapes already overlap.

use vek::Vec2;

use crate::{
    math::{cross, lerp, normalized_or_zero, perp, rperp},
    shape::SplitPlane,
    MAGIC_EPSILON,
};

use super::hash_pair;

/// A point on the Minkowski difference of two shapes.
///
/// Keeps the two surface points that generated it so the closest pair can be
/// reconstructed, and their feature ids for contact hashing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MinkowskiPoint {
    /// Support point on the first shape.
    pub a: Vec2<f64>,
    /// Support point on the second shape.
    pub b: Vec2<f64>,
    /// `b - a`.
    pub ab: Vec2<f64>,
}

/// Closest points between two shapes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClosestPoints {
    /// Point on the surface of the first shape.
    pub a: Vec2<f64>,
    /// Point on the surface of the second shape.
    pub b: Vec2<f64>,
    /// Distance between the points, negative when penetrating.
    pub d: f64,
    /// Unit separating axis from the first shape to the second.
    pub n: Vec2<f64>,
}

/// Support geometry for the shapes GJK operates on.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SupportShape<'a> {
    Segment {
        ta: Vec2<f64>,
        tb: Vec2<f64>,
        r: f64,
        hashid: u64,
    },
    Poly {
        planes: &'a [SplitPlane],
        r: f64,
        hashid: u64,
    },
}

impl SupportShape<'_> {
    /// The vertex farthest along `n`.
    pub fn support(&self, n: Vec2<f64>) -> Vec2<f64> {
        match self {
            SupportShape::Segment { ta, tb, .. } => {
                if ta.dot(n) > tb.dot(n) {
                    *ta
                } else {
                    *tb
                }
            }
            SupportShape::Poly { planes, .. } => planes[support_index(planes, n)].v0,
        }
    }

    /// Rounding radius.
    pub fn radius(&self) -> f64 {
        match self {
            SupportShape::Segment { r, .. } => *r,
            SupportShape::Poly { r, .. } => *r,
        }
    }

    /// The edge most anti-parallel to `-n`, used for contact generation.
    pub fn support_edge(&self, n: Vec2<f64>) -> Edge {
        match self {
            SupportShape::Segment {
                ta,
                tb,
                r,
                hashid,
            } => {
                let tn = normalized_or_zero(rperp(*tb - *ta));

                if tn.dot(n) > 0.0 {
                    Edge {
                        a: EdgePoint {
                            p: *ta,
                            hash: hash_pair(*hashid, 0),
                        },
                        b: EdgePoint {
                            p: *tb,
                            hash: hash_pair(*hashid, 1),
                        },
                        r: *r,
                        n: tn,
                    }
                } else {
                    Edge {
                        a: EdgePoint {
                            p: *tb,
                            hash: hash_pair(*hashid, 1),
                        },
                        b: EdgePoint {
                            p: *ta,
                            hash: hash_pair(*hashid, 0),
                        },
                        r: *r,
                        n: -tn,
                    }
                }
            }
            SupportShape::Poly { planes, r, hashid } => {
                let count = planes.len();
                let i1 = support_index(planes, n);
                let i0 = (i1 + count - 1) % count;
                let i2 = (i1 + 1) % count;

                let v0 = planes[i0].v0;
                let v1 = planes[i1].v0;
                let v2 = planes[i2].v0;

                if n.dot(v1 - v0) < n.dot(v1 - v2) {
                    // The edge arriving at the support vertex.
                    Edge {
                        a: EdgePoint {
                            p: v0,
                            hash: hash_pair(*hashid, i0 as u64),
                        },
                        b: EdgePoint {
                            p: v1,
                            hash: hash_pair(*hashid, i1 as u64),
                        },
                        r: *r,
                        n: planes[i1].n,
                    }
                } else {
                    // The edge leaving it.
                    Edge {
                        a: EdgePoint {
                            p: v1,
                            hash: hash_pair(*hashid, i1 as u64),
                        },
                        b: EdgePoint {
                            p: v2,
                            hash: hash_pair(*hashid, i2 as u64),
                        },
                        r: *r,
                        n: planes[i2].n,
                    }
                }
            }
        }
    }
}

/// Index of the polygon vertex farthest along `q`.
///
/// The edge normals form a counter-clockwise fan, so the support vertex can
/// be found with a binary search over the circular order instead of scanning
/// every vertex.
pub(crate) fn support_index(planes: &[SplitPlane], q: Vec2<f64>) -> usize {
    let count = planes.len();
    let n0 = planes[0].n;

    // Which half of the circle a direction is in, measured from the fan's
    // first normal.
    let half = |v: Vec2<f64>| -> usize {
        let c = cross(n0, v);
        if c > 0.0 || (c == 0.0 && n0.dot(v) > 0.0) {
            0
        } else {
            1
        }
    };

    let q_half = half(q);
    // Whether a normal has not yet passed `q` going counter-clockwise.
    let not_past = |n: Vec2<f64>| -> bool {
        let h = half(n);
        if h != q_half {
            h < q_half
        } else {
            cross(n, q) >= 0.0
        }
    };

    let mut lo = 0;
    let mut hi = count - 1;
    while lo != hi {
        let mid = (lo + hi + 1) / 2;
        if not_past(planes[mid].n) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    lo
}

/// One endpoint of a support edge with its stable feature id.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgePoint {
    pub p: Vec2<f64>,
    pub hash: u64,
}

/// A support edge of a shape, possibly rounded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub a: EdgePoint,
    pub b: EdgePoint,
    pub r: f64,
    #[allow(dead_code)]
    pub n: Vec2<f64>,
}

/// Support point of the Minkowski difference along `n`.
fn support(s1: &SupportShape, s2: &SupportShape, n: Vec2<f64>) -> MinkowskiPoint {
    let a = s1.support(-n);
    let b = s2.support(n);

    MinkowskiPoint { a, b, ab: b - a }
}

/// Fraction along `a`-`b` closest to the origin.
fn closest_t(a: Vec2<f64>, b: Vec2<f64>) -> f64 {
    let delta = b - a;
    let len_sq = delta.magnitude_squared();
    if len_sq == 0.0 {
        return 0.0;
    }

    (delta.dot(-a) / len_sq).clamp(0.0, 1.0)
}

/// Reconstruct the surface points from a simplex edge.
fn closest_points(v0: MinkowskiPoint, v1: MinkowskiPoint, t: f64, coef: f64) -> ClosestPoints {
    let pa = lerp(v0.a, v1.a, t);
    let pb = lerp(v0.b, v1.b, t);

    let d = coef * pa.distance(pb);
    let n = normalized_or_zero(
        (if d != 0.0 {
            pb - pa
        } else {
            perp(v0.ab - v1.ab)
        }) * coef,
    );

    ClosestPoints { a: pa, b: pb, d, n }
}

/// Barycentric check whether the triangle contains the origin.
fn contains_origin(a: Vec2<f64>, b: Vec2<f64>, c: Vec2<f64>) -> bool {
    let v0 = a - b;
    let v1 = c - b;

    let dot00 = v0.dot(v0);
    let dot01 = v0.dot(v1);
    let dot0v = v0.dot(-b);
    let dot11 = v1.dot(v1);
    let dot1v = v1.dot(-b);

    let det = dot00 * dot11 - dot01 * dot01;
    let x = (dot11 * dot0v - dot01 * dot1v) / det;
    let y = (dot00 * dot1v - dot01 * dot0v) / det;

    x >= 0.0 && y >= 0.0 && x + y <= 1.0
}

const MAX_GJK_ITERATIONS: usize = 32;
const MAX_EPA_ITERATIONS: usize = 32;

/// Expand the overlap simplex until the hull edge closest to the origin
/// stops improving, giving the minimum translation vector.
fn epa(
    s1: &SupportShape,
    s2: &SupportShape,
    v0: MinkowskiPoint,
    v1: MinkowskiPoint,
    v2: MinkowskiPoint,
) -> ClosestPoints {
    let mut hull = if cross(v1.ab - v0.ab, v2.ab - v0.ab) > 0.0 {
        vec![v0, v1, v2]
    } else {
        vec![v0, v2, v1]
    };

    for _ in 0..MAX_EPA_ITERATIONS {
        // Edge of the hull closest to the origin.
        let mut mini = 0;
        let mut min_t = 0.0;
        let mut min_dist = f64::INFINITY;
        for i in 0..hull.len() {
            let j = (i + 1) % hull.len();
            let t = closest_t(hull[i].ab, hull[j].ab);
            let dist = lerp(hull[i].ab, hull[j].ab, t).magnitude_squared();
            if dist < min_dist {
                min_dist = dist;
                min_t = t;
                mini = i;
            }
        }

        let e0 = hull[mini];
        let e1 = hull[(mini + 1) % hull.len()];

        // Push the edge outward; when the origin sits on it, fall back to
        // the edge normal.
        let closest = lerp(e0.ab, e1.ab, min_t);
        let dir = if closest.magnitude_squared() > MAGIC_EPSILON * MAGIC_EPSILON {
            closest
        } else {
            rperp(e1.ab - e0.ab)
        };
        let p = support(s1, s2, dir);

        let dp = closest.dot(p.ab);
        let d2 = closest.dot(e0.ab).max(closest.dot(e1.ab));
        if dp - d2 > MAGIC_EPSILON {
            hull.insert(mini + 1, p);
        } else {
            return closest_points(e0, e1, min_t, -1.0);
        }
    }

    log::warn!("Penetration depth search failed to converge");
    let t = closest_t(hull[0].ab, hull[1].ab);
    closest_points(hull[0], hull[1], t, -1.0)
}

/// Closest points between two convex shapes.
///
/// `axis` seeds the first support direction, anything roughly separating the
/// shapes converges fast.
pub(crate) fn gjk(s1: &SupportShape, s2: &SupportShape, axis: Vec2<f64>) -> ClosestPoints {
    let axis = if axis.magnitude_squared() > 0.0 {
        axis
    } else {
        Vec2::new(1.0, 0.0)
    };

    let mut v0 = support(s1, s2, axis);
    let mut v1 = support(s1, s2, -axis);

    for _ in 0..MAX_GJK_ITERATIONS {
        let t = closest_t(v0.ab, v1.ab);
        let closest = lerp(v0.ab, v1.ab, t);

        let p = support(s1, s2, -closest);

        let dp = closest.dot(p.ab);
        let d2 = closest.dot(v0.ab).min(closest.dot(v1.ab));

        if dp <= 0.0 && contains_origin(v0.ab, v1.ab, p.ab) {
            return epa(s1, s2, v0, v1, p);
        } else if dp - d2 < -MAGIC_EPSILON {
            // The new point gets the simplex closer, replace the farther end.
            if v0.ab.magnitude_squared() <= v1.ab.magnitude_squared() {
                v1 = p;
            } else {
                v0 = p;
            }
        } else {
            return closest_points(v0, v1, t, 1.0);
        }
    }

    let t = closest_t(v0.ab, v1.ab);
    closest_points(v0, v1, t, 1.0)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use vek::Vec2;

    use crate::shape::{planes_for_verts, PlaneVec};

    use super::*;

    fn square(center: Vec2<f64>, half: f64) -> PlaneVec {
        planes_for_verts(&[
            center + Vec2::new(half, -half),
            center + Vec2::new(half, half),
            center + Vec2::new(-half, half),
            center + Vec2::new(-half, -half),
        ])
    }

    #[test]
    fn support_index_matches_linear_scan() {
        let planes = square(Vec2::new(0.4, -0.2), 1.0);

        for i in 0..64 {
            let angle = i as f64 / 64.0 * std::f64::consts::TAU;
            let q = Vec2::new(angle.cos(), angle.sin());

            let linear = (0..planes.len())
                .max_by(|&a, &b| {
                    planes[a]
                        .v0
                        .dot(q)
                        .partial_cmp(&planes[b].v0.dot(q))
                        .unwrap()
                })
                .unwrap();

            let binary = support_index(&planes, q);
            assert_relative_eq!(planes[binary].v0.dot(q), planes[linear].v0.dot(q));
        }
    }

    #[test]
    fn separated_squares_report_distance() {
        let a = square(Vec2::new(0.0, 0.0), 1.0);
        let b = square(Vec2::new(5.0, 0.0), 1.0);

        let points = gjk(
            &SupportShape::Poly {
                planes: &a,
                r: 0.0,
                hashid: 1,
            },
            &SupportShape::Poly {
                planes: &b,
                r: 0.0,
                hashid: 2,
            },
            Vec2::new(0.0, 1.0),
        );

        assert_relative_eq!(points.d, 3.0, epsilon = 1e-9);
        assert_relative_eq!(points.n.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(points.a.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(points.b.x, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn overlapping_squares_report_penetration() {
        let a = square(Vec2::new(0.0, 0.0), 1.0);
        let b = square(Vec2::new(1.5, 0.0), 1.0);

        let points = gjk(
            &SupportShape::Poly {
                planes: &a,
                r: 0.0,
                hashid: 1,
            },
            &SupportShape::Poly {
                planes: &b,
                r: 0.0,
                hashid: 2,
            },
            Vec2::new(0.0, 1.0),
        );

        assert_relative_eq!(points.d, -0.5, epsilon = 1e-9);
        assert_relative_eq!(points.n.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn symmetric_arguments_flip_the_normal() {
        let a = square(Vec2::new(0.0, 0.0), 1.0);
        let b = square(Vec2::new(1.2, 0.7), 1.0);

        let sa = SupportShape::Poly {
            planes: &a,
            r: 0.0,
            hashid: 1,
        };
        let sb = SupportShape::Poly {
            planes: &b,
            r: 0.0,
            hashid: 2,
        };

        let ab = gjk(&sa, &sb, Vec2::new(0.0, 1.0));
        let ba = gjk(&sb, &sa, Vec2::new(0.0, 1.0));

        assert_relative_eq!(ab.d, ba.d, epsilon = 1e-9);
        assert_relative_eq!(ab.n.x, -ba.n.x, epsilon = 1e-9);
        assert_relative_eq!(ab.n.y, -ba.n.y, epsilon = 1e-9);
    }
}
