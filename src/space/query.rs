//! Geometric queries against everything in a space.
//!
//! All queries are read only and may be issued from collision callbacks
//! while the space is stepping.

use vek::{Aabr, Vec2};

use crate::{
    collision::{collide, CollisionInfo},
    math::{aabr_expand, aabr_intersects},
    shape::{PointQueryInfo, SegmentQueryInfo, Shape, ShapeFilter, ShapeKey},
    space::Space,
};

impl Space {
    /// Visit every shape within `max_distance` of a point.
    ///
    /// Negative distances only match shapes the point is inside of.
    pub fn point_query(
        &self,
        point: Vec2<f64>,
        max_distance: f64,
        filter: ShapeFilter,
        mut f: impl FnMut(&PointQueryInfo),
    ) {
        let bb = aabr_expand(
            Aabr {
                min: point,
                max: point,
            },
            max_distance.max(0.0),
        );

        let mut visit = |key: ShapeKey| {
            let shape = &self.shapes[key];
            if shape.filter.reject(&filter) {
                return;
            }

            let info = shape.point_query(key, point);
            if info.distance < max_distance {
                f(&info);
            }
        };

        self.dynamic_index.query(bb, &mut visit);
        self.static_index.query(bb, &mut visit);
    }

    /// The closest non-sensor shape within `max_distance` of a point.
    pub fn point_query_nearest(
        &self,
        point: Vec2<f64>,
        max_distance: f64,
        filter: ShapeFilter,
    ) -> Option<PointQueryInfo> {
        let bb = aabr_expand(
            Aabr {
                min: point,
                max: point,
            },
            max_distance.max(0.0),
        );

        let mut best: Option<PointQueryInfo> = None;

        let mut visit = |key: ShapeKey| {
            let shape = &self.shapes[key];
            if shape.sensor || shape.filter.reject(&filter) {
                return;
            }

            let info = shape.point_query(key, point);
            if info.distance < best.map_or(max_distance, |best| best.distance) {
                best = Some(info);
            }
        };

        self.dynamic_index.query(bb, &mut visit);
        self.static_index.query(bb, &mut visit);

        best
    }

    /// Visit every shape hit by a thick segment, in no particular order.
    pub fn segment_query(
        &self,
        start: Vec2<f64>,
        end: Vec2<f64>,
        radius: f64,
        filter: ShapeFilter,
        mut f: impl FnMut(&SegmentQueryInfo),
    ) {
        let mut visit = |key: ShapeKey| -> f64 {
            let shape = &self.shapes[key];
            if !shape.filter.reject(&filter) {
                if let Some(info) = shape.segment_query(key, start, end, radius) {
                    f(&info);
                }
            }

            1.0
        };

        self.static_index.segment_query(start, end, 1.0, &mut visit);
        self.dynamic_index.segment_query(start, end, 1.0, &mut visit);
    }

    /// The first non-sensor shape hit by a thick segment.
    pub fn segment_query_first(
        &self,
        start: Vec2<f64>,
        end: Vec2<f64>,
        radius: f64,
        filter: ShapeFilter,
    ) -> Option<SegmentQueryInfo> {
        let mut best: Option<SegmentQueryInfo> = None;

        let mut visit = |key: ShapeKey| -> f64 {
            let shape = &self.shapes[key];
            if !shape.sensor && !shape.filter.reject(&filter) {
                if let Some(info) = shape.segment_query(key, start, end, radius) {
                    if info.alpha < best.map_or(1.0, |best| best.alpha) {
                        best = Some(info);
                    }
                }
            }

            // Prune everything farther than the best hit so far.
            best.map_or(1.0, |best| best.alpha)
        };

        self.static_index.segment_query(start, end, 1.0, &mut visit);
        self.dynamic_index.segment_query(start, end, 1.0, &mut visit);

        best
    }

    /// Visit every shape whose bounding box touches the queried one.
    pub fn bb_query(&self, bb: Aabr<f64>, filter: ShapeFilter, mut f: impl FnMut(ShapeKey)) {
        let mut visit = |key: ShapeKey| {
            let shape = &self.shapes[key];
            if !shape.filter.reject(&filter) && aabr_intersects(bb, shape.bb) {
                f(key);
            }
        };

        self.dynamic_index.query(bb, &mut visit);
        self.static_index.query(bb, &mut visit);
    }

    /// Collide a free standing shape against everything in the space.
    ///
    /// The shape's world data must be cached with [`Shape::cache_bb`]
    /// before querying. Returns whether anything touched it; the callback
    /// gets contacts with normals pointing away from the queried shape.
    pub fn shape_query(
        &self,
        shape: &Shape,
        mut f: impl FnMut(ShapeKey, &CollisionInfo),
    ) -> bool {
        let mut any = false;

        let mut visit = |key: ShapeKey| {
            let other = &self.shapes[key];

            if other.body == shape.body && self.bodies.contains_key(shape.body) {
                return;
            }
            if other.filter.reject(&shape.filter) {
                return;
            }
            if !aabr_intersects(shape.bb, other.bb) {
                return;
            }

            // Dispatch in table order and flip the result back around the
            // queried shape when it got swapped.
            let swapped = shape.kind.table_index() > other.kind.table_index();
            let mut info = if swapped {
                collide(other, shape)
            } else {
                collide(shape, other)
            };

            if info.colliding() {
                if swapped {
                    info.n = -info.n;
                    for contact in &mut info.contacts {
                        std::mem::swap(&mut contact.p1, &mut contact.p2);
                    }
                }

                any = true;
                f(key, &info);
            }
        };

        self.dynamic_index.query(shape.bb, &mut visit);
        self.static_index.query(shape.bb, &mut visit);

        any
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use vek::Vec2;

    use crate::{body::Body, math::Iso, shape::Shape};

    use super::*;

    fn test_space() -> (Space, ShapeKey, ShapeKey) {
        let mut space = Space::new();

        let ground = space.static_body();
        let floor = space
            .add_shape(Shape::segment(
                ground,
                Vec2::new(-100.0, 0.0),
                Vec2::new(100.0, 0.0),
                1.0,
            ))
            .unwrap();

        let mut body = Body::new(1.0, 10.0);
        body.set_position(Vec2::new(0.0, 50.0));
        let body = space.add_body(body).unwrap();
        let ball = space
            .add_shape(Shape::circle(body, 10.0, Vec2::zero()))
            .unwrap();

        (space, floor, ball)
    }

    #[test]
    fn point_query_finds_nearby_shapes() {
        let (space, floor, ball) = test_space();

        let mut hits = Vec::new();
        space.point_query(Vec2::new(0.0, 45.0), 30.0, ShapeFilter::ALL, |info| {
            hits.push(info.shape)
        });

        assert_eq!(hits, vec![ball]);

        let nearest = space
            .point_query_nearest(Vec2::new(0.0, 20.0), 1000.0, ShapeFilter::ALL)
            .unwrap();
        assert_eq!(nearest.shape, floor);
        assert_relative_eq!(nearest.distance, 19.0);
    }

    #[test]
    fn point_query_respects_filter() {
        let (mut space, _floor, ball) = test_space();
        space
            .shape_mut(ball)
            .set_filter(crate::shape::ShapeFilter::new(0, 0b10, 0b10));

        let mut hits = Vec::new();
        space.point_query(
            Vec2::new(0.0, 45.0),
            30.0,
            crate::shape::ShapeFilter::new(0, 0b01, 0b01),
            |info| hits.push(info.shape),
        );

        assert!(hits.is_empty());
    }

    #[test]
    fn segment_query_first_reports_the_near_hit() {
        let (space, _floor, ball) = test_space();

        // Straight down through the ball onto the floor.
        let hit = space
            .segment_query_first(
                Vec2::new(0.0, 100.0),
                Vec2::new(0.0, -10.0),
                0.0,
                ShapeFilter::ALL,
            )
            .expect("The ray hits the ball");

        assert_eq!(hit.shape, ball);
        assert_relative_eq!(hit.point.y, 60.0, epsilon = 1e-9);
        assert_relative_eq!(hit.normal.y, 1.0, epsilon = 1e-9);

        let mut count = 0;
        space.segment_query(
            Vec2::new(0.0, 100.0),
            Vec2::new(0.0, -10.0),
            0.0,
            ShapeFilter::ALL,
            |_info| count += 1,
        );
        assert_eq!(count, 2);
    }

    #[test]
    fn bb_query_reports_overlaps() {
        let (space, floor, ball) = test_space();

        let mut hits = Vec::new();
        space.bb_query(
            Aabr {
                min: Vec2::new(-5.0, -5.0),
                max: Vec2::new(5.0, 55.0),
            },
            ShapeFilter::ALL,
            |key| hits.push(key),
        );

        assert!(hits.contains(&floor));
        assert!(hits.contains(&ball));
    }

    #[test]
    fn shape_query_reports_contacts() {
        let (space, _floor, ball) = test_space();

        let mut probe = Shape::circle(space.static_body(), 10.0, Vec2::zero());
        probe.cache_bb(Iso::from_pos(Vec2::new(5.0, 50.0)));

        let mut hits = Vec::new();
        let any = space.shape_query(&probe, |key, info| hits.push((key, info.n)));

        assert!(any);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, ball);
        // The normal points from the probe toward the ball.
        assert!(hits[0].1.x < 0.0);
    }
}
