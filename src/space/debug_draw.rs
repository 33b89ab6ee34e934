//! Debug rendering of a space's contents.
//!
//! The space doesn't render anything itself; it walks its shapes, joints
//! and contact points and hands primitives to a [`DebugDraw`]
//! implementation supplied by the host.

use vek::Vec2;

use crate::{
    constraint::ConstraintKind,
    shape::{ShapeKey, ShapeKind},
    space::Space,
};

/// Straight RGBA color, components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl DebugColor {
    /// Construct a color.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// What to draw and with which colors.
#[derive(Debug, Clone)]
pub struct DebugDrawOptions {
    pub draw_shapes: bool,
    pub draw_constraints: bool,
    pub draw_collision_points: bool,
    pub shape_outline_color: DebugColor,
    pub constraint_color: DebugColor,
    pub collision_point_color: DebugColor,
}

impl Default for DebugDrawOptions {
    fn default() -> Self {
        Self {
            draw_shapes: true,
            draw_constraints: true,
            draw_collision_points: true,
            shape_outline_color: DebugColor::new(0.2, 0.2, 0.2, 1.0),
            constraint_color: DebugColor::new(0.0, 0.75, 0.0, 1.0),
            collision_point_color: DebugColor::new(1.0, 0.0, 0.0, 1.0),
        }
    }
}

/// The primitives a renderer has to provide.
pub trait DebugDraw {
    /// A circle with an orientation tick.
    fn draw_circle(
        &mut self,
        pos: Vec2<f64>,
        angle: f64,
        radius: f64,
        outline: DebugColor,
        fill: DebugColor,
    );

    /// A hairline segment.
    fn draw_segment(&mut self, a: Vec2<f64>, b: Vec2<f64>, color: DebugColor);

    /// A segment with thickness.
    fn draw_fat_segment(
        &mut self,
        a: Vec2<f64>,
        b: Vec2<f64>,
        radius: f64,
        outline: DebugColor,
        fill: DebugColor,
    );

    /// A closed polygon, optionally with rounded corners.
    fn draw_polygon(
        &mut self,
        verts: &[Vec2<f64>],
        radius: f64,
        outline: DebugColor,
        fill: DebugColor,
    );

    /// A point of a fixed on-screen size.
    fn draw_dot(&mut self, size: f64, pos: Vec2<f64>, color: DebugColor);

    /// Fill color used for a shape, overridable for highlighting.
    fn shape_fill_color(&mut self, shape: ShapeKey, space: &Space) -> DebugColor {
        const PALETTE: [DebugColor; 6] = [
            DebugColor::new(0.35, 0.55, 0.85, 1.0),
            DebugColor::new(0.85, 0.55, 0.35, 1.0),
            DebugColor::new(0.55, 0.85, 0.35, 1.0),
            DebugColor::new(0.85, 0.35, 0.55, 1.0),
            DebugColor::new(0.35, 0.85, 0.75, 1.0),
            DebugColor::new(0.75, 0.35, 0.85, 1.0),
        ];

        let shape = space.shape(shape);
        if space.body(shape.body()).is_sleeping() {
            DebugColor::new(0.5, 0.5, 0.5, 1.0)
        } else {
            PALETTE[shape.hashid as usize % PALETTE.len()]
        }
    }
}

impl Space {
    /// Walk the space's contents and hand them to a renderer.
    pub fn debug_draw(&self, draw: &mut dyn DebugDraw, options: &DebugDrawOptions) {
        if options.draw_shapes {
            for (key, shape) in self.shapes.iter() {
                let fill = draw.shape_fill_color(key, self);
                let outline = options.shape_outline_color;

                match &shape.kind {
                    ShapeKind::Circle { r, tc, .. } => {
                        let angle = self.bodies[shape.body].angle();
                        draw.draw_circle(*tc, angle, *r, outline, fill);
                    }
                    ShapeKind::Segment { r, ta, tb, .. } => {
                        draw.draw_fat_segment(*ta, *tb, *r, outline, fill);
                    }
                    ShapeKind::Polygon { r, t_planes, .. } => {
                        let verts: Vec<Vec2<f64>> =
                            t_planes.iter().map(|plane| plane.v0).collect();
                        draw.draw_polygon(&verts, *r, outline, fill);
                    }
                }
            }
        }

        if options.draw_constraints {
            let color = options.constraint_color;

            for (_key, constraint) in self.constraints.iter() {
                let (a_key, b_key) = constraint.bodies();
                let a = &self.bodies[a_key];
                let b = &self.bodies[b_key];

                match constraint.kind() {
                    ConstraintKind::Pin(joint) => {
                        let pa = a.local_to_world(joint.anchor_a());
                        let pb = b.local_to_world(joint.anchor_b());
                        draw.draw_dot(5.0, pa, color);
                        draw.draw_dot(5.0, pb, color);
                        draw.draw_segment(pa, pb, color);
                    }
                    ConstraintKind::Slide(joint) => {
                        let pa = a.local_to_world(joint.anchor_a());
                        let pb = b.local_to_world(joint.anchor_b());
                        draw.draw_dot(5.0, pa, color);
                        draw.draw_dot(5.0, pb, color);
                        draw.draw_segment(pa, pb, color);
                    }
                    ConstraintKind::Pivot(joint) => {
                        draw.draw_dot(5.0, a.local_to_world(joint.anchor_a()), color);
                        draw.draw_dot(5.0, b.local_to_world(joint.anchor_b()), color);
                    }
                    ConstraintKind::Groove(joint) => {
                        let ga = a.local_to_world(joint.groove_a());
                        let gb = a.local_to_world(joint.groove_b());
                        draw.draw_segment(ga, gb, color);
                        draw.draw_dot(5.0, b.local_to_world(joint.anchor_b()), color);
                    }
                    ConstraintKind::DampedSpring(joint) => {
                        let pa = a.local_to_world(joint.anchor_a());
                        let pb = b.local_to_world(joint.anchor_b());
                        draw.draw_dot(5.0, pa, color);
                        draw.draw_dot(5.0, pb, color);
                        draw.draw_segment(pa, pb, color);
                    }
                    // The rotary constraints have no geometry to show.
                    _ => {}
                }
            }
        }

        if options.draw_collision_points {
            for &pair in &self.arbiters {
                let Some(arb) = self.cached_arbiters.get(&pair) else {
                    continue;
                };

                for i in 0..arb.contact_count() {
                    draw.draw_dot(4.0, arb.point_a(i), options.collision_point_color);
                    draw.draw_dot(4.0, arb.point_b(i), options.collision_point_color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use vek::Vec2;

    use crate::{body::Body, constraint::Constraint, shape::Shape, space::SpaceSettings};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        circles: usize,
        segments: usize,
        fat_segments: usize,
        polygons: usize,
        dots: usize,
    }

    impl DebugDraw for Recorder {
        fn draw_circle(&mut self, _: Vec2<f64>, _: f64, _: f64, _: DebugColor, _: DebugColor) {
            self.circles += 1;
        }

        fn draw_segment(&mut self, _: Vec2<f64>, _: Vec2<f64>, _: DebugColor) {
            self.segments += 1;
        }

        fn draw_fat_segment(
            &mut self,
            _: Vec2<f64>,
            _: Vec2<f64>,
            _: f64,
            _: DebugColor,
            _: DebugColor,
        ) {
            self.fat_segments += 1;
        }

        fn draw_polygon(&mut self, _: &[Vec2<f64>], _: f64, _: DebugColor, _: DebugColor) {
            self.polygons += 1;
        }

        fn draw_dot(&mut self, _: f64, _: Vec2<f64>, _: DebugColor) {
            self.dots += 1;
        }
    }

    #[test]
    fn draws_every_shape_and_contact() {
        let mut space = Space::with_settings(SpaceSettings {
            gravity: Vec2::new(0.0, -100.0),
            ..SpaceSettings::default()
        });

        let ground = space.static_body();
        space
            .add_shape(Shape::segment(
                ground,
                Vec2::new(-50.0, 0.0),
                Vec2::new(50.0, 0.0),
                1.0,
            ))
            .unwrap();

        let mut body = Body::new(1.0, 10.0);
        body.set_position(Vec2::new(0.0, 10.0));
        let ball = space.add_body(body).unwrap();
        space
            .add_shape(Shape::circle(ball, 10.0, Vec2::zero()))
            .unwrap();

        let mut anchor = Body::new(1.0, crate::math::moment_for_box(1.0, 8.0, 8.0));
        anchor.set_position(Vec2::new(30.0, 20.0));
        let anchor = space.add_body(anchor).unwrap();
        space
            .add_shape(Shape::box_shape(anchor, 8.0, 8.0, 0.0))
            .unwrap();

        space
            .add_constraint(Constraint::slide(
                ball,
                anchor,
                Vec2::zero(),
                Vec2::zero(),
                10.0,
                50.0,
            ))
            .unwrap();

        // A few steps so the ball touches the ground.
        for _ in 0..30 {
            space.step(1.0 / 60.0);
        }

        let mut recorder = Recorder::default();
        space.debug_draw(&mut recorder, &DebugDrawOptions::default());

        assert_eq!(recorder.circles, 1);
        assert_eq!(recorder.fat_segments, 1);
        assert_eq!(recorder.polygons, 1);
        assert_eq!(recorder.segments, 1);
        // Joint anchors and at least one contact point pair.
        assert!(recorder.dots >= 4);
    }
}
