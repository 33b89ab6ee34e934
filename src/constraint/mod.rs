//! Joints, springs and motors between pairs of bodies.
//!
//! Every variant shares the same solver contract: per step constants in
//! `pre_step`, a warm starting `apply_cached_impulse`, one `apply_impulse`
//! per solver iteration and an accumulated impulse readout.

pub(crate) mod util;

mod gear;
mod groove;
mod motor;
mod pin;
mod pivot;
mod ratchet;
mod rotary_limit;
mod rotary_spring;
mod slide;
mod spring;

use slotmap::new_key_type;
use vek::Vec2;

use crate::{
    body::{Body, BodyKey},
    UserData,
};

pub use self::{
    gear::GearJoint, groove::GrooveJoint, motor::SimpleMotor, pin::PinJoint, pivot::PivotJoint,
    ratchet::RatchetJoint, rotary_limit::RotaryLimitJoint, rotary_spring::DampedRotarySpring,
    slide::SlideJoint, spring::DampedSpring,
};

new_key_type! {
    /// Handle of a constraint inside a space.
    pub struct ConstraintKey;
}

/// User hook fired around the solving of a single constraint.
pub type ConstraintSolveFn = fn(&mut Constraint, &mut Body, &mut Body);

/// The common limits every joint respects.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Props {
    pub max_force: f64,
    pub error_bias: f64,
    pub max_bias: f64,
}

impl Props {
    /// The largest impulse a single step may apply.
    pub fn j_max(&self, dt: f64) -> f64 {
        self.max_force * dt
    }
}

/// The concrete joint a constraint solves.
#[derive(Debug)]
pub enum ConstraintKind {
    Pin(PinJoint),
    Slide(SlideJoint),
    Pivot(PivotJoint),
    Groove(GrooveJoint),
    DampedSpring(DampedSpring),
    DampedRotarySpring(DampedRotarySpring),
    RotaryLimit(RotaryLimitJoint),
    Ratchet(RatchetJoint),
    Gear(GearJoint),
    SimpleMotor(SimpleMotor),
}

/// A joint between two bodies.
#[derive(Debug)]
pub struct Constraint {
    pub(crate) a: BodyKey,
    pub(crate) b: BodyKey,
    /// Clamp on the impulse applied per second.
    max_force: f64,
    /// Fraction of position error remaining after one second of correction.
    error_bias: f64,
    /// Clamp on the correction velocity.
    max_bias: f64,
    /// Whether the joined bodies still collide with each other.
    collide_bodies: bool,
    pub(crate) pre_solve: Option<ConstraintSolveFn>,
    pub(crate) post_solve: Option<ConstraintSolveFn>,
    pub(crate) kind: ConstraintKind,
    pub user_data: UserData,
}

impl Constraint {
    fn with_kind(a: BodyKey, b: BodyKey, kind: ConstraintKind) -> Self {
        debug_assert!(a != b, "A constraint needs two different bodies");

        Self {
            a,
            b,
            max_force: f64::INFINITY,
            // Corrects roughly 10% of the remaining error per 1/60th of a
            // second.
            error_bias: (1.0f64 - 0.1).powf(60.0),
            max_bias: f64::INFINITY,
            collide_bodies: true,
            pre_solve: None,
            post_solve: None,
            kind,
            user_data: None,
        }
    }

    /// Keep two anchor points an exact distance apart.
    ///
    /// The rest distance is measured between the anchors at creation time.
    pub fn pin(
        a: BodyKey,
        b: BodyKey,
        body_a: &Body,
        body_b: &Body,
        anchor_a: Vec2<f64>,
        anchor_b: Vec2<f64>,
    ) -> Self {
        Self::with_kind(
            a,
            b,
            ConstraintKind::Pin(PinJoint::new(body_a, body_b, anchor_a, anchor_b)),
        )
    }

    /// Keep the distance between two anchors inside a range.
    pub fn slide(
        a: BodyKey,
        b: BodyKey,
        anchor_a: Vec2<f64>,
        anchor_b: Vec2<f64>,
        min: f64,
        max: f64,
    ) -> Self {
        Self::with_kind(
            a,
            b,
            ConstraintKind::Slide(SlideJoint::new(anchor_a, anchor_b, min, max)),
        )
    }

    /// Pin two bodies together at a world point.
    pub fn pivot(a: BodyKey, b: BodyKey, body_a: &Body, body_b: &Body, pivot: Vec2<f64>) -> Self {
        Self::pivot_with_anchors(a, b, body_a.world_to_local(pivot), body_b.world_to_local(pivot))
    }

    /// Pin two bodies together at matching local anchors.
    pub fn pivot_with_anchors(
        a: BodyKey,
        b: BodyKey,
        anchor_a: Vec2<f64>,
        anchor_b: Vec2<f64>,
    ) -> Self {
        Self::with_kind(a, b, ConstraintKind::Pivot(PivotJoint::new(anchor_a, anchor_b)))
    }

    /// Pin the second body's anchor onto a groove of the first.
    ///
    /// The groove endpoints are local to the first body.
    pub fn groove(
        a: BodyKey,
        b: BodyKey,
        groove_a: Vec2<f64>,
        groove_b: Vec2<f64>,
        anchor_b: Vec2<f64>,
    ) -> Self {
        Self::with_kind(
            a,
            b,
            ConstraintKind::Groove(GrooveJoint::new(groove_a, groove_b, anchor_b)),
        )
    }

    /// A damped spring between two anchors.
    pub fn damped_spring(
        a: BodyKey,
        b: BodyKey,
        anchor_a: Vec2<f64>,
        anchor_b: Vec2<f64>,
        rest_length: f64,
        stiffness: f64,
        damping: f64,
    ) -> Self {
        Self::with_kind(
            a,
            b,
            ConstraintKind::DampedSpring(DampedSpring::new(
                anchor_a,
                anchor_b,
                rest_length,
                stiffness,
                damping,
            )),
        )
    }

    /// A damped torsion spring working on the relative angle.
    pub fn damped_rotary_spring(
        a: BodyKey,
        b: BodyKey,
        rest_angle: f64,
        stiffness: f64,
        damping: f64,
    ) -> Self {
        Self::with_kind(
            a,
            b,
            ConstraintKind::DampedRotarySpring(DampedRotarySpring::new(
                rest_angle, stiffness, damping,
            )),
        )
    }

    /// Keep the relative angle between two limits.
    pub fn rotary_limit(a: BodyKey, b: BodyKey, min: f64, max: f64) -> Self {
        Self::with_kind(
            a,
            b,
            ConstraintKind::RotaryLimit(RotaryLimitJoint::new(min, max)),
        )
    }

    /// Let the relative angle click forward like a socket wrench.
    pub fn ratchet(
        a: BodyKey,
        b: BodyKey,
        body_a: &Body,
        body_b: &Body,
        phase: f64,
        ratchet: f64,
    ) -> Self {
        Self::with_kind(
            a,
            b,
            ConstraintKind::Ratchet(RatchetJoint::new(body_a, body_b, phase, ratchet)),
        )
    }

    /// Gear the two angular velocities together at a ratio.
    pub fn gear(a: BodyKey, b: BodyKey, phase: f64, ratio: f64) -> Self {
        Self::with_kind(a, b, ConstraintKind::Gear(GearJoint::new(phase, ratio)))
    }

    /// Drive the relative angular velocity at a constant rate.
    pub fn simple_motor(a: BodyKey, b: BodyKey, rate: f64) -> Self {
        Self::with_kind(a, b, ConstraintKind::SimpleMotor(SimpleMotor::new(rate)))
    }

    /// The two constrained bodies.
    pub fn bodies(&self) -> (BodyKey, BodyKey) {
        (self.a, self.b)
    }

    /// The concrete joint.
    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// Mutable access to the concrete joint.
    pub fn kind_mut(&mut self) -> &mut ConstraintKind {
        &mut self.kind
    }

    /// Maximum force the constraint may apply.
    pub fn max_force(&self) -> f64 {
        self.max_force
    }

    /// Clamp the force the constraint may apply.
    pub fn set_max_force(&mut self, max_force: f64) {
        debug_assert!(max_force >= 0.0, "Max force must not be negative");
        self.max_force = max_force;
    }

    /// Fraction of position error left after one second.
    pub fn error_bias(&self) -> f64 {
        self.error_bias
    }

    /// Set the position correction decay.
    pub fn set_error_bias(&mut self, error_bias: f64) {
        self.error_bias = error_bias;
    }

    /// Maximum speed position errors are corrected at.
    pub fn max_bias(&self) -> f64 {
        self.max_bias
    }

    /// Clamp the position correction speed.
    pub fn set_max_bias(&mut self, max_bias: f64) {
        self.max_bias = max_bias;
    }

    /// Whether the joined bodies generate collisions against each other.
    pub fn collide_bodies(&self) -> bool {
        self.collide_bodies
    }

    /// Allow or suppress collisions between the joined bodies.
    pub fn set_collide_bodies(&mut self, collide: bool) {
        self.collide_bodies = collide;
    }

    /// Hook fired right before this constraint is solved each step.
    pub fn set_pre_solve(&mut self, f: Option<ConstraintSolveFn>) {
        self.pre_solve = f;
    }

    /// Hook fired after the solver finishes each step.
    pub fn set_post_solve(&mut self, f: Option<ConstraintSolveFn>) {
        self.post_solve = f;
    }

    /// The impulse the constraint applied during the last step.
    pub fn impulse(&self) -> f64 {
        match &self.kind {
            ConstraintKind::Pin(joint) => joint.impulse(),
            ConstraintKind::Slide(joint) => joint.impulse(),
            ConstraintKind::Pivot(joint) => joint.impulse(),
            ConstraintKind::Groove(joint) => joint.impulse(),
            ConstraintKind::DampedSpring(joint) => joint.impulse(),
            ConstraintKind::DampedRotarySpring(joint) => joint.impulse(),
            ConstraintKind::RotaryLimit(joint) => joint.impulse(),
            ConstraintKind::Ratchet(joint) => joint.impulse(),
            ConstraintKind::Gear(joint) => joint.impulse(),
            ConstraintKind::SimpleMotor(joint) => joint.impulse(),
        }
    }

    fn props(&self) -> Props {
        Props {
            max_force: self.max_force,
            error_bias: self.error_bias,
            max_bias: self.max_bias,
        }
    }

    /// Compute the per step solver constants, applying spring forces.
    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64) {
        let props = self.props();

        match &mut self.kind {
            ConstraintKind::Pin(joint) => joint.pre_step(a, b, dt, props),
            ConstraintKind::Slide(joint) => joint.pre_step(a, b, dt, props),
            ConstraintKind::Pivot(joint) => joint.pre_step(a, b, dt, props),
            ConstraintKind::Groove(joint) => joint.pre_step(a, b, dt, props),
            ConstraintKind::DampedSpring(joint) => joint.pre_step(a, b, dt),
            ConstraintKind::DampedRotarySpring(joint) => joint.pre_step(a, b, dt),
            ConstraintKind::RotaryLimit(joint) => joint.pre_step(a, b, dt, props),
            ConstraintKind::Ratchet(joint) => joint.pre_step(a, b, dt, props),
            ConstraintKind::Gear(joint) => joint.pre_step(a, b, dt, props),
            ConstraintKind::SimpleMotor(joint) => joint.pre_step(a, b),
        }
    }

    /// Warm start with last step's impulse scaled by the timestep ratio.
    pub(crate) fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        match &mut self.kind {
            ConstraintKind::Pin(joint) => joint.apply_cached_impulse(a, b, dt_coef),
            ConstraintKind::Slide(joint) => joint.apply_cached_impulse(a, b, dt_coef),
            ConstraintKind::Pivot(joint) => joint.apply_cached_impulse(a, b, dt_coef),
            ConstraintKind::Groove(joint) => joint.apply_cached_impulse(a, b, dt_coef),
            // Springs recompute their impulse from scratch every step.
            ConstraintKind::DampedSpring(_) | ConstraintKind::DampedRotarySpring(_) => {}
            ConstraintKind::RotaryLimit(joint) => joint.apply_cached_impulse(a, b, dt_coef),
            ConstraintKind::Ratchet(joint) => joint.apply_cached_impulse(a, b, dt_coef),
            ConstraintKind::Gear(joint) => joint.apply_cached_impulse(a, b, dt_coef),
            ConstraintKind::SimpleMotor(joint) => joint.apply_cached_impulse(a, b, dt_coef),
        }
    }

    /// One solver iteration.
    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f64) {
        let props = self.props();

        match &mut self.kind {
            ConstraintKind::Pin(joint) => joint.apply_impulse(a, b, dt, props),
            ConstraintKind::Slide(joint) => joint.apply_impulse(a, b, dt, props),
            ConstraintKind::Pivot(joint) => joint.apply_impulse(a, b, dt, props),
            ConstraintKind::Groove(joint) => joint.apply_impulse(a, b, dt, props),
            ConstraintKind::DampedSpring(joint) => joint.apply_impulse(a, b),
            ConstraintKind::DampedRotarySpring(joint) => joint.apply_impulse(a, b),
            ConstraintKind::RotaryLimit(joint) => joint.apply_impulse(a, b, dt, props),
            ConstraintKind::Ratchet(joint) => joint.apply_impulse(a, b, dt, props),
            ConstraintKind::Gear(joint) => joint.apply_impulse(a, b, dt, props),
            ConstraintKind::SimpleMotor(joint) => joint.apply_impulse(a, b, dt, props),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use vek::Vec2;

    use crate::{
        math::moment_for_circle,
        space::Space,
    };

    use super::*;

    const DT: f64 = 1.0 / 60.0;

    fn ball(pos: Vec2<f64>) -> Body {
        let mut body = Body::new(1.0, moment_for_circle(1.0, 0.0, 10.0, Vec2::zero()));
        body.set_position(pos);
        body
    }

    #[test]
    fn pivot_joint_pins_anchors_together() {
        let mut space = Space::new();

        let a = space.add_body(ball(Vec2::new(0.0, 0.0))).unwrap();
        let b = space.add_body(ball(Vec2::new(10.0, 0.0))).unwrap();
        space.body_mut(b).set_velocity(Vec2::new(0.0, 20.0));

        let joint = Constraint::pivot(
            a,
            b,
            space.body(a),
            space.body(b),
            Vec2::new(5.0, 0.0),
        );
        space.add_constraint(joint).unwrap();

        for _ in 0..60 {
            space.step(DT);
        }

        let pa = space.body(a).local_to_world(Vec2::new(5.0, 0.0));
        let pb = space.body(b).local_to_world(Vec2::new(-5.0, 0.0));
        assert!(pa.distance(pb) < 0.1, "Pivot anchors drifted apart");
    }

    #[test]
    fn simple_motor_reaches_its_rate() {
        let mut space = Space::new();

        let anchor = space.static_body();
        let wheel = space.add_body(ball(Vec2::zero())).unwrap();

        space
            .add_constraint(Constraint::simple_motor(anchor, wheel, 2.0))
            .unwrap();

        for _ in 0..60 {
            space.step(DT);
        }

        // The motor drives the relative rate to zero.
        assert_relative_eq!(space.body(wheel).angular_velocity(), -2.0, epsilon = 1e-6);
    }

    #[test]
    fn motor_torque_respects_max_force() {
        let mut space = Space::new();

        let anchor = space.static_body();
        let wheel = space.add_body(ball(Vec2::zero())).unwrap();
        // Moment of one keeps the numbers simple.
        space.body_mut(wheel).set_moment(1.0);

        let mut motor = Constraint::simple_motor(anchor, wheel, 10.0);
        motor.set_max_force(0.5);
        space.add_constraint(motor).unwrap();

        for _ in 0..60 {
            space.step(DT);
        }

        // Torque limited to 0.5 accelerates the wheel by 0.5 rad/s over a
        // second instead of jumping straight to the rate.
        let w = space.body(wheel).angular_velocity().abs();
        assert!((0.3..=0.7).contains(&w), "Wheel reached {w} rad/s");
    }

    #[test]
    fn rotary_limit_stops_the_spin() {
        let mut space = Space::new();

        let anchor = space.static_body();
        let wheel = space.add_body(ball(Vec2::zero())).unwrap();
        space.body_mut(wheel).set_angular_velocity(2.0);

        space
            .add_constraint(Constraint::rotary_limit(anchor, wheel, -0.5, 0.5))
            .unwrap();

        for _ in 0..120 {
            space.step(DT);
        }

        let angle = space.body(wheel).angle();
        assert!(
            angle <= 0.55,
            "The limit let the wheel spin through to {angle}"
        );
        assert!(space.body(wheel).angular_velocity().abs() < 0.1);
    }

    #[test]
    fn ratchet_blocks_the_locked_direction() {
        let mut space = Space::new();

        let anchor = space.static_body();
        let wheel = space.add_body(ball(Vec2::zero())).unwrap();

        space
            .add_constraint(Constraint::ratchet(
                anchor,
                wheel,
                space.body(anchor),
                space.body(wheel),
                0.0,
                0.1,
            ))
            .unwrap();

        // Clicking forward is free.
        space.body_mut(wheel).set_angular_velocity(1.0);
        for _ in 0..60 {
            space.step(DT);
        }
        assert!(space.body(wheel).angle() > 0.8);

        // Backing up engages the last tooth.
        let engaged = space.body(wheel).angle();
        space.body_mut(wheel).set_angular_velocity(-1.0);
        for _ in 0..60 {
            space.step(DT);
        }
        assert!(
            space.body(wheel).angle() > engaged - 0.2,
            "The ratchet slipped backwards"
        );
    }

    #[test]
    fn gear_locks_the_rate_ratio() {
        let mut space = Space::new();

        let a = space.add_body(ball(Vec2::new(0.0, 0.0))).unwrap();
        let b = space.add_body(ball(Vec2::new(50.0, 0.0))).unwrap();
        space.body_mut(a).set_angular_velocity(3.0);

        space
            .add_constraint(Constraint::gear(a, b, 0.0, 2.0))
            .unwrap();

        for _ in 0..120 {
            space.step(DT);
        }

        let wa = space.body(a).angular_velocity();
        let wb = space.body(b).angular_velocity();
        assert_relative_eq!(wa, 2.0 * wb, epsilon = 1e-6);
        assert!(wa.abs() > 0.1, "The gear stopped both wheels");
    }

    #[test]
    fn damped_spring_settles_at_rest_length() {
        let mut space = Space::new();

        let a = space.add_body(ball(Vec2::new(0.0, 0.0))).unwrap();
        let b = space.add_body(ball(Vec2::new(50.0, 0.0))).unwrap();

        space
            .add_constraint(Constraint::damped_spring(
                a,
                b,
                Vec2::zero(),
                Vec2::zero(),
                30.0,
                10.0,
                3.0,
            ))
            .unwrap();

        for _ in 0..600 {
            space.step(DT);
        }

        let dist = space
            .body(a)
            .position()
            .distance(space.body(b).position());
        assert!(
            (dist - 30.0).abs() < 2.0,
            "Spring settled at {dist} instead of the rest length"
        );
    }

    #[test]
    fn collide_bodies_flag_reports() {
        let a_key;
        let b_key;
        {
            let mut space = Space::new();
            a_key = space.add_body(ball(Vec2::zero())).unwrap();
            b_key = space.add_body(ball(Vec2::new(10.0, 0.0))).unwrap();
        }

        let mut joint = Constraint::slide(a_key, b_key, Vec2::zero(), Vec2::zero(), 0.0, 100.0);
        assert!(joint.collide_bodies());
        joint.set_collide_bodies(false);
        assert!(!joint.collide_bodies());
        assert_eq!(joint.bodies(), (a_key, b_key));
    }
}
