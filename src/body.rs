//! Rigid bodies and their integrators.

use slotmap::new_key_type;
use vek::Vec2;

use crate::{
    arbiter::PairKey,
    constraint::ConstraintKey,
    math::{clamp_magnitude, cross, perp, Iso, Rotation},
    shape::ShapeKey,
    UserData,
};

new_key_type! {
    /// Handle of a body inside a space.
    pub struct BodyKey;
}

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Simulated mass, responds to gravity, forces and collisions.
    Dynamic,
    /// Moves under its own velocity but is unaffected by collisions, the
    /// solver treats it as infinitely heavy.
    Kinematic,
    /// Never moves.
    Static,
}

/// Velocity integration hook, the default is [`Body::update_velocity`].
pub type VelocityFn = fn(&mut Body, Vec2<f64>, f64, f64);

/// Position integration hook, the default is [`Body::update_position`].
pub type PositionFn = fn(&mut Body, f64);

/// Sleep bookkeeping, a body belongs to at most one contact graph component.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SleepNode {
    /// Root body of the component this body sleeps in.
    pub root: Option<BodyKey>,
    /// Next body of the same component.
    pub next: Option<BodyKey>,
    /// Time spent below the idle speed threshold.
    pub idle_time: f64,
}

/// A rigid object, a pose with mass and velocity.
#[derive(Debug)]
pub struct Body {
    /// Mass, infinite for static and kinematic bodies.
    m: f64,
    m_inv: f64,
    /// Moment of inertia.
    i: f64,
    i_inv: f64,
    /// Center of gravity relative to the body origin.
    cog: Vec2<f64>,
    /// Position of the origin.
    p: Vec2<f64>,
    /// Linear velocity.
    v: Vec2<f64>,
    /// Accumulated force, cleared every velocity integration.
    f: Vec2<f64>,
    /// Orientation in radians, not normalized.
    a: f64,
    /// Angular velocity.
    w: f64,
    /// Accumulated torque.
    t: f64,
    /// Cached unit rotation, kept in lock step with `a`.
    rot: Rotation,
    /// Position correction velocity, only ever applied to positions.
    pub(crate) v_bias: Vec2<f64>,
    pub(crate) w_bias: f64,
    /// Maximum linear speed.
    v_limit: f64,
    /// Maximum angular speed.
    w_limit: f64,
    kind: BodyKind,
    pub(crate) velocity_fn: VelocityFn,
    pub(crate) position_fn: PositionFn,
    pub(crate) sleeping: SleepNode,
    /// Shapes attached to this body.
    pub(crate) shapes: Vec<ShapeKey>,
    /// Constraints with this body on either end.
    pub(crate) constraints: Vec<ConstraintKey>,
    /// Collision pairs this body currently participates in.
    pub(crate) arbiters: Vec<PairKey>,
    pub user_data: UserData,
}

impl Body {
    fn with_kind(m: f64, i: f64, kind: BodyKind) -> Self {
        Self {
            m,
            m_inv: recip_or_zero(m),
            i,
            i_inv: recip_or_zero(i),
            cog: Vec2::zero(),
            p: Vec2::zero(),
            v: Vec2::zero(),
            f: Vec2::zero(),
            a: 0.0,
            w: 0.0,
            t: 0.0,
            rot: Rotation::identity(),
            v_bias: Vec2::zero(),
            w_bias: 0.0,
            v_limit: f64::INFINITY,
            w_limit: f64::INFINITY,
            kind,
            velocity_fn: Self::update_velocity,
            position_fn: Self::update_position,
            sleeping: SleepNode::default(),
            shapes: Vec::new(),
            constraints: Vec::new(),
            arbiters: Vec::new(),
            user_data: None,
        }
    }

    /// A dynamic body with the given mass and moment of inertia.
    pub fn new(m: f64, i: f64) -> Self {
        debug_assert!(m > 0.0, "Dynamic body mass must be positive");
        debug_assert!(i > 0.0, "Dynamic body moment must be positive");

        Self::with_kind(m, i, BodyKind::Dynamic)
    }

    /// A body that moves but doesn't respond to collisions.
    pub fn new_kinematic() -> Self {
        Self::with_kind(f64::INFINITY, f64::INFINITY, BodyKind::Kinematic)
    }

    /// A body that never moves.
    pub fn new_static() -> Self {
        Self::with_kind(f64::INFINITY, f64::INFINITY, BodyKind::Static)
    }

    /// The simulation role of this body.
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Change the role without touching the space bookkeeping.
    ///
    /// Spaces move the body between indexes when this changes, use
    /// `Space::set_body_kind` for bodies that have been added.
    pub(crate) fn set_kind_raw(&mut self, kind: BodyKind) {
        self.kind = kind;

        if kind != BodyKind::Dynamic {
            self.m = f64::INFINITY;
            self.m_inv = 0.0;
            self.i = f64::INFINITY;
            self.i_inv = 0.0;
            self.v = Vec2::zero();
            self.w = 0.0;
            self.sleeping.idle_time = 0.0;
        }
    }

    /// Mass.
    pub fn mass(&self) -> f64 {
        self.m
    }

    /// Set the mass.
    pub fn set_mass(&mut self, m: f64) {
        debug_assert!(m > 0.0, "Body mass must be positive");

        self.m = m;
        self.m_inv = recip_or_zero(m);
    }

    /// Inverse mass, zero when infinite.
    pub fn mass_inv(&self) -> f64 {
        self.m_inv
    }

    /// Moment of inertia.
    pub fn moment(&self) -> f64 {
        self.i
    }

    /// Set the moment of inertia.
    pub fn set_moment(&mut self, i: f64) {
        debug_assert!(i > 0.0, "Body moment must be positive");

        self.i = i;
        self.i_inv = recip_or_zero(i);
    }

    /// Inverse moment of inertia, zero when infinite.
    pub fn moment_inv(&self) -> f64 {
        self.i_inv
    }

    /// Center of gravity relative to the body origin.
    pub fn center_of_gravity(&self) -> Vec2<f64> {
        self.cog
    }

    /// Set the center of gravity offset.
    pub fn set_center_of_gravity(&mut self, cog: Vec2<f64>) {
        self.cog = cog;
    }

    /// Position of the body origin.
    pub fn position(&self) -> Vec2<f64> {
        self.p
    }

    /// Teleport the body, velocities are untouched.
    pub fn set_position(&mut self, p: Vec2<f64>) {
        self.p = p;
    }

    /// Orientation in radians.
    pub fn angle(&self) -> f64 {
        self.a
    }

    /// Set the orientation, keeping the rotation cache in sync.
    ///
    /// The angle is not wrapped into `(-pi, pi]`.
    pub fn set_angle(&mut self, a: f64) {
        self.a = a;
        self.rot = Rotation::from_radians(a);
    }

    /// Cached unit rotation.
    pub fn rotation(&self) -> Rotation {
        self.rot
    }

    /// Linear velocity.
    pub fn velocity(&self) -> Vec2<f64> {
        self.v
    }

    /// Set the linear velocity.
    pub fn set_velocity(&mut self, v: Vec2<f64>) {
        self.v = v;
    }

    /// Angular velocity in radians per second.
    pub fn angular_velocity(&self) -> f64 {
        self.w
    }

    /// Set the angular velocity.
    pub fn set_angular_velocity(&mut self, w: f64) {
        self.w = w;
    }

    /// Accumulated force.
    pub fn force(&self) -> Vec2<f64> {
        self.f
    }

    /// Set the accumulated force.
    pub fn set_force(&mut self, f: Vec2<f64>) {
        self.f = f;
    }

    /// Accumulated torque.
    pub fn torque(&self) -> f64 {
        self.t
    }

    /// Set the accumulated torque.
    pub fn set_torque(&mut self, t: f64) {
        self.t = t;
    }

    /// Maximum linear speed the integrator lets the body reach.
    pub fn velocity_limit(&self) -> f64 {
        self.v_limit
    }

    /// Clamp the linear speed.
    pub fn set_velocity_limit(&mut self, limit: f64) {
        self.v_limit = limit;
    }

    /// Maximum angular speed the integrator lets the body reach.
    pub fn angular_velocity_limit(&self) -> f64 {
        self.w_limit
    }

    /// Clamp the angular speed.
    pub fn set_angular_velocity_limit(&mut self, limit: f64) {
        self.w_limit = limit;
    }

    /// Replace the velocity integration hook.
    pub fn set_velocity_fn(&mut self, f: VelocityFn) {
        self.velocity_fn = f;
    }

    /// Replace the position integration hook.
    pub fn set_position_fn(&mut self, f: PositionFn) {
        self.position_fn = f;
    }

    /// The body's pose as a transform.
    pub fn transform(&self) -> Iso {
        Iso {
            pos: self.p,
            rot: self.rot,
        }
    }

    /// World position of the center of gravity.
    pub fn world_cog(&self) -> Vec2<f64> {
        self.p + self.rot.rotate(self.cog)
    }

    /// Map a body local point to world space.
    pub fn local_to_world(&self, point: Vec2<f64>) -> Vec2<f64> {
        self.transform().apply(point)
    }

    /// Map a world point into body local space.
    pub fn world_to_local(&self, point: Vec2<f64>) -> Vec2<f64> {
        self.transform().apply_inverse(point)
    }

    /// Velocity of a world point as it moves with the body.
    pub fn velocity_at_world_point(&self, point: Vec2<f64>) -> Vec2<f64> {
        let r = point - self.world_cog();
        self.v + perp(r) * self.w
    }

    /// Velocity of a body local point.
    pub fn velocity_at_local_point(&self, point: Vec2<f64>) -> Vec2<f64> {
        self.velocity_at_world_point(self.local_to_world(point))
    }

    /// Kinetic energy of the body, translational plus rotational.
    pub fn kinetic_energy(&self) -> f64 {
        // Guard the products so a resting infinite mass gives 0 and not NaN.
        let vsq = self.v.dot(self.v);
        let wsq = self.w * self.w;

        (if vsq != 0.0 { vsq * self.m } else { 0.0 })
            + (if wsq != 0.0 { wsq * self.i } else { 0.0 })
    }

    /// Whether this body is part of a sleeping component.
    pub fn is_sleeping(&self) -> bool {
        self.sleeping.root.is_some()
    }

    /// Time this body has spent below the idle speed threshold.
    pub fn idle_time(&self) -> f64 {
        self.sleeping.idle_time
    }

    /// Accumulate a force applied at a world point.
    pub fn apply_force_at_world_point(&mut self, force: Vec2<f64>, point: Vec2<f64>) {
        let r = point - self.world_cog();
        self.f += force;
        self.t += cross(r, force);
    }

    /// Accumulate a force applied at a body local point.
    pub fn apply_force_at_local_point(&mut self, force: Vec2<f64>, point: Vec2<f64>) {
        let world = self.local_to_world(point);
        self.apply_force_at_world_point(force, world);
    }

    /// Immediately change velocity with an impulse at a world point.
    pub fn apply_impulse_at_world_point(&mut self, j: Vec2<f64>, point: Vec2<f64>) {
        let r = point - self.world_cog();
        self.apply_impulse(j, r);
    }

    /// Immediately change velocity with an impulse at a body local point.
    pub fn apply_impulse_at_local_point(&mut self, j: Vec2<f64>, point: Vec2<f64>) {
        let world = self.local_to_world(point);
        self.apply_impulse_at_world_point(j, world);
    }

    /// Apply an impulse at an offset from the center of gravity.
    #[inline]
    pub(crate) fn apply_impulse(&mut self, j: Vec2<f64>, r: Vec2<f64>) {
        self.v += j * self.m_inv;
        self.w += self.i_inv * cross(r, j);
    }

    /// Apply a position correction impulse, never visible as real velocity.
    #[inline]
    pub(crate) fn apply_bias_impulse(&mut self, j: Vec2<f64>, r: Vec2<f64>) {
        self.v_bias += j * self.m_inv;
        self.w_bias += self.i_inv * cross(r, j);
    }

    /// Default velocity integrator.
    ///
    /// `damping` is already scaled for the timestep by the space.
    pub fn update_velocity(body: &mut Body, gravity: Vec2<f64>, damping: f64, dt: f64) {
        // Kinematic bodies keep whatever velocity they were given.
        if body.kind != BodyKind::Dynamic {
            return;
        }

        debug_assert!(
            body.m > 0.0 && body.i > 0.0,
            "Integrating a dynamic body with non-positive mass or moment"
        );

        body.v = clamp_magnitude(
            body.v * damping + (gravity + body.f * body.m_inv) * dt,
            body.v_limit,
        );
        body.w = (body.w * damping + body.t * body.i_inv * dt).clamp(-body.w_limit, body.w_limit);

        body.f = Vec2::zero();
        body.t = 0.0;
    }

    /// Default position integrator, also consumes the bias velocities.
    pub fn update_position(body: &mut Body, dt: f64) {
        body.p += (body.v + body.v_bias) * dt;
        body.set_angle(body.a + (body.w + body.w_bias) * dt);

        body.v_bias = Vec2::zero();
        body.w_bias = 0.0;
    }

    /// Shapes attached to this body.
    pub fn shapes(&self) -> &[ShapeKey] {
        &self.shapes
    }

    /// Constraints attached to this body.
    pub fn constraints(&self) -> &[ConstraintKey] {
        &self.constraints
    }

    /// Collision pairs involving this body, rebuilt every step while awake.
    pub fn arbiters(&self) -> &[PairKey] {
        &self.arbiters
    }
}

/// Reciprocal mapping infinity to zero.
fn recip_or_zero(value: f64) -> f64 {
    if value == f64::INFINITY {
        0.0
    } else {
        1.0 / value
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use vek::Vec2;

    use super::*;

    #[test]
    fn mass_inverse_consistency() {
        let body = Body::new(4.0, 16.0);
        assert_relative_eq!(body.mass() * body.mass_inv(), 1.0);
        assert_relative_eq!(body.moment() * body.moment_inv(), 1.0);

        let fixed = Body::new_static();
        assert_eq!(fixed.mass_inv(), 0.0);
        assert_eq!(fixed.moment_inv(), 0.0);
    }

    #[test]
    fn rotation_cache_follows_angle() {
        let mut body = Body::new(1.0, 1.0);
        body.set_angle(12.5);

        let rot = body.rotation();
        assert_relative_eq!(rot.cos() * rot.cos() + rot.sin() * rot.sin(), 1.0);
        assert_relative_eq!(rot.cos(), 12.5f64.cos());
        // The angle itself is not wrapped.
        assert_relative_eq!(body.angle(), 12.5);
    }

    #[test]
    fn impulse_changes_velocities() {
        let mut body = Body::new(2.0, 8.0);
        body.apply_impulse_at_world_point(Vec2::new(0.0, 4.0), Vec2::new(1.0, 0.0));

        assert_relative_eq!(body.velocity().y, 2.0);
        // Torque of r x j = 1 * 4 over a moment of 8.
        assert_relative_eq!(body.angular_velocity(), 0.5);
    }

    #[test]
    fn velocity_at_point_adds_spin() {
        let mut body = Body::new(1.0, 1.0);
        body.set_velocity(Vec2::new(1.0, 0.0));
        body.set_angular_velocity(2.0);

        let v = body.velocity_at_world_point(Vec2::new(0.0, 1.0));
        assert_relative_eq!(v.x, -1.0);
        assert_relative_eq!(v.y, 0.0);
    }

    #[test]
    fn integrators_move_and_clear() {
        let mut body = Body::new(1.0, 1.0);
        body.set_force(Vec2::new(1.0, 0.0));

        Body::update_velocity(&mut body, Vec2::new(0.0, -10.0), 1.0, 0.5);
        assert_relative_eq!(body.velocity().x, 0.5);
        assert_relative_eq!(body.velocity().y, -5.0);
        assert_eq!(body.force(), Vec2::zero());

        body.v_bias = Vec2::new(2.0, 0.0);
        Body::update_position(&mut body, 0.5);
        assert_relative_eq!(body.position().x, 1.25);
        assert_eq!(body.v_bias, Vec2::zero());
    }

    #[test]
    fn static_bodies_skip_integration() {
        let mut body = Body::new_kinematic();
        body.set_velocity(Vec2::new(3.0, 0.0));

        Body::update_velocity(&mut body, Vec2::new(0.0, -10.0), 0.5, 1.0);
        // Gravity and damping don't touch kinematic bodies.
        assert_eq!(body.velocity(), Vec2::new(3.0, 0.0));
    }

    #[test]
    fn velocity_limit_clamps() {
        let mut body = Body::new(1.0, 1.0);
        body.set_velocity_limit(5.0);

        Body::update_velocity(&mut body, Vec2::new(100.0, 0.0), 1.0, 1.0);
        assert_relative_eq!(body.velocity().magnitude(), 5.0);
    }
}
