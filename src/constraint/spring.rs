//! Damped linear spring.

use vek::Vec2;

use crate::body::Body;

use super::util::{anchor_r, apply_impulses, k_scalar, normal_relative_velocity};

/// Custom spring force as a function of the spring and its current length.
pub type SpringForceFn = fn(&DampedSpring, f64) -> f64;

/// A spring with a linear force and exponential velocity damping.
///
/// Softer than solving a joint: the spring force is applied up front in the
/// pre step and only the damping participates in the solver iterations.
#[derive(Debug)]
pub struct DampedSpring {
    anchor_a: Vec2<f64>,
    anchor_b: Vec2<f64>,
    rest_length: f64,
    stiffness: f64,
    damping: f64,
    force_fn: Option<SpringForceFn>,

    target_vrn: f64,
    v_coef: f64,

    r1: Vec2<f64>,
    r2: Vec2<f64>,
    n: Vec2<f64>,
    n_mass: f64,

    j_acc: f64,
}

impl DampedSpring {
    pub(crate) fn new(
        anchor_a: Vec2<f64>,
        anchor_b: Vec2<f64>,
        rest_length: f64,
        stiffness: f64,
        damping: f64,
    ) -> Self {
        Self {
            anchor_a,
            anchor_b,
            rest_length,
            stiffness,
            damping,
            force_fn: None,
            target_vrn: 0.0,
            v_coef: 0.0,
            r1: Vec2::zero(),
            r2: Vec2::zero(),
            n: Vec2::zero(),
            n_mass: 0.0,
            j_acc: 0.0,
        }
    }

    /// Anchor on the first body.
    pub fn anchor_a(&self) -> Vec2<f64> {
        self.anchor_a
    }

    /// Anchor on the second body.
    pub fn anchor_b(&self) -> Vec2<f64> {
        self.anchor_b
    }

    /// Length the spring pulls or pushes toward.
    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    /// Set the rest length.
    pub fn set_rest_length(&mut self, rest_length: f64) {
        self.rest_length = rest_length;
    }

    /// Spring constant.
    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    /// Set the spring constant.
    pub fn set_stiffness(&mut self, stiffness: f64) {
        self.stiffness = stiffness;
    }

    /// Velocity damping factor.
    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Set the velocity damping.
    pub fn set_damping(&mut self, damping: f64) {
        self.damping = damping;
    }

    /// Replace the linear force curve.
    pub fn set_force_fn(&mut self, f: Option<SpringForceFn>) {
        self.force_fn = f;
    }

    fn spring_force(&self, dist: f64) -> f64 {
        match self.force_fn {
            Some(f) => f(self, dist),
            None => (self.rest_length - dist) * self.stiffness,
        }
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.j_acc
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64) {
        self.r1 = anchor_r(a, self.anchor_a);
        self.r2 = anchor_r(b, self.anchor_b);

        let delta = (b.world_cog() + self.r2) - (a.world_cog() + self.r1);
        let dist = delta.magnitude();
        self.n = delta * (1.0 / if dist != 0.0 { dist } else { f64::INFINITY });

        let k = k_scalar(a, b, self.r1, self.r2, self.n);
        self.n_mass = 1.0 / k;

        self.target_vrn = 0.0;
        self.v_coef = 1.0 - (-self.damping * dt * k).exp();

        // The spring force itself is applied as one impulse up front.
        let f_spring = self.spring_force(dist);
        let j_spring = f_spring * dt;
        self.j_acc = j_spring;
        apply_impulses(a, b, self.r1, self.r2, self.n * j_spring);
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let n = self.n;

        // Drain the relative velocity the damping is responsible for.
        let vrn = normal_relative_velocity(a, b, self.r1, self.r2, n);
        let v_damp = (self.target_vrn - vrn) * self.v_coef;
        self.target_vrn = vrn + v_damp;

        let j_damp = v_damp * self.n_mass;
        self.j_acc += j_damp;
        apply_impulses(a, b, self.r1, self.r2, n * j_damp);
    }
}
