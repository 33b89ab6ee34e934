//! Fixed distance joint.

use vek::Vec2;

use crate::{body::Body, constraint::Props};

use super::util::{anchor_r, apply_impulses, bias_coef, k_scalar, normal_relative_velocity};

/// Keeps two anchor points an exact distance apart, like a massless rod.
#[derive(Debug)]
pub struct PinJoint {
    anchor_a: Vec2<f64>,
    anchor_b: Vec2<f64>,
    /// Rest distance between the anchors.
    dist: f64,

    r1: Vec2<f64>,
    r2: Vec2<f64>,
    n: Vec2<f64>,
    n_mass: f64,

    jn_acc: f64,
    bias: f64,
}

impl PinJoint {
    /// The rod length is whatever the anchor distance is right now.
    pub(crate) fn new(body_a: &Body, body_b: &Body, anchor_a: Vec2<f64>, anchor_b: Vec2<f64>) -> Self {
        let p1 = body_a.local_to_world(anchor_a);
        let p2 = body_b.local_to_world(anchor_b);
        let dist = p2.distance(p1);

        if dist <= 0.0 {
            log::warn!("A pin joint with zero length is unstable, consider a pivot joint");
        }

        Self {
            anchor_a,
            anchor_b,
            dist,
            r1: Vec2::zero(),
            r2: Vec2::zero(),
            n: Vec2::zero(),
            n_mass: 0.0,
            jn_acc: 0.0,
            bias: 0.0,
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

    /// Distance the joint maintains.
    pub fn dist(&self) -> f64 {
        self.dist
    }

    /// Change the maintained distance.
    pub fn set_dist(&mut self, dist: f64) {
        self.dist = dist;
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.jn_acc.abs()
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        self.r1 = anchor_r(a, self.anchor_a);
        self.r2 = anchor_r(b, self.anchor_b);

        let delta = (b.world_cog() + self.r2) - (a.world_cog() + self.r1);
        let dist = delta.magnitude();
        self.n = delta * (1.0 / if dist != 0.0 { dist } else { f64::INFINITY });

        self.n_mass = 1.0 / k_scalar(a, b, self.r1, self.r2, self.n);

        self.bias = (-bias_coef(props.error_bias, dt) * (dist - self.dist) / dt)
            .clamp(-props.max_bias, props.max_bias);
    }

    pub(crate) fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        apply_impulses(a, b, self.r1, self.r2, self.n * (self.jn_acc * dt_coef));
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        let n = self.n;
        let vrn = normal_relative_velocity(a, b, self.r1, self.r2, n);

        let jn_max = props.j_max(dt);
        let jn = (self.bias - vrn) * self.n_mass;
        let jn_old = self.jn_acc;
        self.jn_acc = (jn_old + jn).clamp(-jn_max, jn_max);

        apply_impulses(a, b, self.r1, self.r2, n * (self.jn_acc - jn_old));
    }
}
