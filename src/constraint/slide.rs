//! Distance range joint.

use vek::Vec2;

use crate::{body::Body, constraint::Props, math::normalized_or_zero};

use super::util::{anchor_r, apply_impulses, bias_coef, k_scalar, normal_relative_velocity};

/// Keeps the anchor distance between a minimum and a maximum, a pin joint
/// with play.
#[derive(Debug)]
pub struct SlideJoint {
    anchor_a: Vec2<f64>,
    anchor_b: Vec2<f64>,
    min: f64,
    max: f64,

    r1: Vec2<f64>,
    r2: Vec2<f64>,
    n: Vec2<f64>,
    n_mass: f64,

    jn_acc: f64,
    bias: f64,
}

impl SlideJoint {
    pub(crate) fn new(anchor_a: Vec2<f64>, anchor_b: Vec2<f64>, min: f64, max: f64) -> Self {
        debug_assert!(min <= max, "Slide joint minimum above its maximum");

        Self {
            anchor_a,
            anchor_b,
            min,
            max,
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

    /// Smallest allowed anchor distance.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest allowed anchor distance.
    pub fn max(&self) -> f64 {
        self.max
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.jn_acc.abs()
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        self.r1 = anchor_r(a, self.anchor_a);
        self.r2 = anchor_r(b, self.anchor_b);

        let delta = (b.world_cog() + self.r2) - (a.world_cog() + self.r1);
        let dist = delta.magnitude();

        let mut pdist = 0.0;
        if dist > self.max {
            pdist = dist - self.max;
            self.n = normalized_or_zero(delta);
        } else if dist < self.min {
            pdist = self.min - dist;
            self.n = -normalized_or_zero(delta);
        } else {
            // Inside the free range no impulse carries over.
            self.n = Vec2::zero();
            self.jn_acc = 0.0;
        }

        self.n_mass = 1.0 / k_scalar(a, b, self.r1, self.r2, self.n);

        self.bias =
            (-bias_coef(props.error_bias, dt) * pdist / dt).clamp(-props.max_bias, props.max_bias);
    }

    pub(crate) fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        apply_impulses(a, b, self.r1, self.r2, self.n * (self.jn_acc * dt_coef));
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        if self.n == Vec2::zero() {
            // Not at a limit.
            return;
        }

        let n = self.n;
        let vrn = normal_relative_velocity(a, b, self.r1, self.r2, n);

        let jn = (self.bias - vrn) * self.n_mass;
        let jn_old = self.jn_acc;
        self.jn_acc = (jn_old + jn).clamp(-props.j_max(dt), 0.0);

        apply_impulses(a, b, self.r1, self.r2, n * (self.jn_acc - jn_old));
    }
}
