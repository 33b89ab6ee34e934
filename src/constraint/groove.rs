//! Pivot sliding along a groove.

use vek::Vec2;

use crate::{
    body::Body,
    constraint::Props,
    math::{clamp_magnitude, cross, normalized_or_zero, perp, Mat2x2},
};

use super::util::{anchor_r, apply_impulses, bias_coef, k_tensor, relative_velocity};

/// Pins the second body's anchor onto a line segment of the first.
#[derive(Debug)]
pub struct GrooveJoint {
    /// Groove endpoints, local to the first body.
    groove_a: Vec2<f64>,
    groove_b: Vec2<f64>,
    /// Groove normal, local to the first body.
    groove_n: Vec2<f64>,
    anchor_b: Vec2<f64>,

    /// World space groove normal.
    groove_tn: Vec2<f64>,
    /// Which groove end the anchor is clamped against, zero in the middle.
    clamp: f64,
    r1: Vec2<f64>,
    r2: Vec2<f64>,
    k: Mat2x2,

    j_acc: Vec2<f64>,
    bias: Vec2<f64>,
}

impl GrooveJoint {
    pub(crate) fn new(groove_a: Vec2<f64>, groove_b: Vec2<f64>, anchor_b: Vec2<f64>) -> Self {
        Self {
            groove_a,
            groove_b,
            groove_n: perp(normalized_or_zero(groove_b - groove_a)),
            anchor_b,
            groove_tn: Vec2::zero(),
            clamp: 0.0,
            r1: Vec2::zero(),
            r2: Vec2::zero(),
            k: Mat2x2::new(0.0, 0.0, 0.0, 0.0),
            j_acc: Vec2::zero(),
            bias: Vec2::zero(),
        }
    }

    /// Groove start, local to the first body.
    pub fn groove_a(&self) -> Vec2<f64> {
        self.groove_a
    }

    /// Groove end, local to the first body.
    pub fn groove_b(&self) -> Vec2<f64> {
        self.groove_b
    }

    /// Anchor on the second body.
    pub fn anchor_b(&self) -> Vec2<f64> {
        self.anchor_b
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.j_acc.magnitude()
    }

    /// Project an impulse onto what the groove allows.
    fn constrain(&self, j: Vec2<f64>, j_max: f64) -> Vec2<f64> {
        let n = self.groove_tn;

        // Pushing off a groove end is fine, pulling into it is not.
        let j_clamped = if self.clamp * cross(j, n) > 0.0 {
            j
        } else {
            n * j.dot(n)
        };

        clamp_magnitude(j_clamped, j_max)
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        let ta = a.local_to_world(self.groove_a);
        let tb = a.local_to_world(self.groove_b);

        let n = a.rotation().rotate(self.groove_n);
        let d = ta.dot(n);

        self.groove_tn = n;
        self.r2 = anchor_r(b, self.anchor_b);

        // Clamp the pivot to the groove ends.
        let td = cross(b.world_cog() + self.r2, n);
        let cog_a = a.world_cog();
        if td <= cross(ta, n) {
            self.clamp = 1.0;
            self.r1 = ta - cog_a;
        } else if td >= cross(tb, n) {
            self.clamp = -1.0;
            self.r1 = tb - cog_a;
        } else {
            self.clamp = 0.0;
            self.r1 = perp(n) * -td + n * d - cog_a;
        }

        self.k = k_tensor(a, b, self.r1, self.r2);

        let delta = (b.world_cog() + self.r2) - (cog_a + self.r1);
        self.bias = clamp_magnitude(
            delta * (-bias_coef(props.error_bias, dt) / dt),
            props.max_bias,
        );
    }

    pub(crate) fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        apply_impulses(a, b, self.r1, self.r2, self.j_acc * dt_coef);
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        let vr = relative_velocity(a, b, self.r1, self.r2);

        let j = self.k.transform(self.bias - vr);
        let j_old = self.j_acc;
        self.j_acc = self.constrain(j_old + j, props.j_max(dt));

        apply_impulses(a, b, self.r1, self.r2, self.j_acc - j_old);
    }
}
