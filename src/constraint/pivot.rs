//! Ball and socket joint.

use vek::Vec2;

use crate::{
    body::Body,
    constraint::Props,
    math::{clamp_magnitude, Mat2x2},
};

use super::util::{anchor_r, apply_impulses, bias_coef, k_tensor, relative_velocity};

/// Holds two local anchors at the same world position while the bodies spin
/// freely around it.
#[derive(Debug)]
pub struct PivotJoint {
    anchor_a: Vec2<f64>,
    anchor_b: Vec2<f64>,

    r1: Vec2<f64>,
    r2: Vec2<f64>,
    k: Mat2x2,

    j_acc: Vec2<f64>,
    bias: Vec2<f64>,
}

impl PivotJoint {
    pub(crate) fn new(anchor_a: Vec2<f64>, anchor_b: Vec2<f64>) -> Self {
        Self {
            anchor_a,
            anchor_b,
            r1: Vec2::zero(),
            r2: Vec2::zero(),
            k: Mat2x2::new(0.0, 0.0, 0.0, 0.0),
            j_acc: Vec2::zero(),
            bias: Vec2::zero(),
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

    pub(crate) fn impulse(&self) -> f64 {
        self.j_acc.magnitude()
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        self.r1 = anchor_r(a, self.anchor_a);
        self.r2 = anchor_r(b, self.anchor_b);

        self.k = k_tensor(a, b, self.r1, self.r2);

        let delta = (b.world_cog() + self.r2) - (a.world_cog() + self.r1);
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
        self.j_acc = clamp_magnitude(j_old + j, props.j_max(dt));

        apply_impulses(a, b, self.r1, self.r2, self.j_acc - j_old);
    }
}
