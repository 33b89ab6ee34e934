//! Angular gearing.

use crate::{body::Body, constraint::Props};

use super::util::bias_coef;

/// Keeps the angular velocities of two bodies locked at a ratio.
#[derive(Debug)]
pub struct GearJoint {
    phase: f64,
    ratio: f64,
    ratio_inv: f64,

    i_sum: f64,
    bias: f64,
    j_acc: f64,
}

impl GearJoint {
    pub(crate) fn new(phase: f64, ratio: f64) -> Self {
        debug_assert!(ratio != 0.0, "A gear needs a non-zero ratio");

        Self {
            phase,
            ratio,
            ratio_inv: 1.0 / ratio,
            i_sum: 0.0,
            bias: 0.0,
            j_acc: 0.0,
        }
    }

    /// Angular offset between the geared bodies.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Gear ratio.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Change the gear ratio.
    pub fn set_ratio(&mut self, ratio: f64) {
        debug_assert!(ratio != 0.0, "A gear needs a non-zero ratio");

        self.ratio = ratio;
        self.ratio_inv = 1.0 / ratio;
        self.j_acc = 0.0;
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        self.i_sum = 1.0 / (a.moment_inv() * self.ratio_inv + self.ratio * b.moment_inv());

        self.bias = (-bias_coef(props.error_bias, dt)
            * (b.angle() * self.ratio - a.angle() - self.phase)
            / dt)
            .clamp(-props.max_bias, props.max_bias);
    }

    pub(crate) fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        let j = self.j_acc * dt_coef;
        a.set_angular_velocity(a.angular_velocity() - j * a.moment_inv() * self.ratio_inv);
        b.set_angular_velocity(b.angular_velocity() + j * b.moment_inv());
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        let wr = self.ratio * b.angular_velocity() - a.angular_velocity();

        let j = (self.bias - wr) * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = (j_old + j).clamp(-props.j_max(dt), props.j_max(dt));
        let j = self.j_acc - j_old;

        a.set_angular_velocity(a.angular_velocity() - j * a.moment_inv() * self.ratio_inv);
        b.set_angular_velocity(b.angular_velocity() + j * b.moment_inv());
    }
}
