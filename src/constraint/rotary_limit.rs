//! Relative angle limits.

use crate::{body::Body, constraint::Props};

use super::util::bias_coef;

/// Keeps the relative angle of two bodies between a minimum and a maximum.
#[derive(Debug)]
pub struct RotaryLimitJoint {
    min: f64,
    max: f64,

    i_sum: f64,
    bias: f64,
    j_acc: f64,
}

impl RotaryLimitJoint {
    pub(crate) fn new(min: f64, max: f64) -> Self {
        debug_assert!(min <= max, "Rotary limit minimum above its maximum");

        Self {
            min,
            max,
            i_sum: 0.0,
            bias: 0.0,
            j_acc: 0.0,
        }
    }

    /// Smallest allowed relative angle.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest allowed relative angle.
    pub fn max(&self) -> f64 {
        self.max
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        let dist = b.angle() - a.angle();
        let mut pdist = 0.0;
        if dist > self.max {
            pdist = self.max - dist;
        } else if dist < self.min {
            pdist = self.min - dist;
        }

        self.i_sum = 1.0 / (a.moment_inv() + b.moment_inv());

        self.bias = (-bias_coef(props.error_bias, dt) * pdist / dt)
            .clamp(-props.max_bias, props.max_bias);

        // Inside the limits nothing carries over.
        if self.bias == 0.0 {
            self.j_acc = 0.0;
        }
    }

    pub(crate) fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        let j = self.j_acc * dt_coef;
        a.set_angular_velocity(a.angular_velocity() - j * a.moment_inv());
        b.set_angular_velocity(b.angular_velocity() + j * b.moment_inv());
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        if self.bias == 0.0 {
            // Not at a limit.
            return;
        }

        let wr = b.angular_velocity() - a.angular_velocity();
        let j_max = props.j_max(dt);

        let j = -(self.bias + wr) * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = if self.bias < 0.0 {
            (j_old + j).clamp(0.0, j_max)
        } else {
            (j_old + j).clamp(-j_max, 0.0)
        };
        let j = self.j_acc - j_old;

        a.set_angular_velocity(a.angular_velocity() - j * a.moment_inv());
        b.set_angular_velocity(b.angular_velocity() + j * b.moment_inv());
    }
}
