//! Constant rate motor.

use crate::{body::Body, constraint::Props};

/// Drives the relative angular velocity toward a constant rate.
///
/// Combine with a low max force for friction-like behavior.
#[derive(Debug)]
pub struct SimpleMotor {
    rate: f64,

    i_sum: f64,
    j_acc: f64,
}

impl SimpleMotor {
    pub(crate) fn new(rate: f64) -> Self {
        Self {
            rate,
            i_sum: 0.0,
            j_acc: 0.0,
        }
    }

    /// Target relative angular velocity.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Change the target rate.
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body) {
        self.i_sum = 1.0 / (a.moment_inv() + b.moment_inv());
    }

    pub(crate) fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        let j = self.j_acc * dt_coef;
        a.set_angular_velocity(a.angular_velocity() - j * a.moment_inv());
        b.set_angular_velocity(b.angular_velocity() + j * b.moment_inv());
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        let wr = b.angular_velocity() - a.angular_velocity() + self.rate;

        let j_max = props.j_max(dt);
        let j = -wr * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = (j_old + j).clamp(-j_max, j_max);
        let j = self.j_acc - j_old;

        a.set_angular_velocity(a.angular_velocity() - j * a.moment_inv());
        b.set_angular_velocity(b.angular_velocity() + j * b.moment_inv());
    }
}
