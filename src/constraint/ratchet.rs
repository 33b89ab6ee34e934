//! Socket wrench joint.

use crate::{body::Body, constraint::Props};

use super::util::bias_coef;

/// Lets the relative angle click freely in one direction and locks it in
/// the other, in steps of the ratchet angle.
#[derive(Debug)]
pub struct RatchetJoint {
    /// Angle of the last engaged tooth.
    angle: f64,
    /// Offset of the teeth.
    phase: f64,
    /// Tooth spacing, the sign picks the free direction.
    ratchet: f64,

    i_sum: f64,
    bias: f64,
    j_acc: f64,
}

impl RatchetJoint {
    pub(crate) fn new(body_a: &Body, body_b: &Body, phase: f64, ratchet: f64) -> Self {
        debug_assert!(ratchet != 0.0, "A ratchet needs a non-zero tooth angle");

        Self {
            angle: body_b.angle() - body_a.angle(),
            phase,
            ratchet,
            i_sum: 0.0,
            bias: 0.0,
            j_acc: 0.0,
        }
    }

    /// Current engaged tooth angle.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Tooth phase offset.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Tooth spacing.
    pub fn ratchet(&self) -> f64 {
        self.ratchet
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64, props: Props) {
        let delta = b.angle() - a.angle();
        let diff = self.angle - delta;

        let mut pdist = 0.0;
        if diff * self.ratchet > 0.0 {
            // Pushed into the locked direction.
            pdist = diff;
        } else {
            // Clicked over to the next tooth.
            self.angle = ((delta - self.phase) / self.ratchet).floor() * self.ratchet + self.phase;
        }

        self.i_sum = 1.0 / (a.moment_inv() + b.moment_inv());

        self.bias = (-bias_coef(props.error_bias, dt) * pdist / dt)
            .clamp(-props.max_bias, props.max_bias);

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
            // The ratchet is clicking along freely.
            return;
        }

        let wr = b.angular_velocity() - a.angular_velocity();
        let ratchet = self.ratchet;
        let j_max = props.j_max(dt);

        let j = -(self.bias + wr) * self.i_sum;
        let j_old = self.j_acc;
        self.j_acc = ((j_old + j) * ratchet).clamp(0.0, j_max * ratchet.abs()) / ratchet;
        let j = self.j_acc - j_old;

        a.set_angular_velocity(a.angular_velocity() - j * a.moment_inv());
        b.set_angular_velocity(b.angular_velocity() + j * b.moment_inv());
    }
}
