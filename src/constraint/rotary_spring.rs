//! Damped torsion spring.

use crate::body::Body;

/// Custom torque as a function of the spring and the relative angle.
pub type SpringTorqueFn = fn(&DampedRotarySpring, f64) -> f64;

/// Like a damped spring, working on the relative angle of the two bodies.
#[derive(Debug)]
pub struct DampedRotarySpring {
    rest_angle: f64,
    stiffness: f64,
    damping: f64,
    torque_fn: Option<SpringTorqueFn>,

    target_wrn: f64,
    w_coef: f64,
    i_sum: f64,

    j_acc: f64,
}

impl DampedRotarySpring {
    pub(crate) fn new(rest_angle: f64, stiffness: f64, damping: f64) -> Self {
        Self {
            rest_angle,
            stiffness,
            damping,
            torque_fn: None,
            target_wrn: 0.0,
            w_coef: 0.0,
            i_sum: 0.0,
            j_acc: 0.0,
        }
    }

    /// Relative angle the spring rotates toward.
    pub fn rest_angle(&self) -> f64 {
        self.rest_angle
    }

    /// Set the rest angle.
    pub fn set_rest_angle(&mut self, rest_angle: f64) {
        self.rest_angle = rest_angle;
    }

    /// Spring constant.
    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    /// Set the spring constant.
    pub fn set_stiffness(&mut self, stiffness: f64) {
        self.stiffness = stiffness;
    }

    /// Angular velocity damping factor.
    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Set the angular damping.
    pub fn set_damping(&mut self, damping: f64) {
        self.damping = damping;
    }

    /// Replace the linear torque curve.
    pub fn set_torque_fn(&mut self, f: Option<SpringTorqueFn>) {
        self.torque_fn = f;
    }

    fn spring_torque(&self, relative_angle: f64) -> f64 {
        match self.torque_fn {
            Some(f) => f(self, relative_angle),
            None => (relative_angle - self.rest_angle) * self.stiffness,
        }
    }

    pub(crate) fn impulse(&self) -> f64 {
        self.j_acc.abs()
    }

    pub(crate) fn pre_step(&mut self, a: &mut Body, b: &mut Body, dt: f64) {
        let moment = a.moment_inv() + b.moment_inv();
        if moment == 0.0 {
            log::warn!("Rotary spring between two bodies with infinite moment");
        }
        self.i_sum = 1.0 / moment;

        self.w_coef = 1.0 - (-self.damping * dt * moment).exp();
        self.target_wrn = 0.0;

        // The spring torque is applied as one impulse up front.
        let j_spring = self.spring_torque(a.angle() - b.angle()) * dt;
        self.j_acc = j_spring;

        a.set_angular_velocity(a.angular_velocity() - j_spring * a.moment_inv());
        b.set_angular_velocity(b.angular_velocity() + j_spring * b.moment_inv());
    }

    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        // Drain the relative angular velocity the damping removes.
        let wrn = a.angular_velocity() - b.angular_velocity();
        let w_damp = (self.target_wrn - wrn) * self.w_coef;
        self.target_wrn = wrn + w_damp;

        let j_damp = w_damp * self.i_sum;
        self.j_acc += j_damp;

        a.set_angular_velocity(a.angular_velocity() + j_damp * a.moment_inv());
        b.set_angular_velocity(b.angular_velocity() - j_damp * b.moment_inv());
    }
}
