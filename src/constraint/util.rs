//! Shared math for the impulse solver.

use vek::Vec2;

use crate::{
    body::Body,
    math::{cross, perp, Mat2x2},
};

/// Velocity of `b`'s contact point relative to `a`'s.
#[inline]
pub(crate) fn relative_velocity(a: &Body, b: &Body, r1: Vec2<f64>, r2: Vec2<f64>) -> Vec2<f64> {
    let v1 = a.velocity() + perp(r1) * a.angular_velocity();
    let v2 = b.velocity() + perp(r2) * b.angular_velocity();

    v2 - v1
}

/// Relative velocity projected on an axis.
#[inline]
pub(crate) fn normal_relative_velocity(
    a: &Body,
    b: &Body,
    r1: Vec2<f64>,
    r2: Vec2<f64>,
    n: Vec2<f64>,
) -> f64 {
    relative_velocity(a, b, r1, r2).dot(n)
}

/// Apply an impulse and its reaction to a pair of bodies.
#[inline]
pub(crate) fn apply_impulses(a: &mut Body, b: &mut Body, r1: Vec2<f64>, r2: Vec2<f64>, j: Vec2<f64>) {
    a.apply_impulse(-j, r1);
    b.apply_impulse(j, r2);
}

/// Like [`apply_impulses`] but only touching the position correction
/// velocities.
#[inline]
pub(crate) fn apply_bias_impulses(
    a: &mut Body,
    b: &mut Body,
    r1: Vec2<f64>,
    r2: Vec2<f64>,
    j: Vec2<f64>,
) {
    a.apply_bias_impulse(-j, r1);
    b.apply_bias_impulse(j, r2);
}

/// Effective inverse mass of one body seen along an axis at an offset.
#[inline]
fn k_scalar_body(body: &Body, r: Vec2<f64>, n: Vec2<f64>) -> f64 {
    let rcn = cross(r, n);
    body.mass_inv() + body.moment_inv() * rcn * rcn
}

/// Effective inverse mass of a body pair along an axis.
#[inline]
pub(crate) fn k_scalar(a: &Body, b: &Body, r1: Vec2<f64>, r2: Vec2<f64>, n: Vec2<f64>) -> f64 {
    let value = k_scalar_body(a, r1, n) + k_scalar_body(b, r2, n);
    if value == 0.0 {
        log::warn!("Unsolvable collision or constraint between two infinite mass bodies");
        return f64::INFINITY;
    }

    value
}

/// Inverted effective mass tensor of a body pair.
pub(crate) fn k_tensor(a: &Body, b: &Body, r1: Vec2<f64>, r2: Vec2<f64>) -> Mat2x2 {
    let m_sum = a.mass_inv() + b.mass_inv();

    let mut k11 = m_sum;
    let mut k12 = 0.0;
    let mut k21 = 0.0;
    let mut k22 = m_sum;

    let a_i_inv = a.moment_inv();
    k11 += r1.y * r1.y * a_i_inv;
    k12 += -r1.x * r1.y * a_i_inv;
    k21 += -r1.x * r1.y * a_i_inv;
    k22 += r1.x * r1.x * a_i_inv;

    let b_i_inv = b.moment_inv();
    k11 += r2.y * r2.y * b_i_inv;
    k12 += -r2.x * r2.y * b_i_inv;
    k21 += -r2.x * r2.y * b_i_inv;
    k22 += r2.x * r2.x * b_i_inv;

    let det = k11 * k22 - k12 * k21;
    if det == 0.0 {
        log::warn!("Unsolvable constraint between two infinite mass bodies");
        return Mat2x2::new(0.0, 0.0, 0.0, 0.0);
    }

    let det_inv = 1.0 / det;
    Mat2x2::new(
        k22 * det_inv,
        -k12 * det_inv,
        -k21 * det_inv,
        k11 * det_inv,
    )
}

/// Position error decay into a bias velocity factor.
#[inline]
pub(crate) fn bias_coef(error_bias: f64, dt: f64) -> f64 {
    1.0 - error_bias.powf(dt)
}

/// Anchor offset from a body's center of gravity, rotated to world space.
#[inline]
pub(crate) fn anchor_r(body: &Body, anchor: Vec2<f64>) -> Vec2<f64> {
    body.rotation().rotate(anchor - body.center_of_gravity())
}
