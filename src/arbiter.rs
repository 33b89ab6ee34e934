//! Persistent collision pairs.
//!
//! An arbiter tracks one colliding shape pair across steps, carrying the
//! accumulated impulses that make the sequential impulse solver converge in
//! a couple of iterations.

use arrayvec::ArrayVec;
use slotmap::Key;
use vek::Vec2;

use crate::{
    body::{Body, BodyKey},
    collision::{CollisionInfo, MAX_CONTACTS},
    constraint::util::{apply_bias_impulses, apply_impulses, k_scalar, normal_relative_velocity, relative_velocity},
    math::{perp, Rotation},
    shape::{Shape, ShapeKey},
    UserData,
};

/// Unordered shape pair, the hash key of an arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(ShapeKey, ShapeKey);

impl PairKey {
    /// Build the key for a pair in either order.
    pub fn new(a: ShapeKey, b: ShapeKey) -> Self {
        if a.data().as_ffi() <= b.data().as_ffi() {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Whether the pair contains the shape.
    pub fn contains(&self, shape: ShapeKey) -> bool {
        self.0 == shape || self.1 == shape
    }

    /// Stable sort key, keeps iteration over pair sets reproducible.
    pub(crate) fn order_key(&self) -> (u64, u64) {
        (self.0.data().as_ffi(), self.1.data().as_ffi())
    }
}

/// Lifecycle of an arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    /// Colliding and it wasn't the step before.
    FirstCollision,
    /// Colliding, begin has been accepted.
    Normal,
    /// A begin handler rejected the pair, stays rejected until separation.
    Ignore,
    /// No longer colliding, kept around to preserve the warm start data.
    Cached,
    /// One of the shapes was removed.
    Invalidated,
}

/// Solver state of a single contact point.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Contact {
    /// Contact position on the first shape's surface, world space.
    pub p1: Vec2<f64>,
    /// Contact position on the second shape's surface, world space.
    pub p2: Vec2<f64>,
    /// Offsets from the bodies' centers of gravity, filled in by pre_step.
    pub r1: Vec2<f64>,
    pub r2: Vec2<f64>,
    /// Effective masses along the normal and tangent.
    pub n_mass: f64,
    pub t_mass: f64,
    /// Target restitution velocity.
    pub bounce: f64,
    /// Penetration correction velocity.
    pub bias: f64,
    /// Accumulated impulses: normal, tangent and bias.
    pub jn_acc: f64,
    pub jt_acc: f64,
    pub j_bias: f64,
    /// Feature id used to match this contact across steps.
    pub hash: u64,
}

/// A persistent collision pair between two shapes.
#[derive(Debug)]
pub struct Arbiter {
    /// Blended restitution of the two shapes.
    pub(crate) e: f64,
    /// Blended friction of the two shapes.
    pub(crate) u: f64,
    /// Relative surface velocity, tangential part only.
    pub(crate) surface_vr: Vec2<f64>,
    pub(crate) shape_a: ShapeKey,
    pub(crate) shape_b: ShapeKey,
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: BodyKey,
    pub(crate) contacts: ArrayVec<Contact, MAX_CONTACTS>,
    /// Collision normal from the first shape to the second.
    pub(crate) n: Vec2<f64>,
    pub(crate) state: ArbiterState,
    /// Step stamp of the last narrow phase hit.
    pub(crate) stamp: u64,
    pub user_data: UserData,
}

impl Arbiter {
    /// A fresh arbiter for a newly colliding pair.
    pub(crate) fn new(shape_a: ShapeKey, shape_b: ShapeKey, body_a: BodyKey, body_b: BodyKey) -> Self {
        Self {
            e: 0.0,
            u: 0.0,
            surface_vr: Vec2::zero(),
            shape_a,
            shape_b,
            body_a,
            body_b,
            contacts: ArrayVec::new(),
            n: Vec2::zero(),
            state: ArbiterState::FirstCollision,
            stamp: 0,
            user_data: None,
        }
    }

    /// The two shapes, in collision dispatch order.
    pub fn shapes(&self) -> (ShapeKey, ShapeKey) {
        (self.shape_a, self.shape_b)
    }

    /// The two bodies, matching [`Self::shapes`] order.
    pub fn bodies(&self) -> (BodyKey, BodyKey) {
        (self.body_a, self.body_b)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ArbiterState {
        self.state
    }

    /// Whether this is the first step the pair collides on.
    pub fn is_first_contact(&self) -> bool {
        self.state == ArbiterState::FirstCollision
    }

    /// Blended restitution used by the solver.
    pub fn elasticity(&self) -> f64 {
        self.e
    }

    /// Override the restitution for this collision.
    pub fn set_elasticity(&mut self, e: f64) {
        self.e = e;
    }

    /// Blended friction used by the solver.
    pub fn friction(&self) -> f64 {
        self.u
    }

    /// Override the friction for this collision.
    pub fn set_friction(&mut self, u: f64) {
        self.u = u;
    }

    /// Relative surface velocity along the contact tangent.
    pub fn surface_velocity(&self) -> Vec2<f64> {
        self.surface_vr
    }

    /// Override the surface velocity for this collision.
    pub fn set_surface_velocity(&mut self, v: Vec2<f64>) {
        self.surface_vr = v;
    }

    /// Number of contact points, at most two.
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Collision normal pointing from the first shape to the second.
    pub fn normal(&self) -> Vec2<f64> {
        self.n
    }

    /// Contact position on the first shape.
    pub fn point_a(&self, contact: usize) -> Vec2<f64> {
        self.contacts[contact].p1
    }

    /// Contact position on the second shape.
    pub fn point_b(&self, contact: usize) -> Vec2<f64> {
        self.contacts[contact].p2
    }

    /// Penetration depth of a contact, negative when overlapping.
    pub fn depth(&self, contact: usize) -> f64 {
        let con = &self.contacts[contact];
        (con.p2 - con.p1).dot(self.n)
    }

    /// Reject this collision until the shapes separate.
    pub fn ignore(&mut self) {
        self.state = ArbiterState::Ignore;
    }

    /// Impulse the solver applied over the last step, including friction.
    pub fn total_impulse(&self) -> Vec2<f64> {
        let rot = Rotation::from_direction(self.n);

        self.contacts
            .iter()
            .fold(Vec2::zero(), |sum, con| {
                sum + rot.rotate(Vec2::new(con.jn_acc, con.jt_acc))
            })
    }

    /// Estimate of the kinetic energy the collision dissipated.
    pub fn total_ke(&self) -> f64 {
        let e_coef = (1.0 - self.e) / (1.0 + self.e);

        self.contacts.iter().fold(0.0, |sum, con| {
            sum + e_coef * con.jn_acc * con.jn_acc / con.n_mass
                + con.jt_acc * con.jt_acc / con.t_mass
        })
    }

    /// Replace the contact set with a fresh narrow phase result, inheriting
    /// accumulated impulses from matching contacts of the previous step.
    pub(crate) fn update(&mut self, info: &CollisionInfo, a: &Shape, b: &Shape) {
        let mut contacts = ArrayVec::new();

        for point in &info.contacts {
            let mut contact = Contact {
                p1: point.p1,
                p2: point.p2,
                r1: Vec2::zero(),
                r2: Vec2::zero(),
                n_mass: 0.0,
                t_mass: 0.0,
                bounce: 0.0,
                bias: 0.0,
                jn_acc: 0.0,
                jt_acc: 0.0,
                j_bias: 0.0,
                hash: point.hash,
            };

            for old in &self.contacts {
                if old.hash == contact.hash {
                    contact.jn_acc = old.jn_acc;
                    contact.jt_acc = old.jt_acc;
                }
            }

            contacts.push(contact);
        }

        self.contacts = contacts;
        self.n = info.n;

        self.e = a.e * b.e;
        self.u = (a.u * b.u).sqrt();

        let surface_vr = b.surface_velocity - a.surface_velocity;
        self.surface_vr = surface_vr - info.n * surface_vr.dot(info.n);

        // A pair resurfacing from the cache behaves like a new collision.
        if self.state == ArbiterState::Cached {
            self.state = ArbiterState::FirstCollision;
        }
    }

    /// Compute the per step solver constants.
    pub(crate) fn pre_step(&mut self, a: &Body, b: &Body, dt: f64, slop: f64, bias: f64) {
        let n = self.n;
        let cog_a = a.world_cog();
        let cog_b = b.world_cog();

        for con in &mut self.contacts {
            con.r1 = con.p1 - cog_a;
            con.r2 = con.p2 - cog_b;

            con.n_mass = 1.0 / k_scalar(a, b, con.r1, con.r2, n);
            con.t_mass = 1.0 / k_scalar(a, b, con.r1, con.r2, perp(n));

            // Penetration beyond the slop is pushed out by the bias
            // velocity, never by real momentum.
            let dist = (con.p2 - con.p1).dot(n);
            con.bias = -bias * (dist + slop).min(0.0) / dt;
            con.j_bias = 0.0;

            con.bounce = normal_relative_velocity(a, b, con.r1, con.r2, n) * self.e;
        }
    }

    /// Reapply last step's impulses scaled by the timestep ratio.
    pub(crate) fn apply_cached_impulse(&mut self, a: &mut Body, b: &mut Body, dt_coef: f64) {
        let rot = Rotation::from_direction(self.n);

        for con in &self.contacts {
            let j = rot.rotate(Vec2::new(con.jn_acc, con.jt_acc));
            apply_impulses(a, b, con.r1, con.r2, j * dt_coef);
        }
    }

    /// One solver iteration over every contact.
    pub(crate) fn apply_impulse(&mut self, a: &mut Body, b: &mut Body) {
        let n = self.n;
        let surface_vr = self.surface_vr;
        let friction = self.u;
        let rot = Rotation::from_direction(n);

        for con in &mut self.contacts {
            let r1 = con.r1;
            let r2 = con.r2;

            // Bias impulses only touch the pseudo velocities.
            let vb1 = a.v_bias + perp(r1) * a.w_bias;
            let vb2 = b.v_bias + perp(r2) * b.w_bias;
            let vbn = (vb2 - vb1).dot(n);

            let jbn = (con.bias - vbn) * con.n_mass;
            let jbn_old = con.j_bias;
            con.j_bias = (jbn_old + jbn).max(0.0);
            apply_bias_impulses(a, b, r1, r2, n * (con.j_bias - jbn_old));

            let vr = relative_velocity(a, b, r1, r2) + surface_vr;
            let vrn = vr.dot(n);
            let vrt = vr.dot(perp(n));

            // Contacts only ever push.
            let jn = -(con.bounce + vrn) * con.n_mass;
            let jn_old = con.jn_acc;
            con.jn_acc = (jn_old + jn).max(0.0);

            // Coulomb friction cone around the accumulated normal impulse.
            let jt_max = friction * con.jn_acc;
            let jt = -vrt * con.t_mass;
            let jt_old = con.jt_acc;
            con.jt_acc = (jt_old + jt).clamp(-jt_max, jt_max);

            apply_impulses(
                a,
                b,
                r1,
                r2,
                rot.rotate(Vec2::new(con.jn_acc - jn_old, con.jt_acc - jt_old)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    use crate::{
        collision::collide,
        math::Iso,
        shape::Shape,
    };

    use super::*;

    fn pair() -> (SlotMap<BodyKey, Body>, BodyKey, BodyKey, Shape, Shape, Arbiter) {
        let mut bodies: SlotMap<BodyKey, Body> = SlotMap::with_key();
        let key_a = bodies.insert(Body::new(1.0, 1.0));
        let key_b = bodies.insert(Body::new_static());

        let mut shapes: SlotMap<ShapeKey, ()> = SlotMap::with_key();
        let shape_a = shapes.insert(());
        let shape_b = shapes.insert(());

        // A circle resting on a static floor box, slightly overlapping.
        let mut circle = Shape::circle(key_a, 10.0, Vec2::zero());
        circle.hashid = 1;
        circle.cache_bb(Iso::from_pos(Vec2::new(0.0, 9.9)));

        let mut floor = Shape::box_shape(key_b, 100.0, 20.0, 0.0);
        floor.hashid = 2;
        floor.cache_bb(Iso::from_pos(Vec2::new(0.0, -10.0)));

        let arbiter = Arbiter::new(shape_a, shape_b, key_a, key_b);

        (bodies, key_a, key_b, circle, floor, arbiter)
    }

    #[test]
    fn pair_key_is_order_independent() {
        let mut shapes: SlotMap<ShapeKey, ()> = SlotMap::with_key();
        let a = shapes.insert(());
        let b = shapes.insert(());

        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert!(PairKey::new(a, b).contains(a));
        assert!(PairKey::new(a, b).contains(b));
    }

    #[test]
    fn update_blends_surface_properties() {
        let (_bodies, _key_a, _key_b, mut circle, mut floor, mut arbiter) = pair();
        circle.set_elasticity(0.5);
        floor.set_elasticity(0.5);
        circle.set_friction(0.9);
        floor.set_friction(0.4);

        let info = collide(&circle, &floor);
        arbiter.update(&info, &circle, &floor);

        assert_relative_eq!(arbiter.elasticity(), 0.25);
        assert_relative_eq!(arbiter.friction(), (0.9f64 * 0.4).sqrt());
        assert_eq!(arbiter.contact_count(), 1);
    }

    #[test]
    fn warm_start_inherits_matched_impulses() {
        let (_bodies, _key_a, _key_b, circle, floor, mut arbiter) = pair();

        let info = collide(&circle, &floor);
        arbiter.update(&info, &circle, &floor);

        arbiter.contacts[0].jn_acc = 3.0;
        arbiter.contacts[0].jt_acc = -1.0;

        // The same contact shows up next step with the same hash.
        arbiter.update(&info, &circle, &floor);
        assert_relative_eq!(arbiter.contacts[0].jn_acc, 3.0);
        assert_relative_eq!(arbiter.contacts[0].jt_acc, -1.0);

        // An unmatched contact starts cold.
        let mut changed = info.clone();
        changed.contacts[0].hash = 12345;
        arbiter.update(&changed, &circle, &floor);
        assert_relative_eq!(arbiter.contacts[0].jn_acc, 0.0);
    }

    #[test]
    fn solver_pushes_bodies_apart() {
        let (mut bodies, key_a, key_b, circle, floor, mut arbiter) = pair();

        bodies[key_a].set_velocity(Vec2::new(0.0, -5.0));

        let info = collide(&circle, &floor);
        arbiter.update(&info, &circle, &floor);

        let dt = 1.0 / 60.0;
        let [a, b] = bodies.get_disjoint_mut([key_a, key_b]).unwrap();
        arbiter.pre_step(a, b, dt, 0.1, 0.2);

        for _ in 0..10 {
            arbiter.apply_impulse(a, b);
        }

        // The falling circle has stopped and the impulse never pulls.
        assert!(a.velocity().y >= -1e-9);
        for con in &arbiter.contacts {
            assert!(con.jn_acc >= 0.0);
            assert!(con.jt_acc.abs() <= arbiter.u * con.jn_acc + 1e-9);
        }

        // The static floor hasn't moved.
        assert_eq!(b.velocity(), Vec2::zero());
    }
}
