//! The simulation container.
//!
//! A space owns every body, shape, constraint and collision pair, plus the
//! two spatial indexes the broad phase runs on. All of it is addressed
//! through generational keys.

mod component;
mod debug_draw;
mod handler;
mod query;
mod step;

use hashbrown::HashMap;
use serde::Deserialize;
use slotmap::SlotMap;
use thiserror::Error;
use vek::Vec2;

use crate::{
    arbiter::{Arbiter, ArbiterState, PairKey},
    body::{Body, BodyKey, BodyKind},
    broad_phase::{bb_tree::BbTree, spatial_hash::SpatialHash, BoundsProvider, SpatialIndex},
    constraint::{Constraint, ConstraintKey},
    shape::{CollisionType, Shape, ShapeKey},
    UserData,
};

pub use self::{
    debug_draw::{DebugColor, DebugDraw, DebugDrawOptions},
    handler::{BeginFn, CallbackSpace, CollisionHandler, PreSolveFn, PostSolveFn, SeparateFn},
};

/// Topology can't change while the space is stepping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpaceError {
    /// The space is in the middle of a step; defer the operation with a
    /// post step callback instead.
    #[error("the space is locked during a step, defer the operation to a post step callback")]
    Locked,
}

/// Tuning knobs of a space, loadable from a settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpaceSettings {
    /// Solver iterations per step.
    pub iterations: u32,
    /// Gravity applied to every dynamic body.
    pub gravity: Vec2<f64>,
    /// Fraction of velocity a body keeps per second.
    pub damping: f64,
    /// Speed below which a body counts as idle; zero derives an estimate
    /// from gravity.
    pub idle_speed_threshold: f64,
    /// Idle seconds before a whole touching group falls asleep, infinite
    /// disables sleeping.
    pub sleep_time_threshold: f64,
    /// Penetration depth that is left uncorrected to keep contacts stable.
    pub collision_slop: f64,
    /// Fraction of penetration remaining after one second of correction.
    pub collision_bias: f64,
    /// Steps a collision pair survives without contact, preserving its
    /// warm start data.
    pub collision_persistence: u64,
}

impl Default for SpaceSettings {
    fn default() -> Self {
        Self {
            iterations: 10,
            gravity: Vec2::zero(),
            damping: 1.0,
            idle_speed_threshold: 0.0,
            sleep_time_threshold: f64::INFINITY,
            collision_slop: 0.1,
            collision_bias: (1.0f64 - 0.1).powf(60.0),
            collision_persistence: 3,
        }
    }
}

/// Deferred work drained after a step, at most once per key.
#[derive(Default)]
pub(crate) struct PostStepQueue {
    entries: Vec<(u64, Box<dyn FnOnce(&mut Space)>)>,
}

impl PostStepQueue {
    /// Queue a callback, dropping it when the key is already taken.
    pub fn push(&mut self, key: u64, f: impl FnOnce(&mut Space) + 'static) -> bool {
        if self.entries.iter().any(|(k, _)| *k == key) {
            return false;
        }

        self.entries.push((key, Box::new(f)));
        true
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fresh bounding boxes for the spatial indexes, straight from the arenas.
pub(crate) struct SpaceBounds<'a> {
    pub shapes: &'a SlotMap<ShapeKey, Shape>,
    pub bodies: &'a SlotMap<BodyKey, Body>,
}

impl BoundsProvider for SpaceBounds<'_> {
    fn bb(&self, key: ShapeKey) -> vek::Aabr<f64> {
        self.shapes[key].bb
    }

    fn velocity(&self, key: ShapeKey) -> Vec2<f64> {
        self.bodies[self.shapes[key].body].velocity()
    }
}

/// A 2D physics simulation.
pub struct Space {
    pub(crate) settings: SpaceSettings,

    /// Step counter.
    pub(crate) stamp: u64,
    /// Timestep of the step currently running, or the last one.
    pub(crate) curr_dt: f64,
    pub(crate) prev_dt: f64,

    pub(crate) bodies: SlotMap<BodyKey, Body>,
    /// Awake dynamic and kinematic bodies.
    pub(crate) dynamic_bodies: Vec<BodyKey>,
    pub(crate) static_bodies: Vec<BodyKey>,
    /// Bodies woken during a step, activated for real on unlock.
    pub(crate) roused_bodies: Vec<BodyKey>,
    /// Roots of the sleeping contact graph components.
    pub(crate) sleeping_components: Vec<BodyKey>,

    pub(crate) shapes: SlotMap<ShapeKey, Shape>,
    shape_id_counter: u64,

    pub(crate) constraints: SlotMap<ConstraintKey, Constraint>,
    /// Constraints in insertion order, the order the solver visits them in.
    pub(crate) constraint_list: Vec<ConstraintKey>,

    pub(crate) dynamic_index: Box<dyn SpatialIndex>,
    pub(crate) static_index: Box<dyn SpatialIndex>,

    /// Pairs the solver works on this step.
    pub(crate) arbiters: Vec<PairKey>,
    /// Every live collision pair, including recently separated ones kept
    /// for their warm start data.
    pub(crate) cached_arbiters: HashMap<PairKey, Arbiter>,

    pub(crate) handlers: handler::HandlerRegistry,

    /// Nonzero while stepping; mutation must be deferred.
    pub(crate) locked: u32,
    pub(crate) post_step: PostStepQueue,

    /// Broad phase scratch buffer, reused between steps.
    pub(crate) pair_buffer: Vec<(ShapeKey, ShapeKey)>,

    /// Built-in anchor for joints and shapes of the world itself.
    static_body: BodyKey,
    pub user_data: UserData,
}

impl Space {
    /// An empty space with default settings.
    pub fn new() -> Self {
        Self::with_settings(SpaceSettings::default())
    }

    /// An empty space with the given settings.
    pub fn with_settings(settings: SpaceSettings) -> Self {
        let mut bodies = SlotMap::with_key();
        let static_body = bodies.insert(Body::new_static());

        Self {
            settings,
            stamp: 0,
            curr_dt: 0.0,
            prev_dt: 0.0,
            bodies,
            dynamic_bodies: Vec::new(),
            static_bodies: Vec::new(),
            roused_bodies: Vec::new(),
            sleeping_components: Vec::new(),
            shapes: SlotMap::with_key(),
            shape_id_counter: 0,
            constraints: SlotMap::with_key(),
            constraint_list: Vec::new(),
            dynamic_index: Box::new(BbTree::new(true)),
            static_index: Box::new(BbTree::new(false)),
            arbiters: Vec::new(),
            cached_arbiters: HashMap::new(),
            handlers: handler::HandlerRegistry::default(),
            locked: 0,
            post_step: PostStepQueue::default(),
            pair_buffer: Vec::new(),
            static_body,
            user_data: None,
        }
    }

    /// Solver iterations per step.
    pub fn iterations(&self) -> u32 {
        self.settings.iterations
    }

    /// Set the solver iteration count, more is stiffer but slower.
    pub fn set_iterations(&mut self, iterations: u32) {
        debug_assert!(iterations > 0, "The solver needs at least one iteration");
        self.settings.iterations = iterations;
    }

    /// Gravity applied to dynamic bodies.
    pub fn gravity(&self) -> Vec2<f64> {
        self.settings.gravity
    }

    /// Set the gravity and wake everything so it takes hold immediately.
    pub fn set_gravity(&mut self, gravity: Vec2<f64>) {
        self.settings.gravity = gravity;

        for root in self.sleeping_components.clone() {
            self.activate_body(root);
        }
    }

    /// Fraction of velocity bodies keep per second.
    pub fn damping(&self) -> f64 {
        self.settings.damping
    }

    /// Set the global velocity damping.
    pub fn set_damping(&mut self, damping: f64) {
        self.settings.damping = damping;
    }

    /// Speed below which bodies accumulate idle time.
    pub fn idle_speed_threshold(&self) -> f64 {
        self.settings.idle_speed_threshold
    }

    /// Set the idle speed threshold.
    pub fn set_idle_speed_threshold(&mut self, threshold: f64) {
        self.settings.idle_speed_threshold = threshold;
    }

    /// Idle seconds before a component falls asleep.
    pub fn sleep_time_threshold(&self) -> f64 {
        self.settings.sleep_time_threshold
    }

    /// Set the sleep threshold, infinity disables sleeping.
    pub fn set_sleep_time_threshold(&mut self, threshold: f64) {
        self.settings.sleep_time_threshold = threshold;
    }

    /// Allowed penetration before position correction kicks in.
    pub fn collision_slop(&self) -> f64 {
        self.settings.collision_slop
    }

    /// Set the collision slop.
    pub fn set_collision_slop(&mut self, slop: f64) {
        self.settings.collision_slop = slop;
    }

    /// Fraction of penetration left after a second of correction.
    pub fn collision_bias(&self) -> f64 {
        self.settings.collision_bias
    }

    /// Set the penetration correction decay.
    pub fn set_collision_bias(&mut self, bias: f64) {
        self.settings.collision_bias = bias;
    }

    /// Steps separated pairs keep their warm start data for.
    pub fn collision_persistence(&self) -> u64 {
        self.settings.collision_persistence
    }

    /// Set the collision persistence.
    pub fn set_collision_persistence(&mut self, persistence: u64) {
        self.settings.collision_persistence = persistence;
    }

    /// Timestep of the current or most recent step, for use inside
    /// callbacks.
    pub fn current_dt(&self) -> f64 {
        self.curr_dt
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        self.stamp
    }

    /// Whether the space is in the middle of a step.
    pub fn is_locked(&self) -> bool {
        self.locked > 0
    }

    /// The built-in immovable body, an anchor for joints and world
    /// geometry.
    pub fn static_body(&self) -> BodyKey {
        self.static_body
    }

    fn ensure_unlocked(&self) -> Result<(), SpaceError> {
        if self.locked > 0 {
            Err(SpaceError::Locked)
        } else {
            Ok(())
        }
    }

    /// Add a body, returning its key.
    pub fn add_body(&mut self, body: Body) -> Result<BodyKey, SpaceError> {
        self.ensure_unlocked()?;

        let kind = body.kind();
        let key = self.bodies.insert(body);
        match kind {
            BodyKind::Static => self.static_bodies.push(key),
            _ => self.dynamic_bodies.push(key),
        }

        Ok(key)
    }

    /// Remove a body that no longer has shapes or constraints attached.
    pub fn remove_body(&mut self, key: BodyKey) -> Result<Body, SpaceError> {
        self.ensure_unlocked()?;
        debug_assert!(
            self.bodies[key].shapes().is_empty(),
            "Remove the body's shapes first"
        );
        debug_assert!(
            self.bodies[key].constraints().is_empty(),
            "Remove the body's constraints first"
        );

        self.activate_body(key);
        self.dynamic_bodies.retain(|&k| k != key);
        self.static_bodies.retain(|&k| k != key);

        Ok(self.bodies.remove(key).expect("Body was not in this space"))
    }

    /// Whether the key points at a live body.
    pub fn contains_body(&self, key: BodyKey) -> bool {
        self.bodies.contains_key(key)
    }

    /// Read a body.
    pub fn body(&self, key: BodyKey) -> &Body {
        &self.bodies[key]
    }

    /// Mutate a body.
    pub fn body_mut(&mut self, key: BodyKey) -> &mut Body {
        &mut self.bodies[key]
    }

    /// Iterate over every body.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &Body)> {
        self.bodies.iter()
    }

    /// Change how a body participates in the simulation, moving its shapes
    /// between the spatial indexes.
    pub fn set_body_kind(&mut self, key: BodyKey, kind: BodyKind) -> Result<(), SpaceError> {
        self.ensure_unlocked()?;

        let old = self.bodies[key].kind();
        if old == kind {
            return Ok(());
        }

        if self.bodies[key].is_sleeping() {
            self.activate_body(key);
        }

        match old {
            BodyKind::Static => self.static_bodies.retain(|&k| k != key),
            _ => self.dynamic_bodies.retain(|&k| k != key),
        }
        match kind {
            BodyKind::Static => self.static_bodies.push(key),
            _ => self.dynamic_bodies.push(key),
        }

        self.bodies[key].set_kind_raw(kind);

        let became_static = kind == BodyKind::Static;
        for shape in self.bodies[key].shapes().to_vec() {
            let iso = self.bodies[key].transform();
            let bb = self.shapes[shape].cache_bb(iso);

            if became_static {
                self.dynamic_index.remove(shape);
                self.static_index.insert(shape, bb);
            } else {
                self.static_index.remove(shape);
                self.dynamic_index.insert(shape, bb);
            }
        }

        Ok(())
    }

    /// Attach a shape to the space, indexing it under its body.
    pub fn add_shape(&mut self, mut shape: Shape) -> Result<ShapeKey, SpaceError> {
        self.ensure_unlocked()?;
        debug_assert!(
            self.bodies.contains_key(shape.body),
            "The shape's body is not in this space"
        );

        let body_key = shape.body;
        self.activate_body(body_key);

        shape.hashid = self.shape_id_counter;
        self.shape_id_counter += 1;

        let body = &self.bodies[body_key];
        let bb = shape.cache_bb(body.transform());
        let is_static = body.kind() == BodyKind::Static;

        let key = self.shapes.insert(shape);
        self.bodies[body_key].shapes.push(key);

        if is_static {
            self.static_index.insert(key, bb);
        } else {
            self.dynamic_index.insert(key, bb);
        }

        Ok(key)
    }

    /// Detach a shape, separating any collisions it is part of.
    pub fn remove_shape(&mut self, key: ShapeKey) -> Result<Shape, SpaceError> {
        self.ensure_unlocked()?;

        let body_key = self.shapes[key].body;
        self.activate_body(body_key);
        self.bodies[body_key].shapes.retain(|&k| k != key);

        self.dynamic_index.remove(key);
        self.static_index.remove(key);

        self.invalidate_arbiters(key);

        Ok(self.shapes.remove(key).expect("Shape was not in this space"))
    }

    /// Whether the key points at a live shape.
    pub fn contains_shape(&self, key: ShapeKey) -> bool {
        self.shapes.contains_key(key)
    }

    /// Read a shape.
    pub fn shape(&self, key: ShapeKey) -> &Shape {
        &self.shapes[key]
    }

    /// Mutate a shape.
    pub fn shape_mut(&mut self, key: ShapeKey) -> &mut Shape {
        &mut self.shapes[key]
    }

    /// Iterate over every shape.
    pub fn shapes(&self) -> impl Iterator<Item = (ShapeKey, &Shape)> {
        self.shapes.iter()
    }

    /// Add a constraint between two bodies.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintKey, SpaceError> {
        self.ensure_unlocked()?;
        debug_assert!(
            self.bodies.contains_key(constraint.a) && self.bodies.contains_key(constraint.b),
            "The constraint's bodies are not in this space"
        );

        let (a, b) = (constraint.a, constraint.b);
        self.activate_body(a);
        self.activate_body(b);

        let key = self.constraints.insert(constraint);
        self.constraint_list.push(key);
        self.bodies[a].constraints.push(key);
        self.bodies[b].constraints.push(key);

        Ok(key)
    }

    /// Remove a constraint.
    pub fn remove_constraint(&mut self, key: ConstraintKey) -> Result<Constraint, SpaceError> {
        self.ensure_unlocked()?;

        let (a, b) = self.constraints[key].bodies();
        self.activate_body(a);
        self.activate_body(b);

        self.constraint_list.retain(|&k| k != key);
        self.bodies[a].constraints.retain(|&k| k != key);
        self.bodies[b].constraints.retain(|&k| k != key);

        Ok(self
            .constraints
            .remove(key)
            .expect("Constraint was not in this space"))
    }

    /// Whether the key points at a live constraint.
    pub fn contains_constraint(&self, key: ConstraintKey) -> bool {
        self.constraints.contains_key(key)
    }

    /// Read a constraint.
    pub fn constraint(&self, key: ConstraintKey) -> &Constraint {
        &self.constraints[key]
    }

    /// Mutate a constraint.
    pub fn constraint_mut(&mut self, key: ConstraintKey) -> &mut Constraint {
        &mut self.constraints[key]
    }

    /// Iterate over every constraint.
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintKey, &Constraint)> {
        self.constraints.iter()
    }

    /// Read an arbiter, when the pair is currently tracked.
    pub fn arbiter(&self, pair: PairKey) -> Option<&Arbiter> {
        self.cached_arbiters.get(&pair)
    }

    /// Register a handler for collisions between two collision types.
    pub fn add_collision_handler(
        &mut self,
        a: CollisionType,
        b: CollisionType,
        handler: CollisionHandler,
    ) {
        self.handlers.set_pair(a, b, handler);
    }

    /// Register a handler for every collision involving a collision type.
    pub fn add_wildcard_handler(&mut self, ty: CollisionType, handler: CollisionHandler) {
        self.handlers.set_wildcard(ty, handler);
    }

    /// Replace the handler used when no other matches.
    pub fn set_default_handler(&mut self, handler: CollisionHandler) {
        self.handlers.set_default(handler);
    }

    /// Defer work until the running step finishes, at most once per key.
    ///
    /// Outside of a step the callback runs immediately.
    pub fn add_post_step_callback(
        &mut self,
        key: u64,
        f: impl FnOnce(&mut Space) + 'static,
    ) -> bool {
        let queued = self.post_step.push(key, f);

        if self.locked == 0 {
            self.run_post_step_callbacks();
        }

        queued
    }

    pub(crate) fn lock(&mut self) {
        self.locked += 1;
    }

    pub(crate) fn unlock(&mut self, run_post_step: bool) {
        debug_assert!(self.locked > 0, "Unbalanced space unlock");
        self.locked -= 1;

        if self.locked == 0 {
            // Bodies woken by callbacks finish waking now.
            let roused = std::mem::take(&mut self.roused_bodies);
            for key in roused {
                self.activate_body(key);
            }

            if run_post_step {
                self.run_post_step_callbacks();
            }
        }
    }

    fn run_post_step_callbacks(&mut self) {
        // Callbacks may queue more callbacks; keep draining.
        while !self.post_step.is_empty() {
            let entries = std::mem::take(&mut self.post_step.entries);
            for (_key, f) in entries {
                f(self);
            }
        }
    }

    /// Restart shape id generation, making future ids reproducible.
    ///
    /// Only meaningful on a space without shapes.
    pub fn reset_shape_id_counter(&mut self) {
        debug_assert!(
            self.shapes.is_empty(),
            "Resetting shape ids with live shapes invites hash collisions"
        );
        self.shape_id_counter = 0;
    }

    /// Refresh the cached data of every static shape.
    ///
    /// Call after moving static bodies around.
    pub fn reindex_static(&mut self) {
        let mut keys = Vec::new();
        self.static_index.each(&mut |key| keys.push(key));

        for key in keys {
            let body = &self.bodies[self.shapes[key].body];
            let iso = body.transform();
            self.shapes[key].cache_bb(iso);
        }

        let bounds = SpaceBounds {
            shapes: &self.shapes,
            bodies: &self.bodies,
        };
        self.static_index.reindex(&bounds);
    }

    /// Refresh one shape's cached data and reindex it.
    pub fn reindex_shape(&mut self, key: ShapeKey) {
        let body = &self.bodies[self.shapes[key].body];
        let iso = body.transform();
        self.shapes[key].cache_bb(iso);

        let bounds = SpaceBounds {
            shapes: &self.shapes,
            bodies: &self.bodies,
        };
        self.dynamic_index.reindex_object(key, &bounds);
        self.static_index.reindex_object(key, &bounds);
    }

    /// Refresh every shape of one body.
    pub fn reindex_shapes_for_body(&mut self, body: BodyKey) {
        for shape in self.bodies[body].shapes().to_vec() {
            self.reindex_shape(shape);
        }
    }

    /// Swap both spatial indexes for spatial hash grids.
    ///
    /// Worth trying over the default tree when lots of similarly sized
    /// objects are spread out evenly.
    pub fn use_spatial_hash(&mut self, celldim: f64, cells: usize) {
        let mut dynamic: Box<dyn SpatialIndex> = Box::new(SpatialHash::new(celldim, cells));
        let mut fixed: Box<dyn SpatialIndex> = Box::new(SpatialHash::new(celldim, cells));

        let mut keys = Vec::new();
        self.dynamic_index.each(&mut |key| keys.push(key));
        for key in keys {
            dynamic.insert(key, self.shapes[key].bb);
        }

        let mut keys = Vec::new();
        self.static_index.each(&mut |key| keys.push(key));
        for key in keys {
            fixed.insert(key, self.shapes[key].bb);
        }

        self.dynamic_index = dynamic;
        self.static_index = fixed;
    }

    /// Invalidate and separate every arbiter touching a removed shape.
    fn invalidate_arbiters(&mut self, shape: ShapeKey) {
        let pairs: Vec<PairKey> = self
            .cached_arbiters
            .keys()
            .filter(|pair| pair.contains(shape))
            .copied()
            .collect();

        for pair in pairs {
            let mut arb = self.cached_arbiters.remove(&pair).expect("Pair vanished");

            // A live collision separates right now, while both shapes still
            // exist.
            let live = matches!(
                arb.state,
                ArbiterState::FirstCollision | ArbiterState::Normal
            );
            arb.state = ArbiterState::Invalidated;

            if live {
                let types = (
                    self.shapes[arb.shape_a].collision_type,
                    self.shapes[arb.shape_b].collision_type,
                );
                let mut ctx = CallbackSpace {
                    bodies: &mut self.bodies,
                    shapes: &self.shapes,
                    gravity: self.settings.gravity,
                    dt: self.curr_dt,
                    post_step: &mut self.post_step,
                    roused: &mut self.roused_bodies,
                };
                self.handlers.separate(types, &mut arb, &mut ctx);
            }

            self.bodies[arb.body_a].arbiters.retain(|&p| p != pair);
            self.bodies[arb.body_b].arbiters.retain(|&p| p != pair);
            self.arbiters.retain(|&p| p != pair);
        }

        // Separate callbacks may have woken bodies.
        if self.locked == 0 {
            let roused = std::mem::take(&mut self.roused_bodies);
            for key in roused {
                self.activate_body(key);
            }
        }
    }
}

impl Default for Space {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use vek::Vec2;

    use crate::math::moment_for_box;

    use super::*;

    fn box_body(pos: Vec2<f64>) -> Body {
        let mut body = Body::new(1.0, moment_for_box(1.0, 10.0, 10.0));
        body.set_position(pos);
        body
    }

    #[test]
    fn add_and_remove_everything() {
        let mut space = Space::new();

        let a = space.add_body(box_body(Vec2::zero())).unwrap();
        let b = space.add_body(box_body(Vec2::new(50.0, 0.0))).unwrap();
        let shape = space
            .add_shape(Shape::box_shape(a, 10.0, 10.0, 0.0))
            .unwrap();
        let joint = space
            .add_constraint(Constraint::slide(a, b, Vec2::zero(), Vec2::zero(), 10.0, 100.0))
            .unwrap();

        assert!(space.contains_body(a));
        assert!(space.contains_shape(shape));
        assert!(space.contains_constraint(joint));
        assert_eq!(space.bodies().count(), 3, "Two bodies plus the built-in static one");

        space.remove_constraint(joint).unwrap();
        space.remove_shape(shape).unwrap();
        space.remove_body(a).unwrap();
        space.remove_body(b).unwrap();

        assert!(!space.contains_body(a));
        assert!(!space.contains_shape(shape));
        assert!(!space.contains_constraint(joint));
    }

    #[test]
    fn shapes_land_in_the_index_matching_their_body() {
        let mut space = Space::new();

        let fixed = space.static_body();
        space
            .add_shape(Shape::box_shape(fixed, 10.0, 10.0, 0.0))
            .unwrap();
        assert_eq!(space.static_index.len(), 1);
        assert_eq!(space.dynamic_index.len(), 0);

        let moving = space.add_body(box_body(Vec2::zero())).unwrap();
        let shape = space
            .add_shape(Shape::box_shape(moving, 10.0, 10.0, 0.0))
            .unwrap();
        assert_eq!(space.dynamic_index.len(), 1);

        // Changing the body kind migrates its shapes.
        space.set_body_kind(moving, BodyKind::Static).unwrap();
        assert_eq!(space.static_index.len(), 2);
        assert_eq!(space.dynamic_index.len(), 0);
        assert_eq!(space.body(moving).mass_inv(), 0.0);

        space.set_body_kind(moving, BodyKind::Dynamic).unwrap();
        assert!(space.dynamic_index.contains(shape));
    }

    #[test]
    fn removing_a_shape_separates_its_collisions() {
        let separated = Rc::new(RefCell::new(0));

        let mut space = Space::with_settings(SpaceSettings {
            gravity: Vec2::new(0.0, -100.0),
            ..SpaceSettings::default()
        });

        let ground = space.static_body();
        let floor = space
            .add_shape(Shape::segment(
                ground,
                Vec2::new(-100.0, 0.0),
                Vec2::new(100.0, 0.0),
                0.0,
            ))
            .unwrap();
        space.shape_mut(floor).set_collision_type(1);

        let body = space.add_body(box_body(Vec2::new(0.0, 5.0))).unwrap();
        let shape = space
            .add_shape(Shape::box_shape(body, 10.0, 10.0, 0.0))
            .unwrap();
        space.shape_mut(shape).set_collision_type(2);

        let counter = separated.clone();
        space.add_collision_handler(
            1,
            2,
            CollisionHandler {
                separate: Some(Box::new(move |_arb, _ctx| {
                    *counter.borrow_mut() += 1;
                })),
                ..CollisionHandler::default()
            },
        );

        for _ in 0..10 {
            space.step(1.0 / 60.0);
        }
        assert!(space.arbiter(PairKey::new(shape, floor)).is_some());

        space.remove_shape(shape).unwrap();
        assert!(space.arbiter(PairKey::new(shape, floor)).is_none());
        assert_eq!(*separated.borrow(), 1);
    }

    #[test]
    fn spatial_hash_backend_behaves_the_same() {
        let mut space = Space::with_settings(SpaceSettings {
            gravity: Vec2::new(0.0, -100.0),
            ..SpaceSettings::default()
        });
        space.use_spatial_hash(30.0, 200);

        let ground = space.static_body();
        space
            .add_shape(Shape::segment(
                ground,
                Vec2::new(-100.0, 0.0),
                Vec2::new(100.0, 0.0),
                0.0,
            ))
            .unwrap();

        let body = space.add_body(box_body(Vec2::new(0.0, 30.0))).unwrap();
        space
            .add_shape(Shape::box_shape(body, 10.0, 10.0, 0.0))
            .unwrap();

        for _ in 0..120 {
            space.step(1.0 / 60.0);
        }

        let y = space.body(body).position().y;
        assert!((y - 5.0).abs() < 0.5, "Box rests at {y}");
    }

    #[test]
    fn post_step_callbacks_deduplicate_by_key() {
        let mut space = Space::new();

        let ran = Rc::new(RefCell::new(0));
        let a = ran.clone();
        let b = ran.clone();

        // Outside of a step callbacks run immediately, so queue both from a
        // locked space.
        space.lock();
        space.add_post_step_callback(1, move |_space| *a.borrow_mut() += 1);
        space.add_post_step_callback(1, move |_space| *b.borrow_mut() += 1);
        space.unlock(true);

        assert_eq!(*ran.borrow(), 1);
    }

    #[test]
    fn default_settings_match_the_documented_values() {
        let settings = SpaceSettings::default();

        assert_eq!(settings.iterations, 10);
        assert_eq!(settings.damping, 1.0);
        assert_eq!(settings.collision_persistence, 3);
        assert_eq!(settings.sleep_time_threshold, f64::INFINITY);
    }
}
