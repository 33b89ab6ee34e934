//! Collision handler registry and the space view callbacks run against.

use hashbrown::HashMap;
use slotmap::SlotMap;
use vek::Vec2;

use crate::{
    arbiter::Arbiter,
    body::{Body, BodyKey},
    shape::{CollisionType, Shape, ShapeKey},
    space::{PostStepQueue, Space},
};

/// Accept or reject a starting collision.
pub type BeginFn = Box<dyn FnMut(&mut Arbiter, &mut CallbackSpace) -> bool>;
/// Accept or reject a collision right before it's solved.
pub type PreSolveFn = Box<dyn FnMut(&mut Arbiter, &mut CallbackSpace) -> bool>;
/// Inspect the impulses after the solver ran.
pub type PostSolveFn = Box<dyn FnMut(&mut Arbiter, &mut CallbackSpace)>;
/// Two shapes stopped touching.
pub type SeparateFn = Box<dyn FnMut(&mut Arbiter, &mut CallbackSpace)>;

/// The four lifecycle callbacks of a collision pair.
///
/// Unset callbacks accept collisions and do nothing.
#[derive(Default)]
pub struct CollisionHandler {
    pub begin: Option<BeginFn>,
    pub pre_solve: Option<PreSolveFn>,
    pub post_solve: Option<PostSolveFn>,
    pub separate: Option<SeparateFn>,
}

/// What a collision callback is allowed to touch while the space steps.
///
/// Topology changes (adding and removing bodies, shapes or constraints) must
/// go through [`CallbackSpace::add_post_step_callback`].
pub struct CallbackSpace<'a> {
    pub(crate) bodies: &'a mut SlotMap<BodyKey, Body>,
    pub(crate) shapes: &'a SlotMap<ShapeKey, Shape>,
    /// Gravity of the space.
    pub gravity: Vec2<f64>,
    /// Timestep of the running step.
    pub dt: f64,
    pub(crate) post_step: &'a mut PostStepQueue,
    pub(crate) roused: &'a mut Vec<BodyKey>,
}

impl CallbackSpace<'_> {
    /// Wake a body and its whole sleeping group.
    ///
    /// The actual wake-up is deferred to the end of the step.
    pub fn activate_body(&mut self, key: BodyKey) {
        if self.bodies[key].kind() == crate::body::BodyKind::Static {
            return;
        }

        self.bodies[key].sleeping.idle_time = 0.0;
        if !self.roused.contains(&key) {
            self.roused.push(key);
        }
    }

    /// Read a body.
    pub fn body(&self, key: BodyKey) -> &Body {
        &self.bodies[key]
    }

    /// Mutate a body; velocities and user data are fair game mid-step.
    pub fn body_mut(&mut self, key: BodyKey) -> &mut Body {
        &mut self.bodies[key]
    }

    /// Read a shape.
    pub fn shape(&self, key: ShapeKey) -> &Shape {
        &self.shapes[key]
    }

    /// Defer work until the space finishes stepping.
    ///
    /// Only the first callback per key is kept, so a handler firing for many
    /// collisions of one object schedules its cleanup once.
    pub fn add_post_step_callback(
        &mut self,
        key: u64,
        f: impl FnOnce(&mut Space) + 'static,
    ) -> bool {
        self.post_step.push(key, f)
    }
}

/// Where collision handlers live, looked up by the shapes' collision types.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    /// Handlers for an exact type pair, keyed order independently.
    pair: HashMap<(CollisionType, CollisionType), CollisionHandler>,
    /// Handlers matching one side of any pair.
    wildcard: HashMap<CollisionType, CollisionHandler>,
    /// Fallback for pairs nothing else matches.
    default: CollisionHandler,
}

/// Order independent handler key.
fn pair_key(a: CollisionType, b: CollisionType) -> (CollisionType, CollisionType) {
    (a.min(b), a.max(b))
}

impl HandlerRegistry {
    /// Register a handler for an exact type pair.
    pub fn set_pair(&mut self, a: CollisionType, b: CollisionType, handler: CollisionHandler) {
        self.pair.insert(pair_key(a, b), handler);
    }

    /// Register a handler matching every pair containing the type.
    pub fn set_wildcard(&mut self, ty: CollisionType, handler: CollisionHandler) {
        self.wildcard.insert(ty, handler);
    }

    /// Replace the fallback handler.
    pub fn set_default(&mut self, handler: CollisionHandler) {
        self.default = handler;
    }

    /// The pair handler for two types, falling back to the default.
    fn lookup(&mut self, a: CollisionType, b: CollisionType) -> &mut CollisionHandler {
        self.pair
            .get_mut(&pair_key(a, b))
            .unwrap_or(&mut self.default)
    }

    /// Fire the begin callbacks; any rejection rejects the pair.
    pub fn begin(
        &mut self,
        types: (CollisionType, CollisionType),
        arb: &mut Arbiter,
        ctx: &mut CallbackSpace,
    ) -> bool {
        let mut accept = true;

        if let Some(f) = &mut self.lookup(types.0, types.1).begin {
            accept &= f(arb, ctx);
        }
        if let Some(handler) = self.wildcard.get_mut(&types.0) {
            if let Some(f) = &mut handler.begin {
                accept &= f(arb, ctx);
            }
        }
        if types.1 != types.0 {
            if let Some(handler) = self.wildcard.get_mut(&types.1) {
                if let Some(f) = &mut handler.begin {
                    accept &= f(arb, ctx);
                }
            }
        }

        accept
    }

    /// Fire the pre solve callbacks; any rejection suppresses this step's
    /// impulses.
    pub fn pre_solve(
        &mut self,
        types: (CollisionType, CollisionType),
        arb: &mut Arbiter,
        ctx: &mut CallbackSpace,
    ) -> bool {
        let mut accept = true;

        if let Some(f) = &mut self.lookup(types.0, types.1).pre_solve {
            accept &= f(arb, ctx);
        }
        if let Some(handler) = self.wildcard.get_mut(&types.0) {
            if let Some(f) = &mut handler.pre_solve {
                accept &= f(arb, ctx);
            }
        }
        if types.1 != types.0 {
            if let Some(handler) = self.wildcard.get_mut(&types.1) {
                if let Some(f) = &mut handler.pre_solve {
                    accept &= f(arb, ctx);
                }
            }
        }

        accept
    }

    /// Fire the post solve callbacks.
    pub fn post_solve(
        &mut self,
        types: (CollisionType, CollisionType),
        arb: &mut Arbiter,
        ctx: &mut CallbackSpace,
    ) {
        if let Some(f) = &mut self.lookup(types.0, types.1).post_solve {
            f(arb, ctx);
        }
        if let Some(handler) = self.wildcard.get_mut(&types.0) {
            if let Some(f) = &mut handler.post_solve {
                f(arb, ctx);
            }
        }
        if types.1 != types.0 {
            if let Some(handler) = self.wildcard.get_mut(&types.1) {
                if let Some(f) = &mut handler.post_solve {
                    f(arb, ctx);
                }
            }
        }
    }

    /// Fire the separate callbacks.
    pub fn separate(
        &mut self,
        types: (CollisionType, CollisionType),
        arb: &mut Arbiter,
        ctx: &mut CallbackSpace,
    ) {
        if let Some(f) = &mut self.lookup(types.0, types.1).separate {
            f(arb, ctx);
        }
        if let Some(handler) = self.wildcard.get_mut(&types.0) {
            if let Some(f) = &mut handler.separate {
                f(arb, ctx);
            }
        }
        if types.1 != types.0 {
            if let Some(handler) = self.wildcard.get_mut(&types.1) {
                if let Some(f) = &mut handler.separate {
                    f(arb, ctx);
                }
            }
        }
    }
}
