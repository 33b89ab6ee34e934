//! 2D rigid body physics engine.
//!
//! A [`Space`] steps a set of rigid bodies under gravity, resolving
//! collisions with persistent contacts and a sequential impulse solver, with
//! joints, springs and motors between bodies and automatic sleeping of
//! resting groups.
//!
//! ```
//! use tumble::{Body, Shape, Space};
//! use vek::Vec2;
//!
//! let mut space = Space::new();
//! space.set_gravity(Vec2::new(0.0, -100.0));
//!
//! // A static floor and a box dropped onto it.
//! let floor = space.static_body();
//! space
//!     .add_shape(Shape::segment(
//!         floor,
//!         Vec2::new(-100.0, 0.0),
//!         Vec2::new(100.0, 0.0),
//!         0.0,
//!     ))
//!     .unwrap();
//!
//! let mut falling = Body::new(1.0, tumble::math::moment_for_box(1.0, 10.0, 10.0));
//! falling.set_position(Vec2::new(0.0, 50.0));
//! let falling = space.add_body(falling).unwrap();
//! space
//!     .add_shape(Shape::box_shape(falling, 10.0, 10.0, 0.0))
//!     .unwrap();
//!
//! for _ in 0..120 {
//!     space.step(1.0 / 60.0);
//! }
//!
//! // Resting on the floor.
//! let y = space.body(falling).position().y;
//! assert!((y - 5.0).abs() < 0.5);
//! ```

pub mod arbiter;
pub mod body;
pub(crate) mod broad_phase;
pub mod collision;
pub mod constraint;
pub mod math;
pub mod shape;
pub mod space;

pub use arbiter::{Arbiter, ArbiterState, PairKey};
pub use body::{Body, BodyKey, BodyKind};
pub use constraint::{Constraint, ConstraintKey, ConstraintKind};
pub use shape::{
    CollisionType, PointQueryInfo, SegmentQueryInfo, Shape, ShapeFilter, ShapeKey,
};
pub use space::{
    CallbackSpace, CollisionHandler, DebugColor, DebugDraw, DebugDrawOptions, Space, SpaceError,
    SpaceSettings,
};

/// Opaque payload attachable to bodies, shapes, constraints, arbiters and
/// the space itself.
///
/// Downcast it with [`std::any::Any`] on the way out.
pub type UserData = Option<Box<dyn std::any::Any>>;

/// Distances below this count as touching.
pub(crate) const MAGIC_EPSILON: f64 = 1e-5;
