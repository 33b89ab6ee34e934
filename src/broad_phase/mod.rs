//! Broad phase spatial indexes.
//!
//! Two interchangeable implementations: a bounding box tree that caches
//! collision pairs between steps and a uniform spatial hash grid. A space
//! keeps dynamic shapes in one index and static shapes in another and sweeps
//! the dynamic one against the static one each step.

pub(crate) mod bb_tree;
pub(crate) mod spatial_hash;

use vek::{Aabr, Vec2};

use crate::shape::ShapeKey;

/// Fresh bounding boxes and velocities for the objects in an index.
///
/// Passed into the reindexing entry points so the index never holds a
/// reference into the shape storage itself.
pub(crate) trait BoundsProvider {
    /// Current world bounding box of a shape.
    fn bb(&self, key: ShapeKey) -> Aabr<f64>;

    /// Velocity of the shape's body, used to fatten stored boxes so moving
    /// objects don't get reindexed every step.
    fn velocity(&self, key: ShapeKey) -> Vec2<f64>;
}

/// The capability set shared by the broad phase implementations.
pub(crate) trait SpatialIndex {
    /// Add a shape with its current bounding box.
    fn insert(&mut self, key: ShapeKey, bb: Aabr<f64>);

    /// Remove a shape.
    fn remove(&mut self, key: ShapeKey);

    /// Whether the shape is in this index.
    fn contains(&self, key: ShapeKey) -> bool;

    /// Number of indexed shapes.
    fn len(&self) -> usize;

    /// Visit every indexed shape once.
    fn each(&self, f: &mut dyn FnMut(ShapeKey));

    /// Visit every shape whose stored box intersects `bb`.
    fn query(&self, bb: Aabr<f64>, f: &mut dyn FnMut(ShapeKey));

    /// Visit every shape whose stored box contains `p`.
    fn point_query(&self, p: Vec2<f64>, f: &mut dyn FnMut(ShapeKey));

    /// Visit shapes along the segment `a`-`b` in rough near-to-far order.
    ///
    /// The callback returns a new exit fraction; returning less than one
    /// prunes everything farther along the segment.
    fn segment_query(
        &self,
        a: Vec2<f64>,
        b: Vec2<f64>,
        t_exit: f64,
        f: &mut dyn FnMut(ShapeKey) -> f64,
    );

    /// Update the stored box of a single shape.
    fn reindex_object(&mut self, key: ShapeKey, bounds: &dyn BoundsProvider);

    /// Update the stored boxes of every shape.
    fn reindex(&mut self, bounds: &dyn BoundsProvider);

    /// Reindex everything and report every intersecting pair exactly once.
    fn reindex_query(
        &mut self,
        bounds: &dyn BoundsProvider,
        pairs: &mut dyn FnMut(ShapeKey, ShapeKey),
    );
}

/// Emit the pairs between a dynamic index and a static one.
pub(crate) fn collide_static(
    dynamic: &dyn SpatialIndex,
    fixed: &dyn SpatialIndex,
    bounds: &dyn BoundsProvider,
    pairs: &mut dyn FnMut(ShapeKey, ShapeKey),
) {
    if fixed.len() == 0 {
        return;
    }

    dynamic.each(&mut |key| {
        fixed.query(bounds.bb(key), &mut |other| pairs(key, other));
    });
}

#[cfg(test)]
pub(crate) mod test_bounds {
    use hashbrown::HashMap;
    use vek::{Aabr, Vec2};

    use crate::shape::ShapeKey;

    use super::BoundsProvider;

    /// Plain map of boxes for exercising indexes without building a space.
    #[derive(Default)]
    pub struct MapBounds {
        pub bbs: HashMap<ShapeKey, Aabr<f64>>,
        pub velocities: HashMap<ShapeKey, Vec2<f64>>,
    }

    impl BoundsProvider for MapBounds {
        fn bb(&self, key: ShapeKey) -> Aabr<f64> {
            self.bbs[&key]
        }

        fn velocity(&self, key: ShapeKey) -> Vec2<f64> {
            self.velocities.get(&key).copied().unwrap_or_default()
        }
    }

    /// Generate a set of keys to index.
    pub fn keys(count: usize) -> Vec<ShapeKey> {
        let mut arena: slotmap::SlotMap<ShapeKey, ()> = slotmap::SlotMap::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }

    /// Axis aligned box helper.
    pub fn bb(x: f64, y: f64, half: f64) -> Aabr<f64> {
        Aabr {
            min: Vec2::new(x - half, y - half),
            max: Vec2::new(x + half, y + half),
        }
    }
}
