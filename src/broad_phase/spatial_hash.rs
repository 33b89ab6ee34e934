//! Uniform grid broad phase.
//!
//! Every shape is hashed into each grid cell its bounding box overlaps. A
//! per-shape query stamp keeps pairs from being reported once per shared
//! cell.

use std::cell::Cell;

use hashbrown::HashMap;
use vek::{Aabr, Vec2};

use crate::{math::aabr_intersects, shape::ShapeKey};

use super::{BoundsProvider, SpatialIndex};

#[derive(Debug)]
struct Handle {
    bb: Aabr<f64>,
    /// Query stamp, deduplicates hits within a single query.
    stamp: Cell<u64>,
}

/// Spatial hash grid broad phase.
pub(crate) struct SpatialHash {
    /// Side length of a grid cell.
    celldim: f64,
    /// Cells of shape keys; removal leaves stale keys behind until the next
    /// full rehash, lookups skip them.
    table: Vec<Vec<ShapeKey>>,
    handles: HashMap<ShapeKey, Handle>,
    /// Insertion order, keeps iteration reproducible between runs.
    order: Vec<ShapeKey>,
    stamp: Cell<u64>,
}

impl SpatialHash {
    /// A grid sized for the typical object.
    ///
    /// `celldim` works best a bit larger than the average object, `cells`
    /// around ten times the expected object count; it is rounded up to the
    /// next prime.
    pub fn new(celldim: f64, cells: usize) -> Self {
        debug_assert!(celldim > 0.0, "Cell dimension must be positive");

        Self {
            celldim,
            table: (0..next_prime(cells)).map(|_| Vec::new()).collect(),
            handles: HashMap::new(),
            order: Vec::new(),
            stamp: Cell::new(1),
        }
    }

    /// Throw away the table and rebuild it with new dimensions.
    pub fn resize(&mut self, celldim: f64, cells: usize) {
        debug_assert!(celldim > 0.0, "Cell dimension must be positive");

        self.celldim = celldim;
        self.table = (0..next_prime(cells)).map(|_| Vec::new()).collect();

        for i in 0..self.order.len() {
            let key = self.order[i];
            let bb = self.handles[&key].bb;
            self.hash_into_cells(key, bb);
        }
    }

    fn cell_index(&self, x: i64, y: i64) -> usize {
        let n = self.table.len() as u64;
        ((x as u64).wrapping_mul(2185031351) ^ (y as u64).wrapping_mul(4232417593)) as usize
            % n as usize
    }

    /// Grid coordinate range covered by a bounding box.
    fn cell_range(&self, bb: Aabr<f64>) -> (i64, i64, i64, i64) {
        let dim = self.celldim;
        (
            (bb.min.x / dim).floor() as i64,
            (bb.max.x / dim).floor() as i64,
            (bb.min.y / dim).floor() as i64,
            (bb.max.y / dim).floor() as i64,
        )
    }

    fn hash_into_cells(&mut self, key: ShapeKey, bb: Aabr<f64>) {
        let (l, r, b, t) = self.cell_range(bb);

        for i in l..=r {
            for j in b..=t {
                let index = self.cell_index(i, j);
                let cell = &mut self.table[index];

                // Different grid coordinates can land in the same cell.
                if !cell.contains(&key) {
                    cell.push(key);
                }
            }
        }
    }

    fn clear_table(&mut self) {
        for cell in &mut self.table {
            cell.clear();
        }
    }

    /// Visit the live shapes of one cell, deduplicated by the query stamp.
    fn query_cell(&self, index: usize, f: &mut dyn FnMut(ShapeKey, &Handle)) {
        for &key in &self.table[index] {
            let Some(handle) = self.handles.get(&key) else {
                // Removed shape that was never rehashed away.
                continue;
            };

            if handle.stamp.get() != self.stamp.get() {
                handle.stamp.set(self.stamp.get());
                f(key, handle);
            }
        }
    }
}

impl SpatialIndex for SpatialHash {
    fn insert(&mut self, key: ShapeKey, bb: Aabr<f64>) {
        debug_assert!(
            !self.handles.contains_key(&key),
            "Shape is already in this index"
        );

        self.handles.insert(
            key,
            Handle {
                bb,
                stamp: Cell::new(0),
            },
        );
        self.order.push(key);
        self.hash_into_cells(key, bb);
    }

    fn remove(&mut self, key: ShapeKey) {
        if self.handles.remove(&key).is_some() {
            self.order.retain(|&k| k != key);
        }
    }

    fn contains(&self, key: ShapeKey) -> bool {
        self.handles.contains_key(&key)
    }

    fn len(&self) -> usize {
        self.handles.len()
    }

    fn each(&self, f: &mut dyn FnMut(ShapeKey)) {
        for &key in &self.order {
            f(key);
        }
    }

    fn query(&self, bb: Aabr<f64>, f: &mut dyn FnMut(ShapeKey)) {
        self.stamp.set(self.stamp.get() + 1);

        let (l, r, b, t) = self.cell_range(bb);
        for i in l..=r {
            for j in b..=t {
                self.query_cell(self.cell_index(i, j), &mut |key, handle| {
                    if aabr_intersects(bb, handle.bb) {
                        f(key);
                    }
                });
            }
        }
    }

    fn point_query(&self, p: Vec2<f64>, f: &mut dyn FnMut(ShapeKey)) {
        self.query(Aabr { min: p, max: p }, f);
    }

    fn segment_query(
        &self,
        a: Vec2<f64>,
        b: Vec2<f64>,
        t_exit: f64,
        f: &mut dyn FnMut(ShapeKey) -> f64,
    ) {
        self.stamp.set(self.stamp.get() + 1);

        let dim = self.celldim;
        let a = a / dim;
        let b = b / dim;

        let mut cell_x = a.x.floor() as i64;
        let mut cell_y = a.y.floor() as i64;

        // Degenerate segments query the starting cell only.
        if a == b {
            self.query_cell(self.cell_index(cell_x, cell_y), &mut |key, _| {
                f(key);
            });
            return;
        }

        let dt_dx = 1.0 / (b.x - a.x).abs();
        let dt_dy = 1.0 / (b.y - a.y).abs();

        let (x_inc, mut t_next_horizontal) = if b.x > a.x {
            (1, (a.x.floor() + 1.0 - a.x) * dt_dx)
        } else {
            (-1, (a.x - a.x.floor()) * dt_dx)
        };
        let (y_inc, mut t_next_vertical) = if b.y > a.y {
            (1, (a.y.floor() + 1.0 - a.y) * dt_dy)
        } else {
            (-1, (a.y - a.y.floor()) * dt_dy)
        };

        let mut t = 0.0;
        let mut t_exit = t_exit;
        while t < t_exit {
            self.query_cell(self.cell_index(cell_x, cell_y), &mut |key, _| {
                t_exit = t_exit.min(f(key));
            });

            if t_next_vertical < t_next_horizontal {
                cell_y += y_inc;
                t = t_next_vertical;
                t_next_vertical += dt_dy;
            } else {
                cell_x += x_inc;
                t = t_next_horizontal;
                t_next_horizontal += dt_dx;
            }
        }
    }

    fn reindex_object(&mut self, key: ShapeKey, bounds: &dyn BoundsProvider) {
        if let Some(handle) = self.handles.get_mut(&key) {
            handle.bb = bounds.bb(key);
            let bb = handle.bb;
            self.hash_into_cells(key, bb);
        }
    }

    fn reindex(&mut self, bounds: &dyn BoundsProvider) {
        self.clear_table();

        for i in 0..self.order.len() {
            let key = self.order[i];
            let bb = bounds.bb(key);
            self.handles
                .get_mut(&key)
                .expect("Handle missing for an indexed shape")
                .bb = bb;
            self.hash_into_cells(key, bb);
        }
    }

    fn reindex_query(
        &mut self,
        bounds: &dyn BoundsProvider,
        pairs: &mut dyn FnMut(ShapeKey, ShapeKey),
    ) {
        self.clear_table();

        // Rehash one shape at a time, querying the cells before inserting
        // into them so every pair is seen exactly once.
        for idx in 0..self.order.len() {
            let key = self.order[idx];
            let bb = bounds.bb(key);
            self.handles
                .get_mut(&key)
                .expect("Handle missing for an indexed shape")
                .bb = bb;

            let (l, r, b, t) = self.cell_range(bb);
            for i in l..=r {
                for j in b..=t {
                    let index = self.cell_index(i, j);

                    if self.table[index].contains(&key) {
                        continue;
                    }

                    self.query_cell(index, &mut |other, _| pairs(key, other));
                    self.table[index].push(key);
                }
            }

            self.stamp.set(self.stamp.get() + 1);
        }
    }
}

/// Smallest prime at least as large as `n`.
fn next_prime(n: usize) -> usize {
    fn is_prime(n: usize) -> bool {
        if n < 2 {
            return false;
        }
        let mut d = 2;
        while d * d <= n {
            if n % d == 0 {
                return false;
            }
            d += 1;
        }
        true
    }

    let mut n = n.max(2);
    while !is_prime(n) {
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use slotmap::Key;
    use vek::Vec2;

    use crate::broad_phase::test_bounds::{bb, keys, MapBounds};

    use super::*;

    fn pair_id(a: ShapeKey, b: ShapeKey) -> (u64, u64) {
        let a = a.data().as_ffi();
        let b = b.data().as_ffi();
        (a.min(b), a.max(b))
    }

    #[test]
    fn next_prime_rounds_up() {
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(10), 11);
        assert_eq!(next_prime(1000), 1009);
        assert_eq!(next_prime(1009), 1009);
    }

    #[test]
    fn finds_every_overlapping_pair() {
        fastrand::seed(3);

        let keys = keys(40);
        let mut bounds = MapBounds::default();
        let mut hash = SpatialHash::new(10.0, 100);

        for &key in &keys {
            let center = Vec2::new(
                fastrand::f64() * 100.0 - 50.0,
                fastrand::f64() * 100.0 - 50.0,
            );
            bounds.bbs.insert(key, bb(center.x, center.y, 4.0));
        }
        for &key in &keys {
            hash.insert(key, bounds.bbs[&key]);
        }

        let mut found = Vec::new();
        hash.reindex_query(&bounds, &mut |a, b| found.push(pair_id(a, b)));

        let mut expected = BTreeSet::new();
        for (i, &a) in keys.iter().enumerate() {
            for &b in &keys[i + 1..] {
                if aabr_intersects(bounds.bbs[&a], bounds.bbs[&b]) {
                    expected.insert(pair_id(a, b));
                }
            }
        }

        assert_eq!(found.len(), found.iter().collect::<BTreeSet<_>>().len());
        // The grid may report non-intersecting pairs sharing a cell, but
        // never miss an intersecting one.
        let found: BTreeSet<_> = found.into_iter().collect();
        assert!(found.is_superset(&expected));
    }

    #[test]
    fn query_skips_removed_shapes() {
        let keys = keys(2);
        let mut hash = SpatialHash::new(10.0, 16);

        hash.insert(keys[0], bb(0.0, 0.0, 1.0));
        hash.insert(keys[1], bb(1.0, 0.0, 1.0));
        hash.remove(keys[0]);

        let mut hits = Vec::new();
        hash.query(bb(0.0, 0.0, 5.0), &mut |key| hits.push(key));

        assert_eq!(hits, vec![keys[1]]);
        assert_eq!(hash.len(), 1);
    }

    #[test]
    fn segment_query_walks_cells() {
        let keys = keys(3);
        let mut hash = SpatialHash::new(5.0, 64);

        hash.insert(keys[0], bb(12.0, 2.0, 1.0));
        hash.insert(keys[1], bb(32.0, 2.0, 1.0));
        hash.insert(keys[2], bb(12.0, 40.0, 1.0));

        let mut visited = Vec::new();
        hash.segment_query(
            Vec2::new(0.0, 2.0),
            Vec2::new(40.0, 2.0),
            1.0,
            &mut |key| {
                visited.push(key);
                1.0
            },
        );

        assert!(visited.contains(&keys[0]));
        assert!(visited.contains(&keys[1]));
        assert!(!visited.contains(&keys[2]));
    }

    #[test]
    fn resize_keeps_contents() {
        let keys = keys(4);
        let mut hash = SpatialHash::new(10.0, 16);

        for (i, &key) in keys.iter().enumerate() {
            hash.insert(key, bb(i as f64 * 3.0, 0.0, 1.0));
        }

        hash.resize(2.0, 64);
        assert_eq!(hash.len(), 4);

        let mut hits = Vec::new();
        hash.query(bb(0.0, 0.0, 20.0), &mut |key| hits.push(key));
        assert_eq!(hits.len(), 4);
    }
}
