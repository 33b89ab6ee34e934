//! Bounding box tree with cached collision pairs.
//!
//! Leaves remember which other leaves they currently overlap in a
//! doubly-threaded pair list, one thread rooted in each endpoint. A leaf
//! whose fattened box still contains the shape's fresh box replays last
//! step's pairs instead of traversing the tree again.

use hashbrown::HashMap;
use vek::{Aabr, Vec2};

use crate::{
    math::{
        aabr_area, aabr_contains as bb_contains, aabr_intersects as bb_intersects,
        aabr_merge as bb_merge, aabr_merged_area, aabr_segment_query,
    },
    shape::ShapeKey,
};

use super::{BoundsProvider, SpatialIndex};

type NodeId = u32;
type PairId = u32;

const NIL: u32 = u32::MAX;

/// How much of the body velocity is added to a leaf's fattened box.
const VELOCITY_COEF: f64 = 0.1;
/// Fraction of the box size a leaf is fattened by in every direction.
const FATTEN_COEF: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
enum NodeData {
    Internal {
        a: NodeId,
        b: NodeId,
    },
    Leaf {
        key: ShapeKey,
        /// Tree stamp at the last time this leaf was repositioned.
        stamp: u64,
        /// Head of the pair thread list.
        pairs: PairId,
    },
}

#[derive(Debug, Clone, Copy)]
struct Node {
    bb: Aabr<f64>,
    parent: NodeId,
    data: NodeData,
}

/// One end of a cached pair, a doubly linked list node rooted in a leaf.
#[derive(Debug, Clone, Copy)]
struct Thread {
    prev: PairId,
    leaf: NodeId,
    next: PairId,
}

#[derive(Debug, Clone, Copy)]
struct Pair {
    a: Thread,
    b: Thread,
}

/// Binary AABB tree broad phase.
pub(crate) struct BbTree {
    nodes: Vec<Node>,
    free_nodes: Vec<NodeId>,
    pairs: Vec<Pair>,
    free_pairs: Vec<PairId>,
    /// Leaf lookup by shape.
    leaves: HashMap<ShapeKey, NodeId>,
    /// Insertion order, keeps traversals reproducible between runs.
    order: Vec<ShapeKey>,
    root: NodeId,
    stamp: u64,
    /// Whether leaf boxes get expanded along the body velocity.
    fatten_with_velocity: bool,
}

impl BbTree {
    /// An empty tree; the dynamic index fattens leaf boxes by velocity.
    pub fn new(fatten_with_velocity: bool) -> Self {
        Self {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            pairs: Vec::new(),
            free_pairs: Vec::new(),
            leaves: HashMap::new(),
            order: Vec::new(),
            root: NIL,
            stamp: 0,
            fatten_with_velocity,
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.node(id).data, NodeData::Leaf { .. })
    }

    fn leaf_key(&self, id: NodeId) -> ShapeKey {
        match self.node(id).data {
            NodeData::Leaf { key, .. } => key,
            NodeData::Internal { .. } => unreachable!("Not a leaf"),
        }
    }

    fn leaf_pairs(&self, id: NodeId) -> PairId {
        match self.node(id).data {
            NodeData::Leaf { pairs, .. } => pairs,
            NodeData::Internal { .. } => unreachable!("Not a leaf"),
        }
    }

    fn set_leaf_pairs(&mut self, id: NodeId, head: PairId) {
        match &mut self.node_mut(id).data {
            NodeData::Leaf { pairs, .. } => *pairs = head,
            NodeData::Internal { .. } => unreachable!("Not a leaf"),
        }
    }

    fn children(&self, id: NodeId) -> (NodeId, NodeId) {
        match self.node(id).data {
            NodeData::Internal { a, b } => (a, b),
            NodeData::Leaf { .. } => unreachable!("Leaves have no children"),
        }
    }

    fn alloc_node(&mut self, node: Node) -> NodeId {
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id as usize] = node;
            id
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as NodeId
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.free_nodes.push(id);
    }

    fn alloc_pair(&mut self, pair: Pair) -> PairId {
        if let Some(id) = self.free_pairs.pop() {
            self.pairs[id as usize] = pair;
            id
        } else {
            self.pairs.push(pair);
            (self.pairs.len() - 1) as PairId
        }
    }

    fn set_a(&mut self, parent: NodeId, child: NodeId) {
        match &mut self.node_mut(parent).data {
            NodeData::Internal { a, .. } => *a = child,
            NodeData::Leaf { .. } => unreachable!("Leaves have no children"),
        }
        self.node_mut(child).parent = parent;
    }

    fn set_b(&mut self, parent: NodeId, child: NodeId) {
        match &mut self.node_mut(parent).data {
            NodeData::Internal { b, .. } => *b = child,
            NodeData::Leaf { .. } => unreachable!("Leaves have no children"),
        }
        self.node_mut(child).parent = parent;
    }

    fn node_other(&self, parent: NodeId, child: NodeId) -> NodeId {
        let (a, b) = self.children(parent);
        if a == child {
            b
        } else {
            a
        }
    }

    fn internal_new(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let bb = bb_merge(self.node(a).bb, self.node(b).bb);
        let id = self.alloc_node(Node {
            bb,
            parent: NIL,
            data: NodeData::Internal { a, b },
        });

        self.set_a(id, a);
        self.set_b(id, b);
        id
    }

    /// Swap out a child of an internal node and refit ancestor boxes.
    fn replace_child(&mut self, parent: NodeId, child: NodeId, value: NodeId) {
        let (a, _b) = self.children(parent);
        if a == child {
            self.free_node(child);
            self.set_a(parent, value);
        } else {
            self.free_node(child);
            self.set_b(parent, value);
        }

        let mut node = parent;
        while node != NIL {
            let (a, b) = self.children(node);
            let merged = bb_merge(self.nodes[a as usize].bb, self.nodes[b as usize].bb);
            self.node_mut(node).bb = merged;
            node = self.node(node).parent;
        }
    }

    /// Push a leaf down the subtree growing the total area the least.
    fn subtree_insert(&mut self, subtree: NodeId, leaf: NodeId) -> NodeId {
        if subtree == NIL {
            leaf
        } else if self.is_leaf(subtree) {
            self.internal_new(leaf, subtree)
        } else {
            let (a, b) = self.children(subtree);
            let leaf_bb = self.node(leaf).bb;

            let cost_a = aabr_area(self.node(b).bb) + aabr_merged_area(self.node(a).bb, leaf_bb);
            let cost_b = aabr_area(self.node(a).bb) + aabr_merged_area(self.node(b).bb, leaf_bb);

            if cost_b < cost_a {
                let new_b = self.subtree_insert(b, leaf);
                self.set_b(subtree, new_b);
            } else {
                let new_a = self.subtree_insert(a, leaf);
                self.set_a(subtree, new_a);
            }

            let merged = bb_merge(self.node(subtree).bb, leaf_bb);
            self.node_mut(subtree).bb = merged;
            subtree
        }
    }

    fn subtree_remove(&mut self, subtree: NodeId, leaf: NodeId) -> NodeId {
        if leaf == subtree {
            NIL
        } else {
            let parent = self.node(leaf).parent;
            if parent == subtree {
                let other = self.node_other(subtree, leaf);
                let grandparent = self.node(subtree).parent;
                self.node_mut(other).parent = grandparent;
                self.free_node(subtree);
                other
            } else {
                let grandparent = self.node(parent).parent;
                let other = self.node_other(parent, leaf);
                self.replace_child(grandparent, parent, other);
                subtree
            }
        }
    }

    /// Unhook one end of a pair from its leaf's thread list.
    fn thread_unlink(&mut self, thread: Thread) {
        let Thread { prev, leaf, next } = thread;

        if next != NIL {
            let pair = &mut self.pairs[next as usize];
            if pair.a.leaf == leaf {
                pair.a.prev = prev;
            } else {
                pair.b.prev = prev;
            }
        }

        if prev != NIL {
            let pair = &mut self.pairs[prev as usize];
            if pair.a.leaf == leaf {
                pair.a.next = next;
            } else {
                pair.b.next = next;
            }
        } else {
            self.set_leaf_pairs(leaf, next);
        }
    }

    /// Drop every cached pair of a leaf, unhooking the far ends.
    fn pairs_clear(&mut self, leaf: NodeId) {
        let mut pair_id = self.leaf_pairs(leaf);
        self.set_leaf_pairs(leaf, NIL);

        while pair_id != NIL {
            let pair = self.pairs[pair_id as usize];
            if pair.a.leaf == leaf {
                let next = pair.a.next;
                self.thread_unlink(pair.b);
                self.free_pairs.push(pair_id);
                pair_id = next;
            } else {
                let next = pair.b.next;
                self.thread_unlink(pair.a);
                self.free_pairs.push(pair_id);
                pair_id = next;
            }
        }
    }

    /// Record that two leaves currently overlap.
    fn pair_insert(&mut self, a: NodeId, b: NodeId) {
        let next_a = self.leaf_pairs(a);
        let next_b = self.leaf_pairs(b);

        let pair_id = self.alloc_pair(Pair {
            a: Thread {
                prev: NIL,
                leaf: a,
                next: next_a,
            },
            b: Thread {
                prev: NIL,
                leaf: b,
                next: next_b,
            },
        });

        if next_a != NIL {
            let pair = &mut self.pairs[next_a as usize];
            if pair.a.leaf == a {
                pair.a.prev = pair_id;
            } else {
                pair.b.prev = pair_id;
            }
        }
        if next_b != NIL {
            let pair = &mut self.pairs[next_b as usize];
            if pair.a.leaf == b {
                pair.a.prev = pair_id;
            } else {
                pair.b.prev = pair_id;
            }
        }

        self.set_leaf_pairs(a, pair_id);
        self.set_leaf_pairs(b, pair_id);
    }

    /// The stored box: the fresh box grown in every direction, stretched
    /// along the body velocity when enabled.
    fn fattened_bb(&self, key: ShapeKey, bounds: &dyn BoundsProvider) -> Aabr<f64> {
        let bb = bounds.bb(key);
        if !self.fatten_with_velocity {
            return bb;
        }

        let x = (bb.max.x - bb.min.x) * FATTEN_COEF;
        let y = (bb.max.y - bb.min.y) * FATTEN_COEF;
        let v = bounds.velocity(key) * VELOCITY_COEF;

        Aabr {
            min: Vec2::new(bb.min.x + (-x).min(v.x), bb.min.y + (-y).min(v.y)),
            max: Vec2::new(bb.max.x + x.max(v.x), bb.max.y + y.max(v.y)),
        }
    }

    /// Reposition a leaf whose shape outgrew its stored box.
    fn leaf_update(&mut self, leaf: NodeId, bounds: &dyn BoundsProvider) -> bool {
        let key = self.leaf_key(leaf);
        let fresh = bounds.bb(key);

        if !bb_contains(self.node(leaf).bb, fresh) {
            let fattened = self.fattened_bb(key, bounds);
            self.node_mut(leaf).bb = fattened;

            let root = self.subtree_remove(self.root, leaf);
            self.node_mut(leaf).parent = NIL;
            self.root = self.subtree_insert(root, leaf);

            let stamp = self.stamp;
            match &mut self.node_mut(leaf).data {
                NodeData::Leaf { stamp: s, .. } => *s = stamp,
                NodeData::Internal { .. } => unreachable!(),
            }

            true
        } else {
            false
        }
    }

    fn subtree_query(&self, node: NodeId, bb: Aabr<f64>, f: &mut dyn FnMut(ShapeKey)) {
        if bb_intersects(bb, self.node(node).bb) {
            match self.node(node).data {
                NodeData::Leaf { key, .. } => f(key),
                NodeData::Internal { a, b } => {
                    self.subtree_query(a, bb, f);
                    self.subtree_query(b, bb, f);
                }
            }
        }
    }

    fn subtree_segment_query(
        &self,
        node: NodeId,
        a: Vec2<f64>,
        b: Vec2<f64>,
        mut t_exit: f64,
        f: &mut dyn FnMut(ShapeKey) -> f64,
    ) -> f64 {
        match self.node(node).data {
            NodeData::Leaf { key, .. } => f(key),
            NodeData::Internal { a: child_a, b: child_b } => {
                let t_a = aabr_segment_query(self.node(child_a).bb, a, b);
                let t_b = aabr_segment_query(self.node(child_b).bb, a, b);

                // Visit the nearer child first so it can prune the other.
                let (first, second, t_first, t_second) = if t_a < t_b {
                    (child_a, child_b, t_a, t_b)
                } else {
                    (child_b, child_a, t_b, t_a)
                };

                if t_first < t_exit {
                    t_exit = t_exit.min(self.subtree_segment_query(first, a, b, t_exit, f));
                }
                if t_second < t_exit {
                    t_exit = t_exit.min(self.subtree_segment_query(second, a, b, t_exit, f));
                }

                t_exit
            }
        }
    }

    /// Pair up a freshly moved leaf against a subtree, recording the
    /// pairings on both ends.
    fn traverse_mark_query(
        &mut self,
        subtree: NodeId,
        leaf: NodeId,
        left: bool,
        f: &mut dyn FnMut(ShapeKey, ShapeKey),
    ) {
        if !bb_intersects(self.node(leaf).bb, self.node(subtree).bb) {
            return;
        }

        match self.node(subtree).data {
            NodeData::Leaf { key, .. } => {
                if left {
                    self.pair_insert(leaf, subtree);
                } else {
                    self.pair_insert(subtree, leaf);
                    f(self.leaf_key(leaf), key);
                }
            }
            NodeData::Internal { a, b } => {
                self.traverse_mark_query(a, leaf, left, f);
                self.traverse_mark_query(b, leaf, left, f);
            }
        }
    }

    fn traverse_mark_leaf(&mut self, leaf: NodeId, f: &mut dyn FnMut(ShapeKey, ShapeKey)) {
        let moved = match self.node(leaf).data {
            NodeData::Leaf { stamp, .. } => stamp == self.stamp,
            NodeData::Internal { .. } => unreachable!(),
        };

        if moved {
            // Repositioned this step: drop the stale pairs and re-pair by
            // walking against every sibling subtree up to the root.
            self.pairs_clear(leaf);

            let mut node = leaf;
            loop {
                let parent = self.node(node).parent;
                if parent == NIL {
                    break;
                }

                let (a, b) = self.children(parent);
                if node == a {
                    self.traverse_mark_query(b, leaf, true, f);
                } else {
                    self.traverse_mark_query(a, leaf, false, f);
                }

                node = parent;
            }
        } else {
            // Unmoved: replay the cached pairs, each pair reports from its
            // second endpoint so it comes out exactly once.
            let mut pair_id = self.leaf_pairs(leaf);
            while pair_id != NIL {
                let pair = self.pairs[pair_id as usize];
                if pair.b.leaf == leaf {
                    f(self.leaf_key(leaf), self.leaf_key(pair.a.leaf));
                    pair_id = pair.b.next;
                } else {
                    pair_id = pair.a.next;
                }
            }
        }
    }

    fn traverse_mark(&mut self, node: NodeId, f: &mut dyn FnMut(ShapeKey, ShapeKey)) {
        match self.node(node).data {
            NodeData::Leaf { .. } => self.traverse_mark_leaf(node, f),
            NodeData::Internal { a, b } => {
                self.traverse_mark(a, f);
                self.traverse_mark(b, f);
            }
        }
    }
}

impl SpatialIndex for BbTree {
    fn insert(&mut self, key: ShapeKey, bb: Aabr<f64>) {
        debug_assert!(
            !self.leaves.contains_key(&key),
            "Shape is already in this index"
        );

        let leaf = self.alloc_node(Node {
            bb,
            parent: NIL,
            data: NodeData::Leaf {
                key,
                stamp: self.stamp,
                pairs: NIL,
            },
        });

        self.leaves.insert(key, leaf);
        self.order.push(key);

        let root = self.root;
        self.root = if root == NIL {
            leaf
        } else {
            self.subtree_insert(root, leaf)
        };
    }

    fn remove(&mut self, key: ShapeKey) {
        let Some(leaf) = self.leaves.remove(&key) else {
            return;
        };
        self.order.retain(|&k| k != key);

        self.root = self.subtree_remove(self.root, leaf);
        self.pairs_clear(leaf);
        self.free_node(leaf);
    }

    fn contains(&self, key: ShapeKey) -> bool {
        self.leaves.contains_key(&key)
    }

    fn len(&self) -> usize {
        self.leaves.len()
    }

    fn each(&self, f: &mut dyn FnMut(ShapeKey)) {
        for &key in &self.order {
            f(key);
        }
    }

    fn query(&self, bb: Aabr<f64>, f: &mut dyn FnMut(ShapeKey)) {
        if self.root != NIL {
            self.subtree_query(self.root, bb, f);
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
        if self.root != NIL {
            self.subtree_segment_query(self.root, a, b, t_exit, f);
        }
    }

    fn reindex_object(&mut self, key: ShapeKey, bounds: &dyn BoundsProvider) {
        if let Some(&leaf) = self.leaves.get(&key) {
            if self.leaf_update(leaf, bounds) {
                self.pairs_clear(leaf);
            }
        }
    }

    fn reindex(&mut self, bounds: &dyn BoundsProvider) {
        let leaf_ids: Vec<NodeId> = self.order.iter().map(|key| self.leaves[key]).collect();
        for leaf in leaf_ids {
            self.leaf_update(leaf, bounds);
        }
    }

    fn reindex_query(
        &mut self,
        bounds: &dyn BoundsProvider,
        pairs: &mut dyn FnMut(ShapeKey, ShapeKey),
    ) {
        if self.root == NIL {
            return;
        }

        let leaf_ids: Vec<NodeId> = self.order.iter().map(|key| self.leaves[key]).collect();
        for leaf in leaf_ids {
            self.leaf_update(leaf, bounds);
        }

        self.traverse_mark(self.root, pairs);
        self.stamp += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use vek::Vec2;

    use crate::broad_phase::test_bounds::{bb, keys, MapBounds};

    use super::*;

    /// All unordered intersecting pairs the slow way.
    fn brute_force_pairs(bounds: &MapBounds, keys: &[ShapeKey]) -> BTreeSet<(u64, u64)> {
        let mut set = BTreeSet::new();
        for (i, &a) in keys.iter().enumerate() {
            for &b in &keys[i + 1..] {
                if bb_intersects(bounds.bbs[&a], bounds.bbs[&b]) {
                    set.insert(pair_id(a, b));
                }
            }
        }
        set
    }

    fn pair_id(a: ShapeKey, b: ShapeKey) -> (u64, u64) {
        use slotmap::Key;

        let a = a.data().as_ffi();
        let b = b.data().as_ffi();
        (a.min(b), a.max(b))
    }

    fn collect_pairs(tree: &mut BbTree, bounds: &MapBounds) -> Vec<(u64, u64)> {
        let mut found = Vec::new();
        tree.reindex_query(bounds, &mut |a, b| found.push(pair_id(a, b)));
        found
    }

    #[test]
    fn finds_every_overlapping_pair() {
        fastrand::seed(7);

        let keys = keys(50);
        let mut bounds = MapBounds::default();
        let mut tree = BbTree::new(true);

        for &key in &keys {
            let center = Vec2::new(fastrand::f64() * 100.0, fastrand::f64() * 100.0);
            bounds.bbs.insert(key, bb(center.x, center.y, 4.0));
        }
        for &key in &keys {
            tree.insert(key, bounds.bbs[&key]);
        }

        let found = collect_pairs(&mut tree, &bounds);
        let expected = brute_force_pairs(&bounds, &keys);

        // Every expected pair shows up exactly once.
        assert_eq!(found.len(), found.iter().collect::<BTreeSet<_>>().len());
        assert_eq!(found.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn cached_pairs_replay_after_small_moves() {
        fastrand::seed(11);

        let keys = keys(30);
        let mut bounds = MapBounds::default();
        let mut tree = BbTree::new(true);

        for &key in &keys {
            let center = Vec2::new(fastrand::f64() * 60.0, fastrand::f64() * 60.0);
            bounds.bbs.insert(key, bb(center.x, center.y, 3.0));
        }
        for &key in &keys {
            tree.insert(key, bounds.bbs[&key]);
        }

        let first: BTreeSet<_> = collect_pairs(&mut tree, &bounds).into_iter().collect();

        // Nothing moved: the cached pairs replay identically.
        let second: BTreeSet<_> = collect_pairs(&mut tree, &bounds).into_iter().collect();
        assert_eq!(first, second);

        // Tiny jitter stays inside the fattened leaf boxes but must still
        // match the brute force result.
        for bb in bounds.bbs.values_mut() {
            let jitter = Vec2::new(fastrand::f64() * 0.2 - 0.1, fastrand::f64() * 0.2 - 0.1);
            bb.min += jitter;
            bb.max += jitter;
        }
        let third: BTreeSet<_> = collect_pairs(&mut tree, &bounds).into_iter().collect();
        assert!(third.is_superset(&brute_force_pairs(&bounds, &keys)));
    }

    #[test]
    fn tracks_large_movement() {
        let keys = keys(2);
        let mut bounds = MapBounds::default();
        let mut tree = BbTree::new(true);

        bounds.bbs.insert(keys[0], bb(0.0, 0.0, 1.0));
        bounds.bbs.insert(keys[1], bb(50.0, 0.0, 1.0));
        tree.insert(keys[0], bounds.bbs[&keys[0]]);
        tree.insert(keys[1], bounds.bbs[&keys[1]]);

        assert!(collect_pairs(&mut tree, &bounds).is_empty());

        // Move the first box onto the second.
        bounds.bbs.insert(keys[0], bb(50.0, 0.5, 1.0));
        let found = collect_pairs(&mut tree, &bounds);
        assert_eq!(found.len(), 1);

        // And away again.
        bounds.bbs.insert(keys[0], bb(0.0, 0.0, 1.0));
        assert!(collect_pairs(&mut tree, &bounds).is_empty());
    }

    #[test]
    fn remove_clears_pairs() {
        let keys = keys(3);
        let mut bounds = MapBounds::default();
        let mut tree = BbTree::new(false);

        for (i, &key) in keys.iter().enumerate() {
            bounds.bbs.insert(key, bb(i as f64 * 0.5, 0.0, 1.0));
            tree.insert(key, bounds.bbs[&key]);
        }

        assert_eq!(collect_pairs(&mut tree, &bounds).len(), 3);

        tree.remove(keys[1]);
        assert_eq!(tree.len(), 2);

        let found = collect_pairs(&mut tree, &bounds);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], pair_id(keys[0], keys[2]));
    }

    #[test]
    fn segment_query_visits_near_leaves() {
        let keys = keys(3);
        let mut tree = BbTree::new(false);

        tree.insert(keys[0], bb(10.0, 0.0, 1.0));
        tree.insert(keys[1], bb(20.0, 0.0, 1.0));
        tree.insert(keys[2], bb(10.0, 50.0, 1.0));

        let mut visited = Vec::new();
        tree.segment_query(
            Vec2::new(0.0, 0.0),
            Vec2::new(30.0, 0.0),
            1.0,
            &mut |key| {
                visited.push(key);
                1.0
            },
        );

        assert!(visited.contains(&keys[0]));
        assert!(visited.contains(&keys[1]));
        assert!(!visited.contains(&keys[2]));

        // Stopping at the first hit prunes the farther leaf.
        let mut visited = Vec::new();
        tree.segment_query(
            Vec2::new(0.0, 0.0),
            Vec2::new(30.0, 0.0),
            1.0,
            &mut |key| {
                visited.push(key);
                0.1
            },
        );
        assert_eq!(visited.len(), 1);
    }

    #[test]
    fn query_reports_own_bb_overlaps() {
        let keys = keys(4);
        let mut tree = BbTree::new(false);

        tree.insert(keys[0], bb(0.0, 0.0, 2.0));
        tree.insert(keys[1], bb(1.0, 1.0, 2.0));
        tree.insert(keys[2], bb(3.5, 0.0, 2.0));
        tree.insert(keys[3], bb(20.0, 0.0, 2.0));

        let mut hits = Vec::new();
        tree.query(bb(0.0, 0.0, 2.0), &mut |key| hits.push(key));

        assert!(hits.contains(&keys[0]));
        assert!(hits.contains(&keys[1]));
        assert!(hits.contains(&keys[2]));
        assert!(!hits.contains(&keys[3]));
    }
}
