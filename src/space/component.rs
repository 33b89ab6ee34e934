//! Sleeping and the contact graph.
//!
//! Bodies connected through collisions and joints form components; when
//! every body of a component has idled long enough the whole group is taken
//! out of the simulation at once, and woken the same way.

use crate::{
    body::{BodyKey, BodyKind},
    space::Space,
};

impl Space {
    /// Wake a body and the whole component it sleeps in.
    ///
    /// Resets the body's idle timer either way. While the space is locked
    /// the wake-up is deferred to the end of the step.
    pub fn activate_body(&mut self, key: BodyKey) {
        if self.bodies[key].kind() == BodyKind::Static {
            return;
        }

        self.bodies[key].sleeping.idle_time = 0.0;

        let root = self.bodies[key].sleeping.root;
        self.activate_component(root);
    }

    /// Wake every body of a sleeping component.
    fn activate_component(&mut self, root: Option<BodyKey>) {
        let Some(root) = root else { return };
        if !self.bodies[root].is_sleeping() {
            return;
        }

        if self.locked > 0 {
            // The component is dismantled on unlock instead; remember the
            // root so nothing is lost.
            if !self.roused_bodies.contains(&root) {
                self.roused_bodies.push(root);
            }
            return;
        }

        let mut cursor = Some(root);
        while let Some(key) = cursor {
            let next = self.bodies[key].sleeping.next;

            let sleeping = &mut self.bodies[key].sleeping;
            sleeping.root = None;
            sleeping.next = None;
            sleeping.idle_time = 0.0;

            self.wake_body(key);
            cursor = next;
        }

        self.sleeping_components.retain(|&k| k != root);
    }

    /// Put one woken body back into the dynamic bookkeeping.
    fn wake_body(&mut self, key: BodyKey) {
        self.dynamic_bodies.push(key);

        for shape in self.bodies[key].shapes().to_vec() {
            let bb = self.shapes[shape].bb;
            self.static_index.remove(shape);
            self.dynamic_index.insert(shape, bb);
        }

        // Keep the cached contacts alive so the stack wakes up warm.
        let stamp = self.stamp;
        for pair in self.bodies[key].arbiters().to_vec() {
            if let Some(arb) = self.cached_arbiters.get_mut(&pair) {
                arb.stamp = stamp;
            }
        }
    }

    /// Put a single body to sleep as its own component.
    ///
    /// The body keeps its pose; it wakes on the first touch.
    pub fn sleep_body(&mut self, key: BodyKey) -> Result<(), crate::space::SpaceError> {
        self.ensure_unlocked()?;
        debug_assert!(
            self.bodies[key].kind() == BodyKind::Dynamic,
            "Only dynamic bodies can sleep"
        );

        if self.bodies[key].is_sleeping() {
            return Ok(());
        }

        self.cache_body_shapes(key);
        self.deactivate_body(key);

        let sleeping = &mut self.bodies[key].sleeping;
        sleeping.root = Some(key);
        sleeping.next = None;
        sleeping.idle_time = 0.0;

        self.sleeping_components.push(key);
        Ok(())
    }

    /// Put a body to sleep as part of an already sleeping group.
    ///
    /// Waking any member wakes the whole group.
    pub fn sleep_body_with_group(
        &mut self,
        key: BodyKey,
        group: BodyKey,
    ) -> Result<(), crate::space::SpaceError> {
        self.ensure_unlocked()?;
        debug_assert!(
            self.bodies[group].is_sleeping(),
            "The group body must already be sleeping"
        );

        if self.bodies[key].is_sleeping() {
            return Ok(());
        }

        self.cache_body_shapes(key);
        self.deactivate_body(key);

        let root = self.bodies[group].sleeping.root.expect("Sleeping body without root");
        let old_next = self.bodies[root].sleeping.next;

        let sleeping = &mut self.bodies[key].sleeping;
        sleeping.root = Some(root);
        sleeping.next = old_next;
        sleeping.idle_time = 0.0;

        self.bodies[root].sleeping.next = Some(key);
        Ok(())
    }

    fn cache_body_shapes(&mut self, key: BodyKey) {
        let iso = self.bodies[key].transform();
        for shape in self.bodies[key].shapes().to_vec() {
            self.shapes[shape].cache_bb(iso);
        }
    }

    /// Take one body out of the dynamic bookkeeping.
    fn deactivate_body(&mut self, key: BodyKey) {
        self.dynamic_bodies.retain(|&k| k != key);

        for shape in self.bodies[key].shapes().to_vec() {
            let bb = self.shapes[shape].bb;
            self.dynamic_index.remove(shape);
            self.static_index.insert(shape, bb);
        }
    }

    /// Rebuild the contact graph, and deactivate components that have idled
    /// past the sleep threshold when sleeping is enabled.
    pub(crate) fn process_components(&mut self, dt: f64) {
        let threshold = self.settings.sleep_time_threshold;
        let sleep_enabled = threshold != f64::INFINITY;
        let dv = self.settings.idle_speed_threshold;
        let dvsq = if dv != 0.0 {
            dv * dv
        } else {
            self.settings.gravity.magnitude_squared() * dt * dt
        };

        // Update idle timers, clear the arbiter threads and component
        // links of every awake body.
        for i in 0..self.dynamic_bodies.len() {
            let key = self.dynamic_bodies[i];
            let body = &mut self.bodies[key];

            if sleep_enabled {
                let ke_threshold = if dvsq != 0.0 { body.mass() * dvsq } else { 0.0 };
                body.sleeping.idle_time = if body.kinetic_energy() > ke_threshold {
                    0.0
                } else {
                    body.sleeping.idle_time + dt
                };
            }

            body.arbiters.clear();
            body.sleeping.next = None;
        }

        // Thread this step's arbiters onto their bodies, waking sleeping
        // bodies touched by awake or kinematic ones.
        for i in 0..self.arbiters.len() {
            let pair = self.arbiters[i];
            let Some(arb) = self.cached_arbiters.get(&pair) else {
                continue;
            };
            let (a, b) = (arb.body_a, arb.body_b);

            if self.bodies[a].is_sleeping()
                && matches!(self.bodies[b].kind(), BodyKind::Dynamic | BodyKind::Kinematic)
            {
                self.activate_body(a);
            }
            if self.bodies[b].is_sleeping()
                && matches!(self.bodies[a].kind(), BodyKind::Dynamic | BodyKind::Kinematic)
            {
                self.activate_body(b);
            }

            if self.bodies[a].kind() == BodyKind::Dynamic {
                self.bodies[a].arbiters.push(pair);
            }
            if self.bodies[b].kind() == BodyKind::Dynamic {
                self.bodies[b].arbiters.push(pair);
            }
        }

        // Joints bridging into a sleeping component wake it too.
        for i in 0..self.constraint_list.len() {
            let key = self.constraint_list[i];
            let (a, b) = self.constraints[key].bodies();

            if self.bodies[a].is_sleeping()
                && matches!(self.bodies[b].kind(), BodyKind::Dynamic | BodyKind::Kinematic)
                && !self.bodies[b].is_sleeping()
            {
                self.activate_body(a);
            }
            if self.bodies[b].is_sleeping()
                && matches!(self.bodies[a].kind(), BodyKind::Dynamic | BodyKind::Kinematic)
                && !self.bodies[a].is_sleeping()
            {
                self.activate_body(b);
            }
        }

        // Flood fill components and deactivate the ones that idled out.
        if !sleep_enabled {
            return;
        }

        let mut i = 0;
        while i < self.dynamic_bodies.len() {
            let key = self.dynamic_bodies[i];

            if self.bodies[key].sleeping.root.is_none() {
                self.flood_fill(key, key);

                if !self.component_active(key, threshold) {
                    self.sleeping_components.push(key);

                    let mut cursor = Some(key);
                    while let Some(member) = cursor {
                        self.deactivate_body(member);
                        cursor = self.bodies[member].sleeping.next;
                    }

                    // The current index now holds the next unprocessed body.
                    continue;
                }
            }

            // Only sleeping components keep their links.
            let body = &mut self.bodies[key];
            body.sleeping.root = None;
            body.sleeping.next = None;
            i += 1;
        }
    }

    /// Mark everything reachable over arbiters and constraints as one
    /// component.
    fn flood_fill(&mut self, root: BodyKey, key: BodyKey) {
        if self.bodies[key].kind() != BodyKind::Dynamic {
            return;
        }

        let other_root = self.bodies[key].sleeping.root;
        if let Some(other_root) = other_root {
            debug_assert_eq!(other_root, root, "Body is part of two components");
            return;
        }

        self.bodies[key].sleeping.root = Some(root);
        if key != root {
            let old_next = self.bodies[root].sleeping.next;
            self.bodies[key].sleeping.next = old_next;
            self.bodies[root].sleeping.next = Some(key);
        }

        for pair in self.bodies[key].arbiters().to_vec() {
            if let Some(arb) = self.cached_arbiters.get(&pair) {
                let (a, b) = (arb.body_a, arb.body_b);
                let other = if a == key { b } else { a };
                self.flood_fill(root, other);
            }
        }

        for ckey in self.bodies[key].constraints().to_vec() {
            let (a, b) = self.constraints[ckey].bodies();
            let other = if a == key { b } else { a };
            self.flood_fill(root, other);
        }
    }

    /// Whether any body of a component is still too lively to sleep.
    fn component_active(&self, root: BodyKey, threshold: f64) -> bool {
        let mut cursor = Some(root);
        while let Some(key) = cursor {
            if self.bodies[key].sleeping.idle_time < threshold {
                return true;
            }
            cursor = self.bodies[key].sleeping.next;
        }

        false
    }
}
