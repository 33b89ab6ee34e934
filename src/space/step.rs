//! The step driver, one tick of the simulation.

use std::mem;

use crate::{
    arbiter::{Arbiter, ArbiterState, PairKey},
    broad_phase::collide_static,
    collision::collide,
    math::aabr_intersects,
    shape::ShapeKey,
    space::{handler::CallbackSpace, Space, SpaceBounds},
};

impl Space {
    /// Advance the simulation by `dt` seconds.
    ///
    /// Fixed timesteps keep the solver's warm starting effective; prefer
    /// stepping a fixed `dt` several times over stepping a variable one
    /// once.
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            log::warn!("Ignoring a zero length step");
            return;
        }

        puffin::profile_scope!("Physics step");

        self.stamp += 1;
        self.prev_dt = self.curr_dt;
        self.curr_dt = dt;

        // Last step's pairs leave the contact graph; it's rebuilt from
        // scratch every step. Pairs frozen by sleeping stay threaded.
        let mut prev_arbiters = mem::take(&mut self.arbiters);
        for &pair in &prev_arbiters {
            if let Some(arb) = self.cached_arbiters.get_mut(&pair) {
                arb.state = ArbiterState::Normal;

                let (a, b) = (arb.body_a, arb.body_b);
                if !self.bodies[a].is_sleeping() && !self.bodies[b].is_sleeping() {
                    self.bodies[a].arbiters.retain(|&p| p != pair);
                    self.bodies[b].arbiters.retain(|&p| p != pair);
                }
            }
        }
        prev_arbiters.clear();
        self.arbiters = prev_arbiters;

        // Integrate positions.
        {
            puffin::profile_scope!("Integrate positions");

            for i in 0..self.dynamic_bodies.len() {
                let key = self.dynamic_bodies[i];
                let body = &mut self.bodies[key];
                let integrate = body.position_fn;
                integrate(body, dt);
            }
        }

        // Push the new poses into the shape caches.
        {
            puffin::profile_scope!("Cache shape data");

            for i in 0..self.dynamic_bodies.len() {
                let key = self.dynamic_bodies[i];
                let iso = self.bodies[key].transform();
                for &shape in &self.bodies[key].shapes {
                    self.shapes[shape].cache_bb(iso);
                }
            }
        }

        self.lock();

        // Broad phase: collect candidate pairs, dynamic against dynamic and
        // dynamic against static.
        {
            puffin::profile_scope!("Broad phase");

            let mut pairs = mem::take(&mut self.pair_buffer);
            pairs.clear();

            {
                let bounds = SpaceBounds {
                    shapes: &self.shapes,
                    bodies: &self.bodies,
                };
                self.dynamic_index
                    .reindex_query(&bounds, &mut |a, b| pairs.push((a, b)));
                collide_static(
                    self.dynamic_index.as_ref(),
                    self.static_index.as_ref(),
                    &bounds,
                    &mut |a, b| pairs.push((a, b)),
                );
            }

            // Narrow phase on every candidate.
            {
                puffin::profile_scope!("Narrow phase");

                for &(a, b) in &pairs {
                    self.collide_shapes(a, b);
                }
            }

            pairs.clear();
            self.pair_buffer = pairs;
        }

        // Fire begin on pairs colliding for the first time, then settle on
        // the list the solver works with.
        {
            let gravity = self.settings.gravity;

            for i in 0..self.arbiters.len() {
                let pair = self.arbiters[i];
                let arb = self.cached_arbiters.get_mut(&pair).expect("Pair vanished");
                if arb.state != ArbiterState::FirstCollision {
                    continue;
                }

                let types = (
                    self.shapes[arb.shape_a].collision_type,
                    self.shapes[arb.shape_b].collision_type,
                );
                let mut ctx = CallbackSpace {
                    bodies: &mut self.bodies,
                    shapes: &self.shapes,
                    gravity,
                    dt,
                    post_step: &mut self.post_step,
                    roused: &mut self.roused_bodies,
                };

                if !self.handlers.begin(types, arb, &mut ctx) {
                    arb.state = ArbiterState::Ignore;
                }
            }

            // Rejected pairs and sensors generate no impulses.
            let prev = mem::take(&mut self.arbiters);
            let mut kept = Vec::with_capacity(prev.len());
            for &pair in &prev {
                let arb = self.cached_arbiters.get_mut(&pair).expect("Pair vanished");
                if arb.state == ArbiterState::Ignore {
                    continue;
                }

                let sensor = self.shapes[arb.shape_a].sensor || self.shapes[arb.shape_b].sensor;
                if sensor {
                    // Sensors skip the solver and the post solve pass, their
                    // first collision ends here.
                    if arb.state == ArbiterState::FirstCollision {
                        arb.state = ArbiterState::Normal;
                    }
                    continue;
                }

                kept.push(pair);
            }
            self.arbiters = kept;
        }

        self.unlock(false);

        // Contact graph threading, idle accounting and deactivation.
        {
            puffin::profile_scope!("Process components");

            self.process_components(dt);
        }

        self.lock();

        // Expire collision pairs that stopped touching.
        self.filter_cached_arbiters();

        // Pre solve callbacks decide what actually gets solved this step.
        {
            let gravity = self.settings.gravity;

            let prev_list = mem::take(&mut self.arbiters);
            let mut solve_list = Vec::with_capacity(prev_list.len());

            for &pair in &prev_list {
                let arb = self.cached_arbiters.get_mut(&pair).expect("Pair vanished");
                let types = (
                    self.shapes[arb.shape_a].collision_type,
                    self.shapes[arb.shape_b].collision_type,
                );
                let mut ctx = CallbackSpace {
                    bodies: &mut self.bodies,
                    shapes: &self.shapes,
                    gravity,
                    dt,
                    post_step: &mut self.post_step,
                    roused: &mut self.roused_bodies,
                };

                if self.handlers.pre_solve(types, arb, &mut ctx) {
                    solve_list.push(pair);
                } else if arb.state == ArbiterState::FirstCollision {
                    // No post solve pass will move it on.
                    arb.state = ArbiterState::Normal;
                }
            }

            self.arbiters = solve_list;
        }

        // Per step solver constants.
        {
            puffin::profile_scope!("Pre step");

            let slop = self.settings.collision_slop;
            let bias_coef = 1.0 - self.settings.collision_bias.powf(dt);

            for i in 0..self.arbiters.len() {
                let pair = self.arbiters[i];
                let arb = self.cached_arbiters.get_mut(&pair).expect("Pair vanished");
                let a = &self.bodies[arb.body_a];
                let b = &self.bodies[arb.body_b];
                arb.pre_step(a, b, dt, slop, bias_coef);
            }

            for i in 0..self.constraint_list.len() {
                let key = self.constraint_list[i];
                let (a_key, b_key) = self.constraints[key].bodies();
                if self.constraint_asleep(a_key, b_key) {
                    continue;
                }

                let constraint = &mut self.constraints[key];
                let [a, b] = self
                    .bodies
                    .get_disjoint_mut([a_key, b_key])
                    .expect("Constraint bodies overlap");

                if let Some(f) = constraint.pre_solve {
                    f(constraint, a, b);
                }
                constraint.pre_step(a, b, dt);
            }
        }

        // Integrate velocities.
        {
            puffin::profile_scope!("Integrate velocities");

            let damping = self.settings.damping.powf(dt);
            let gravity = self.settings.gravity;

            for i in 0..self.dynamic_bodies.len() {
                let key = self.dynamic_bodies[i];
                let body = &mut self.bodies[key];
                let integrate = body.velocity_fn;
                integrate(body, gravity, damping, dt);
            }
        }

        // Warm start from the impulses of the previous step.
        {
            let dt_coef = if self.prev_dt == 0.0 { 0.0 } else { dt / self.prev_dt };

            for i in 0..self.arbiters.len() {
                let pair = self.arbiters[i];
                let arb = self.cached_arbiters.get_mut(&pair).expect("Pair vanished");
                let [a, b] = self
                    .bodies
                    .get_disjoint_mut([arb.body_a, arb.body_b])
                    .expect("Arbiter bodies overlap");
                arb.apply_cached_impulse(a, b, dt_coef);
            }

            for i in 0..self.constraint_list.len() {
                let key = self.constraint_list[i];
                let (a_key, b_key) = self.constraints[key].bodies();
                if self.constraint_asleep(a_key, b_key) {
                    continue;
                }

                let constraint = &mut self.constraints[key];
                let [a, b] = self
                    .bodies
                    .get_disjoint_mut([a_key, b_key])
                    .expect("Constraint bodies overlap");
                constraint.apply_cached_impulse(a, b, dt_coef);
            }
        }

        // The solver itself, sequential impulses until the iterations run
        // out.
        {
            puffin::profile_scope!("Solve velocities");

            for _ in 0..self.settings.iterations {
                for i in 0..self.arbiters.len() {
                    let pair = self.arbiters[i];
                    let arb = self.cached_arbiters.get_mut(&pair).expect("Pair vanished");
                    let [a, b] = self
                        .bodies
                        .get_disjoint_mut([arb.body_a, arb.body_b])
                        .expect("Arbiter bodies overlap");
                    arb.apply_impulse(a, b);
                }

                for i in 0..self.constraint_list.len() {
                    let key = self.constraint_list[i];
                    let (a_key, b_key) = self.constraints[key].bodies();
                    if self.constraint_asleep(a_key, b_key) {
                        continue;
                    }

                    let constraint = &mut self.constraints[key];
                    let [a, b] = self
                        .bodies
                        .get_disjoint_mut([a_key, b_key])
                        .expect("Constraint bodies overlap");
                    constraint.apply_impulse(a, b, dt);
                }
            }
        }

        // Post solve callbacks see the applied impulses.
        {
            let gravity = self.settings.gravity;

            for i in 0..self.arbiters.len() {
                let pair = self.arbiters[i];
                let arb = self.cached_arbiters.get_mut(&pair).expect("Pair vanished");
                let types = (
                    self.shapes[arb.shape_a].collision_type,
                    self.shapes[arb.shape_b].collision_type,
                );
                let mut ctx = CallbackSpace {
                    bodies: &mut self.bodies,
                    shapes: &self.shapes,
                    gravity,
                    dt,
                    post_step: &mut self.post_step,
                    roused: &mut self.roused_bodies,
                };
                self.handlers.post_solve(types, arb, &mut ctx);
            }

            for i in 0..self.constraint_list.len() {
                let key = self.constraint_list[i];
                let (a_key, b_key) = self.constraints[key].bodies();
                if self.constraint_asleep(a_key, b_key) {
                    continue;
                }

                let constraint = &mut self.constraints[key];
                if let Some(f) = constraint.post_solve {
                    let [a, b] = self
                        .bodies
                        .get_disjoint_mut([a_key, b_key])
                        .expect("Constraint bodies overlap");
                    f(constraint, a, b);
                }
            }
        }

        // Unlock and drain the deferred work.
        self.unlock(true);
    }

    /// Whether a constraint bridges only sleeping or immovable bodies.
    fn constraint_asleep(&self, a: crate::body::BodyKey, b: crate::body::BodyKey) -> bool {
        let inactive = |key: crate::body::BodyKey| {
            let body = &self.bodies[key];
            body.is_sleeping() || body.kind() == crate::body::BodyKind::Static
        };

        inactive(a) && inactive(b)
    }

    /// Narrow phase and arbiter upkeep for one candidate pair.
    fn collide_shapes(&mut self, a: ShapeKey, b: ShapeKey) {
        let sa = &self.shapes[a];
        let sb = &self.shapes[b];

        // Cheap rejections first.
        if sa.body == sb.body {
            return;
        }
        if !aabr_intersects(sa.bb, sb.bb) {
            return;
        }
        if sa.filter.reject(&sb.filter) {
            return;
        }

        // Joined bodies can opt out of colliding with each other.
        for &ckey in &self.bodies[sa.body].constraints {
            let constraint = &self.constraints[ckey];
            if !constraint.collide_bodies() {
                let joined = constraint.bodies();
                if joined == (sa.body, sb.body) || joined == (sb.body, sa.body) {
                    return;
                }
            }
        }

        // The collision table expects circle before segment before polygon.
        let (a, b) = if sa.kind.table_index() > sb.kind.table_index() {
            (b, a)
        } else {
            (a, b)
        };
        let sa = &self.shapes[a];
        let sb = &self.shapes[b];

        let info = collide(sa, sb);
        if !info.colliding() {
            return;
        }

        // This is where the persistent contact magic happens: the pair is
        // matched up with its history in the cache.
        let pair = PairKey::new(a, b);
        let arb = self
            .cached_arbiters
            .entry(pair)
            .or_insert_with(|| Arbiter::new(a, b, sa.body, sb.body));

        // The dispatch swap can differ from the cached order.
        arb.shape_a = a;
        arb.shape_b = b;
        arb.body_a = sa.body;
        arb.body_b = sb.body;

        arb.update(&info, sa, sb);
        arb.stamp = self.stamp;

        let ignored = arb.state == ArbiterState::Ignore;
        if !ignored {
            self.arbiters.push(pair);
        }
    }

    /// Advance unseen arbiters toward expiry, firing separate once when a
    /// pair stops touching and dropping it after the persistence window.
    fn filter_cached_arbiters(&mut self) {
        let stamp = self.stamp;
        let persistence = self.settings.collision_persistence;
        let gravity = self.settings.gravity;
        let dt = self.curr_dt;

        let mut pairs: Vec<PairKey> = self.cached_arbiters.keys().copied().collect();
        pairs.sort_by_key(PairKey::order_key);

        for pair in pairs {
            let arb = self.cached_arbiters.get_mut(&pair).expect("Pair vanished");
            let (body_a, body_b) = (arb.body_a, arb.body_b);

            // Pairs inside a sleeping pile idle untouched, their warm start
            // data wakes up with them.
            let inactive = |key| {
                let body: &crate::body::Body = &self.bodies[key];
                body.is_sleeping() || body.kind() == crate::body::BodyKind::Static
            };
            if inactive(body_a) && inactive(body_b) {
                continue;
            }

            let ticks = stamp - arb.stamp;

            // Not seen this step: the collision just ended.
            if ticks >= 1 && arb.state != ArbiterState::Cached {
                let types = (
                    self.shapes[arb.shape_a].collision_type,
                    self.shapes[arb.shape_b].collision_type,
                );
                arb.state = ArbiterState::Cached;

                let mut ctx = CallbackSpace {
                    bodies: &mut self.bodies,
                    shapes: &self.shapes,
                    gravity,
                    dt,
                    post_step: &mut self.post_step,
                    roused: &mut self.roused_bodies,
                };
                self.handlers.separate(types, arb, &mut ctx);
            }

            if ticks >= persistence {
                self.bodies[body_a].arbiters.retain(|&p| p != pair);
                self.bodies[body_b].arbiters.retain(|&p| p != pair);
                self.cached_arbiters.remove(&pair);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use approx::assert_relative_eq;
    use vek::Vec2;

    use crate::{
        body::{Body, BodyKey},
        constraint::Constraint,
        math::moment_for_circle,
        shape::Shape,
        space::{CollisionHandler, SpaceSettings},
    };

    use super::*;

    const DT: f64 = 1.0 / 60.0;

    fn space_with_gravity() -> Space {
        Space::with_settings(SpaceSettings {
            gravity: Vec2::new(0.0, -100.0),
            ..SpaceSettings::default()
        })
    }

    fn add_ball(space: &mut Space, pos: Vec2<f64>, radius: f64, mass: f64) -> (BodyKey, ShapeKey) {
        let mut body = Body::new(mass, moment_for_circle(mass, 0.0, radius, Vec2::zero()));
        body.set_position(pos);
        let body = space.add_body(body).unwrap();
        let shape = space.add_shape(Shape::circle(body, radius, Vec2::zero())).unwrap();

        (body, shape)
    }

    fn add_floor(space: &mut Space, a: Vec2<f64>, b: Vec2<f64>) -> ShapeKey {
        let ground = space.static_body();
        space.add_shape(Shape::segment(ground, a, b, 0.0)).unwrap()
    }

    #[test]
    fn circle_stack_settles() {
        let mut space = space_with_gravity();
        add_floor(&mut space, Vec2::new(-320.0, -240.0), Vec2::new(320.0, -240.0));

        let balls: Vec<BodyKey> = (0..5)
            .map(|i| add_ball(&mut space, Vec2::new(0.0, i as f64 * 32.0), 15.0, 1.0).0)
            .collect();

        for _ in 0..300 {
            space.step(DT);
        }

        let bottom = space.body(balls[0]).position().y;
        assert!(
            (bottom - (-225.0)).abs() < 0.5,
            "Bottom ball rests at {bottom}, expected -225"
        );

        let top = space.body(balls[4]).position().y;
        assert!(
            (top - (bottom + 120.0)).abs() < 1.0,
            "Top ball rests at {top}, expected {}",
            bottom + 120.0
        );

        // Everything has come to rest.
        for &ball in &balls {
            assert!(space.body(ball).velocity().magnitude() < 0.5);
        }
    }

    #[test]
    fn resting_contact_carries_the_weight() {
        let mut space = space_with_gravity();
        let floor = add_floor(&mut space, Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0));
        let (_ball, shape) = add_ball(&mut space, Vec2::new(0.0, 10.0), 10.0, 1.0);

        for _ in 0..30 {
            space.step(DT);
        }

        let arb = space
            .arbiter(PairKey::new(shape, floor))
            .expect("Ball should rest on the floor");

        // At rest the accumulated impulse balances gravity.
        let jn = arb.total_impulse().magnitude();
        assert_relative_eq!(jn / DT, 100.0, max_relative = 0.01);
    }

    #[test]
    fn pin_joint_conserves_radius() {
        let mut space = Space::new();

        let mut body = Body::new(1.0, moment_for_circle(1.0, 0.0, 10.0, Vec2::zero()));
        body.set_position(Vec2::new(100.0, 0.0));
        body.set_velocity(Vec2::new(0.0, 100.0));
        let body = space.add_body(body).unwrap();

        let anchor = space.static_body();
        let pin = Constraint::pin(
            anchor,
            body,
            space.body(anchor),
            space.body(body),
            Vec2::zero(),
            Vec2::zero(),
        );
        space.add_constraint(pin).unwrap();

        for _ in 0..60 {
            space.step(DT);
        }

        let radius = space.body(body).position().magnitude();
        assert!(
            (99.5..=100.5).contains(&radius),
            "Orbit radius drifted to {radius}"
        );
    }

    #[test]
    fn perfect_restitution_returns_to_drop_height() {
        let mut space = space_with_gravity();

        let floor = add_floor(&mut space, Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0));
        space.shape_mut(floor).set_elasticity(1.0);

        let (ball, shape) = add_ball(&mut space, Vec2::new(0.0, 110.0), 10.0, 1.0);
        space.shape_mut(shape).set_elasticity(1.0);

        // Track the apex after the first bounce.
        let mut bounced = false;
        let mut peak = f64::NEG_INFINITY;
        for _ in 0..240 {
            space.step(DT);

            let body = space.body(ball);
            if body.velocity().y > 0.0 {
                bounced = true;
            }
            if bounced {
                peak = peak.max(body.position().y);
            }
        }

        assert!(bounced, "The ball never bounced");
        // Drop height of 100 above the resting position, at least 99
        // regained.
        assert!(peak - 10.0 >= 99.0, "Bounce only reached {peak}");
    }

    #[test]
    fn friction_stops_a_sliding_box() {
        let mut space = space_with_gravity();

        let floor = add_floor(&mut space, Vec2::new(-200.0, 0.0), Vec2::new(200.0, 0.0));
        space.shape_mut(floor).set_friction(0.7);

        let mut body = Body::new(1.0, crate::math::moment_for_box(1.0, 10.0, 10.0));
        body.set_position(Vec2::new(-100.0, 5.0));
        let body = space.add_body(body).unwrap();
        let shape = space.add_shape(Shape::box_shape(body, 10.0, 10.0, 0.0)).unwrap();
        space.shape_mut(shape).set_friction(0.7);

        // Let it settle onto the floor, then shove it.
        for _ in 0..10 {
            space.step(DT);
        }
        space
            .body_mut(body)
            .apply_impulse_at_world_point(Vec2::new(50.0, 0.0), Vec2::new(-100.0, 5.0));

        let mut stopped_after = f64::INFINITY;
        for i in 0..90 {
            space.step(DT);
            if space.body(body).velocity().x.abs() <= 0.1 {
                stopped_after = i as f64 * DT;
                break;
            }
        }

        assert!(
            stopped_after <= 1.0,
            "Box still sliding after {stopped_after} seconds"
        );
    }

    #[test]
    fn idle_bodies_fall_asleep() {
        let mut space = Space::with_settings(SpaceSettings {
            gravity: Vec2::new(0.0, -100.0),
            sleep_time_threshold: 0.5,
            ..SpaceSettings::default()
        });

        add_floor(&mut space, Vec2::new(-200.0, 0.0), Vec2::new(200.0, 0.0));

        let boxes: Vec<BodyKey> = (0..8)
            .map(|i| {
                let mut body = Body::new(1.0, crate::math::moment_for_box(1.0, 10.0, 10.0));
                body.set_position(Vec2::new(i as f64 * 20.0 - 70.0, 8.0));
                let body = space.add_body(body).unwrap();
                space.add_shape(Shape::box_shape(body, 10.0, 10.0, 0.0)).unwrap();
                body
            })
            .collect();

        for _ in 0..600 {
            space.step(DT);
        }

        for &key in &boxes {
            assert!(space.body(key).is_sleeping(), "A box is still awake");
        }
        // Sleeping bodies leave the dynamic set entirely, the per step cost
        // collapses with them.
        assert!(space.dynamic_bodies.is_empty());

        // Dropping something on the pile wakes it again.
        let (_ball, _) = add_ball(&mut space, Vec2::new(-70.0, 60.0), 8.0, 1.0);
        for _ in 0..60 {
            space.step(DT);
        }
        assert!(!space.body(boxes[0]).is_sleeping(), "The pile never woke up");
    }

    #[test]
    fn one_way_platform() {
        let mut space = space_with_gravity();

        let platform = add_floor(&mut space, Vec2::new(-50.0, -100.0), Vec2::new(50.0, -100.0));
        space.shape_mut(platform).set_collision_type(1);

        let (ball, shape) = add_ball(&mut space, Vec2::new(0.0, -200.0), 10.0, 1.0);
        space.shape_mut(shape).set_collision_type(2);
        space.body_mut(ball).set_velocity(Vec2::new(0.0, 170.0));

        // Let the ball pass while it moves up through the platform: the
        // pair is ordered circle first, so the normal points from the ball
        // toward the platform.
        space.add_collision_handler(
            1,
            2,
            CollisionHandler {
                pre_solve: Some(Box::new(|arb, _ctx| arb.normal().y <= 0.0)),
                ..CollisionHandler::default()
            },
        );

        let mut crossed = false;
        for _ in 0..300 {
            space.step(DT);

            let y = space.body(ball).position().y;
            if y > -100.0 {
                crossed = true;
            }
            if crossed {
                // Once above, the platform must hold the ball.
                assert!(y > -100.0, "The ball fell back through the platform");
            }
        }

        assert!(crossed, "The ball never made it through the platform");
        // Resting on top of the platform.
        let y = space.body(ball).position().y;
        assert!((y - (-90.0)).abs() < 1.0, "Ball rests at {y}");
    }

    #[test]
    fn collision_lifecycle_callbacks_fire_in_order() {
        #[derive(Default)]
        struct Log {
            events: Vec<&'static str>,
        }

        let log = Rc::new(RefCell::new(Log::default()));

        let mut space = space_with_gravity();
        let floor = add_floor(&mut space, Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0));
        space.shape_mut(floor).set_collision_type(1);

        let (ball, shape) = add_ball(&mut space, Vec2::new(0.0, 30.0), 10.0, 1.0);
        space.shape_mut(shape).set_collision_type(2);

        let handler = {
            let begin = log.clone();
            let pre = log.clone();
            let post = log.clone();
            let separate = log.clone();

            CollisionHandler {
                begin: Some(Box::new(move |_arb, _ctx| {
                    begin.borrow_mut().events.push("begin");
                    true
                })),
                pre_solve: Some(Box::new(move |_arb, _ctx| {
                    pre.borrow_mut().events.push("pre_solve");
                    true
                })),
                post_solve: Some(Box::new(move |_arb, _ctx| {
                    post.borrow_mut().events.push("post_solve");
                })),
                separate: Some(Box::new(move |_arb, _ctx| {
                    separate.borrow_mut().events.push("separate");
                })),
            }
        };
        space.add_collision_handler(1, 2, handler);

        // Fall, touch, get launched away again.
        for i in 0..240 {
            space.step(DT);

            if space.arbiter(PairKey::new(shape, floor)).is_some() && i % 30 == 29 {
                // Fling the ball up so the pair separates.
                space.body_mut(ball).set_velocity(Vec2::new(0.0, 120.0));
            }
        }

        let events = log.borrow().events.clone();
        assert!(events.contains(&"begin"));
        assert!(events.contains(&"pre_solve"));
        assert!(events.contains(&"post_solve"));
        assert!(events.contains(&"separate"));

        // begin comes first, post_solve never precedes pre_solve, and
        // separate only shows up after a begin.
        assert_eq!(events[0], "begin");
        let first_post = events.iter().position(|&e| e == "post_solve").unwrap();
        let first_pre = events.iter().position(|&e| e == "pre_solve").unwrap();
        assert!(first_pre < first_post);
    }

    #[test]
    fn begin_rejection_ignores_the_pair_until_separation() {
        let begin_count = Rc::new(RefCell::new(0));

        let mut space = space_with_gravity();
        let floor = add_floor(&mut space, Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0));
        space.shape_mut(floor).set_collision_type(1);

        let (ball, shape) = add_ball(&mut space, Vec2::new(0.0, 15.0), 10.0, 1.0);
        space.shape_mut(shape).set_collision_type(2);

        let counter = begin_count.clone();
        space.add_collision_handler(
            1,
            2,
            CollisionHandler {
                begin: Some(Box::new(move |_arb, _ctx| {
                    *counter.borrow_mut() += 1;
                    false
                })),
                ..CollisionHandler::default()
            },
        );

        for _ in 0..120 {
            space.step(DT);
        }

        // The ball passed straight through the rejected floor.
        assert!(space.body(ball).position().y < 0.0);
        // And begin only fired for the first contact, not every step.
        assert_eq!(*begin_count.borrow(), 1);
    }

    #[test]
    fn post_step_callbacks_run_once_after_the_step() {
        let mut space = space_with_gravity();
        let floor = add_floor(&mut space, Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0));
        space.shape_mut(floor).set_collision_type(1);

        let (_ball, shape) = add_ball(&mut space, Vec2::new(0.0, 12.0), 10.0, 1.0);
        space.shape_mut(shape).set_collision_type(2);

        space.add_collision_handler(
            1,
            2,
            CollisionHandler {
                pre_solve: Some(Box::new(move |arb, ctx| {
                    // Remove the ball the moment it touches; the mutation
                    // must wait until the step is over.
                    let (ball_shape, _) = arb.shapes();
                    ctx.add_post_step_callback(7, move |space| {
                        let _ = space.remove_shape(ball_shape);
                    });
                    true
                })),
                ..CollisionHandler::default()
            },
        );

        for _ in 0..30 {
            space.step(DT);
        }

        assert!(!space.contains_shape(shape));
    }

    #[test]
    fn warm_started_contacts_keep_their_hashes() {
        let mut space = space_with_gravity();
        add_floor(&mut space, Vec2::new(-100.0, 0.0), Vec2::new(100.0, 0.0));

        let mut body = Body::new(1.0, crate::math::moment_for_box(1.0, 20.0, 20.0));
        body.set_position(Vec2::new(0.0, 10.0));
        let body = space.add_body(body).unwrap();
        space.add_shape(Shape::box_shape(body, 20.0, 20.0, 0.0)).unwrap();

        for _ in 0..60 {
            space.step(DT);
        }

        // A resting box keeps a warm, fully matched contact pair.
        let arb_pair = space.arbiters.first().copied().expect("No resting contact");
        let arb = space.arbiter(arb_pair).unwrap();
        assert_eq!(arb.contact_count(), 2);
        assert!(arb.total_impulse().magnitude() > 0.0);
    }
}
