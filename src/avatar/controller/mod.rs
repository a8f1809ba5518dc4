//! Per-avatar physical controller.
//!
//! Owns the avatar's [`ControllerState`] and the bound [`MovementStrategy`], and runs
//! the per-step pipeline around the backend step:
//!
//! 1. [`PhysicalController::apply`] reconciles deferred enable/kinematic requests,
//!    converts the requested velocity into the controller frame and lets the strategy
//!    move the proxy.
//! 2. The backend steps.
//! 3. [`PhysicalController::update`] reads the resolved position back, derives the
//!    achieved velocity and returns the corrected transform.
//! 4. [`PhysicalController::post_step`] consumes one-frame latches.

pub mod correction;
pub mod false_ground;
mod state;

pub use correction::CorrectionMessage;
pub use state::ControllerState;
use state::PendingChanges;

use tracing::{debug, info};

use super::animation::RootMotion;
use super::math::{self, transform_from, Point, Quat, Transform, Vec3};
use super::panic_reporting::WarnLimiter;
use super::physics::{CollisionBackend, ObjectId};
use super::scene::SceneGraph;
use super::strategy::{MovementStrategy, StepEnv, StrategyKind, SwimmingStrategy, WalkingStrategy};
use crate::config::PhysicsConfig;
use crate::error::{LocomotionError, Result};

#[derive(Debug)]
pub struct PhysicalController {
    avatar: ObjectId,
    state: ControllerState,
    strategy: Option<MovementStrategy>,
    pending: PendingChanges,
    /// Whether the backend proxy currently participates in collision
    proxy_active: bool,
    radius: f32,
    height: f32,
    last_global: Transform,
    prev_subworld_w2l: Transform,
    warnings: WarnLimiter,
}

impl PhysicalController {
    /// Creates the controller and registers its capsule with `backend`.
    pub fn spawn(
        avatar: ObjectId,
        world_transform: Transform,
        config: &PhysicsConfig,
        backend: &mut dyn CollisionBackend,
    ) -> Self {
        let feet = Point::from(world_transform.translation.vector);
        backend.add_avatar_proxy(avatar, feet, config.capsule_radius, config.capsule_height);
        debug!(avatar = %avatar, ?feet, "spawned controller");
        Self {
            avatar,
            state: ControllerState::new(feet, world_transform.rotation),
            strategy: None,
            pending: PendingChanges::default(),
            proxy_active: true,
            radius: config.capsule_radius,
            height: config.capsule_height,
            last_global: world_transform,
            prev_subworld_w2l: Transform::identity(),
            warnings: WarnLimiter::default(),
        }
    }

    pub fn despawn(self, backend: &mut dyn CollisionBackend) {
        backend.remove_avatar_proxy(self.avatar);
    }

    pub fn avatar(&self) -> ObjectId {
        self.avatar
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut ControllerState {
        &mut self.state
    }

    /// Binds `strategy`, returning the one it replaces.
    pub fn bind_strategy(&mut self, strategy: MovementStrategy) -> Option<MovementStrategy> {
        info!(
            avatar = %self.avatar,
            from = ?self.strategy.as_ref().map(|s| s.kind()),
            to = %strategy.kind(),
            "rebinding movement strategy"
        );
        let mut previous = self.strategy.replace(strategy);
        // The outgoing strategy's per-frame flags must not leak into the new one
        self.state.clear_contact_normals();
        if let Some(old) = previous.as_mut() {
            old.motion_mut().set_turn_strength(0.0);
        }
        previous
    }

    pub fn take_strategy(&mut self) -> Option<MovementStrategy> {
        self.strategy.take()
    }

    pub fn strategy(&self) -> Option<&MovementStrategy> {
        self.strategy.as_ref()
    }

    pub fn strategy_mut(&mut self) -> Option<&mut MovementStrategy> {
        self.strategy.as_mut()
    }

    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        self.strategy.as_ref().map(|s| s.kind())
    }

    pub fn walking(&self) -> Option<&WalkingStrategy> {
        self.strategy.as_ref().and_then(|s| s.walking())
    }

    pub fn walking_mut(&mut self) -> Option<&mut WalkingStrategy> {
        self.strategy.as_mut().and_then(|s| s.walking_mut())
    }

    pub fn swimming(&self) -> Option<&SwimmingStrategy> {
        self.strategy.as_ref().and_then(|s| s.swimming())
    }

    pub fn swimming_mut(&mut self) -> Option<&mut SwimmingStrategy> {
        self.strategy.as_mut().and_then(|s| s.swimming_mut())
    }

    pub fn is_on_ground(&self) -> bool {
        self.strategy.as_ref().is_some_and(|s| s.is_on_ground())
    }

    pub fn is_on_false_ground(&self) -> bool {
        self.strategy.as_ref().is_some_and(|s| s.is_on_false_ground())
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn is_kinematic(&self) -> bool {
        self.state.kinematic
    }

    pub fn position(&self) -> Point {
        self.state.position
    }

    pub fn rotation(&self) -> Quat {
        self.state.rotation
    }

    pub fn heading(&self) -> f32 {
        math::heading(&self.state.rotation)
    }

    pub fn achieved_linear_velocity(&self) -> Vec3 {
        self.state.achieved_linear_velocity()
    }

    pub fn subworld(&self) -> Option<ObjectId> {
        self.state.subworld
    }

    /// Last composed world transform of the avatar.
    pub fn global_transform(&self) -> Transform {
        self.last_global
    }

    pub fn world_position(&self) -> Point {
        Point::from(self.last_global.translation.vector)
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn set_seeking(&mut self, seeking: bool) {
        self.state.seeking = seeking;
    }

    pub fn set_turn_strength(&mut self, strength: f32) {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.motion_mut().set_turn_strength(strength);
        }
    }

    pub fn increment_angle(&mut self, delta: f32) {
        self.state.increment_angle(delta);
    }

    /// Recomputes requested velocity from root motion for the coming step.
    pub fn recalc_velocity(&mut self, motion: RootMotion, dt: f32) {
        let Self { state, strategy, .. } = self;
        if let Some(strategy) = strategy.as_mut() {
            strategy.recalc_velocity(state, motion, dt);
        }
    }

    /// Resets the bound strategy's per-frame state; `new_age` also drops history.
    pub fn reset_strategy(&mut self, new_age: bool) {
        let Self { state, strategy, .. } = self;
        if let Some(strategy) = strategy.as_mut() {
            strategy.reset(state, new_age);
        }
    }

    /// Disabling takes effect now. Enabling waits for the next `apply`.
    pub fn enable(&mut self, on: bool, backend: &mut dyn CollisionBackend) {
        if on {
            if !self.state.enabled {
                self.pending.enable = true;
            }
        } else {
            self.pending.enable = false;
            if self.state.enabled {
                debug!(avatar = %self.avatar, "disabling physics");
            }
            self.state.enabled = false;
            self.sync_proxy(backend, false);
        }
    }

    /// Becoming kinematic takes effect now. Leaving waits for the next `apply`.
    pub fn set_kinematic(&mut self, on: bool, backend: &mut dyn CollisionBackend) {
        if on {
            self.pending.leave_kinematic = false;
            self.state.kinematic = true;
            self.sync_proxy(backend, false);
        } else if self.state.kinematic {
            self.pending.leave_kinematic = true;
        }
    }

    /// Applies deferred enable/kinematic requests, each exactly once.
    pub fn check_and_handle_any_state_changes(&mut self, backend: &mut dyn CollisionBackend) {
        if !self.pending.any() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        if pending.enable {
            self.state.enabled = true;
        }
        if pending.leave_kinematic {
            self.state.kinematic = false;
        }
        if self.is_simulating() {
            self.sync_proxy(backend, pending.kinematic_enable_next_update);
        }
        debug!(
            avatar = %self.avatar,
            enabled = self.state.enabled,
            kinematic = self.state.kinematic,
            "reconciled controller state"
        );
    }

    fn is_simulating(&self) -> bool {
        self.state.enabled && !self.state.kinematic
    }

    fn sync_proxy(&mut self, backend: &mut dyn CollisionBackend, force: bool) {
        let want = self.is_simulating();
        if force || want != self.proxy_active {
            backend.set_proxy_enabled(self.avatar, want);
            self.proxy_active = want;
        }
    }

    fn subworld_frame(&mut self, scene: &dyn SceneGraph) -> Transform {
        match self.state.subworld {
            None => Transform::identity(),
            Some(subworld) => match scene.local_to_world(subworld) {
                Some(l2w) => l2w,
                None => {
                    self.warnings
                        .warn_once(self.avatar, "subworld missing from scene; using world frame");
                    Transform::identity()
                }
            },
        }
    }

    pub fn apply(
        &mut self,
        dt: f32,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) -> Result<()> {
        self.check_and_handle_any_state_changes(backend);
        if self.strategy.is_none() {
            debug_assert!(false, "apply with no movement strategy bound");
            return Err(LocomotionError::NoStrategyBound(self.avatar));
        }
        self.state.sim_length = dt;
        if !self.is_simulating() {
            return Ok(());
        }

        if math::sanitize(&mut self.state.linear_velocity) {
            self.warnings.warn_once(self.avatar, "non-finite linear velocity zeroed");
        }
        // Avatar-local to controller frame. The stored rotation is already
        // subworld-relative, so this also removes the subworld's rotation.
        self.state.linear_velocity = self.state.rotation * self.state.linear_velocity;

        let frame = self.subworld_frame(scene);
        if self.state.subworld.is_some() {
            // The subworld may have moved since the last step; keep the proxy glued to it
            backend.set_proxy_position(self.avatar, frame * self.state.position);
        }

        let Self {
            avatar,
            state,
            strategy,
            radius,
            height,
            ..
        } = self;
        let strategy = strategy
            .as_mut()
            .ok_or(LocomotionError::NoStrategyBound(*avatar))?;
        let mut env = StepEnv::new(backend, *avatar, frame, dt, *radius, *height);
        strategy.apply(state, &mut env);
        Ok(())
    }

    /// Reads back the resolved position and returns the corrected transform.
    pub fn update(
        &mut self,
        dt: f32,
        backend: &dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) -> Result<CorrectionMessage> {
        if self.strategy.is_none() {
            debug_assert!(false, "update with no movement strategy bound");
            return Err(LocomotionError::NoStrategyBound(self.avatar));
        }
        let frame = self.subworld_frame(scene);

        if self.is_simulating() {
            let world_feet = backend
                .proxy_position(self.avatar)
                .ok_or(LocomotionError::MissingProxy(self.avatar))?;
            let local = frame.inverse_transform_point(&world_feet);
            if !math::is_finite(&local.coords) {
                self.warnings.warn_once(self.avatar, "non-finite proxy position ignored");
                return Err(LocomotionError::NonFiniteState {
                    avatar: self.avatar,
                    what: "position",
                });
            }
            let sim_length = self.state.sim_length;
            self.state.commit_position(local, sim_length);
            self.last_global = frame * transform_from(self.state.position, self.state.rotation);
            self.prev_subworld_w2l = frame.inverse();

            let Self { state, strategy, .. } = self;
            if let Some(strategy) = strategy.as_mut() {
                strategy.update(state, dt);
            }
        } else {
            self.state.override_achieved_linear_velocity(Vec3::zeros());
            self.state.linear_velocity = Vec3::zeros();
            if self.state.subworld.is_some() {
                // Carry a parked avatar along with its subworld
                self.last_global = frame * (self.prev_subworld_w2l * self.last_global);
                self.prev_subworld_w2l = frame.inverse();
            } else {
                self.last_global = transform_from(self.state.position, self.state.rotation);
            }
        }

        Ok(CorrectionMessage::new(self.avatar, self.last_global))
    }

    pub fn post_step(&mut self) {
        if !self.is_simulating() {
            return;
        }
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.post_step();
        }
    }

    /// Places the avatar directly, without collision. For kinematic or disabled
    /// avatars driven by animation or scripted motion.
    pub fn set_pose(
        &mut self,
        position: Point,
        rotation: Quat,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) {
        let frame = self.subworld_frame(scene);
        self.state.last_position = self.state.position;
        self.state.position = position;
        self.state.rotation = rotation;
        backend.set_proxy_position(self.avatar, frame * position);
        self.last_global = frame * transform_from(position, rotation);
        self.prev_subworld_w2l = frame.inverse();
    }

    /// [`set_pose`](Self::set_pose) with a world transform.
    pub fn set_world_pose(
        &mut self,
        world: Transform,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) {
        let frame = self.subworld_frame(scene);
        let local = frame.inverse() * world;
        self.set_pose(Point::from(local.translation.vector), local.rotation, backend, scene);
    }

    /// Teleports to a world transform. Contact history and impact state are dropped.
    pub fn warp(
        &mut self,
        world: Transform,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) {
        let frame = self.subworld_frame(scene);
        let local = frame.inverse() * world;
        let position = Point::from(local.translation.vector);
        self.state.position = position;
        self.state.last_position = position;
        self.state.rotation = local.rotation;
        self.state.linear_velocity = Vec3::zeros();
        self.state.override_achieved_linear_velocity(Vec3::zeros());
        self.state.clear_contact_normals();
        backend.set_proxy_position(self.avatar, Point::from(world.translation.vector));
        self.last_global = world;
        self.prev_subworld_w2l = frame.inverse();

        let Self { state, strategy, .. } = self;
        if let Some(strategy) = strategy.as_mut() {
            strategy.reset(state, false);
        }
        info!(avatar = %self.avatar, to = ?world.translation.vector, "warped");
    }

    /// Moves the avatar into `subworld` (or back to the world), keeping its world pose.
    pub fn set_subworld(
        &mut self,
        subworld: Option<ObjectId>,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) {
        if self.state.subworld == subworld {
            return;
        }
        let world = self.last_global;
        self.state.subworld = subworld;
        let frame = self.subworld_frame(scene);
        let local = frame.inverse() * world;
        let position = Point::from(local.translation.vector);
        self.state.position = position;
        self.state.last_position = position;
        self.state.rotation = local.rotation;
        self.prev_subworld_w2l = frame.inverse();

        // Park the proxy until the next reconcile so it doesn't collide mid-transition
        backend.set_proxy_enabled(self.avatar, false);
        self.proxy_active = false;
        self.pending.kinematic_enable_next_update = true;

        let Self { state, strategy, .. } = self;
        if let Some(strategy) = strategy.as_mut() {
            strategy.reset(state, false);
        }
        info!(avatar = %self.avatar, ?subworld, "changed subworld");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::math::from_heading;
    use crate::avatar::physics::PlaneWorld;
    use crate::avatar::scene::StaticScene;
    use crate::config::LocomotionConfig;
    use std::f32::consts::FRAC_PI_2;

    const AVATAR: ObjectId = ObjectId(42);
    const DT: f32 = 1.0 / 60.0;

    fn walker(world: &mut PlaneWorld, feet: Point) -> PhysicalController {
        let config = LocomotionConfig::default();
        let mut controller = PhysicalController::spawn(
            AVATAR,
            transform_from(feet, Quat::identity()),
            &config.physics,
            world,
        );
        controller.bind_strategy(MovementStrategy::Walking(WalkingStrategy::from_config(&config)));
        controller
    }

    fn tick(controller: &mut PhysicalController, world: &mut PlaneWorld, scene: &StaticScene) {
        controller.apply(DT, world, scene).expect("apply");
        world.step(DT);
        controller.update(DT, world, scene).expect("update");
        controller.post_step();
    }

    #[test]
    fn test_local_velocity_follows_heading() {
        let mut world = PlaneWorld::with_ground(0.0);
        let scene = StaticScene::new();
        let mut controller = walker(&mut world, Point::origin());
        tick(&mut controller, &mut world, &scene);

        controller.state_mut().rotation = from_heading(FRAC_PI_2);
        controller.recalc_velocity(
            RootMotion {
                linear: Vec3::new(0.0, 6.0, 0.0),
                angular: 0.0,
            },
            DT,
        );
        tick(&mut controller, &mut world, &scene);
        let v = controller.achieved_linear_velocity();
        assert!((v.x + 6.0).abs() < 1e-3, "forward at a quarter turn is -X, got {v:?}");
        assert!(v.y.abs() < 1e-3);
    }

    #[test]
    fn test_enable_is_deferred_until_apply() {
        let mut world = PlaneWorld::with_ground(0.0);
        let scene = StaticScene::new();
        let mut controller = walker(&mut world, Point::origin());

        controller.enable(false, &mut world);
        assert!(!controller.is_enabled(), "disable is immediate");

        controller.enable(true, &mut world);
        assert!(!controller.is_enabled(), "enable waits for the next apply");
        controller.apply(DT, &mut world, &scene).unwrap();
        assert!(controller.is_enabled());

        controller.enable(true, &mut world);
        controller.check_and_handle_any_state_changes(&mut world);
        assert!(controller.is_enabled());
    }

    #[test]
    fn test_kinematic_deferral_and_disabled_velocity() {
        let mut world = PlaneWorld::with_ground(0.0);
        let scene = StaticScene::new();
        let mut controller = walker(&mut world, Point::new(0.0, 0.0, 5.0));
        controller.set_kinematic(true, &mut world);
        assert!(controller.is_kinematic());

        for _ in 0..10 {
            tick(&mut controller, &mut world, &scene);
        }
        assert_eq!(controller.position().z, 5.0, "kinematic avatars don't fall");
        assert_eq!(controller.achieved_linear_velocity(), Vec3::zeros());

        controller.set_kinematic(false, &mut world);
        assert!(controller.is_kinematic());
        tick(&mut controller, &mut world, &scene);
        assert!(!controller.is_kinematic());
        assert!(controller.position().z < 5.0, "gravity resumes once reconciled");
    }

    #[test]
    fn test_update_without_strategy_errors() {
        let mut world = PlaneWorld::with_ground(0.0);
        let scene = StaticScene::new();
        let mut controller = walker(&mut world, Point::origin());
        controller.take_strategy();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            controller.update(DT, &world, &scene)
        }));
        // Debug builds assert; release builds report the error
        match result {
            Ok(Err(LocomotionError::NoStrategyBound(id))) => assert_eq!(id, AVATAR),
            Ok(other) => panic!("expected NoStrategyBound, got {other:?}"),
            Err(_) => assert!(cfg!(debug_assertions)),
        }
    }

    #[test]
    fn test_warp_teleports_and_clears_history() {
        let mut world = PlaneWorld::with_ground(0.0);
        let scene = StaticScene::new();
        let mut controller = walker(&mut world, Point::origin());
        controller.state_mut().add_sliding_normal(Vec3::x());

        let target = transform_from(Point::new(10.0, -3.0, 0.0), from_heading(1.0));
        controller.warp(target, &mut world, &scene);
        assert_eq!(controller.position(), Point::new(10.0, -3.0, 0.0));
        assert!(controller.state().contact_normals.is_empty());
        assert_eq!(world.proxy_position(AVATAR), Some(Point::new(10.0, -3.0, 0.0)));
        tick(&mut controller, &mut world, &scene);
        assert!(controller.achieved_linear_velocity().norm() < 1.0, "warp is not motion");
    }

    #[test]
    fn test_subworld_carries_parked_avatar() {
        let mut world = PlaneWorld::with_ground(0.0);
        let mut scene = StaticScene::new();
        let ship = ObjectId(900);
        scene.set(ship, transform_from(Point::new(100.0, 0.0, 0.0), Quat::identity()));

        let mut controller = walker(&mut world, Point::new(101.0, 0.0, 0.0));
        tick(&mut controller, &mut world, &scene);
        controller.set_subworld(Some(ship), &mut world, &scene);
        assert!((controller.position() - Point::new(1.0, 0.0, 0.0)).norm() < 1e-4);

        controller.enable(false, &mut world);
        scene.set(ship, transform_from(Point::new(150.0, 0.0, 0.0), Quat::identity()));
        let correction = controller.update(DT, &world, &scene).unwrap();
        let carried = correction.local_to_world.translation.vector;
        assert!((carried.x - 151.0).abs() < 1e-3, "parked avatar rides the ship, got {carried:?}");
        assert!(correction.dirty_synch);
    }

    #[test]
    fn test_walks_inside_moving_subworld() {
        let mut world = PlaneWorld::with_ground(0.0);
        let mut scene = StaticScene::new();
        let ship = ObjectId(900);
        scene.set(ship, Transform::identity());

        let mut controller = walker(&mut world, Point::new(0.0, 0.0, 0.0));
        controller.set_subworld(Some(ship), &mut world, &scene);
        for i in 0..30 {
            scene.set(
                ship,
                transform_from(Point::new(i as f32 * 0.5, 0.0, 0.0), Quat::identity()),
            );
            tick(&mut controller, &mut world, &scene);
        }
        assert!(controller.position().x.abs() < 1e-3, "stands still relative to the ship");
        assert!((controller.world_position().x - 14.5).abs() < 1e-3);
    }
}
