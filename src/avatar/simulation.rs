//! Supervising loop over many avatars sharing one collision backend.
//!
//! A failing avatar never takes the loop down: an `Err` skips that avatar for the
//! tick, a panic is logged and the avatar is parked as faulted.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{info, warn};

use super::animation::AnimationLayer;
use super::armature::Avatar;
use super::math::Transform;
use super::messages::{AvatarOutputs, AvatarSender};
use super::panic_reporting::log_panic;
use super::physics::{CollisionBackend, ObjectId};
use super::scene::StaticScene;
use crate::config::LocomotionConfig;
use crate::error::{LocomotionError, Result};

/// Fixed steps run by one [`Simulation::advance`] call at most; the rest of a long
/// frame is dropped.
const MAX_STEPS_PER_ADVANCE: usize = 8;

#[derive(Debug)]
struct Slot {
    avatar: Avatar,
    faulted: bool,
}

pub struct Simulation<B> {
    backend: B,
    scene: StaticScene,
    avatars: BTreeMap<ObjectId, Slot>,
    config: LocomotionConfig,
    time: f32,
    accumulator: f32,
    ticks: u64,
}

impl<B: CollisionBackend> Simulation<B> {
    pub fn new(backend: B, config: LocomotionConfig) -> Self {
        Self {
            backend,
            scene: StaticScene::new(),
            avatars: BTreeMap::new(),
            config,
            time: 0.0,
            accumulator: 0.0,
            ticks: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scene(&self) -> &StaticScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut StaticScene {
        &mut self.scene
    }

    pub fn config(&self) -> &LocomotionConfig {
        &self.config
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn avatar(&self, id: ObjectId) -> Option<&Avatar> {
        self.avatars.get(&id).map(|slot| &slot.avatar)
    }

    pub fn avatar_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.avatars.keys().copied()
    }

    pub fn is_faulted(&self, id: ObjectId) -> bool {
        self.avatars.get(&id).is_some_and(|slot| slot.faulted)
    }

    pub fn spawn_avatar(
        &mut self,
        id: ObjectId,
        world_transform: Transform,
    ) -> Result<(AvatarSender, AvatarOutputs)> {
        if self.avatars.contains_key(&id) {
            return Err(LocomotionError::DuplicateAvatar(id));
        }
        let (avatar, tx, rx) = Avatar::spawn(
            id,
            world_transform,
            self.config.clone(),
            &mut self.backend,
            &self.scene,
        );
        self.avatars.insert(id, Slot { avatar, faulted: false });
        Ok((tx, rx))
    }

    pub fn spawn_avatar_with_animation(
        &mut self,
        id: ObjectId,
        world_transform: Transform,
        animation: Box<dyn AnimationLayer>,
    ) -> Result<(AvatarSender, AvatarOutputs)> {
        if self.avatars.contains_key(&id) {
            return Err(LocomotionError::DuplicateAvatar(id));
        }
        let (avatar, tx, rx) = Avatar::spawn_with_animation(
            id,
            world_transform,
            self.config.clone(),
            animation,
            &mut self.backend,
            &self.scene,
        );
        self.avatars.insert(id, Slot { avatar, faulted: false });
        Ok((tx, rx))
    }

    pub fn despawn_avatar(&mut self, id: ObjectId) -> bool {
        match self.avatars.remove(&id) {
            Some(slot) => {
                slot.avatar.despawn(&mut self.backend, &self.scene);
                true
            }
            None => false,
        }
    }

    /// Runs as many fixed steps as `elapsed` seconds cover. Returns the step count.
    pub fn advance(&mut self, elapsed: f32) -> usize {
        let step = self.config.physics.timestep;
        self.accumulator += elapsed.max(0.0);
        let mut steps = 0;
        while self.accumulator >= step && steps < MAX_STEPS_PER_ADVANCE {
            self.step(step);
            self.accumulator -= step;
            steps += 1;
        }
        if steps == MAX_STEPS_PER_ADVANCE && self.accumulator >= step {
            warn!(
                dropped = self.accumulator,
                "simulation fell behind; dropping the rest of the frame"
            );
            self.accumulator = 0.0;
        }
        steps
    }

    /// One tick for every healthy avatar around a single backend step.
    pub fn step(&mut self, dt: f32) {
        let time = self.time;
        let Self {
            backend,
            scene,
            avatars,
            ..
        } = self;

        let mut stepped = Vec::with_capacity(avatars.len());
        for (id, slot) in avatars.iter_mut().filter(|(_, slot)| !slot.faulted) {
            let avatar = &mut slot.avatar;
            let result = catch_unwind(AssertUnwindSafe(|| {
                avatar.pre_step(time, dt, &mut *backend, &*scene)
            }));
            match result {
                Ok(Ok(())) => stepped.push(*id),
                Ok(Err(err)) => warn!(avatar = %id, %err, "avatar tick failed; skipped"),
                Err(payload) => {
                    log_panic(*id, "pre-step", payload.as_ref());
                    slot.faulted = true;
                }
            }
        }

        backend.step(dt);

        for id in stepped {
            let Some(slot) = avatars.get_mut(&id) else {
                continue;
            };
            let avatar = &mut slot.avatar;
            let result = catch_unwind(AssertUnwindSafe(|| {
                avatar.post_step(dt, &mut *backend, &*scene)
            }));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(avatar = %id, %err, "avatar readback failed; skipped"),
                Err(payload) => {
                    log_panic(id, "post-step", payload.as_ref());
                    slot.faulted = true;
                }
            }
        }

        self.time += dt;
        self.ticks += 1;
        if self.ticks % 600 == 0 {
            info!(ticks = self.ticks, avatars = self.avatars.len(), "simulation running");
        }
    }
}
