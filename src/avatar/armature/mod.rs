//! One simulated avatar: controller, brains, input and animation under one owner.
//!
//! Callers talk to an avatar through its channels. [`AvatarSender`] feeds
//! [`AvatarMessage`]s in; corrections and events come back out on [`AvatarOutputs`].

mod tick_pipeline;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info};

use super::animation::{AnimationLayer, BlendMixer};
use super::brain::{BrainContext, BrainKind, BrainSpec, BrainStack, StackOps};
use super::controller::PhysicalController;
use super::input::ControlState;
use super::math::Transform;
use super::messages::{AvatarEvent, AvatarMessage, AvatarOutput, AvatarOutputs, AvatarSender};
use super::physics::{CollisionBackend, ObjectId};
use super::scene::SceneGraph;
use crate::config::LocomotionConfig;
use crate::error::Result;

pub struct Avatar {
    id: ObjectId,
    controller: PhysicalController,
    brains: BrainStack,
    input: ControlState,
    animation: Box<dyn AnimationLayer>,
    inbox: Receiver<AvatarMessage>,
    outbox: Sender<AvatarOutput>,
    stack_ops: StackOps,
    events: Vec<AvatarEvent>,
    warp_count: u64,
    config: LocomotionConfig,
}

impl std::fmt::Debug for Avatar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Avatar")
            .field("id", &self.id)
            .field("brains", &self.brains.kinds())
            .field("position", &self.controller.world_position())
            .finish_non_exhaustive()
    }
}

impl Avatar {
    /// Spawns an avatar with the stock locomotion clips and a human base brain.
    pub fn spawn(
        id: ObjectId,
        world_transform: Transform,
        config: LocomotionConfig,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) -> (Self, AvatarSender, AvatarOutputs) {
        let animation = Box::new(BlendMixer::with_locomotion_clips(None));
        Self::spawn_with_animation(id, world_transform, config, animation, backend, scene)
    }

    pub fn spawn_with_animation(
        id: ObjectId,
        world_transform: Transform,
        config: LocomotionConfig,
        animation: Box<dyn AnimationLayer>,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) -> (Self, AvatarSender, AvatarOutputs) {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let controller = PhysicalController::spawn(id, world_transform, &config.physics, backend);
        let mut avatar = Self {
            id,
            controller,
            brains: BrainStack::new(),
            input: ControlState::new(),
            animation,
            inbox: in_rx,
            outbox: out_tx,
            stack_ops: StackOps::default(),
            events: Vec::new(),
            warp_count: 0,
            config,
        };

        // The human brain binds the walking strategy on activate
        let base = BrainSpec::Human.build(&avatar.config);
        let (brains, mut ctx) = avatar.split(backend, scene, 0.0, 0.0);
        brains.push(base, false, &mut ctx);
        avatar.flush_events();
        info!(avatar = %id, "avatar spawned");

        (avatar, AvatarSender::new(id, in_tx), AvatarOutputs::new(out_rx))
    }

    /// Deactivates every brain and removes the capsule from the backend.
    pub fn despawn(mut self, backend: &mut dyn CollisionBackend, scene: &dyn SceneGraph) {
        let (brains, mut ctx) = self.split(backend, scene, 0.0, 0.0);
        brains.clear(&mut ctx);
        self.controller.despawn(backend);
        info!(avatar = %self.id, "avatar despawned");
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn controller(&self) -> &PhysicalController {
        &self.controller
    }

    pub fn brains(&self) -> &BrainStack {
        &self.brains
    }

    pub fn current_brain(&self) -> Option<BrainKind> {
        self.brains.top_kind()
    }

    pub fn input(&self) -> &ControlState {
        &self.input
    }

    pub fn animation(&self) -> &dyn AnimationLayer {
        self.animation.as_ref()
    }

    pub fn config(&self) -> &LocomotionConfig {
        &self.config
    }

    /// Runs one full tick: brains, controller, backend step, readback.
    ///
    /// Only for an avatar that owns its backend. A [`Simulation`](super::simulation::Simulation)
    /// sharing one backend between avatars runs the halves itself around a single step.
    pub fn tick(
        &mut self,
        time: f32,
        dt: f32,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) -> Result<()> {
        tick_pipeline::run_pre_step_phases(self, time, dt, backend, scene)?;
        backend.step(dt);
        tick_pipeline::run_post_step_phases(self, dt, backend, scene)
    }

    pub(crate) fn pre_step(
        &mut self,
        time: f32,
        dt: f32,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) -> Result<()> {
        tick_pipeline::run_pre_step_phases(self, time, dt, backend, scene)
    }

    pub(crate) fn post_step(
        &mut self,
        dt: f32,
        backend: &mut dyn CollisionBackend,
        scene: &dyn SceneGraph,
    ) -> Result<()> {
        tick_pipeline::run_post_step_phases(self, dt, backend, scene)
    }

    /// Splits the avatar into its brain stack and a context over everything else.
    fn split<'a>(
        &'a mut self,
        backend: &'a mut dyn CollisionBackend,
        scene: &'a dyn SceneGraph,
        time: f32,
        dt: f32,
    ) -> (&'a mut BrainStack, BrainContext<'a>) {
        let Self {
            id,
            controller,
            brains,
            input,
            animation,
            stack_ops,
            events,
            warp_count,
            config,
            ..
        } = self;
        let ctx = BrainContext {
            avatar: *id,
            controller,
            input,
            animation: animation.as_mut(),
            backend,
            scene,
            stack_ops,
            events,
            config,
            time,
            dt,
            warp_count,
        };
        (brains, ctx)
    }

    /// Publishes buffered events.
    fn flush_events(&mut self) {
        for event in self.events.drain(..) {
            send_output(&self.outbox, self.id, AvatarOutput::Event(event));
        }
    }

    fn publish(&self, output: AvatarOutput) {
        send_output(&self.outbox, self.id, output);
    }
}

/// A dropped receiver only means nobody listens.
fn send_output(outbox: &Sender<AvatarOutput>, avatar: ObjectId, output: AvatarOutput) {
    if outbox.send(output).is_err() {
        debug!(avatar = %avatar, "outputs receiver dropped");
    }
}
