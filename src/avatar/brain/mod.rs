//! Brains decide what kind of locomotion is active.
//!
//! An avatar carries a [`BrainStack`]; the top entry is current. Brains turn input
//! into behavior strengths and root motion, swap the controller's movement strategy
//! when the mode calls for it, and run their own task queue. Stack changes requested
//! while a brain runs are buffered in [`StackOps`] and applied between phases.

pub mod climb;
pub mod drive;
pub mod generic;
pub mod human;
pub mod ride;
pub mod swim;

use std::fmt;

use tracing::{debug, info, warn};

use super::animation::AnimationLayer;
use super::controller::PhysicalController;
use super::input::ControlState;
use super::math::Transform;
use super::messages::{AvatarEvent, AvatarMessage};
use super::physics::{CollisionBackend, ObjectId};
use super::scene::SceneGraph;
use super::swim_region::SwimRegion;
use super::task::anim::AnimTask;
use super::task::seek::SeekTask;
use super::task::{AvTask, TaskQueue};
use crate::config::{LocomotionConfig, TurnCurve, TurnTunables};
use crate::error::{LocomotionError, Result};

use climb::{ClimbBrain, ClimbDirection};
use drive::DriveBrain;
use generic::{GenericBrain, GenericSpec};
use human::HumanBrain;
use ride::RideBrain;
use swim::SwimBrain;

/// Rounds of follow-up stack ops (ops queued by activate/deactivate) applied per call.
const MAX_OP_ROUNDS: usize = 8;

/// Everything a brain may touch during one phase of a tick.
pub struct BrainContext<'a> {
    pub avatar: ObjectId,
    pub controller: &'a mut PhysicalController,
    pub input: &'a mut ControlState,
    pub animation: &'a mut dyn AnimationLayer,
    pub backend: &'a mut dyn CollisionBackend,
    pub scene: &'a dyn SceneGraph,
    pub stack_ops: &'a mut StackOps,
    pub events: &'a mut Vec<AvatarEvent>,
    pub config: &'a LocomotionConfig,
    pub time: f32,
    pub dt: f32,
    /// Bumped on every teleport; running seeks compare against it
    pub warp_count: &'a mut u64,
}

impl BrainContext<'_> {
    /// Teleports the avatar and lets running seeks notice.
    pub fn warp(&mut self, world: Transform) {
        self.controller.warp(world, self.backend, self.scene);
        *self.warp_count += 1;
        self.events.push(AvatarEvent::Warped);
    }
}

#[derive(Debug, Clone)]
pub enum StackOp {
    Push { spec: BrainSpec, suspend_current: bool },
    Pop,
}

/// Stack changes requested mid-phase, applied at the next boundary.
#[derive(Debug, Clone, Default)]
pub struct StackOps {
    ops: Vec<StackOp>,
}

impl StackOps {
    pub fn push(&mut self, spec: BrainSpec, suspend_current: bool) {
        self.ops.push(StackOp::Push {
            spec,
            suspend_current,
        });
    }

    pub fn pop(&mut self) {
        self.ops.push(StackOp::Pop);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<StackOp> {
        std::mem::take(&mut self.ops)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrainKind {
    Human,
    Swim,
    Climb,
    Drive,
    Generic,
    Ride,
}

impl fmt::Display for BrainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrainKind::Human => "human",
            BrainKind::Swim => "swim",
            BrainKind::Climb => "climb",
            BrainKind::Drive => "drive",
            BrainKind::Generic => "generic",
            BrainKind::Ride => "ride",
        };
        f.write_str(name)
    }
}

/// Recipe for a brain; messages and tasks carry these instead of live brains.
#[derive(Debug, Clone)]
pub enum BrainSpec {
    Human,
    Swim(Option<SwimRegion>),
    Climb(ClimbDirection),
    Drive,
    Generic(GenericSpec),
    Ride,
}

impl BrainSpec {
    pub fn kind(&self) -> BrainKind {
        match self {
            BrainSpec::Human => BrainKind::Human,
            BrainSpec::Swim(_) => BrainKind::Swim,
            BrainSpec::Climb(_) => BrainKind::Climb,
            BrainSpec::Drive => BrainKind::Drive,
            BrainSpec::Generic(_) => BrainKind::Generic,
            BrainSpec::Ride => BrainKind::Ride,
        }
    }

    pub fn build(&self, config: &LocomotionConfig) -> ArmatureBrain {
        match self {
            BrainSpec::Human => ArmatureBrain::Human(HumanBrain::new(config.human.clone())),
            BrainSpec::Swim(region) => ArmatureBrain::Swim(SwimBrain::new(
                region.clone(),
                config.swim_brain.clone(),
            )),
            BrainSpec::Climb(direction) => {
                ArmatureBrain::Climb(ClimbBrain::new(*direction, config.climb.clone()))
            }
            BrainSpec::Drive => ArmatureBrain::Drive(DriveBrain::new(config.drive.clone())),
            BrainSpec::Generic(spec) => ArmatureBrain::Generic(GenericBrain::new(spec.clone())),
            BrainSpec::Ride => ArmatureBrain::Ride(RideBrain::new(config.human.clone())),
        }
    }
}

#[derive(Debug)]
pub enum ArmatureBrain {
    Human(HumanBrain),
    Swim(SwimBrain),
    Climb(ClimbBrain),
    Drive(DriveBrain),
    Generic(GenericBrain),
    Ride(RideBrain),
}

impl ArmatureBrain {
    pub fn kind(&self) -> BrainKind {
        match self {
            ArmatureBrain::Human(_) => BrainKind::Human,
            ArmatureBrain::Swim(_) => BrainKind::Swim,
            ArmatureBrain::Climb(_) => BrainKind::Climb,
            ArmatureBrain::Drive(_) => BrainKind::Drive,
            ArmatureBrain::Generic(_) => BrainKind::Generic,
            ArmatureBrain::Ride(_) => BrainKind::Ride,
        }
    }

    pub fn activate(&mut self, ctx: &mut BrainContext<'_>) {
        match self {
            ArmatureBrain::Human(b) => b.activate(ctx),
            ArmatureBrain::Swim(b) => b.activate(ctx),
            ArmatureBrain::Climb(b) => b.activate(ctx),
            ArmatureBrain::Drive(b) => b.activate(ctx),
            ArmatureBrain::Generic(b) => b.activate(ctx),
            ArmatureBrain::Ride(b) => b.activate(ctx),
        }
    }

    pub fn deactivate(&mut self, ctx: &mut BrainContext<'_>) {
        self.tasks_mut().abandon_all(ctx);
        match self {
            ArmatureBrain::Human(b) => b.deactivate(ctx),
            ArmatureBrain::Swim(b) => b.deactivate(ctx),
            ArmatureBrain::Climb(b) => b.deactivate(ctx),
            ArmatureBrain::Drive(b) => b.deactivate(ctx),
            ArmatureBrain::Generic(b) => b.deactivate(ctx),
            ArmatureBrain::Ride(b) => b.deactivate(ctx),
        }
    }

    pub fn suspend(&mut self, ctx: &mut BrainContext<'_>) {
        match self {
            ArmatureBrain::Human(b) => b.suspend(ctx),
            ArmatureBrain::Ride(b) => b.human_mut().suspend(ctx),
            ArmatureBrain::Swim(b) => b.suspend(ctx),
            ArmatureBrain::Climb(_) | ArmatureBrain::Drive(_) | ArmatureBrain::Generic(_) => {}
        }
    }

    pub fn resume(&mut self, ctx: &mut BrainContext<'_>) {
        match self {
            ArmatureBrain::Human(b) => b.resume(ctx),
            ArmatureBrain::Ride(b) => b.human_mut().resume(ctx),
            ArmatureBrain::Swim(_)
            | ArmatureBrain::Climb(_)
            | ArmatureBrain::Drive(_)
            | ArmatureBrain::Generic(_) => {}
        }
    }

    /// Runs one tick. `below` holds the entries under this one, bottom first.
    /// Returns false when the brain wants to be popped.
    pub fn apply(&mut self, ctx: &mut BrainContext<'_>, below: &mut [BrainEntry]) -> Result<bool> {
        match self {
            ArmatureBrain::Human(b) => b.apply(ctx),
            ArmatureBrain::Swim(b) => b.apply(ctx, below),
            ArmatureBrain::Climb(b) => b.apply(ctx),
            ArmatureBrain::Drive(b) => b.apply(ctx),
            ArmatureBrain::Generic(b) => b.apply(ctx),
            ArmatureBrain::Ride(b) => b.apply(ctx),
        }
    }

    /// Returns whether the message was consumed.
    pub fn msg_receive(&mut self, ctx: &mut BrainContext<'_>, msg: &AvatarMessage) -> bool {
        match self {
            ArmatureBrain::Human(b) => b.msg_receive(ctx, msg),
            ArmatureBrain::Swim(b) => b.msg_receive(ctx, msg),
            ArmatureBrain::Climb(b) => b.msg_receive(ctx, msg),
            ArmatureBrain::Drive(b) => b.msg_receive(ctx, msg),
            ArmatureBrain::Generic(b) => b.msg_receive(ctx, msg),
            ArmatureBrain::Ride(b) => b.msg_receive(ctx, msg),
        }
    }

    pub fn queue_task(&mut self, task: AvTask) {
        self.tasks_mut().queue(task);
    }

    pub fn tasks(&self) -> &TaskQueue {
        match self {
            ArmatureBrain::Human(b) => b.tasks(),
            ArmatureBrain::Swim(b) => b.tasks(),
            ArmatureBrain::Climb(b) => b.tasks(),
            ArmatureBrain::Drive(b) => b.tasks(),
            ArmatureBrain::Generic(b) => b.tasks(),
            ArmatureBrain::Ride(b) => b.human().tasks(),
        }
    }

    fn tasks_mut(&mut self) -> &mut TaskQueue {
        match self {
            ArmatureBrain::Human(b) => b.tasks_mut(),
            ArmatureBrain::Swim(b) => b.tasks_mut(),
            ArmatureBrain::Climb(b) => b.tasks_mut(),
            ArmatureBrain::Drive(b) => b.tasks_mut(),
            ArmatureBrain::Generic(b) => b.tasks_mut(),
            ArmatureBrain::Ride(b) => b.human_mut().tasks_mut(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Inactive,
    Active,
    Suspended,
    Deactivated,
}

#[derive(Debug)]
pub struct BrainEntry {
    pub brain: ArmatureBrain,
    lifecycle: Lifecycle,
}

impl BrainEntry {
    fn new(brain: ArmatureBrain) -> Self {
        Self {
            brain,
            lifecycle: Lifecycle::Inactive,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn suspend(&mut self, ctx: &mut BrainContext<'_>) {
        if self.lifecycle == Lifecycle::Active {
            self.brain.suspend(ctx);
            self.lifecycle = Lifecycle::Suspended;
        }
    }

    pub fn resume(&mut self, ctx: &mut BrainContext<'_>) {
        if self.lifecycle == Lifecycle::Suspended {
            self.brain.resume(ctx);
            self.lifecycle = Lifecycle::Active;
        }
    }
}

/// LIFO stack of brains. The last entry is current.
#[derive(Debug, Default)]
pub struct BrainStack {
    entries: Vec<BrainEntry>,
}

impl BrainStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top(&self) -> Option<&BrainEntry> {
        self.entries.last()
    }

    pub fn top_kind(&self) -> Option<BrainKind> {
        self.top().map(|e| e.brain.kind())
    }

    /// Kinds from bottom to top.
    pub fn kinds(&self) -> Vec<BrainKind> {
        self.entries.iter().map(|e| e.brain.kind()).collect()
    }

    pub fn entries(&self) -> &[BrainEntry] {
        &self.entries
    }

    /// Activates `brain` on top. The current top is suspended only when asked.
    pub fn push(&mut self, mut brain: ArmatureBrain, suspend_current: bool, ctx: &mut BrainContext<'_>) {
        if suspend_current {
            if let Some(top) = self.entries.last_mut() {
                top.suspend(ctx);
            }
        }
        let kind = brain.kind();
        brain.activate(ctx);
        let mut entry = BrainEntry::new(brain);
        entry.lifecycle = Lifecycle::Active;
        self.entries.push(entry);
        info!(avatar = %ctx.avatar, brain = %kind, depth = self.entries.len(), "pushed brain");
        ctx.events.push(AvatarEvent::BrainPushed(kind));
    }

    /// Deactivates and removes the top brain; the new top resumes if it was suspended.
    pub fn pop(&mut self, ctx: &mut BrainContext<'_>) -> Result<BrainKind> {
        match self.entries.len() {
            0 => return Err(LocomotionError::EmptyBrainStack),
            1 => return Err(LocomotionError::BasePop),
            _ => {}
        }
        let mut entry = self
            .entries
            .pop()
            .ok_or(LocomotionError::EmptyBrainStack)?;
        entry.brain.deactivate(ctx);
        entry.lifecycle = Lifecycle::Deactivated;
        let kind = entry.brain.kind();

        if let Some(top) = self.entries.last_mut() {
            top.resume(ctx);
        }
        info!(avatar = %ctx.avatar, brain = %kind, depth = self.entries.len(), "popped brain");
        ctx.events.push(AvatarEvent::BrainPopped(kind));
        Ok(kind)
    }

    /// Applies buffered stack ops, including any queued while applying them.
    pub fn apply_ops(&mut self, ctx: &mut BrainContext<'_>) {
        for _ in 0..MAX_OP_ROUNDS {
            if ctx.stack_ops.is_empty() {
                return;
            }
            for op in ctx.stack_ops.drain() {
                match op {
                    StackOp::Push {
                        spec,
                        suspend_current,
                    } => {
                        let brain = spec.build(ctx.config);
                        self.push(brain, suspend_current, ctx);
                    }
                    StackOp::Pop => {
                        if let Err(err) = self.pop(ctx) {
                            warn!(avatar = %ctx.avatar, %err, "ignored pop request");
                        }
                    }
                }
            }
        }
        if !ctx.stack_ops.is_empty() {
            warn!(
                avatar = %ctx.avatar,
                dropped = ctx.stack_ops.len(),
                "stack ops kept queueing more ops; dropping the rest"
            );
            ctx.stack_ops.drain();
        }
    }

    /// Runs the current brain. A false result queues its pop.
    pub fn apply(&mut self, ctx: &mut BrainContext<'_>) -> Result<()> {
        let Some((top, below)) = self.entries.split_last_mut() else {
            debug_assert!(false, "apply on an empty brain stack");
            return Err(LocomotionError::EmptyBrainStack);
        };
        if !top.brain.apply(ctx, below)? {
            debug!(avatar = %ctx.avatar, brain = %top.brain.kind(), "brain finished");
            ctx.stack_ops.pop();
        }
        Ok(())
    }

    /// Offers `msg` to each brain from the top down. Returns whether one took it.
    pub fn msg_receive(&mut self, ctx: &mut BrainContext<'_>, msg: &AvatarMessage) -> bool {
        for entry in self.entries.iter_mut().rev() {
            if entry.brain.msg_receive(ctx, msg) {
                return true;
            }
        }
        debug!(avatar = %ctx.avatar, ?msg, "no brain handled message; dropped");
        false
    }

    /// Deactivates every brain, top first.
    pub fn clear(&mut self, ctx: &mut BrainContext<'_>) {
        while let Some(mut entry) = self.entries.pop() {
            entry.brain.deactivate(ctx);
            entry.lifecycle = Lifecycle::Deactivated;
        }
    }
}

/// Queues the task a message asks for. Returns false for non-task messages.
pub(crate) fn queue_task_message(
    tasks: &mut TaskQueue,
    msg: &AvatarMessage,
    config: &LocomotionConfig,
) -> bool {
    match msg {
        AvatarMessage::Seek(request) => {
            tasks.queue(AvTask::Seek(SeekTask::new(request.clone(), config.seek.clone())))
        }
        AvatarMessage::PlayAnimation(request) => {
            tasks.queue(AvTask::PlayAnimation(AnimTask::new(request.clone())))
        }
        AvatarMessage::StopAnimation(name) => {
            if !tasks.stop_animation(name) {
                debug!(anim = %name, "stop for an animation that isn't playing");
            }
        }
        AvatarMessage::PushBrain {
            spec,
            suspend_current,
        } => tasks.queue(AvTask::PushBrain {
            spec: spec.clone(),
            suspend_current: *suspend_current,
        }),
        AvatarMessage::PopBrain => tasks.queue(AvTask::PopBrain),
        _ => return false,
    }
    true
}

/// Tracks how long a turn key has been held.
#[derive(Debug, Clone, Default)]
pub(crate) struct TurnRamp {
    started: Option<f32>,
    direction: f32,
}

impl TurnRamp {
    /// Turn speed in rad/s for the held direction (positive is left).
    pub(crate) fn speed(&mut self, tunables: &TurnTunables, direction: f32, now: f32) -> f32 {
        if direction == 0.0 {
            self.started = None;
            self.direction = 0.0;
            return 0.0;
        }
        if self.started.is_none() || direction != self.direction {
            self.started = Some(now);
            self.direction = direction;
        }
        let held = now - self.started.unwrap_or(now);
        direction * turn_curve(tunables, held)
    }

    pub(crate) fn reset(&mut self) {
        self.started = None;
        self.direction = 0.0;
    }
}

/// Turn speed after holding a turn key for `held` seconds.
pub(crate) fn turn_curve(tunables: &TurnTunables, held: f32) -> f32 {
    let n = if tunables.time_to_max > 0.0 {
        (held / tunables.time_to_max).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let shaped = match tunables.curve {
        TurnCurve::Linear => n,
        TurnCurve::Exponential => n * n,
        TurnCurve::Logarithmic => {
            if n <= 0.1 {
                0.00001
            } else {
                (10.0 * n).log10()
            }
        }
    };
    shaped * tunables.max_turn_speed
}

#[cfg(test)]
pub(crate) mod test_rig {
    //! A standalone avatar body for driving brains and tasks in unit tests.

    use super::*;
    use crate::avatar::animation::BlendMixer;
    use crate::avatar::math::{transform_from, Point, Quat};
    use crate::avatar::physics::plane::PlaneWorld;
    use crate::avatar::scene::StaticScene;
    use crate::avatar::strategy::{MovementStrategy, WalkingStrategy};

    pub(crate) const AVATAR: ObjectId = ObjectId(1);
    pub(crate) const DT: f32 = 1.0 / 60.0;

    pub(crate) struct Rig {
        pub controller: PhysicalController,
        pub input: ControlState,
        pub mixer: BlendMixer,
        pub world: PlaneWorld,
        pub scene: StaticScene,
        pub ops: StackOps,
        pub events: Vec<AvatarEvent>,
        pub config: LocomotionConfig,
        pub warp_count: u64,
        pub time: f32,
    }

    impl Rig {
        /// Avatar standing at `feet` on a ground plane at z = 0.
        pub(crate) fn standing_at(feet: Point) -> Self {
            Self::in_world(PlaneWorld::with_ground(0.0), feet)
        }

        pub(crate) fn in_world(mut world: PlaneWorld, feet: Point) -> Self {
            let config = LocomotionConfig::default();
            let mut controller = PhysicalController::spawn(
                AVATAR,
                transform_from(feet, Quat::identity()),
                &config.physics,
                &mut world,
            );
            controller.bind_strategy(MovementStrategy::Walking(WalkingStrategy::from_config(
                &config,
            )));
            Self {
                controller,
                input: ControlState::new(),
                mixer: BlendMixer::with_locomotion_clips(Some(3)),
                world,
                scene: StaticScene::new(),
                ops: StackOps::default(),
                events: Vec::new(),
                config,
                warp_count: 0,
                time: 0.0,
            }
        }

        pub(crate) fn ctx(&mut self) -> BrainContext<'_> {
            BrainContext {
                avatar: AVATAR,
                controller: &mut self.controller,
                input: &mut self.input,
                animation: &mut self.mixer,
                backend: &mut self.world,
                scene: &self.scene,
                stack_ops: &mut self.ops,
                events: &mut self.events,
                config: &self.config,
                time: self.time,
                dt: DT,
                warp_count: &mut self.warp_count,
            }
        }

        /// Runs the physics half of a tick after the brains have had their turn.
        pub(crate) fn physics_step(&mut self) {
            self.mixer.advance(DT);
            self.controller
                .apply(DT, &mut self.world, &self.scene)
                .expect("strategy bound");
            self.world.step(DT);
            self.controller
                .update(DT, &self.world, &self.scene)
                .expect("proxy present");
            self.controller.post_step();
            self.time += DT;
        }

        /// One full tick of `stack`: ops, apply, ops, physics.
        pub(crate) fn tick(&mut self, stack: &mut BrainStack) {
            let mut ctx = self.ctx();
            stack.apply_ops(&mut ctx);
            stack.apply(&mut ctx).expect("non-empty stack");
            stack.apply_ops(&mut ctx);
            drop(ctx);
            self.physics_step();
        }

        pub(crate) fn take_events(&mut self) -> Vec<AvatarEvent> {
            std::mem::take(&mut self.events)
        }
    }
}
