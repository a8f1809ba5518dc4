//! Scripted stage sequences: sitting down, using a lever, and the like.
//!
//! A [`GenericSpec`] lists stages, each an animation with a length and rules for
//! moving to the next or previous stage. The brain fades the sequence in, runs the
//! stages, then fades out and asks to be popped.

use tracing::{debug, info, warn};

use super::{queue_task_message, BrainContext};
use crate::avatar::animation::RootMotion;
use crate::avatar::math::{increment_angle, transform_from, Point, Transform};
use crate::avatar::messages::{AvatarEvent, AvatarMessage};
use crate::avatar::task::anim::step_blend;
use crate::avatar::task::TaskQueue;
use crate::error::Result;

/// How a stage hands over to its neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvanceType {
    /// Never in this direction
    #[default]
    None,
    /// When the stage's length runs out
    Auto,
    /// When the movement key for this direction is held
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveMode {
    /// Kinematic; root motion accumulates from the pose the sequence started at
    Absolute,
    /// Kinematic; root motion moves the avatar from wherever it is
    Relative,
    /// Physics stays on and root motion feeds the controller
    #[default]
    Normal,
    /// Physics stays on; the avatar doesn't move
    Standstill,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericStage {
    pub anim: String,
    /// Seconds
    pub length: f32,
    pub forward: AdvanceType,
    pub back: AdvanceType,
    /// `None` ends the sequence
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

impl GenericStage {
    /// A stage that plays once and moves on to `next`.
    pub fn auto(anim: impl Into<String>, length: f32, next: Option<usize>) -> Self {
        Self {
            anim: anim.into(),
            length,
            forward: AdvanceType::Auto,
            back: AdvanceType::None,
            next,
            prev: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericSpec {
    pub stages: Vec<GenericStage>,
    pub move_mode: MoveMode,
    /// Blend per second
    pub fade_in: f32,
    pub fade_out: f32,
}

impl Default for GenericSpec {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            move_mode: MoveMode::Normal,
            fade_in: 4.0,
            fade_out: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericCommand {
    Exit,
    GotoStage(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericMode {
    Entering,
    FadingIn,
    Normal,
    FadingOut,
    Exit,
    Abort,
}

#[derive(Debug)]
pub struct GenericBrain {
    spec: GenericSpec,
    mode: GenericMode,
    stage: usize,
    elapsed: f32,
    blend: f32,
    tasks: TaskQueue,
    /// Pose at activation, for absolute root motion
    origin: Transform,
    accumulated: RootMotion,
    heading_offset: f32,
    was_kinematic: bool,
}

impl GenericBrain {
    pub fn new(spec: GenericSpec) -> Self {
        Self {
            spec,
            mode: GenericMode::Entering,
            stage: 0,
            elapsed: 0.0,
            blend: 0.0,
            tasks: TaskQueue::new(),
            origin: Transform::identity(),
            accumulated: RootMotion::default(),
            heading_offset: 0.0,
            was_kinematic: false,
        }
    }

    pub fn mode(&self) -> GenericMode {
        self.mode
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub(super) fn tasks_mut(&mut self) -> &mut TaskQueue {
        &mut self.tasks
    }

    fn is_kinematic_mode(&self) -> bool {
        matches!(self.spec.move_mode, MoveMode::Absolute | MoveMode::Relative)
    }

    fn current_anim(&self) -> Option<&str> {
        self.spec.stages.get(self.stage).map(|s| s.anim.as_str())
    }

    pub(super) fn activate(&mut self, ctx: &mut BrainContext<'_>) {
        if self.spec.stages.is_empty() {
            warn!(avatar = %ctx.avatar, "generic brain with no stages; aborting");
            self.mode = GenericMode::Abort;
            return;
        }
        self.was_kinematic = ctx.controller.is_kinematic();
        if self.is_kinematic_mode() {
            ctx.controller.set_kinematic(true, ctx.backend);
        }
        self.origin = ctx.controller.global_transform();
        if let Some(anim) = self.current_anim() {
            if !ctx.animation.attach(anim, 0.0) {
                warn!(avatar = %ctx.avatar, anim, "unknown stage animation; aborting");
                self.mode = GenericMode::Abort;
                return;
            }
        }
        self.mode = GenericMode::Entering;
        info!(avatar = %ctx.avatar, stages = self.spec.stages.len(), "generic sequence started");
    }

    pub(super) fn deactivate(&mut self, ctx: &mut BrainContext<'_>) {
        if let Some(anim) = self.current_anim() {
            ctx.animation.detach(anim);
        }
        if self.is_kinematic_mode() && !self.was_kinematic {
            ctx.controller.set_kinematic(false, ctx.backend);
        }
        ctx.controller.reset_strategy(false);
    }

    /// Switches to `next`, or starts fading out when the sequence ends there.
    fn goto_stage(&mut self, ctx: &mut BrainContext<'_>, next: Option<usize>) {
        let Some(next) = next.filter(|&i| i < self.spec.stages.len()) else {
            self.mode = GenericMode::FadingOut;
            return;
        };
        if let Some(old) = self.current_anim() {
            ctx.animation.detach(old);
        }
        self.stage = next;
        self.elapsed = 0.0;
        if let Some(anim) = self.current_anim() {
            if !ctx.animation.attach(anim, self.blend) {
                warn!(avatar = %ctx.avatar, anim, "unknown stage animation; aborting");
                self.mode = GenericMode::Abort;
                return;
            }
        }
        debug!(avatar = %ctx.avatar, stage = next, "generic stage");
        ctx.events.push(AvatarEvent::GenericStage { stage: next });
    }

    fn run_stage(&mut self, ctx: &mut BrainContext<'_>) {
        let Some(stage) = self.spec.stages.get(self.stage) else {
            self.mode = GenericMode::FadingOut;
            return;
        };
        let (forward, back) = (stage.forward, stage.back);
        let (next, prev, length) = (stage.next, stage.prev, stage.length);
        self.elapsed += ctx.dt;
        let ran_out = self.elapsed >= length;

        if forward == AdvanceType::Key && ctx.input.forward() {
            self.goto_stage(ctx, next);
        } else if back == AdvanceType::Key && ctx.input.backward() {
            self.goto_stage(ctx, prev);
        } else if ran_out && forward == AdvanceType::Auto {
            self.goto_stage(ctx, next);
        } else if ran_out && back == AdvanceType::Auto {
            self.goto_stage(ctx, prev);
        }
    }

    fn set_blend(&mut self, ctx: &mut BrainContext<'_>, blend: f32) {
        self.blend = blend.clamp(0.0, 1.0);
        if let Some(anim) = self.spec.stages.get(self.stage).map(|s| s.anim.as_str()) {
            ctx.animation.set_blend(anim, self.blend);
        }
    }

    fn move_avatar(&mut self, ctx: &mut BrainContext<'_>) {
        let motion = ctx.animation.root_motion();
        match self.spec.move_mode {
            MoveMode::Normal => ctx.controller.recalc_velocity(motion, ctx.dt),
            MoveMode::Standstill => ctx.controller.recalc_velocity(RootMotion::default(), ctx.dt),
            MoveMode::Relative => {
                let pose = ctx.controller.global_transform();
                let rotation = increment_angle(&pose.rotation, motion.angular * ctx.dt);
                let step = rotation * motion.linear * ctx.dt;
                let position = Point::from(pose.translation.vector + step);
                ctx.controller
                    .set_world_pose(transform_from(position, rotation), ctx.backend, ctx.scene);
            }
            MoveMode::Absolute => {
                self.heading_offset += motion.angular * ctx.dt;
                self.accumulated.linear += motion.linear * ctx.dt;
                let rotation = increment_angle(&self.origin.rotation, self.heading_offset);
                let offset = self.origin.rotation * self.accumulated.linear;
                let position = Point::from(self.origin.translation.vector + offset);
                ctx.controller
                    .set_world_pose(transform_from(position, rotation), ctx.backend, ctx.scene);
            }
        }
    }

    pub(super) fn apply(&mut self, ctx: &mut BrainContext<'_>) -> Result<bool> {
        self.tasks.process(ctx);

        match self.mode {
            GenericMode::Entering => {
                ctx.events.push(AvatarEvent::GenericStage { stage: self.stage });
                self.mode = GenericMode::FadingIn;
            }
            GenericMode::FadingIn => {
                let blend = step_blend(self.blend, 1.0, self.spec.fade_in, ctx.dt);
                self.set_blend(ctx, blend);
                if self.blend >= 1.0 {
                    self.mode = GenericMode::Normal;
                }
                self.run_stage(ctx);
            }
            GenericMode::Normal => self.run_stage(ctx),
            GenericMode::FadingOut => {
                let blend = step_blend(self.blend, 0.0, self.spec.fade_out, ctx.dt);
                self.set_blend(ctx, blend);
                if self.blend <= 0.0 {
                    self.mode = GenericMode::Exit;
                }
            }
            GenericMode::Exit | GenericMode::Abort => {
                info!(avatar = %ctx.avatar, mode = ?self.mode, "generic sequence over");
                return Ok(false);
            }
        }

        self.move_avatar(ctx);
        Ok(true)
    }

    pub(super) fn msg_receive(&mut self, ctx: &mut BrainContext<'_>, msg: &AvatarMessage) -> bool {
        match msg {
            AvatarMessage::Generic(GenericCommand::Exit) => {
                if !matches!(self.mode, GenericMode::Exit | GenericMode::Abort) {
                    self.mode = GenericMode::FadingOut;
                }
                true
            }
            AvatarMessage::Generic(GenericCommand::GotoStage(stage)) => {
                if *stage < self.spec.stages.len() {
                    self.goto_stage(ctx, Some(*stage));
                } else {
                    warn!(avatar = %ctx.avatar, stage, "no such generic stage");
                }
                true
            }
            _ => queue_task_message(&mut self.tasks, msg, ctx.config),
        }
    }
}
