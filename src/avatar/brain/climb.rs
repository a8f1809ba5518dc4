//! Climbing walls and ladders.
//!
//! While climbing the controller is kinematic; the brain moves the avatar one stage
//! at a time by posing it directly, probing the surroundings between stages.

use bitflags::bitflags;
use tracing::{debug, info};

use super::{queue_task_message, BrainContext};
use crate::avatar::math::{transform_from, up, Point, Transform, Vec3};
use crate::avatar::messages::AvatarMessage;
use crate::avatar::physics::CollisionMask;
use crate::avatar::task::TaskQueue;
use crate::config::ClimbConfig;
use crate::error::Result;

/// Seconds one climb, mount or dismount stage takes.
const STAGE_LENGTH: f32 = 1.0;
/// Distance covered by one climbing stage.
const CLIMB_STEP: f32 = 2.0;
/// How far a dismount over the top carries the avatar onto the ledge.
const LEDGE_DEPTH: f32 = 2.0;
/// How far a release pushes the avatar off the wall.
const RELEASE_PUSH: f32 = 1.0;

bitflags! {
    /// Set of climb directions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClimbDirection: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

impl ClimbDirection {
    pub const NONE: ClimbDirection = ClimbDirection::empty();
    pub const ALL: ClimbDirection = ClimbDirection::all();

    /// World-space unit offset for the set, given the avatar's pose.
    fn offset(self, pose: &Transform) -> Vec3 {
        let mut offset = Vec3::zeros();
        for direction in self.iter() {
            offset += if direction == ClimbDirection::UP {
                up()
            } else if direction == ClimbDirection::DOWN {
                -up()
            } else if direction == ClimbDirection::LEFT {
                pose.rotation * -Vec3::x()
            } else {
                pose.rotation * Vec3::x()
            };
        }
        offset
    }
}

impl Default for ClimbDirection {
    fn default() -> Self {
        ClimbDirection::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClimbMode {
    Inactive,
    Unknown,
    Mounting(ClimbDirection),
    Climbing(ClimbDirection),
    Dismounting(ClimbDirection),
    Idle,
    Releasing,
    FallingOff,
    Finishing,
    Done,
}

#[derive(Debug, Clone)]
struct Stage {
    from: Transform,
    to: Transform,
    elapsed: f32,
}

impl Stage {
    /// Moves the avatar along the stage. Returns true once it arrived.
    fn advance(&mut self, ctx: &mut BrainContext<'_>) -> bool {
        self.elapsed += ctx.dt;
        let t = (self.elapsed / STAGE_LENGTH).min(1.0);
        let pose = self.from.lerp_slerp(&self.to, t);
        ctx.controller.set_world_pose(pose, ctx.backend, ctx.scene);
        t >= 1.0
    }
}

#[derive(Debug)]
pub struct ClimbBrain {
    mode: ClimbMode,
    mount_direction: ClimbDirection,
    allowed_climb: ClimbDirection,
    allowed_dismount: ClimbDirection,
    blocked: ClimbDirection,
    stage: Option<Stage>,
    tasks: TaskQueue,
    tunables: ClimbConfig,
    was_kinematic: bool,
}

impl ClimbBrain {
    pub fn new(mount_direction: ClimbDirection, tunables: ClimbConfig) -> Self {
        Self {
            mode: ClimbMode::Inactive,
            mount_direction,
            allowed_climb: ClimbDirection::ALL,
            allowed_dismount: ClimbDirection::NONE,
            blocked: ClimbDirection::NONE,
            stage: None,
            tasks: TaskQueue::new(),
            tunables,
            was_kinematic: false,
        }
    }

    pub fn mode(&self) -> ClimbMode {
        self.mode
    }

    pub fn blocked(&self) -> ClimbDirection {
        self.blocked
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub(super) fn tasks_mut(&mut self) -> &mut TaskQueue {
        &mut self.tasks
    }

    pub(super) fn activate(&mut self, ctx: &mut BrainContext<'_>) {
        self.was_kinematic = ctx.controller.is_kinematic();
        ctx.controller.set_kinematic(true, ctx.backend);
        self.mode = ClimbMode::Unknown;
        self.probe(ctx);
        if self.mount_direction.is_empty() {
            self.mode = ClimbMode::Idle;
        } else {
            let to = self.offset_pose(ctx, self.mount_direction.offset(&ctx.controller.global_transform()) * CLIMB_STEP);
            self.begin_stage(ctx, to);
            self.mode = ClimbMode::Mounting(self.mount_direction);
        }
        info!(avatar = %ctx.avatar, mount = ?self.mount_direction, "climb started");
    }

    pub(super) fn deactivate(&mut self, ctx: &mut BrainContext<'_>) {
        self.stage = None;
        if !self.was_kinematic {
            ctx.controller.set_kinematic(false, ctx.backend);
        }
        ctx.controller.reset_strategy(false);
        self.mode = ClimbMode::Inactive;
    }

    fn offset_pose(&self, ctx: &BrainContext<'_>, offset: Vec3) -> Transform {
        let pose = ctx.controller.global_transform();
        let target = Point::from(pose.translation.vector + offset);
        transform_from(target, pose.rotation)
    }

    fn begin_stage(&mut self, ctx: &BrainContext<'_>, to: Transform) {
        self.stage = Some(Stage {
            from: ctx.controller.global_transform(),
            to,
            elapsed: 0.0,
        });
    }

    /// Casts the four environment probes and records which directions are blocked.
    fn probe(&mut self, ctx: &BrainContext<'_>) {
        let pose = ctx.controller.global_transform();
        let origin = Point::from(pose.translation.vector) + up() * self.tunables.probe_origin_height;
        let mask = CollisionMask::STATIC | CollisionMask::AVATAR_BLOCKER;
        let mut blocked = ClimbDirection::NONE;
        for direction in ClimbDirection::ALL.iter() {
            let reach = if direction == ClimbDirection::UP || direction == ClimbDirection::DOWN {
                self.tunables.probe_vertical
            } else {
                self.tunables.probe_horizontal
            };
            let hit = ctx.backend.raycast(
                origin,
                direction.offset(&pose),
                reach,
                mask,
                Some(ctx.avatar),
            );
            blocked.set(direction, hit.is_some());
        }
        if blocked != self.blocked {
            debug!(avatar = %ctx.avatar, ?blocked, "climb probes changed");
        }
        self.blocked = blocked;
    }

    fn desired_direction(ctx: &BrainContext<'_>) -> ClimbDirection {
        let input = &*ctx.input;
        if input.forward() {
            ClimbDirection::UP
        } else if input.backward() {
            ClimbDirection::DOWN
        } else if input.turn_left() {
            ClimbDirection::LEFT
        } else if input.turn_right() {
            ClimbDirection::RIGHT
        } else {
            ClimbDirection::NONE
        }
    }

    fn dismount_offset(&self, ctx: &BrainContext<'_>, direction: ClimbDirection) -> Vec3 {
        let pose = ctx.controller.global_transform();
        let step = direction.offset(&pose) * CLIMB_STEP;
        if direction == ClimbDirection::UP {
            step + pose.rotation * Vec3::y() * LEDGE_DEPTH
        } else {
            step
        }
    }

    fn run_stage(&mut self, ctx: &mut BrainContext<'_>) -> bool {
        match self.stage.as_mut() {
            Some(stage) => {
                let arrived = stage.advance(ctx);
                if arrived {
                    self.stage = None;
                }
                arrived
            }
            None => true,
        }
    }

    pub(super) fn apply(&mut self, ctx: &mut BrainContext<'_>) -> Result<bool> {
        self.tasks.process(ctx);

        match self.mode {
            ClimbMode::Inactive | ClimbMode::Unknown => self.mode = ClimbMode::Idle,
            ClimbMode::Mounting(_) | ClimbMode::Climbing(_) => {
                if self.run_stage(ctx) {
                    self.probe(ctx);
                    self.mode = ClimbMode::Idle;
                }
            }
            ClimbMode::Dismounting(_) | ClimbMode::Releasing => {
                if self.run_stage(ctx) {
                    self.mode = ClimbMode::Finishing;
                }
            }
            ClimbMode::Idle => {
                let desired = Self::desired_direction(ctx);
                if desired.is_empty() {
                    // Holding still on the wall
                } else if self.allowed_dismount.contains(desired) {
                    let to = self.offset_pose(ctx, self.dismount_offset(ctx, desired));
                    self.begin_stage(ctx, to);
                    self.mode = ClimbMode::Dismounting(desired);
                    debug!(avatar = %ctx.avatar, direction = ?desired, "dismounting");
                } else if self.allowed_climb.contains(desired) && !self.blocked.contains(desired) {
                    let offset = desired.offset(&ctx.controller.global_transform()) * CLIMB_STEP;
                    let to = self.offset_pose(ctx, offset);
                    self.begin_stage(ctx, to);
                    self.mode = ClimbMode::Climbing(desired);
                }
            }
            ClimbMode::FallingOff | ClimbMode::Finishing => self.mode = ClimbMode::Done,
            ClimbMode::Done => {
                info!(avatar = %ctx.avatar, "climb finished");
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(super) fn msg_receive(&mut self, ctx: &mut BrainContext<'_>, msg: &AvatarMessage) -> bool {
        match msg {
            AvatarMessage::EnableClimb { direction, on } => {
                self.allowed_climb.set(*direction, *on);
                true
            }
            AvatarMessage::EnableDismount { direction, on } => {
                self.allowed_dismount.set(*direction, *on);
                true
            }
            AvatarMessage::ClimbRelease => {
                if matches!(self.mode, ClimbMode::Idle | ClimbMode::Climbing(_)) {
                    let back = ctx.controller.global_transform().rotation * -Vec3::y();
                    let to = self.offset_pose(ctx, back * RELEASE_PUSH);
                    self.begin_stage(ctx, to);
                    self.mode = ClimbMode::Releasing;
                }
                true
            }
            AvatarMessage::ClimbFallOff => {
                self.stage = None;
                self.mode = ClimbMode::FallingOff;
                true
            }
            _ => queue_task_message(&mut self.tasks, msg, ctx.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::brain::test_rig::Rig;
    use crate::avatar::brain::{ArmatureBrain, BrainKind, BrainSpec, BrainStack};
    use crate::avatar::input::ControlCode;
    use crate::avatar::physics::plane::PlaneWorld;

    fn climb_stack(rig: &mut Rig, mount: ClimbDirection) -> BrainStack {
        let mut stack = BrainStack::new();
        let human = BrainSpec::Human.build(&rig.config);
        stack.push(human, false, &mut rig.ctx());
        let climb = BrainSpec::Climb(mount).build(&rig.config);
        stack.push(climb, true, &mut rig.ctx());
        stack
    }

    fn climb(stack: &BrainStack) -> &ClimbBrain {
        match &stack.entries()[1].brain {
            ArmatureBrain::Climb(c) => c,
            other => panic!("expected climb, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_direction_bits() {
        let mut d = ClimbDirection::UP | ClimbDirection::LEFT;
        assert!(d.contains(ClimbDirection::UP));
        assert!(!d.contains(ClimbDirection::DOWN));
        d.set(ClimbDirection::UP, false);
        assert_eq!(d, ClimbDirection::LEFT);
        assert_eq!(ClimbDirection::default(), ClimbDirection::NONE);
        assert_eq!(ClimbDirection::ALL.iter().count(), 4);
        assert_eq!(ClimbDirection::ALL.bits(), 0b1111);
    }

    #[test]
    fn test_idle_without_input_stays_on_wall() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = climb_stack(&mut rig, ClimbDirection::NONE);
        let enable = AvatarMessage::EnableDismount {
            direction: ClimbDirection::ALL,
            on: true,
        };
        assert!(stack.msg_receive(&mut rig.ctx(), &enable));
        for _ in 0..30 {
            rig.tick(&mut stack);
        }
        assert_eq!(stack.top_kind(), Some(BrainKind::Climb));
        assert_eq!(climb(&stack).mode(), ClimbMode::Idle);
        assert!(rig.controller.world_position().coords.norm() < 1e-3);
    }

    #[test]
    fn test_mount_moves_up_kinematically() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = climb_stack(&mut rig, ClimbDirection::UP);
        assert!(rig.controller.is_kinematic());
        for _ in 0..70 {
            rig.tick(&mut stack);
        }
        assert_eq!(climb(&stack).mode(), ClimbMode::Idle);
        let z = rig.controller.world_position().z;
        assert!((z - CLIMB_STEP).abs() < 1e-3, "mounted to {z}");
    }

    #[test]
    fn test_blocked_direction_does_not_climb() {
        let mut world = PlaneWorld::with_ground(0.0);
        world.add_ceiling(8.0);
        let mut rig = Rig::in_world(world, Point::new(0.0, 0.0, 0.0));
        let mut stack = climb_stack(&mut rig, ClimbDirection::UP);
        for _ in 0..70 {
            rig.tick(&mut stack);
        }
        assert!(climb(&stack).blocked().contains(ClimbDirection::UP));

        rig.input.set_key(ControlCode::MoveForward, true);
        for _ in 0..70 {
            rig.tick(&mut stack);
        }
        assert_eq!(climb(&stack).mode(), ClimbMode::Idle);
        assert!((rig.controller.world_position().z - CLIMB_STEP).abs() < 1e-3);
    }

    #[test]
    fn test_dismount_over_top_pops_and_restores_physics() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = climb_stack(&mut rig, ClimbDirection::UP);
        let enable = AvatarMessage::EnableDismount {
            direction: ClimbDirection::UP,
            on: true,
        };
        assert!(stack.msg_receive(&mut rig.ctx(), &enable));
        rig.input.set_key(ControlCode::MoveForward, true);
        for _ in 0..200 {
            rig.tick(&mut stack);
            if stack.top_kind() == Some(BrainKind::Human) {
                break;
            }
        }
        assert_eq!(stack.top_kind(), Some(BrainKind::Human));
        rig.input.set_key(ControlCode::MoveForward, false);
        rig.tick(&mut stack);
        assert!(!rig.controller.is_kinematic());
        assert!(rig.controller.world_position().y > 1.0, "carried onto the ledge");
    }

    #[test]
    fn test_fall_off_ends_climb() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = climb_stack(&mut rig, ClimbDirection::UP);
        assert!(stack.msg_receive(&mut rig.ctx(), &AvatarMessage::ClimbFallOff));
        for _ in 0..3 {
            rig.tick(&mut stack);
        }
        assert_eq!(stack.top_kind(), Some(BrainKind::Human));
    }
}
