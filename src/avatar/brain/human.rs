//! The base on-foot brain.

use tracing::{debug, info, warn};

use super::{queue_task_message, BrainContext, BrainSpec, TurnRamp};
use crate::avatar::behavior::{Behavior, BehaviorSet, BehaviorTransition};
use crate::avatar::messages::{AvatarEvent, AvatarMessage};
use crate::avatar::strategy::{MovementStrategy, WalkingStrategy};
use crate::avatar::task::TaskQueue;
use crate::config::HumanConfig;
use crate::error::Result;

pub const IDLE: usize = 0;
pub const WALK: usize = 1;
pub const RUN: usize = 2;
pub const WALK_BACK: usize = 3;
pub const STANDING_TURN_LEFT: usize = 4;
pub const STANDING_TURN_RIGHT: usize = 5;
pub const STEP_LEFT: usize = 6;
pub const STEP_RIGHT: usize = 7;
pub const FALL: usize = 8;
pub const STANDING_JUMP: usize = 9;
pub const WALKING_JUMP: usize = 10;
pub const RUNNING_JUMP: usize = 11;
pub const GROUND_IMPACT: usize = 12;
pub const RUNNING_IMPACT: usize = 13;
pub const MOVING_TURN_LEFT: usize = 14;
pub const MOVING_TURN_RIGHT: usize = 15;
pub const PUSH_WALK: usize = 16;

const JUMPS: [usize; 3] = [STANDING_JUMP, WALKING_JUMP, RUNNING_JUMP];

/// Fall strength past which a long fall counts as a panic.
const PANIC_FALL_STRENGTH: f32 = 0.8;

fn human_behaviors() -> BehaviorSet {
    BehaviorSet::new(vec![
        Behavior::new("Idle", 0.0, 0.0),
        Behavior::new("Walk", 3.0, 5.0),
        Behavior::new("Run", 3.0, 2.0),
        Behavior::new("WalkBack", 3.0, 3.0),
        Behavior::new("StandingTurnLeft", 3.0, 6.0),
        Behavior::new("StandingTurnRight", 3.0, 6.0),
        Behavior::new("StepLeft", 3.0, 3.0),
        Behavior::new("StepRight", 3.0, 3.0),
        Behavior::new("Fall", 1.0, 10.0),
        Behavior::new("StandingJump", 3.0, 3.0),
        Behavior::new("WalkingJump", 10.0, 3.0),
        Behavior::new("RunningJump", 10.0, 2.0),
        Behavior::new("GroundImpact", 6.0, 3.0),
        Behavior::new("RunningImpact", 6.0, 3.0),
        Behavior::new("MovingTurnLeft", 3.0, 3.0),
        Behavior::new("MovingTurnRight", 3.0, 3.0),
        Behavior::new("PushWalk", 3.0, 3.0),
    ])
}

#[derive(Debug)]
pub struct HumanBrain {
    behaviors: BehaviorSet,
    tasks: TaskQueue,
    tunables: HumanConfig,
    turn: TurnRamp,
    was_on_ground: bool,
    /// Jump behavior currently playing
    active_jump: Option<usize>,
    /// Jump key must be released between jumps
    jump_armed: bool,
    /// The current flight began with a jump; landing plays no impact
    flight_from_jump: bool,
    active_impact: Option<usize>,
    panicked: bool,
}

impl HumanBrain {
    pub fn new(tunables: HumanConfig) -> Self {
        Self {
            behaviors: human_behaviors(),
            tasks: TaskQueue::new(),
            tunables,
            turn: TurnRamp::default(),
            was_on_ground: true,
            active_jump: None,
            jump_armed: true,
            flight_from_jump: false,
            active_impact: None,
            panicked: false,
        }
    }

    pub fn behaviors(&self) -> &BehaviorSet {
        &self.behaviors
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub(super) fn tasks_mut(&mut self) -> &mut TaskQueue {
        &mut self.tasks
    }

    pub(super) fn activate(&mut self, ctx: &mut BrainContext<'_>) {
        if ctx.controller.strategy().is_none() {
            ctx.controller
                .bind_strategy(MovementStrategy::Walking(WalkingStrategy::from_config(
                    ctx.config,
                )));
        }
        self.was_on_ground = ctx.controller.is_on_ground();
    }

    pub(super) fn deactivate(&mut self, ctx: &mut BrainContext<'_>) {
        self.end_jump(ctx);
        self.behaviors.clear(ctx.animation);
        if let Some(idle) = self.behaviors.get(IDLE) {
            ctx.animation.detach(idle.name);
        }
        ctx.controller.set_turn_strength(0.0);
    }

    pub(super) fn suspend(&mut self, ctx: &mut BrainContext<'_>) {
        self.end_jump(ctx);
        self.behaviors.idle_only();
        self.turn.reset();
        ctx.controller.set_turn_strength(0.0);
    }

    pub(super) fn resume(&mut self, ctx: &mut BrainContext<'_>) {
        ctx.controller.reset_strategy(false);
        self.was_on_ground = ctx.controller.is_on_ground();
    }

    fn end_jump(&mut self, ctx: &mut BrainContext<'_>) {
        if let Some(jump) = self.active_jump.take() {
            self.behaviors.set_active(jump, false);
        }
        // Flight is released through the Stopped transition; force it if the
        // behavior never started
        for jump in JUMPS {
            if self.behaviors.is_active(jump) {
                if let Some(walking) = ctx.controller.walking_mut() {
                    walking.enable_controlled_flight(false);
                }
            }
        }
    }

    pub(super) fn apply(&mut self, ctx: &mut BrainContext<'_>) -> Result<bool> {
        self.tasks.process(ctx);

        let on_ground = ctx.controller.is_on_ground();
        let (time_in_air, impact_time, impact_velocity, pushing, controlled_flight) =
            match ctx.controller.walking() {
                Some(w) => (
                    w.time_in_air(),
                    w.impact_time(),
                    w.impact_velocity(),
                    w.pushing().is_some_and(|p| p.facing),
                    w.is_controlled_flight(),
                ),
                None => (0.0, 0.0, Default::default(), false, false),
            };

        let input = &*ctx.input;
        let fwd = input.forward();
        let back = input.backward();
        let fast = input.fast();
        let strafe_l = input.strafe_left() && !input.strafe_right();
        let strafe_r = input.strafe_right() && !input.strafe_left();
        let turn_dir = input.turn_direction();
        let jump_key = input.jump();
        let analog = input.analog_turn();
        let keyboard_strength = input.keyboard_turn_strength();
        let moving = fwd || back || strafe_l || strafe_r;

        // Jumping
        if !jump_key {
            self.jump_armed = true;
        }
        if on_ground && jump_key && self.jump_armed && self.active_jump.is_none() {
            let jump = if fwd && fast {
                RUNNING_JUMP
            } else if fwd {
                WALKING_JUMP
            } else {
                STANDING_JUMP
            };
            self.behaviors.set_active(jump, true);
            self.active_jump = Some(jump);
            self.jump_armed = false;
            self.flight_from_jump = true;
            debug!(avatar = %ctx.avatar, behavior = jump, "jump");
        }
        if let Some(jump) = self.active_jump {
            let done = self
                .behaviors
                .get(jump)
                .is_some_and(|b| ctx.animation.is_done(b.name));
            let landed = on_ground && !self.was_on_ground;
            if done || landed {
                self.behaviors.set_active(jump, false);
                self.active_jump = None;
            }
        }

        // Landing
        if on_ground && !self.was_on_ground {
            let hard = impact_time > self.tunables.impact_min_air_time
                || impact_velocity.z < self.tunables.impact_min_velocity;
            if hard && !self.flight_from_jump {
                let impact = if fwd && fast { RUNNING_IMPACT } else { GROUND_IMPACT };
                self.behaviors.set_active(impact, true);
                self.active_impact = Some(impact);
                debug!(avatar = %ctx.avatar, impact_time, "landing impact");
            }
            self.flight_from_jump = false;
            self.panicked = false;
        }
        if let Some(impact) = self.active_impact {
            if self
                .behaviors
                .get(impact)
                .is_some_and(|b| ctx.animation.is_done(b.name))
            {
                self.behaviors.set_active(impact, false);
                self.active_impact = None;
            }
        }

        // Ground locomotion
        let g = on_ground;
        let turning = turn_dir != 0.0;
        let b = &mut self.behaviors;
        b.set_active(WALK, g && fwd && !fast && !back && !turning && !pushing);
        b.set_active(PUSH_WALK, g && fwd && !fast && !back && pushing);
        b.set_active(RUN, g && fwd && fast && !back);
        b.set_active(WALK_BACK, g && back && !fwd);
        b.set_active(STEP_LEFT, g && strafe_l && !fwd && !back);
        b.set_active(STEP_RIGHT, g && strafe_r && !fwd && !back);
        b.set_active(STANDING_TURN_LEFT, g && turn_dir > 0.0 && !moving);
        b.set_active(STANDING_TURN_RIGHT, g && turn_dir < 0.0 && !moving);
        let walking_turn = g && fwd && !fast && !back && !pushing;
        b.set_active(MOVING_TURN_LEFT, walking_turn && turn_dir > 0.0);
        b.set_active(MOVING_TURN_RIGHT, walking_turn && turn_dir < 0.0);
        b.set_active(FALL, !on_ground && self.active_jump.is_none());

        // Turning
        let tunables = if fwd && fast {
            &self.tunables.run
        } else {
            &self.tunables.walk
        };
        let speed = self.turn.speed(tunables, turn_dir, ctx.time) * keyboard_strength
            + analog * tunables.max_turn_speed;
        let turn = if on_ground || !controlled_flight { speed } else { 0.0 };
        ctx.controller.set_turn_strength(turn);

        // Falling for too long
        if !on_ground
            && !self.panicked
            && self.behaviors.strength(FALL) > PANIC_FALL_STRENGTH
            && time_in_air > self.tunables.air_panic_time
        {
            warn!(avatar = %ctx.avatar, time_in_air, "fell too long; requesting panic link");
            self.behaviors.idle_only();
            self.panicked = true;
            ctx.events.push(AvatarEvent::PanicLink);
        }

        for transition in self.behaviors.advance(ctx.dt, ctx.animation) {
            match transition {
                BehaviorTransition::Started(i) if JUMPS.contains(&i) => {
                    if let Some(walking) = ctx.controller.walking_mut() {
                        walking.enable_controlled_flight(true);
                    }
                }
                BehaviorTransition::Stopped(i) if JUMPS.contains(&i) => {
                    if let Some(walking) = ctx.controller.walking_mut() {
                        walking.enable_controlled_flight(false);
                    }
                }
                _ => {}
            }
        }

        self.was_on_ground = on_ground;
        let motion = ctx.animation.root_motion();
        ctx.controller.recalc_velocity(motion, ctx.dt);
        Ok(true)
    }

    pub(super) fn msg_receive(&mut self, ctx: &mut BrainContext<'_>, msg: &AvatarMessage) -> bool {
        match msg {
            AvatarMessage::TogglePhysical => {
                info!(avatar = %ctx.avatar, "entering drive mode");
                ctx.stack_ops.push(BrainSpec::Drive, true);
            }
            AvatarMessage::SwimEnter(region) => {
                ctx.stack_ops.push(BrainSpec::Swim(Some(region.clone())), false);
            }
            AvatarMessage::ClimbStart { target, direction } => {
                ctx.warp(*target);
                ctx.stack_ops.push(BrainSpec::Climb(*direction), true);
            }
            AvatarMessage::RideEnter => {
                ctx.stack_ops.push(BrainSpec::Ride, true);
            }
            _ => return queue_task_message(&mut self.tasks, msg, ctx.config),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::brain::test_rig::Rig;
    use crate::avatar::brain::{BrainKind, BrainStack, StackOp};
    use crate::avatar::input::ControlCode;
    use crate::avatar::math::Point;
    use crate::avatar::physics::plane::PlaneWorld;

    fn human_stack(rig: &mut Rig) -> BrainStack {
        let mut stack = BrainStack::new();
        let brain = BrainSpec::Human.build(&rig.config);
        stack.push(brain, false, &mut rig.ctx());
        stack
    }

    fn human(stack: &BrainStack) -> &HumanBrain {
        match &stack.entries()[0].brain {
            crate::avatar::brain::ArmatureBrain::Human(h) => h,
            other => panic!("expected human, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_forward_key_walks_forward() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = human_stack(&mut rig);
        rig.input.set_key(ControlCode::MoveForward, true);
        for _ in 0..60 {
            rig.tick(&mut stack);
        }
        assert!(human(&stack).behaviors().is_active(WALK));
        let y = rig.controller.world_position().y;
        assert!(y > 2.0, "walked only {y}");
        assert!(rig.controller.is_on_ground());
    }

    #[test]
    fn test_fast_forward_runs_faster_than_walk() {
        let mut walker = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut runner = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut walk_stack = human_stack(&mut walker);
        let mut run_stack = human_stack(&mut runner);
        walker.input.set_key(ControlCode::MoveForward, true);
        runner.input.set_key(ControlCode::MoveForward, true);
        runner.input.set_key(ControlCode::Fast, true);
        for _ in 0..60 {
            walker.tick(&mut walk_stack);
            runner.tick(&mut run_stack);
        }
        assert!(human(&run_stack).behaviors().is_active(RUN));
        assert!(runner.controller.world_position().y > walker.controller.world_position().y + 2.0);
    }

    #[test]
    fn test_turn_key_turns_left() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = human_stack(&mut rig);
        rig.input.set_key(ControlCode::TurnLeft, true);
        for _ in 0..60 {
            rig.tick(&mut stack);
        }
        assert!(human(&stack).behaviors().is_active(STANDING_TURN_LEFT));
        let heading = rig.controller.heading();
        assert!(heading > 0.3 && heading < 3.0, "heading {heading}");
    }

    #[test]
    fn test_long_fall_lands_with_impact() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 30.0));
        let mut stack = human_stack(&mut rig);
        let mut saw_fall = false;
        let mut saw_impact = false;
        for _ in 0..240 {
            rig.tick(&mut stack);
            let brain = human(&stack);
            saw_fall |= brain.behaviors().is_active(FALL);
            saw_impact |= brain.behaviors().is_active(GROUND_IMPACT);
        }
        assert!(saw_fall);
        assert!(saw_impact);
        assert!(rig.controller.world_position().z < 0.1);
    }

    #[test]
    fn test_jump_leaves_ground_without_impact() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = human_stack(&mut rig);
        for _ in 0..5 {
            rig.tick(&mut stack);
        }
        rig.input.set_key(ControlCode::Jump, true);
        let mut peak: f32 = 0.0;
        let mut saw_flight = false;
        let mut saw_impact = false;
        for _ in 0..120 {
            rig.tick(&mut stack);
            peak = peak.max(rig.controller.world_position().z);
            saw_flight |= rig
                .controller
                .walking()
                .is_some_and(|w| w.is_controlled_flight());
            saw_impact |= human(&stack).behaviors().is_active(GROUND_IMPACT);
        }
        assert!(peak > 0.3, "peak {peak}");
        assert!(saw_flight);
        assert!(!saw_impact, "jump landings play no impact");
    }

    #[test]
    fn test_endless_fall_requests_panic_link() {
        let mut rig = Rig::in_world(PlaneWorld::new(), Point::new(0.0, 0.0, 0.0));
        let mut stack = human_stack(&mut rig);
        for _ in 0..(11 * 60) {
            rig.tick(&mut stack);
        }
        let panics = rig
            .take_events()
            .into_iter()
            .filter(|e| *e == AvatarEvent::PanicLink)
            .count();
        assert_eq!(panics, 1);
    }

    #[test]
    fn test_mode_messages_queue_pushes() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = human_stack(&mut rig);
        assert!(stack.msg_receive(&mut rig.ctx(), &AvatarMessage::TogglePhysical));
        assert!(matches!(
            rig.ops.drain().as_slice(),
            [StackOp::Push {
                spec: BrainSpec::Drive,
                suspend_current: true
            }]
        ));

        let region = crate::avatar::swim_region::SwimRegion::still(10.0);
        assert!(stack.msg_receive(&mut rig.ctx(), &AvatarMessage::SwimEnter(region)));
        let ops = rig.ops.drain();
        assert!(matches!(
            ops.as_slice(),
            [StackOp::Push {
                spec: BrainSpec::Swim(Some(_)),
                suspend_current: false
            }]
        ));
        assert_eq!(stack.top_kind(), Some(BrainKind::Human));
    }
}
