//! Water: wading on foot, then surface swimming once the water is deep enough.
//!
//! The swim brain sits on top of a still-active brain and forwards to it while the
//! avatar only wades. Swimming suspends that brain and swaps the walking strategy
//! for the swimming one until the avatar touches bottom in shallow water again.

use tracing::{debug, info};

use super::{queue_task_message, BrainContext, BrainEntry, BrainSpec, TurnRamp};
use crate::avatar::behavior::{Behavior, BehaviorSet};
use crate::avatar::constants::swim::{MAX_SWIM_DISTANCE, NO_REGION_DISTANCE};
use crate::avatar::messages::AvatarMessage;
use crate::avatar::strategy::{MovementStrategy, SwimmingStrategy, WalkingStrategy};
use crate::avatar::swim_region::SwimRegion;
use crate::avatar::task::TaskQueue;
use crate::config::SwimBrainConfig;
use crate::error::Result;

const TREAD_WATER: usize = 0;
const SWIM_FORWARD: usize = 1;
const SWIM_FORWARD_FAST: usize = 2;
const SWIM_BACK: usize = 3;
const SWIM_LEFT: usize = 4;
const SWIM_RIGHT: usize = 5;
const SWIM_TURN_LEFT: usize = 6;
const SWIM_TURN_RIGHT: usize = 7;
const TREAD_TURN_LEFT: usize = 8;
const TREAD_TURN_RIGHT: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwimMode {
    Walking,
    Wading,
    Swimming2D,
    /// Reserved; behaves like surface swimming
    Swimming3D,
    Abort,
}

impl SwimMode {
    fn is_swimming(self) -> bool {
        matches!(self, SwimMode::Swimming2D | SwimMode::Swimming3D)
    }
}

#[derive(Debug)]
pub struct SwimBrain {
    mode: SwimMode,
    region: Option<SwimRegion>,
    behaviors: BehaviorSet,
    tasks: TaskQueue,
    tunables: SwimBrainConfig,
    turn: TurnRamp,
    /// Walking strategy set aside while swimming
    parked: Option<MovementStrategy>,
    /// Swim clips have fully faded since the last swim
    faded: bool,
}

impl SwimBrain {
    pub fn new(region: Option<SwimRegion>, tunables: SwimBrainConfig) -> Self {
        let rate = tunables.fade_rate;
        let names = [
            "TreadWater",
            "SwimForward",
            "SwimForwardFast",
            "SwimBack",
            "SwimLeft",
            "SwimRight",
            "SwimTurnLeft",
            "SwimTurnRight",
            "TreadTurnLeft",
            "TreadTurnRight",
        ];
        Self {
            mode: SwimMode::Walking,
            region,
            behaviors: BehaviorSet::new(
                names.into_iter().map(|n| Behavior::new(n, rate, rate)).collect(),
            ),
            tasks: TaskQueue::new(),
            tunables,
            turn: TurnRamp::default(),
            parked: None,
            faded: true,
        }
    }

    pub fn mode(&self) -> SwimMode {
        self.mode
    }

    pub fn region(&self) -> Option<&SwimRegion> {
        self.region.as_ref()
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub(super) fn tasks_mut(&mut self) -> &mut TaskQueue {
        &mut self.tasks
    }

    /// Height of the water surface above the feet; negative when out of the water.
    fn surface_distance(&self, ctx: &BrainContext<'_>) -> f32 {
        match &self.region {
            Some(region) => region.depth_at(&ctx.controller.world_position()),
            None => NO_REGION_DISTANCE,
        }
    }

    pub(super) fn activate(&mut self, ctx: &mut BrainContext<'_>) {
        self.mode = SwimMode::Walking;
        debug!(
            avatar = %ctx.avatar,
            surface = self.region.as_ref().map(|r| r.surface_height),
            "swim brain active"
        );
    }

    pub(super) fn deactivate(&mut self, ctx: &mut BrainContext<'_>) {
        if self.mode.is_swimming() {
            self.restore_walking(ctx);
        }
        self.behaviors.clear(ctx.animation);
        if let Some(tread) = self.behaviors.get(TREAD_WATER) {
            ctx.animation.detach(tread.name);
        }
    }

    pub(super) fn suspend(&mut self, ctx: &mut BrainContext<'_>) {
        self.behaviors.idle_only();
        self.turn.reset();
        if self.mode.is_swimming() {
            ctx.controller.set_turn_strength(0.0);
        }
    }

    fn start_swimming(&mut self, ctx: &mut BrainContext<'_>, below: &mut [BrainEntry]) {
        if let Some(entry) = below.last_mut() {
            entry.suspend(ctx);
        }
        let mut swimming = SwimmingStrategy::from_config(ctx.config);
        swimming.set_surface(self.region.clone());
        self.parked = ctx
            .controller
            .bind_strategy(MovementStrategy::Swimming(swimming));
        self.mode = SwimMode::Swimming2D;
        self.faded = false;
        info!(avatar = %ctx.avatar, "started swimming");
    }

    fn restore_walking(&mut self, ctx: &mut BrainContext<'_>) {
        let walking = self.parked.take().unwrap_or_else(|| {
            MovementStrategy::Walking(WalkingStrategy::from_config(ctx.config))
        });
        ctx.controller.bind_strategy(walking);
        ctx.controller.reset_strategy(false);
        self.behaviors.idle_only();
    }

    fn stop_swimming(&mut self, ctx: &mut BrainContext<'_>, below: &mut [BrainEntry]) {
        self.restore_walking(ctx);
        if let Some(entry) = below.last_mut() {
            entry.resume(ctx);
        }
        self.mode = SwimMode::Wading;
        info!(avatar = %ctx.avatar, "stopped swimming");
    }

    pub(super) fn apply(&mut self, ctx: &mut BrainContext<'_>, below: &mut [BrainEntry]) -> Result<bool> {
        let dist = self.surface_distance(ctx);
        match self.mode {
            SwimMode::Walking => {
                if dist >= 0.0 {
                    self.mode = SwimMode::Wading;
                }
            }
            SwimMode::Wading => {
                if dist < 0.0 {
                    self.mode = SwimMode::Walking;
                } else if dist > self.tunables.min_swim_depth && dist < MAX_SWIM_DISTANCE {
                    self.start_swimming(ctx, below);
                }
            }
            SwimMode::Swimming2D | SwimMode::Swimming3D => {
                let touching = ctx.controller.swimming().is_some_and(|s| s.had_contacts());
                if dist < self.tunables.wade_exit_depth && touching {
                    self.stop_swimming(ctx, below);
                }
            }
            SwimMode::Abort => return Ok(false),
        }

        if self.mode.is_swimming() {
            self.swim(ctx);
            return Ok(true);
        }

        if !self.faded {
            self.behaviors.advance(ctx.dt, ctx.animation);
            if self.behaviors.is_movement_zero_blend() {
                if let Some(tread) = self.behaviors.get(TREAD_WATER) {
                    ctx.animation.detach(tread.name);
                }
                self.faded = true;
            }
        }
        if let Some((next, rest)) = below.split_last_mut() {
            // The brain underneath keeps walking; its own pop requests don't apply here
            next.brain.apply(ctx, rest)?;
        }
        Ok(true)
    }

    fn swim(&mut self, ctx: &mut BrainContext<'_>) {
        self.tasks.process(ctx);

        let input = &*ctx.input;
        let fwd = input.forward();
        let back = input.backward() && !fwd;
        let fast = input.fast();
        let left = input.strafe_left() && !input.strafe_right();
        let right = input.strafe_right() && !input.strafe_left();
        let turn_dir = input.turn_direction();
        let analog = input.analog_turn();
        let keyboard_strength = input.keyboard_turn_strength();

        let b = &mut self.behaviors;
        let turning_fwd = fwd && !fast && turn_dir != 0.0;
        b.set_active(SWIM_FORWARD, fwd && !fast && turn_dir == 0.0);
        b.set_active(SWIM_FORWARD_FAST, fwd && fast);
        b.set_active(SWIM_BACK, back);
        b.set_active(SWIM_LEFT, left && !fwd && !back);
        b.set_active(SWIM_RIGHT, right && !fwd && !back);
        b.set_active(SWIM_TURN_LEFT, turning_fwd && turn_dir > 0.0);
        b.set_active(SWIM_TURN_RIGHT, turning_fwd && turn_dir < 0.0);
        b.set_active(TREAD_TURN_LEFT, !fwd && !back && turn_dir > 0.0);
        b.set_active(TREAD_TURN_RIGHT, !fwd && !back && turn_dir < 0.0);

        let tunables = &self.tunables.turn;
        let speed = self.turn.speed(tunables, turn_dir, ctx.time) * keyboard_strength
            + analog * tunables.max_turn_speed;
        ctx.controller.set_turn_strength(speed);

        self.behaviors.advance(ctx.dt, ctx.animation);
        let motion = ctx.animation.root_motion();
        ctx.controller.recalc_velocity(motion, ctx.dt);
    }

    pub(super) fn msg_receive(&mut self, ctx: &mut BrainContext<'_>, msg: &AvatarMessage) -> bool {
        match msg {
            AvatarMessage::SwimLeave => {
                debug!(avatar = %ctx.avatar, "left swim region");
                self.mode = SwimMode::Abort;
                true
            }
            AvatarMessage::SwimEnter(region) => {
                self.region = Some(region.clone());
                if let Some(swimming) = ctx.controller.swimming_mut() {
                    swimming.set_surface(Some(region.clone()));
                }
                true
            }
            AvatarMessage::TogglePhysical => {
                ctx.stack_ops.push(BrainSpec::Drive, true);
                true
            }
            _ if self.mode.is_swimming() => queue_task_message(&mut self.tasks, msg, ctx.config),
            // Wading: the brain underneath handles everything else
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::brain::test_rig::Rig;
    use crate::avatar::brain::{ArmatureBrain, BrainKind, BrainStack, Lifecycle};
    use crate::avatar::input::ControlCode;
    use crate::avatar::math::Point;
    use crate::avatar::strategy::StrategyKind;

    fn swim_stack(rig: &mut Rig, surface: f32) -> BrainStack {
        let mut stack = BrainStack::new();
        let human = BrainSpec::Human.build(&rig.config);
        stack.push(human, false, &mut rig.ctx());
        let swim = BrainSpec::Swim(Some(SwimRegion::still(surface))).build(&rig.config);
        stack.push(swim, false, &mut rig.ctx());
        stack
    }

    fn swim_mode(stack: &BrainStack) -> SwimMode {
        match &stack.entries()[1].brain {
            ArmatureBrain::Swim(s) => s.mode(),
            other => panic!("expected swim brain, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_shallow_water_wades_with_human_in_charge() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = swim_stack(&mut rig, 2.0);
        rig.input.set_key(ControlCode::MoveForward, true);
        for _ in 0..60 {
            rig.tick(&mut stack);
        }
        assert_eq!(swim_mode(&stack), SwimMode::Wading);
        assert_eq!(rig.controller.strategy_kind(), Some(StrategyKind::Walking));
        assert_eq!(stack.entries()[0].lifecycle(), Lifecycle::Active);
        assert!(rig.controller.world_position().y > 2.0, "human walked while wading");
    }

    #[test]
    fn test_deep_water_swims_then_shallows_wade() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = swim_stack(&mut rig, 6.0);
        for _ in 0..3 {
            rig.tick(&mut stack);
        }
        assert_eq!(swim_mode(&stack), SwimMode::Swimming2D);
        assert_eq!(rig.controller.strategy_kind(), Some(StrategyKind::Swimming));
        assert_eq!(stack.entries()[0].lifecycle(), Lifecycle::Suspended);

        // The water drains to knee depth; the swimmer sinks and touches bottom
        let handled = stack.msg_receive(
            &mut rig.ctx(),
            &AvatarMessage::SwimEnter(SwimRegion::still(1.0)),
        );
        assert!(handled);
        for _ in 0..240 {
            rig.tick(&mut stack);
        }
        assert_eq!(swim_mode(&stack), SwimMode::Wading);
        assert_eq!(rig.controller.strategy_kind(), Some(StrategyKind::Walking));
        assert_eq!(stack.entries()[0].lifecycle(), Lifecycle::Active);
    }

    #[test]
    fn test_swim_leave_pops_and_restores_walking() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = swim_stack(&mut rig, 6.0);
        for _ in 0..3 {
            rig.tick(&mut stack);
        }
        assert!(stack.msg_receive(&mut rig.ctx(), &AvatarMessage::SwimLeave));
        rig.tick(&mut stack);
        rig.tick(&mut stack);
        assert_eq!(stack.top_kind(), Some(BrainKind::Human));
        assert_eq!(rig.controller.strategy_kind(), Some(StrategyKind::Walking));
        assert_eq!(stack.entries()[0].lifecycle(), Lifecycle::Active);
    }

    #[test]
    fn test_no_region_never_swims() {
        let mut rig = Rig::standing_at(Point::new(0.0, 0.0, 0.0));
        let mut stack = BrainStack::new();
        let human = BrainSpec::Human.build(&rig.config);
        stack.push(human, false, &mut rig.ctx());
        let swim = BrainSpec::Swim(None).build(&rig.config);
        stack.push(swim, false, &mut rig.ctx());
        for _ in 0..10 {
            rig.tick(&mut stack);
        }
        assert_eq!(swim_mode(&stack), SwimMode::Walking);
    }
}
