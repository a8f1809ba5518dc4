//! On-foot control while standing on moving geometry.

use tracing::{info, warn};

use super::human::HumanBrain;
use super::BrainContext;
use crate::avatar::messages::AvatarMessage;
use crate::avatar::strategy::{MovementStrategy, RidingStrategy, WalkingStrategy};
use crate::config::HumanConfig;
use crate::error::Result;

/// A human brain whose walker is swapped for the riding strategy while active.
#[derive(Debug)]
pub struct RideBrain {
    human: HumanBrain,
}

impl RideBrain {
    pub fn new(tunables: HumanConfig) -> Self {
        Self {
            human: HumanBrain::new(tunables),
        }
    }

    pub fn human(&self) -> &HumanBrain {
        &self.human
    }

    pub fn human_mut(&mut self) -> &mut HumanBrain {
        &mut self.human
    }

    pub(super) fn activate(&mut self, ctx: &mut BrainContext<'_>) {
        let riding = match ctx.controller.take_strategy() {
            Some(MovementStrategy::Walking(walking)) => RidingStrategy::new(walking),
            Some(MovementStrategy::Riding(riding)) => riding,
            Some(other) => {
                warn!(avatar = %ctx.avatar, strategy = %other.kind(), "riding from a non-walking strategy");
                RidingStrategy::new(WalkingStrategy::from_config(ctx.config))
            }
            None => RidingStrategy::new(WalkingStrategy::from_config(ctx.config)),
        };
        ctx.controller.bind_strategy(MovementStrategy::Riding(riding));
        self.human.activate(ctx);
        info!(avatar = %ctx.avatar, "riding");
    }

    pub(super) fn deactivate(&mut self, ctx: &mut BrainContext<'_>) {
        self.human.deactivate(ctx);
        match ctx.controller.take_strategy() {
            Some(MovementStrategy::Riding(riding)) => {
                ctx.controller
                    .bind_strategy(MovementStrategy::Walking(riding.into_walking()));
            }
            Some(other) => {
                ctx.controller.bind_strategy(other);
            }
            None => {
                ctx.controller
                    .bind_strategy(MovementStrategy::Walking(WalkingStrategy::from_config(
                        ctx.config,
                    )));
            }
        }
        ctx.controller.reset_strategy(false);
    }

    pub(super) fn apply(&mut self, ctx: &mut BrainContext<'_>) -> Result<bool> {
        self.human.apply(ctx)
    }

    pub(super) fn msg_receive(&mut self, ctx: &mut BrainContext<'_>, msg: &AvatarMessage) -> bool {
        match msg {
            AvatarMessage::RideLeave => {
                ctx.stack_ops.pop();
                true
            }
            AvatarMessage::RideEnter => true,
            _ => self.human.msg_receive(ctx, msg),
        }
    }
}
