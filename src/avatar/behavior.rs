//! Weighted behaviors: named blend triggers with fade rates.

use super::animation::AnimationLayer;

#[derive(Debug, Clone)]
pub struct Behavior {
    pub name: &'static str,
    strength: f32,
    target: f32,
    /// Strength gained per second while rising; 0 snaps
    fade_in: f32,
    /// Strength lost per second while falling; 0 snaps
    fade_out: f32,
}

impl Behavior {
    pub fn new(name: &'static str, fade_in: f32, fade_out: f32) -> Self {
        Self {
            name,
            strength: 0.0,
            target: 0.0,
            fade_in,
            fade_out,
        }
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    fn advance(&mut self, dt: f32) {
        let rate = if self.target > self.strength {
            self.fade_in
        } else {
            self.fade_out
        };
        if rate <= 0.0 {
            self.strength = self.target;
            return;
        }
        let step = rate * dt;
        self.strength = if self.target > self.strength {
            (self.strength + step).min(self.target)
        } else {
            (self.strength - step).max(self.target)
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorTransition {
    Started(usize),
    Stopped(usize),
}

/// Ordered behavior list. Index 0 is the idle behavior, held at full strength.
#[derive(Debug, Clone)]
pub struct BehaviorSet {
    behaviors: Vec<Behavior>,
}

impl BehaviorSet {
    pub const IDLE: usize = 0;

    pub fn new(mut behaviors: Vec<Behavior>) -> Self {
        if let Some(idle) = behaviors.first_mut() {
            idle.target = 1.0;
            idle.strength = 1.0;
        }
        Self { behaviors }
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Behavior> {
        self.behaviors.get(index)
    }

    pub fn strength(&self, index: usize) -> f32 {
        self.behaviors.get(index).map_or(0.0, |b| b.strength)
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.strength(index) > 0.0
    }

    pub fn set_target(&mut self, index: usize, target: f32) {
        if index == Self::IDLE {
            return;
        }
        if let Some(b) = self.behaviors.get_mut(index) {
            b.target = target.clamp(0.0, 1.0);
        }
    }

    pub fn set_active(&mut self, index: usize, on: bool) {
        self.set_target(index, if on { 1.0 } else { 0.0 });
    }

    /// Fades everything but idle out.
    pub fn idle_only(&mut self) {
        for b in self.behaviors.iter_mut().skip(1) {
            b.target = 0.0;
        }
    }

    /// Drops every non-idle behavior to zero at once.
    pub fn clear(&mut self, animation: &mut dyn AnimationLayer) {
        for b in self.behaviors.iter_mut().skip(1) {
            b.target = 0.0;
            b.strength = 0.0;
            animation.detach(b.name);
        }
    }

    pub fn is_movement_zero_blend(&self) -> bool {
        self.behaviors.iter().skip(1).all(|b| b.strength <= 0.0)
    }

    /// Moves strengths toward their targets and mirrors them into `animation`.
    pub fn advance(
        &mut self,
        dt: f32,
        animation: &mut dyn AnimationLayer,
    ) -> Vec<BehaviorTransition> {
        let mut transitions = Vec::new();
        for (index, b) in self.behaviors.iter_mut().enumerate() {
            let was_on = b.strength > 0.0;
            b.advance(dt);
            let is_on = b.strength > 0.0;

            match (was_on, is_on) {
                (false, true) => {
                    animation.attach(b.name, b.strength);
                    transitions.push(BehaviorTransition::Started(index));
                }
                (true, false) => {
                    animation.detach(b.name);
                    transitions.push(BehaviorTransition::Stopped(index));
                }
                (true, true) => {
                    if !animation.is_attached(b.name) {
                        animation.attach(b.name, b.strength);
                    }
                    animation.set_blend(b.name, b.strength);
                }
                (false, false) => {}
            }
        }
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::animation::BlendMixer;

    fn set() -> BehaviorSet {
        BehaviorSet::new(vec![
            Behavior::new("Idle", 0.0, 0.0),
            Behavior::new("Walk", 2.0, 4.0),
            Behavior::new("StandingJump", 0.0, 0.0),
        ])
    }

    #[test]
    fn test_fades_at_configured_rates() {
        let mut behaviors = set();
        let mut mixer = BlendMixer::with_locomotion_clips(Some(3));
        behaviors.set_active(1, true);
        let t = behaviors.advance(0.25, &mut mixer);
        assert_eq!(t, vec![BehaviorTransition::Started(1)]);
        assert!((behaviors.strength(1) - 0.5).abs() < 1e-6);
        assert!((mixer.blend("Walk") - 0.5).abs() < 1e-6);

        behaviors.set_active(1, false);
        let t = behaviors.advance(0.25, &mut mixer);
        assert_eq!(t, vec![BehaviorTransition::Stopped(1)]);
        assert!(!mixer.is_attached("Walk"));
    }

    #[test]
    fn test_zero_rate_snaps() {
        let mut behaviors = set();
        let mut mixer = BlendMixer::with_locomotion_clips(Some(3));
        behaviors.set_active(2, true);
        behaviors.advance(0.001, &mut mixer);
        assert_eq!(behaviors.strength(2), 1.0);
    }

    #[test]
    fn test_idle_holds_and_idle_only_fades_rest() {
        let mut behaviors = set();
        let mut mixer = BlendMixer::with_locomotion_clips(Some(3));
        behaviors.set_active(BehaviorSet::IDLE, false);
        behaviors.set_active(1, true);
        behaviors.advance(1.0, &mut mixer);
        assert!(!behaviors.is_movement_zero_blend());

        behaviors.idle_only();
        behaviors.advance(1.0, &mut mixer);
        assert_eq!(behaviors.strength(BehaviorSet::IDLE), 1.0);
        assert!(behaviors.is_movement_zero_blend());
    }
}
