//! Control input as brains see it.
//!
//! While a seek runs, real input is parked in a shadow set and the seek writes
//! synthesized keys into the live set. Resuming restores the parked keys.

use bitflags::bitflags;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCode {
    MoveForward,
    MoveBackward,
    StrafeLeft,
    StrafeRight,
    TurnLeft,
    TurnRight,
    Fast,
    Jump,
    PushToTalk,
    AutoRun,
}

bitflags! {
    /// Set of held control keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlKeys: u32 {
        const MOVE_FORWARD = 1 << 0;
        const MOVE_BACKWARD = 1 << 1;
        const STRAFE_LEFT = 1 << 2;
        const STRAFE_RIGHT = 1 << 3;
        const TURN_LEFT = 1 << 4;
        const TURN_RIGHT = 1 << 5;
        const FAST = 1 << 6;
        const JUMP = 1 << 7;
        const PUSH_TO_TALK = 1 << 8;
        const AUTO_RUN = 1 << 9;
    }
}

impl Default for ControlKeys {
    fn default() -> Self {
        ControlKeys::empty()
    }
}

impl From<ControlCode> for ControlKeys {
    fn from(code: ControlCode) -> Self {
        match code {
            ControlCode::MoveForward => ControlKeys::MOVE_FORWARD,
            ControlCode::MoveBackward => ControlKeys::MOVE_BACKWARD,
            ControlCode::StrafeLeft => ControlKeys::STRAFE_LEFT,
            ControlCode::StrafeRight => ControlKeys::STRAFE_RIGHT,
            ControlCode::TurnLeft => ControlKeys::TURN_LEFT,
            ControlCode::TurnRight => ControlKeys::TURN_RIGHT,
            ControlCode::Fast => ControlKeys::FAST,
            ControlCode::Jump => ControlKeys::JUMP,
            ControlCode::PushToTalk => ControlKeys::PUSH_TO_TALK,
            ControlCode::AutoRun => ControlKeys::AUTO_RUN,
        }
    }
}

impl ControlKeys {
    /// Keys a seek synthesizes and clears.
    pub const MOVEMENT: ControlKeys = ControlKeys::MOVE_FORWARD
        .union(ControlKeys::MOVE_BACKWARD)
        .union(ControlKeys::STRAFE_LEFT)
        .union(ControlKeys::STRAFE_RIGHT)
        .union(ControlKeys::TURN_LEFT)
        .union(ControlKeys::TURN_RIGHT)
        .union(ControlKeys::FAST);
}

#[derive(Debug, Clone, Default)]
pub struct ControlState {
    live: ControlKeys,
    shadow: ControlKeys,
    suspend_depth: u32,
    /// Analog turn in [-1, 1], positive turns left
    analog_turn: f32,
    shadow_analog_turn: f32,
    /// Scales keyboard turning, 1.0 by default
    keyboard_turn_strength: Option<f32>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key from the user. Parked in the shadow set while suspended.
    pub fn set_key(&mut self, code: ControlCode, pressed: bool) {
        let target = if self.is_suspended() {
            &mut self.shadow
        } else {
            &mut self.live
        };
        // AutoRun toggles on press rather than following the key
        if code == ControlCode::AutoRun {
            if pressed {
                target.toggle(ControlKeys::AUTO_RUN);
            }
            return;
        }
        target.set(code.into(), pressed);
        // Moving backward cancels autorun
        if code == ControlCode::MoveBackward && pressed {
            target.remove(ControlKeys::AUTO_RUN);
        }
    }

    /// Writes a key into the live set regardless of suspension.
    pub fn set_synthetic(&mut self, code: ControlCode, pressed: bool) {
        self.live.set(code.into(), pressed);
    }

    pub fn clear_synthetic_movement(&mut self) {
        self.live.remove(ControlKeys::MOVEMENT);
    }

    /// Keys currently seen by brains.
    pub fn held(&self) -> ControlKeys {
        self.live
    }

    pub fn set_analog_turn(&mut self, turn: f32) {
        let turn = if turn.is_finite() { turn.clamp(-1.0, 1.0) } else { 0.0 };
        if self.is_suspended() {
            self.shadow_analog_turn = turn;
        } else {
            self.analog_turn = turn;
        }
    }

    pub fn set_keyboard_turn_strength(&mut self, strength: f32) {
        self.keyboard_turn_strength = Some(strength.max(0.0));
    }

    pub fn keyboard_turn_strength(&self) -> f32 {
        self.keyboard_turn_strength.unwrap_or(1.0)
    }

    pub fn analog_turn(&self) -> f32 {
        self.analog_turn
    }

    pub fn is_pressed(&self, code: ControlCode) -> bool {
        self.live.contains(code.into())
    }

    pub fn forward(&self) -> bool {
        self.is_pressed(ControlCode::MoveForward) || self.is_pressed(ControlCode::AutoRun)
    }

    pub fn backward(&self) -> bool {
        self.is_pressed(ControlCode::MoveBackward)
    }

    pub fn turn_left(&self) -> bool {
        self.is_pressed(ControlCode::TurnLeft)
    }

    pub fn turn_right(&self) -> bool {
        self.is_pressed(ControlCode::TurnRight)
    }

    pub fn strafe_left(&self) -> bool {
        self.is_pressed(ControlCode::StrafeLeft)
    }

    pub fn strafe_right(&self) -> bool {
        self.is_pressed(ControlCode::StrafeRight)
    }

    pub fn fast(&self) -> bool {
        self.is_pressed(ControlCode::Fast)
    }

    pub fn jump(&self) -> bool {
        self.is_pressed(ControlCode::Jump)
    }

    /// -1, 0 or 1 from the turn keys; positive turns left.
    pub fn turn_direction(&self) -> f32 {
        match (self.turn_left(), self.turn_right()) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_depth > 0
    }

    /// Parks live input. Nested suspends need matching resumes.
    pub fn suspend(&mut self) {
        if self.suspend_depth == 0 {
            self.shadow = self.live;
            self.shadow_analog_turn = self.analog_turn;
            self.live = ControlKeys::empty();
            self.analog_turn = 0.0;
        }
        self.suspend_depth += 1;
    }

    pub fn resume(&mut self) {
        match self.suspend_depth {
            0 => {}
            1 => {
                self.suspend_depth = 0;
                self.live = self.shadow;
                self.analog_turn = self.shadow_analog_turn;
                self.shadow = ControlKeys::empty();
            }
            _ => self.suspend_depth -= 1,
        }
    }
}
