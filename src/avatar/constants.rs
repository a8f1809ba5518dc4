//! Locomotion constants.
//! Defaults for the configuration layer; code reads tunables from `LocomotionConfig`.

/// Physics constants
pub mod physics {
    /// Gravity in units/s² (feet, Z-up)
    pub const GRAVITY: f32 = -32.174;

    /// Vertical velocity floor; matches gravity's magnitude
    pub const TERMINAL_VELOCITY: f32 = GRAVITY;

    /// Fixed timestep for the simulation loop (60 Hz)
    pub const TIMESTEP: f32 = 1.0 / 60.0;

    /// `normal·up` at or above which a walking contact is ground
    pub const WALKING_SLOPE_LIMIT: f32 = 0.5;

    /// cos(55°)
    pub const SWIMMING_SLOPE_LIMIT: f32 = 0.573_576_4;

    pub const CAPSULE_RADIUS: f32 = 1.1;

    /// Feet to crown
    pub const CAPSULE_HEIGHT: f32 = 6.0;

    pub const STEP_HEIGHT: f32 = 1.0;

    /// Speed of the push-out along summed sliding normals
    pub const PUSH_OUT_SPEED: f32 = 5.0;

    pub const SKIN_WIDTH: f32 = 0.05;

    pub const AVATAR_MASS: f32 = 75.0;

    /// Seconds airborne before the avatar stops counting as grounded
    pub const AIR_TIME_THRESHOLD: f32 = 0.1;

    pub const MAX_CONTROLLED_FLIGHT: f32 = 1.0;

    pub const RIDE_SWEEP_MARGIN: f32 = 0.05;

    /// 360° minus (180° − 60°)
    pub const FALSE_GROUND_GAP_DEG: f32 = 240.0;

    pub const NORMAL_DEDUPE_EPSILON: f32 = 0.01;

    /// Requested vertical speeds below this get gravity applied
    pub const GRAVITY_APPLY_EPSILON: f32 = 0.001;

    /// Minimum downward displacement per step so standing always reports ground
    pub const MIN_GROUND_PROBE: f32 = 0.001;

    /// Turn rates below this are ignored
    pub const TURN_EPSILON: f32 = 0.0001;

    /// Small epsilon for float comparisons
    pub const EPSILON: f32 = 0.001;
}

/// Swimming defaults
pub mod swim {
    /// Depth at which buoyancy saturates
    pub const FULL_BUOYANCY_DEPTH: f32 = 5.0;

    /// Surface band divisor for the linear buoyancy ramp
    pub const BUOYANCY_DIVISOR: f32 = 4.0;

    pub const MAX_BUOYANCY: f32 = 3.0;

    pub const BOB_DAMPING: f32 = 0.9;

    pub const BOB_SPEED_THRESHOLD: f32 = 0.5;

    /// Surface distance at which wading becomes swimming
    pub const MIN_SWIM_DEPTH: f32 = 4.0;

    pub const WADE_EXIT_DEPTH: f32 = 3.5;

    /// Reported surface distance when no region is set
    pub const NO_REGION_DISTANCE: f32 = -100.0;

    /// Surface distances at or beyond this never start swimming
    pub const MAX_SWIM_DISTANCE: f32 = 100.0;
}
