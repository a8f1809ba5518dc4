//! Locomotion tuning loaded from TOML files.
//!
//! Every field carries a default, so an empty file (or `LocomotionConfig::default()`)
//! yields the stock tuning. Per-brain sections are handed to brains at construction.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::avatar::constants::{physics as phys, swim as swim_consts};

/// Gravity, capsule shape and collision tolerances shared by every strategy.
#[derive(Debug, Clone, Deserialize)]
pub struct PhysicsConfig {
    /// Vertical acceleration in units/s² (negative is down)
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    /// Floor on vertical velocity in units/s
    #[serde(default = "default_terminal_velocity")]
    pub terminal_velocity: f32,
    /// Fixed simulation timestep in seconds
    #[serde(default = "default_timestep")]
    pub timestep: f32,
    /// Minimum `normal·up` for a walking contact to count as ground
    #[serde(default = "default_walking_slope_limit")]
    pub walking_slope_limit: f32,
    /// Minimum `normal·up` for a swimming contact to count as ground (cos 55°)
    #[serde(default = "default_swimming_slope_limit")]
    pub swimming_slope_limit: f32,
    #[serde(default = "default_capsule_radius")]
    pub capsule_radius: f32,
    /// Total capsule height, feet to crown
    #[serde(default = "default_capsule_height")]
    pub capsule_height: f32,
    #[serde(default = "default_step_height")]
    pub step_height: f32,
    /// Speed of the push-out applied along summed sliding normals
    #[serde(default = "default_push_out_speed")]
    pub push_out_speed: f32,
    #[serde(default = "default_skin_width")]
    pub skin_width: f32,
    /// Mass used when the avatar shoves dynamic props
    #[serde(default = "default_avatar_mass")]
    pub avatar_mass: f32,
}

fn default_gravity() -> f32 {
    phys::GRAVITY
}

fn default_terminal_velocity() -> f32 {
    phys::TERMINAL_VELOCITY
}

fn default_timestep() -> f32 {
    phys::TIMESTEP
}

fn default_walking_slope_limit() -> f32 {
    phys::WALKING_SLOPE_LIMIT
}

fn default_swimming_slope_limit() -> f32 {
    phys::SWIMMING_SLOPE_LIMIT
}

fn default_capsule_radius() -> f32 {
    phys::CAPSULE_RADIUS
}

fn default_capsule_height() -> f32 {
    phys::CAPSULE_HEIGHT
}

fn default_step_height() -> f32 {
    phys::STEP_HEIGHT
}

fn default_push_out_speed() -> f32 {
    phys::PUSH_OUT_SPEED
}

fn default_skin_width() -> f32 {
    phys::SKIN_WIDTH
}

fn default_avatar_mass() -> f32 {
    phys::AVATAR_MASS
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            terminal_velocity: default_terminal_velocity(),
            timestep: default_timestep(),
            walking_slope_limit: default_walking_slope_limit(),
            swimming_slope_limit: default_swimming_slope_limit(),
            capsule_radius: default_capsule_radius(),
            capsule_height: default_capsule_height(),
            step_height: default_step_height(),
            push_out_speed: default_push_out_speed(),
            skin_width: default_skin_width(),
            avatar_mass: default_avatar_mass(),
        }
    }
}

/// Walking and riding strategy tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct WalkingConfig {
    /// Seconds airborne before the avatar stops counting as grounded
    #[serde(default = "default_air_time_threshold")]
    pub air_time_threshold: f32,
    /// Controlled flight is cut once the avatar has been grounded this long
    #[serde(default = "default_max_controlled_flight")]
    pub max_controlled_flight: f32,
    /// Vertical half-extent of the riding ground sweep
    #[serde(default = "default_ride_sweep_margin")]
    pub ride_sweep_margin: f32,
}

fn default_air_time_threshold() -> f32 {
    phys::AIR_TIME_THRESHOLD
}

fn default_max_controlled_flight() -> f32 {
    phys::MAX_CONTROLLED_FLIGHT
}

fn default_ride_sweep_margin() -> f32 {
    phys::RIDE_SWEEP_MARGIN
}

impl Default for WalkingConfig {
    fn default() -> Self {
        Self {
            air_time_threshold: default_air_time_threshold(),
            max_controlled_flight: default_max_controlled_flight(),
            ride_sweep_margin: default_ride_sweep_margin(),
        }
    }
}

/// False-ground detection tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct FalseGroundConfig {
    /// Largest heading gap (degrees) that still counts as wedged
    #[serde(default = "default_gap_threshold_deg")]
    pub gap_threshold_deg: f32,
    #[serde(default = "default_min_normals")]
    pub min_normals: usize,
    /// Per-component tolerance when deduplicating sliding normals
    #[serde(default = "default_normal_epsilon")]
    pub normal_epsilon: f32,
}

fn default_gap_threshold_deg() -> f32 {
    phys::FALSE_GROUND_GAP_DEG
}

fn default_min_normals() -> usize {
    2
}

fn default_normal_epsilon() -> f32 {
    phys::NORMAL_DEDUPE_EPSILON
}

impl FalseGroundConfig {
    pub fn gap_threshold_rad(&self) -> f32 {
        self.gap_threshold_deg.to_radians()
    }
}

impl Default for FalseGroundConfig {
    fn default() -> Self {
        Self {
            gap_threshold_deg: default_gap_threshold_deg(),
            min_normals: default_min_normals(),
            normal_epsilon: default_normal_epsilon(),
        }
    }
}

/// Buoyancy and bob damping.
#[derive(Debug, Clone, Deserialize)]
pub struct SwimmingConfig {
    /// Depth at which buoyancy saturates
    #[serde(default = "default_full_buoyancy_depth")]
    pub full_buoyancy_depth: f32,
    /// Below saturation, buoyancy is `depth / buoyancy_divisor`
    #[serde(default = "default_buoyancy_divisor")]
    pub buoyancy_divisor: f32,
    #[serde(default = "default_max_buoyancy")]
    pub max_buoyancy: f32,
    #[serde(default = "default_bob_damping")]
    pub bob_damping: f32,
    #[serde(default = "default_bob_speed_threshold")]
    pub bob_speed_threshold: f32,
}

fn default_full_buoyancy_depth() -> f32 {
    swim_consts::FULL_BUOYANCY_DEPTH
}

fn default_buoyancy_divisor() -> f32 {
    swim_consts::BUOYANCY_DIVISOR
}

fn default_max_buoyancy() -> f32 {
    swim_consts::MAX_BUOYANCY
}

fn default_bob_damping() -> f32 {
    swim_consts::BOB_DAMPING
}

fn default_bob_speed_threshold() -> f32 {
    swim_consts::BOB_SPEED_THRESHOLD
}

impl Default for SwimmingConfig {
    fn default() -> Self {
        Self {
            full_buoyancy_depth: default_full_buoyancy_depth(),
            buoyancy_divisor: default_buoyancy_divisor(),
            max_buoyancy: default_max_buoyancy(),
            bob_damping: default_bob_damping(),
            bob_speed_threshold: default_bob_speed_threshold(),
        }
    }
}

/// Shape of the turn-speed ramp while a turn key is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnCurve {
    Linear,
    Exponential,
    Logarithmic,
}

impl Default for TurnCurve {
    fn default() -> Self {
        TurnCurve::Exponential
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TurnTunables {
    /// Seconds to reach `max_turn_speed`
    pub time_to_max: f32,
    /// Radians per second
    pub max_turn_speed: f32,
    #[serde(default)]
    pub curve: TurnCurve,
}

/// Human brain tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct HumanConfig {
    #[serde(default = "default_walk_turn")]
    pub walk: TurnTunables,
    #[serde(default = "default_run_turn")]
    pub run: TurnTunables,
    /// Minimum airborne seconds before a landing plays an impact
    #[serde(default = "default_impact_min_air_time")]
    pub impact_min_air_time: f32,
    /// Landing vertical speed (negative) that triggers an impact
    #[serde(default = "default_impact_min_velocity")]
    pub impact_min_velocity: f32,
    /// Seconds of falling before the panic link fires
    #[serde(default = "default_air_panic_time")]
    pub air_panic_time: f32,
}

fn default_walk_turn() -> TurnTunables {
    TurnTunables {
        time_to_max: 0.3,
        max_turn_speed: 2.0,
        curve: TurnCurve::Exponential,
    }
}

fn default_run_turn() -> TurnTunables {
    TurnTunables {
        time_to_max: 0.1,
        max_turn_speed: 1.7,
        curve: TurnCurve::Exponential,
    }
}

fn default_impact_min_air_time() -> f32 {
    0.5
}

fn default_impact_min_velocity() -> f32 {
    -10.0
}

fn default_air_panic_time() -> f32 {
    10.0
}

impl Default for HumanConfig {
    fn default() -> Self {
        Self {
            walk: default_walk_turn(),
            run: default_run_turn(),
            impact_min_air_time: default_impact_min_air_time(),
            impact_min_velocity: default_impact_min_velocity(),
            air_panic_time: default_air_panic_time(),
        }
    }
}

/// Swim brain mode thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct SwimBrainConfig {
    /// Surface distance beyond which wading turns into swimming
    #[serde(default = "default_min_swim_depth")]
    pub min_swim_depth: f32,
    /// Surface distance below which a swimmer touching bottom starts wading
    #[serde(default = "default_wade_exit_depth")]
    pub wade_exit_depth: f32,
    #[serde(default = "default_swim_turn")]
    pub turn: TurnTunables,
    /// Fade rate for swim behaviors while the avatar is not swimming
    #[serde(default = "default_swim_fade_rate")]
    pub fade_rate: f32,
}

fn default_min_swim_depth() -> f32 {
    swim_consts::MIN_SWIM_DEPTH
}

fn default_wade_exit_depth() -> f32 {
    swim_consts::WADE_EXIT_DEPTH
}

fn default_swim_turn() -> TurnTunables {
    TurnTunables {
        time_to_max: 0.5,
        max_turn_speed: 1.0,
        curve: TurnCurve::Linear,
    }
}

fn default_swim_fade_rate() -> f32 {
    2.0
}

impl Default for SwimBrainConfig {
    fn default() -> Self {
        Self {
            min_swim_depth: default_min_swim_depth(),
            wade_exit_depth: default_wade_exit_depth(),
            turn: default_swim_turn(),
            fade_rate: default_swim_fade_rate(),
        }
    }
}

/// Climb brain environment probes.
#[derive(Debug, Clone, Deserialize)]
pub struct ClimbConfig {
    #[serde(default = "default_probe_vertical")]
    pub probe_vertical: f32,
    #[serde(default = "default_probe_horizontal")]
    pub probe_horizontal: f32,
    /// Height above the feet the probes start from
    #[serde(default = "default_probe_origin_height")]
    pub probe_origin_height: f32,
}

fn default_probe_vertical() -> f32 {
    4.0
}

fn default_probe_horizontal() -> f32 {
    3.0
}

fn default_probe_origin_height() -> f32 {
    3.0
}

impl Default for ClimbConfig {
    fn default() -> Self {
        Self {
            probe_vertical: default_probe_vertical(),
            probe_horizontal: default_probe_horizontal(),
            probe_origin_height: default_probe_origin_height(),
        }
    }
}

/// Smart seek tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct SeekConfig {
    #[serde(default = "default_seek_timeout")]
    pub timeout: f32,
    #[serde(default = "default_float_speed")]
    pub float_speed: f32,
    #[serde(default = "default_shuffle_range")]
    pub shuffle_range: f32,
    #[serde(default = "default_max_sidle_range")]
    pub max_sidle_range: f32,
    #[serde(default = "default_sidle_angle")]
    pub sidle_angle: f32,
    #[serde(default = "default_near_distance")]
    pub near_distance: f32,
    #[serde(default = "default_goal_tolerance")]
    pub position_tolerance: f32,
    #[serde(default = "default_goal_tolerance")]
    pub rotation_tolerance: f32,
    /// Duration of the physics-free interpolating seek
    #[serde(default = "default_dumb_seek_duration")]
    pub dumb_seek_duration: f32,
}

fn default_seek_timeout() -> f32 {
    5.0
}

fn default_float_speed() -> f32 {
    3.0
}

fn default_shuffle_range() -> f32 {
    0.5
}

fn default_max_sidle_range() -> f32 {
    4.0
}

fn default_sidle_angle() -> f32 {
    0.2
}

fn default_near_distance() -> f32 {
    3.0
}

fn default_goal_tolerance() -> f32 {
    0.1
}

fn default_dumb_seek_duration() -> f32 {
    0.25
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            timeout: default_seek_timeout(),
            float_speed: default_float_speed(),
            shuffle_range: default_shuffle_range(),
            max_sidle_range: default_max_sidle_range(),
            sidle_angle: default_sidle_angle(),
            near_distance: default_near_distance(),
            position_tolerance: default_goal_tolerance(),
            rotation_tolerance: default_goal_tolerance(),
            dumb_seek_duration: default_dumb_seek_duration(),
        }
    }
}

/// Physics-free fly mode.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    #[serde(default = "default_drive_velocity")]
    pub max_velocity: f32,
    #[serde(default = "default_drive_turn_rate")]
    pub turn_rate: f32,
}

fn default_drive_velocity() -> f32 {
    20.0
}

fn default_drive_turn_rate() -> f32 {
    1.0
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            max_velocity: default_drive_velocity(),
            turn_rate: default_drive_turn_rate(),
        }
    }
}

/// Complete locomotion configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocomotionConfig {
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub walking: WalkingConfig,
    #[serde(default)]
    pub false_ground: FalseGroundConfig,
    #[serde(default)]
    pub swimming: SwimmingConfig,
    #[serde(default)]
    pub human: HumanConfig,
    #[serde(default)]
    pub swim_brain: SwimBrainConfig,
    #[serde(default)]
    pub climb: ClimbConfig,
    #[serde(default)]
    pub seek: SeekConfig,
    #[serde(default)]
    pub drive: DriveConfig,
}

impl LocomotionConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects tunings the controller cannot integrate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.physics.timestep > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "physics.timestep must be positive, got {}",
                self.physics.timestep
            )));
        }
        let gap = self.false_ground.gap_threshold_rad();
        if !(gap > 0.0 && gap <= std::f32::consts::TAU) {
            return Err(ConfigError::Invalid(format!(
                "false_ground.gap_threshold_deg must be in (0, 360], got {}",
                self.false_ground.gap_threshold_deg
            )));
        }
        if self.swim_brain.min_swim_depth < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "swim_brain.min_swim_depth must not be negative, got {}",
                self.swim_brain.min_swim_depth
            )));
        }
        if !(self.swimming.buoyancy_divisor > 0.0) {
            return Err(ConfigError::Invalid(
                "swimming.buoyancy_divisor must be positive".to_string(),
            ));
        }
        if self.physics.capsule_height < 2.0 * self.physics.capsule_radius {
            return Err(ConfigError::Invalid(format!(
                "physics.capsule_height {} is shorter than two radii",
                self.physics.capsule_height
            )));
        }
        Ok(())
    }
}

/// Errors that can occur when loading locomotion configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
