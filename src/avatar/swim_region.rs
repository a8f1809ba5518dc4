//! Water volumes: surface height, upward speed cap and an optional current.

use crate::avatar::math::{horizontal, Point, Vec3};

/// Speed falloff with distance: `near_velocity` inside `near_distance`,
/// `far_velocity` beyond `far_distance`, linear in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Falloff {
    pub near_distance: f32,
    pub near_velocity: f32,
    pub far_distance: f32,
    pub far_velocity: f32,
}

impl Falloff {
    pub fn at(&self, distance: f32) -> f32 {
        if distance <= self.near_distance {
            self.near_velocity
        } else if distance >= self.far_distance {
            self.far_velocity
        } else {
            let t = (distance - self.near_distance) / (self.far_distance - self.near_distance);
            self.near_velocity + (self.far_velocity - self.near_velocity) * t
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Current {
    None,
    /// Whirlpool around a vertical axis through `center`.
    Circular {
        center: Point,
        /// Spin in radians per second, counter-clockwise seen from above
        rotation: f32,
        pull: Falloff,
    },
    /// Flow along `direction`, strength by distance downstream of `origin`.
    Straight {
        origin: Point,
        direction: Vec3,
        strength: Falloff,
    },
}

/// Push a current applies to a swimmer for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CurrentSample {
    pub linear: Vec3,
    /// Heading change rate in radians per second
    pub angular: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwimRegion {
    pub surface_height: f32,
    pub max_upward_velocity: f32,
    pub current: Current,
}

impl SwimRegion {
    pub fn still(surface_height: f32) -> Self {
        Self {
            surface_height,
            max_upward_velocity: 5.0,
            current: Current::None,
        }
    }

    pub fn depth_at(&self, position: &Point) -> f32 {
        self.surface_height - position.z
    }

    /// Current felt at `position`.
    pub fn current_at(&self, position: &Point) -> CurrentSample {
        match &self.current {
            Current::None => CurrentSample::default(),
            Current::Circular {
                center,
                rotation,
                pull,
            } => {
                let radial = horizontal(&(position - center));
                let distance = radial.norm();
                if distance < 1e-4 {
                    return CurrentSample {
                        linear: Vec3::zeros(),
                        angular: *rotation,
                    };
                }
                let outward = radial / distance;
                let tangent = Vec3::z().cross(&outward);
                CurrentSample {
                    linear: tangent * (rotation * distance) - outward * pull.at(distance),
                    angular: *rotation,
                }
            }
            Current::Straight {
                origin,
                direction,
                strength,
            } => {
                let dir = direction.try_normalize(1e-6).unwrap_or_else(Vec3::zeros);
                let downstream = (position - origin).dot(&dir);
                CurrentSample {
                    linear: dir * strength.at(downstream),
                    angular: 0.0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn falloff() -> Falloff {
        Falloff {
            near_distance: 2.0,
            near_velocity: 4.0,
            far_distance: 10.0,
            far_velocity: 0.0,
        }
    }

    #[test]
    fn test_falloff_interpolates_between_bands() {
        let f = falloff();
        assert_eq!(f.at(0.0), 4.0);
        assert_eq!(f.at(6.0), 2.0);
        assert_eq!(f.at(50.0), 0.0);
    }

    #[test]
    fn test_circular_current_pulls_inward_and_spins() {
        let region = SwimRegion {
            surface_height: 0.0,
            max_upward_velocity: 5.0,
            current: Current::Circular {
                center: Point::origin(),
                rotation: 0.5,
                pull: falloff(),
            },
        };
        let sample = region.current_at(&Point::new(6.0, 0.0, -3.0));
        assert_eq!(sample.angular, 0.5);
        assert!((sample.linear.x + 2.0).abs() < 1e-5, "pulled toward center");
        assert!((sample.linear.y - 3.0).abs() < 1e-5, "swept counter-clockwise");
        assert_eq!(sample.linear.z, 0.0);
    }

    #[test]
    fn test_straight_current_follows_direction() {
        let region = SwimRegion {
            surface_height: 0.0,
            max_upward_velocity: 5.0,
            current: Current::Straight {
                origin: Point::origin(),
                direction: Vec3::new(0.0, 2.0, 0.0),
                strength: falloff(),
            },
        };
        let sample = region.current_at(&Point::new(3.0, 6.0, 0.0));
        assert!((sample.linear - Vec3::new(0.0, 2.0, 0.0)).norm() < 1e-5);
    }
}
