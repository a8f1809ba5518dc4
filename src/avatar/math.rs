//! Frame and heading helpers shared by the controller, strategies and brains.
//!
//! World and subworld frames are Z-up. Avatar-local forward is +Y and right is +X.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use std::f32::consts::{PI, TAU};

pub type Vec3 = Vector3<f32>;
pub type Point = Point3<f32>;
pub type Quat = UnitQuaternion<f32>;
pub type Transform = Isometry3<f32>;

pub fn up() -> Vec3 {
    Vector3::z()
}

/// Heading about +Z in [0, 2π).
pub fn heading(rotation: &Quat) -> f32 {
    let forward = rotation * Vector3::y();
    wrap_angle(forward.y.atan2(forward.x) - PI / 2.0)
}

pub fn from_heading(heading: f32) -> Quat {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), wrap_angle(heading))
}

/// Turns a rotation about +Z, keeping the result's heading in [0, 2π).
pub fn increment_angle(rotation: &Quat, delta: f32) -> Quat {
    from_heading(heading(rotation) + delta)
}

pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest difference `to - from` in (-π, π].
pub fn angle_diff(from: f32, to: f32) -> f32 {
    let d = (to - from + PI).rem_euclid(TAU) - PI;
    if d <= -PI {
        d + TAU
    } else {
        d
    }
}

/// Heading that points avatar-forward along a horizontal world direction.
pub fn heading_towards(direction: &Vec3) -> f32 {
    wrap_angle(direction.y.atan2(direction.x) - PI / 2.0)
}

pub fn is_finite(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

pub fn horizontal(v: &Vec3) -> Vec3 {
    Vector3::new(v.x, v.y, 0.0)
}

pub fn transform_from(position: Point, rotation: Quat) -> Transform {
    Isometry3::from_parts(Translation3::from(position.coords), rotation)
}

/// Replaces non-finite vectors with zero. Returns whether a fix was needed.
pub fn sanitize(v: &mut Vec3) -> bool {
    if is_finite(v) {
        false
    } else {
        *v = Vec3::zeros();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_round_trips_through_quaternion() {
        for deg in [0.0_f32, 45.0, 90.0, 180.0, 270.0, 359.0] {
            let h = deg.to_radians();
            let back = heading(&from_heading(h));
            assert!((back - h).abs() < 1e-4, "{deg}° came back as {}", back.to_degrees());
        }
    }

    #[test]
    fn test_increment_angle_wraps_into_range() {
        let q = from_heading(TAU - 0.1);
        let turned = increment_angle(&q, 0.3);
        let h = heading(&turned);
        assert!((h - 0.2).abs() < 1e-4, "expected wrap to 0.2, got {h}");

        let back = increment_angle(&from_heading(0.1), -0.3);
        assert!((heading(&back) - (TAU - 0.2)).abs() < 1e-4);
    }

    #[test]
    fn test_forward_is_plus_y_at_zero_heading() {
        let q = from_heading(0.0);
        let fwd = q * Vector3::y();
        assert!((fwd - Vector3::y()).norm() < 1e-6);
        // A positive turn is counter-clockwise seen from above: forward swings toward -X
        let left = from_heading(PI / 2.0) * Vector3::y();
        assert!((left - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-5);
        assert!((heading_towards(&Vector3::new(-1.0, 0.0, 0.0)) - PI / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_angle_diff_takes_short_way() {
        assert!((angle_diff(0.1, TAU - 0.1) + 0.2).abs() < 1e-5);
        assert!((angle_diff(TAU - 0.1, 0.1) - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_sanitize_zeroes_nan() {
        let mut v = Vec3::new(f32::NAN, 1.0, 0.0);
        assert!(sanitize(&mut v));
        assert_eq!(v, Vec3::zeros());
        let mut ok = Vec3::new(1.0, 2.0, 3.0);
        assert!(!sanitize(&mut ok));
    }
}
