//! Wedge detection.
//!
//! An avatar touching no ground may still be unable to fall: pinned between slopes that
//! push from every side. Seen top-down, the contact normals then leave no heading gap
//! wide enough to escape through. The threshold is wider than 180° so the avatar also
//! needs enough push to overcome friction; two walls 60° apart still count as wedged.
//!
//! Normals from the previous move are included because some backends report a
//! blocking contact only every other frame.

use std::f32::consts::TAU;

use crate::avatar::math::Vec3;

/// Returns true when the normals leave no heading gap of `threshold` radians or more.
///
/// Needs at least `min_normals` normals across both sets; fewer never counts as wedged.
pub fn is_false_ground(
    current: &[Vec3],
    previous: &[Vec3],
    threshold: f32,
    min_normals: usize,
) -> bool {
    let count = current.len() + previous.len();
    if count < min_normals.max(2) {
        return false;
    }

    let mut angles: Vec<f32> = current
        .iter()
        .chain(previous.iter())
        .map(|n| n.y.atan2(n.x))
        .collect();
    angles.sort_by(|a, b| a.total_cmp(b));

    let interior_gap = angles.windows(2).any(|w| w[1] - w[0] >= threshold);
    if interior_gap {
        return false;
    }
    // Gap that wraps from the last heading back around to the first
    let wrap_gap = angles[0] - angles[count - 1];
    !(wrap_gap >= threshold - TAU)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn heading_normal(deg: f32) -> Vec3 {
        let r = deg.to_radians();
        // Steep slopes: mostly horizontal with a small upward tilt
        Vec3::new(r.cos() * 0.9, r.sin() * 0.9, 0.3)
    }

    fn threshold() -> f32 {
        240.0_f32.to_radians()
    }

    #[test]
    fn test_three_walls_spread_half_circle_is_wedged() {
        let normals = [heading_normal(0.0), heading_normal(90.0), heading_normal(180.0)];
        assert!(is_false_ground(&normals, &[], threshold(), 2));
    }

    #[test]
    fn test_single_wall_is_not_wedged() {
        assert!(!is_false_ground(&[heading_normal(30.0)], &[], threshold(), 2));
        // The same wall seen twice leaves the full circle open
        assert!(!is_false_ground(&[heading_normal(30.0)], &[heading_normal(30.0)], threshold(), 2));
    }

    #[test]
    fn test_narrow_v_is_wedged_wide_v_is_not() {
        // Walls of a V meeting at 59° have normals 121° apart, leaving a 239° gap
        let narrow = [heading_normal(0.0), heading_normal(121.0)];
        assert!(is_false_ground(&narrow, &[], threshold(), 2));
        let wide = [heading_normal(0.0), heading_normal(119.0)];
        assert!(!is_false_ground(&wide, &[], threshold(), 2));
    }

    #[test]
    fn test_previous_frame_normals_participate() {
        let current = [heading_normal(-90.0)];
        let previous = [heading_normal(90.0)];
        assert!(is_false_ground(&current, &previous, threshold(), 2));
    }

    #[test]
    fn test_gap_rule_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let count = rng.gen_range(2..7);
            let degs: Vec<f32> = (0..count).map(|_| rng.gen_range(-179.0..179.0)).collect();
            let normals: Vec<Vec3> = degs.iter().map(|d| heading_normal(*d)).collect();

            let mut sorted = degs.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mut max_gap = sorted[0] + 360.0 - sorted[count - 1];
            for w in sorted.windows(2) {
                max_gap = max_gap.max(w[1] - w[0]);
            }
            // Stay clear of the boundary where float rounding decides
            if (max_gap - 240.0).abs() < 0.01 {
                continue;
            }
            assert_eq!(
                is_false_ground(&normals, &[], threshold(), 2),
                max_gap < 240.0,
                "headings {:?} max gap {}",
                degs,
                max_gap
            );
        }
    }
}
