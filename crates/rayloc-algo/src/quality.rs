//! Summary quality flags.
//!
//! Three characters: an overall letter grade, an epicenter mark, and a depth
//! mark. The letter grade is tiered on the equivalent epicentral radius, the
//! depth confidence interval, and the phase count, with a ground-truth
//! shortcut for events sitting inside a dense local network.

use rayloc_core::DEG2KM;

use crate::close_out::LocationStats;

/// Epicentral-radius tiers (km) for grades A/B/C.
pub const HQUALIM: [f64; 3] = [8.5, 16.0, 60.0];
/// Depth-interval tiers (km) for grades A/B/C.
pub const VQUALIM: [f64; 3] = [16.0, 30.0, 75.0];
/// Phase-count floors for grades A and B.
pub const NQUALIM: [usize; 2] = [6, 2];
/// Semi-major-axis tiers (km) driving grade downgrades.
pub const AQUALIM: [f64; 3] = [42.5, 80.0, 300.0];

/// Observation-geometry summary feeding the flags.
#[derive(Debug, Clone, Copy)]
pub struct Coverage {
    /// Used phases contributing to the location.
    pub ph_used: usize,
    /// Minimum epicentral distance (degrees).
    pub del_min: f64,
    /// Standard azimuthal gap (degrees).
    pub azim_gap: f64,
    /// Robust (skip-one) azimuthal gap (degrees).
    pub lest_gap: f64,
}

/// Ground truth within 5 km: enough nearby phases, a station on top of the
/// event, and good azimuthal coverage even with one station removed.
pub fn is_gt5(cov: &Coverage) -> bool {
    cov.ph_used >= 10
        && cov.del_min <= 30.0 / DEG2KM
        && cov.azim_gap < 110.0
        && cov.lest_gap < 160.0
}

/// The three-character quality string.
pub fn quality_flags(
    stats: &LocationStats,
    cov: &Coverage,
    held_depth: bool,
    insufficient: bool,
) -> String {
    if insufficient || stats.failure.is_some() {
        return "D  ".to_string();
    }

    let summary = if is_gt5(cov) {
        'G'
    } else {
        let tiered = if stats.ave_h <= HQUALIM[0]
            && stats.se_depth <= VQUALIM[0]
            && cov.ph_used >= NQUALIM[0]
        {
            'A'
        } else if stats.ave_h <= HQUALIM[1]
            && stats.se_depth <= VQUALIM[1]
            && cov.ph_used >= NQUALIM[1]
        {
            'B'
        } else if stats.ave_h <= HQUALIM[2] && stats.se_depth <= VQUALIM[2] {
            'C'
        } else {
            'D'
        };
        downgrade_for_aspect(tiered, stats.ellipsoid[0].semi_len)
    };

    let epicenter = if stats.ave_h <= HQUALIM[0] && cov.ph_used >= NQUALIM[0] {
        ' '
    } else if stats.ave_h <= HQUALIM[1] && cov.ph_used >= NQUALIM[1] {
        '*'
    } else if stats.ave_h <= HQUALIM[2] {
        '?'
    } else {
        '!'
    };

    let depth = if held_depth {
        'G'
    } else if stats.se_depth <= VQUALIM[0] {
        ' '
    } else if stats.se_depth <= VQUALIM[1] {
        '*'
    } else if stats.se_depth <= VQUALIM[2] {
        '?'
    } else {
        '!'
    };

    [summary, epicenter, depth].iter().collect()
}

/// A long, skinny ellipse caps the grade no matter how tight aveH looks.
fn downgrade_for_aspect(grade: char, semi_major: f64) -> char {
    if semi_major > AQUALIM[2] {
        'D'
    } else if semi_major > AQUALIM[1] {
        match grade {
            'A' | 'B' => 'C',
            g => g,
        }
    } else if semi_major > AQUALIM[0] {
        match grade {
            'A' => 'B',
            g => g,
        }
    } else {
        grade
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::close_out::EllipAxis;

    fn stats_with(ave_h: f64, se_depth: f64, semi_major: f64) -> LocationStats {
        LocationStats {
            ave_h,
            se_depth,
            ellipsoid: [
                EllipAxis {
                    semi_len: semi_major,
                    azimuth: 0.0,
                    plunge: 0.0,
                },
                EllipAxis::default(),
                EllipAxis::default(),
            ],
            ..Default::default()
        }
    }

    fn cov_with(ph_used: usize) -> Coverage {
        Coverage {
            ph_used,
            del_min: 2.0,
            azim_gap: 120.0,
            lest_gap: 180.0,
        }
    }

    #[test]
    fn gt5_overrides_everything() {
        let cov = Coverage {
            ph_used: 14,
            del_min: 0.25,
            azim_gap: 80.0,
            lest_gap: 150.0,
        };
        // Terrible aveH, still G
        let flags = quality_flags(&stats_with(500.0, 200.0, 500.0), &cov, false, false);
        assert_eq!(flags.chars().next().unwrap(), 'G');
    }

    #[test]
    fn gt5_requires_every_leg() {
        let mut cov = Coverage {
            ph_used: 14,
            del_min: 0.25,
            azim_gap: 80.0,
            lest_gap: 150.0,
        };
        cov.lest_gap = 170.0;
        assert!(!is_gt5(&cov));
        cov.lest_gap = 150.0;
        cov.del_min = 1.0;
        assert!(!is_gt5(&cov));
        cov.del_min = 0.25;
        cov.ph_used = 9;
        assert!(!is_gt5(&cov));
    }

    #[test]
    fn tier_letters() {
        assert_eq!(
            quality_flags(&stats_with(5.0, 10.0, 10.0), &cov_with(10), false, false),
            "A  "
        );
        assert_eq!(
            quality_flags(&stats_with(12.0, 20.0, 20.0), &cov_with(4), false, false)
                .chars()
                .next()
                .unwrap(),
            'B'
        );
        assert_eq!(
            quality_flags(&stats_with(40.0, 60.0, 30.0), &cov_with(4), false, false)
                .chars()
                .next()
                .unwrap(),
            'C'
        );
        assert_eq!(
            quality_flags(&stats_with(100.0, 100.0, 30.0), &cov_with(4), false, false)
                .chars()
                .next()
                .unwrap(),
            'D'
        );
    }

    #[test]
    fn skinny_ellipse_downgrades() {
        // Grade-A stats, but a 100 km semi-major axis
        let flags = quality_flags(&stats_with(5.0, 10.0, 100.0), &cov_with(10), false, false);
        assert_eq!(flags.chars().next().unwrap(), 'C');
        // Past the last tier the grade bottoms out
        let flags = quality_flags(&stats_with(5.0, 10.0, 400.0), &cov_with(10), false, false);
        assert_eq!(flags.chars().next().unwrap(), 'D');
    }

    #[test]
    fn held_depth_gets_a_g() {
        let flags = quality_flags(&stats_with(5.0, 0.0, 10.0), &cov_with(10), true, false);
        assert_eq!(flags.chars().nth(2).unwrap(), 'G');
    }

    #[test]
    fn insufficient_data_is_d_blank_blank() {
        let flags = quality_flags(&stats_with(0.0, 0.0, 0.0), &cov_with(2), false, true);
        assert_eq!(flags, "D  ");
    }

    #[test]
    fn depth_marks_follow_tiers() {
        for (se_depth, expect) in [(10.0, ' '), (25.0, '*'), (60.0, '?'), (200.0, '!')] {
            let flags =
                quality_flags(&stats_with(5.0, se_depth, 10.0), &cov_with(10), false, false);
            assert_eq!(flags.chars().nth(2).unwrap(), expect, "se_depth {se_depth}");
        }
    }
}
