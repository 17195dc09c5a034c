use crate::params::HoughParams;

/// Point separation assumed when fewer than two points are marked.
pub const DEFAULT_MIN_SEPARATION: f64 = 60.0;

/// A named grid of Hough parameter tuples.
#[derive(Debug, Clone)]
pub struct CandidateStrategy {
    pub name: &'static str,
    pub trials: Vec<HoughParams>,
}

/// Smallest pairwise distance between marked points.
pub fn min_separation(points: &[(f64, f64)]) -> f64 {
    let mut best = f64::INFINITY;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            best = best.min((a.0 - b.0).hypot(a.1 - b.1));
        }
    }
    if best.is_finite() { best } else { DEFAULT_MIN_SEPARATION }
}

/// Radius expected for cells packed `min_separation` apart.
pub fn estimated_radius(min_separation: f64) -> f64 {
    (min_separation / 2.0).clamp(5.0, 200.0)
}

fn tuple(min_dist: f64, param1: f64, param2: f64, min_radius: f64, max_radius: f64) -> Option<HoughParams> {
    let min_radius = min_radius.round().max(1.0) as u32;
    let max_radius = max_radius.round() as u32;
    if min_radius >= max_radius {
        return None;
    }
    Some(HoughParams {
        dp: 1.0,
        min_dist: min_dist.max(1.0),
        param1,
        param2,
        min_radius,
        max_radius,
    })
}

/// Wide radius band around the estimate, coarse thresholds.
fn wide_radius_scan(min_sep: f64, est_r: f64) -> CandidateStrategy {
    let mut trials = Vec::new();
    for min_f in [0.3, 0.5, 0.7] {
        for max_f in [1.3, 1.6, 2.0] {
            for param1 in [60.0, 90.0, 120.0] {
                for param2 in [30.0, 20.0, 15.0] {
                    trials.extend(tuple(0.8 * min_sep, param1, param2, min_f * est_r, max_f * est_r));
                }
            }
        }
    }
    CandidateStrategy {
        name: "wide radius scan",
        trials,
    }
}

/// Fixed radius band, fine sweep of both thresholds.
fn threshold_sweep(min_sep: f64, est_r: f64) -> CandidateStrategy {
    let mut trials = Vec::new();
    for dist_f in [0.5, 0.8] {
        for param1 in (40..=160).step_by(20) {
            for param2 in (10..=60).step_by(5) {
                trials.extend(tuple(
                    dist_f * min_sep,
                    param1 as f64,
                    param2 as f64,
                    0.5 * est_r,
                    1.5 * est_r,
                ));
            }
        }
    }
    CandidateStrategy {
        name: "threshold sweep at fixed radius band",
        trials,
    }
}

/// Small absolute minimum radius for tiny or partially visible cells.
fn small_radius_scan(min_sep: f64, est_r: f64) -> CandidateStrategy {
    let mut trials = Vec::new();
    for min_r in [3.0, 5.0, 8.0] {
        for max_f in [1.0, 1.2] {
            for param1 in [50.0, 80.0, 110.0] {
                for param2 in [10.0, 15.0, 20.0, 25.0] {
                    trials.extend(tuple((0.5 * min_sep).max(5.0), param1, param2, min_r, max_f * est_r));
                }
            }
        }
    }
    CandidateStrategy {
        name: "small radius scan",
        trials,
    }
}

/// Candidate strategies in the order they are tried.
pub fn candidate_strategies(min_separation: f64) -> Vec<CandidateStrategy> {
    let est_r = estimated_radius(min_separation);
    vec![
        wide_radius_scan(min_separation, est_r),
        threshold_sweep(min_separation, est_r),
        small_radius_scan(min_separation, est_r),
    ]
}
