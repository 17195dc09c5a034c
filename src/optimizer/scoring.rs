use crate::models::Circle;

/// A marked point is covered by a circle whose centre lies within this
/// multiple of the circle's radius.
pub const MATCH_RADIUS_FACTOR: f64 = 1.2;

const PARTIAL_WEIGHT: f64 = 0.1;
const MIN_EFFICIENCY: f64 = 0.3;
const EXACT_COUNT_BONUS: f64 = 0.2;

/// How marked points are paired with detected circles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchingPolicy {
    /// Each point, in input order, takes the nearest free circle.
    Greedy,
    /// Maximum bipartite matching; never covers fewer points than greedy.
    #[default]
    Optimal,
}

fn covers(point: (f64, f64), circle: &Circle) -> bool {
    circle.distance_to(point.0, point.1) <= MATCH_RADIUS_FACTOR * circle.radius
}

/// Number of points matched to distinct circles.
pub fn match_count(points: &[(f64, f64)], circles: &[Circle], policy: MatchingPolicy) -> usize {
    match policy {
        MatchingPolicy::Greedy => greedy_matches(points, circles),
        MatchingPolicy::Optimal => maximum_matches(points, circles),
    }
}

fn greedy_matches(points: &[(f64, f64)], circles: &[Circle]) -> usize {
    let mut used = vec![false; circles.len()];
    let mut matched = 0;
    for &point in points {
        let nearest = circles
            .iter()
            .enumerate()
            .filter(|(j, c)| !used[*j] && covers(point, c))
            .min_by(|(_, a), (_, b)| {
                a.distance_to(point.0, point.1)
                    .total_cmp(&b.distance_to(point.0, point.1))
            })
            .map(|(j, _)| j);
        if let Some(j) = nearest {
            used[j] = true;
            matched += 1;
        }
    }
    matched
}

/// Augmenting-path bipartite matching between points and covering circles.
fn maximum_matches(points: &[(f64, f64)], circles: &[Circle]) -> usize {
    let adjacency: Vec<Vec<usize>> = points
        .iter()
        .map(|&p| {
            (0..circles.len())
                .filter(|&j| covers(p, &circles[j]))
                .collect()
        })
        .collect();

    let mut owner: Vec<Option<usize>> = vec![None; circles.len()];
    let mut matched = 0;
    for point in 0..points.len() {
        let mut visited = vec![false; circles.len()];
        if augment(point, &adjacency, &mut owner, &mut visited) {
            matched += 1;
        }
    }
    matched
}

fn augment(
    point: usize,
    adjacency: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &circle in &adjacency[point] {
        if visited[circle] {
            continue;
        }
        visited[circle] = true;
        let free = match owner[circle] {
            None => true,
            Some(other) => augment(other, adjacency, owner, visited),
        };
        if free {
            owner[circle] = Some(point);
            return true;
        }
    }
    false
}

/// Coverage score of a detection against marked points.
///
/// Partial coverage scores `matched/total × 0.1`. Full coverage scores the
/// detection efficiency (`1.0` without spare circles, otherwise
/// `max(0.3, 1 − unused/detected)`) plus `0.2` when the counts agree, so any
/// score `≥ 1.0` means every point is covered without spare circles.
pub fn coverage_score(points: &[(f64, f64)], circles: &[Circle], policy: MatchingPolicy) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let matched = match_count(points, circles, policy);
    let total = points.len();
    if matched < total {
        return matched as f64 / total as f64 * PARTIAL_WEIGHT;
    }

    let unused = circles.len() - matched;
    let efficiency = if unused == 0 {
        1.0
    } else {
        (1.0 - unused as f64 / circles.len() as f64).max(MIN_EFFICIENCY)
    };
    let bonus = if circles.len() == total { EXACT_COUNT_BONUS } else { 0.0 };
    efficiency + bonus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_matching_beats_greedy_order() {
        // the first point grabs the only circle the second point can use
        let circles = vec![Circle::new(0.0, 0.0, 10.0), Circle::new(20.0, 0.0, 10.0)];
        let points = vec![(8.0, 0.0), (-5.0, 0.0)];

        assert_eq!(match_count(&points, &circles, MatchingPolicy::Greedy), 1);
        assert_eq!(match_count(&points, &circles, MatchingPolicy::Optimal), 2);
    }

    #[test]
    fn score_levels() {
        let points = vec![(0.0, 0.0), (100.0, 0.0)];
        let exact = vec![Circle::new(0.0, 0.0, 10.0), Circle::new(100.0, 0.0, 10.0)];
        let spare = vec![
            Circle::new(0.0, 0.0, 10.0),
            Circle::new(100.0, 0.0, 10.0),
            Circle::new(50.0, 50.0, 10.0),
            Circle::new(50.0, 90.0, 10.0),
        ];
        let half = vec![Circle::new(0.0, 0.0, 10.0)];

        let policy = MatchingPolicy::Optimal;
        assert!((coverage_score(&points, &exact, policy) - 1.2).abs() < 1e-12);
        assert!((coverage_score(&points, &spare, policy) - 0.5).abs() < 1e-12);
        assert!((coverage_score(&points, &half, policy) - 0.05).abs() < 1e-12);
    }
}
