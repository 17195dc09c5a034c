//! Duplicate suppression for detected cells.
//!
//! Classic strategies go through [`resolve_by_distance`]; neural detections,
//! which carry a confidence, go through [`resolve_by_iou`].

use std::f64::consts::PI;

use crate::models::Cell;

/// Default share of the radius sum two classic cells may overlap by.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.3;

/// Remove cells whose centres are closer than `(r_i + r_j)·(1 − threshold)`.
///
/// Pairs are scanned in input order; of an overlapping pair the smaller area
/// is dropped (ties drop the later cell). When the earlier cell of a pair is
/// dropped the scan moves on to the next surviving cell, which reproduces the
/// restart-after-removal behaviour without mutating the list while scanning.
/// Survivors keep their input order.
pub fn resolve_by_distance(cells: Vec<Cell>, overlap_threshold: f64) -> Vec<Cell> {
    let keep = distance_keep_mask(&cells, overlap_threshold);
    cells
        .into_iter()
        .zip(keep)
        .filter_map(|(cell, keep)| keep.then_some(cell))
        .collect()
}

fn distance_keep_mask(cells: &[Cell], overlap_threshold: f64) -> Vec<bool> {
    let n = cells.len();
    let mut alive = vec![true; n];

    for i in 0..n {
        if !alive[i] {
            continue;
        }
        for j in i + 1..n {
            if !alive[j] {
                continue;
            }
            let min_distance = (cells[i].radius + cells[j].radius) * (1.0 - overlap_threshold);
            if cells[i].distance_to(&cells[j]) >= min_distance {
                continue;
            }
            if cells[i].area < cells[j].area {
                alive[i] = false;
                break;
            }
            alive[j] = false;
        }
    }

    alive
}

/// Greedy non-maximum suppression on circular IoU.
///
/// Cells are ordered by confidence (stable for ties); each accepted cell
/// suppresses every later one whose IoU with it exceeds `nms_threshold`.
pub fn resolve_by_iou(cells: Vec<Cell>, nms_threshold: f64) -> Vec<Cell> {
    if cells.len() <= 1 {
        return cells;
    }

    let mut sorted = cells;
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; sorted.len()];
    for i in 0..sorted.len() {
        if suppressed[i] {
            continue;
        }
        for j in i + 1..sorted.len() {
            if suppressed[j] {
                continue;
            }
            if cell_iou(&sorted[i], &sorted[j]) > nms_threshold {
                suppressed[j] = true;
            }
        }
    }

    sorted
        .into_iter()
        .zip(suppressed)
        .filter_map(|(cell, suppressed)| (!suppressed).then_some(cell))
        .collect()
}

pub fn cell_iou(a: &Cell, b: &Cell) -> f64 {
    circular_iou(a.center(), a.radius, b.center(), b.radius)
}

/// Intersection over union of two circles.
pub fn circular_iou(c1: (f64, f64), r1: f64, c2: (f64, f64), r2: f64) -> f64 {
    let d = (c1.0 - c2.0).hypot(c1.1 - c2.1);
    let area1 = PI * r1 * r1;
    let area2 = PI * r2 * r2;

    if d >= r1 + r2 {
        return 0.0;
    }
    if d <= (r1 - r2).abs() {
        let (min, max) = if area1 < area2 { (area1, area2) } else { (area2, area1) };
        if max == 0.0 {
            return 0.0;
        }
        return min / max;
    }

    let part1 = r1 * r1 * ((d * d + r1 * r1 - r2 * r2) / (2.0 * d * r1)).clamp(-1.0, 1.0).acos();
    let part2 = r2 * r2 * ((d * d + r2 * r2 - r1 * r1) / (2.0 * d * r2)).clamp(-1.0, 1.0).acos();
    let part3 = 0.5
        * ((-d + r1 + r2) * (d + r1 - r2) * (d - r1 + r2) * (d + r1 + r2))
            .max(0.0)
            .sqrt();

    let intersection = part1 + part2 - part3;
    intersection / (area1 + area2 - intersection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_circles_is_one() {
        assert!((circular_iou((10.0, 10.0), 5.0, (10.0, 10.0), 5.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lens_iou_is_between_zero_and_one() {
        let iou = circular_iou((0.0, 0.0), 10.0, (10.0, 0.0), 10.0);
        // two equal circles at one radius apart
        let expected_intersection =
            2.0 * 100.0 * (0.5f64).acos() - 0.5 * (10.0 * 10.0 * 10.0 * 30.0f64).sqrt();
        let expected = expected_intersection / (2.0 * PI * 100.0 - expected_intersection);
        assert!((iou - expected).abs() < 1e-9);
        assert!(iou > 0.0 && iou < 1.0);
    }
}
