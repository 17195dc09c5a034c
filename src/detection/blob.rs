use image::GrayImage;
use imageproc::point::Point;

use crate::detection::contours::{circularity, contour_area, find_external_contours, moments, solidity};
use crate::detection::preprocessing::{self, FOREGROUND};
use crate::models::KeyPoint;
use crate::params::DetectionParams;

/// Blob centre found at one threshold level.
#[derive(Debug, Clone, Copy)]
struct Center {
    x: f64,
    y: f64,
    radius: f64,
}

impl Center {
    fn distance_to(&self, other: &Center) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Multi-threshold dark blob detector.
///
/// The image is binarized at every level from `min_threshold` (inclusive) to
/// `max_threshold` (exclusive). Dark regions passing the area, circularity
/// and convexity filters contribute a centre; centres that reappear at
/// `min_repeatability` or more levels become keypoints.
pub fn detect_blobs(gray: &GrayImage, params: &DetectionParams) -> Vec<KeyPoint> {
    let blob = &params.blob;
    if !(blob.threshold_step > 0.0) || blob.min_threshold >= blob.max_threshold {
        log::warn!(
            "Invalid blob threshold range {}..{} step {}",
            blob.min_threshold,
            blob.max_threshold,
            blob.threshold_step
        );
        return Vec::new();
    }

    let mut groups: Vec<Vec<Center>> = Vec::new();
    for level in threshold_levels(blob.min_threshold, blob.max_threshold, blob.threshold_step) {
        let binary = preprocessing::binarize(gray, level, true);
        let centers = find_centers(&binary, params);
        merge_into_groups(&mut groups, centers, blob.min_dist_between_blobs);
    }

    groups
        .into_iter()
        .filter(|g| g.len() >= blob.min_repeatability.max(1))
        .map(|g| {
            let n = g.len() as f64;
            let x = g.iter().map(|c| c.x).sum::<f64>() / n;
            let y = g.iter().map(|c| c.y).sum::<f64>() / n;
            KeyPoint {
                x,
                y,
                size: g[g.len() / 2].radius * 2.0,
            }
        })
        .collect()
}

/// Distinct 8-bit levels `min + i·step` below `max`.
///
/// Steps that land on an already visited level are skipped, so a step
/// smaller than one grey level neither repeats a binarization nor stalls.
fn threshold_levels(min: f32, max: f32, step: f32) -> Vec<u8> {
    let (min, max, step) = (min as f64, max as f64, step as f64);
    let mut levels: Vec<u8> = Vec::new();
    let mut i: u64 = 0;
    loop {
        let t = min + i as f64 * step;
        if t >= max {
            break;
        }
        let level = t.clamp(0.0, 255.0) as u8;
        if levels.last() != Some(&level) {
            levels.push(level);
        }
        if level == u8::MAX {
            break;
        }
        // first index past the current level
        let next = ((level as f64 + 1.0 - min) / step).ceil();
        i = if next.is_finite() && next > i as f64 {
            next as u64
        } else {
            i + 1
        };
    }
    levels
}

fn find_centers(binary: &GrayImage, params: &DetectionParams) -> Vec<Center> {
    let mut centers = Vec::new();
    for contour in find_external_contours(binary) {
        let m = moments(&contour);
        let Some((x, y)) = m.centroid() else {
            continue;
        };
        if !params.area_in_range(contour_area(&contour)) {
            continue;
        }
        if !params.circularity_in_range(circularity(&contour)) {
            continue;
        }
        if solidity(&contour) < params.blob.min_convexity {
            continue;
        }

        // the blob must be dark at its own centre
        let (px, py) = (x.round() as u32, y.round() as u32);
        if binary.get_pixel_checked(px, py).is_none_or(|p| p[0] != FOREGROUND) {
            continue;
        }

        centers.push(Center {
            x,
            y,
            radius: median_distance(&contour, x, y),
        });
    }
    centers
}

/// Attach every centre to the first group whose middle member it is close
/// to, or open a new group. Groups stay sorted by radius.
fn merge_into_groups(groups: &mut Vec<Vec<Center>>, centers: Vec<Center>, min_dist: f64) {
    let mut opened = Vec::new();
    for center in centers {
        let mut matched = false;
        for group in groups.iter_mut() {
            let middle = group[group.len() / 2];
            let dist = middle.distance_to(&center);
            let is_new = dist >= min_dist && dist >= middle.radius && dist >= center.radius;
            if !is_new {
                let pos = group.partition_point(|c| c.radius <= center.radius);
                group.insert(pos, center);
                matched = true;
                break;
            }
        }
        if !matched {
            opened.push(vec![center]);
        }
    }
    groups.extend(opened);
}

fn median_distance(contour: &[Point<i32>], x: f64, y: f64) -> f64 {
    let mut dists: Vec<f64> = contour
        .iter()
        .map(|p| (p.x as f64 - x).hypot(p.y as f64 - y))
        .collect();
    if dists.is_empty() {
        return 0.0;
    }
    dists.sort_by(f64::total_cmp);
    let n = dists.len();
    (dists[(n - 1) / 2] + dists[n / 2]) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn finds_dark_disc_across_thresholds() {
        let mut img = GrayImage::from_pixel(200, 200, Luma([240u8]));
        draw_filled_circle_mut(&mut img, (100, 100), 25, Luma([30u8]));

        let keypoints = detect_blobs(&img, &DetectionParams::default());
        assert_eq!(keypoints.len(), 1);
        let kp = keypoints[0];
        assert!((kp.x - 100.0).abs() < 1.5);
        assert!((kp.y - 100.0).abs() < 1.5);
        assert!((kp.size / 2.0 - 25.0).abs() < 2.5);
    }

    #[test]
    fn empty_threshold_range_yields_nothing() {
        let img = GrayImage::from_pixel(50, 50, Luma([0u8]));
        let mut params = DetectionParams::default();
        params.blob.min_threshold = 200.0;
        params.blob.max_threshold = 100.0;
        assert!(detect_blobs(&img, &params).is_empty());
    }

    #[test]
    fn levels_follow_the_step() {
        assert_eq!(threshold_levels(50.0, 90.0, 10.0), vec![50, 60, 70, 80]);
        assert_eq!(threshold_levels(250.0, 400.0, 3.0), vec![250, 253, 255]);
    }

    #[test]
    fn tiny_step_visits_each_level_once() {
        let levels = threshold_levels(50.0, 55.0, 1e-7);
        assert_eq!(levels, vec![50, 51, 52, 53, 54]);

        let mut img = GrayImage::from_pixel(100, 100, Luma([240u8]));
        draw_filled_circle_mut(&mut img, (50, 50), 20, Luma([30u8]));
        let mut params = DetectionParams::default();
        params.blob.threshold_step = 1e-7;
        params.blob.max_threshold = 55.0;
        assert_eq!(detect_blobs(&img, &params).len(), 1);
    }
}
