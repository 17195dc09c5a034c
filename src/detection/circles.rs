use anyhow::{bail, Result};
use image::GrayImage;
use imageproc::geometry::convex_hull;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::point::Point;

use crate::detection::preprocessing;
use crate::models::Circle;
use crate::params::HoughParams;

/// Fraction of a centre's edge support that must lie on the winning radius,
/// relative to the full circumference.
const MIN_CIRCUMFERENCE_SUPPORT: f64 = 0.25;

/// Edge pixels of an image together with their gradient direction.
///
/// Depends only on the image and the Canny threshold, so parameter searches
/// can reuse it across trials that differ in the other Hough parameters.
pub struct EdgeField {
    pub width: u32,
    pub height: u32,
    /// `(x, y, unit gradient dx, unit gradient dy)` per edge pixel.
    pub points: Vec<(u32, u32, f32, f32)>,
}

impl EdgeField {
    pub fn compute(gray: &GrayImage, canny_high: f64) -> Self {
        let high = canny_high.max(1.0) as f32;
        let edges = preprocessing::detect_edges(gray, high / 2.0, high);
        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);

        let mut points = Vec::new();
        for (x, y, p) in edges.enumerate_pixels() {
            if p[0] == 0 {
                continue;
            }
            let dx = gx.get_pixel(x, y)[0] as f32;
            let dy = gy.get_pixel(x, y)[0] as f32;
            let mag = dx.hypot(dy);
            if mag <= f32::EPSILON {
                continue;
            }
            points.push((x, y, dx / mag, dy / mag));
        }

        Self {
            width: gray.width(),
            height: gray.height(),
            points,
        }
    }
}

/// Gradient Hough circle transform.
///
/// Every edge pixel votes along its gradient (both directions) for centres
/// at every radius in the band. Accumulator peaks above `param2` become
/// centre candidates, strongest first; candidates closer than `min_dist` to
/// an accepted circle are skipped. The radius of a centre is the one with the
/// most edge pixels at that distance.
pub fn hough_circles(field: &EdgeField, params: &HoughParams) -> Result<Vec<Circle>> {
    if !(params.dp >= 1.0) {
        bail!("Hough dp must be >= 1, got {}", params.dp);
    }
    let max_radius = if params.max_radius == 0 {
        field.width.max(field.height) / 2
    } else {
        params.max_radius
    };
    let min_radius = params.min_radius.max(1);
    if min_radius > max_radius {
        bail!("Hough radius band is empty: {}..{}", min_radius, max_radius);
    }
    if field.points.is_empty() {
        return Ok(Vec::new());
    }

    let acc_w = (field.width as f64 / params.dp).ceil() as usize + 1;
    let acc_h = (field.height as f64 / params.dp).ceil() as usize + 1;
    let mut acc = vec![0u32; acc_w * acc_h];

    for &(x, y, ux, uy) in &field.points {
        for sign in [-1.0f32, 1.0] {
            for r in min_radius..=max_radius {
                let cx = x as f32 + sign * ux * r as f32;
                let cy = y as f32 + sign * uy * r as f32;
                if cx < 0.0 || cy < 0.0 {
                    break;
                }
                let ax = (cx / params.dp as f32).round() as usize;
                let ay = (cy / params.dp as f32).round() as usize;
                if ax >= acc_w || ay >= acc_h {
                    break;
                }
                acc[ay * acc_w + ax] += 1;
            }
        }
    }

    let smoothed = smooth_3x3(&acc, acc_w, acc_h);
    let threshold = params.param2.max(1.0) as u32;

    let mut peaks = Vec::new();
    for ay in 1..acc_h.saturating_sub(1) {
        for ax in 1..acc_w.saturating_sub(1) {
            let v = smoothed[ay * acc_w + ax];
            if v < threshold {
                continue;
            }
            let is_max = (ay - 1..=ay + 1).all(|ny| {
                (ax - 1..=ax + 1).all(|nx| {
                    let n = smoothed[ny * acc_w + nx];
                    // ties broken toward the top-left neighbour
                    n < v || (n == v && (ny, nx) >= (ay, ax))
                })
            });
            if is_max {
                peaks.push((v, ax, ay));
            }
        }
    }
    peaks.sort_by(|a, b| b.0.cmp(&a.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

    let mut circles: Vec<Circle> = Vec::new();
    for (_, ax, ay) in peaks {
        let (cx, cy) = refine_peak(&acc, acc_w, acc_h, ax, ay, params.dp);
        if circles
            .iter()
            .any(|c| c.distance_to(cx, cy) < params.min_dist)
        {
            continue;
        }
        if let Some(radius) = best_radius(field, cx, cy, min_radius, max_radius, threshold) {
            circles.push(Circle::new(cx, cy, radius));
        }
    }

    Ok(circles)
}

fn smooth_3x3(acc: &[u32], w: usize, h: usize) -> Vec<u32> {
    let mut out = vec![0u32; acc.len()];
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let mut sum = 0;
            for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    sum += acc[ny * w + nx];
                }
            }
            out[y * w + x] = sum;
        }
    }
    out
}

/// Vote-weighted centroid of the 3x3 neighbourhood of a peak, in pixels.
fn refine_peak(acc: &[u32], w: usize, h: usize, ax: usize, ay: usize, dp: f64) -> (f64, f64) {
    let (mut sx, mut sy, mut total) = (0.0, 0.0, 0.0);
    for ny in ay.saturating_sub(1)..=(ay + 1).min(h - 1) {
        for nx in ax.saturating_sub(1)..=(ax + 1).min(w - 1) {
            let v = acc[ny * w + nx] as f64;
            sx += v * nx as f64;
            sy += v * ny as f64;
            total += v;
        }
    }
    if total == 0.0 {
        return (ax as f64 * dp, ay as f64 * dp);
    }
    (sx / total * dp, sy / total * dp)
}

fn best_radius(
    field: &EdgeField,
    cx: f64,
    cy: f64,
    min_radius: u32,
    max_radius: u32,
    threshold: u32,
) -> Option<f64> {
    let bins = (max_radius + 2) as usize;
    let mut hist = vec![0u32; bins];
    let mut sums = vec![0.0f64; bins];
    for &(x, y, _, _) in &field.points {
        let d = (x as f64 - cx).hypot(y as f64 - cy);
        let r = d.round() as usize;
        if r + 1 < min_radius as usize || r > max_radius as usize + 1 {
            continue;
        }
        hist[r] += 1;
        sums[r] += d;
    }

    let mut best: Option<(u32, usize)> = None;
    for r in min_radius as usize..=max_radius as usize {
        let support = hist[r - 1] + hist[r] + hist[r + 1];
        if best.is_none_or(|(s, _)| support > s) {
            best = Some((support, r));
        }
    }

    let (support, r) = best?;
    let circumference = 2.0 * std::f64::consts::PI * r as f64;
    if support < threshold || (support as f64) < circumference * MIN_CIRCUMFERENCE_SUPPORT {
        return None;
    }

    let count = (hist[r - 1] + hist[r] + hist[r + 1]) as f64;
    let radius = (sums[r - 1] + sums[r] + sums[r + 1]) / count;
    Some(radius)
}

/// Approximate share of a circle's bounding square that lies inside the image.
pub fn visible_circle_ratio(circle: &Circle, width: u32, height: u32) -> f64 {
    let left = (circle.x - circle.radius).max(0.0);
    let right = (circle.x + circle.radius).min(width as f64 - 1.0);
    let top = (circle.y - circle.radius).max(0.0);
    let bottom = (circle.y + circle.radius).min(height as f64 - 1.0);
    if right < left || bottom < top {
        return 0.0;
    }
    let side = 2.0 * circle.radius;
    let full = side * side;
    if full == 0.0 {
        return 0.0;
    }
    ((right - left) * (bottom - top) / full).min(1.0)
}

/// Smallest circle containing every point.
pub fn min_enclosing_circle(points: &[Point<i32>]) -> Option<Circle> {
    let hull = convex_hull(points.to_vec());
    let mut pts: Vec<(f64, f64)> = hull.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    match pts.len() {
        0 => return None,
        1 => return Some(Circle::new(pts[0].0, pts[0].1, 0.0)),
        _ => {}
    }
    deterministic_shuffle(&mut pts);

    let mut c = circle_from_two(pts[0], pts[1]);
    for i in 2..pts.len() {
        if contains(&c, pts[i]) {
            continue;
        }
        c = circle_from_two(pts[0], pts[i]);
        for j in 1..i {
            if contains(&c, pts[j]) {
                continue;
            }
            c = circle_from_two(pts[i], pts[j]);
            for k in 0..j {
                if !contains(&c, pts[k]) {
                    c = circle_from_three(pts[i], pts[j], pts[k])
                        .unwrap_or_else(|| widest_pair(pts[i], pts[j], pts[k]));
                }
            }
        }
    }
    Some(c)
}

fn contains(c: &Circle, p: (f64, f64)) -> bool {
    c.distance_to(p.0, p.1) <= c.radius + 1e-7
}

fn circle_from_two(a: (f64, f64), b: (f64, f64)) -> Circle {
    let cx = (a.0 + b.0) / 2.0;
    let cy = (a.1 + b.1) / 2.0;
    Circle::new(cx, cy, (a.0 - cx).hypot(a.1 - cy))
}

fn circle_from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Option<Circle> {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < 1e-12 {
        return None;
    }
    let a2 = a.0 * a.0 + a.1 * a.1;
    let b2 = b.0 * b.0 + b.1 * b.1;
    let c2 = c.0 * c.0 + c.1 * c.1;
    let ux = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
    let uy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
    Some(Circle::new(ux, uy, (a.0 - ux).hypot(a.1 - uy)))
}

/// Collinear fallback: the circle over the two farthest points.
fn widest_pair(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Circle {
    [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)]
        .into_iter()
        .fold(Circle::new(0.0, 0.0, -1.0), |best, cand| {
            if cand.radius > best.radius { cand } else { best }
        })
}

/// Fixed-seed Fisher-Yates shuffle; keeps the incremental algorithm fast on
/// ordered contour points while staying reproducible.
fn deterministic_shuffle<T>(items: &mut [T]) {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    for i in (1..items.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
