use image::GrayImage;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};

use crate::detection::preprocessing::BACKGROUND;
use crate::models::LineSegment;

/// Segment search settings for [`find_segments`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions {
    pub vote_threshold: u32,
    pub min_length: f64,
    /// Longest run of missing edge pixels bridged inside one segment.
    pub max_gap: u32,
    /// Only lines whose direction is within this many degrees of horizontal
    /// are traced.
    pub angle_tolerance: f64,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            vote_threshold: 50,
            min_length: 50.0,
            max_gap: 10,
            angle_tolerance: 5.0,
        }
    }
}

/// Near-horizontal line segments of an edge map.
///
/// Hough lines are traced back over the edge pixels (one pixel either side)
/// to recover their end points; runs separated by more than `max_gap`
/// missing pixels become separate segments.
pub fn find_segments(edges: &GrayImage, options: &SegmentOptions) -> Vec<LineSegment> {
    let lines = detect_lines(
        edges,
        LineDetectionOptions {
            vote_threshold: options.vote_threshold,
            suppression_radius: 8,
        },
    );

    let mut segments = Vec::new();
    for line in lines {
        // line angle is the angle of the normal; 90 degrees is horizontal
        let off_horizontal = (line.angle_in_degrees as f64 - 90.0).abs();
        if off_horizontal > options.angle_tolerance {
            continue;
        }
        segments.extend(
            trace_line(edges, &line, options.max_gap)
                .into_iter()
                .filter(|s| s.length() >= options.min_length),
        );
    }
    segments
}

fn trace_line(edges: &GrayImage, line: &PolarLine, max_gap: u32) -> Vec<LineSegment> {
    let (width, height) = edges.dimensions();
    let theta = (line.angle_in_degrees as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    if sin.abs() < 1e-6 {
        return Vec::new();
    }

    let y_at = |x: u32| (line.r as f64 - x as f64 * cos) / sin;
    let hit = |x: u32| -> bool {
        let y = y_at(x).round() as i64;
        (y - 1..=y + 1).any(|yy| {
            yy >= 0 && (yy as u32) < height && edges.get_pixel(x, yy as u32)[0] != BACKGROUND
        })
    };

    let mut segments = Vec::new();
    let mut start: Option<u32> = None;
    let mut last_hit = 0u32;
    for x in 0..width {
        if hit(x) {
            if start.is_none() {
                start = Some(x);
            }
            last_hit = x;
        } else if let Some(s) = start {
            if x - last_hit > max_gap {
                segments.push(segment(s, last_hit, &y_at));
                start = None;
            }
        }
    }
    if let Some(s) = start {
        segments.push(segment(s, last_hit, &y_at));
    }
    segments
}

fn segment(x1: u32, x2: u32, y_at: &impl Fn(u32) -> f64) -> LineSegment {
    LineSegment {
        x1: x1 as f64,
        y1: y_at(x1),
        x2: x2 as f64,
        y2: y_at(x2),
    }
}

/// Longest segment that is within `tolerance` degrees of horizontal and
/// longer than `min_length`.
pub fn longest_horizontal(segments: &[LineSegment], tolerance: f64, min_length: f64) -> Option<LineSegment> {
    segments
        .iter()
        .filter(|s| s.is_near_horizontal(tolerance) && s.length() > min_length)
        .max_by(|a, b| a.length().total_cmp(&b.length()))
        .copied()
}
