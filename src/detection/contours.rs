use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::arc_length;
pub use imageproc::geometry::{contour_area, convex_hull};
use imageproc::point::Point;

use crate::params::DetectionParams;

/// Raw polygon moments of a closed contour.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 == 0.0 {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}

/// Axis-aligned bounding rectangle, inclusive of its first row/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Find outer contours of the foreground in a binary mask.
pub fn find_external_contours(binary: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

/// Polygon moments via Green's theorem; orientation independent. Only the
/// centroid is read from these, areas come from [`contour_area`].
pub fn moments(contour: &[Point<i32>]) -> Moments {
    let n = contour.len();
    if n < 3 {
        return Moments::default();
    }

    let mut a = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..n {
        let p = contour[i];
        let q = contour[(i + 1) % n];
        let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
        let cross = x0 * y1 - x1 * y0;
        a += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }

    let sign = if a < 0.0 { -1.0 } else { 1.0 };
    Moments {
        m00: a.abs() / 2.0,
        m10: sign * cx / 6.0,
        m01: sign * cy / 6.0,
    }
}

/// Length of the closed contour.
pub fn perimeter(contour: &[Point<i32>]) -> f64 {
    arc_length(contour, true)
}

/// `4π·area / perimeter²`, `0` for degenerate contours.
pub fn circularity(contour: &[Point<i32>]) -> f64 {
    let p = perimeter(contour);
    if p == 0.0 {
        return 0.0;
    }
    4.0 * std::f64::consts::PI * contour_area(contour) / (p * p)
}

pub fn bounding_rect(contour: &[Point<i32>]) -> Option<BoundingRect> {
    let first = contour.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in contour {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingRect {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Contour area over its convex hull area.
pub fn solidity(contour: &[Point<i32>]) -> f64 {
    let hull_area = contour_area(&convex_hull(contour.to_vec()));
    if hull_area == 0.0 {
        return 0.0;
    }
    contour_area(contour) / hull_area
}

/// Keep external contours whose area, perimeter and circularity fall inside
/// the configured bounds.
pub fn find_and_filter_contours(
    binary: &GrayImage,
    params: &DetectionParams,
) -> Vec<Vec<Point<i32>>> {
    find_external_contours(binary)
        .into_iter()
        .filter(|contour| passes_shape_filter(contour, params))
        .collect()
}

pub fn passes_shape_filter(contour: &[Point<i32>], params: &DetectionParams) -> bool {
    let area = contour_area(contour);
    let perim = perimeter(contour);
    params.area_in_range(area)
        && perim >= params.contour.min_perimeter
        && perim <= params.contour.max_perimeter
        && params.circularity_in_range(circularity(contour))
}
