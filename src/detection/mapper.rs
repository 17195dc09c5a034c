use image::{DynamicImage, GenericImageView};
use imageproc::point::Point;

use crate::detection::circles::min_enclosing_circle;
use crate::detection::contours::{bounding_rect, contour_area, moments, BoundingRect};
use crate::models::{Cell, Circle, KeyPoint, LabeledContour, Region};

/// Padding added around a region when cropping its cell image.
pub const CROP_PADDING: i32 = 10;

/// Convert a candidate region into a cell with its own cropped image.
///
/// Returns `None` for regions with no usable geometry (empty contours).
pub fn region_to_cell(source: &DynamicImage, region: &Region) -> Option<Cell> {
    match region {
        Region::Contour(points) => cell_from_contour(source, points),
        Region::Keypoint(kp) => Some(cell_from_keypoint(source, kp)),
        Region::Circle(circle) => Some(cell_from_circle(source, circle)),
        Region::Labeled(labeled) => cell_from_labeled(source, labeled),
    }
}

/// Centre from contour moments, radius of the disc with the same area.
pub fn cell_from_contour(source: &DynamicImage, contour: &[Point<i32>]) -> Option<Cell> {
    let rect = bounding_rect(contour)?;
    let m = moments(contour);
    let (cx, cy) = m.centroid().unwrap_or((
        rect.x as f64 + rect.width as f64 / 2.0,
        rect.y as f64 + rect.height as f64 / 2.0,
    ));

    let area = contour_area(contour);
    let radius = (area / std::f64::consts::PI).sqrt();

    let mut cell = Cell::new(cx, cy, radius, area);
    cell.cropped_image = crop_padded(source, rect);
    Some(cell)
}

pub fn cell_from_keypoint(source: &DynamicImage, kp: &KeyPoint) -> Cell {
    cell_from_circle(source, &Circle::new(kp.x, kp.y, kp.size / 2.0))
}

pub fn cell_from_circle(source: &DynamicImage, circle: &Circle) -> Cell {
    let mut cell = Cell::new(circle.x, circle.y, circle.radius, circle.area());
    cell.cropped_image = crop_padded(source, circle_rect(circle));
    cell
}

/// Minimum enclosing circle for geometry, contour area for `area`.
pub fn cell_from_labeled(source: &DynamicImage, labeled: &LabeledContour) -> Option<Cell> {
    let circle = min_enclosing_circle(&labeled.points)?;
    let rect = bounding_rect(&labeled.points)?;

    let mut cell = Cell::new(circle.x, circle.y, circle.radius, contour_area(&labeled.points));
    cell.class_id = labeled.class_id;
    cell.class_name = labeled.class_name.clone();
    cell.confidence = labeled.confidence;
    cell.cropped_image = crop_padded(source, rect);
    Some(cell)
}

fn circle_rect(circle: &Circle) -> BoundingRect {
    let x = (circle.x - circle.radius).floor() as i32;
    let y = (circle.y - circle.radius).floor() as i32;
    let side = (circle.radius * 2.0).ceil() as i32;
    BoundingRect {
        x,
        y,
        width: side,
        height: side,
    }
}

/// Copy the rectangle grown by [`CROP_PADDING`] and clamped to the image.
/// Degenerate rectangles yield `None`.
pub fn crop_padded(source: &DynamicImage, rect: BoundingRect) -> Option<DynamicImage> {
    let (img_w, img_h) = source.dimensions();
    let x1 = (rect.x - CROP_PADDING).max(0);
    let y1 = (rect.y - CROP_PADDING).max(0);
    let x2 = (rect.x + rect.width + CROP_PADDING).min(img_w as i32);
    let y2 = (rect.y + rect.height + CROP_PADDING).min(img_h as i32);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(source.crop_imm(x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn crop_is_clamped_to_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(50, 40));
        let crop = crop_padded(
            &img,
            BoundingRect {
                x: 45,
                y: 0,
                width: 10,
                height: 10,
            },
        )
        .unwrap();
        assert_eq!(crop.dimensions(), (15, 20));
    }

    #[test]
    fn degenerate_crop_is_skipped() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(20, 20));
        let outside = BoundingRect {
            x: 100,
            y: 100,
            width: 5,
            height: 5,
        };
        assert!(crop_padded(&img, outside).is_none());
    }

    #[test]
    fn keypoint_area_is_disc_area() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let cell = cell_from_keypoint(
            &img,
            &KeyPoint {
                x: 50.0,
                y: 50.0,
                size: 20.0,
            },
        );
        assert_eq!(cell.radius, 10.0);
        assert!((cell.area - std::f64::consts::PI * 100.0).abs() < 1e-9);
        assert_eq!(cell.diameter_px, 20.0);
        assert!(cell.cropped_image.is_some());
    }
}
