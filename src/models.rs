use image::DynamicImage;
use imageproc::point::Point;

/// A detected cell, in pixel units unless noted otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    pub diameter_px: f64,
    pub area: f64,

    /// Diameter in physical units; `0.0` while the cell is uncalibrated.
    pub diameter_unit: f64,

    /// Detection confidence, `1.0` for non-probabilistic strategies.
    pub confidence: f32,

    /// Class id assigned by the neural strategy (`0` = unclassified).
    pub class_id: u32,
    pub class_name: String,

    pub source_image_path: String,

    /// Independent copy of the padded region around the cell.
    pub cropped_image: Option<DynamicImage>,
}

impl Cell {
    pub fn new(center_x: f64, center_y: f64, radius: f64, area: f64) -> Self {
        Self {
            center_x,
            center_y,
            radius,
            diameter_px: radius * 2.0,
            area,
            diameter_unit: 0.0,
            confidence: 1.0,
            class_id: 0,
            class_name: String::new(),
            source_image_path: String::new(),
            cropped_image: None,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.center_x, self.center_y)
    }

    pub fn distance_to(&self, other: &Cell) -> f64 {
        (self.center_x - other.center_x).hypot(self.center_y - other.center_y)
    }

    pub fn is_calibrated(&self) -> bool {
        self.diameter_unit > 0.0
    }

    /// Fill `diameter_unit` from a unit-per-pixel factor. A zero factor resets
    /// the cell to uncalibrated.
    pub fn apply_calibration(&mut self, factor: f64) {
        self.diameter_unit = if factor > 0.0 {
            self.diameter_px * factor
        } else {
            0.0
        };
    }
}

/// A circle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl Circle {
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { x, y, radius }
    }

    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }
}

/// Keypoint produced by the blob detector; `size` is the blob diameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

/// A class-labelled contour decoded from a segmentation mask.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledContour {
    pub points: Vec<Point<i32>>,
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
}

/// Candidate detection before it is turned into a [`Cell`].
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Contour(Vec<Point<i32>>),
    Keypoint(KeyPoint),
    Circle(Circle),
    Labeled(LabeledContour),
}

/// Line segment in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LineSegment {
    pub fn length(&self) -> f64 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    /// Absolute angle from the x axis, in degrees within `[0, 180]`.
    pub fn angle_degrees(&self) -> f64 {
        (self.y2 - self.y1).atan2(self.x2 - self.x1).to_degrees().abs()
    }

    pub fn is_near_horizontal(&self, tolerance_degrees: f64) -> bool {
        let angle = self.angle_degrees();
        angle < tolerance_degrees || angle > 180.0 - tolerance_degrees
    }
}
