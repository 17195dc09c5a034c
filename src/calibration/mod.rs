//! Scale-bar calibration: locate the bar near the bottom of a micrograph,
//! read its label and derive a unit-per-pixel factor.

pub mod label;
pub mod lines;
pub mod ocr;

use image::{DynamicImage, GrayImage};

use crate::detection::preprocessing;
use crate::models::{Cell, LineSegment};
use crate::pipeline::DetectionContext;
use label::LabelBlobHeuristic;
use lines::{find_segments, longest_horizontal, SegmentOptions};

/// Label value assumed when none can be read.
pub const FALLBACK_SCALE_VALUE: f64 = 100.0;

/// Share of the image height, from the bottom, searched for the bar.
const SEARCH_FRACTION: f64 = 0.25;

/// Margin around the bar searched for its label.
const LABEL_MARGIN: f64 = 50.0;

/// Source of the physical value printed next to a scale bar.
pub trait ScaleValueSource {
    fn name(&self) -> &str;

    /// Value of the label near `line`; `line` is in `gray` coordinates.
    fn read_value(&self, gray: &GrayImage, line: &LineSegment) -> Option<f64>;
}

/// A located scale bar and the factor derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBar {
    pub line: LineSegment,
    pub value: f64,
    /// `false` when the fallback value was used.
    pub value_recognized: bool,
    /// Physical units per pixel.
    pub factor: f64,
}

pub struct ScaleCalibrator {
    source: Box<dyn ScaleValueSource>,
    options: SegmentOptions,
}

impl Default for ScaleCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScaleCalibrator {
    pub fn new() -> Self {
        Self::with_source(Box::new(LabelBlobHeuristic))
    }

    pub fn with_source(source: Box<dyn ScaleValueSource>) -> Self {
        Self {
            source,
            options: SegmentOptions::default(),
        }
    }

    /// Unit-per-pixel factor of the image, `0.0` when no bar is found.
    pub fn calibrate(&self, image: &DynamicImage, ctx: &DetectionContext) -> f64 {
        self.measure(image, ctx).map_or(0.0, |bar| bar.factor)
    }

    /// Locate the scale bar and read its label.
    pub fn measure(&self, image: &DynamicImage, ctx: &DetectionContext) -> Option<ScaleBar> {
        let gray = preprocessing::to_grayscale(image);
        let Some(line) = self.find_scale_line(&gray, ctx) else {
            log::info!("No scale bar found, image stays uncalibrated");
            return None;
        };

        let length = line.length();
        let read = self.source.read_value(&gray, &line).filter(|v| *v > 0.0);
        let value = read.unwrap_or_else(|| {
            log::warn!(
                "Scale label not recognized by {}, assuming {}",
                self.source.name(),
                FALLBACK_SCALE_VALUE
            );
            FALLBACK_SCALE_VALUE
        });

        let factor = scale_factor(value, length);
        log::info!(
            "Scale bar {:.1}px labelled {} -> {:.6} units/px",
            length,
            value,
            factor
        );
        Some(ScaleBar {
            line,
            value,
            value_recognized: read.is_some(),
            factor,
        })
    }

    /// Longest near-horizontal segment in the bottom quarter of the image,
    /// in full-image coordinates.
    pub fn find_scale_line(&self, gray: &GrayImage, ctx: &DetectionContext) -> Option<LineSegment> {
        let (width, height) = gray.dimensions();
        let top = (height as f64 * (1.0 - SEARCH_FRACTION)) as u32;
        if width == 0 || height <= top {
            return None;
        }

        let bottom = image::imageops::crop_imm(gray, 0, top, width, height - top).to_image();
        let edges = preprocessing::detect_edges(&bottom, 50.0, 150.0);
        ctx.save_debug_image("Calibration", "01_edges", &edges);

        let segments = find_segments(&edges, &self.options);
        log::debug!("{} candidate scale segments", segments.len());

        let best = longest_horizontal(&segments, self.options.angle_tolerance, self.options.min_length)?;
        Some(LineSegment {
            y1: best.y1 + top as f64,
            y2: best.y2 + top as f64,
            ..best
        })
    }
}

/// `(value / 1000) / length`, `0.0` for a degenerate bar.
pub fn scale_factor(value: f64, line_length: f64) -> f64 {
    if line_length <= 0.0 {
        return 0.0;
    }
    (value / 1000.0) / line_length
}

/// Fill in physical diameters for cells of a calibrated image.
pub fn apply_to_cells(cells: &mut [Cell], factor: f64) {
    for cell in cells {
        cell.apply_calibration(factor);
    }
}

/// Region around and above a bar where its label is searched:
/// `(x, y, width, height)` clamped to the image, `None` if empty.
pub(crate) fn label_search_rect(
    width: u32,
    height: u32,
    line: &LineSegment,
) -> Option<(u32, u32, u32, u32)> {
    let x0 = (line.x1.min(line.x2) - LABEL_MARGIN).max(0.0);
    let x1 = (line.x1.max(line.x2) + LABEL_MARGIN).min(width as f64);
    let y_mid = (line.y1 + line.y2) / 2.0;
    let y0 = (y_mid - LABEL_MARGIN).max(0.0);
    let y1 = (y_mid + LABEL_MARGIN).min(height as f64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let (x, y) = (x0 as u32, y0 as u32);
    Some((x, y, (x1 as u32).saturating_sub(x), (y1 as u32).saturating_sub(y)))
        .filter(|r| r.2 > 0 && r.3 > 0)
}
