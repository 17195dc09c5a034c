use anyhow::{anyhow, Result};
use image::DynamicImage;

use crate::detection::blob::detect_blobs;
use crate::detection::circles::{hough_circles, visible_circle_ratio, EdgeField};
use crate::detection::contours::{find_and_filter_contours, passes_shape_filter};
use crate::detection::preprocessing;
use crate::detection::watershed::{basin_contours, watershed};
use crate::models::{Circle, Region};
use crate::neural::NeuralNetDetector;
use crate::params::{AdaptiveMethod, DetectionAlgorithm, DetectionParams, HoughParams, MorphShape};
use crate::pipeline::DetectionContext;

/// Circles less visible than this inside the image are dropped.
pub const MIN_VISIBLE_RATIO: f64 = 0.6;

/// A segmentation algorithm turning an image into candidate regions.
pub trait SegmentationStrategy {
    fn name(&self) -> &str;

    fn detect(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        ctx: &DetectionContext,
    ) -> Result<Vec<Region>>;
}

/// Pick the strategy for an algorithm. The neural strategy borrows the
/// detector holding the loaded model, if any.
pub fn strategy_for<'a>(
    algorithm: DetectionAlgorithm,
    neural: Option<&'a NeuralNetDetector>,
) -> Box<dyn SegmentationStrategy + 'a> {
    match algorithm {
        DetectionAlgorithm::HoughCircles => Box::new(HoughStrategy),
        DetectionAlgorithm::ContourBased => Box::new(ContourStrategy),
        DetectionAlgorithm::Watershed => Box::new(WatershedStrategy),
        DetectionAlgorithm::Morphology => Box::new(MorphologyStrategy),
        DetectionAlgorithm::AdaptiveThreshold => Box::new(AdaptiveThresholdStrategy),
        DetectionAlgorithm::BlobDetection => Box::new(BlobStrategy),
        DetectionAlgorithm::NeuralNetwork => Box::new(NeuralStrategy { detector: neural }),
    }
}

fn contour_regions(contours: Vec<Vec<imageproc::point::Point<i32>>>) -> Vec<Region> {
    contours.into_iter().map(Region::Contour).collect()
}

/// Gaussian-weighted adaptive threshold followed by a small open/close.
pub struct ContourStrategy;

impl SegmentationStrategy for ContourStrategy {
    fn name(&self) -> &str {
        "Contour"
    }

    fn detect(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        ctx: &DetectionContext,
    ) -> Result<Vec<Region>> {
        let gray = preprocessing::to_grayscale(image);
        let blurred = preprocessing::gaussian_blur_kernel(&gray, 5);
        let binary = preprocessing::adaptive_threshold_inv(&blurred, 11, 2.0, AdaptiveMethod::Gaussian);
        let opened = preprocessing::open(&binary, MorphShape::Ellipse, 3, 1);
        let cleaned = preprocessing::close(&opened, MorphShape::Ellipse, 3, 1);

        ctx.save_debug_image(self.name(), "01_binary", &binary);
        ctx.save_debug_image(self.name(), "02_cleaned", &cleaned);

        let contours = find_and_filter_contours(&cleaned, params);
        log::debug!("{}: {} contours passed the shape filter", self.name(), contours.len());
        Ok(contour_regions(contours))
    }
}

/// Adaptive threshold with configurable block size, constant and method.
pub struct AdaptiveThresholdStrategy;

impl SegmentationStrategy for AdaptiveThresholdStrategy {
    fn name(&self) -> &str {
        "Adaptive Threshold"
    }

    fn detect(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        ctx: &DetectionContext,
    ) -> Result<Vec<Region>> {
        let adaptive = &params.adaptive;
        let gray = preprocessing::to_grayscale(image);
        let blurred = preprocessing::gaussian_blur_kernel(&gray, 5);
        let binary =
            preprocessing::adaptive_threshold_inv(&blurred, adaptive.block_size, adaptive.c, adaptive.method);
        let opened = preprocessing::open(&binary, MorphShape::Ellipse, 5, 1);
        let cleaned = preprocessing::close(&opened, MorphShape::Ellipse, 5, 1);

        ctx.save_debug_image(self.name(), "01_binary", &binary);
        ctx.save_debug_image(self.name(), "02_cleaned", &cleaned);

        let contours = find_and_filter_contours(&cleaned, params);
        log::debug!("{}: {} contours passed the shape filter", self.name(), contours.len());
        Ok(contour_regions(contours))
    }
}

/// Distance-transform seeded watershed; separates touching cells.
pub struct WatershedStrategy;

impl SegmentationStrategy for WatershedStrategy {
    fn name(&self) -> &str {
        "Watershed"
    }

    fn detect(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        ctx: &DetectionContext,
    ) -> Result<Vec<Region>> {
        let gray = preprocessing::to_grayscale(image);
        let blurred = preprocessing::median_blur(&gray, 3);
        let binary = preprocessing::otsu_binarize_inv(&blurred);
        let opened = preprocessing::open(&binary, MorphShape::Ellipse, 3, 2);

        let dist = preprocessing::distance_transform(&opened);
        let sure_foreground = preprocessing::threshold_relative(&dist, 0.5);
        let labels = watershed(&opened, &dist, &sure_foreground, &params.watershed);

        ctx.save_debug_image(self.name(), "01_binary", &opened);
        ctx.save_debug_image(self.name(), "02_seeds", &sure_foreground);
        ctx.save_debug_image(self.name(), "03_labels", &labels.to_debug_image());
        log::debug!("{}: {} basins", self.name(), labels.basin_count);

        let contours: Vec<_> = basin_contours(&labels)
            .into_iter()
            .filter(|c| passes_shape_filter(c, params))
            .collect();
        Ok(contour_regions(contours))
    }
}

/// Repeated opening, then the cores of the distance map.
pub struct MorphologyStrategy;

impl SegmentationStrategy for MorphologyStrategy {
    fn name(&self) -> &str {
        "Morphology"
    }

    fn detect(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        ctx: &DetectionContext,
    ) -> Result<Vec<Region>> {
        let morph = &params.morphology;
        let gray = preprocessing::to_grayscale(image);
        let blurred = preprocessing::gaussian_blur_kernel(&gray, 3);
        let binary = preprocessing::otsu_binarize_inv(&blurred);
        let opened = preprocessing::open(&binary, morph.shape, morph.kernel_size, morph.iterations);

        let dist = preprocessing::distance_transform(&opened);
        let cores = preprocessing::threshold_relative(&dist, 0.4);

        ctx.save_debug_image(self.name(), "01_opened", &opened);
        ctx.save_debug_image(self.name(), "02_cores", &cores);

        let contours = find_and_filter_contours(&cores, params);
        log::debug!("{}: {} contours passed the shape filter", self.name(), contours.len());
        Ok(contour_regions(contours))
    }
}

/// Multi-threshold dark blob detector; keypoints become regions directly.
pub struct BlobStrategy;

impl SegmentationStrategy for BlobStrategy {
    fn name(&self) -> &str {
        "Blob"
    }

    fn detect(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        _ctx: &DetectionContext,
    ) -> Result<Vec<Region>> {
        let gray = preprocessing::to_grayscale(image);
        let keypoints = detect_blobs(&gray, params);
        log::debug!("{}: {} keypoints", self.name(), keypoints.len());
        Ok(keypoints.into_iter().map(Region::Keypoint).collect())
    }
}

/// Gradient Hough circle transform on a median-blurred image.
pub struct HoughStrategy;

impl HoughStrategy {
    /// Edge field of the image as the strategy sees it, for callers that run
    /// many Hough trials over the same image.
    pub fn edge_field(image: &DynamicImage, canny_high: f64) -> EdgeField {
        let gray = preprocessing::to_grayscale(image);
        let blurred = preprocessing::median_blur(&gray, 5);
        EdgeField::compute(&blurred, canny_high)
    }

    /// Hough circles over a precomputed edge field, minus those mostly
    /// outside the image.
    pub fn circles(field: &EdgeField, hough: &HoughParams) -> Result<Vec<Circle>> {
        let circles = hough_circles(field, hough)?;
        Ok(circles
            .into_iter()
            .filter(|c| visible_circle_ratio(c, field.width, field.height) >= MIN_VISIBLE_RATIO)
            .collect())
    }
}

impl SegmentationStrategy for HoughStrategy {
    fn name(&self) -> &str {
        "Hough Circles"
    }

    fn detect(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        ctx: &DetectionContext,
    ) -> Result<Vec<Region>> {
        let field = Self::edge_field(image, params.hough.param1);
        if ctx.debug_enabled() {
            let mut edges = image::GrayImage::new(field.width, field.height);
            for &(x, y, _, _) in &field.points {
                edges.put_pixel(x, y, image::Luma([preprocessing::FOREGROUND]));
            }
            ctx.save_debug_image(self.name(), "01_edges", &edges);
        }

        let circles = Self::circles(&field, &params.hough)?;
        log::debug!("{}: {} circles", self.name(), circles.len());
        Ok(circles.into_iter().map(Region::Circle).collect())
    }
}

/// Learned segmentation through a loaded model.
pub struct NeuralStrategy<'a> {
    pub detector: Option<&'a NeuralNetDetector>,
}

impl SegmentationStrategy for NeuralStrategy<'_> {
    fn name(&self) -> &str {
        "Neural Network"
    }

    fn detect(
        &self,
        image: &DynamicImage,
        params: &DetectionParams,
        _ctx: &DetectionContext,
    ) -> Result<Vec<Region>> {
        let detector = self
            .detector
            .ok_or_else(|| anyhow!("No neural network detector configured"))?;
        let labeled = detector.detect_regions(image, &params.neural)?;
        Ok(labeled.into_iter().map(Region::Labeled).collect())
    }
}
