use image::GrayImage;
use imageproc::contrast::otsu_level;

use super::{label_search_rect, ScaleValueSource};
use crate::detection::contours::{bounding_rect, find_external_contours, BoundingRect};
use crate::detection::preprocessing::{self, BACKGROUND};
use crate::models::LineSegment;
use crate::params::MorphShape;

/// Calibration magnitudes, grouped by digit count.
const VALUE_MENU: [(usize, &[f64]); 4] = [
    (2, &[10.0, 20.0, 25.0, 50.0]),
    (3, &[100.0, 200.0, 250.0, 500.0]),
    (4, &[1000.0, 2000.0, 5000.0]),
    (5, &[10000.0]),
];

/// Expected width of one digit relative to the label height.
const DIGIT_ASPECT: f64 = 0.55;
/// Labels wider than this multiple of their expected width are assumed to
/// carry a larger leading digit.
const WIDE_LABEL_RATIO: f64 = 1.15;
const WIDE_LABEL_STEP: f64 = 0.1;

const MIN_LABEL_WIDTH: i32 = 10;
const MAX_LABEL_WIDTH: i32 = 200;
const MIN_LABEL_HEIGHT: i32 = 8;
const MAX_LABEL_HEIGHT: i32 = 60;
const MIN_DENSITY: f64 = 0.1;
const MAX_DENSITY: f64 = 0.5;

/// Guesses the scale label from the shape of the text blob next to the bar.
///
/// Glyphs are segmented with Otsu (the rarer polarity is text), grouped into
/// words, and the word's width over height picks the digit count and then a
/// magnitude from a fixed menu. No characters are recognized.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelBlobHeuristic;

impl ScaleValueSource for LabelBlobHeuristic {
    fn name(&self) -> &str {
        "label blob heuristic"
    }

    fn read_value(&self, gray: &GrayImage, line: &LineSegment) -> Option<f64> {
        let rect = label_search_rect(gray.width(), gray.height(), line)?;
        let region = image::imageops::crop_imm(gray, rect.0, rect.1, rect.2, rect.3).to_image();

        let binary = minority_binarize(&region);
        let closed = preprocessing::close(&binary, MorphShape::Rect, 3, 1);

        let glyphs: Vec<BoundingRect> = find_external_contours(&closed)
            .iter()
            .filter_map(|c| bounding_rect(c))
            .filter(|r| r.height >= MIN_LABEL_HEIGHT && r.height <= MAX_LABEL_HEIGHT)
            .collect();

        let line_y = (line.y1 + line.y2) / 2.0 - rect.1 as f64;
        let mut words: Vec<BoundingRect> = group_into_words(glyphs)
            .into_iter()
            .filter(|w| is_plausible_label(&binary, w))
            .collect();
        words.sort_by(|a, b| {
            let da = (a.y as f64 + a.height as f64 / 2.0 - line_y).abs();
            let db = (b.y as f64 + b.height as f64 / 2.0 - line_y).abs();
            da.total_cmp(&db)
        });

        let label = words.first()?;
        let value = value_from_shape(label.width, label.height);
        log::debug!(
            "Scale label blob {}x{} at ({}, {}) -> {}",
            label.width,
            label.height,
            label.x + rect.0 as i32,
            label.y + rect.1 as i32,
            value
        );
        Some(value)
    }
}

/// Otsu binarization with the less frequent side as foreground.
fn minority_binarize(region: &GrayImage) -> GrayImage {
    let level = otsu_level(region);
    let bright = region.pixels().filter(|p| p[0] > level).count();
    let total = (region.width() * region.height()) as usize;
    let dark_is_minority = bright * 2 >= total;
    preprocessing::binarize(region, level, dark_is_minority)
}

/// Merge glyph boxes that share a text line and sit close together.
fn group_into_words(mut glyphs: Vec<BoundingRect>) -> Vec<BoundingRect> {
    glyphs.sort_by_key(|r| (r.x, r.y));
    let mut words: Vec<BoundingRect> = Vec::new();
    for glyph in glyphs {
        match words.last_mut() {
            Some(word) if same_word(word, &glyph) => *word = union(word, &glyph),
            _ => words.push(glyph),
        }
    }
    words
}

fn same_word(word: &BoundingRect, glyph: &BoundingRect) -> bool {
    let top = word.y.max(glyph.y);
    let bottom = (word.y + word.height).min(glyph.y + glyph.height);
    let overlap = (bottom - top) as f64;
    let min_height = word.height.min(glyph.height) as f64;
    let gap = glyph.x - (word.x + word.width);
    let max_gap = 0.6 * word.height.max(glyph.height) as f64;
    overlap >= 0.5 * min_height && (gap as f64) <= max_gap
}

fn union(a: &BoundingRect, b: &BoundingRect) -> BoundingRect {
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    let right = (a.x + a.width).max(b.x + b.width);
    let bottom = (a.y + a.height).max(b.y + b.height);
    BoundingRect {
        x,
        y,
        width: right - x,
        height: bottom - y,
    }
}

fn is_plausible_label(binary: &GrayImage, rect: &BoundingRect) -> bool {
    if rect.width < MIN_LABEL_WIDTH || rect.width > MAX_LABEL_WIDTH {
        return false;
    }
    if rect.height < MIN_LABEL_HEIGHT || rect.height > MAX_LABEL_HEIGHT {
        return false;
    }
    let density = ink_density(binary, rect);
    (MIN_DENSITY..=MAX_DENSITY).contains(&density)
}

fn ink_density(binary: &GrayImage, rect: &BoundingRect) -> f64 {
    let mut ink = 0usize;
    for y in rect.y.max(0)..(rect.y + rect.height).min(binary.height() as i32) {
        for x in rect.x.max(0)..(rect.x + rect.width).min(binary.width() as i32) {
            if binary.get_pixel(x as u32, y as u32)[0] != BACKGROUND {
                ink += 1;
            }
        }
    }
    ink as f64 / (rect.width * rect.height).max(1) as f64
}

/// Map a label's size onto the magnitude menu.
///
/// The digit count comes from the aspect ratio; within a digit count, labels
/// noticeably wider than expected step to the larger magnitudes.
pub fn value_from_shape(width: i32, height: i32) -> f64 {
    let height = height.max(1) as f64;
    let digits = (width as f64 / (DIGIT_ASPECT * height)).round() as usize;
    let digits = digits.clamp(VALUE_MENU[0].0, VALUE_MENU[VALUE_MENU.len() - 1].0);

    let values = VALUE_MENU
        .iter()
        .find(|(count, _)| *count == digits)
        .map(|(_, values)| *values)
        .unwrap_or(VALUE_MENU[1].1);

    let ratio = width as f64 / (digits as f64 * DIGIT_ASPECT * height);
    let index = if ratio > WIDE_LABEL_RATIO {
        (((ratio - WIDE_LABEL_RATIO) / WIDE_LABEL_STEP).ceil() as usize).min(values.len() - 1)
    } else {
        0
    };
    values[index]
}
