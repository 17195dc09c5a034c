use std::path::Path;

use image::{DynamicImage, GrayImage};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;

use super::{label_search_rect, ScaleValueSource};
use crate::models::LineSegment;

/// Height the label region is scaled to before recognition.
const OCR_TARGET_HEIGHT: u32 = 64;

/// Reads the scale label with the `ocrs` engine.
pub struct OcrScaleReader {
    engine: OcrEngine,
}

impl OcrScaleReader {
    /// Initialize the engine with models from the standard cache location
    /// (`~/.cache/ocrs`).
    pub fn from_default_models() -> anyhow::Result<Self> {
        let home_dir = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        let cache_dir = Path::new(&home_dir).join(".cache/ocrs");
        Self::from_model_dir(&cache_dir)
    }

    pub fn from_model_dir(dir: &Path) -> anyhow::Result<Self> {
        let detection_model_path = dir.join("text-detection.rten");
        let recognition_model_path = dir.join("text-recognition.rten");

        if !detection_model_path.exists() || !recognition_model_path.exists() {
            anyhow::bail!(
                "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
                 Expected locations:\n  - {}\n  - {}",
                detection_model_path.display(),
                recognition_model_path.display()
            );
        }

        let detection_model = Model::load_file(&detection_model_path)?;
        let recognition_model = Model::load_file(&recognition_model_path)?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })?;

        Ok(Self { engine })
    }

    fn recognize(&self, region: &GrayImage) -> Option<String> {
        let prepared = upscale_for_ocr(region).to_rgb8();
        let img_source = ImageSource::from_bytes(prepared.as_raw(), prepared.dimensions()).ok()?;
        let ocr_input = self.engine.prepare_input(img_source).ok()?;

        match self.engine.get_text(&ocr_input) {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() { None } else { Some(text) }
            }
            Err(e) => {
                log::debug!("OCR failed on scale label: {}", e);
                None
            }
        }
    }
}

impl ScaleValueSource for OcrScaleReader {
    fn name(&self) -> &str {
        "ocr"
    }

    fn read_value(&self, gray: &GrayImage, line: &LineSegment) -> Option<f64> {
        let (x, y, w, h) = label_search_rect(gray.width(), gray.height(), line)?;
        let region = image::imageops::crop_imm(gray, x, y, w, h).to_image();
        let text = self.recognize(&region)?;
        log::debug!("Scale label text: {:?}", text);
        parse_first_number(&text)
    }
}

/// Small label crops recognize poorly; scale them up keeping the aspect.
fn upscale_for_ocr(region: &GrayImage) -> DynamicImage {
    let (width, height) = region.dimensions();
    if height >= OCR_TARGET_HEIGHT || height == 0 {
        return DynamicImage::ImageLuma8(region.clone());
    }
    let scale = OCR_TARGET_HEIGHT as f32 / height as f32;
    let scaled_w = (width as f32 * scale).round().max(1.0) as u32;
    let scaled = image::imageops::resize(
        region,
        scaled_w,
        OCR_TARGET_HEIGHT,
        image::imageops::FilterType::CatmullRom,
    );
    DynamicImage::ImageLuma8(scaled)
}

/// First run of digits and dots in `text`, parsed as a number.
pub fn parse_first_number(text: &str) -> Option<f64> {
    let number: String = text
        .chars()
        .skip_while(|c| !(c.is_ascii_digit() || *c == '.'))
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_value_with_unit() {
        assert_eq!(parse_first_number("100 nm"), Some(100.0));
        assert_eq!(parse_first_number("Scale: 2.5 um"), Some(2.5));
        assert_eq!(parse_first_number("500nm 20kV"), Some(500.0));
    }

    #[test]
    fn unparsable_text_gives_none() {
        assert_eq!(parse_first_number("nm"), None);
        assert_eq!(parse_first_number("1.2.3"), None);
    }
}
