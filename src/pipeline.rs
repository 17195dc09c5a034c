use std::path::{Path, PathBuf};

use anyhow::Result;
use image::GrayImage;

/// Debug configuration for detection runs
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Context passed explicitly to every detection, calibration and search call.
///
/// Nothing in the library reads global state besides the `log` facade.
#[derive(Clone, Debug, Default)]
pub struct DetectionContext {
    pub debug: Option<DebugConfig>,
    /// Prefix for debug file names, set per image in batch runs.
    pub image_tag: Option<String>,
}

impl DetectionContext {
    pub fn new() -> Self {
        Self {
            debug: None,
            image_tag: None,
        }
    }

    /// Enable debug mode with output directory.
    /// The directory must be empty or non-existent.
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    /// Same context with debug files prefixed by the file stem of `source`.
    pub fn for_image(&self, source: &Path) -> Self {
        let image_tag = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty());
        Self {
            debug: self.debug.clone(),
            image_tag,
        }
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.as_ref().is_some_and(|d| d.enabled)
    }

    /// Save an intermediate mask under `<debug dir>/<stage>/<name>.png`.
    ///
    /// Failures are logged and swallowed: debug output never changes the
    /// result of a detection.
    pub fn save_debug_image(&self, stage: &str, name: &str, image: &GrayImage) {
        let Some(debug_config) = &self.debug else {
            return;
        };
        if !debug_config.enabled {
            return;
        }

        let file_name = match &self.image_tag {
            Some(tag) => format!("{}_{}", tag, name),
            None => name.to_string(),
        };
        if let Err(e) = write_debug_image(&debug_config.output_dir, stage, &file_name, image) {
            log::warn!("Failed to save debug image {}/{}: {}", stage, name, e);
        }
    }
}

fn write_debug_image(root: &Path, stage: &str, name: &str, image: &GrayImage) -> Result<()> {
    let stage_dir = root.join(stage.to_lowercase().replace(' ', "_"));
    std::fs::create_dir_all(&stage_dir)?;

    let output_path = stage_dir.join(format!("{}.png", name));
    image
        .save(&output_path)
        .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;

    log::debug!("Debug: saved {}", output_path.display());
    Ok(())
}
