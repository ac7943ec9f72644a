//! Batch removal engine: estimation once, decoration per image.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, RgbImage};
use log::{debug, info, warn};

use crate::averaging;
use crate::blending;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::healing::{self, DEFAULT_RADIUS};
use crate::mask::{self, WatermarkMask};
use crate::refine::{self, Refinement};
use crate::region::{Match, Roi};

/// Everything the decoration pass needs, computed once per batch.
///
/// Read-only after construction, so it can be shared across threads.
#[derive(Debug, Clone)]
pub struct WatermarkModel {
    /// Refined watermark estimate, instances and per-pass reports.
    pub refinement: Refinement,
    /// Alpha mask and outline derived from the estimate.
    pub mask: WatermarkMask,
    /// Width and height shared by every image of the batch.
    pub dimensions: (u32, u32),
}

impl WatermarkModel {
    /// The refined watermark estimate.
    #[must_use]
    pub fn watermark(&self) -> &GrayImage {
        &self.refinement.watermark
    }

    /// Top-left corners of every located instance.
    #[must_use]
    pub fn matches(&self) -> &[Match] {
        &self.refinement.matches
    }

    /// True when no instance was located and removal changes nothing.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.refinement.is_degenerate()
    }
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the image was written unmodified because no instance was located.
    pub skipped: bool,
    /// Number of watermark instances cleaned.
    pub instances: usize,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn failed(path: &Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            skipped: false,
            instances: 0,
            message,
        }
    }
}

/// The removal engine holding the batch configuration.
///
/// Create once with [`WatermarkEngine::new()`], estimate a
/// [`WatermarkModel`] from the grayscale batch, then apply it to each color
/// image.
pub struct WatermarkEngine {
    config: Config,
}

impl WatermarkEngine {
    /// Create an engine after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is out of range.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this engine was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Average the batch and scale it for display, so an operator can pick
    /// the seed rectangle in an external viewer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySequence`], [`Error::SizeMismatch`] or
    /// [`Error::InvalidConfig`] for a non-positive scale.
    pub fn preview(&self, images: &[GrayImage], display_scale: f32) -> Result<GrayImage> {
        if !(display_scale.is_finite() && display_scale > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "display scale must be positive, got {display_scale}"
            )));
        }
        let mean = averaging::mean_images(images)?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = |v: u32| ((f64::from(v) * f64::from(display_scale)) as u32).max(1);
        Ok(imageops::resize(
            &mean,
            scaled(mean.width()),
            scaled(mean.height()),
            FilterType::Triangle,
        ))
    }

    /// Estimate the watermark shared by `images` starting from `seed`.
    ///
    /// `seed` is a full-resolution rectangle around one watermark instance
    /// in the averaged image.
    ///
    /// # Errors
    ///
    /// Any precondition violation aborts: empty batch, mismatched sizes, or
    /// a seed outside the image. Locating nothing is not an error; check
    /// [`WatermarkModel::is_degenerate`].
    pub fn estimate(&self, images: &[GrayImage], seed: Roi) -> Result<WatermarkModel> {
        let reference = averaging::mean_images(images)?;
        let template = seed.crop(&reference)?;
        debug!("seed {seed} cropped from {}x{} mean", reference.width(), reference.height());

        let refinement = refine::refine(images, &reference, template, &self.config)?;
        if refinement.is_degenerate() {
            warn!("no watermark instances located; images will be left unmodified");
        } else {
            info!(
                "located {} watermark instance(s) after {} pass(es)",
                refinement.matches.len(),
                refinement.passes.len()
            );
        }

        let mask = mask::build_mask(&refinement.watermark, &self.config);
        Ok(WatermarkModel {
            refinement,
            mask,
            dimensions: reference.dimensions(),
        })
    }

    /// Remove every located watermark instance from a color image in-place.
    ///
    /// Each instance region is reverse-blended under the mask and its
    /// outline inpainted before being written back. Returns the number of
    /// instances processed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if `image` does not match the batch
    /// dimensions.
    pub fn remove(&self, model: &WatermarkModel, image: &mut RgbImage) -> Result<usize> {
        if image.dimensions() != model.dimensions {
            return Err(Error::SizeMismatch {
                expected: model.dimensions,
                found: image.dimensions(),
            });
        }

        let (w, h) = (model.mask.width(), model.mask.height());
        for m in model.matches() {
            let mut roi = imageops::crop_imm(image, m.x, m.y, w, h).to_image();
            blending::decompose_region(&mut roi, &model.mask.mask, 0, 0, self.config.color);
            healing::inpaint_telea(&mut roi, &model.mask.outline, DEFAULT_RADIUS);
            imageops::replace(image, &roi, i64::from(m.x), i64::from(m.y));
        }
        Ok(model.matches().len())
    }

    /// Process a single color image file: load, remove, save.
    ///
    /// Failures are reported in the returned [`ProcessResult`] rather than
    /// propagated, so one bad file does not stop a batch.
    #[must_use]
    pub fn process_file(
        &self,
        model: &WatermarkModel,
        input: &Path,
        output: &Path,
    ) -> ProcessResult {
        let mut rgb_img = match image::open(input) {
            Ok(img) => img.to_rgb8(),
            Err(e) => return ProcessResult::failed(input, format!("Failed to load: {e}")),
        };

        let instances = match self.remove(model, &mut rgb_img) {
            Ok(n) => n,
            Err(e) => return ProcessResult::failed(input, e.to_string()),
        };

        if let Err(e) = save_image(&rgb_img, output) {
            return ProcessResult::failed(input, format!("Failed to save: {e}"));
        }

        let skipped = instances == 0;
        ProcessResult {
            path: input.to_path_buf(),
            success: true,
            skipped,
            instances,
            message: if skipped {
                "No watermark instances located; written unmodified".to_string()
            } else {
                format!("Removed {instances} watermark instance(s)")
            },
        }
    }

    /// Process every supported image in a directory.
    ///
    /// All images are loaded as grayscale and the model is estimated before
    /// anything is written; any failure in that phase aborts the batch.
    /// Color images are then cleaned one by one (in parallel when the `cli`
    /// feature is enabled) and written to `output_dir` under their original
    /// file names.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read, an image cannot be
    /// decoded, estimation fails, or the output directory cannot be created.
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        seed: Roi,
    ) -> Result<Vec<ProcessResult>> {
        let inputs = list_images(input_dir)?;
        info!("loading {} image(s) from {}", inputs.len(), input_dir.display());

        let gray: Vec<GrayImage> = inputs
            .iter()
            .map(|p| -> Result<GrayImage> { Ok(image::open(p)?.to_luma8()) })
            .collect::<Result<_>>()?;
        let model = self.estimate(&gray, seed)?;
        drop(gray);

        if !output_dir.exists() {
            std::fs::create_dir_all(output_dir)?;
        }

        let jobs: Vec<(PathBuf, PathBuf)> = inputs
            .into_iter()
            .filter_map(|input| {
                let name = input.file_name()?.to_owned();
                Some((input, output_dir.join(name)))
            })
            .collect();

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            Ok(jobs
                .par_iter()
                .map(|(input, output)| self.process_file(&model, input, output))
                .collect())
        }

        #[cfg(not(feature = "cli"))]
        {
            Ok(jobs
                .iter()
                .map(|(input, output)| self.process_file(&model, input, output))
                .collect())
        }
    }
}

/// Supported image files in `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| is_supported_image(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(img)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save_with_format(path, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output directory next to the input directory.
///
/// Example: `"shots"` becomes `"shots_cleaned"`.
#[must_use]
pub fn default_output_dir(input_dir: &Path) -> PathBuf {
    let name = input_dir
        .file_name()
        .map_or_else(|| "images".into(), |n| n.to_string_lossy());
    let parent = input_dir.parent().unwrap_or(Path::new("."));
    parent.join(format!("{name}_cleaned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn engine() -> WatermarkEngine {
        WatermarkEngine::new(Config {
            alpha: 128,
            color: 200,
            mask_threshold: 100,
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = Config {
            refine_count: 0,
            ..Config::default()
        };
        assert!(WatermarkEngine::new(config).is_err());
    }

    #[test]
    fn estimate_rejects_seed_outside_image() {
        let images = vec![GrayImage::new(30, 30)];
        let err = engine().estimate(&images, Roi::new(25, 25, 10, 10));
        assert!(matches!(err, Err(Error::RoiOutOfBounds { .. })));
    }

    #[test]
    fn estimate_rejects_empty_batch() {
        let err = engine().estimate(&[], Roi::new(0, 0, 1, 1));
        assert!(matches!(err, Err(Error::EmptySequence)));
    }

    #[test]
    fn remove_rejects_mismatched_image() {
        let images = vec![GrayImage::from_fn(30, 30, |x, _| Luma([u8::try_from(x * 8).unwrap()]))];
        let model = engine().estimate(&images, Roi::new(0, 0, 10, 10)).unwrap();
        let mut wrong = RgbImage::new(31, 30);
        assert!(matches!(
            engine().remove(&model, &mut wrong),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn degenerate_model_leaves_image_unchanged() {
        let images = vec![GrayImage::from_pixel(30, 30, Luma([77]))];
        let model = engine().estimate(&images, Roi::new(5, 5, 10, 10)).unwrap();
        assert!(model.is_degenerate());

        let mut img = RgbImage::from_pixel(30, 30, Rgb([77, 77, 77]));
        let before = img.clone();
        assert_eq!(engine().remove(&model, &mut img).unwrap(), 0);
        assert_eq!(img, before);
    }

    #[test]
    fn preview_scales_mean() {
        let images = vec![GrayImage::new(40, 20), GrayImage::new(40, 20)];
        let preview = engine().preview(&images, 0.5).unwrap();
        assert_eq!(preview.dimensions(), (20, 10));
        assert!(engine().preview(&images, 0.0).is_err());
    }

    #[test]
    fn default_output_dir_appends_cleaned_suffix() {
        let p = default_output_dir(Path::new("/tmp/shots"));
        assert_eq!(p, PathBuf::from("/tmp/shots_cleaned"));
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }
}
