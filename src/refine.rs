//! Iterative sharpening of the watermark template.
//!
//! Each pass locates the current estimate in the averaged reference image,
//! cuts the matched regions out of every source image and averages them into
//! the next estimate. Coordinates are recomputed from scratch every pass.

use image::GrayImage;
use log::{debug, warn};

use crate::averaging::RunningMean;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::locator;
use crate::region::{self, Match};

/// Outcome of one location pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Number of instances located.
    pub matches: usize,
    /// Mean correlation of those instances, `None` if there were none.
    pub mean_score: Option<f32>,
}

/// Final watermark estimate and the instances it was located at.
#[derive(Debug, Clone)]
pub struct Refinement {
    /// Best estimate of the pure watermark pattern.
    pub watermark: GrayImage,
    /// Instances found by the last location pass.
    pub matches: Vec<Match>,
    /// One report per location pass, in order.
    pub passes: Vec<PassReport>,
}

impl Refinement {
    /// True when the last pass located nothing; removal will be a no-op.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Average the template-sized regions at every match across every image.
///
/// # Errors
///
/// Returns [`Error::EmptySequence`] if there are no images or no matches,
/// and [`Error::RoiOutOfBounds`] if a match does not fit an image.
pub fn mean_regions(
    images: &[GrayImage],
    matches: &[Match],
    width: u32,
    height: u32,
) -> Result<GrayImage> {
    let mut mean = RunningMean::new();
    for image in images {
        for m in matches {
            mean.push(&m.region(width, height).crop(image)?)?;
        }
    }
    mean.finish()
}

/// Refine `seed` over `config.refine_count - 1` passes.
///
/// `reference` is the averaged source image the estimate is located in;
/// `images` are the individual sources the regions are averaged from. A
/// refine count of 1 skips re-estimation but still locates the seed once.
///
/// A pass that finds no instance ends refinement early with an empty match
/// set. With [`Config::require_stable_count`], a pass whose instance count
/// differs from the previous pass is discarded and refinement stops.
///
/// # Errors
///
/// Returns [`Error::EmptySequence`] if `images` is empty,
/// [`Error::SizeMismatch`] if any image differs in size from `reference`,
/// or any error from [`locator::locate`].
pub fn refine(
    images: &[GrayImage],
    reference: &GrayImage,
    seed: GrayImage,
    config: &Config,
) -> Result<Refinement> {
    config.validate()?;
    if images.is_empty() {
        return Err(Error::EmptySequence);
    }
    if let Some(bad) = images.iter().find(|i| i.dimensions() != reference.dimensions()) {
        return Err(Error::SizeMismatch {
            expected: reference.dimensions(),
            found: bad.dimensions(),
        });
    }

    let (width, height) = seed.dimensions();
    let mut watermark = seed;
    let mut matches = Vec::new();
    let mut passes: Vec<PassReport> = Vec::new();
    let location_passes = config.refine_count.saturating_sub(1).max(1);

    for pass in 1..=location_passes {
        let found = locator::locate(reference, &watermark, config.match_threshold)?;
        let report = PassReport {
            matches: found.len(),
            mean_score: region::mean_score(&found),
        };
        debug!(
            "refine pass {pass}/{location_passes}: {} instance(s), mean score {:?}",
            report.matches, report.mean_score
        );

        if let Some(prev) = passes.last() {
            if prev.matches != report.matches {
                warn!(
                    "instance count changed between passes ({} -> {})",
                    prev.matches, report.matches
                );
                if config.require_stable_count {
                    passes.push(report);
                    break;
                }
            }
        }
        passes.push(report);

        if found.is_empty() {
            warn!("refine pass {pass} located no watermark instances");
            matches = found;
            break;
        }

        if config.refine_count > 1 {
            watermark = mean_regions(images, &found, width, height)?;
        }
        matches = found;
    }

    Ok(Refinement {
        watermark,
        matches,
        passes,
    })
}
