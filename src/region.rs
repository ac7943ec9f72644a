//! Rectangles and match coordinates in source-image space.

use std::fmt;

use image::GrayImage;

use crate::error::{Error, Result};

/// A rectangle `(x, y, width, height)` in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Roi {
    /// Create a region from its top-left corner and size.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert a rectangle picked on a scaled-down preview back to full resolution.
    ///
    /// Each component is multiplied by `1 / display_scale` and truncated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `display_scale` is not a positive
    /// finite number.
    pub fn from_display(rect: [u32; 4], display_scale: f32) -> Result<Self> {
        if !(display_scale.is_finite() && display_scale > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "display scale must be positive, got {display_scale}"
            )));
        }
        let inv = 1.0 / f64::from(display_scale);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scale = |v: u32| (inv * f64::from(v)) as u32;
        Ok(Self::new(
            scale(rect[0]),
            scale(rect[1]),
            scale(rect[2]),
            scale(rect[3]),
        ))
    }

    /// Ensure the region is non-empty and fits in a `width x height` image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyRoi`] or [`Error::RoiOutOfBounds`].
    pub fn validate(&self, width: u32, height: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::EmptyRoi);
        }
        let fits_x = self.x.checked_add(self.width).is_some_and(|r| r <= width);
        let fits_y = self.y.checked_add(self.height).is_some_and(|b| b <= height);
        if fits_x && fits_y {
            Ok(())
        } else {
            Err(Error::RoiOutOfBounds {
                roi: *self,
                width,
                height,
            })
        }
    }

    /// Copy this region out of `image`.
    ///
    /// # Errors
    ///
    /// Same as [`Roi::validate`].
    pub fn crop(&self, image: &GrayImage) -> Result<GrayImage> {
        self.validate(image.width(), image.height())?;
        Ok(image::imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image())
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Top-left corner of one located watermark instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Column of the instance's top-left pixel.
    pub x: u32,
    /// Row of the instance's top-left pixel.
    pub y: u32,
    /// Normalized correlation at this position, in `[-1, 1]`.
    pub score: f32,
}

impl Match {
    /// The template-sized region this match covers.
    #[must_use]
    pub const fn region(&self, width: u32, height: u32) -> Roi {
        Roi::new(self.x, self.y, width, height)
    }
}

/// Mean correlation of a match set, `None` when empty.
#[must_use]
pub fn mean_score(matches: &[Match]) -> Option<f32> {
    if matches.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = matches.len() as f32;
    Some(matches.iter().map(|m| m.score).sum::<f32>() / n)
}
