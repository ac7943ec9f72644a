//! Alpha mask and edge outline derived from the refined watermark.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::laplacian_filter;

use crate::config::Config;

/// Per-pixel watermark contribution and the band around its silhouette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkMask {
    /// `config.alpha` where the estimate reaches the mask threshold, 0 elsewhere.
    pub mask: GrayImage,
    /// Non-zero along the silhouette boundary, where decomposition is least reliable.
    pub outline: GrayImage,
}

impl WatermarkMask {
    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.mask.height()
    }
}

/// Map pixels `>= threshold` to `on`, everything else to 0.
fn binarize(image: &GrayImage, threshold: u8, on: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([if image.get_pixel(x, y)[0] >= threshold { on } else { 0 }])
    })
}

/// 8-bit Laplacian: negative responses saturate to 0, large ones to 255.
fn laplacian_u8(image: &GrayImage) -> GrayImage {
    let lap: ImageBuffer<Luma<i16>, Vec<i16>> = laplacian_filter(image);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let v = lap.get_pixel(x, y)[0].clamp(0, 255) as u8;
        Luma([v])
    })
}

/// Build the thin boundary band of a binary silhouette.
///
/// The Laplacian is applied twice and the two responses are added with
/// saturation, which marks one ring outside the silhouette plus the pixels
/// on either side of it.
#[must_use]
pub fn outline(silhouette: &GrayImage) -> GrayImage {
    let first = laplacian_u8(silhouette);
    let mut second = laplacian_u8(&first);
    for (s, f) in second.pixels_mut().zip(first.pixels()) {
        s[0] = s[0].saturating_add(f[0]);
    }
    second
}

/// Derive the alpha mask and outline from the final watermark estimate.
#[must_use]
pub fn build_mask(watermark: &GrayImage, config: &Config) -> WatermarkMask {
    let silhouette = binarize(watermark, config.mask_threshold, u8::MAX);
    WatermarkMask {
        mask: binarize(watermark, config.mask_threshold, config.alpha),
        outline: outline(&silhouette),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20x20 estimate with a bright 8x8 square at (6, 6).
    fn square() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, y| {
            let inside = (6..14).contains(&x) && (6..14).contains(&y);
            Luma([if inside { 180 } else { 40 }])
        })
    }

    #[test]
    fn mask_uses_alpha_at_and_above_threshold() {
        let config = Config {
            alpha: 90,
            mask_threshold: 180,
            ..Config::default()
        };
        let built = build_mask(&square(), &config);
        assert_eq!(built.mask.get_pixel(6, 6)[0], 90);
        assert_eq!(built.mask.get_pixel(13, 13)[0], 90);
        assert_eq!(built.mask.get_pixel(5, 6)[0], 0);
        assert_eq!(built.mask.get_pixel(0, 0)[0], 0);
        assert_eq!((built.width(), built.height()), (20, 20));
    }

    #[test]
    fn outline_traces_the_silhouette_edge() {
        let config = Config {
            mask_threshold: 100,
            ..Config::default()
        };
        let built = build_mask(&square(), &config);
        let outline = &built.outline;

        // Ring just outside the square.
        assert_ne!(outline.get_pixel(5, 9)[0], 0);
        assert_ne!(outline.get_pixel(14, 9)[0], 0);
        // Inner border of the square.
        assert_ne!(outline.get_pixel(6, 9)[0], 0);
        // Deep interior and far background stay clear.
        assert_eq!(outline.get_pixel(10, 10)[0], 0);
        assert_eq!(outline.get_pixel(0, 0)[0], 0);
        assert_eq!(outline.get_pixel(19, 2)[0], 0);
    }

    #[test]
    fn flat_estimate_has_no_outline() {
        let flat = GrayImage::from_pixel(10, 10, Luma([200]));
        let built = build_mask(&flat, &Config::default());
        assert!(built.outline.pixels().all(|p| p[0] == 0));
        assert!(built.mask.pixels().all(|p| p[0] == Config::default().alpha));
    }
}
