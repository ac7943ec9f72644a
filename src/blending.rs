//! Alpha blending math for watermark removal.
//!
//! The watermark is applied via forward alpha blending with an 8-bit mask `m`
//! and flat color `C`:
//! `watermarked = original * (1 - m/255) + C * (m/255)`
//!
//! This module provides the reverse operation to recover original pixels:
//! `original = 255 * (watermarked - m * C/255) / (255 - m)`

use image::{GrayImage, RgbImage};

/// Recover one channel value from its watermarked observation.
///
/// `mask == 0` returns `observed` unchanged. A fully opaque mask (255) has no
/// inverse: the result saturates to 255 or 0 by the sign of the numerator,
/// and an observation within half a level of the watermark color is left as is.
#[must_use]
pub fn recover_channel(observed: u8, mask: u8, color: u8) -> u8 {
    if mask == 0 {
        return observed;
    }

    let o = f32::from(observed);
    let m = f32::from(mask);
    let numerator = o - m * (f32::from(color) / 255.0);

    if mask == u8::MAX {
        return if numerator > 0.5 {
            u8::MAX
        } else if numerator < -0.5 {
            0
        } else {
            observed
        };
    }

    let original = 255.0 * numerator / (255.0 - m);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        original.round().clamp(0.0, 255.0) as u8
    }
}

/// Reverse the alpha blend inside the mask-sized region at `(pos_x, pos_y)`.
///
/// Operates in-place, independently on each of the three color planes.
/// Pixels where the mask is zero are left unchanged, and the region is
/// clipped to the image bounds.
pub fn decompose_region(
    image: &mut RgbImage,
    mask: &GrayImage,
    pos_x: u32,
    pos_y: u32,
    color: u8,
) {
    let img_w = image.width();
    let img_h = image.height();

    // Clip to image bounds
    let x2 = pos_x.saturating_add(mask.width()).min(img_w);
    let y2 = pos_y.saturating_add(mask.height()).min(img_h);

    if pos_x >= x2 || pos_y >= y2 {
        return;
    }

    for dy in 0..(y2 - pos_y) {
        for dx in 0..(x2 - pos_x) {
            let m = mask.get_pixel(dx, dy)[0];
            if m == 0 {
                continue;
            }

            let px = image.get_pixel_mut(pos_x + dx, pos_y + dy);
            for ch in 0..3 {
                px[ch] = recover_channel(px[ch], m, color);
            }
        }
    }
}
