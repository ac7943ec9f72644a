//! Streaming per-pixel mean of equally sized grayscale images.
//!
//! After the k-th image the running estimate is weighted `(k-1)/k` against
//! its previous value and `1/k` against the new image, so images never need
//! to be held in memory together. Accumulation happens in `f32`; rounding to
//! 8 bits only happens once in [`RunningMean::finish`].

use image::{GrayImage, ImageBuffer, Luma};

use crate::error::{Error, Result};

/// Incremental arithmetic mean over a sequence of grayscale images.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    acc: Option<ImageBuffer<Luma<f32>, Vec<f32>>>,
    count: u32,
}

impl RunningMean {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of images folded in so far.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Whether no image has been pushed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fold one more image into the mean.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if `image` differs in size from the
    /// first image pushed.
    pub fn push(&mut self, image: &GrayImage) -> Result<()> {
        let Some(acc) = self.acc.as_mut() else {
            self.acc = Some(ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
                Luma([f32::from(image.get_pixel(x, y)[0])])
            }));
            self.count = 1;
            return Ok(());
        };

        if acc.dimensions() != image.dimensions() {
            return Err(Error::SizeMismatch {
                expected: acc.dimensions(),
                found: image.dimensions(),
            });
        }

        self.count += 1;
        #[allow(clippy::cast_precision_loss)]
        let k = self.count as f32;
        let keep = (k - 1.0) / k;
        let take = 1.0 / k;
        for (a, p) in acc.pixels_mut().zip(image.pixels()) {
            a[0] = a[0] * keep + f32::from(p[0]) * take;
        }
        Ok(())
    }

    /// Round the running mean to an 8-bit image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySequence`] if nothing was pushed.
    pub fn finish(self) -> Result<GrayImage> {
        let acc = self.acc.ok_or(Error::EmptySequence)?;
        Ok(ImageBuffer::from_fn(acc.width(), acc.height(), |x, y| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let v = acc.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8;
            Luma([v])
        }))
    }
}

/// Average a sequence of same-sized grayscale images.
///
/// # Errors
///
/// Returns [`Error::EmptySequence`] for an empty iterator and
/// [`Error::SizeMismatch`] if the images differ in size.
pub fn mean_images<'a, I>(images: I) -> Result<GrayImage>
where
    I: IntoIterator<Item = &'a GrayImage>,
{
    let mut mean = RunningMean::new();
    for image in images {
        mean.push(image)?;
    }
    mean.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 13 + seed * 31) % 256) as u8]))
    }

    #[test]
    fn mean_of_identical_images_is_unchanged() {
        let img = gradient(17, 9, 3);
        for n in [1, 2, 3, 7, 25] {
            let copies = vec![img.clone(); n];
            let mean = mean_images(&copies).unwrap();
            assert_eq!(mean, img, "n = {n}");
        }
    }

    #[test]
    fn mean_is_order_independent() {
        let imgs: Vec<GrayImage> = (0..5).map(|s| gradient(12, 12, s)).collect();
        let forward = mean_images(&imgs).unwrap();
        let backward = mean_images(imgs.iter().rev()).unwrap();
        let shuffled = mean_images([&imgs[2], &imgs[4], &imgs[0], &imgs[3], &imgs[1]]).unwrap();

        for ((a, b), c) in forward.pixels().zip(backward.pixels()).zip(shuffled.pixels()) {
            assert!(i16::from(a[0]).abs_diff(i16::from(b[0])) <= 1);
            assert!(i16::from(a[0]).abs_diff(i16::from(c[0])) <= 1);
        }
    }

    #[test]
    fn mean_matches_arithmetic_mean() {
        let a = GrayImage::from_pixel(4, 4, Luma([10]));
        let b = GrayImage::from_pixel(4, 4, Luma([20]));
        let c = GrayImage::from_pixel(4, 4, Luma([60]));
        let mean = mean_images([&a, &b, &c]).unwrap();
        assert!(mean.pixels().all(|p| p[0] == 30));
    }

    #[test]
    fn empty_sequence_is_an_error() {
        assert!(matches!(
            mean_images(std::iter::empty()),
            Err(Error::EmptySequence)
        ));
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let mut mean = RunningMean::new();
        mean.push(&GrayImage::new(4, 4)).unwrap();
        let err = mean.push(&GrayImage::new(4, 5)).unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: (4, 4),
                found: (4, 5)
            }
        ));
        assert_eq!(mean.len(), 1);
    }
}
