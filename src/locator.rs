//! Template matching with duplicate suppression.
//!
//! The response surface is the zero-mean normalized cross-correlation
//! between the template and every template-sized window of the source:
//!
//! `R(x, y) = sum(T'(i, j) * I(x+i, y+j)) / sqrt(sum(T'^2) * sum((I - mean_I)^2))`
//!
//! where `T'` is the template minus its mean. Window sums of `I` and `I^2`
//! come from integral images, so only the numerator costs `O(w*h)` per
//! position.
//!
//! Qualifying positions are swept in raster order and grouped into
//! clusters, one per physical watermark instance. The sweep assumes
//! instances are separated by at least one template dimension and that each
//! produces a single contiguous blob of scores above the threshold.
//! Overlapping or touching instances are merged, not separated.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};

use crate::error::{Error, Result};
use crate::region::Match;

/// Per-position correlation scores, `(W - w + 1) x (H - h + 1)`.
pub type Surface = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Below this the window or template is treated as flat and scores 0.
const FLAT_EPSILON: f64 = 1e-6;

/// Compute the normalized cross-correlation surface of `template` over `source`.
///
/// Each value lies in `[-1, 1]`; windows with no variance score 0.
///
/// # Errors
///
/// Returns [`Error::EmptyRoi`] for an empty template and
/// [`Error::TemplateTooLarge`] if it does not fit inside `source`.
pub fn correlation_surface(source: &GrayImage, template: &GrayImage) -> Result<Surface> {
    let (sw, sh) = source.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 {
        return Err(Error::EmptyRoi);
    }
    if tw > sw || th > sh {
        return Err(Error::TemplateTooLarge {
            template_width: tw,
            template_height: th,
            width: sw,
            height: sh,
        });
    }

    let n = f64::from(tw) * f64::from(th);
    let t_mean = template.pixels().map(|p| f64::from(p[0])).sum::<f64>() / n;
    #[allow(clippy::cast_possible_truncation)]
    let t_centered: Vec<f32> = template
        .pixels()
        .map(|p| (f64::from(p[0]) - t_mean) as f32)
        .collect();
    let t_norm = t_centered
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt();

    let sum = integral_image::<_, u64>(source);
    let sum_sq = integral_squared_image::<_, u64>(source);
    #[allow(clippy::cast_precision_loss)]
    let window = |img: &ImageBuffer<Luma<u64>, Vec<u64>>, x: u32, y: u32| -> f64 {
        let a = img.get_pixel(x, y)[0];
        let b = img.get_pixel(x + tw, y)[0];
        let c = img.get_pixel(x, y + th)[0];
        let d = img.get_pixel(x + tw, y + th)[0];
        (d + a - b - c) as f64
    };

    let src = source.as_raw();
    let stride = sw as usize;
    let (tw_us, th_us) = (tw as usize, th as usize);

    Ok(ImageBuffer::from_fn(sw - tw + 1, sh - th + 1, |x, y| {
        let s = window(&sum, x, y);
        let s2 = window(&sum_sq, x, y);
        let variance = (s2 - s * s / n).max(0.0);
        let denom = variance.sqrt() * t_norm;
        if denom < FLAT_EPSILON {
            return Luma([0.0]);
        }

        let mut numerator = 0.0_f64;
        for j in 0..th_us {
            let row = (y as usize + j) * stride + x as usize;
            let src_row = &src[row..row + tw_us];
            let t_row = &t_centered[j * tw_us..(j + 1) * tw_us];
            let dot: f32 = src_row
                .iter()
                .zip(t_row)
                .map(|(&p, &t)| f32::from(p) * t)
                .sum();
            numerator += f64::from(dot);
        }

        #[allow(clippy::cast_possible_truncation)]
        let score = (numerator / denom).clamp(-1.0, 1.0) as f32;
        Luma([score])
    }))
}

/// A group of neighboring qualifying positions.
struct Cluster {
    opened: usize,
    last: (u32, u32),
    best: Match,
}

/// Reduce a correlation surface to one [`Match`] per cluster of scores `>= threshold`.
///
/// Positions are visited in raster order (y, then x). A position joins the
/// first open cluster whose most recently added position is within
/// `template_width` columns and `template_height` rows; otherwise it opens a
/// new cluster. A cluster closes once the sweep is more than
/// `template_height` rows past its last position. Each cluster keeps its
/// strictly highest score, earliest position on ties. Clusters are returned
/// in the order they were opened.
#[must_use]
pub fn suppress_non_maxima(
    surface: &Surface,
    threshold: f32,
    template_width: u32,
    template_height: u32,
) -> Vec<Match> {
    let mut open: Vec<Cluster> = Vec::new();
    let mut closed: Vec<Cluster> = Vec::new();
    let mut row = 0;

    for (x, y, p) in surface.enumerate_pixels() {
        let score = p[0];
        if score < threshold {
            continue;
        }

        if y != row {
            row = y;
            // Rows only grow, so a cluster out of reach now stays out of reach.
            let (stale, live): (Vec<_>, Vec<_>) = open
                .into_iter()
                .partition(|c| y - c.last.1 > template_height);
            closed.extend(stale);
            open = live;
        }

        let near = open
            .iter_mut()
            .find(|c| x.abs_diff(c.last.0) <= template_width);
        match near {
            Some(cluster) => {
                cluster.last = (x, y);
                if score > cluster.best.score {
                    cluster.best = Match { x, y, score };
                }
            }
            None => open.push(Cluster {
                opened: open.len() + closed.len(),
                last: (x, y),
                best: Match { x, y, score },
            }),
        }
    }

    closed.extend(open);
    closed.sort_unstable_by_key(|c| c.opened);
    closed.into_iter().map(|c| c.best).collect()
}

/// Find every instance of `template` in `source` scoring at least `threshold`.
///
/// Returns an empty vector when nothing qualifies.
///
/// # Errors
///
/// See [`correlation_surface`].
pub fn locate(source: &GrayImage, template: &GrayImage, threshold: f32) -> Result<Vec<Match>> {
    let surface = correlation_surface(source, template)?;
    Ok(suppress_non_maxima(
        &surface,
        threshold,
        template.width(),
        template.height(),
    ))
}
