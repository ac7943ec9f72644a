//! Fast-marching inpainting of the thin band around each watermark instance.
//!
//! Pixels under the outline are filled in order of their distance from the
//! known region. Each filled value is a weighted mean of already known
//! pixels within `radius`, weighted by direction along the distance
//! gradient, inverse cubed distance and level-set proximity (Telea, 2004).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::{GrayImage, RgbImage};

/// Default neighborhood radius in pixels.
pub const DEFAULT_RADIUS: u32 = 2;

/// Distance assigned to pixels the front has not reached yet.
const FAR: f32 = 1.0e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Known,
    Band,
    Inside,
}

/// Heap entry ordered so the smallest distance pops first.
#[derive(Debug, Clone, Copy)]
struct Front {
    t: f32,
    x: u32,
    y: u32,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| (other.y, other.x).cmp(&(self.y, self.x)))
    }
}

struct Field {
    width: u32,
    height: u32,
    state: Vec<State>,
    t: Vec<f32>,
}

impl Field {
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn at(&self, x: i64, y: i64) -> Option<(State, f32)> {
        let x = u32::try_from(x).ok().filter(|&x| x < self.width)?;
        let y = u32::try_from(y).ok().filter(|&y| y < self.height)?;
        let i = self.idx(x, y);
        Some((self.state[i], self.t[i]))
    }

    /// Solve the eikonal equation `|grad T| = 1` from two orthogonal neighbors.
    fn solve(&self, a: (i64, i64), b: (i64, i64)) -> f32 {
        let known = |p: (i64, i64)| {
            self.at(p.0, p.1)
                .filter(|(s, _)| *s != State::Inside)
                .map(|(_, t)| t)
        };
        match (known(a), known(b)) {
            (Some(t1), Some(t2)) => {
                let d = t1 - t2;
                let r = (2.0 - d * d).max(0.0).sqrt();
                let s = (t1 + t2 - r) * 0.5;
                if s >= t1 && s >= t2 {
                    s
                } else {
                    let s = s + r;
                    if s >= t1 && s >= t2 {
                        s
                    } else {
                        1.0 + t1.min(t2)
                    }
                }
            }
            (Some(t), None) | (None, Some(t)) => 1.0 + t,
            (None, None) => FAR,
        }
    }

    /// Central or one-sided difference of T along one axis; 0 if unavailable.
    fn gradient_axis(&self, x: i64, y: i64, dx: i64, dy: i64) -> f32 {
        let Some((_, t0)) = self.at(x, y) else {
            return 0.0;
        };
        let known = |x: i64, y: i64| {
            self.at(x, y)
                .filter(|(s, _)| *s != State::Inside)
                .map(|(_, t)| t)
        };
        match (known(x + dx, y + dy), known(x - dx, y - dy)) {
            (Some(tp), Some(tm)) => (tp - tm) * 0.5,
            (Some(tp), None) => tp - t0,
            (None, Some(tm)) => t0 - tm,
            (None, None) => 0.0,
        }
    }
}

/// Inpaint `roi` wherever `outline` is non-zero.
///
/// `outline` is aligned with the top-left of `roi`; any part of it beyond
/// the region is ignored. Pixels that cannot be reached from a known pixel
/// are left unchanged.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn inpaint_telea(roi: &mut RgbImage, outline: &GrayImage, radius: u32) {
    let width = roi.width().min(outline.width());
    let height = roi.height().min(outline.height());
    if width == 0 || height == 0 {
        return;
    }

    let mut field = Field {
        width,
        height,
        state: vec![State::Known; width as usize * height as usize],
        t: vec![0.0; width as usize * height as usize],
    };
    for y in 0..height {
        for x in 0..width {
            if outline.get_pixel(x, y)[0] != 0 {
                let i = field.idx(x, y);
                field.state[i] = State::Inside;
                field.t[i] = FAR;
            }
        }
    }

    // Known pixels touching the hole form the initial front.
    let mut heap = BinaryHeap::new();
    for y in 0..height {
        for x in 0..width {
            let i = field.idx(x, y);
            if field.state[i] != State::Known {
                continue;
            }
            let touches_hole = neighbors(x, y).iter().any(|&(nx, ny)| {
                matches!(field.at(nx, ny), Some((State::Inside, _)))
            });
            if touches_hole {
                field.state[i] = State::Band;
                heap.push(Front { t: 0.0, x, y });
            }
        }
    }

    let r = i64::from(radius);
    let r2 = (r * r) as f32;

    while let Some(Front { x, y, .. }) = heap.pop() {
        let i = field.idx(x, y);
        if field.state[i] == State::Known {
            continue;
        }
        field.state[i] = State::Known;

        for (nx, ny) in neighbors(x, y) {
            if !matches!(field.at(nx, ny), Some((State::Inside, _))) {
                continue;
            }
            let t = field
                .solve((nx - 1, ny), (nx, ny - 1))
                .min(field.solve((nx + 1, ny), (nx, ny - 1)))
                .min(field.solve((nx - 1, ny), (nx, ny + 1)))
                .min(field.solve((nx + 1, ny), (nx, ny + 1)));

            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let (ux, uy) = (nx as u32, ny as u32);
            let ni = field.idx(ux, uy);
            field.t[ni] = t;

            let grad_x = field.gradient_axis(nx, ny, 1, 0);
            let grad_y = field.gradient_axis(nx, ny, 0, 1);

            let mut acc = [0.0_f32; 3];
            let mut total = 0.0_f32;
            for ky in (ny - r)..=(ny + r) {
                for kx in (nx - r)..=(nx + r) {
                    let Some((state, tk)) = field.at(kx, ky) else {
                        continue;
                    };
                    if state == State::Inside || (kx == nx && ky == ny) {
                        continue;
                    }
                    let (rx, ry) = ((nx - kx) as f32, (ny - ky) as f32);
                    let len2 = rx * rx + ry * ry;
                    if len2 > r2 {
                        continue;
                    }

                    let mut dir = rx * grad_x + ry * grad_y;
                    if dir.abs() <= 0.01 {
                        dir = 1.0e-6;
                    }
                    let dst = 1.0 / (len2 * len2.sqrt());
                    let lev = 1.0 / (1.0 + (tk - t).abs());
                    let w = (dir * dst * lev).abs();

                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let px = roi.get_pixel(kx as u32, ky as u32);
                    for ch in 0..3 {
                        acc[ch] += w * f32::from(px[ch]);
                    }
                    total += w;
                }
            }

            if total > 0.0 {
                let px = roi.get_pixel_mut(ux, uy);
                for ch in 0..3 {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    {
                        px[ch] = (acc[ch] / total).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }

            field.state[ni] = State::Band;
            heap.push(Front { t, x: ux, y: uy });
        }
    }
}

fn neighbors(x: u32, y: u32) -> [(i64, i64); 4] {
    let (x, y) = (i64::from(x), i64::from(y));
    [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn fills_a_line_from_its_surroundings() {
        let mut roi = RgbImage::from_pixel(15, 15, Rgb([90, 120, 30]));
        let mut outline = GrayImage::new(15, 15);
        for x in 2..13 {
            roi.put_pixel(x, 7, Rgb([255, 0, 255]));
            outline.put_pixel(x, 7, Luma([255]));
        }

        inpaint_telea(&mut roi, &outline, DEFAULT_RADIUS);

        for x in 2..13 {
            assert_eq!(roi.get_pixel(x, 7), &Rgb([90, 120, 30]), "x = {x}");
        }
    }

    #[test]
    fn interpolates_between_two_sides() {
        let mut roi = RgbImage::from_fn(9, 9, |x, _| {
            if x < 4 {
                Rgb([40, 40, 40])
            } else {
                Rgb([200, 200, 200])
            }
        });
        let mut outline = GrayImage::new(9, 9);
        for y in 0..9 {
            outline.put_pixel(4, y, Luma([255]));
            roi.put_pixel(4, y, Rgb([0, 0, 0]));
        }

        inpaint_telea(&mut roi, &outline, DEFAULT_RADIUS);

        for y in 0..9 {
            let v = roi.get_pixel(4, y)[0];
            assert!((40..=200).contains(&v), "y = {y}: {v}");
            assert!(v > 60 && v < 180, "y = {y}: {v} should blend both sides");
        }
    }

    #[test]
    fn untouched_outside_outline() {
        let mut roi = RgbImage::from_fn(10, 10, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 7]));
        let before = roi.clone();
        let mut outline = GrayImage::new(10, 10);
        outline.put_pixel(5, 5, Luma([1]));

        inpaint_telea(&mut roi, &outline, DEFAULT_RADIUS);

        for (x, y, px) in roi.enumerate_pixels() {
            if (x, y) != (5, 5) {
                assert_eq!(px, before.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn fully_masked_region_is_left_alone() {
        let mut roi = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
        let outline = GrayImage::from_pixel(4, 4, Luma([255]));
        inpaint_telea(&mut roi, &outline, DEFAULT_RADIUS);
        assert!(roi.pixels().all(|p| *p == Rgb([9, 9, 9])));
    }

    #[test]
    fn front_pops_smallest_distance_first() {
        let mut heap = BinaryHeap::new();
        heap.push(Front { t: 2.0, x: 0, y: 0 });
        heap.push(Front { t: 0.5, x: 1, y: 0 });
        heap.push(Front { t: 1.0, x: 2, y: 0 });
        let order: Vec<u32> = std::iter::from_fn(|| heap.pop().map(|f| f.x)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }
}
