//! Remove a repeated semi-transparent watermark from a batch of photos.
//!
//! All photos must share dimensions, watermark placement and a known
//! opacity. The pipeline averages the batch to suppress image content,
//! refines a seed crop of one watermark instance by template matching and
//! re-averaging, derives an alpha mask from the refined estimate, and then
//! reverses the alpha blend at every located instance of every photo,
//! inpainting the thin band around the watermark edge afterwards.
//!
//! # Quick Start
//!
//! ```no_run
//! use batch_watermark_removal::{Config, Roi, WatermarkEngine};
//!
//! let engine = WatermarkEngine::new(Config { alpha: 90, ..Config::default() })
//!     .expect("invalid config");
//! let paths = ["a.jpg", "b.jpg", "c.jpg"];
//! let gray: Vec<_> = paths
//!     .iter()
//!     .map(|p| image::open(p).unwrap().to_luma8())
//!     .collect();
//! let model = engine.estimate(&gray, Roi::new(40, 40, 120, 60)).unwrap();
//!
//! let mut img = image::open("a.jpg").unwrap().to_rgb8();
//! engine.remove(&model, &mut img).unwrap();
//! img.save("a_cleaned.png").unwrap();
//! ```
//!
//! # Stages
//!
//! Each stage is usable on its own:
//! [`averaging`] (streaming mean), [`locator`] (normalized cross-correlation
//! with duplicate suppression), [`refine`], [`mask`], [`blending`] (reverse
//! alpha blend) and [`healing`] (fast-marching inpainting).

#![deny(missing_docs)]

pub mod averaging;
pub mod blending;
pub mod config;
mod engine;
pub mod error;
pub mod healing;
pub mod locator;
pub mod mask;
pub mod refine;
pub mod region;

pub use config::Config;
pub use engine::{
    default_output_dir, is_supported_image, list_images, save_image, ProcessResult,
    WatermarkEngine, WatermarkModel,
};
pub use error::{Error, Result};
pub use region::{Match, Roi};
