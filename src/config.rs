//! Batch configuration shared by every pipeline stage.

use crate::error::{Error, Result};

/// Default blend intensity used when none is supplied.
pub const DEFAULT_ALPHA: u8 = 128;
/// Default watermark color (white).
pub const DEFAULT_COLOR: u8 = 255;
/// Default minimum normalized correlation for a match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.7;
/// Default cutoff separating watermark pixels from background.
pub const DEFAULT_MASK_THRESHOLD: u8 = 115;
/// Default number of watermark estimates (one seed plus re-estimations).
pub const DEFAULT_REFINE_COUNT: u32 = 3;

/// Parameters of one removal batch.
///
/// Passed by reference into every stage; nothing in the crate reads
/// configuration from anywhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Opacity the watermark was composited with (0-255).
    pub alpha: u8,
    /// Flat gray level the watermark was rendered in (0-255).
    pub color: u8,
    /// Minimum normalized correlation to accept a match (0.0-1.0).
    pub match_threshold: f32,
    /// Estimate pixels at or above this value belong to the watermark.
    pub mask_threshold: u8,
    /// Total watermark estimates considered; `refine_count - 1` re-estimations run.
    pub refine_count: u32,
    /// Stop refining as soon as the located instance count changes between passes.
    pub require_stable_count: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            color: DEFAULT_COLOR,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            mask_threshold: DEFAULT_MASK_THRESHOLD,
            refine_count: DEFAULT_REFINE_COUNT,
            require_stable_count: false,
        }
    }
}

impl Config {
    /// Check the ranges the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the match threshold is outside
    /// `[0, 1]` (or NaN) or the refine count is zero.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(Error::InvalidConfig(format!(
                "match threshold must be between 0.0 and 1.0, got {}",
                self.match_threshold
            )));
        }
        if self.refine_count == 0 {
            return Err(Error::InvalidConfig(
                "refine count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mask_threshold, 115);
        assert_eq!(config.refine_count, 3);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        for bad in [-0.1, 1.5, f32::NAN] {
            let config = Config {
                match_threshold: bad,
                ..Config::default()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn rejects_zero_refine_count() {
        let config = Config {
            refine_count: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
