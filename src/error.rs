//! Error types for the batch-watermark-removal crate.

use crate::region::Roi;

/// Errors that can occur while estimating or removing a watermark.
///
/// Every variant except the file and codec ones is a precondition
/// violation: the batch is aborted before any output is written.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An averaging operation received no images.
    #[error("cannot average an empty image sequence")]
    EmptySequence,

    /// Two images that must share dimensions do not.
    #[error("image size mismatch: expected {}x{}, found {}x{}", .expected.0, .expected.1, .found.0, .found.1)]
    SizeMismatch {
        /// Dimensions of the first image in the operation.
        expected: (u32, u32),
        /// Dimensions of the offending image.
        found: (u32, u32),
    },

    /// The seed rectangle does not fit inside the image.
    #[error("region {roi} lies outside the {width}x{height} image")]
    RoiOutOfBounds {
        /// The rejected region.
        roi: Roi,
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// A region or template with zero width or height.
    #[error("region has zero area")]
    EmptyRoi,

    /// The template is larger than the image it is matched against.
    #[error("template ({template_width}x{template_height}) larger than source ({width}x{height})")]
    TemplateTooLarge {
        /// Template width in pixels.
        template_width: u32,
        /// Template height in pixels.
        template_height: u32,
        /// Source width in pixels.
        width: u32,
        /// Source height in pixels.
        height: u32,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let mismatch = Error::SizeMismatch {
            expected: (100, 80),
            found: (64, 64),
        };
        let msg = mismatch.to_string();
        assert!(msg.contains("100x80"));
        assert!(msg.contains("64x64"));

        let out = Error::RoiOutOfBounds {
            roi: Roi::new(90, 10, 20, 20),
            width: 100,
            height: 100,
        };
        let msg = out.to_string();
        assert!(msg.contains("20x20+90+10"), "{msg}");
        assert!(msg.contains("100x100"));
    }
}
