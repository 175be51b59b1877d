//! Recognizes a color-coded two-level menu in a screenshot.
//!
//! Accent-colored buttons become top-level entries, the rows below each
//! one become leaf slots, and progress labels such as `0.5/2.0学时` are
//! read through an optional OCR engine. The result is a
//! [`report::StructureReport`] with click points for every entry.

pub mod annotate;
pub mod config;
pub mod detection;
pub mod geometry;
pub mod hierarchy;
pub mod ocr;
pub mod paths;
pub mod report;

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;

/// Loads a screenshot as 8-bit RGB.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    #[test]
    fn test_load_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shot.png");
        RgbImage::from_pixel(8, 6, Rgb([230, 30, 30])).save(&path).unwrap();

        let img = load_image(&path).unwrap();
        assert_eq!(img.dimensions(), (8, 6));
        assert_eq!(*img.get_pixel(3, 3), Rgb([230, 30, 30]));
    }

    #[test]
    fn test_load_missing_image() {
        let err = load_image(Path::new("/nonexistent/shot.png")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open"));
    }
}
