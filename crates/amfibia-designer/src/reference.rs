//! Reference images attached to positions.

use chrono::{DateTime, Local};
use image::{imageops, GrayImage};

use crate::transform::{ImageFrame, RelativeRect};

/// A greyscale capture together with the field of view it covers.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub raster: GrayImage,
    /// Pixel size in micrometers.
    pub pixel_to_um: f64,
    pub fov_width_m: f64,
    pub fov_height_m: f64,
    pub acquired_at: DateTime<Local>,
}

impl ReferenceImage {
    /// Wraps a raster; the pixel size is derived from the horizontal field
    /// of view.
    pub fn new(raster: GrayImage, fov_width_m: f64, fov_height_m: f64) -> Self {
        Self::with_timestamp(raster, fov_width_m, fov_height_m, Local::now())
    }

    pub fn with_timestamp(
        raster: GrayImage,
        fov_width_m: f64,
        fov_height_m: f64,
        acquired_at: DateTime<Local>,
    ) -> Self {
        let width = raster.width().max(1);
        Self {
            pixel_to_um: fov_width_m / f64::from(width) * 1e6,
            raster,
            fov_width_m,
            fov_height_m,
            acquired_at,
        }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn is_empty(&self) -> bool {
        self.raster.width() == 0 || self.raster.height() == 0
    }

    pub fn frame(&self) -> ImageFrame {
        ImageFrame::new(
            self.width(),
            self.height(),
            self.fov_width_m,
            self.fov_height_m,
        )
    }

    /// Timestamp used in file names, e.g. `20240131_154502`.
    pub fn file_stamp(&self) -> String {
        self.acquired_at.format("%Y%m%d_%H%M%S").to_string()
    }

    /// Crops to a rectangle given as fractions of the image.
    ///
    /// ```text
    /// x = left * W, y = top * H, w = width * W, h = height * H
    /// ```
    /// The pixel rectangle is clamped to the raster and kept at least one
    /// pixel in each direction; the field of view shrinks with it.
    pub fn crop_relative(&self, rect: &RelativeRect) -> ReferenceImage {
        let w_img = self.width();
        let h_img = self.height();
        if w_img == 0 || h_img == 0 {
            return self.clone();
        }

        let x = to_pixels(rect.left, w_img).min(w_img - 1);
        let y = to_pixels(rect.top, h_img).min(h_img - 1);
        let w = to_pixels(rect.width, w_img).clamp(1, w_img - x);
        let h = to_pixels(rect.height, h_img).clamp(1, h_img - y);

        let raster = imageops::crop_imm(&self.raster, x, y, w, h).to_image();
        ReferenceImage {
            raster,
            pixel_to_um: self.pixel_to_um,
            fov_width_m: self.fov_width_m * f64::from(w) / f64::from(w_img),
            fov_height_m: self.fov_height_m * f64::from(h) / f64::from(h_img),
            acquired_at: self.acquired_at,
        }
    }
}

fn to_pixels(fraction: f64, size: u32) -> u32 {
    if !fraction.is_finite() || fraction <= 0.0 {
        return 0;
    }
    // Truncation matches integer pixel indexing.
    (fraction * f64::from(size)).min(f64::from(size)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| image::Luma([((x + y) % 256) as u8]))
    }

    #[test]
    fn test_pixel_size() {
        let image = ReferenceImage::new(gradient(1000, 500), 10e-6, 5e-6);
        assert!((image.pixel_to_um - 0.01).abs() < 1e-12);
        assert!(!image.is_empty());
    }

    #[test]
    fn test_crop_relative() {
        let image = ReferenceImage::new(gradient(1000, 500), 10e-6, 5e-6);
        let rect = RelativeRect {
            left: 0.25,
            top: 0.5,
            width: 0.5,
            height: 0.25,
        };
        let crop = image.crop_relative(&rect);
        assert_eq!((crop.width(), crop.height()), (500, 125));
        assert!((crop.fov_width_m - 5e-6).abs() < 1e-15);
        assert_eq!(crop.raster.get_pixel(0, 0), image.raster.get_pixel(250, 250));
    }

    #[test]
    fn test_crop_is_clamped() {
        let image = ReferenceImage::new(gradient(100, 100), 1e-6, 1e-6);
        let rect = RelativeRect {
            left: 0.9,
            top: -0.2,
            width: 0.5,
            height: 2.0,
        };
        let crop = image.crop_relative(&rect);
        assert_eq!((crop.width(), crop.height()), (10, 100));
    }
}
