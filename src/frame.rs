//! Camera frames and per-area crops.
//!
//! - `Frame`: decoded RGB image with known pixel dimensions.
//! - `Frame::crop`: cut an absolute region out of a frame for a backend call.
//!
//! Regions may extend past the frame edge (merged gaze boxes routinely do);
//! the part outside the frame is filled with black, matching how the
//! reference images were annotated and cropped upstream.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;

use crate::geometry::PixelBox;

/// A decoded camera frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            image: image.to_rgb8(),
        }
    }

    /// Solid-color frame, mostly useful for tests and dry runs.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb([0, 0, 0])),
        }
    }

    /// Decode an image file (JPEG or PNG).
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        Ok(Self::from_dynamic(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Copy `region` out of the frame. Pixels outside the frame are black.
    pub fn crop(&self, region: &PixelBox) -> Result<Frame> {
        if region.is_empty() {
            return Err(anyhow!(
                "crop region {}x{} at ({}, {}) is empty",
                region.width(),
                region.height(),
                region.x_min,
                region.y_min
            ));
        }
        let out_w = u32::try_from(region.width()).context("crop width out of range")?;
        let out_h = u32::try_from(region.height()).context("crop height out of range")?;

        let frame_w = i64::from(self.width());
        let frame_h = i64::from(self.height());
        let src_x0 = region.x_min.clamp(0, frame_w);
        let src_x1 = region.x_max.clamp(0, frame_w);
        let src_y0 = region.y_min.clamp(0, frame_h);
        let src_y1 = region.y_max.clamp(0, frame_h);

        if src_x0 == region.x_min
            && src_y0 == region.y_min
            && src_x1 == region.x_max
            && src_y1 == region.y_max
        {
            let view = image::imageops::crop_imm(
                &self.image,
                src_x0 as u32,
                src_y0 as u32,
                out_w,
                out_h,
            );
            return Ok(Frame::from_image(view.to_image()));
        }

        let mut out = RgbImage::from_pixel(out_w, out_h, Rgb([0, 0, 0]));
        if src_x0 < src_x1 && src_y0 < src_y1 {
            let inside = image::imageops::crop_imm(
                &self.image,
                src_x0 as u32,
                src_y0 as u32,
                (src_x1 - src_x0) as u32,
                (src_y1 - src_y0) as u32,
            )
            .to_image();
            image::imageops::replace(
                &mut out,
                &inside,
                src_x0 - region.x_min,
                src_y0 - region.y_min,
            );
        }
        Ok(Frame::from_image(out))
    }
}
