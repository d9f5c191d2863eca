//! Per-stage image filters

use image::{Rgb, RgbImage, imageops};

use crate::domain::DisplayStage;

/// Largest blur radius, reached at level 100
pub const MAX_BLUR_SIGMA: f32 = 8.0;

/// Applies one stage's distortion at a level in [0, 100]
pub trait StageFilter: Send + Sync {
    fn apply(&self, stage: DisplayStage, image: &RgbImage, level: f64) -> RgbImage;

    /// Derive the image for `stage` at `level` from the untouched original
    ///
    /// Every stage before `stage` is applied at full strength.
    fn compose(&self, original: &RgbImage, stage: DisplayStage, level: f64) -> RgbImage {
        let mut image = original.clone();
        for earlier in DisplayStage::ORDER.into_iter().filter(|s| s.is_filter()) {
            if earlier == stage {
                return self.apply(earlier, &image, level);
            }
            if stage == DisplayStage::Start {
                break;
            }
            image = self.apply(earlier, &image, 100.0);
        }
        image
    }
}

/// Grayscale blend, Gaussian blur and darkening
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFilters;

impl ImageFilters {
    fn black_white(image: &RgbImage, t: f64) -> RgbImage {
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            let [r, g, b] = pixel.0.map(f64::from);
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            *pixel = Rgb([r, g, b].map(|c| (c + (luma - c) * t).round().clamp(0.0, 255.0) as u8));
        }
        out
    }

    fn blur(image: &RgbImage, t: f64) -> RgbImage {
        let sigma = MAX_BLUR_SIGMA * t as f32;
        if sigma <= f32::EPSILON {
            return image.clone();
        }
        imageops::blur(image, sigma)
    }

    fn darken(image: &RgbImage, t: f64) -> RgbImage {
        let keep = 1.0 - t;
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            *pixel = Rgb(pixel.0.map(|c| (f64::from(c) * keep).round().clamp(0.0, 255.0) as u8));
        }
        out
    }
}

impl StageFilter for ImageFilters {
    fn apply(&self, stage: DisplayStage, image: &RgbImage, level: f64) -> RgbImage {
        let t = (level / 100.0).clamp(0.0, 1.0);
        match stage {
            DisplayStage::BlackWhite => Self::black_white(image, t),
            DisplayStage::Blurry => Self::blur(image, t),
            DisplayStage::Lightness => Self::darken(image, t),
            DisplayStage::Start | DisplayStage::End => image.clone(),
        }
    }
}

/// Colourful gradient used when no image file is configured
pub fn test_pattern(width: u32, height: u32) -> RgbImage {
    let (w, h) = (width.max(1), height.max(1));
    RgbImage::from_fn(w, h, |x, y| {
        let r = (x * 255 / w) as u8;
        let g = (y * 255 / h) as u8;
        let b = if (x / 8 + y / 8) % 2 == 0 { 200 } else { 40 };
        Rgb([r, g, b])
    })
}
