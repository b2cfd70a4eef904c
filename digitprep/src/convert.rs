//! Conversion of an arbitrary picture of a digit into a single MNIST style sample.
//!
//! The digit is expected dark on a light background. It is cropped to its bounding box,
//! scaled so its longest side is `limit_len` pixels, sharpened and centred on a white
//! square canvas. The written sample holds inverted intensities so that ink is bright,
//! matching the MNIST convention.

use crate::config::ConvertConfig;
use anyhow::{bail, Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use mnist::sibling_path;
use std::fs;
use std::path::{Path, PathBuf};

const WHITE: u8 = 255;

/// 3x3 sharpen kernel, normalised to sum to one.
const SHARPEN_KERNEL: [f32; 9] = [
    -0.125, -0.125, -0.125, //
    -0.125, 2.0, -0.125, //
    -0.125, -0.125, -0.125,
];

/// Files written by [`convert_file`].
#[derive(Debug)]
pub struct ConvertOutput {
    pub sample_path: PathBuf,
    pub preview_path: Option<PathBuf>,
    pub intensities: Vec<f64>,
}

/// Snaps every pixel at or above `threshold` to pure white.
fn normalize_background(image: &mut GrayImage, threshold: u8) {
    for pixel in image.pixels_mut() {
        if pixel.0[0] >= threshold {
            *pixel = Luma([WHITE]);
        }
    }
}

/// Bounding box `(x, y, width, height)` of the pixels darker than `threshold`.
fn ink_bounds(image: &GrayImage, threshold: u8) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[0] >= threshold {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Applies [`SHARPEN_KERNEL`] to the interior and keeps the border pixels unchanged.
fn sharpen(image: &GrayImage) -> GrayImage {
    let mut sharpened: GrayImage = imageops::filter3x3(image, &SHARPEN_KERNEL);
    let (width, height) = image.dimensions();
    for (x, y, pixel) in image.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            sharpened.put_pixel(x, y, *pixel);
        }
    }
    sharpened
}

/// Size of the scaled digit and its offset on the canvas.
fn placement(width: u32, height: u32, config: &ConvertConfig) -> (u32, u32, u32, u32) {
    let limit = config.limit_len;
    let canvas = config.canvas_size;
    let scaled = |short: u32, long: u32| -> u32 {
        let len = (f64::from(limit) / f64::from(long) * f64::from(short)).round_ties_even();
        (len as u32).clamp(1, limit)
    };
    let centre = |len: u32| -> u32 { (f64::from(canvas - len) / 2.0).round_ties_even() as u32 };
    let margin = (canvas - limit) / 2;

    if width > height {
        let new_height = scaled(height, width);
        (limit, new_height, margin, centre(new_height))
    } else {
        let new_width = scaled(width, height);
        (new_width, limit, centre(new_width), margin)
    }
}

/// Converts `image` into a `canvas_size` square grayscale image, dark digit on white.
pub fn convert_image(image: &DynamicImage, config: &ConvertConfig) -> Result<GrayImage> {
    if config.limit_len == 0 || config.limit_len > config.canvas_size {
        bail!(
            "Digit size {} does not fit a {} pixel canvas",
            config.limit_len,
            config.canvas_size
        );
    }

    let mut gray = image.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        bail!("Image has no pixels");
    }

    let threshold = config.background_threshold.unwrap_or(WHITE);
    if config.background_threshold.is_some() {
        normalize_background(&mut gray, threshold);
    }

    if config.crop_margin {
        if let Some((x, y, width, height)) = ink_bounds(&gray, threshold) {
            gray = imageops::crop_imm(&gray, x, y, width, height).to_image();
        }
    }

    let (width, height, left, top) = placement(gray.width(), gray.height(), config);
    let mut digit = imageops::resize(&gray, width, height, FilterType::CatmullRom);
    if config.sharpen {
        digit = sharpen(&digit);
    }

    let mut canvas = GrayImage::from_pixel(config.canvas_size, config.canvas_size, Luma([WHITE]));
    imageops::replace(&mut canvas, &digit, i64::from(left), i64::from(top));
    Ok(canvas)
}

/// Inverted intensities in `[0, 1]`, row by row; white background maps to `0.0`.
pub fn intensities(image: &GrayImage) -> Vec<f64> {
    image
        .pixels()
        .map(|pixel| f64::from(WHITE - pixel.0[0]) / 255.0)
        .collect()
}

/// Serialises intensities as a single comma separated line.
pub fn format_sample(intensities: &[f64]) -> String {
    intensities
        .iter()
        .map(|value| format!("{:?}", value))
        .collect::<Vec<_>>()
        .join(",")
}

/// Converts the image at `path`, writing `<path>.mnist` and optionally `<path>.bmp`.
pub fn convert_file(path: &Path, config: &ConvertConfig) -> Result<ConvertOutput> {
    let image =
        image::open(path).with_context(|| format!("Failed to load image {}", path.display()))?;
    let converted = convert_image(&image, config)
        .with_context(|| format!("Failed to convert image {}", path.display()))?;

    let preview_path = if config.write_preview {
        let preview_path = sibling_path(path, "bmp");
        converted
            .save(&preview_path)
            .with_context(|| format!("Failed to save preview {}", preview_path.display()))?;
        Some(preview_path)
    } else {
        None
    };

    let intensities = intensities(&converted);
    let sample_path = sibling_path(path, "mnist");
    fs::write(&sample_path, format_sample(&intensities))
        .with_context(|| format!("Failed to write sample {}", sample_path.display()))?;

    Ok(ConvertOutput {
        sample_path,
        preview_path,
        intensities,
    })
}
