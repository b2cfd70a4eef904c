//! Per-sample image transforms.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use ndarray::{s, Array2, ArrayView2};
use rand::distr::{Distribution, Uniform};
use rand::Rng;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Default rotation range, in degrees, used when augmenting MNIST.
pub const DEFAULT_ROTATION_RANGE: RangeInclusive<f64> = -15.0..=15.0;

/// Pixel value used where a rotated image samples outside its source.
pub const BACKGROUND: u8 = 0;

/// Errors raised by a single transform call
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    /// The transform cannot handle an image of this shape
    #[error("Unsupported image shape {rows}x{cols}: {reason}")]
    UnsupportedShape {
        rows: usize,
        cols: usize,
        reason: &'static str,
    },
    /// The transform returned an image with different dimensions
    #[error("Transform changed image dimensions from {expected:?} to {actual:?}")]
    DimensionsChanged {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("{0}")]
    Other(String),
}

/// Error for rotation ranges that cannot be sampled
#[derive(Debug, Error, PartialEq)]
#[error("Invalid rotation range [{lo}, {hi}]: {reason}")]
pub struct InvalidRangeError {
    pub lo: f64,
    pub hi: f64,
    pub reason: &'static str,
}

/// A function from one sample to a new image of the same dimensions.
///
/// Labels are passed in for transforms that need them but are never changed.
pub trait Transform {
    fn apply(&mut self, image: ArrayView2<u8>, label: u8) -> Result<Array2<u8>, TransformError>;
}

impl<F> Transform for F
where
    F: FnMut(ArrayView2<u8>, u8) -> Result<Array2<u8>, TransformError>,
{
    fn apply(&mut self, image: ArrayView2<u8>, label: u8) -> Result<Array2<u8>, TransformError> {
        self(image, label)
    }
}

/// Draws rotation angles uniformly from an inclusive range, never returning exactly zero.
#[derive(Debug, Clone)]
pub struct AngleSampler {
    range: RangeInclusive<f64>,
    distribution: Uniform<f64>,
}

impl AngleSampler {
    /// Creates a sampler over `range` degrees.
    ///
    /// # Returns
    /// * `Err(InvalidRangeError)` if a bound is not finite, `lo > hi`, or the range is
    ///   `[0, 0]` and so has no admissible angle
    pub fn new(range: RangeInclusive<f64>) -> Result<Self, InvalidRangeError> {
        let (lo, hi) = (*range.start(), *range.end());
        let invalid = |reason| InvalidRangeError { lo, hi, reason };

        if !lo.is_finite() || !hi.is_finite() {
            return Err(invalid("bounds must be finite"));
        }
        if lo > hi {
            return Err(invalid("lower bound exceeds upper bound"));
        }
        if lo == 0.0 && hi == 0.0 {
            return Err(invalid("range contains no non-zero angle"));
        }

        let distribution =
            Uniform::new_inclusive(lo, hi).map_err(|_| invalid("range cannot be sampled"))?;
        Ok(Self {
            range,
            distribution,
        })
    }

    pub fn range(&self) -> &RangeInclusive<f64> {
        &self.range
    }

    /// Draws an angle, redrawing for as long as the draw is exactly zero.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        loop {
            let theta = self.distribution.sample(rng);
            if theta != 0.0 {
                return theta;
            }
        }
    }
}

/// Rotates every image by its own random angle using bicubic resampling.
#[derive(Debug)]
pub struct RandomRotation<R> {
    sampler: AngleSampler,
    rng: R,
}

impl<R: Rng> RandomRotation<R> {
    pub fn new(range: RangeInclusive<f64>, rng: R) -> Result<Self, InvalidRangeError> {
        Ok(Self {
            sampler: AngleSampler::new(range)?,
            rng,
        })
    }

    pub fn sampler(&self) -> &AngleSampler {
        &self.sampler
    }
}

impl<R: Rng> Transform for RandomRotation<R> {
    fn apply(&mut self, image: ArrayView2<u8>, _label: u8) -> Result<Array2<u8>, TransformError> {
        let theta = self.sampler.sample(&mut self.rng);
        rotate(image, theta)
    }
}

fn to_gray_image(image: ArrayView2<u8>) -> Result<GrayImage, TransformError> {
    let (rows, cols) = image.dim();
    let unsupported = TransformError::UnsupportedShape {
        rows,
        cols,
        reason: "image does not fit a grayscale buffer",
    };
    let (Ok(width), Ok(height)) = (u32::try_from(cols), u32::try_from(rows)) else {
        return Err(unsupported);
    };
    GrayImage::from_raw(width, height, image.iter().copied().collect()).ok_or(unsupported)
}

fn from_gray_image(image: GrayImage) -> Result<Array2<u8>, TransformError> {
    let (width, height) = image.dimensions();
    let (rows, cols) = (height as usize, width as usize);
    Array2::from_shape_vec((rows, cols), image.into_raw()).map_err(|_| {
        TransformError::UnsupportedShape {
            rows,
            cols,
            reason: "rotated buffer does not match its dimensions",
        }
    })
}

/// Rotates `image` counter-clockwise by `degrees` about its centre.
///
/// Resampling is bicubic; pixels whose source falls outside the image are filled with
/// [`BACKGROUND`]. The output keeps the input dimensions.
pub fn rotate(image: ArrayView2<u8>, degrees: f64) -> Result<Array2<u8>, TransformError> {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return Ok(image.to_owned());
    }

    // imageproc turns clockwise for positive angles
    let theta = (-degrees).to_radians() as f32;
    let rotated = rotate_about_center(
        &to_gray_image(image)?,
        theta,
        Interpolation::Bicubic,
        Luma([BACKGROUND]),
    );
    from_gray_image(rotated)
}

/// Flips an image vertically and then turns it 90 degrees clockwise.
///
/// EMNIST distributes its images transposed relative to MNIST; this restores the MNIST
/// orientation. Only square images keep their dimensions under this transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlipRotate;

impl FlipRotate {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for FlipRotate {
    fn apply(&mut self, image: ArrayView2<u8>, _label: u8) -> Result<Array2<u8>, TransformError> {
        let (rows, cols) = image.dim();
        if rows != cols {
            return Err(TransformError::UnsupportedShape {
                rows,
                cols,
                reason: "flip-and-rotate needs a square image",
            });
        }

        let flipped = image.slice(s![..;-1, ..]);
        let rotated = flipped.t().slice(s![.., ..;-1]).to_owned();
        Ok(rotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sampler_never_returns_zero() {
        let sampler = AngleSampler::new(-15.0..=15.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let draws: Vec<f64> = (0..10_000).map(|_| sampler.sample(&mut rng)).collect();

        assert!(draws.iter().all(|&theta| theta != 0.0));
        assert!(draws.iter().all(|&theta| (-15.0..=15.0).contains(&theta)));

        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.5, "mean {mean} too far from 0");

        let negative = draws.iter().filter(|&&theta| theta < 0.0).count();
        assert!((4_500..=5_500).contains(&negative));

        let min = draws.iter().copied().fold(f64::INFINITY, f64::min);
        let max = draws.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(min < -14.5 && max > 14.5);
    }

    #[test]
    fn test_sampler_redraws_zero() {
        // A range that only touches zero at one end still yields non-zero draws
        let sampler = AngleSampler::new(0.0..=1e-300).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(sampler.sample(&mut rng) > 0.0);
        }
    }

    #[test]
    fn test_sampler_rejects_invalid_ranges() {
        assert!(AngleSampler::new(0.0..=0.0).is_err());
        assert!(AngleSampler::new(10.0..=-10.0).is_err());
        assert!(AngleSampler::new(f64::NAN..=1.0).is_err());
        assert!(AngleSampler::new(-f64::INFINITY..=1.0).is_err());
        assert!(AngleSampler::new(5.0..=5.0).is_ok());
    }

    #[test]
    fn test_random_rotation_is_reproducible_when_seeded() {
        let image = Array2::from_shape_fn((28, 28), |(r, c)| ((r * 7 + c * 3) % 256) as u8);

        let mut first = RandomRotation::new(-15.0..=15.0, StdRng::seed_from_u64(1)).unwrap();
        let mut second = RandomRotation::new(-15.0..=15.0, StdRng::seed_from_u64(1)).unwrap();

        for _ in 0..3 {
            let a = first.apply(image.view(), 0).unwrap();
            let b = second.apply(image.view(), 0).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.dim(), (28, 28));
        }
    }

    /// A dark 28x28 image with a bright block right of centre.
    fn block_right_of_centre() -> Array2<u8> {
        Array2::from_shape_fn((28, 28), |(r, c)| {
            if (12..16).contains(&r) && (20..24).contains(&c) {
                255
            } else {
                0
            }
        })
    }

    fn mass(image: &Array2<u8>, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> u64 {
        image
            .slice(s![rows, cols])
            .iter()
            .map(|&p| u64::from(p))
            .sum()
    }

    #[test]
    fn test_rotate_quarter_turn_is_counter_clockwise() {
        let image = block_right_of_centre();
        let rotated = rotate(image.view(), 90.0).unwrap();

        assert_eq!(rotated.dim(), (28, 28));
        // The block moves from the right of centre to above it
        assert!(mass(&rotated, 0..12, 8..20) > 12 * 255);
        assert_eq!(mass(&rotated, 16..28, 0..28), 0);
        assert_eq!(mass(&rotated, 0..28, 20..28), 0);
    }

    #[test]
    fn test_rotate_negative_quarter_turn_is_clockwise() {
        let image = block_right_of_centre();
        let rotated = rotate(image.view(), -90.0).unwrap();

        assert!(mass(&rotated, 16..28, 8..20) > 12 * 255);
        assert_eq!(mass(&rotated, 0..12, 0..28), 0);
    }

    #[test]
    fn test_rotate_fills_corners_with_background() {
        let image = Array2::from_elem((28, 28), 255u8);
        let rotated = rotate(image.view(), 45.0).unwrap();

        assert_eq!(rotated.dim(), (28, 28));
        assert_eq!(rotated[[0, 0]], BACKGROUND);
        assert_eq!(rotated[[27, 27]], BACKGROUND);
        assert!(rotated[[14, 14]] >= 254);
    }

    #[test]
    fn test_rotate_preserves_uniform_interior() {
        let image = Array2::from_elem((28, 28), 128u8);
        let rotated = rotate(image.view(), -12.5).unwrap();
        assert!(rotated
            .slice(s![8..20, 8..20])
            .iter()
            .all(|&p| p.abs_diff(128) <= 1));
    }

    #[test]
    fn test_rotate_keeps_non_square_dimensions() {
        let image = Array2::from_elem((10, 30), 50u8);
        assert_eq!(rotate(image.view(), 7.0).unwrap().dim(), (10, 30));
    }

    #[test]
    fn test_random_rotation_fixed_angle() {
        let image = block_right_of_centre();
        let mut rotation = RandomRotation::new(90.0..=90.0, StdRng::seed_from_u64(3)).unwrap();
        let rotated = rotation.apply(image.view(), 4).unwrap();
        assert_eq!(rotated, rotate(image.view(), 90.0).unwrap());
    }

    #[test]
    fn test_default_range() {
        let rotation = RandomRotation::new(DEFAULT_ROTATION_RANGE, StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(rotation.sampler().range(), &DEFAULT_ROTATION_RANGE);
    }

    #[test]
    fn test_flip_rotate_transposes() {
        let image = array![[1u8, 2, 3], [4, 5, 6], [7, 8, 9]];
        let mut transform = FlipRotate::new();

        let recovered = transform.apply(image.view(), 0).unwrap();
        assert_eq!(recovered, image.t());

        let again = transform.apply(image.view(), 0).unwrap();
        assert_eq!(recovered, again);
    }

    #[test]
    fn test_flip_rotate_rejects_non_square() {
        let image = Array2::<u8>::zeros((2, 3));
        let result = FlipRotate::new().apply(image.view(), 0);
        assert!(matches!(
            result,
            Err(TransformError::UnsupportedShape { rows: 2, cols: 3, .. })
        ));
    }

    fn invert(image: ArrayView2<u8>, _label: u8) -> Result<Array2<u8>, TransformError> {
        Ok(image.mapv(|p| 255 - p))
    }

    #[test]
    fn test_function_is_a_transform() {
        let mut invert = invert;
        let image = array![[0u8, 255]];
        assert_eq!(invert.apply(image.view(), 0).unwrap(), array![[255u8, 0]]);
    }
}
