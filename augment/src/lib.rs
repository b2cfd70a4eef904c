//! Geometric augmentation of MNIST style datasets.
//!
//! A [`Transform`] maps one sample to a new image of the same size. [`pipeline::run`]
//! applies it to every sample of an aligned image/label pair, keeping labels and order
//! untouched.

pub mod pipeline;
pub mod transform;

pub use crate::pipeline::{run, run_dataset, run_with_progress, AugmentError};
pub use crate::transform::{
    rotate, AngleSampler, FlipRotate, InvalidRangeError, RandomRotation, Transform,
    TransformError, BACKGROUND, DEFAULT_ROTATION_RANGE,
};
