//! Applies a transform across an aligned image/label pair.

use crate::transform::{Transform, TransformError};
use indicatif::ProgressBar;
use mnist::{ImageBatch, LabelBatch, MnistData, MnistError};
use ndarray::{Array3, Axis};
use thiserror::Error;

/// Errors that can occur while augmenting a dataset
#[derive(Debug, Error)]
pub enum AugmentError {
    /// The image and label batches hold a different number of samples
    #[error("Alignment error: {images} images but {labels} labels")]
    Alignment { images: usize, labels: usize },
    /// The transform failed for one sample; no output is produced
    #[error("Transform failed for sample {index}: {source}")]
    Transform {
        index: usize,
        #[source]
        source: TransformError,
    },
    #[error(transparent)]
    Mnist(#[from] MnistError),
}

/// Applies `transform` to every sample and returns the new aligned batches.
///
/// Samples are visited in dataset order and written back to the same index. Labels are
/// copied unchanged. The first failing sample aborts the whole run.
///
/// # Example
/// ```
/// use augment::{pipeline, FlipRotate};
/// use mnist::{ImageBatch, LabelBatch};
///
/// let images = ImageBatch::new(1, 2, 2, vec![1, 2, 3, 4]).unwrap();
/// let labels = LabelBatch::new(vec![7]).unwrap();
///
/// let (new_images, new_labels) = pipeline::run(&images, &labels, &mut FlipRotate).unwrap();
/// assert_eq!(new_images.image(0)[[0, 1]], 3);
/// assert_eq!(new_labels, labels);
/// ```
pub fn run<T: Transform + ?Sized>(
    images: &ImageBatch,
    labels: &LabelBatch,
    transform: &mut T,
) -> Result<(ImageBatch, LabelBatch), AugmentError> {
    run_with_progress(images, labels, transform, &ProgressBar::hidden())
}

/// Same as [`run`], advancing `progress` by one for every sample transformed.
pub fn run_with_progress<T: Transform + ?Sized>(
    images: &ImageBatch,
    labels: &LabelBatch,
    transform: &mut T,
    progress: &ProgressBar,
) -> Result<(ImageBatch, LabelBatch), AugmentError> {
    if images.len() != labels.len() {
        return Err(AugmentError::Alignment {
            images: images.len(),
            labels: labels.len(),
        });
    }

    let expected = (images.rows(), images.cols());
    let mut output = Array3::<u8>::zeros(images.as_array().raw_dim());

    progress.set_length(images.len() as u64);
    progress.set_message("Transforming images...");

    for (index, ((image, label), mut target)) in images
        .iter()
        .zip(labels.iter())
        .zip(output.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        let transformed = transform
            .apply(image, label)
            .map_err(|source| AugmentError::Transform { index, source })?;

        if transformed.dim() != expected {
            return Err(AugmentError::Transform {
                index,
                source: TransformError::DimensionsChanged {
                    expected,
                    actual: transformed.dim(),
                },
            });
        }
        target.assign(&transformed);
        progress.inc(1);
    }

    progress.finish_with_message("Images transformed");
    Ok((ImageBatch::from_array(output)?, labels.clone()))
}

/// Convenience wrapper over [`run`] for an already paired dataset.
pub fn run_dataset<T: Transform + ?Sized>(
    data: &MnistData,
    transform: &mut T,
    progress: &ProgressBar,
) -> Result<MnistData, AugmentError> {
    let (images, labels) = run_with_progress(data.images(), data.labels(), transform, progress)?;
    Ok(MnistData::new(images, labels)?)
}
