use crate::config::{ConvertConfig, RotationConfig};
use crate::convert::convert_file;
use anyhow::{Context, Result};
use augment::{FlipRotate, RandomRotation, Transform};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mnist::{read_images, read_labels, sibling_path, write_images, write_labels};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};

/// Paths of an augmented image/label pair.
#[derive(Debug, PartialEq)]
pub struct AugmentedFiles {
    pub images: PathBuf,
    pub labels: PathBuf,
    pub count: usize,
}

/// Helper function to create a consistent progress bar style
fn create_progress_bar(hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Failed to set progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Loads a dataset, transforms every sample and writes `<path>.<suffix>` siblings.
///
/// Nothing is written unless every sample was transformed, and the images output is
/// removed again if its labels cannot be written.
pub fn augment_files<T: Transform + ?Sized>(
    images_path: &Path,
    labels_path: &Path,
    suffix: &str,
    transform: &mut T,
    quiet: bool,
) -> Result<AugmentedFiles> {
    let multi_progress = if quiet {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    } else {
        MultiProgress::new()
    };
    let images_progress = multi_progress.add(create_progress_bar(quiet)?);
    let labels_progress = multi_progress.add(create_progress_bar(quiet)?);

    let images = read_images(images_path, &images_progress)
        .with_context(|| format!("Failed to load images from {}", images_path.display()))?;
    if !quiet {
        println!("Loaded {} images from {}", images.len(), images_path.display());
    }

    let labels = read_labels(labels_path, &labels_progress)
        .with_context(|| format!("Failed to load labels from {}", labels_path.display()))?;
    if !quiet {
        println!("Loaded {} labels from {}", labels.len(), labels_path.display());
    }

    let progress = create_progress_bar(quiet)?;
    let (new_images, new_labels) =
        augment::run_with_progress(&images, &labels, transform, &progress).with_context(|| {
            format!(
                "Failed to transform {} with {}",
                images_path.display(),
                labels_path.display()
            )
        })?;

    let output = AugmentedFiles {
        images: sibling_path(images_path, suffix),
        labels: sibling_path(labels_path, suffix),
        count: new_images.len(),
    };

    write_images(&output.images, &new_images)
        .with_context(|| format!("Failed to save images to {}", output.images.display()))?;
    if let Err(err) = write_labels(&output.labels, &new_labels) {
        // An images file without its labels is not a dataset
        let _ = fs::remove_file(&output.images);
        return Err(err)
            .with_context(|| format!("Failed to save labels to {}", output.labels.display()));
    }

    if !quiet {
        println!("Saved images to {}", output.images.display());
        println!("Saved labels to {}", output.labels.display());
    }
    Ok(output)
}

/// Rotates every sample by a random angle drawn from the configured range.
pub fn rotate(
    images_path: &Path,
    labels_path: &Path,
    config: &RotationConfig,
    quiet: bool,
) -> Result<AugmentedFiles> {
    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let range = config.min_degrees..=config.max_degrees;
    if !quiet {
        println!("Rotation range [{}, {}]", range.start(), range.end());
    }
    let mut rotation = RandomRotation::new(range, rng).context("Failed to configure rotation")?;
    augment_files(images_path, labels_path, &config.suffix, &mut rotation, quiet)
}

/// Restores the MNIST orientation of an EMNIST dataset.
pub fn recover(
    images_path: &Path,
    labels_path: &Path,
    suffix: &str,
    quiet: bool,
) -> Result<AugmentedFiles> {
    augment_files(images_path, labels_path, suffix, &mut FlipRotate, quiet)
}

/// Converts each image file into a `.mnist` sample.
pub fn convert(paths: &[PathBuf], config: &ConvertConfig, quiet: bool) -> Result<()> {
    for path in paths {
        let output = convert_file(path, config)?;
        if !quiet {
            if let Some(preview) = &output.preview_path {
                println!("Saved preview to {}", preview.display());
            }
            println!("Saved sample to {}", output.sample_path.display());
        }
    }
    Ok(())
}
