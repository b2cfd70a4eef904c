//! Reading and writing MNIST containers on disk.

use crate::mnist::{
    decode_images, decode_labels, encode_images, encode_labels, ImageBatch, LabelBatch,
    MnistData, MnistError,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}";

/// Creates a progress bar with a consistent style
pub fn create_progress_style(template: &str) -> Result<ProgressStyle, indicatif::style::TemplateError> {
    Ok(ProgressStyle::default_bar()
        .template(template)?
        .progress_chars("##-"))
}

/// Returns `<path>.<suffix>`, the sibling file an augmented dataset is written to.
///
/// # Example
/// ```
/// use mnist::files::sibling_path;
/// use std::path::{Path, PathBuf};
///
/// let path = sibling_path(Path::new("data/train-images.idx3-ubyte"), "rot");
/// assert_eq!(path, PathBuf::from("data/train-images.idx3-ubyte.rot"));
/// ```
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Reads and decodes an IDX image file.
///
/// The whole file is read into memory before decoding, so a truncated file is reported as
/// a format error rather than a short read.
pub fn read_images(path: impl AsRef<Path>, progress: &ProgressBar) -> Result<ImageBatch, MnistError> {
    progress.set_message("Loading images...");
    let bytes = fs::read(path)?;
    let images = decode_images(&bytes)?;

    progress.set_length(images.len() as u64);
    progress.set_position(images.len() as u64);
    progress.finish_with_message("Images loaded successfully");
    Ok(images)
}

/// Reads and decodes an IDX label file.
pub fn read_labels(path: impl AsRef<Path>, progress: &ProgressBar) -> Result<LabelBatch, MnistError> {
    progress.set_message("Loading labels...");
    let bytes = fs::read(path)?;
    let labels = decode_labels(&bytes)?;

    progress.set_length(labels.len() as u64);
    progress.set_position(labels.len() as u64);
    progress.finish_with_message("Labels loaded successfully");
    Ok(labels)
}

/// Writes `bytes` to `path` through a temporary file in the same directory.
///
/// The destination only appears once every byte has been written, so a failed run never
/// leaves a truncated container behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), MnistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| MnistError::Io(err.error))?;
    Ok(())
}

/// Encodes `images` and writes them to `path`.
pub fn write_images(path: impl AsRef<Path>, images: &ImageBatch) -> Result<(), MnistError> {
    write_atomically(path.as_ref(), &encode_images(images))
}

/// Encodes `labels` and writes them to `path`.
pub fn write_labels(path: impl AsRef<Path>, labels: &LabelBatch) -> Result<(), MnistError> {
    write_atomically(path.as_ref(), &encode_labels(labels))
}

/// Loads MNIST images and labels from the specified file paths.
///
/// # Arguments
/// * `images_path` - Path to the images file
/// * `labels_path` - Path to the labels file
///
/// # Returns
/// * `Ok(MnistData)` containing paired images and labels
/// * `Err(MnistError)` if loading fails or the counts differ
pub fn load_mnist_data(
    images_path: impl AsRef<Path>,
    labels_path: impl AsRef<Path>,
) -> Result<MnistData, MnistError> {
    let multi_progress = MultiProgress::new();
    let images_progress = multi_progress.add(ProgressBar::new(0));
    let labels_progress = multi_progress.add(ProgressBar::new(0));
    if let Ok(style) = create_progress_style(PROGRESS_TEMPLATE) {
        images_progress.set_style(style.clone());
        labels_progress.set_style(style);
    }

    let images = read_images(images_path, &images_progress)?;
    let labels = read_labels(labels_path, &labels_progress)?;

    MnistData::new(images, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnist::{IMAGE_MAGIC_NUMBER, LABEL_MAGIC_NUMBER};
    use assert_fs::prelude::*;
    use std::fs::File;

    fn create_test_mnist_file(
        path: &Path,
        magic_number: i32,
        count: i32,
        data: &[u8],
    ) -> std::io::Result<()> {
        let mut file = File::create(path)?;

        // Write header
        file.write_all(&magic_number.to_be_bytes())?;
        file.write_all(&count.to_be_bytes())?;

        if magic_number == IMAGE_MAGIC_NUMBER {
            // Add image dimensions (28x28)
            file.write_all(&28i32.to_be_bytes())?;
            file.write_all(&28i32.to_be_bytes())?;
        }

        // Write data
        file.write_all(data)?;
        Ok(())
    }

    #[test]
    fn test_read_images_valid() -> Result<(), Box<dyn std::error::Error>> {
        let temp = assert_fs::TempDir::new()?;
        let file_path = temp.child("test-images");

        let image_data = vec![0u8; 784 * 2];
        create_test_mnist_file(file_path.path(), IMAGE_MAGIC_NUMBER, 2, &image_data)?;

        let progress = ProgressBar::hidden();
        let images = read_images(file_path.path(), &progress)?;
        assert_eq!(images.len(), 2);
        assert_eq!(images.rows(), 28);
        assert_eq!(images.cols(), 28);

        Ok(())
    }

    #[test]
    fn test_read_images_truncated_file() -> Result<(), Box<dyn std::error::Error>> {
        let temp = assert_fs::TempDir::new()?;
        let file_path = temp.child("test-images");
        create_test_mnist_file(file_path.path(), IMAGE_MAGIC_NUMBER, 5, &vec![0u8; 784 * 3])?;

        let result = read_images(file_path.path(), &ProgressBar::hidden());
        assert!(matches!(result, Err(MnistError::Truncated { .. })));

        Ok(())
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let result = read_labels("does/not/exist", &ProgressBar::hidden());
        assert!(matches!(result, Err(MnistError::Io(_))));
    }

    #[test]
    fn test_write_then_load() -> Result<(), Box<dyn std::error::Error>> {
        let temp = assert_fs::TempDir::new()?;
        let images_path = temp.child("images.idx3-ubyte");
        let labels_path = temp.child("labels.idx1-ubyte");

        let images = ImageBatch::new(2, 2, 2, vec![10, 20, 30, 40, 50, 60, 70, 80])?;
        let labels = LabelBatch::new(vec![1, 7])?;
        write_images(images_path.path(), &images)?;
        write_labels(labels_path.path(), &labels)?;

        images_path.assert(predicates::path::is_file());
        let data = load_mnist_data(images_path.path(), labels_path.path())?;
        assert_eq!(data.images(), &images);
        assert_eq!(data.labels(), &labels);

        Ok(())
    }

    #[test]
    fn test_load_mismatched_counts() -> Result<(), Box<dyn std::error::Error>> {
        let temp = assert_fs::TempDir::new()?;
        let images_path = temp.child("images");
        let labels_path = temp.child("labels");
        create_test_mnist_file(images_path.path(), IMAGE_MAGIC_NUMBER, 1, &[0u8; 784])?;
        create_test_mnist_file(labels_path.path(), LABEL_MAGIC_NUMBER, 2, &[0, 1])?;

        let result = load_mnist_data(images_path.path(), labels_path.path());
        assert!(matches!(result, Err(MnistError::DataMismatch(_))));

        Ok(())
    }

    #[test]
    fn test_write_leaves_no_temp_files() -> Result<(), Box<dyn std::error::Error>> {
        let temp = assert_fs::TempDir::new()?;
        let labels_path = temp.child("labels.rcv");
        write_labels(labels_path.path(), &LabelBatch::new(vec![5])?)?;

        let entries: Vec<_> = fs::read_dir(temp.path())?.collect::<Result<_, _>>()?;
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read(labels_path.path())?, vec![0, 0, 8, 1, 0, 0, 0, 1, 5]);

        Ok(())
    }

    #[test]
    fn test_sibling_path_keeps_full_name() {
        assert_eq!(
            sibling_path(Path::new("t10k-labels.idx1-ubyte"), "rcv"),
            PathBuf::from("t10k-labels.idx1-ubyte.rcv")
        );
    }
}
