//! MNIST dataset codec.
//!
//! This module holds the in-memory representation of an MNIST style dataset and the
//! bit-exact codec for the IDX container format used to store it on disk. Images are kept
//! as raw 8-bit grayscale pixels so that a decoded batch can be re-encoded unchanged.

use ndarray::{Array3, ArrayView2, Axis};
use thiserror::Error;

pub const IMAGE_MAGIC_NUMBER: i32 = 2051;
pub const LABEL_MAGIC_NUMBER: i32 = 2049;
pub const IMAGE_HEADER_LEN: usize = 16;
pub const LABEL_HEADER_LEN: usize = 8;

/// Errors that can occur while handling MNIST data
#[derive(Debug, Error)]
pub enum MnistError {
    /// Wrapper for standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error for invalid magic numbers in MNIST files
    #[error("Invalid magic number for {kind} file: expected {expected}, got {actual}")]
    InvalidMagicNumber {
        kind: &'static str,
        expected: i32,
        actual: i32,
    },
    /// The buffer ends before the header or the declared payload does
    #[error("Truncated {kind} data: expected {expected} bytes, got {actual} bytes")]
    Truncated {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A header field holds a value that cannot describe a dataset
    #[error("Invalid {field} in {kind} header: {value}")]
    InvalidHeader {
        kind: &'static str,
        field: &'static str,
        value: i64,
    },
    /// Error for mismatches between images and labels
    #[error("Data mismatch: {0}")]
    DataMismatch(String),
    /// Error for invalid image dimensions
    #[error(
        "Invalid image dimensions: expected {expected} pixels, got {actual} pixels ({rows}x{cols})"
    )]
    InvalidDimensions {
        expected: usize,
        actual: usize,
        rows: usize,
        cols: usize,
    },
}

impl MnistError {
    /// True for errors describing a malformed or truncated container.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            MnistError::InvalidMagicNumber { .. }
                | MnistError::Truncated { .. }
                | MnistError::InvalidHeader { .. }
        )
    }
}

/// An ordered batch of grayscale images sharing the same dimensions.
///
/// Pixels are stored as a `(count, rows, cols)` array in row-major order, which is also
/// the order they appear in the IDX payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBatch {
    pixels: Array3<u8>,
}

impl ImageBatch {
    /// Creates a batch of `count` images of `rows` x `cols` pixels from a flat pixel buffer.
    ///
    /// # Returns
    /// * `Ok(ImageBatch)` if the buffer holds exactly `count * rows * cols` pixels
    /// * `Err(MnistError::InvalidDimensions)` if the buffer length does not match
    /// * `Err(MnistError::InvalidHeader)` if a dimension cannot be stored in an IDX header
    ///
    /// # Example
    /// ```
    /// use mnist::mnist::ImageBatch;
    ///
    /// let batch = ImageBatch::new(2, 2, 2, vec![10, 20, 30, 40, 50, 60, 70, 80]).unwrap();
    /// assert_eq!(batch.len(), 2);
    /// assert_eq!(batch.image(1)[[0, 1]], 60);
    /// ```
    pub fn new(count: usize, rows: usize, cols: usize, pixels: Vec<u8>) -> Result<Self, MnistError> {
        check_header_field("images", "count", count)?;
        check_header_field("images", "rows", rows)?;
        check_header_field("images", "cols", cols)?;

        let expected = pixel_count(count, rows, cols).ok_or(MnistError::InvalidHeader {
            kind: "images",
            field: "count",
            value: i64::try_from(count).unwrap_or(i64::MAX),
        })?;
        if pixels.len() != expected {
            return Err(MnistError::InvalidDimensions {
                expected,
                actual: pixels.len(),
                rows,
                cols,
            });
        }

        let pixels = Array3::from_shape_vec((count, rows, cols), pixels).map_err(|_| {
            MnistError::InvalidDimensions {
                expected,
                actual: expected,
                rows,
                cols,
            }
        })?;
        Ok(Self { pixels })
    }

    /// Wraps an existing `(count, rows, cols)` pixel array.
    pub fn from_array(pixels: Array3<u8>) -> Result<Self, MnistError> {
        let (count, rows, cols) = pixels.dim();
        check_header_field("images", "count", count)?;
        check_header_field("images", "rows", rows)?;
        check_header_field("images", "cols", cols)?;
        Ok(Self { pixels })
    }

    /// An empty batch whose (absent) images would be `rows` x `cols`.
    pub fn empty(rows: usize, cols: usize) -> Result<Self, MnistError> {
        Self::new(0, rows, cols, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.pixels.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> usize {
        self.pixels.len_of(Axis(1))
    }

    pub fn cols(&self) -> usize {
        self.pixels.len_of(Axis(2))
    }

    /// Returns the image at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn image(&self, index: usize) -> ArrayView2<'_, u8> {
        self.pixels.index_axis(Axis(0), index)
    }

    /// Iterates over the images in dataset order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = ArrayView2<'_, u8>> {
        self.pixels.outer_iter()
    }

    pub fn as_array(&self) -> &Array3<u8> {
        &self.pixels
    }

    pub fn into_array(self) -> Array3<u8> {
        self.pixels
    }
}

/// An ordered batch of 8-bit labels, aligned by index with an [`ImageBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelBatch {
    labels: Vec<u8>,
}

impl LabelBatch {
    pub fn new(labels: Vec<u8>) -> Result<Self, MnistError> {
        check_header_field("labels", "count", labels.len())?;
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.labels
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = u8> + '_ {
        self.labels.iter().copied()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.labels
    }
}

/// Container for MNIST dataset pairs (images and their corresponding labels)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MnistData {
    images: ImageBatch,
    labels: LabelBatch,
}

impl MnistData {
    /// Creates a new MnistData instance from an image batch and a label batch.
    ///
    /// # Returns
    /// * `Ok(MnistData)` if the number of images matches the number of labels
    /// * `Err(MnistError::DataMismatch)` if there's a mismatch between images and labels
    pub fn new(images: ImageBatch, labels: LabelBatch) -> Result<Self, MnistError> {
        if images.len() != labels.len() {
            return Err(MnistError::DataMismatch(format!(
                "Number of images ({}) does not match number of labels ({})",
                images.len(),
                labels.len()
            )));
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &ImageBatch {
        &self.images
    }

    pub fn labels(&self) -> &LabelBatch {
        &self.labels
    }

    pub fn into_parts(self) -> (ImageBatch, LabelBatch) {
        (self.images, self.labels)
    }
}

fn check_header_field(kind: &'static str, field: &'static str, value: usize) -> Result<(), MnistError> {
    if i32::try_from(value).is_err() {
        return Err(MnistError::InvalidHeader {
            kind,
            field,
            value: i64::try_from(value).unwrap_or(i64::MAX),
        });
    }
    Ok(())
}

/// Total pixels in `count` images of `rows` x `cols`, or `None` on overflow
fn pixel_count(count: usize, rows: usize, cols: usize) -> Option<usize> {
    count.checked_mul(rows)?.checked_mul(cols)
}

/// Reads the big-endian 32-bit signed integer at `offset`
fn read_i32(bytes: &[u8], offset: usize) -> Option<i32> {
    let field = bytes.get(offset..offset + 4)?;
    let mut buffer = [0u8; 4];
    buffer.copy_from_slice(field);
    Some(i32::from_be_bytes(buffer))
}

/// Reads a header field that must be a non-negative size
fn read_size(bytes: &[u8], offset: usize, kind: &'static str, field: &'static str) -> Result<usize, MnistError> {
    let value = read_i32(bytes, offset).ok_or(MnistError::Truncated {
        kind,
        expected: offset + 4,
        actual: bytes.len(),
    })?;
    usize::try_from(value).map_err(|_| MnistError::InvalidHeader {
        kind,
        field,
        value: i64::from(value),
    })
}

fn check_magic(bytes: &[u8], kind: &'static str, expected: i32) -> Result<(), MnistError> {
    let actual = read_i32(bytes, 0).ok_or(MnistError::Truncated {
        kind,
        expected: 4,
        actual: bytes.len(),
    })?;
    if actual != expected {
        return Err(MnistError::InvalidMagicNumber {
            kind,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Decodes an IDX image container.
///
/// # Format
/// The IDX file format consists of:
/// * 32-bit magic number (2051)
/// * 32-bit number of images
/// * 32-bit number of rows
/// * 32-bit number of columns
/// * Pixels in row-major order (1 byte per pixel)
///
/// All header fields are big-endian signed integers. Bytes past the declared payload are
/// ignored.
pub fn decode_images(bytes: &[u8]) -> Result<ImageBatch, MnistError> {
    check_magic(bytes, "images", IMAGE_MAGIC_NUMBER)?;
    let count = read_size(bytes, 4, "images", "count")?;
    let rows = read_size(bytes, 8, "images", "rows")?;
    let cols = read_size(bytes, 12, "images", "cols")?;

    let end = pixel_count(count, rows, cols)
        .and_then(|n| n.checked_add(IMAGE_HEADER_LEN))
        .ok_or(MnistError::InvalidHeader {
            kind: "images",
            field: "count",
            value: i64::try_from(count).unwrap_or(i64::MAX),
        })?;
    let pixels = bytes.get(IMAGE_HEADER_LEN..end).ok_or(MnistError::Truncated {
        kind: "images",
        expected: end,
        actual: bytes.len(),
    })?;

    ImageBatch::new(count, rows, cols, pixels.to_vec())
}

/// Decodes an IDX label container.
///
/// # Format
/// The IDX file format consists of:
/// * 32-bit magic number (2049)
/// * 32-bit number of labels
/// * Labels (1 byte per label)
pub fn decode_labels(bytes: &[u8]) -> Result<LabelBatch, MnistError> {
    check_magic(bytes, "labels", LABEL_MAGIC_NUMBER)?;
    let count = read_size(bytes, 4, "labels", "count")?;

    let end = LABEL_HEADER_LEN + count;
    let labels = bytes.get(LABEL_HEADER_LEN..end).ok_or(MnistError::Truncated {
        kind: "labels",
        expected: end,
        actual: bytes.len(),
    })?;

    LabelBatch::new(labels.to_vec())
}

// Batch constructors reject dimensions above i32::MAX, so the casts below are lossless.
fn header_field(value: usize) -> [u8; 4] {
    (value as i32).to_be_bytes()
}

/// Encodes an image batch as an IDX image container.
pub fn encode_images(batch: &ImageBatch) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(IMAGE_HEADER_LEN + batch.as_array().len());
    bytes.extend_from_slice(&IMAGE_MAGIC_NUMBER.to_be_bytes());
    bytes.extend_from_slice(&header_field(batch.len()));
    bytes.extend_from_slice(&header_field(batch.rows()));
    bytes.extend_from_slice(&header_field(batch.cols()));
    bytes.extend(batch.as_array().iter().copied());
    bytes
}

/// Encodes a label batch as an IDX label container.
pub fn encode_labels(batch: &LabelBatch) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(LABEL_HEADER_LEN + batch.len());
    bytes.extend_from_slice(&LABEL_MAGIC_NUMBER.to_be_bytes());
    bytes.extend_from_slice(&header_field(batch.len()));
    bytes.extend_from_slice(batch.as_slice());
    bytes
}
