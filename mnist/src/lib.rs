pub mod files;
pub mod mnist;

pub use crate::files::{load_mnist_data, read_images, read_labels, sibling_path, write_images, write_labels};
pub use crate::mnist::*;
