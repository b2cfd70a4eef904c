mod commands;
mod config;
mod convert;

use anyhow::{Context, Result};
use clap::Parser;
use config::PrepConfig;
use std::path::PathBuf;

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = PrepConfig::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Rotate {
            images,
            labels,
            min,
            max,
            seed,
        } => {
            let rotation = &mut config.rotation;
            if let Some(min) = min {
                rotation.min_degrees = min;
            }
            if let Some(max) = max {
                rotation.max_degrees = max;
            }
            if seed.is_some() {
                rotation.seed = seed;
            }
            commands::rotate(&images, &labels, &config.rotation, args.quiet)
                .context("Failed to rotate dataset")?;
        }
        Command::Recover { images, labels } => {
            commands::recover(&images, &labels, &config.recover.suffix, args.quiet)
                .context("Failed to recover dataset")?;
        }
        Command::Convert { images } => {
            commands::convert(&images, &config.convert, args.quiet)
                .context("Failed to convert images")?;
        }
    }

    Ok(())
}

#[derive(clap::Parser)]
#[command(name = "digitprep", about = "MNIST dataset preparation", long_about = None)]
struct Args {
    /// JSON configuration file; command line flags take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Suppress progress bars and status output
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
#[command(about = "MNIST dataset preparation commands")]
enum Command {
    /// Rotate every image by a random non-zero angle, writing `.rot` files
    Rotate {
        /// IDX image file (magic 2051)
        images: PathBuf,
        /// IDX label file (magic 2049)
        labels: PathBuf,
        /// Smallest rotation angle in degrees
        #[arg(long, allow_negative_numbers = true)]
        min: Option<f64>,
        /// Largest rotation angle in degrees
        #[arg(long, allow_negative_numbers = true)]
        max: Option<f64>,
        /// Seed for reproducible rotations
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Flip and rotate EMNIST images into MNIST orientation, writing `.rcv` files
    Recover {
        /// IDX image file (magic 2051)
        images: PathBuf,
        /// IDX label file (magic 2049)
        labels: PathBuf,
    },
    /// Convert pictures of digits into 28x28 `.mnist` samples
    Convert {
        /// Image files to convert
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_negative_angles() {
        let args = Args::try_parse_from([
            "digitprep", "rotate", "imgs", "lbls", "--min", "-20", "--max", "5", "--seed", "1",
        ])
        .unwrap();
        match args.command {
            Command::Rotate { min, max, seed, .. } => {
                assert_eq!(min, Some(-20.0));
                assert_eq!(max, Some(5.0));
                assert_eq!(seed, Some(1));
            }
            _ => panic!("Expected rotate command"),
        }
    }

    #[test]
    fn test_missing_labels_is_usage_error() {
        assert!(Args::try_parse_from(["digitprep", "recover", "imgs"]).is_err());
        assert!(Args::try_parse_from(["digitprep", "convert"]).is_err());
    }
}
