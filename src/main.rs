//! A CLI tool loading a set of DICOM files into one image series
//! and reporting its geometry.
use std::path::PathBuf;

use clap::Parser;
use dicom_series::series_reader::DEFAULT_WORKER_COUNT;
use dicom_series::{SeriesReader, SeriesReaderOptions, SortBy, UpdateMode};
use tracing::{Level, error, info};

/// Load DICOM files into a series
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// Paths to the DICOM files to load
    #[arg(required_unless_present = "dir", conflicts_with = "dir")]
    files: Vec<PathBuf>,

    /// Load every `.dcm` file in this directory instead
    #[arg(short = 'd', long = "dir")]
    dir: Option<PathBuf>,

    /// Attribute ordering the loaded images
    #[arg(short = 's', long = "sort-by", value_enum, default_value_t = SortBy::ImagePositionPatient)]
    sort_by: SortBy,

    /// Number of loader threads
    #[arg(short = 'w', long = "workers", default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Report as soon as the first file is loaded, then wait for the rest
    #[arg(long = "continuing")]
    continuing: bool,

    /// Print all attributes of the first image
    #[arg(long = "dump")]
    dump: bool,

    /// Save the middle slice as an 8-bit PNG
    #[arg(short = 'p', long = "preview")]
    preview: Option<PathBuf>,

    /// Print more information about the loading progress
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let App {
        files,
        dir,
        sort_by,
        workers,
        continuing,
        dump,
        preview,
        verbose,
    } = App::parse();

    if let Err(e) = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    ) {
        eprintln!("[ERROR] Could not set up global logging subscriber: {e}");
    }

    let options = SeriesReaderOptions {
        worker_count: workers,
        sort_by,
    };
    let mut reader = match dir {
        Some(dir) => SeriesReader::from_directory(&dir, options).unwrap_or_else(|e| {
            error!("{e}");
            std::process::exit(-1);
        }),
        None => {
            let mut reader = SeriesReader::with_options(options);
            reader.set_filenames(files);
            reader
        }
    };

    if verbose {
        reader.add_progress_listener(|progress| {
            info!(
                "Loaded {}/{} file(s)",
                progress.files_loaded, progress.files_total
            );
        });
    }

    let mode = if continuing {
        UpdateMode::MinimalContinuing
    } else {
        UpdateMode::Blocking
    };
    let state = reader.update(mode).unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(-2);
    });
    let series = reader.output(0).unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(-3);
    });

    if continuing {
        println!(
            "{:?} after first result: {} image(s) available",
            state,
            series.number_of_images()
        );
        reader.wait();
    }

    let progress = reader.progress();
    let geometry = series.geometry();
    println!(
        "{} image(s) from {}/{} file(s)",
        series.number_of_images(),
        progress.files_loaded,
        progress.files_total
    );
    println!(
        "origin {:?}, spacing {:?}, {} slice(s)",
        geometry.origin,
        geometry.spacing,
        geometry.number_of_slices()
    );

    let images = series.all_images();
    if dump {
        match images.first() {
            Some(image) => print!("{}", image.dataset().dump()),
            None => error!("No image to dump"),
        }
    }

    if let Some(output) = preview {
        let preview = images
            .get(images.len() / 2)
            .and_then(|image| image.pixel_data())
            .and_then(|pixel_data| pixel_data.to_luma8())
            .unwrap_or_else(|| {
                error!("No pixel data to preview");
                std::process::exit(-4);
            });
        preview.save(&output).unwrap_or_else(|e| {
            error!("{e}");
            std::process::exit(-5);
        });
        if verbose {
            println!("Preview saved to {}", output.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::App;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }
}
