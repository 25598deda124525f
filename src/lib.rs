//! # DICOM-series library
//!
//! This crate loads a set of DICOM files into a single, spatially coherent
//! image series while the files are still being read in the background.
//!
//! It builds on the dicom-rs ecosystem for parsing and pixel decoding and
//! adds:
//!  - A uniform tag/value model ([`Dataset`]) over the parsed objects
//!  - Per-frame geometry reconstruction, falling back from per-frame to
//!    shared functional groups to top-level attributes, and finally to
//!    defaults
//!  - An ordered [`Series`] with an aggregate geometry and pluggable sort
//!    criteria
//!  - A [`SeriesReader`] loading files on a small pool of rayon threads,
//!    either blocking until everything is loaded or returning as soon as the
//!    first file is available
//!  - A priority lock letting a renderer read the series ahead of the loader
//!    threads appending to it
//!
//! All files passed to one update end up in the same output series; files of
//! different DICOM series are not separated.
//!
//! # Examples
//!
//! ## Loading a directory and sorting by position
//!
//! Start loading all ".dcm" files from the dicom/ directory, return once the
//! first file is available and wait for the rest afterwards.
//!
//! ```no_run
//! # use dicom_series::{SeriesReader, SeriesReaderOptions, SortBy};
//! let options = SeriesReaderOptions {
//!     sort_by: SortBy::ImagePositionPatient,
//!     ..SeriesReaderOptions::default()
//! };
//! let mut reader = SeriesReader::from_directory("dicom", options)
//!     .expect("should have found files in directory");
//! reader
//!     .minimal_continuing_update()
//!     .expect("should have started loading");
//!
//! let series = reader.output(0).expect("should have one output");
//! {
//!     let content = series.acquire_high_priority_access();
//!     println!("{} image(s) available so far", content.len());
//! }
//!
//! let progress = reader.wait();
//! println!(
//!     "{}/{} files, origin {:?}",
//!     progress.files_loaded,
//!     progress.files_total,
//!     series.geometry().origin
//! );
//! ```

pub mod dataset;
pub mod dicom_dataset;
pub mod enums;
pub mod geometry;
pub mod image;
pub mod image_reader;
pub mod priority_lock;
pub mod series;
pub mod series_reader;
pub mod sort_criterion;
pub mod tag;

pub use dataset::{Dataset, TagStore, ValueError};
pub use dicom_dataset::DicomTagStore;
pub use enums::{LoadState, SortBy, UpdateMode};
pub use geometry::{PlaneGeometry, SeriesGeometry};
pub use crate::image::{Image, PixelData};
pub use image_reader::ImageReader;
pub use priority_lock::PriorityLock;
pub use series::Series;
pub use series_reader::{Progress, SeriesReader, SeriesReaderError, SeriesReaderOptions};
pub use sort_criterion::{SortByImagePosition, SortByTag, SortCriterion};
pub use tag::Tag;
