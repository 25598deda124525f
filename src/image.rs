use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::{GrayImage, ImageBuffer, Luma};
use ndarray::Array2;
use rayon::prelude::*;
use thiserror::Error;

use crate::dataset::{Dataset, Sequence, TagStore, ValueError};
use crate::geometry::PlaneGeometry;
use crate::tag::Tag;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Pixel data requires a plane geometry to be set first")]
    MissingPlaneGeometry,
}

/// Decoded samples of one frame, indexed as `[row, column]`
#[derive(Clone, Debug, PartialEq)]
pub struct PixelData {
    samples: Array2<u16>,
}

impl PixelData {
    pub fn new(samples: Array2<u16>) -> Self {
        Self { samples }
    }

    pub fn rows(&self) -> usize {
        self.samples.nrows()
    }

    pub fn columns(&self) -> usize {
        self.samples.ncols()
    }

    pub fn samples(&self) -> &Array2<u16> {
        &self.samples
    }

    /// 8 bit preview, stretched between the smallest and largest sample
    pub fn to_luma8(&self) -> Option<GrayImage> {
        let (min, max) = self
            .samples
            .iter()
            .fold((u16::MAX, u16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = f32::from(max.saturating_sub(min)).max(1.0);

        let standard = self.samples.as_standard_layout();
        let pixels: Vec<u8> = standard
            .as_slice()?
            .par_iter()
            .map(|&v| ((f32::from(v - min) / range) * 255.0).clamp(0.0, 255.0) as u8)
            .collect();
        ImageBuffer::<Luma<u8>, _>::from_raw(
            u32::try_from(self.columns()).ok()?,
            u32::try_from(self.rows()).ok()?,
            pixels,
        )
    }
}

/// One 2-D slice: the attributes of its source data set, plus the decoded
/// pixels and the plane they live on.
///
/// Frames of a multi-frame file share one [`Dataset`].
#[derive(Debug)]
pub struct Image {
    id: u64,
    dataset: Dataset,
    frame: u32,
    source: Option<PathBuf>,
    pixel_data: Option<PixelData>,
    plane: Option<PlaneGeometry>,
}

impl Image {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            dataset,
            frame: 0,
            source: None,
            pixel_data: None,
            plane: None,
        }
    }

    pub fn with_frame(mut self, frame: u32) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Process-wide unique, creation-ordered identity
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Index of this frame within its source file
    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn pixel_data(&self) -> Option<&PixelData> {
        self.pixel_data.as_ref()
    }

    pub fn plane_geometry(&self) -> Option<&PlaneGeometry> {
        self.plane.as_ref()
    }

    pub fn set_plane_geometry(&mut self, plane: PlaneGeometry) {
        self.plane = Some(plane);
    }

    /// Attaches decoded pixels. The plane geometry must already be present.
    pub fn set_pixel_data(&mut self, pixel_data: PixelData) -> Result<(), ImageError> {
        if self.plane.is_none() {
            return Err(ImageError::MissingPlaneGeometry);
        }
        self.pixel_data = Some(pixel_data);
        Ok(())
    }

    /// Whether the image carries everything a renderer needs
    pub fn is_renderable(&self) -> bool {
        self.pixel_data.is_some() && self.plane.is_some()
    }
}

impl TagStore for Image {
    fn tags(&self) -> Vec<Tag> {
        self.dataset.tags()
    }

    fn value_representation(&self, tag: Tag) -> String {
        self.dataset.value_representation(tag)
    }

    fn get_as_string(&self, tag: Tag) -> Result<String, ValueError> {
        self.dataset.get_as_string(tag)
    }

    fn get_as_strings(&self, tag: Tag) -> Result<Vec<String>, ValueError> {
        self.dataset.get_as_strings(tag)
    }

    fn get_as_doubles(&self, tag: Tag) -> Result<Vec<f64>, ValueError> {
        self.dataset.get_as_doubles(tag)
    }

    fn get_as_double(&self, tag: Tag) -> Result<f64, ValueError> {
        self.dataset.get_as_double(tag)
    }

    fn get_as_sequence(&self, tag: Tag) -> Result<Sequence, ValueError> {
        self.dataset.get_as_sequence(tag)
    }

    fn contains(&self, tag: Tag) -> bool {
        self.dataset.contains(tag)
    }
}
