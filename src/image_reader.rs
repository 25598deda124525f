use std::path::{Path, PathBuf};

use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption};
use dicom_dictionary_std::tags;
use ndarray::s;
use thiserror::Error;
use tracing::{debug, warn};
use web_time::Instant;

use crate::dataset::{Dataset, TagStore, ValueError};
use crate::dicom_dataset::DicomTagStore;
use crate::geometry::{
    DEFAULT_ORIGIN, DEFAULT_RIGHT, DEFAULT_SPACING, DEFAULT_UP, PlaneGeometry,
    orientation_from_values, spacing_from_values,
};
use crate::image::{Image, PixelData};
use crate::tag::Tag;

#[derive(Debug, Error)]
pub enum ImageReaderError {
    #[error("Could not read DICOM file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: dicom::object::ReadError,
    },
}

/// Where a geometry attribute was found
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeLevel {
    PerFrame,
    Shared,
    TopLevel,
    Default,
}

/// A geometry attribute and the functional group macro that carries it in
/// enhanced multi-frame objects.
#[derive(Clone, Copy)]
struct GeometryAttribute {
    name: &'static str,
    tag: dicom::core::Tag,
    macro_sequence: dicom::core::Tag,
}

const IMAGE_POSITION: GeometryAttribute = GeometryAttribute {
    name: "Image Position (Patient)",
    tag: tags::IMAGE_POSITION_PATIENT,
    macro_sequence: tags::PLANE_POSITION_SEQUENCE,
};

const IMAGE_ORIENTATION: GeometryAttribute = GeometryAttribute {
    name: "Image Orientation (Patient)",
    tag: tags::IMAGE_ORIENTATION_PATIENT,
    macro_sequence: tags::PLANE_ORIENTATION_SEQUENCE,
};

const PIXEL_SPACING: GeometryAttribute = GeometryAttribute {
    name: "Pixel Spacing",
    tag: tags::PIXEL_SPACING,
    macro_sequence: tags::PIXEL_MEASURES_SEQUENCE,
};

const SLICE_THICKNESS: GeometryAttribute = GeometryAttribute {
    name: "Slice Thickness",
    tag: tags::SLICE_THICKNESS,
    macro_sequence: tags::PIXEL_MEASURES_SEQUENCE,
};

/// Functional group items of one data set, fetched once per file.
struct FunctionalGroups {
    per_frame: Vec<Dataset>,
    shared: Option<Dataset>,
}

impl FunctionalGroups {
    fn of(dataset: &dyn TagStore) -> Self {
        let per_frame = dataset
            .get_as_sequence(tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE.into())
            .unwrap_or_default();
        let shared = dataset
            .get_as_sequence(tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE.into())
            .ok()
            .and_then(|items| items.into_iter().next());
        Self { per_frame, shared }
    }

    /// Numeric value of `attribute` for `frame`, following the chain
    /// per-frame item → shared item → top level data set.
    ///
    /// Values rejected by `accept` are skipped as if they were absent.
    fn resolve<T>(
        &self,
        dataset: &dyn TagStore,
        frame: u32,
        attribute: GeometryAttribute,
        accept: impl Fn(&[f64]) -> Option<T>,
    ) -> Option<(T, AttributeLevel)> {
        let tag = Tag::from(attribute.tag);
        let candidates = [
            (
                self.per_frame.get(frame as usize),
                AttributeLevel::PerFrame,
            ),
            (self.shared.as_ref(), AttributeLevel::Shared),
        ];

        for (item, level) in candidates {
            let Some(item) = item else { continue };
            if let Some(value) = lookup_in_group(item, attribute)
                .and_then(|values| checked(values, tag, level, attribute, &accept))
            {
                return Some((value, level));
            }
        }

        let values = dataset.get_as_doubles(tag);
        if let Err(ValueError::MalformedNumber { .. } | ValueError::NotConvertible { .. }) =
            &values
        {
            warn!("Ignoring unreadable {} at top level", attribute.name);
        }
        values
            .ok()
            .and_then(|values| checked(values, tag, AttributeLevel::TopLevel, attribute, &accept))
            .map(|value| (value, AttributeLevel::TopLevel))
    }
}

fn checked<T>(
    values: Vec<f64>,
    tag: Tag,
    level: AttributeLevel,
    attribute: GeometryAttribute,
    accept: &impl Fn(&[f64]) -> Option<T>,
) -> Option<T> {
    let value = accept(&values);
    if value.is_none() {
        warn!(
            "Ignoring malformed {} {tag} at {level:?} level: {values:?}",
            attribute.name
        );
    }
    value
}

/// Looks into the macro sequence of a functional group item, then directly
/// into the item.
fn lookup_in_group(item: &Dataset, attribute: GeometryAttribute) -> Option<Vec<f64>> {
    let tag = Tag::from(attribute.tag);
    item.get_as_sequence(attribute.macro_sequence.into())
        .ok()
        .and_then(|items| items.into_iter().next())
        .and_then(|macro_item| macro_item.get_as_doubles(tag).ok())
        .or_else(|| item.get_as_doubles(tag).ok())
}

fn point_from_values(values: &[f64]) -> Option<[f64; 3]> {
    match *values {
        [x, y, z] => Some([x, y, z]),
        _ => None,
    }
}

fn positive_scalar(values: &[f64]) -> Option<f64> {
    values.first().copied().filter(|v| *v > 0.0)
}

/// Plane geometry of `frame`, substituting documented defaults for every
/// attribute that cannot be resolved at any level.
pub fn resolve_plane_geometry(dataset: &dyn TagStore, frame: u32) -> PlaneGeometry {
    resolve_with_groups(dataset, &FunctionalGroups::of(dataset), frame)
}

fn resolve_with_groups(
    dataset: &dyn TagStore,
    groups: &FunctionalGroups,
    frame: u32,
) -> PlaneGeometry {
    let origin = groups
        .resolve(dataset, frame, IMAGE_POSITION, point_from_values)
        .map(|(origin, _)| origin)
        .unwrap_or_else(|| {
            warn!("Could not read tag 'Image Position (Patient)', guessing (0,0,0)");
            DEFAULT_ORIGIN
        });

    let (right, up) = groups
        .resolve(dataset, frame, IMAGE_ORIENTATION, orientation_from_values)
        .map(|(axes, _)| axes)
        .unwrap_or_else(|| {
            warn!("Could not read tag 'Image Orientation (Patient)', guessing (1,0,0), (0,1,0)");
            (DEFAULT_RIGHT, DEFAULT_UP)
        });

    let spacing = groups
        .resolve(dataset, frame, PIXEL_SPACING, spacing_from_values)
        .map(|(spacing, _)| spacing)
        .unwrap_or_else(|| {
            warn!("Could not read tag 'Pixel Spacing', guessing 1mm");
            (DEFAULT_SPACING, DEFAULT_SPACING)
        });

    let thickness = groups
        .resolve(dataset, frame, SLICE_THICKNESS, positive_scalar)
        .map(|(thickness, _)| thickness)
        .unwrap_or_else(|| {
            warn!("Could not read tag 'Slice Thickness', guessing 1mm");
            DEFAULT_SPACING
        });

    PlaneGeometry::new(origin, right, up, spacing, thickness)
}

/// Reads single files into one [`Image`] per frame.
#[derive(Clone, Debug, Default)]
pub struct ImageReader;

impl ImageReader {
    pub fn new() -> Self {
        Self
    }

    /// Reads `path`, returning no images when the file cannot be parsed.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Vec<Image> {
        match self.try_read_file(path) {
            Ok(images) => images,
            Err(e) => {
                warn!("{e}");
                Vec::new()
            }
        }
    }

    pub fn try_read_file(&self, path: impl AsRef<Path>) -> Result<Vec<Image>, ImageReaderError> {
        let path = path.as_ref();
        let start = Instant::now();
        let object = open_file(path).map_err(|source| ImageReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let images = self.read_object(object, Some(path));
        debug!(
            "Read {} image(s) from {} in {:?}",
            images.len(),
            path.display(),
            start.elapsed()
        );
        Ok(images)
    }

    /// Splits an already parsed object into its frames.
    ///
    /// Frames whose pixel data cannot be decoded are skipped.
    pub fn read_object(
        &self,
        mut object: FileDicomObject<InMemDicomObject>,
        source: Option<&Path>,
    ) -> Vec<Image> {
        let number_of_frames = object
            .element(tags::NUMBER_OF_FRAMES)
            .ok()
            .and_then(|element| element.to_int::<u32>().ok())
            .unwrap_or(1)
            .max(1);

        let decoded: Vec<(u32, PixelData)> = (0..number_of_frames)
            .filter_map(|frame| match Self::decode_frame(&object, frame) {
                Ok(pixels) => Some((frame, pixels)),
                Err(e) => {
                    warn!(
                        "Skipping frame {frame} of {}: {e}",
                        source.map(Path::display).map(|d| d.to_string()).unwrap_or_default()
                    );
                    None
                }
            })
            .collect();

        // decoded samples now live in the images
        object.remove_element(tags::PIXEL_DATA);
        let dataset = Dataset::new(DicomTagStore::from_object(object.into_inner()));
        let groups = FunctionalGroups::of(&dataset);

        decoded
            .into_iter()
            .filter_map(|(frame, pixels)| {
                let plane = resolve_with_groups(&dataset, &groups, frame)
                    .with_extent(pixels.columns() as u32, pixels.rows() as u32);
                debug!(
                    "Read frame {frame} of {number_of_frames}: {}x{} at {:?}, oriented with {:?}, {:?}",
                    plane.columns, plane.rows, plane.origin, plane.right, plane.up
                );

                let mut image = Image::new(dataset.clone()).with_frame(frame);
                if let Some(path) = source {
                    image = image.with_source(path);
                }
                image.set_plane_geometry(plane);
                match image.set_pixel_data(pixels) {
                    Ok(()) => Some(image),
                    Err(e) => {
                        warn!("Dropping frame {frame}: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    fn decode_frame(
        object: &FileDicomObject<InMemDicomObject>,
        frame: u32,
    ) -> Result<PixelData, dicom::pixeldata::Error> {
        let decoded = object.decode_pixel_data_frame(frame)?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        let samples = decoded.to_ndarray_with_options::<u16>(&options)?;
        Ok(PixelData::new(samples.slice_move(s![0, .., .., 0])))
    }
}
