//! Synthetic DICOM files for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};

pub const ROWS: u16 = 2;
pub const COLUMNS: u16 = 2;

/// 2x2 MONOCHROME2 frames with 16 bit samples, stored as Explicit VR Little
/// Endian.
#[derive(Clone, Debug, Default)]
pub struct SliceFile {
    pub position: Option<[f64; 3]>,
    pub orientation: Option<[f64; 6]>,
    pub pixel_spacing: Option<(f64, f64)>,
    pub instance_number: Option<u32>,
    /// One image position per frame, stored in per-frame functional groups
    pub frame_positions: Vec<[f64; 3]>,
    /// Frames actually present in the pixel data, all of them when `None`
    pub stored_frames: Option<usize>,
}

impl SliceFile {
    pub fn at(z: f64, instance_number: u32) -> Self {
        Self {
            position: Some([0.0, 0.0, z]),
            orientation: Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            pixel_spacing: Some((0.5, 0.5)),
            instance_number: Some(instance_number),
            ..Self::default()
        }
    }

    pub fn multiframe(frame_positions: Vec<[f64; 3]>) -> Self {
        Self {
            frame_positions,
            ..Self::default()
        }
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let frames = self.frame_positions.len().max(1);
        let mut obj = InMemDicomObject::from_element_iter([
            DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(uids::CT_IMAGE_STORAGE)),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(instance_uid(name))),
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
            DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
            DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from("MONOCHROME2"),
            ),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(ROWS)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(COLUMNS)),
            DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
            DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
            DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
            DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
            DataElement::new(tags::WINDOW_CENTER, VR::DS, PrimitiveValue::from("200")),
            DataElement::new(tags::WINDOW_WIDTH, VR::DS, PrimitiveValue::from("400")),
        ]);

        if let Some(position) = self.position {
            obj.put(ds(tags::IMAGE_POSITION_PATIENT, &position));
        }
        if let Some(orientation) = self.orientation {
            obj.put(ds(tags::IMAGE_ORIENTATION_PATIENT, &orientation));
        }
        if let Some((row, column)) = self.pixel_spacing {
            obj.put(ds(tags::PIXEL_SPACING, &[row, column]));
        }
        if let Some(number) = self.instance_number {
            obj.put(DataElement::new(
                tags::INSTANCE_NUMBER,
                VR::IS,
                PrimitiveValue::from(number.to_string()),
            ));
        }
        if !self.frame_positions.is_empty() {
            obj.put(DataElement::new(
                tags::NUMBER_OF_FRAMES,
                VR::IS,
                PrimitiveValue::from(frames.to_string()),
            ));
            let per_frame: Vec<InMemDicomObject> = self
                .frame_positions
                .iter()
                .map(|position| {
                    InMemDicomObject::from_element_iter([DataElement::new(
                        tags::PLANE_POSITION_SEQUENCE,
                        VR::SQ,
                        DataSetSequence::from(vec![InMemDicomObject::from_element_iter([ds(
                            tags::IMAGE_POSITION_PATIENT,
                            position,
                        )])]),
                    )])
                })
                .collect();
            obj.put(DataElement::new(
                tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(per_frame),
            ));
        }

        let samples = usize::from(ROWS) * usize::from(COLUMNS) * self.stored_frames.unwrap_or(frames);
        let pixels: Vec<u8> = (0..samples as u16)
            .flat_map(|sample| (sample * 100).to_le_bytes())
            .collect();
        obj.put(DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::from(pixels)));

        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid(instance_uid(name)),
            )
            .expect("should build file meta group");
        let path = dir.join(name);
        file.write_to_file(&path).expect("should write DICOM file");
        path
    }
}

fn ds(tag: dicom::core::Tag, values: &[f64]) -> DataElement<InMemDicomObject> {
    let text = values
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join("\\");
    DataElement::new(tag, VR::DS, PrimitiveValue::from(text))
}

fn instance_uid(name: &str) -> String {
    let digits: String = name
        .bytes()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(".");
    format!("2.25.{digits}")
}

/// Writes one single-frame slice per z position, named by index.
pub fn write_stack(dir: &Path, positions: &[f64]) -> Vec<PathBuf> {
    positions
        .iter()
        .enumerate()
        .map(|(index, &z)| SliceFile::at(z, index as u32 + 1).write(dir, &format!("slice{index:03}.dcm")))
        .collect()
}
