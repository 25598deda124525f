//! [`TagStore`] adapter over in-memory DICOM objects of the dicom-rs crates.
//!
//! This is the only module that knows how the parsing backend represents
//! attributes.

use std::sync::OnceLock;

use dicom::core::VR;
use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom::object::InMemDicomObject;
use dicom::object::mem::InMemElement;
use dicom_dictionary_std::StandardDataDictionary;

use crate::dataset::{
    Dataset, Sequence, TagStore, UNKNOWN_VR, ValueError, parse_numbers, split_values,
};
use crate::enums::ValueFamily;
use crate::tag::Tag;

/// Maps a value representation onto the accessors able to interpret it.
///
/// Binary encoded numbers (`US`, `FD`, ...) are rendered to text by the
/// backend and then share the path of `DS` and `IS`.
pub fn value_family(vr: VR) -> ValueFamily {
    match vr {
        VR::AE
        | VR::AS
        | VR::CS
        | VR::DA
        | VR::DT
        | VR::LO
        | VR::LT
        | VR::PN
        | VR::SH
        | VR::ST
        | VR::TM
        | VR::UC
        | VR::UI
        | VR::UR
        | VR::UT => ValueFamily::Textual,
        VR::DS
        | VR::IS
        | VR::US
        | VR::UL
        | VR::SS
        | VR::SL
        | VR::FL
        | VR::FD
        | VR::SV
        | VR::UV => ValueFamily::NumericText,
        VR::SQ => ValueFamily::Sequence,
        _ => ValueFamily::Binary,
    }
}

/// Write-once wrapper around one [`InMemDicomObject`].
///
/// A store that was never initialized behaves like an empty data set.
#[derive(Debug, Default)]
pub struct DicomTagStore {
    object: OnceLock<InMemDicomObject>,
}

impl DicomTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_object(object: InMemDicomObject) -> Self {
        let store = Self::new();
        store.initialize(object);
        store
    }

    /// Binds the store to `object`.
    ///
    /// # Panics
    ///
    /// Panics when called a second time; a store is immutable once bound.
    pub fn initialize(&self, object: InMemDicomObject) {
        if self.object.set(object).is_err() {
            panic!("DicomTagStore initialized twice, stores are immutable once bound");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.object.get().is_some()
    }

    fn element(&self, tag: Tag) -> Result<&InMemElement, ValueError> {
        let backend_tag =
            dicom::core::Tag::try_from(tag).map_err(|_| ValueError::Missing { tag })?;
        self.object
            .get()
            .and_then(|object| object.element(backend_tag).ok())
            .ok_or(ValueError::Missing { tag })
    }

    fn text(&self, tag: Tag, accept: &[ValueFamily]) -> Result<String, ValueError> {
        let element = self.element(tag)?;
        let vr = element.vr();
        if !accept.contains(&value_family(vr)) {
            return Err(ValueError::NotConvertible {
                tag,
                vr: vr.to_string().to_owned(),
            });
        }
        element
            .value()
            .to_str()
            .map(|text| {
                text.trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
                    .trim_start()
                    .to_owned()
            })
            .map_err(|_| ValueError::NotConvertible {
                tag,
                vr: vr.to_string().to_owned(),
            })
    }
}

impl TagStore for DicomTagStore {
    fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .object
            .get()
            .map(|object| {
                object
                    .into_iter()
                    .map(|element| Tag::from(element.header().tag))
                    .collect()
            })
            .unwrap_or_default();
        tags.sort();
        tags
    }

    fn value_representation(&self, tag: Tag) -> String {
        let Ok(element) = self.element(tag) else {
            return UNKNOWN_VR.to_owned();
        };
        let vr = element.vr().to_string().to_owned();
        match StandardDataDictionary.by_tag(element.header().tag) {
            Some(entry) => format!("{vr}:{}", entry.alias()),
            None => vr,
        }
    }

    fn get_as_string(&self, tag: Tag) -> Result<String, ValueError> {
        self.text(tag, &[ValueFamily::Textual, ValueFamily::NumericText])
    }

    fn get_as_strings(&self, tag: Tag) -> Result<Vec<String>, ValueError> {
        self.get_as_string(tag).map(|text| split_values(&text))
    }

    fn get_as_doubles(&self, tag: Tag) -> Result<Vec<f64>, ValueError> {
        let text = self.text(tag, &[ValueFamily::NumericText])?;
        parse_numbers(tag, &text)
    }

    fn get_as_sequence(&self, tag: Tag) -> Result<Sequence, ValueError> {
        let element = self.element(tag)?;
        let items = element
            .value()
            .items()
            .ok_or_else(|| ValueError::NotConvertible {
                tag,
                vr: element.vr().to_string().to_owned(),
            })?;
        Ok(items
            .iter()
            .map(|item| Dataset::new(DicomTagStore::from_object(item.clone())))
            .collect())
    }

    fn contains(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }
}
