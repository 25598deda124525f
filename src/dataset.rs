//! Tag/value access to the attributes of one DICOM data set.
//!
//! [`TagStore`] is the capability interface the rest of the crate is written
//! against. [`Dataset`] is a cheap, cloneable handle to any store; the only
//! store backed by real files is
//! [`DicomTagStore`](crate::dicom_dataset::DicomTagStore).

use std::fmt::{self, Write as _};
use std::sync::Arc;

use thiserror::Error;

use crate::dicom_dataset::DicomTagStore;
use crate::tag::Tag;

/// Separator between the components of a multi-valued attribute
pub const VALUE_DELIMITER: char = '\\';

/// Descriptor returned for tags that are not part of a data set
pub const UNKNOWN_VR: &str = "??";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("Attribute {tag} is not present")]
    Missing { tag: Tag },

    #[error("Attribute {tag} with value representation {vr} cannot be converted")]
    NotConvertible { tag: Tag, vr: String },

    #[error("Attribute {tag} holds malformed numeric text '{text}'")]
    MalformedNumber { tag: Tag, text: String },
}

/// Nested data sets of a sequence attribute, in item order
pub type Sequence = Vec<Dataset>;

pub trait TagStore: Send + Sync {
    /// All tags present at this level, in [`Tag`] order
    fn tags(&self) -> Vec<Tag>;

    /// Value representation of `tag`, decorated with the attribute name when
    /// the standard dictionary knows it (e.g. `DS:PixelSpacing`)
    fn value_representation(&self, tag: Tag) -> String;

    fn get_as_string(&self, tag: Tag) -> Result<String, ValueError>;

    fn get_as_strings(&self, tag: Tag) -> Result<Vec<String>, ValueError>;

    fn get_as_doubles(&self, tag: Tag) -> Result<Vec<f64>, ValueError>;

    fn get_as_sequence(&self, tag: Tag) -> Result<Sequence, ValueError>;

    /// First component of a numeric attribute
    fn get_as_double(&self, tag: Tag) -> Result<f64, ValueError> {
        self.get_as_doubles(tag)?
            .first()
            .copied()
            .ok_or(ValueError::MalformedNumber {
                tag,
                text: String::new(),
            })
    }

    fn contains(&self, tag: Tag) -> bool {
        self.tags().contains(&tag)
    }
}

/// Shared handle to a tag store.
///
/// Cloning is cheap; the underlying values are immutable once the handle
/// exists.
#[derive(Clone)]
pub struct Dataset {
    store: Arc<dyn TagStore>,
}

impl Dataset {
    pub fn new(store: impl TagStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// A data set without any attributes
    pub fn empty() -> Self {
        Self::new(DicomTagStore::new())
    }

    /// Human readable, recursive listing of all attributes
    pub fn dump(&self) -> String {
        let mut out = String::new();
        dump_into(self, "", &mut out);
        out
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("tags", &self.store.tags().len())
            .finish()
    }
}

impl TagStore for Dataset {
    fn tags(&self) -> Vec<Tag> {
        self.store.tags()
    }

    fn value_representation(&self, tag: Tag) -> String {
        self.store.value_representation(tag)
    }

    fn get_as_string(&self, tag: Tag) -> Result<String, ValueError> {
        self.store.get_as_string(tag)
    }

    fn get_as_strings(&self, tag: Tag) -> Result<Vec<String>, ValueError> {
        self.store.get_as_strings(tag)
    }

    fn get_as_doubles(&self, tag: Tag) -> Result<Vec<f64>, ValueError> {
        self.store.get_as_doubles(tag)
    }

    fn get_as_double(&self, tag: Tag) -> Result<f64, ValueError> {
        self.store.get_as_double(tag)
    }

    fn get_as_sequence(&self, tag: Tag) -> Result<Sequence, ValueError> {
        self.store.get_as_sequence(tag)
    }

    fn contains(&self, tag: Tag) -> bool {
        self.store.contains(tag)
    }
}

/// Splits a multi-valued attribute into trimmed components.
pub fn split_values(text: &str) -> Vec<String> {
    text.split(VALUE_DELIMITER)
        .map(|part| part.trim().to_owned())
        .collect()
}

/// Parses every component of `text` as a finite number.
///
/// A single unparseable component fails the whole call.
pub fn parse_numbers(tag: Tag, text: &str) -> Result<Vec<f64>, ValueError> {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if trimmed.is_empty() {
        return Err(ValueError::MalformedNumber {
            tag,
            text: text.to_owned(),
        });
    }
    trimmed
        .split(VALUE_DELIMITER)
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| ValueError::MalformedNumber {
                    tag,
                    text: part.to_owned(),
                })
        })
        .collect()
}

fn dump_into(dataset: &dyn TagStore, indent: &str, out: &mut String) {
    for tag in dataset.tags() {
        let vr = dataset.value_representation(tag);
        let _ = write!(out, "{indent}{tag}: [{vr}]: ");

        if let Ok(items) = dataset.get_as_sequence(tag) {
            let _ = writeln!(out, " sequence:");
            let nested = format!("{indent}  ");
            for (number, item) in items.iter().enumerate() {
                let _ = writeln!(out, "{nested}Item {}:", number + 1);
                dump_into(item, &nested, out);
            }
        } else if let Ok(value) = dataset.get_as_double(tag) {
            let _ = writeln!(out, "{value}");
        } else if let Ok(value) = dataset.get_as_string(tag) {
            let _ = writeln!(out, "'{value}'");
        } else {
            let _ = writeln!(out, "<Unknown attribute type>");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_valued_numbers_with_padding() {
        let tag = Tag::new(0x0028, 0x0030);
        let values = parse_numbers(tag, " 0.5\\0.75 ").expect("should parse");
        assert_eq!(values, vec![0.5, 0.75]);
    }

    #[test]
    fn one_bad_component_fails_the_whole_value() {
        let tag = Tag::new(0x0020, 0x0032);
        let result = parse_numbers(tag, "1.0\\abc\\3.0");
        assert_eq!(
            result,
            Err(ValueError::MalformedNumber {
                tag,
                text: "abc".to_owned()
            })
        );
    }

    #[test]
    fn rejects_empty_and_non_finite_text() {
        let tag = Tag::new(0x0018, 0x0050);
        assert!(parse_numbers(tag, "  ").is_err());
        assert!(parse_numbers(tag, "NaN").is_err());
        assert!(parse_numbers(tag, "inf").is_err());
    }

    #[test]
    fn split_trims_each_component() {
        assert_eq!(
            split_values("ORIGINAL \\ PRIMARY\\AXIAL"),
            vec!["ORIGINAL", "PRIMARY", "AXIAL"]
        );
    }

    #[test]
    fn empty_dataset_reports_nothing() {
        let dataset = Dataset::empty();
        let tag = Tag::new(0x0008, 0x0008);
        assert!(dataset.tags().is_empty());
        assert_eq!(dataset.value_representation(tag), UNKNOWN_VR);
        assert_eq!(dataset.get_as_string(tag), Err(ValueError::Missing { tag }));
        assert!(dataset.dump().is_empty());
    }
}
