use std::cmp::Ordering;
use std::fmt;

use dicom_dictionary_std::tags;
use tracing::trace;

use crate::dataset::TagStore;
use crate::enums::SortBy;
use crate::image::Image;
use crate::tag::Tag;

/// Strategy deciding the order of images within a series.
///
/// `is_less` must be a strict weak ordering.
pub trait SortCriterion: Send + Sync + fmt::Debug {
    /// Whether `left` sorts before `right`
    fn is_less(&self, left: &Image, right: &Image) -> bool;

    fn compare(&self, left: &Image, right: &Image) -> Ordering {
        if self.is_less(left, right) {
            Ordering::Less
        } else if self.is_less(right, left) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

/// How an image's value of the sort tag could be interpreted
enum SortKey {
    Number(f64),
    Text(String),
    Unavailable,
}

impl SortKey {
    fn of(image: &Image, tag: Tag) -> Self {
        if let Ok(number) = image.get_as_double(tag) {
            Self::Number(number)
        } else if let Ok(text) = image.get_as_string(tag) {
            Self::Text(text)
        } else {
            Self::Unavailable
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::Unavailable => 2,
        }
    }
}

/// Orders images by the value of one attribute.
///
/// Numbers compare numerically, text compares lexicographically. Images
/// whose values are equal, or whose values are not comparable at all, are
/// ordered by their identity so that the order is total and repeatable.
/// Numeric values sort before textual ones, which sort before images
/// lacking the attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortByTag {
    tag: Tag,
    ascending: bool,
}

impl SortByTag {
    pub fn new(tag: impl Into<Tag>, ascending: bool) -> Self {
        Self {
            tag: tag.into(),
            ascending,
        }
    }

    pub fn ascending(tag: impl Into<Tag>) -> Self {
        Self::new(tag, true)
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }
}

impl SortCriterion for SortByTag {
    fn is_less(&self, left: &Image, right: &Image) -> bool {
        let left_key = SortKey::of(left, self.tag);
        let right_key = SortKey::of(right, self.tag);

        let by_value = match (&left_key, &right_key) {
            (SortKey::Number(l), SortKey::Number(r)) => {
                trace!("Compare number {l} against {r}");
                l.total_cmp(r)
            }
            (SortKey::Text(l), SortKey::Text(r)) => {
                trace!("Compare string {l} against {r}");
                l.cmp(r)
            }
            _ => left_key.rank().cmp(&right_key.rank()),
        };
        let ordering = by_value.then_with(|| left.id().cmp(&right.id()));

        if self.ascending {
            ordering == Ordering::Less
        } else {
            ordering == Ordering::Greater
        }
    }
}

/// Orders images along the normal of their planes, i.e. by spatial
/// position through the volume. Images without a plane go last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortByImagePosition;

impl SortCriterion for SortByImagePosition {
    fn is_less(&self, left: &Image, right: &Image) -> bool {
        let position = |image: &Image| {
            image
                .plane_geometry()
                .map(|plane| plane.position_along_normal())
        };
        let ordering = match (position(left), position(right)) {
            (Some(l), Some(r)) => l.total_cmp(&r),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        ordering.then_with(|| left.id().cmp(&right.id())) == Ordering::Less
    }
}

impl SortBy {
    /// The criterion implementing this choice, `None` keeps load order
    pub fn criterion(self) -> Option<Box<dyn SortCriterion>> {
        match self {
            SortBy::ImagePositionPatient => Some(Box::new(SortByImagePosition)),
            SortBy::InstanceNumber => Some(Box::new(SortByTag::ascending(tags::INSTANCE_NUMBER))),
            SortBy::SliceLocation => Some(Box::new(SortByTag::ascending(tags::SLICE_LOCATION))),
            SortBy::TablePosition => Some(Box::new(SortByTag::ascending(tags::TABLE_POSITION))),
            SortBy::None => None,
        }
    }
}
