use std::cmp::Ordering;
use std::fmt;

/// Multiplier folding group and element into one sort key.
const GROUP_WEIGHT: u64 = 0x3000;

/// Identifier of one DICOM attribute.
///
/// Tags are ordered by `group * 0x3000 + element`. For elements below
/// `0x3000` this keeps all tags of a lower group in front of any tag of a
/// higher group. Elements above that bound may interleave with the next
/// groups; keys that collide are ordered by `(group, element)` so that the
/// order stays total and agrees with equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    pub group: u32,
    pub element: u32,
}

impl Tag {
    pub const fn new(group: u32, element: u32) -> Self {
        Self { group, element }
    }

    fn sort_key(&self) -> u64 {
        u64::from(self.group) * GROUP_WEIGHT + u64::from(self.element)
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| (self.group, self.element).cmp(&(other.group, other.element)))
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

impl From<dicom::core::Tag> for Tag {
    fn from(tag: dicom::core::Tag) -> Self {
        Self::new(u32::from(tag.group()), u32::from(tag.element()))
    }
}

impl From<(u32, u32)> for Tag {
    fn from((group, element): (u32, u32)) -> Self {
        Self::new(group, element)
    }
}

/// Converts back into the backend tag, failing for values that do not fit
/// the 16 bit DICOM encoding.
impl TryFrom<Tag> for dicom::core::Tag {
    type Error = std::num::TryFromIntError;

    fn try_from(tag: Tag) -> Result<Self, Self::Error> {
        Ok(dicom::core::Tag(
            u16::try_from(tag.group)?,
            u16::try_from(tag.element)?,
        ))
    }
}
