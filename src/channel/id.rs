//! # Channel identity.
//!
//! A [`ChannelId`] names one live worker. Stream- and File-class workers draw
//! numbers from independent counters, so the class is part of the identity:
//!
//! ```text
//! Stream #1  → scalar 1        (0x0000_0001)
//! File   #1  → scalar 65537    (0x0001_0001)
//! ```
//!
//! The packed scalar only exists at the textual boundary (URL placeholders,
//! encoder log names, the `remove` API).

use std::fmt;

use crate::templates::SourceClass;

/// Tag bit carried by every File-class scalar.
pub const FILE_TAG: u32 = 0x0001_0000;

const NUMBER_MASK: u32 = 0x0000_FFFF;
const TAG_MASK: u32 = 0xFFFF_0000;

/// Identity of one registered worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    class: SourceClass,
    number: u16,
}

impl ChannelId {
    /// Creates an identity. Returns `None` for number 0, which is never issued.
    pub fn new(class: SourceClass, number: u16) -> Option<Self> {
        (number != 0).then_some(Self { class, number })
    }

    /// Source class the number was drawn for.
    pub fn class(&self) -> SourceClass {
        self.class
    }

    /// Counter value within the class.
    pub fn number(&self) -> u16 {
        self.number
    }

    /// Packs the identity into its scalar form.
    pub fn to_scalar(self) -> u32 {
        match self.class {
            SourceClass::Stream => u32::from(self.number),
            SourceClass::File => FILE_TAG | u32::from(self.number),
        }
    }

    /// Unpacks a scalar. Unknown tags and number 0 yield `None`.
    pub fn from_scalar(value: u32) -> Option<Self> {
        let number = (value & NUMBER_MASK) as u16;
        let class = match value & TAG_MASK {
            0 => SourceClass::Stream,
            FILE_TAG => SourceClass::File,
            _ => return None,
        };
        Self::new(class, number)
    }

    /// True if the scalar carries any bit above the 16-bit number space.
    ///
    /// Only such ids may be removed through the provisioning api.
    pub fn is_tagged_scalar(value: u32) -> bool {
        value & TAG_MASK != 0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_scalar())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_never_an_identity() {
        assert!(ChannelId::new(SourceClass::Stream, 0).is_none());
        assert!(ChannelId::from_scalar(FILE_TAG).is_none());
        assert!(ChannelId::from_scalar(0).is_none());
    }

    #[test]
    fn test_file_scalar_carries_tag() {
        let id = ChannelId::new(SourceClass::File, 1).unwrap();
        assert_eq!(id.to_scalar(), 65537);
        assert_eq!(id.to_string(), "65537");
        assert!(ChannelId::is_tagged_scalar(id.to_scalar()));
    }

    #[test]
    fn test_same_number_different_class_are_distinct() {
        let s = ChannelId::new(SourceClass::Stream, 9).unwrap();
        let f = ChannelId::new(SourceClass::File, 9).unwrap();
        assert_ne!(s, f);
        assert_ne!(s.to_scalar(), f.to_scalar());
        assert!(!ChannelId::is_tagged_scalar(s.to_scalar()));
    }

    #[test]
    fn test_from_scalar_rejects_unknown_tags() {
        assert_eq!(
            ChannelId::from_scalar(65537),
            ChannelId::new(SourceClass::File, 1)
        );
        assert_eq!(
            ChannelId::from_scalar(42),
            ChannelId::new(SourceClass::Stream, 42)
        );
        assert!(ChannelId::from_scalar(0x0002_0001).is_none());
    }
}
