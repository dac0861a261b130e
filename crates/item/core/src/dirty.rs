use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Facets of an item that changed since its last write-back.
    ///
    /// Marks for the same item accumulate with bitwise OR until the item is
    /// flushed. Contributors declare a mask of these bits and are only asked
    /// for a fragment when their mask intersects the accumulated kind.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DirtyKind: u32 {
        const CORE      = 1 << 0;
        const VARIABLES = 1 << 1;
        const CONSTANTS = 1 << 2;
        const TAGS      = 1 << 3;
        const MODIFIERS = 1 << 4;
        const STATS     = 1 << 5;
        const EFFECTS   = 1 << 6;
        const SLOTS     = 1 << 7;
        const ALL       = 0xFFFF;
    }
}

impl DirtyKind {
    /// Facets touched when an item first shows up.
    pub const ADDED: Self = Self::CORE
        .union(Self::TAGS)
        .union(Self::VARIABLES)
        .union(Self::MODIFIERS)
        .union(Self::SLOTS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_accumulate() {
        let mut kind = DirtyKind::TAGS;
        kind |= DirtyKind::CORE;
        assert!(kind.contains(DirtyKind::TAGS | DirtyKind::CORE));
        assert!(!kind.intersects(DirtyKind::STATS));
    }

    #[test]
    fn test_all_covers_every_facet() {
        assert!(DirtyKind::ALL.contains(DirtyKind::ADDED));
        assert!(DirtyKind::ALL.contains(DirtyKind::STATS | DirtyKind::EFFECTS));
        assert_eq!(DirtyKind::ALL.bits(), 0xFFFF);
        assert!(!DirtyKind::ADDED.contains(DirtyKind::STATS));
    }
}
