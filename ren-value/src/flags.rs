use bitflags::bitflags;

bitflags! {
    /// Per-cell header flags.
    ///
    /// The first four belong to the slot, not to the value in it: they survive when a value is
    /// moved into the cell, and are never copied out of it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u16 {
        /// Writes through this slot are refused.
        const PROTECTED = 1 << 0;
        /// The slot is owned by a managed series.
        const MANAGED = 1 << 1;
        /// The slot is a root kept alive by the host.
        const ROOT = 1 << 2;
        /// Scratch mark used while walking reachable values.
        const MARKED = 1 << 3;

        /// The value is read-only through this reference.
        const CONST = 1 << 4;
        /// The value came straight from source without being evaluated.
        const UNEVALUATED = 1 << 5;
        /// General purpose note bit, meaning depends on who set it.
        const NOTE = 1 << 6;
        /// The scanner saw a line break before this value.
        const NEWLINE_BEFORE = 1 << 7;
        /// An action that takes its first argument from the left.
        const ENFIXED = 1 << 8;

        /// Flags that stay with the slot across a move.
        const PERSISTENT = Self::PROTECTED.bits() | Self::MANAGED.bits() | Self::ROOT.bits() | Self::MARKED.bits();
    }
}

impl CellFlags {
    /// Computes the header flags for a slot receiving a value that carried `incoming`.
    ///
    /// The destination keeps its persistent flags, the source contributes everything else.
    /// `UNEVALUATED` is dropped unless asked for.
    pub fn merge_for_move(self, incoming: CellFlags, keep_unevaluated: bool) -> CellFlags {
        let mut content = incoming - CellFlags::PERSISTENT;
        if !keep_unevaluated {
            content.remove(CellFlags::UNEVALUATED);
        }
        (self & CellFlags::PERSISTENT) | content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_keeps_destination_persistent_flags() {
        let dest = CellFlags::PROTECTED | CellFlags::NEWLINE_BEFORE;
        let src = CellFlags::ENFIXED | CellFlags::MARKED | CellFlags::UNEVALUATED;

        let merged = dest.merge_for_move(src, false);
        assert_eq!(merged, CellFlags::PROTECTED | CellFlags::ENFIXED);

        let merged = dest.merge_for_move(src, true);
        assert_eq!(merged, CellFlags::PROTECTED | CellFlags::ENFIXED | CellFlags::UNEVALUATED);
    }
}
