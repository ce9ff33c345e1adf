use std::fmt::{self, Display};
use std::num::NonZeroU32;

/// Bits reserved for the spelling variant of a symbol.
const VARIANT_BITS: u32 = 8;

/// Most spellings a single canon can have, besides the canon itself.
pub const MAX_VARIANTS: u32 = (1 << VARIANT_BITS) - 1;

/// An interned spelling.
///
/// Spellings that differ only by case share a canon. The canon index lives in the high bits and
/// the spelling variant in the low ones, so case-insensitive comparison never needs the interner.
///
/// Fast to move, clone and compare, and never zero, so `Option<Symbol>` is free.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Symbol(NonZeroU32);

impl Symbol {
    /// Builds a symbol from a canon slot and a spelling variant (0 = the canon spelling itself).
    pub fn new(canon_index: u32, variant: u32) -> Option<Symbol> {
        if variant > MAX_VARIANTS {
            return None;
        }
        let raw = canon_index.checked_add(1)?.checked_mul(1 << VARIANT_BITS)? | variant;
        NonZeroU32::new(raw).map(Symbol)
    }

    /// The canon index, i.e. which case-folded spelling this belongs to.
    pub fn canon_index(self) -> u32 {
        (self.0.get() >> VARIANT_BITS) - 1
    }

    pub fn variant(self) -> u32 {
        self.0.get() & MAX_VARIANTS
    }

    /// The canon symbol, the spelling that was interned first for this case-folded form.
    pub fn canon(self) -> Symbol {
        // high bits are never zero, so this stays non-zero
        Symbol(NonZeroU32::new(self.0.get() & !MAX_VARIANTS).unwrap_or(self.0))
    }

    pub fn is_canon(self) -> bool {
        self.variant() == 0
    }

    /// Case-insensitive equality.
    pub fn same_canon(self, other: Symbol) -> bool {
        self.canon() == other.canon()
    }

    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

// we pretty much never want this, and instead to print the associated string.
impl Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.canon_index(), self.variant())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canon_clears_the_variant() {
        let canon = Symbol::new(7, 0).unwrap();
        let variant = Symbol::new(7, 3).unwrap();

        assert_ne!(canon, variant);
        assert!(canon.same_canon(variant));
        assert_eq!(variant.canon(), canon);
        assert_eq!(variant.canon_index(), 7);
        assert_eq!(variant.variant(), 3);
        assert!(canon.is_canon());
    }

    #[test]
    fn variants_are_bounded() {
        assert!(Symbol::new(0, MAX_VARIANTS).is_some());
        assert!(Symbol::new(0, MAX_VARIANTS + 1).is_none());
    }

    #[test]
    fn option_is_free() {
        assert_eq!(std::mem::size_of::<Option<Symbol>>(), 4);
    }
}
