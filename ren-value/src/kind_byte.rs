use crate::kind::Kind;

/// Distance between two quoting levels in the header byte.
pub const QUOTE_STEP: u8 = 64;

/// Deepest quoting level that fits in the header byte itself. Past this the cell needs an out-of-line box.
pub const MAX_INSITU_QUOTES: usize = 3;

/// The kind byte of a cell header: a base kind plus up to three levels of quoting.
///
/// `'''x` and `x` share a payload; only this byte differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindByte(u8);

static_assertions::const_assert!((Kind::COUNT as u8) <= QUOTE_STEP);
static_assertions::const_assert!((MAX_INSITU_QUOTES as u16 + 1) * QUOTE_STEP as u16 <= 256);

impl KindByte {
    pub const fn new(kind: Kind) -> Self {
        Self(kind as u8)
    }

    /// Builds a byte for `kind` at `depth` in-situ quotes.
    pub fn with_depth(kind: Kind, depth: usize) -> Option<Self> {
        if depth > MAX_INSITU_QUOTES || (kind == Kind::Quoted && depth > 0) {
            return None;
        }
        Some(Self(kind as u8 + QUOTE_STEP * depth as u8))
    }

    /// The unquoted base kind.
    pub fn kind(self) -> Kind {
        let base = self.0 % QUOTE_STEP;
        // `with_depth` and `new` only ever produce bytes with a valid base.
        Kind::ALL[usize::from(base)]
    }

    /// How many in-situ quotes this byte encodes.
    pub fn depth(self) -> usize {
        usize::from(self.0 / QUOTE_STEP)
    }

    /// Adds `n` quotes. `None` if the result would not fit in the header.
    pub fn quoted(self, n: usize) -> Option<Self> {
        Self::with_depth(self.kind(), self.depth() + n)
    }

    /// Removes `n` quotes. `None` if the byte holds fewer than `n`.
    pub fn unquoted(self, n: usize) -> Option<Self> {
        let depth = self.depth().checked_sub(n)?;
        Self::with_depth(self.kind(), depth)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<Kind> for KindByte {
    fn from(kind: Kind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_only_touches_the_high_bits() {
        let byte = KindByte::new(Kind::Word);
        let quoted = byte.quoted(2).unwrap();
        assert_eq!(quoted.kind(), Kind::Word);
        assert_eq!(quoted.depth(), 2);
        assert_eq!(quoted.as_u8(), Kind::Word as u8 + 2 * QUOTE_STEP);
        assert_eq!(quoted.unquoted(2), Some(byte));
    }

    #[test]
    fn fourth_quote_does_not_fit() {
        let byte = KindByte::new(Kind::Integer).quoted(3).unwrap();
        assert_eq!(byte.depth(), MAX_INSITU_QUOTES);
        assert_eq!(byte.quoted(1), None);
    }

    #[test]
    fn cannot_unquote_past_zero() {
        let byte = KindByte::new(Kind::Block).quoted(1).unwrap();
        assert_eq!(byte.unquoted(2), None);
        assert_eq!(byte.unquoted(1).map(KindByte::depth), Some(0));
    }

    #[test]
    fn boxed_quotes_never_quote_in_situ() {
        assert_eq!(KindByte::with_depth(Kind::Quoted, 1), None);
        assert!(KindByte::with_depth(Kind::Quoted, 0).is_some());
    }
}
