use crate::kind::Kind;
use std::fmt;

/// A set of kinds, one bit per kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeSet(u64);

impl TypeSet {
    pub const EMPTY: TypeSet = TypeSet(0);

    /// Everything a variable can hold. Null, void and unset are states, not values, so they're left out.
    pub const ANY_VALUE: TypeSet = TypeSet::from_kinds(&[
        Kind::Blank,
        Kind::Logic,
        Kind::Integer,
        Kind::Decimal,
        Kind::Char,
        Kind::Tuple,
        Kind::Text,
        Kind::Tag,
        Kind::Word,
        Kind::SetWord,
        Kind::GetWord,
        Kind::Refinement,
        Kind::Block,
        Kind::Group,
        Kind::Path,
        Kind::SetPath,
        Kind::GetPath,
        Kind::Action,
        Kind::Object,
        Kind::Module,
        Kind::Error,
        Kind::Frame,
        Kind::Datatype,
        Kind::Typeset,
        Kind::Handle,
        Kind::Custom,
        Kind::Quoted,
    ]);
    pub const ANY_WORD: TypeSet = TypeSet::from_kinds(&[Kind::Word, Kind::SetWord, Kind::GetWord, Kind::Refinement]);
    pub const ANY_PATH: TypeSet = TypeSet::from_kinds(&[Kind::Path, Kind::SetPath, Kind::GetPath]);
    pub const ANY_ARRAY: TypeSet =
        TypeSet::from_kinds(&[Kind::Block, Kind::Group, Kind::Path, Kind::SetPath, Kind::GetPath]);
    pub const ANY_STRING: TypeSet = TypeSet::from_kinds(&[Kind::Text, Kind::Tag]);
    pub const ANY_SERIES: TypeSet = Self::ANY_ARRAY.union(Self::ANY_STRING);
    pub const ANY_CONTEXT: TypeSet = TypeSet::from_kinds(&[Kind::Object, Kind::Module, Kind::Error, Kind::Frame]);
    pub const ANY_NUMBER: TypeSet = TypeSet::from_kinds(&[Kind::Integer, Kind::Decimal]);
    pub const ANY_SCALAR: TypeSet = Self::ANY_NUMBER.union(TypeSet::from_kinds(&[Kind::Char, Kind::Tuple]));

    pub const fn from_kinds(kinds: &[Kind]) -> TypeSet {
        let mut bits = 0u64;
        let mut index = 0;
        while index < kinds.len() {
            bits |= 1 << kinds[index] as u8;
            index += 1;
        }
        TypeSet(bits)
    }

    pub const fn single(kind: Kind) -> TypeSet {
        TypeSet(1 << kind as u8)
    }

    pub const fn union(self, other: TypeSet) -> TypeSet {
        TypeSet(self.0 | other.0)
    }

    pub const fn contains(self, kind: Kind) -> bool {
        self.0 & (1 << kind as u8) != 0
    }

    pub fn insert(&mut self, kind: Kind) {
        self.0 |= 1 << kind as u8;
    }

    pub fn remove(&mut self, kind: Kind) {
        self.0 &= !(1 << kind as u8);
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// The member kinds, in discriminant order.
    pub fn kinds(self) -> impl Iterator<Item = Kind> {
        Kind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<Kind> for TypeSet {
    fn from_iter<I: IntoIterator<Item = Kind>>(iter: I) -> Self {
        let mut set = TypeSet::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Debug for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_value_excludes_states() {
        assert!(TypeSet::ANY_VALUE.contains(Kind::Integer));
        assert!(TypeSet::ANY_VALUE.contains(Kind::Quoted));
        assert!(!TypeSet::ANY_VALUE.contains(Kind::Null));
        assert!(!TypeSet::ANY_VALUE.contains(Kind::Void));
        assert!(!TypeSet::ANY_VALUE.contains(Kind::Unset));
    }

    #[test]
    fn series_is_arrays_and_strings() {
        assert_eq!(TypeSet::ANY_SERIES.kinds().count(), 7);
        assert!(TypeSet::ANY_SERIES.contains(Kind::Tag));
        assert!(!TypeSet::ANY_SERIES.contains(Kind::Word));
    }

    #[test]
    fn collects_from_kinds() {
        let set: TypeSet = [Kind::Integer, Kind::Null].into_iter().collect();
        assert!(set.contains(Kind::Null));
        assert_eq!(set, TypeSet::single(Kind::Integer).union(TypeSet::single(Kind::Null)));
    }
}
