use indexmap::IndexMap;
use ren_value::symbol::{Symbol, MAX_VARIANTS};

/// The interner for spellings.
///
/// Spellings are grouped under their case-folded form. The first spelling seen for a form is its
/// canon; later spellings that differ only by case become variants of it.
#[derive(Debug, Default)]
pub struct Interner {
    /// Case-folded form to the spellings seen for it, canon first.
    canons: IndexMap<Box<str>, Vec<Box<str>>>,
}

impl Interner {
    /// Initialize the interner with the given capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self { canons: IndexMap::with_capacity(cap) }
    }

    /// Intern a spelling, returning its symbol. Interning is idempotent.
    pub fn intern(&mut self, spelling: &str) -> Symbol {
        let folded = spelling.to_lowercase();
        let canon_index = match self.canons.get_index_of(folded.as_str()) {
            Some(index) => index,
            None => self.canons.insert_full(folded.into_boxed_str(), Vec::with_capacity(1)).0,
        };
        let spellings = &mut self.canons[canon_index];

        let variant = match spellings.iter().position(|known| known.as_ref() == spelling) {
            Some(position) => position,
            None if spellings.len() as u32 > MAX_VARIANTS => {
                log::warn!("too many spellings of `{}`, falling back to its canon", spelling);
                0
            }
            None => {
                spellings.push(spelling.into());
                spellings.len() - 1
            }
        };

        Self::symbol_at(canon_index, variant)
    }

    /// Search for a spelling in this interner, without interning it.
    pub fn lookup(&self, spelling: &str) -> Option<Symbol> {
        let (canon_index, _, spellings) = self.canons.get_full(spelling.to_lowercase().as_str())?;
        let variant = spellings.iter().position(|known| known.as_ref() == spelling)?;
        Some(Self::symbol_at(canon_index, variant))
    }

    /// Search for any spelling of this word, ignoring case. Returns the canon.
    pub fn lookup_canon(&self, spelling: &str) -> Option<Symbol> {
        let canon_index = self.canons.get_index_of(spelling.to_lowercase().as_str())?;
        Some(Self::symbol_at(canon_index, 0))
    }

    /// Get the spelling associated with a symbol.
    pub fn reverse_lookup(&self, symbol: Symbol) -> &str {
        self.canons
            .get_index(symbol.canon_index() as usize)
            .and_then(|(_, spellings)| spellings.get(symbol.variant() as usize).or_else(|| spellings.first()))
            .map(AsRef::as_ref)
            .unwrap_or("")
    }

    /// Number of distinct case-folded forms.
    pub fn len(&self) -> usize {
        self.canons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canons.is_empty()
    }

    /// Number of distinct spellings, all variants included.
    pub fn spelling_count(&self) -> usize {
        self.canons.values().map(Vec::len).sum()
    }

    fn symbol_at(canon_index: usize, variant: usize) -> Symbol {
        match Symbol::new(canon_index as u32, variant as u32) {
            Some(symbol) => symbol,
            None => panic!("symbol table exhausted at {} canons", canon_index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = Interner::with_capacity(8);
        let first = interner.intern("append");
        let second = interner.intern("append");
        assert_eq!(first, second);
        assert_eq!(interner.reverse_lookup(first), "append");
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn case_variants_share_a_canon() {
        let mut interner = Interner::default();
        let lower = interner.intern("foo");
        let upper = interner.intern("FOO");
        let mixed = interner.intern("Foo");

        assert_ne!(lower, upper);
        assert!(lower.same_canon(upper));
        assert!(mixed.same_canon(lower));
        assert!(lower.is_canon());
        assert_eq!(upper.canon(), lower);
        assert_eq!(interner.reverse_lookup(upper), "FOO");
        assert_eq!(interner.len(), 1);
        assert_eq!(interner.spelling_count(), 3);
    }

    #[test]
    fn lookup_does_not_intern() {
        let mut interner = Interner::default();
        assert_eq!(interner.lookup("bar"), None);
        let bar = interner.intern("bar");
        assert_eq!(interner.lookup("bar"), Some(bar));
        assert_eq!(interner.lookup("BAR"), None);
        assert_eq!(interner.lookup_canon("BAR"), Some(bar));
    }
}
