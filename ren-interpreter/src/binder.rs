use crate::invokable::ensure_sufficient_stack;
use crate::vm_objects::array::Array;
use crate::vm_objects::context::ContextError;
use bitflags::bitflags;
use ren_value::{Kind, Symbol};
use std::collections::{HashMap, HashSet};

/// Scratch map from spelling to index, shared by every bind and collect operation of a universe.
///
/// Marks are only ever set through a [`BinderGuard`], which clears them when dropped, so a failed
/// operation can't leave stale marks behind for the next one.
#[derive(Debug, Default)]
pub struct Binder {
    marks: HashMap<Symbol, usize>,
}

impl Binder {
    pub fn new() -> Binder {
        Self::default()
    }

    /// Starts a bind or collect. The marks are cleared when the guard goes away.
    pub fn begin(&mut self) -> BinderGuard<'_> {
        debug_assert!(self.marks.is_empty(), "binder still holds marks from an earlier operation");
        BinderGuard { binder: self }
    }

    pub fn is_clear(&self) -> bool {
        self.marks.is_empty()
    }
}

pub struct BinderGuard<'a> {
    binder: &'a mut Binder,
}

impl BinderGuard<'_> {
    /// Marks a spelling. Returns false if it was already marked.
    pub fn add(&mut self, symbol: Symbol, index: usize) -> bool {
        match self.binder.marks.entry(symbol.canon()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(index);
                true
            }
        }
    }

    pub fn get(&self, symbol: Symbol) -> Option<usize> {
        self.binder.marks.get(&symbol.canon()).copied()
    }

    pub fn remove(&mut self, symbol: Symbol) -> Option<usize> {
        self.binder.marks.remove(&symbol.canon())
    }
}

impl Drop for BinderGuard<'_> {
    fn drop(&mut self) {
        self.binder.marks.clear();
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CollectFlags: u8 {
        /// Descend into nested blocks and groups.
        const DEEP = 1 << 0;
        /// Only `set-word:`s count.
        const SET_WORDS_ONLY = 1 << 1;
        /// Every word kind counts.
        const ANY_WORDS = 1 << 2;
    }
}

/// What collecting does when it meets a spelling twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupPolicy {
    Fail,
    Tolerate,
}

/// Gathers the spellings a block would define, in order of first appearance.
///
/// `prior` keys come first and are never reported as duplicates; `ignore` spellings are left out.
pub fn collect_keys(
    binder: &mut Binder,
    array: &Array,
    index: usize,
    prior: &[Symbol],
    flags: CollectFlags,
    policy: DupPolicy,
    ignore: &[Symbol],
) -> Result<Vec<Symbol>, ContextError> {
    let mut guard = binder.begin();
    let mut keys = Vec::with_capacity(prior.len());
    for symbol in prior.iter().chain(ignore) {
        guard.add(*symbol, 0);
    }
    keys.extend_from_slice(prior);

    let mut visited = HashSet::new();
    collect_inner(&mut guard, array, index, flags, policy, &mut keys, &mut visited)?;
    Ok(keys)
}

fn collect_inner(
    guard: &mut BinderGuard<'_>,
    array: &Array,
    index: usize,
    flags: CollectFlags,
    policy: DupPolicy,
    keys: &mut Vec<Symbol>,
    visited: &mut HashSet<usize>,
) -> Result<(), ContextError> {
    if !visited.insert(array.addr()) {
        return Ok(());
    }
    for cell in array.to_vec_from(index) {
        if cell.is_quoted() {
            continue;
        }
        let kind = cell.kind();
        if kind.is_word() {
            if !counts(kind, flags) {
                continue;
            }
            if let Some(symbol) = cell.word_symbol() {
                if guard.add(symbol, keys.len() + 1) {
                    keys.push(symbol);
                } else if policy == DupPolicy::Fail && guard.get(symbol) != Some(0) {
                    // prior and ignored spellings are marked 0 and may reappear
                    return Err(ContextError::Duplicate(symbol));
                }
            }
        } else if kind.is_path() || (flags.contains(CollectFlags::DEEP) && matches!(kind, Kind::Block | Kind::Group)) {
            if let Some((inner, inner_index, _)) = cell.as_array() {
                ensure_sufficient_stack(|| collect_inner(guard, inner, inner_index, flags, policy, keys, visited))?;
            }
        }
    }
    Ok(())
}

fn counts(kind: Kind, flags: CollectFlags) -> bool {
    if flags.contains(CollectFlags::ANY_WORDS) {
        true
    } else if flags.contains(CollectFlags::SET_WORDS_ONLY) {
        kind == Kind::SetWord
    } else {
        matches!(kind, Kind::SetWord | Kind::Word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::GcInterface;
    use crate::value::Cell;
    use ren_core::Interner;

    fn block(gc: &mut GcInterface, interner: &mut Interner, words: &[(Kind, &str)]) -> Array {
        let cells = words.iter().map(|(kind, name)| Cell::word(*kind, interner.intern(name))).collect();
        gc.alloc_array(cells)
    }

    #[test]
    fn collects_set_words_in_order() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let array = block(&mut gc, &mut interner, &[(Kind::SetWord, "b"), (Kind::Word, "x"), (Kind::SetWord, "a")]);
        let mut binder = Binder::new();
        let keys = collect_keys(&mut binder, &array, 0, &[], CollectFlags::SET_WORDS_ONLY, DupPolicy::Fail, &[]).unwrap();
        let names: Vec<_> = keys.iter().map(|symbol| interner.reverse_lookup(*symbol)).collect();
        assert_eq!(names, ["b", "a"]);
        assert!(binder.is_clear());
    }

    #[test]
    fn duplicates_fail_and_leave_the_binder_clean() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let bad = block(&mut gc, &mut interner, &[(Kind::SetWord, "a"), (Kind::SetWord, "A")]);
        let mut binder = Binder::new();
        let result = collect_keys(&mut binder, &bad, 0, &[], CollectFlags::SET_WORDS_ONLY, DupPolicy::Fail, &[]);
        assert!(matches!(result, Err(ContextError::Duplicate(_))));
        assert!(binder.is_clear());

        let good = block(&mut gc, &mut interner, &[(Kind::SetWord, "a")]);
        let keys = collect_keys(&mut binder, &good, 0, &[], CollectFlags::SET_WORDS_ONLY, DupPolicy::Fail, &[]).unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn prior_keys_are_kept_and_not_duplicates() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let a = interner.intern("a");
        let array = block(&mut gc, &mut interner, &[(Kind::SetWord, "a"), (Kind::SetWord, "c")]);
        let mut binder = Binder::new();
        let keys = collect_keys(&mut binder, &array, 0, &[a], CollectFlags::SET_WORDS_ONLY, DupPolicy::Fail, &[]).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], a);
    }
}
