//! Binding words to contexts, and copying arrays without losing what their words refer to.
//!
//! A word bound to a paramlist is *relative*: it names a parameter of some action, and only
//! means something once paired with a running frame of that action. Arrays carry that frame
//! along as their *specifier*. Copying an array resolves its relative words against the
//! specifier, so copies never depend on one.

use crate::binder::Binder;
use crate::gc::GcInterface;
use crate::invokable::ensure_sufficient_stack;
use crate::value::Cell;
use crate::vm_objects::array::Array;
use crate::vm_objects::context::Context;
use ren_value::{Kind, TypeSet};
use std::collections::HashSet;

/// Binds the words of `array` that name keys of `context`. Words bound to a paramlist become relative.
///
/// Paths are always descended into, since their head is a word; blocks and groups only if `deep`.
/// Frozen arrays are left alone.
pub fn bind_deep(binder: &mut Binder, array: &Array, index: usize, context: &Context, phased: bool, deep: bool) {
    let mut guard = binder.begin();
    let keys = context.bindable(phased || context.is_paramlist());
    if keys.is_empty() {
        return;
    }
    for (key_index, symbol) in keys {
        guard.add(symbol, key_index);
    }
    let mut visited = HashSet::new();
    let mut stack = vec![(array.clone(), index)];
    while let Some((array, index)) = stack.pop() {
        if array.is_frozen() || !visited.insert(array.addr()) {
            continue;
        }
        for (offset, mut cell) in array.to_vec_from(index).into_iter().enumerate() {
            if cell.kind() == Kind::Quoted {
                continue;
            }
            if cell.kind().is_word() && cell.kind() != Kind::Refinement {
                let Some(symbol) = cell.word_symbol() else { continue };
                if let Some(key_index) = guard.get(symbol) {
                    cell.bind_word(context.clone(), key_index);
                    let _ = array.set(index + offset, cell);
                }
            } else if let Some((inner, inner_index, _)) = cell.as_array() {
                if cell.kind().is_path() || deep {
                    stack.push((inner.clone(), inner_index));
                }
            }
        }
    }
}

/// Moves words bound to `from` over to `to`, at the same index. Used when a derived context is
/// copied from its parent, whose keys it starts with.
pub fn rebind_deep(array: &Array, from: &Context, to: &Context) {
    let mut visited = HashSet::new();
    let mut stack = vec![array.clone()];
    while let Some(array) = stack.pop() {
        if array.is_frozen() || !visited.insert(array.addr()) {
            continue;
        }
        for (position, mut cell) in array.to_vec_from(0).into_iter().enumerate() {
            if cell.kind() == Kind::Quoted {
                continue;
            }
            if let Some((context, index)) = cell.word_binding() {
                if context.ptr_eq(from) {
                    cell.bind_word(to.clone(), index);
                    let _ = array.set(position, cell);
                }
            } else if let Some((inner, _, _)) = cell.as_array() {
                stack.push(inner.clone());
            }
        }
    }
}

/// Resolves a cell against a specifier: relative words become bound to the frame, arrays
/// without a specifier of their own pick this one up.
pub fn derelativize(cell: &Cell, specifier: Option<&Context>) -> Cell {
    let Some(specifier) = specifier else {
        return cell.clone();
    };
    let mut out = cell.clone();
    if let Some((binding, index)) = cell.word_binding() {
        if binding.is_paramlist() && specifier.specifies(binding) {
            out.bind_word(specifier.clone(), index);
        }
    } else if let Some((_, _, None)) = cell.as_array() {
        out.set_specifier(Some(specifier.clone()));
    }
    out
}

/// Where a word leads: the context and index of its variable.
///
/// `None` for unbound words, and for relative words with no matching frame.
pub fn resolve_word(cell: &Cell, specifier: Option<&Context>) -> Option<(Context, usize)> {
    let (binding, index) = cell.word_binding()?;
    if binding.is_paramlist() {
        let frame = specifier.filter(|frame| frame.specifies(binding))?;
        return Some((frame.clone(), index));
    }
    Some((binding.clone(), index))
}

/// Copies an array from `index` on, resolving relative words against `specifier`. With `deep`,
/// nested arrays are copied too; otherwise they are shared and pick up the specifier.
pub fn copy_array_deep(gc: &mut GcInterface, array: &Array, index: usize, specifier: Option<&Context>, deep: bool) -> Array {
    let mut active = Vec::new();
    copy_array_inner(gc, array, index, specifier, deep, &mut active)
}

fn copy_array_inner(
    gc: &mut GcInterface,
    array: &Array,
    index: usize,
    specifier: Option<&Context>,
    deep: bool,
    active: &mut Vec<usize>,
) -> Array {
    active.push(array.addr());
    let mut cells = Vec::with_capacity(array.len().saturating_sub(index));
    for cell in array.to_vec_from(index) {
        let nested = match cell.as_array() {
            Some((inner, inner_index, inner_specifier)) if deep && cell.kind() != Kind::Quoted && !active.contains(&inner.addr()) => {
                Some((inner.clone(), inner_index, inner_specifier.cloned()))
            }
            _ => None,
        };
        match nested {
            Some((inner, inner_index, inner_specifier)) => {
                let specifier = inner_specifier.as_ref().or(specifier);
                let copy = ensure_sufficient_stack(|| copy_array_inner(gc, &inner, inner_index, specifier, deep, active));
                let mut out = cell.clone();
                out.replace_array(copy, 0, None);
                cells.push(out);
            }
            None => cells.push(derelativize(&cell, specifier)),
        }
    }
    active.pop();
    gc.alloc_array_at(cells, array.file(), array.line())
}

/// Copies a value. Series whose kind is in `deep` get fresh storage, arrays recursively.
pub fn copy_value(gc: &mut GcInterface, cell: &Cell, deep: TypeSet) -> Cell {
    if cell.kind() == Kind::Quoted || !deep.contains(cell.kind()) {
        return cell.clone();
    }
    if let Some((array, index, specifier)) = cell.as_array() {
        let copy = copy_array_deep(gc, array, index, specifier, true);
        let mut out = cell.clone();
        out.replace_array(copy, 0, None);
        return out;
    }
    if let Some((text, index)) = cell.as_string() {
        let copy = text.copy_from(index);
        let mut out = cell.clone();
        out.replace_text(copy, 0);
        return out;
    }
    cell.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm_objects::context::{ContextFlags, Keylist};
    use ren_core::Interner;
    use std::rc::Rc;

    #[test]
    fn binds_words_naming_keys_and_leaves_the_rest() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let (a, b) = (interner.intern("a"), interner.intern("b"));
        let context = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([a])), vec![Cell::integer(1)]);
        let inner = gc.alloc_array(vec![Cell::word(Kind::Word, a)]);
        let array = gc.alloc_array(vec![Cell::word(Kind::SetWord, a), Cell::word(Kind::Word, b), Cell::array(Kind::Block, inner.clone())]);

        let mut binder = Binder::new();
        bind_deep(&mut binder, &array, 0, &context, false, false);
        assert!(array.get(0).unwrap().word_binding().is_some());
        assert!(array.get(1).unwrap().word_binding().is_none());
        assert!(inner.get(0).unwrap().word_binding().is_none());

        bind_deep(&mut binder, &array, 0, &context, false, true);
        assert!(inner.get(0).unwrap().word_binding().is_some());
        assert!(binder.is_clear());
    }

    #[test]
    fn relative_words_need_a_matching_frame() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let x = interner.intern("x");
        let keylist = Rc::new(Keylist::new([x]));
        let paramlist = Context::alloc_with(&mut gc, Kind::Frame, keylist.clone(), vec![Cell::null()]);
        paramlist.set_flag(ContextFlags::PARAMLIST, true);
        let body = gc.alloc_array(vec![Cell::word(Kind::Word, x)]);
        bind_deep(&mut Binder::new(), &body, 0, &paramlist, false, true);

        let word = body.get(0).unwrap();
        assert!(resolve_word(&word, None).is_none());

        let frame = Context::alloc_with(&mut gc, Kind::Frame, keylist, vec![Cell::integer(7)]);
        let (context, index) = resolve_word(&word, Some(&frame)).unwrap();
        assert_eq!(context.var(index).and_then(|cell| cell.as_integer()), Some(7));

        let copy = copy_array_deep(&mut gc, &body, 0, Some(&frame), true);
        let copied = copy.get(0).unwrap();
        assert!(copied.word_binding().unwrap().0.ptr_eq(&frame));
    }
}
