//! Value comparison.
//!
//! Lax comparison (`=`) treats integers and decimals as numbers, ignores case in text and words,
//! and lets word kinds match each other by spelling. Strict comparison (`==`) also requires the
//! same kind and the exact spelling.

use crate::hooks::HookTable;
use crate::value::Cell;
use ren_value::Kind;
use std::cmp::Ordering;
use std::rc::Rc;

/// Orders two values. `None` means unequal and unordered.
pub fn compare(hooks: &HookTable, a: &Cell, b: &Cell, strict: bool) -> Option<Ordering> {
    if a.quote_depth() != b.quote_depth() {
        return None;
    }
    let (a, b) = (a.dequoted(), b.dequoted());
    let (ka, kb) = (a.kind(), b.kind());
    if ka != kb {
        let numbers = ka.is_number() && kb.is_number();
        let words = ka.is_word() && kb.is_word();
        if strict || !(numbers || words) {
            return None;
        }
    }
    let hook = hooks.for_cell(&a).compare?;
    hook(hooks, &a, &b, strict)
}

pub fn equal(hooks: &HookTable, a: &Cell, b: &Cell, strict: bool) -> bool {
    compare(hooks, a, b, strict) == Some(Ordering::Equal)
}

pub fn compare_unit(_: &HookTable, a: &Cell, b: &Cell, _: bool) -> Option<Ordering> {
    (a.kind() == b.kind()).then_some(Ordering::Equal)
}

pub fn compare_logic(_: &HookTable, a: &Cell, b: &Cell, _: bool) -> Option<Ordering> {
    Some(a.as_logic()?.cmp(&b.as_logic()?))
}

/// Same-kind integers compare exactly; anything mixed goes through `f64`.
pub fn compare_number(_: &HookTable, a: &Cell, b: &Cell, _: bool) -> Option<Ordering> {
    match (a.as_integer(), b.as_integer()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_number()?.partial_cmp(&b.as_number()?),
    }
}

fn fold(ch: char, strict: bool) -> char {
    if strict {
        ch
    } else {
        ch.to_lowercase().next().unwrap_or(ch)
    }
}

pub fn compare_char(_: &HookTable, a: &Cell, b: &Cell, strict: bool) -> Option<Ordering> {
    Some(fold(a.as_char()?, strict).cmp(&fold(b.as_char()?, strict)))
}

pub fn compare_tuple(_: &HookTable, a: &Cell, b: &Cell, _: bool) -> Option<Ordering> {
    Some(a.as_tuple()?.cmp(b.as_tuple()?))
}

pub fn compare_string(_: &HookTable, a: &Cell, b: &Cell, strict: bool) -> Option<Ordering> {
    let (ta, ia) = a.as_string()?;
    let (tb, ib) = b.as_string()?;
    let left = ta.chars_from(ia).into_iter().map(|ch| fold(ch, strict));
    let right = tb.chars_from(ib).into_iter().map(|ch| fold(ch, strict));
    Some(left.cmp(right))
}

/// Words are equal or not; their spellings have no order without the interner.
pub fn compare_word(_: &HookTable, a: &Cell, b: &Cell, strict: bool) -> Option<Ordering> {
    let (sa, sb) = (a.word_symbol()?, b.word_symbol()?);
    let same = if strict { sa == sb } else { sa.same_canon(sb) };
    same.then_some(Ordering::Equal)
}

/// Element by element from each array's index; a shorter array that runs out first is lesser.
pub fn compare_array(hooks: &HookTable, a: &Cell, b: &Cell, strict: bool) -> Option<Ordering> {
    let (aa, ia, _) = a.as_array()?;
    let (ab, ib, _) = b.as_array()?;
    if aa.ptr_eq(ab) && ia == ib {
        return Some(Ordering::Equal);
    }
    let (left, right) = (aa.to_vec_from(ia), ab.to_vec_from(ib));
    for (x, y) in left.iter().zip(right.iter()) {
        match compare(hooks, x, y, strict)? {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(left.len().cmp(&right.len()))
}

/// Contexts of the same kind are equal when their visible keys match in order, with equal values.
///
/// Key order matters: two objects with the same fields declared in a different order are unequal.
pub fn compare_context(hooks: &HookTable, a: &Cell, b: &Cell, strict: bool) -> Option<Ordering> {
    let (ca, cb) = (a.as_context()?, b.as_context()?);
    if ca.ptr_eq(cb) {
        return Some(Ordering::Equal);
    }
    if ca.kind() != cb.kind() {
        return None;
    }
    let (left, right) = (ca.visible(false), cb.visible(false));
    if left.len() != right.len() {
        return None;
    }
    for ((ka, va), (kb, vb)) in left.iter().zip(right.iter()) {
        let same_key = if strict { ka == kb } else { ka.same_canon(*kb) };
        let same_value = match (va.as_context(), vb.as_context()) {
            // no recursion into nested contexts, which may refer back to these
            (Some(x), Some(y)) => x.ptr_eq(y),
            _ => equal(hooks, va, vb, strict),
        };
        if !same_key || !same_value {
            return None;
        }
    }
    Some(Ordering::Equal)
}

pub fn compare_datatype(_: &HookTable, a: &Cell, b: &Cell, _: bool) -> Option<Ordering> {
    (a.as_datatype()? == b.as_datatype()?).then_some(Ordering::Equal)
}

pub fn compare_typeset(_: &HookTable, a: &Cell, b: &Cell, _: bool) -> Option<Ordering> {
    (a.as_typeset()? == b.as_typeset()?).then_some(Ordering::Equal)
}

/// Actions, handles and the like are only ever equal to themselves.
pub fn compare_identity(_: &HookTable, a: &Cell, b: &Cell, _: bool) -> Option<Ordering> {
    let same = match (a.kind(), b.kind()) {
        (Kind::Action, Kind::Action) => a.as_action()?.ptr_eq(b.as_action()?),
        (Kind::Param, Kind::Param) => Rc::ptr_eq(a.as_param()?, b.as_param()?),
        (Kind::Handle, Kind::Handle) => Rc::ptr_eq(a.as_handle()?, b.as_handle()?),
        (Kind::Custom, Kind::Custom) => {
            let ((ta, da), (tb, db)) = (a.as_custom()?, b.as_custom()?);
            ta == tb && Rc::ptr_eq(da, db)
        }
        _ => false,
    };
    same.then_some(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::GcInterface;
    use crate::vm_objects::context::{Context, Keylist};
    use crate::vm_objects::text::Text;
    use ren_core::Interner;

    #[test]
    fn numbers_compare_across_kinds_only_when_lax() {
        let hooks = HookTable::new();
        assert!(equal(&hooks, &Cell::integer(1), &Cell::decimal(1.0), false));
        assert!(!equal(&hooks, &Cell::integer(1), &Cell::decimal(1.0), true));
        assert_eq!(compare(&hooks, &Cell::integer(1), &Cell::decimal(1.5), false), Some(Ordering::Less));
    }

    #[test]
    fn text_case_matters_only_when_strict() {
        let hooks = HookTable::new();
        let (a, b) = (Cell::text(Text::new("Abc")), Cell::text(Text::new("aBC")));
        assert!(equal(&hooks, &a, &b, false));
        assert!(!equal(&hooks, &a, &b, true));
    }

    #[test]
    fn quote_depths_must_match() {
        let hooks = HookTable::new();
        assert!(!equal(&hooks, &Cell::integer(1).quoted(1), &Cell::integer(1), false));
        assert!(equal(&hooks, &Cell::integer(1).quoted(5), &Cell::integer(1).quoted(5), true));
    }

    #[test]
    fn context_equality_depends_on_key_order() {
        let hooks = HookTable::new();
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let (a, b) = (interner.intern("a"), interner.intern("b"));
        let one = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([a, b])), vec![Cell::integer(1), Cell::integer(2)]);
        let same = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([a, b])), vec![Cell::integer(1), Cell::integer(2)]);
        let swapped = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([b, a])), vec![Cell::integer(2), Cell::integer(1)]);

        assert!(equal(&hooks, &Cell::context(one.clone()), &Cell::context(same), true));
        assert!(!equal(&hooks, &Cell::context(one), &Cell::context(swapped), true));
    }
}
