use crate::gc::GcInterface;
use crate::value::Cell;
use crate::vm_objects::action::Action;
use bitflags::bitflags;
use ren_core::{Series, SeriesError, SeriesFlags};
use ren_value::{CellFlags, Kind, Symbol, TypeSet};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of a context. Frames are identified by the id of their varlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyFlags: u8 {
        /// Invisible to lookups, enumeration and comparison.
        const HIDDEN = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub symbol: Symbol,
    pub flags: KeyFlags,
}

/// The ordered field names of a context.
///
/// A keylist can be shared by any number of varlists. It is only ever extended in place while a
/// single context owns it; otherwise the extending context forks a private copy that remembers
/// where it came from.
pub struct Keylist {
    id: u64,
    keys: Series<Key>,
    /// Ids of the keylists this one was forked from, nearest first.
    ancestors: Vec<u64>,
}

impl Keylist {
    pub fn new(symbols: impl IntoIterator<Item = Symbol>) -> Keylist {
        let keys = symbols.into_iter().map(|symbol| Key { symbol, flags: KeyFlags::empty() }).collect();
        Keylist { id: next_id(), keys, ancestors: Vec::new() }
    }

    /// An empty keylist with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Keylist {
        Keylist { id: next_id(), keys: Series::with_capacity(capacity, SeriesFlags::empty()), ancestors: Vec::new() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// How many keys fit before the keylist has to grow.
    pub fn capacity(&self) -> usize {
        self.keys.capacity()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key for var slot `index` (1-based, slot 0 being the archetype).
    pub fn key(&self, index: usize) -> Option<Key> {
        index.checked_sub(1).and_then(|offset| self.keys.get(offset)).copied()
    }

    pub fn keys(&self) -> &[Key] {
        self.keys.as_slice()
    }

    /// Whether this keylist is `other`, or was forked from it.
    pub fn derives_from(&self, other: &Keylist) -> bool {
        self.id == other.id || self.ancestors.contains(&other.id)
    }

    /// A fork of this keylist with more keys on the end. Words bound to this one stay valid in it.
    pub fn extended(&self, symbols: impl IntoIterator<Item = Symbol>) -> Result<Keylist, SeriesError> {
        let mut forked = self.forked();
        for symbol in symbols {
            forked.keys.push(Key { symbol, flags: KeyFlags::empty() })?;
        }
        Ok(forked)
    }

    fn forked(&self) -> Keylist {
        log::trace!("forking shared keylist {}", self.id);
        let mut ancestors = Vec::with_capacity(self.ancestors.len() + 1);
        ancestors.push(self.id);
        ancestors.extend_from_slice(&self.ancestors);
        Keylist { id: next_id(), keys: self.keys.copy_with(SeriesFlags::empty()), ancestors }
    }
}

/// Cloning a keylist forks it: the clone gets its own identity and records this one as an ancestor.
impl Clone for Keylist {
    fn clone(&self) -> Self {
        self.forked()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextFlags: u8 {
        /// The vars were torn down; every access fails.
        const EXPIRED = 1 << 0;
        /// The parameter list of an action. Words bound here are relative.
        const PARAMLIST = 1 << 1;
        /// A frame whose vars were handed to a call. It can't be invoked again.
        const STOLEN = 1 << 2;
        /// A frame currently on the call stack.
        const LIVE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("duplicate key")]
    Duplicate(Symbol),
    #[error("variable is protected")]
    Protected(Symbol),
    #[error("context has expired")]
    Expired,
    #[error("no variable at index {0}")]
    OutOfRange(usize),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

pub struct ContextData {
    id: ContextId,
    kind: Kind,
    /// Slot 0 is the archetype, slots 1..=n line up with the keys.
    varlist: RefCell<Series<Cell>>,
    keylist: RefCell<Rc<Keylist>>,
    flags: std::cell::Cell<ContextFlags>,
}

/// An object, module, error or frame: a varlist paired with a keylist.
#[derive(Clone)]
pub struct Context(Rc<ContextData>);

impl Context {
    /// Allocates a context with no keys, with room for `capacity` of them.
    pub fn alloc(gc: &mut GcInterface, kind: Kind, capacity: usize) -> Context {
        Self::alloc_reserving(gc, kind, Rc::new(Keylist::with_capacity(capacity)), Vec::new(), capacity)
    }

    /// Allocates a context over an existing keylist. `vars` must line up with the keys.
    pub fn alloc_with(gc: &mut GcInterface, kind: Kind, keylist: Rc<Keylist>, vars: Vec<Cell>) -> Context {
        Self::alloc_reserving(gc, kind, keylist, vars, 0)
    }

    fn alloc_reserving(gc: &mut GcInterface, kind: Kind, keylist: Rc<Keylist>, vars: Vec<Cell>, extra: usize) -> Context {
        debug_assert_eq!(keylist.len(), vars.len());
        let mut varlist = Vec::with_capacity(vars.len() + extra + 1);
        varlist.push(Cell::archetype(kind, None, None));
        varlist.extend(vars);
        let context = Context(Rc::new(ContextData {
            id: ContextId(next_id()),
            kind,
            varlist: RefCell::new(Series::from_vec(varlist, SeriesFlags::ARRAY | SeriesFlags::MANAGED)),
            keylist: RefCell::new(keylist),
            flags: std::cell::Cell::new(ContextFlags::empty()),
        }));
        gc.track_context(&context);
        context
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextData> {
        Rc::downgrade(&self.0)
    }

    pub fn id(&self) -> ContextId {
        self.0.id
    }

    pub fn kind(&self) -> Kind {
        self.0.kind
    }

    /// Number of keys, hidden ones included.
    pub fn len(&self) -> usize {
        self.0.keylist.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many vars fit before the varlist has to grow.
    pub fn capacity(&self) -> usize {
        self.0.varlist.borrow().capacity().saturating_sub(1)
    }

    pub fn flags(&self) -> ContextFlags {
        self.0.flags.get()
    }

    pub fn has_flag(&self, flag: ContextFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn set_flag(&self, flag: ContextFlags, on: bool) {
        let mut flags = self.flags();
        flags.set(flag, on);
        self.0.flags.set(flags);
    }

    pub fn is_paramlist(&self) -> bool {
        self.has_flag(ContextFlags::PARAMLIST)
    }

    pub fn keylist(&self) -> Rc<Keylist> {
        self.0.keylist.borrow().clone()
    }

    pub fn shares_keylist(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.0.keylist.borrow(), &other.0.keylist.borrow())
    }

    /// Whether words bound relative to `paramlist` can be looked up in this frame.
    pub fn specifies(&self, paramlist: &Context) -> bool {
        self.0.keylist.borrow().derives_from(&paramlist.0.keylist.borrow())
    }

    pub fn key(&self, index: usize) -> Option<Key> {
        self.0.keylist.borrow().key(index)
    }

    pub fn symbol(&self, index: usize) -> Option<Symbol> {
        self.key(index).map(|key| key.symbol)
    }

    pub fn var(&self, index: usize) -> Option<Cell> {
        if index == 0 {
            return None;
        }
        self.0.varlist.borrow().get(index).cloned()
    }

    /// Writes a variable, honoring protection.
    pub fn set_var(&self, index: usize, value: &Cell) -> Result<(), ContextError> {
        if self.has_flag(ContextFlags::EXPIRED) {
            return Err(ContextError::Expired);
        }
        let mut varlist = self.0.varlist.borrow_mut();
        if index == 0 || index >= varlist.len() {
            return Err(ContextError::OutOfRange(index));
        }
        let slot = varlist.get_mut(index)?;
        if slot.has_flag(CellFlags::PROTECTED) {
            drop(varlist);
            let symbol = self.symbol(index).ok_or(ContextError::OutOfRange(index))?;
            return Err(ContextError::Protected(symbol));
        }
        slot.move_from(value, false);
        Ok(())
    }

    /// Writes a variable regardless of protection. For setting up contexts, not for user code.
    pub fn init_var(&self, index: usize, value: &Cell) -> Result<(), ContextError> {
        let mut varlist = self.0.varlist.borrow_mut();
        if index == 0 {
            return Err(ContextError::OutOfRange(index));
        }
        varlist.get_mut(index)?.move_from(value, false);
        Ok(())
    }

    pub fn protect(&self, index: usize, on: bool) -> Result<(), ContextError> {
        let mut varlist = self.0.varlist.borrow_mut();
        let slot = varlist.get_mut(index)?;
        if on {
            slot.set_flag(CellFlags::PROTECTED);
        } else {
            slot.clear_flag(CellFlags::PROTECTED);
        }
        Ok(())
    }

    pub fn is_protected(&self, index: usize) -> bool {
        self.0.varlist.borrow().get(index).is_some_and(|slot| slot.has_flag(CellFlags::PROTECTED))
    }

    /// Hides a key from lookups and enumeration. The var keeps its value.
    pub fn hide(&self, index: usize) -> Result<(), ContextError> {
        let mut keylist = self.0.keylist.borrow_mut();
        let keylist = Self::unique_keylist(&mut keylist);
        let offset = index.checked_sub(1).ok_or(ContextError::OutOfRange(index))?;
        keylist.keys.get_mut(offset)?.flags.insert(KeyFlags::HIDDEN);
        Ok(())
    }

    /// The slot 0 phase and binding.
    pub fn phase(&self) -> Option<Action> {
        self.0.varlist.borrow().get(0).and_then(|archetype| archetype.archetype_parts().and_then(|(phase, _)| phase.cloned()))
    }

    pub fn binding(&self) -> Option<Context> {
        self.0.varlist.borrow().get(0).and_then(|archetype| archetype.archetype_parts().and_then(|(_, binding)| binding.cloned()))
    }

    pub fn set_phase(&self, phase: Option<Action>, binding: Option<Context>) {
        let archetype = Cell::archetype(self.kind(), phase, binding);
        if let Ok(slot) = self.0.varlist.borrow_mut().get_mut(0) {
            *slot = archetype;
        }
    }

    /// A full value for this context, synthesized from its archetype.
    pub fn archetype(&self) -> Cell {
        Cell::context(self.clone())
    }

    /// Adds a key, returning the index of its fresh, unset var.
    ///
    /// The keylist is extended in place only if no other context shares it; otherwise this
    /// context forks its own copy first.
    pub fn append(&self, symbol: Symbol) -> Result<usize, ContextError> {
        if self.has_flag(ContextFlags::EXPIRED) {
            return Err(ContextError::Expired);
        }
        if self.find(symbol, false).is_some() {
            return Err(ContextError::Duplicate(symbol));
        }
        let mut varlist = self.0.varlist.borrow_mut();
        varlist.push(Cell::unset())?;
        let mut keylist = self.0.keylist.borrow_mut();
        Self::unique_keylist(&mut keylist).keys.push(Key { symbol, flags: KeyFlags::empty() })?;
        Ok(varlist.len() - 1)
    }

    fn unique_keylist(keylist: &mut Rc<Keylist>) -> &mut Keylist {
        Rc::make_mut(keylist)
    }

    /// Looks a key up. `strict` compares spellings exactly, otherwise case is ignored.
    ///
    /// Hidden keys are never found. For frames, parameters the frame's phase keeps private
    /// (locals, the return slot, specialized-out arguments) are skipped too.
    pub fn find(&self, symbol: Symbol, strict: bool) -> Option<usize> {
        self.find_phased(symbol, strict, false)
    }

    /// As `find`, but a phased lookup sees the frame the way its own body does, private keys included.
    pub fn find_phased(&self, symbol: Symbol, strict: bool, phased: bool) -> Option<usize> {
        let keylist = self.0.keylist.borrow();
        let position = keylist.keys.iter().position(|key| {
            !key.flags.contains(KeyFlags::HIDDEN) && if strict { key.symbol == symbol } else { key.symbol.same_canon(symbol) }
        })?;
        let index = position + 1;
        drop(keylist);
        if !phased && self.kind() == Kind::Frame {
            if let Some(phase) = self.phase() {
                if phase.is_param_hidden(index) {
                    return None;
                }
            }
        }
        Some(index)
    }

    /// Indices and spellings of the keys words may bind to, in order.
    pub fn bindable(&self, phased: bool) -> Vec<(usize, Symbol)> {
        let phase = if phased || self.kind() != Kind::Frame { None } else { self.phase() };
        let keylist = self.0.keylist.borrow();
        keylist
            .keys
            .iter()
            .enumerate()
            .filter(|(position, key)| {
                !key.flags.contains(KeyFlags::HIDDEN) && !phase.as_ref().is_some_and(|phase| phase.is_param_hidden(position + 1))
            })
            .map(|(position, key)| (position + 1, key.symbol))
            .collect()
    }

    /// Keys and vars a lookup could see, in order.
    pub fn visible(&self, phased: bool) -> Vec<(Symbol, Cell)> {
        let phase = if phased || self.kind() != Kind::Frame { None } else { self.phase() };
        let keylist = self.0.keylist.borrow();
        let varlist = self.0.varlist.borrow();
        keylist
            .keys
            .iter()
            .enumerate()
            .filter(|(position, key)| {
                !key.flags.contains(KeyFlags::HIDDEN) && !phase.as_ref().is_some_and(|phase| phase.is_param_hidden(position + 1))
            })
            .filter_map(|(position, key)| varlist.get(position + 1).map(|var| (key.symbol, var.clone())))
            .collect()
    }

    /// Every var, in key order.
    pub fn vars(&self) -> Vec<Cell> {
        self.0.varlist.borrow().as_slice().iter().skip(1).cloned().collect()
    }

    /// Copies the context.
    ///
    /// With no extra capacity requested, the copy shares this context's keylist; adding a key to
    /// either side later forks it. Values whose kind is in `deep` are copied too.
    pub fn copy(&self, gc: &mut GcInterface, extra: usize, deep: TypeSet) -> Context {
        let vars = self.vars().into_iter().map(|var| crate::bind::copy_value(gc, &var, deep)).collect();
        let keylist = if extra == 0 { self.keylist() } else { Rc::new(self.keylist().forked()) };
        let copy = Self::alloc_reserving(gc, self.kind(), keylist, vars, extra);
        copy.set_phase(self.phase(), self.binding());
        copy
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared data, for cycle checks.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl ContextData {
    /// Empties the vars and archetype, breaking any cycle through this context.
    pub(crate) fn decay(&self) -> Result<(), ContextError> {
        self.flags.set(self.flags.get() | ContextFlags::EXPIRED);
        let mut varlist = self.varlist.borrow_mut();
        let len = varlist.len();
        varlist.decay();
        // keep the shape so late readers see unset vars rather than holes
        varlist.extend(std::iter::once(Cell::archetype(self.kind, None, None)).chain((1..len).map(|_| Cell::unset())))?;
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}({} keys)", self.kind(), self.0.id.0, self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ren_core::Interner;

    #[test]
    fn appended_keys_keep_their_index() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let context = Context::alloc(&mut gc, Kind::Object, 2);
        assert_eq!(context.len(), 0);

        let symbols: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|name| interner.intern(name)).collect();
        let mut indices = Vec::new();
        for symbol in &symbols {
            indices.push(context.append(*symbol).unwrap());
            for (earlier, index) in symbols.iter().zip(&indices) {
                assert_eq!(context.find(*earlier, true), Some(*index));
            }
        }
        assert_eq!(indices, [1, 2, 3, 4, 5]);
        assert!(context.var(5).unwrap().is_unset());
    }

    #[test]
    fn reserved_capacity_takes_appends_in_place() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let context = Context::alloc(&mut gc, Kind::Object, 4);
        let (vars, keys) = (context.capacity(), context.keylist().capacity());
        assert!(vars >= 4 && keys >= 4);

        for name in ["a", "b", "c", "d"] {
            context.append(interner.intern(name)).unwrap();
        }
        assert_eq!(context.capacity(), vars);
        assert_eq!(context.keylist().capacity(), keys);
    }

    #[test]
    fn decayed_contexts_keep_their_shape() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let a = interner.intern("a");
        let context = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([a])), vec![Cell::integer(1)]);
        context.0.decay().unwrap();
        assert!(context.has_flag(ContextFlags::EXPIRED));
        assert_eq!(context.len(), 1);
        assert!(context.var(1).is_some_and(|var| var.is_unset()));
        assert_eq!(context.set_var(1, &Cell::integer(2)), Err(ContextError::Expired));
    }

    #[test]
    fn appending_a_duplicate_fails() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let context = Context::alloc(&mut gc, Kind::Object, 1);
        context.append(interner.intern("a")).unwrap();
        assert!(matches!(context.append(interner.intern("A")), Err(ContextError::Duplicate(_))));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn copies_share_the_keylist_until_one_grows() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let (a, b) = (interner.intern("a"), interner.intern("b"));
        let original = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([a])), vec![Cell::integer(1)]);
        let keylist_id = original.keylist().id();

        let copy = original.copy(&mut gc, 0, TypeSet::EMPTY);
        assert!(copy.shares_keylist(&original));

        let index = copy.append(b).unwrap();
        assert!(!copy.shares_keylist(&original));
        assert_eq!(original.keylist().id(), keylist_id);
        assert_eq!(original.find(b, false), None);
        assert_eq!(copy.find(b, false), Some(index));
        assert!(copy.keylist().derives_from(&original.keylist()));
    }

    #[test]
    fn lookups_ignore_case_unless_strict() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let (lower, upper) = (interner.intern("name"), interner.intern("NAME"));
        let context = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([lower])), vec![Cell::blank()]);
        assert_eq!(context.find(upper, false), Some(1));
        assert_eq!(context.find(upper, true), None);
    }

    #[test]
    fn hidden_keys_are_not_found() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let (a, b) = (interner.intern("a"), interner.intern("b"));
        let context = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([a, b])), vec![Cell::integer(1), Cell::integer(2)]);
        context.hide(1).unwrap();
        assert_eq!(context.find(a, false), None);
        assert_eq!(context.find(b, false), Some(2));
        assert_eq!(context.visible(false).len(), 1);
    }

    #[test]
    fn protected_vars_refuse_writes() {
        let mut gc = GcInterface::new();
        let mut interner = Interner::default();
        let a = interner.intern("a");
        let context = Context::alloc_with(&mut gc, Kind::Object, Rc::new(Keylist::new([a])), vec![Cell::integer(1)]);
        context.protect(1, true).unwrap();
        assert_eq!(context.set_var(1, &Cell::integer(2)), Err(ContextError::Protected(a)));
        context.protect(1, false).unwrap();
        assert_eq!(context.set_var(1, &Cell::integer(2)), Ok(()));
        assert_eq!(context.var(1).and_then(|var| var.as_integer()), Some(2));
    }
}
