use crate::vm_objects::action::{Action, Param};
use crate::vm_objects::array::Array;
use crate::vm_objects::context::Context;
use crate::vm_objects::text::Text;
use ren_value::{CellFlags, Heart, Kind, KindByte, Symbol, TypeSet};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Conversions between cells and Rust types, for natives.
pub mod convert;
/// Quoting beyond what fits in the header.
pub mod quoting;

pub use quoting::QuotedBox;

/// Most bytes a tuple can pack.
pub const MAX_TUPLE_LEN: usize = 16;

/// A short run of bytes stored directly in the cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedBytes {
    len: u8,
    bytes: [u8; MAX_TUPLE_LEN],
}

impl PackedBytes {
    pub fn new(bytes: &[u8]) -> Option<PackedBytes> {
        if bytes.len() > MAX_TUPLE_LEN {
            return None;
        }
        let mut packed = PackedBytes { len: bytes.len() as u8, bytes: [0; MAX_TUPLE_LEN] };
        packed.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(packed)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }
}

/// What a datatype value names: a builtin kind, or a type registered by an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Builtin(Kind),
    Custom(u32),
}

/// The payload of a cell. Which variant is present is implied by the cell's heart.
#[derive(Clone)]
pub enum Payload {
    Unit,
    Logic(bool),
    Integer(i64),
    Decimal(f64),
    Char(char),
    Bytes(PackedBytes),
    String { text: Text, index: u32 },
    /// `index` is only meaningful while `binding` is set. A binding to a paramlist is relative:
    /// the word needs a running frame for that action to be looked up.
    Word { symbol: Symbol, index: u32, binding: Option<Context> },
    /// `specifier` says which frame relative words inside the array resolve against.
    Array { array: Array, index: u32, specifier: Option<Context> },
    Action { action: Action, binding: Option<Context>, label: Option<Symbol> },
    Context { context: Context, phase: Option<Action> },
    Datatype(TypeKey),
    Typeset(TypeSet),
    Param(Rc<Param>),
    Handle(Rc<dyn Any>),
    Custom { type_id: u32, data: Rc<dyn Any> },
    Quoted(Rc<QuotedBox>),
    /// Slot 0 of a varlist or details array. Points at nothing, so it can't form a cycle with its owner.
    Archetype { phase: Option<Action>, binding: Option<Context> },
}

/// The universal value slot: a kind byte, header flags and a payload.
#[derive(Clone)]
pub struct Cell {
    kind: KindByte,
    flags: CellFlags,
    payload: Payload,
}

#[cfg(target_pointer_width = "64")]
static_assertions::assert_eq_size!(Cell, [usize; 4]);

impl Cell {
    /// A cell of `kind` with no payload.
    pub const fn unit(kind: Kind) -> Cell {
        Cell { kind: KindByte::new(kind), flags: CellFlags::empty(), payload: Payload::Unit }
    }

    pub const fn null() -> Cell {
        Self::unit(Kind::Null)
    }

    pub const fn void() -> Cell {
        Self::unit(Kind::Void)
    }

    pub const fn unset() -> Cell {
        Self::unit(Kind::Unset)
    }

    pub const fn blank() -> Cell {
        Self::unit(Kind::Blank)
    }

    pub fn new(kind: Kind, payload: Payload) -> Cell {
        Cell { kind: KindByte::new(kind), flags: CellFlags::empty(), payload }
    }

    pub fn logic(value: bool) -> Cell {
        Self::new(Kind::Logic, Payload::Logic(value))
    }

    pub fn integer(value: i64) -> Cell {
        Self::new(Kind::Integer, Payload::Integer(value))
    }

    pub fn decimal(value: f64) -> Cell {
        Self::new(Kind::Decimal, Payload::Decimal(value))
    }

    pub fn char(value: char) -> Cell {
        Self::new(Kind::Char, Payload::Char(value))
    }

    pub fn tuple(bytes: &[u8]) -> Option<Cell> {
        PackedBytes::new(bytes).map(|packed| Self::new(Kind::Tuple, Payload::Bytes(packed)))
    }

    pub fn text(text: Text) -> Cell {
        Self::string(Kind::Text, text, 0)
    }

    pub fn string(kind: Kind, text: Text, index: usize) -> Cell {
        debug_assert!(kind.is_string());
        Self::new(kind, Payload::String { text, index: index as u32 })
    }

    /// An unbound word of the given word kind.
    pub fn word(kind: Kind, symbol: Symbol) -> Cell {
        debug_assert!(kind.is_word());
        Self::new(kind, Payload::Word { symbol, index: 0, binding: None })
    }

    pub fn bound_word(kind: Kind, symbol: Symbol, context: Context, index: usize) -> Cell {
        debug_assert!(kind.is_word());
        Self::new(kind, Payload::Word { symbol, index: index as u32, binding: Some(context) })
    }

    pub fn array(kind: Kind, array: Array) -> Cell {
        Self::array_at(kind, array, 0, None)
    }

    pub fn array_at(kind: Kind, array: Array, index: usize, specifier: Option<Context>) -> Cell {
        debug_assert!(kind.is_array());
        Self::new(kind, Payload::Array { array, index: index as u32, specifier })
    }

    pub fn action(action: Action, binding: Option<Context>, label: Option<Symbol>) -> Cell {
        Self::new(Kind::Action, Payload::Action { action, binding, label })
    }

    pub fn context(context: Context) -> Cell {
        Self::phased_context(context, None)
    }

    /// A context value that sees a frame through a particular phase, making that phase's locals visible.
    pub fn phased_context(context: Context, phase: Option<Action>) -> Cell {
        Self::new(context.kind(), Payload::Context { context, phase })
    }

    pub fn datatype(key: TypeKey) -> Cell {
        Self::new(Kind::Datatype, Payload::Datatype(key))
    }

    pub fn typeset(types: TypeSet) -> Cell {
        Self::new(Kind::Typeset, Payload::Typeset(types))
    }

    pub fn param(param: Param) -> Cell {
        Self::new(Kind::Param, Payload::Param(Rc::new(param)))
    }

    pub fn handle(data: Rc<dyn Any>) -> Cell {
        Self::new(Kind::Handle, Payload::Handle(data))
    }

    pub fn custom(type_id: u32, data: Rc<dyn Any>) -> Cell {
        Self::new(Kind::Custom, Payload::Custom { type_id, data })
    }

    pub fn archetype(kind: Kind, phase: Option<Action>, binding: Option<Context>) -> Cell {
        Self::new(kind, Payload::Archetype { phase, binding })
    }

    /// The raw header byte, base kind plus in-situ quotes.
    pub fn kind_byte(&self) -> KindByte {
        self.kind
    }

    /// The kind used to pick type hooks. In-situ quoted values answer with their base kind,
    /// boxed quotes with `quoted!`.
    pub fn kind(&self) -> Kind {
        self.kind.kind()
    }

    /// The type as the language reports it: anything with quotes is `quoted!`.
    pub fn type_of(&self) -> Kind {
        if self.quote_depth() > 0 {
            Kind::Quoted
        } else {
            self.kind.kind()
        }
    }

    /// The physical layout of the payload.
    pub fn heart(&self) -> Heart {
        match &self.payload {
            Payload::Unit => Heart::Unit,
            Payload::Logic(_) => Heart::Logic,
            Payload::Integer(_) => Heart::Integer,
            Payload::Decimal(_) => Heart::Decimal,
            Payload::Char(_) => Heart::Char,
            Payload::Bytes(_) => Heart::Bytes,
            Payload::String { .. } => Heart::String,
            Payload::Word { .. } => Heart::Word,
            Payload::Array { .. } => Heart::Array,
            Payload::Action { .. } => Heart::Action,
            Payload::Context { .. } => Heart::Context,
            Payload::Datatype(_) => Heart::Datatype,
            Payload::Typeset(_) => Heart::Typeset,
            Payload::Param(_) => Heart::Param,
            Payload::Handle(_) => Heart::Handle,
            Payload::Custom { .. } => Heart::Custom,
            Payload::Quoted(_) => Heart::Quoted,
            Payload::Archetype { .. } => Heart::Archetype,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn flags(&self) -> CellFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: CellFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: CellFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: CellFlags) {
        self.flags.remove(flag);
    }

    pub fn with_flag(mut self, flag: CellFlags) -> Cell {
        self.flags.insert(flag);
        self
    }

    /// Moves `src` into this slot.
    ///
    /// The slot keeps its own persistent flags (protection, management, root and mark bits), the
    /// rest of the header comes from `src`. `UNEVALUATED` is only carried over if asked for.
    pub fn move_from(&mut self, src: &Cell, keep_unevaluated: bool) {
        self.flags = self.flags.merge_for_move(src.flags, keep_unevaluated);
        self.kind = src.kind;
        self.payload = src.payload.clone();
    }

    fn is_plain(&self, kind: Kind) -> bool {
        self.kind == KindByte::new(kind)
    }

    pub fn is_null(&self) -> bool {
        self.is_plain(Kind::Null)
    }

    pub fn is_void(&self) -> bool {
        self.is_plain(Kind::Void)
    }

    pub fn is_unset(&self) -> bool {
        self.is_plain(Kind::Unset)
    }

    pub fn is_blank(&self) -> bool {
        self.is_plain(Kind::Blank)
    }

    /// Whether the cell can be stored and passed around as a value. Null, void and unset are states.
    pub fn is_value(&self) -> bool {
        !(self.is_null() || self.is_void() || self.is_unset())
    }

    /// Conditional truth. `None` for void and unset, which have no truth value.
    pub fn truthiness(&self) -> Option<bool> {
        if self.quote_depth() > 0 {
            return Some(true);
        }
        match (&self.payload, self.kind()) {
            (_, Kind::Null) | (_, Kind::Blank) => Some(false),
            (_, Kind::Void) | (_, Kind::Unset) => None,
            (Payload::Logic(value), _) => Some(*value),
            _ => Some(true),
        }
    }

    fn check_heart(&self) {
        debug_assert!(
            self.kind() == Kind::Quoted || self.kind.kind().default_heart() == self.heart() || self.heart() == Heart::Archetype,
            "header says {:?} but payload is {:?}",
            self.kind(),
            self.heart()
        );
    }

    pub fn as_logic(&self) -> Option<bool> {
        self.check_heart();
        match self.payload {
            Payload::Logic(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        self.check_heart();
        match self.payload {
            Payload::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        self.check_heart();
        match self.payload {
            Payload::Decimal(value) => Some(value),
            _ => None,
        }
    }

    /// Integers and decimals both, as a decimal.
    pub fn as_number(&self) -> Option<f64> {
        match self.payload {
            Payload::Integer(value) => Some(value as f64),
            Payload::Decimal(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        self.check_heart();
        match self.payload {
            Payload::Char(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[u8]> {
        self.check_heart();
        match &self.payload {
            Payload::Bytes(packed) => Some(packed.as_slice()),
            _ => None,
        }
    }

    /// Any string kind: the text and the position within it.
    pub fn as_string(&self) -> Option<(&Text, usize)> {
        self.check_heart();
        match &self.payload {
            Payload::String { text, index } => Some((text, *index as usize)),
            _ => None,
        }
    }

    pub fn word_symbol(&self) -> Option<Symbol> {
        self.check_heart();
        match self.payload {
            Payload::Word { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    pub fn word_binding(&self) -> Option<(&Context, usize)> {
        match &self.payload {
            Payload::Word { binding: Some(context), index, .. } => Some((context, *index as usize)),
            _ => None,
        }
    }

    /// Any array kind: the array, the position within it and its specifier.
    pub fn as_array(&self) -> Option<(&Array, usize, Option<&Context>)> {
        self.check_heart();
        match &self.payload {
            Payload::Array { array, index, specifier } => Some((array, *index as usize, specifier.as_ref())),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&Action> {
        self.check_heart();
        match &self.payload {
            Payload::Action { action, .. } => Some(action),
            _ => None,
        }
    }

    pub fn action_binding(&self) -> Option<&Context> {
        match &self.payload {
            Payload::Action { binding, .. } => binding.as_ref(),
            _ => None,
        }
    }

    pub fn action_label(&self) -> Option<Symbol> {
        match &self.payload {
            Payload::Action { label, .. } => *label,
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&Context> {
        self.check_heart();
        match &self.payload {
            Payload::Context { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn context_phase(&self) -> Option<&Action> {
        match &self.payload {
            Payload::Context { phase, .. } => phase.as_ref(),
            _ => None,
        }
    }

    pub fn as_datatype(&self) -> Option<TypeKey> {
        self.check_heart();
        match self.payload {
            Payload::Datatype(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_typeset(&self) -> Option<TypeSet> {
        self.check_heart();
        match self.payload {
            Payload::Typeset(types) => Some(types),
            _ => None,
        }
    }

    pub fn as_param(&self) -> Option<&Rc<Param>> {
        match &self.payload {
            Payload::Param(param) => Some(param),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Rc<dyn Any>> {
        match &self.payload {
            Payload::Handle(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<(u32, &Rc<dyn Any>)> {
        match &self.payload {
            Payload::Custom { type_id, data } => Some((*type_id, data)),
            _ => None,
        }
    }

    pub fn archetype_parts(&self) -> Option<(Option<&Action>, Option<&Context>)> {
        match &self.payload {
            Payload::Archetype { phase, binding } => Some((phase.as_ref(), binding.as_ref())),
            _ => None,
        }
    }

    /// Same cell, reinterpreted as another kind sharing its heart (`word` to `set-word`, `block` to `group`...).
    pub fn with_kind(&self, kind: Kind) -> Cell {
        debug_assert_eq!(kind.default_heart(), self.kind().default_heart());
        let mut cell = self.clone();
        cell.kind = KindByte::new(kind);
        cell
    }

    /// Same series, at another position.
    pub fn at_index(&self, new_index: usize) -> Cell {
        let mut cell = self.clone();
        match &mut cell.payload {
            Payload::String { index, .. } | Payload::Array { index, .. } => *index = new_index as u32,
            _ => {}
        }
        cell
    }

    /// Rebinds a word in place.
    pub fn bind_word(&mut self, context: Context, new_index: usize) {
        if let Payload::Word { index, binding, .. } = &mut self.payload {
            *index = new_index as u32;
            *binding = Some(context);
        }
    }

    pub fn unbind_word(&mut self) {
        if let Payload::Word { index, binding, .. } = &mut self.payload {
            *index = 0;
            *binding = None;
        }
    }

    /// Points an array cell at other storage, keeping its kind, quoting and flags.
    pub fn replace_array(&mut self, new_array: Array, new_index: usize, new_specifier: Option<Context>) {
        if let Payload::Array { array, index, specifier } = &mut self.payload {
            *array = new_array;
            *index = new_index as u32;
            *specifier = new_specifier;
        }
    }

    /// Points a string cell at other storage.
    pub fn replace_text(&mut self, new_text: Text, new_index: usize) {
        if let Payload::String { text, index } = &mut self.payload {
            *text = new_text;
            *index = new_index as u32;
        }
    }

    /// Points an action cell at another action, keeping its binding and label.
    pub fn replace_action(&mut self, new_action: Action) {
        if let Payload::Action { action, .. } = &mut self.payload {
            *action = new_action;
        }
    }

    pub fn set_specifier(&mut self, context: Option<Context>) {
        if let Payload::Array { specifier, .. } = &mut self.payload {
            *specifier = context;
        }
    }

    pub fn set_action_binding(&mut self, context: Option<Context>) {
        if let Payload::Action { binding, .. } = &mut self.payload {
            *binding = context;
        }
    }

    pub fn set_action_label(&mut self, symbol: Option<Symbol>) {
        if let Payload::Action { label, .. } = &mut self.payload {
            *label = symbol;
        }
    }

    pub(crate) fn set_kind_byte(&mut self, kind: KindByte) {
        self.kind = kind;
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", "'".repeat(self.quote_depth()))?;
        match &self.payload {
            Payload::Unit => write!(f, "{}", self.kind()),
            Payload::Logic(value) => write!(f, "{}", value),
            Payload::Integer(value) => write!(f, "{}", value),
            Payload::Decimal(value) => write!(f, "{:?}", value),
            Payload::Char(value) => write!(f, "{:?}", value),
            Payload::Bytes(packed) => write!(f, "{:?}", packed.as_slice()),
            Payload::String { text, index } => write!(f, "{:?}@{}", text.to_string_from(*index as usize), index),
            Payload::Word { symbol, binding, .. } => write!(f, "{}({}{})", self.kind(), symbol, if binding.is_some() { ", bound" } else { "" }),
            Payload::Array { array, index, .. } => write!(f, "{}(len {} @{})", self.kind(), array.len(), index),
            Payload::Action { label, .. } => write!(f, "action({:?})", label),
            Payload::Context { context, .. } => write!(f, "{:?}", context),
            Payload::Datatype(key) => write!(f, "{:?}", key),
            Payload::Typeset(types) => write!(f, "{:?}", types),
            Payload::Param(param) => write!(f, "{:?}", param),
            Payload::Handle(_) => write!(f, "handle!"),
            Payload::Custom { type_id, .. } => write!(f, "custom#{}", type_id),
            Payload::Quoted(quoted) => write!(f, "{:?}", quoted.cell()),
            Payload::Archetype { .. } => write!(f, "archetype({})", self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_is_four_words() {
        assert_eq!(std::mem::size_of::<Cell>(), 4 * std::mem::size_of::<usize>());
    }

    #[test]
    fn move_keeps_slot_protection() {
        let mut slot = Cell::integer(1).with_flag(CellFlags::PROTECTED);
        let incoming = Cell::integer(2).with_flag(CellFlags::UNEVALUATED);
        slot.move_from(&incoming, false);
        assert_eq!(slot.as_integer(), Some(2));
        assert!(slot.has_flag(CellFlags::PROTECTED));
        assert!(!slot.has_flag(CellFlags::UNEVALUATED));
    }

    #[test]
    fn truthiness_of_states() {
        assert_eq!(Cell::null().truthiness(), Some(false));
        assert_eq!(Cell::blank().truthiness(), Some(false));
        assert_eq!(Cell::logic(false).truthiness(), Some(false));
        assert_eq!(Cell::integer(0).truthiness(), Some(true));
        assert_eq!(Cell::void().truthiness(), None);
        assert_eq!(Cell::logic(false).quoted(1).truthiness(), Some(true));
    }

    #[test]
    fn tuples_are_bounded() {
        assert_eq!(Cell::tuple(&[1, 2, 3]).unwrap().as_tuple(), Some(&[1u8, 2, 3][..]));
        assert!(Cell::tuple(&[0; MAX_TUPLE_LEN + 1]).is_none());
    }
}
