//! The per-datatype dispatch table.
//!
//! Generic operations (comparison, MAKE, TO, path picking and poking, molding) look the
//! implementation up here by kind, so an extension can add a datatype without the evaluator
//! knowing anything about it.

use crate::error::ErrorId;
use crate::invokable::Return;
use crate::mold::Mold;
use crate::universe::Universe;
use crate::value::{Cell, TypeKey};
use crate::{compare, mold, path, primitives};
use ren_value::Kind;
use std::cmp::Ordering;

/// Orders two values of the same kind. `None` if they are unequal and have no order. The flag
/// asks for strict comparison.
pub type CompareHook = fn(&HookTable, &Cell, &Cell, bool) -> Option<Ordering>;
/// Builds a value from a datatype or a prototype, and a spec.
pub type MakeHook = fn(&mut Universe, &Cell, &Cell) -> Return;
/// Converts a value to the given kind.
pub type ToHook = fn(&mut Universe, Kind, &Cell) -> Result<Cell, ErrorId>;
/// Picks from a container by key or index. Null if there's nothing there.
pub type PickHook = fn(&mut Universe, &Cell, &Cell) -> Result<Cell, ErrorId>;
/// Stores into a container by key or index.
pub type PokeHook = fn(&mut Universe, &Cell, &Cell, &Cell) -> Result<(), ErrorId>;
/// Writes the text form of a value.
pub type MoldHook = fn(&mut Mold<'_>, &Cell);

/// What a datatype implements. Missing entries make the operation an error for that type.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeHooks {
    pub compare: Option<CompareHook>,
    pub make: Option<MakeHook>,
    pub to: Option<ToHook>,
    pub pick: Option<PickHook>,
    pub poke: Option<PokeHook>,
    pub mold: Option<MoldHook>,
}

/// A datatype added at runtime. Its values are `custom!` cells carrying its id.
#[derive(Debug, Clone)]
pub struct CustomType {
    pub name: String,
    pub hooks: TypeHooks,
}

pub struct HookTable {
    builtin: Vec<TypeHooks>,
    custom: Vec<CustomType>,
}

impl Default for HookTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HookTable {
    pub fn new() -> HookTable {
        HookTable { builtin: Kind::ALL.iter().map(|kind| builtin_hooks(*kind)).collect(), custom: Vec::new() }
    }

    pub fn for_kind(&self, kind: Kind) -> &TypeHooks {
        &self.builtin[kind as usize]
    }

    /// Hooks for a value. Quoted values use their underlying kind.
    pub fn for_cell(&self, cell: &Cell) -> &TypeHooks {
        if let Some((type_id, _)) = cell.as_custom() {
            if let Some(custom) = self.custom.get(type_id as usize) {
                return &custom.hooks;
            }
        }
        self.for_kind(cell.kind())
    }

    pub fn for_key(&self, key: TypeKey) -> Option<&TypeHooks> {
        match key {
            TypeKey::Builtin(kind) => Some(self.for_kind(kind)),
            TypeKey::Custom(type_id) => self.custom.get(type_id as usize).map(|custom| &custom.hooks),
        }
    }

    /// Adds a datatype, returning the id its values and its datatype carry.
    pub fn register_custom(&mut self, name: impl Into<String>, hooks: TypeHooks) -> u32 {
        let name = name.into();
        log::debug!("registering custom type {}", name);
        self.custom.push(CustomType { name, hooks });
        (self.custom.len() - 1) as u32
    }

    pub fn custom_name(&self, type_id: u32) -> Option<&str> {
        self.custom.get(type_id as usize).map(|custom| custom.name.as_str())
    }

    pub fn custom_id(&self, name: &str) -> Option<u32> {
        self.custom.iter().position(|custom| custom.name.eq_ignore_ascii_case(name)).map(|position| position as u32)
    }
}

fn builtin_hooks(kind: Kind) -> TypeHooks {
    let compare: CompareHook = match kind {
        Kind::Null | Kind::Void | Kind::Unset | Kind::Blank => compare::compare_unit,
        Kind::Logic => compare::compare_logic,
        Kind::Integer | Kind::Decimal => compare::compare_number,
        Kind::Char => compare::compare_char,
        Kind::Tuple => compare::compare_tuple,
        Kind::Text | Kind::Tag => compare::compare_string,
        Kind::Word | Kind::SetWord | Kind::GetWord | Kind::Refinement => compare::compare_word,
        Kind::Block | Kind::Group | Kind::Path | Kind::SetPath | Kind::GetPath => compare::compare_array,
        Kind::Object | Kind::Module | Kind::Error | Kind::Frame => compare::compare_context,
        Kind::Datatype => compare::compare_datatype,
        Kind::Typeset => compare::compare_typeset,
        Kind::Action | Kind::Param | Kind::Handle | Kind::Custom | Kind::Quoted => compare::compare_identity,
    };
    let make: Option<MakeHook> = match kind {
        Kind::Object | Kind::Module | Kind::Error => Some(primitives::contexts::make_context),
        Kind::Frame => Some(primitives::contexts::make_frame),
        Kind::Action => Some(primitives::functions::make_action),
        Kind::Block | Kind::Group | Kind::Text | Kind::Tag | Kind::Typeset => Some(primitives::values::make_value),
        _ => None,
    };
    let to: Option<ToHook> = match kind {
        Kind::Null | Kind::Void | Kind::Unset | Kind::Action | Kind::Param | Kind::Handle | Kind::Custom | Kind::Quoted => None,
        _ => Some(primitives::values::to_value),
    };
    let (pick, poke): (Option<PickHook>, Option<PokeHook>) = match kind {
        Kind::Object | Kind::Module | Kind::Error | Kind::Frame => (Some(path::pick_context), Some(path::poke_context)),
        Kind::Block | Kind::Group | Kind::Path | Kind::SetPath | Kind::GetPath => (Some(path::pick_array), Some(path::poke_array)),
        Kind::Text | Kind::Tag => (Some(path::pick_text), Some(path::poke_text)),
        Kind::Tuple => (Some(path::pick_tuple), None),
        _ => (None, None),
    };
    TypeHooks { compare: Some(compare), make, to, pick, poke, mold: Some(mold::mold_builtin) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::rc::Rc;

    fn mold_point(mold: &mut Mold<'_>, cell: &Cell) {
        let point = cell.as_custom().and_then(|(_, data)| data.downcast_ref::<(i32, i32)>().copied());
        if let Some((x, y)) = point {
            mold.write_str(&format!("{}x{}", x, y));
        }
    }

    #[test]
    fn custom_types_get_their_own_hooks() {
        let mut table = HookTable::new();
        let id = table.register_custom("point", TypeHooks { mold: Some(mold_point), ..Default::default() });
        let point = Cell::custom(id, Rc::new((1, 2)) as Rc<dyn Any>);

        assert!(table.for_cell(&point).mold.is_some());
        assert!(table.for_cell(&point).pick.is_none());
        assert_eq!(table.custom_name(id), Some("point"));
        assert_eq!(table.custom_id("POINT"), Some(id));
    }

    #[test]
    fn contexts_and_blocks_can_be_picked() {
        let table = HookTable::new();
        assert!(table.for_kind(Kind::Object).pick.is_some());
        assert!(table.for_kind(Kind::Block).poke.is_some());
        assert!(table.for_kind(Kind::Integer).pick.is_none());
    }
}
