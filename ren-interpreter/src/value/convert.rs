use crate::error::ErrorId;
use crate::value::{Cell, TypeKey};
use crate::vm_objects::action::Action;
use crate::vm_objects::array::Array;
use crate::vm_objects::context::Context;
use crate::vm_objects::text::Text;
use ren_value::{Kind, Symbol, TypeSet};

/// Extraction of a native's argument into a Rust type.
///
/// Arguments are type checked against the native's spec before dispatch, so a failure here means
/// the spec and the native disagree.
pub trait FromArgs: Sized {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId>;
}

pub trait IntoValue {
    #[allow(clippy::wrong_self_convention)]
    fn into_value(self) -> Cell;
}

fn mismatch(expected: &str, arg: &Cell) -> ErrorId {
    ErrorId::Internal(format!("native expected {} but was given {}", expected, arg.type_of()))
}

/// A number argument, without committing to integer or decimal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Decimal(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(value) => value as f64,
            Number::Decimal(value) => value,
        }
    }
}

/// An array argument: the array, where it starts and which frame resolves its relative words.
#[derive(Debug, Clone)]
pub struct ArrayArg {
    pub kind: Kind,
    pub array: Array,
    pub index: usize,
    pub specifier: Option<Context>,
}

impl ArrayArg {
    pub fn to_cell(&self) -> Cell {
        Cell::array_at(self.kind, self.array.clone(), self.index, self.specifier.clone())
    }
}

impl FromArgs for Cell {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        Ok(arg.clone())
    }
}

impl<T: FromArgs> FromArgs for Option<T> {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        if arg.is_null() {
            Ok(None)
        } else {
            T::from_args(arg).map(Some)
        }
    }
}

impl FromArgs for bool {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_logic().ok_or_else(|| mismatch("logic!", arg))
    }
}

impl FromArgs for i64 {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_integer().ok_or_else(|| mismatch("integer!", arg))
    }
}

impl FromArgs for f64 {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_number().ok_or_else(|| mismatch("number", arg))
    }
}

impl FromArgs for Number {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        match (arg.as_integer(), arg.as_decimal()) {
            (Some(value), _) => Ok(Number::Integer(value)),
            (_, Some(value)) => Ok(Number::Decimal(value)),
            _ => Err(mismatch("number", arg)),
        }
    }
}

impl FromArgs for char {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_char().ok_or_else(|| mismatch("char!", arg))
    }
}

impl FromArgs for Symbol {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.word_symbol().ok_or_else(|| mismatch("any-word!", arg))
    }
}

impl FromArgs for Text {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_string().map(|(text, _)| text.clone()).ok_or_else(|| mismatch("any-string!", arg))
    }
}

impl FromArgs for ArrayArg {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        let (array, index, specifier) = arg.as_array().ok_or_else(|| mismatch("any-array!", arg))?;
        Ok(ArrayArg { kind: arg.kind(), array: array.clone(), index, specifier: specifier.cloned() })
    }
}

impl FromArgs for Context {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_context().cloned().ok_or_else(|| mismatch("any-context!", arg))
    }
}

impl FromArgs for Action {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_action().cloned().ok_or_else(|| mismatch("action!", arg))
    }
}

impl FromArgs for TypeKey {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_datatype().ok_or_else(|| mismatch("datatype!", arg))
    }
}

impl FromArgs for TypeSet {
    fn from_args(arg: &Cell) -> Result<Self, ErrorId> {
        arg.as_typeset().ok_or_else(|| mismatch("typeset!", arg))
    }
}

impl IntoValue for Cell {
    fn into_value(self) -> Cell {
        self
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Cell {
        match self {
            Some(value) => value.into_value(),
            None => Cell::null(),
        }
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Cell {
        Cell::logic(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Cell {
        Cell::integer(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Cell {
        Cell::decimal(self)
    }
}

impl IntoValue for Number {
    fn into_value(self) -> Cell {
        match self {
            Number::Integer(value) => Cell::integer(value),
            Number::Decimal(value) => Cell::decimal(value),
        }
    }
}

impl IntoValue for char {
    fn into_value(self) -> Cell {
        Cell::char(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Cell {
        Cell::text(Text::new(&self))
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Cell {
        Cell::text(Text::new(self))
    }
}

impl IntoValue for Context {
    fn into_value(self) -> Cell {
        Cell::context(self)
    }
}

impl IntoValue for TypeKey {
    fn into_value(self) -> Cell {
        Cell::datatype(self)
    }
}

impl IntoValue for Kind {
    fn into_value(self) -> Cell {
        Cell::datatype(TypeKey::Builtin(self))
    }
}
