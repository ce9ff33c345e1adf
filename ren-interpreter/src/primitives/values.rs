use crate::compare::{compare, equal};
use crate::error::{ErrorId, RenError};
use crate::invokable::Return;
use crate::primitives::functions::parse_types;
use crate::primitives::NativeInfo;
use crate::universe::Universe;
use crate::value::{Cell, TypeKey};
use crate::vm_objects::frame::Frame;
use crate::vm_objects::text::Text;
use ren_value::{Kind, TypeSet};
use std::cmp::Ordering;

/// The typesets defined in the library at boot, by name.
pub static TYPESETS: &[(&str, TypeSet)] = &[
    ("any-value!", TypeSet::ANY_VALUE),
    ("any-word!", TypeSet::ANY_WORD),
    ("any-path!", TypeSet::ANY_PATH),
    ("any-array!", TypeSet::ANY_ARRAY),
    ("any-string!", TypeSet::ANY_STRING),
    ("any-series!", TypeSet::ANY_SERIES),
    ("any-context!", TypeSet::ANY_CONTEXT),
    ("any-number!", TypeSet::ANY_NUMBER),
    ("any-scalar!", TypeSet::ANY_SCALAR),
];

pub static NATIVES: &[NativeInfo] = &[
    ("quote", self::quote),
    ("unquote", self::unquote),
    ("the", self::the),
    ("quoted?", self::is_quoted),
    ("quotes-of", self::quotes_of),
    ("type-of", self::type_of),
    ("kind-of", self::kind_of),
    ("heart-of", self::heart_of),
    ("null?", self::is_null),
    ("void?", self::is_void),
    ("comment", self::comment),
    ("elide", self::elide),
    ("not", self::not),
    ("and?", self::and),
    ("or?", self::or),
    ("equal?", self::equal_),
    ("strict-equal?", self::strict_equal),
    ("not-equal?", self::not_equal),
    ("lesser?", self::lesser),
    ("greater?", self::greater),
    ("lesser-or-equal?", self::lesser_or_equal),
    ("greater-or-equal?", self::greater_or_equal),
    ("same?", self::same),
    ("mold", self::mold),
    ("form", self::form),
    ("to", self::to),
];

/// The kind a MAKE or TO is aimed at: a datatype's, or a prototype value's.
fn target_kind(cell: &Cell) -> Option<Kind> {
    match cell.as_datatype() {
        Some(TypeKey::Builtin(kind)) => Some(kind),
        Some(TypeKey::Custom(_)) => None,
        None => Some(cell.type_of()),
    }
}

/// MAKE for blocks, groups, strings and typesets.
///
/// An integer spec makes an empty series (the integer is only a capacity hint); a typeset is made
/// from a block of types.
pub fn make_value(universe: &mut Universe, kind_or_proto: &Cell, spec: &Cell) -> Return {
    let Some(kind) = target_kind(kind_or_proto) else {
        return ErrorId::BadMake("custom type without a make hook".to_string()).into();
    };
    let made = match kind {
        Kind::Typeset => parse_types(universe, spec).map(Cell::typeset),
        _ if spec.as_integer().is_some() => Ok(if kind.is_array() {
            Cell::array(kind, universe.gc_interface.alloc_array(Vec::new()))
        } else {
            Cell::string(kind, Text::new(""), 0)
        }),
        _ => to_value(universe, kind, spec),
    };
    match made {
        Ok(value) => Return::Local(value),
        Err(err) => err.into(),
    }
}

fn cast_error(universe: &mut Universe, kind: Kind, value: &Cell) -> ErrorId {
    ErrorId::BadCast(format!("{} from {}", kind, universe.mold(value)))
}

/// TO for the builtin kinds.
pub fn to_value(universe: &mut Universe, kind: Kind, value: &Cell) -> Result<Cell, ErrorId> {
    if value.type_of() == kind && !kind.is_series() {
        return Ok(value.clone());
    }
    let converted = match kind {
        Kind::Integer => {
            if let Some(number) = value.as_integer() {
                Some(Cell::integer(number))
            } else if let Some(number) = value.as_decimal() {
                let truncated = number.trunc();
                // i64::MAX rounds up to 2^63 as a float, so the upper bound is exclusive
                if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                    return Err(ErrorId::Overflow);
                }
                Some(Cell::integer(truncated as i64))
            } else if let Some(ch) = value.as_char() {
                Some(Cell::integer(i64::from(u32::from(ch))))
            } else if let Some(logic) = value.as_logic() {
                Some(Cell::integer(i64::from(logic)))
            } else if let Some((text, index)) = value.as_string() {
                text.to_string_from(index).trim().parse().ok().map(Cell::integer)
            } else {
                None
            }
        }
        Kind::Decimal => match value.as_string() {
            Some((text, index)) => text.to_string_from(index).trim().parse().ok().map(Cell::decimal),
            None => value.as_number().map(Cell::decimal),
        },
        Kind::Char => match (value.as_integer(), value.as_string()) {
            (Some(code), _) => u32::try_from(code).ok().and_then(char::from_u32).map(Cell::char),
            (_, Some((text, index))) => text.get(index).map(Cell::char),
            _ => None,
        },
        Kind::Logic => value.truthiness().map(Cell::logic),
        Kind::Text | Kind::Tag => {
            let formed = universe.form(value);
            Some(Cell::string(kind, Text::new(&formed), 0))
        }
        Kind::Word | Kind::SetWord | Kind::GetWord | Kind::Refinement => {
            if let Some(symbol) = value.word_symbol() {
                Some(Cell::word(kind, symbol))
            } else if let Some((text, index)) = value.as_string() {
                let spelling = text.to_string_from(index);
                let valid = !spelling.is_empty() && !spelling.contains(|ch: char| ch.is_whitespace() || "[](){}\"/:;".contains(ch));
                valid.then(|| Cell::word(kind, universe.interner.intern(&spelling)))
            } else {
                None
            }
        }
        Kind::Block | Kind::Group | Kind::Path | Kind::SetPath | Kind::GetPath => {
            let cells = match value.as_array() {
                Some((array, index, specifier)) => {
                    array.to_vec_from(index).iter().map(|cell| crate::bind::derelativize(cell, specifier)).collect()
                }
                None if value.is_value() => vec![value.clone()],
                None => return Err(cast_error(universe, kind, value)),
            };
            Some(Cell::array(kind, universe.gc_interface.alloc_array(cells)))
        }
        Kind::Datatype => Some(Cell::datatype(TypeKey::Builtin(value.type_of()))),
        _ => None,
    };
    converted.ok_or_else(|| cast_error(universe, kind, value))
}

fn quote(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let depth = if frame.refinement(2) { frame.get::<i64>(3)? } else { 1 };
    let depth = usize::try_from(depth).map_err(|_| ErrorId::OutOfRange(depth.to_string()))?;
    Ok(Return::Local(frame.arg(1).quoted(depth)))
}

fn unquote(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    let depth = if frame.refinement(2) { frame.get::<i64>(3)? } else { 1 };
    let unquoted = usize::try_from(depth).ok().and_then(|depth| value.unquoted(depth));
    unquoted.map(Return::Local).ok_or_else(|| ErrorId::OutOfRange(format!("{} quote levels", depth)).into())
}

/// The argument exactly as written.
fn the(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(frame.arg(1)))
}

fn is_quoted(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(frame.arg(1).is_quoted())))
}

fn quotes_of(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let depth = frame.arg(1).quote_depth();
    Ok(Return::Local(Cell::integer(i64::try_from(depth).unwrap_or(i64::MAX))))
}

fn datatype_of(value: &Cell, kind: Kind) -> Cell {
    match value.as_custom() {
        Some((type_id, _)) if kind == Kind::Custom => Cell::datatype(TypeKey::Custom(type_id)),
        _ => Cell::datatype(TypeKey::Builtin(kind)),
    }
}

/// The datatype of a value. Any quoted value is a `quoted!`.
fn type_of(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    if value.is_null() {
        return Ok(Return::Local(Cell::null()));
    }
    Ok(Return::Local(datatype_of(&value, value.type_of())))
}

/// The datatype under up to three quote levels; deeper quoting reports `quoted!`.
fn kind_of(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    if value.is_null() {
        return Ok(Return::Local(Cell::null()));
    }
    Ok(Return::Local(datatype_of(&value, value.kind())))
}

/// The physical layout of a value, as a word.
fn heart_of(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let heart = frame.arg(1).heart();
    let name = format!("{:?}", heart).to_lowercase();
    Ok(Return::Local(Cell::word(Kind::Word, universe.interner.intern(&name))))
}

fn is_null(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(frame.arg(1).is_null())))
}

fn is_void(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(frame.arg(1).is_void())))
}

fn comment(_: &mut Universe, _: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Invisible)
}

fn elide(_: &mut Universe, _: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Invisible)
}

fn truth(value: &Cell) -> Result<bool, RenError> {
    value.truthiness().ok_or_else(|| ErrorId::NeedValue("logic operation".to_string()).into())
}

fn not(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(!truth(&frame.arg(1))?)))
}

fn and(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(truth(&frame.arg(1))? && truth(&frame.arg(2))?)))
}

fn or(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(truth(&frame.arg(1))? || truth(&frame.arg(2))?)))
}

fn equal_(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(equal(&universe.hooks, &frame.arg(1), &frame.arg(2), false))))
}

fn strict_equal(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(equal(&universe.hooks, &frame.arg(1), &frame.arg(2), true))))
}

fn not_equal(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(!equal(&universe.hooks, &frame.arg(1), &frame.arg(2), false))))
}

/// Orders the two arguments, as an error when they have no order.
fn order(universe: &mut Universe, frame: &Frame) -> Result<Ordering, RenError> {
    let (a, b) = (frame.arg(1), frame.arg(2));
    match compare(&universe.hooks, &a, &b, false) {
        Some(ordering) => Ok(ordering),
        None => Err(ErrorId::Incomparable(universe.mold(&a), universe.mold(&b)).into()),
    }
}

fn lesser(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(order(universe, frame)?.is_lt())))
}

fn greater(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(order(universe, frame)?.is_gt())))
}

fn lesser_or_equal(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(order(universe, frame)?.is_le())))
}

fn greater_or_equal(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(Cell::logic(order(universe, frame)?.is_ge())))
}

/// Identity: the same series at the same index, the same context, the same action. Other
/// values are the same when strictly equal.
fn same(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let (a, b) = (frame.arg(1), frame.arg(2));
    let same = if let (Some((x, i, _)), Some((y, j, _))) = (a.as_array(), b.as_array()) {
        x.ptr_eq(y) && i == j
    } else if let (Some((x, i)), Some((y, j))) = (a.as_string(), b.as_string()) {
        x.ptr_eq(y) && i == j
    } else if let (Some(x), Some(y)) = (a.as_context(), b.as_context()) {
        x.ptr_eq(y)
    } else if let (Some(x), Some(y)) = (a.as_action(), b.as_action()) {
        x.ptr_eq(y)
    } else {
        equal(&universe.hooks, &a, &b, true)
    };
    Ok(Return::Local(Cell::logic(same && a.kind() == b.kind())))
}

/// The source form of a value. With /ONLY, a block's contents without the brackets.
fn mold(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    let molded = match value.as_array() {
        Some((array, index, _)) if frame.refinement(2) => universe.mold_all(&array.to_vec_from(index)),
        _ => universe.mold(&value),
    };
    Ok(Return::Local(Cell::text(Text::new(&molded))))
}

fn form(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let formed = universe.form(&frame.arg(1));
    Ok(Return::Local(Cell::text(Text::new(&formed))))
}

fn to(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let target = frame.arg(1);
    let value = frame.arg(2);
    let key = target.as_datatype().unwrap_or(TypeKey::Builtin(target.type_of()));
    let hook = universe.hooks.for_key(key).and_then(|hooks| hooks.to);
    let kind = match key {
        TypeKey::Builtin(kind) => kind,
        TypeKey::Custom(_) => Kind::Custom,
    };
    match hook {
        Some(hook) => Ok(Return::Local(hook(universe, kind, &value)?)),
        None => Err(cast_error(universe, kind, &value).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typeset_names_are_datatype_shaped() {
        for (name, types) in TYPESETS {
            assert!(name.starts_with("any-") && name.ends_with('!'), "odd typeset name {}", name);
            assert!(!types.is_empty());
            assert!(Kind::from_name(name).is_none(), "{} shadows a datatype", name);
        }
    }

    #[test]
    fn target_kind_comes_from_a_datatype_or_a_prototype() {
        assert_eq!(target_kind(&Cell::datatype(TypeKey::Builtin(Kind::Block))), Some(Kind::Block));
        assert_eq!(target_kind(&Cell::integer(1)), Some(Kind::Integer));
        assert_eq!(target_kind(&Cell::datatype(TypeKey::Custom(0))), None);
    }
}
