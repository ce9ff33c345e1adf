use crate::bind::derelativize;
use crate::compare::equal;
use crate::error::{ErrorId, RenError};
use crate::invokable::Return;
use crate::path;
use crate::primitives::NativeInfo;
use crate::universe::Universe;
use crate::value::Cell;
use crate::vm_objects::frame::Frame;
use ren_value::Kind;

pub static NATIVES: &[NativeInfo] = &[
    ("append", self::append),
    ("insert", self::insert),
    ("length-of", self::length_of),
    ("pick", self::pick),
    ("poke", self::poke),
    ("find", self::find),
    ("next", self::next),
    ("head", self::head),
    ("tail?", self::is_tail),
    ("index-of", self::index_of),
];

/// A series' position and its total length.
fn position(series: &Cell) -> Result<(usize, usize), ErrorId> {
    if let Some((array, index, _)) = series.as_array() {
        return Ok((index, array.len()));
    }
    if let Some((text, index)) = series.as_string() {
        return Ok((index, text.len()));
    }
    Err(ErrorId::Internal(format!("expected a series, got {}", series.type_of())))
}

/// What goes into a series: a block's items when splicing, otherwise the value itself.
fn items(value: &Cell, only: bool) -> Vec<Cell> {
    match value.as_array() {
        Some((array, index, specifier)) if !only && value.kind() == Kind::Block => {
            array.to_vec_from(index).iter().map(|cell| derelativize(cell, specifier)).collect()
        }
        _ => vec![value.clone()],
    }
}

/// Inserts `value` into `series` at `at`, returning how many items went in.
fn insert_at(universe: &mut Universe, series: &Cell, at: usize, value: &Cell, only: bool) -> Result<usize, ErrorId> {
    if !value.is_value() {
        return Err(ErrorId::NeedValue("series insertion".to_string()));
    }
    if let Some((array, _, _)) = series.as_array() {
        let items = items(value, only);
        for (offset, item) in items.iter().enumerate() {
            array.insert(at + offset, item.clone())?;
        }
        return Ok(items.len());
    }
    if let Some((text, _)) = series.as_string() {
        let formed: String = items(value, only).iter().map(|item| universe.form(item)).collect();
        text.insert_str(at, &formed)?;
        return Ok(formed.chars().count());
    }
    Err(ErrorId::Internal(format!("expected a series, got {}", series.type_of())))
}

/// Adds to the tail of a series, splicing a block's items unless /ONLY. Returns the series at its head.
fn append(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let series = frame.arg(1);
    let (_, len) = position(&series)?;
    insert_at(universe, &series, len, &frame.arg(2), frame.refinement(3))?;
    Ok(Return::Local(series.at_index(0)))
}

/// Inserts at the series' position. Returns the series just past what was inserted.
fn insert(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let series = frame.arg(1);
    let (index, len) = position(&series)?;
    let at = index.min(len);
    let count = insert_at(universe, &series, at, &frame.arg(2), frame.refinement(3))?;
    Ok(Return::Local(series.at_index(at + count)))
}

fn length_of(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    let length = match value.as_context() {
        Some(context) => context.visible(false).len(),
        None => {
            let (index, len) = position(&value)?;
            len.saturating_sub(index)
        }
    };
    Ok(Return::Local(Cell::integer(i64::try_from(length).map_err(|_| ErrorId::Overflow)?)))
}

fn pick(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let picked = path::pick(universe, &frame.arg(1), &frame.arg(2))?;
    Ok(Return::Local(picked))
}

fn poke(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(3);
    path::poke(universe, &frame.arg(1), &frame.arg(2), &value)?;
    Ok(Return::Local(value))
}

/// The series at the first match of a value, or null. Text is searched without regard to case.
fn find(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let series = frame.arg(1);
    let value = frame.arg(2);
    let found = if let Some((array, index, specifier)) = series.as_array() {
        array
            .to_vec_from(index)
            .iter()
            .position(|item| equal(&universe.hooks, &derelativize(item, specifier), &value, false))
            .map(|offset| index + offset)
    } else if let Some((text, index)) = series.as_string() {
        let haystack = text.chars_from(index);
        let needle: Vec<char> = universe.form(&value).chars().collect();
        let fold = |ch: &char| ch.to_lowercase().next().unwrap_or(*ch);
        if needle.is_empty() {
            None
        } else {
            haystack
                .windows(needle.len())
                .position(|window| window.iter().map(fold).eq(needle.iter().map(fold)))
                .map(|offset| index + offset)
        }
    } else {
        None
    };
    Ok(Return::Local(found.map(|at| series.at_index(at)).unwrap_or_else(Cell::null)))
}

fn next(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let series = frame.arg(1);
    let (index, len) = position(&series)?;
    Ok(Return::Local(series.at_index((index + 1).min(len))))
}

fn head(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(frame.arg(1).at_index(0)))
}

fn is_tail(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let (index, len) = position(&frame.arg(1))?;
    Ok(Return::Local(Cell::logic(index >= len)))
}

/// The series' position, counting from 1.
fn index_of(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let (index, _) = position(&frame.arg(1))?;
    Ok(Return::Local(Cell::integer(i64::try_from(index + 1).map_err(|_| ErrorId::Overflow)?)))
}
