use crate::bind::derelativize;
use crate::error::ErrorId;
use crate::evaluate::{eval_block, fetch_var, gather_assigned, output};
use crate::feed::Feed;
use crate::invokable::{CallSite, Invoke, Return};
use crate::primitives::functions::specialize_refinements;
use crate::universe::Universe;
use crate::value::Cell;
use crate::vm_objects::context::Context;
use ren_value::{Kind, Symbol};

/// Evaluates a path, set-path or get-path.
///
/// The head is fetched, then each following part picks from the value so far. Once an action is
/// reached, the remaining parts are refinements for it: a path calls it, a get-path yields it
/// with those refinements switched on.
pub fn eval_path(universe: &mut Universe, feed: &mut Feed, path: &Cell) -> Return {
    let Some((array, index, specifier)) = path.as_array() else {
        return ErrorId::Internal("path without an array".to_string()).into();
    };
    let specifier = specifier.cloned();
    let parts = array.to_vec_from(index);
    let Some(head) = parts.first() else {
        return ErrorId::BadPath("an empty path".to_string()).into();
    };

    let mut current = match head.kind() {
        Kind::Word | Kind::GetWord | Kind::SetWord if !head.is_quoted() => propagate_err!(fetch_var(universe, head, specifier.as_ref())),
        Kind::Group => propagate!(eval_block(universe, &derelativize(head, specifier.as_ref()))),
        _ => derelativize(head, specifier.as_ref()),
    };
    let mut label = head.word_symbol();
    let last = parts.len() - 1;

    for (position, part) in parts.iter().enumerate().skip(1) {
        if current.kind() == Kind::Action && !current.is_quoted() {
            return call_with_refinements(universe, feed, path.kind(), &current, label, &parts[position..]);
        }
        let picker = propagate_err!(selector(universe, part, specifier.as_ref()));
        if path.kind() == Kind::SetPath && position == last {
            let value = propagate_err!(gather_assigned(universe, feed, path));
            if let Err(err) = poke(universe, &current, &picker, &value) {
                return err.into();
            }
            return Return::Local(value);
        }
        current = match pick(universe, &current, &picker) {
            Ok(value) => value,
            Err(err) => return err.into(),
        };
        label = part.word_symbol();
    }

    match path.kind() {
        Kind::Path if current.kind() == Kind::Action => call_with_refinements(universe, feed, Kind::Path, &current, label, &[]),
        Kind::SetPath => ErrorId::BadPath(universe.mold(path)).into(),
        _ => Return::Local(output(&current)),
    }
}

fn call_with_refinements(universe: &mut Universe, feed: &mut Feed, kind: Kind, action_cell: &Cell, label: Option<Symbol>, parts: &[Cell]) -> Return {
    let Some(action) = action_cell.as_action().cloned() else {
        return ErrorId::Internal("expected an action".to_string()).into();
    };
    let mut refinements = Vec::with_capacity(parts.len());
    for part in parts {
        match part.word_symbol() {
            Some(symbol) if !part.is_quoted() => refinements.push(symbol),
            _ => return ErrorId::BadPath(universe.mold(part)).into(),
        }
    }
    match kind {
        Kind::Path => {
            let site = CallSite::new(action_cell, label).with_refinements(refinements);
            action.invoke(universe, feed, site)
        }
        Kind::GetPath => match specialize_refinements(universe, &action, &refinements) {
            Ok(specialized) => Return::Local(Cell::action(specialized, action_cell.action_binding().cloned(), label)),
            Err(err) => err.into(),
        },
        _ => ErrorId::BadPath("an action".to_string()).into(),
    }
}

/// What a path part picks with: words as plain words, groups evaluated, anything else as is.
fn selector(universe: &mut Universe, part: &Cell, specifier: Option<&Context>) -> Result<Cell, Return> {
    if part.is_quoted() {
        return Ok(derelativize(part, specifier));
    }
    match part.kind() {
        Kind::Word | Kind::SetWord | Kind::GetWord => match part.word_symbol() {
            Some(symbol) => Ok(Cell::word(Kind::Word, symbol)),
            None => Err(ErrorId::Internal("word without a symbol".to_string()).into()),
        },
        Kind::Group => eval_block(universe, &derelativize(part, specifier)).local(),
        _ => Ok(derelativize(part, specifier)),
    }
}

/// Picks from any container, through its type's hook.
pub fn pick(universe: &mut Universe, container: &Cell, picker: &Cell) -> Result<Cell, ErrorId> {
    let hook = if container.is_quoted() { None } else { universe.hooks.for_cell(container).pick };
    match hook {
        Some(hook) => hook(universe, container, picker),
        None => Err(ErrorId::BadPath(format!("{} on {}", universe.mold(picker), container.type_of()))),
    }
}

/// Stores into any container, through its type's hook.
pub fn poke(universe: &mut Universe, container: &Cell, picker: &Cell, value: &Cell) -> Result<(), ErrorId> {
    let hook = if container.is_quoted() { None } else { universe.hooks.for_cell(container).poke };
    match hook {
        Some(hook) => hook(universe, container, picker, value),
        None => Err(ErrorId::BadPath(format!("{} on {}", universe.mold(picker), container.type_of()))),
    }
}

fn context_slot(universe: &mut Universe, container: &Cell, picker: &Cell) -> Result<(Context, usize), ErrorId> {
    let Some(context) = container.as_context() else {
        return Err(ErrorId::Internal("expected a context".to_string()));
    };
    let Some(symbol) = picker.word_symbol() else {
        return Err(ErrorId::BadPath(universe.mold(picker)));
    };
    let phased = container.context_phase().is_some();
    match context.find_phased(symbol, false, phased) {
        Some(index) => Ok((context.clone(), index)),
        None => Err(ErrorId::BadPath(universe.interner.reverse_lookup(symbol).to_string())),
    }
}

pub fn pick_context(universe: &mut Universe, container: &Cell, picker: &Cell) -> Result<Cell, ErrorId> {
    let (context, index) = context_slot(universe, container, picker)?;
    match context.var(index) {
        Some(value) if !value.is_unset() => Ok(value),
        _ => Err(ErrorId::NoValue(universe.mold(picker))),
    }
}

pub fn poke_context(universe: &mut Universe, container: &Cell, picker: &Cell, value: &Cell) -> Result<(), ErrorId> {
    let (context, index) = context_slot(universe, container, picker)?;
    context.set_var(index, value).map_err(|err| err.explain(&universe.interner))
}

/// Position an integer picker refers to, counting from 1 at the series' index.
fn position(index: usize, picker: i64) -> Option<usize> {
    if picker < 1 {
        return None;
    }
    index.checked_add(usize::try_from(picker - 1).ok()?)
}

/// Integers pick by position. Words select: the value after the first matching word.
pub fn pick_array(_: &mut Universe, container: &Cell, picker: &Cell) -> Result<Cell, ErrorId> {
    let Some((array, index, specifier)) = container.as_array() else {
        return Err(ErrorId::Internal("expected an array".to_string()));
    };
    let found = if let Some(number) = picker.as_integer() {
        position(index, number).and_then(|at| array.get(at))
    } else if let Some(symbol) = picker.word_symbol() {
        let cells = array.to_vec_from(index);
        cells
            .iter()
            .position(|cell| !cell.is_quoted() && cell.word_symbol().is_some_and(|other| other.same_canon(symbol)))
            .and_then(|at| cells.get(at + 1).cloned())
    } else {
        return Err(ErrorId::BadPath(format!("{} on {}", picker.type_of(), container.type_of())));
    };
    Ok(found.map(|cell| derelativize(&cell, specifier)).unwrap_or_else(Cell::null))
}

pub fn poke_array(universe: &mut Universe, container: &Cell, picker: &Cell, value: &Cell) -> Result<(), ErrorId> {
    let Some((array, index, _)) = container.as_array() else {
        return Err(ErrorId::Internal("expected an array".to_string()));
    };
    if !value.is_value() {
        return Err(ErrorId::NeedValue(universe.mold(picker)));
    }
    let at = if let Some(number) = picker.as_integer() {
        position(index, number).filter(|at| *at < array.len()).ok_or_else(|| ErrorId::OutOfRange(number.to_string()))?
    } else if let Some(symbol) = picker.word_symbol() {
        let cells = array.to_vec_from(index);
        let found = cells.iter().position(|cell| !cell.is_quoted() && cell.word_symbol().is_some_and(|other| other.same_canon(symbol)));
        match found {
            Some(offset) if index + offset + 1 < array.len() => index + offset + 1,
            _ => return Err(ErrorId::BadPath(universe.interner.reverse_lookup(symbol).to_string())),
        }
    } else {
        return Err(ErrorId::BadPath(format!("{} on {}", picker.type_of(), container.type_of())));
    };
    Ok(array.set(at, value.clone())?)
}

pub fn pick_text(_: &mut Universe, container: &Cell, picker: &Cell) -> Result<Cell, ErrorId> {
    let (Some((text, index)), Some(number)) = (container.as_string(), picker.as_integer()) else {
        return Err(ErrorId::BadPath(format!("{} on {}", picker.type_of(), container.type_of())));
    };
    Ok(position(index, number).and_then(|at| text.get(at)).map(Cell::char).unwrap_or_else(Cell::null))
}

pub fn poke_text(_: &mut Universe, container: &Cell, picker: &Cell, value: &Cell) -> Result<(), ErrorId> {
    let (Some((text, index)), Some(number)) = (container.as_string(), picker.as_integer()) else {
        return Err(ErrorId::BadPath(format!("{} on {}", picker.type_of(), container.type_of())));
    };
    let Some(ch) = value.as_char() else {
        return Err(ErrorId::BadCast(format!("char! from {}", value.type_of())));
    };
    let at = position(index, number).filter(|at| *at < text.len()).ok_or_else(|| ErrorId::OutOfRange(number.to_string()))?;
    Ok(text.set(at, ch)?)
}

pub fn pick_tuple(_: &mut Universe, container: &Cell, picker: &Cell) -> Result<Cell, ErrorId> {
    let (Some(bytes), Some(number)) = (container.as_tuple(), picker.as_integer()) else {
        return Err(ErrorId::BadPath(format!("{} on {}", picker.type_of(), container.type_of())));
    };
    Ok(position(0, number).and_then(|at| bytes.get(at)).map(|byte| Cell::integer(i64::from(*byte))).unwrap_or_else(Cell::null))
}
