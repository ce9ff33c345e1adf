use crate::bind::{derelativize, resolve_word};
use crate::error::{ErrorId, RenError};
use crate::feed::Feed;
use crate::invokable::{ensure_sufficient_stack, CallSite, Invoke, Return};
use crate::path::eval_path;
use crate::universe::Universe;
use crate::value::Cell;
use crate::vm_objects::array::Array;
use crate::vm_objects::context::Context;
use log::trace;
use ren_value::{CellFlags, Kind};

/// How many cells an error's `near` shows, starting at the failing expression.
const NEAR_WINDOW: usize = 6;

/// The trait for evaluating code.
pub trait Evaluate {
    /// Evaluate to the end, within a given universe.
    fn evaluate(&mut self, universe: &mut Universe) -> Return;
}

impl Evaluate for Feed {
    /// Runs every expression left in the feed. The result is the last visible value, void if there is none.
    fn evaluate(&mut self, universe: &mut Universe) -> Return {
        let mut out = Cell::void();
        while !self.is_end() {
            match eval_step(universe, self, true) {
                Return::Local(value) => out = value,
                Return::Invisible => {}
                ret => return ret,
            }
        }
        Return::Local(out)
    }
}

/// Runs the code in `array` from `index` on.
pub fn eval_array(universe: &mut Universe, array: &Array, index: usize, specifier: Option<Context>) -> Return {
    Feed::new(array.clone(), index, specifier).evaluate(universe)
}

/// Runs the contents of a group. Groups count against the stack limit like calls do.
fn eval_group(universe: &mut Universe, array: &Array, index: usize, specifier: Option<Context>) -> Return {
    if let Err(err) = universe.check_depth() {
        return err.into();
    }
    ensure_sufficient_stack(|| universe.nested(|universe| eval_array(universe, array, index, specifier)))
}

/// Runs a block or group value.
pub fn eval_block(universe: &mut Universe, block: &Cell) -> Return {
    match block.as_array() {
        Some((array, index, specifier)) => eval_array(universe, array, index, specifier.cloned()),
        None => ErrorId::Internal(format!("expected a block, got {}", block.type_of())).into(),
    }
}

/// Evaluates one expression from the feed, enfix operators on its right included.
///
/// Without `lookahead`, the expression stops before any enfix operator. That is how the right
/// hand side of an operator is gathered, giving strict left to right evaluation.
pub fn eval_step(universe: &mut Universe, feed: &mut Feed, lookahead: bool) -> Return {
    if universe.take_halt_request() {
        return Return::Halt;
    }
    let start = feed.index();
    let Some(cell) = feed.take() else {
        return Return::Invisible;
    };
    if universe.config.trace {
        trace!("eval {}", universe.mold(&cell));
    }

    let mut out = match eval_cell(universe, feed, cell) {
        Return::Local(value) => value,
        Return::Error(err) => return annotate(universe, feed, start, err),
        ret => return ret,
    };

    while lookahead {
        let Some(action_cell) = enfix_at(feed) else { break };
        let Some(action) = action_cell.as_action().cloned() else { break };
        let label = feed.current().and_then(|word| word.word_symbol());
        feed.advance();
        let site = CallSite::new(&action_cell, label).enfixed(out);
        out = match action.invoke(universe, feed, site) {
            Return::Local(value) => value,
            Return::Error(err) => return annotate(universe, feed, start, err),
            ret => return ret,
        };
    }
    Return::Local(out)
}

/// The enfix action the next cell in the feed names, if it names one.
fn enfix_at(feed: &Feed) -> Option<Cell> {
    let next = feed.current()?;
    if next.kind() != Kind::Word || next.is_quoted() {
        return None;
    }
    let (context, index) = resolve_word(&next, feed.specifier())?;
    context.var(index).filter(|value| value.kind() == Kind::Action && value.has_flag(CellFlags::ENFIXED))
}

/// Fills in where an error happened, unless a deeper step already did.
fn annotate(universe: &mut Universe, feed: &Feed, start: usize, mut err: Box<RenError>) -> Return {
    if err.near.is_none() {
        let window = feed.window(start, NEAR_WINDOW);
        err.near = Some(universe.mold_all(&window));
        if let Some(file) = feed.file() {
            err.file = Some(universe.interner.reverse_lookup(file).to_string());
        }
        err.line = feed.line_at(start);
    }
    Return::Error(err)
}

/// A value handed out of a variable: a fresh cell, so the variable's slot flags stay behind.
pub fn output(value: &Cell) -> Cell {
    let mut out = Cell::null();
    out.move_from(value, false);
    out
}

/// Evaluates a single cell already taken from the feed.
fn eval_cell(universe: &mut Universe, feed: &mut Feed, cell: Cell) -> Return {
    let specifier = feed.specifier().cloned();
    if cell.is_quoted() {
        let Some(inner) = cell.unquoted(1) else {
            return ErrorId::Internal("quoted cell has no quotes".to_string()).into();
        };
        return Return::Local(derelativize(&inner, specifier.as_ref()).with_flag(CellFlags::UNEVALUATED));
    }

    match cell.kind() {
        Kind::Word => {
            let value = propagate_err!(fetch_var(universe, &cell, specifier.as_ref()));
            match value.as_action() {
                Some(_) if value.has_flag(CellFlags::ENFIXED) => ErrorId::NoArg {
                    label: universe.spelling_of(&cell),
                    param: "left".to_string(),
                }
                .into(),
                Some(action) => {
                    let site = CallSite::new(&value, cell.word_symbol());
                    action.clone().invoke(universe, feed, site)
                }
                None => Return::Local(output(&value)),
            }
        }
        Kind::GetWord => {
            let value = propagate_err!(fetch_var(universe, &cell, specifier.as_ref()));
            Return::Local(output(&value))
        }
        Kind::SetWord => {
            let Some((context, index)) = resolve_word(&cell, specifier.as_ref()) else {
                return ErrorId::NotBound(universe.spelling_of(&cell)).into();
            };
            let value = propagate_err!(gather_assigned(universe, feed, &cell));
            if let Err(err) = context.set_var(index, &value) {
                return err.explain(&universe.interner).into();
            }
            Return::Local(value)
        }
        Kind::Group => match cell.as_array() {
            Some((array, index, inner)) => {
                let specifier = inner.cloned().or(specifier);
                eval_group(universe, array, index, specifier)
            }
            None => ErrorId::Internal("group without an array".to_string()).into(),
        },
        Kind::Path | Kind::SetPath | Kind::GetPath => eval_path(universe, feed, &derelativize(&cell, specifier.as_ref())),
        Kind::Action => {
            let Some(action) = cell.as_action().cloned() else {
                return ErrorId::Internal("action without an action".to_string()).into();
            };
            action.invoke(universe, feed, CallSite::new(&cell, None))
        }
        _ => Return::Local(derelativize(&cell, specifier.as_ref()).with_flag(CellFlags::UNEVALUATED)),
    }
}

/// Looks a word's variable up. Unbound words and unset variables are errors.
pub fn fetch_var(universe: &Universe, word: &Cell, specifier: Option<&Context>) -> Result<Cell, Return> {
    let Some((context, index)) = resolve_word(word, specifier) else {
        return Err(ErrorId::NotBound(universe.spelling_of(word)).into());
    };
    match context.var(index) {
        Some(value) if !value.is_unset() => Ok(value),
        _ => Err(ErrorId::NoValue(universe.spelling_of(word)).into()),
    }
}

/// Evaluates the expression on the right of an assignment. Null and void can't be assigned.
pub fn gather_assigned(universe: &mut Universe, feed: &mut Feed, target: &Cell) -> Result<Cell, Return> {
    loop {
        if feed.is_end() {
            return Err(ErrorId::NeedValue(universe.mold(target)).into());
        }
        match eval_step(universe, feed, true) {
            Return::Invisible => continue,
            Return::Local(value) if value.is_null() || value.is_void() => {
                return Err(ErrorId::NeedValue(universe.mold(target)).into());
            }
            ret => return ret.local(),
        }
    }
}
