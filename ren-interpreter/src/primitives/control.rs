use crate::bind::{bind_deep, copy_array_deep};
use crate::compare::equal;
use crate::error::{ErrorId, RenError};
use crate::evaluate::{eval_array, eval_block, eval_step};
use crate::feed::Feed;
use crate::invokable::{apply, run_frame, Return, Thrown};
use crate::primitives::NativeInfo;
use crate::universe::Universe;
use crate::value::convert::ArrayArg;
use crate::value::Cell;
use crate::vm_objects::context::{Context, Keylist};
use crate::vm_objects::frame::{Frame, FrameState};
use crate::vm_objects::text::Text;
use log::trace;
use ren_value::Kind;
use std::rc::Rc;

pub static NATIVES: &[NativeInfo] = &[
    ("unwind", self::unwind),
    ("if", self::if_),
    ("either", self::either),
    ("all", self::all),
    ("any", self::any),
    ("while", self::while_),
    ("loop", self::loop_),
    ("repeat", self::repeat),
    ("for-each", self::for_each),
    ("break", self::break_),
    ("continue", self::continue_),
    ("catch", self::catch),
    ("throw", self::throw),
    ("trap", self::trap),
    ("fail", self::fail),
    ("halt", self::halt),
    ("do", self::do_),
    ("reduce", self::reduce),
];

/// The dispatcher behind every definitional RETURN.
///
/// Each function call gets its own copy of the RETURN action, bound to the call's frame. The
/// value travels up to that frame and nowhere else, whatever else is running in between.
pub fn return_native(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    let Some(target) = frame.binding.clone() else {
        return Err(ErrorId::NotRunning("the function for return".to_string()).into());
    };
    if !universe.stack.iter().any(|entry| entry.id == target.id()) {
        return Err(ErrorId::NotRunning("the function for return".to_string()).into());
    }
    if let Some(types) = target.phase().and_then(|phase| phase.return_types()) {
        if !types.contains(value.type_of()) {
            let kind = if value.is_null() { "null".to_string() } else { value.type_of().to_string() };
            return Err(ErrorId::BadReturnType(kind).into());
        }
    }
    trace!("return to frame {:?}", target.id());
    Ok(Return::NonLocal(target.id(), value))
}

/// Ends a call early: the frame given, the nearest running call of an action, or the call so many
/// levels up from the caller.
fn unwind(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let level = frame.arg(1);
    let value = frame.arg(2);
    let own = frame.id();
    let mut callers = universe.stack.iter().rev().filter(|entry| entry.id != own);
    let target = if let Some(context) = level.as_context() {
        callers.find(|entry| entry.id == context.id()).map(|entry| entry.id)
    } else if let Some(action) = level.as_action() {
        callers.find(|entry| entry.state != FrameState::Fulfilling && entry.original.ptr_eq(action)).map(|entry| entry.id)
    } else if let Some(depth) = level.as_integer() {
        usize::try_from(depth).ok().filter(|depth| *depth > 0).and_then(|depth| callers.nth(depth - 1)).map(|entry| entry.id)
    } else {
        None
    };
    match target {
        Some(id) => Ok(Return::Unwind(id, value)),
        None => Err(ErrorId::NotRunning(universe.mold(&level)).into()),
    }
}

/// Runs a branch: a block is evaluated, an action is called with `arg`.
fn run_branch(universe: &mut Universe, branch: &Cell, arg: &Cell) -> Return {
    match branch.as_action() {
        Some(action) => apply(universe, action, branch.action_binding().cloned(), branch.action_label(), vec![arg.clone()]),
        None => eval_block(universe, branch),
    }
}

fn condition(universe: &mut Universe, value: &Cell) -> Result<bool, RenError> {
    value.truthiness().ok_or_else(|| ErrorId::NeedValue(format!("condition {}", universe.mold(value))).into())
}

fn if_(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    if condition(universe, &value)? {
        Ok(run_branch(universe, &frame.arg(2), &value))
    } else {
        Ok(Return::Local(Cell::null()))
    }
}

fn either(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    let branch = if condition(universe, &value)? { frame.arg(2) } else { frame.arg(3) };
    Ok(run_branch(universe, &branch, &value))
}

/// Steps through a block, stopping at the first value `stop_at` picks out.
fn scan_block(universe: &mut Universe, block: &ArrayArg, stop_at: impl Fn(bool) -> bool) -> Result<Option<Cell>, Return> {
    let mut feed = Feed::new(block.array.clone(), block.index, block.specifier.clone());
    let mut last = None;
    while !feed.is_end() {
        let value = match eval_step(universe, &mut feed, true) {
            Return::Local(value) => value,
            Return::Invisible => continue,
            ret => return Err(ret),
        };
        match value.truthiness() {
            Some(truth) if stop_at(truth) => return Ok(Some(value)),
            Some(_) => last = Some(value),
            None => {}
        }
    }
    Err(Return::Local(last.unwrap_or_else(Cell::void)))
}

fn all(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let block: ArrayArg = frame.get(1)?;
    match scan_block(universe, &block, |truth| !truth) {
        Ok(_) => Ok(Return::Local(Cell::null())),
        Err(ret) => Ok(ret),
    }
}

fn any(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let block: ArrayArg = frame.get(1)?;
    match scan_block(universe, &block, |truth| truth) {
        Ok(found) => Ok(Return::Local(found.unwrap_or_else(Cell::null))),
        Err(Return::Local(_)) => Ok(Return::Local(Cell::null())),
        Err(ret) => Ok(ret),
    }
}

/// Runs a loop body once. `Ok(None)` means the iteration produced nothing (CONTINUE); `Err` is
/// the loop's own outcome when it has to stop.
fn run_loop_body(universe: &mut Universe, body: &Cell) -> Result<Option<Cell>, Return> {
    match eval_block(universe, body) {
        Return::Local(value) => Ok(Some(value)),
        Return::Invisible | Return::Continue => Ok(None),
        Return::Break => Err(Return::Local(Cell::null())),
        ret => Err(ret),
    }
}

fn while_(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let test = frame.arg(1);
    let body = frame.arg(2);
    let mut last = Cell::void();
    loop {
        let value = native_try!(eval_block(universe, &test).local());
        if !condition(universe, &value)? {
            return Ok(Return::Local(last));
        }
        if let Some(value) = native_try!(run_loop_body(universe, &body)) {
            last = value;
        }
    }
}

fn loop_(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let count: i64 = frame.get(1)?;
    let body = frame.arg(2);
    let mut last = Cell::void();
    for _ in 0..count.max(0) {
        if let Some(value) = native_try!(run_loop_body(universe, &body)) {
            last = value;
        }
    }
    Ok(Return::Local(last))
}

/// A fresh context holding the loop variable, and a copy of the body bound to it.
fn bind_loop_var(universe: &mut Universe, word: &Cell, body: &ArrayArg) -> Result<(Context, Cell), RenError> {
    let symbol = word.word_symbol().ok_or_else(|| ErrorId::BadPath(universe.mold(word)))?;
    let context = Context::alloc_with(&mut universe.gc_interface, Kind::Object, Rc::new(Keylist::new([symbol])), vec![Cell::unset()]);
    let copy = copy_array_deep(&mut universe.gc_interface, &body.array, body.index, body.specifier.as_ref(), true);
    bind_deep(&mut universe.binder, &copy, 0, &context, false, true);
    Ok((context, Cell::array(Kind::Block, copy)))
}

fn repeat(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let count: i64 = frame.get(2)?;
    let body: ArrayArg = frame.get(3)?;
    let (context, body) = bind_loop_var(universe, &frame.arg(1), &body)?;
    let mut last = Cell::void();
    for index in 1..=count.max(0) {
        context.set_var(1, &Cell::integer(index)).map_err(|err| err.explain(&universe.interner))?;
        if let Some(value) = native_try!(run_loop_body(universe, &body)) {
            last = value;
        }
    }
    Ok(Return::Local(last))
}

fn for_each(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let data = frame.arg(2);
    let body: ArrayArg = frame.get(3)?;
    let (context, body) = bind_loop_var(universe, &frame.arg(1), &body)?;
    let items: Vec<Cell> = if let Some((array, index, specifier)) = data.as_array() {
        array.to_vec_from(index).iter().map(|cell| crate::bind::derelativize(cell, specifier)).collect()
    } else if let Some((text, index)) = data.as_string() {
        text.chars_from(index).into_iter().map(Cell::char).collect()
    } else if let Some(source) = data.as_context() {
        source.visible(false).into_iter().map(|(symbol, _)| Cell::word(Kind::Word, symbol)).collect()
    } else {
        return Err(ErrorId::BadPath(format!("for-each on {}", data.type_of())).into());
    };
    let mut last = Cell::void();
    for item in items {
        context.set_var(1, &item).map_err(|err| err.explain(&universe.interner))?;
        if let Some(value) = native_try!(run_loop_body(universe, &body)) {
            last = value;
        }
    }
    Ok(Return::Local(last))
}

fn break_(_: &mut Universe, _: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Break)
}

fn continue_(_: &mut Universe, _: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Continue)
}

/// Whether a CATCH asking for `names` catches a throw named `name`.
fn catches(universe: &Universe, names: &Cell, name: Option<&Cell>) -> bool {
    match (names.is_null(), name) {
        (true, None) => true,
        (true, Some(_)) | (false, None) => false,
        (false, Some(name)) => match names.as_array() {
            Some((array, index, _)) => array.to_vec_from(index).iter().any(|candidate| equal(&universe.hooks, candidate, name, false)),
            None => equal(&universe.hooks, names, name, false),
        },
    }
}

fn catch(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let names = if frame.refinement(2) { frame.arg(3) } else { Cell::null() };
    match eval_block(universe, &frame.arg(1)) {
        Return::Throw(thrown) if catches(universe, &names, thrown.name.as_ref()) => {
            trace!("caught a throw");
            Ok(Return::Local(thrown.value))
        }
        ret => Ok(ret),
    }
}

fn throw(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let name = if frame.refinement(2) { Some(frame.arg(3)) } else { None };
    Ok(Return::Throw(Box::new(Thrown { name, value: frame.arg(1) })))
}

/// Runs a block, turning an error into an ERROR! value. Null if there was no error.
fn trap(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    match eval_block(universe, &frame.arg(1)) {
        Return::Error(err) if !err.is_halt() => {
            trace!("trapped {}", err.id);
            Ok(Return::Local(Cell::context(universe.make_error_context(&err))))
        }
        Return::Local(_) | Return::Invisible => Ok(Return::Local(Cell::null())),
        ret => Ok(ret),
    }
}

fn fail(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let reason = frame.arg(1);
    if let Some(context) = reason.as_context() {
        return Err(universe.error_from_context(context));
    }
    let message = match reason.as_array() {
        Some((array, index, specifier)) => {
            let values = native_try!(reduce_values(universe, &ArrayArg {
                kind: Kind::Block,
                array: array.clone(),
                index,
                specifier: specifier.cloned()
            }));
            values.iter().map(|value| universe.form(value)).collect::<Vec<_>>().join(" ")
        }
        None => universe.form(&reason),
    };
    Err(RenError::user(message))
}

fn halt(_: &mut Universe, _: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Halt)
}

fn do_(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let source = frame.arg(1);
    match source.kind() {
        Kind::Block | Kind::Group => Ok(eval_block(universe, &source)),
        Kind::Frame => {
            let context = source.as_context().cloned().ok_or_else(|| ErrorId::Internal("frame! without a context".to_string()))?;
            Ok(run_frame(universe, &context, None))
        }
        Kind::Text => {
            let text: Text = frame.get(1)?;
            let array = universe.load(&text.to_string_from(0), None)?;
            Ok(eval_array(universe, &array, 0, None))
        }
        Kind::Action => {
            let action = source.as_action().cloned().ok_or_else(|| ErrorId::Internal("action! without an action".to_string()))?;
            Ok(apply(universe, &action, source.action_binding().cloned(), source.action_label(), Vec::new()))
        }
        _ => Err(ErrorId::BadPath(format!("do on {}", source.type_of())).into()),
    }
}

/// Evaluates every expression of a block. Void results are left out; null ones are an error,
/// since a block can't hold them.
pub fn reduce_values(universe: &mut Universe, block: &ArrayArg) -> Result<Vec<Cell>, Return> {
    let mut feed = Feed::new(block.array.clone(), block.index, block.specifier.clone());
    let mut values = Vec::new();
    while !feed.is_end() {
        match eval_step(universe, &mut feed, true) {
            Return::Local(value) if value.is_null() => return Err(ErrorId::NeedValue("reduce".to_string()).into()),
            Return::Local(value) if value.is_void() => {}
            Return::Local(value) => values.push(value),
            Return::Invisible => {}
            ret => return Err(ret),
        }
    }
    Ok(values)
}

fn reduce(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let block: ArrayArg = frame.get(1)?;
    let values = native_try!(reduce_values(universe, &block));
    Ok(Return::Local(Cell::array(block.kind, universe.gc_interface.alloc_array(values))))
}
