use crate::error::{ErrorId, RenError};
use crate::invokable::Return;
use crate::primitives::control::reduce_values;
use crate::primitives::NativeInfo;
use crate::universe::Universe;
use crate::value::convert::ArrayArg;
use crate::value::Cell;
use crate::vm_objects::context::{Context, Keylist};
use crate::vm_objects::frame::Frame;
use ren_value::Kind;
use std::io::Write;
use std::rc::Rc;

pub static NATIVES: &[NativeInfo] = &[
    ("print", self::print),
    ("recycle", self::recycle),
    ("stats", self::stats),
    ("trace", self::trace),
];

/// Prints a value's formed text and a newline. A block is reduced first, its values spaced apart.
fn print(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    const SIGNATURE: &str = "print";

    let value = frame.arg(1);
    let line = match frame.get::<ArrayArg>(1) {
        Ok(block) if value.kind() == Kind::Block => {
            let values = native_try!(reduce_values(universe, &block));
            values.iter().map(|value| universe.form(value)).collect::<Vec<_>>().join(" ")
        }
        _ => universe.form(&value),
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)
        .and_then(|()| stdout.flush())
        .map_err(|err| ErrorId::Internal(format!("{}: {}", SIGNATURE, err)))?;
    Ok(Return::Local(Cell::void()))
}

/// Drops dead entries from the heap registry, returning how many went.
fn recycle(universe: &mut Universe, _: &mut Frame) -> Result<Return, RenError> {
    let pruned = universe.gc_interface.prune();
    Ok(Return::Local(Cell::integer(i64::try_from(pruned).unwrap_or(i64::MAX))))
}

/// Allocation counters and the call depth, as an object.
fn stats(universe: &mut Universe, _: &mut Frame) -> Result<Return, RenError> {
    let stats = universe.stats();
    let fields = [
        ("arrays", stats.arrays_allocated),
        ("contexts", stats.contexts_allocated),
        ("prunes", stats.prunes),
        ("live-arrays", universe.gc_interface.live_arrays()),
        ("live-contexts", universe.gc_interface.live_contexts()),
        ("live-series", ren_core::series::live_series()),
        ("depth", universe.stack.len()),
    ];
    let keys: Vec<_> = fields.iter().map(|(name, _)| universe.interner.intern(name)).collect();
    let vars = fields.iter().map(|(_, count)| Cell::integer(i64::try_from(*count).unwrap_or(i64::MAX))).collect();
    let context = Context::alloc_with(&mut universe.gc_interface, Kind::Object, Rc::new(Keylist::new(keys)), vars);
    Ok(Return::Local(Cell::context(context)))
}

/// Switches the evaluator's step tracing on or off.
fn trace(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    universe.config.trace = frame.get(1)?;
    Ok(Return::Local(Cell::void()))
}
