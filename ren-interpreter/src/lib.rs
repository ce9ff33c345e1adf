//!
//! This is the evaluator for the Ren language.
//!

/// Unwraps a local return, handing anything else straight back to the caller.
macro_rules! propagate {
    ($expr:expr) => {
        match $expr {
            $crate::invokable::Return::Local(value) => value,
            ret => return ret,
        }
    };
}

/// Unwraps a `Result<_, Return>`, handing the non-local outcome straight back to the caller.
macro_rules! propagate_err {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(ret) => return ret,
        }
    };
}

/// As `propagate_err!`, inside a native dispatcher, whose outcome is wrapped in `Ok`.
macro_rules! native_try {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(ret) => return Ok(ret),
        }
    };
}

/// Binding words to contexts, relative binding and deep copies.
pub mod bind;
/// The scratch table used by bind and collect operations.
pub mod binder;
/// Value comparison.
pub mod compare;
/// Errors as the language sees them.
pub mod error;
/// Facilities for evaluating code.
pub mod evaluate;
/// The stream of cells an evaluation pulls from.
pub mod feed;
/// To interact with the heap registry.
pub mod gc;
/// The per-datatype dispatch table.
pub mod hooks;
/// Facilities for invoking actions.
pub mod invokable;
/// Turning values into text.
pub mod mold;
/// Paths: picking and poking.
pub mod path;
/// Definitions for all natives.
pub mod primitives;
/// Turning source text into values.
pub mod scan;
/// The interpreter's main data structure.
pub mod universe;
/// Facilities for manipulating values.
pub mod value;

/// VM-specific objects.
pub mod vm_objects;
