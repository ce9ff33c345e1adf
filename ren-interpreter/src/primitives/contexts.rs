use crate::bind::{bind_deep, copy_array_deep, derelativize, rebind_deep, resolve_word};
use crate::binder::{collect_keys, CollectFlags, DupPolicy};
use crate::error::{ErrorId, RenError};
use crate::evaluate::eval_array;
use crate::gc::GcInterface;
use crate::invokable::Return;
use crate::primitives::functions::rebind_function;
use crate::primitives::NativeInfo;
use crate::universe::Universe;
use crate::value::convert::ArrayArg;
use crate::value::{Cell, TypeKey};
use crate::vm_objects::action::ParamClass;
use crate::vm_objects::array::Array;
use crate::vm_objects::context::{Context, ContextError, Key, KeyFlags, Keylist};
use crate::vm_objects::frame::Frame;
use log::debug;
use ren_value::{Kind, Symbol, TypeSet};
use std::rc::Rc;

pub static NATIVES: &[NativeInfo] = &[
    ("make", self::make),
    ("copy", self::copy),
    ("extend", self::extend),
    ("resolve", self::resolve),
    ("collect-words", self::collect_words),
    ("bind", self::bind),
    ("in", self::in_),
    ("get", self::get),
    ("set", self::set),
    ("words-of", self::words_of),
    ("values-of", self::values_of),
    ("binding-of", self::binding_of),
    ("protect", self::protect),
    ("unprotect", self::unprotect),
];

/// What a deep copy of a context duplicates rather than shares.
const DEEP_COPIED: TypeSet = TypeSet::ANY_ARRAY.union(TypeSet::ANY_STRING);

fn explain(universe: &Universe, err: ContextError) -> ErrorId {
    err.explain(&universe.interner)
}

/// Points words in the copied arrays of `copy` at `copy` instead of `original`.
fn rebind_copied_vars(original: &Context, copy: &Context) {
    for var in copy.vars() {
        if let Some((array, _, _)) = var.as_array() {
            rebind_deep(array, original, copy);
        }
    }
}

/// Gives `copy` its own versions of the functions it shares with `original`, seeing `copy`'s fields.
fn rebind_copied_functions(gc: &mut GcInterface, original: &Context, copy: &Context) -> Result<(), ContextError> {
    for (position, var) in copy.vars().into_iter().enumerate() {
        let Some(action) = var.as_action() else { continue };
        let rebound = rebind_function(gc, action, original, copy);
        if rebound.ptr_eq(action) {
            continue;
        }
        let mut method = var.clone();
        method.replace_action(rebound);
        copy.init_var(position + 1, &method)?;
    }
    Ok(())
}

/// The first set-word of `body` naming one of the hidden `keys`. Hidden fields can't be assigned.
fn hidden_assignment(body: &Array, keys: &[Key]) -> Option<Symbol> {
    body.to_vec_from(0)
        .iter()
        .filter(|cell| cell.kind() == Kind::SetWord)
        .filter_map(Cell::word_symbol)
        .find(|symbol| keys.iter().any(|key| key.flags.contains(KeyFlags::HIDDEN) && key.symbol.same_canon(*symbol)))
}

/// MAKE for objects, modules and errors.
///
/// Given a datatype, the set-words of the spec become the keys of a new context. Given a
/// prototype, the new context starts as a copy of it and only the spec's new set-words are
/// added; while nothing is added, the two share their keylist.
pub fn make_context(universe: &mut Universe, kind_or_proto: &Cell, spec: &Cell) -> Return {
    let mut prototype = kind_or_proto.as_context().cloned();
    let kind = match kind_or_proto.as_datatype() {
        Some(TypeKey::Builtin(kind)) => kind,
        Some(TypeKey::Custom(_)) => return ErrorId::BadMake("context from a custom type".to_string()).into(),
        None => kind_or_proto.type_of(),
    };

    if kind == Kind::Error && prototype.is_none() {
        if let Some((text, index)) = spec.as_string() {
            let err = RenError::user(text.to_string_from(index));
            return Return::Local(Cell::context(universe.make_error_context(&err)));
        }
        prototype = Some(universe.make_error_context(&RenError::user("error")));
    }

    let Some((array, index, specifier)) = spec.as_array() else {
        return ErrorId::BadMake(format!("{} from {}", kind, spec.type_of())).into();
    };
    let body = copy_array_deep(&mut universe.gc_interface, array, index, specifier, true);
    let prior_keys: Vec<Key> = prototype.iter().flat_map(|proto| proto.keylist().keys().to_vec()).collect();
    if let Some(symbol) = hidden_assignment(&body, &prior_keys) {
        return explain(universe, ContextError::Protected(symbol)).into();
    }
    let prior: Vec<Symbol> = prior_keys.iter().map(|key| key.symbol).collect();
    let keys = match collect_keys(&mut universe.binder, &body, 0, &prior, CollectFlags::SET_WORDS_ONLY, DupPolicy::Tolerate, &[]) {
        Ok(keys) => keys,
        Err(err) => return explain(universe, err).into(),
    };

    let context = match &prototype {
        Some(proto) => {
            let added = &keys[prior.len()..];
            let copy = proto.copy(&mut universe.gc_interface, added.len(), DEEP_COPIED);
            rebind_copied_vars(proto, &copy);
            if let Err(err) = rebind_copied_functions(&mut universe.gc_interface, proto, &copy) {
                return explain(universe, err).into();
            }
            for symbol in added {
                if let Err(err) = copy.append(*symbol) {
                    return explain(universe, err).into();
                }
            }
            if !added.is_empty() {
                debug!("derived {} with {} new keys", kind, added.len());
            }
            copy
        }
        None => {
            let vars = vec![Cell::unset(); keys.len()];
            Context::alloc_with(&mut universe.gc_interface, kind, Rc::new(Keylist::new(keys)), vars)
        }
    };

    bind_deep(&mut universe.binder, &body, 0, &context, false, true);
    match eval_array(universe, &body, 0, None) {
        Return::Local(_) | Return::Invisible => Return::Local(Cell::context(context)),
        ret => ret,
    }
}

/// MAKE FRAME! from an action: a frame over the action's keylist, its specializations filled in
/// and its open parameters unset, ready to be filled field by field and run with DO.
pub fn make_frame(universe: &mut Universe, _: &Cell, spec: &Cell) -> Return {
    let Some(action) = spec.as_action() else {
        return ErrorId::BadMake(format!("frame! from {}", spec.type_of())).into();
    };
    let vars = action.params().into_iter().map(|(index, _, _)| action.specialized(index).unwrap_or_else(Cell::unset)).collect();
    let frame = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, action.keylist(), vars);
    frame.set_phase(Some(action.clone()), spec.action_binding().cloned());
    Return::Local(Cell::context(frame))
}

fn make(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let kind_or_proto = frame.arg(1);
    let spec = frame.arg(2);
    let hook = match kind_or_proto.as_datatype() {
        Some(key) => universe.hooks.for_key(key).and_then(|hooks| hooks.make),
        None => universe.hooks.for_cell(&kind_or_proto).make,
    };
    match hook {
        Some(hook) => Ok(hook(universe, &kind_or_proto, &spec)),
        None => Err(ErrorId::BadMake(format!("{} from {}", universe.mold(&kind_or_proto), spec.type_of())).into()),
    }
}

fn copy(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    let deep = frame.refinement(2);
    if let Some(context) = value.as_context() {
        let copy = context.copy(&mut universe.gc_interface, 0, if deep { DEEP_COPIED } else { TypeSet::EMPTY });
        if deep {
            rebind_copied_vars(context, &copy);
        }
        return Ok(Return::Local(Cell::phased_context(copy, value.context_phase().cloned())));
    }
    if let Some((array, index, specifier)) = value.as_array() {
        let copied = copy_array_deep(&mut universe.gc_interface, array, index, specifier, deep);
        return Ok(Return::Local(Cell::array(value.kind(), copied)));
    }
    if let Some((text, index)) = value.as_string() {
        return Ok(Return::Local(Cell::string(value.kind(), text.copy_from(index), 0)));
    }
    Ok(Return::Local(value))
}

/// Adds a variable to a context, or sets it if the context already has one by that name.
fn extend(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let context: Context = frame.get(1)?;
    let symbol: Symbol = frame.get(2)?;
    let value = frame.arg(3);
    let index = match context.find(symbol, false) {
        Some(index) => index,
        None => context.append(symbol).map_err(|err| explain(universe, err))?,
    };
    context.set_var(index, &value).map_err(|err| explain(universe, err))?;
    Ok(Return::Local(value))
}

/// Copies the values of `source` into matching keys of `target`.
///
/// Only unset slots are filled unless /ALL is used; /ONLY restricts it to a list of words, or to
/// the source keys from an index on; /EXTEND adds keys `target` lacks.
fn resolve(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let target: Context = frame.get(1)?;
    let source: Context = frame.get(2)?;
    let only = if frame.refinement(3) { Some(frame.arg(4)) } else { None };
    let all = frame.refinement(5);
    let expand = frame.refinement(6);

    let wanted = |position: usize, symbol: Symbol| match &only {
        None => true,
        Some(limit) => match (limit.as_integer(), limit.as_array()) {
            (Some(from), _) => i64::try_from(position + 1).is_ok_and(|index| index >= from),
            (_, Some((array, index, _))) => array
                .to_vec_from(index)
                .iter()
                .any(|word| word.word_symbol().is_some_and(|other| other.same_canon(symbol))),
            _ => false,
        },
    };

    for (position, (symbol, value)) in source.visible(false).into_iter().enumerate() {
        if !wanted(position, symbol) || value.is_unset() {
            continue;
        }
        let index = match target.find(symbol, false) {
            Some(index) => {
                let unset = target.var(index).map_or(true, |current| current.is_unset());
                if !all && !unset {
                    continue;
                }
                index
            }
            None if expand => target.append(symbol).map_err(|err| explain(universe, err))?,
            None => continue,
        };
        target.set_var(index, &value).map_err(|err| explain(universe, err))?;
    }
    Ok(Return::Local(frame.arg(1)))
}

/// The spellings a context has keys for, or the words a block holds.
fn symbols_of(cell: &Cell) -> Vec<Symbol> {
    if let Some(context) = cell.as_context() {
        return context.visible(false).into_iter().map(|(symbol, _)| symbol).collect();
    }
    cell.as_array()
        .map(|(array, index, _)| array.to_vec_from(index).iter().filter_map(Cell::word_symbol).collect())
        .unwrap_or_default()
}

fn collect_words(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let block: ArrayArg = frame.get(1)?;
    let mut flags = if frame.refinement(3) { CollectFlags::SET_WORDS_ONLY } else { CollectFlags::ANY_WORDS };
    if frame.refinement(2) {
        flags |= CollectFlags::DEEP;
    }
    let ignore = if frame.refinement(4) { symbols_of(&frame.arg(5)) } else { Vec::new() };
    let symbols = collect_keys(&mut universe.binder, &block.array, block.index, &[], flags, DupPolicy::Tolerate, &ignore)
        .map_err(|err| explain(universe, err))?;
    let words = symbols.into_iter().map(|symbol| Cell::word(Kind::Word, symbol)).collect();
    Ok(Return::Local(Cell::array(Kind::Block, universe.gc_interface.alloc_array(words))))
}

/// The context a BIND target stands for: a context itself, or the one a word is bound into.
fn bind_target(universe: &Universe, target: &Cell) -> Result<(Context, bool), ErrorId> {
    if let Some(context) = target.as_context() {
        return Ok((context.clone(), target.context_phase().is_some()));
    }
    match resolve_word(target, None) {
        Some((context, _)) => Ok((context, false)),
        None => Err(ErrorId::NotBound(universe.spelling_of(target))),
    }
}

fn bind(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let words = frame.arg(1);
    let (context, phased) = bind_target(universe, &frame.arg(2))?;
    if let Some((array, index, specifier)) = words.as_array() {
        let array = if frame.refinement(3) {
            copy_array_deep(&mut universe.gc_interface, array, index, specifier, true)
        } else {
            array.clone()
        };
        let start = if frame.refinement(3) { 0 } else { index };
        bind_deep(&mut universe.binder, &array, start, &context, phased, true);
        return Ok(Return::Local(Cell::array_at(words.kind(), array, start, None)));
    }
    let symbol: Symbol = frame.get(1)?;
    match context.find_phased(symbol, false, phased) {
        Some(index) => {
            let mut word = words.clone();
            word.bind_word(context, index);
            Ok(Return::Local(word))
        }
        None => Err(ErrorId::NotBound(universe.spelling_of(&words)).into()),
    }
}

fn in_(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let context: Context = frame.get(1)?;
    let word = frame.arg(2);
    let symbol: Symbol = frame.get(2)?;
    let phased = frame.arg(1).context_phase().is_some();
    match context.find_phased(symbol, false, phased) {
        Some(index) => {
            let mut bound = word.dequoted();
            bound.bind_word(context, index);
            Ok(Return::Local(bound))
        }
        None => Ok(Return::Local(Cell::null())),
    }
}

/// Where a word argument leads, as an error if it leads nowhere.
fn word_slot(universe: &Universe, word: &Cell) -> Result<(Context, usize), ErrorId> {
    resolve_word(word, None).ok_or_else(|| ErrorId::NotBound(universe.spelling_of(word)))
}

fn get(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let word = frame.arg(1);
    let (context, index) = word_slot(universe, &word)?;
    match context.var(index) {
        Some(value) if value.is_unset() && frame.refinement(2) => Ok(Return::Local(Cell::null())),
        Some(value) if !value.is_unset() => Ok(Return::Local(crate::evaluate::output(&value))),
        _ => Err(ErrorId::NoValue(universe.spelling_of(&word)).into()),
    }
}

/// Sets a word, or each word of a block. A block of values is spread over a block of words.
fn set(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let target = frame.arg(1);
    let value = frame.arg(2);
    let words = match target.as_array() {
        Some((array, index, specifier)) => array.to_vec_from(index).iter().map(|word| derelativize(word, specifier)).collect(),
        None => vec![target.clone()],
    };
    let spread = if target.as_array().is_some() {
        value.as_array().map(|(array, index, specifier)| {
            array.to_vec_from(index).iter().map(|cell| derelativize(cell, specifier)).collect::<Vec<_>>()
        })
    } else {
        None
    };
    for (position, word) in words.iter().enumerate() {
        let (context, slot) = word_slot(universe, word)?;
        let item = match &spread {
            Some(values) => values.get(position).cloned().unwrap_or_else(Cell::blank),
            None => value.clone(),
        };
        context.set_var(slot, &item).map_err(|err| explain(universe, err))?;
    }
    Ok(Return::Local(value))
}

fn words_of(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value = frame.arg(1);
    let words: Vec<Cell> = if let Some(action) = value.as_action() {
        action
            .params()
            .into_iter()
            .filter(|(index, _, _)| !action.is_param_hidden(*index))
            .map(|(_, symbol, param)| match param.class {
                ParamClass::Refinement => Cell::word(Kind::Refinement, symbol),
                ParamClass::HardQuote => Cell::word(Kind::Word, symbol).quoted(1),
                _ => Cell::word(Kind::Word, symbol),
            })
            .collect()
    } else {
        symbols_of(&value).into_iter().map(|symbol| Cell::word(Kind::Word, symbol)).collect()
    };
    Ok(Return::Local(Cell::array(Kind::Block, universe.gc_interface.alloc_array(words))))
}

fn values_of(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let context: Context = frame.get(1)?;
    let phased = frame.arg(1).context_phase().is_some();
    let values = context
        .visible(phased)
        .into_iter()
        .map(|(_, value)| if value.is_value() { crate::evaluate::output(&value) } else { Cell::blank() })
        .collect();
    Ok(Return::Local(Cell::array(Kind::Block, universe.gc_interface.alloc_array(values))))
}

/// The context a word is bound into. A running frame comes back phased, locals and all.
fn binding_of(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let word = frame.arg(1);
    let Some((context, _)) = word.word_binding() else {
        return Ok(Return::Local(Cell::null()));
    };
    let value = match context.kind() {
        _ if context.is_paramlist() => Cell::null(),
        Kind::Frame => Cell::phased_context(context.clone(), context.phase()),
        _ => Cell::context(context.clone()),
    };
    Ok(Return::Local(value))
}

/// The variables a PROTECT target covers: a word's, all of a context's, or those of a block of words.
fn protected_slots(universe: &Universe, target: &Cell) -> Result<Vec<(Context, usize)>, ErrorId> {
    if let Some(context) = target.as_context() {
        return Ok(context.bindable(false).into_iter().map(|(index, _)| (context.clone(), index)).collect());
    }
    if let Some((array, index, specifier)) = target.as_array() {
        return array
            .to_vec_from(index)
            .iter()
            .filter(|cell| cell.kind().is_word())
            .map(|word| resolve_word(word, specifier).ok_or_else(|| ErrorId::NotBound(universe.spelling_of(word))))
            .collect();
    }
    word_slot(universe, target).map(|slot| vec![slot])
}

fn protect(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let target = frame.arg(1);
    let hide = frame.refinement(2);
    for (context, index) in protected_slots(universe, &target)? {
        context.protect(index, true).map_err(|err| explain(universe, err))?;
        if hide {
            context.hide(index).map_err(|err| explain(universe, err))?;
        }
    }
    Ok(Return::Local(target))
}

fn unprotect(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let target = frame.arg(1);
    for (context, index) in protected_slots(universe, &target)? {
        context.protect(index, false).map_err(|err| explain(universe, err))?;
    }
    Ok(Return::Local(target))
}
