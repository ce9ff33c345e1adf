use crate::bind::{bind_deep, copy_array_deep, rebind_deep};
use crate::binder::{collect_keys, CollectFlags, DupPolicy};
use crate::error::{ErrorId, RenError};
use crate::evaluate::eval_array;
use crate::gc::GcInterface;
use crate::invokable::{apply, Return};
use crate::primitives::values::TYPESETS;
use crate::primitives::NativeInfo;
use crate::universe::Universe;
use crate::value::convert::ArrayArg;
use crate::value::{Cell, TypeKey};
use crate::vm_objects::action::{Action, ActionKind, ActionMeta, Dispatcher, Param, ParamClass};
use crate::vm_objects::array::Array;
use crate::vm_objects::context::{Context, ContextFlags, Keylist};
use crate::vm_objects::frame::Frame;
use log::trace;
use ren_value::{CellFlags, Kind, Symbol, TypeSet};
use std::rc::Rc;

pub static NATIVES: &[NativeInfo] = &[
    ("func", self::func),
    ("function", self::function),
    ("does", self::does),
    ("lambda", self::lambda),
    ("native", self::native),
    ("specialize", self::specialize),
    ("adapt", self::adapt),
    ("enclose", self::enclose),
    ("augment", self::augment),
    ("enfix", self::enfix),
];

/// What a function body's result turns into when the body runs off its end.
///
/// Picked once from the spec, so the dispatcher doesn't look at the spec on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStyle {
    /// The last value of the body.
    Value,
    /// Always void (`return: <none>`).
    Void,
    /// Nothing at all, the caller's previous value stands (`return: <elide>`).
    Elide,
}

/// Which generator is making a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    /// Parameters and locals as spelled out in the spec.
    Func,
    /// As `Func`, plus a local for every set-word of the body.
    Function,
    /// No definitional RETURN.
    Lambda,
}

/// A function spec, parsed.
#[derive(Debug)]
pub struct ParsedSpec {
    pub keys: Vec<Symbol>,
    pub params: Vec<Param>,
    pub style: ReturnStyle,
    pub description: Option<String>,
}

fn bad_spec(universe: &mut Universe, cell: &Cell) -> ErrorId {
    ErrorId::BadFuncDef(universe.mold(cell))
}

/// Parses a function spec block.
///
/// `base` is how many parameters come before the ones in this spec, and `prior` their names,
/// which is how AUGMENT extends an existing parameter list.
pub fn parse_spec(universe: &mut Universe, spec: &Cell, with_return: bool, base: usize, prior: &[Symbol]) -> Result<ParsedSpec, ErrorId> {
    let Some((array, index, _)) = spec.as_array() else {
        return Err(bad_spec(universe, spec));
    };
    let mut parsed = ParsedSpec { keys: Vec::new(), params: Vec::new(), style: ReturnStyle::Value, description: None };
    let return_symbol = universe.roots.return_symbol;
    if with_return {
        parsed.keys.push(return_symbol);
        parsed.params.push(Param::new(ParamClass::Return, TypeSet::ANY_VALUE.union(TypeSet::from_kinds(&[Kind::Null, Kind::Void]))));
    }

    let mut locals = false;
    let mut refinement = None;
    let cells = array.to_vec_from(index);
    let mut cells = cells.iter();
    while let Some(cell) = cells.next() {
        if cell.quote_depth() == 1 && cell.dequoted().kind() == Kind::Word && !locals {
            let symbol = cell.dequoted().word_symbol().ok_or_else(|| bad_spec(universe, cell))?;
            let mut param = Param::new(ParamClass::HardQuote, TypeSet::ANY_VALUE);
            param.refinement = refinement;
            add_param(universe, &mut parsed, prior, symbol, param)?;
            continue;
        }
        match cell.kind() {
            _ if cell.is_quoted() => return Err(bad_spec(universe, cell)),
            Kind::Text => {
                let text = universe.form(cell);
                match parsed.params.last_mut().filter(|param| param.class != ParamClass::Return) {
                    Some(param) => param.note = Some(text),
                    None => parsed.description = Some(text),
                }
            }
            Kind::Tag if tag_is(cell, "local") => locals = true,
            Kind::Tag => return Err(bad_spec(universe, cell)),
            Kind::SetWord if with_return && cell.word_symbol().is_some_and(|symbol| symbol.same_canon(return_symbol)) => {
                let Some(types) = cells.next() else {
                    return Err(bad_spec(universe, cell));
                };
                let (style, types) = match types.kind() {
                    Kind::Tag if tag_is(types, "none") || tag_is(types, "void") => (ReturnStyle::Void, TypeSet::single(Kind::Void)),
                    Kind::Tag if tag_is(types, "elide") => (ReturnStyle::Elide, TypeSet::single(Kind::Void)),
                    Kind::Block if types.as_array().is_some_and(|(array, index, _)| array.len() <= index) => {
                        (ReturnStyle::Void, TypeSet::single(Kind::Void))
                    }
                    Kind::Block => (ReturnStyle::Value, parse_types(universe, types)?),
                    _ => return Err(bad_spec(universe, types)),
                };
                parsed.style = style;
                if let Some(slot) = parsed.params.first_mut() {
                    slot.types = types;
                }
            }
            Kind::Word => {
                let symbol = cell.word_symbol().ok_or_else(|| bad_spec(universe, cell))?;
                let param = if locals {
                    Param::new(ParamClass::Local, TypeSet::ANY_VALUE.union(TypeSet::single(Kind::Null)))
                } else {
                    let mut param = Param::new(ParamClass::Normal, TypeSet::ANY_VALUE);
                    param.refinement = refinement;
                    param
                };
                add_param(universe, &mut parsed, prior, symbol, param)?;
            }
            Kind::Refinement if !locals => {
                let symbol = cell.word_symbol().ok_or_else(|| bad_spec(universe, cell))?;
                add_param(universe, &mut parsed, prior, symbol, Param::new(ParamClass::Refinement, TypeSet::single(Kind::Logic)))?;
                refinement = Some(base + parsed.keys.len());
            }
            Kind::Block => {
                let types = parse_types(universe, cell)?;
                match parsed.params.last_mut() {
                    Some(param) if param.takes_argument() => param.types = types,
                    _ => return Err(bad_spec(universe, cell)),
                }
            }
            _ => return Err(bad_spec(universe, cell)),
        }
    }
    Ok(parsed)
}

fn tag_is(cell: &Cell, name: &str) -> bool {
    cell.kind() == Kind::Tag && cell.as_string().is_some_and(|(text, index)| text.to_string_from(index) == name)
}

fn add_param(universe: &mut Universe, parsed: &mut ParsedSpec, prior: &[Symbol], symbol: Symbol, param: Param) -> Result<(), ErrorId> {
    if parsed.keys.iter().chain(prior).any(|key| key.same_canon(symbol)) {
        return Err(ErrorId::DupVars(universe.interner.reverse_lookup(symbol).to_string()));
    }
    parsed.keys.push(symbol);
    parsed.params.push(param);
    Ok(())
}

/// Reads a block of datatypes and typesets, as given for a parameter or a return.
pub fn parse_types(universe: &mut Universe, block: &Cell) -> Result<TypeSet, ErrorId> {
    let Some((array, index, _)) = block.as_array() else {
        return Err(bad_spec(universe, block));
    };
    let mut types = TypeSet::EMPTY;
    for cell in array.to_vec_from(index) {
        if tag_is(&cell, "opt") {
            types.insert(Kind::Null);
            continue;
        }
        if tag_is(&cell, "end") || tag_is(&cell, "void") {
            types.insert(Kind::Void);
            continue;
        }
        if let Some(key) = cell.as_datatype() {
            match key {
                TypeKey::Builtin(kind) => types.insert(kind),
                TypeKey::Custom(_) => types.insert(Kind::Custom),
            }
            continue;
        }
        if let Some(set) = cell.as_typeset() {
            types = types.union(set);
            continue;
        }
        let name = universe.spelling_of(&cell);
        if cell.kind() != Kind::Word || !name.ends_with('!') {
            return Err(bad_spec(universe, &cell));
        }
        if let Some(kind) = Kind::from_name(&name) {
            types.insert(kind);
        } else if let Some((_, set)) = TYPESETS.iter().find(|(typeset, _)| typeset.eq_ignore_ascii_case(&name)) {
            types = types.union(*set);
        } else if universe.hooks.custom_id(name.trim_end_matches('!')).is_some() {
            types.insert(Kind::Custom);
        } else {
            return Err(ErrorId::BadFuncDef(format!("unknown type {}", name)));
        }
    }
    Ok(types)
}

/// Makes the FRAME!-kind context holding an action's parameter descriptors.
pub fn make_paramlist(universe: &mut Universe, keys: Vec<Symbol>, params: Vec<Param>) -> Context {
    let keylist = Rc::new(Keylist::new(keys));
    let vars = params.into_iter().map(Cell::param).collect();
    let paramlist = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, keylist, vars);
    paramlist.set_flag(ContextFlags::PARAMLIST, true);
    paramlist
}

/// Makes a function from a spec and a body.
///
/// The body is copied deep, and its words naming parameters are bound relative to the new
/// paramlist. They find their values through whichever frame is running the body.
pub fn make_function(universe: &mut Universe, spec: &Cell, body: &Cell, generator: Generator) -> Result<Action, RenError> {
    let Some((body_array, body_index, body_specifier)) = body.as_array() else {
        return Err(bad_spec(universe, body).into());
    };
    let mut parsed = parse_spec(universe, spec, generator != Generator::Lambda, 0, &[])?;
    if generator == Generator::Function {
        let keys = collect_keys(
            &mut universe.binder,
            body_array,
            body_index,
            &parsed.keys,
            CollectFlags::SET_WORDS_ONLY | CollectFlags::DEEP,
            DupPolicy::Tolerate,
            &[],
        )
        .map_err(|err| err.explain(&universe.interner))?;
        for symbol in keys.into_iter().skip(parsed.keys.len()) {
            parsed.keys.push(symbol);
            parsed.params.push(Param::new(ParamClass::Local, TypeSet::ANY_VALUE.union(TypeSet::single(Kind::Null))));
        }
    }

    let dispatcher: Dispatcher = match (generator, parsed.style) {
        (Generator::Lambda, _) => lambda_dispatcher,
        (_, ReturnStyle::Value) => func_dispatcher,
        (_, ReturnStyle::Void) => voider_dispatcher,
        (_, ReturnStyle::Elide) => elider_dispatcher,
    };
    let kind = if generator == Generator::Lambda { ActionKind::Lambda } else { ActionKind::Func };
    let paramlist = make_paramlist(universe, parsed.keys, parsed.params);
    let copy = copy_array_deep(&mut universe.gc_interface, body_array, body_index, body_specifier, true);
    bind_deep(&mut universe.binder, &copy, 0, &paramlist, true, true);
    trace!("made a function with {} parameters", paramlist.len());
    Ok(Action::new(
        paramlist,
        None,
        vec![Cell::array(Kind::Block, copy)],
        dispatcher,
        ActionMeta { kind, description: parsed.description },
    ))
}

/// A copy of a FUNC or LAMBDA whose body has the words bound into `from` bound into `to` instead.
///
/// This is how a derived object gets methods that see its own fields. Any other action comes back as is.
pub fn rebind_function(gc: &mut GcInterface, action: &Action, from: &Context, to: &Context) -> Action {
    if !matches!(action.meta().kind, ActionKind::Func | ActionKind::Lambda) {
        return action.clone();
    }
    let Some(body) = action.detail(1) else {
        return action.clone();
    };
    let Some((array, index, specifier)) = body.as_array() else {
        return action.clone();
    };
    let copy = copy_array_deep(gc, array, index, specifier, true);
    rebind_deep(&copy, from, to);
    Action::new(
        action.paramlist().clone(),
        action.exemplar().cloned(),
        vec![Cell::array(Kind::Block, copy)],
        action.dispatcher(),
        action.meta().clone(),
    )
}

/// Makes an action with a Rust dispatcher.
pub fn make_native(universe: &mut Universe, spec: &Cell, dispatcher: Dispatcher) -> Result<Action, RenError> {
    let parsed = parse_spec(universe, spec, false, 0, &[])?;
    let paramlist = make_paramlist(universe, parsed.keys, parsed.params);
    Ok(Action::new(paramlist, None, Vec::new(), dispatcher, ActionMeta { kind: ActionKind::Native, description: parsed.description }))
}

/// `make action! [[spec] [body]]`
pub fn make_action(universe: &mut Universe, _: &Cell, spec: &Cell) -> Return {
    let parts = spec.as_array().map(|(array, index, _)| array.to_vec_from(index)).unwrap_or_default();
    let [spec, body] = parts.as_slice() else {
        return ErrorId::BadMake("action! from anything but [spec body]".to_string()).into();
    };
    match make_function(universe, spec, body, Generator::Func) {
        Ok(action) => Return::Local(Cell::action(action, None, None)),
        Err(err) => err.into(),
    }
}

/// The body block of a FUNC or LAMBDA.
fn body_of(phase: &Action) -> Result<(Array, usize), ErrorId> {
    let body = phase.detail(1).ok_or_else(|| ErrorId::Internal("function without a body".to_string()))?;
    match body.as_array() {
        Some((array, index, _)) => Ok((array.clone(), index)),
        None => Err(ErrorId::Internal("function body is not a block".to_string())),
    }
}

/// Runs a function body in its frame.
fn run_body(universe: &mut Universe, frame: &mut Frame, style: ReturnStyle) -> Result<Return, RenError> {
    let phase = frame.phase.clone();
    let (array, index) = body_of(&phase)?;
    if let Some(slot) = phase.return_slot() {
        let definitional = Cell::action(universe.roots.return_action.clone(), Some(frame.varlist.clone()), Some(universe.roots.return_symbol));
        frame.varlist.init_var(slot, &definitional).map_err(|err| err.explain(&universe.interner))?;
    }

    let value = match eval_array(universe, &array, index, Some(frame.varlist.clone())) {
        Return::Local(value) => value,
        Return::Invisible => Cell::void(),
        Return::NonLocal(id, value) if id == frame.id() => value,
        ret => return Ok(ret),
    };
    match style {
        ReturnStyle::Value => {
            if let Some(types) = phase.return_types() {
                if !types.contains(value.type_of()) {
                    return Err(ErrorId::BadReturnType(value.type_of().to_string()).into());
                }
            }
            Ok(Return::Local(value))
        }
        ReturnStyle::Void => Ok(Return::Local(Cell::void())),
        ReturnStyle::Elide => Ok(Return::Invisible),
    }
}

fn func_dispatcher(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    run_body(universe, frame, ReturnStyle::Value)
}

fn voider_dispatcher(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    run_body(universe, frame, ReturnStyle::Void)
}

fn elider_dispatcher(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    run_body(universe, frame, ReturnStyle::Elide)
}

/// Lambdas have no RETURN of their own: a RETURN in the body belongs to an enclosing function and
/// passes through. The result is never typechecked.
fn lambda_dispatcher(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let (array, index) = body_of(&frame.phase)?;
    match eval_array(universe, &array, index, Some(frame.varlist.clone())) {
        Return::Invisible => Ok(Return::Local(Cell::void())),
        ret => Ok(ret),
    }
}

fn generate(universe: &mut Universe, spec: &Cell, body: &Cell, generator: Generator) -> Result<Return, RenError> {
    let action = make_function(universe, spec, body, generator)?;
    Ok(Return::Local(Cell::action(action, None, None)))
}

fn func(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    generate(universe, &frame.arg(1), &frame.arg(2), Generator::Func)
}

fn function(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    generate(universe, &frame.arg(1), &frame.arg(2), Generator::Function)
}

fn lambda(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    generate(universe, &frame.arg(1), &frame.arg(2), Generator::Lambda)
}

fn does(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let spec = Cell::array(Kind::Block, universe.gc_interface.alloc_array(Vec::new()));
    generate(universe, &spec, &frame.arg(1), Generator::Func)
}

fn native(_: &mut Universe, _: &mut Frame) -> Result<Return, RenError> {
    Err(ErrorId::BadMake("native! outside of boot".to_string()).into())
}

/// The exemplar values an action starts from: its specializations, and descriptors elsewhere.
fn exemplar_vars(action: &Action) -> Vec<Cell> {
    action
        .params()
        .into_iter()
        .map(|(index, _, param)| action.specialized(index).unwrap_or_else(|| Cell::param((*param).clone())))
        .collect()
}

/// Switches a refinement on in an exemplar. If some of its arguments are still open, the
/// refinement becomes partial: those arguments are gathered at the callsite, in order.
fn use_refinement(action: &Action, vars: &mut [Cell], partials: &mut Vec<usize>, refinement: usize) {
    vars[refinement - 1] = Cell::logic(true);
    let open = action
        .params()
        .iter()
        .any(|(index, _, param)| param.refinement == Some(refinement) && vars[index - 1].as_param().is_some());
    if open && !partials.contains(&refinement) {
        partials.push(refinement);
    }
}

fn finish_specialization(action: &Action, exemplar: Context, partials: Vec<usize>) -> Action {
    Action::with_partials(
        action.paramlist().clone(),
        Some(exemplar),
        vec![Cell::action(action.clone(), None, None)],
        delegate_dispatcher,
        ActionMeta { kind: ActionKind::Specialized, description: action.meta().description.clone() },
        partials,
    )
}

/// Specializes an action: runs `def` with the action's parameters as variables, and fixes the
/// ones it sets. The result shares the action's keylist.
pub fn specialize_action(universe: &mut Universe, action: &Action, def: &ArrayArg) -> Result<Action, Return> {
    let vars = action.params().into_iter().map(|(index, _, _)| action.specialized(index).unwrap_or_else(Cell::unset)).collect();
    let scratch = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, action.keylist(), vars);
    scratch.set_phase(Some(action.clone()), None);
    let body = copy_array_deep(&mut universe.gc_interface, &def.array, def.index, def.specifier.as_ref(), true);
    bind_deep(&mut universe.binder, &body, 0, &scratch, false, true);
    match eval_array(universe, &body, 0, None) {
        Return::Local(_) | Return::Invisible => {}
        ret => return Err(ret),
    }

    let mut vars = exemplar_vars(action);
    let mut partials = action.partials().to_vec();
    let params = action.params();
    for (index, _, _) in &params {
        if action.specialized(*index).is_some() {
            continue;
        }
        if let Some(value) = scratch.var(*index).filter(|value| !value.is_unset()) {
            vars[index - 1] = value;
        }
    }
    for (index, _, param) in &params {
        if param.class != ParamClass::Refinement || action.specialized(*index).is_some() {
            continue;
        }
        let args_set = params.iter().any(|(arg, _, arg_param)| arg_param.refinement == Some(*index) && vars[arg - 1].as_param().is_none());
        let state = if vars[index - 1].as_param().is_some() { None } else { vars[index - 1].truthiness() };
        match state {
            Some(true) => use_refinement(action, &mut vars, &mut partials, *index),
            Some(false) => {
                // switched off: its arguments go with it
                vars[index - 1] = Cell::null();
                for (arg, _, arg_param) in &params {
                    if arg_param.refinement == Some(*index) {
                        vars[arg - 1] = Cell::null();
                    }
                }
            }
            None if args_set => use_refinement(action, &mut vars, &mut partials, *index),
            None => {}
        }
    }
    partials.retain(|refinement| params.iter().any(|(arg, _, param)| param.refinement == Some(*refinement) && vars[arg - 1].as_param().is_some()));

    let exemplar = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, action.keylist(), vars);
    Ok(finish_specialization(action, exemplar, partials))
}

/// The action a get-path like `:append/only` stands for: the refinements switched on in order.
pub fn specialize_refinements(universe: &mut Universe, action: &Action, refinements: &[Symbol]) -> Result<Action, ErrorId> {
    let params = action.params();
    let mut vars = exemplar_vars(action);
    let mut partials = action.partials().to_vec();
    for refinement in refinements {
        let found = params.iter().find(|(index, symbol, param)| {
            param.class == ParamClass::Refinement && symbol.same_canon(*refinement) && !action.is_param_hidden(*index)
        });
        match found {
            Some((index, _, _)) if !partials.contains(index) => use_refinement(action, &mut vars, &mut partials, *index),
            _ => {
                return Err(ErrorId::BadRefine {
                    label: "action".to_string(),
                    refinement: universe.interner.reverse_lookup(*refinement).to_string(),
                })
            }
        }
    }
    let exemplar = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, action.keylist(), vars);
    Ok(finish_specialization(action, exemplar, partials))
}

/// Hands the frame to the action in details slot 1. Specializations and augmentations only
/// change how the frame is filled, never what runs.
fn delegate_dispatcher(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let underlying = frame.phase.detail(1).and_then(|cell| cell.as_action().cloned());
    let underlying = underlying.ok_or_else(|| ErrorId::Internal("composed action lost its underlying action".to_string()))?;
    frame.set_phase(underlying);
    Ok(Return::Restart)
}

fn specialize(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let action: Action = frame.get(1)?;
    let def: ArrayArg = frame.get(2)?;
    let specialized = native_try!(specialize_action(universe, &action, &def));
    let original = frame.arg(1);
    Ok(Return::Local(Cell::action(specialized, original.action_binding().cloned(), original.action_label())))
}

/// Runs the prelude in the frame, then hands the frame to the adaptee.
fn adapter_dispatcher(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let prelude = frame.phase.detail(1).ok_or_else(|| ErrorId::Internal("adaptation without a prelude".to_string()))?;
    let adaptee = frame.phase.detail(2).and_then(|cell| cell.as_action().cloned());
    let adaptee = adaptee.ok_or_else(|| ErrorId::Internal("adaptation without an adaptee".to_string()))?;
    let (array, index, _) = prelude.as_array().ok_or_else(|| ErrorId::Internal("prelude is not a block".to_string()))?;
    match eval_array(universe, array, index, Some(frame.varlist.clone())) {
        Return::Local(_) | Return::Invisible => {}
        ret => return Ok(ret),
    }
    frame.set_phase(adaptee);
    Ok(Return::Restart)
}

fn adapt(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let adaptee: Action = frame.get(1)?;
    let prelude: ArrayArg = frame.get(2)?;
    let copy = copy_array_deep(&mut universe.gc_interface, &prelude.array, prelude.index, prelude.specifier.as_ref(), true);
    bind_deep(&mut universe.binder, &copy, 0, adaptee.paramlist(), true, true);
    let adapted = Action::with_partials(
        adaptee.paramlist().clone(),
        adaptee.exemplar().cloned(),
        vec![Cell::array(Kind::Block, copy), Cell::action(adaptee.clone(), None, None)],
        adapter_dispatcher,
        ActionMeta { kind: ActionKind::Adapted, description: adaptee.meta().description.clone() },
        adaptee.partials().to_vec(),
    );
    Ok(Return::Local(Cell::action(adapted, None, frame.arg(1).action_label())))
}

/// Gives the outer action a FRAME! for the inner call. The outer action decides whether, and
/// how often, to DO it.
fn encloser_dispatcher(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let inner = frame.phase.detail(1).and_then(|cell| cell.as_action().cloned());
    let inner = inner.ok_or_else(|| ErrorId::Internal("enclosure without an inner action".to_string()))?;
    let outer_cell = frame.phase.detail(2).ok_or_else(|| ErrorId::Internal("enclosure without an outer action".to_string()))?;
    let outer = outer_cell.as_action().cloned().ok_or_else(|| ErrorId::Internal("outer is not an action".to_string()))?;

    let copy = frame.varlist.copy(&mut universe.gc_interface, 0, TypeSet::EMPTY);
    copy.set_phase(Some(inner), frame.binding.clone());
    Ok(apply(universe, &outer, outer_cell.action_binding().cloned(), outer_cell.action_label(), vec![Cell::context(copy)]))
}

fn enclose(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let inner: Action = frame.get(1)?;
    let _: Action = frame.get(2)?;
    let enclosed = Action::with_partials(
        inner.paramlist().clone(),
        inner.exemplar().cloned(),
        vec![Cell::action(inner.clone(), None, None), frame.arg(2)],
        encloser_dispatcher,
        ActionMeta { kind: ActionKind::Enclosed, description: inner.meta().description.clone() },
        inner.partials().to_vec(),
    );
    Ok(Return::Local(Cell::action(enclosed, None, frame.arg(1).action_label())))
}

/// Adds parameters to an action. The new keylist is forked from the action's, so the original's
/// relative words still resolve in frames of the augmented one.
fn augment(universe: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let action: Action = frame.get(1)?;
    let spec = frame.arg(2);
    let existing: Vec<Symbol> = action.params().into_iter().map(|(_, symbol, _)| symbol).collect();
    let parsed = parse_spec(universe, &spec, false, existing.len(), &existing)?;
    let new_vars: Vec<Cell> = parsed.params.into_iter().map(Cell::param).collect();

    let keylist = Rc::new(action.keylist().extended(parsed.keys).map_err(ErrorId::from)?);
    let mut vars = action.paramlist().vars();
    vars.extend(new_vars.iter().cloned());
    let paramlist = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, keylist.clone(), vars);
    paramlist.set_flag(ContextFlags::PARAMLIST, true);
    let exemplar = action.exemplar().map(|exemplar| {
        let mut vars = exemplar.vars();
        vars.extend(new_vars.iter().cloned());
        Context::alloc_with(&mut universe.gc_interface, Kind::Frame, keylist.clone(), vars)
    });

    let augmented = Action::with_partials(
        paramlist,
        exemplar,
        vec![Cell::action(action.clone(), None, None)],
        delegate_dispatcher,
        ActionMeta { kind: ActionKind::Augmented, description: action.meta().description.clone() },
        action.partials().to_vec(),
    );
    Ok(Return::Local(Cell::action(augmented, None, frame.arg(1).action_label())))
}

/// Marks an action so it takes its first argument from the left.
fn enfix(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    Ok(Return::Local(frame.arg(1).with_flag(CellFlags::ENFIXED)))
}
