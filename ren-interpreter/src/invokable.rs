use crate::bind::derelativize;
use crate::error::{ErrorId, RenError};
use crate::evaluate::eval_step;
use crate::feed::Feed;
use crate::universe::Universe;
use crate::value::Cell;
use crate::vm_objects::action::{Action, Param, ParamClass};
use crate::vm_objects::context::{Context, ContextFlags, ContextId};
use crate::vm_objects::frame::{Frame, FrameState};
use log::trace;
use ren_value::{Kind, Symbol};

/// Bytes of native stack that must be left before a nested call is allowed to proceed.
const RED_ZONE: usize = 100 * 1024;
/// How much native stack to add when the red zone is reached.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Represents the kinds of possible returns from an evaluation.
#[derive(Debug)]
pub enum Return {
    /// A local return, the value is for the immediate caller.
    Local(Cell),
    /// Nothing was produced; the previous result stands.
    Invisible,
    /// A definitional RETURN, travelling to the frame with this id.
    NonLocal(ContextId, Cell),
    /// An UNWIND, travelling to the frame with this id.
    Unwind(ContextId, Cell),
    /// Loop control.
    Break,
    Continue,
    /// A THROW, looking for a matching CATCH.
    Throw(Box<Thrown>),
    /// An error, looking for a TRAP.
    Error(Box<RenError>),
    /// A halt request, expected to bubble all the way up.
    Halt,
    /// A request to run the frame again under its new phase. Never leaves the call it was raised in.
    Restart,
}

#[derive(Debug)]
pub struct Thrown {
    pub name: Option<Cell>,
    pub value: Cell,
}

impl Return {
    pub fn error(err: impl Into<RenError>) -> Return {
        Return::Error(Box::new(err.into()))
    }

    /// Splits off the value of a local return; anything else is handed back as the error side.
    pub fn local(self) -> Result<Cell, Return> {
        match self {
            Return::Local(value) => Ok(value),
            other => Err(other),
        }
    }

    /// The reverse of `local`.
    pub fn from_result(result: Result<Cell, Return>) -> Return {
        match result {
            Ok(value) => Return::Local(value),
            Err(other) => other,
        }
    }
}

impl From<ErrorId> for Return {
    fn from(id: ErrorId) -> Self {
        Return::error(id)
    }
}

impl From<RenError> for Return {
    fn from(err: RenError) -> Self {
        Return::Error(Box::new(err))
    }
}

/// How an action is being called.
#[derive(Debug, Clone, Default)]
pub struct CallSite {
    /// Binding of the action value, which is what a definitional RETURN targets.
    pub binding: Option<Context>,
    pub label: Option<Symbol>,
    /// The value on the left of an enfix call.
    pub left: Option<Cell>,
    /// Refinements named in a path, in callsite order.
    pub refinements: Vec<Symbol>,
}

impl CallSite {
    pub fn new(action_cell: &Cell, label: Option<Symbol>) -> CallSite {
        CallSite { binding: action_cell.action_binding().cloned(), label: label.or(action_cell.action_label()), left: None, refinements: Vec::new() }
    }

    pub fn enfixed(mut self, left: Cell) -> CallSite {
        self.left = Some(left);
        self
    }

    pub fn with_refinements(mut self, refinements: Vec<Symbol>) -> CallSite {
        self.refinements = refinements;
        self
    }
}

/// The trait for invoking actions.
pub trait Invoke {
    /// Invoke within the given universe, gathering arguments from the feed.
    fn invoke(&self, universe: &mut Universe, feed: &mut Feed, site: CallSite) -> Return;
}

impl Invoke for Action {
    fn invoke(&self, universe: &mut Universe, feed: &mut Feed, site: CallSite) -> Return {
        if let Err(err) = universe.check_depth() {
            return err.into();
        }
        ensure_sufficient_stack(|| invoke_from_feed(universe, self, feed, site))
    }
}

/// Runs `f`, growing the native stack first if it is close to running out.
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

fn invoke_from_feed(universe: &mut Universe, action: &Action, feed: &mut Feed, site: CallSite) -> Return {
    let vars = (1..=action.num_params()).map(|index| action.specialized(index).unwrap_or_else(Cell::unset)).collect();
    let varlist = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, action.keylist(), vars);
    let mut frame = Frame::new(varlist, action.clone(), site.binding.clone(), site.label);

    universe.push_frame(&frame);
    let result = match fulfill(universe, &mut frame, feed, site) {
        Ok(()) => dispatch_frame(universe, &mut frame),
        Err(ret) => ret,
    };
    universe.pop_frame(&mut frame);
    finish(universe, &frame, result)
}

/// Runs an action with arguments that are already evaluated, in parameter order.
pub fn apply(universe: &mut Universe, action: &Action, binding: Option<Context>, label: Option<Symbol>, args: Vec<Cell>) -> Return {
    if let Err(err) = universe.check_depth() {
        return err.into();
    }
    let mut args = args.into_iter();
    let vars = action
        .params()
        .into_iter()
        .map(|(index, _, param)| match action.specialized(index) {
            Some(value) => value,
            None if param.takes_argument() && param.refinement.is_none() => args.next().unwrap_or_else(Cell::null),
            None => Cell::null(),
        })
        .collect();
    let varlist = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, action.keylist(), vars);
    let mut frame = Frame::new(varlist, action.clone(), binding, label);

    ensure_sufficient_stack(|| {
        universe.push_frame(&frame);
        let result = dispatch_frame(universe, &mut frame);
        universe.pop_frame(&mut frame);
        finish(universe, &frame, result)
    })
}

/// Runs a FRAME! value. The frame's variables become the call's arguments, so it can run only once.
pub fn run_frame(universe: &mut Universe, context: &Context, label: Option<Symbol>) -> Return {
    if context.has_flag(ContextFlags::STOLEN) {
        return ErrorId::FrameUsed.into();
    }
    let Some(phase) = context.phase() else {
        return ErrorId::BadMake("frame! without an action".to_string()).into();
    };
    if let Err(err) = universe.check_depth() {
        return err.into();
    }
    context.set_flag(ContextFlags::STOLEN, true);
    for (index, _, param) in phase.params() {
        let unused = match param.class {
            ParamClass::Refinement | ParamClass::Local | ParamClass::Return => true,
            ParamClass::Normal | ParamClass::HardQuote => param.refinement.is_some(),
        };
        let empty = context.var(index).map_or(true, |value| value.is_unset() || value.as_param().is_some());
        if unused && empty && phase.specialized(index).is_none() {
            let _ = context.init_var(index, &Cell::null());
        }
    }
    let mut frame = Frame::new(context.clone(), phase, context.binding(), label);

    ensure_sufficient_stack(|| {
        universe.push_frame(&frame);
        let result = dispatch_frame(universe, &mut frame);
        universe.pop_frame(&mut frame);
        finish(universe, &frame, result)
    })
}

/// Fills the frame's argument slots from the feed.
///
/// Refinements are resolved first, so the callsite can name them in any order. Arguments are then
/// gathered left to right: positional ones, then those of each refinement in the order it was named.
fn fulfill(universe: &mut Universe, frame: &mut Frame, feed: &mut Feed, site: CallSite) -> Result<(), Return> {
    frame.state = FrameState::Fulfilling;
    universe.set_frame_state(frame.id(), FrameState::Fulfilling);
    let original = frame.original.clone();
    let action = &original;
    let params = action.params();

    let mut used: Vec<usize> = action.partials().to_vec();
    for refinement in &site.refinements {
        let found = params.iter().find(|(index, symbol, param)| {
            param.class == ParamClass::Refinement && symbol.same_canon(*refinement) && !action.is_param_hidden(*index)
        });
        match found {
            Some((index, _, _)) if !used.contains(index) => used.push(*index),
            _ => {
                return Err(ErrorId::BadRefine {
                    label: universe.frame_label(frame),
                    refinement: universe.interner.reverse_lookup(*refinement).to_string(),
                }
                .into())
            }
        }
    }

    for (index, _, param) in &params {
        if action.specialized(*index).is_some() {
            continue;
        }
        let initial = match param.class {
            ParamClass::Refinement if used.contains(index) => Cell::logic(true),
            ParamClass::Normal | ParamClass::HardQuote if param.refinement.is_none() => continue,
            _ => Cell::null(),
        };
        init_arg(universe, frame, *index, &initial)?;
    }

    let lookahead = site.left.is_none();
    let mut left = site.left;
    let positionals = params.iter().filter(|(index, _, param)| param.takes_argument() && param.refinement.is_none() && action.specialized(*index).is_none());
    let groups = used.iter().flat_map(|refinement| {
        params.iter().filter(move |(index, _, param)| param.refinement == Some(*refinement) && action.specialized(*index).is_none())
    });
    for (index, symbol, param) in positionals.chain(groups) {
        let value = match left.take() {
            Some(value) => value,
            None => match gather_arg(universe, feed, param, lookahead)? {
                Some(value) => value,
                None => {
                    return Err(ErrorId::NoArg {
                        label: universe.frame_label(frame),
                        param: universe.interner.reverse_lookup(*symbol).to_string(),
                    }
                    .into())
                }
            },
        };
        init_arg(universe, frame, *index, &value)?;
    }
    Ok(())
}

fn init_arg(universe: &Universe, frame: &Frame, index: usize, value: &Cell) -> Result<(), Return> {
    frame.varlist.init_var(index, value).map_err(|err| Return::from(err.explain(&universe.interner)))
}

/// Takes one argument from the feed. `None` at the end of the feed, unless the parameter accepts
/// the end as void.
fn gather_arg(universe: &mut Universe, feed: &mut Feed, param: &Param, lookahead: bool) -> Result<Option<Cell>, Return> {
    let at_end = |param: &Param| if param.types.contains(Kind::Void) { Ok(Some(Cell::void())) } else { Ok(None) };
    if param.class == ParamClass::HardQuote {
        return match feed.take() {
            Some(cell) => Ok(Some(derelativize(&cell, feed.specifier()))),
            None => at_end(param),
        };
    }
    loop {
        if feed.is_end() {
            return at_end(param);
        }
        match eval_step(universe, feed, lookahead) {
            Return::Invisible => continue,
            ret => return ret.local().map(Some),
        }
    }
}

/// Whether a parameter accepts a value, states included.
pub fn param_allows(param: &Param, value: &Cell) -> bool {
    if value.is_unset() {
        return false;
    }
    param.types.contains(value.type_of())
}

/// Checks the frame's arguments against its phase's parameter types.
pub fn typecheck_frame(universe: &mut Universe, frame: &mut Frame) -> Result<(), ErrorId> {
    frame.state = FrameState::Typechecking;
    universe.set_frame_state(frame.id(), FrameState::Typechecking);
    for (index, symbol, param) in frame.phase.params() {
        let value = frame.arg(index);
        let ok = match param.class {
            ParamClass::Local | ParamClass::Return => true,
            ParamClass::Refinement => value.is_null() || value.as_logic().is_some(),
            ParamClass::Normal | ParamClass::HardQuote => {
                let unused_refinement = param.refinement.is_some_and(|refinement| !frame.refinement(refinement));
                (unused_refinement && value.is_null()) || param_allows(&param, &value)
            }
        };
        if !ok {
            return Err(ErrorId::ArgType {
                label: universe.frame_label(frame),
                param: universe.interner.reverse_lookup(symbol).to_string(),
                kind: if value.is_unset() { "unset".to_string() } else { value.type_of().to_string() },
            });
        }
    }
    Ok(())
}

/// Typechecks the frame, then runs dispatchers until one produces an outcome.
pub fn dispatch_frame(universe: &mut Universe, frame: &mut Frame) -> Return {
    if let Err(err) = typecheck_frame(universe, frame) {
        return err.into();
    }
    loop {
        frame.state = FrameState::Dispatching;
        universe.set_frame_state(frame.id(), FrameState::Dispatching);
        trace!("dispatching {} ({:?})", universe.frame_label(frame), frame.phase);
        let dispatcher = frame.phase.dispatcher();
        let ret = dispatcher(universe, frame).unwrap_or_else(Return::from);
        match ret {
            Return::Restart => {
                if let Err(err) = typecheck_frame(universe, frame) {
                    return err.into();
                }
            }
            ret => return ret,
        }
    }
}

/// Catches returns and unwinds aimed at this frame, and records the frame in errors passing through.
fn finish(universe: &Universe, frame: &Frame, ret: Return) -> Return {
    match ret {
        Return::NonLocal(id, value) | Return::Unwind(id, value) if id == frame.id() => {
            trace!("{} caught its return", universe.frame_label(frame));
            Return::Local(value)
        }
        Return::Error(mut err) => {
            err.where_.push(universe.frame_label(frame));
            Return::Error(err)
        }
        Return::Restart => ErrorId::Internal("restart escaped its frame".to_string()).into(),
        ret => ret,
    }
}
