use crate::bind::bind_deep;
use crate::binder::{collect_keys, Binder, CollectFlags, DupPolicy};
use crate::error::{ErrorId, RenError};
use crate::evaluate::eval_array;
use crate::gc::{GcInterface, GcStats};
use crate::hooks::{HookTable, TypeHooks};
use crate::invokable::{apply, Return};
use crate::mold::{Mold, MoldBuffer};
use crate::primitives;
use crate::scan::scan;
use crate::value::{Cell, TypeKey};
use crate::vm_objects::action::{Action, ActionKind, ActionMeta, Dispatcher, Param, ParamClass};
use crate::vm_objects::array::Array;
use crate::vm_objects::context::{Context, ContextFlags, ContextId, Keylist};
use crate::vm_objects::frame::{Frame, FrameState, StackEntry};
use crate::vm_objects::text::Text;
use anyhow::{anyhow, bail, ensure, Context as _, Error};
use log::{debug, info, trace, warn};
use ren_core::{live_series, BootPhase, Interner, UniverseConfig};
use ren_value::{Kind, KindByte, Symbol, TypeSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const NATIVES_SOURCE: &str = include_str!("../boot/natives.reb");
const BASE_SOURCE: &str = include_str!("../boot/base.reb");
const SYS_SOURCE: &str = include_str!("../boot/sys.reb");

/// Fields of every ERROR! context, in order.
const ERROR_FIELDS: [&str; 7] = ["type", "id", "message", "near", "where", "file", "line"];

/// Long-lived values every part of the evaluator may need.
pub struct Roots {
    /// The action behind every definitional RETURN. Each call gets a copy bound to its own frame.
    pub return_action: Action,
    pub return_symbol: Symbol,
}

impl Roots {
    fn new(gc: &mut GcInterface, interner: &mut Interner) -> Roots {
        let types = TypeSet::ANY_VALUE.union(TypeSet::from_kinds(&[Kind::Null, Kind::Void]));
        let keylist = Rc::new(Keylist::new([interner.intern("value")]));
        let paramlist = Context::alloc_with(gc, Kind::Frame, keylist, vec![Cell::param(Param::new(ParamClass::Normal, types))]);
        paramlist.set_flag(ContextFlags::PARAMLIST, true);
        let meta = ActionMeta { kind: ActionKind::Native, description: Some("Returns a value from the function it belongs to".to_string()) };
        let return_action = Action::new(paramlist, None, Vec::new(), primitives::control::return_native, meta);
        Roots { return_action, return_symbol: interner.intern("return") }
    }
}

/// The boot sources, scanned.
struct BootBlob {
    natives: Array,
    base: Array,
    sys: Array,
}

/// The central data structure for the interpreter.
///
/// It represents the complete state of the interpreter: the symbol table, the library, system
/// and user contexts, the heap registry and the call stack. Several universes can live side by
/// side in one process; nothing is global.
pub struct Universe {
    pub config: UniverseConfig,
    /// The string interner for symbols.
    pub interner: Interner,
    /// The heap registry.
    pub gc_interface: GcInterface,
    /// Per-datatype operations.
    pub hooks: HookTable,
    /// Scratch table for binding and collecting.
    pub binder: Binder,
    pub mold_buffer: MoldBuffer,
    /// Calls in progress, innermost last.
    pub stack: Vec<StackEntry>,
    /// Groups being evaluated, which nest on the native stack without a frame of their own.
    nesting: usize,
    /// Natives, datatypes and the mezzanine.
    pub lib: Context,
    /// The `system` object.
    pub system: Context,
    /// Where top level code binds its words.
    pub user: Context,
    pub roots: Roots,
    phase: BootPhase,
    halt: Arc<AtomicBool>,
    /// The time record of the universe's creation.
    pub start_time: Instant,
    /// Series alive before the universe was made, which shutdown doesn't answer for.
    baseline_series: usize,
}

fn enter_phase(phase: &mut BootPhase, next: BootPhase) {
    debug_assert_eq!(phase.next(), Some(next), "boot phases must run in order");
    debug!("boot: entering {}", next);
    *phase = next;
}

/// Checks the cell layout the rest of the evaluator relies on.
fn self_check() -> Result<(), Error> {
    let word = std::mem::size_of::<usize>();
    ensure!(std::mem::size_of::<Cell>() == 4 * word, "cells are {} bytes, expected {}", std::mem::size_of::<Cell>(), 4 * word);
    for kind in Kind::ALL {
        let byte = KindByte::new(kind);
        ensure!(byte.kind() == kind && byte.depth() == 0, "kind byte for {} doesn't round trip", kind.name());
        if kind == Kind::Quoted {
            // a boxed quote takes further quotes in its box, never in the header
            ensure!(byte.quoted(1).is_none(), "quoted! must not carry quotes in its header");
            continue;
        }
        let quoted = byte.quoted(1).and_then(|quoted| quoted.unquoted(1));
        ensure!(quoted == Some(byte), "quoting {} doesn't round trip", kind.name());
    }
    Ok(())
}

fn scan_boot(gc: &mut GcInterface, interner: &mut Interner, source: &str, name: &str) -> Result<Array, Error> {
    let file = interner.intern(name);
    scan(gc, interner, source, Some(file)).map_err(|err| anyhow!("boot/{}: {}", name, err))
}

impl Universe {
    /// Boots a universe, running every phase in order.
    pub fn boot(config: UniverseConfig) -> Result<Self, Error> {
        config.validate()?;
        let start_time = Instant::now();
        let baseline_series = live_series();
        let mut phase = BootPhase::Start;

        enter_phase(&mut phase, BootPhase::SelfCheck);
        self_check()?;

        enter_phase(&mut phase, BootPhase::Pools);
        let mut gc_interface = GcInterface::new();

        enter_phase(&mut phase, BootPhase::Symbols);
        let mut interner = Interner::with_capacity(512);
        for kind in Kind::ALL {
            interner.intern(&format!("{}!", kind.name()));
        }
        for name in ERROR_FIELDS {
            interner.intern(name);
        }

        enter_phase(&mut phase, BootPhase::Roots);
        let roots = Roots::new(&mut gc_interface, &mut interner);

        enter_phase(&mut phase, BootPhase::BootBlob);
        let blob = BootBlob {
            natives: scan_boot(&mut gc_interface, &mut interner, NATIVES_SOURCE, "natives.reb")?,
            base: scan_boot(&mut gc_interface, &mut interner, BASE_SOURCE, "base.reb")?,
            sys: scan_boot(&mut gc_interface, &mut interner, SYS_SOURCE, "sys.reb")?,
        };

        enter_phase(&mut phase, BootPhase::Contexts);
        let lib = Context::alloc(&mut gc_interface, Kind::Module, 256);
        let system = Context::alloc(&mut gc_interface, Kind::Object, 4);
        let user = Context::alloc(&mut gc_interface, Kind::Module, 64);

        let mut universe = Self {
            config,
            interner,
            gc_interface,
            hooks: HookTable::new(),
            binder: Binder::new(),
            mold_buffer: MoldBuffer::new(),
            stack: Vec::new(),
            nesting: 0,
            lib,
            system,
            user,
            roots,
            phase,
            halt: Arc::new(AtomicBool::new(false)),
            start_time,
            baseline_series,
        };
        for name in ["version", "product", "options"] {
            let system = universe.system.clone();
            universe.define(&system, name, &Cell::blank())?;
        }
        let system = Cell::context(universe.system.clone());
        universe.define_in_lib("system", &system)?;

        universe.advance(BootPhase::Natives);
        universe.register_natives(&blob.natives)?;
        universe.define_datatypes()?;

        universe.advance(BootPhase::Mezzanine);
        universe.run_boot_source(&blob.base, "base.reb")?;
        universe.run_boot_source(&blob.sys, "sys.reb")?;
        universe.install_options()?;

        universe.advance(BootPhase::Done);
        let elapsed = universe.start_time.elapsed();
        info!("booted in {} ms ({} µs), {} words in lib", elapsed.as_millis(), elapsed.as_micros(), universe.lib.len());
        Ok(universe)
    }

    fn advance(&mut self, next: BootPhase) {
        enter_phase(&mut self.phase, next);
    }

    pub fn phase(&self) -> BootPhase {
        self.phase
    }

    /// Adds or overwrites a field of a context.
    fn define(&mut self, context: &Context, name: &str, value: &Cell) -> Result<usize, Error> {
        let symbol = self.interner.intern(name);
        let index = match context.find(symbol, true) {
            Some(index) => index,
            None => context.append(symbol).map_err(|err| anyhow!("{}", err.explain(&self.interner)))?,
        };
        context.init_var(index, value).map_err(|err| anyhow!("{}", err.explain(&self.interner)))?;
        Ok(index)
    }

    fn define_in_lib(&mut self, name: &str, value: &Cell) -> Result<usize, Error> {
        let lib = self.lib.clone();
        self.define(&lib, name, value)
    }

    /// Makes an action for every `name: native [spec]` entry of the natives source.
    fn register_natives(&mut self, natives: &Array) -> Result<(), Error> {
        let cells = natives.to_vec_from(0);
        for entry in cells.chunks(3) {
            let [name, marker, spec] = entry else {
                bail!("boot/natives.reb ends in the middle of a definition");
            };
            let (Some(symbol), Kind::SetWord) = (name.word_symbol(), name.kind()) else {
                bail!("boot/natives.reb: expected a set-word, found {}", self.mold(name));
            };
            let spelling = self.interner.reverse_lookup(symbol).to_string();
            if marker.word_symbol().map(|symbol| self.interner.reverse_lookup(symbol)) != Some("native") || spec.kind() != Kind::Block {
                bail!("boot/natives.reb: {} is not defined as `native [spec]`", spelling);
            }
            let dispatcher = primitives::get_native(&spelling).ok_or_else(|| anyhow!("no dispatcher for native {}", spelling))?;
            let action = primitives::functions::make_native(self, spec, dispatcher).map_err(|err| anyhow!("native {}: {}", spelling, err))?;
            trace!("native {} takes {} parameters", spelling, action.num_params());
            self.define_in_lib(&spelling, &Cell::action(action, None, Some(symbol)))?;
        }
        for (name, _) in primitives::all_natives() {
            if self.interner.lookup(name).and_then(|symbol| self.lib.find(symbol, true)).is_none() {
                warn!("native {} has a dispatcher but no entry in boot/natives.reb", name);
            }
        }
        Ok(())
    }

    fn define_datatypes(&mut self) -> Result<(), Error> {
        for kind in Kind::ALL {
            self.define_in_lib(&format!("{}!", kind.name()), &Cell::datatype(TypeKey::Builtin(kind)))?;
        }
        for (name, types) in primitives::values::TYPESETS {
            self.define_in_lib(name, &Cell::typeset(*types))?;
        }
        self.define_in_lib("true", &Cell::logic(true))?;
        self.define_in_lib("false", &Cell::logic(false))?;
        self.define_in_lib("null", &Cell::null())?;
        Ok(())
    }

    fn run_boot_source(&mut self, array: &Array, name: &str) -> Result<(), Error> {
        let lib = self.lib.clone();
        self.bind_into(&lib, array, false).map_err(|err| anyhow!("boot/{}: {}", name, err))?;
        let ret = eval_array(self, array, 0, None);
        self.outcome(ret).map(drop).map_err(|err| anyhow!("boot/{} failed:\n{}", name, err))
    }

    /// Fills `system/options` from the configuration.
    fn install_options(&mut self) -> Result<(), Error> {
        let options = self
            .system
            .find(self.interner.intern("options"), false)
            .and_then(|index| self.system.var(index))
            .and_then(|value| value.as_context().cloned())
            .ok_or_else(|| anyhow!("boot/sys.reb did not make system/options"))?;
        let script = match &self.config.script {
            Some(path) => Cell::text(Text::new(&path.display().to_string())),
            None => Cell::blank(),
        };
        let args = self.config.args.iter().map(|arg| Cell::text(Text::new(arg))).collect();
        let args = Cell::array(Kind::Block, self.gc_interface.alloc_array(args));
        self.define(&options, "script", &script)?;
        self.define(&options, "args", &args)?;
        Ok(())
    }

    /// Binds every word of `array` into `context`, adding keys for words it doesn't have yet.
    ///
    /// With `inherit`, new keys start out with the library's value for the same word.
    pub fn bind_into(&mut self, context: &Context, array: &Array, inherit: bool) -> Result<(), RenError> {
        let words = collect_keys(&mut self.binder, array, 0, &[], CollectFlags::ANY_WORDS | CollectFlags::DEEP, DupPolicy::Tolerate, &[])
            .map_err(|err| RenError::new(err.explain(&self.interner)))?;
        for symbol in words {
            if context.find(symbol, false).is_some() {
                continue;
            }
            let index = context.append(symbol).map_err(|err| RenError::new(err.explain(&self.interner)))?;
            if inherit {
                if let Some(value) = self.lib.find(symbol, false).and_then(|lib_index| self.lib.var(lib_index)) {
                    let _ = context.init_var(index, &value);
                }
            }
        }
        bind_deep(&mut self.binder, array, 0, context, false, true);
        Ok(())
    }

    /// Scans source text and binds it into the user context.
    pub fn load(&mut self, source: &str, file: Option<&str>) -> Result<Array, RenError> {
        let file = file.map(|name| self.interner.intern(name));
        let array = scan(&mut self.gc_interface, &mut self.interner, source, file).map_err(RenError::new)?;
        let user = self.user.clone();
        self.bind_into(&user, &array, true)?;
        Ok(array)
    }

    /// Runs source text in the user context, returning the value of its last expression.
    pub fn run(&mut self, source: &str) -> Result<Cell, RenError> {
        let array = self.load(source, None)?;
        let ret = eval_array(self, &array, 0, None);
        self.outcome(ret)
    }

    /// Runs a script file in the user context.
    pub fn run_file(&mut self, path: &Path) -> Result<Cell, Error> {
        let source = fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
        let name = path.display().to_string();
        let array = self.load(&source, Some(&name)).map_err(|err| anyhow!("{}", err))?;
        let ret = eval_array(self, &array, 0, None);
        self.outcome(ret).map_err(|err| anyhow!("{}", err))
    }

    /// Calls the action a word names, with arguments already evaluated.
    pub fn call(&mut self, name: &str, args: Vec<Cell>) -> Result<Cell, RenError> {
        let Some(value) = self.lookup(name) else {
            return Err(RenError::new(ErrorId::NoValue(name.to_string())));
        };
        let Some(action) = value.as_action().cloned() else {
            return Err(RenError::new(ErrorId::BadPath(format!("{} is not an action", name))));
        };
        let label = self.interner.lookup_canon(name);
        let ret = apply(self, &action, value.action_binding().cloned(), label, args);
        self.outcome(ret)
    }

    /// What a word means at top level: the user context's variable, else the library's.
    pub fn lookup(&self, name: &str) -> Option<Cell> {
        let symbol = self.interner.lookup_canon(name)?;
        [&self.user, &self.lib]
            .into_iter()
            .find_map(|context| context.find(symbol, false).and_then(|index| context.var(index)).filter(|value| !value.is_unset()))
    }

    /// Turns the outcome of a top level evaluation into a value or an error.
    ///
    /// Anything still travelling when it reaches the top had nowhere to go.
    pub fn outcome(&mut self, ret: Return) -> Result<Cell, RenError> {
        match ret {
            Return::Local(value) => Ok(value),
            Return::Invisible => Ok(Cell::void()),
            Return::Error(err) => Err(*err),
            Return::Throw(thrown) => {
                let name = match &thrown.name {
                    Some(name) => self.mold(name),
                    None => self.mold(&thrown.value),
                };
                Err(RenError::new(ErrorId::NoCatch(name)))
            }
            Return::NonLocal(..) => Err(RenError::new(ErrorId::NotRunning("the function for return".to_string()))),
            Return::Unwind(..) => Err(RenError::new(ErrorId::NotRunning("the frame for unwind".to_string()))),
            Return::Break | Return::Continue => Err(RenError::new(ErrorId::NotRunning("a loop".to_string()))),
            Return::Halt => Err(RenError::new(ErrorId::Halted)),
            Return::Restart => Err(RenError::new(ErrorId::Internal("restart escaped its frame".to_string()))),
        }
    }

    /// Adds a native with a foreign dispatcher. `spec` is a function spec, without brackets.
    pub fn register_native(&mut self, name: &str, spec: &str, dispatcher: Dispatcher) -> Result<Action, RenError> {
        let array = scan(&mut self.gc_interface, &mut self.interner, spec, None).map_err(RenError::new)?;
        let action = primitives::functions::make_native(self, &Cell::array(Kind::Block, array), dispatcher)?;
        let symbol = self.interner.intern(name);
        let value = Cell::action(action.clone(), None, Some(symbol));
        for context in [self.lib.clone(), self.user.clone()] {
            if context.ptr_eq(&self.user) && context.find(symbol, false).is_none() {
                continue;
            }
            self.define(&context, name, &value).map_err(|err| RenError::new(ErrorId::Internal(err.to_string())))?;
        }
        debug!("registered native {}", name);
        Ok(action)
    }

    /// Adds a datatype implemented by an extension, and defines `name!` for it.
    pub fn register_type(&mut self, name: &str, hooks: TypeHooks) -> Result<u32, RenError> {
        let type_id = self.hooks.register_custom(name, hooks);
        self.define_in_lib(&format!("{}!", name), &Cell::datatype(TypeKey::Custom(type_id)))
            .map_err(|err| RenError::new(ErrorId::Internal(err.to_string())))?;
        Ok(type_id)
    }

    /// A flag that, once raised from any thread, halts the evaluation at its next step.
    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halt)
    }

    /// Consumes a pending halt request.
    pub fn take_halt_request(&mut self) -> bool {
        self.halt.load(Ordering::Relaxed) && self.halt.swap(false, Ordering::Relaxed)
    }

    /// How deeply evaluation is nested: calls and groups together.
    pub fn depth(&self) -> usize {
        self.stack.len() + self.nesting
    }

    /// Fails once evaluation is nested as deep as the configured limit allows.
    pub fn check_depth(&self) -> Result<(), ErrorId> {
        if self.depth() >= self.config.stack_limit {
            return Err(ErrorId::StackOverflow(self.config.stack_limit));
        }
        Ok(())
    }

    /// Runs `f` one group deeper.
    pub fn nested<R>(&mut self, f: impl FnOnce(&mut Universe) -> R) -> R {
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    pub fn push_frame(&mut self, frame: &Frame) {
        frame.varlist.set_flag(ContextFlags::LIVE, true);
        trace!("push {} at depth {}", self.frame_label(frame), self.stack.len() + 1);
        self.stack.push(StackEntry {
            id: frame.id(),
            varlist: frame.varlist.clone(),
            original: frame.original.clone(),
            label: frame.label,
            state: frame.state,
        });
    }

    pub fn pop_frame(&mut self, frame: &mut Frame) {
        frame.state = FrameState::Done;
        let popped = self.stack.pop();
        debug_assert!(popped.is_some_and(|entry| entry.id == frame.id()), "call stack out of balance");
        frame.varlist.set_flag(ContextFlags::LIVE, false);
        trace!("pop {}", self.frame_label(frame));
    }

    pub fn set_frame_state(&mut self, id: ContextId, state: FrameState) {
        if let Some(entry) = self.stack.iter_mut().rev().find(|entry| entry.id == id) {
            entry.state = state;
        }
    }

    /// The name a frame's action was called by, for error reports.
    pub fn frame_label(&self, frame: &Frame) -> String {
        match frame.label {
            Some(label) => self.interner.reverse_lookup(label).to_string(),
            None => "anonymous".to_string(),
        }
    }

    /// The spelling of a word, or an empty string for anything else.
    pub fn spelling_of(&self, cell: &Cell) -> String {
        cell.word_symbol().map(|symbol| self.interner.reverse_lookup(symbol).to_string()).unwrap_or_default()
    }

    pub fn mold(&mut self, cell: &Cell) -> String {
        let mut mold = Mold::push(&mut self.mold_buffer, &self.interner, &self.hooks, false);
        mold.value(cell);
        mold.finish()
    }

    pub fn form(&mut self, cell: &Cell) -> String {
        let mut mold = Mold::push(&mut self.mold_buffer, &self.interner, &self.hooks, true);
        mold.value(cell);
        mold.finish()
    }

    /// Molds values one after another, separated by spaces.
    pub fn mold_all(&mut self, cells: &[Cell]) -> String {
        let mut mold = Mold::push(&mut self.mold_buffer, &self.interner, &self.hooks, false);
        for (position, cell) in cells.iter().enumerate() {
            if position > 0 {
                mold.write_char(' ');
            }
            mold.value(cell);
        }
        mold.finish()
    }

    /// An ERROR! value describing an error, so user code can inspect it.
    pub fn make_error_context(&mut self, err: &RenError) -> Context {
        if let Some(context) = &err.context {
            return context.clone();
        }
        let keys: Vec<Symbol> = ERROR_FIELDS.iter().map(|name| self.interner.intern(name)).collect();
        let text_or_blank = |text: Option<&String>| text.map(|text| Cell::text(Text::new(text))).unwrap_or_else(Cell::blank);
        let where_ = err.where_.iter().map(|label| Cell::word(Kind::Word, self.interner.intern(label))).collect::<Vec<_>>();
        let vars = vec![
            Cell::word(Kind::Word, self.interner.intern(err.id.category())),
            Cell::word(Kind::Word, self.interner.intern(err.id.id_name())),
            Cell::text(Text::new(&err.id.to_string())),
            text_or_blank(err.near.as_ref()),
            Cell::array(Kind::Block, self.gc_interface.alloc_array(where_)),
            text_or_blank(err.file.as_ref()),
            if err.line > 0 { Cell::integer(i64::from(err.line)) } else { Cell::blank() },
        ];
        Context::alloc_with(&mut self.gc_interface, Kind::Error, Rc::new(Keylist::new(keys)), vars)
    }

    /// The error an ERROR! value raises when failed with.
    pub fn error_from_context(&mut self, context: &Context) -> RenError {
        let field = |universe: &mut Universe, name: &str| {
            let symbol = universe.interner.intern(name);
            context.find(symbol, false).and_then(|index| context.var(index))
        };
        let message = match field(self, "message") {
            Some(message) if message.as_string().is_some() => self.form(&message),
            Some(message) if message.is_value() => self.form(&message),
            _ => "error".to_string(),
        };
        let mut err = RenError::user(message);
        err.near = field(self, "near").filter(|near| near.as_string().is_some()).map(|near| self.form(&near));
        err.context = Some(context.clone());
        err
    }

    pub fn stats(&self) -> GcStats {
        self.gc_interface.stats()
    }

    /// Tears the universe down, returning how many series are still alive afterwards.
    ///
    /// Every context and array is emptied first, which breaks the reference cycles between
    /// them; anything left over is a leak.
    pub fn shutdown(mut self) -> usize {
        let elapsed = self.start_time.elapsed();
        debug_assert!(self.stack.is_empty(), "shutting down with calls in progress");
        debug_assert!(self.mold_buffer.is_idle(), "shutting down in the middle of a mold");
        self.gc_interface.sweep();
        let baseline = self.baseline_series;
        drop(self);
        let leaked = live_series().saturating_sub(baseline);
        if leaked > 0 {
            warn!("shutdown left {} series alive", leaked);
        } else {
            info!("shutdown after {} ms, all series released", elapsed.as_millis());
        }
        leaked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_check_accepts_this_build() {
        assert!(self_check().is_ok(), "{:?}", self_check());
    }

    #[test]
    fn boot_reaches_the_last_phase() {
        let universe = Universe::boot(UniverseConfig::default()).expect("boot failed");
        assert_eq!(universe.phase(), BootPhase::Done);
        assert_eq!(universe.shutdown(), 0);
    }
}
