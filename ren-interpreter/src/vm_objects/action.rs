use crate::error::RenError;
use crate::invokable::Return;
use crate::universe::Universe;
use crate::value::Cell;
use crate::vm_objects::context::{Context, Keylist};
use crate::vm_objects::frame::Frame;
use ren_core::{Series, SeriesFlags};
use ren_value::{Kind, Symbol, TypeSet};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// What runs an action once its frame is filled.
pub type Dispatcher = fn(&mut Universe, &mut Frame) -> Result<Return, RenError>;

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// How a parameter gets its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamClass {
    /// Evaluated from the callsite.
    Normal,
    /// Taken literally from the callsite (`'name` in a spec).
    HardQuote,
    /// A `/name` switch. Logic true when used, null otherwise.
    Refinement,
    /// Private to the body.
    Local,
    /// The definitional RETURN slot.
    Return,
}

/// A parameter descriptor, as stored in a paramlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub class: ParamClass,
    /// Accepted types. Null is accepted only if `Kind::Null` is in the set.
    pub types: TypeSet,
    /// Index of the refinement this argument belongs to, if any.
    pub refinement: Option<usize>,
    pub note: Option<String>,
}

impl Param {
    pub fn new(class: ParamClass, types: TypeSet) -> Param {
        Param { class, types, refinement: None, note: None }
    }

    /// Whether the argument is gathered from the callsite.
    pub fn takes_argument(&self) -> bool {
        matches!(self.class, ParamClass::Normal | ParamClass::HardQuote)
    }

    pub fn accepts(&self, value: &Cell) -> bool {
        self.types.contains(value.type_of())
    }
}

/// Which flavour of action this is. Drives molding and the help text, never dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Native,
    Func,
    Lambda,
    Specialized,
    Adapted,
    Enclosed,
    Augmented,
}

#[derive(Debug, Clone)]
pub struct ActionMeta {
    pub kind: ActionKind,
    pub description: Option<String>,
}

pub struct ActionData {
    id: u64,
    /// A frame-kind context whose vars are the parameter descriptors.
    paramlist: Context,
    /// Values for specialized parameters, same keylist as the paramlist. Unspecialized slots hold the descriptor.
    exemplar: Option<Context>,
    /// Slot 0 is the archetype, the rest is whatever the dispatcher needs (body, underlying actions...).
    details: Series<Cell>,
    dispatcher: Dispatcher,
    meta: ActionMeta,
    /// Refinements already switched on by specialization, whose arguments are still to be gathered, in order.
    partials: Vec<usize>,
}

/// Anything invokable: natives, functions and their compositions.
#[derive(Clone)]
pub struct Action(Rc<ActionData>);

impl Action {
    pub fn new(paramlist: Context, exemplar: Option<Context>, details: Vec<Cell>, dispatcher: Dispatcher, meta: ActionMeta) -> Action {
        Self::with_partials(paramlist, exemplar, details, dispatcher, meta, Vec::new())
    }

    pub fn with_partials(
        paramlist: Context,
        exemplar: Option<Context>,
        details: Vec<Cell>,
        dispatcher: Dispatcher,
        meta: ActionMeta,
        partials: Vec<usize>,
    ) -> Action {
        debug_assert!(paramlist.is_paramlist());
        let mut cells = Vec::with_capacity(details.len() + 1);
        cells.push(Cell::archetype(Kind::Action, None, None));
        cells.extend(details);
        let mut details = Series::from_vec(cells, SeriesFlags::ARRAY);
        details.freeze();
        Action(Rc::new(ActionData {
            id: NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed),
            paramlist,
            exemplar,
            details,
            dispatcher,
            meta,
            partials,
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn paramlist(&self) -> &Context {
        &self.0.paramlist
    }

    pub fn exemplar(&self) -> Option<&Context> {
        self.0.exemplar.as_ref()
    }

    pub fn keylist(&self) -> Rc<Keylist> {
        self.0.paramlist.keylist()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.0.dispatcher
    }

    pub fn meta(&self) -> &ActionMeta {
        &self.0.meta
    }

    pub fn partials(&self) -> &[usize] {
        &self.0.partials
    }

    /// Details slot `index`, counting from 1.
    pub fn detail(&self, index: usize) -> Option<Cell> {
        if index == 0 {
            return None;
        }
        self.0.details.get(index).cloned()
    }

    pub fn num_params(&self) -> usize {
        self.0.paramlist.len()
    }

    pub fn param(&self, index: usize) -> Option<Rc<Param>> {
        self.0.paramlist.var(index).and_then(|cell| cell.as_param().cloned())
    }

    pub fn param_symbol(&self, index: usize) -> Option<Symbol> {
        self.0.paramlist.symbol(index)
    }

    /// Parameters and their descriptors, in order.
    pub fn params(&self) -> Vec<(usize, Symbol, Rc<Param>)> {
        (1..=self.num_params())
            .filter_map(|index| Some((index, self.param_symbol(index)?, self.param(index)?)))
            .collect()
    }

    /// The specialized value of a parameter, if it has one.
    pub fn specialized(&self, index: usize) -> Option<Cell> {
        let exemplar = self.0.exemplar.as_ref()?;
        let value = exemplar.var(index)?;
        if value.as_param().is_some() {
            None
        } else {
            Some(value)
        }
    }

    /// Whether a parameter is private to the body: locals, the return slot, and anything specialized out.
    pub fn is_param_hidden(&self, index: usize) -> bool {
        match self.param(index) {
            Some(param) => {
                matches!(param.class, ParamClass::Local | ParamClass::Return)
                    || (self.specialized(index).is_some() && !self.0.partials.contains(&index))
            }
            None => false,
        }
    }

    /// Index of the definitional RETURN slot, if this action has one.
    pub fn return_slot(&self) -> Option<usize> {
        self.param(1).filter(|param| param.class == ParamClass::Return).map(|_| 1)
    }

    /// Types RETURN accepts.
    pub fn return_types(&self) -> Option<TypeSet> {
        self.param(1).filter(|param| param.class == ParamClass::Return).map(|param| param.types)
    }

    pub fn ptr_eq(&self, other: &Action) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action#{}({:?}, {} params)", self.0.id, self.0.meta.kind, self.num_params())
    }
}
