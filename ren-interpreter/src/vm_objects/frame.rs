use crate::error::ErrorId;
use crate::value::convert::FromArgs;
use crate::value::Cell;
use crate::vm_objects::action::Action;
use crate::vm_objects::context::{Context, ContextId};
use ren_value::Symbol;

/// Where a call is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    /// Varlist allocated, nothing gathered yet.
    InitialEntry,
    /// Arguments being gathered from the callsite.
    Fulfilling,
    /// Arguments being checked against the parameter types.
    Typechecking,
    /// The dispatcher is running.
    Dispatching,
    /// Finished, output delivered.
    Done,
}

/// A call in progress.
pub struct Frame {
    /// The FRAME! context holding the arguments. Its id is the frame's identity.
    pub varlist: Context,
    /// The action whose dispatcher runs next. Changes as compositions hand the frame down.
    pub phase: Action,
    /// The action that was called.
    pub original: Action,
    /// Binding carried by the action value that was called.
    pub binding: Option<Context>,
    /// The word the action was called through, for error messages.
    pub label: Option<Symbol>,
    pub state: FrameState,
}

impl Frame {
    pub fn new(varlist: Context, action: Action, binding: Option<Context>, label: Option<Symbol>) -> Frame {
        varlist.set_phase(Some(action.clone()), binding.clone());
        Frame { varlist, phase: action.clone(), original: action, binding, label, state: FrameState::InitialEntry }
    }

    pub fn id(&self) -> ContextId {
        self.varlist.id()
    }

    /// Argument `index`, counting from 1. Null if the slot is empty.
    pub fn arg(&self, index: usize) -> Cell {
        self.varlist.var(index).unwrap_or_else(Cell::null)
    }

    /// Argument `index`, converted for a native.
    pub fn get<T: FromArgs>(&self, index: usize) -> Result<T, ErrorId> {
        T::from_args(&self.arg(index))
    }

    /// Whether refinement `index` was used.
    pub fn refinement(&self, index: usize) -> bool {
        self.arg(index).truthiness().unwrap_or(false)
    }

    /// Hands the frame to another phase; the varlist's archetype follows.
    pub fn set_phase(&mut self, phase: Action) {
        self.varlist.set_phase(Some(phase.clone()), self.binding.clone());
        self.phase = phase;
    }
}

/// A call stack record, kept by the universe for every call in progress.
#[derive(Debug, Clone)]
pub struct StackEntry {
    pub id: ContextId,
    pub varlist: Context,
    pub original: Action,
    pub label: Option<Symbol>,
    pub state: FrameState,
}
