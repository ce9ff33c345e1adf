use crate::value::Cell;
use ren_core::{Series, SeriesError};
use ren_value::Symbol;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// The storage behind an array value.
pub struct ArrayData {
    cells: RefCell<Series<Cell>>,
    /// Source file the array was scanned from, if any.
    file: Option<Symbol>,
    /// Line of the opening bracket, 0 if not scanned.
    line: u32,
}

/// A series of cells, shared by every value that refers to it.
///
/// Arrays are only created through the heap (`GcInterface::alloc_array`), which keeps track of
/// them so reference cycles can be broken at shutdown.
#[derive(Clone)]
pub struct Array(Rc<ArrayData>);

impl Array {
    pub(crate) fn from_series(cells: Series<Cell>, file: Option<Symbol>, line: u32) -> Array {
        Array(Rc::new(ArrayData { cells: RefCell::new(cells), file, line }))
    }

    pub(crate) fn downgrade(&self) -> Weak<ArrayData> {
        Rc::downgrade(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.cells.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.cells.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Cell> {
        self.0.cells.borrow().get(index).cloned()
    }

    /// Copies the cells from `index` on. Evaluation works on indices rather than borrows, so code
    /// running against an array may freely modify it.
    pub fn to_vec_from(&self, index: usize) -> Vec<Cell> {
        self.0.cells.borrow().as_slice().iter().skip(index).cloned().collect()
    }

    pub fn with_cells<R>(&self, f: impl FnOnce(&[Cell]) -> R) -> R {
        f(self.0.cells.borrow().as_slice())
    }

    pub fn push(&self, cell: Cell) -> Result<(), SeriesError> {
        self.0.cells.borrow_mut().push(cell)
    }

    pub fn insert(&self, index: usize, cell: Cell) -> Result<(), SeriesError> {
        self.0.cells.borrow_mut().insert(index, cell)
    }

    pub fn set(&self, index: usize, cell: Cell) -> Result<(), SeriesError> {
        self.0.cells.borrow_mut().set(index, cell)
    }

    pub fn remove(&self, index: usize) -> Result<Cell, SeriesError> {
        self.0.cells.borrow_mut().remove(index)
    }

    pub fn extend(&self, cells: impl IntoIterator<Item = Cell>) -> Result<(), SeriesError> {
        self.0.cells.borrow_mut().extend(cells)
    }

    pub fn freeze(&self) {
        self.0.cells.borrow_mut().freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.0.cells.borrow().is_frozen()
    }

    pub fn file(&self) -> Option<Symbol> {
        self.0.file
    }

    pub fn line(&self) -> u32 {
        self.0.line
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity, for cycle detection while walking nested arrays.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl ArrayData {
    /// Drops every cell, breaking any cycle going through this array.
    pub(crate) fn decay(&self) {
        self.cells.borrow_mut().decay();
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array(len {} @{:#x})", self.len(), self.addr())
    }
}
