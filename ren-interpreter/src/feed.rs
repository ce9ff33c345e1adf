use crate::value::Cell;
use crate::vm_objects::array::Array;
use crate::vm_objects::context::Context;
use ren_value::{CellFlags, Symbol};
use std::rc::Rc;

/// Where a feed's cells come from.
#[derive(Debug, Clone)]
enum FeedSource {
    /// A position in an array, usually a block being run.
    Array(Array),
    /// Cells handed over by the host, which aren't in any array.
    Values(Rc<[Cell]>),
}

/// The stream of cells an evaluation pulls from.
///
/// Cells are fetched by index rather than borrowed, so code running from a feed may freely
/// modify the array underneath it.
#[derive(Debug, Clone)]
pub struct Feed {
    source: FeedSource,
    index: usize,
    specifier: Option<Context>,
}

impl Feed {
    pub fn new(array: Array, index: usize, specifier: Option<Context>) -> Feed {
        Feed { source: FeedSource::Array(array), index, specifier }
    }

    pub fn from_values(values: Vec<Cell>) -> Feed {
        Feed { source: FeedSource::Values(values.into()), index: 0, specifier: None }
    }

    /// A feed with nothing in it.
    pub fn empty() -> Feed {
        Self::from_values(Vec::new())
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn specifier(&self) -> Option<&Context> {
        self.specifier.as_ref()
    }

    pub fn array(&self) -> Option<&Array> {
        match &self.source {
            FeedSource::Array(array) => Some(array),
            FeedSource::Values(_) => None,
        }
    }

    fn get(&self, index: usize) -> Option<Cell> {
        match &self.source {
            FeedSource::Array(array) => array.get(index),
            FeedSource::Values(values) => values.get(index).cloned(),
        }
    }

    /// The next cell, not yet consumed.
    pub fn current(&self) -> Option<Cell> {
        self.get(self.index)
    }

    /// The cell after the next one.
    pub fn lookahead(&self) -> Option<Cell> {
        self.get(self.index + 1)
    }

    pub fn is_end(&self) -> bool {
        self.current().is_none()
    }

    pub fn advance(&mut self) {
        self.index += 1;
    }

    /// Consumes and returns the next cell.
    pub fn take(&mut self) -> Option<Cell> {
        let cell = self.current()?;
        self.advance();
        Some(cell)
    }

    /// Up to `limit` cells starting at `from`, for error reports.
    pub fn window(&self, from: usize, limit: usize) -> Vec<Cell> {
        (from..from + limit).map_while(|index| self.get(index)).collect()
    }

    pub fn file(&self) -> Option<Symbol> {
        self.array().and_then(Array::file)
    }

    /// The source line of the cell at `index`: the array's first line plus the line breaks
    /// flagged on the cells up to it. Blank lines aren't flagged, so this can run short.
    pub fn line_at(&self, index: usize) -> u32 {
        let Some(array) = self.array().filter(|array| array.line() > 0) else {
            return 0;
        };
        let breaks = array.with_cells(|cells| {
            cells.iter().take(index + 1).filter(|cell| cell.has_flag(CellFlags::NEWLINE_BEFORE)).count()
        });
        array.line() + breaks as u32
    }
}
