use crate::value::Cell;
use crate::vm_objects::array::{Array, ArrayData};
use crate::vm_objects::context::{Context, ContextData};
use log::{debug, warn};
use ren_core::{Series, SeriesFlags};
use ren_value::Symbol;
use std::rc::Weak;

/// Registry size below which pruning is never attempted.
const MIN_PRUNE_THRESHOLD: usize = 1024;

/// Allocation counters, reported by `stats` and at shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    pub arrays_allocated: usize,
    pub contexts_allocated: usize,
    pub prunes: usize,
}

/// The heap.
///
/// Values are reference counted. Arrays and contexts can refer to each other in cycles (an object
/// holding a function whose body refers back to the object), so every one of them is registered
/// here, weakly. At shutdown the registry empties whatever is still alive, which breaks those
/// cycles and lets refcounting reclaim everything.
pub struct GcInterface {
    arrays: Vec<Weak<ArrayData>>,
    contexts: Vec<Weak<ContextData>>,
    prune_threshold: usize,
    stats: GcStats,
}

impl Default for GcInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl GcInterface {
    pub fn new() -> Self {
        Self { arrays: Vec::new(), contexts: Vec::new(), prune_threshold: MIN_PRUNE_THRESHOLD, stats: GcStats::default() }
    }

    /// Allocates an array that wasn't scanned from source.
    pub fn alloc_array(&mut self, cells: Vec<Cell>) -> Array {
        self.alloc_array_at(cells, None, 0)
    }

    /// Allocates an array, remembering where in the source it came from.
    pub fn alloc_array_at(&mut self, cells: Vec<Cell>, file: Option<Symbol>, line: u32) -> Array {
        let array = Array::from_series(Series::from_vec(cells, SeriesFlags::ARRAY | SeriesFlags::MANAGED), file, line);
        self.arrays.push(array.downgrade());
        self.stats.arrays_allocated += 1;
        self.maybe_prune();
        array
    }

    pub(crate) fn track_context(&mut self, context: &Context) {
        self.contexts.push(context.downgrade());
        self.stats.contexts_allocated += 1;
        self.maybe_prune();
    }

    fn maybe_prune(&mut self) {
        if self.arrays.len() + self.contexts.len() > self.prune_threshold {
            self.prune();
        }
    }

    /// Forgets registrations for values that are already gone. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.arrays.len() + self.contexts.len();
        self.arrays.retain(|array| array.strong_count() > 0);
        self.contexts.retain(|context| context.strong_count() > 0);
        let after = self.arrays.len() + self.contexts.len();
        self.prune_threshold = (after * 2).max(MIN_PRUNE_THRESHOLD);
        self.stats.prunes += 1;
        debug!("heap prune: {} registrations dropped, {} live", before - after, after);
        before - after
    }

    pub fn live_arrays(&self) -> usize {
        self.arrays.iter().filter(|array| array.strong_count() > 0).count()
    }

    pub fn live_contexts(&self) -> usize {
        self.contexts.iter().filter(|context| context.strong_count() > 0).count()
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Empties every live array and context. Nothing is usable afterwards; this is for shutdown only.
    pub fn sweep(&mut self) {
        let contexts: Vec<_> = self.contexts.drain(..).filter_map(|context| context.upgrade()).collect();
        let arrays: Vec<_> = self.arrays.drain(..).filter_map(|array| array.upgrade()).collect();
        debug!("heap sweep: {} contexts, {} arrays", contexts.len(), arrays.len());
        for context in &contexts {
            if let Err(err) = context.decay() {
                warn!("heap sweep: a context lost its shape: {}", err);
            }
        }
        for array in &arrays {
            array.decay();
        }
    }
}
