/// Natives, functions and their compositions.
pub mod action;
/// Arrays of cells.
pub mod array;
/// Objects, modules, errors and frames, plus their keylists.
pub mod context;
/// Calls in progress.
pub mod frame;
/// Strings.
pub mod text;
