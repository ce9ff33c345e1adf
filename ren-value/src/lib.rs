//!
//! The value vocabulary shared by every layer of the Ren evaluator: what a cell's header can say
//! about it, independently of how payloads are stored.
//!

/// Cell header flags.
pub mod flags;
/// Logical kinds and physical hearts.
pub mod kind;
/// The header's kind byte, which also carries shallow quoting.
pub mod kind_byte;
/// Sets of kinds, used for parameter type checking.
pub mod typeset;

/// The representation for interned spellings. Made to work with ren-core's interner.
/// Cells need to store it, and ren-core depends on ren-value, so it lives down here.
pub mod symbol;

pub use flags::CellFlags;
pub use kind::{Heart, Kind};
pub use kind_byte::{KindByte, MAX_INSITU_QUOTES, QUOTE_STEP};
pub use symbol::Symbol;
pub use typeset::TypeSet;
