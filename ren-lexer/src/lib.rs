//!
//! This is the lexer for Ren source text.
//!

mod lexer;
mod token;

pub use crate::lexer::*;
pub use crate::token::*;
