//! Symbolic expression engine for jump table recovery.
//!
//! Expressions are built inside a [`Context`], rewritten by structural search
//! and replace, evaluated against a [`Memory`], and constrained with [`Range`]
//! propagation from an upper bound down to the registers below it.

mod context;
mod expr;
mod memory;
mod range;

pub use context::*;
pub use expr::*;
pub use memory::*;
pub use range::*;
