//! x86-64 jump table recovery.
//!
//! Given a decoded instruction window ending in an indirect `jmp`, the
//! [`Resolver`] walks backward to the bounds check guarding the dispatch and
//! enumerates every table entry through the recovered address expression.

mod config;
mod error;
mod insn;
mod resolver;
pub mod tables;

pub use config::*;
pub use error::*;
pub use insn::*;
pub use resolver::*;
