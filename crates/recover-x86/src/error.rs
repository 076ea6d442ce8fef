use thiserror::Error;

use crate::insn::{Mnemonic, Reg};

/// Reasons a jump-table query fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No instruction before the jump to rewind to")]
    NothingToRewind,
    #[error("Instruction {index}: expected {expected} operands, found {found}")]
    OperandCount {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("Instruction {index}: invalid operand for {mnemonic}")]
    InvalidOperand { index: usize, mnemonic: Mnemonic },
    #[error("Instruction {index}: unsupported operand size {size}")]
    OperandSize { index: usize, size: u8 },
    #[error("Instruction {index}: unsupported register {reg}")]
    UnsupportedRegister { index: usize, reg: Reg },
    #[error("Instruction {index}: segment override {segment} is unsupported")]
    SegmentOverride { index: usize, segment: Reg },
    #[error("Unknown register in expression tree: {0}")]
    UnknownTreeRegister(String),
    #[error("Instruction {index}: unknown eflags bits 0x{bits:x}")]
    UnknownEflags { index: usize, bits: u64 },
    #[error("Instruction {index}: unsupported mnemonic {mnemonic}")]
    UnsupportedMnemonic { index: usize, mnemonic: Mnemonic },
    #[error("Reached the start of the window from instruction {index} with unbounded registers")]
    Exhausted { index: usize },
    #[error("Instruction {index}: no prior instruction defines the tested flags")]
    FlagsNotFound { index: usize },
    #[error("Instruction {index}: expected a compare, found {mnemonic}")]
    ExpectedCompare { index: usize, mnemonic: Mnemonic },
    #[error("Instruction {index}: destination not found in expression tree")]
    NothingResolved { index: usize },
    #[error("Malformed expression tree: {0}")]
    MalformedTree(&'static str),
    #[error("Expected exactly one upper bound, found {0}")]
    UpperBoundCount(usize),
    #[error("Bound range is unavailable")]
    RangeUnavailable,
    #[error("Bound has no finite maximum")]
    UnboundedMaximum,
    #[error("Table has {entries} entries, limit is {limit}")]
    TooManyEntries { entries: i128, limit: u64 },
    #[error("Evaluation failed for table index {0}")]
    EvaluationFailed(i128),
}

pub type Result<T> = std::result::Result<T, ResolveError>;
