//! Indirect jump target recovery for x86-64.
//!
//! Resolves the targets of switch-style indirect jumps from a decoded
//! instruction window and a view of the program's memory.
//!
//! # Example
//!
//! ```ignore
//! use recover::{resolve_indirect_jump, MapMemory};
//!
//! let targets = resolve_indirect_jump(&insns, insns.len() - 1, Some(&memory))?;
//! ```

mod error;

pub use error::*;
pub use recover_expr::{MapMemory, Memory, ProcessMemory, Range, WordType};
pub use recover_x86::{
    Access, Eflags, Instruction, MemOperand, Mnemonic, Operand, OperandKind, Reg, ResolveError,
    Resolver, ResolverConfig, layout,
};

use rayon::prelude::*;
use tracing::{debug, trace_span};

/// Resolve the indirect jump at `index` with the default configuration.
///
/// Without `memory`, table entries are read from the calling process.
pub fn resolve_indirect_jump(
    insns: &[Instruction],
    index: usize,
    memory: Option<&dyn Memory>,
) -> Result<Vec<u64>> {
    resolve_indirect_jump_with(insns, index, memory, &ResolverConfig::default())
}

/// Resolve the indirect jump at `index` with an explicit configuration.
pub fn resolve_indirect_jump_with(
    insns: &[Instruction],
    index: usize,
    memory: Option<&dyn Memory>,
    config: &ResolverConfig,
) -> Result<Vec<u64>> {
    let process = ProcessMemory::current();
    let memory = memory.unwrap_or(&process);
    let targets =
        Resolver::with_config(insns, memory, config.clone()).indirect_jump_targets(index)?;
    Ok(targets)
}

/// Targets recovered for one indirect jump of a window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JumpTargets {
    pub index: usize,
    pub address: u64,
    pub targets: Result<Vec<u64>>,
}

/// Resolve every indirect jump in `insns` in parallel, in instruction order.
pub fn resolve_all(
    insns: &[Instruction],
    memory: &dyn Memory,
    config: &ResolverConfig,
) -> Vec<JumpTargets> {
    let _span = trace_span!("resolve_all", insns = insns.len()).entered();
    let jumps: Vec<usize> = insns
        .iter()
        .enumerate()
        .filter(|(_, insn)| insn.is_indirect_jump())
        .map(|(index, _)| index)
        .collect();

    let results: Vec<JumpTargets> = jumps
        .par_iter()
        .map(|&index| JumpTargets {
            index,
            address: insns[index].address,
            targets: Resolver::with_config(insns, memory, config.clone())
                .indirect_jump_targets(index)
                .map_err(Error::from),
        })
        .collect();

    debug!(
        jumps = results.len(),
        resolved = results.iter().filter(|r| r.targets.is_ok()).count(),
        "resolved indirect jumps"
    );
    results
}
