//! Backward dataflow from an indirect jump to the table it dispatches through.
//!
//! The jump operand seeds an expression tree. Walking backward through the
//! window, every instruction that feeds a register still referenced by the
//! tree is substituted into it, until each register sits below an upper
//! bound established by a `cmp`/`ja` pair. The bound then gives the table
//! size and each index is evaluated through the tree to a target address.

use rustc_hash::FxHashSet;
use tracing::{debug, debug_span, trace};

use recover_expr::{Context, ExprId, ExprKind, Memory, WordType};

use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::insn::{Eflags, Instruction, MemOperand, Mnemonic, Operand, OperandKind, Reg};
use crate::tables;

/// Jump-table resolver over one decoded instruction window.
pub struct Resolver<'a> {
    insns: &'a [Instruction],
    memory: &'a dyn Memory,
    config: ResolverConfig,
}

impl<'a> Resolver<'a> {
    /// Resolver with the default configuration.
    pub fn new(insns: &'a [Instruction], memory: &'a dyn Memory) -> Self {
        Self::with_config(insns, memory, ResolverConfig::default())
    }

    /// Resolver with an explicit configuration.
    pub fn with_config(
        insns: &'a [Instruction],
        memory: &'a dyn Memory,
        config: ResolverConfig,
    ) -> Self {
        Self {
            insns,
            memory,
            config,
        }
    }

    /// Configuration used for every query.
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Target addresses of the indirect jump at `index`, in table order.
    ///
    /// An index past the window, a non-jump or a direct jump has no
    /// targets. Every other outcome is a full table or an error.
    pub fn indirect_jump_targets(&self, index: usize) -> Result<Vec<u64>> {
        let Some(jump) = self.insns.get(index) else {
            return Ok(Vec::new());
        };
        if index == 0 {
            return Err(ResolveError::NothingToRewind);
        }
        if !tables::is_jump(&jump.mnemonic) {
            return Ok(Vec::new());
        }
        let [operand] = self.operands::<1>(index)?;
        if operand.is_imm() {
            return Ok(Vec::new());
        }

        let _span = debug_span!(
            "indirect_jump",
            index,
            addr = format!("{:#x}", jump.address)
        )
        .entered();

        let mut ctx = Context::new(self.memory);
        let target = self.operand_expr(&mut ctx, index, operand)?;
        let root = ctx.root(target);
        if !ctx.add_expr(root) {
            return Err(ResolveError::MalformedTree("root was rejected"));
        }
        self.dump(&ctx, root);

        let mut cursor = index;
        while ctx.is_there_any_unbounded_register() {
            cursor = self.find_backward(&ctx, cursor)?;
            self.process_instruction(&mut ctx, cursor)?;
            self.dump(&ctx, root);
        }

        self.enumerate(&mut ctx, root)
    }

    fn operands<const N: usize>(&self, index: usize) -> Result<&'a [Operand; N]> {
        let insns = self.insns;
        let operands = insns[index].operands.as_slice();
        <&[Operand; N]>::try_from(operands).map_err(|_| ResolveError::OperandCount {
            index,
            expected: N,
            found: operands.len(),
        })
    }

    fn dump(&self, ctx: &Context<'_>, root: ExprId) {
        if self.config.dump_tree {
            trace!(nodes = ctx.expr_count(), "expression tree\n{}", ctx.display(root));
        }
    }

    // Expression building

    fn register_expr(&self, ctx: &mut Context<'_>, index: usize, reg: Reg) -> Result<ExprId> {
        if reg.is_instruction_pointer() {
            let next = self.insns[index].next_address();
            return Ok(ctx.constant(i128::from(next)));
        }
        let owner = tables::canonical(reg).ok_or(ResolveError::UnsupportedRegister { index, reg })?;
        Ok(ctx.register(owner.name()))
    }

    fn address_expr(
        &self,
        ctx: &mut Context<'_>,
        index: usize,
        mem: &MemOperand,
    ) -> Result<ExprId> {
        if let Some(segment) = mem.segment {
            return Err(ResolveError::SegmentOverride { index, segment });
        }
        let mut addr = match mem.index {
            Some(reg) => {
                let reg = self.register_expr(ctx, index, reg)?;
                if mem.scale == 1 {
                    Some(reg)
                } else {
                    let scale = ctx.constant(i128::from(mem.scale));
                    Some(ctx.mul(reg, scale))
                }
            }
            None => None,
        };
        if let Some(base) = mem.base {
            let base = self.register_expr(ctx, index, base)?;
            addr = Some(match addr {
                Some(scaled) => ctx.add(base, scaled),
                None => base,
            });
        }
        let disp = i128::from(mem.disp);
        Ok(match addr {
            Some(addr) if disp == 0 => addr,
            Some(addr) => {
                let disp = ctx.constant(disp);
                ctx.add(disp, addr)
            }
            None => ctx.constant(disp),
        })
    }

    fn word_type(index: usize, size: u8) -> Result<WordType> {
        let bytes = if size == 0 { 4 } else { size };
        WordType::signed(bytes).ok_or(ResolveError::OperandSize { index, size })
    }

    /// Value of `operand` as read by the instruction at `index`.
    fn operand_expr(
        &self,
        ctx: &mut Context<'_>,
        index: usize,
        operand: &Operand,
    ) -> Result<ExprId> {
        match operand.kind {
            OperandKind::Reg(reg) => self.register_expr(ctx, index, reg),
            OperandKind::Imm(value) => Ok(ctx.constant(i128::from(value))),
            OperandKind::Mem(mem) => {
                let word = Self::word_type(index, operand.size)?;
                let addr = self.address_expr(ctx, index, &mem)?;
                Ok(ctx.memory(self.config.address_bits, word, addr))
            }
        }
    }

    /// Substitute `value` for the destination `dst` everywhere in the tree.
    ///
    /// A 32-bit register write clears the upper half of its owner.
    fn write_back(
        &self,
        ctx: &mut Context<'_>,
        index: usize,
        dst: &Operand,
        value: ExprId,
    ) -> Result<()> {
        let (target, value) = match dst.kind {
            OperandKind::Reg(reg) if reg.is_instruction_pointer() => {
                return Err(self.invalid_operand(index));
            }
            OperandKind::Reg(reg) => {
                let target = self.register_expr(ctx, index, reg)?;
                match reg.bits() {
                    64 => (target, value),
                    32 => (target, ctx.zero_extend(32, value)),
                    _ => return Err(ResolveError::OperandSize { index, size: dst.size }),
                }
            }
            OperandKind::Mem(_) => (self.operand_expr(ctx, index, dst)?, value),
            OperandKind::Imm(_) => return Err(self.invalid_operand(index)),
        };
        Self::resolve(ctx, index, target, value)
    }

    fn invalid_operand(&self, index: usize) -> ResolveError {
        ResolveError::InvalidOperand {
            index,
            mnemonic: self.insns[index].mnemonic.clone(),
        }
    }

    fn resolve(
        ctx: &mut Context<'_>,
        index: usize,
        target: ExprId,
        replacement: ExprId,
    ) -> Result<()> {
        match ctx.resolve_expr(target, replacement) {
            0 => Err(ResolveError::NothingResolved { index }),
            matches => {
                trace!(index, matches, "substituted destination");
                Ok(())
            }
        }
    }

    // Backward scan

    fn live_registers(ctx: &Context<'_>) -> Result<FxHashSet<Reg>> {
        ctx.register_names()
            .into_iter()
            .map(|name| match Reg::from_name(&name) {
                Some(reg) => Ok(reg),
                None => Err(ResolveError::UnknownTreeRegister(name)),
            })
            .collect()
    }

    /// Nearest instruction before `cursor` that is a jump or touches a
    /// register referenced by the tree.
    fn find_backward(&self, ctx: &Context<'_>, cursor: usize) -> Result<usize> {
        let live = Self::live_registers(ctx)?;
        for index in (0..cursor).rev() {
            let insn = &self.insns[index];
            if tables::is_jump(&insn.mnemonic) {
                return Ok(index);
            }
            let (reads, writes) = insn.regs_access();
            for reg in reads.into_iter().chain(writes) {
                let owner =
                    tables::canonical(reg).ok_or(ResolveError::UnsupportedRegister { index, reg })?;
                if live.contains(&owner) {
                    return Ok(index);
                }
            }
        }
        Err(ResolveError::Exhausted { index: cursor })
    }

    /// Nearest instruction before `index` that writes every flag in `tested`.
    fn find_flag_definition(&self, index: usize, tested: Eflags) -> Result<usize> {
        if tables::flags_satisfied(Eflags::empty(), tested).is_none() {
            return Err(ResolveError::UnknownEflags {
                index,
                bits: tested.bits(),
            });
        }
        (0..index)
            .rev()
            .find(|&i| {
                let insn = &self.insns[i];
                insn.implicit_writes.contains(&Reg::Eflags)
                    && tables::flags_satisfied(insn.eflags, tested) == Some(true)
            })
            .ok_or(ResolveError::FlagsNotFound { index })
    }

    // Rewrites

    fn process_instruction(&self, ctx: &mut Context<'_>, index: usize) -> Result<()> {
        let insn = &self.insns[index];
        debug!(
            index,
            addr = format!("{:#x}", insn.address),
            mnemonic = %insn.mnemonic,
            "processing instruction"
        );
        match insn.mnemonic {
            Mnemonic::Mov => {
                let [dst, src] = self.operands::<2>(index)?;
                let value = self.operand_expr(ctx, index, src)?;
                self.write_back(ctx, index, dst, value)
            }
            Mnemonic::Movsx | Mnemonic::Movsxd => {
                let [dst, src] = self.operands::<2>(index)?;
                let bits = if src.size == 0 { 32 } else { u32::from(src.size) * 8 };
                let value = self.operand_expr(ctx, index, src)?;
                let value = ctx.sign_extend(bits, value);
                self.write_back(ctx, index, dst, value)
            }
            Mnemonic::Lea => {
                let [dst, src] = self.operands::<2>(index)?;
                let OperandKind::Mem(mem) = src.kind else {
                    return Err(self.invalid_operand(index));
                };
                let value = self.address_expr(ctx, index, &mem)?;
                self.write_back(ctx, index, dst, value)
            }
            Mnemonic::Cdqe => {
                let target = ctx.register(Reg::Rax.name());
                let rax = ctx.register(Reg::Rax.name());
                let value = ctx.sign_extend(32, rax);
                Self::resolve(ctx, index, target, value)
            }
            Mnemonic::Add => {
                let [dst, src] = self.operands::<2>(index)?;
                let lhs = self.operand_expr(ctx, index, dst)?;
                let rhs = self.operand_expr(ctx, index, src)?;
                let sum = ctx.add(lhs, rhs);
                self.write_back(ctx, index, dst, sum)
            }
            Mnemonic::Ja => self.bound_by_compare(ctx, index),
            _ => Err(ResolveError::UnsupportedMnemonic {
                index,
                mnemonic: insn.mnemonic.clone(),
            }),
        }
    }

    /// Bound the first operand of the compare feeding the jump at `index`.
    fn bound_by_compare(&self, ctx: &mut Context<'_>, index: usize) -> Result<()> {
        let mut tested = self.insns[index].eflags;
        if tested.is_empty() {
            tested = Eflags::TEST_ZF | Eflags::TEST_CF;
        }
        let def = self.find_flag_definition(index, tested)?;
        let cmp = &self.insns[def];
        if !tables::is_compare(&cmp.mnemonic) {
            return Err(ResolveError::ExpectedCompare {
                index: def,
                mnemonic: cmp.mnemonic.clone(),
            });
        }
        let [lhs, rhs] = self.operands::<2>(def)?;
        let target = self.operand_expr(ctx, def, lhs)?;
        let value = self.operand_expr(ctx, def, lhs)?;
        let limit = self.operand_expr(ctx, def, rhs)?;
        let bound = ctx.upper_bound(value, limit);
        debug!(
            index,
            compare = def,
            addr = format!("{:#x}", cmp.address),
            "found bounding compare"
        );
        Self::resolve(ctx, index, target, bound)
    }

    // Enumeration

    fn enumerate(&self, ctx: &mut Context<'_>, root: ExprId) -> Result<Vec<u64>> {
        let bounds = ctx.exprs(ExprKind::UpperBound);
        let [bound] = bounds.as_slice() else {
            return Err(ResolveError::UpperBoundCount(bounds.len()));
        };
        let bound = *bound;
        let value = ctx
            .children(bound)
            .first()
            .copied()
            .ok_or(ResolveError::MalformedTree("upper bound without children"))?;
        let range = ctx
            .possible_values_for(bound, value)
            .ok_or(ResolveError::RangeUnavailable)?;
        let max = range
            .finite_maximum()
            .ok_or(ResolveError::UnboundedMaximum)?;
        let entries = max.saturating_add(1).max(0);
        if let Some(limit) = self.config.max_entries {
            if entries > i128::from(limit) {
                return Err(ResolveError::TooManyEntries { entries, limit });
            }
        }

        let mut targets = Vec::new();
        for i in 0..=max {
            ctx.set_value(bound, i);
            let target = ctx
                .evaluate(root)
                .ok_or(ResolveError::EvaluationFailed(i))?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let target = target as u64;
            targets.push(target);
        }
        ctx.clear_value(bound);

        debug!(bound = %range, targets = targets.len(), "resolved jump table");
        Ok(targets)
    }
}
