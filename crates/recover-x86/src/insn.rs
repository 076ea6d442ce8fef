//! Decoded instruction model.
//!
//! This is the shape a disassembler hands to the resolver: registers,
//! operands with access flags, implicit register effects and the eflags
//! effect mask. The semantic constructors fill that metadata in for the
//! instruction forms the resolver understands.

use std::fmt;

use bitflags::bitflags;

use crate::tables;

macro_rules! registers {
    ($($variant:ident = $name:literal / $bits:literal),* $(,)?) => {
        /// x86-64 register.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Reg {
            $($variant),*
        }

        impl Reg {
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),*
                }
            }

            pub const fn bits(self) -> u32 {
                match self {
                    $(Self::$variant => $bits),*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

registers! {
    Rax = "rax" / 64, Rbx = "rbx" / 64, Rcx = "rcx" / 64, Rdx = "rdx" / 64,
    Rsi = "rsi" / 64, Rdi = "rdi" / 64, Rbp = "rbp" / 64, Rsp = "rsp" / 64,
    R8 = "r8" / 64, R9 = "r9" / 64, R10 = "r10" / 64, R11 = "r11" / 64,
    R12 = "r12" / 64, R13 = "r13" / 64, R14 = "r14" / 64, R15 = "r15" / 64,

    Eax = "eax" / 32, Ebx = "ebx" / 32, Ecx = "ecx" / 32, Edx = "edx" / 32,
    Esi = "esi" / 32, Edi = "edi" / 32, Ebp = "ebp" / 32, Esp = "esp" / 32,
    R8d = "r8d" / 32, R9d = "r9d" / 32, R10d = "r10d" / 32, R11d = "r11d" / 32,
    R12d = "r12d" / 32, R13d = "r13d" / 32, R14d = "r14d" / 32, R15d = "r15d" / 32,

    Ax = "ax" / 16, Bx = "bx" / 16, Cx = "cx" / 16, Dx = "dx" / 16,
    Si = "si" / 16, Di = "di" / 16, Bp = "bp" / 16, Sp = "sp" / 16,
    R8w = "r8w" / 16, R9w = "r9w" / 16, R10w = "r10w" / 16, R11w = "r11w" / 16,
    R12w = "r12w" / 16, R13w = "r13w" / 16, R14w = "r14w" / 16, R15w = "r15w" / 16,

    Al = "al" / 8, Bl = "bl" / 8, Cl = "cl" / 8, Dl = "dl" / 8,
    Sil = "sil" / 8, Dil = "dil" / 8, Bpl = "bpl" / 8, Spl = "spl" / 8,
    R8b = "r8b" / 8, R9b = "r9b" / 8, R10b = "r10b" / 8, R11b = "r11b" / 8,
    R12b = "r12b" / 8, R13b = "r13b" / 8, R14b = "r14b" / 8, R15b = "r15b" / 8,
    Ah = "ah" / 8, Bh = "bh" / 8, Ch = "ch" / 8, Dh = "dh" / 8,

    Rip = "rip" / 64, Eip = "eip" / 32, Ip = "ip" / 16,
    Eflags = "eflags" / 32,

    Cs = "cs" / 16, Ds = "ds" / 16, Es = "es" / 16,
    Fs = "fs" / 16, Gs = "gs" / 16, Ss = "ss" / 16,
}

impl Reg {
    pub const fn is_instruction_pointer(self) -> bool {
        matches!(self, Self::Rip | Self::Eip | Self::Ip)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! mnemonics {
    ($($variant:ident = $name:literal),* $(,)?) => {
        /// Instruction mnemonic.
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub enum Mnemonic {
            $($variant,)*
            /// Any mnemonic the resolver does not distinguish.
            Other(String),
        }

        impl Mnemonic {
            pub fn name(&self) -> &str {
                match self {
                    $(Self::$variant => $name,)*
                    Self::Other(name) => name,
                }
            }

            pub fn parse(name: &str) -> Self {
                match name {
                    $($name => Self::$variant,)*
                    _ => Self::Other(name.to_string()),
                }
            }
        }
    };
}

mnemonics! {
    Mov = "mov", Movsx = "movsx", Movsxd = "movsxd", Lea = "lea", Cdqe = "cdqe", Add = "add",
    Cmp = "cmp", Cmpsb = "cmpsb", Cmpsw = "cmpsw", Cmpsq = "cmpsq",
    Ja = "ja", Jae = "jae", Jb = "jb", Jbe = "jbe", Jcxz = "jcxz", Jecxz = "jecxz",
    Je = "je", Jg = "jg", Jge = "jge", Jl = "jl", Jle = "jle", Jmp = "jmp", Jne = "jne",
    Jno = "jno", Jnp = "jnp", Jns = "jns", Jo = "jo", Jp = "jp", Jrcxz = "jrcxz", Js = "js",
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// How an instruction accesses an operand.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

bitflags! {
    /// Effect of an instruction on each condition flag.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Eflags: u64 {
        const MODIFY_AF = 1 << 0;
        const MODIFY_CF = 1 << 1;
        const MODIFY_SF = 1 << 2;
        const MODIFY_ZF = 1 << 3;
        const MODIFY_PF = 1 << 4;
        const MODIFY_OF = 1 << 5;
        const MODIFY_TF = 1 << 6;
        const MODIFY_IF = 1 << 7;
        const MODIFY_DF = 1 << 8;
        const MODIFY_NT = 1 << 9;
        const MODIFY_RF = 1 << 10;
        const PRIOR_OF = 1 << 11;
        const PRIOR_SF = 1 << 12;
        const PRIOR_ZF = 1 << 13;
        const PRIOR_AF = 1 << 14;
        const PRIOR_PF = 1 << 15;
        const PRIOR_CF = 1 << 16;
        const PRIOR_TF = 1 << 17;
        const PRIOR_IF = 1 << 18;
        const PRIOR_DF = 1 << 19;
        const PRIOR_NT = 1 << 20;
        const RESET_OF = 1 << 21;
        const RESET_CF = 1 << 22;
        const RESET_DF = 1 << 23;
        const RESET_IF = 1 << 24;
        const RESET_SF = 1 << 25;
        const RESET_AF = 1 << 26;
        const RESET_TF = 1 << 27;
        const RESET_NT = 1 << 28;
        const RESET_PF = 1 << 29;
        const SET_CF = 1 << 30;
        const SET_DF = 1 << 31;
        const SET_IF = 1 << 32;
        const TEST_OF = 1 << 33;
        const TEST_SF = 1 << 34;
        const TEST_ZF = 1 << 35;
        const TEST_PF = 1 << 36;
        const TEST_CF = 1 << 37;
        const TEST_NT = 1 << 38;
        const TEST_DF = 1 << 39;
        const UNDEFINED_OF = 1 << 40;
        const UNDEFINED_SF = 1 << 41;
        const UNDEFINED_ZF = 1 << 42;
        const UNDEFINED_PF = 1 << 43;
        const UNDEFINED_AF = 1 << 44;
        const UNDEFINED_CF = 1 << 45;
        const RESET_RF = 1 << 46;
        const TEST_RF = 1 << 47;
        const TEST_IF = 1 << 48;
        const TEST_TF = 1 << 49;
        const TEST_AF = 1 << 50;
        const RESET_ZF = 1 << 51;
        const SET_OF = 1 << 52;
        const SET_SF = 1 << 53;
        const SET_ZF = 1 << 54;
        const SET_AF = 1 << 55;
        const SET_PF = 1 << 56;
        const RESET_0F = 1 << 57;
        const RESET_AC = 1 << 58;

        /// Flags written by arithmetic and compare instructions.
        const ARITHMETIC = Self::MODIFY_AF.bits()
            | Self::MODIFY_CF.bits()
            | Self::MODIFY_SF.bits()
            | Self::MODIFY_ZF.bits()
            | Self::MODIFY_PF.bits()
            | Self::MODIFY_OF.bits();

        const TESTS = Self::TEST_OF.bits()
            | Self::TEST_SF.bits()
            | Self::TEST_ZF.bits()
            | Self::TEST_PF.bits()
            | Self::TEST_CF.bits()
            | Self::TEST_NT.bits()
            | Self::TEST_DF.bits()
            | Self::TEST_RF.bits()
            | Self::TEST_IF.bits()
            | Self::TEST_TF.bits()
            | Self::TEST_AF.bits();
    }
}

/// Memory reference `segment:[base + index * scale + disp]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemOperand {
    pub segment: Option<Reg>,
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub scale: i32,
    pub disp: i64,
}

impl MemOperand {
    /// `[disp]`.
    pub const fn absolute(disp: i64) -> Self {
        Self {
            segment: None,
            base: None,
            index: None,
            scale: 1,
            disp,
        }
    }

    /// `[base]`.
    pub const fn base(base: Reg) -> Self {
        Self {
            base: Some(base),
            ..Self::absolute(0)
        }
    }

    #[must_use]
    pub const fn index(mut self, index: Reg, scale: i32) -> Self {
        self.index = Some(index);
        self.scale = scale;
        self
    }

    #[must_use]
    pub const fn disp(mut self, disp: i64) -> Self {
        self.disp = disp;
        self
    }

    #[must_use]
    pub const fn segment(mut self, segment: Reg) -> Self {
        self.segment = Some(segment);
        self
    }

    /// Registers read to form the address.
    pub fn registers(&self) -> impl Iterator<Item = Reg> + '_ {
        [self.segment, self.base, self.index].into_iter().flatten()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    Reg(Reg),
    Imm(i64),
    Mem(MemOperand),
}

/// Explicit operand with its size in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandKind,
    pub size: u8,
    pub access: Access,
}

impl Operand {
    /// Register operand read by the instruction, sized to the register.
    pub const fn reg(reg: Reg) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let size = (reg.bits() / 8) as u8;
        Self {
            kind: OperandKind::Reg(reg),
            size,
            access: Access::READ,
        }
    }

    pub const fn imm(value: i64, size: u8) -> Self {
        Self {
            kind: OperandKind::Imm(value),
            size,
            access: Access::READ,
        }
    }

    /// Memory operand of `size` bytes read by the instruction.
    pub const fn mem(mem: MemOperand, size: u8) -> Self {
        Self {
            kind: OperandKind::Mem(mem),
            size,
            access: Access::READ,
        }
    }

    #[must_use]
    pub const fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub const fn is_imm(&self) -> bool {
        matches!(self.kind, OperandKind::Imm(_))
    }
}

/// One decoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub size: u8,
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    pub implicit_reads: Vec<Reg>,
    pub implicit_writes: Vec<Reg>,
    pub eflags: Eflags,
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic) -> Self {
        Self {
            address: 0,
            size: 0,
            mnemonic,
            operands: Vec::new(),
            implicit_reads: Vec::new(),
            implicit_writes: Vec::new(),
            eflags: Eflags::empty(),
        }
    }

    #[must_use]
    pub fn at(mut self, address: u64, size: u8) -> Self {
        self.address = address;
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_operands(mut self, operands: impl IntoIterator<Item = Operand>) -> Self {
        self.operands = operands.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_implicit(
        mut self,
        reads: impl IntoIterator<Item = Reg>,
        writes: impl IntoIterator<Item = Reg>,
    ) -> Self {
        self.implicit_reads = reads.into_iter().collect();
        self.implicit_writes = writes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_eflags(mut self, eflags: Eflags) -> Self {
        self.eflags = eflags;
        self
    }

    /// Address of the following instruction.
    pub fn next_address(&self) -> u64 {
        self.address.wrapping_add(u64::from(self.size))
    }

    /// A jump through a register or memory operand.
    pub fn is_indirect_jump(&self) -> bool {
        tables::is_jump(&self.mnemonic)
            && matches!(self.operands.as_slice(), [operand] if !operand.is_imm())
    }

    /// Registers read and written, explicitly and implicitly.
    ///
    /// Registers forming a memory address count as read.
    pub fn regs_access(&self) -> (Vec<Reg>, Vec<Reg>) {
        let mut reads = self.implicit_reads.clone();
        let mut writes = self.implicit_writes.clone();
        for op in &self.operands {
            match op.kind {
                OperandKind::Reg(reg) => {
                    if op.access.contains(Access::READ) {
                        reads.push(reg);
                    }
                    if op.access.contains(Access::WRITE) {
                        writes.push(reg);
                    }
                }
                OperandKind::Mem(mem) => reads.extend(mem.registers()),
                OperandKind::Imm(_) => {}
            }
        }
        for regs in [&mut reads, &mut writes] {
            regs.sort_unstable();
            regs.dedup();
        }
        (reads, writes)
    }

    // Semantic constructors

    fn transfer(mnemonic: Mnemonic, dst: Operand, src: Operand) -> Self {
        Self::new(mnemonic).with_operands([
            dst.with_access(Access::WRITE),
            src.with_access(Access::READ),
        ])
    }

    /// `mov dst, src`.
    pub fn mov(dst: Operand, src: Operand) -> Self {
        Self::transfer(Mnemonic::Mov, dst, src)
    }

    /// `movsx dst, src` for 8- and 16-bit sources.
    pub fn movsx(dst: Operand, src: Operand) -> Self {
        Self::transfer(Mnemonic::Movsx, dst, src)
    }

    /// `movsxd dst, src` (AT&T `movslq`).
    pub fn movsxd(dst: Operand, src: Operand) -> Self {
        Self::transfer(Mnemonic::Movsxd, dst, src)
    }

    /// `lea dst, [mem]`.
    pub fn lea(dst: Reg, mem: MemOperand) -> Self {
        Self::new(Mnemonic::Lea).with_operands([
            Operand::reg(dst).with_access(Access::WRITE),
            Operand::mem(mem, 8).with_access(Access::empty()),
        ])
    }

    /// `cdqe` (AT&T `cltq`).
    pub fn cdqe() -> Self {
        Self::new(Mnemonic::Cdqe).with_implicit([Reg::Eax], [Reg::Rax])
    }

    /// `add dst, src`.
    pub fn add(dst: Operand, src: Operand) -> Self {
        Self::new(Mnemonic::Add)
            .with_operands([
                dst.with_access(Access::READ | Access::WRITE),
                src.with_access(Access::READ),
            ])
            .with_implicit([], [Reg::Eflags])
            .with_eflags(Eflags::ARITHMETIC)
    }

    /// `cmp lhs, rhs`.
    pub fn cmp(lhs: Operand, rhs: Operand) -> Self {
        Self::new(Mnemonic::Cmp)
            .with_operands([lhs.with_access(Access::READ), rhs.with_access(Access::READ)])
            .with_implicit([], [Reg::Eflags])
            .with_eflags(Eflags::ARITHMETIC)
    }

    /// Conditional jump to `target`, testing the flags its condition reads.
    pub fn jcc(mnemonic: Mnemonic, target: u64) -> Self {
        let eflags = tables::tested_flags(&mnemonic);
        #[allow(clippy::cast_possible_wrap)]
        let target = target as i64;
        Self::new(mnemonic)
            .with_operands([Operand::imm(target, 8)])
            .with_implicit([Reg::Eflags], [])
            .with_eflags(eflags)
    }

    /// `jmp target` through a register or memory operand.
    pub fn jmp(target: Operand) -> Self {
        Self::new(Mnemonic::Jmp)
            .with_operands([target.with_access(Access::READ)])
            .with_implicit([], [Reg::Rip])
    }

    /// Any other instruction.
    pub fn other(name: &str, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self::new(Mnemonic::parse(name)).with_operands(operands)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {}", self.address, self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match op.kind {
                OperandKind::Reg(reg) => write!(f, "{reg}")?,
                OperandKind::Imm(value) => write!(f, "{value:#x}")?,
                OperandKind::Mem(mem) => {
                    if let Some(segment) = mem.segment {
                        write!(f, "{segment}:")?;
                    }
                    write!(f, "[")?;
                    let mut first = true;
                    if let Some(base) = mem.base {
                        write!(f, "{base}")?;
                        first = false;
                    }
                    if let Some(index) = mem.index {
                        write!(f, "{}{index}*{}", if first { "" } else { " + " }, mem.scale)?;
                        first = false;
                    }
                    if mem.disp != 0 || first {
                        let sign = if mem.disp < 0 { "-" } else if first { "" } else { "+" };
                        let sep = if first { "" } else { " " };
                        write!(f, "{sep}{sign}{sep}{:#x}", mem.disp.unsigned_abs())?;
                    }
                    write!(f, "]")?;
                }
            }
        }
        Ok(())
    }
}

/// Assign consecutive addresses from `base` to `(size, instruction)` pairs.
pub fn layout(base: u64, insns: impl IntoIterator<Item = (u8, Instruction)>) -> Vec<Instruction> {
    let mut address = base;
    insns
        .into_iter()
        .map(|(size, insn)| {
            let insn = insn.at(address, size);
            address = insn.next_address();
            insn
        })
        .collect()
}
