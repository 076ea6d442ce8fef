//! Static register and condition flag tables.

use crate::insn::{Eflags, Mnemonic, Reg};

/// Map a register to the register tracked in expression trees.
///
/// Sub-registers map to their 64-bit owner. Instruction pointers and eflags
/// map to themselves. Segment registers are not tracked.
pub const fn canonical(reg: Reg) -> Option<Reg> {
    let owner = match reg {
        Reg::Rax | Reg::Eax | Reg::Ax | Reg::Al | Reg::Ah => Reg::Rax,
        Reg::Rbx | Reg::Ebx | Reg::Bx | Reg::Bl | Reg::Bh => Reg::Rbx,
        Reg::Rcx | Reg::Ecx | Reg::Cx | Reg::Cl | Reg::Ch => Reg::Rcx,
        Reg::Rdx | Reg::Edx | Reg::Dx | Reg::Dl | Reg::Dh => Reg::Rdx,
        Reg::Rsi | Reg::Esi | Reg::Si | Reg::Sil => Reg::Rsi,
        Reg::Rdi | Reg::Edi | Reg::Di | Reg::Dil => Reg::Rdi,
        Reg::Rbp | Reg::Ebp | Reg::Bp | Reg::Bpl => Reg::Rbp,
        Reg::Rsp | Reg::Esp | Reg::Sp | Reg::Spl => Reg::Rsp,
        Reg::R8 | Reg::R8d | Reg::R8w | Reg::R8b => Reg::R8,
        Reg::R9 | Reg::R9d | Reg::R9w | Reg::R9b => Reg::R9,
        Reg::R10 | Reg::R10d | Reg::R10w | Reg::R10b => Reg::R10,
        Reg::R11 | Reg::R11d | Reg::R11w | Reg::R11b => Reg::R11,
        Reg::R12 | Reg::R12d | Reg::R12w | Reg::R12b => Reg::R12,
        Reg::R13 | Reg::R13d | Reg::R13w | Reg::R13b => Reg::R13,
        Reg::R14 | Reg::R14d | Reg::R14w | Reg::R14b => Reg::R14,
        Reg::R15 | Reg::R15d | Reg::R15w | Reg::R15b => Reg::R15,
        Reg::Rip | Reg::Eip | Reg::Ip | Reg::Eflags => reg,
        Reg::Cs | Reg::Ds | Reg::Es | Reg::Fs | Reg::Gs | Reg::Ss => return None,
    };
    Some(owner)
}

/// Whether `mnemonic` is a direct or indirect jump.
pub const fn is_jump(mnemonic: &Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Ja
            | Mnemonic::Jae
            | Mnemonic::Jb
            | Mnemonic::Jbe
            | Mnemonic::Jcxz
            | Mnemonic::Jecxz
            | Mnemonic::Je
            | Mnemonic::Jg
            | Mnemonic::Jge
            | Mnemonic::Jl
            | Mnemonic::Jle
            | Mnemonic::Jmp
            | Mnemonic::Jne
            | Mnemonic::Jno
            | Mnemonic::Jnp
            | Mnemonic::Jns
            | Mnemonic::Jo
            | Mnemonic::Jp
            | Mnemonic::Jrcxz
            | Mnemonic::Js
    )
}

/// Whether `mnemonic` is a compare.
pub const fn is_compare(mnemonic: &Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Cmp | Mnemonic::Cmpsb | Mnemonic::Cmpsw | Mnemonic::Cmpsq
    )
}

/// Flags read by a conditional jump.
pub const fn tested_flags(mnemonic: &Mnemonic) -> Eflags {
    match mnemonic {
        Mnemonic::Ja | Mnemonic::Jbe => Eflags::TEST_CF.union(Eflags::TEST_ZF),
        Mnemonic::Jae | Mnemonic::Jb => Eflags::TEST_CF,
        Mnemonic::Je | Mnemonic::Jne => Eflags::TEST_ZF,
        Mnemonic::Jg | Mnemonic::Jle => Eflags::TEST_ZF
            .union(Eflags::TEST_SF)
            .union(Eflags::TEST_OF),
        Mnemonic::Jge | Mnemonic::Jl => Eflags::TEST_SF.union(Eflags::TEST_OF),
        Mnemonic::Jo | Mnemonic::Jno => Eflags::TEST_OF,
        Mnemonic::Jp | Mnemonic::Jnp => Eflags::TEST_PF,
        Mnemonic::Js | Mnemonic::Jns => Eflags::TEST_SF,
        _ => Eflags::empty(),
    }
}

/// Each tested flag with the effects that define it.
const TEST_EFFECTS: &[(Eflags, Eflags)] = &[
    (
        Eflags::TEST_OF,
        Eflags::MODIFY_OF.union(Eflags::RESET_OF).union(Eflags::SET_OF),
    ),
    (
        Eflags::TEST_SF,
        Eflags::MODIFY_SF.union(Eflags::RESET_SF).union(Eflags::SET_SF),
    ),
    (
        Eflags::TEST_ZF,
        Eflags::MODIFY_ZF.union(Eflags::RESET_ZF).union(Eflags::SET_ZF),
    ),
    (
        Eflags::TEST_PF,
        Eflags::MODIFY_PF.union(Eflags::RESET_PF).union(Eflags::SET_PF),
    ),
    (
        Eflags::TEST_CF,
        Eflags::MODIFY_CF.union(Eflags::RESET_CF).union(Eflags::SET_CF),
    ),
    (Eflags::TEST_NT, Eflags::MODIFY_NT.union(Eflags::RESET_NT)),
    (
        Eflags::TEST_DF,
        Eflags::MODIFY_DF.union(Eflags::RESET_DF).union(Eflags::SET_DF),
    ),
    (Eflags::TEST_RF, Eflags::MODIFY_RF.union(Eflags::RESET_RF)),
    (
        Eflags::TEST_IF,
        Eflags::MODIFY_IF.union(Eflags::RESET_IF).union(Eflags::SET_IF),
    ),
    (Eflags::TEST_TF, Eflags::MODIFY_TF.union(Eflags::RESET_TF)),
    (
        Eflags::TEST_AF,
        Eflags::MODIFY_AF.union(Eflags::RESET_AF).union(Eflags::SET_AF),
    ),
];

/// Check that `effects` modifies, sets or resets every flag in `tested`.
///
/// Returns `None` when `tested` holds bits that are not test flags.
pub fn flags_satisfied(effects: Eflags, tested: Eflags) -> Option<bool> {
    if !Eflags::TESTS.contains(tested) {
        return None;
    }
    Some(
        TEST_EFFECTS
            .iter()
            .filter(|(test, _)| tested.contains(*test))
            .all(|(_, defining)| effects.intersects(*defining)),
    )
}
