//! Instruction windows shaped like compiler-generated switch dispatch.

use recover_expr::{MapMemory, WordType};
use recover_x86::{Instruction, MemOperand, Mnemonic, Operand, Reg, layout};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Position-independent dispatch through a table of 32-bit offsets.
///
/// ```text
/// cmp    edi, 0x14
/// ja     default
/// mov    rax, rsi
/// lea    rcx, [rip + 0xd11]
/// mov    edi, edi
/// movsxd rdx, dword [rcx + rdi*4]
/// add    rdx, rcx
/// jmp    rdx
/// ```
pub fn offset_table_window() -> (Vec<Instruction>, MapMemory) {
    let insns = layout(
        2000,
        [
            (3, Instruction::cmp(Operand::reg(Reg::Edi), Operand::imm(0x14, 1))),
            (2, Instruction::jcc(Mnemonic::Ja, 2100)),
            (3, Instruction::mov(Operand::reg(Reg::Rax), Operand::reg(Reg::Rsi))),
            (7, Instruction::lea(Reg::Rcx, MemOperand::base(Reg::Rip).disp(0xd11))),
            (2, Instruction::mov(Operand::reg(Reg::Edi), Operand::reg(Reg::Edi))),
            (
                4,
                Instruction::movsxd(
                    Operand::reg(Reg::Rdx),
                    Operand::mem(MemOperand::base(Reg::Rcx).index(Reg::Rdi, 4), 4),
                ),
            ),
            (3, Instruction::add(Operand::reg(Reg::Rdx), Operand::reg(Reg::Rcx))),
            (2, Instruction::jmp(Operand::reg(Reg::Rdx))),
        ],
    );
    let memory = MapMemory::new().with_table(WordType::I32, 0x14f0, 10..=30i128);
    (insns, memory)
}

/// Unoptimized dispatch with the selector spilled to the stack.
///
/// ```text
/// cmp    dword [rbp - 4], 6
/// ja     default
/// mov    eax, dword [rbp - 4]
/// lea    rdx, [rax*4]
/// lea    rax, [rip + 0x17e7a]
/// mov    eax, dword [rdx + rax]
/// cdqe
/// lea    rdx, [rip + 0x17e6e]
/// add    rax, rdx
/// jmp    rax
/// ```
pub fn stack_slot_window() -> (Vec<Instruction>, MapMemory) {
    let slot = MemOperand::base(Reg::Rbp).disp(-4);
    let insns = layout(
        2000,
        [
            (4, Instruction::cmp(Operand::mem(slot, 4), Operand::imm(6, 1))),
            (2, Instruction::jcc(Mnemonic::Ja, 2100)),
            (3, Instruction::mov(Operand::reg(Reg::Eax), Operand::mem(slot, 4))),
            (8, Instruction::lea(Reg::Rdx, MemOperand::absolute(0).index(Reg::Rax, 4))),
            (7, Instruction::lea(Reg::Rax, MemOperand::base(Reg::Rip).disp(0x17e7a))),
            (
                3,
                Instruction::mov(
                    Operand::reg(Reg::Eax),
                    Operand::mem(MemOperand::base(Reg::Rdx).index(Reg::Rax, 1), 4),
                ),
            ),
            (2, Instruction::cdqe()),
            (7, Instruction::lea(Reg::Rdx, MemOperand::base(Reg::Rip).disp(0x17e6e))),
            (3, Instruction::add(Operand::reg(Reg::Rax), Operand::reg(Reg::Rdx))),
            (2, Instruction::jmp(Operand::reg(Reg::Rax))),
        ],
    );
    let memory = MapMemory::new().with_table(WordType::I32, 0x18662, 40..=46i128);
    (insns, memory)
}

/// Non-PIC dispatch loading absolute targets.
///
/// ```text
/// cmp    edi, 4
/// ja     default
/// mov    edi, edi
/// jmp    qword [rdi*8 + 0x402000]
/// ```
pub fn absolute_table_window() -> (Vec<Instruction>, MapMemory) {
    let insns = layout(
        0x40_1000,
        [
            (3, Instruction::cmp(Operand::reg(Reg::Edi), Operand::imm(4, 1))),
            (2, Instruction::jcc(Mnemonic::Ja, 0x40_1100)),
            (2, Instruction::mov(Operand::reg(Reg::Edi), Operand::reg(Reg::Edi))),
            (
                7,
                Instruction::jmp(Operand::mem(
                    MemOperand::absolute(0x40_2000).index(Reg::Rdi, 8),
                    8,
                )),
            ),
        ],
    );
    let targets = (0..5i128).map(|i| 0x40_1200 + 0x10 * i);
    let memory = MapMemory::new().with_table(WordType::I64, 0x40_2000, targets);
    (insns, memory)
}
