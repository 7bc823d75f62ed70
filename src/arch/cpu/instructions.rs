//! Opcode table and instruction semantics.
//!
//! The table only describes an instruction; the CPU core does the generic
//! work (effective address, operand fetch, RMW dummy write, write-back and the
//! page-cross penalty). Each `execute` function only implements the ALU or
//! control-flow part and returns any extra cycles it caused (taken branches).

use std::fmt::{Debug, Formatter};
use crate::arch::bus::MemoryBus;
use super::{AddrMode, InterruptKind, Ricoh2A03, StatusReg};
use AddrMode::*;
use DataAccess::*;

pub type Execute = fn(&mut Ricoh2A03, &mut MemoryBus, &mut Operand) -> u8;

/// Effective address and data of the instruction being executed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Operand {
    pub addr: u16,
    pub value: u8,
    /// Indexing or a taken branch crossed a page boundary.
    pub crossed: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DataAccess {
    Internal,
    Read,
    Write,
    Modify,
}

#[derive(Copy, Clone)]
pub struct Instruction {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub mode: AddrMode,
    /// Base cycle count, before page-cross and branch penalties.
    pub cycles: u8,
    /// Operand is fetched before `execute` runs.
    pub read: bool,
    /// `Operand::value` is stored after `execute` runs.
    pub write: bool,
    pub unofficial: bool,
    pub execute: Execute,
}
impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
         .field("opcode", &format_args!("{:#04X}", self.opcode))
         .field("mnemonic", &self.mnemonic)
         .field("mode", &self.mode)
         .field("cycles", &self.cycles)
         .field("read", &self.read)
         .field("write", &self.write)
         .field("unofficial", &self.unofficial)
         .finish()
    }
}

const fn op(opcode: u8, mnemonic: &'static str, mode: AddrMode, cycles: u8, access: DataAccess, execute: Execute) -> Instruction {
    Instruction {
        opcode,
        mnemonic,
        mode,
        cycles,
        read: matches!(access, Read | Modify),
        write: matches!(access, Write | Modify),
        unofficial: false,
        execute,
    }
}

const fn ill(opcode: u8, mnemonic: &'static str, mode: AddrMode, cycles: u8, access: DataAccess, execute: Execute) -> Instruction {
    let mut inst = op(opcode, mnemonic, mode, cycles, access, execute);
    inst.unofficial = true;
    inst
}

const DEFINITIONS: &[Instruction] = &[
    // loads and stores
    op(0xA9, "LDA", Immediate, 2, Read, lda), op(0xA5, "LDA", Zero, 3, Read, lda), op(0xB5, "LDA", ZeroX, 4, Read, lda),
    op(0xAD, "LDA", Absolute, 4, Read, lda), op(0xBD, "LDA", AbsoluteX, 4, Read, lda), op(0xB9, "LDA", AbsoluteY, 4, Read, lda),
    op(0xA1, "LDA", IndirectX, 6, Read, lda), op(0xB1, "LDA", IndirectY, 5, Read, lda),
    op(0xA2, "LDX", Immediate, 2, Read, ldx), op(0xA6, "LDX", Zero, 3, Read, ldx), op(0xB6, "LDX", ZeroY, 4, Read, ldx),
    op(0xAE, "LDX", Absolute, 4, Read, ldx), op(0xBE, "LDX", AbsoluteY, 4, Read, ldx),
    op(0xA0, "LDY", Immediate, 2, Read, ldy), op(0xA4, "LDY", Zero, 3, Read, ldy), op(0xB4, "LDY", ZeroX, 4, Read, ldy),
    op(0xAC, "LDY", Absolute, 4, Read, ldy), op(0xBC, "LDY", AbsoluteX, 4, Read, ldy),
    op(0x85, "STA", Zero, 3, Write, sta), op(0x95, "STA", ZeroX, 4, Write, sta), op(0x8D, "STA", Absolute, 4, Write, sta),
    op(0x9D, "STA", AbsoluteX, 5, Write, sta), op(0x99, "STA", AbsoluteY, 5, Write, sta), op(0x81, "STA", IndirectX, 6, Write, sta),
    op(0x91, "STA", IndirectY, 6, Write, sta),
    op(0x86, "STX", Zero, 3, Write, stx), op(0x96, "STX", ZeroY, 4, Write, stx), op(0x8E, "STX", Absolute, 4, Write, stx),
    op(0x84, "STY", Zero, 3, Write, sty), op(0x94, "STY", ZeroX, 4, Write, sty), op(0x8C, "STY", Absolute, 4, Write, sty),

    // arithmetic and logic
    op(0x69, "ADC", Immediate, 2, Read, adc), op(0x65, "ADC", Zero, 3, Read, adc), op(0x75, "ADC", ZeroX, 4, Read, adc),
    op(0x6D, "ADC", Absolute, 4, Read, adc), op(0x7D, "ADC", AbsoluteX, 4, Read, adc), op(0x79, "ADC", AbsoluteY, 4, Read, adc),
    op(0x61, "ADC", IndirectX, 6, Read, adc), op(0x71, "ADC", IndirectY, 5, Read, adc),
    op(0xE9, "SBC", Immediate, 2, Read, sbc), op(0xE5, "SBC", Zero, 3, Read, sbc), op(0xF5, "SBC", ZeroX, 4, Read, sbc),
    op(0xED, "SBC", Absolute, 4, Read, sbc), op(0xFD, "SBC", AbsoluteX, 4, Read, sbc), op(0xF9, "SBC", AbsoluteY, 4, Read, sbc),
    op(0xE1, "SBC", IndirectX, 6, Read, sbc), op(0xF1, "SBC", IndirectY, 5, Read, sbc),
    op(0x29, "AND", Immediate, 2, Read, and), op(0x25, "AND", Zero, 3, Read, and), op(0x35, "AND", ZeroX, 4, Read, and),
    op(0x2D, "AND", Absolute, 4, Read, and), op(0x3D, "AND", AbsoluteX, 4, Read, and), op(0x39, "AND", AbsoluteY, 4, Read, and),
    op(0x21, "AND", IndirectX, 6, Read, and), op(0x31, "AND", IndirectY, 5, Read, and),
    op(0x09, "ORA", Immediate, 2, Read, ora), op(0x05, "ORA", Zero, 3, Read, ora), op(0x15, "ORA", ZeroX, 4, Read, ora),
    op(0x0D, "ORA", Absolute, 4, Read, ora), op(0x1D, "ORA", AbsoluteX, 4, Read, ora), op(0x19, "ORA", AbsoluteY, 4, Read, ora),
    op(0x01, "ORA", IndirectX, 6, Read, ora), op(0x11, "ORA", IndirectY, 5, Read, ora),
    op(0x49, "EOR", Immediate, 2, Read, eor), op(0x45, "EOR", Zero, 3, Read, eor), op(0x55, "EOR", ZeroX, 4, Read, eor),
    op(0x4D, "EOR", Absolute, 4, Read, eor), op(0x5D, "EOR", AbsoluteX, 4, Read, eor), op(0x59, "EOR", AbsoluteY, 4, Read, eor),
    op(0x41, "EOR", IndirectX, 6, Read, eor), op(0x51, "EOR", IndirectY, 5, Read, eor),
    op(0xC9, "CMP", Immediate, 2, Read, cmp), op(0xC5, "CMP", Zero, 3, Read, cmp), op(0xD5, "CMP", ZeroX, 4, Read, cmp),
    op(0xCD, "CMP", Absolute, 4, Read, cmp), op(0xDD, "CMP", AbsoluteX, 4, Read, cmp), op(0xD9, "CMP", AbsoluteY, 4, Read, cmp),
    op(0xC1, "CMP", IndirectX, 6, Read, cmp), op(0xD1, "CMP", IndirectY, 5, Read, cmp),
    op(0xE0, "CPX", Immediate, 2, Read, cpx), op(0xE4, "CPX", Zero, 3, Read, cpx), op(0xEC, "CPX", Absolute, 4, Read, cpx),
    op(0xC0, "CPY", Immediate, 2, Read, cpy), op(0xC4, "CPY", Zero, 3, Read, cpy), op(0xCC, "CPY", Absolute, 4, Read, cpy),
    op(0x24, "BIT", Zero, 3, Read, bit), op(0x2C, "BIT", Absolute, 4, Read, bit),

    // read-modify-write
    op(0x0A, "ASL", Accumulator, 2, Modify, asl), op(0x06, "ASL", Zero, 5, Modify, asl), op(0x16, "ASL", ZeroX, 6, Modify, asl),
    op(0x0E, "ASL", Absolute, 6, Modify, asl), op(0x1E, "ASL", AbsoluteX, 7, Modify, asl),
    op(0x4A, "LSR", Accumulator, 2, Modify, lsr), op(0x46, "LSR", Zero, 5, Modify, lsr), op(0x56, "LSR", ZeroX, 6, Modify, lsr),
    op(0x4E, "LSR", Absolute, 6, Modify, lsr), op(0x5E, "LSR", AbsoluteX, 7, Modify, lsr),
    op(0x2A, "ROL", Accumulator, 2, Modify, rol), op(0x26, "ROL", Zero, 5, Modify, rol), op(0x36, "ROL", ZeroX, 6, Modify, rol),
    op(0x2E, "ROL", Absolute, 6, Modify, rol), op(0x3E, "ROL", AbsoluteX, 7, Modify, rol),
    op(0x6A, "ROR", Accumulator, 2, Modify, ror), op(0x66, "ROR", Zero, 5, Modify, ror), op(0x76, "ROR", ZeroX, 6, Modify, ror),
    op(0x6E, "ROR", Absolute, 6, Modify, ror), op(0x7E, "ROR", AbsoluteX, 7, Modify, ror),
    op(0xE6, "INC", Zero, 5, Modify, inc), op(0xF6, "INC", ZeroX, 6, Modify, inc), op(0xEE, "INC", Absolute, 6, Modify, inc),
    op(0xFE, "INC", AbsoluteX, 7, Modify, inc),
    op(0xC6, "DEC", Zero, 5, Modify, dec), op(0xD6, "DEC", ZeroX, 6, Modify, dec), op(0xCE, "DEC", Absolute, 6, Modify, dec),
    op(0xDE, "DEC", AbsoluteX, 7, Modify, dec),

    // control flow
    op(0x10, "BPL", Relative, 2, Internal, bpl), op(0x30, "BMI", Relative, 2, Internal, bmi),
    op(0x50, "BVC", Relative, 2, Internal, bvc), op(0x70, "BVS", Relative, 2, Internal, bvs),
    op(0x90, "BCC", Relative, 2, Internal, bcc), op(0xB0, "BCS", Relative, 2, Internal, bcs),
    op(0xD0, "BNE", Relative, 2, Internal, bne), op(0xF0, "BEQ", Relative, 2, Internal, beq),
    op(0x4C, "JMP", Absolute, 3, Internal, jmp), op(0x6C, "JMP", Indirect, 5, Internal, jmp),
    op(0x20, "JSR", Absolute, 6, Internal, jsr), op(0x60, "RTS", Implied, 6, Internal, rts),
    op(0x40, "RTI", Implied, 6, Internal, rti), op(0x00, "BRK", Implied, 7, Internal, brk),

    // flags, transfers, stack
    op(0x18, "CLC", Implied, 2, Internal, clc), op(0x38, "SEC", Implied, 2, Internal, sec),
    op(0x58, "CLI", Implied, 2, Internal, cli), op(0x78, "SEI", Implied, 2, Internal, sei),
    op(0xB8, "CLV", Implied, 2, Internal, clv), op(0xD8, "CLD", Implied, 2, Internal, cld),
    op(0xF8, "SED", Implied, 2, Internal, sed),
    op(0xAA, "TAX", Implied, 2, Internal, tax), op(0x8A, "TXA", Implied, 2, Internal, txa),
    op(0xA8, "TAY", Implied, 2, Internal, tay), op(0x98, "TYA", Implied, 2, Internal, tya),
    op(0xBA, "TSX", Implied, 2, Internal, tsx), op(0x9A, "TXS", Implied, 2, Internal, txs),
    op(0xE8, "INX", Implied, 2, Internal, inx), op(0xCA, "DEX", Implied, 2, Internal, dex),
    op(0xC8, "INY", Implied, 2, Internal, iny), op(0x88, "DEY", Implied, 2, Internal, dey),
    op(0x48, "PHA", Implied, 3, Internal, pha), op(0x08, "PHP", Implied, 3, Internal, php),
    op(0x68, "PLA", Implied, 4, Internal, pla), op(0x28, "PLP", Implied, 4, Internal, plp),
    op(0xEA, "NOP", Implied, 2, Internal, nop),

    // unofficial
    ill(0x1A, "NOP", Implied, 2, Internal, nop), ill(0x3A, "NOP", Implied, 2, Internal, nop), ill(0x5A, "NOP", Implied, 2, Internal, nop),
    ill(0x7A, "NOP", Implied, 2, Internal, nop), ill(0xDA, "NOP", Implied, 2, Internal, nop), ill(0xFA, "NOP", Implied, 2, Internal, nop),
    ill(0x80, "NOP", Immediate, 2, Read, nop), ill(0x82, "NOP", Immediate, 2, Read, nop), ill(0x89, "NOP", Immediate, 2, Read, nop),
    ill(0xC2, "NOP", Immediate, 2, Read, nop), ill(0xE2, "NOP", Immediate, 2, Read, nop),
    ill(0x04, "NOP", Zero, 3, Read, nop), ill(0x44, "NOP", Zero, 3, Read, nop), ill(0x64, "NOP", Zero, 3, Read, nop),
    ill(0x14, "NOP", ZeroX, 4, Read, nop), ill(0x34, "NOP", ZeroX, 4, Read, nop), ill(0x54, "NOP", ZeroX, 4, Read, nop),
    ill(0x74, "NOP", ZeroX, 4, Read, nop), ill(0xD4, "NOP", ZeroX, 4, Read, nop), ill(0xF4, "NOP", ZeroX, 4, Read, nop),
    ill(0x0C, "NOP", Absolute, 4, Read, nop),
    ill(0x1C, "NOP", AbsoluteX, 4, Read, nop), ill(0x3C, "NOP", AbsoluteX, 4, Read, nop), ill(0x5C, "NOP", AbsoluteX, 4, Read, nop),
    ill(0x7C, "NOP", AbsoluteX, 4, Read, nop), ill(0xDC, "NOP", AbsoluteX, 4, Read, nop), ill(0xFC, "NOP", AbsoluteX, 4, Read, nop),
    ill(0xA7, "LAX", Zero, 3, Read, lax), ill(0xB7, "LAX", ZeroY, 4, Read, lax), ill(0xAF, "LAX", Absolute, 4, Read, lax),
    ill(0xBF, "LAX", AbsoluteY, 4, Read, lax), ill(0xA3, "LAX", IndirectX, 6, Read, lax), ill(0xB3, "LAX", IndirectY, 5, Read, lax),
    ill(0x87, "SAX", Zero, 3, Write, sax), ill(0x97, "SAX", ZeroY, 4, Write, sax), ill(0x8F, "SAX", Absolute, 4, Write, sax),
    ill(0x83, "SAX", IndirectX, 6, Write, sax),
    ill(0xEB, "SBC", Immediate, 2, Read, sbc),
    ill(0xC7, "DCP", Zero, 5, Modify, dcp), ill(0xD7, "DCP", ZeroX, 6, Modify, dcp), ill(0xCF, "DCP", Absolute, 6, Modify, dcp),
    ill(0xDF, "DCP", AbsoluteX, 7, Modify, dcp), ill(0xDB, "DCP", AbsoluteY, 7, Modify, dcp), ill(0xC3, "DCP", IndirectX, 8, Modify, dcp),
    ill(0xD3, "DCP", IndirectY, 8, Modify, dcp),
    ill(0xE7, "ISB", Zero, 5, Modify, isb), ill(0xF7, "ISB", ZeroX, 6, Modify, isb), ill(0xEF, "ISB", Absolute, 6, Modify, isb),
    ill(0xFF, "ISB", AbsoluteX, 7, Modify, isb), ill(0xFB, "ISB", AbsoluteY, 7, Modify, isb), ill(0xE3, "ISB", IndirectX, 8, Modify, isb),
    ill(0xF3, "ISB", IndirectY, 8, Modify, isb),
    ill(0x07, "SLO", Zero, 5, Modify, slo), ill(0x17, "SLO", ZeroX, 6, Modify, slo), ill(0x0F, "SLO", Absolute, 6, Modify, slo),
    ill(0x1F, "SLO", AbsoluteX, 7, Modify, slo), ill(0x1B, "SLO", AbsoluteY, 7, Modify, slo), ill(0x03, "SLO", IndirectX, 8, Modify, slo),
    ill(0x13, "SLO", IndirectY, 8, Modify, slo),
    ill(0x27, "RLA", Zero, 5, Modify, rla), ill(0x37, "RLA", ZeroX, 6, Modify, rla), ill(0x2F, "RLA", Absolute, 6, Modify, rla),
    ill(0x3F, "RLA", AbsoluteX, 7, Modify, rla), ill(0x3B, "RLA", AbsoluteY, 7, Modify, rla), ill(0x23, "RLA", IndirectX, 8, Modify, rla),
    ill(0x33, "RLA", IndirectY, 8, Modify, rla),
    ill(0x47, "SRE", Zero, 5, Modify, sre), ill(0x57, "SRE", ZeroX, 6, Modify, sre), ill(0x4F, "SRE", Absolute, 6, Modify, sre),
    ill(0x5F, "SRE", AbsoluteX, 7, Modify, sre), ill(0x5B, "SRE", AbsoluteY, 7, Modify, sre), ill(0x43, "SRE", IndirectX, 8, Modify, sre),
    ill(0x53, "SRE", IndirectY, 8, Modify, sre),
    ill(0x67, "RRA", Zero, 5, Modify, rra), ill(0x77, "RRA", ZeroX, 6, Modify, rra), ill(0x6F, "RRA", Absolute, 6, Modify, rra),
    ill(0x7F, "RRA", AbsoluteX, 7, Modify, rra), ill(0x7B, "RRA", AbsoluteY, 7, Modify, rra), ill(0x63, "RRA", IndirectX, 8, Modify, rra),
    ill(0x73, "RRA", IndirectY, 8, Modify, rra),
];

const fn build_table() -> [Option<Instruction>; 256] {
    let mut table: [Option<Instruction>; 256] = [None; 256];
    let mut i = 0;
    while i < DEFINITIONS.len() {
        let inst = DEFINITIONS[i];
        table[inst.opcode as usize] = Some(inst);
        i += 1;
    }

    table
}

/// Indexed by opcode. `None` marks opcodes that halt the CPU.
pub static INSTRUCTIONS: [Option<Instruction>; 256] = build_table();


// --- helpers ---

fn add(cpu: &mut Ricoh2A03, value: u8) {
    let sum = cpu.acc as u16 + value as u16 + cpu.status.contains(StatusReg::Carry) as u16;
    let result = sum as u8;
    cpu.status.set(StatusReg::Carry, sum > 0xFF);
    cpu.status.set(StatusReg::Overflow, (cpu.acc ^ result) & (value ^ result) & 0x80 != 0);
    cpu.acc = result;
    cpu.set_zn(result);
}

fn compare(cpu: &mut Ricoh2A03, reg: u8, value: u8) {
    cpu.status.set(StatusReg::Carry, reg >= value);
    cpu.set_zn(reg.wrapping_sub(value));
}

fn shift_left(cpu: &mut Ricoh2A03, value: u8, carry_in: bool) -> u8 {
    cpu.status.set(StatusReg::Carry, value & 0x80 != 0);
    let result = (value << 1) | carry_in as u8;
    cpu.set_zn(result);
    result
}

fn shift_right(cpu: &mut Ricoh2A03, value: u8, carry_in: bool) -> u8 {
    cpu.status.set(StatusReg::Carry, value & 0x01 != 0);
    let result = (value >> 1) | ((carry_in as u8) << 7);
    cpu.set_zn(result);
    result
}

fn branch(cpu: &mut Ricoh2A03, op: &Operand, condition: bool) -> u8 {
    if !condition {
        return 0;
    }
    cpu.pc = op.addr;
    1 + op.crossed as u8
}

fn carry(cpu: &Ricoh2A03) -> bool {
    cpu.status.contains(StatusReg::Carry)
}


// --- loads and stores ---

fn lda(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { cpu.acc = op.value; cpu.set_zn(op.value); 0 }
fn ldx(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { cpu.x = op.value; cpu.set_zn(op.value); 0 }
fn ldy(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { cpu.y = op.value; cpu.set_zn(op.value); 0 }
fn sta(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { op.value = cpu.acc; 0 }
fn stx(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { op.value = cpu.x; 0 }
fn sty(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { op.value = cpu.y; 0 }


// --- arithmetic and logic ---

fn adc(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { add(cpu, op.value); 0 }
fn sbc(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { add(cpu, !op.value); 0 }

fn and(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    cpu.acc &= op.value;
    cpu.set_zn(cpu.acc);
    0
}

fn ora(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    cpu.acc |= op.value;
    cpu.set_zn(cpu.acc);
    0
}

fn eor(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    cpu.acc ^= op.value;
    cpu.set_zn(cpu.acc);
    0
}

fn cmp(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { compare(cpu, cpu.acc, op.value); 0 }
fn cpx(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { compare(cpu, cpu.x, op.value); 0 }
fn cpy(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { compare(cpu, cpu.y, op.value); 0 }

fn bit(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    cpu.status.set(StatusReg::Zero, cpu.acc & op.value == 0);
    cpu.status.set(StatusReg::Negative, op.value & 0x80 != 0);
    cpu.status.set(StatusReg::Overflow, op.value & 0x40 != 0);
    0
}


// --- read-modify-write ---

fn asl(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { op.value = shift_left(cpu, op.value, false); 0 }
fn lsr(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { op.value = shift_right(cpu, op.value, false); 0 }

fn rol(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    let c = carry(cpu);
    op.value = shift_left(cpu, op.value, c);
    0
}

fn ror(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    let c = carry(cpu);
    op.value = shift_right(cpu, op.value, c);
    0
}

fn inc(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    op.value = op.value.wrapping_add(1);
    cpu.set_zn(op.value);
    0
}

fn dec(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    op.value = op.value.wrapping_sub(1);
    cpu.set_zn(op.value);
    0
}


// --- control flow ---

fn bpl(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { let c = !cpu.status.contains(StatusReg::Negative); branch(cpu, op, c) }
fn bmi(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { let c = cpu.status.contains(StatusReg::Negative); branch(cpu, op, c) }
fn bvc(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { let c = !cpu.status.contains(StatusReg::Overflow); branch(cpu, op, c) }
fn bvs(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { let c = cpu.status.contains(StatusReg::Overflow); branch(cpu, op, c) }
fn bcc(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { let c = !cpu.status.contains(StatusReg::Carry); branch(cpu, op, c) }
fn bcs(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { let c = cpu.status.contains(StatusReg::Carry); branch(cpu, op, c) }
fn bne(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { let c = !cpu.status.contains(StatusReg::Zero); branch(cpu, op, c) }
fn beq(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 { let c = cpu.status.contains(StatusReg::Zero); branch(cpu, op, c) }

fn jmp(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    cpu.pc = op.addr;
    0
}

fn jsr(cpu: &mut Ricoh2A03, bus: &mut MemoryBus, op: &mut Operand) -> u8 {
    let ret = cpu.pc.wrapping_sub(1);
    cpu.push(bus, (ret >> 8) as u8);
    cpu.push(bus, ret as u8);
    cpu.pc = op.addr;
    0
}

fn rts(cpu: &mut Ricoh2A03, bus: &mut MemoryBus, _: &mut Operand) -> u8 {
    let lo = cpu.pull(bus) as u16;
    let hi = cpu.pull(bus) as u16;
    cpu.pc = ((hi << 8) | lo).wrapping_add(1);
    0
}

fn rti(cpu: &mut Ricoh2A03, bus: &mut MemoryBus, op: &mut Operand) -> u8 {
    plp(cpu, bus, op);
    let lo = cpu.pull(bus) as u16;
    let hi = cpu.pull(bus) as u16;
    cpu.pc = (hi << 8) | lo;
    0
}

fn brk(cpu: &mut Ricoh2A03, bus: &mut MemoryBus, _: &mut Operand) -> u8 {
    // skip the padding byte
    cpu.pc = cpu.pc.wrapping_add(1);
    cpu.enter_interrupt(bus, InterruptKind::Irq, true);
    0
}


// --- flags, transfers, stack ---

fn clc(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.status.remove(StatusReg::Carry); 0 }
fn sec(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.status.insert(StatusReg::Carry); 0 }
fn cli(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.status.remove(StatusReg::InterruptDisable); 0 }
fn sei(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.status.insert(StatusReg::InterruptDisable); 0 }
fn clv(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.status.remove(StatusReg::Overflow); 0 }
fn cld(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.status.remove(StatusReg::Decimal); 0 }
fn sed(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.status.insert(StatusReg::Decimal); 0 }

fn tax(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.x = cpu.acc; cpu.set_zn(cpu.x); 0 }
fn txa(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.acc = cpu.x; cpu.set_zn(cpu.acc); 0 }
fn tay(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.y = cpu.acc; cpu.set_zn(cpu.y); 0 }
fn tya(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.acc = cpu.y; cpu.set_zn(cpu.acc); 0 }
fn tsx(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.x = cpu.sp.0; cpu.set_zn(cpu.x); 0 }
fn txs(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.sp.0 = cpu.x; 0 }
fn inx(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.x = cpu.x.wrapping_add(1); cpu.set_zn(cpu.x); 0 }
fn dex(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.x = cpu.x.wrapping_sub(1); cpu.set_zn(cpu.x); 0 }
fn iny(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.y = cpu.y.wrapping_add(1); cpu.set_zn(cpu.y); 0 }
fn dey(cpu: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { cpu.y = cpu.y.wrapping_sub(1); cpu.set_zn(cpu.y); 0 }

fn pha(cpu: &mut Ricoh2A03, bus: &mut MemoryBus, _: &mut Operand) -> u8 {
    cpu.push(bus, cpu.acc);
    0
}

fn php(cpu: &mut Ricoh2A03, bus: &mut MemoryBus, _: &mut Operand) -> u8 {
    let pushed = cpu.status | StatusReg::Break | StatusReg::Unused;
    cpu.push(bus, pushed.bits());
    0
}

fn pla(cpu: &mut Ricoh2A03, bus: &mut MemoryBus, _: &mut Operand) -> u8 {
    cpu.acc = cpu.pull(bus);
    cpu.set_zn(cpu.acc);
    0
}

fn plp(cpu: &mut Ricoh2A03, bus: &mut MemoryBus, _: &mut Operand) -> u8 {
    let pulled = StatusReg::from_bits_retain(cpu.pull(bus));
    cpu.status = (pulled - StatusReg::Break) | StatusReg::Unused;
    0
}

fn nop(_: &mut Ricoh2A03, _: &mut MemoryBus, _: &mut Operand) -> u8 { 0 }


// --- unofficial ---

fn lax(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    cpu.acc = op.value;
    cpu.x = op.value;
    cpu.set_zn(op.value);
    0
}

fn sax(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    op.value = cpu.acc & cpu.x;
    0
}

fn dcp(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    op.value = op.value.wrapping_sub(1);
    compare(cpu, cpu.acc, op.value);
    0
}

fn isb(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    op.value = op.value.wrapping_add(1);
    add(cpu, !op.value);
    0
}

fn slo(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    op.value = shift_left(cpu, op.value, false);
    cpu.acc |= op.value;
    cpu.set_zn(cpu.acc);
    0
}

fn rla(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    let c = carry(cpu);
    op.value = shift_left(cpu, op.value, c);
    cpu.acc &= op.value;
    cpu.set_zn(cpu.acc);
    0
}

fn sre(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    op.value = shift_right(cpu, op.value, false);
    cpu.acc ^= op.value;
    cpu.set_zn(cpu.acc);
    0
}

fn rra(cpu: &mut Ricoh2A03, _: &mut MemoryBus, op: &mut Operand) -> u8 {
    let c = carry(cpu);
    op.value = shift_right(cpu, op.value, c);
    add(cpu, op.value);
    0
}
