#![allow(non_upper_case_globals)]

use std::cell::Cell;
use std::fmt::{Debug, Formatter};
use std::num::Wrapping;
use std::rc::Rc;
use bitflags::bitflags;
use thiserror::Error;
use tracing::{error, trace};
use crate::arch::bus::{MemoryBus, MemoryMappedDevice};
use AddrMode::*;

pub mod disasm;
pub mod instructions;
pub mod interrupt;

pub use instructions::{Instruction, Operand, INSTRUCTIONS};
pub use interrupt::{InterruptGuard, InterruptKind, InterruptLine};

/// Cycles consumed by Reset, NMI, IRQ and BRK sequences.
const INTERRUPT_CYCLES: u8 = 7;
/// Internal cycles of one OAM DMA transfer (256 read/write pairs).
pub const OAM_DMA_CYCLES: u16 = 512;
const OAMDATA: u16 = 0x2004;


bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct StatusReg: u8 {
        const Negative          = 0b10000000;
        const Overflow          = 0b01000000;
        const Unused            = 0b00100000;
        const Break             = 0b00010000;
        const Decimal           = 0b00001000;
        const InterruptDisable  = 0b00000100;
        const Zero              = 0b00000010;
        const Carry             = 0b00000001;
    }
}
impl Default for StatusReg {
    fn default() -> Self {
        StatusReg::Unused | StatusReg::InterruptDisable
    }
}
impl std::fmt::Display for StatusReg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        if self.intersects(StatusReg::Negative)           { s.push('N') } else { s.push('n') }
        if self.intersects(StatusReg::Overflow)           { s.push('V') } else { s.push('v') }
        s.push('-');
        if self.intersects(StatusReg::Break)              { s.push('B') } else { s.push('b') }
        if self.intersects(StatusReg::Decimal)            { s.push('D') } else { s.push('d') }
        if self.intersects(StatusReg::InterruptDisable)   { s.push('I') } else { s.push('i') }
        if self.intersects(StatusReg::Zero)               { s.push('Z') } else { s.push('z') }
        if self.intersects(StatusReg::Carry)              { s.push('C') } else { s.push('c') }

        write!(f, "{}", s)
    }
}


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddrMode {
    Accumulator,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Immediate,
    Implied,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
    Zero,
    ZeroX,
    ZeroY,
}
impl AddrMode {
    /// Instruction length in bytes, opcode included.
    pub const fn size(self) -> u16 {
        match self {
            Implied | Accumulator => 1,
            Immediate | Zero | ZeroX | ZeroY | Relative | IndirectX | IndirectY => 2,
            Absolute | AbsoluteX | AbsoluteY | Indirect => 3,
        }
    }

    /// Modes whose indexed page cross costs read-only instructions a cycle.
    fn pays_page_penalty(self) -> bool {
        matches!(self, AbsoluteX | AbsoluteY | IndirectY)
    }
}

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum CpuFault {
    #[error("unknown opcode {opcode:#04X} at {pc:#06X}")]
    UnknownOpcode { opcode: u8, pc: u16 },
}

#[derive(Copy, Clone, Debug)]
struct OamDma {
    page: u8,
    cycle: u16,
    latch: u8,
}

/// $4014. Latches a page number; the CPU starts the transfer on its next step.
#[derive(Clone, Debug)]
pub struct OamDmaPort {
    request: Rc<Cell<Option<u8>>>,
}
impl MemoryMappedDevice for OamDmaPort {
    fn read(&mut self, _addr: u16) -> u8 {
        0
    }

    fn write(&mut self, _addr: u16, data: u8) {
        self.request.set(Some(data));
    }
}


pub struct Ricoh2A03 {
    pub pc: u16,
    pub sp: Wrapping<u8>,
    pub status: StatusReg,
    pub acc: u8,
    pub x: u8,
    pub y: u8,
    /// Total CPU cycles since power-on.
    pub cyc: u64,
    reset: InterruptLine,
    nmi: InterruptLine,
    irq: InterruptLine,
    dma_request: Rc<Cell<Option<u8>>>,
    dma: Option<OamDma>,
    halted: Option<CpuFault>,
}
impl Debug for Ricoh2A03 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ricoh2A03")
         .field("pc", &format_args!("{:#06X}", self.pc))
         .field("sp", &format_args!("{:#04X}", self.sp.0))
         .field("status", &format_args!("{}", self.status))
         .field("acc", &self.acc)
         .field("x", &self.x)
         .field("y", &self.y)
         .field("cyc", &self.cyc)
         .field("dma", &self.dma.is_some())
         .field("halted", &self.halted)
         .finish()
    }
}
impl Default for Ricoh2A03 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ricoh2A03 {
    pub const NAME: &'static str = "Ricoh 2A03 CPU";

    /// Power-on state. The reset line starts asserted so the first step runs
    /// the reset sequence.
    pub fn new() -> Self {
        let cpu = Self {
            pc: 0,
            sp: Wrapping(0x00),
            status: StatusReg::default(),
            acc: 0,
            x: 0,
            y: 0,
            cyc: 0,
            reset: InterruptLine::new(InterruptKind::Reset),
            nmi: InterruptLine::new(InterruptKind::Nmi),
            irq: InterruptLine::new(InterruptKind::Irq),
            dma_request: Rc::new(Cell::new(None)),
            dma: None,
            halted: None,
        };
        cpu.reset.assert();

        cpu
    }

    pub fn interrupt(&self, kind: InterruptKind) -> InterruptLine {
        match kind {
            InterruptKind::Reset => self.reset.clone(),
            InterruptKind::Nmi => self.nmi.clone(),
            InterruptKind::Irq => self.irq.clone(),
        }
    }

    pub fn interrupt_by_name(&self, name: &str) -> Option<InterruptLine> {
        InterruptKind::from_name(name).map(|kind| self.interrupt(kind))
    }

    pub fn dma_port(&self) -> OamDmaPort {
        OamDmaPort { request: self.dma_request.clone() }
    }

    /// Request a reset and clear any halt or DMA in flight.
    pub fn reset(&mut self) {
        self.halted = None;
        self.dma = None;
        self.dma_request.set(None);
        self.reset.assert();
    }

    pub fn halted(&self) -> Option<CpuFault> {
        self.halted
    }

    pub fn dma_active(&self) -> bool {
        self.dma.is_some() || self.dma_request.get().is_some()
    }

    /// Run one instruction, one interrupt sequence, or one OAM DMA cycle and
    /// return the CPU cycles it took.
    pub fn step(&mut self, bus: &mut MemoryBus) -> Result<u8, CpuFault> {
        if let Some(fault) = self.halted {
            return Err(fault);
        }

        if let Some(page) = self.dma_request.take() {
            trace!("OAM DMA from page {page:#04X}");
            self.dma = Some(OamDma { page, cycle: 0, latch: 0 });
        }
        if let Some(mut dma) = self.dma {
            if dma.cycle & 1 == 0 {
                dma.latch = bus.read(((dma.page as u16) << 8) | (dma.cycle >> 1));
            } else {
                bus.write(OAMDATA, dma.latch);
            }
            dma.cycle += 1;
            self.dma = (dma.cycle < OAM_DMA_CYCLES).then_some(dma);
            self.cyc += 1;

            return Ok(1);
        }

        let serviced = if self.reset.acknowledge() {
            Some(InterruptKind::Reset)
        } else if self.nmi.acknowledge() {
            Some(InterruptKind::Nmi)
        } else if self.irq.is_asserted() && !self.status.contains(StatusReg::InterruptDisable) {
            Some(InterruptKind::Irq)
        } else {
            None
        };
        if let Some(kind) = serviced {
            self.enter_interrupt(bus, kind, false);
            self.cyc += INTERRUPT_CYCLES as u64;

            return Ok(INTERRUPT_CYCLES);
        }

        let pc = self.pc;
        let opcode = bus.read(pc);
        let Some(inst) = INSTRUCTIONS[opcode as usize] else {
            let fault = CpuFault::UnknownOpcode { opcode, pc };
            error!("CPU halted: {fault}");
            self.halted = Some(fault);

            return Err(fault);
        };

        self.pc = pc.wrapping_add(inst.mode.size());
        let mut op = self.decode(bus, inst.mode, pc);

        if inst.read {
            op.value = match inst.mode {
                Accumulator => self.acc,
                _ => bus.read(op.addr),
            };
            if inst.write && inst.mode != Accumulator {
                bus.write(op.addr, op.value); // RMW dummy write of the unmodified value
            }
        }

        let extra = (inst.execute)(self, bus, &mut op);

        if inst.write {
            match inst.mode {
                Accumulator => self.acc = op.value,
                _ => bus.write(op.addr, op.value),
            }
        }

        let penalty = (inst.read && !inst.write && op.crossed && inst.mode.pays_page_penalty()) as u8;
        let cycles = inst.cycles + extra + penalty;
        self.cyc += cycles as u64;

        Ok(cycles)
    }

    /// Compute the effective address. `pc` is the opcode address; `self.pc`
    /// already points at the next instruction.
    fn decode(&mut self, bus: &mut MemoryBus, mode: AddrMode, pc: u16) -> Operand {
        let arg = pc.wrapping_add(1);
        let (addr, crossed) = match mode {
            Implied | Accumulator => (0, false),
            Immediate => (arg, false),
            Zero => (bus.read(arg) as u16, false),
            ZeroX => (bus.read(arg).wrapping_add(self.x) as u16, false),
            ZeroY => (bus.read(arg).wrapping_add(self.y) as u16, false),
            Relative => {
                let offset = bus.read(arg) as i8;
                let target = self.pc.wrapping_add(offset as u16);
                (target, crosses_page(self.pc, target))
            },
            Absolute => (bus.read_u16(arg), false),
            AbsoluteX => {
                let base = bus.read_u16(arg);
                let addr = base.wrapping_add(self.x as u16);
                (addr, crosses_page(base, addr))
            },
            AbsoluteY => {
                let base = bus.read_u16(arg);
                let addr = base.wrapping_add(self.y as u16);
                (addr, crosses_page(base, addr))
            },
            Indirect => {
                // the pointer's high byte never carries into the next page
                let ptr = bus.read_u16(arg);
                let lo = bus.read(ptr) as u16;
                let hi = bus.read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
                ((hi << 8) | lo, false)
            },
            IndirectX => {
                let zp = bus.read(arg).wrapping_add(self.x);
                (read_zero_page_u16(bus, zp), false)
            },
            IndirectY => {
                let zp = bus.read(arg);
                let base = read_zero_page_u16(bus, zp);
                let addr = base.wrapping_add(self.y as u16);
                (addr, crosses_page(base, addr))
            },
        };

        Operand { addr, value: 0, crossed }
    }

    /// Push PC and P, set I and jump through the event's vector. Reset skips
    /// the pushes and only moves the stack pointer.
    pub(crate) fn enter_interrupt(&mut self, bus: &mut MemoryBus, kind: InterruptKind, software: bool) {
        match kind {
            InterruptKind::Reset => self.sp -= Wrapping(3),
            _ => {
                self.push(bus, (self.pc >> 8) as u8);
                self.push(bus, self.pc as u8);
                let mut pushed = self.status | StatusReg::Unused;
                pushed.set(StatusReg::Break, software);
                self.push(bus, pushed.bits());
            },
        }

        self.status.insert(StatusReg::InterruptDisable);
        self.pc = bus.read_u16(kind.vector());
        trace!("{kind:?} -> {:#06X}", self.pc);
    }

    pub(crate) fn push(&mut self, bus: &mut MemoryBus, data: u8) {
        bus.write(0x100 + self.sp.0 as u16, data);
        self.sp -= Wrapping(1);
    }

    pub(crate) fn pull(&mut self, bus: &mut MemoryBus) -> u8 {
        self.sp += Wrapping(1);
        bus.read(0x100 + self.sp.0 as u16)
    }

    #[inline(always)]
    pub(crate) fn set_zn(&mut self, value: u8) {
        self.status.set(StatusReg::Zero, value == 0);
        self.status.set(StatusReg::Negative, value & 0x80 != 0);
    }
}

#[inline(always)]
fn crosses_page(a: u16, b: u16) -> bool {
    (a & 0xFF00) != (b & 0xFF00)
}

fn read_zero_page_u16(bus: &mut MemoryBus, zp: u8) -> u16 {
    let lo = bus.read(zp as u16) as u16;
    let hi = bus.read(zp.wrapping_add(1) as u16) as u16;

    (hi << 8) | lo
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::bus::{Access, BreakpointKind};
    use crate::arch::ram::Ram;
    use std::cell::RefCell;

    /// 64 KiB of RAM with the reset vector pointing at `origin` and `program`
    /// loaded there.
    pub fn flat_bus(origin: u16, program: &[u8]) -> (MemoryBus, Rc<RefCell<Ram>>) {
        let mut bus = MemoryBus::new("CPU Bus", 16);
        let ram = Rc::new(RefCell::new(Ram::new(0x10000)));
        bus.register_mapped_device(ram.clone(), 0x0000, 0xFFFF);
        for (i, byte) in program.iter().enumerate() {
            bus.write(origin.wrapping_add(i as u16), *byte);
        }
        bus.write(0xFFFC, origin as u8);
        bus.write(0xFFFD, (origin >> 8) as u8);

        (bus, ram)
    }

    /// CPU that has already run its reset sequence.
    pub fn booted(bus: &mut MemoryBus) -> Ricoh2A03 {
        let mut cpu = Ricoh2A03::new();
        assert_eq!(cpu.step(bus), Ok(7));
        cpu
    }

    #[test]
    fn reset_sequence() {
        let (mut bus, _) = flat_bus(0x8000, &[0xEA]);
        let mut cpu = Ricoh2A03::new();

        assert_eq!(cpu.step(&mut bus), Ok(7));
        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(cpu.sp.0, 0xFD);
        assert_eq!(cpu.status.bits(), 0x24);
        assert_eq!(cpu.cyc, 7);
    }

    #[test]
    fn adc_sets_overflow_and_carry() {
        // LDA #$50; ADC #$50; LDA #$FF; ADC #$01
        let (mut bus, _) = flat_bus(0x8000, &[0xA9, 0x50, 0x69, 0x50, 0xA9, 0xFF, 0x69, 0x01]);
        let mut cpu = booted(&mut bus);

        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus), Ok(2));
        assert_eq!(cpu.acc, 0xA0);
        assert!(cpu.status.contains(StatusReg::Overflow | StatusReg::Negative));
        assert!(!cpu.status.contains(StatusReg::Carry));

        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.acc, 0x00);
        assert!(cpu.status.contains(StatusReg::Carry | StatusReg::Zero));
        assert!(!cpu.status.contains(StatusReg::Overflow));
    }

    #[test]
    fn sbc_borrows() {
        // SEC; LDA #$00; SBC #$01
        let (mut bus, _) = flat_bus(0x8000, &[0x38, 0xA9, 0x00, 0xE9, 0x01]);
        let mut cpu = booted(&mut bus);
        for _ in 0..3 {
            cpu.step(&mut bus).unwrap();
        }
        assert_eq!(cpu.acc, 0xFF);
        assert!(!cpu.status.contains(StatusReg::Carry));
        assert!(cpu.status.contains(StatusReg::Negative));
    }

    #[test]
    fn page_cross_penalty_only_for_reads() {
        // LDX #$01; LDA $80FF,X; STA $80FF,X; INC $80FF,X
        let (mut bus, _) = flat_bus(0x8000, &[0xA2, 0x01, 0xBD, 0xFF, 0x80, 0x9D, 0xFF, 0x80, 0xFE, 0xFF, 0x80]);
        let mut cpu = booted(&mut bus);

        assert_eq!(cpu.step(&mut bus), Ok(2));
        assert_eq!(cpu.step(&mut bus), Ok(5));
        assert_eq!(cpu.step(&mut bus), Ok(5));
        assert_eq!(cpu.step(&mut bus), Ok(7));
    }

    #[test]
    fn branch_timing() {
        // 80F0: BNE +$0C (taken, crosses to $8100); 80FE..: filler
        let mut program = vec![0xEA; 0x20];
        program[0] = 0xD0; // BNE
        program[1] = 0x0E;
        program[2] = 0xF0; // BEQ (not taken)
        program[3] = 0x00;
        let (mut bus, _) = flat_bus(0x80F0, &program);
        let mut cpu = booted(&mut bus);
        cpu.status.remove(StatusReg::Zero);

        assert_eq!(cpu.step(&mut bus), Ok(4));
        assert_eq!(cpu.pc, 0x8100);

        cpu.pc = 0x80F2;
        assert_eq!(cpu.step(&mut bus), Ok(2));
        assert_eq!(cpu.pc, 0x80F4);

        // BNE back by 2 within the page: taken, same page
        bus.write(0x8010, 0xD0);
        bus.write(0x8011, 0xFE);
        cpu.pc = 0x8010;
        assert_eq!(cpu.step(&mut bus), Ok(3));
        assert_eq!(cpu.pc, 0x8010);
    }

    #[test]
    fn rmw_writes_the_unmodified_value_first() {
        // INC $0200
        let (mut bus, _) = flat_bus(0x8000, &[0xEE, 0x00, 0x02]);
        bus.write(0x0200, 0x41);
        let mut cpu = booted(&mut bus);

        let writes = Rc::new(RefCell::new(Vec::new()));
        let log = writes.clone();
        let id = bus.create_breakpoint(BreakpointKind::Memory { address: 0x0200, access: Access::WRITE }, move |hit| {
            log.borrow_mut().push(hit.value.unwrap());
        });
        bus.set_breakpoint_enabled(id, true);

        assert_eq!(cpu.step(&mut bus), Ok(6));
        assert_eq!(*writes.borrow(), vec![0x41, 0x42]);
    }

    #[test]
    fn jsr_rts_round_trip() {
        // 8000: JSR $8010; 8003: NOP ... 8010: RTS
        let mut program = vec![0xEA; 0x20];
        program[0..3].copy_from_slice(&[0x20, 0x10, 0x80]);
        program[0x10] = 0x60;
        let (mut bus, _) = flat_bus(0x8000, &program);
        let mut cpu = booted(&mut bus);

        assert_eq!(cpu.step(&mut bus), Ok(6));
        assert_eq!(cpu.pc, 0x8010);
        assert_eq!(bus.read(0x01FD), 0x80);
        assert_eq!(bus.read(0x01FC), 0x02);
        assert_eq!(cpu.step(&mut bus), Ok(6));
        assert_eq!(cpu.pc, 0x8003);
    }

    #[test]
    fn jmp_indirect_wraps_within_page() {
        let (mut bus, _) = flat_bus(0x8000, &[0x6C, 0xFF, 0x02]);
        bus.write(0x02FF, 0x34);
        bus.write(0x0200, 0x12);
        bus.write(0x0300, 0x99);
        let mut cpu = booted(&mut bus);
        assert_eq!(cpu.step(&mut bus), Ok(5));
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn brk_pushes_break_flag_and_skips_padding() {
        let (mut bus, _) = flat_bus(0x8000, &[0x00, 0xFF, 0xEA]);
        bus.write(0xFFFE, 0x00);
        bus.write(0xFFFF, 0x90);
        bus.write(0x9000, 0x40); // RTI
        let mut cpu = booted(&mut bus);
        cpu.status = StatusReg::Unused;

        assert_eq!(cpu.step(&mut bus), Ok(7));
        assert_eq!(cpu.pc, 0x9000);
        assert_eq!(bus.read(0x01FB), 0x30);
        assert!(cpu.status.contains(StatusReg::InterruptDisable));

        assert_eq!(cpu.step(&mut bus), Ok(6));
        assert_eq!(cpu.pc, 0x8002);
        assert!(!cpu.status.contains(StatusReg::InterruptDisable));
    }

    #[test]
    fn interrupt_priority_and_masking() {
        let (mut bus, _) = flat_bus(0x8000, &[0xEA, 0xEA, 0xEA, 0xEA]);
        bus.write(0xFFFA, 0x00);
        bus.write(0xFFFB, 0xA0);
        bus.write(0xFFFE, 0x00);
        bus.write(0xFFFF, 0xB0);
        let mut cpu = booted(&mut bus);
        let irq = cpu.interrupt_by_name("IRQ").unwrap();
        let nmi = cpu.interrupt_by_name("NMI").unwrap();

        // I is set after reset: IRQ is held off
        irq.assert();
        assert_eq!(cpu.step(&mut bus), Ok(2));
        assert_eq!(cpu.pc, 0x8001);

        nmi.assert();
        assert_eq!(cpu.step(&mut bus), Ok(7));
        assert_eq!(cpu.pc, 0xA000);
        assert_eq!(bus.read(0x01FB) & 0x30, 0x20, "hardware interrupts push B clear");

        // NMI latch was consumed; IRQ level still held
        cpu.pc = 0x8000;
        cpu.status.remove(StatusReg::InterruptDisable);
        assert_eq!(cpu.step(&mut bus), Ok(7));
        assert_eq!(cpu.pc, 0xB000);

        cpu.status.remove(StatusReg::InterruptDisable);
        irq.deassert();
        cpu.pc = 0x8000;
        assert_eq!(cpu.step(&mut bus), Ok(2));
    }

    #[test]
    fn unknown_opcode_halts() {
        let (mut bus, _) = flat_bus(0x8000, &[0x02]);
        let mut cpu = booted(&mut bus);
        let fault = CpuFault::UnknownOpcode { opcode: 0x02, pc: 0x8000 };
        assert_eq!(cpu.step(&mut bus), Err(fault));
        assert_eq!(cpu.step(&mut bus), Err(fault));
        assert_eq!(cpu.halted(), Some(fault));

        cpu.reset();
        assert_eq!(cpu.step(&mut bus), Ok(7));
    }

    #[test]
    fn oam_dma_preempts_for_512_steps() {
        // LDA #$03; STA $4014; NOP
        let (mut bus, ram) = flat_bus(0x8000, &[0xA9, 0x03, 0x8D, 0x14, 0x40, 0xEA]);
        for i in 0..=255u16 {
            bus.write(0x0300 + i, (i as u8).wrapping_mul(7));
        }
        let mut cpu = booted(&mut bus);
        let port = cpu.dma_port();
        // route $4014 to the port and record what lands on $2004
        let mut dma_bus = MemoryBus::new("CPU Bus", 16);
        let oam = Rc::new(RefCell::new(Vec::new()));
        struct OamSink(Rc<RefCell<Vec<u8>>>);
        impl MemoryMappedDevice for OamSink {
            fn read(&mut self, _addr: u16) -> u8 { 0 }
            fn write(&mut self, _addr: u16, data: u8) { self.0.borrow_mut().push(data) }
        }
        dma_bus.register_mapped_device(Rc::new(RefCell::new(OamSink(oam.clone()))), 0x2004, 0x2004);
        dma_bus.register_mapped_device(Rc::new(RefCell::new(port)), 0x4014, 0x4014);
        dma_bus.register_mapped_device(ram, 0x0000, 0xFFFF);

        cpu.step(&mut dma_bus).unwrap();
        assert_eq!(cpu.step(&mut dma_bus), Ok(4));
        assert!(cpu.dma_active());

        for n in 0..OAM_DMA_CYCLES {
            assert_eq!(cpu.step(&mut dma_bus), Ok(1), "DMA cycle {n}");
        }
        assert!(!cpu.dma_active());
        assert_eq!(cpu.pc, 0x8005);
        assert_eq!(cpu.step(&mut dma_bus), Ok(2));
        assert_eq!(cpu.pc, 0x8006);

        let expected: Vec<u8> = (0..=255u16).map(|i| (i as u8).wrapping_mul(7)).collect();
        assert_eq!(*oam.borrow(), expected);
    }

    #[test]
    fn unofficial_combinations() {
        // LAX $10; SAX $11; SLO $12; DCP $13; ISB $14
        let (mut bus, _) = flat_bus(0x8000, &[0xA7, 0x10, 0x87, 0x11, 0x07, 0x12, 0xC7, 0x13, 0xE7, 0x14]);
        bus.write(0x10, 0x3C);
        bus.write(0x12, 0x81);
        bus.write(0x13, 0x3D);
        bus.write(0x14, 0x00);
        let mut cpu = booted(&mut bus);

        assert_eq!(cpu.step(&mut bus), Ok(3));
        assert_eq!((cpu.acc, cpu.x), (0x3C, 0x3C));

        cpu.x = 0x0F;
        assert_eq!(cpu.step(&mut bus), Ok(3));
        assert_eq!(bus.read(0x11), 0x0C);

        assert_eq!(cpu.step(&mut bus), Ok(5));
        assert_eq!(bus.read(0x12), 0x02);
        assert_eq!(cpu.acc, 0x3E);
        assert!(cpu.status.contains(StatusReg::Carry));

        assert_eq!(cpu.step(&mut bus), Ok(5));
        assert_eq!(bus.read(0x13), 0x3C);
        assert!(cpu.status.contains(StatusReg::Carry));
        assert!(!cpu.status.contains(StatusReg::Zero));

        cpu.status.insert(StatusReg::Carry);
        assert_eq!(cpu.step(&mut bus), Ok(5));
        assert_eq!(bus.read(0x14), 0x01);
        assert_eq!(cpu.acc, 0x3D);
    }

    #[test]
    fn php_plp_flag_handling() {
        // PHP; PLA; LDA #$FF; PHA; PLP
        let (mut bus, _) = flat_bus(0x8000, &[0x08, 0x68, 0xA9, 0xFF, 0x48, 0x28]);
        let mut cpu = booted(&mut bus);
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.acc, 0x34);
        for _ in 0..3 {
            cpu.step(&mut bus).unwrap();
        }
        assert_eq!(cpu.status.bits(), 0xEF);
    }
}
