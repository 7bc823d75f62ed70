//! iNES 002

use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;
use crate::arch::error::NesError;
use crate::arch::mappers::{attach, prg_rom, BankMap, BusWiring, Buses, ChrMemory, Mapper, SegmentLimits};
use crate::arch::rom::RomImage;

/// Alias for mapper number 002
pub type UxRom = Mapper002;

pub const LIMITS: SegmentLimits = SegmentLimits { prg: 0x400000, chr: 0x2000 };

#[derive(Debug)]
pub struct Mapper002 {
    prg_rom: Vec<u8>,
    chr: ChrMemory,
    /// $8000 switchable, $C000 fixed to the last bank.
    prg_banks: BankMap<2>,
    wiring: BusWiring,
}
impl Mapper002 {
    pub fn new(rom: &dyn RomImage, buses: &Buses) -> Result<Rc<RefCell<Self>>, NesError> {
        let prg_rom = prg_rom(rom, LIMITS.prg, 0x8000)?;
        let mut prg_banks = BankMap::new(0x4000, prg_rom.len());
        prg_banks.set(0, 0);
        prg_banks.set(1, -1);

        let mapper = Self {
            prg_rom,
            chr: ChrMemory::load(rom, LIMITS.chr, 0x2000)?,
            prg_banks,
            wiring: BusWiring::new(buses),
        };

        Ok(attach(mapper, 0x8000, rom.mirroring(), false))
    }
}
impl Mapper for Mapper002 {
    fn read_cpu(&mut self, addr: u16) -> u8 {
        self.prg_rom[self.prg_banks.translate(addr & 0x7FFF)]
    }

    fn write_cpu(&mut self, _addr: u16, data: u8) {
        self.prg_banks.set(0, data as isize);
        trace!("UxROM PRG bank {data:#04X}");
    }

    fn read_ppu(&mut self, addr: u16) -> u8 {
        self.chr.read((addr & 0x1FFF) as usize)
    }

    fn write_ppu(&mut self, addr: u16, data: u8) {
        self.chr.write((addr & 0x1FFF) as usize, data);
    }

    fn wiring_mut(&mut self) -> &mut BusWiring {
        &mut self.wiring
    }
}
