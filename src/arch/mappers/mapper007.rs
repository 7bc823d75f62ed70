//! iNES 007

use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;
use crate::arch::error::NesError;
use crate::arch::mappers::{attach, prg_rom, BankMap, BusWiring, Buses, ChrMemory, Mapper, SegmentLimits};
use crate::arch::nametable::Mirroring;
use crate::arch::rom::RomImage;

/// Alias for mapper number 007
pub type AxRom = Mapper007;

pub const LIMITS: SegmentLimits = SegmentLimits { prg: 0x40000, chr: 0x2000 };

#[derive(Debug)]
pub struct Mapper007 {
    prg_rom: Vec<u8>,
    chr: ChrMemory,
    prg_banks: BankMap<1>,
    wiring: BusWiring,
}
impl Mapper007 {
    pub fn new(rom: &dyn RomImage, buses: &Buses) -> Result<Rc<RefCell<Self>>, NesError> {
        let prg_rom = prg_rom(rom, LIMITS.prg, 0x8000)?;
        let mapper = Self {
            prg_banks: BankMap::new(0x8000, prg_rom.len()),
            prg_rom,
            chr: ChrMemory::load(rom, LIMITS.chr, 0x2000)?,
            wiring: BusWiring::new(buses),
        };

        Ok(attach(mapper, 0x8000, Mirroring::SingleScreenLower, false))
    }
}
impl Mapper for Mapper007 {
    fn read_cpu(&mut self, addr: u16) -> u8 {
        self.prg_rom[self.prg_banks.translate(addr & 0x7FFF)]
    }

    fn write_cpu(&mut self, _addr: u16, data: u8) {
        self.prg_banks.set(0, (data & 0x07) as isize);
        self.wiring.set_mirroring(if data & 0x10 != 0 {
            Mirroring::SingleScreenUpper
        } else {
            Mirroring::SingleScreenLower
        });
        trace!("AxROM {data:#04X}");
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
