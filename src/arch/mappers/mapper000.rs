//! iNES 000

use std::cell::RefCell;
use std::rc::Rc;
use crate::arch::error::NesError;
use crate::arch::mappers::{attach, prg_rom, BusWiring, Buses, ChrMemory, Mapper, SegmentLimits};
use crate::arch::rom::RomImage;

/// Alias for mapper number 000
pub type NRom = Mapper000;

pub const LIMITS: SegmentLimits = SegmentLimits { prg: 0x8000, chr: 0x2000 };

#[derive(Debug)]
pub struct Mapper000 {
    /// Family Basic only, but most emulators provide 8 KiB anyway.
    prg_ram: [u8; 0x2000],
    /// 16 KiB images are mirrored into both halves.
    prg_rom: Vec<u8>,
    chr: ChrMemory,
    wiring: BusWiring,
}
impl Mapper000 {
    pub fn new(rom: &dyn RomImage, buses: &Buses) -> Result<Rc<RefCell<Self>>, NesError> {
        let mapper = Self {
            prg_ram: [0u8; 0x2000],
            prg_rom: prg_rom(rom, LIMITS.prg, 0x8000)?,
            chr: ChrMemory::load(rom, LIMITS.chr, 0x2000)?,
            wiring: BusWiring::new(buses),
        };

        Ok(attach(mapper, 0x6000, rom.mirroring(), false))
    }
}
impl Mapper for Mapper000 {
    fn read_cpu(&mut self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr & 0x1FFF) as usize],
            0x8000..=0xFFFF => self.prg_rom[(addr & 0x7FFF) as usize],
            _ => 0,
        }
    }

    fn write_cpu(&mut self, addr: u16, data: u8) {
        if let 0x6000..=0x7FFF = addr {
            self.prg_ram[(addr & 0x1FFF) as usize] = data;
        }
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
