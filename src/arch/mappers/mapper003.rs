//! iNES 003

use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;
use crate::arch::error::NesError;
use crate::arch::mappers::{attach, prg_rom, BankMap, BusWiring, Buses, ChrMemory, Mapper, SegmentLimits};
use crate::arch::rom::RomImage;

/// Alias for mapper number 003
pub type CnRom = Mapper003;

pub const LIMITS: SegmentLimits = SegmentLimits { prg: 0x8000, chr: 0x200000 };

#[derive(Debug)]
pub struct Mapper003 {
    prg_ram: [u8; 0x2000],
    prg_rom: Vec<u8>,
    chr: ChrMemory,
    chr_banks: BankMap<1>,
    wiring: BusWiring,
}
impl Mapper003 {
    pub fn new(rom: &dyn RomImage, buses: &Buses) -> Result<Rc<RefCell<Self>>, NesError> {
        let chr = ChrMemory::load(rom, LIMITS.chr, 0x2000)?;
        let mapper = Self {
            prg_ram: [0u8; 0x2000],
            prg_rom: prg_rom(rom, LIMITS.prg, 0x8000)?,
            chr_banks: BankMap::new(0x2000, chr.len()),
            chr,
            wiring: BusWiring::new(buses),
        };

        Ok(attach(mapper, 0x6000, rom.mirroring(), false))
    }
}
impl Mapper for Mapper003 {
    fn read_cpu(&mut self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr & 0x1FFF) as usize],
            0x8000..=0xFFFF => self.prg_rom[(addr & 0x7FFF) as usize],
            _ => 0,
        }
    }

    fn write_cpu(&mut self, addr: u16, data: u8) {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr & 0x1FFF) as usize] = data,
            0x8000..=0xFFFF => {
                self.chr_banks.set(0, data as isize);
                trace!("CNROM CHR bank {data:#04X}");
            },
            _ => (),
        }
    }

    fn read_ppu(&mut self, addr: u16) -> u8 {
        self.chr.read(self.chr_banks.translate(addr & 0x1FFF))
    }

    fn write_ppu(&mut self, addr: u16, data: u8) {
        self.chr.write(self.chr_banks.translate(addr & 0x1FFF), data);
    }

    fn wiring_mut(&mut self) -> &mut BusWiring {
        &mut self.wiring
    }
}
