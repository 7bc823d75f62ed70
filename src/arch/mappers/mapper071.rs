//! iNES 071, Camerica/Codemasters BF909x

use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;
use crate::arch::error::NesError;
use crate::arch::mappers::{attach, prg_rom, BankMap, BusWiring, Buses, ChrMemory, Mapper, SegmentLimits};
use crate::arch::nametable::Mirroring;
use crate::arch::rom::RomImage;

/// Alias for mapper number 071
pub type Camerica = Mapper071;

pub const LIMITS: SegmentLimits = SegmentLimits { prg: 0x40000, chr: 0x2000 };

#[derive(Debug)]
pub struct Mapper071 {
    prg_rom: Vec<u8>,
    chr: ChrMemory,
    prg_banks: BankMap<2>,
    /// BF9097 (Fire Hawk) has a one-screen select at $9000-$9FFF.
    screen_select: bool,
    wiring: BusWiring,
}
impl Mapper071 {
    pub fn new(rom: &dyn RomImage, buses: &Buses) -> Result<Rc<RefCell<Self>>, NesError> {
        let prg_rom = prg_rom(rom, LIMITS.prg, 0x8000)?;
        let mut prg_banks = BankMap::new(0x4000, prg_rom.len());
        prg_banks.set(0, 0);
        prg_banks.set(1, -1);

        let screen_select = rom.submapper() == 1;
        let mapper = Self {
            prg_rom,
            chr: ChrMemory::load(rom, LIMITS.chr, 0x2000)?,
            prg_banks,
            screen_select,
            wiring: BusWiring::new(buses),
        };
        let mirroring = if screen_select { Mirroring::SingleScreenLower } else { rom.mirroring() };

        Ok(attach(mapper, 0x8000, mirroring, false))
    }
}
impl Mapper for Mapper071 {
    fn read_cpu(&mut self, addr: u16) -> u8 {
        self.prg_rom[self.prg_banks.translate(addr & 0x7FFF)]
    }

    fn write_cpu(&mut self, addr: u16, data: u8) {
        match addr {
            0x9000..=0x9FFF if self.screen_select => {
                self.wiring.set_mirroring(if data & 0x10 != 0 {
                    Mirroring::SingleScreenUpper
                } else {
                    Mirroring::SingleScreenLower
                });
            },
            0xC000..=0xFFFF => {
                self.prg_banks.set(0, (data & 0x0F) as isize);
                trace!("Camerica PRG bank {:#04X}", data & 0x0F);
            },
            _ => (),
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
