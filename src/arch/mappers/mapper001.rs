//! iNES 001

use std::cell::RefCell;
use std::rc::Rc;
use proc_bitfield::bitfield;
use tracing::trace;
use crate::arch::error::NesError;
use crate::arch::mappers::{attach, prg_rom, BankMap, BusWiring, Buses, ChrMemory, Mapper, SegmentLimits};
use crate::arch::nametable::Mirroring;
use crate::arch::rom::RomImage;

/// Alias for mapper number 001
pub type Mmc1 = Mapper001;

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct ControlReg(pub u8): Debug {
        /// 0: one-screen lower, 1: one-screen upper, 2: vertical, 3: horizontal
        pub mirroring: u8 @ 0..=1,
        /// 0/1: 32K, 2: fix first bank at $8000, 3: fix last bank at $C000
        pub prg_mode: u8 @ 2..=3,
        pub chr_4k: bool @ 4,
    }
}

pub const LIMITS: SegmentLimits = SegmentLimits { prg: 0x40000, chr: 0x20000 };

#[derive(Debug)]
pub struct Mapper001 {
    prg_ram: [u8; 0x2000],
    prg_rom: Vec<u8>,
    chr: ChrMemory,
    prg_banks: BankMap<2>,
    chr_banks: BankMap<2>,

    shift: u8,
    shift_count: u8,
    control: ControlReg,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,

    wiring: BusWiring,
}
impl Mapper001 {
    pub fn new(rom: &dyn RomImage, buses: &Buses) -> Result<Rc<RefCell<Self>>, NesError> {
        let prg_rom = prg_rom(rom, LIMITS.prg, 0x8000)?;
        let chr = ChrMemory::load(rom, LIMITS.chr, 0x2000)?;

        let mut mapper = Self {
            prg_ram: [0u8; 0x2000],
            prg_banks: BankMap::new(0x4000, prg_rom.len()),
            chr_banks: BankMap::new(0x1000, chr.len()),
            prg_rom,
            chr,

            shift: 0,
            shift_count: 0,
            control: ControlReg(0x0C),
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,

            wiring: BusWiring::new(buses),
        };
        mapper.update_banks();
        let mirroring = match rom.mirroring() {
            Mirroring::FourScreen => Mirroring::FourScreen,
            _ => mapper.mirroring(),
        };

        Ok(attach(mapper, 0x6000, mirroring, false))
    }

    fn mirroring(&self) -> Mirroring {
        match self.control.mirroring() {
            0 => Mirroring::SingleScreenLower,
            1 => Mirroring::SingleScreenUpper,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    fn prg_ram_enabled(&self) -> bool {
        self.prg_bank & 0x10 == 0
    }

    fn update_banks(&mut self) {
        let bank = (self.prg_bank & 0x0F) as isize;
        match self.control.prg_mode() {
            0 | 1 => {
                self.prg_banks.set(0, bank & !1);
                self.prg_banks.set(1, bank | 1);
            },
            2 => {
                self.prg_banks.set(0, 0);
                self.prg_banks.set(1, bank);
            },
            _ => {
                self.prg_banks.set(0, bank);
                self.prg_banks.set(1, -1);
            },
        }

        if self.control.chr_4k() {
            self.chr_banks.set(0, self.chr_bank0 as isize);
            self.chr_banks.set(1, self.chr_bank1 as isize);
        } else {
            self.chr_banks.set(0, (self.chr_bank0 & !1) as isize);
            self.chr_banks.set(1, (self.chr_bank0 | 1) as isize);
        }
    }

    fn write_register(&mut self, addr: u16, value: u8) {
        match addr {
            0x8000..=0x9FFF => {
                self.control = ControlReg(value);
                if self.wiring.mirroring() != Some(Mirroring::FourScreen) {
                    self.wiring.set_mirroring(self.mirroring());
                }
            },
            0xA000..=0xBFFF => self.chr_bank0 = value,
            0xC000..=0xDFFF => self.chr_bank1 = value,
            _ => self.prg_bank = value,
        }
        self.update_banks();
        trace!("MMC1 {addr:#06X} <- {value:#04X}: {:?} prg {:#04X} chr {:#04X}/{:#04X}", self.control, self.prg_bank, self.chr_bank0, self.chr_bank1);
    }
}
impl Mapper for Mapper001 {
    fn read_cpu(&mut self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF if self.prg_ram_enabled() => self.prg_ram[(addr & 0x1FFF) as usize],
            0x8000..=0xFFFF => self.prg_rom[self.prg_banks.translate(addr - 0x8000)],
            _ => 0,
        }
    }

    fn write_cpu(&mut self, addr: u16, data: u8) {
        match addr {
            0x6000..=0x7FFF => if self.prg_ram_enabled() {
                self.prg_ram[(addr & 0x1FFF) as usize] = data;
            },
            0x8000..=0xFFFF => {
                if data & 0x80 != 0 {
                    self.shift = 0;
                    self.shift_count = 0;
                    self.control.0 |= 0x0C;
                    self.update_banks();
                    return;
                }

                self.shift |= (data & 1) << self.shift_count;
                self.shift_count += 1;
                if self.shift_count == 5 {
                    let value = self.shift;
                    self.shift = 0;
                    self.shift_count = 0;
                    self.write_register(addr, value);
                }
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
