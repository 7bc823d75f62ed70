//! iNES 004
//!
//! MMC3 scanline counter: the board watches PPU address line A12 and clocks
//! its counter on each rising edge. During rendering with background and
//! sprites in different pattern tables that happens once per line. A12 must
//! have been low for a while before an edge counts, which filters out the
//! short low periods between consecutive sprite fetches.

use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;
use crate::arch::cpu::{InterruptGuard, InterruptLine};
use crate::arch::error::NesError;
use crate::arch::mappers::{attach, prg_rom, BankMap, BusWiring, Buses, ChrMemory, Mapper, SegmentLimits};
use crate::arch::nametable::Mirroring;
use crate::arch::rom::RomImage;

/// Alias for mapper number 004
pub type Mmc3 = Mapper004;

/// Low accesses required before an A12 rise clocks the counter.
const A12_FILTER: u8 = 8;

pub const LIMITS: SegmentLimits = SegmentLimits { prg: 0x80000, chr: 0x40000 };

#[derive(Debug)]
pub struct Mapper004 {
    prg_ram: [u8; 0x2000],
    prg_rom: Vec<u8>,
    chr: ChrMemory,
    prg_banks: BankMap<4>,
    chr_banks: BankMap<8>,

    bank_select: u8,
    registers: [u8; 8],
    four_screen: bool,
    ram_enabled: bool,
    ram_write_protect: bool,

    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq: InterruptLine,
    irq_guard: Option<InterruptGuard>,
    a12_high: bool,
    a12_low_count: u8,

    wiring: BusWiring,
}
impl Mapper004 {
    pub fn new(rom: &dyn RomImage, buses: &Buses) -> Result<Rc<RefCell<Self>>, NesError> {
        let prg_rom = prg_rom(rom, LIMITS.prg, 0x8000)?;
        let chr = ChrMemory::load(rom, LIMITS.chr, 0x2000)?;

        let mut mapper = Self {
            prg_ram: [0u8; 0x2000],
            prg_banks: BankMap::new(0x2000, prg_rom.len()),
            chr_banks: BankMap::new(0x400, chr.len()),
            prg_rom,
            chr,

            bank_select: 0,
            registers: [0, 2, 4, 5, 6, 7, 0, 1],
            four_screen: rom.mirroring() == Mirroring::FourScreen,
            ram_enabled: true,
            ram_write_protect: false,

            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq: buses.irq.clone(),
            irq_guard: None,
            a12_high: false,
            a12_low_count: 0,

            wiring: BusWiring::new(buses),
        };
        mapper.update_banks();

        Ok(attach(mapper, 0x6000, rom.mirroring(), true))
    }

    fn update_banks(&mut self) {
        let r = self.registers.map(|r| r as isize);

        if self.bank_select & 0x40 == 0 {
            self.prg_banks.set(0, r[6]);
            self.prg_banks.set(2, -2);
        } else {
            self.prg_banks.set(0, -2);
            self.prg_banks.set(2, r[6]);
        }
        self.prg_banks.set(1, r[7]);
        self.prg_banks.set(3, -1);

        // two 2K banks and four 1K banks, swapped between halves by bit 7
        let flip = if self.bank_select & 0x80 != 0 { 4 } else { 0 };
        self.chr_banks.set(flip, r[0] & !1);
        self.chr_banks.set(flip + 1, r[0] | 1);
        self.chr_banks.set(flip + 2, r[1] & !1);
        self.chr_banks.set(flip + 3, r[1] | 1);
        for i in 0..4 {
            self.chr_banks.set((4 - flip) + i, r[2 + i]);
        }
    }

    fn clock_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }

        if self.irq_counter == 0 && self.irq_enabled && self.irq_guard.is_none() {
            trace!("MMC3 IRQ");
            self.irq_guard = Some(self.irq.assert_scoped());
        }
    }

    pub fn irq_counter(&self) -> u8 {
        self.irq_counter
    }
}
impl Mapper for Mapper004 {
    fn read_cpu(&mut self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF if self.ram_enabled => self.prg_ram[(addr & 0x1FFF) as usize],
            0x8000..=0xFFFF => self.prg_rom[self.prg_banks.translate(addr - 0x8000)],
            _ => 0,
        }
    }

    fn write_cpu(&mut self, addr: u16, data: u8) {
        let even = addr & 1 == 0;
        match addr {
            0x6000..=0x7FFF => if self.ram_enabled && !self.ram_write_protect {
                self.prg_ram[(addr & 0x1FFF) as usize] = data;
            },
            0x8000..=0x9FFF if even => {
                self.bank_select = data;
                self.update_banks();
            },
            0x8000..=0x9FFF => {
                self.registers[(self.bank_select & 0x07) as usize] = data;
                self.update_banks();
                trace!("MMC3 R{} = {data:#04X}", self.bank_select & 0x07);
            },
            0xA000..=0xBFFF if even => if !self.four_screen {
                self.wiring.set_mirroring(if data & 1 == 0 { Mirroring::Vertical } else { Mirroring::Horizontal });
            },
            0xA000..=0xBFFF => {
                self.ram_enabled = data & 0x80 != 0;
                self.ram_write_protect = data & 0x40 != 0;
            },
            0xC000..=0xDFFF if even => self.irq_latch = data,
            0xC000..=0xDFFF => {
                self.irq_counter = 0;
                self.irq_reload = true;
            },
            0xE000..=0xFFFF if even => {
                self.irq_enabled = false;
                self.irq_guard = None;
            },
            0xE000..=0xFFFF => self.irq_enabled = true,
            _ => (),
        }
    }

    fn read_ppu(&mut self, addr: u16) -> u8 {
        self.chr.read(self.chr_banks.translate(addr & 0x1FFF))
    }

    fn write_ppu(&mut self, addr: u16, data: u8) {
        self.chr.write(self.chr_banks.translate(addr & 0x1FFF), data);
    }

    fn observe_ppu_address(&mut self, addr: u16) {
        let high = addr & 0x1000 != 0;
        if high && !self.a12_high && self.a12_low_count >= A12_FILTER {
            self.clock_counter();
        }

        if high {
            self.a12_low_count = 0;
        } else {
            self.a12_low_count = self.a12_low_count.saturating_add(1);
        }
        self.a12_high = high;
    }

    fn wiring_mut(&mut self) -> &mut BusWiring {
        &mut self.wiring
    }
}

#[cfg(test)]
mod tests {
    use crate::arch::bus::MemoryMappedDevice;
    use crate::arch::cpu::InterruptKind;
    use crate::arch::mappers::tests::buses;
    use crate::arch::ppu::Ricoh2C02;
    use crate::arch::rom::open_rom;
    use crate::arch::rom::tests::ines;
    use crate::arch::video::NullSink;
    use super::*;

    #[test]
    fn prg_modes_swap_the_fixed_bank() {
        let (buses, _cpu) = buses();
        let rom = open_rom(&ines(4, 4, 1, 0)).unwrap();
        let mmc3 = Mmc3::new(rom.as_ref(), &buses).unwrap();
        let mut mmc3 = mmc3.borrow_mut();

        mmc3.write_cpu(0x8000, 6);
        mmc3.write_cpu(0x8001, 3);
        mmc3.write_cpu(0x8000, 7);
        mmc3.write_cpu(0x8001, 1);
        assert_eq!(mmc3.read_cpu(0x8000), 3);
        assert_eq!(mmc3.read_cpu(0xA000), 1);
        assert_eq!(mmc3.read_cpu(0xC000), 6);
        assert_eq!(mmc3.read_cpu(0xE000), 7);

        mmc3.write_cpu(0x8000, 0x40);
        assert_eq!(mmc3.read_cpu(0x8000), 6);
        assert_eq!(mmc3.read_cpu(0xC000), 3);
        assert_eq!(mmc3.read_cpu(0xE000), 7);
    }

    #[test]
    fn chr_inversion() {
        let (buses, _cpu) = buses();
        let rom = open_rom(&ines(4, 2, 4, 0)).unwrap();
        let mmc3 = Mmc3::new(rom.as_ref(), &buses).unwrap();
        let mut mmc3 = mmc3.borrow_mut();

        for (reg, value) in [(0u8, 8u8), (1, 11), (2, 20), (3, 21), (4, 22), (5, 23)] {
            mmc3.write_cpu(0x8000, reg);
            mmc3.write_cpu(0x8001, value);
        }
        let layout = |mmc3: &mut Mapper004| -> Vec<u8> {
            (0..8).map(|i| mmc3.read_ppu(i * 0x400)).collect()
        };
        assert_eq!(layout(&mut *mmc3), vec![8, 9, 10, 11, 20, 21, 22, 23]);

        mmc3.write_cpu(0x8000, 0x80);
        assert_eq!(layout(&mut *mmc3), vec![20, 21, 22, 23, 8, 9, 10, 11]);
    }

    #[test]
    fn prg_ram_protect() {
        let (buses, _cpu) = buses();
        let rom = open_rom(&ines(4, 2, 1, 0)).unwrap();
        let mmc3 = Mmc3::new(rom.as_ref(), &buses).unwrap();
        let mut mmc3 = mmc3.borrow_mut();

        mmc3.write_cpu(0x6000, 1);
        mmc3.write_cpu(0xA001, 0xC0);
        mmc3.write_cpu(0x6000, 2);
        assert_eq!(mmc3.read_cpu(0x6000), 1);
        mmc3.write_cpu(0xA001, 0x00);
        assert_eq!(mmc3.read_cpu(0x6000), 0);
        mmc3.write_cpu(0xA001, 0x80);
        mmc3.write_cpu(0x6000, 3);
        assert_eq!(mmc3.read_cpu(0x6000), 3);
    }

    #[test]
    fn a12_filter_ignores_short_lows() {
        let (buses, _cpu) = buses();
        let rom = open_rom(&ines(4, 2, 1, 0)).unwrap();
        let mmc3 = Mmc3::new(rom.as_ref(), &buses).unwrap();
        let mut mmc3 = mmc3.borrow_mut();
        mmc3.write_cpu(0xC000, 10);

        for _ in 0..A12_FILTER {
            mmc3.observe_ppu_address(0x0000);
        }
        mmc3.observe_ppu_address(0x1000);
        assert_eq!(mmc3.irq_counter(), 10);

        // sprite fetch pattern: two nametable reads between pattern reads
        for _ in 0..7 {
            mmc3.observe_ppu_address(0x2000);
            mmc3.observe_ppu_address(0x2000);
            mmc3.observe_ppu_address(0x1FF0);
            mmc3.observe_ppu_address(0x1FF8);
        }
        assert_eq!(mmc3.irq_counter(), 10);
    }

    #[test]
    fn counts_scanlines_from_ppu_fetches() {
        let (buses, cpu) = buses();
        let rom = open_rom(&ines(4, 2, 1, 0)).unwrap();
        let mut ppu = Ricoh2C02::new(buses.ppu.clone(), cpu.interrupt(InterruptKind::Nmi), Box::new(NullSink), false).unwrap();
        let mmc3 = Mmc3::new(rom.as_ref(), &buses).unwrap();
        let irq = cpu.interrupt(InterruptKind::Irq);

        {
            let mut mmc3 = mmc3.borrow_mut();
            mmc3.write_cpu(0xC000, 3);
            mmc3.write_cpu(0xC001, 0);
            mmc3.write_cpu(0xE001, 0);
        }
        // sprites from $1000, background from $0000
        ppu.write(0x2000, 0x08);
        ppu.write(0x2001, 0x18);

        let mut dots = 0;
        while !irq.is_asserted() && dots < 341 * 20 {
            ppu.tick();
            dots += 1;
        }
        assert!(irq.is_asserted());
        assert_eq!((ppu.scanline(), ppu.cycle()), (3, 262));

        // held until acknowledged
        for _ in 0..341 {
            ppu.tick();
        }
        assert!(irq.is_asserted());
        mmc3.borrow_mut().write_cpu(0xE000, 0);
        assert!(!irq.is_asserted());
        assert_eq!(irq.holders(), 0);

        // re-enabled, the counter reloads from the latch and fires again
        mmc3.borrow_mut().write_cpu(0xE001, 0);
        for _ in 0..341 * 4 {
            ppu.tick();
        }
        assert!(irq.is_asserted());
    }
}
