//! Cartridge boards.
//!
//! A mapper owns the cartridge memories and bank registers. It is reachable
//! from the two buses only through the [`CpuPort`] and [`PpuPort`] adapters it
//! registers at construction; every registration is recorded in its
//! [`BusWiring`] so [`Mapper::dispose`] can undo them when the cartridge is
//! swapped.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};
use tracing::debug;
use crate::arch::bus::{AccessObserver, DeviceRef, MappingHandle, MemoryBus, MemoryMappedDevice, ObserverHandle, ObserverRef};
use crate::arch::cpu::InterruptLine;
use crate::arch::error::NesError;
use crate::arch::nametable::{Mirroring, Nametables};
use crate::arch::rom::RomImage;

pub mod mapper000;
pub mod mapper001;
pub mod mapper002;
pub mod mapper003;
pub mod mapper004;
pub mod mapper007;
pub mod mapper071;

use mapper000::Mapper000;
use mapper001::Mapper001;
use mapper002::Mapper002;
use mapper003::Mapper003;
use mapper004::Mapper004;
use mapper007::Mapper007;
use mapper071::Mapper071;

pub const SUPPORTED_MAPPERS: [u16; 7] = [0, 1, 2, 3, 4, 7, 71];

#[allow(unused_variables)]
pub trait Mapper: Debug {
    /// Read access on the CPU bus, $4020-$FFFF.
    fn read_cpu(&mut self, addr: u16) -> u8;

    /// Write access on the CPU bus, $4020-$FFFF.
    fn write_cpu(&mut self, addr: u16, data: u8);

    /// Read access on the pattern tables, $0000-$1FFF.
    fn read_ppu(&mut self, addr: u16) -> u8;

    /// Write access on the pattern tables, $0000-$1FFF.
    fn write_ppu(&mut self, addr: u16, data: u8);

    /// Every address the PPU drives, whether or not it reaches this board.
    fn observe_ppu_address(&mut self, addr: u16) {}

    fn wiring_mut(&mut self) -> &mut BusWiring;

    /// Detach from both buses.
    fn dispose(&mut self) {
        self.wiring_mut().release();
    }
}

pub type MapperRef = Rc<RefCell<dyn Mapper>>;

/// What a board gets to connect to.
#[derive(Clone, Debug)]
pub struct Buses {
    pub cpu: Rc<RefCell<MemoryBus>>,
    pub ppu: Rc<RefCell<MemoryBus>>,
    pub irq: InterruptLine,
}

/// Registrations a mapper has made, kept so they can be removed again.
#[derive(Debug)]
pub struct BusWiring {
    cpu_bus: Weak<RefCell<MemoryBus>>,
    ppu_bus: Weak<RefCell<MemoryBus>>,
    cpu_mappings: Vec<MappingHandle>,
    ppu_mappings: Vec<MappingHandle>,
    observers: Vec<ObserverHandle>,
    nametables: Nametables,
}
impl BusWiring {
    pub fn new(buses: &Buses) -> Self {
        Self {
            cpu_bus: Rc::downgrade(&buses.cpu),
            ppu_bus: Rc::downgrade(&buses.ppu),
            cpu_mappings: Vec::new(),
            ppu_mappings: Vec::new(),
            observers: Vec::new(),
            nametables: Nametables::new(),
        }
    }

    pub fn map_cpu(&mut self, device: DeviceRef, start: u16, end: u16) {
        if let Some(bus) = self.cpu_bus.upgrade() {
            self.cpu_mappings.push(bus.borrow_mut().register_mapped_device(device, start, end));
        }
    }

    pub fn map_ppu(&mut self, device: DeviceRef, start: u16, end: u16) {
        if let Some(bus) = self.ppu_bus.upgrade() {
            self.ppu_mappings.push(bus.borrow_mut().register_mapped_device(device, start, end));
        }
    }

    pub fn observe_ppu(&mut self, observer: ObserverRef) {
        if let Some(bus) = self.ppu_bus.upgrade() {
            self.observers.push(bus.borrow_mut().observe_accesses(observer));
        }
    }

    pub fn mirroring(&self) -> Option<Mirroring> {
        self.nametables.mirroring()
    }

    /// Rewire the nametable quadrants. Only called from CPU-side register
    /// writes, never while the PPU bus is in use.
    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        if self.nametables.mirroring() == Some(mirroring) {
            return;
        }
        match self.ppu_bus.upgrade() {
            Some(bus) => self.nametables.install(&mut bus.borrow_mut(), mirroring),
            None => debug!("PPU bus dropped, ignoring mirroring change to {mirroring:?}"),
        }
    }

    pub fn release(&mut self) {
        if let Some(bus) = self.cpu_bus.upgrade() {
            let mut bus = bus.borrow_mut();
            for handle in self.cpu_mappings.drain(..) {
                bus.remove_mapping(handle);
            }
        }
        if let Some(bus) = self.ppu_bus.upgrade() {
            let mut bus = bus.borrow_mut();
            for handle in self.ppu_mappings.drain(..) {
                bus.remove_mapping(handle);
            }
            for handle in self.observers.drain(..) {
                bus.remove_observer(handle);
            }
            self.nametables.remove(&mut bus);
        }
    }
}

/// The mapper as seen from the CPU bus.
#[derive(Debug)]
pub struct CpuPort(pub MapperRef);
impl MemoryMappedDevice for CpuPort {
    fn read(&mut self, addr: u16) -> u8 {
        self.0.borrow_mut().read_cpu(addr)
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.0.borrow_mut().write_cpu(addr, data);
    }
}

/// The mapper as seen from the PPU bus.
#[derive(Debug)]
pub struct PpuPort(pub MapperRef);
impl MemoryMappedDevice for PpuPort {
    fn read(&mut self, addr: u16) -> u8 {
        self.0.borrow_mut().read_ppu(addr)
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.0.borrow_mut().write_ppu(addr, data);
    }
}

struct AddressWatch(MapperRef);
impl AccessObserver for AddressWatch {
    fn observe(&mut self, addr: u16) {
        self.0.borrow_mut().observe_ppu_address(addr);
    }
}

/// Register the CPU window, the pattern tables and the nametable layout for a
/// freshly built board.
pub fn attach<M: Mapper + 'static>(mapper: M, cpu_start: u16, mirroring: Mirroring, watch_ppu: bool) -> Rc<RefCell<M>> {
    let mapper = Rc::new(RefCell::new(mapper));
    let shared: MapperRef = mapper.clone();

    {
        let mut board = mapper.borrow_mut();
        let wiring = board.wiring_mut();
        wiring.map_cpu(Rc::new(RefCell::new(CpuPort(shared.clone()))), cpu_start, 0xFFFF);
        wiring.map_ppu(Rc::new(RefCell::new(PpuPort(shared.clone()))), 0x0000, 0x1FFF);
        if watch_ppu {
            wiring.observe_ppu(Rc::new(RefCell::new(AddressWatch(shared))));
        }
        wiring.set_mirroring(mirroring);
    }

    mapper
}

/// Build the board for `id`. Nothing is registered if this fails.
pub fn construct(id: u16, rom: &dyn RomImage, buses: &Buses) -> Result<MapperRef, NesError> {
    let mapper: MapperRef = match id {
        0 => Mapper000::new(rom, buses)?,
        1 => Mapper001::new(rom, buses)?,
        2 => Mapper002::new(rom, buses)?,
        3 => Mapper003::new(rom, buses)?,
        4 => Mapper004::new(rom, buses)?,
        7 => Mapper007::new(rom, buses)?,
        71 => Mapper071::new(rom, buses)?,
        id => return Err(NesError::UnsupportedMapper { id }),
    };

    Ok(mapper)
}

pub fn is_supported(id: u16) -> bool {
    SUPPORTED_MAPPERS.contains(&id)
}

/// Largest PRG ROM and CHR ROM a board can address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SegmentLimits {
    pub prg: usize,
    pub chr: usize,
}
impl SegmentLimits {
    /// The same checks the board constructors make, without building anything.
    pub fn check(&self, rom: &dyn RomImage) -> Result<(), NesError> {
        let prg = rom.prg_rom_size();
        ensure_size("PRG ROM", prg, self.prg)?;
        rom.prg_rom(0, prg)?;

        let chr = rom.chr_rom_size();
        ensure_size("CHR ROM", chr, self.chr)?;
        if chr == 0 {
            ensure_size("CHR RAM", rom.chr_ram_size().max(0x2000), self.chr.max(0x2000))?;
        } else {
            rom.chr_rom(0, chr)?;
        }

        Ok(())
    }
}

pub fn limits(id: u16) -> Option<SegmentLimits> {
    match id {
        0 => Some(mapper000::LIMITS),
        1 => Some(mapper001::LIMITS),
        2 => Some(mapper002::LIMITS),
        3 => Some(mapper003::LIMITS),
        4 => Some(mapper004::LIMITS),
        7 => Some(mapper007::LIMITS),
        71 => Some(mapper071::LIMITS),
        _ => None,
    }
}

/// Reject `rom` if board `id` is unknown or cannot hold its segments.
pub fn validate(id: u16, rom: &dyn RomImage) -> Result<(), NesError> {
    limits(id).ok_or(NesError::UnsupportedMapper { id })?.check(rom)
}

pub fn ensure_size(segment: &'static str, size: usize, max: usize) -> Result<(), NesError> {
    if size > max {
        Err(NesError::SegmentTooLarge { segment, size, max })
    } else {
        Ok(())
    }
}

/// Copy a ROM segment, repeating it until it fills at least `min` bytes.
/// A 16K NROM image becomes 32K this way.
pub fn load_segment(data: &[u8], min: usize) -> Vec<u8> {
    if data.is_empty() {
        return vec![0; min];
    }

    let mut out = data.to_vec();
    while out.len() < min {
        out.extend_from_slice(data);
    }
    out
}

pub fn prg_rom(rom: &dyn RomImage, max: usize, min: usize) -> Result<Vec<u8>, NesError> {
    let size = rom.prg_rom_size();
    ensure_size("PRG ROM", size, max)?;
    Ok(load_segment(rom.prg_rom(0, size)?, min))
}

/// CHR ROM when the image has any, otherwise writable CHR RAM.
#[derive(Clone, Debug)]
pub struct ChrMemory {
    data: Vec<u8>,
    writable: bool,
}
impl ChrMemory {
    pub fn load(rom: &dyn RomImage, max: usize, min: usize) -> Result<Self, NesError> {
        let size = rom.chr_rom_size();
        ensure_size("CHR ROM", size, max)?;
        if size == 0 {
            let ram = rom.chr_ram_size().max(0x2000);
            ensure_size("CHR RAM", ram, max.max(0x2000))?;
            return Ok(Self { data: vec![0; ram.max(min)], writable: true });
        }

        Ok(Self {
            data: load_segment(rom.chr_rom(0, size)?, min),
            writable: false,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_ram(&self) -> bool {
        self.writable
    }

    #[inline(always)]
    pub fn read(&self, index: usize) -> u8 {
        self.data[index % self.data.len()]
    }

    #[inline(always)]
    pub fn write(&mut self, index: usize, data: u8) {
        if self.writable {
            let len = self.data.len();
            self.data[index % len] = data;
        }
    }
}

/// `N` equally sized windows over a banked memory, each holding the byte
/// offset of the bank currently selected into it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BankMap<const N: usize> {
    offsets: [usize; N],
    window: usize,
    banks: usize,
}
impl<const N: usize> BankMap<N> {
    /// Windows start out selecting banks 0, 1, 2... in order.
    pub fn new(window: usize, len: usize) -> Self {
        debug_assert!(window.is_power_of_two());
        let banks = (len / window).max(1);
        Self {
            offsets: std::array::from_fn(|i| (i % banks) * window),
            window,
            banks,
        }
    }

    pub fn banks(&self) -> usize {
        self.banks
    }

    /// Negative banks count from the end, so -1 is the last bank. Bank
    /// numbers beyond the memory wrap around.
    pub fn set(&mut self, slot: usize, bank: isize) {
        let bank = bank.rem_euclid(self.banks as isize) as usize;
        self.offsets[slot % N] = bank * self.window;
    }

    /// Byte offset into the memory for `addr`, relative to the start of the
    /// banked range.
    #[inline(always)]
    pub fn translate(&self, addr: u16) -> usize {
        let addr = addr as usize;
        self.offsets[(addr / self.window) % N] + (addr & (self.window - 1))
    }
}
