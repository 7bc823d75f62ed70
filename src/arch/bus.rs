//! Address-space router shared by the CPU and the PPU.
//!
//! A [`MemoryBus`] owns no storage. Everything reachable through it is a
//! [`MemoryMappedDevice`] registered over an inclusive address window, plus
//! optional mirror ranges that fold an address back onto a source window.
//! Lookup is a linear scan in registration order; the first matching mapping
//! wins and overlaps are not validated.

use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

pub mod breakpoint;

pub use breakpoint::{Access, Breakpoint, BreakpointHit, BreakpointId, BreakpointKind};
use breakpoint::Breakpoints;

/// Value returned for reads that hit nothing.
pub const UNMAPPED_READ: u8 = 4;

pub trait MemoryMappedDevice {
    /// `addr` is the bus address after mirror resolution, never rebased.
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, data: u8);
}

pub type DeviceRef = Rc<RefCell<dyn MemoryMappedDevice>>;

/// Sees every address driven onto the bus, before mirror resolution.
pub trait AccessObserver {
    fn observe(&mut self, addr: u16);
}

pub type ObserverRef = Rc<RefCell<dyn AccessObserver>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MappingHandle(u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MirrorHandle(u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("mirror range {mirror_start:#06X}..={mirror_end:#06X} is not a multiple of the {source_size:#X}-byte source")]
    MirrorSpan {
        source_size: u32,
        mirror_start: u16,
        mirror_end: u16,
    },
    #[error("range {start:#06X}..={end:#06X} is inverted")]
    InvertedRange { start: u16, end: u16 },
}

struct MemoryMapping {
    handle: MappingHandle,
    device: DeviceRef,
    start: u16,
    end: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryMirroring {
    pub source_start: u16,
    pub source_size: u32,
    pub mirror_start: u16,
    pub mirror_end: u16,
}
impl MemoryMirroring {
    #[inline(always)]
    fn contains(&self, addr: u16) -> bool {
        addr >= self.mirror_start && addr <= self.mirror_end
    }

    #[inline(always)]
    fn source_of(&self, addr: u16) -> u16 {
        let offset = (addr - self.mirror_start) as u32 % self.source_size;
        self.source_start.wrapping_add(offset as u16)
    }
}

pub struct MemoryBus {
    name: &'static str,
    mask: u16,
    mappings: Vec<MemoryMapping>,
    mirrorings: Vec<(MirrorHandle, MemoryMirroring)>,
    observers: Vec<(ObserverHandle, ObserverRef)>,
    breakpoints: Breakpoints,
    next_handle: u32,
}
impl Debug for MemoryBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
         .field("name", &self.name)
         .field("mappings", &self.mappings.iter().map(|m| (m.start, m.end)).collect::<Vec<_>>())
         .field("mirrorings", &self.mirrorings.iter().map(|(_, m)| *m).collect::<Vec<_>>())
         .field("observers", &self.observers.len())
         .finish()
    }
}

impl MemoryBus {
    /// Create an empty bus spanning `2^width` addresses.
    pub fn new(name: &'static str, width: u8) -> Self {
        debug_assert!((1..=16).contains(&width));
        Self {
            name,
            mask: (((1u32 << width) - 1) & 0xFFFF) as u16,
            mappings: Vec::new(),
            mirrorings: Vec::new(),
            observers: Vec::new(),
            breakpoints: Breakpoints::default(),
            next_handle: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.mask as usize + 1
    }

    fn handle(&mut self) -> u32 {
        self.next_handle = self.next_handle.wrapping_add(1);
        self.next_handle
    }

    pub fn register_mapped_device(&mut self, device: DeviceRef, start: u16, end: u16) -> MappingHandle {
        debug_assert!(start <= end, "inverted mapping {start:#06X}..={end:#06X}");
        let handle = MappingHandle(self.handle());
        self.mappings.push(MemoryMapping {
            handle,
            device,
            start: start & self.mask,
            end: end & self.mask,
        });

        handle
    }

    pub fn remove_mapping(&mut self, handle: MappingHandle) {
        self.mappings.retain(|m| m.handle != handle);
    }

    /// Mirror `[mirror_start, mirror_end]` onto `[src_start, src_end]`.
    pub fn set_mirroring_range(&mut self, src_start: u16, src_end: u16, mirror_start: u16, mirror_end: u16) -> Result<MirrorHandle, BusError> {
        if src_end < src_start {
            return Err(BusError::InvertedRange { start: src_start, end: src_end });
        }
        if mirror_end < mirror_start {
            return Err(BusError::InvertedRange { start: mirror_start, end: mirror_end });
        }

        let source_size = (src_end - src_start) as u32 + 1;
        let mirror_size = (mirror_end - mirror_start) as u32 + 1;
        if mirror_size % source_size != 0 {
            return Err(BusError::MirrorSpan { source_size, mirror_start, mirror_end });
        }

        let handle = MirrorHandle(self.handle());
        self.mirrorings.push((handle, MemoryMirroring {
            source_start: src_start,
            source_size,
            mirror_start,
            mirror_end,
        }));

        Ok(handle)
    }

    pub fn remove_mirroring(&mut self, handle: MirrorHandle) {
        self.mirrorings.retain(|(h, _)| *h != handle);
    }

    pub fn observe_accesses(&mut self, observer: ObserverRef) -> ObserverHandle {
        let handle = ObserverHandle(self.handle());
        self.observers.push((handle, observer));

        handle
    }

    pub fn remove_observer(&mut self, handle: ObserverHandle) {
        self.observers.retain(|(h, _)| *h != handle);
    }

    pub fn create_breakpoint<F>(&mut self, kind: BreakpointKind, callback: F) -> BreakpointId
    where F: FnMut(BreakpointHit) + 'static {
        self.breakpoints.create(kind, Box::new(callback))
    }

    pub fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) {
        self.breakpoints.set_enabled(id, enabled);
    }

    pub fn delete_breakpoint(&mut self, id: BreakpointId) {
        self.breakpoints.delete(id);
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(id)
    }

    #[inline(always)]
    fn find_mapping(&self, addr: u16) -> Option<usize> {
        self.mappings.iter().position(|m| addr >= m.start && addr <= m.end)
    }

    /// Resolve `addr` to a mapping index and the address handed to its device.
    #[inline(always)]
    fn resolve(&self, addr: u16) -> Option<(usize, u16)> {
        if let Some(index) = self.find_mapping(addr) {
            return Some((index, addr));
        }

        let (_, mirror) = self.mirrorings.iter().find(|(_, m)| m.contains(addr))?;
        let source = mirror.source_of(addr);

        self.find_mapping(source).map(|index| (index, source))
    }

    #[inline(always)]
    fn notify(&mut self, addr: u16) {
        if !self.observers.is_empty() {
            for (_, observer) in &self.observers {
                observer.borrow_mut().observe(addr);
            }
        }
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        let addr = addr & self.mask;
        if self.breakpoints.any_reads() {
            self.breakpoints.fire(addr, Access::READ, None);
        }
        self.notify(addr);

        match self.resolve(addr) {
            Some((index, addr)) => self.mappings[index].device.borrow_mut().read(addr),
            None => {
                debug!(bus = self.name, "read from unmapped address {addr:#06X}");
                UNMAPPED_READ
            }
        }
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        let addr = addr & self.mask;
        if self.breakpoints.any_writes() {
            self.breakpoints.fire(addr, Access::WRITE, Some(data));
        }
        self.notify(addr);

        match self.resolve(addr) {
            Some((index, addr)) => self.mappings[index].device.borrow_mut().write(addr, data),
            None => debug!(bus = self.name, "write {data:#04X} to unmapped address {addr:#06X} dropped"),
        }
    }

    /// Read without firing breakpoints or notifying observers. The device
    /// still sees an ordinary read, so only peek at ranges where reads have no
    /// side effects. `None` if nothing is mapped.
    pub fn peek(&mut self, addr: u16) -> Option<u8> {
        let (index, addr) = self.resolve(addr & self.mask)?;
        Some(self.mappings[index].device.borrow_mut().read(addr))
    }

    /// Little-endian 16-bit read. The high byte comes from `addr + 1` with
    /// normal carry.
    pub fn read_u16(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;

        (hi << 8) | lo
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::ram::Ram;
    use std::cell::Cell;

    /// Records the last address it was handed.
    pub struct Recorder {
        pub id: u8,
        pub last_addr: Option<u16>,
        pub last_write: Option<(u16, u8)>,
    }
    impl Recorder {
        pub fn new(id: u8) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self { id, last_addr: None, last_write: None }))
        }
    }
    impl MemoryMappedDevice for Recorder {
        fn read(&mut self, addr: u16) -> u8 {
            self.last_addr = Some(addr);
            self.id
        }

        fn write(&mut self, addr: u16, data: u8) {
            self.last_addr = Some(addr);
            self.last_write = Some((addr, data));
        }
    }

    #[test]
    fn mapped_ranges_route_unmodified_addresses() {
        let mut bus = MemoryBus::new("test", 16);
        let a = Recorder::new(1);
        let b = Recorder::new(2);
        bus.register_mapped_device(a.clone(), 0x0000, 0x0FFF);
        bus.register_mapped_device(b.clone(), 0x4000, 0x7FFF);

        for addr in 0x0000..=0x0FFFu16 {
            assert_eq!(bus.read(addr), 1);
            assert_eq!(a.borrow().last_addr, Some(addr));
            bus.write(addr, 0x5A);
            assert_eq!(a.borrow().last_write, Some((addr, 0x5A)));
        }
        for addr in 0x4000..=0x7FFFu16 {
            assert_eq!(bus.read(addr), 2);
            assert_eq!(b.borrow().last_addr, Some(addr));
        }
        assert_eq!(bus.read(0x1000), UNMAPPED_READ);
        assert_eq!(bus.read(0x8000), UNMAPPED_READ);
    }

    #[test]
    fn mirrors_reach_the_same_device_as_their_source() {
        let mut bus = MemoryBus::new("test", 16);
        let ram = Rc::new(RefCell::new(Ram::new(0x800)));
        bus.register_mapped_device(ram, 0x0000, 0x07FF);
        bus.set_mirroring_range(0x0000, 0x07FF, 0x0800, 0x1FFF).unwrap();

        for addr in 0x0800..=0x1FFFu16 {
            let source = addr % 0x800;
            bus.write(addr, (addr >> 3) as u8);
            assert_eq!(bus.read(source), (addr >> 3) as u8);
            bus.write(source, addr as u8);
            assert_eq!(bus.read(addr), addr as u8);
        }
    }

    #[test]
    fn mirrored_address_is_rewritten_to_the_source() {
        let mut bus = MemoryBus::new("test", 16);
        let regs = Recorder::new(7);
        bus.register_mapped_device(regs.clone(), 0x2000, 0x2007);
        bus.set_mirroring_range(0x2000, 0x2007, 0x2008, 0x3FFF).unwrap();

        for addr in 0x2008..=0x3FFFu16 {
            assert_eq!(bus.read(addr), 7);
            assert_eq!(regs.borrow().last_addr, Some(0x2000 + (addr - 0x2008) % 8));
        }
    }

    #[test]
    fn mirrors_do_not_chain() {
        let mut bus = MemoryBus::new("test", 16);
        bus.register_mapped_device(Recorder::new(1), 0x0000, 0x00FF);
        bus.set_mirroring_range(0x0000, 0x00FF, 0x0100, 0x01FF).unwrap();
        bus.set_mirroring_range(0x0100, 0x01FF, 0x0200, 0x02FF).unwrap();

        assert_eq!(bus.read(0x0180), 1);
        assert_eq!(bus.read(0x0280), UNMAPPED_READ);
    }

    #[test]
    fn mirror_span_must_be_a_multiple_of_the_source() {
        let mut bus = MemoryBus::new("test", 16);
        let err = bus.set_mirroring_range(0x0000, 0x07FF, 0x0800, 0x0FFE).unwrap_err();
        assert!(matches!(err, BusError::MirrorSpan { source_size: 0x800, .. }));
        assert!(bus.set_mirroring_range(0x0100, 0x00FF, 0x0800, 0x0FFF).is_err());
    }

    #[test]
    fn first_registered_mapping_wins() {
        let mut bus = MemoryBus::new("test", 16);
        bus.register_mapped_device(Recorder::new(1), 0x1000, 0x1FFF);
        let second = bus.register_mapped_device(Recorder::new(2), 0x1800, 0x27FF);

        assert_eq!(bus.read(0x1900), 1);
        assert_eq!(bus.read(0x2000), 2);
        bus.remove_mapping(second);
        assert_eq!(bus.read(0x2000), UNMAPPED_READ);
    }

    #[test]
    fn removed_mirroring_stops_resolving() {
        let mut bus = MemoryBus::new("test", 16);
        bus.register_mapped_device(Recorder::new(3), 0x0000, 0x00FF);
        let mirror = bus.set_mirroring_range(0x0000, 0x00FF, 0x0100, 0x03FF).unwrap();
        assert_eq!(bus.read(0x0342), 3);
        bus.remove_mirroring(mirror);
        assert_eq!(bus.read(0x0342), UNMAPPED_READ);
    }

    #[test]
    fn narrow_bus_masks_addresses() {
        let mut bus = MemoryBus::new("ppu", 14);
        let recorder = Recorder::new(9);
        bus.register_mapped_device(recorder.clone(), 0x0000, 0x1FFF);
        assert_eq!(bus.size(), 0x4000);
        assert_eq!(bus.read(0x5123), 9);
        assert_eq!(recorder.borrow().last_addr, Some(0x1123));
    }

    #[test]
    fn observers_see_pre_mirror_addresses() {
        struct Log(Rc<RefCell<Vec<u16>>>);
        impl AccessObserver for Log {
            fn observe(&mut self, addr: u16) {
                self.0.borrow_mut().push(addr);
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = MemoryBus::new("ppu", 14);
        bus.register_mapped_device(Recorder::new(1), 0x2000, 0x2FFF);
        bus.set_mirroring_range(0x2000, 0x2EFF, 0x3000, 0x3EFF).unwrap();
        let handle = bus.observe_accesses(Rc::new(RefCell::new(Log(seen.clone()))));

        bus.read(0x3123);
        bus.write(0x2001, 0);
        assert_eq!(*seen.borrow(), vec![0x3123, 0x2001]);

        bus.remove_observer(handle);
        bus.read(0x2000);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn write_breakpoint_counts_exact_hits() {
        let mut bus = MemoryBus::new("test", 16);
        bus.register_mapped_device(Rc::new(RefCell::new(Ram::new(0x800))), 0x0000, 0x07FF);

        let hits = Rc::new(Cell::new(0u32));
        let counter = hits.clone();
        let id = bus.create_breakpoint(BreakpointKind::Memory { address: 0x0300, access: Access::WRITE }, move |hit| {
            assert_eq!(hit.address, 0x0300);
            assert_eq!(hit.access, Access::WRITE);
            counter.set(counter.get() + 1);
        });

        bus.write(0x0300, 1);
        assert_eq!(hits.get(), 0, "breakpoints start disabled");

        bus.set_breakpoint_enabled(id, true);
        for n in 0..25 {
            bus.write(0x0300, n);
            bus.write(0x02FF, n);
            bus.write(0x0301, n);
            bus.read(0x0300);
        }
        assert_eq!(hits.get(), 25);

        bus.set_breakpoint_enabled(id, false);
        bus.write(0x0300, 0);
        assert_eq!(hits.get(), 25);

        bus.set_breakpoint_enabled(id, true);
        bus.write(0x0300, 0);
        assert_eq!(hits.get(), 26);

        bus.delete_breakpoint(id);
        bus.write(0x0300, 0);
        assert_eq!(hits.get(), 26);
        assert!(bus.breakpoint(id).is_none());
    }

    #[test]
    fn read_breakpoint_fires_before_the_access() {
        let mut bus = MemoryBus::new("test", 16);
        let recorder = Recorder::new(1);
        bus.register_mapped_device(recorder.clone(), 0x8000, 0xFFFF);

        let seen_before = Rc::new(Cell::new(false));
        let flag = seen_before.clone();
        let device = recorder.clone();
        let id = bus.create_breakpoint(BreakpointKind::Memory { address: 0x9000, access: Access::READ }, move |_| {
            flag.set(device.borrow().last_addr.is_none());
        });
        bus.set_breakpoint_enabled(id, true);

        bus.read(0x9000);
        assert!(seen_before.get());
    }

    #[test]
    fn read_write_breakpoint_sees_both_kinds() {
        let mut bus = MemoryBus::new("test", 16);
        bus.register_mapped_device(Rc::new(RefCell::new(Ram::new(0x100))), 0x0000, 0x00FF);

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let id = bus.create_breakpoint(BreakpointKind::Memory { address: 0x10, access: Access::READ | Access::WRITE }, move |hit| {
            sink.borrow_mut().push((hit.access, hit.value));
        });
        bus.set_breakpoint_enabled(id, true);
        assert!(bus.breakpoint(id).unwrap().enabled());

        bus.write(0x10, 0xAB);
        bus.read(0x10);
        assert_eq!(*log.borrow(), vec![(Access::WRITE, Some(0xAB)), (Access::READ, None)]);
    }

    #[test]
    fn stale_breakpoint_id_does_not_touch_its_slot_successor() {
        let mut bus = MemoryBus::new("test", 16);
        bus.register_mapped_device(Rc::new(RefCell::new(Ram::new(0x100))), 0x0000, 0x00FF);

        let old = bus.create_breakpoint(BreakpointKind::Memory { address: 0x10, access: Access::WRITE }, |_| {});
        bus.delete_breakpoint(old);

        let hits = Rc::new(Cell::new(0u32));
        let counter = hits.clone();
        let new = bus.create_breakpoint(BreakpointKind::Memory { address: 0x20, access: Access::WRITE }, move |_| {
            counter.set(counter.get() + 1);
        });
        assert_ne!(old, new);
        bus.set_breakpoint_enabled(new, true);

        assert!(bus.breakpoint(old).is_none());
        bus.set_breakpoint_enabled(old, false);
        bus.delete_breakpoint(old);

        bus.write(0x20, 1);
        assert_eq!(hits.get(), 1);
        assert!(bus.breakpoint(new).unwrap().enabled());
    }

    #[test]
    fn peek_does_not_fire_breakpoints() {
        let mut bus = MemoryBus::new("test", 16);
        bus.register_mapped_device(Rc::new(RefCell::new(Ram::new(0x100))), 0x0000, 0x00FF);
        bus.set_mirroring_range(0x0000, 0x00FF, 0x0100, 0x01FF).unwrap();
        bus.write(0x42, 0x99);

        let hits = Rc::new(Cell::new(0u32));
        let counter = hits.clone();
        let id = bus.create_breakpoint(BreakpointKind::Memory { address: 0x42, access: Access::READ }, move |_| {
            counter.set(counter.get() + 1);
        });
        bus.set_breakpoint_enabled(id, true);

        assert_eq!(bus.peek(0x0142), Some(0x99));
        assert_eq!(bus.peek(0x42), Some(0x99));
        assert_eq!(hits.get(), 0);
        assert_eq!(bus.peek(0x8000), None);

        bus.read(0x42);
        assert_eq!(hits.get(), 1);
    }
}
