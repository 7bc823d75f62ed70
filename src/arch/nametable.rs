//! Nametable memory at PPU $2000-$2FFF.
//!
//! The console has 2KB of CIRAM; which 1KB page each of the four nametable
//! quadrants selects is decided by the cartridge. Four-screen boards add two
//! more pages of their own.

use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use tracing::trace;
use crate::arch::bus::{MappingHandle, MemoryBus};
use crate::arch::ram::Ram;

const PAGE_SIZE: u16 = 0x400;
const NAMETABLE_BASE: u16 = 0x2000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mirroring {
    /// $2000=$2400, $2800=$2C00
    Horizontal,
    /// $2000=$2800, $2400=$2C00
    Vertical,
    FourScreen,
    SingleScreenLower,
    SingleScreenUpper,
}
impl Mirroring {
    /// Page used by each quadrant, in address order.
    pub fn layout(self) -> [usize; 4] {
        match self {
            Mirroring::Horizontal => [0, 0, 1, 1],
            Mirroring::Vertical => [0, 1, 0, 1],
            Mirroring::FourScreen => [0, 1, 2, 3],
            Mirroring::SingleScreenLower => [0, 0, 0, 0],
            Mirroring::SingleScreenUpper => [1, 1, 1, 1],
        }
    }
}

pub struct Nametables {
    pages: [Rc<RefCell<Ram>>; 4],
    handles: Vec<MappingHandle>,
    mirroring: Option<Mirroring>,
}
impl Debug for Nametables {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nametables")
         .field("mirroring", &self.mirroring)
         .field("handles", &self.handles)
         .finish()
    }
}
impl Default for Nametables {
    fn default() -> Self { Self {
        pages: std::array::from_fn(|_| Rc::new(RefCell::new(Ram::new(PAGE_SIZE as usize)))),
        handles: Vec::with_capacity(4),
        mirroring: None,
    }}
}
impl Nametables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mirroring(&self) -> Option<Mirroring> {
        self.mirroring
    }

    /// Replace whatever layout is installed on `bus` with `mirroring`.
    pub fn install(&mut self, bus: &mut MemoryBus, mirroring: Mirroring) {
        if self.mirroring == Some(mirroring) {
            return;
        }

        self.remove(bus);
        for (quadrant, page) in mirroring.layout().into_iter().enumerate() {
            let start = NAMETABLE_BASE + quadrant as u16 * PAGE_SIZE;
            self.handles.push(bus.register_mapped_device(self.pages[page].clone(), start, start + PAGE_SIZE - 1));
        }
        self.mirroring = Some(mirroring);
        trace!("nametable mirroring set to {mirroring:?}");
    }

    pub fn remove(&mut self, bus: &mut MemoryBus) {
        for handle in self.handles.drain(..) {
            bus.remove_mapping(handle);
        }
        self.mirroring = None;
    }
}
