use std::fmt::{Debug, Formatter};
use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ  = 0b01;
        const WRITE = 0b10;
    }
}

/// Slot index plus the slot's generation, so an ID kept past
/// `delete_breakpoint` never resolves to a later breakpoint in the same slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BreakpointId {
    slot: usize,
    generation: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Fires on bus accesses of the given kind(s) to one address.
    Memory { address: u16, access: Access },
}

/// Passed to a breakpoint callback. `value` is only known for writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BreakpointHit {
    pub id: BreakpointId,
    pub address: u16,
    pub access: Access,
    pub value: Option<u8>,
}

pub struct Breakpoint {
    enabled: bool,
    address: u16,
    access: Access,
    callback: Box<dyn FnMut(BreakpointHit)>,
}
impl Debug for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breakpoint")
         .field("enabled", &self.enabled)
         .field("address", &self.address)
         .field("access", &self.access)
         .finish()
    }
}
impl Breakpoint {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn access(&self) -> Access {
        self.access
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    breakpoint: Option<Breakpoint>,
}

/// Breakpoint storage. Disabled breakpoints only live in `slots`; enabled
/// ones are also listed in the read and/or write dispatch sets so the bus can
/// skip the whole check with an emptiness test.
#[derive(Default)]
pub(super) struct Breakpoints {
    slots: Vec<Slot>,
    reads: Vec<(u16, BreakpointId)>,
    writes: Vec<(u16, BreakpointId)>,
}
impl Breakpoints {
    pub fn create(&mut self, kind: BreakpointKind, callback: Box<dyn FnMut(BreakpointHit)>) -> BreakpointId {
        let BreakpointKind::Memory { address, access } = kind;
        let breakpoint = Breakpoint { enabled: false, address, access, callback };

        let slot = match self.slots.iter().position(|s| s.breakpoint.is_none()) {
            Some(free) => free,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            },
        };
        let entry = &mut self.slots[slot];
        entry.breakpoint = Some(breakpoint);

        BreakpointId { slot, generation: entry.generation }
    }

    fn live_mut(&mut self, id: BreakpointId) -> Option<&mut Breakpoint> {
        self.slots.get_mut(id.slot)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.breakpoint.as_mut())
    }

    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.slots.get(id.slot)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.breakpoint.as_ref())
    }

    pub fn set_enabled(&mut self, id: BreakpointId, enabled: bool) {
        let Some(bp) = self.live_mut(id) else { return };
        if bp.enabled == enabled {
            return;
        }
        bp.enabled = enabled;

        let (address, access) = (bp.address, bp.access);
        if enabled {
            if access.contains(Access::READ) {
                self.reads.push((address, id));
            }
            if access.contains(Access::WRITE) {
                self.writes.push((address, id));
            }
        } else {
            self.unlist(id);
        }
    }

    pub fn delete(&mut self, id: BreakpointId) {
        let Some(slot) = self.slots.get_mut(id.slot) else { return };
        if slot.generation != id.generation || slot.breakpoint.is_none() {
            return;
        }
        slot.breakpoint = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.unlist(id);
    }

    fn unlist(&mut self, id: BreakpointId) {
        self.reads.retain(|(_, bp)| *bp != id);
        self.writes.retain(|(_, bp)| *bp != id);
    }

    #[inline(always)]
    pub fn any_reads(&self) -> bool {
        !self.reads.is_empty()
    }

    #[inline(always)]
    pub fn any_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    pub fn fire(&mut self, address: u16, access: Access, value: Option<u8>) {
        let set = if access == Access::READ { &self.reads } else { &self.writes };

        for &(target, id) in set {
            if target != address {
                continue;
            }
            if let Some(bp) = self.slots.get_mut(id.slot).and_then(|s| s.breakpoint.as_mut()) {
                (bp.callback)(BreakpointHit { id, address, access, value });
            }
        }
    }
}
