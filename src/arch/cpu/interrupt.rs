//! Interrupt inputs of the 2A03.
//!
//! Reset and NMI are edge-latched: asserting sets a pending flag that the CPU
//! clears when it services the event. IRQ is a level shared by any number of
//! sources (APU frame counter, mappers), so it counts active assertions and
//! stays high until every source has let go.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterruptKind {
    Reset,
    Nmi,
    Irq,
}
impl InterruptKind {
    pub fn vector(self) -> u16 {
        match self {
            InterruptKind::Reset => 0xFFFC,
            InterruptKind::Nmi => 0xFFFA,
            InterruptKind::Irq => 0xFFFE,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Reset" | "RESET" => Some(InterruptKind::Reset),
            "NMI" => Some(InterruptKind::Nmi),
            "IRQ" => Some(InterruptKind::Irq),
            _ => None,
        }
    }
}

/// Handle onto one of the CPU's interrupt inputs. Cheap to clone; every clone
/// drives the same line.
#[derive(Clone, Debug)]
pub struct InterruptLine {
    kind: InterruptKind,
    state: Rc<Cell<u32>>,
}
impl InterruptLine {
    pub(super) fn new(kind: InterruptKind) -> Self {
        Self { kind, state: Rc::new(Cell::new(0)) }
    }

    pub fn kind(&self) -> InterruptKind {
        self.kind
    }

    pub fn assert(&self) {
        match self.kind {
            InterruptKind::Irq => self.state.set(self.state.get() + 1),
            _ => self.state.set(1),
        }
    }

    pub fn deassert(&self) {
        match self.kind {
            InterruptKind::Irq => {
                debug_assert!(self.state.get() > 0, "unbalanced IRQ deassert");
                self.state.set(self.state.get().saturating_sub(1));
            },
            // edge-latched: a pending event survives the line going high again
            _ => (),
        }
    }

    /// Assert now and deassert when the guard is dropped.
    pub fn assert_scoped(&self) -> InterruptGuard {
        self.assert();
        InterruptGuard { line: self.clone() }
    }

    #[inline(always)]
    pub fn is_asserted(&self) -> bool {
        self.state.get() > 0
    }

    /// Number of sources currently holding the line.
    pub fn holders(&self) -> u32 {
        self.state.get()
    }

    /// Consume a latched edge. Returns whether one was pending.
    pub(super) fn acknowledge(&self) -> bool {
        debug_assert!(self.kind != InterruptKind::Irq);
        let pending = self.state.get() > 0;
        self.state.set(0);

        pending
    }
}

#[must_use = "dropping the guard releases the interrupt"]
#[derive(Debug)]
pub struct InterruptGuard {
    line: InterruptLine,
}
impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.line.deassert();
    }
}
