#![allow(non_upper_case_globals)]

use std::cell::RefCell;
use std::rc::Rc;
use bitflags::bitflags;
use crate::arch::apu::Apu;
use crate::arch::bus::MemoryMappedDevice;

bitflags! {
    /// Standard controller buttons, in shift-register order (A is read first).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Buttons: u8 {
        const A      = 0b00000001;
        const B      = 0b00000010;
        const Select = 0b00000100;
        const Start  = 0b00001000;
        const Up     = 0b00010000;
        const Down   = 0b00100000;
        const Left   = 0b01000000;
        const Right  = 0b10000000;
    }
}

/// Source of controller state. Polled when the game strobes $4016.
pub trait InputReader {
    fn poll(&mut self, controller: usize) -> Buttons;
}

/// Nothing plugged in.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoInput;
impl InputReader for NoInput {
    fn poll(&mut self, _controller: usize) -> Buttons {
        Buttons::empty()
    }
}

/// $4016/$4017. Writes to $4017 belong to the APU frame counter and are
/// passed through.
pub struct Controllers {
    reader: Box<dyn InputReader>,
    apu: Rc<RefCell<Apu>>,
    strobe: bool,
    shifters: [u8; 2],
}
impl std::fmt::Debug for Controllers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controllers")
         .field("strobe", &self.strobe)
         .field("shifters", &self.shifters)
         .finish()
    }
}
impl Controllers {
    pub const NAME: &'static str = "Controllers";

    pub fn new(reader: Box<dyn InputReader>, apu: Rc<RefCell<Apu>>) -> Self {
        Self {
            reader,
            apu,
            strobe: false,
            shifters: [0; 2],
        }
    }

    pub fn set_reader(&mut self, reader: Box<dyn InputReader>) {
        self.reader = reader;
    }

    fn latch(&mut self) {
        for (index, shifter) in self.shifters.iter_mut().enumerate() {
            *shifter = self.reader.poll(index).bits();
        }
    }

    fn read_port(&mut self, index: usize) -> u8 {
        let shifter = &mut self.shifters[index];
        let bit = *shifter & 1;
        if !self.strobe {
            // official controllers return 1 once all eight buttons are out
            *shifter = (*shifter >> 1) | 0x80;
        }

        0x40 | bit
    }
}

impl MemoryMappedDevice for Controllers {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x4016 => self.read_port(0),
            _ => self.read_port(1),
        }
    }

    fn write(&mut self, addr: u16, data: u8) {
        match addr {
            0x4016 => {
                self.strobe = data & 1 != 0;
                if self.strobe {
                    self.latch();
                }
            },
            _ => self.apu.borrow_mut().write_frame_counter(data),
        }
    }
}
