use thiserror::Error;
use crate::arch::bus::BusError;
use crate::arch::rom::RomError;

/// Everything that can go wrong while building the machine or loading a
/// cartridge. None of these are raised once emulation is running.
#[derive(Debug, Error)]
pub enum NesError {
    #[error(transparent)]
    Rom(#[from] RomError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("failed to read ROM file")]
    Io(#[from] std::io::Error),
    #[error("mapper {id} is not supported")]
    UnsupportedMapper { id: u16 },
    #[error("{segment} is {size:#X} bytes, the board supports at most {max:#X}")]
    SegmentTooLarge {
        segment: &'static str,
        size: usize,
        max: usize,
    },
}
