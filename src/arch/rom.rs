//! iNES and NES 2.0 cartridge images.
//!
//! Layout: 16-byte header, optional 512-byte trainer, PRG ROM, CHR ROM.
//! Anything after CHR ROM (PlayChoice data, title) is ignored.

use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;
use crate::arch::nametable::Mirroring;

pub const HEADER_SIZE: usize = 16;
const TRAINER_SIZE: usize = 512;
const MAGIC: [u8; 4] = *b"NES\x1A";
const PRG_UNIT: usize = 0x4000;
const CHR_UNIT: usize = 0x2000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RomError {
    #[error("missing \"NES\\x1A\" signature")]
    BadMagic,
    #[error("image is {actual} bytes but its header requires {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("{segment} range {offset:#X}+{len:#X} lies outside the {size:#X}-byte segment")]
    OutOfRange {
        segment: &'static str,
        offset: usize,
        len: usize,
        size: usize,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RomFormat {
    INes,
    Nes2,
}
impl Display for RomFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RomFormat::INes => write!(f, "iNES"),
            RomFormat::Nes2 => write!(f, "NES 2.0"),
        }
    }
}

/// Header and segments shared by both formats.
#[derive(Clone, PartialEq, Eq)]
pub struct RomData {
    header: [u8; HEADER_SIZE],
    prg: Vec<u8>,
    chr: Vec<u8>,
}
impl Debug for RomData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RomData")
         .field("header", &format_args!("{:02X?}", self.header))
         .field("prg", &self.prg.len())
         .field("chr", &self.chr.len())
         .finish()
    }
}

fn segment<'a>(data: &'a [u8], segment: &'static str, offset: usize, len: usize) -> Result<&'a [u8], RomError> {
    offset.checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(RomError::OutOfRange { segment, offset, len, size: data.len() })
}

pub trait RomImage: Debug {
    fn format(&self) -> RomFormat;
    fn data(&self) -> &RomData;
    fn mapper(&self) -> u16;
    fn submapper(&self) -> u8;
    fn prg_ram_size(&self) -> usize;
    fn chr_ram_size(&self) -> usize;

    fn header(&self) -> &[u8; HEADER_SIZE] {
        &self.data().header
    }

    fn prg_rom_size(&self) -> usize {
        self.data().prg.len()
    }

    fn chr_rom_size(&self) -> usize {
        self.data().chr.len()
    }

    fn mirroring(&self) -> Mirroring {
        let flags = self.header()[6];
        if flags & 0x08 != 0 {
            Mirroring::FourScreen
        } else if flags & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }

    fn has_battery(&self) -> bool {
        self.header()[6] & 0x02 != 0
    }

    fn has_trainer(&self) -> bool {
        self.header()[6] & 0x04 != 0
    }

    fn prg_rom(&self, offset: usize, len: usize) -> Result<&[u8], RomError> {
        segment(&self.data().prg, "PRG ROM", offset, len)
    }

    fn chr_rom(&self, offset: usize, len: usize) -> Result<&[u8], RomError> {
        segment(&self.data().chr, "CHR ROM", offset, len)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct INesImage(RomData);
impl RomImage for INesImage {
    fn format(&self) -> RomFormat {
        RomFormat::INes
    }

    fn data(&self) -> &RomData {
        &self.0
    }

    /// Bytes 12-15 are unused in iNES; tools that stamped a signature there
    /// ("DiskDude!") also garbled byte 7, so only the low nibble is trusted
    /// in that case.
    fn mapper(&self) -> u16 {
        let header = &self.0.header;
        if header[12..16].iter().all(|&b| b == 0) {
            ((header[7] & 0xF0) | (header[6] >> 4)) as u16
        } else {
            (header[6] >> 4) as u16
        }
    }

    fn submapper(&self) -> u8 {
        0
    }

    fn prg_ram_size(&self) -> usize {
        (self.0.header[8].max(1) as usize) * 0x2000
    }

    fn chr_ram_size(&self) -> usize {
        if self.0.chr.is_empty() { CHR_UNIT } else { 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nes2Image(RomData);
impl Nes2Image {
    fn shift_size(count: u8) -> usize {
        if count == 0 { 0 } else { 64 << count as usize }
    }
}
impl RomImage for Nes2Image {
    fn format(&self) -> RomFormat {
        RomFormat::Nes2
    }

    fn data(&self) -> &RomData {
        &self.0
    }

    fn mapper(&self) -> u16 {
        let header = &self.0.header;
        (((header[8] & 0x0F) as u16) << 8) | ((header[7] & 0xF0) as u16) | ((header[6] >> 4) as u16)
    }

    fn submapper(&self) -> u8 {
        self.0.header[8] >> 4
    }

    /// Volatile plus battery-backed.
    fn prg_ram_size(&self) -> usize {
        let byte = self.0.header[10];
        Self::shift_size(byte & 0x0F) + Self::shift_size(byte >> 4)
    }

    fn chr_ram_size(&self) -> usize {
        let byte = self.0.header[11];
        Self::shift_size(byte & 0x0F) + Self::shift_size(byte >> 4)
    }
}

/// NES 2.0 ROM size: either `msb:lsb` units, or `2^E * (2M + 1)` bytes when
/// the MSB nibble is $F.
fn nes2_size(lsb: u8, msb: u8, unit: usize) -> Option<usize> {
    if msb == 0x0F {
        let exponent = (lsb >> 2) as u32;
        let multiplier = (lsb & 0x03) as usize * 2 + 1;
        1usize.checked_shl(exponent)?.checked_mul(multiplier)
    } else {
        Some((((msb as usize) << 8) | lsb as usize) * unit)
    }
}

/// Identify the format and split the image into its segments.
pub fn open_rom(bytes: &[u8]) -> Result<Box<dyn RomImage>, RomError> {
    let header: [u8; HEADER_SIZE] = bytes.get(..HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or(RomError::Truncated { expected: HEADER_SIZE, actual: bytes.len() })?;
    if header[0..4] != MAGIC {
        return Err(RomError::BadMagic);
    }

    let format = if header[7] & 0x0C == 0x08 { RomFormat::Nes2 } else { RomFormat::INes };
    let (prg_size, chr_size) = match format {
        RomFormat::INes => (header[4] as usize * PRG_UNIT, header[5] as usize * CHR_UNIT),
        RomFormat::Nes2 => {
            let too_large = RomError::Truncated { expected: usize::MAX, actual: bytes.len() };
            (
                nes2_size(header[4], header[9] & 0x0F, PRG_UNIT).ok_or(too_large)?,
                nes2_size(header[5], header[9] >> 4, CHR_UNIT)
                    .ok_or(RomError::Truncated { expected: usize::MAX, actual: bytes.len() })?,
            )
        },
    };

    let prg_start = HEADER_SIZE + if header[6] & 0x04 != 0 { TRAINER_SIZE } else { 0 };
    let chr_start = prg_start.saturating_add(prg_size);
    let end = chr_start.saturating_add(chr_size);
    if bytes.len() < end {
        return Err(RomError::Truncated { expected: end, actual: bytes.len() });
    }

    let data = RomData {
        header,
        prg: bytes[prg_start..chr_start].to_vec(),
        chr: bytes[chr_start..end].to_vec(),
    };

    Ok(match format {
        RomFormat::INes => Box::new(INesImage(data)),
        RomFormat::Nes2 => Box::new(Nes2Image(data)),
    })
}
