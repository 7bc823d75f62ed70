use crate::arch::bus::MemoryMappedDevice;

/// The 32 bytes of palette memory at $3F00.
#[derive(Clone, Debug, Default)]
pub struct PaletteRam {
    entries: [u8; 0x20],
}
impl PaletteRam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries $10/$14/$18/$1C alias the backdrop entries below them.
    #[inline(always)]
    fn index(addr: u16) -> usize {
        let index = (addr & 0x1F) as usize;
        if index & 0x13 == 0x10 {
            index & 0x0F
        } else {
            index
        }
    }

    /// Master palette index for a 5-bit palette address.
    #[inline(always)]
    pub fn color(&self, index: u8) -> u8 {
        self.entries[Self::index(index as u16)] & 0x3F
    }
}

impl MemoryMappedDevice for PaletteRam {
    fn read(&mut self, addr: u16) -> u8 {
        self.entries[Self::index(addr)] & 0x3F
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.entries[Self::index(addr)] = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_backdrops_alias_background() {
        let mut palette = PaletteRam::new();
        for (alias, base) in [(0x3F10, 0x3F00), (0x3F14, 0x3F04), (0x3F18, 0x3F08), (0x3F1C, 0x3F0C)] {
            palette.write(alias, 0x21);
            assert_eq!(palette.read(base), 0x21);
            palette.write(base, 0x0F);
            assert_eq!(palette.read(alias), 0x0F);
        }

        palette.write(0x3F11, 0x30);
        assert_eq!(palette.read(0x3F01), 0x00);
        assert_eq!(palette.color(0x11), 0x30);
    }
}
