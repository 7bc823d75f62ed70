use crate::arch::bus::MemoryMappedDevice;

/// Plain byte-addressed RAM. The size must be a power of two; addresses are
/// masked so a device can sit at any base without rebasing.
#[derive(Clone, Debug)]
pub struct Ram {
    mask: usize,
    data: Box<[u8]>,
}
impl Ram {
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        Self {
            mask: size - 1,
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }
}

impl MemoryMappedDevice for Ram {
    #[inline(always)]
    fn read(&mut self, addr: u16) -> u8 {
        self.data[addr as usize & self.mask]
    }

    #[inline(always)]
    fn write(&mut self, addr: u16, data: u8) {
        self.data[addr as usize & self.mask] = data;
    }
}
