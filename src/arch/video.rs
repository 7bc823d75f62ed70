use std::cell::RefCell;
use std::rc::Rc;

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 240;
/// Number of distinct colors the 2C02 can output.
pub const PALETTE_SIZE: usize = 64;

/// Receives the picture one dot at a time. Called on the emulation thread;
/// implementations that hand frames to another thread must not block.
pub trait FrameSink {
    fn initialize(&mut self, width: usize, height: usize, palette_size: usize);
    /// `palette_index` is a 6-bit master palette index.
    fn set_pixel(&mut self, x: usize, y: usize, palette_index: u8);
    /// The frame is complete.
    fn present(&mut self);
}

impl<T: FrameSink> FrameSink for Rc<RefCell<T>> {
    fn initialize(&mut self, width: usize, height: usize, palette_size: usize) {
        self.borrow_mut().initialize(width, height, palette_size);
    }

    fn set_pixel(&mut self, x: usize, y: usize, palette_index: u8) {
        self.borrow_mut().set_pixel(x, y, palette_index);
    }

    fn present(&mut self) {
        self.borrow_mut().present();
    }
}

/// Discards everything. Used until a real sink is attached.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSink;
impl FrameSink for NullSink {
    fn initialize(&mut self, _width: usize, _height: usize, _palette_size: usize) {}
    fn set_pixel(&mut self, _x: usize, _y: usize, _palette_index: u8) {}
    fn present(&mut self) {}
}

/// PCM layout an audio sink asks for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub is_float: bool,
}
impl AudioFormat {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Byte value of a zero sample. Unsigned 8-bit PCM centres on 0x80.
    pub fn silence(&self) -> u8 {
        if self.bits_per_sample == 8 && !self.is_float { 0x80 } else { 0 }
    }
}
impl Default for AudioFormat {
    fn default() -> Self { Self {
        sample_rate: 44100,
        bits_per_sample: 16,
        channels: 1,
        is_float: false,
    }}
}

/// Receives sample buffers from the APU on the emulation thread. Same rule as
/// [`FrameSink`]: never block.
pub trait AudioSink {
    /// Called once before the first buffer. Returns the format buffers must use.
    fn initialize(&mut self, buffer_count: usize) -> AudioFormat;
    fn enqueue_buffer(&mut self, bytes: &[u8]);
}

impl<T: AudioSink> AudioSink for Rc<RefCell<T>> {
    fn initialize(&mut self, buffer_count: usize) -> AudioFormat {
        self.borrow_mut().initialize(buffer_count)
    }

    fn enqueue_buffer(&mut self, bytes: &[u8]) {
        self.borrow_mut().enqueue_buffer(bytes);
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NullAudio;
impl AudioSink for NullAudio {
    fn initialize(&mut self, _buffer_count: usize) -> AudioFormat {
        AudioFormat::default()
    }
    fn enqueue_buffer(&mut self, _bytes: &[u8]) {}
}

/// Keeps the last drawn picture as palette indices.
#[derive(Clone, Debug, Default)]
pub struct FrameBuffer {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    frames: u64,
}
impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of `present` calls so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
impl FrameSink for FrameBuffer {
    fn initialize(&mut self, width: usize, height: usize, _palette_size: usize) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width * height];
    }

    fn set_pixel(&mut self, x: usize, y: usize, palette_index: u8) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = palette_index;
        }
    }

    fn present(&mut self) {
        self.frames += 1;
    }
}
