use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;
use std::time::{Duration, Instant};
use proc_bitfield::bitfield;
use tracing::trace;
use crate::arch::bus::{BusError, MemoryBus, MemoryMappedDevice};
use crate::arch::cpu::InterruptLine;
use crate::arch::video::{FrameSink, PALETTE_SIZE, SCREEN_HEIGHT, SCREEN_WIDTH};

pub mod palette;
pub mod sprites;

use palette::PaletteRam;
use sprites::{SpriteEvaluator, SpriteUnit};

pub const PRE_RENDER: i16 = -1;
pub const VBLANK_LINE: i16 = 241;
const LAST_LINE: i16 = 260;
const LAST_CYCLE: u16 = 340;
const FRAME_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / 60);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PixelPos {
    pub cycle: u16,
    pub scanline: i16,
    pub odd_frame: bool,
}
impl Default for PixelPos {
    fn default() -> Self { Self {
        cycle: 0,
        scanline: 0,
        odd_frame: false,
    }}
}
impl Display for PixelPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:3},{:3}", self.scanline, self.cycle)
    }
}
impl PixelPos {
    /// Advance one dot. Returns `true` when a new frame begins.
    pub fn inc(&mut self) -> bool {
        self.cycle += 1;
        if self.cycle > LAST_CYCLE {
            self.cycle = 0;
            self.scanline += 1;

            if self.scanline > LAST_LINE {
                self.scanline = PRE_RENDER;
                self.odd_frame = !self.odd_frame;
                return true;
            }
        }

        false
    }
}


bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct CtrlReg(pub u8): Debug {
        pub base_nametable_addr: u8 @ 0..=1,
        pub vram_addr_inc: bool @ 2,
        pub sprite_pattern_addr: bool @ 3,
        pub background_pattern_addr: bool @ 4,
        pub sprite_size: bool @ 5,
        pub master_slave_select: bool @ 6,
        pub generate_nmi: bool @ 7,
    }
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct MaskReg(pub u8): Debug {
        pub greyscale: bool @ 0,
        pub show_background_left: bool @ 1,
        pub show_sprites_left: bool @ 2,
        pub show_background: bool @ 3,
        pub show_sprites: bool @ 4,
        /// green on PAL/Dendy
        pub emphasize_red: bool @ 5,
        /// red on PAL/Dendy
        pub emphasize_green: bool @ 6,
        pub emphasize_blue: bool @ 7,
    }
}

bitfield! {
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct StatusReg(pub u8): Debug {
        pub sprite_overflow: bool @ 5,
        pub sprite_zero_hit: bool @ 6,
        pub vblank: bool @ 7,
    }
}

bitfield! {
    /// Loopy's `v`/`t` layout: `yyy NN YYYYY XXXXX`.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct VramAddr(pub u16): Debug {
        pub coarse_x: u8 @ 0..=4,
        pub coarse_y: u8 @ 5..=9,
        pub nametable: u8 @ 10..=11,
        pub fine_y: u8 @ 12..=14,
    }
}
impl VramAddr {
    fn increment_coarse_x(&mut self) {
        if self.coarse_x() == 31 {
            self.set_coarse_x(0);
            self.0 ^= 0x0400;
        } else {
            self.set_coarse_x(self.coarse_x() + 1);
        }
    }

    fn increment_y(&mut self) {
        if self.fine_y() < 7 {
            self.set_fine_y(self.fine_y() + 1);
            return;
        }

        self.set_fine_y(0);
        match self.coarse_y() {
            29 => {
                self.set_coarse_y(0);
                self.0 ^= 0x0800;
            },
            31 => self.set_coarse_y(0),
            y => self.set_coarse_y(y + 1),
        }
    }

    #[inline(always)]
    fn tile_addr(self) -> u16 {
        0x2000 | (self.0 & 0x0FFF)
    }

    #[inline(always)]
    fn attribute_addr(self) -> u16 {
        0x23C0 | (self.0 & 0x0C00) | ((self.0 >> 4) & 0x38) | ((self.0 >> 2) & 0x07)
    }
}


pub struct Ricoh2C02 {
    bus: Rc<RefCell<MemoryBus>>,
    palette: Rc<RefCell<PaletteRam>>,
    nmi: InterruptLine,
    sink: Box<dyn FrameSink>,
    throttle: bool,
    last_vblank: Instant,

    ctrl: CtrlReg,
    mask: MaskReg,
    status: StatusReg,
    oam_addr: u8,
    oam: [u8; 256],
    vram_addr: VramAddr,
    tmp_vram_addr: VramAddr,
    fine_x_scroll: u8,
    write_toggle: bool,
    read_buffer: u8,
    ports_latch: u8,

    pos: PixelPos,
    frame: u64,

    next_tile: u8,
    next_attr: u8,
    next_lo: u8,
    next_hi: u8,
    bg_pattern_lo: u16,
    bg_pattern_hi: u16,
    bg_attr_lo: u16,
    bg_attr_hi: u16,

    evaluator: SpriteEvaluator,
    sprites: [SpriteUnit; 8],
    sprite_latch: SpriteUnit,
}
impl Debug for Ricoh2C02 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ricoh2C02")
         .field("pos", &self.pos)
         .field("frame", &self.frame)
         .field("ctrl", &self.ctrl)
         .field("mask", &self.mask)
         .field("status", &self.status)
         .field("oam_addr", &self.oam_addr)
         .field("vram_addr", &self.vram_addr)
         .field("tmp_vram_addr", &self.tmp_vram_addr)
         .field("fine_x_scroll", &self.fine_x_scroll)
         .field("write_toggle", &self.write_toggle)
         .finish()
    }
}

impl Ricoh2C02 {
    pub const NAME: &'static str = "Ricoh 2C02 PPU";

    /// Installs palette RAM and the fixed $3000/$3F20 mirrors on `bus`.
    /// Pattern tables and nametables belong to the cartridge.
    pub fn new(bus: Rc<RefCell<MemoryBus>>, nmi: InterruptLine, mut sink: Box<dyn FrameSink>, throttle: bool) -> Result<Self, BusError> {
        let palette = Rc::new(RefCell::new(PaletteRam::new()));
        {
            let mut bus = bus.borrow_mut();
            bus.register_mapped_device(palette.clone(), 0x3F00, 0x3F1F);
            bus.set_mirroring_range(0x3F00, 0x3F1F, 0x3F20, 0x3FFF)?;
            bus.set_mirroring_range(0x2000, 0x2EFF, 0x3000, 0x3EFF)?;
        }
        sink.initialize(SCREEN_WIDTH, SCREEN_HEIGHT, PALETTE_SIZE);

        Ok(Self {
            bus,
            palette,
            nmi,
            sink,
            throttle,
            last_vblank: Instant::now(),

            ctrl: CtrlReg(0),
            mask: MaskReg(0),
            status: StatusReg(0),
            oam_addr: 0,
            oam: [0u8; 256],
            vram_addr: VramAddr(0),
            tmp_vram_addr: VramAddr(0),
            fine_x_scroll: 0,
            write_toggle: false,
            read_buffer: 0,
            ports_latch: 0,

            pos: PixelPos::default(),
            frame: 0,

            next_tile: 0,
            next_attr: 0,
            next_lo: 0,
            next_hi: 0,
            bg_pattern_lo: 0,
            bg_pattern_hi: 0,
            bg_attr_lo: 0,
            bg_attr_hi: 0,

            evaluator: SpriteEvaluator::default(),
            sprites: [SpriteUnit::default(); 8],
            sprite_latch: SpriteUnit::default(),
        })
    }

    pub fn set_sink(&mut self, mut sink: Box<dyn FrameSink>) {
        sink.initialize(SCREEN_WIDTH, SCREEN_HEIGHT, PALETTE_SIZE);
        self.sink = sink;
    }

    pub fn set_throttle(&mut self, throttle: bool) {
        self.throttle = throttle;
    }

    /// Clear the registers and return to the first dot of an even frame.
    pub fn reset(&mut self) {
        self.ctrl = CtrlReg(0);
        self.mask = MaskReg(0);
        self.status = StatusReg(0);
        self.write_toggle = false;
        self.fine_x_scroll = 0;
        self.tmp_vram_addr = VramAddr(0);
        self.read_buffer = 0;
        self.pos = PixelPos::default();
        self.evaluator.discard();
        self.sprites = [SpriteUnit::default(); 8];
    }

    pub fn pos(&self) -> PixelPos {
        self.pos
    }

    pub fn scanline(&self) -> i16 {
        self.pos.scanline
    }

    pub fn cycle(&self) -> u16 {
        self.pos.cycle
    }

    /// Frames presented since power-on.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn ctrl(&self) -> CtrlReg {
        self.ctrl
    }

    pub fn mask(&self) -> MaskReg {
        self.mask
    }

    pub fn status(&self) -> StatusReg {
        self.status
    }

    pub fn vram_addr(&self) -> u16 {
        self.vram_addr.0
    }

    pub fn oam(&self) -> &[u8; 256] {
        &self.oam
    }

    #[inline(always)]
    fn rendering_enabled(&self) -> bool {
        self.mask.show_background() || self.mask.show_sprites()
    }

    #[inline(always)]
    fn fetch(&self, addr: u16) -> u8 {
        self.bus.borrow_mut().read(addr)
    }

    #[inline(always)]
    fn sprite_height(&self) -> i16 {
        if self.ctrl.sprite_size() { 16 } else { 8 }
    }

    /// Advance one dot.
    pub fn tick(&mut self) {
        let PixelPos { cycle, scanline, .. } = self.pos;
        let rendering = self.rendering_enabled();
        let render_line = scanline < 240;
        let visible = (0..240).contains(&scanline);

        if scanline == PRE_RENDER {
            match cycle {
                0 if rendering => self.corrupt_oam(),
                1 => {
                    self.status.set_vblank(false);
                    self.status.set_sprite_zero_hit(false);
                    self.status.set_sprite_overflow(false);
                    self.evaluator.discard();
                },
                _ => (),
            }
        }

        if render_line && rendering {
            self.background_pipeline(scanline, cycle);
        }

        if visible && (1..=256).contains(&cycle) {
            self.output_pixel(cycle as usize - 1, scanline as usize, rendering);
            if rendering {
                self.sprites.iter_mut().for_each(SpriteUnit::shift);
            }
        }

        if render_line && rendering {
            self.sprite_pipeline(scanline, cycle);
        }

        if scanline == VBLANK_LINE && cycle == 1 {
            self.enter_vblank();
        }

        // odd frames drop the last dot of the pre-render line
        if scanline == PRE_RENDER && cycle == LAST_CYCLE - 1 && self.pos.odd_frame && rendering {
            self.pos.cycle = LAST_CYCLE;
        }
        self.pos.inc();
    }

    fn corrupt_oam(&mut self) {
        if self.oam_addr >= 8 {
            let src = (self.oam_addr & 0xF8) as usize;
            self.oam.copy_within(src..src + 8, 0);
        }
    }

    fn enter_vblank(&mut self) {
        if self.throttle {
            let deadline = self.last_vblank + FRAME_PERIOD;
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
        }
        self.last_vblank = Instant::now();

        self.sink.present();
        self.frame += 1;

        self.status.set_vblank(true);
        if self.ctrl.generate_nmi() {
            self.nmi.assert();
        }
    }

    fn background_pipeline(&mut self, scanline: i16, cycle: u16) {
        let shifting = (2..=257).contains(&cycle) || (321..=337).contains(&cycle);
        if shifting {
            self.bg_pattern_lo <<= 1;
            self.bg_pattern_hi <<= 1;
            self.bg_attr_lo <<= 1;
            self.bg_attr_hi <<= 1;
        }

        if shifting && cycle != 257 {
            match (cycle - 1) % 8 {
                0 => {
                    self.load_background_shifters();
                    self.next_tile = self.fetch(self.vram_addr.tile_addr());
                },
                2 => {
                    let attr = self.fetch(self.vram_addr.attribute_addr());
                    let shift = ((self.vram_addr.coarse_y() & 0x02) << 1) | (self.vram_addr.coarse_x() & 0x02);
                    self.next_attr = (attr >> shift) & 0x03;
                },
                4 => self.next_lo = self.fetch(self.background_pattern_addr()),
                6 => self.next_hi = self.fetch(self.background_pattern_addr() + 8),
                7 => self.vram_addr.increment_coarse_x(),
                _ => (),
            }
        }

        match cycle {
            256 => self.vram_addr.increment_y(),
            257 => {
                self.load_background_shifters();
                self.vram_addr.0 = (self.vram_addr.0 & !0x041F) | (self.tmp_vram_addr.0 & 0x041F);
            },
            280..=304 if scanline == PRE_RENDER => {
                self.vram_addr.0 = (self.vram_addr.0 & !0x7BE0) | (self.tmp_vram_addr.0 & 0x7BE0);
            },
            338 | 340 => {
                self.next_tile = self.fetch(self.vram_addr.tile_addr());
            },
            _ => (),
        }
    }

    #[inline(always)]
    fn background_pattern_addr(&self) -> u16 {
        ((self.ctrl.background_pattern_addr() as u16) << 12)
            | ((self.next_tile as u16) << 4)
            | self.vram_addr.fine_y() as u16
    }

    fn load_background_shifters(&mut self) {
        self.bg_pattern_lo = (self.bg_pattern_lo & 0xFF00) | self.next_lo as u16;
        self.bg_pattern_hi = (self.bg_pattern_hi & 0xFF00) | self.next_hi as u16;
        self.bg_attr_lo = (self.bg_attr_lo & 0xFF00) | if self.next_attr & 0x01 != 0 { 0xFF } else { 0x00 };
        self.bg_attr_hi = (self.bg_attr_hi & 0xFF00) | if self.next_attr & 0x02 != 0 { 0xFF } else { 0x00 };
    }

    fn sprite_pipeline(&mut self, scanline: i16, cycle: u16) {
        match cycle {
            1..=64 if scanline >= 0 => self.evaluator.clear_secondary(cycle),
            65..=256 if scanline >= 0 => {
                if cycle == 65 {
                    self.evaluator.begin();
                }
                if cycle % 2 == 1 && self.evaluator.step(&self.oam, scanline, self.sprite_height()) {
                    trace!("sprite overflow on scanline {scanline}");
                    self.status.set_sprite_overflow(true);
                }
            },
            257..=320 => {
                self.oam_addr = 0;
                self.fetch_sprite(scanline, cycle);
            },
            _ => (),
        }
    }

    /// Eight dots per secondary OAM slot: two garbage nametable reads, then
    /// the two pattern planes.
    fn fetch_sprite(&mut self, scanline: i16, cycle: u16) {
        let slot = ((cycle - 257) / 8) as usize;
        let present = slot < self.evaluator.found();
        let [y, tile, attributes, x] = self.evaluator.slot(slot);

        match (cycle - 257) % 8 {
            0 | 2 => {
                self.fetch(self.vram_addr.tile_addr());
            },
            4 => {
                let addr = self.sprite_pattern_addr(present, scanline, y, tile, attributes);
                self.sprite_latch.pattern_lo = self.fetch(addr);
            },
            6 => {
                let addr = self.sprite_pattern_addr(present, scanline, y, tile, attributes);
                self.sprite_latch.pattern_hi = self.fetch(addr + 8);
            },
            7 => {
                self.sprites[slot] = if present {
                    let flip = attributes & 0x40 != 0;
                    SpriteUnit {
                        pattern_lo: if flip { self.sprite_latch.pattern_lo.reverse_bits() } else { self.sprite_latch.pattern_lo },
                        pattern_hi: if flip { self.sprite_latch.pattern_hi.reverse_bits() } else { self.sprite_latch.pattern_hi },
                        attributes,
                        x,
                        sprite_zero: slot == 0 && self.evaluator.sprite_zero_next(),
                    }
                } else {
                    SpriteUnit::default()
                };
            },
            _ => (),
        }
    }

    fn sprite_pattern_addr(&self, present: bool, scanline: i16, y: u8, tile: u8, attributes: u8) -> u16 {
        let height = self.sprite_height();
        let (tile, attributes, row) = if present {
            (tile, attributes, (scanline - y as i16).rem_euclid(height) as u16)
        } else {
            (0xFF, 0, 0)
        };
        let row = if attributes & 0x80 != 0 { (height as u16 - 1) - row } else { row };

        if height == 16 {
            let table = ((tile & 0x01) as u16) << 12;
            let tile = (tile & 0xFE) as u16 + (row >> 3);
            table | (tile << 4) | (row & 0x07)
        } else {
            ((self.ctrl.sprite_pattern_addr() as u16) << 12) | ((tile as u16) << 4) | row
        }
    }

    fn output_pixel(&mut self, x: usize, y: usize, rendering: bool) {
        let index = if rendering {
            self.compose_pixel(x)
        } else {
            0
        };

        let mut color = self.palette.borrow().color(index);
        if self.mask.greyscale() {
            color &= 0x30;
        }
        self.sink.set_pixel(x, y, color);
    }

    /// Palette address (0-31) of the dot at `x`. Also detects sprite 0 hits.
    fn compose_pixel(&mut self, x: usize) -> u8 {
        let (bg_pixel, bg_palette) = if self.mask.show_background() && (x >= 8 || self.mask.show_background_left()) {
            let bit = 0x8000 >> self.fine_x_scroll;
            let pixel = (((self.bg_pattern_hi & bit) != 0) as u8) << 1 | ((self.bg_pattern_lo & bit) != 0) as u8;
            let palette = (((self.bg_attr_hi & bit) != 0) as u8) << 1 | ((self.bg_attr_lo & bit) != 0) as u8;
            (pixel, palette)
        } else {
            (0, 0)
        };

        let sprite = if self.mask.show_sprites() && (x >= 8 || self.mask.show_sprites_left()) {
            self.sprites.iter().find(|unit| unit.pixel() != 0)
        } else {
            None
        };

        let Some(sprite) = sprite else {
            return if bg_pixel == 0 { 0 } else { (bg_palette << 2) | bg_pixel };
        };

        if sprite.sprite_zero && bg_pixel != 0 && x != 255 && self.mask.show_background() {
            if !self.status.sprite_zero_hit() {
                trace!("sprite 0 hit at {}", self.pos);
            }
            self.status.set_sprite_zero_hit(true);
        }

        if bg_pixel != 0 && sprite.behind_background() {
            (bg_palette << 2) | bg_pixel
        } else {
            0x10 | (sprite.palette() << 2) | sprite.pixel()
        }
    }

    #[inline(always)]
    fn increment_vram_addr(&mut self) {
        let inc = if self.ctrl.vram_addr_inc() { 32 } else { 1 };
        self.vram_addr.0 = self.vram_addr.0.wrapping_add(inc) & 0x7FFF;
    }

    fn read_oam_data(&self) -> u8 {
        let clearing = self.rendering_enabled() && (0..240).contains(&self.pos.scanline) && (1..=64).contains(&self.pos.cycle);
        if clearing {
            return 0xFF;
        }

        let value = self.oam[self.oam_addr as usize];
        if self.oam_addr & 0x03 == 2 { value & 0xE3 } else { value }
    }

    fn read_data(&mut self) -> u8 {
        let addr = self.vram_addr.0 & 0x3FFF;
        let value = if addr >= 0x3F00 {
            let mut bus = self.bus.borrow_mut();
            let color = bus.read(addr);
            self.read_buffer = bus.read(addr - 0x1000);
            color | (self.ports_latch & 0xC0)
        } else {
            let buffered = self.read_buffer;
            self.read_buffer = self.fetch(addr);
            buffered
        };
        self.increment_vram_addr();

        value
    }
}

impl MemoryMappedDevice for Ricoh2C02 {
    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr & 0x07 {
            2 => {
                let value = (self.status.0 & 0xE0) | (self.ports_latch & 0x1F);
                self.status.set_vblank(false);
                self.write_toggle = false;
                value
            },
            4 => self.read_oam_data(),
            7 => self.read_data(),
            _ => self.ports_latch,
        };
        self.ports_latch = value;

        value
    }

    fn write(&mut self, addr: u16, data: u8) {
        self.ports_latch = data;

        match addr & 0x07 {
            0 => {
                let nmi_was_enabled = self.ctrl.generate_nmi();
                self.ctrl.0 = data;
                self.tmp_vram_addr.set_nametable(data & 0x03);
                if !nmi_was_enabled && self.ctrl.generate_nmi() && self.status.vblank() {
                    self.nmi.assert();
                }
            },
            1 => self.mask.0 = data,
            2 => (),
            3 => self.oam_addr = data,
            4 => {
                self.oam[self.oam_addr as usize] = data;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            },
            5 => {
                if !self.write_toggle { // w = 0
                    self.tmp_vram_addr.set_coarse_x(data >> 3);
                    self.fine_x_scroll = data & 0b111;
                } else { // w = 1
                    self.tmp_vram_addr.set_coarse_y(data >> 3);
                    self.tmp_vram_addr.set_fine_y(data & 0b111);
                }

                self.write_toggle = !self.write_toggle;
            },
            6 => {
                if !self.write_toggle { // w = 0
                    self.tmp_vram_addr.0 = ((data as u16 & 0x003F) << 8) | (self.tmp_vram_addr.0 & 0x00FF);
                } else { // w = 1
                    self.tmp_vram_addr.0 = (self.tmp_vram_addr.0 & 0xFF00) | (data as u16);
                    self.vram_addr = self.tmp_vram_addr;
                }

                self.write_toggle = !self.write_toggle;
            },
            _ => {
                self.bus.borrow_mut().write(self.vram_addr.0 & 0x3FFF, data);
                self.increment_vram_addr();
            },
        }
    }
}
