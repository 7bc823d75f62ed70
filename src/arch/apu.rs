//! 2A03 audio unit.
//!
//! Only the parts the CPU can observe are modelled: the register file, the
//! length counters behind $4015 and the frame sequencer with its IRQ. The
//! channels are not synthesized, so the buffers handed to the [`AudioSink`]
//! hold silence, paced by the frame sequencer.

use tracing::{debug, trace};
use crate::arch::bus::MemoryMappedDevice;
use crate::arch::cpu::{InterruptGuard, InterruptLine};
use crate::arch::video::{AudioFormat, AudioSink};
use crate::arch::ClockDivider;

/// NTSC CPU clock.
const CPU_CLOCK_HZ: u64 = 1_789_773;
/// Buffers the sink should keep in flight.
pub const AUDIO_BUFFERS: usize = 4;

const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14,
    12, 16, 24, 18, 48, 20, 96, 22, 192, 24, 72, 26, 16, 28, 32, 30,
];

/// Frame sequencer half-frame and IRQ points, in CPU cycles since the
/// sequencer was reset.
const STEP_2: u32 = 14913;
const FRAME_IRQ: u32 = 29828;
const STEP_4: u32 = 29829;
const FOUR_STEP_END: u32 = 29830;
const FIVE_STEP_LAST: u32 = 37281;
const FIVE_STEP_END: u32 = 37282;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Channel {
    Pulse1,
    Pulse2,
    Triangle,
    Noise,
}
impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Pulse1, Channel::Pulse2, Channel::Triangle, Channel::Noise];

    /// First of the channel's four registers.
    fn base(self) -> u16 {
        match self {
            Channel::Pulse1 => 0x4000,
            Channel::Pulse2 => 0x4004,
            Channel::Triangle => 0x4008,
            Channel::Noise => 0x400C,
        }
    }

    /// Bit in $4000/$4004/$4008/$400C that freezes the length counter.
    fn halt_mask(self) -> u8 {
        match self {
            Channel::Triangle => 0x80,
            _ => 0x20,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct LengthCounter {
    enabled: bool,
    halted: bool,
    value: u8,
}
impl LengthCounter {
    fn clock(&mut self) {
        if !self.halted && self.value > 0 {
            self.value -= 1;
        }
    }

    fn load(&mut self, index: u8) {
        if self.enabled {
            self.value = LENGTH_TABLE[(index & 0x1F) as usize];
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.value = 0;
        }
    }
}

#[derive(Clone, Debug)]
struct FrameSequencer {
    five_step: bool,
    irq_inhibit: bool,
    cycle: u32,
    /// $4017 value and the CPU cycles left before it takes effect.
    pending: Option<(u8, u8)>,
}
impl Default for FrameSequencer {
    fn default() -> Self { Self {
        five_step: false,
        irq_inhibit: false,
        cycle: 0,
        pending: None,
    }}
}

/// Quarter-frame clocks only drive envelopes and the triangle's linear
/// counter, neither of which is modelled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct FrameEvents {
    half: bool,
    irq: bool,
}

impl FrameSequencer {
    fn tick(&mut self) -> FrameEvents {
        let mut events = FrameEvents::default();
        self.cycle += 1;

        match (self.five_step, self.cycle) {
            (_, STEP_2) | (true, FIVE_STEP_LAST) => events.half = true,
            (false, FRAME_IRQ) | (false, FOUR_STEP_END) => events.irq = true,
            (false, STEP_4) => {
                events.half = true;
                events.irq = true;
            },
            _ => (),
        }

        let end = if self.five_step { FIVE_STEP_END } else { FOUR_STEP_END };
        if self.cycle >= end {
            self.cycle = 0;
        }
        events.irq &= !self.irq_inhibit;

        events
    }
}

/// Converts CPU cycles into output samples, carrying the remainder so no time
/// is lost between buffers.
#[derive(Clone, Debug)]
struct SampleClock {
    format: AudioFormat,
    cycles: u64,
    remainder: u64,
}
impl SampleClock {
    fn new(format: AudioFormat) -> Self {
        Self { format, cycles: 0, remainder: 0 }
    }

    /// Samples owed since the last call.
    fn take(&mut self) -> usize {
        let scaled = self.cycles * self.format.sample_rate as u64 + self.remainder;
        self.cycles = 0;
        self.remainder = scaled % CPU_CLOCK_HZ;
        (scaled / CPU_CLOCK_HZ) as usize
    }
}

pub struct Apu {
    registers: [u8; 0x14],
    lengths: [LengthCounter; 4],
    dmc_enabled: bool,
    dmc_bytes_remaining: u16,
    sequencer: FrameSequencer,
    apu_clock: ClockDivider<2>,
    irq: InterruptLine,
    frame_irq: Option<InterruptGuard>,
    audio: Box<dyn AudioSink>,
    samples: SampleClock,
    buffer: Vec<u8>,
}
impl std::fmt::Debug for Apu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Apu")
         .field("lengths", &self.lengths.map(|l| l.value))
         .field("sequencer", &self.sequencer)
         .field("frame_irq", &self.frame_irq.is_some())
         .field("audio", &self.samples.format)
         .finish()
    }
}
impl Apu {
    pub const NAME: &'static str = "APU";

    pub fn new(irq: InterruptLine, mut audio: Box<dyn AudioSink>) -> Self {
        let format = audio.initialize(AUDIO_BUFFERS);
        debug!("audio output: {format:?}");

        Self {
            registers: [0u8; 0x14],
            lengths: [LengthCounter::default(); 4],
            dmc_enabled: false,
            dmc_bytes_remaining: 0,
            sequencer: FrameSequencer::default(),
            apu_clock: ClockDivider::new(0),
            irq,
            frame_irq: None,
            audio,
            samples: SampleClock::new(format),
            buffer: Vec::new(),
        }
    }

    /// Swap the audio sink. Samples owed to the old one are dropped.
    pub fn set_audio(&mut self, mut audio: Box<dyn AudioSink>) {
        let format = audio.initialize(AUDIO_BUFFERS);
        debug!("audio output: {format:?}");
        self.samples = SampleClock::new(format);
        self.audio = audio;
    }

    fn flush_audio(&mut self) {
        let samples = self.samples.take();
        if samples == 0 {
            return;
        }

        let format = self.samples.format;
        self.buffer.clear();
        self.buffer.resize(samples * format.bytes_per_frame(), format.silence());
        self.audio.enqueue_buffer(&self.buffer);
    }

    /// Silence every channel and restart the sequencer in its current mode.
    pub fn reset(&mut self) {
        self.lengths.iter_mut().for_each(|l| l.set_enabled(false));
        self.dmc_enabled = false;
        self.dmc_bytes_remaining = 0;
        self.sequencer.cycle = 0;
        self.sequencer.pending = None;
        self.frame_irq = None;
    }

    /// One CPU cycle.
    pub fn tick(&mut self) {
        self.apu_clock.tick();

        if let Some((value, delay)) = self.sequencer.pending {
            if delay == 0 {
                self.sequencer.pending = None;
                self.apply_frame_counter(value);
            } else {
                self.sequencer.pending = Some((value, delay - 1));
            }
        }

        self.samples.cycles += 1;
        let events = self.sequencer.tick();
        if events.half {
            self.lengths.iter_mut().for_each(LengthCounter::clock);
            self.flush_audio();
        }
        if events.irq && self.frame_irq.is_none() {
            trace!("APU frame IRQ");
            self.frame_irq = Some(self.irq.assert_scoped());
        }
    }

    /// $4017. Takes effect 3 or 4 CPU cycles later depending on where in the
    /// APU cycle the write lands.
    pub fn write_frame_counter(&mut self, data: u8) {
        self.sequencer.irq_inhibit = data & 0x40 != 0;
        if self.sequencer.irq_inhibit {
            self.frame_irq = None;
        }

        let delay = if self.apu_clock.counter == 0 { 2 } else { 3 };
        self.sequencer.pending = Some((data, delay));
    }

    fn apply_frame_counter(&mut self, data: u8) {
        self.sequencer.five_step = data & 0x80 != 0;
        self.sequencer.cycle = 0;
        if self.sequencer.five_step {
            self.lengths.iter_mut().for_each(LengthCounter::clock);
        }
    }

    pub fn length(&self, channel: Channel) -> u8 {
        self.lengths[channel as usize].value
    }

    pub fn frame_irq_pending(&self) -> bool {
        self.frame_irq.is_some()
    }

    fn read_status(&mut self) -> u8 {
        let mut status = 0;
        for (bit, length) in self.lengths.iter().enumerate() {
            if length.value > 0 {
                status |= 1 << bit;
            }
        }
        if self.dmc_bytes_remaining > 0 {
            status |= 0x10;
        }
        if self.frame_irq.take().is_some() {
            status |= 0x40;
        }

        status
    }

    fn write_status(&mut self, data: u8) {
        for (bit, length) in self.lengths.iter_mut().enumerate() {
            length.set_enabled(data & (1 << bit) != 0);
        }

        self.dmc_enabled = data & 0x10 != 0;
        if !self.dmc_enabled {
            self.dmc_bytes_remaining = 0;
        } else if self.dmc_bytes_remaining == 0 {
            self.dmc_bytes_remaining = (self.registers[0x13] as u16) * 16 + 1;
        }
    }
}

impl MemoryMappedDevice for Apu {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x4015 => self.read_status(),
            _ => 0,
        }
    }

    fn write(&mut self, addr: u16, data: u8) {
        match addr {
            0x4000..=0x4013 => {
                self.registers[(addr - 0x4000) as usize] = data;
                for (index, channel) in Channel::ALL.into_iter().enumerate() {
                    if addr == channel.base() {
                        self.lengths[index].halted = data & channel.halt_mask() != 0;
                    } else if addr == channel.base() + 3 {
                        self.lengths[index].load(data >> 3);
                    }
                }
            },
            0x4015 => self.write_status(data),
            0x4017 => self.write_frame_counter(data),
            _ => (),
        }
    }
}
