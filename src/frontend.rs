use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use minifb::{Key, Scale, Window, WindowOptions};
use tracing::{debug, info, warn};
use crate::arch::input::{Buttons, InputReader};
use crate::arch::video::{FrameSink, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::arch::{RunControl, RunExit};

/// 2C02 master palette as 0RGB.
pub const PALETTE: [u32; 64] = [
    0x626262, 0x001FB2, 0x2404C8, 0x5200B2, 0x730076, 0x800024, 0x730B00, 0x522800,
    0x244400, 0x005700, 0x005C00, 0x005324, 0x003C76, 0x000000, 0x000000, 0x000000,
    0xABABAB, 0x0D57FF, 0x4B30FF, 0x8A13FF, 0xBC08D6, 0xD21269, 0xC72E00, 0x9D5400,
    0x607B00, 0x209800, 0x00A300, 0x009942, 0x007DB4, 0x000000, 0x000000, 0x000000,
    0xFFFFFF, 0x53AEFF, 0x9085FF, 0xD365FF, 0xFF57FF, 0xFF5DCF, 0xFF7757, 0xFA9E00,
    0xBDC700, 0x7AE700, 0x43F611, 0x26EF7E, 0x2CD5F6, 0x4E4E4E, 0x000000, 0x000000,
    0xFFFFFF, 0xB6E1FF, 0xCED1FF, 0xE9C3FF, 0xFFBCFF, 0xFFBDF4, 0xFFC6C3, 0xFFD59A,
    0xE9E681, 0xCEF481, 0xB6FB9A, 0xA9FAC3, 0xA9F0F4, 0xB8B8B8, 0x000000, 0x000000,
];

/// Finished frames waiting for the window. Anything beyond this is dropped.
const FRAME_QUEUE: usize = 2;

/// Converts dots to RGB and hands complete frames to the UI thread without
/// ever blocking the emulation.
pub struct ChannelSink {
    width: usize,
    pixels: Vec<u32>,
    frames: SyncSender<Vec<u32>>,
}
impl ChannelSink {
    pub fn new() -> (Self, Receiver<Vec<u32>>) {
        let (tx, rx) = sync_channel(FRAME_QUEUE);
        let sink = Self {
            width: SCREEN_WIDTH,
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            frames: tx,
        };

        (sink, rx)
    }
}
impl FrameSink for ChannelSink {
    fn initialize(&mut self, width: usize, height: usize, _palette_size: usize) {
        self.width = width;
        self.pixels = vec![0; width * height];
    }

    fn set_pixel(&mut self, x: usize, y: usize, palette_index: u8) {
        if let Some(pixel) = self.pixels.get_mut(y * self.width + x) {
            *pixel = PALETTE[(palette_index & 0x3F) as usize];
        }
    }

    fn present(&mut self) {
        match self.frames.try_send(self.pixels.clone()) {
            Ok(()) => (),
            Err(TrySendError::Full(_)) => debug!("window is behind, dropping frame"),
            Err(TrySendError::Disconnected(_)) => (),
        }
    }
}

/// Controller 1 state written by the UI thread and read at each strobe.
#[derive(Clone, Debug, Default)]
pub struct KeyboardInput(Arc<AtomicU8>);
impl KeyboardInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, buttons: Buttons) {
        self.0.store(buttons.bits(), Ordering::Relaxed);
    }
}
impl InputReader for KeyboardInput {
    fn poll(&mut self, controller: usize) -> Buttons {
        match controller {
            0 => Buttons::from_bits_truncate(self.0.load(Ordering::Relaxed)),
            _ => Buttons::empty(),
        }
    }
}

const KEYMAP: [(Key, Buttons); 8] = [
    (Key::X, Buttons::A),
    (Key::Z, Buttons::B),
    (Key::RightShift, Buttons::Select),
    (Key::Enter, Buttons::Start),
    (Key::Up, Buttons::Up),
    (Key::Down, Buttons::Down),
    (Key::Left, Buttons::Left),
    (Key::Right, Buttons::Right),
];

fn buttons_held(window: &Window) -> Buttons {
    KEYMAP.iter()
        .filter(|(key, _)| window.is_key_down(*key))
        .fold(Buttons::empty(), |held, (_, button)| held | *button)
}

pub fn window_scale(scale: u8) -> Scale {
    match scale {
        1 => Scale::X1,
        2 => Scale::X2,
        4 => Scale::X4,
        8 => Scale::X8,
        other => {
            warn!("unsupported scale {other}, using 2");
            Scale::X2
        },
    }
}

/// Show frames until the window closes or the emulation thread exits, then
/// stop the emulation and collect its exit.
pub fn run_window(
    title: &str,
    scale: Scale,
    frames: Receiver<Vec<u32>>,
    input: KeyboardInput,
    control: RunControl,
    emulation: JoinHandle<RunExit>,
) -> Result<Option<RunExit>, minifb::Error> {
    let shown = show_frames(title, scale, frames, &input, &emulation);
    info!("window closed");
    control.stop();
    shown?;

    Ok(emulation.join().ok())
}

fn show_frames(
    title: &str,
    scale: Scale,
    frames: Receiver<Vec<u32>>,
    input: &KeyboardInput,
    emulation: &JoinHandle<RunExit>,
) -> Result<(), minifb::Error> {
    let mut window = Window::new(title, SCREEN_WIDTH, SCREEN_HEIGHT, WindowOptions {
        resize: false,
        scale,
        ..WindowOptions::default()
    })?;
    window.set_target_fps(60);

    let mut buffer = vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT];
    while window.is_open() && !window.is_key_down(Key::Escape) && !emulation.is_finished() {
        input.set(buttons_held(&window));
        if let Some(frame) = frames.try_iter().last() {
            buffer = frame;
        }
        window.update_with_buffer(&buffer, SCREEN_WIDTH, SCREEN_HEIGHT)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_drops_frames_instead_of_blocking() {
        let (mut sink, frames) = ChannelSink::new();
        sink.initialize(SCREEN_WIDTH, SCREEN_HEIGHT, 64);
        sink.set_pixel(3, 1, 0x30);
        sink.set_pixel(4, 1, 0x41);
        for _ in 0..FRAME_QUEUE + 3 {
            sink.present();
        }

        let received: Vec<_> = frames.try_iter().collect();
        assert_eq!(received.len(), FRAME_QUEUE);
        assert_eq!(received[0][SCREEN_WIDTH + 3], 0xFFFFFF);
        assert_eq!(received[0][SCREEN_WIDTH + 4], PALETTE[0x01]);

        drop(frames);
        sink.present();
    }

    #[test]
    fn keyboard_state_reaches_controller_one() {
        let keyboard = KeyboardInput::new();
        let mut reader = keyboard.clone();
        keyboard.set(Buttons::Start | Buttons::Left);
        assert_eq!(reader.poll(0), Buttons::Start | Buttons::Left);
        assert_eq!(reader.poll(1), Buttons::empty());
    }
}
