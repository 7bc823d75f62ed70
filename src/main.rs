use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use crate::arch::video::NullAudio;
use crate::arch::{Nes, NesConfig, RunExit};
use crate::frontend::{ChannelSink, KeyboardInput};

pub mod arch;
mod frontend;

#[cfg(test)]
mod conformance;

#[derive(Parser, Debug)]
#[command(version, about = "Cycle-accurate NES emulator")]
struct Args {
    /// Path to an iNES or NES 2.0 ROM
    rom: PathBuf,

    /// Run as fast as possible instead of at 60 frames per second
    #[arg(long)]
    no_throttle: bool,

    /// Window scale factor (1, 2, 4 or 8)
    #[arg(long, default_value_t = 2)]
    scale: u8,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log)))
        .init();

    let config = NesConfig { throttle: !args.no_throttle };
    let (sink, frames) = ChannelSink::new();
    let input = KeyboardInput::new();

    // the console is !Send, so it is built on the thread that runs it
    let (ready_tx, ready_rx) = mpsc::channel();
    let rom = args.rom.clone();
    let reader = input.clone();
    let emulation = std::thread::Builder::new()
        .name("emulation".into())
        .spawn(move || {
            let nes = Nes::new(config, Box::new(sink), Box::new(NullAudio), Box::new(reader))
                .and_then(|mut nes| nes.load_file(&rom).map(|_| nes));
            match nes {
                Ok(mut nes) => {
                    let _ = ready_tx.send(Ok(nes.run_control()));
                    nes.run()
                },
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    RunExit::Stopped
                },
            }
        });
    let emulation = match emulation {
        Ok(handle) => handle,
        Err(err) => {
            error!("failed to start emulation thread: {err}");
            return ExitCode::FAILURE;
        },
    };

    let control = match ready_rx.recv() {
        Ok(Ok(control)) => control,
        Ok(Err(err)) => {
            error!("failed to load {}: {err}", args.rom.display());
            return ExitCode::FAILURE;
        },
        Err(_) => {
            error!("emulation thread exited during startup");
            return ExitCode::FAILURE;
        },
    };

    let title = args.rom.file_stem()
        .map(|stem| format!("famicore - {}", stem.to_string_lossy()))
        .unwrap_or_else(|| "famicore".to_string());
    let scale = frontend::window_scale(args.scale);

    match frontend::run_window(&title, scale, frames, input, control, emulation) {
        Ok(Some(RunExit::Halted(fault))) => {
            error!("{fault}");
            ExitCode::FAILURE
        },
        Ok(Some(RunExit::Stopped)) => {
            info!("stopped");
            ExitCode::SUCCESS
        },
        Ok(None) => {
            error!("emulation thread panicked");
            ExitCode::FAILURE
        },
        Err(err) => {
            error!("window error: {err}");
            ExitCode::FAILURE
        },
    }
}
