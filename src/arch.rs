use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::info;
use crate::arch::apu::Apu;
use crate::arch::bus::{MemoryBus, UNMAPPED_READ};
use crate::arch::cartridge::Cartridge;
use crate::arch::cpu::disasm::{disassemble, Disassembly};
use crate::arch::cpu::{CpuFault, InterruptKind, Ricoh2A03};
use crate::arch::error::NesError;
use crate::arch::input::{Controllers, InputReader};
use crate::arch::mappers::Buses;
use crate::arch::ppu::Ricoh2C02;
use crate::arch::ram::Ram;
use crate::arch::rom::open_rom;
use crate::arch::video::{AudioSink, FrameSink};

pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod cpu;
pub mod error;
pub mod input;
pub mod mappers;
pub mod nametable;
pub mod ppu;
pub mod ram;
pub mod rom;
pub mod video;

/// PPU dots per CPU cycle.
pub const DOTS_PER_CYCLE: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NesConfig {
    /// Hold each frame to 1/60 s.
    pub throttle: bool,
}
impl Default for NesConfig {
    fn default() -> Self { Self {
        throttle: true,
    }}
}

#[derive(Debug, Default)]
struct RunState {
    stop: AtomicBool,
    running: Mutex<bool>,
    exited: Condvar,
}

/// Stops a running [`Nes`] from any thread.
#[derive(Clone, Debug, Default)]
pub struct RunControl(Arc<RunState>);
impl RunControl {
    /// Ask the run loop to exit after the current step. Never blocks, so it is
    /// safe to call from a breakpoint callback on the emulation thread.
    pub fn request_stop(&self) {
        self.0.stop.store(true, Ordering::Release);
    }

    /// Request a stop and wait until the run loop has exited. Must not be
    /// called from the emulation thread.
    pub fn stop(&self) {
        self.request_stop();
        let mut running = self.0.running.lock().unwrap_or_else(PoisonError::into_inner);
        while *running {
            running = self.0.exited.wait(running).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.0.stop.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        *self.0.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> RunningGuard {
        *self.0.running.lock().unwrap_or_else(PoisonError::into_inner) = true;
        RunningGuard(self.clone())
    }
}

/// Marks the loop as exited and wakes `stop()` callers, even if a step
/// panics.
struct RunningGuard(RunControl);
impl Drop for RunningGuard {
    fn drop(&mut self) {
        let state = &self.0.0;
        state.stop.store(false, Ordering::Release);
        *state.running.lock().unwrap_or_else(PoisonError::into_inner) = false;
        state.exited.notify_all();
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunExit {
    Stopped,
    Halted(CpuFault),
}

/// CPU state at an instruction boundary, printed like a nestest.log line.
#[derive(Clone, Debug)]
pub struct InstructionTrace {
    pub disassembly: Option<Disassembly>,
    /// Effective address and value annotations, empty when there are none.
    pub detail: String,
    pub pc: u16,
    pub acc: u8,
    pub x: u8,
    pub y: u8,
    pub status: u8,
    pub sp: u8,
    pub scanline: i16,
    pub dot: u16,
    pub cyc: u64,
}
impl Display for InstructionTrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match &self.disassembly {
            Some(disassembly) if self.detail.is_empty() => disassembly.to_string(),
            Some(disassembly) => format!("{disassembly} {}", self.detail),
            None => format!("{:04X}  ???", self.pc),
        };
        write!(f, "{text:<47} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} PPU:{:3},{:3} CYC:{}",
            self.acc, self.x, self.y, self.status, self.sp, self.scanline, self.dot, self.cyc)
    }
}

/// Borrowed view of one named part of the console.
#[derive(Debug)]
pub enum Component<'a> {
    Bus(&'a Rc<RefCell<MemoryBus>>),
    Cpu(&'a Ricoh2A03),
    Ppu(&'a Rc<RefCell<Ricoh2C02>>),
    Apu(&'a Rc<RefCell<Apu>>),
    Controllers(&'a Rc<RefCell<Controllers>>),
    Cartridge(&'a Cartridge),
}

pub const CPU_BUS: &str = "CPU Bus";
pub const PPU_BUS: &str = "PPU Bus";

/// The console: both buses and everything attached to them.
///
/// Built once and kept for the life of the process. Cartridges come and go
/// through [`Nes::load_file`]; the rest of the graph stays wired. Nothing in
/// here is `Send`, so the whole thing lives on the emulation thread and only
/// [`RunControl`] crosses threads.
pub struct Nes {
    cpu_bus: Rc<RefCell<MemoryBus>>,
    ppu_bus: Rc<RefCell<MemoryBus>>,
    cpu: Ricoh2A03,
    ppu: Rc<RefCell<Ricoh2C02>>,
    apu: Rc<RefCell<Apu>>,
    controllers: Rc<RefCell<Controllers>>,
    cartridge: Cartridge,
    config: NesConfig,
    control: RunControl,
}
impl std::fmt::Debug for Nes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nes")
         .field("cpu", &self.cpu)
         .field("ppu", &self.ppu.borrow().pos())
         .field("cartridge", &self.cartridge)
         .field("config", &self.config)
         .finish()
    }
}
impl Nes {
    pub fn new(
        config: NesConfig,
        sink: Box<dyn FrameSink>,
        audio: Box<dyn AudioSink>,
        input: Box<dyn InputReader>,
    ) -> Result<Self, NesError> {
        let cpu_bus = Rc::new(RefCell::new(MemoryBus::new(CPU_BUS, 16)));
        let ppu_bus = Rc::new(RefCell::new(MemoryBus::new(PPU_BUS, 14)));
        let cpu = Ricoh2A03::new();

        let ppu = Rc::new(RefCell::new(Ricoh2C02::new(ppu_bus.clone(), cpu.interrupt(InterruptKind::Nmi), sink, config.throttle)?));
        let apu = Rc::new(RefCell::new(Apu::new(cpu.interrupt(InterruptKind::Irq), audio)));
        let controllers = Rc::new(RefCell::new(Controllers::new(input, apu.clone())));

        {
            let mut bus = cpu_bus.borrow_mut();
            bus.register_mapped_device(Rc::new(RefCell::new(Ram::new(0x800))), 0x0000, 0x07FF);
            bus.set_mirroring_range(0x0000, 0x07FF, 0x0800, 0x1FFF)?;
            bus.register_mapped_device(ppu.clone(), 0x2000, 0x2007);
            bus.set_mirroring_range(0x2000, 0x2007, 0x2008, 0x3FFF)?;
            bus.register_mapped_device(apu.clone(), 0x4000, 0x4013);
            bus.register_mapped_device(Rc::new(RefCell::new(cpu.dma_port())), 0x4014, 0x4014);
            bus.register_mapped_device(apu.clone(), 0x4015, 0x4015);
            bus.register_mapped_device(controllers.clone(), 0x4016, 0x4017);
        }

        Ok(Self {
            cpu_bus,
            ppu_bus,
            cpu,
            ppu,
            apu,
            controllers,
            cartridge: Cartridge::new(),
            config,
            control: RunControl::default(),
        })
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), NesError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        info!("loading {}", path.display());

        self.load_bytes(&bytes)
    }

    /// Replace the cartridge and reset. On error the previous cartridge stays
    /// in place and the console is ready for another load.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), NesError> {
        let rom = open_rom(bytes)?;
        let buses = Buses {
            cpu: self.cpu_bus.clone(),
            ppu: self.ppu_bus.clone(),
            irq: self.cpu.interrupt(InterruptKind::Irq),
        };
        self.cartridge.insert(rom.as_ref(), &buses)?;
        self.reset();

        Ok(())
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.ppu.borrow_mut().reset();
        self.apu.borrow_mut().reset();
    }

    /// One CPU step, then the PPU and APU catch up on the cycles it took.
    pub fn step(&mut self) -> Result<u8, CpuFault> {
        let cycles = self.cpu.step(&mut self.cpu_bus.borrow_mut())?;

        let mut ppu = self.ppu.borrow_mut();
        let mut apu = self.apu.borrow_mut();
        for _ in 0..cycles {
            for _ in 0..DOTS_PER_CYCLE {
                ppu.tick();
            }
            apu.tick();
        }

        Ok(cycles)
    }

    /// Step until stopped or the CPU halts.
    pub fn run(&mut self) -> RunExit {
        let _running = self.control.enter();

        loop {
            if self.control.stop_requested() {
                info!("emulation stopped at {:?}", self.ppu.borrow().pos());
                return RunExit::Stopped;
            }
            if let Err(fault) = self.step() {
                info!("emulation halted: {fault}");
                return RunExit::Halted(fault);
            }
        }
    }

    pub fn run_control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn config(&self) -> NesConfig {
        self.config
    }

    pub fn set_throttle(&mut self, throttle: bool) {
        self.config.throttle = throttle;
        self.ppu.borrow_mut().set_throttle(throttle);
    }

    pub fn set_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.ppu.borrow_mut().set_sink(sink);
    }

    pub fn set_audio(&mut self, audio: Box<dyn AudioSink>) {
        self.apu.borrow_mut().set_audio(audio);
    }

    pub fn set_input(&mut self, input: Box<dyn InputReader>) {
        self.controllers.borrow_mut().set_reader(input);
    }

    pub fn cpu(&self) -> &Ricoh2A03 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Ricoh2A03 {
        &mut self.cpu
    }

    pub fn cpu_bus(&self) -> &Rc<RefCell<MemoryBus>> {
        &self.cpu_bus
    }

    pub fn ppu(&self) -> &Rc<RefCell<Ricoh2C02>> {
        &self.ppu
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    /// Snapshot for a trace log. Memory is peeked, so breakpoints don't fire,
    /// and the I/O range between $2000 and $5FFF is never touched.
    pub fn trace(&self) -> InstructionTrace {
        let pc = self.cpu.pc;
        let mut bus = self.cpu_bus.borrow_mut();
        let mut peek = |addr: u16| match addr {
            0x2000..=0x5FFF => None,
            _ => bus.peek(addr),
        };
        let bytes = [0, 1, 2].map(|offset| peek(pc.wrapping_add(offset)).unwrap_or(UNMAPPED_READ));
        let disassembly = disassemble(&bytes, pc);
        let detail = disassembly.as_ref()
            .map(|d| d.detail(self.cpu.x, self.cpu.y, &mut peek))
            .unwrap_or_default();
        let ppu = self.ppu.borrow().pos();

        InstructionTrace {
            disassembly,
            detail,
            pc,
            acc: self.cpu.acc,
            x: self.cpu.x,
            y: self.cpu.y,
            status: self.cpu.status.bits(),
            sp: self.cpu.sp.0,
            scanline: ppu.scanline,
            dot: ppu.cycle,
            cyc: self.cpu.cyc,
        }
    }

    pub fn components(&self) -> Vec<(&'static str, Component<'_>)> {
        vec![
            (CPU_BUS, Component::Bus(&self.cpu_bus)),
            (PPU_BUS, Component::Bus(&self.ppu_bus)),
            (Ricoh2A03::NAME, Component::Cpu(&self.cpu)),
            (Ricoh2C02::NAME, Component::Ppu(&self.ppu)),
            (Apu::NAME, Component::Apu(&self.apu)),
            (Controllers::NAME, Component::Controllers(&self.controllers)),
            (Cartridge::NAME, Component::Cartridge(&self.cartridge)),
        ]
    }

    pub fn find_component(&self, name: &str) -> Option<Component<'_>> {
        self.components().into_iter().find(|(n, _)| *n == name).map(|(_, c)| c)
    }
}

/// Divides an input clock by `N`.
#[derive(Clone, Debug)]
pub struct ClockDivider<const N: usize> {
    pub counter: usize,
}
impl<const N: usize> ClockDivider<N> {
    pub fn new(initial: usize) -> Self { Self {
        counter: initial % N,
    }}

    /// Returns `true` on every `N`th call.
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter == N {
            self.counter = 0;

            true
        } else {
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::bus::{Access, BreakpointKind};
    use crate::arch::input::NoInput;
    use crate::arch::rom::tests::ines;
    use crate::arch::rom::RomError;
    use crate::arch::video::{FrameBuffer, NullAudio, NullSink};

    /// NROM image that spins on `JMP $8000`, with every vector pointing at it.
    pub fn looping_rom(program: &[u8]) -> Vec<u8> {
        let mut image = ines(0, 1, 1, 0);
        let prg = 16;
        image[prg..prg + 0x4000].fill(0xEA);
        image[prg..prg + program.len()].copy_from_slice(program);
        let jmp = prg + program.len();
        image[jmp..jmp + 3].copy_from_slice(&[0x4C, 0x00, 0x80]);
        for vector in [0x3FFA, 0x3FFC, 0x3FFE] {
            image[prg + vector] = 0x00;
            image[prg + vector + 1] = 0x80;
        }
        image
    }

    fn console() -> Nes {
        Nes::new(NesConfig { throttle: false }, Box::new(NullSink), Box::new(NullAudio), Box::new(NoInput)).unwrap()
    }

    #[test]
    fn reset_lands_on_the_vector() {
        let mut nes = console();
        nes.load_bytes(&looping_rom(&[])).unwrap();
        assert_eq!(nes.step(), Ok(7));
        assert_eq!(nes.cpu().pc, 0x8000);
        assert_eq!(nes.cpu().cyc, 7);
        let pos = nes.ppu().borrow().pos();
        assert_eq!((pos.scanline, pos.cycle), (0, 21));
    }

    #[test]
    fn ppu_runs_three_dots_per_cycle() {
        let mut nes = console();
        nes.load_bytes(&looping_rom(&[])).unwrap();
        let mut cycles = 0u64;
        for _ in 0..1000 {
            cycles += nes.step().unwrap() as u64;
        }
        let pos = nes.ppu().borrow().pos();
        let dots = (pos.scanline as u64) * 341 + pos.cycle as u64;
        assert_eq!(dots, cycles * 3);
        assert_eq!(nes.cpu().cyc, cycles);
    }

    #[test]
    fn failed_load_can_be_retried() {
        let mut nes = console();
        let err = nes.load_bytes(b"not a rom at all").unwrap_err();
        assert!(matches!(err, NesError::Rom(RomError::BadMagic)));
        assert!(!nes.cartridge().is_loaded());

        let err = nes.load_bytes(&ines(9, 1, 1, 0)).unwrap_err();
        assert!(matches!(err, NesError::UnsupportedMapper { id: 9 }));

        nes.load_bytes(&looping_rom(&[])).unwrap();
        for _ in 0..10 {
            nes.step().unwrap();
        }
        assert!((0x8000..0x8003).contains(&nes.cpu().pc));

        let err = nes.load_bytes(&ines(0, 4, 1, 0)).unwrap_err();
        assert!(matches!(err, NesError::SegmentTooLarge { .. }));
        assert_eq!(nes.cartridge().mapper_id(), Some(0));
        for _ in 0..10 {
            nes.step().unwrap();
        }
        assert!((0x8000..0x8003).contains(&nes.cpu().pc));

        assert!(nes.load_file("/nonexistent/game.nes").is_err());
        assert!(nes.cartridge().is_loaded());
    }

    #[test]
    fn wram_is_mirrored() {
        let mut nes = console();
        // LDA #$5A; STA $0801
        nes.load_bytes(&looping_rom(&[0xA9, 0x5A, 0x8D, 0x01, 0x08])).unwrap();
        for _ in 0..3 {
            nes.step().unwrap();
        }
        assert_eq!(nes.cpu_bus().borrow_mut().read(0x1801), 0x5A);
    }

    #[test]
    fn breakpoint_can_stop_the_loop() {
        let mut nes = console();
        // LDA #$01; STA $00F8
        nes.load_bytes(&looping_rom(&[0xA9, 0x01, 0x85, 0xF8])).unwrap();

        let control = nes.run_control();
        let id = nes.cpu_bus().borrow_mut().create_breakpoint(
            BreakpointKind::Memory { address: 0x00F8, access: Access::WRITE },
            move |_| control.request_stop(),
        );
        nes.cpu_bus().borrow_mut().set_breakpoint_enabled(id, true);

        assert_eq!(nes.run(), RunExit::Stopped);
        assert_eq!(nes.cpu_bus().borrow_mut().read(0x00F8), 1);
        assert!(!nes.run_control().is_running());
    }

    #[test]
    fn unknown_opcode_ends_the_run() {
        let mut nes = console();
        nes.load_bytes(&looping_rom(&[0x02])).unwrap();
        assert_eq!(nes.run(), RunExit::Halted(CpuFault::UnknownOpcode { opcode: 0x02, pc: 0x8000 }));

        nes.reset();
        assert!(nes.step().is_ok());
    }

    #[test]
    fn stop_waits_for_the_loop_to_exit() {
        let (tx, rx) = std::sync::mpsc::channel();
        let emulation = std::thread::spawn(move || {
            let mut nes = console();
            nes.load_bytes(&looping_rom(&[])).unwrap();
            tx.send(nes.run_control()).unwrap();
            nes.run()
        });

        let control = rx.recv().unwrap();
        while !control.is_running() {
            std::thread::yield_now();
        }
        control.stop();
        assert!(!control.is_running());
        assert_eq!(emulation.join().unwrap(), RunExit::Stopped);
    }

    #[test]
    fn renders_frames_into_the_sink() {
        let frames = Rc::new(RefCell::new(FrameBuffer::new()));
        let mut nes = Nes::new(NesConfig { throttle: false }, Box::new(frames.clone()), Box::new(NullAudio), Box::new(NoInput)).unwrap();
        nes.load_bytes(&looping_rom(&[])).unwrap();
        while frames.borrow().frames() < 2 {
            nes.step().unwrap();
        }
        assert_eq!(nes.ppu().borrow().frame(), 2);
    }

    #[test]
    fn components_are_found_by_name() {
        let nes = console();
        for name in [CPU_BUS, PPU_BUS, "Ricoh 2A03 CPU", "Ricoh 2C02 PPU", "APU", "Controllers", "Cartridge"] {
            assert!(nes.find_component(name).is_some(), "{name}");
        }
        assert!(matches!(nes.find_component(PPU_BUS), Some(Component::Bus(bus)) if bus.borrow().size() == 0x4000));
        assert!(nes.find_component("SID").is_none());
    }

    #[test]
    fn trace_line_layout() {
        let mut nes = console();
        nes.load_bytes(&looping_rom(&[])).unwrap();
        nes.step().unwrap();
        let line = nes.trace().to_string();
        assert!(line.starts_with("8000  4C 00 80  JMP $8000 "), "{line}");
        assert!(line.ends_with("A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7"), "{line}");
    }

    #[test]
    fn trace_annotates_operands() {
        let mut nes = console();
        // LDA #$5A; STA $0200; LDX #$03; LDA $01FD,X; STA $2000
        nes.load_bytes(&looping_rom(&[0xA9, 0x5A, 0x8D, 0x00, 0x02, 0xA2, 0x03, 0xBD, 0xFD, 0x01, 0x8D, 0x00, 0x20])).unwrap();
        nes.step().unwrap();
        nes.step().unwrap();
        assert!(nes.trace().to_string().starts_with("8002  8D 00 02  STA $0200 = 00 "));
        nes.step().unwrap();
        nes.step().unwrap();
        assert!(nes.trace().to_string().starts_with("8007  BD FD 01  LDA $01FD,X @ 0200 = 5A "));
        nes.step().unwrap();
        let trace = nes.trace();
        assert_eq!(trace.detail, "");
        assert!(trace.to_string().starts_with("800A  8D 00 20  STA $2000 "));
    }

    #[test]
    fn clock_divider_wraps() {
        let mut divider = ClockDivider::<2>::new(0);
        assert!(!divider.tick());
        assert!(divider.tick());
        assert!(!divider.tick());
    }
}
