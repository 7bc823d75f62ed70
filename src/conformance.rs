//! ROM-driven checks against community test suites. The fixtures are not
//! redistributed; drop them under `testroms/` and run with `--ignored`.

use std::cell::Cell;
use std::num::Wrapping;
use std::rc::Rc;
use std::time::Duration;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use walkdir::WalkDir;
use crate::arch::bus::{Access, BreakpointKind};
use crate::arch::cpu::tests::{booted, flat_bus};
use crate::arch::cpu::{StatusReg, INSTRUCTIONS};
use crate::arch::input::NoInput;
use crate::arch::video::{NullAudio, NullSink};
use crate::arch::{Nes, NesConfig, RunExit};

fn fixtures(dir: &str) -> Utf8PathBuf {
    Utf8Path::new(env!("CARGO_MANIFEST_DIR")).join("testroms").join(dir)
}

fn files_with_extension(dir: &Utf8Path, extension: &str) -> Vec<Utf8PathBuf> {
    let mut files: Vec<Utf8PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
        .filter(|path| path.extension() == Some(extension))
        .collect();
    files.sort();
    files
}

fn console() -> Nes {
    Nes::new(NesConfig { throttle: false }, Box::new(NullSink), Box::new(NullAudio), Box::new(NoInput)).unwrap()
}

/// The comparable columns of one nestest.log line.
#[derive(Debug, PartialEq, Eq)]
struct LogLine {
    pc: u16,
    bytes: Vec<u8>,
    mnemonic: String,
    operand: String,
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    sp: u8,
    scanline: i16,
    dot: u16,
    cyc: u64,
}
impl LogLine {
    fn parse(line: &str) -> Self {
        let hex8 = |field: &str, name: &str| {
            let start = field.find(name).unwrap() + name.len();
            u8::from_str_radix(&field[start..start + 2], 16).unwrap()
        };
        let registers_at = line.find(" A:").unwrap();
        let registers = &line[registers_at..];
        let mut text = line[15..registers_at].split_whitespace();
        let ppu = &registers[registers.find("PPU:").unwrap() + 4..registers.find(" CYC:").unwrap()];
        let (scanline, dot) = ppu.split_once(',').unwrap();

        Self {
            pc: u16::from_str_radix(&line[..4], 16).unwrap(),
            bytes: line[6..14].split_whitespace().map(|b| u8::from_str_radix(b, 16).unwrap()).collect(),
            mnemonic: text.next().unwrap().to_string(),
            operand: text.next().unwrap_or("").to_string(),
            a: hex8(registers, "A:"),
            x: hex8(registers, "X:"),
            y: hex8(registers, "Y:"),
            p: hex8(registers, "P:"),
            sp: hex8(registers, "SP:"),
            scanline: scanline.trim().parse().unwrap(),
            dot: dot.trim().parse().unwrap(),
            cyc: registers[registers.find("CYC:").unwrap() + 4..].trim().parse().unwrap(),
        }
    }
}

#[test]
fn log_line_parsing() {
    let line = LogLine::parse("C72A  D0 E0     BNE $C70C                       A:00 X:00 Y:00 P:26 SP:FB PPU:241,100 CYC:27");
    assert_eq!(line.pc, 0xC72A);
    assert_eq!(line.bytes, vec![0xD0, 0xE0]);
    assert_eq!(line.mnemonic, "BNE");
    assert_eq!(line.operand, "$C70C");
    assert_eq!((line.p, line.sp), (0x26, 0xFB));
    assert_eq!((line.scanline, line.dot, line.cyc), (241, 100, 27));

    let line = LogLine::parse("C6BD  04 A9    *NOP $A9 = 00                    A:AA X:97 Y:4E P:EF SP:F5 PPU:  0, 30 CYC:14580");
    assert_eq!(line.mnemonic, "*NOP");
    assert_eq!(line.operand, "$A9");
    assert_eq!((line.scanline, line.dot), (0, 30));

    let line = LogLine::parse("C5F5  0A        ASL A                           A:80 X:00 Y:00 P:A4 SP:FB PPU:  0, 54 CYC:18");
    assert_eq!((line.mnemonic.as_str(), line.operand.as_str()), ("ASL", "A"));

    let line = LogLine::parse("C5F7  EA        NOP                             A:00 X:00 Y:00 P:27 SP:FB PPU:  0, 60 CYC:20");
    assert_eq!(line.operand, "");
}

#[test]
#[ignore = "needs testroms/nestest.nes and nestest.log"]
fn nestest() {
    let dir = fixtures("");
    let rom = std::fs::read(dir.join("nestest.nes")).unwrap();
    let log = std::fs::read_to_string(dir.join("nestest.log")).unwrap();

    let mut nes = console();
    nes.load_bytes(&rom).unwrap();
    nes.step().unwrap();
    // automated mode starts at $C000 instead of the reset vector
    nes.cpu_mut().pc = 0xC000;

    for (number, expected) in log.lines().enumerate() {
        let actual = nes.trace().to_string();
        assert_eq!(LogLine::parse(&actual), LogLine::parse(expected), "line {}\n  got: {actual}\n want: {expected}", number + 1);
        nes.step().unwrap();
    }

    let mut bus = nes.cpu_bus().borrow_mut();
    assert_eq!((bus.read(0x0002), bus.read(0x0003)), (0, 0));
}

#[test]
#[ignore = "needs testroms/sprite_hit/*.nes"]
fn sprite_hit_suite() {
    let roms = files_with_extension(&fixtures("sprite_hit"), "nes");
    assert!(!roms.is_empty());

    for path in roms {
        let mut nes = console();
        nes.load_bytes(&std::fs::read(&path).unwrap()).unwrap();

        let result = Rc::new(Cell::new(None));
        let control = nes.run_control();
        let id = nes.cpu_bus().borrow_mut().create_breakpoint(
            BreakpointKind::Memory { address: 0x00F8, access: Access::WRITE },
            {
                let result = result.clone();
                move |hit| {
                    if let Some(value) = hit.value.filter(|v| *v != 0) {
                        result.set(Some(value));
                        control.request_stop();
                    }
                }
            },
        );
        nes.cpu_bus().borrow_mut().set_breakpoint_enabled(id, true);

        let watchdog = nes.run_control();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(30));
            watchdog.request_stop();
        });

        assert_eq!(nes.run(), RunExit::Stopped, "{path}");
        assert_eq!(result.get(), Some(1), "{path}");
    }
}

#[derive(Debug, Deserialize)]
struct CpuState {
    pc: u16,
    s: u8,
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    ram: Vec<(u16, u8)>,
}

#[derive(Debug, Deserialize)]
struct CpuCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    expected: CpuState,
    cycles: Vec<(u16, u8, String)>,
}

/// Opcodes whose results depend on analog effects and differ between chips.
const UNSTABLE: [u8; 7] = [0x8B, 0xAB, 0x93, 0x9B, 0x9C, 0x9E, 0x9F];

#[test]
#[ignore = "needs testroms/nes6502/*.json from SingleStepTests"]
fn single_step_cases() {
    let files = files_with_extension(&fixtures("nes6502"), "json");
    assert!(!files.is_empty());

    for path in files {
        let mut json = std::fs::read(&path).unwrap();
        let cases: Vec<CpuCase> = simd_json::serde::from_slice(&mut json).unwrap();

        for case in cases {
            let opcode = case.initial.ram.iter()
                .find(|(addr, _)| *addr == case.initial.pc)
                .map(|(_, value)| *value)
                .unwrap_or(0);
            if INSTRUCTIONS[opcode as usize].is_none() || UNSTABLE.contains(&opcode) {
                continue;
            }

            let (mut bus, _ram) = flat_bus(0x0000, &[]);
            let mut cpu = booted(&mut bus);
            for (addr, value) in &case.initial.ram {
                bus.write(*addr, *value);
            }
            cpu.pc = case.initial.pc;
            cpu.sp = Wrapping(case.initial.s);
            cpu.acc = case.initial.a;
            cpu.x = case.initial.x;
            cpu.y = case.initial.y;
            cpu.status = StatusReg::from_bits_retain(case.initial.p);

            let cycles = cpu.step(&mut bus).unwrap();

            let name = format!("{path}: {}", case.name);
            assert_eq!(cycles as usize, case.cycles.len(), "{name}: cycles");
            assert_eq!(cpu.pc, case.expected.pc, "{name}: pc");
            assert_eq!(cpu.sp.0, case.expected.s, "{name}: sp");
            assert_eq!(cpu.acc, case.expected.a, "{name}: a");
            assert_eq!(cpu.x, case.expected.x, "{name}: x");
            assert_eq!(cpu.y, case.expected.y, "{name}: y");
            assert_eq!(cpu.status.bits() | 0x30, case.expected.p | 0x30, "{name}: p");
            for (addr, value) in &case.expected.ram {
                assert_eq!(bus.read(*addr), *value, "{name}: ram {addr:#06X}");
            }
        }
    }
}
