use std::fmt::{Display, Formatter};
use super::{AddrMode, Instruction, INSTRUCTIONS};

/// One decoded instruction, formatted the way nestest.log lays out its
/// left-hand columns.
#[derive(Clone, Debug)]
pub struct Disassembly {
    pub pc: u16,
    pub bytes: Vec<u8>,
    pub instruction: Instruction,
}

/// Decode the instruction at the start of `bytes`, assumed to live at `pc`.
/// Returns `None` for halting opcodes or if `bytes` is too short.
pub fn disassemble(bytes: &[u8], pc: u16) -> Option<Disassembly> {
    let instruction = INSTRUCTIONS[*bytes.first()? as usize]?;
    let size = instruction.mode.size() as usize;
    let bytes = bytes.get(..size)?.to_vec();

    Some(Disassembly { pc, bytes, instruction })
}

impl Disassembly {
    pub fn mnemonic(&self) -> &'static str {
        self.instruction.mnemonic
    }

    pub fn operand(&self) -> String {
        let byte = self.bytes.get(1).copied().unwrap_or(0);
        let word = u16::from_le_bytes([byte, self.bytes.get(2).copied().unwrap_or(0)]);

        match self.instruction.mode {
            AddrMode::Implied => String::new(),
            AddrMode::Accumulator => "A".to_string(),
            AddrMode::Immediate => format!("#${byte:02X}"),
            AddrMode::Zero => format!("${byte:02X}"),
            AddrMode::ZeroX => format!("${byte:02X},X"),
            AddrMode::ZeroY => format!("${byte:02X},Y"),
            AddrMode::Absolute => format!("${word:04X}"),
            AddrMode::AbsoluteX => format!("${word:04X},X"),
            AddrMode::AbsoluteY => format!("${word:04X},Y"),
            AddrMode::Indirect => format!("(${word:04X})"),
            AddrMode::IndirectX => format!("(${byte:02X},X)"),
            AddrMode::IndirectY => format!("(${byte:02X}),Y"),
            AddrMode::Relative => {
                let target = self.pc.wrapping_add(2).wrapping_add(byte as i8 as u16);
                format!("${target:04X}")
            },
        }
    }
}

fn value(peek: &mut dyn FnMut(u16) -> Option<u8>, addr: u16) -> String {
    peek(addr).map(|v| format!(" = {v:02X}")).unwrap_or_default()
}

fn pointer(peek: &mut dyn FnMut(u16) -> Option<u8>, lo: u16, hi: u16) -> Option<u16> {
    Some(u16::from_le_bytes([peek(lo)?, peek(hi)?]))
}

impl Disassembly {
    /// The annotations nestest.log prints after the operand: the effective
    /// address and the value stored there. `peek` yields `None` for
    /// addresses that can't be read without side effects, and those values
    /// are left out.
    pub fn detail(&self, x: u8, y: u8, mut peek: impl FnMut(u16) -> Option<u8>) -> String {
        let byte = self.bytes.get(1).copied().unwrap_or(0);
        let word = u16::from_le_bytes([byte, self.bytes.get(2).copied().unwrap_or(0)]);
        let peek: &mut dyn FnMut(u16) -> Option<u8> = &mut peek;

        let detail = match self.instruction.mode {
            AddrMode::Implied | AddrMode::Accumulator | AddrMode::Immediate | AddrMode::Relative => String::new(),
            AddrMode::Zero => value(peek, byte as u16),
            AddrMode::ZeroX | AddrMode::ZeroY => {
                let index = if self.instruction.mode == AddrMode::ZeroX { x } else { y };
                let addr = byte.wrapping_add(index) as u16;
                format!("@ {addr:02X}{}", value(peek, addr))
            },
            AddrMode::Absolute => match self.instruction.mnemonic {
                "JMP" | "JSR" => String::new(),
                _ => value(peek, word),
            },
            AddrMode::AbsoluteX | AddrMode::AbsoluteY => {
                let index = if self.instruction.mode == AddrMode::AbsoluteX { x } else { y };
                let addr = word.wrapping_add(index as u16);
                format!("@ {addr:04X}{}", value(peek, addr))
            },
            // the pointer's high byte never leaves its page
            AddrMode::Indirect => {
                let hi = (word & 0xFF00) | (word.wrapping_add(1) & 0x00FF);
                pointer(peek, word, hi).map(|target| format!("= {target:04X}")).unwrap_or_default()
            },
            AddrMode::IndirectX => {
                let ptr = byte.wrapping_add(x);
                match pointer(peek, ptr as u16, ptr.wrapping_add(1) as u16) {
                    Some(addr) => format!("@ {ptr:02X} = {addr:04X}{}", value(peek, addr)),
                    None => format!("@ {ptr:02X}"),
                }
            },
            AddrMode::IndirectY => match pointer(peek, byte as u16, byte.wrapping_add(1) as u16) {
                Some(base) => {
                    let addr = base.wrapping_add(y as u16);
                    format!("= {base:04X} @ {addr:04X}{}", value(peek, addr))
                },
                None => String::new(),
            },
        };

        detail.trim_start().to_string()
    }
}

impl Display for Disassembly {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bytes = self.bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ");
        let marker = if self.instruction.unofficial { '*' } else { ' ' };
        let text = format!("{}{} {}", marker, self.instruction.mnemonic, self.operand());

        write!(f, "{:04X}  {:<9}{}", self.pc, bytes, text.trim_end())
    }
}
