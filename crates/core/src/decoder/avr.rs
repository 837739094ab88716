// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{Core, DecodedInstruction, Decoder, Execution};
use crate::cpu::StatusRegister;
use crate::memory::IO_OFFSET;
use crate::{SimResult, SimulationError};

/// Core AVR subset. Registers are 0..=31, I/O addresses are I/O-space
/// relative, branch offsets are in words.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Instruction {
    Nop,                      // NOP
    Mov { d: u8, r: u8 },     // MOV Rd, Rr
    Ldi { d: u8, k: u8 },     // LDI Rd, K
    Cpi { d: u8, k: u8 },     // CPI Rd, K
    Inc { d: u8 },            // INC Rd
    Dec { d: u8 },            // DEC Rd
    In { d: u8, a: u8 },      // IN Rd, A
    Out { a: u8, r: u8 },     // OUT A, Rr
    Lds { d: u8, k: u16 },    // LDS Rd, k
    Sts { k: u16, r: u8 },    // STS k, Rr
    Push { r: u8 },           // PUSH Rr
    Pop { d: u8 },            // POP Rd
    Rjmp { k: i16 },          // RJMP k
    Jmp { k: u32 },           // JMP k
    Rcall { k: i16 },         // RCALL k
    Ret,                      // RET
    Reti,                     // RETI
    Brbs { s: u8, k: i8 },    // BRBS s, k
    Brbc { s: u8, k: i8 },    // BRBC s, k
    Sei,                      // SEI
    Cli,                      // CLI
    Sleep,                    // SLEEP
    Break,                    // BREAK
    Unknown(u16),
}

fn sign_extend(value: u16, bits: u32) -> i16 {
    let shift = 16 - bits;
    ((value << shift) as i16) >> shift
}

pub fn decode_avr(opcode: u16, next: u16) -> Instruction {
    match opcode {
        0x0000 => return Instruction::Nop,
        0x9478 => return Instruction::Sei,
        0x94F8 => return Instruction::Cli,
        0x9508 => return Instruction::Ret,
        0x9518 => return Instruction::Reti,
        0x9588 => return Instruction::Sleep,
        0x9598 => return Instruction::Break,
        _ => {}
    }

    let d5 = ((opcode >> 4) & 0x1F) as u8;
    let d4 = 16 + ((opcode >> 4) & 0x0F) as u8;
    let k8 = (((opcode >> 4) & 0xF0) | (opcode & 0x0F)) as u8;
    let io = ((opcode & 0x0F) | ((opcode >> 5) & 0x30)) as u8;

    match opcode & 0xF000 {
        0xE000 => return Instruction::Ldi { d: d4, k: k8 },
        0x3000 => return Instruction::Cpi { d: d4, k: k8 },
        0xC000 => {
            return Instruction::Rjmp {
                k: sign_extend(opcode & 0x0FFF, 12),
            }
        }
        0xD000 => {
            return Instruction::Rcall {
                k: sign_extend(opcode & 0x0FFF, 12),
            }
        }
        _ => {}
    }

    match opcode & 0xF800 {
        0xB000 => return Instruction::In { d: d5, a: io },
        0xB800 => return Instruction::Out { a: io, r: d5 },
        _ => {}
    }

    if opcode & 0xFC00 == 0x2C00 {
        let r = ((opcode & 0x0F) | ((opcode >> 5) & 0x10)) as u8;
        return Instruction::Mov { d: d5, r };
    }

    if opcode & 0xF800 == 0xF000 {
        let s = (opcode & 0x07) as u8;
        let k = sign_extend((opcode >> 3) & 0x7F, 7) as i8;
        return if opcode & 0x0400 == 0 {
            Instruction::Brbs { s, k }
        } else {
            Instruction::Brbc { s, k }
        };
    }

    if opcode & 0xFE0E == 0x940C {
        let high = (((opcode >> 3) & 0x3E) | (opcode & 0x01)) as u32;
        return Instruction::Jmp {
            k: (high << 16) | next as u32,
        };
    }

    match opcode & 0xFE0F {
        0x9403 => Instruction::Inc { d: d5 },
        0x940A => Instruction::Dec { d: d5 },
        0x9000 => Instruction::Lds { d: d5, k: next },
        0x9200 => Instruction::Sts { k: next, r: d5 },
        0x920F => Instruction::Push { r: d5 },
        0x900F => Instruction::Pop { d: d5 },
        _ => Instruction::Unknown(opcode),
    }
}

impl Instruction {
    fn branch(core: &mut Core<'_>, k: i16) {
        core.cpu.pc = (core.cpu.pc as i64 + k as i64) as u32;
    }

    fn push_return(core: &mut Core<'_>, ret: u32) -> SimResult<()> {
        let mut val = ret;
        for _ in 0..core.cpu.pc_width {
            core.bus.push((val & 0xFF) as u8)?;
            val >>= 8;
        }
        Ok(())
    }

    fn pop_return(core: &mut Core<'_>) -> SimResult<u32> {
        let mut ret = 0u32;
        for _ in 0..core.cpu.pc_width {
            ret = (ret << 8) | core.bus.pop()? as u32;
        }
        Ok(ret)
    }

    fn sub_flags(sreg: &mut StatusRegister, rd: u8, k: u8, result: u8) {
        let (rd3, k3, r3) = (rd & 0x08 != 0, k & 0x08 != 0, result & 0x08 != 0);
        let (rd7, k7, r7) = (rd & 0x80 != 0, k & 0x80 != 0, result & 0x80 != 0);
        sreg.set(StatusRegister::H, (!rd3 && k3) || (k3 && r3) || (r3 && !rd3));
        sreg.set(StatusRegister::V, (rd7 && !k7 && !r7) || (!rd7 && k7 && r7));
        sreg.set(StatusRegister::N, r7);
        sreg.set(StatusRegister::Z, result == 0);
        sreg.set(StatusRegister::C, (!rd7 && k7) || (k7 && r7) || (r7 && !rd7));
        let s = sreg.contains(StatusRegister::N) ^ sreg.contains(StatusRegister::V);
        sreg.set(StatusRegister::S, s);
    }

    fn inc_dec_flags(sreg: &mut StatusRegister, result: u8, overflow: bool) {
        sreg.set(StatusRegister::V, overflow);
        sreg.set(StatusRegister::N, result & 0x80 != 0);
        sreg.set(StatusRegister::Z, result == 0);
        let s = sreg.contains(StatusRegister::N) ^ overflow;
        sreg.set(StatusRegister::S, s);
    }

    fn sreg_bit(s: u8) -> StatusRegister {
        StatusRegister::from_bits_retain(1 << s)
    }
}

impl DecodedInstruction for Instruction {
    fn execute(&self, core: &mut Core<'_>) -> SimResult<Execution> {
        let cycles = match *self {
            Instruction::Nop | Instruction::Sleep => 1,
            Instruction::Mov { d, r } => {
                let v = core.reg(r)?;
                core.set_reg(d, v)?;
                1
            }
            Instruction::Ldi { d, k } => {
                core.set_reg(d, k)?;
                1
            }
            Instruction::Cpi { d, k } => {
                let rd = core.reg(d)?;
                let result = rd.wrapping_sub(k);
                let mut sreg = core.sreg();
                Self::sub_flags(&mut sreg, rd, k, result);
                core.set_sreg(sreg);
                1
            }
            Instruction::Inc { d } => {
                let rd = core.reg(d)?;
                let result = rd.wrapping_add(1);
                core.set_reg(d, result)?;
                let mut sreg = core.sreg();
                Self::inc_dec_flags(&mut sreg, result, rd == 0x7F);
                core.set_sreg(sreg);
                1
            }
            Instruction::Dec { d } => {
                let rd = core.reg(d)?;
                let result = rd.wrapping_sub(1);
                core.set_reg(d, result)?;
                let mut sreg = core.sreg();
                Self::inc_dec_flags(&mut sreg, result, rd == 0x80);
                core.set_sreg(sreg);
                1
            }
            Instruction::In { d, a } => {
                let v = core.bus.read_u8(IO_OFFSET as u32 + a as u32)?;
                core.set_reg(d, v)?;
                1
            }
            Instruction::Out { a, r } => {
                let v = core.reg(r)?;
                core.bus.write_u8(IO_OFFSET as u32 + a as u32, v)?;
                1
            }
            Instruction::Lds { d, k } => {
                let v = core.bus.read_u8(k as u32)?;
                core.set_reg(d, v)?;
                core.cpu.pc += 1;
                2
            }
            Instruction::Sts { k, r } => {
                let v = core.reg(r)?;
                core.bus.write_u8(k as u32, v)?;
                core.cpu.pc += 1;
                2
            }
            Instruction::Push { r } => {
                let v = core.reg(r)?;
                core.bus.push(v)?;
                2
            }
            Instruction::Pop { d } => {
                let v = core.bus.pop()?;
                core.set_reg(d, v)?;
                2
            }
            Instruction::Rjmp { k } => {
                Self::branch(core, k);
                2
            }
            Instruction::Jmp { k } => {
                core.cpu.pc = k.wrapping_sub(1);
                3
            }
            Instruction::Rcall { k } => {
                let ret = core.cpu.pc + 1;
                Self::push_return(core, ret)?;
                Self::branch(core, k);
                3
            }
            Instruction::Ret => {
                let ret = Self::pop_return(core)?;
                core.cpu.pc = ret.wrapping_sub(1);
                4
            }
            Instruction::Reti => {
                let ret = Self::pop_return(core)?;
                core.cpu.pc = ret.wrapping_sub(1);
                let sreg = core.sreg() | StatusRegister::I;
                core.set_sreg(sreg);
                4
            }
            Instruction::Brbs { s, k } => {
                if core.sreg().contains(Self::sreg_bit(s)) {
                    Self::branch(core, k as i16);
                    2
                } else {
                    1
                }
            }
            Instruction::Brbc { s, k } => {
                if !core.sreg().contains(Self::sreg_bit(s)) {
                    Self::branch(core, k as i16);
                    2
                } else {
                    1
                }
            }
            Instruction::Sei => {
                let sreg = core.sreg() | StatusRegister::I;
                core.set_sreg(sreg);
                1
            }
            Instruction::Cli => {
                let sreg = core.sreg() - StatusRegister::I;
                core.set_sreg(sreg);
                1
            }
            Instruction::Break => return Ok(Execution::Break),
            Instruction::Unknown(opcode) => {
                return Err(SimulationError::IllegalOpcode {
                    pc: core.cpu.pc,
                    opcode,
                })
            }
        };
        Ok(Execution::Cycles(cycles))
    }

    fn mnemonic(&self) -> String {
        match *self {
            Instruction::Nop => "NOP".into(),
            Instruction::Mov { d, r } => format!("MOV R{}, R{}", d, r),
            Instruction::Ldi { d, k } => format!("LDI R{}, {:#04x}", d, k),
            Instruction::Cpi { d, k } => format!("CPI R{}, {:#04x}", d, k),
            Instruction::Inc { d } => format!("INC R{}", d),
            Instruction::Dec { d } => format!("DEC R{}", d),
            Instruction::In { d, a } => format!("IN R{}, {:#04x}", d, a),
            Instruction::Out { a, r } => format!("OUT {:#04x}, R{}", a, r),
            Instruction::Lds { d, k } => format!("LDS R{}, {:#06x}", d, k),
            Instruction::Sts { k, r } => format!("STS {:#06x}, R{}", k, r),
            Instruction::Push { r } => format!("PUSH R{}", r),
            Instruction::Pop { d } => format!("POP R{}", d),
            Instruction::Rjmp { k } => format!("RJMP .{:+}", k),
            Instruction::Jmp { k } => format!("JMP {:#x}", k),
            Instruction::Rcall { k } => format!("RCALL .{:+}", k),
            Instruction::Ret => "RET".into(),
            Instruction::Reti => "RETI".into(),
            Instruction::Brbs { s, k } => format!("BRBS {}, .{:+}", s, k),
            Instruction::Brbc { s, k } => format!("BRBC {}, .{:+}", s, k),
            Instruction::Sei => "SEI".into(),
            Instruction::Cli => "CLI".into(),
            Instruction::Sleep => "SLEEP".into(),
            Instruction::Break => "BREAK".into(),
            Instruction::Unknown(op) => format!(".word {:#06x}", op),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AvrDecoder;

impl Decoder for AvrDecoder {
    fn decode(&self, opcode: u16, next: u16) -> Box<dyn DecodedInstruction> {
        Box::new(decode_avr(opcode, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fixed_opcodes() {
        assert_eq!(decode_avr(0x0000, 0), Instruction::Nop);
        assert_eq!(decode_avr(0x9478, 0), Instruction::Sei);
        assert_eq!(decode_avr(0x94F8, 0), Instruction::Cli);
        assert_eq!(decode_avr(0x9518, 0), Instruction::Reti);
        assert_eq!(decode_avr(0x9598, 0), Instruction::Break);
    }

    #[test]
    fn test_decode_register_immediates() {
        // LDI R16, 0xFF
        assert_eq!(decode_avr(0xEF0F, 0), Instruction::Ldi { d: 16, k: 0xFF });
        // LDI R31, 0x5A
        assert_eq!(decode_avr(0xE5FA, 0), Instruction::Ldi { d: 31, k: 0x5A });
        // CPI R20, 0x10
        assert_eq!(decode_avr(0x3140, 0), Instruction::Cpi { d: 20, k: 0x10 });
        // MOV R1, R17
        assert_eq!(decode_avr(0x2E11, 0), Instruction::Mov { d: 1, r: 17 });
    }

    #[test]
    fn test_decode_io() {
        // OUT 0x3F, R16
        assert_eq!(decode_avr(0xBF0F, 0), Instruction::Out { a: 0x3F, r: 16 });
        // IN R24, 0x05
        assert_eq!(decode_avr(0xB185, 0), Instruction::In { d: 24, a: 0x05 });
    }

    #[test]
    fn test_decode_two_word() {
        assert_eq!(
            decode_avr(0x9100, 0x0060),
            Instruction::Lds { d: 16, k: 0x0060 }
        );
        assert_eq!(
            decode_avr(0x9300, 0x0100),
            Instruction::Sts { k: 0x0100, r: 16 }
        );
        assert_eq!(decode_avr(0x940C, 0x0054), Instruction::Jmp { k: 0x54 });
    }

    #[test]
    fn test_decode_relative_jumps() {
        assert_eq!(decode_avr(0xCFFF, 0), Instruction::Rjmp { k: -1 });
        assert_eq!(decode_avr(0xC002, 0), Instruction::Rjmp { k: 2 });
        assert_eq!(decode_avr(0xD7FF, 0), Instruction::Rcall { k: 2047 });
        // BREQ .-2 (BRBS 1)
        assert_eq!(decode_avr(0xF3F1, 0), Instruction::Brbs { s: 1, k: -2 });
        // BRNE .+4 (BRBC 1)
        assert_eq!(decode_avr(0xF411, 0), Instruction::Brbc { s: 1, k: 2 });
    }

    #[test]
    fn test_decode_single_register() {
        assert_eq!(decode_avr(0x9503, 0), Instruction::Inc { d: 16 });
        assert_eq!(decode_avr(0x950A, 0), Instruction::Dec { d: 16 });
        assert_eq!(decode_avr(0x930F, 0), Instruction::Push { r: 16 });
        assert_eq!(decode_avr(0x910F, 0), Instruction::Pop { d: 16 });
    }

    #[test]
    fn test_unknown_opcode() {
        // MUL is outside the subset
        assert_eq!(decode_avr(0x9C00, 0), Instruction::Unknown(0x9C00));
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(Instruction::Ldi { d: 16, k: 1 }.mnemonic(), "LDI R16, 0x01");
        assert_eq!(Instruction::Rjmp { k: -1 }.mnemonic(), "RJMP .-1");
    }
}
