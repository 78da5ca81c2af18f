//! Minimal RV32 instruction-word classifier for the provenance scan.
//!
//! The engine's straight-line sequences only ever move values between registers,
//! adjust them by constants, spill/fill them and branch; the scan needs exactly that
//! much and nothing more. Decoding works on raw instruction words (base and
//! compressed encodings), so no text disassembly is involved; anything outside the
//! recognised subset is classified conservatively.

use crate::host::Reg;

/// The effect of one instruction, as far as register provenance is concerned.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScanOp {
    /// `rd <- rs`
    Mv {
        /// Destination register
        rd: Reg,
        /// Source register
        rs: Reg,
    },
    /// `rd <- rs + imm`
    AddImm {
        /// Destination register
        rd: Reg,
        /// Source register
        rs: Reg,
        /// Sign-extended immediate
        imm: i32,
    },
    /// `rd <- rs1 + rs2`
    AddReg {
        /// Destination register
        rd: Reg,
        /// First operand
        rs1: Reg,
        /// Second operand
        rs2: Reg,
    },
    /// `rd <- rs1 - rs2`
    SubReg {
        /// Destination register
        rd: Reg,
        /// First operand
        rs1: Reg,
        /// Second operand
        rs2: Reg,
    },
    /// `rd <- constant` (lui, auipc, c.li, c.lui)
    LoadConst {
        /// Destination register
        rd: Reg,
        /// The constant value
        value: u32,
    },
    /// A load from memory; the destination becomes unknown.
    Load {
        /// Destination register
        rd: Reg,
    },
    /// A store to memory; no register effect.
    Store,
    /// A conditional branch; falls through in straight-line code.
    Branch,
    /// An unconditional jump; straight-line code ends here.
    Jump,
    /// A call; clobbers the registers the ABI does not preserve.
    Call,
    /// A recognised format with an effect the scan does not model.
    Other {
        /// Destination register, when the format names one
        rd: Option<Reg>,
    },
    /// An unrecognised word; poisons all tracked state.
    Opaque,
}

/// A decoded instruction: its provenance effect and its encoded length in bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Decoded {
    /// The provenance effect
    pub op: ScanOp,
    /// Encoded length: 2 (compressed) or 4
    pub length: u32,
}

/// Decode the instruction word starting at `pc`.
///
/// `word` holds at least the low 16 bits; for 32-bit encodings all 32 bits.
#[must_use]
pub fn decode(word: u32, pc: u32) -> Decoded {
    if word & 0b11 == 0b11 {
        Decoded {
            op: decode_full(word, pc),
            length: 4,
        }
    } else {
        Decoded {
            op: decode_compressed((word & 0xffff) as u16),
            length: 2,
        }
    }
}

fn reg(index: u32) -> Reg {
    Reg((index & 0x1f) as u8)
}

/// `rd'`/`rs'` of the compressed encodings map onto x8..x15.
fn creg(index: u16) -> Reg {
    Reg(8 + (index & 0x7) as u8)
}

fn sext(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

fn decode_full(word: u32, pc: u32) -> ScanOp {
    let opcode = word & 0x7f;
    let rd = reg(word >> 7);
    let funct3 = (word >> 12) & 0x7;
    let rs1 = reg(word >> 15);
    let rs2 = reg(word >> 20);
    let funct7 = word >> 25;
    let i_imm = (word as i32) >> 20;

    match opcode {
        // lui
        0x37 => ScanOp::LoadConst {
            rd,
            value: word & 0xffff_f000,
        },
        // auipc: pc-relative, and pc is known here
        0x17 => ScanOp::LoadConst {
            rd,
            value: pc.wrapping_add(word & 0xffff_f000),
        },
        // op-imm
        0x13 => match funct3 {
            0 if i_imm == 0 => ScanOp::Mv { rd, rs: rs1 },
            0 => ScanOp::AddImm {
                rd,
                rs: rs1,
                imm: i_imm,
            },
            _ => ScanOp::Other { rd: Some(rd) },
        },
        // op
        0x33 => match (funct3, funct7) {
            (0, 0x00) => ScanOp::AddReg { rd, rs1, rs2 },
            (0, 0x20) => ScanOp::SubReg { rd, rs1, rs2 },
            _ => ScanOp::Other { rd: Some(rd) },
        },
        0x03 => ScanOp::Load { rd },
        0x23 => ScanOp::Store,
        0x63 => ScanOp::Branch,
        // jal
        0x6f => {
            if rd == Reg::ZERO {
                ScanOp::Jump
            } else {
                ScanOp::Call
            }
        }
        // jalr
        0x67 => {
            if rd == Reg::ZERO {
                ScanOp::Jump
            } else {
                ScanOp::Call
            }
        }
        // fence / system
        0x0f | 0x73 => ScanOp::Other { rd: None },
        _ => ScanOp::Opaque,
    }
}

fn decode_compressed(word: u16) -> ScanOp {
    let quadrant = word & 0x3;
    let funct3 = (word >> 13) & 0x7;

    match (quadrant, funct3) {
        // c.addi4spn
        (0b00, 0b000) => {
            let imm = (u32::from((word >> 7) & 0xf) << 6)
                | (u32::from((word >> 11) & 0x3) << 4)
                | (u32::from((word >> 5) & 0x1) << 3)
                | (u32::from((word >> 6) & 0x1) << 2);
            if imm == 0 {
                return ScanOp::Opaque;
            }
            ScanOp::AddImm {
                rd: creg(word >> 2),
                rs: Reg::SP,
                imm: imm as i32,
            }
        }
        // c.lw
        (0b00, 0b010) => ScanOp::Load {
            rd: creg(word >> 2),
        },
        // c.sw
        (0b00, 0b110) => ScanOp::Store,
        (0b00, _) => ScanOp::Other { rd: None },

        // c.addi / c.nop
        (0b01, 0b000) => {
            let rd = reg(u32::from(word) >> 7);
            if rd == Reg::ZERO {
                return ScanOp::Other { rd: None };
            }
            let imm = sext((u32::from(word >> 12) & 0x1) << 5 | u32::from(word >> 2) & 0x1f, 6);
            ScanOp::AddImm { rd, rs: rd, imm }
        }
        // c.jal
        (0b01, 0b001) => ScanOp::Call,
        // c.li
        (0b01, 0b010) => {
            let rd = reg(u32::from(word) >> 7);
            let imm = sext((u32::from(word >> 12) & 0x1) << 5 | u32::from(word >> 2) & 0x1f, 6);
            ScanOp::LoadConst {
                rd,
                value: imm as u32,
            }
        }
        // c.addi16sp / c.lui
        (0b01, 0b011) => {
            let rd = reg(u32::from(word) >> 7);
            if rd == Reg::SP {
                let imm = sext(
                    (u32::from(word >> 12) & 0x1) << 9
                        | (u32::from(word >> 3) & 0x3) << 7
                        | (u32::from(word >> 5) & 0x1) << 6
                        | (u32::from(word >> 2) & 0x1) << 5
                        | (u32::from(word >> 6) & 0x1) << 4,
                    10,
                );
                ScanOp::AddImm {
                    rd: Reg::SP,
                    rs: Reg::SP,
                    imm,
                }
            } else {
                let imm = sext((u32::from(word >> 12) & 0x1) << 5 | u32::from(word >> 2) & 0x1f, 6);
                ScanOp::LoadConst {
                    rd,
                    value: (imm << 12) as u32,
                }
            }
        }
        // c.srli / c.srai / c.andi / c.sub / c.xor / c.or / c.and
        (0b01, 0b100) => {
            let rd = creg(word >> 7);
            if (word >> 10) & 0x3 == 0b11 && (word >> 12) & 0x1 == 0 {
                let rs2 = creg(word >> 2);
                if (word >> 5) & 0x3 == 0b00 {
                    return ScanOp::SubReg { rd, rs1: rd, rs2 };
                }
            }
            ScanOp::Other { rd: Some(rd) }
        }
        // c.j
        (0b01, 0b101) => ScanOp::Jump,
        // c.beqz / c.bnez
        (0b01, 0b110 | 0b111) => ScanOp::Branch,

        // c.slli
        (0b10, 0b000) => ScanOp::Other {
            rd: Some(reg(u32::from(word) >> 7)),
        },
        // c.lwsp
        (0b10, 0b010) => ScanOp::Load {
            rd: reg(u32::from(word) >> 7),
        },
        // c.jr / c.mv / c.ebreak / c.jalr / c.add
        (0b10, 0b100) => {
            let rd = reg(u32::from(word) >> 7);
            let rs2 = reg(u32::from(word) >> 2);
            if (word >> 12) & 0x1 == 0 {
                if rs2 == Reg::ZERO {
                    ScanOp::Jump
                } else {
                    ScanOp::Mv { rd, rs: rs2 }
                }
            } else if rs2 == Reg::ZERO {
                if rd == Reg::ZERO {
                    ScanOp::Other { rd: None }
                } else {
                    ScanOp::Call
                }
            } else {
                ScanOp::AddReg { rd, rs1: rd, rs2 }
            }
        }
        // c.swsp
        (0b10, 0b110) => ScanOp::Store,
        (0b10, _) => ScanOp::Other { rd: None },

        _ => ScanOp::Opaque,
    }
}
