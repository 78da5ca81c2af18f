//! Register provenance over the engine's straight-line code.
//!
//! Two of the engine's phases stop with an atomic update half done: the new overlay
//! stack record mid-construction, or the return-path teardown mid-restore. For those
//! the unwinder needs to know, per register, how the current value relates to the
//! value at the phase start - and nothing else. That is a three-state lattice:
//!
//! - *register + offset*: the value is a phase-entry register plus a constant
//! - *constant*: the value is a known constant
//! - *unknown*: anything else
//!
//! [`scan_range`] walks the instruction words from the phase-start label to the
//! current program counter, applying only the transfer functions of the small
//! subset the engine's assembly actually uses. It is never used to simulate
//! arbitrary code; an unrecognised word simply poisons the state.

use crate::host::{Reg, RegisterSource, TargetHost};
use crate::unwinder::rv32::{decode, ScanOp};
use crate::Result;

/// Longest straight-line range the scan will walk, in bytes.
///
/// Engine phases are a handful of instructions; a range beyond this means the label
/// set does not match the image.
const MAX_SCAN_BYTES: u32 = 1024;

/// What is known about a register's current value relative to phase entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Provenance {
    /// The value equals a phase-entry register plus a constant.
    RegOffset {
        /// The phase-entry register
        reg: Reg,
        /// The constant adjustment
        offset: i32,
    },
    /// The value is this constant.
    Const(u32),
    /// Nothing is known.
    Unknown,
}

/// Provenance of all integer registers at one point of a straight-line scan.
#[derive(Clone, Debug)]
pub struct ScanState {
    prov: [Provenance; 32],
}

impl Default for ScanState {
    fn default() -> Self {
        ScanState::new()
    }
}

impl ScanState {
    /// The state at phase entry: every register is itself, x0 is zero.
    #[must_use]
    pub fn new() -> Self {
        let mut prov = [Provenance::Unknown; 32];
        for (index, slot) in prov.iter_mut().enumerate() {
            *slot = Provenance::RegOffset {
                reg: Reg(index as u8),
                offset: 0,
            };
        }
        prov[0] = Provenance::Const(0);
        ScanState { prov }
    }

    /// The provenance of `reg`.
    #[must_use]
    pub fn provenance(&self, reg: Reg) -> Provenance {
        self.prov[(reg.0 & 0x1f) as usize]
    }

    fn write(&mut self, rd: Reg, value: Provenance) {
        if rd != Reg::ZERO {
            self.prov[(rd.0 & 0x1f) as usize] = value;
        }
    }

    fn poison_all(&mut self) {
        for slot in self.prov.iter_mut().skip(1) {
            *slot = Provenance::Unknown;
        }
    }

    fn add_const(value: Provenance, imm: i32) -> Provenance {
        match value {
            Provenance::RegOffset { reg, offset } => Provenance::RegOffset {
                reg,
                offset: offset.wrapping_add(imm),
            },
            Provenance::Const(c) => Provenance::Const(c.wrapping_add_signed(imm)),
            Provenance::Unknown => Provenance::Unknown,
        }
    }

    /// Apply one instruction's transfer function.
    pub fn apply(&mut self, op: ScanOp) {
        match op {
            ScanOp::Mv { rd, rs } => self.write(rd, self.provenance(rs)),
            ScanOp::AddImm { rd, rs, imm } => {
                self.write(rd, Self::add_const(self.provenance(rs), imm));
            }
            ScanOp::AddReg { rd, rs1, rs2 } => {
                let value = match (self.provenance(rs1), self.provenance(rs2)) {
                    (Provenance::Const(a), Provenance::Const(b)) => {
                        Provenance::Const(a.wrapping_add(b))
                    }
                    (other, Provenance::Const(c)) | (Provenance::Const(c), other) => {
                        Self::add_const(other, c as i32)
                    }
                    _ => Provenance::Unknown,
                };
                self.write(rd, value);
            }
            ScanOp::SubReg { rd, rs1, rs2 } => {
                let value = match (self.provenance(rs1), self.provenance(rs2)) {
                    (Provenance::Const(a), Provenance::Const(b)) => {
                        Provenance::Const(a.wrapping_sub(b))
                    }
                    (other, Provenance::Const(c)) => Self::add_const(other, (c as i32).wrapping_neg()),
                    _ => Provenance::Unknown,
                };
                self.write(rd, value);
            }
            ScanOp::LoadConst { rd, value } => self.write(rd, Provenance::Const(value)),
            ScanOp::Load { rd } => self.write(rd, Provenance::Unknown),
            ScanOp::Other { rd: Some(rd) } => self.write(rd, Provenance::Unknown),
            // Stores and fall-through branches do not touch register state.
            ScanOp::Store | ScanOp::Branch | ScanOp::Other { rd: None } => {}
            ScanOp::Call => {
                for index in 0..32u8 {
                    if !Reg(index).survives_call() {
                        self.write(Reg(index), Provenance::Unknown);
                    }
                }
            }
            ScanOp::Jump | ScanOp::Opaque => self.poison_all(),
        }
    }

    /// Recover the phase-entry value of `target` from the current register values.
    ///
    /// Any register whose current value is `target + offset` witnesses the entry
    /// value; the identity provenance (`target` itself unmodified) is the common
    /// case. Returns `None` when no register witnesses it.
    pub fn recover_entry(
        &self,
        target: Reg,
        regs: &dyn RegisterSource,
    ) -> Result<Option<u32>> {
        // Prefer the target register itself when it still carries its entry value.
        if let Provenance::RegOffset { reg, offset } = self.provenance(target) {
            if reg == target {
                let current = regs.read(target)?;
                return Ok(Some(current.wrapping_add_signed(offset.wrapping_neg())));
            }
        }

        for index in 0..32u8 {
            let witness = Reg(index);
            if let Provenance::RegOffset { reg, offset } = self.provenance(witness) {
                if reg == target {
                    let current = regs.read(witness)?;
                    return Ok(Some(current.wrapping_add_signed(offset.wrapping_neg())));
                }
            }
        }

        Ok(None)
    }
}

/// Scan the straight-line range `[from, to)` and return the provenance at `to`.
///
/// # Errors
/// [`Error::Malformed`](crate::Error::Malformed) when the range is inverted or
/// implausibly long (a label-set/image mismatch); memory read errors propagate.
pub fn scan_range(host: &dyn TargetHost, from: u32, to: u32) -> Result<ScanState> {
    if to < from || to - from > MAX_SCAN_BYTES {
        return Err(malformed_error!(
            "implausible scan range [0x{:x}, 0x{:x})",
            from,
            to
        ));
    }

    let mut state = ScanState::new();
    let mut pc = from;
    while pc < to {
        let bytes = host.read_bytes(pc, 2)?;
        let low = u32::from(u16::from_le_bytes([bytes[0], bytes[1]]));
        let word = if low & 0b11 == 0b11 {
            let high = host.read_bytes(pc + 2, 2)?;
            low | (u32::from(u16::from_le_bytes([high[0], high[1]])) << 16)
        } else {
            low
        };

        let decoded = decode(word, pc);
        if decoded.op == ScanOp::Jump {
            // Straight-line assumption broken: whatever follows was reached some
            // other way, so nothing survives.
            state.poison_all();
            break;
        }
        state.apply(decoded.op);
        pc += decoded.length;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RegisterFile;

    #[test]
    fn test_initial_state_is_identity() {
        let state = ScanState::new();
        assert_eq!(
            state.provenance(Reg::SP),
            Provenance::RegOffset {
                reg: Reg::SP,
                offset: 0
            }
        );
        assert_eq!(state.provenance(Reg::ZERO), Provenance::Const(0));
    }

    #[test]
    fn test_add_imm_accumulates() {
        let mut state = ScanState::new();
        state.apply(ScanOp::AddImm {
            rd: Reg::SP,
            rs: Reg::SP,
            imm: -16,
        });
        state.apply(ScanOp::AddImm {
            rd: Reg::SP,
            rs: Reg::SP,
            imm: 4,
        });
        assert_eq!(
            state.provenance(Reg::SP),
            Provenance::RegOffset {
                reg: Reg::SP,
                offset: -12
            }
        );
    }

    #[test]
    fn test_mv_transfers_provenance() {
        let mut state = ScanState::new();
        state.apply(ScanOp::AddImm {
            rd: Reg::T3,
            rs: Reg::T3,
            imm: 12,
        });
        state.apply(ScanOp::Mv {
            rd: Reg::T4,
            rs: Reg::T3,
        });
        assert_eq!(
            state.provenance(Reg::T4),
            Provenance::RegOffset {
                reg: Reg::T3,
                offset: 12
            }
        );
    }

    #[test]
    fn test_load_poisons_destination() {
        let mut state = ScanState::new();
        state.apply(ScanOp::Load { rd: Reg::T3 });
        assert_eq!(state.provenance(Reg::T3), Provenance::Unknown);
    }

    #[test]
    fn test_call_clobbers_per_abi() {
        let mut state = ScanState::new();
        state.apply(ScanOp::Call);
        assert_eq!(state.provenance(Reg::RA), Provenance::Unknown);
        assert_eq!(state.provenance(Reg(10)), Provenance::Unknown);
        assert_eq!(
            state.provenance(Reg::SP),
            Provenance::RegOffset {
                reg: Reg::SP,
                offset: 0
            }
        );
        assert_eq!(
            state.provenance(Reg::T3),
            Provenance::RegOffset {
                reg: Reg::T3,
                offset: 0
            }
        );
    }

    #[test]
    fn test_recover_entry_through_witness() {
        // t4 <- t3; t3 <- t3 - 12: the entry t3 is witnessed by t4.
        let mut state = ScanState::new();
        state.apply(ScanOp::Mv {
            rd: Reg::T4,
            rs: Reg::T3,
        });
        state.apply(ScanOp::AddImm {
            rd: Reg::T3,
            rs: Reg::T3,
            imm: -12,
        });

        let regs = RegisterFile::new()
            .with(Reg::T3, 0x1000 - 12)
            .with(Reg::T4, 0x1000);

        // t3's own provenance still names t3 (offset -12), so it is preferred.
        let entry = state.recover_entry(Reg::T3, &regs).unwrap();
        assert_eq!(entry, Some(0x1000));
    }

    #[test]
    fn test_recover_entry_none_when_unwitnessed() {
        let mut state = ScanState::new();
        state.apply(ScanOp::Load { rd: Reg::T3 });

        let regs = RegisterFile::new();
        assert_eq!(state.recover_entry(Reg::T3, &regs).unwrap(), None);
    }

    #[test]
    fn test_sub_with_const() {
        let mut state = ScanState::new();
        state.apply(ScanOp::LoadConst {
            rd: Reg(5),
            value: 16,
        });
        state.apply(ScanOp::SubReg {
            rd: Reg::SP,
            rs1: Reg::SP,
            rs2: Reg(5),
        });
        assert_eq!(
            state.provenance(Reg::SP),
            Provenance::RegOffset {
                reg: Reg::SP,
                offset: -16
            }
        );
    }
}
