//! Collaborator interfaces between the overlay reconstruction core and its target.
//!
//! Everything this library knows about a target flows through the [`TargetHost`] trait:
//! byte-range memory reads, symbol resolution, register access and the engine's
//! initialisation signal. A live debugger session, a post-mortem RAM dump or a synthetic
//! test image all plug in behind the same four methods.
//!
//! # Key Components
//!
//! - [`TargetHost`] - The narrow collaborator trait
//! - [`MemReader`] - Endian-aware fixed-width reads layered on a host
//! - [`Parser`] - Bounds-checked cursor over a fetched byte range
//! - [`Reg`] / [`RegisterSource`] / [`RegisterFile`] - Register identities and access
//! - [`SnapshotHost`] - A [`TargetHost`] over an owned memory image and symbol map
//! - [`SymbolIndex`] - ELF symbol table index for snapshot hosts

mod elf;
mod parser;
mod snapshot;

pub use elf::SymbolIndex;
pub use parser::Parser;
pub use snapshot::SnapshotHost;

use crate::Result;

/// Access to the target that holds the overlay engine's state.
///
/// The overlay core is strictly a reader: it never writes target memory or registers.
/// Implementations are expected to be cheap to call repeatedly; the core performs many
/// small reads while walking tables and stack records.
pub trait TargetHost {
    /// Read `length` bytes of target memory starting at `address`.
    ///
    /// # Errors
    /// Returns [`Error::Memory`](crate::Error::Memory) when the range is not accessible.
    fn read_bytes(&self, address: u32, length: usize) -> Result<Vec<u8>>;

    /// Resolve the address of symbol `name`, or `None` when it is not present.
    ///
    /// Control-block fields are addressed with dotted paths (for example
    /// `g_stComrvCB.ucLruIndex`), the way a debugger evaluates them.
    fn resolve_symbol_address(&self, name: &str) -> Option<u32>;

    /// Read the current value of the named register.
    ///
    /// # Errors
    /// Returns [`Error::Register`](crate::Error::Register) when the register is not
    /// available in the current target state.
    fn read_register(&self, name: &str) -> Result<u32>;

    /// Whether the overlay engine has loaded its tables.
    ///
    /// This is a proxy signal - typically "the engine's debug event breakpoint has
    /// fired at least once" on a live target, or the control block's tables-loaded
    /// byte in a dump.
    fn is_engine_initialized(&self) -> bool;
}

/// Endian-aware fixed-width reads layered on a [`TargetHost`].
///
/// The overlay tables and control block are little-endian; this wrapper keeps the
/// width and endianness decisions in one place.
pub struct MemReader<'a> {
    host: &'a dyn TargetHost,
}

impl<'a> MemReader<'a> {
    /// Create a reader over `host`.
    #[must_use]
    pub fn new(host: &'a dyn TargetHost) -> Self {
        MemReader { host }
    }

    /// Read an unsigned byte at `address`.
    pub fn read_u8(&self, address: u32) -> Result<u8> {
        let bytes = self.host.read_bytes(address, 1)?;
        bytes.first().copied().ok_or(crate::Error::Memory {
            address,
            length: 1,
        })
    }

    /// Read a little-endian `u16` at `address`.
    pub fn read_u16(&self, address: u32) -> Result<u16> {
        let bytes = self.host.read_bytes(address, 2)?;
        match bytes.as_slice() {
            [a, b] => Ok(u16::from_le_bytes([*a, *b])),
            _ => Err(crate::Error::Memory {
                address,
                length: 2,
            }),
        }
    }

    /// Read a little-endian `u32` at `address`.
    pub fn read_u32(&self, address: u32) -> Result<u32> {
        let bytes = self.host.read_bytes(address, 4)?;
        match bytes.as_slice() {
            [a, b, c, d] => Ok(u32::from_le_bytes([*a, *b, *c, *d])),
            _ => Err(crate::Error::Memory {
                address,
                length: 4,
            }),
        }
    }
}

/// A RISC-V integer register identity.
///
/// Wraps the architectural index (x0..x31). The overlay engine's calling convention
/// reserves a handful of registers, exposed here as named constants.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Reg(pub u8);

impl Reg {
    /// Hard-wired zero.
    pub const ZERO: Reg = Reg(0);
    /// Return address.
    pub const RA: Reg = Reg(1);
    /// Stack pointer.
    pub const SP: Reg = Reg(2);
    /// Overlay stack frame pointer (engine reserved).
    pub const T3: Reg = Reg(28);
    /// Overlay stack spare/next-free pointer (engine reserved).
    pub const T4: Reg = Reg(29);
    /// Overlay token register (engine reserved).
    pub const T5: Reg = Reg(30);
    /// Overlay engine entry address (engine reserved).
    pub const T6: Reg = Reg(31);

    /// The ABI name of this register, used to query a [`TargetHost`].
    #[must_use]
    pub fn name(&self) -> &'static str {
        const NAMES: [&str; 32] = [
            "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3",
            "a4", "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
            "t3", "t4", "t5", "t6",
        ];
        NAMES[(self.0 & 0x1f) as usize]
    }

    /// Whether the engine's helper calls preserve this register.
    ///
    /// sp and the saved registers are callee-saved by the ABI; t3..t6 are reserved
    /// for the engine and preserved by its helpers.
    #[must_use]
    pub fn survives_call(&self) -> bool {
        matches!(self.0, 0 | 2 | 3 | 4 | 8 | 9 | 18..=27 | 28..=31)
    }
}

/// Read access to a register file, the unwinder's view of the stopped context.
pub trait RegisterSource {
    /// Read the current value of `reg`.
    fn read(&self, reg: Reg) -> Result<u32>;
}

/// A plain in-memory register file.
///
/// Useful for tests and for drivers that batch-fetch the register state once per stop
/// event instead of round-tripping per register.
#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    regs: [u32; 32],
}

impl RegisterFile {
    /// Create a register file with all registers zero.
    #[must_use]
    pub fn new() -> Self {
        RegisterFile::default()
    }

    /// Set `reg` to `value`, returning `self` for chained construction.
    #[must_use]
    pub fn with(mut self, reg: Reg, value: u32) -> Self {
        self.set(reg, value);
        self
    }

    /// Set `reg` to `value`. Writes to x0 are ignored.
    pub fn set(&mut self, reg: Reg, value: u32) {
        if reg.0 != 0 {
            self.regs[(reg.0 & 0x1f) as usize] = value;
        }
    }
}

impl RegisterSource for RegisterFile {
    fn read(&self, reg: Reg) -> Result<u32> {
        Ok(self.regs[(reg.0 & 0x1f) as usize])
    }
}

/// A [`RegisterSource`] that defers to a [`TargetHost`].
pub struct HostRegisters<'a> {
    host: &'a dyn TargetHost,
}

impl<'a> HostRegisters<'a> {
    /// Create a register view over `host`.
    #[must_use]
    pub fn new(host: &'a dyn TargetHost) -> Self {
        HostRegisters { host }
    }
}

impl RegisterSource for HostRegisters<'_> {
    fn read(&self, reg: Reg) -> Result<u32> {
        if reg == Reg::ZERO {
            return Ok(0);
        }
        self.host.read_register(reg.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_names() {
        assert_eq!(Reg::RA.name(), "ra");
        assert_eq!(Reg::SP.name(), "sp");
        assert_eq!(Reg::T3.name(), "t3");
        assert_eq!(Reg::T6.name(), "t6");
        assert_eq!(Reg(10).name(), "a0");
    }

    #[test]
    fn test_reg_call_survival() {
        assert!(Reg::SP.survives_call());
        assert!(Reg::T3.survives_call());
        assert!(Reg(9).survives_call()); // s1
        assert!(!Reg::RA.survives_call());
        assert!(!Reg(10).survives_call()); // a0
        assert!(!Reg(5).survives_call()); // t0
    }

    #[test]
    fn test_register_file_zero_is_pinned() {
        let mut regs = RegisterFile::new();
        regs.set(Reg::ZERO, 0xdead_beef);
        assert_eq!(regs.read(Reg::ZERO).unwrap(), 0);

        regs.set(Reg::SP, 0x2000);
        assert_eq!(regs.read(Reg::SP).unwrap(), 0x2000);
    }
}
