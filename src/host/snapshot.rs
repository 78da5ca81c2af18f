//! A [`TargetHost`] over an owned memory image.
//!
//! Live debugging is only one way to drive the overlay core; the other is post-mortem:
//! a raw RAM dump pulled off a target plus the symbols of the firmware ELF carry all
//! the state the reconstruction needs. [`SnapshotHost`] holds that pair (and, when
//! available, a register snapshot taken at the stop that produced the dump).

use std::fs;
use std::path::Path;

use memmap2::Mmap;

use crate::host::{SymbolIndex, TargetHost};
use crate::Result;

/// A target host backed by an in-memory image, a symbol index and an optional
/// register snapshot.
///
/// The image covers one contiguous address range starting at `base`. Reads outside
/// the range fail with [`Error::Memory`](crate::Error::Memory), the same way an
/// inaccessible address fails on a live target.
pub struct SnapshotHost {
    image: Vec<u8>,
    base: u32,
    symbols: SymbolIndex,
    registers: Vec<(String, u32)>,
    engine_initialized: Option<bool>,
}

impl SnapshotHost {
    /// Create a host from an owned byte image loaded at `base`.
    #[must_use]
    pub fn new(image: Vec<u8>, base: u32, symbols: SymbolIndex) -> Self {
        SnapshotHost {
            image,
            base,
            symbols,
            registers: Vec::new(),
            engine_initialized: None,
        }
    }

    /// Map a raw dump file at `path`, loaded at `base`.
    ///
    /// # Errors
    /// Returns [`Error::FileError`](crate::Error::FileError) if the file cannot be
    /// opened or mapped.
    pub fn from_file(path: &Path, base: u32, symbols: SymbolIndex) -> Result<Self> {
        let file = fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(SnapshotHost::new(mmap.to_vec(), base, symbols))
    }

    /// Record a register value captured at the stop that produced this dump.
    pub fn set_register(&mut self, name: &str, value: u32) {
        match self.registers.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.registers.push((name.to_string(), value)),
        }
    }

    /// Override the initialisation signal instead of reading it from the image.
    pub fn set_engine_initialized(&mut self, initialized: bool) {
        self.engine_initialized = Some(initialized);
    }

    /// The symbol index backing this host.
    #[must_use]
    pub fn symbols(&self) -> &SymbolIndex {
        &self.symbols
    }
}

impl TargetHost for SnapshotHost {
    fn read_bytes(&self, address: u32, length: usize) -> Result<Vec<u8>> {
        let offset = address.wrapping_sub(self.base) as usize;
        let end = offset.checked_add(length);
        match end {
            Some(end) if address >= self.base && end <= self.image.len() => {
                Ok(self.image[offset..end].to_vec())
            }
            _ => Err(crate::Error::Memory { address, length }),
        }
    }

    fn resolve_symbol_address(&self, name: &str) -> Option<u32> {
        self.symbols.resolve(name)
    }

    fn read_register(&self, name: &str) -> Result<u32> {
        self.registers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| crate::Error::Register(name.to_string()))
    }

    fn is_engine_initialized(&self) -> bool {
        if let Some(initialized) = self.engine_initialized {
            return initialized;
        }

        // Fall back to the control block's tables-loaded byte in the image.
        self.resolve_symbol_address(crate::overlay::INIT_FLAG_SYMBOL)
            .and_then(|addr| self.read_bytes(addr, 1).ok())
            .is_some_and(|bytes| bytes[0] != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with_image() -> SnapshotHost {
        let mut symbols = SymbolIndex::empty();
        symbols.insert("some_flag", 0x8000_0004);
        SnapshotHost::new(vec![0x11, 0x22, 0x33, 0x44, 0x01], 0x8000_0000, symbols)
    }

    #[test]
    fn test_read_inside_image() {
        let host = host_with_image();
        assert_eq!(host.read_bytes(0x8000_0001, 2).unwrap(), vec![0x22, 0x33]);
    }

    #[test]
    fn test_read_outside_image() {
        let host = host_with_image();
        assert!(host.read_bytes(0x7fff_ffff, 1).is_err());
        assert!(host.read_bytes(0x8000_0004, 2).is_err());
    }

    #[test]
    fn test_register_snapshot() {
        let mut host = host_with_image();
        assert!(host.read_register("sp").is_err());

        host.set_register("sp", 0x2000);
        host.set_register("sp", 0x3000);
        assert_eq!(host.read_register("sp").unwrap(), 0x3000);
    }

    #[test]
    fn test_symbol_resolution() {
        let host = host_with_image();
        assert_eq!(host.resolve_symbol_address("some_flag"), Some(0x8000_0004));
        assert_eq!(host.resolve_symbol_address("missing"), None);
    }
}
