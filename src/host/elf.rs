//! ELF symbol indexing for snapshot hosts.
//!
//! A live debugger resolves symbols itself; a dump file does not. [`SymbolIndex`]
//! parses the firmware ELF with goblin, indexes the symbol table by name, and layers
//! the dotted control-block field paths (`g_stComrvCB.ucLruIndex` and friends) on top
//! of the base symbol, the way a debugger would evaluate the field access.

use std::fs;
use std::path::Path;

use goblin::elf::Elf;

use crate::overlay::control_block_field_offsets;
use crate::Result;

/// Name-to-address symbol index built from the firmware ELF.
///
/// Besides plain symtab entries the index resolves dotted field paths for the overlay
/// engine's control block; the field offsets of the known control-block layout are
/// registered automatically, and [`SymbolIndex::insert_field`] covers firmware builds
/// with additional fields.
pub struct SymbolIndex {
    symbols: Vec<(String, u32)>,
}

impl SymbolIndex {
    /// Create an empty index.
    #[must_use]
    pub fn empty() -> Self {
        SymbolIndex {
            symbols: Vec::new(),
        }
    }

    /// Parse `bytes` as an ELF image and index its symbol table.
    ///
    /// # Errors
    /// Returns [`Error::GoblinErr`](crate::Error::GoblinErr) when the image is not a
    /// parsable ELF.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let elf = Elf::parse(bytes)?;
        let mut index = SymbolIndex::empty();

        for sym in elf.syms.iter() {
            if sym.st_value == 0 {
                continue;
            }
            if let Some(name) = elf.strtab.get_at(sym.st_name) {
                if !name.is_empty() {
                    index.insert(name, sym.st_value as u32);
                }
            }
        }

        index.register_control_block_fields();
        Ok(index)
    }

    /// Read and index the ELF at `path`.
    ///
    /// # Errors
    /// Returns [`Error::FileError`](crate::Error::FileError) if the file cannot be read,
    /// or [`Error::GoblinErr`](crate::Error::GoblinErr) if it does not parse as ELF.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        SymbolIndex::parse(&bytes)
    }

    /// Add or replace a symbol.
    pub fn insert(&mut self, name: &str, address: u32) {
        match self.symbols.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = address,
            None => self.symbols.push((name.to_string(), address)),
        }
    }

    /// Register `base.field` at `offset` bytes past the already indexed `base` symbol.
    ///
    /// Returns `false` when `base` is unknown.
    pub fn insert_field(&mut self, base: &str, field: &str, offset: u32) -> bool {
        match self.resolve(base) {
            Some(addr) => {
                self.insert(&format!("{base}.{field}"), addr.wrapping_add(offset));
                true
            }
            None => false,
        }
    }

    /// Resolve `name` to an address.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, addr)| *addr)
    }

    /// Number of indexed names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the index holds no names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn register_control_block_fields(&mut self) {
        for (field, offset) in control_block_field_offsets() {
            self.insert_field(crate::overlay::CONTROL_BLOCK_SYMBOL, field, *offset);
        }
    }
}
