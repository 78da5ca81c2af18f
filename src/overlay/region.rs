use std::fmt;

use crate::Result;

/// A half-open region of target memory; `end` is the first address past the region.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MemoryRegion {
    start: u32,
    end: u32,
}

impl MemoryRegion {
    /// Create a region from its bounds.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] when `start > end`.
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start > end {
            return Err(malformed_error!(
                "memory region ends 0x{:x} before it starts 0x{:x}",
                end,
                start
            ));
        }
        Ok(MemoryRegion { start, end })
    }

    /// The first address within the region.
    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    /// The first address past the end of the region.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Size of the region in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u32 {
        self.end - self.start
    }

    /// Whether `address` falls inside the region.
    #[must_use]
    pub fn contains(&self, address: u32) -> bool {
        address >= self.start && address < self.end
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:08x}, 0x{:08x})", self.start, self.end)
    }
}

/// The overlay cache area: the fast-memory region overlay groups are paged into.
///
/// The cache is divided into fixed-size entries ("pages"). The final entry does not
/// hold overlay code; the engine copies the offset tables into it at initialisation,
/// which is where the [table loader](crate::overlay::TableLoader) reads them from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CacheDescriptor {
    region: MemoryRegion,
    entry_size_bytes: u32,
}

impl CacheDescriptor {
    /// Describe a cache region with the given entry size.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] when the entry size is zero or does not
    /// evenly divide the region, or when the region cannot hold at least one working
    /// entry plus the tables entry.
    pub fn new(region: MemoryRegion, entry_size_bytes: u32) -> Result<Self> {
        if entry_size_bytes == 0 || region.size_bytes() % entry_size_bytes != 0 {
            return Err(malformed_error!(
                "cache size 0x{:x} is not a multiple of the entry size 0x{:x}",
                region.size_bytes(),
                entry_size_bytes
            ));
        }
        if region.size_bytes() / entry_size_bytes < 2 {
            return Err(malformed_error!(
                "cache {} holds fewer than two 0x{:x}-byte entries",
                region,
                entry_size_bytes
            ));
        }
        Ok(CacheDescriptor {
            region,
            entry_size_bytes,
        })
    }

    /// The underlying memory region.
    #[must_use]
    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    /// First address of the cache.
    #[must_use]
    pub fn base_address(&self) -> u32 {
        self.region.start()
    }

    /// Total cache size in bytes, including the tables entry.
    #[must_use]
    pub fn size_bytes(&self) -> u32 {
        self.region.size_bytes()
    }

    /// Size in bytes of a single cache entry (page).
    #[must_use]
    pub fn entry_size_bytes(&self) -> u32 {
        self.entry_size_bytes
    }

    /// Number of entries available for holding overlays.
    ///
    /// Excludes the final entry, which holds the overlay tables.
    #[must_use]
    pub fn working_entries(&self) -> u32 {
        self.size_bytes() / self.entry_size_bytes - 1
    }

    /// Address of the first byte of entry `index`.
    #[must_use]
    pub fn entry_address(&self, index: u32) -> u32 {
        self.base_address() + index * self.entry_size_bytes
    }

    /// Address of the overlay tables, held in the last cache entry.
    #[must_use]
    pub fn tables_base(&self) -> u32 {
        self.region.end() - self.entry_size_bytes
    }

    /// Size of the tables area in bytes; a single cache entry.
    #[must_use]
    pub fn tables_size_bytes(&self) -> u32 {
        self.entry_size_bytes
    }
}

/// The overlay storage area: the larger, slower region overlay groups are loaded from.
///
/// Debug information refers to overlaid code by its storage address, which is what
/// the unwinder translates cache-resident return addresses back into.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StorageDescriptor {
    region: MemoryRegion,
}

impl StorageDescriptor {
    /// Describe a storage region.
    #[must_use]
    pub fn new(region: MemoryRegion) -> Self {
        StorageDescriptor { region }
    }

    /// The underlying memory region.
    #[must_use]
    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    /// First address of the storage area.
    #[must_use]
    pub fn start(&self) -> u32 {
        self.region.start()
    }

    /// First address past the storage area.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.region.end()
    }
}
