use strum::Display;

use crate::Result;

/// Default cache entry (page) size in bytes; the engine's minimum group granularity.
pub const DEFAULT_ENTRY_SIZE_BYTES: u32 = 512;

/// Default hard upper bound on any overlay group's size in bytes.
///
/// Must match the value the firmware toolchain was configured with; return-address
/// translation depends on it.
pub const DEFAULT_MAX_GROUP_SIZE_BYTES: u32 = 4096;

/// Position and width of the multi-group index field inside an overlay stack record.
///
/// Engine builds with few multi-groups store a sign-extended 8-bit index at byte 11
/// of the record; larger builds store a 16-bit index at byte 14. No other layouts
/// exist, so any other configured offset is rejected up front.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum MgIndexOffset {
    /// 8-bit index at record byte 11 (compact 12-byte records).
    #[strum(serialize = "8-bit at byte 11")]
    Byte11,
    /// 16-bit index at record byte 14 (16-byte records).
    #[strum(serialize = "16-bit at byte 14")]
    Byte14,
}

impl MgIndexOffset {
    /// Validate a raw configured offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedConfiguration`] for any value other than
    /// 11 or 14.
    pub fn from_raw(offset: u32) -> Result<Self> {
        match offset {
            11 => Ok(MgIndexOffset::Byte11),
            14 => Ok(MgIndexOffset::Byte14),
            other => Err(crate::Error::UnsupportedConfiguration(format!(
                "multi-group index offset {other} (expected 11 or 14)"
            ))),
        }
    }

    /// Byte offset of the index field within a stack record.
    #[must_use]
    pub fn byte_offset(&self) -> u32 {
        match self {
            MgIndexOffset::Byte11 => 11,
            MgIndexOffset::Byte14 => 14,
        }
    }
}

/// Cache eviction policy of the engine build.
///
/// A single policy exists today; the enum leaves room for the engine's reserved
/// LFU/mixed variants without an open-ended handler registry.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum EvictionPolicy {
    /// Least-recently-used, tracked through per-slot forward links.
    #[strum(serialize = "LRU")]
    Lru,
}

impl EvictionPolicy {
    /// Policy byte value for [`EvictionPolicy::Lru`].
    pub const LRU_BYTE: u8 = 0;

    /// Decode a policy byte from the control block.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedConfiguration`] for an unknown policy byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            Self::LRU_BYTE => Ok(EvictionPolicy::Lru),
            other => Err(crate::Error::UnsupportedConfiguration(format!(
                "unknown eviction policy {other:#04x}"
            ))),
        }
    }
}

/// Build-time parameters of the overlay engine this target runs.
///
/// These mirror toolchain configuration, not target state: the cache entry
/// granularity, the maximum overlay group size, and the stack-record layout of
/// multi-group builds. Constructed fallibly so misconfiguration surfaces before
/// any target memory is touched.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EngineConfig {
    entry_size_bytes: u32,
    max_group_size_bytes: u32,
    mg_index_offset: MgIndexOffset,
}

impl EngineConfig {
    /// Create a configuration from raw toolchain values.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedConfiguration`] when the entry size is not
    /// a power of two, the maximum group size is not a multiple of the entry size,
    /// or the multi-group index offset is not 11 or 14.
    pub fn new(
        entry_size_bytes: u32,
        max_group_size_bytes: u32,
        mg_index_offset: u32,
    ) -> Result<Self> {
        if entry_size_bytes == 0 || !entry_size_bytes.is_power_of_two() {
            return Err(crate::Error::UnsupportedConfiguration(format!(
                "cache entry size {entry_size_bytes} is not a power of two"
            )));
        }
        if max_group_size_bytes == 0 || max_group_size_bytes % entry_size_bytes != 0 {
            return Err(crate::Error::UnsupportedConfiguration(format!(
                "maximum group size {max_group_size_bytes} is not a multiple of the entry size {entry_size_bytes}"
            )));
        }
        Ok(EngineConfig {
            entry_size_bytes,
            max_group_size_bytes,
            mg_index_offset: MgIndexOffset::from_raw(mg_index_offset)?,
        })
    }

    /// Cache entry (page) size in bytes.
    #[must_use]
    pub fn entry_size_bytes(&self) -> u32 {
        self.entry_size_bytes
    }

    /// Hard upper bound on any group's size in bytes.
    #[must_use]
    pub fn max_group_size_bytes(&self) -> u32 {
        self.max_group_size_bytes
    }

    /// Stack-record layout of the multi-group index field.
    #[must_use]
    pub fn mg_index_offset(&self) -> MgIndexOffset {
        self.mg_index_offset
    }
}

impl Default for EngineConfig {
    /// The engine's stock toolchain configuration: 512-byte entries, 4 KiB maximum
    /// group size, 16-bit multi-group indices.
    fn default() -> Self {
        EngineConfig {
            entry_size_bytes: DEFAULT_ENTRY_SIZE_BYTES,
            max_group_size_bytes: DEFAULT_MAX_GROUP_SIZE_BYTES,
            mg_index_offset: MgIndexOffset::Byte14,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mg_index_offset_validation() {
        assert_eq!(MgIndexOffset::from_raw(11).unwrap(), MgIndexOffset::Byte11);
        assert_eq!(MgIndexOffset::from_raw(14).unwrap(), MgIndexOffset::Byte14);
        assert!(matches!(
            MgIndexOffset::from_raw(12),
            Err(crate::Error::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_eviction_policy_byte() {
        assert_eq!(EvictionPolicy::from_byte(0).unwrap(), EvictionPolicy::Lru);
        assert!(matches!(
            EvictionPolicy::from_byte(2),
            Err(crate::Error::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::new(512, 4096, 14).is_ok());
        assert!(EngineConfig::new(0, 4096, 14).is_err());
        assert!(EngineConfig::new(500, 4096, 14).is_err());
        assert!(EngineConfig::new(512, 4100, 14).is_err());
        assert!(EngineConfig::new(512, 4096, 12).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.entry_size_bytes(), 512);
        assert_eq!(config.max_group_size_bytes(), 4096);
        assert_eq!(config.mg_index_offset(), MgIndexOffset::Byte14);
    }
}
