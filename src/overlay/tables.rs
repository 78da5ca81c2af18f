//! Reconstruction of the overlay group and multi-group tables.
//!
//! The engine copies its offset tables into the final cache entry (the "tables page")
//! when it initialises. The loader fetches that page in one read and rebuilds:
//!
//! - the **group table**: consecutive 16-bit storage offsets, scaled by the entry
//!   size, zero-terminated; consecutive offsets give each group its size
//! - the **multi-group table**: a flat array of 32-bit tokens, each multi-group
//!   terminated by a zero token, the whole table terminated by a zero token in
//!   first-member position
//!
//! Both walks are bounded by the tables page, so corrupted terminators surface as
//! [`crate::Error::OutOfBounds`] instead of running away.

use crate::host::{MemReader, Parser, TargetHost};
use crate::overlay::config::{EngineConfig, EvictionPolicy};
use crate::overlay::group::{MultiGroup, MultiGroupMember, OverlayGroup};
use crate::overlay::region::{CacheDescriptor, MemoryRegion, StorageDescriptor};
use crate::overlay::snapshot::{ControlBlock, ParsedSnapshot};
use crate::overlay::token::OverlayToken;
use crate::overlay::{
    CACHE_END_SYMBOL, CACHE_ENTRIES_SYMBOL, CACHE_START_SYMBOL, EVICTION_POLICY_SYMBOL,
    LRU_HEAD_SYMBOL, MRU_SYMBOL, MULTI_GROUP_OFFSET_SYMBOL, STORAGE_END_SYMBOL,
    STORAGE_START_SYMBOL,
};
use crate::unwinder::EngineLabels;
use crate::Result;

/// Builds a [`ParsedSnapshot`] from the target's overlay tables.
///
/// The loader performs no caching itself; [`OverlayScope`](crate::OverlayScope) wraps
/// it with the memoized snapshot lifecycle.
pub struct TableLoader<'a> {
    host: &'a dyn TargetHost,
    config: &'a EngineConfig,
}

impl<'a> TableLoader<'a> {
    /// Create a loader over `host` with the build-time `config`.
    #[must_use]
    pub fn new(host: &'a dyn TargetHost, config: &'a EngineConfig) -> Self {
        TableLoader { host, config }
    }

    fn require_symbol(&self, name: &str) -> Result<u32> {
        self.host
            .resolve_symbol_address(name)
            .ok_or_else(|| crate::Error::SymbolMissing(name.to_string()))
    }

    /// Parse the overlay tables and control block into a fresh snapshot.
    ///
    /// # Errors
    /// [`Error::NotInitialized`](crate::Error::NotInitialized) before the engine has
    /// loaded its tables; table corruption surfaces as
    /// [`OutOfBounds`](crate::Error::OutOfBounds) or
    /// [`Malformed`](crate::Error::Malformed), and unsupported build options as
    /// [`UnsupportedConfiguration`](crate::Error::UnsupportedConfiguration).
    pub fn load(&self) -> Result<ParsedSnapshot> {
        if !self.host.is_engine_initialized() {
            return Err(crate::Error::NotInitialized);
        }

        let mem = MemReader::new(self.host);

        let cache_region = MemoryRegion::new(
            self.require_symbol(CACHE_START_SYMBOL)?,
            self.require_symbol(CACHE_END_SYMBOL)?,
        )?;
        let cache = CacheDescriptor::new(cache_region, self.config.entry_size_bytes())?;

        let storage_region = MemoryRegion::new(
            self.require_symbol(STORAGE_START_SYMBOL)?,
            self.require_symbol(STORAGE_END_SYMBOL)?,
        )?;
        let storage = StorageDescriptor::new(storage_region);

        // Policy is fixed at engine build time; newer engines expose the byte, older
        // ones only ever shipped LRU.
        let policy = match self.host.resolve_symbol_address(EVICTION_POLICY_SYMBOL) {
            Some(addr) => EvictionPolicy::from_byte(mem.read_u8(addr)?)?,
            None => EvictionPolicy::Lru,
        };

        // The multi-group table offset is stored in 2-byte units; the symbol is absent
        // in engine builds without multi-group support.
        let multi_group_offset = match self.host.resolve_symbol_address(MULTI_GROUP_OFFSET_SYMBOL)
        {
            Some(addr) => {
                let scaled = mem.read_u16(addr)?;
                if scaled == 0 {
                    None
                } else {
                    Some(u32::from(scaled) * 2)
                }
            }
            None => None,
        };

        if let Some(offset) = multi_group_offset {
            if offset >= cache.tables_size_bytes() {
                return Err(crate::Error::OutOfBounds);
            }
        }

        let page = self.host.read_bytes(
            cache.tables_base(),
            cache.tables_size_bytes() as usize,
        )?;
        let parser = Parser::new(&page);

        let group_table_end = multi_group_offset.unwrap_or(cache.tables_size_bytes()) as usize;
        let groups = self.parse_groups(&parser, group_table_end, &storage)?;

        let (multi_groups, multi_group_table) = match multi_group_offset {
            Some(offset) => self.parse_multi_groups(&parser, offset as usize, &groups)?,
            None => (Vec::new(), Vec::new()),
        };

        let labels = EngineLabels::resolve(self.host)?;

        let control = ControlBlock::new(
            self.require_symbol(CACHE_ENTRIES_SYMBOL)?,
            self.require_symbol(LRU_HEAD_SYMBOL)?,
            self.require_symbol(MRU_SYMBOL)?,
            policy,
        );

        Ok(ParsedSnapshot::new(
            cache,
            storage,
            groups,
            multi_groups,
            multi_group_table,
            multi_group_offset.is_some(),
            labels,
            control,
        ))
    }

    /// Walk the scaled 16-bit group offsets up to `end` (exclusive, bytes into the
    /// tables page).
    fn parse_groups(
        &self,
        parser: &Parser<'_>,
        end: usize,
        storage: &StorageDescriptor,
    ) -> Result<Vec<OverlayGroup>> {
        let entry_size = self.config.entry_size_bytes();

        let read_offset = |group: usize| -> Result<u32> {
            let pos = group * 2;
            if pos + 2 > end {
                return Err(crate::Error::OutOfBounds);
            }
            Ok(u32::from(parser.peek_le_at::<u16>(pos)?) * entry_size)
        };

        // The first group always starts at the very beginning of storage.
        let mut prev_offset = read_offset(0)?;
        if prev_offset != 0 {
            return Err(malformed_error!(
                "offset of first overlay group is 0x{:x} not 0",
                prev_offset
            ));
        }

        let mut groups = Vec::new();
        loop {
            let next_offset = read_offset(groups.len() + 1)?;

            // An offset of 0 indicates the end of the group table.
            if next_offset == 0 {
                break;
            }
            if next_offset <= prev_offset {
                return Err(malformed_error!(
                    "overlay group offsets are not increasing: 0x{:x} after 0x{:x}",
                    next_offset,
                    prev_offset
                ));
            }

            let base = storage.start().wrapping_add(prev_offset);
            let size = next_offset - prev_offset;
            if u64::from(storage.start()) + u64::from(next_offset) > u64::from(storage.end()) {
                return Err(malformed_error!(
                    "overlay group {} [0x{:x}, 0x{:x}) extends past the storage region {}",
                    groups.len(),
                    base,
                    base.wrapping_add(size),
                    storage.region()
                ));
            }

            groups.push(OverlayGroup::new(groups.len() as u16, base, size));
            prev_offset = next_offset;
        }

        Ok(groups)
    }

    /// Walk the flat token array starting at byte `start` of the tables page.
    ///
    /// Returns the multi-groups and the flat table (zero separators included), the
    /// unit stack records index into.
    fn parse_multi_groups(
        &self,
        parser: &Parser<'_>,
        start: usize,
        groups: &[OverlayGroup],
    ) -> Result<(Vec<MultiGroup>, Vec<OverlayToken>)> {
        let mut multi_groups = Vec::new();
        let mut flat = Vec::new();
        let mut members: Vec<MultiGroupMember> = Vec::new();
        let mut first_member_index = 0u16;
        let mut terminated = false;

        let mut pos = start;
        while pos + 4 <= parser.len() {
            let token = OverlayToken::new(parser.peek_le_at::<u32>(pos)?);
            flat.push(token);
            pos += 4;

            if token.is_null() {
                // A zero in first-member position ends the whole table; otherwise it
                // just ends the current multi-group.
                if members.is_empty() {
                    terminated = true;
                    break;
                }
                let function_size = self.checked_function_size(&members, groups)?;
                multi_groups.push(MultiGroup::new(
                    multi_groups.len() as u16,
                    first_member_index,
                    std::mem::take(&mut members),
                    function_size,
                ));
                first_member_index = flat.len() as u16;
            } else {
                if members.is_empty() {
                    first_member_index = (flat.len() - 1) as u16;
                }
                members.push(self.resolve_member(token, groups)?);
            }
        }

        if !terminated {
            return Err(crate::Error::OutOfBounds);
        }

        Ok((multi_groups, flat))
    }

    fn resolve_member(
        &self,
        token: OverlayToken,
        groups: &[OverlayGroup],
    ) -> Result<MultiGroupMember> {
        if !token.is_overlay() || token.is_multi_group() {
            return Err(malformed_error!(
                "multi-group member {} is not a plain overlay token",
                token
            ));
        }
        if usize::from(token.group_id()) >= groups.len() {
            return Err(malformed_error!(
                "multi-group member {} names unknown overlay group {}",
                token,
                token.group_id()
            ));
        }
        Ok(MultiGroupMember::new(token))
    }

    /// All members of a multi-group alias one code block, so the span from each
    /// member's function offset to its group end must agree.
    fn checked_function_size(
        &self,
        members: &[MultiGroupMember],
        groups: &[OverlayGroup],
    ) -> Result<u32> {
        let mut size = None;
        for member in members {
            let group = groups[usize::from(member.group_id())];
            let member_size = group
                .size_bytes()
                .checked_sub(member.func_offset_bytes())
                .ok_or_else(|| {
                    malformed_error!(
                        "multi-group member {} offsets past its group end",
                        member.token()
                    )
                })?;
            match size {
                None => size = Some(member_size),
                Some(existing) if existing != member_size => {
                    return Err(malformed_error!(
                        "multiple sizes for multi-group: 0x{:x} and 0x{:x}",
                        existing,
                        member_size
                    ));
                }
                Some(_) => {}
            }
        }
        // Callers never pass an empty member list.
        size.ok_or_else(|| malformed_error!("multi-group with no members"))
    }
}
