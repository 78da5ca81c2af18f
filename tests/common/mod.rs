//! Shared synthetic-target builder for the integration suites.
//!
//! Builds a complete little-endian memory image the way the engine leaves one
//! behind: storage and cache regions, the tables page in the last cache entry, the
//! control block with per-slot metadata and LRU indices, an overlay stack, and a
//! code area carrying the engine labels.

#![allow(dead_code)]

use ovlscope::host::{SnapshotHost, SymbolIndex};
use ovlscope::overlay;
use ovlscope::unwinder::LABEL_SYMBOLS;

pub const STORAGE_START: u32 = 0x1000_0000;
pub const STORAGE_END: u32 = 0x1001_0000;
pub const CACHE_START: u32 = 0x1002_0000;
pub const CACHE_END: u32 = 0x1002_1000; // 8 entries of 512 bytes
pub const ENTRY_SIZE: u32 = 512;
pub const TABLES_BASE: u32 = CACHE_END - ENTRY_SIZE;
pub const WORKING_ENTRIES: u32 = 7;

pub const CB_BASE: u32 = 0x1003_0000;
pub const CB_LRU: u32 = CB_BASE;
pub const CB_MRU: u32 = CB_BASE + 1;
pub const CB_INIT: u32 = CB_BASE + 2;
pub const CB_POLICY: u32 = CB_BASE + 3;
pub const SLOTS_BASE: u32 = CB_BASE + 4;
pub const CB_MG_OFFSET: u32 = SLOTS_BASE + WORKING_ENTRIES * 8;

pub const STACK_TOP: u32 = 0x1004_0000;

pub const LABEL_ENTRY: u32 = 0x1005_0000;
pub const LABEL_CONTEXT_SWITCH: u32 = 0x1005_0040;
pub const LABEL_INVOKE: u32 = 0x1005_0080;
pub const LABEL_RET: u32 = 0x1005_00c0;
pub const LABEL_RET_CS: u32 = 0x1005_0100;
pub const LABEL_EXIT: u32 = 0x1005_0140;
pub const LABEL_EXIT_RET: u32 = 0x1005_0180;
pub const LABEL_END: u32 = 0x1005_01c0;

pub const IMAGE_BASE: u32 = STORAGE_START;
pub const IMAGE_SIZE: usize = 0x5_1000;

/// Raw token for an unoccupied cache slot (group id field all ones).
pub const EMPTY_SLOT_TOKEN: u32 = 0x0001_fffe;

pub struct TargetBuilder {
    bytes: Vec<u8>,
    symbols: SymbolIndex,
}

impl TargetBuilder {
    /// A consistent baseline: initialised engine, the stock group table
    /// `[0, 1, 3, 5, 0]`, all slots empty, LRU chain empty, no multi-groups.
    pub fn new() -> Self {
        let mut symbols = SymbolIndex::empty();
        symbols.insert(overlay::STORAGE_START_SYMBOL, STORAGE_START);
        symbols.insert(overlay::STORAGE_END_SYMBOL, STORAGE_END);
        symbols.insert(overlay::CACHE_START_SYMBOL, CACHE_START);
        symbols.insert(overlay::CACHE_END_SYMBOL, CACHE_END);
        symbols.insert(overlay::INIT_FLAG_SYMBOL, CB_INIT);
        symbols.insert(overlay::LRU_HEAD_SYMBOL, CB_LRU);
        symbols.insert(overlay::MRU_SYMBOL, CB_MRU);
        symbols.insert(overlay::CACHE_ENTRIES_SYMBOL, SLOTS_BASE);

        let labels = [
            LABEL_ENTRY,
            LABEL_CONTEXT_SWITCH,
            LABEL_INVOKE,
            LABEL_RET,
            LABEL_RET_CS,
            LABEL_EXIT,
            LABEL_EXIT_RET,
            LABEL_END,
        ];
        for (name, addr) in LABEL_SYMBOLS.iter().zip(labels) {
            symbols.insert(name, addr);
        }

        let mut builder = TargetBuilder {
            bytes: vec![0u8; IMAGE_SIZE],
            symbols,
        };

        builder.put_u8(CB_INIT, 1);
        builder.lru(255, 255);
        for slot in 0..WORKING_ENTRIES {
            builder.slot_raw(slot, 255, 255, 0, EMPTY_SLOT_TOKEN);
        }
        builder.group_table(&[0, 1, 3, 5, 0]);
        builder
    }

    pub fn put_u8(&mut self, addr: u32, value: u8) {
        let offset = (addr - IMAGE_BASE) as usize;
        self.bytes[offset] = value;
    }

    pub fn put_u16(&mut self, addr: u32, value: u16) {
        let offset = (addr - IMAGE_BASE) as usize;
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, addr: u32, value: u32) {
        let offset = (addr - IMAGE_BASE) as usize;
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write the scaled group offsets at the tables base.
    pub fn group_table(&mut self, scaled_offsets: &[u16]) {
        for (index, offset) in scaled_offsets.iter().enumerate() {
            self.put_u16(TABLES_BASE + 2 * index as u32, *offset);
        }
    }

    /// Enable multi-group support: register the offset symbol, store the offset
    /// (`mg_offset_bytes` past the tables base, in 2-byte units) and the token
    /// stream.
    pub fn multi_groups(&mut self, mg_offset_bytes: u16, tokens: &[u32]) {
        self.symbols
            .insert(overlay::MULTI_GROUP_OFFSET_SYMBOL, CB_MG_OFFSET);
        self.put_u16(CB_MG_OFFSET, mg_offset_bytes / 2);
        for (index, token) in tokens.iter().enumerate() {
            self.put_u32(TABLES_BASE + u32::from(mg_offset_bytes) + 4 * index as u32, *token);
        }
    }

    /// Expose an eviction policy byte through its optional symbol.
    pub fn policy_byte(&mut self, value: u8) {
        self.symbols
            .insert(overlay::EVICTION_POLICY_SYMBOL, CB_POLICY);
        self.put_u8(CB_POLICY, value);
    }

    pub fn not_initialized(&mut self) {
        self.put_u8(CB_INIT, 0);
    }

    pub fn lru(&mut self, head: u8, mru: u8) {
        self.put_u8(CB_LRU, head);
        self.put_u8(CB_MRU, mru);
    }

    /// Write one slot metadata record from raw parts.
    pub fn slot_raw(&mut self, index: u32, lru_prev: u8, lru_next: u8, props: u8, token: u32) {
        let base = SLOTS_BASE + index * 8;
        self.put_u8(base, lru_prev);
        self.put_u8(base + 1, lru_next);
        self.put_u8(base + 2, props);
        self.put_u32(base + 4, token);
    }

    /// Mark `index` occupied by `group_id` with the given loaded size.
    pub fn occupy_slot(
        &mut self,
        index: u32,
        group_id: u16,
        size_units: u8,
        lru_prev: u8,
        lru_next: u8,
    ) {
        let token = (u32::from(group_id) << 1) | 1;
        let props = (size_units & 0xf) << 2;
        self.slot_raw(index, lru_prev, lru_next, props, token);
    }

    /// Write one overlay stack record (12-byte layout, no multi-group field).
    pub fn frame(&mut self, addr: u32, ra: u32, token: u32, offset: u16, align: u8) {
        self.put_u32(addr, ra);
        self.put_u32(addr + 4, token);
        self.put_u16(addr + 8, offset);
        self.put_u8(addr + 10, align);
    }

    /// Write one overlay stack record with a 16-bit multi-group index at byte 14.
    pub fn frame_mg(
        &mut self,
        addr: u32,
        ra: u32,
        token: u32,
        offset: u16,
        align: u8,
        mg_index: i16,
    ) {
        self.frame(addr, ra, token, offset, align);
        self.put_u16(addr + 14, mg_index as u16);
    }

    /// Write instruction halfwords at `addr` (RV32C granularity).
    pub fn code(&mut self, addr: u32, halfwords: &[u16]) {
        for (index, halfword) in halfwords.iter().enumerate() {
            self.put_u16(addr + 2 * index as u32, *halfword);
        }
    }

    pub fn build(self) -> SnapshotHost {
        SnapshotHost::new(self.bytes, IMAGE_BASE, self.symbols)
    }
}

impl Default for TargetBuilder {
    fn default() -> Self {
        TargetBuilder::new()
    }
}

/// A plain token for `group_id` with a byte function offset.
pub fn token(group_id: u16, func_offset_bytes: u32) -> u32 {
    ((func_offset_bytes / 4) & 0x3ff) << 17 | (u32::from(group_id) << 1) | 1
}

/// A multi-group token for multi-group `number`.
pub fn mg_token(number: u16) -> u32 {
    (1 << 31) | (u32::from(number) << 1) | 1
}
