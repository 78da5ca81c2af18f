//! The overlay engine's data model and its reconstruction from target memory.
//!
//! This module holds everything that can be known about the overlay system from a
//! stopped target: the cache and storage regions, the group and multi-group tables
//! (rebuilt from the tables page by [`TableLoader`]), the live cache residency and
//! eviction order, and the records of the engine's private overlay stack.
//!
//! # Key Components
//!
//! - [`OverlayToken`] - The opaque 32-bit call handle
//! - [`MemoryRegion`], [`CacheDescriptor`], [`StorageDescriptor`] - Region model
//! - [`OverlayGroup`], [`MultiGroup`], [`MultiGroupMember`] - Table model
//! - [`EngineConfig`] - Build-time engine parameters, validated up front
//! - [`TableLoader`] / [`ParsedSnapshot`] - Table reconstruction and its cached form
//! - [`ResidencyWalker`] / [`CacheSlotState`] - Live cache walking
//! - [`EvictionSnapshot`] - Least-recently-used order reconstruction
//! - [`OverlayStackFrame`] - One overlay stack record

mod config;
mod eviction;
mod group;
mod region;
mod residency;
mod snapshot;
mod stack;
mod tables;
mod token;

pub use config::{
    EngineConfig, EvictionPolicy, MgIndexOffset, DEFAULT_ENTRY_SIZE_BYTES,
    DEFAULT_MAX_GROUP_SIZE_BYTES,
};
pub use eviction::{EvictionSnapshot, LRU_LINK_SENTINEL};
pub use group::{MultiGroup, MultiGroupMember, OverlayGroup, EMPTY_SLOT_GROUP_ID};
pub use region::{CacheDescriptor, MemoryRegion, StorageDescriptor};
pub use residency::{CacheSlotState, ResidencyWalker, ResidentOverlay, SlotFlags};
pub use snapshot::{ControlBlock, ParsedSnapshot};
pub use stack::{OverlayStackFrame, END_OF_STACK_OFFSET};
pub use tables::TableLoader;
pub use token::OverlayToken;

pub(crate) use snapshot::EngineState;

/// Base symbol of the engine's control block.
pub const CONTROL_BLOCK_SYMBOL: &str = "g_stComrvCB";
/// Control block byte set once the engine has loaded its tables.
pub const INIT_FLAG_SYMBOL: &str = "g_stComrvCB.ucTablesLoaded";
/// Control block halfword holding the multi-group table offset in 2-byte units.
///
/// Absent from engine builds without multi-group support.
pub const MULTI_GROUP_OFFSET_SYMBOL: &str = "g_stComrvCB.ucMultiGroupOffset";
/// Control block byte holding the least-recently-used head slot index.
pub const LRU_HEAD_SYMBOL: &str = "g_stComrvCB.ucLruIndex";
/// Control block byte holding the most-recently-used slot index.
pub const MRU_SYMBOL: &str = "g_stComrvCB.ucMruIndex";
/// Control block byte naming the eviction policy; absent on LRU-only builds.
pub const EVICTION_POLICY_SYMBOL: &str = "g_stComrvCB.ucEvictionPolicy";
/// Base of the per-slot cache metadata array.
pub const CACHE_ENTRIES_SYMBOL: &str = "g_stComrvCB.stOverlayCache";
/// First address of the overlay storage area.
pub const STORAGE_START_SYMBOL: &str = "OVERLAY_START_OF_OVERLAYS";
/// First address past the overlay storage area.
pub const STORAGE_END_SYMBOL: &str = "OVERLAY_END_OF_OVERLAYS";
/// First address of the overlay cache area.
pub const CACHE_START_SYMBOL: &str = "__OVERLAY_CACHE_START__";
/// First address past the overlay cache area.
pub const CACHE_END_SYMBOL: &str = "__OVERLAY_CACHE_END__";

/// Field offsets of the control block head, for symbol indexes that must synthesise
/// the dotted field paths a debugger would resolve from debug information.
///
/// The per-build tail fields (the multi-group offset behind the slot array) depend
/// on the cache entry count; see
/// [`SymbolIndex::insert_field`](crate::host::SymbolIndex::insert_field).
#[must_use]
pub fn control_block_field_offsets() -> &'static [(&'static str, u32)] {
    &[
        ("ucLruIndex", 0),
        ("ucMruIndex", 1),
        ("ucTablesLoaded", 2),
        ("ucEvictionPolicy", 3),
        ("stOverlayCache", 4),
    ]
}
