use bitflags::bitflags;
use log::warn;

use crate::host::{MemReader, TargetHost};
use crate::overlay::eviction::EvictionSnapshot;
use crate::overlay::group::EMPTY_SLOT_GROUP_ID;
use crate::overlay::snapshot::ParsedSnapshot;
use crate::overlay::token::OverlayToken;
use crate::Result;

/// Byte stride of one per-slot metadata record in the control block.
pub(crate) const SLOT_RECORD_SIZE: u32 = 8;

bitflags! {
    /// Lock and content bits of a cache slot's property byte.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct SlotFlags: u8 {
        /// Slot is locked by the end user and cannot be evicted.
        const EVICT_LOCK = 0b0000_0001;
        /// Slot holds overlay data rather than code.
        const DATA = 0b0000_0010;
        /// Slot is mid-load (or user-held data) and its memory cannot move.
        const ENTRY_LOCK = 0b0100_0000;
    }
}

/// Live metadata of one cache slot, read fresh from the control block.
#[derive(Clone, Copy, Debug)]
pub struct CacheSlotState {
    slot: u32,
    lru_prev: u8,
    lru_next: u8,
    properties: u8,
    token: OverlayToken,
}

impl CacheSlotState {
    /// Read the metadata record of slot `index`.
    pub fn read(host: &dyn TargetHost, snapshot: &ParsedSnapshot, index: u32) -> Result<Self> {
        let mem = MemReader::new(host);
        let base = snapshot.control().slots_base() + index * SLOT_RECORD_SIZE;
        Ok(CacheSlotState {
            slot: index,
            lru_prev: mem.read_u8(base)?,
            lru_next: mem.read_u8(base + 1)?,
            properties: mem.read_u8(base + 2)?,
            token: OverlayToken::new(mem.read_u32(base + 4)?),
        })
    }

    /// The slot index this record describes.
    #[must_use]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// The id of the group loaded here; the empty sentinel when unoccupied.
    #[must_use]
    pub fn group_id(&self) -> u16 {
        self.token.group_id()
    }

    /// Whether the slot currently holds a group.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.group_id() != EMPTY_SLOT_GROUP_ID
    }

    /// Loaded group size in entry-size units, from the property bits.
    #[must_use]
    pub fn size_in_min_units(&self) -> u8 {
        (self.properties >> 2) & 0xf
    }

    /// The slot's lock and content bits.
    #[must_use]
    pub fn flags(&self) -> SlotFlags {
        SlotFlags::from_bits_truncate(self.properties)
    }

    /// The token the engine loaded this slot for.
    #[must_use]
    pub fn token(&self) -> OverlayToken {
        self.token
    }

    /// Backward link of the eviction chain.
    #[must_use]
    pub fn lru_prev(&self) -> u8 {
        self.lru_prev
    }

    /// Forward link of the eviction chain.
    #[must_use]
    pub fn lru_next(&self) -> u8 {
        self.lru_next
    }
}

/// One resident overlay group, as reported to the residency visitor.
#[derive(Clone, Copy, Debug)]
pub struct ResidentOverlay {
    /// The resident group's id.
    pub group_id: u16,
    /// Index of the first cache slot the group occupies.
    pub slot: u32,
    /// The group's storage address (where it was loaded from).
    pub storage_address: u32,
    /// The group's current cache address.
    pub cache_address: u32,
    /// The group's size in bytes, from the group table.
    pub length_bytes: u32,
    /// Lock and content bits of the slot.
    pub flags: SlotFlags,
    /// The token the slot was loaded for.
    pub token: OverlayToken,
    /// Position in least-recently-used order, when the slot is chained.
    pub eviction_rank: Option<usize>,
}

/// Walks the live cache and reports each resident overlay group.
///
/// Occupied slots advance the walk by the loaded size so multi-entry groups are
/// visited once; a corrupt zero size is coerced to a single-entry stride, which
/// keeps the walk moving and is logged rather than failed.
pub struct ResidencyWalker<'a> {
    host: &'a dyn TargetHost,
    snapshot: &'a ParsedSnapshot,
}

impl<'a> ResidencyWalker<'a> {
    /// Create a walker over the live cache described by `snapshot`.
    #[must_use]
    pub fn new(host: &'a dyn TargetHost, snapshot: &'a ParsedSnapshot) -> Self {
        ResidencyWalker { host, snapshot }
    }

    /// Visit every resident overlay group in slot order.
    ///
    /// The visitor returns `true` to continue, `false` to stop the walk early.
    ///
    /// # Errors
    /// Propagates memory read failures and corrupt control-block contents; the walk
    /// itself always terminates within the working entries.
    pub fn walk<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&ResidentOverlay) -> bool,
    {
        let eviction = EvictionSnapshot::rebuild(self.host, self.snapshot)?;
        let cache = self.snapshot.cache();

        let mut index = 0u32;
        while index < cache.working_entries() {
            let state = CacheSlotState::read(self.host, self.snapshot, index)?;

            if !state.is_occupied() {
                index += 1;
                continue;
            }

            let group = self.snapshot.group(state.group_id())?;
            let resident = ResidentOverlay {
                group_id: state.group_id(),
                slot: index,
                storage_address: group.base_address(),
                cache_address: cache.entry_address(index),
                length_bytes: group.size_bytes(),
                flags: state.flags(),
                token: state.token(),
                eviction_rank: eviction.rank_of(index),
            };

            if !visitor(&resident) {
                return Ok(());
            }

            let mut stride = u32::from(state.size_in_min_units());
            if stride == 0 {
                // An occupied slot advertising size 0 means corrupted metadata; a
                // single-entry stride keeps the walk from sticking here.
                warn!(
                    "cache slot {index} holds group {} but advertises size 0, advancing by 1",
                    state.group_id()
                );
                stride = 1;
            }
            index += stride;
        }

        Ok(())
    }
}
