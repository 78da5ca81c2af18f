use crate::host::{MemReader, TargetHost};
use crate::overlay::config::EvictionPolicy;
use crate::overlay::residency::CacheSlotState;
use crate::overlay::snapshot::ParsedSnapshot;
use crate::Result;

/// Link value marking the end of the least-recently-used chain.
pub const LRU_LINK_SENTINEL: u8 = 255;

/// The reconstructed least-recently-used order of the cache slots.
///
/// The engine keeps a singly-linked chain through one forward link per slot plus a
/// global head (the LRU slot) and a global most-recently-used index. The snapshot
/// is rebuilt from target memory on every query - eviction order changes with every
/// overlay load, so caching it across stops would lie.
///
/// Ranks are display information: rank 0 is the next eviction victim.
pub struct EvictionSnapshot {
    order: Vec<u8>,
}

impl EvictionSnapshot {
    /// Walk the live LRU chain and capture the slot order.
    ///
    /// # Errors
    /// [`Error::UnsupportedConfiguration`](crate::Error::UnsupportedConfiguration)
    /// has already been ruled out at snapshot build time (the policy byte is
    /// validated there); here a chain that neither terminates nor stays inside the
    /// working entries is [`Error::Malformed`](crate::Error::Malformed).
    pub fn rebuild(host: &dyn TargetHost, snapshot: &ParsedSnapshot) -> Result<Self> {
        // Single supported policy; the match keeps future variants honest.
        match snapshot.control().policy() {
            EvictionPolicy::Lru => {}
        }

        let mem = MemReader::new(host);
        let head = mem.read_u8(snapshot.control().lru_head_addr())?;
        let mru = mem.read_u8(snapshot.control().mru_addr())?;
        let working_entries = snapshot.cache().working_entries();

        if head == LRU_LINK_SENTINEL {
            // Nothing resident yet.
            return Ok(EvictionSnapshot { order: Vec::new() });
        }
        if u32::from(head) >= working_entries {
            return Err(malformed_error!(
                "LRU head {} outside the {} working cache entries",
                head,
                working_entries
            ));
        }

        // A single resident group spanning the whole working area links to itself
        // rather than to the sentinel; without this check the walk below would spin.
        if head == mru {
            return Ok(EvictionSnapshot { order: vec![head] });
        }

        let mut order = Vec::new();
        let mut slot = head;
        loop {
            order.push(slot);
            if order.len() > working_entries as usize {
                return Err(malformed_error!(
                    "LRU chain does not terminate within {} entries",
                    working_entries
                ));
            }
            if slot == mru {
                break;
            }
            let next = CacheSlotState::read(host, snapshot, u32::from(slot))?.lru_next();
            if next == LRU_LINK_SENTINEL {
                break;
            }
            if u32::from(next) >= working_entries {
                return Err(malformed_error!(
                    "LRU link {} -> {} outside the {} working cache entries",
                    slot,
                    next,
                    working_entries
                ));
            }
            slot = next;
        }

        Ok(EvictionSnapshot { order })
    }

    /// Slot indices in eviction order, least-recently-used first.
    #[must_use]
    pub fn order(&self) -> &[u8] {
        &self.order
    }

    /// Position of `slot` in eviction order, or `None` when it is not chained.
    #[must_use]
    pub fn rank_of(&self, slot: u32) -> Option<usize> {
        self.order
            .iter()
            .position(|candidate| u32::from(*candidate) == slot)
    }
}
