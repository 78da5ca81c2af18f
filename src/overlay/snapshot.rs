use std::sync::Arc;

use crate::host::TargetHost;
use crate::overlay::config::{EngineConfig, EvictionPolicy};
use crate::overlay::group::{MultiGroup, OverlayGroup};
use crate::overlay::region::{CacheDescriptor, StorageDescriptor};
use crate::overlay::tables::TableLoader;
use crate::overlay::token::OverlayToken;
use crate::unwinder::EngineLabels;
use crate::Result;

/// Resolved addresses of the engine control block fields the walkers read live.
#[derive(Clone, Copy, Debug)]
pub struct ControlBlock {
    slots_base: u32,
    lru_head_addr: u32,
    mru_addr: u32,
    policy: EvictionPolicy,
}

impl ControlBlock {
    pub(crate) fn new(
        slots_base: u32,
        lru_head_addr: u32,
        mru_addr: u32,
        policy: EvictionPolicy,
    ) -> Self {
        ControlBlock {
            slots_base,
            lru_head_addr,
            mru_addr,
            policy,
        }
    }

    /// Base address of the per-slot metadata array.
    #[must_use]
    pub fn slots_base(&self) -> u32 {
        self.slots_base
    }

    /// Address of the least-recently-used head index byte.
    #[must_use]
    pub fn lru_head_addr(&self) -> u32 {
        self.lru_head_addr
    }

    /// Address of the most-recently-used index byte.
    #[must_use]
    pub fn mru_addr(&self) -> u32 {
        self.mru_addr
    }

    /// The engine build's eviction policy.
    #[must_use]
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }
}

/// Everything reconstructed from one parse of the overlay tables.
///
/// A snapshot bundles the region descriptors, the group and multi-group tables, the
/// engine's code labels and the control block addresses. It is immutable once built
/// and shared by every reader; live cache contents (slot metadata, the overlay
/// stack) are deliberately *not* part of it, they are reread on every walk.
#[derive(Debug)]
pub struct ParsedSnapshot {
    cache: CacheDescriptor,
    storage: StorageDescriptor,
    groups: Vec<OverlayGroup>,
    multi_groups: Vec<MultiGroup>,
    multi_group_table: Vec<OverlayToken>,
    multi_group_enabled: bool,
    labels: EngineLabels,
    control: ControlBlock,
}

impl ParsedSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cache: CacheDescriptor,
        storage: StorageDescriptor,
        groups: Vec<OverlayGroup>,
        multi_groups: Vec<MultiGroup>,
        multi_group_table: Vec<OverlayToken>,
        multi_group_enabled: bool,
        labels: EngineLabels,
        control: ControlBlock,
    ) -> Self {
        ParsedSnapshot {
            cache,
            storage,
            groups,
            multi_groups,
            multi_group_table,
            multi_group_enabled,
            labels,
            control,
        }
    }

    /// The overlay cache descriptor.
    #[must_use]
    pub fn cache(&self) -> &CacheDescriptor {
        &self.cache
    }

    /// The overlay storage descriptor.
    #[must_use]
    pub fn storage(&self) -> &StorageDescriptor {
        &self.storage
    }

    /// All overlay groups, in table order.
    #[must_use]
    pub fn groups(&self) -> &[OverlayGroup] {
        &self.groups
    }

    /// Number of overlay groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Look up the group with the given id.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an id outside the table; ids come from
    /// live target data, so an unknown one means corruption, not a usage bug.
    pub fn group(&self, id: u16) -> Result<&OverlayGroup> {
        self.groups
            .get(usize::from(id))
            .ok_or_else(|| malformed_error!("unknown overlay group id {}", id))
    }

    /// All multi-groups, in table order.
    #[must_use]
    pub fn multi_groups(&self) -> &[MultiGroup] {
        &self.multi_groups
    }

    /// Number of multi-groups.
    #[must_use]
    pub fn multi_group_count(&self) -> usize {
        self.multi_groups.len()
    }

    /// Whether the engine build carries multi-group support.
    #[must_use]
    pub fn is_multi_group_enabled(&self) -> bool {
        self.multi_group_enabled
    }

    /// The token at `index` of the flat multi-group table (separators included).
    ///
    /// Overlay stack records store these flat indices.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] when the index is outside the table or
    /// names a separator slot.
    pub fn multi_group_token_at(&self, index: u16) -> Result<OverlayToken> {
        match self.multi_group_table.get(usize::from(index)) {
            Some(token) if !token.is_null() => Ok(*token),
            Some(_) => Err(malformed_error!(
                "multi-group table index {} is a separator",
                index
            )),
            None => Err(malformed_error!(
                "multi-group table index {} out of range ({} entries)",
                index,
                self.multi_group_table.len()
            )),
        }
    }

    /// Resolve `token` to a plain (single-group) token.
    ///
    /// Plain tokens resolve to themselves. Multi-group tokens resolve through the
    /// flat table using the index an overlay stack record captured at call time.
    ///
    /// # Errors
    /// [`crate::Error::StackCorruption`] when a multi-group token arrives without a
    /// recorded index, [`crate::Error::Malformed`] when the index does not name a
    /// plain member token.
    pub fn resolve_token(
        &self,
        token: OverlayToken,
        mg_index: Option<u16>,
    ) -> Result<OverlayToken> {
        if !token.is_multi_group() {
            return Ok(token);
        }
        let index = mg_index.ok_or_else(|| {
            crate::Error::StackCorruption(format!(
                "multi-group token {token} without a recorded table entry"
            ))
        })?;
        let resolved = self.multi_group_token_at(index)?;
        if !resolved.is_overlay() || resolved.is_multi_group() {
            return Err(malformed_error!(
                "multi-group table entry {} resolves to non-plain token {}",
                index,
                resolved
            ));
        }
        Ok(resolved)
    }

    /// The engine's resolved code labels.
    #[must_use]
    pub fn labels(&self) -> &EngineLabels {
        &self.labels
    }

    /// The resolved control block addresses.
    #[must_use]
    pub fn control(&self) -> &ControlBlock {
        &self.control
    }
}

/// The snapshot lifecycle: lazy parse, explicit invalidation, reset detection.
///
/// Owns the only mutable state in the library. A rebuild constructs a complete
/// snapshot into a local before publishing it, so readers never observe a partial
/// one and a failed rebuild leaves the previous snapshot in place. When the host
/// reports the engine uninitialised (target reset or reloaded), any cached snapshot
/// is dropped so the next successful fetch reparses.
#[derive(Default)]
pub(crate) struct EngineState {
    snapshot: Option<Arc<ParsedSnapshot>>,
}

impl EngineState {
    pub(crate) fn new() -> Self {
        EngineState { snapshot: None }
    }

    /// Fetch the current snapshot, parsing at most once until invalidated.
    pub(crate) fn fetch(
        &mut self,
        host: &dyn TargetHost,
        config: &EngineConfig,
        force_reload: bool,
    ) -> Result<Arc<ParsedSnapshot>> {
        if !host.is_engine_initialized() {
            self.snapshot = None;
            return Err(crate::Error::NotInitialized);
        }

        if !force_reload {
            if let Some(snapshot) = &self.snapshot {
                return Ok(Arc::clone(snapshot));
            }
        }

        let fresh = Arc::new(TableLoader::new(host, config).load()?);
        self.snapshot = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    /// Drop the cached snapshot; the next fetch reparses.
    pub(crate) fn invalidate(&mut self) {
        self.snapshot = None;
    }

    pub(crate) fn cached(&self) -> Option<&Arc<ParsedSnapshot>> {
        self.snapshot.as_ref()
    }
}
