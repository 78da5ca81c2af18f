use std::fmt;
use std::sync::Arc;

use crate::host::{RegisterSource, TargetHost};
use crate::overlay::{
    EngineConfig, EngineState, MultiGroup, OverlayGroup, OverlayStackFrame, OverlayToken,
    ParsedSnapshot, ResidencyWalker, ResidentOverlay,
};
use crate::unwinder::{token_argument, Unwinder, Unwound, UnwoundRegisters};
use crate::Result;

/// The central entry point: one target's overlay state, reconstructed on demand.
///
/// An `OverlayScope` owns the collaborator host, the validated engine configuration
/// and the memoized [`ParsedSnapshot`]. All exposed operations run synchronously to
/// completion; the only mutable state is the snapshot cache, rebuilt lazily after
/// [`OverlayScope::invalidate`] or a target reset and never published half-built.
///
/// # Examples
///
/// ```rust,no_run
/// use ovlscope::prelude::*;
///
/// let symbols = SymbolIndex::from_file("firmware.elf".as_ref())?;
/// let host = SnapshotHost::from_file("ram.bin".as_ref(), 0x8000_0000, symbols)?;
/// let mut scope = OverlayScope::new(host, EngineConfig::default());
///
/// scope.walk_residency(|resident| {
///     println!(
///         "group {} at cache {:#010x}, eviction rank {:?}",
///         resident.group_id, resident.cache_address, resident.eviction_rank
///     );
///     true
/// })?;
/// # Ok::<(), ovlscope::Error>(())
/// ```
pub struct OverlayScope<H: TargetHost> {
    host: H,
    config: EngineConfig,
    state: EngineState,
}

impl<H: TargetHost> OverlayScope<H> {
    /// Create a scope over `host` with the engine's build-time `config`.
    #[must_use]
    pub fn new(host: H, config: EngineConfig) -> Self {
        OverlayScope {
            host,
            config,
            state: EngineState::new(),
        }
    }

    /// The collaborator host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch the parsed snapshot, rebuilding it when forced or not yet cached.
    ///
    /// # Errors
    /// [`Error::NotInitialized`](crate::Error::NotInitialized) until the engine has
    /// loaded its tables; parse errors abort the rebuild and leave any previously
    /// cached snapshot in place.
    pub fn get_snapshot(&mut self, force_reload: bool) -> Result<Arc<ParsedSnapshot>> {
        self.state.fetch(&self.host, &self.config, force_reload)
    }

    /// Drop the cached snapshot; the next access reparses.
    ///
    /// Call after the target reset, reloaded its image, or on an explicit re-parse
    /// request from the user.
    pub fn invalidate(&mut self) {
        self.state.invalidate();
    }

    /// Visit every overlay group currently resident in the cache, in slot order.
    ///
    /// The visitor returns `true` to continue, `false` to stop early. See
    /// [`ResidentOverlay`] for what each visit carries.
    ///
    /// # Errors
    /// Snapshot errors as [`Self::get_snapshot`]; live-state read failures abort
    /// the walk.
    pub fn walk_residency<F>(&mut self, visitor: F) -> Result<()>
    where
        F: FnMut(&ResidentOverlay) -> bool,
    {
        let snapshot = self.get_snapshot(false)?;
        ResidencyWalker::new(&self.host, &snapshot).walk(visitor)
    }

    /// Produce the caller's register state for a context stopped at `pc`.
    ///
    /// Returns [`Unwound::NotApplicable`] when `pc` is outside the engine.
    ///
    /// # Errors
    /// As [`Unwinder::unwind_one_frame`].
    pub fn unwind_one_frame(
        &mut self,
        pc: u32,
        regs: &dyn RegisterSource,
    ) -> Result<Unwound> {
        let snapshot = self.get_snapshot(false)?;
        Unwinder::new(&self.host, &self.config, &snapshot).unwind_one_frame(pc, regs)
    }

    /// Walk the whole overlay call chain from a stop at `pc`.
    ///
    /// # Errors
    /// As [`Unwinder::backtrace`].
    pub fn backtrace(
        &mut self,
        pc: u32,
        regs: &dyn RegisterSource,
        max_frames: usize,
    ) -> Result<Vec<UnwoundRegisters>> {
        let snapshot = self.get_snapshot(false)?;
        Unwinder::new(&self.host, &self.config, &snapshot).backtrace(pc, regs, max_frames)
    }

    /// Translate a cache-resident address back to its storage equivalent.
    ///
    /// `frame` is the overlay stack record that produced the address; see
    /// [`translate_return_address`](crate::unwinder::translate_return_address).
    ///
    /// # Errors
    /// [`Error::Usage`](crate::Error::Usage) when the address is not inside the
    /// cache or the record holds no overlay token.
    pub fn translate_address(
        &mut self,
        cache_address: u32,
        frame: &OverlayStackFrame,
    ) -> Result<u32> {
        let snapshot = self.get_snapshot(false)?;
        crate::unwinder::translate_return_address(&snapshot, &self.config, frame, cache_address)
    }

    /// Read one overlay stack record at `address`.
    ///
    /// Raw access for drivers that dump the overlay stack; walking and
    /// interpretation belong to [`Self::backtrace`].
    ///
    /// # Errors
    /// Snapshot and memory read errors propagate.
    pub fn read_stack_frame(&mut self, address: u32) -> Result<OverlayStackFrame> {
        let snapshot = self.get_snapshot(false)?;
        OverlayStackFrame::read(
            &self.host,
            &self.config,
            address,
            snapshot.is_multi_group_enabled(),
        )
    }

    /// The synthetic token argument of an engine frame, for display.
    ///
    /// # Errors
    /// Snapshot errors as [`Self::get_snapshot`]; an unavailable token is `Ok(None)`,
    /// never an error.
    pub fn token_argument(
        &mut self,
        pc: u32,
        regs: &dyn RegisterSource,
    ) -> Result<Option<OverlayToken>> {
        let snapshot = self.get_snapshot(false)?;
        token_argument(&self.host, &self.config, &snapshot, pc, regs)
    }

    /// Collect a displayable summary of the current overlay state.
    ///
    /// # Errors
    /// As [`Self::get_snapshot`] and [`Self::walk_residency`].
    pub fn status_report(&mut self) -> Result<StatusReport> {
        let snapshot = self.get_snapshot(false)?;

        let mut residents = Vec::new();
        ResidencyWalker::new(&self.host, &snapshot).walk(|resident| {
            residents.push(*resident);
            true
        })?;

        Ok(StatusReport {
            storage: *snapshot.storage(),
            cache: *snapshot.cache(),
            groups: snapshot.groups().to_vec(),
            multi_groups: snapshot.multi_groups().to_vec(),
            residents,
        })
    }
}

/// A plain-data summary of the overlay state, ready for display.
///
/// Rendering is the front-end's business; the provided [`fmt::Display`] produces
/// the conventional tabular form for terminals.
pub struct StatusReport {
    /// The storage descriptor.
    pub storage: crate::overlay::StorageDescriptor,
    /// The cache descriptor.
    pub cache: crate::overlay::CacheDescriptor,
    /// All overlay groups.
    pub groups: Vec<OverlayGroup>,
    /// All multi-groups.
    pub multi_groups: Vec<MultiGroup>,
    /// Currently resident groups, in slot order.
    pub residents: Vec<ResidentOverlay>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Overlay regions:")?;
        writeln!(f, "  {:<9}{:<12}{:<12}{:<8}", "Region", "Start", "End", "Size")?;
        for (name, region) in [
            ("storage", self.storage.region()),
            ("cache", self.cache.region()),
        ] {
            writeln!(
                f,
                "  {:<9}{:<#12x}{:<#12x}{:<#8x}",
                name,
                region.start(),
                region.end(),
                region.size_bytes()
            )?;
        }

        writeln!(f, "Overlay groups:")?;
        writeln!(f, "  {:<7}{:<12}{:<12}{:<8}", "Group", "Start", "End", "Size")?;
        for group in &self.groups {
            writeln!(
                f,
                "  {:<7}{:<#12x}{:<#12x}{:<#8x}",
                group.id(),
                group.base_address(),
                group.end_address(),
                group.size_bytes()
            )?;
        }

        writeln!(f, "Overlay multi-groups:")?;
        if self.multi_groups.is_empty() {
            writeln!(f, "  Not supported in this engine build.")?;
        } else {
            writeln!(f, "  {:<7}{:<12}{:<9}{:<8}", "Group", "Token", "Overlay", "Offset")?;
            for mg in &self.multi_groups {
                for member in mg.members() {
                    writeln!(
                        f,
                        "  {:<7}{:<12}{:<9}{:<#8x}",
                        mg.number(),
                        member.token(),
                        member.group_id(),
                        member.func_offset_bytes()
                    )?;
                }
            }
        }

        writeln!(f, "Current overlay mappings:")?;
        if self.residents.is_empty() {
            writeln!(f, "  No overlay groups are currently mapped.")?;
        } else {
            writeln!(
                f,
                "  {:<7}{:<9}{:<12}{:<12}{:<8}{:<6}",
                "Slot", "Group", "Storage", "Cache", "Size", "LRU"
            )?;
            for resident in &self.residents {
                let rank = resident
                    .eviction_rank
                    .map_or_else(|| "-".to_string(), |rank| rank.to_string());
                writeln!(
                    f,
                    "  {:<7}{:<9}{:<#12x}{:<#12x}{:<#8x}{:<6}",
                    resident.slot,
                    resident.group_id,
                    resident.storage_address,
                    resident.cache_address,
                    resident.length_bytes,
                    rank
                )?;
            }
        }

        Ok(())
    }
}
