use crate::host::{Reg, RegisterSource, TargetHost};
use crate::overlay::{EngineConfig, OverlayStackFrame, ParsedSnapshot};
use crate::unwinder::phase::EnginePhase;
use crate::unwinder::provenance::scan_range;
use crate::unwinder::translate::translate_return_address;
use crate::Result;

/// Upper bound on overlay stack hops during one unwind operation.
///
/// The overlay stack is a small fixed pool; a walk that has not reached the bottom
/// sentinel within this many records is walking garbage.
pub const MAX_UNWIND_HOPS: usize = 64;

/// The caller's register state recovered by one unwind step.
///
/// `pc` of 0 reports the bottom of the overlay stack: the sentinel record's zeroed
/// return address, meaning there is no further caller to unwind to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UnwoundRegisters {
    /// The caller's program counter, translated to storage when it was cache resident.
    pub pc: u32,
    /// The caller's stack pointer.
    pub sp: u32,
    /// The caller's overlay stack frame pointer (t3).
    pub ovl_frame: u32,
    /// The caller's next-free overlay stack slot (t4).
    pub ovl_spare: u32,
}

/// Outcome of [`Unwinder::unwind_one_frame`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Unwound {
    /// The program counter was inside the engine; here is the caller's state.
    Caller(UnwoundRegisters),
    /// The program counter is outside the engine; conventional unwinding applies.
    NotApplicable,
}

/// Unwinds execution contexts stopped inside the overlay engine.
///
/// The engine's code is partitioned into phases by its resolved label set; each
/// phase determines how much caller state has been constructed or torn down, and
/// therefore where the caller's registers live: still in the register file, half
/// swapped (recovered by the provenance scan), or on the overlay stack.
pub struct Unwinder<'a> {
    host: &'a dyn TargetHost,
    config: &'a EngineConfig,
    snapshot: &'a ParsedSnapshot,
}

impl<'a> Unwinder<'a> {
    /// Create an unwinder over one parsed snapshot.
    #[must_use]
    pub fn new(
        host: &'a dyn TargetHost,
        config: &'a EngineConfig,
        snapshot: &'a ParsedSnapshot,
    ) -> Self {
        Unwinder {
            host,
            config,
            snapshot,
        }
    }

    fn read_frame(&self, address: u32) -> Result<OverlayStackFrame> {
        OverlayStackFrame::read(
            self.host,
            self.config,
            address,
            self.snapshot.is_multi_group_enabled(),
        )
    }

    /// Walk records from `start` until one carries a genuine caller.
    ///
    /// Records whose return address is the engine's return-path label are
    /// tail-chained engine re-entries; they contribute no real caller and are
    /// skipped. Terminal records (sentinel or zeroed) are returned as-is.
    fn pop_caller(&self, start: u32) -> Result<(OverlayStackFrame, u32)> {
        let ret_label = self.snapshot.labels().ret_from_callee();
        let mut address = start;

        for _ in 0..MAX_UNWIND_HOPS {
            let frame = self.read_frame(address)?;
            if frame.is_terminal() {
                return Ok((frame, address));
            }
            if frame.return_address() == ret_label {
                address = frame.previous_address();
                continue;
            }
            return Ok((frame, address));
        }

        Err(crate::Error::StackCorruption(format!(
            "no caller record within {MAX_UNWIND_HOPS} hops of {start:#010x}"
        )))
    }

    /// Build the caller state a popped record describes.
    fn caller_from_frame(
        &self,
        frame: &OverlayStackFrame,
        address: u32,
        sp: u32,
    ) -> Result<UnwoundRegisters> {
        if frame.is_terminal() {
            return Ok(UnwoundRegisters {
                pc: 0,
                sp,
                ovl_frame: address,
                ovl_spare: address,
            });
        }

        Ok(UnwoundRegisters {
            pc: self.caller_pc(frame, frame.return_address())?,
            sp,
            ovl_frame: frame.previous_address(),
            ovl_spare: address,
        })
    }

    /// Translate `ra` when it is cache resident, using `frame` as context.
    fn caller_pc(&self, frame: &OverlayStackFrame, ra: u32) -> Result<u32> {
        if !self.snapshot.cache().region().contains(ra) {
            return Ok(ra);
        }
        if !frame.token().is_overlay() {
            return Err(crate::Error::StackCorruption(format!(
                "cache-resident return address {ra:#010x} but record at {:#010x} holds no overlay token",
                frame.frame_address()
            )));
        }
        translate_return_address(self.snapshot, self.config, frame, ra)
    }

    /// Caller state when the registers still (or again) hold it directly.
    fn live_caller(&self, regs: &dyn RegisterSource) -> Result<UnwoundRegisters> {
        let ra = regs.read(Reg::RA)?;
        let t3 = regs.read(Reg::T3)?;

        let pc = if self.snapshot.cache().region().contains(ra) {
            let frame = self.read_frame(t3)?;
            self.caller_pc(&frame, ra)?
        } else {
            ra
        };

        Ok(UnwoundRegisters {
            pc,
            sp: regs.read(Reg::SP)?,
            ovl_frame: t3,
            ovl_spare: regs.read(Reg::T4)?,
        })
    }

    fn recover_or_corrupt(
        &self,
        scan: &crate::unwinder::provenance::ScanState,
        target: Reg,
        regs: &dyn RegisterSource,
    ) -> Result<u32> {
        scan.recover_entry(target, regs)?.ok_or_else(|| {
            crate::Error::StackCorruption(format!(
                "cannot recover phase-entry value of {}",
                target.name()
            ))
        })
    }

    /// Produce the caller's unwound register set for a stop at `pc`.
    ///
    /// Returns [`Unwound::NotApplicable`] when `pc` is outside the engine's code
    /// range; the conventional unwinder handles those frames.
    ///
    /// # Errors
    /// [`Error::StackCorruption`](crate::Error::StackCorruption) when the overlay
    /// stack or the mid-phase register state does not support a coherent answer;
    /// memory and register read failures propagate.
    pub fn unwind_one_frame(&self, pc: u32, regs: &dyn RegisterSource) -> Result<Unwound> {
        let Some(phase) = self.snapshot.labels().classify(pc) else {
            return Ok(Unwound::NotApplicable);
        };

        let caller = match phase {
            // Caller state is exactly the current registers (either nothing has been
            // adjusted yet, or everything has already been restored).
            EnginePhase::BeforeContextSwitch
            | EnginePhase::PreReturn
            | EnginePhase::AtReturn
            | EnginePhase::AfterExit => self.live_caller(regs)?,

            // The new record is mid-construction: recover the phase-entry register
            // values, then read the caller state from them.
            EnginePhase::ContextSwitchSetup => {
                let start = self.snapshot.labels().phase_start(phase);
                let scan = scan_range(self.host, start, pc)?;

                let ra = self.recover_or_corrupt(&scan, Reg::RA, regs)?;
                let sp = self.recover_or_corrupt(&scan, Reg::SP, regs)?;
                let t3 = self.recover_or_corrupt(&scan, Reg::T3, regs)?;
                // The next-free pointer may legitimately be unrecoverable while it
                // is being swapped; the current value is the best answer then.
                let t4 = scan
                    .recover_entry(Reg::T4, regs)?
                    .map_or_else(|| regs.read(Reg::T4), Ok)?;

                let pc = if self.snapshot.cache().region().contains(ra) {
                    let frame = self.read_frame(t3)?;
                    self.caller_pc(&frame, ra)?
                } else {
                    ra
                };

                UnwoundRegisters {
                    pc,
                    sp,
                    ovl_frame: t3,
                    ovl_spare: t4,
                }
            }

            // The record is committed: the caller lives on the overlay stack.
            EnginePhase::BeforeInvoke | EnginePhase::AfterReturn => {
                let (frame, address) = self.pop_caller(regs.read(Reg::T3)?)?;
                self.caller_from_frame(&frame, address, regs.read(Reg::SP)?)?
            }

            // Teardown is partially executed: recover the phase-entry chain pointer
            // and stack pointer first, then pop as usual.
            EnginePhase::ReturnContextSwitch => {
                let start = self.snapshot.labels().phase_start(phase);
                let scan = scan_range(self.host, start, pc)?;

                let sp = self.recover_or_corrupt(&scan, Reg::SP, regs)?;
                let t3 = self.recover_or_corrupt(&scan, Reg::T3, regs)?;

                let (frame, address) = self.pop_caller(t3)?;
                self.caller_from_frame(&frame, address, sp)?
            }
        };

        Ok(Unwound::Caller(caller))
    }

    /// Walk the whole overlay call chain from a stop at `pc`.
    ///
    /// The first entry is the engine's immediate caller (when `pc` is inside the
    /// engine); every further entry comes from popping one overlay stack record,
    /// until the bottom sentinel or `max_frames` is reached. When `pc` is outside
    /// the engine the walk starts directly from the live chain pointer.
    ///
    /// # Errors
    /// As [`Self::unwind_one_frame`]; a corrupted record aborts the walk with the
    /// frames collected so far discarded.
    pub fn backtrace(
        &self,
        pc: u32,
        regs: &dyn RegisterSource,
        max_frames: usize,
    ) -> Result<Vec<UnwoundRegisters>> {
        let mut frames = Vec::new();

        let (mut chain, sp) = match self.unwind_one_frame(pc, regs)? {
            Unwound::Caller(caller) => {
                let next = (caller.ovl_frame, caller.sp);
                frames.push(caller);
                next
            }
            Unwound::NotApplicable => (regs.read(Reg::T3)?, regs.read(Reg::SP)?),
        };

        while frames.len() < max_frames {
            let (frame, address) = self.pop_caller(chain)?;
            if frame.is_terminal() {
                break;
            }
            let caller = self.caller_from_frame(&frame, address, sp)?;
            chain = caller.ovl_frame;
            frames.push(caller);
        }

        Ok(frames)
    }
}
