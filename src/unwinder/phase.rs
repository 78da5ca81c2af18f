use strum::Display;

use crate::host::TargetHost;
use crate::Result;

/// Symbol names of the engine's code labels, in code order.
///
/// The engine's assembly core exports one label per phase boundary. Their relative
/// layout differs between toolchain revisions, so the resolved set is validated
/// rather than assumed; only the names are fixed.
pub const LABEL_SYMBOLS: [&str; 8] = [
    "comrvEntry",
    "comrvEntry_context_switch",
    "comrv_invoke_callee",
    "comrv_ret_from_callee",
    "comrv_ret_from_callee_context_switch",
    "comrv_exit",
    "comrv_exit_ret",
    "comrv_end",
];

/// Resolved addresses of the engine's well-known code labels.
///
/// The label set partitions the engine's code into the contiguous phases of
/// [`EnginePhase`]; [`EngineLabels::classify`] dispatches a program counter onto
/// them. Monotonic code order is validated at resolution time so a mislinked image
/// cannot produce overlapping phases.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EngineLabels {
    entry: u32,
    context_switch: u32,
    invoke_callee: u32,
    ret_from_callee: u32,
    ret_context_switch: u32,
    exit: u32,
    exit_ret: u32,
    end: u32,
}

impl EngineLabels {
    /// Resolve the label set from the target's symbols.
    ///
    /// # Errors
    /// [`Error::SymbolMissing`](crate::Error::SymbolMissing) for an unresolvable
    /// label, [`Error::Malformed`](crate::Error::Malformed) when the resolved
    /// addresses are not in code order.
    pub fn resolve(host: &dyn TargetHost) -> Result<Self> {
        let mut addrs = [0u32; 8];
        for (slot, name) in addrs.iter_mut().zip(LABEL_SYMBOLS) {
            *slot = host
                .resolve_symbol_address(name)
                .ok_or_else(|| crate::Error::SymbolMissing(name.to_string()))?;
        }
        EngineLabels::from_addresses(addrs)
    }

    /// Build a label set from already resolved addresses, in [`LABEL_SYMBOLS`] order.
    ///
    /// # Errors
    /// [`Error::Malformed`](crate::Error::Malformed) when the addresses are not
    /// strictly increasing.
    pub fn from_addresses(addrs: [u32; 8]) -> Result<Self> {
        for (i, window) in addrs.windows(2).enumerate() {
            if window[0] >= window[1] {
                return Err(malformed_error!(
                    "engine labels out of order: {} (0x{:x}) is not below {} (0x{:x})",
                    LABEL_SYMBOLS[i],
                    window[0],
                    LABEL_SYMBOLS[i + 1],
                    window[1]
                ));
            }
        }
        Ok(EngineLabels {
            entry: addrs[0],
            context_switch: addrs[1],
            invoke_callee: addrs[2],
            ret_from_callee: addrs[3],
            ret_context_switch: addrs[4],
            exit: addrs[5],
            exit_ret: addrs[6],
            end: addrs[7],
        })
    }

    /// The engine entry label.
    #[must_use]
    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// Start of new-frame construction.
    #[must_use]
    pub fn context_switch(&self) -> u32 {
        self.context_switch
    }

    /// Frame committed; the jump into the callee follows.
    #[must_use]
    pub fn invoke_callee(&self) -> u32 {
        self.invoke_callee
    }

    /// Entry of the return path.
    ///
    /// Overlay stack records carrying this address as their return address are
    /// tail-chained engine re-entries, not real callers.
    #[must_use]
    pub fn ret_from_callee(&self) -> u32 {
        self.ret_from_callee
    }

    /// Start of the return path's frame teardown.
    #[must_use]
    pub fn ret_context_switch(&self) -> u32 {
        self.ret_context_switch
    }

    /// Registers fully restored; about to return.
    #[must_use]
    pub fn exit(&self) -> u32 {
        self.exit
    }

    /// The return instruction itself.
    #[must_use]
    pub fn exit_ret(&self) -> u32 {
        self.exit_ret
    }

    /// First address past the engine's code.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Whether `pc` falls inside the engine's code range.
    #[must_use]
    pub fn contains(&self, pc: u32) -> bool {
        pc >= self.entry && pc < self.end
    }

    /// Classify `pc` onto an engine phase, or `None` outside the engine.
    #[must_use]
    pub fn classify(&self, pc: u32) -> Option<EnginePhase> {
        if !self.contains(pc) {
            return None;
        }
        Some(if pc < self.context_switch {
            EnginePhase::BeforeContextSwitch
        } else if pc < self.invoke_callee {
            EnginePhase::ContextSwitchSetup
        } else if pc < self.ret_from_callee {
            EnginePhase::BeforeInvoke
        } else if pc < self.ret_context_switch {
            EnginePhase::AfterReturn
        } else if pc < self.exit {
            EnginePhase::ReturnContextSwitch
        } else if pc < self.exit_ret {
            EnginePhase::PreReturn
        } else if pc == self.exit_ret {
            EnginePhase::AtReturn
        } else {
            EnginePhase::AfterExit
        })
    }

    /// The label a phase's straight-line code starts at.
    ///
    /// This is where the provenance scan begins for phases that need it.
    #[must_use]
    pub fn phase_start(&self, phase: EnginePhase) -> u32 {
        match phase {
            EnginePhase::BeforeContextSwitch => self.entry,
            EnginePhase::ContextSwitchSetup => self.context_switch,
            EnginePhase::BeforeInvoke => self.invoke_callee,
            EnginePhase::AfterReturn => self.ret_from_callee,
            EnginePhase::ReturnContextSwitch => self.ret_context_switch,
            EnginePhase::PreReturn => self.exit,
            EnginePhase::AtReturn => self.exit_ret,
            EnginePhase::AfterExit => self.exit_ret,
        }
    }
}

/// The engine phases a stopped program counter can fall into.
///
/// One state per contiguous code range of the engine's assembly core; the unwinder
/// dispatches on the phase to decide how much of the caller's state has already
/// been constructed or torn down.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum EnginePhase {
    /// Nothing adjusted yet; the caller's registers are the current ones.
    #[strum(serialize = "before context switch")]
    BeforeContextSwitch,
    /// The new overlay stack record is being constructed.
    #[strum(serialize = "context switch setup")]
    ContextSwitchSetup,
    /// The record is committed; the engine is about to jump into the callee.
    #[strum(serialize = "before invoking callee")]
    BeforeInvoke,
    /// Returned from the callee, before its frame teardown begins.
    #[strum(serialize = "after return from callee")]
    AfterReturn,
    /// Mid frame-teardown on the return path.
    #[strum(serialize = "return context switch")]
    ReturnContextSwitch,
    /// Registers fully restored, before the return instruction.
    #[strum(serialize = "before final return")]
    PreReturn,
    /// Stopped exactly on the return instruction.
    #[strum(serialize = "at return instruction")]
    AtReturn,
    /// Past the return instruction but still before the engine end label.
    #[strum(serialize = "after return")]
    AfterExit,
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn labels() -> EngineLabels {
        EngineLabels::from_addresses([
            0x100, 0x120, 0x140, 0x160, 0x180, 0x1a0, 0x1b0, 0x1c0,
        ])
        .unwrap()
    }

    #[test]
    fn test_labels_must_be_ordered() {
        let result =
            EngineLabels::from_addresses([0x100, 0x120, 0x120, 0x160, 0x180, 0x1a0, 0x1b0, 0x1c0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_classify_phase_boundaries() {
        let labels = labels();

        assert_eq!(labels.classify(0xff), None);
        assert_eq!(labels.classify(0x1c0), None);

        assert_eq!(
            labels.classify(0x100),
            Some(EnginePhase::BeforeContextSwitch)
        );
        assert_eq!(
            labels.classify(0x11e),
            Some(EnginePhase::BeforeContextSwitch)
        );
        assert_eq!(labels.classify(0x120), Some(EnginePhase::ContextSwitchSetup));
        assert_eq!(labels.classify(0x140), Some(EnginePhase::BeforeInvoke));
        assert_eq!(labels.classify(0x160), Some(EnginePhase::AfterReturn));
        assert_eq!(
            labels.classify(0x180),
            Some(EnginePhase::ReturnContextSwitch)
        );
        assert_eq!(labels.classify(0x1a0), Some(EnginePhase::PreReturn));
        assert_eq!(labels.classify(0x1b0), Some(EnginePhase::AtReturn));
        assert_eq!(labels.classify(0x1b2), Some(EnginePhase::AfterExit));
    }

    // One regression check per adjacent label pair, so a relayout of the engine
    // that reorders labels fails loudly here rather than misclassifying.
    #[test]
    fn test_each_label_pair_bounds_its_phase() {
        let labels = labels();
        let pairs = [
            (labels.entry(), labels.context_switch()),
            (labels.context_switch(), labels.invoke_callee()),
            (labels.invoke_callee(), labels.ret_from_callee()),
            (labels.ret_from_callee(), labels.ret_context_switch()),
            (labels.ret_context_switch(), labels.exit()),
            (labels.exit(), labels.exit_ret()),
        ];
        for (start, end) in pairs {
            let at_start = labels.classify(start).unwrap();
            let before_end = labels.classify(end - 2).unwrap();
            assert_eq!(at_start, before_end);
            assert_ne!(Some(at_start), labels.classify(end));
        }
    }
}
