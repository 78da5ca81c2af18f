use crate::host::{Reg, RegisterSource, TargetHost};
use crate::overlay::{EngineConfig, OverlayStackFrame, OverlayToken, ParsedSnapshot};
use crate::unwinder::phase::EnginePhase;
use crate::Result;

/// Find the overlay token that acts as the synthetic call argument of an engine frame.
///
/// Debugger front-ends present a stop inside the engine as a call like
/// `overlay_dispatch(token=0x...)`; this locates the token for that display. Before
/// the new overlay stack record is committed the token still sits in the token
/// register (t5); afterwards it is the committed record's token field.
///
/// The lookup is read-only and deliberately tolerant: mid-transition states where
/// the token is not (yet) anywhere coherent yield `Ok(None)` rather than an error,
/// as do unreadable registers or memory - an unavailable decoration must never
/// break the backtrace that asked for it.
pub fn token_argument(
    host: &dyn TargetHost,
    config: &EngineConfig,
    snapshot: &ParsedSnapshot,
    pc: u32,
    regs: &dyn RegisterSource,
) -> Result<Option<OverlayToken>> {
    let Some(phase) = snapshot.labels().classify(pc) else {
        return Ok(None);
    };

    let token = match phase {
        // The engine was just entered; the callee token is still in t5.
        EnginePhase::BeforeContextSwitch | EnginePhase::ContextSwitchSetup => {
            match regs.read(Reg::T5) {
                Ok(value) => Some(OverlayToken::new(value)),
                Err(_) => None,
            }
        }

        // The record is committed (or being torn down); its token field is
        // authoritative even where t5 has been repurposed.
        EnginePhase::BeforeInvoke
        | EnginePhase::AfterReturn
        | EnginePhase::ReturnContextSwitch
        | EnginePhase::PreReturn
        | EnginePhase::AtReturn
        | EnginePhase::AfterExit => {
            let frame = regs.read(Reg::T3).ok().and_then(|t3| {
                OverlayStackFrame::read(host, config, t3, snapshot.is_multi_group_enabled()).ok()
            });
            frame.map(|frame| frame.token())
        }
    };

    // A value without the overlay indication is not a token; the engine is mid
    // transition (or the caller was a plain address call).
    Ok(token.filter(|token| token.is_overlay() && !token.is_null()))
}
