//! Unwinding through the overlay engine's assembly core.
//!
//! A backtrace that hits the engine cannot use conventional frame unwinding: the
//! engine maintains its own overlay stack, the return address a caller left behind
//! may point at a cache slot that now holds different code, and a stop can land in
//! the middle of the engine's register shuffling. This module carries the backtrace
//! across all of that:
//!
//! - [`EngineLabels`] / [`EnginePhase`] - partition the engine's code into phases by
//!   its resolved label set and classify a stopped program counter
//! - [`rv32`] / [`provenance`] - a typed instruction-word decoder and the three-state
//!   register provenance scan for phases that stop mid-update
//! - [`Unwinder`] - the per-phase state machine producing the caller's registers
//! - [`translate_return_address`] - cache-to-storage return address translation
//! - [`token_argument`] - the synthetic token argument for frame decoration

mod decorate;
mod phase;
pub mod provenance;
pub mod rv32;
mod translate;
mod unwind;

pub use decorate::token_argument;
pub use phase::{EngineLabels, EnginePhase, LABEL_SYMBOLS};
pub use translate::translate_return_address;
pub use unwind::{Unwinder, Unwound, UnwoundRegisters, MAX_UNWIND_HOPS};
