//! # ovlscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and
//! traits from the ovlscope library. Import this module to get quick access to the
//! essential types for overlay state reconstruction.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ovlscope operations
pub use crate::Error;

/// The result type used throughout ovlscope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Central entry point for overlay state reconstruction
pub use crate::OverlayScope;

/// Displayable summary of the current overlay state
pub use crate::StatusReport;

// ================================================================================================
// Host Interfaces
// ================================================================================================

/// The collaborator trait connecting the core to a target
pub use crate::host::TargetHost;

/// Register identities and register file access
pub use crate::host::{HostRegisters, Reg, RegisterFile, RegisterSource};

/// Ready-made hosts for raw dumps and ELF symbol tables
pub use crate::host::{SnapshotHost, SymbolIndex};

// ================================================================================================
// Overlay Data Model
// ================================================================================================

/// Build-time engine parameters
pub use crate::overlay::{EngineConfig, EvictionPolicy, MgIndexOffset};

/// The opaque 32-bit call handle
pub use crate::overlay::OverlayToken;

/// Region descriptors
pub use crate::overlay::{CacheDescriptor, MemoryRegion, StorageDescriptor};

/// Table model
pub use crate::overlay::{MultiGroup, MultiGroupMember, OverlayGroup};

/// The parsed tables snapshot
pub use crate::overlay::ParsedSnapshot;

/// Live cache state
pub use crate::overlay::{CacheSlotState, EvictionSnapshot, ResidentOverlay, SlotFlags};

/// Overlay stack records
pub use crate::overlay::OverlayStackFrame;

// ================================================================================================
// Unwinding
// ================================================================================================

/// The engine's label set and phase classification
pub use crate::unwinder::{EngineLabels, EnginePhase};

/// Unwinding results
pub use crate::unwinder::{Unwound, UnwoundRegisters};
