// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # ovlscope
//!
//! A framework for reconstructing, inspecting and unwinding the state of a software-managed
//! code-overlay engine from a RISC-V firmware memory image. Built in pure Rust, `ovlscope`
//! rebuilds the overlay group and multi-group tables, walks the live overlay cache, and
//! carries stack backtraces through the overlay engine's assembly core - without any
//! assumptions about the debugger front-end hosting it.
//!
//! ## Features
//!
//! - **📦 Table reconstruction** - Rebuild the overlay group/multi-group tables from the
//!   cache-resident tables page of a raw memory image
//! - **🔍 Residency walking** - Enumerate which overlay groups occupy which cache slots,
//!   including lock state and least-recently-used eviction order
//! - **⚡ Engine-aware unwinding** - Translate cache-resident return addresses back to
//!   their storage equivalents and unwind calls that are mid-flight inside the engine
//! - **🛡️ Corruption tolerant** - Bounded scans and typed errors everywhere; corrupted
//!   tables can never hang a walk or poison a previously parsed snapshot
//! - **🧩 Host agnostic** - One narrow [`host::TargetHost`] trait connects the library to
//!   a live debug session, a core dump, or a synthetic test image
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ovlscope::prelude::*;
//!
//! // A raw RAM dump plus the symbols of the firmware ELF make a host.
//! let symbols = SymbolIndex::from_file("firmware.elf".as_ref())?;
//! let host = SnapshotHost::from_file("ram.bin".as_ref(), 0x8000_0000, symbols)?;
//!
//! let mut scope = OverlayScope::new(host, EngineConfig::default());
//! let snapshot = scope.get_snapshot(false)?;
//! println!("{} overlay groups", snapshot.group_count());
//! # Ok::<(), ovlscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `ovlscope` is organized into three layers:
//!
//! - [`host`] - The collaborator seam: target memory reads, symbol resolution, register
//!   access, plus ready-made hosts for raw snapshot files and ELF symbol tables
//! - [`overlay`] - The data model: regions, tokens, groups, the table loader, the
//!   cache-residency walker, eviction-order reconstruction and the overlay stack records
//! - [`unwinder`] - The engine-phase state machine: program-counter classification,
//!   a light register-provenance scan over the engine's straight-line code, return
//!   address translation and frame decoration
//!
//! The central object is [`OverlayScope`], which owns a host, a validated
//! [`EngineConfig`](overlay::EngineConfig) and the memoized
//! [`ParsedSnapshot`](overlay::ParsedSnapshot).
//!
//! ### Overlay engine background
//!
//! Memory-constrained RISC-V targets run overlaid code through a small assembly engine
//! (ComRV and its descendants): relocatable "overlay groups" live in a large, slow
//! storage region and are paged on demand into a fixed-size cache of 512-byte entries,
//! whose final entry holds the offset tables this library parses. Calls into overlaid
//! code go through opaque 32-bit tokens and leave bookkeeping records on a private
//! overlay stack, which is what makes backtraces possible after a group has been
//! evicted or reloaded at a different cache address.
//!
//! ### Testing
//!
//! The test suite builds complete synthetic target images (tables page, control block,
//! overlay stack) and runs every exposed operation against them:
//!
//! ```bash
//! cargo test
//! cargo bench   # snapshot parse + backtrace micro benchmarks
//! ```

#[macro_use]
pub(crate) mod error;

pub mod host;
pub mod overlay;
pub mod unwinder;

/// Convenient re-exports of the most commonly used types and traits.
///
/// This module provides a curated selection of the most frequently used types
/// from across the ovlscope library, allowing for convenient glob imports.
///
/// # Example
///
/// ```rust,no_run
/// use ovlscope::prelude::*;
///
/// let symbols = SymbolIndex::from_file("firmware.elf".as_ref())?;
/// let host = SnapshotHost::from_file("ram.bin".as_ref(), 0x8000_0000, symbols)?;
/// let mut scope = OverlayScope::new(host, EngineConfig::default());
/// # Ok::<(), ovlscope::Error>(())
/// ```
pub mod prelude;

mod scope;

pub use error::Error;
pub use scope::{OverlayScope, StatusReport};

/// Specialized [`Result`](std::result::Result) type for overlay reconstruction operations.
///
/// All fallible operations of this library resolve to this type, with [`Error`]
/// covering the full taxonomy from collaborator failures to stack corruption.
pub type Result<T> = std::result::Result<T, Error>;
