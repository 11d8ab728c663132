// SPDX-License-Identifier: Apache-2.0
//! A deterministic regenerative-ecosystem physics kernel.
//!
//! Fixed-point numerics and table-driven transcendentals (`math`) drive a
//! cubed-sphere grid of soil columns (`grid`, `geom`) through an
//! operator-split hydrology/vegetation cascade (`hyd`, `reg`), advanced by
//! structure-preserving integrators (`integrators`) under a temporal-cascade
//! scheduler (`scheduler`), with every step replayable from a hash-chained
//! event log (`eventlog`). See [`kernel::NegentopKernel`] for the public
//! entry point.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod eventlog;
pub mod geom;
pub mod grid;
pub mod hyd;
pub mod integrators;
pub mod kernel;
pub mod math;
pub mod reg;
pub mod scheduler;

pub use error::{ConfigError, ErrorCounters, ErrorFlags, IntegrityError, InterfaceError, KernelError, ResourceError};
pub use kernel::{NegentopKernel, StepOutcome};
