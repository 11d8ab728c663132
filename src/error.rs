// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy (§7): configuration/interface/resource errors are
//! synchronous `Result` failures; numerical errors are accumulated into
//! [`ErrorCounters`] and never fail a `step()` call.

use thiserror::Error;

/// Top-level error returned by the public kernel interface.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Bad or unknown configuration option, or unsupported schema version.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Null/unknown handle, too-small buffer, or unknown field name.
    #[error("interface error: {0}")]
    Interface(#[from] InterfaceError),
    /// Allocation failure at create/reset-from-snapshot time.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    /// Snapshot/replay integrity failure.
    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),
}

/// Configuration-layer errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A grid dimension was zero or otherwise out of range.
    #[error("invalid grid dimensions: {nx}x{ny}x{nz}")]
    InvalidGrid {
        /// Requested x dimension.
        nx: u32,
        /// Requested y dimension.
        ny: u32,
        /// Requested z dimension.
        nz: u32,
    },
    /// `theta_r >= theta_s`, or other soil-parameter invariant violated.
    #[error("invalid soil parameters: {0}")]
    InvalidSoilParams(String),
    /// The schema version in a config/snapshot is not supported.
    #[error("unsupported schema version: {0}")]
    UnsupportedSchemaVersion(u32),
    /// An unrecognized configuration key or value.
    #[error("unknown configuration option: {0}")]
    UnknownOption(String),
}

/// Interface-layer errors (never mutate state).
#[derive(Debug, Error)]
pub enum InterfaceError {
    /// The caller-supplied buffer is too small for the requested field.
    #[error("buffer too small: need {needed}, have {available}")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes actually supplied.
        available: usize,
    },
    /// The named field does not exist in this kernel's schema.
    #[error("unknown field name: {0}")]
    UnknownField(String),
    /// Configuration mismatch between a snapshot and the live handle.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),
}

/// Resource-allocation errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The sparse grid's memory budget would be exceeded.
    #[error("sparse grid memory budget exceeded: requested {requested}, budget {budget}")]
    BudgetExceeded {
        /// Bytes requested.
        requested: usize,
        /// Configured budget.
        budget: usize,
    },
}

/// Snapshot/replay integrity errors.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Magic bytes did not match the expected value.
    #[error("bad magic: expected {expected:#x}, got {got:#x}")]
    BadMagic {
        /// Expected magic constant.
        expected: u64,
        /// Magic bytes actually present.
        got: u64,
    },
    /// `data_size` in the snapshot header did not match the payload length.
    #[error("data size mismatch: header says {declared}, payload has {actual}")]
    DataSizeMismatch {
        /// Declared size in bytes.
        declared: u32,
        /// Actual payload size in bytes.
        actual: u32,
    },
    /// The event-log hash chain was broken at the given event id.
    #[error("hash chain broken at event {0}")]
    ChainBroken(u64),
    /// A replayed `simulation_step` produced a state hash other than the
    /// one recorded in the log.
    #[error("replay state hash mismatch at step {step}: expected {expected:#018x}, got {actual:#018x}")]
    ReplayHashMismatch {
        /// The step number at which replay diverged.
        step: u64,
        /// Hash recorded in the event log.
        expected: u64,
        /// Hash recomputed during replay.
        actual: u64,
    },
}

/// Kernel-private, snapshot-only counters for numerical error conditions.
///
/// `step()` never fails because of these; they are surfaced only through
/// `query_error_flags`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorCounters {
    overflow: u64,
    div_by_zero: u64,
    picard_nonconvergence: u64,
    newton_nonconvergence: u64,
    integrator_fallback: u64,
    barrier_saturation: u64,
}

/// A point-in-time snapshot of [`ErrorCounters`], returned to hosts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ErrorFlags {
    /// Count of saturating-arithmetic overflow events.
    pub overflow: u64,
    /// Count of division-by-zero guards tripped.
    pub div_by_zero: u64,
    /// Count of HYD Picard-iteration non-convergences.
    pub picard_nonconvergence: u64,
    /// Count of Clebsch-collective Newton-iteration non-convergences.
    pub newton_nonconvergence: u64,
    /// Count of integrator fallbacks to a single Newton step.
    pub integrator_fallback: u64,
    /// Count of barrier-potential exhaustion events.
    pub barrier_saturation: u64,
    /// Running total across all of the above.
    pub total: u64,
}

impl ErrorCounters {
    /// Records a saturating-arithmetic overflow.
    pub fn record_overflow(&mut self) {
        self.overflow += 1;
    }

    /// Records a division-by-zero guard trip.
    pub fn record_div_by_zero(&mut self) {
        self.div_by_zero += 1;
    }

    /// Records a Picard-iteration non-convergence in HYD's vertical solve.
    pub fn record_picard_nonconvergence(&mut self) {
        self.picard_nonconvergence += 1;
    }

    /// Records a Newton-iteration non-convergence in the Clebsch step.
    pub fn record_newton_nonconvergence(&mut self) {
        self.newton_nonconvergence += 1;
    }

    /// Records an integrator fallback to a single Newton step.
    pub fn record_integrator_fallback(&mut self) {
        self.integrator_fallback += 1;
    }

    /// Records a barrier-potential exhaustion event.
    pub fn record_barrier_saturation(&mut self) {
        self.barrier_saturation += 1;
    }

    /// Returns an immutable snapshot suitable for `query_error_flags`.
    #[must_use]
    pub fn snapshot(&self) -> ErrorFlags {
        let total = self.overflow
            + self.div_by_zero
            + self.picard_nonconvergence
            + self.newton_nonconvergence
            + self.integrator_fallback
            + self.barrier_saturation;
        ErrorFlags {
            overflow: self.overflow,
            div_by_zero: self.div_by_zero,
            picard_nonconvergence: self.picard_nonconvergence,
            newton_nonconvergence: self.newton_nonconvergence,
            integrator_fallback: self.integrator_fallback,
            barrier_saturation: self.barrier_saturation,
            total,
        }
    }
}
