//! Error types.

use thiserror::Error;

/// Errors that can occur when opening a measurement.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// Per-byte rates are undefined for empty transfers. Callers must reject
    /// zero-sized objects before opening a measurement; this error is the
    /// loud failure for anything that slips through, so that `Infinity` or
    /// `NaN` never reaches a metrics backend.
    #[error("object size must be positive, got {0}")]
    InvalidObjectSize(u64),
}
