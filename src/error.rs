//! Unified error surface for the Forge core.
//!
//! Each subsystem raises its own typed error; [`ForgeError`] lets the
//! embeddable facade (and the ambient HTTP layer) handle all four with one
//! `match`. Background loops never propagate these — they log and continue,
//! 

use thiserror::Error;

use crate::alerts::AlertError;
use crate::metrics::MetricError;
use crate::wasm::WasmError;
use crate::workflow::WorkflowError;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error(transparent)]
    Metric(#[from] MetricError),
    #[error(transparent)]
    Alert(#[from] AlertError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Wasm(#[from] WasmError),
    #[error("store error: {0}")]
    Store(String),
}

/// Policy-level errors shared across subsystems (cancellation, deadlines).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}
