//! Crate-level error aggregation.
//!
//! Each module defines its own `thiserror` enum for the failures specific to
//! its stage (construction, building, execution, observation); this module
//! only rolls them up into one type for callers who want a single `Result`
//! alias across the whole pipeline, mirroring `core/src/error.rs`'s
//! per-subsystem-enum-feeding-one-crate-enum shape.

use thiserror::Error;

use crate::builder::FlowBuildError;
use crate::flow::FlowExecError;
use crate::message::MessageConstructError;
use crate::node::NodeConstructError;
use crate::observer::ObserverError;

/// Any failure this crate can produce, grouped by the stage that raised it.
#[derive(Debug, Error)]
pub enum ClearFlowError {
    #[error("node construction failed: {0}")]
    NodeConstruct(#[from] NodeConstructError),

    #[error("message construction failed: {0}")]
    MessageConstruct(#[from] MessageConstructError),

    #[error("flow build failed: {0}")]
    FlowBuild(#[from] FlowBuildError),

    #[error("flow execution failed: {0}")]
    FlowExec(#[from] FlowExecError),

    #[error("observer dispatch failed: {0}")]
    Observer(#[from] ObserverError),
}

/// Convenience alias for callers who want one `Result` type across every
/// stage rather than matching each module's own error individually.
pub type Result<T> = std::result::Result<T, ClearFlowError>;
