//! Error types.
//!
//! Parameter and perception failures are recoverable: they abort the decision step of one
//! driver and are surfaced to the caller. Defects in the parameter registry itself are not
//! represented here, they panic during start-up.

use crate::perception::RelativeLane;
use thiserror::Error;

/// Errors raised by a [ParameterSet](crate::ParameterSet).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Parameter '{id}' cannot be set to {value}")]
    InvalidValue { id: &'static str, value: f64 },

    #[error("Parameter '{id}' value {value} violates constraint: {constraint}")]
    ConstraintViolated {
        id: &'static str,
        value: f64,
        constraint: &'static str,
    },

    #[error("Parameter '{id}' value {value} rejected: {reason}")]
    CheckFailed {
        id: &'static str,
        value: f64,
        reason: String,
    },

    #[error("Parameter '{id}' is claimed by another owner")]
    Claimed { id: &'static str },

    #[error("Parameter '{id}' has no value to reset to")]
    NoResetHistory { id: &'static str },

    #[error("Parameter '{id}' is not set")]
    Missing { id: &'static str },

    #[error("Unknown parameter '{id}'")]
    UnknownParameter { id: String },
}

/// Errors raised when a driver's perception lacks required information.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerceptionError {
    #[error("Perception category '{category}' is not available")]
    MissingCategory { category: &'static str },

    #[error("Lane {lane:?} is not perceived")]
    NoSuchLane { lane: RelativeLane },
}

/// The reasons a driver's decision step can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Perception(#[from] PerceptionError),
}
