//! Error types for mh-trace
//!
//! This module defines the error types returned by trace operations.

use thiserror::Error;

use crate::address::Address;

/// Error type for execution-trace operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TraceError {
    /// A proposal or record query named an address the trace does not hold
    #[error("Missing address in trace: {0}")]
    MissingAddress(Address),

    /// A proposal targeted an observed (conditioned) choice
    #[error("Cannot propose a change to conditioned address: {0}")]
    ConditionedAddress(Address),

    /// Rejection initialisation ran out of attempts
    #[error("Unsatisfiable conditioning: no satisfying trace after {attempts} attempts")]
    UnsatisfiableConditioning { attempts: usize },

    /// Two choice points resolved to the same address within one run
    #[error("Address collision: {0} was visited more than once in a single run")]
    AddressCollision(Address),

    /// The active-run stack did not have the expected depth when a run finished
    #[error("Execution context corrupted: expected depth {expected}, found {found}")]
    ContextCorrupted { expected: usize, found: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for trace operations
pub type TraceResult<T> = Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsatisfiable_display() {
        let err = TraceError::UnsatisfiableConditioning { attempts: 50 };
        assert_eq!(
            err.to_string(),
            "Unsatisfiable conditioning: no satisfying trace after 50 attempts"
        );
    }

    #[test]
    fn test_context_corrupted_display() {
        let err = TraceError::ContextCorrupted {
            expected: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Execution context corrupted: expected depth 2, found 1"
        );
    }

    #[test]
    fn test_missing_address_display() {
        let err = TraceError::MissingAddress(Address::root());
        assert_eq!(err.to_string(), "Missing address in trace: <root>");
    }

    #[test]
    fn test_errors_compare() {
        let a = TraceError::Serialization("bad".to_string());
        assert_eq!(a.clone(), a);
        assert_ne!(a, TraceError::UnsatisfiableConditioning { attempts: 1 });
    }
}
