//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent violated construction preconditions.
/// These are independent of I/O and configuration concerns.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("school has no items: {0}")]
    EmptySchool(String),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("arborescence solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("no spanning arborescence rooted at {root}: {unreached} node(s) unreachable")]
    ArborescenceInfeasible { root: String, unreached: usize },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
