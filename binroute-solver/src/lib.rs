//! Drives the external route-optimisation executable.
//!
//! The optimiser is an opaque program taking a distance matrix, node
//! weights, vehicle capacities and a strategy code as positional arguments
//! and printing one route per line. [`SolverProcess`] owns the single child
//! process, [`WireFormat`] encodes requests and decodes routes, and
//! [`solve_with_strategies`] runs a problem through several strategies and
//! keeps the distinct results.

#![forbid(unsafe_code)]

mod process;
mod strategy;
mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use process::{SolverProcess, SolverProcessConfig, SolverProcessError};
pub use strategy::{RouteSolver, RoutingProblem, solve_with_strategies};
pub use wire::{WireError, WireFormat};
