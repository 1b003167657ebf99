//! Solver strategies and the routes they produce.
//!
//! Routes refer to graph-local indices, not record ids. Index `0` is always
//! the depot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Heuristic the route-optimization engine should use.
///
/// The set is fixed and ordered; [`RoutingStrategy::ALL`] lists it in the
/// order multi-strategy runs execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    /// Let the engine pick.
    Automatic,
    /// Extend the route with the cheapest arc from its end.
    PathCheapestArc,
    /// Clarke-Wright savings.
    Savings,
    /// Angular sweep around the depot.
    Sweep,
    /// Christofides tour construction.
    Christofides,
    /// Cheapest insertion across all routes at once.
    ParallelCheapestInsertion,
    /// Cheapest insertion, one node at a time in creation order.
    LocalCheapestInsertion,
    /// Connect the globally cheapest arcs first.
    GlobalCheapestArc,
}

impl RoutingStrategy {
    /// Every strategy, in execution order.
    pub const ALL: [Self; 8] = [
        Self::Automatic,
        Self::PathCheapestArc,
        Self::Savings,
        Self::Sweep,
        Self::Christofides,
        Self::ParallelCheapestInsertion,
        Self::LocalCheapestInsertion,
        Self::GlobalCheapestArc,
    ];

    /// Integer code passed to the solver process.
    ///
    /// # Examples
    ///
    /// ```
    /// use binroute_core::RoutingStrategy;
    ///
    /// assert_eq!(RoutingStrategy::Automatic.code(), 0);
    /// assert_eq!(RoutingStrategy::Savings.code(), 2);
    /// ```
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Automatic => 0,
            Self::PathCheapestArc => 1,
            Self::Savings => 2,
            Self::Sweep => 3,
            Self::Christofides => 4,
            Self::ParallelCheapestInsertion => 5,
            Self::LocalCheapestInsertion => 6,
            Self::GlobalCheapestArc => 7,
        }
    }

    /// Kebab-case name used in configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::PathCheapestArc => "path-cheapest-arc",
            Self::Savings => "savings",
            Self::Sweep => "sweep",
            Self::Christofides => "christofides",
            Self::ParallelCheapestInsertion => "parallel-cheapest-insertion",
            Self::LocalCheapestInsertion => "local-cheapest-insertion",
            Self::GlobalCheapestArc => "global-cheapest-arc",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a strategy name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown routing strategy {name:?}")]
pub struct ParseStrategyError {
    /// The rejected input.
    pub name: String,
}

impl FromStr for RoutingStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == normalised)
            .ok_or_else(|| ParseStrategyError { name: s.to_owned() })
    }
}

/// One vehicle's ordered stops as graph indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(pub Vec<usize>);

impl Route {
    /// Whether the route visits anything besides the depot.
    ///
    /// Unused vehicles come back as `[0, 0]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use binroute_core::Route;
    ///
    /// assert!(Route(vec![0, 0]).is_trivial());
    /// assert!(!Route(vec![0, 3, 0]).is_trivial());
    /// ```
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.0.iter().all(|&index| index == 0)
    }

    /// Indices of the route.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Route {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

/// Every route from one solver invocation, one per vehicle slot.
///
/// Two sets are equal when their routes match index for index, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteSet(pub Vec<Route>);

impl RouteSet {
    /// Routes in vehicle-slot order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.0
    }

    /// Whether the solver returned no routes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Vec<usize>>> for RouteSet {
    fn from(routes: Vec<Vec<usize>>) -> Self {
        Self(routes.into_iter().map(Route).collect())
    }
}
