//! Test doubles for [`RouteSolver`].
//!
//! Available to unit tests and, through the `test-support` feature, to
//! downstream crates that need a solver without an external executable.

use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use binroute_core::{Route, RouteSet, RoutingStrategy};

use crate::{RouteSolver, RoutingProblem, SolverProcessError};

/// Deterministic first-fit solver.
///
/// Nodes are assigned in index order to the first vehicle with room left.
/// Every vehicle gets a route, so unused vehicles come back as `[0, 0]`.
/// Nodes that fit no vehicle are left out. The strategy is ignored.
///
/// # Examples
///
/// ```rust
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// use binroute_core::{RouteSet, RoutingStrategy};
/// use binroute_solver::{RouteSolver, RoutingProblem};
/// use binroute_solver::test_support::GreedySolver;
///
/// let problem = RoutingProblem {
///     matrix: vec![vec![Some(0); 3]; 3],
///     weights: vec![0, 10, 20],
///     capacities: vec![30, 5],
/// };
/// let routes = GreedySolver.solve(&problem, RoutingStrategy::Automatic).await.unwrap();
/// assert_eq!(routes, RouteSet::from(vec![vec![0, 1, 2, 0], vec![0, 0]]));
/// # });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySolver;

#[async_trait]
impl RouteSolver for GreedySolver {
    async fn solve(
        &mut self,
        problem: &RoutingProblem,
        _strategy: RoutingStrategy,
    ) -> Result<RouteSet, SolverProcessError> {
        let mut remaining = problem.capacities.clone();
        let mut stops: Vec<Vec<usize>> = vec![Vec::new(); remaining.len()];
        for (index, &weight) in problem.weights.iter().enumerate().skip(1) {
            let slot = remaining.iter().position(|&room| room >= weight);
            if let Some(slot) = slot {
                remaining[slot] -= weight;
                stops[slot].push(index);
            }
        }
        let routes = stops
            .into_iter()
            .map(|inner| {
                let mut route = Vec::with_capacity(inner.len() + 2);
                route.push(0);
                route.extend(inner);
                route.push(0);
                Route(route)
            })
            .collect();
        Ok(RouteSet(routes))
    }
}

/// Returns canned route sets per strategy and records every call.
///
/// Strategies without a script return an empty set.
#[derive(Debug, Default)]
pub struct ScriptedSolver {
    scripts: HashMap<RoutingStrategy, RouteSet>,
    fail_on: Option<RoutingStrategy>,
    calls: Vec<RoutingStrategy>,
    problems: Vec<RoutingProblem>,
}

impl ScriptedSolver {
    /// Answer `strategy` with `routes`.
    #[must_use]
    pub fn with_routes(mut self, strategy: RoutingStrategy, routes: RouteSet) -> Self {
        self.scripts.insert(strategy, routes);
        self
    }

    /// Fail with a spawn error when `strategy` is requested.
    #[must_use]
    pub const fn failing_on(mut self, strategy: RoutingStrategy) -> Self {
        self.fail_on = Some(strategy);
        self
    }

    /// Strategies requested so far, in call order.
    #[must_use]
    pub fn calls(&self) -> &[RoutingStrategy] {
        &self.calls
    }

    /// Problems received so far, in call order.
    #[must_use]
    pub fn problems(&self) -> &[RoutingProblem] {
        &self.problems
    }
}

#[async_trait]
impl RouteSolver for ScriptedSolver {
    async fn solve(
        &mut self,
        problem: &RoutingProblem,
        strategy: RoutingStrategy,
    ) -> Result<RouteSet, SolverProcessError> {
        self.calls.push(strategy);
        self.problems.push(problem.clone());
        if self.fail_on == Some(strategy) {
            return Err(SolverProcessError::Spawn {
                program: "scripted-solver".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        Ok(self.scripts.get(&strategy).cloned().unwrap_or_default())
    }
}
