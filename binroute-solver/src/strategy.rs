//! Running one routing problem through several strategies.

use std::collections::HashSet;

use async_trait::async_trait;
use binroute_core::{RouteSet, RoutingStrategy};
use log::{debug, info};

use crate::SolverProcessError;

/// Input to the optimiser, already rounded to integers.
///
/// Index 0 is the depot. `matrix[i][j]` is the cost of travelling from node
/// `i` to node `j`, `None` when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingProblem {
    /// Square cost matrix.
    pub matrix: Vec<Vec<Option<u64>>>,
    /// Volume to collect at each node.
    pub weights: Vec<u64>,
    /// Capacity of each vehicle; the solver returns one route per entry.
    pub capacities: Vec<u64>,
}

/// Produces routes for a problem under one strategy.
///
/// `solve` takes `&mut self` so a solver runs at most one invocation at a
/// time.
#[async_trait]
pub trait RouteSolver: Send {
    /// Solve `problem` using `strategy`.
    ///
    /// A run the optimiser itself rejects yields an empty [`RouteSet`];
    /// only failures to run the optimiser at all are errors.
    async fn solve(
        &mut self,
        problem: &RoutingProblem,
        strategy: RoutingStrategy,
    ) -> Result<RouteSet, SolverProcessError>;
}

/// Solve `problem` with each strategy in order and keep the distinct
/// results.
///
/// Route sets are compared structurally and the first occurrence wins, so
/// the output order follows `strategies`. Failed runs yield empty route
/// sets, which fold into a single empty entry like any other repeat.
///
/// # Errors
///
/// Returns the first error from `solver`; later strategies are not run.
pub async fn solve_with_strategies<R: RouteSolver + ?Sized>(
    solver: &mut R,
    problem: &RoutingProblem,
    strategies: &[RoutingStrategy],
) -> Result<Vec<RouteSet>, SolverProcessError> {
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for &strategy in strategies {
        let routes = solver.solve(problem, strategy).await?;
        if routes.is_empty() {
            debug!("strategy {strategy} produced no routes");
        }
        if seen.insert(routes.clone()) {
            distinct.push(routes);
        } else {
            debug!("strategy {strategy} repeated an earlier route set");
        }
    }
    info!(
        "{} strategies produced {} distinct route sets",
        strategies.len(),
        distinct.len()
    );
    Ok(distinct)
}
