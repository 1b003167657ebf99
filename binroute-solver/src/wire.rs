//! Text encoding of solver requests and responses.

use binroute_core::{Route, RoutingStrategy, wire_value};
use thiserror::Error;

use crate::RoutingProblem;

/// A route line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A token was not a node index.
    #[error("invalid node index {token:?} in solver output")]
    InvalidIndex {
        /// Offending token.
        token: String,
    },
}

/// Delimiters used on the solver's command line and in its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFormat {
    /// Separates matrix rows.
    pub row_delimiter: String,
    /// Separates cells within a matrix row.
    pub column_delimiter: String,
    /// Separates weights and capacities.
    pub list_delimiter: String,
    /// Separates node indices in a route line; `None` splits on whitespace.
    pub node_delimiter: Option<String>,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            row_delimiter: ";".to_owned(),
            column_delimiter: ",".to_owned(),
            list_delimiter: ",".to_owned(),
            node_delimiter: None,
        }
    }
}

impl WireFormat {
    /// Encode a matrix, writing unknown cells as `-1`.
    #[must_use]
    pub fn matrix(&self, matrix: &[Vec<Option<u64>>]) -> String {
        matrix
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&cell| wire_value(cell).to_string())
                    .collect::<Vec<_>>()
                    .join(&self.column_delimiter)
            })
            .collect::<Vec<_>>()
            .join(&self.row_delimiter)
    }

    /// Encode a list of integers.
    #[must_use]
    pub fn list(&self, values: &[u64]) -> String {
        values
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(&self.list_delimiter)
    }

    /// Positional arguments for one invocation: matrix, weights, capacities
    /// and strategy code.
    ///
    /// # Examples
    ///
    /// ```
    /// use binroute_core::RoutingStrategy;
    /// use binroute_solver::{RoutingProblem, WireFormat};
    ///
    /// let problem = RoutingProblem {
    ///     matrix: vec![vec![Some(0), Some(7)], vec![None, Some(0)]],
    ///     weights: vec![0, 4],
    ///     capacities: vec![10],
    /// };
    /// let args = WireFormat::default().arguments(&problem, RoutingStrategy::Savings);
    /// assert_eq!(args, ["0,7;-1,0", "0,4", "10", "2"]);
    /// ```
    #[must_use]
    pub fn arguments(&self, problem: &RoutingProblem, strategy: RoutingStrategy) -> [String; 4] {
        [
            self.matrix(&problem.matrix),
            self.list(&problem.weights),
            self.list(&problem.capacities),
            strategy.code().to_string(),
        ]
    }

    /// Decode one stdout line. Blank lines yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::InvalidIndex`] for any token that is not a
    /// non-negative integer.
    pub fn parse_route(&self, line: &str) -> Result<Option<Route>, WireError> {
        let tokens: Vec<&str> = match self.node_delimiter.as_deref() {
            Some(delimiter) if !delimiter.is_empty() => line
                .split(delimiter)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .collect(),
            _ => line.split_whitespace().collect(),
        };
        let indices = tokens
            .into_iter()
            .map(|token| {
                token.parse::<usize>().map_err(|_| WireError::InvalidIndex {
                    token: token.to_owned(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((!indices.is_empty()).then(|| Route(indices)))
    }
}
