//! Dense graph indices for one schedule build.

use std::collections::HashMap;

use binroute_core::{DistanceCacheEntry, Leg, Node, NodeKey};

use crate::{MatrixMetric, Selection};

/// Round a volume to the integer the solver works with.
///
/// Negative and non-finite values become 0.
///
/// # Examples
///
/// ```
/// use binroute_planner::round_volume;
///
/// assert_eq!(round_volume(7.5), 8);
/// assert_eq!(round_volume(-3.0), 0);
/// assert_eq!(round_volume(f64::NAN), 0);
/// ```
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is rounded, finite and clamped to non-negative; `as` saturates"
)]
pub fn round_volume(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Bidirectional map between graph indices and node keys.
///
/// Index 0 is the depot; the rest follow [`Selection::nodes`].
#[derive(Debug, Clone, PartialEq)]
pub struct GraphIndex {
    nodes: Vec<Node>,
    positions: HashMap<NodeKey, usize>,
}

impl GraphIndex {
    /// Index the selected nodes in graph order.
    #[must_use]
    pub fn new(selection: &Selection) -> Self {
        let nodes: Vec<Node> = selection.nodes().cloned().collect();
        let positions = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.key.clone(), index))
            .collect();
        Self { nodes, positions }
    }

    /// Number of nodes, depot included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node at `index`.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Graph index of `key`.
    #[must_use]
    pub fn index_of(&self, key: &NodeKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    /// Keys in index order.
    #[must_use]
    pub fn keys(&self) -> Vec<NodeKey> {
        self.nodes.iter().map(|node| node.key.clone()).collect()
    }

    /// Rounded node weights in index order.
    #[must_use]
    pub fn weights(&self) -> Vec<u64> {
        self.nodes
            .iter()
            .map(|node| round_volume(node.weight))
            .collect()
    }

    /// Square cost matrix from cached legs.
    ///
    /// Pairs without a cache entry, and entries whose chosen measure is
    /// unknown, are `None`. Entries for nodes outside the graph are
    /// ignored.
    #[must_use]
    pub fn cost_matrix(
        &self,
        entries: &[DistanceCacheEntry],
        metric: MatrixMetric,
    ) -> Vec<Vec<Option<u64>>> {
        let mut matrix = vec![vec![None; self.len()]; self.len()];
        for entry in entries {
            let (Some(from), Some(to)) = (
                self.index_of(&entry.origin),
                self.index_of(&entry.destination),
            ) else {
                continue;
            };
            if let Some(cell) = matrix.get_mut(from).and_then(|row| row.get_mut(to)) {
                *cell = metric.cost(entry.leg);
            }
        }
        matrix
    }
}

impl MatrixMetric {
    const fn cost(self, leg: Leg) -> Option<u64> {
        match self {
            Self::Distance => leg.distance_m,
            Self::Duration => leg.duration_s,
        }
    }
}
