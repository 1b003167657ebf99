//! Which bins a schedule has to visit, and how much each holds.

use std::collections::HashMap;

use binroute_core::{Depot, DumbBin, Node, SmartBin};
use log::debug;

/// Smart bins at or above this fullness ratio are collected.
pub const DEFAULT_COLLECT_RATIO: f64 = 0.8;

/// The nodes of one schedule build, each group in id order.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Routing depot, weight 0.
    pub depot: Node,
    /// Smart bins that are due, weighted by their current fullness.
    pub smart_bins: Vec<Node>,
    /// Every dumb bin, weighted by its estimated volume.
    pub dumb_bins: Vec<Node>,
}

impl Selection {
    /// Select the depot and the bins to collect.
    ///
    /// The depot with the smallest id is used. Dumb bins are always
    /// collected: one linked to a due smart bin is assumed to be as full as
    /// that bin, any other is assumed full.
    ///
    /// Returns `None` when there is no depot.
    ///
    /// # Examples
    ///
    /// ```
    /// use binroute_core::{Depot, DumbBin, SmartBin};
    /// use binroute_planner::{DEFAULT_COLLECT_RATIO, Selection};
    /// use geo::Coord;
    ///
    /// let depot = Depot { id: "hq".into(), location: Coord { x: 0.0, y: 0.0 } };
    /// let smart = SmartBin {
    ///     id: "s1".into(),
    ///     location: Coord { x: 0.1, y: 0.0 },
    ///     current_fullness: 9.0,
    ///     threshold: 10.0,
    /// };
    /// let dumb = DumbBin {
    ///     id: "d1".into(),
    ///     location: Coord { x: 0.2, y: 0.0 },
    ///     capacity: 20.0,
    ///     nearest_smart_bin: Some("s1".into()),
    /// };
    /// let selection = Selection::from_records(&[depot], &[smart], &[dumb], DEFAULT_COLLECT_RATIO)
    ///     .expect("depot present");
    /// assert_eq!(selection.smart_bins.len(), 1);
    /// assert!((selection.dumb_bins[0].weight - 18.0).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn from_records(
        depots: &[Depot],
        smart_bins: &[SmartBin],
        dumb_bins: &[DumbBin],
        collect_ratio: f64,
    ) -> Option<Self> {
        let depot = depots.iter().min_by(|a, b| a.id.cmp(&b.id))?;

        let mut due: Vec<&SmartBin> = smart_bins
            .iter()
            .filter(|bin| bin.fullness_ratio() >= collect_ratio)
            .collect();
        due.sort_by(|a, b| a.id.cmp(&b.id));
        let due_ratios: HashMap<&str, f64> = due
            .iter()
            .map(|bin| (bin.id.as_str(), bin.fullness_ratio()))
            .collect();
        debug!(
            "{} of {} smart bins reached the collect ratio {collect_ratio}",
            due.len(),
            smart_bins.len()
        );

        let mut dumb: Vec<&DumbBin> = dumb_bins.iter().collect();
        dumb.sort_by(|a, b| a.id.cmp(&b.id));
        let dumb_bins = dumb
            .into_iter()
            .map(|bin| bin.to_node_with_volume(estimated_volume(bin, &due_ratios)))
            .collect();

        Some(Self {
            depot: depot.to_node(),
            smart_bins: due.into_iter().map(SmartBin::to_node).collect(),
            dumb_bins,
        })
    }

    /// Depot, smart bins then dumb bins: the graph order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::once(&self.depot)
            .chain(&self.smart_bins)
            .chain(&self.dumb_bins)
    }

    /// Number of selected nodes, depot included.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.smart_bins.len() + self.dumb_bins.len()
    }

    /// Always false: a selection holds at least the depot.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

fn estimated_volume(bin: &DumbBin, due_ratios: &HashMap<&str, f64>) -> f64 {
    bin.nearest_smart_bin
        .as_deref()
        .and_then(|id| due_ratios.get(id))
        .map_or(bin.capacity, |ratio| bin.capacity * ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;
    use rstest::{fixture, rstest};

    fn depot(id: &str) -> Depot {
        Depot {
            id: id.into(),
            location: Coord { x: 2.35, y: 48.85 },
        }
    }

    fn smart(id: &str, current: f64) -> SmartBin {
        SmartBin {
            id: id.into(),
            location: Coord { x: 2.36, y: 48.85 },
            current_fullness: current,
            threshold: 10.0,
        }
    }

    fn dumb(id: &str, capacity: f64, link: Option<&str>) -> DumbBin {
        DumbBin {
            id: id.into(),
            location: Coord { x: 2.37, y: 48.85 },
            capacity,
            nearest_smart_bin: link.map(str::to_owned),
        }
    }

    #[fixture]
    fn smart_bins() -> Vec<SmartBin> {
        vec![smart("s3", 9.0), smart("s1", 8.0), smart("s2", 7.9)]
    }

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|node| node.key.id.as_str()).collect()
    }

    #[rstest]
    fn no_depot_selects_nothing(smart_bins: Vec<SmartBin>) {
        assert_eq!(
            Selection::from_records(&[], &smart_bins, &[], DEFAULT_COLLECT_RATIO),
            None
        );
    }

    #[rstest]
    fn first_depot_by_id_is_used() {
        let selection =
            Selection::from_records(&[depot("z"), depot("b")], &[], &[], DEFAULT_COLLECT_RATIO)
                .expect("depot present");
        assert_eq!(selection.depot.key.id, "b");
        assert!(selection.depot.weight.abs() < f64::EPSILON);
        assert_eq!(selection.len(), 1);
    }

    #[rstest]
    fn smart_bins_at_ratio_are_due_in_id_order(smart_bins: Vec<SmartBin>) {
        let selection =
            Selection::from_records(&[depot("d")], &smart_bins, &[], DEFAULT_COLLECT_RATIO)
                .expect("depot present");
        assert_eq!(ids(&selection.smart_bins), ["s1", "s3"]);
        assert!((selection.smart_bins[1].weight - 9.0).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(Some("s1"), 16.0)]
    #[case(Some("s2"), 20.0)]
    #[case(Some("missing"), 20.0)]
    #[case(None, 20.0)]
    fn dumb_bin_volume_follows_linked_bin(
        smart_bins: Vec<SmartBin>,
        #[case] link: Option<&str>,
        #[case] expected: f64,
    ) {
        let selection = Selection::from_records(
            &[depot("d")],
            &smart_bins,
            &[dumb("d1", 20.0, link)],
            DEFAULT_COLLECT_RATIO,
        )
        .expect("depot present");
        assert!((selection.dumb_bins[0].weight - expected).abs() < 1e-9);
    }

    #[rstest]
    fn nodes_follow_graph_order(smart_bins: Vec<SmartBin>) {
        let selection = Selection::from_records(
            &[depot("d")],
            &smart_bins,
            &[dumb("b", 1.0, None), dumb("a", 1.0, None)],
            DEFAULT_COLLECT_RATIO,
        )
        .expect("depot present");
        let order: Vec<&str> = selection.nodes().map(|n| n.key.id.as_str()).collect();
        assert_eq!(order, ["d", "s1", "s3", "a", "b"]);
        assert_eq!(selection.len(), 5);
    }
}
