//! Costs
//!
//! Scalar costs per node and per adjacency edge, indexed by id. Negative costs make a candidate (or a merge) favorable.
//!

use crate::crag::*;
use crate::util::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Costs {
    pub node: Vec<Weight>,
    pub edge: Vec<Weight>,
}

impl Costs {
    /// zero costs for every node and edge id of the graph
    pub fn new(crag: &Crag) -> Self {
        Self {
            node: vec![0.; crag.node_bound()],
            edge: vec![0.; crag.edge_bound()],
        }
    }

    /// set every node cost to the sum of the costs of its leaf nodes and the leaf edges inside it, and every edge
    /// cost to the sum of the leaf edges crossing between the two end points
    pub fn propagate_leaf_values(&mut self, crag: &Crag) {
        let leaf_nodes = self.collect_leaf_nodes(crag);
        let mut node = self.node.clone();
        for node_index in crag.nodes() {
            let leaves = &leaf_nodes[node_index];
            let mut value = 0.;
            for &leaf in leaves.iter() {
                value += self.node[leaf];
                // every inside edge is counted once, from its `u` side
                for &edge_index in crag.adj_edges(leaf) {
                    if crag.u(edge_index) == leaf && leaves.contains(&crag.v(edge_index)) {
                        value += self.edge[edge_index];
                    }
                }
            }
            node[node_index] = value;
        }
        self.propagate_leaf_edge_values_with(crag, &leaf_nodes);
        self.node = node;
    }

    /// only update the edge costs, see [`Costs::propagate_leaf_values`]
    pub fn propagate_leaf_edge_values(&mut self, crag: &Crag) {
        let leaf_nodes = self.collect_leaf_nodes(crag);
        self.propagate_leaf_edge_values_with(crag, &leaf_nodes);
    }

    fn propagate_leaf_edge_values_with(&mut self, crag: &Crag, leaf_nodes: &[Vec<NodeIndex>]) {
        let mut edge = self.edge.clone();
        for edge_index in crag.edges() {
            let v_leaves = &leaf_nodes[crag.v(edge_index)];
            let mut value = 0.;
            for &leaf in leaf_nodes[crag.u(edge_index)].iter() {
                for &leaf_edge in crag.adj_edges(leaf) {
                    if v_leaves.contains(&crag.opposite(leaf, leaf_edge)) {
                        value += self.edge[leaf_edge];
                    }
                }
            }
            edge[edge_index] = value;
        }
        self.edge = edge;
    }

    /// sorted leaf descendants of every node, memoized top-down from the roots
    fn collect_leaf_nodes(&self, crag: &Crag) -> Vec<Vec<NodeIndex>> {
        let mut leaf_nodes: Vec<Option<Vec<NodeIndex>>> = vec![None; crag.node_bound()];
        for node_index in crag.nodes() {
            if crag.is_root_node(node_index) {
                Self::collect_leaf_nodes_recursive(crag, node_index, &mut leaf_nodes);
            }
        }
        leaf_nodes.into_iter().map(Option::unwrap_or_default).collect()
    }

    fn collect_leaf_nodes_recursive(crag: &Crag, node_index: NodeIndex, leaf_nodes: &mut [Option<Vec<NodeIndex>>]) {
        if leaf_nodes[node_index].is_some() {
            return;
        }
        let mut leaves = vec![];
        for child in crag.children(node_index) {
            Self::collect_leaf_nodes_recursive(crag, child, leaf_nodes);
            if let Some(child_leaves) = &leaf_nodes[child] {
                leaves.extend(child_leaves.iter().copied());
            }
        }
        if crag.is_leaf_node(node_index) {
            leaves.push(node_index);
        }
        leaves.sort_unstable();
        leaves.dedup();
        leaf_nodes[node_index] = Some(leaves);
    }
}
