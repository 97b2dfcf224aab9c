//! Solution
//!
//! The selected candidates and merged adjacency edges, as produced by a solver.
//!

use crate::crag::*;
use crate::util::*;
use petgraph::unionfind::UnionFind;
use std::cell::OnceCell;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CragSolution {
    crag: Arc<Crag>,
    selected_nodes: Vec<bool>,
    selected_edges: Vec<bool>,
    /// connected component of every node, computed on demand and reset by every change of selection
    labels: OnceCell<Vec<usize>>,
}

impl CragSolution {
    pub fn new(crag: Arc<Crag>) -> Self {
        let node_bound = crag.node_bound();
        let edge_bound = crag.edge_bound();
        Self {
            crag,
            selected_nodes: vec![false; node_bound],
            selected_edges: vec![false; edge_bound],
            labels: OnceCell::new(),
        }
    }

    pub fn crag(&self) -> &Arc<Crag> {
        &self.crag
    }

    pub fn node_selected(&self, node_index: NodeIndex) -> bool {
        self.selected_nodes[node_index]
    }

    pub fn edge_selected(&self, edge_index: EdgeIndex) -> bool {
        self.selected_edges[edge_index]
    }

    pub fn set_node_selected(&mut self, node_index: NodeIndex, selected: bool) {
        self.selected_nodes[node_index] = selected;
        self.labels.take();
    }

    pub fn set_edge_selected(&mut self, edge_index: EdgeIndex, selected: bool) {
        self.selected_edges[edge_index] = selected;
        self.labels.take();
    }

    pub fn selected_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.crag.nodes().filter(|&node_index| self.selected_nodes[node_index])
    }

    pub fn selected_edges(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.crag.edges().filter(|&edge_index| self.selected_edges[edge_index])
    }

    /// 0 for unselected nodes; otherwise the id (starting from 1) of the connected component of selected nodes joined
    /// by selected edges, where null-assignment links do not connect
    pub fn label(&self, node_index: NodeIndex) -> usize {
        self.labels.get_or_init(|| self.compute_labels())[node_index]
    }

    pub fn num_labels(&self) -> usize {
        self.labels
            .get_or_init(|| self.compute_labels())
            .iter()
            .copied()
            .max()
            .unwrap_or(0)
    }

    fn compute_labels(&self) -> Vec<usize> {
        let crag = &self.crag;
        let mut union_find = UnionFind::<usize>::new(crag.node_bound());
        for edge_index in self.selected_edges() {
            if crag.edge_type(edge_index) == EdgeType::NullAssignmentLink {
                continue;
            }
            let (u, v) = (crag.u(edge_index), crag.v(edge_index));
            if self.selected_nodes[u] && self.selected_nodes[v] {
                union_find.union(u, v);
            }
        }
        let mut labels = vec![0; crag.node_bound()];
        let mut root_labels = vec![0; crag.node_bound()];
        let mut next_label = 1;
        for node_index in self.selected_nodes() {
            let root = union_find.find(node_index);
            if root_labels[root] == 0 {
                root_labels[root] = next_label;
                next_label += 1;
            }
            labels[node_index] = root_labels[root];
        }
        labels
    }
}
