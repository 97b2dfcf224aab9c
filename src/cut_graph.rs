//! Cut Graph
//!
//! The subgraph of currently merged adjacency edges, used to separate violated cycle constraints: an adjacency edge
//! that is not merged while its two end points are still connected through merged edges contradicts the multicut.
//!

use crate::crag::*;
use crate::linear_solver::*;
use crate::util::*;
use petgraph::algo::astar;
use petgraph::graph::{NodeIndex as GraphNodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;

#[derive(Debug, Clone)]
pub struct CutGraph {
    /// one graph node per candidate id, edge weights are the adjacency edge ids
    graph: UnGraph<(), EdgeIndex>,
    /// representative of the connected component of every candidate id
    components: Vec<usize>,
}

impl CutGraph {
    pub fn new(crag: &Crag, merged_edges: impl IntoIterator<Item = EdgeIndex>) -> Self {
        let node_bound = crag.node_bound();
        let mut graph = UnGraph::<(), EdgeIndex>::with_capacity(node_bound, 0);
        for _ in 0..node_bound {
            graph.add_node(());
        }
        let mut union_find = UnionFind::<usize>::new(node_bound);
        for edge_index in merged_edges {
            let (u, v) = (crag.u(edge_index), crag.v(edge_index));
            graph.add_edge(GraphNodeIndex::new(u), GraphNodeIndex::new(v), edge_index);
            union_find.union(u, v);
        }
        Self {
            graph,
            components: union_find.into_labeling(),
        }
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn component(&self, node_index: NodeIndex) -> usize {
        self.components[node_index]
    }

    pub fn connected(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.components[a] == self.components[b]
    }

    /// adjacency edges along a shortest path of merged edges from `s` to `t`
    pub fn shortest_path(&self, s: NodeIndex, t: NodeIndex) -> Option<Vec<EdgeIndex>> {
        let goal = GraphNodeIndex::new(t);
        let (_, path) = astar(&self.graph, GraphNodeIndex::new(s), |node| node == goal, |_| 1usize, |_| 0)?;
        Some(
            path.windows(2)
                .map(|pair| {
                    let graph_edge = self
                        .graph
                        .find_edge(pair[0], pair[1])
                        .unwrap_or_else(|| unreachable!("consecutive path nodes are adjacent"));
                    self.graph[graph_edge]
                })
                .collect(),
        )
    }

    /// for every candidate edge `(s, t)` that is not merged but whose selected end points are connected, the constraint
    /// `Σ_{path} x_f - x_(s,t) <= |path| - 1`; at most `max_constraints` of them unless it is 0
    pub fn violated_cycle_constraints(
        &self,
        crag: &Crag,
        candidate_edges: impl IntoIterator<Item = EdgeIndex>,
        node_selected: impl Fn(NodeIndex) -> bool,
        edge_to_var: impl Fn(EdgeIndex) -> VarIndex,
        max_constraints: usize,
    ) -> Vec<LinearConstraint> {
        let mut constraints = vec![];
        for edge_index in candidate_edges {
            let (s, t) = (crag.u(edge_index), crag.v(edge_index));
            if !node_selected(s) || !node_selected(t) || !self.connected(s, t) {
                continue;
            }
            let path = self.shortest_path(s, t).unwrap_or_else(|| {
                panic!("nodes {s} and {t} of edge {edge_index} are in the same component but no path connects them")
            });
            tracing::trace!("nodes {s} and {t} (edge {edge_index}) are cut but connected via edges {path:?}");
            let mut constraint = LinearConstraint::new();
            for &path_edge in path.iter() {
                constraint.set_coefficient(edge_to_var(path_edge), 1.);
            }
            constraint.set_coefficient(edge_to_var(edge_index), -1.);
            constraint.set_relation(Relation::LessEqual);
            constraint.set_value(path.len() as f64 - 1.);
            constraints.push(constraint);
            if max_constraints > 0 && constraints.len() >= max_constraints {
                break;
            }
        }
        constraints
    }
}
