//! Candidate Region Adjacency Graph
//!
//! Two graphs on the same set of nodes: an undirected region adjacency graph and a directed subset graph, where an
//! arc `child -> parent` states that the candidate `child` is a sub-region of the candidate `parent`.
//! Nodes, edges and arcs live in arenas indexed by dense integers; erased slots are reused by later insertions.
//!

use crate::error::*;
use crate::util::*;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CragNode {
    pub node_type: NodeType,
    /// incident adjacency edges
    pub adjacent_edges: Vec<EdgeIndex>,
    /// subset arcs from children
    pub in_arcs: Vec<ArcIndex>,
    /// subset arcs to parents
    pub out_arcs: Vec<ArcIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CragEdge {
    pub u: NodeIndex,
    pub v: NodeIndex,
    pub edge_type: EdgeType,
    /// voxel grid edges along the contact surface, only for leaf edges
    pub affiliated_edges: Vec<GridEdge>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CragArc {
    /// the child
    pub source: NodeIndex,
    /// the parent
    pub target: NodeIndex,
}

#[derive(Debug, Clone, Default)]
pub struct Crag {
    nodes: Vec<Option<CragNode>>,
    edges: Vec<Option<CragEdge>>,
    arcs: Vec<Option<CragArc>>,
    free_nodes: Vec<NodeIndex>,
    free_edges: Vec<EdgeIndex>,
    free_arcs: Vec<ArcIndex>,
}

impl Crag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node_type: NodeType) -> NodeIndex {
        let node = CragNode {
            node_type,
            adjacent_edges: vec![],
            in_arcs: vec![],
            out_arcs: vec![],
        };
        match self.free_nodes.pop() {
            Some(node_index) => {
                self.nodes[node_index] = Some(node);
                node_index
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// indicate that the candidates `u` and `v` are adjacent
    pub fn add_adjacency_edge(&mut self, u: NodeIndex, v: NodeIndex, edge_type: EdgeType) -> CragResult<EdgeIndex> {
        self.check_node(u)?;
        self.check_node(v)?;
        if u == v {
            return Err(UsageError::SelfLoop(u));
        }
        let edge = CragEdge {
            u,
            v,
            edge_type,
            affiliated_edges: vec![],
        };
        let edge_index = match self.free_edges.pop() {
            Some(edge_index) => {
                self.edges[edge_index] = Some(edge);
                edge_index
            }
            None => {
                self.edges.push(Some(edge));
                self.edges.len() - 1
            }
        };
        self.node_mut(u).adjacent_edges.push(edge_index);
        self.node_mut(v).adjacent_edges.push(edge_index);
        Ok(edge_index)
    }

    /// indicate that the candidate `child` is a subset of the candidate `parent`
    pub fn add_subset_arc(&mut self, child: NodeIndex, parent: NodeIndex) -> CragResult<ArcIndex> {
        self.check_node(child)?;
        self.check_node(parent)?;
        if child == parent {
            return Err(UsageError::SelfLoop(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(UsageError::SubsetCycle { child, parent });
        }
        let arc = CragArc {
            source: child,
            target: parent,
        };
        let arc_index = match self.free_arcs.pop() {
            Some(arc_index) => {
                self.arcs[arc_index] = Some(arc);
                arc_index
            }
            None => {
                self.arcs.push(Some(arc));
                self.arcs.len() - 1
            }
        };
        self.node_mut(child).out_arcs.push(arc_index);
        self.node_mut(parent).in_arcs.push(arc_index);
        Ok(arc_index)
    }

    /// erase a node together with all its adjacency edges and subset arcs
    pub fn erase_node(&mut self, node_index: NodeIndex) -> CragResult<()> {
        self.check_node(node_index)?;
        let node = self.nodes[node_index].take().unwrap_or_else(|| unreachable!());
        for &edge_index in node.adjacent_edges.iter() {
            if let Some(edge) = self.edges[edge_index].take() {
                let other = if edge.u == node_index { edge.v } else { edge.u };
                self.node_mut(other).adjacent_edges.retain(|&e| e != edge_index);
                self.free_edges.push(edge_index);
            }
        }
        for &arc_index in node.in_arcs.iter().chain(node.out_arcs.iter()) {
            if let Some(arc) = self.arcs[arc_index].take() {
                if arc.source != node_index {
                    self.node_mut(arc.source).out_arcs.retain(|&a| a != arc_index);
                }
                if arc.target != node_index {
                    self.node_mut(arc.target).in_arcs.retain(|&a| a != arc_index);
                }
                self.free_arcs.push(arc_index);
            }
        }
        self.free_nodes.push(node_index);
        Ok(())
    }

    pub fn erase_edge(&mut self, edge_index: EdgeIndex) -> CragResult<()> {
        self.check_edge(edge_index)?;
        let edge = self.edges[edge_index].take().unwrap_or_else(|| unreachable!());
        self.node_mut(edge.u).adjacent_edges.retain(|&e| e != edge_index);
        self.node_mut(edge.v).adjacent_edges.retain(|&e| e != edge_index);
        self.free_edges.push(edge_index);
        Ok(())
    }

    pub fn erase_arc(&mut self, arc_index: ArcIndex) -> CragResult<()> {
        self.check_arc(arc_index)?;
        let arc = self.arcs[arc_index].take().unwrap_or_else(|| unreachable!());
        self.node_mut(arc.source).out_arcs.retain(|&a| a != arc_index);
        self.node_mut(arc.target).in_arcs.retain(|&a| a != arc_index);
        self.free_arcs.push(arc_index);
        Ok(())
    }

    pub fn contains_node(&self, node_index: NodeIndex) -> bool {
        matches!(self.nodes.get(node_index), Some(Some(_)))
    }

    pub fn contains_edge(&self, edge_index: EdgeIndex) -> bool {
        matches!(self.edges.get(edge_index), Some(Some(_)))
    }

    pub fn contains_arc(&self, arc_index: ArcIndex) -> bool {
        matches!(self.arcs.get(arc_index), Some(Some(_)))
    }

    pub fn check_node(&self, node_index: NodeIndex) -> CragResult<()> {
        if self.contains_node(node_index) {
            Ok(())
        } else {
            Err(UsageError::ErasedNode(node_index))
        }
    }

    pub fn check_edge(&self, edge_index: EdgeIndex) -> CragResult<()> {
        if self.contains_edge(edge_index) {
            Ok(())
        } else {
            Err(UsageError::ErasedEdge(edge_index))
        }
    }

    pub fn check_arc(&self, arc_index: ArcIndex) -> CragResult<()> {
        if self.contains_arc(arc_index) {
            Ok(())
        } else {
            Err(UsageError::ErasedArc(arc_index))
        }
    }

    /// panics if the node has been erased, use [`Crag::check_node`] to validate handles of unknown origin
    pub fn node(&self, node_index: NodeIndex) -> &CragNode {
        self.nodes[node_index]
            .as_ref()
            .unwrap_or_else(|| panic!("node {node_index} has been erased"))
    }

    fn node_mut(&mut self, node_index: NodeIndex) -> &mut CragNode {
        self.nodes[node_index]
            .as_mut()
            .unwrap_or_else(|| panic!("node {node_index} has been erased"))
    }

    pub fn edge(&self, edge_index: EdgeIndex) -> &CragEdge {
        self.edges[edge_index]
            .as_ref()
            .unwrap_or_else(|| panic!("adjacency edge {edge_index} has been erased"))
    }

    pub fn arc(&self, arc_index: ArcIndex) -> &CragArc {
        self.arcs[arc_index]
            .as_ref()
            .unwrap_or_else(|| panic!("subset arc {arc_index} has been erased"))
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(node_index, node)| node.as_ref().map(|_| node_index))
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(edge_index, edge)| edge.as_ref().map(|_| edge_index))
    }

    pub fn arcs(&self) -> impl Iterator<Item = ArcIndex> + '_ {
        self.arcs
            .iter()
            .enumerate()
            .filter_map(|(arc_index, arc)| arc.as_ref().map(|_| arc_index))
    }

    pub fn num_nodes(&self) -> NodeNum {
        self.nodes.len() - self.free_nodes.len()
    }

    pub fn num_edges(&self) -> EdgeNum {
        self.edges.len() - self.free_edges.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len() - self.free_arcs.len()
    }

    /// one past the largest node id ever handed out, the size of dense node maps
    pub fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_bound(&self) -> usize {
        self.edges.len()
    }

    pub fn node_type(&self, node_index: NodeIndex) -> NodeType {
        self.node(node_index).node_type
    }

    pub fn edge_type(&self, edge_index: EdgeIndex) -> EdgeType {
        self.edge(edge_index).edge_type
    }

    pub fn u(&self, edge_index: EdgeIndex) -> NodeIndex {
        self.edge(edge_index).u
    }

    pub fn v(&self, edge_index: EdgeIndex) -> NodeIndex {
        self.edge(edge_index).v
    }

    pub fn opposite(&self, node_index: NodeIndex, edge_index: EdgeIndex) -> NodeIndex {
        let edge = self.edge(edge_index);
        debug_assert!(edge.u == node_index || edge.v == node_index);
        if edge.u == node_index {
            edge.v
        } else {
            edge.u
        }
    }

    pub fn source(&self, arc_index: ArcIndex) -> NodeIndex {
        self.arc(arc_index).source
    }

    pub fn target(&self, arc_index: ArcIndex) -> NodeIndex {
        self.arc(arc_index).target
    }

    pub fn adj_edges(&self, node_index: NodeIndex) -> &[EdgeIndex] {
        &self.node(node_index).adjacent_edges
    }

    /// subset arcs pointing to this node, one per child
    pub fn in_arcs(&self, node_index: NodeIndex) -> &[ArcIndex] {
        &self.node(node_index).in_arcs
    }

    /// subset arcs leaving this node, one per parent
    pub fn out_arcs(&self, node_index: NodeIndex) -> &[ArcIndex] {
        &self.node(node_index).out_arcs
    }

    pub fn children(&self, node_index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.in_arcs(node_index).iter().map(|&arc_index| self.source(arc_index))
    }

    pub fn parents(&self, node_index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.out_arcs(node_index).iter().map(|&arc_index| self.target(arc_index))
    }

    /// the parent used by tree traversals, i.e. the target of the first outgoing arc
    pub fn parent(&self, node_index: NodeIndex) -> Option<NodeIndex> {
        self.out_arcs(node_index).first().map(|&arc_index| self.target(arc_index))
    }

    pub fn is_leaf_node(&self, node_index: NodeIndex) -> bool {
        self.in_arcs(node_index).is_empty()
    }

    pub fn is_root_node(&self, node_index: NodeIndex) -> bool {
        self.out_arcs(node_index).is_empty()
    }

    /// an adjacency edge between two leaf nodes
    pub fn is_leaf_edge(&self, edge_index: EdgeIndex) -> bool {
        let edge = self.edge(edge_index);
        self.is_leaf_node(edge.u) && self.is_leaf_node(edge.v)
    }

    /// length of the longest path from a leaf to this node in the subset graph
    pub fn level(&self, node_index: NodeIndex) -> usize {
        self.children(node_index)
            .map(|child| self.level(child) + 1)
            .max()
            .unwrap_or(0)
    }

    /// whether `ancestor` can be reached from `node_index` following parent arcs
    pub fn is_ancestor_or_self(&self, ancestor: NodeIndex, node_index: NodeIndex) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![node_index];
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.parents(current));
            }
        }
        false
    }

    /// the node itself and everything below it in the subset graph
    pub fn descendants(&self, node_index: NodeIndex) -> BTreeSet<NodeIndex> {
        let mut descendants = BTreeSet::new();
        let mut stack = vec![node_index];
        while let Some(current) = stack.pop() {
            if descendants.insert(current) {
                stack.extend(self.children(current));
            }
        }
        descendants
    }

    /// all leaf nodes below this node, or the node itself if it is a leaf
    pub fn leaf_nodes(&self, node_index: NodeIndex) -> BTreeSet<NodeIndex> {
        self.descendants(node_index)
            .into_iter()
            .filter(|&descendant| self.is_leaf_node(descendant))
            .collect()
    }

    /// all leaf edges between the leaf nodes of this node
    pub fn leaf_edges(&self, node_index: NodeIndex) -> BTreeSet<EdgeIndex> {
        let leaf_nodes = self.leaf_nodes(node_index);
        let mut leaf_edges = BTreeSet::new();
        for &leaf in leaf_nodes.iter() {
            for &edge_index in self.adj_edges(leaf) {
                if leaf_nodes.contains(&self.opposite(leaf, edge_index)) {
                    leaf_edges.insert(edge_index);
                }
            }
        }
        leaf_edges
    }

    /// all leaf edges connecting a leaf node of `u` with a leaf node of `v`, for the edge `(u, v)`
    pub fn leaf_edges_of_edge(&self, edge_index: EdgeIndex) -> BTreeSet<EdgeIndex> {
        let edge = self.edge(edge_index);
        let u_leaves = self.leaf_nodes(edge.u);
        let v_leaves = self.leaf_nodes(edge.v);
        self.edges_between(&u_leaves, &v_leaves)
    }

    /// all adjacency edges linking a descendant of `u` (`u` included) with a descendant of `v` (`v` included)
    pub fn descendant_edges_between(&self, u: NodeIndex, v: NodeIndex) -> BTreeSet<EdgeIndex> {
        self.edges_between(&self.descendants(u), &self.descendants(v))
    }

    /// all adjacency edges between descendants of the end points of the edge, except the edge itself
    pub fn descendant_edges(&self, edge_index: EdgeIndex) -> BTreeSet<EdgeIndex> {
        let edge = self.edge(edge_index);
        let mut edges = self.descendant_edges_between(edge.u, edge.v);
        edges.remove(&edge_index);
        edges
    }

    fn edges_between(&self, a: &BTreeSet<NodeIndex>, b: &BTreeSet<NodeIndex>) -> BTreeSet<EdgeIndex> {
        let mut edges = BTreeSet::new();
        for &node_index in a.iter() {
            for &edge_index in self.adj_edges(node_index) {
                if b.contains(&self.opposite(node_index, edge_index)) {
                    edges.insert(edge_index);
                }
            }
        }
        edges
    }

    pub fn set_affiliated_edges(&mut self, edge_index: EdgeIndex, affiliated_edges: Vec<GridEdge>) -> CragResult<()> {
        self.check_edge(edge_index)?;
        if !self.is_leaf_edge(edge_index) {
            return Err(UsageError::NotALeafEdge(edge_index));
        }
        for grid_edge in affiliated_edges.iter() {
            grid_edge.check()?;
        }
        self.edges[edge_index]
            .as_mut()
            .unwrap_or_else(|| unreachable!())
            .affiliated_edges = affiliated_edges;
        Ok(())
    }

    pub fn affiliated_edges(&self, edge_index: EdgeIndex) -> CragResult<&[GridEdge]> {
        self.check_edge(edge_index)?;
        if !self.is_leaf_edge(edge_index) {
            return Err(UsageError::NotALeafEdge(edge_index));
        }
        Ok(&self.edge(edge_index).affiliated_edges)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::example_crags::*;
    use maplit::btreeset;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256StarStar;

    #[test]
    fn crag_modify() {
        // cargo test crag_modify -- --nocapture
        let mut crag = chains(10, 10);
        for node_index in (5..100).step_by(10) {
            crag.erase_node(node_index).unwrap();
        }
        for node_index in 0..100 {
            if node_index % 10 == 5 {
                assert!(!crag.contains_node(node_index));
                continue;
            }
            if node_index % 10 < 5 {
                assert_eq!(crag.level(node_index), node_index % 10);
            } else {
                assert_eq!(crag.level(node_index), node_index % 10 - 6);
            }
            assert_eq!(
                crag.is_leaf_node(node_index),
                node_index % 10 == 0 || node_index % 10 == 6
            );
            assert_eq!(
                crag.is_root_node(node_index),
                node_index % 10 == 4 || node_index % 10 == 9
            );
        }
        assert_eq!(crag.num_nodes(), 90);
        assert_eq!(crag.num_arcs(), 70);
    }

    #[test]
    fn crag_levels() {
        // cargo test crag_levels -- --nocapture
        let crag = chains(3, 10);
        for node_index in crag.nodes() {
            assert_eq!(crag.level(node_index), node_index % 10);
            assert_eq!(crag.is_leaf_node(node_index), node_index % 10 == 0);
            assert_eq!(crag.is_root_node(node_index), node_index % 10 == 9);
        }
    }

    #[test]
    fn crag_iterators() {
        // cargo test crag_iterators -- --nocapture
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        let mut crag = Crag::new();
        for _ in 0..100 {
            crag.add_node(NodeType::VolumeCandidate);
        }
        let mut expected_edges = 0;
        for i in 0..100 {
            for j in (i + 1)..100 {
                if rng.gen_bool(0.5) {
                    crag.add_adjacency_edge(i, j, EdgeType::Adjacency).unwrap();
                    expected_edges += 1;
                }
            }
        }
        for i in (0..100).step_by(5) {
            for j in i..(i + 4) {
                crag.add_subset_arc(j, j + 1).unwrap();
            }
        }
        assert_eq!(crag.nodes().count(), 100);
        assert_eq!(crag.edges().count(), expected_edges);
        assert_eq!(crag.arcs().count(), 80);
        let total_degree: usize = crag.nodes().map(|n| crag.adj_edges(n).len()).sum();
        assert_eq!(total_degree, 2 * expected_edges);
        for node_index in crag.nodes() {
            for &edge_index in crag.adj_edges(node_index) {
                let other = crag.opposite(node_index, edge_index);
                assert!(crag.adj_edges(other).contains(&edge_index));
            }
            for &arc_index in crag.in_arcs(node_index) {
                assert_eq!(crag.target(arc_index), node_index);
            }
            for &arc_index in crag.out_arcs(node_index) {
                assert_eq!(crag.source(arc_index), node_index);
            }
            let expected_in = if node_index % 5 == 0 { 0 } else { 1 };
            let expected_out = if node_index % 5 == 4 { 0 } else { 1 };
            assert_eq!(crag.in_arcs(node_index).len(), expected_in);
            assert_eq!(crag.out_arcs(node_index).len(), expected_out);
        }
    }

    #[test]
    fn crag_erase_removes_incident() {
        // cargo test crag_erase_removes_incident -- --nocapture
        let (mut crag, d) = diamond();
        crag.erase_node(d.n5).unwrap();
        // a(n1,n2), d(n5,n6), e(n5,n3) are gone
        assert!(!crag.contains_edge(d.d));
        assert!(!crag.contains_edge(d.e));
        assert!(crag.contains_edge(d.a));
        assert_eq!(crag.num_edges(), 4);
        assert!(crag.is_root_node(d.n1));
        assert!(crag.is_root_node(d.n2));
        assert_eq!(crag.children(d.n7).collect::<Vec<_>>(), vec![d.n6]);
        assert_eq!(crag.adj_edges(d.n6).len(), 1);
        assert_eq!(crag.erase_node(d.n5), Err(UsageError::ErasedNode(d.n5)));
        assert_eq!(crag.add_adjacency_edge(d.n5, d.n1, EdgeType::Adjacency), Err(UsageError::ErasedNode(d.n5)));
        // ids are reused
        let n = crag.add_node(NodeType::SliceCandidate);
        assert_eq!(n, d.n5);
        assert!(crag.is_leaf_node(n) && crag.is_root_node(n));
        assert_eq!(crag.node_type(n), NodeType::SliceCandidate);
    }

    #[test]
    fn crag_erase_edge_and_arc() {
        // cargo test crag_erase_edge_and_arc -- --nocapture
        let (mut crag, d) = diamond();
        crag.erase_edge(d.b).unwrap();
        assert_eq!(crag.adj_edges(d.n2).len(), 2);
        assert_eq!(crag.erase_edge(d.b), Err(UsageError::ErasedEdge(d.b)));
        let arc = crag.out_arcs(d.n5)[0];
        crag.erase_arc(arc).unwrap();
        assert!(crag.is_root_node(d.n5));
        assert_eq!(crag.level(d.n7), 2);
        assert_eq!(crag.erase_arc(arc), Err(UsageError::ErasedArc(arc)));
    }

    #[test]
    fn crag_rejects_cycles() {
        // cargo test crag_rejects_cycles -- --nocapture
        let (mut crag, d) = diamond();
        assert_eq!(
            crag.add_subset_arc(d.n7, d.n1),
            Err(UsageError::SubsetCycle {
                child: d.n7,
                parent: d.n1
            })
        );
        assert_eq!(crag.add_subset_arc(d.n1, d.n1), Err(UsageError::SelfLoop(d.n1)));
        assert_eq!(crag.add_adjacency_edge(d.n1, d.n1, EdgeType::Adjacency), Err(UsageError::SelfLoop(d.n1)));
        // a second parent is fine as long as the graph stays acyclic
        crag.add_subset_arc(d.n3, d.n5).unwrap();
        assert_eq!(crag.parents(d.n3).collect::<Vec<_>>(), vec![d.n6, d.n5]);
        assert_eq!(crag.parent(d.n3), Some(d.n6));
    }

    #[test]
    fn crag_leaf_collections() {
        // cargo test crag_leaf_collections -- --nocapture
        let (crag, d) = diamond();
        assert_eq!(crag.leaf_nodes(d.n7), btreeset! {d.n1, d.n2, d.n3, d.n4});
        assert_eq!(crag.leaf_nodes(d.n5), btreeset! {d.n1, d.n2});
        assert_eq!(crag.leaf_nodes(d.n1), btreeset! {d.n1});
        assert_eq!(crag.leaf_edges(d.n7), btreeset! {d.a, d.b, d.c});
        assert_eq!(crag.leaf_edges(d.n6), btreeset! {d.c});
        assert!(crag.leaf_edges(d.n1).is_empty());
        assert_eq!(crag.leaf_edges_of_edge(d.d), btreeset! {d.b});
        assert_eq!(crag.leaf_edges_of_edge(d.e), btreeset! {d.b});
        assert!(crag.is_leaf_edge(d.a));
        assert!(!crag.is_leaf_edge(d.e));
    }

    #[test]
    fn crag_descendant_edges() {
        // cargo test crag_descendant_edges -- --nocapture
        let (crag, d) = diamond();
        assert_eq!(crag.descendant_edges_between(d.n5, d.n6), btreeset! {d.b, d.d, d.e, d.f});
        assert_eq!(crag.descendant_edges(d.d), btreeset! {d.b, d.e, d.f});
        assert_eq!(crag.descendant_edges(d.e), btreeset! {d.b});
        assert!(crag.descendant_edges(d.a).is_empty());
        assert_eq!(crag.descendants(d.n6), btreeset! {d.n3, d.n4, d.n6});
    }

    #[test]
    fn crag_affiliated_edges() {
        // cargo test crag_affiliated_edges -- --nocapture
        let (mut crag, d) = diamond();
        let grid_edges = vec![GridEdge::new([0, 0, 0], 0).unwrap(), GridEdge::new([0, 1, 0], 0).unwrap()];
        crag.set_affiliated_edges(d.a, grid_edges.clone()).unwrap();
        assert_eq!(crag.affiliated_edges(d.a).unwrap(), grid_edges.as_slice());
        assert!(crag.affiliated_edges(d.b).unwrap().is_empty());
        assert_eq!(crag.affiliated_edges(d.d), Err(UsageError::NotALeafEdge(d.d)));
        assert_eq!(crag.set_affiliated_edges(d.e, vec![]), Err(UsageError::NotALeafEdge(d.e)));
        let bad_axis = GridEdge {
            voxel: [0, 0, 0],
            axis: 4,
        };
        assert!(matches!(
            crag.set_affiliated_edges(d.b, vec![bad_axis]),
            Err(UsageError::InvalidInput(_))
        ));
        assert!(crag.affiliated_edges(d.b).unwrap().is_empty());
    }
}
