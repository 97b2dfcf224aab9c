//! Example CRAGs
//!
//! Small candidate graphs with known optimal selections, and randomized hierarchies for benchmarking.
//! They are meant for testing and demonstrating the solvers, not for modeling real segmentation data.
//!

use crate::costs::*;
use crate::crag::*;
use crate::derivative::Derivative;
use crate::rand_xoshiro::rand_core::SeedableRng;
use crate::util::*;
use crate::volumes::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// handles of the diamond graph
#[derive(Debug, Clone, Copy)]
pub struct DiamondNodes {
    pub n1: NodeIndex,
    pub n2: NodeIndex,
    pub n3: NodeIndex,
    pub n4: NodeIndex,
    pub n5: NodeIndex,
    pub n6: NodeIndex,
    pub n7: NodeIndex,
    pub a: EdgeIndex,
    pub b: EdgeIndex,
    pub c: EdgeIndex,
    pub d: EdgeIndex,
    pub e: EdgeIndex,
    pub f: EdgeIndex,
}

/// ```text
///            n7
///         /      \
///       n5   d    n6
///      /  \ e  f /  \
///    n1 a n2  b  n3 c n4
/// ```
/// leaves `n1..n4` in a row, `n5 = {n1, n2}`, `n6 = {n3, n4}`, `n7 = {n5, n6}`;
/// edges `a, b, c` between leaves, `d = (n5, n6)`, `e = (n5, n3)` and `f = (n2, n6)`
pub fn diamond() -> (Crag, DiamondNodes) {
    let mut crag = Crag::new();
    let n1 = crag.add_node(NodeType::VolumeCandidate);
    let n2 = crag.add_node(NodeType::VolumeCandidate);
    let n3 = crag.add_node(NodeType::VolumeCandidate);
    let n4 = crag.add_node(NodeType::VolumeCandidate);
    let n5 = crag.add_node(NodeType::VolumeCandidate);
    let n6 = crag.add_node(NodeType::VolumeCandidate);
    let n7 = crag.add_node(NodeType::VolumeCandidate);
    let mut add_edge = |u, v| {
        crag.add_adjacency_edge(u, v, EdgeType::Adjacency)
            .unwrap_or_else(|error| unreachable!("{error}"))
    };
    let a = add_edge(n1, n2);
    let b = add_edge(n2, n3);
    let c = add_edge(n3, n4);
    let d = add_edge(n5, n6);
    let e = add_edge(n5, n3);
    let f = add_edge(n2, n6);
    for (child, parent) in [(n1, n5), (n2, n5), (n3, n6), (n4, n6), (n5, n7), (n6, n7)] {
        crag.add_subset_arc(child, parent)
            .unwrap_or_else(|error| unreachable!("{error}"));
    }
    (
        crag,
        DiamondNodes {
            n1,
            n2,
            n3,
            n4,
            n5,
            n6,
            n7,
            a,
            b,
            c,
            d,
            e,
            f,
        },
    )
}

/// `num_chains` disjoint chains of `length` nodes; node `c * length + j` is the parent of `c * length + j - 1`
pub fn chains(num_chains: usize, length: usize) -> Crag {
    let mut crag = Crag::new();
    for _ in 0..num_chains * length {
        crag.add_node(NodeType::VolumeCandidate);
    }
    for chain in 0..num_chains {
        for j in 1..length {
            let node_index = chain * length + j;
            crag.add_subset_arc(node_index - 1, node_index)
                .unwrap_or_else(|error| unreachable!("{error}"));
        }
    }
    crag
}

/// a random cost in `[-1, 1)` with two decimal digits
fn random_cost(rng: &mut DeterministicRng) -> Weight {
    ((rng.next_f64() * 200.).floor() - 100.) / 100.
}

/// a `width` x `height` grid of leaf candidates, merged `num_merges` times by picking a random adjacency edge between
/// two roots and adding their union as a parent; the union inherits the adjacency of its children; random costs
pub fn random_hierarchy(width: usize, height: usize, num_merges: usize, seed: u64) -> (Crag, Costs) {
    let mut rng = DeterministicRng::seed_from_u64(seed);
    let mut crag = Crag::new();
    for _ in 0..width * height {
        crag.add_node(NodeType::VolumeCandidate);
    }
    for y in 0..height {
        for x in 0..width {
            let node_index = y * width + x;
            let mut add_edge = |other| {
                crag.add_adjacency_edge(node_index, other, EdgeType::Adjacency)
                    .unwrap_or_else(|error| unreachable!("{error}"));
            };
            if x + 1 < width {
                add_edge(node_index + 1);
            }
            if y + 1 < height {
                add_edge(node_index + width);
            }
        }
    }
    for _ in 0..num_merges {
        let candidates: Vec<EdgeIndex> = crag
            .edges()
            .filter(|&edge_index| crag.is_root_node(crag.u(edge_index)) && crag.is_root_node(crag.v(edge_index)))
            .collect();
        if candidates.is_empty() {
            break;
        }
        let merged = candidates[(rng.next_f64() * candidates.len() as f64) as usize];
        let (u, v) = (crag.u(merged), crag.v(merged));
        let parent = crag.add_node(NodeType::VolumeCandidate);
        for child in [u, v] {
            crag.add_subset_arc(child, parent)
                .unwrap_or_else(|error| unreachable!("{error}"));
        }
        let neighbors: BTreeSet<NodeIndex> = [u, v]
            .iter()
            .flat_map(|&child| crag.adj_edges(child).iter().map(move |&edge_index| (child, edge_index)))
            .map(|(child, edge_index)| crag.opposite(child, edge_index))
            .filter(|&neighbor| crag.is_root_node(neighbor) && neighbor != parent)
            .collect();
        for neighbor in neighbors {
            crag.add_adjacency_edge(parent, neighbor, EdgeType::Adjacency)
                .unwrap_or_else(|error| unreachable!("{error}"));
        }
    }
    let mut costs = Costs::new(&crag);
    for node_index in crag.nodes() {
        costs.node[node_index] = random_cost(&mut rng);
    }
    for edge_index in crag.edges() {
        costs.edge[edge_index] = random_cost(&mut rng);
    }
    (crag, costs)
}

/// a stack of sections with slice candidates, linked by assignment candidates
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct SliceStack {
    pub crag: Arc<Crag>,
    #[derivative(Debug = "ignore")]
    pub volumes: CragVolumes,
    /// the slice candidates of each section
    pub slices: Vec<Vec<NodeIndex>>,
    /// one before the first section, one between each pair of sections, one after the last section
    pub null_assignments: Vec<NodeIndex>,
    /// one for every pair of slices in neighboring sections, in order of sections, then of the lower slice, then of
    /// the upper slice
    pub assignments: Vec<NodeIndex>,
}

/// every section `z` contains `slices_per_section[z]` 2x2x1 slices side by side at depth `z`; the null-assignment
/// candidates sit between the sections and every pair of slices in neighboring sections gets an assignment candidate
pub fn slice_stack(slices_per_section: &[usize]) -> SliceStack {
    let mut crag = Crag::new();
    let null_assignments: Vec<NodeIndex> = (0..=slices_per_section.len())
        .map(|_| crag.add_node(NodeType::NullAssignmentCandidate))
        .collect();
    let mut slices: Vec<Vec<NodeIndex>> = vec![];
    let mut assignments = vec![];
    for (z, &num_slices) in slices_per_section.iter().enumerate() {
        let mut section = vec![];
        for _ in 0..num_slices {
            let slice = crag.add_node(NodeType::SliceCandidate);
            for null in [null_assignments[z], null_assignments[z + 1]] {
                crag.add_adjacency_edge(slice, null, EdgeType::NullAssignmentLink)
                    .unwrap_or_else(|error| unreachable!("{error}"));
            }
            section.push(slice);
        }
        if let Some(previous) = slices.last() {
            for &lower in previous.iter() {
                for &upper in section.iter() {
                    let assignment = crag.add_node(NodeType::AssignmentCandidate);
                    for slice in [lower, upper] {
                        crag.add_adjacency_edge(slice, assignment, EdgeType::AssignmentLink)
                            .unwrap_or_else(|error| unreachable!("{error}"));
                        crag.add_subset_arc(slice, assignment)
                            .unwrap_or_else(|error| unreachable!("{error}"));
                    }
                    assignments.push(assignment);
                }
            }
        }
        slices.push(section);
    }
    let crag = Arc::new(crag);
    let mut volumes = CragVolumes::new(crag.clone());
    let mut set_volume = |node_index, volume: CragVolume| {
        volumes
            .set_volume(node_index, Arc::new(volume))
            .unwrap_or_else(|error| unreachable!("{error}"));
    };
    for (z, section) in slices.iter().enumerate() {
        for (i, &slice) in section.iter().enumerate() {
            let mut volume = CragVolume::new_filled(2, 2, 1, 1);
            volume.offset = [3. * i as f64, 0., z as f64];
            set_volume(slice, volume);
        }
    }
    for (z, &null) in null_assignments.iter().enumerate() {
        let mut volume = CragVolume::new_filled(1, 1, 1, 1);
        volume.offset = [0., 0., z as f64 - 0.5];
        set_volume(null, volume);
    }
    SliceStack {
        crag,
        volumes,
        slices,
        null_assignments,
        assignments,
    }
}
