use crate::costs::*;
use crate::crag::*;
use crate::error::*;
use crate::volumes::*;
use rand_xoshiro::rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

pub type Weight = f64;
pub type NodeIndex = usize;
pub type EdgeIndex = usize;
pub type ArcIndex = usize;
pub type VarIndex = usize;
pub type NodeNum = NodeIndex;
pub type EdgeNum = EdgeIndex;

/// use Xoshiro256StarStar for deterministic random number generator
pub type DeterministicRng = rand_xoshiro::Xoshiro256StarStar;

pub trait F64Rng {
    fn next_f64(&mut self) -> f64;
}

impl F64Rng for DeterministicRng {
    fn next_f64(&mut self) -> f64 {
        f64::from_bits(0x3FF << 52 | self.next_u64() >> 12) - 1.
    }
}

/// the kind of region hypothesis a candidate node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    /// a 3D region candidate
    VolumeCandidate,
    /// a 2D region candidate inside one section of an anisotropic stack
    SliceCandidate,
    /// links slice candidates of neighboring sections
    AssignmentCandidate,
    /// explains a slice candidate that does not continue into a neighboring section
    NullAssignmentCandidate,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::VolumeCandidate,
        NodeType::SliceCandidate,
        NodeType::AssignmentCandidate,
        NodeType::NullAssignmentCandidate,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeType {
    /// the two candidates touch and may be merged
    Adjacency,
    /// the two candidates touch but are known to belong to different objects
    Separation,
    /// a slice candidate and the assignment candidate linking it
    AssignmentLink,
    /// a slice candidate and a null-assignment candidate
    NullAssignmentLink,
}

impl EdgeType {
    pub const ALL: [EdgeType; 4] = [
        EdgeType::Adjacency,
        EdgeType::Separation,
        EdgeType::AssignmentLink,
        EdgeType::NullAssignmentLink,
    ];
}

/// an edge of the voxel grid graph, given by its lower voxel and the axis (0, 1 or 2) it points along
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridEdge {
    pub voxel: [usize; 3],
    pub axis: usize,
}

impl GridEdge {
    pub fn new(voxel: [usize; 3], axis: usize) -> CragResult<Self> {
        let grid_edge = Self { voxel, axis };
        grid_edge.check()?;
        Ok(grid_edge)
    }

    /// deserialized or hand-built grid edges may carry any axis
    pub fn check(&self) -> CragResult<()> {
        if self.axis >= 3 {
            return Err(UsageError::InvalidInput(format!(
                "grid edge axis must be 0, 1 or 2, found {}",
                self.axis
            )));
        }
        Ok(())
    }

    /// the voxel on the other side of the edge
    pub fn target(&self) -> [usize; 3] {
        let mut target = self.voxel;
        target[self.axis] += 1;
        target
    }
}

/// a leaf mask given as a completely filled box, used when describing a graph in JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeafBox {
    pub node: NodeIndex,
    pub offset: [f64; 3],
    pub size: [usize; 3],
    #[serde(default = "crag_default_configs::resolution")]
    pub resolution: [f64; 3],
}

/// serializable description of a candidate graph together with its costs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CragInitializer {
    /// the type of each node, ids are assigned in order
    pub nodes: Vec<NodeType>,
    /// adjacency edges as `(u, v, type)`, ids are assigned in order
    #[serde(default)]
    pub edges: Vec<(NodeIndex, NodeIndex, EdgeType)>,
    /// subset arcs as `(child, parent)`
    #[serde(default)]
    pub arcs: Vec<(NodeIndex, NodeIndex)>,
    /// node costs, missing entries are zero
    #[serde(default)]
    pub node_costs: Vec<Weight>,
    /// edge costs, missing entries are zero
    #[serde(default)]
    pub edge_costs: Vec<Weight>,
    /// replace costs by their leaf decomposition before solving
    #[serde(default)]
    pub propagate_costs: bool,
    /// optional leaf masks, required by the assignment solver
    #[serde(default)]
    pub leaf_boxes: Vec<LeafBox>,
}

pub mod crag_default_configs {
    pub fn resolution() -> [f64; 3] {
        [1., 1., 1.]
    }
}

impl LeafBox {
    pub fn check(&self) -> CragResult<()> {
        if self.resolution.iter().any(|&resolution| !resolution.is_finite() || resolution <= 0.) {
            return Err(UsageError::InvalidInput(format!(
                "leaf box of node {} has resolution {:?}, expected positive finite values",
                self.node, self.resolution
            )));
        }
        if self.offset.iter().any(|offset| !offset.is_finite()) {
            return Err(UsageError::InvalidInput(format!(
                "leaf box of node {} has offset {:?}, expected finite values",
                self.node, self.offset
            )));
        }
        if self.size.iter().any(|&size| size == 0) {
            return Err(UsageError::InvalidInput(format!(
                "leaf box of node {} has size {:?}, expected positive values",
                self.node, self.size
            )));
        }
        Ok(())
    }
}

impl CragInitializer {
    pub fn new(nodes: Vec<NodeType>) -> Self {
        Self {
            nodes,
            edges: vec![],
            arcs: vec![],
            node_costs: vec![],
            edge_costs: vec![],
            propagate_costs: false,
            leaf_boxes: vec![],
        }
    }

    pub fn from_file(filename: &str) -> CragResult<Self> {
        let file = File::open(filename).map_err(|error| UsageError::InvalidInput(format!("{filename}: {error}")))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|error| UsageError::InvalidInput(format!("{filename}: {error}")))
    }

    pub fn build_crag(&self) -> CragResult<Crag> {
        let mut crag = Crag::new();
        for &node_type in self.nodes.iter() {
            crag.add_node(node_type);
        }
        for &(u, v, edge_type) in self.edges.iter() {
            crag.add_adjacency_edge(u, v, edge_type)?;
        }
        for &(child, parent) in self.arcs.iter() {
            crag.add_subset_arc(child, parent)?;
        }
        Ok(crag)
    }

    /// build the graph, its costs and the leaf volumes at once
    pub fn build(&self) -> CragResult<(Arc<Crag>, Costs, CragVolumes)> {
        if self.node_costs.len() > self.nodes.len() {
            return Err(UsageError::InvalidInput(format!(
                "{} node costs given for {} nodes",
                self.node_costs.len(),
                self.nodes.len()
            )));
        }
        if self.edge_costs.len() > self.edges.len() {
            return Err(UsageError::InvalidInput(format!(
                "{} edge costs given for {} edges",
                self.edge_costs.len(),
                self.edges.len()
            )));
        }
        for leaf_box in self.leaf_boxes.iter() {
            leaf_box.check()?;
        }
        let crag = Arc::new(self.build_crag()?);
        let mut costs = Costs::new(&crag);
        costs.node[..self.node_costs.len()].copy_from_slice(&self.node_costs);
        costs.edge[..self.edge_costs.len()].copy_from_slice(&self.edge_costs);
        if self.propagate_costs {
            costs.propagate_leaf_values(&crag);
        }
        let mut volumes = CragVolumes::new(crag.clone());
        for leaf_box in self.leaf_boxes.iter() {
            let mut volume = CragVolume::new_filled(leaf_box.size[0], leaf_box.size[1], leaf_box.size[2], 1);
            volume.offset = leaf_box.offset;
            volume.resolution = leaf_box.resolution;
            volumes.set_volume(leaf_box.node, Arc::new(volume))?;
        }
        Ok((crag, costs, volumes))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn crag_initializer_from_json() {
        // cargo test crag_initializer_from_json -- --nocapture
        let initializer: CragInitializer = serde_json::from_value(serde_json::json!({
            "nodes": ["volume-candidate", "volume-candidate", "volume-candidate"],
            "edges": [[0, 1, "adjacency"]],
            "arcs": [[0, 2], [1, 2]],
            "node_costs": [1.0, 2.0],
            "edge_costs": [0.5],
            "propagate_costs": true,
        }))
        .unwrap();
        let (crag, costs, _) = initializer.build().unwrap();
        assert_eq!(crag.num_nodes(), 3);
        assert_eq!(crag.num_edges(), 1);
        assert_eq!(crag.level(2), 1);
        assert_eq!(costs.node[2], 3.5);
    }

    #[test]
    fn crag_initializer_rejects_unknown_fields() {
        // cargo test crag_initializer_rejects_unknown_fields -- --nocapture
        let result: Result<CragInitializer, _> = serde_json::from_value(serde_json::json!({
            "nodes": [],
            "weights": [],
        }));
        assert!(result.is_err());
    }

    #[test]
    fn crag_initializer_bad_arc() {
        // cargo test crag_initializer_bad_arc -- --nocapture
        let mut initializer = CragInitializer::new(vec![NodeType::VolumeCandidate; 2]);
        initializer.arcs = vec![(0, 1), (1, 0)];
        assert_eq!(
            initializer.build_crag().unwrap_err(),
            UsageError::SubsetCycle { child: 1, parent: 0 }
        );
    }

    #[test_case([0., 1., 1.], [0., 0., 0.], [1, 1, 1]; "zero resolution")]
    #[test_case([1., -2., 1.], [0., 0., 0.], [1, 1, 1]; "negative resolution")]
    #[test_case([1., 1., f64::NAN], [0., 0., 0.], [1, 1, 1]; "nan resolution")]
    #[test_case([1., 1., 1.], [f64::INFINITY, 0., 0.], [1, 1, 1]; "infinite offset")]
    #[test_case([1., 1., 1.], [0., 0., 0.], [2, 0, 1]; "empty box")]
    fn crag_initializer_rejects_leaf_box(resolution: [f64; 3], offset: [f64; 3], size: [usize; 3]) {
        // cargo test crag_initializer_rejects_leaf_box -- --nocapture
        let mut initializer = CragInitializer::new(vec![NodeType::VolumeCandidate]);
        initializer.leaf_boxes = vec![LeafBox {
            node: 0,
            offset,
            size,
            resolution,
        }];
        assert!(matches!(initializer.build(), Err(UsageError::InvalidInput(_))));
    }

    #[test]
    fn crag_initializer_leaf_box() {
        // cargo test crag_initializer_leaf_box -- --nocapture
        let initializer: CragInitializer = serde_json::from_value(serde_json::json!({
            "nodes": ["volume-candidate"],
            "leaf_boxes": [{ "node": 0, "offset": [1.0, 0.0, 0.0], "size": [2, 2, 1], "resolution": [0.5, 0.5, 1.0] }],
        }))
        .unwrap();
        let (_, _, volumes) = initializer.build().unwrap();
        assert_eq!(volumes.bounding_box(0).unwrap().size(), [1., 1., 1.]);
    }

    #[test]
    fn grid_edge_target() {
        // cargo test grid_edge_target -- --nocapture
        assert_eq!(GridEdge::new([1, 2, 3], 2).unwrap().target(), [1, 2, 4]);
        assert!(matches!(GridEdge::new([0, 0, 0], 3), Err(UsageError::InvalidInput(_))));
    }
}
