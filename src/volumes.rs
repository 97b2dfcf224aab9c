//! Candidate Volumes
//!
//! Binary masks of the candidates. Leaf nodes own an explicit mask; the mask of an internal node is the union of the
//! masks of its leaf descendants, materialized on first access and cached until [`CragVolumes::clear_cache`].
//!

use crate::crag::*;
use crate::error::*;
use crate::util::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// axis-aligned box in world coordinates; the empty box is the identity of [`BoundingBox::fit`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    /// grow this box to contain `other`
    pub fn fit(&mut self, other: &BoundingBox) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(other.min[axis]);
            self.max[axis] = self.max[axis].max(other.max[axis]);
        }
    }

    pub fn size(&self) -> [f64; 3] {
        std::array::from_fn(|axis| self.max[axis] - self.min[axis])
    }

    pub fn center(&self) -> [f64; 3] {
        std::array::from_fn(|axis| (self.min[axis] + self.max[axis]) / 2.)
    }
}

/// a dense `u8` mask, any non-zero voxel belongs to the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CragVolume {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    /// world position of voxel `(0, 0, 0)`
    pub offset: [f64; 3],
    /// world size of one voxel
    pub resolution: [f64; 3],
    data: Vec<u8>,
}

impl CragVolume {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self::new_filled(width, height, depth, 0)
    }

    pub fn new_filled(width: usize, height: usize, depth: usize, value: u8) -> Self {
        Self {
            width,
            height,
            depth,
            offset: [0.; 3],
            resolution: crag_default_configs::resolution(),
            data: vec![value; width * height * depth],
        }
    }

    fn voxel_index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.width && y < self.height && z < self.depth, "voxel out of range");
        (z * self.height + y) * self.width + x
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        self.data[self.voxel_index(x, y, z)]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: u8) {
        let index = self.voxel_index(x, y, z);
        self.data[index] = value;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn num_voxels(&self) -> usize {
        self.data.iter().filter(|&&value| value != 0).count()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let dimensions = [self.width, self.height, self.depth];
        BoundingBox::new(
            self.offset,
            std::array::from_fn(|axis| self.offset[axis] + dimensions[axis] as f64 * self.resolution[axis]),
        )
    }

    /// union of masks sharing one resolution into a fresh buffer spanning their bounding box
    pub fn union(volumes: &[&CragVolume]) -> Self {
        let Some(first) = volumes.first() else {
            return Self::new(0, 0, 0);
        };
        let resolution = first.resolution;
        let mut bounding_box = BoundingBox::empty();
        for volume in volumes.iter() {
            bounding_box.fit(&volume.bounding_box());
        }
        let size = bounding_box.size();
        let dimensions: [usize; 3] = std::array::from_fn(|axis| (size[axis] / resolution[axis]).round() as usize);
        let mut union = Self::new(dimensions[0], dimensions[1], dimensions[2]);
        union.offset = bounding_box.min;
        union.resolution = resolution;
        for volume in volumes.iter() {
            let shift: [usize; 3] = std::array::from_fn(|axis| {
                ((volume.offset[axis] - bounding_box.min[axis]) / resolution[axis]).round() as usize
            });
            for z in 0..volume.depth {
                for y in 0..volume.height {
                    for x in 0..volume.width {
                        let value = volume.get(x, y, z);
                        if value != 0 {
                            union.set(x + shift[0], y + shift[1], z + shift[2], value);
                        }
                    }
                }
            }
        }
        union
    }
}

#[derive(Debug, Clone)]
pub struct CragVolumes {
    crag: Arc<Crag>,
    leaf_volumes: Vec<Option<Arc<CragVolume>>>,
    /// materialized masks of internal nodes
    cache: Vec<Option<Arc<CragVolume>>>,
}

impl CragVolumes {
    pub fn new(crag: Arc<Crag>) -> Self {
        let node_bound = crag.node_bound();
        Self {
            crag,
            leaf_volumes: vec![None; node_bound],
            cache: vec![None; node_bound],
        }
    }

    pub fn crag(&self) -> &Arc<Crag> {
        &self.crag
    }

    /// derived masks already in the cache are not updated, call [`CragVolumes::clear_cache`] afterwards if needed
    pub fn set_volume(&mut self, node_index: NodeIndex, volume: Arc<CragVolume>) -> CragResult<()> {
        self.crag.check_node(node_index)?;
        if !self.crag.is_leaf_node(node_index) {
            return Err(UsageError::NotALeafNode(node_index));
        }
        if volume.resolution.iter().any(|&resolution| !resolution.is_finite() || resolution <= 0.) {
            return Err(UsageError::InvalidInput(format!(
                "volume of node {node_index} has resolution {:?}",
                volume.resolution
            )));
        }
        if self.leaf_volumes.len() <= node_index {
            self.leaf_volumes.resize(node_index + 1, None);
        }
        self.leaf_volumes[node_index] = Some(volume);
        Ok(())
    }

    pub fn leaf_volume(&self, node_index: NodeIndex) -> CragResult<&Arc<CragVolume>> {
        self.leaf_volumes
            .get(node_index)
            .and_then(|volume| volume.as_ref())
            .ok_or(UsageError::MissingLeafVolume(node_index))
    }

    /// the mask of any node, materializing and caching the union for internal nodes
    pub fn volume(&mut self, node_index: NodeIndex) -> CragResult<Arc<CragVolume>> {
        self.crag.check_node(node_index)?;
        if self.crag.is_leaf_node(node_index) {
            return self.leaf_volume(node_index).cloned();
        }
        if let Some(Some(volume)) = self.cache.get(node_index) {
            return Ok(volume.clone());
        }
        let volume = Arc::new(self.materialize(node_index)?);
        if self.cache.len() <= node_index {
            self.cache.resize(node_index + 1, None);
        }
        self.cache[node_index] = Some(volume.clone());
        Ok(volume)
    }

    fn materialize(&self, node_index: NodeIndex) -> CragResult<CragVolume> {
        let mut volumes = vec![];
        for leaf in self.crag.leaf_nodes(node_index) {
            volumes.push(self.leaf_volume(leaf)?.as_ref());
        }
        if let Some(first) = volumes.first() {
            for volume in volumes.iter().skip(1) {
                if volume.resolution != first.resolution {
                    return Err(UsageError::ResolutionMismatch {
                        node: node_index,
                        expected: first.resolution,
                        found: volume.resolution,
                    });
                }
            }
        }
        Ok(CragVolume::union(&volumes))
    }

    /// union of the leaf bounding boxes, without materializing any mask
    pub fn bounding_box(&self, node_index: NodeIndex) -> CragResult<BoundingBox> {
        self.crag.check_node(node_index)?;
        let mut bounding_box = BoundingBox::empty();
        for leaf in self.crag.leaf_nodes(node_index) {
            bounding_box.fit(&self.leaf_volume(leaf)?.bounding_box());
        }
        Ok(bounding_box)
    }

    /// bounding box of all leaf masks
    pub fn bounding_box_all(&self) -> CragResult<BoundingBox> {
        let mut bounding_box = BoundingBox::empty();
        for node_index in self.crag.nodes() {
            if self.crag.is_leaf_node(node_index) {
                bounding_box.fit(&self.leaf_volume(node_index)?.bounding_box());
            }
        }
        Ok(bounding_box)
    }

    /// whether every candidate is a slice candidate
    pub fn is_2d(&self) -> bool {
        self.crag
            .nodes()
            .all(|node_index| self.crag.node_type(node_index) == NodeType::SliceCandidate)
    }

    pub fn clear_cache(&mut self) {
        self.cache.iter_mut().for_each(|volume| *volume = None);
    }

    pub fn num_cached(&self) -> usize {
        self.cache.iter().filter(|volume| volume.is_some()).count()
    }

    /// materialize the masks of all internal nodes in parallel, so that later reads never compute
    pub fn prewarm(&mut self) -> CragResult<()> {
        let missing: Vec<NodeIndex> = self
            .crag
            .nodes()
            .filter(|&node_index| {
                !self.crag.is_leaf_node(node_index) && !matches!(self.cache.get(node_index), Some(Some(_)))
            })
            .collect();
        let materialized: Vec<(NodeIndex, CragVolume)> = missing
            .par_iter()
            .map(|&node_index| self.materialize(node_index).map(|volume| (node_index, volume)))
            .collect::<CragResult<_>>()?;
        tracing::debug!("prewarmed {} internal volumes", materialized.len());
        if self.cache.len() < self.crag.node_bound() {
            self.cache.resize(self.crag.node_bound(), None);
        }
        for (node_index, volume) in materialized {
            self.cache[node_index] = Some(Arc::new(volume));
        }
        Ok(())
    }
}
