//! Snapshot
//!
//! JSON snapshots of graphs, costs and solutions. Snapshots of the same graph share the `nodes` and `edges` arrays
//! index by index, so they can be combined into a single object before being written out.
//!

use crate::costs::*;
use crate::crag::*;
use crate::solution::*;

pub trait CragSnapshot {
    /// take a snapshot, set `abbrev` to true to save space
    fn snapshot(&self, abbrev: bool) -> serde_json::Value;
}

impl CragSnapshot for Crag {
    fn snapshot(&self, abbrev: bool) -> serde_json::Value {
        let mut nodes = vec![serde_json::Value::Null; self.node_bound()];
        for node_index in self.nodes() {
            nodes[node_index] = json!({
                if abbrev { "t" } else { "type" }: self.node_type(node_index),
                if abbrev { "l" } else { "level" }: self.level(node_index),
                if abbrev { "p" } else { "parents" }: self.parents(node_index).collect::<Vec<_>>(),
            });
        }
        let mut edges = vec![serde_json::Value::Null; self.edge_bound()];
        for edge_index in self.edges() {
            edges[edge_index] = json!({
                if abbrev { "t" } else { "type" }: self.edge_type(edge_index),
                "u": self.u(edge_index),
                "v": self.v(edge_index),
            });
        }
        json!({
            "nodes": nodes,
            "edges": edges,
        })
    }
}

impl CragSnapshot for Costs {
    fn snapshot(&self, abbrev: bool) -> serde_json::Value {
        let key_cost = if abbrev { "c" } else { "cost" };
        let nodes: Vec<_> = self.node.iter().map(|cost| json!({ key_cost: cost })).collect();
        let edges: Vec<_> = self.edge.iter().map(|cost| json!({ key_cost: cost })).collect();
        json!({
            "nodes": nodes,
            "edges": edges,
        })
    }
}

impl CragSnapshot for CragSolution {
    fn snapshot(&self, abbrev: bool) -> serde_json::Value {
        let crag = self.crag();
        let key_selected = if abbrev { "s" } else { "selected" };
        let mut nodes = vec![serde_json::Value::Null; crag.node_bound()];
        for node_index in crag.nodes() {
            nodes[node_index] = json!({
                key_selected: i32::from(self.node_selected(node_index)),
                if abbrev { "lb" } else { "label" }: self.label(node_index),
            });
        }
        let mut edges = vec![serde_json::Value::Null; crag.edge_bound()];
        for edge_index in crag.edges() {
            edges[edge_index] = json!({
                key_selected: i32::from(self.edge_selected(edge_index)),
            });
        }
        json!({
            "nodes": nodes,
            "edges": edges,
            "num_labels": self.num_labels(),
        })
    }
}

pub type ObjectMap = serde_json::Map<String, serde_json::Value>;

/// move the fields of `obj_2` into `obj`; a field present in both must hold the same value
fn snapshot_copy_remaining_fields(obj: &mut ObjectMap, obj_2: ObjectMap) {
    for (key, value_2) in obj_2 {
        match obj.get(&key) {
            None => {
                obj.insert(key, value_2);
            }
            Some(value) => {
                assert_eq!(
                    value, &value_2,
                    "cannot combine different values of `{key}`: please make sure values don't conflict"
                );
            }
        }
    }
}

/// merge `value_2` into `value`, element by element for the `nodes` and `edges` arrays
pub fn snapshot_combine_values(value: &mut serde_json::Value, value_2: serde_json::Value) {
    let value = value.as_object_mut().expect("snapshot must be an object");
    let serde_json::Value::Object(mut value_2) = value_2 else {
        panic!("snapshot must be an object");
    };
    for key in ["nodes", "edges"] {
        let Some(elements_2) = value_2.remove(key) else {
            continue;
        };
        let Some(elements) = value.get_mut(key) else {
            value.insert(key.to_string(), elements_2);
            continue;
        };
        let elements = elements.as_array_mut().expect("elements must be an array");
        let serde_json::Value::Array(elements_2) = elements_2 else {
            panic!("elements must be an array");
        };
        assert_eq!(elements.len(), elements_2.len(), "{key} must be compatible");
        for (element, element_2) in elements.iter_mut().zip(elements_2) {
            match element_2 {
                serde_json::Value::Null => {}
                serde_json::Value::Object(element_2) => {
                    if element.is_null() {
                        *element = serde_json::Value::Object(ObjectMap::new());
                    }
                    let element = element.as_object_mut().expect("each element must be an object");
                    snapshot_copy_remaining_fields(element, element_2);
                }
                _ => panic!("each element must be an object"),
            }
        }
    }
    snapshot_copy_remaining_fields(value, value_2);
}

/// combined snapshot of a list of objects describing the same graph
pub fn snapshot_combined(objects: &[&dyn CragSnapshot], abbrev: bool) -> serde_json::Value {
    let mut value = json!({});
    for object in objects.iter() {
        snapshot_combine_values(&mut value, object.snapshot(abbrev));
    }
    value
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::example_crags::*;
    use std::sync::Arc;

    #[test]
    fn snapshot_diamond() {
        // cargo test snapshot_diamond -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n7] = -1.;
        let mut solution = CragSolution::new(crag.clone());
        solution.set_node_selected(d.n5, true);
        solution.set_node_selected(d.n6, true);
        solution.set_edge_selected(d.d, true);
        let value = snapshot_combined(&[crag.as_ref(), &costs, &solution], false);
        println!("{value}");
        assert_eq!(value["nodes"][d.n7]["level"], json!(2));
        assert_eq!(value["nodes"][d.n7]["cost"], json!(-1.));
        assert_eq!(value["nodes"][d.n5]["parents"], json!([d.n7]));
        assert_eq!(value["nodes"][d.n5]["label"], value["nodes"][d.n6]["label"]);
        assert_eq!(value["nodes"][d.n1]["selected"], json!(0));
        assert_eq!(value["edges"][d.d]["selected"], json!(1));
        assert_eq!(value["edges"][d.e]["type"], json!("adjacency"));
        assert_eq!(value["num_labels"], json!(1));
    }

    #[test]
    fn snapshot_erased_node() {
        // cargo test snapshot_erased_node -- --nocapture
        let (mut crag, d) = diamond();
        crag.erase_node(d.n4).unwrap();
        let value = crag.snapshot(true);
        assert!(value["nodes"][d.n4].is_null());
        assert!(value["edges"][d.c].is_null());
        assert_eq!(value["nodes"][d.n6]["l"], json!(1));
    }

    #[test]
    #[should_panic]
    fn snapshot_conflicting_values() {
        // cargo test snapshot_conflicting_values -- --nocapture
        let mut value = json!({ "nodes": [{ "cost": 1. }] });
        snapshot_combine_values(&mut value, json!({ "nodes": [{ "cost": 2. }] }));
    }
}
