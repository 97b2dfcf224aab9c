//! Assignment Solver
//!
//! Links slice candidates of neighboring sections of an anisotropic stack. Every selected slice is explained exactly
//! once towards each neighboring section, either by an assignment candidate linking it to a slice there or by a
//! null-assignment candidate. A single backend call solves the model, no constraints are separated lazily.
//!

use crate::costs::*;
use crate::crag::*;
use crate::crag_solver::*;
use crate::error::*;
use crate::linear_solver::*;
use crate::solution::*;
use crate::util::*;
use crate::volumes::*;
use std::sync::Arc;

pub struct AssignmentSolver {
    crag: Arc<Crag>,
    parameters: CragSolverParameters,
    variables: CragVariables,
    backend: Box<dyn LinearSolverBackend>,
    objective: LinearObjective,
    constraints: LinearConstraints,
    value: f64,
}

impl AssignmentSolver {
    /// the graph may only contain slice, assignment and null-assignment candidates connected by (null-)assignment links
    pub fn new(crag: Arc<Crag>, volumes: &CragVolumes, parameters: CragSolverParameters) -> CragResult<Self> {
        Self::check_crag(&crag)?;
        let variables = CragVariables::new(&crag);
        let mut backend = create_linear_solver_backend(&parameters.backend);
        backend.initialize(variables.num_variables(), VariableType::Binary);
        let mut objective = LinearObjective::new(variables.num_variables());
        objective.set_sense(parameters.objective_sense());
        let mut solver = Self {
            crag,
            parameters,
            variables,
            backend,
            objective,
            constraints: LinearConstraints::new(),
            value: 0.,
        };
        solver.set_constraints(volumes)?;
        Ok(solver)
    }

    fn check_crag(crag: &Crag) -> CragResult<()> {
        for node_index in crag.nodes() {
            let node_type = crag.node_type(node_index);
            if node_type == NodeType::VolumeCandidate {
                return Err(UsageError::IncompatibleNodeType {
                    node: node_index,
                    node_type,
                });
            }
        }
        for edge_index in crag.edges() {
            let edge_type = crag.edge_type(edge_index);
            if matches!(edge_type, EdgeType::Adjacency | EdgeType::Separation) {
                return Err(UsageError::IncompatibleEdgeType {
                    edge: edge_index,
                    edge_type,
                });
            }
        }
        Ok(())
    }

    fn set_constraints(&mut self, volumes: &CragVolumes) -> CragResult<()> {
        let crag = self.crag.clone();
        // tree-path constraints from every root, where assignment candidates do not count as parents
        let mut num_tree_path_constraints = 0;
        for node_index in crag.nodes() {
            if crag.node_type(node_index) == NodeType::AssignmentCandidate {
                continue;
            }
            let has_parent = crag
                .parents(node_index)
                .any(|parent| crag.node_type(parent) != NodeType::AssignmentCandidate);
            if has_parent {
                continue;
            }
            for constraint in collect_tree_path_constraints(
                &crag,
                node_index,
                &self.variables,
                self.parameters.tree_path_relation(),
                2,
            ) {
                self.constraints.add(constraint);
                num_tree_path_constraints += 1;
            }
        }
        tracing::debug!("added {num_tree_path_constraints} tree-path constraints");
        // a selected slice has exactly one selected link to +z and one to -z, an unselected one none
        let mut num_explanation_constraints = 0;
        for node_index in crag.nodes() {
            if crag.node_type(node_index) != NodeType::SliceCandidate {
                continue;
            }
            let center = volumes.bounding_box(node_index)?.center()[2];
            let mut z_differences = Vec::with_capacity(crag.adj_edges(node_index).len());
            for &edge_index in crag.adj_edges(node_index) {
                let other = crag.opposite(node_index, edge_index);
                z_differences.push((edge_index, volumes.bounding_box(other)?.center()[2] - center));
            }
            for direction in [1, -1] {
                let mut constraint = LinearConstraint::new();
                let mut num_links = 0;
                for &(edge_index, z_difference) in z_differences.iter() {
                    if z_difference * (direction as f64) < 0. {
                        continue;
                    }
                    constraint.set_coefficient(self.variables.edge(edge_index), 1.);
                    num_links += 1;
                }
                if num_links == 0 {
                    return Err(UsageError::NoDirectionalLink {
                        node: node_index,
                        direction,
                    });
                }
                constraint.set_coefficient(self.variables.node(node_index), -1.);
                constraint.set_relation(Relation::Equal);
                constraint.set_value(0.);
                self.constraints.add(constraint);
                num_explanation_constraints += 1;
            }
        }
        tracing::debug!("added {num_explanation_constraints} explanation constraints");
        // all links of a selected assignment candidate are selected with it
        let mut num_identity_constraints = 0;
        for node_index in crag.nodes() {
            if crag.node_type(node_index) != NodeType::AssignmentCandidate {
                continue;
            }
            for &edge_index in crag.adj_edges(node_index) {
                let edge_type = crag.edge_type(edge_index);
                if edge_type != EdgeType::AssignmentLink {
                    return Err(UsageError::IncompatibleEdgeType {
                        edge: edge_index,
                        edge_type,
                    });
                }
                self.constraints.add(LinearConstraint::from_terms(
                    [
                        (self.variables.node(node_index), 1.),
                        (self.variables.edge(edge_index), -1.),
                    ],
                    Relation::Equal,
                    0.,
                ));
                num_identity_constraints += 1;
            }
        }
        tracing::debug!("added {num_identity_constraints} identity constraints");
        self.backend.set_constraints(&self.constraints);
        Ok(())
    }
}

impl CragSolver for AssignmentSolver {
    /// costs of all candidates, but only of null-assignment links among the edges
    fn set_costs(&mut self, costs: &Costs) {
        for node_index in self.crag.nodes() {
            self.objective
                .set_coefficient(self.variables.node(node_index), costs.node[node_index]);
        }
        for edge_index in self.crag.edges() {
            if self.crag.edge_type(edge_index) == EdgeType::NullAssignmentLink {
                self.objective
                    .set_coefficient(self.variables.edge(edge_index), costs.edge[edge_index]);
            }
        }
    }

    fn solve(&mut self, solution: &mut CragSolution) -> CragSolverStatus {
        debug_assert!(Arc::ptr_eq(solution.crag(), &self.crag), "solution belongs to another graph");
        self.backend.set_objective(&self.objective);
        tracing::info!("searching for optimal assignments...");
        let result = self.backend.solve();
        if !result.optimal {
            tracing::error!("backend did not find optimal solution: {}", result.message);
        }
        let (num_selected, num_merged) = self.variables.read_solution(&self.crag, &result, solution);
        self.value = result.value;
        tracing::info!("{num_selected} candidates selected, {num_merged} links selected, value {}", self.value);
        CragSolverStatus::SolutionFound
    }

    fn get_value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::example_crags::*;

    /// every selected slice is linked exactly once in both directions
    fn assert_explained(stack: &SliceStack, solution: &CragSolution) {
        let crag = solution.crag();
        for section in stack.slices.iter() {
            for &slice in section.iter() {
                let num_links = crag
                    .adj_edges(slice)
                    .iter()
                    .filter(|&&edge_index| solution.edge_selected(edge_index))
                    .count();
                assert_eq!(num_links, if solution.node_selected(slice) { 2 } else { 0 });
            }
        }
    }

    #[test]
    fn assignment_links_slices() {
        // cargo test assignment_links_slices -- --nocapture
        let stack = slice_stack(&[1, 1, 1]);
        let crag = stack.crag.clone();
        let mut costs = Costs::new(&crag);
        for section in stack.slices.iter() {
            for &slice in section.iter() {
                costs.node[slice] = -1.;
            }
        }
        for &null in stack.null_assignments.iter() {
            for &edge_index in crag.adj_edges(null) {
                costs.edge[edge_index] = 1.;
            }
        }
        let mut solver = AssignmentSolver::new(crag.clone(), &stack.volumes, CragSolverParameters::default()).unwrap();
        solver.set_costs(&costs);
        let mut solution = CragSolution::new(crag.clone());
        assert_eq!(solver.solve(&mut solution), CragSolverStatus::SolutionFound);
        // three slices, two assignments, only the ends of the stack use null links
        assert_eq!(solver.get_value(), -3. + 2.);
        for &assignment in stack.assignments.iter() {
            assert!(solution.node_selected(assignment));
        }
        assert_explained(&stack, &solution);
        let slice_labels: Vec<_> = stack.slices.iter().map(|section| solution.label(section[0])).collect();
        assert!(slice_labels.iter().all(|&label| label == slice_labels[0] && label > 0));
    }

    #[test]
    fn assignment_prefers_cheap_links() {
        // cargo test assignment_prefers_cheap_links -- --nocapture
        let stack = slice_stack(&[2, 2]);
        let crag = stack.crag.clone();
        let mut costs = Costs::new(&crag);
        for section in stack.slices.iter() {
            for &slice in section.iter() {
                costs.node[slice] = -2.;
            }
        }
        // assignments are listed per pair of slices, the straight links are cheaper
        for (index, &assignment) in stack.assignments.iter().enumerate() {
            costs.node[assignment] = if index == 0 || index == 3 { -1. } else { 0.5 };
        }
        let mut solver = AssignmentSolver::new(crag.clone(), &stack.volumes, CragSolverParameters::default()).unwrap();
        solver.set_costs(&costs);
        let mut solution = CragSolution::new(crag);
        solver.solve(&mut solution);
        assert_eq!(solver.get_value(), -8. - 2.);
        assert!(solution.node_selected(stack.assignments[0]) && solution.node_selected(stack.assignments[3]));
        assert!(!solution.node_selected(stack.assignments[1]) && !solution.node_selected(stack.assignments[2]));
        assert_explained(&stack, &solution);
    }

    #[test]
    fn assignment_rejects_volume_candidates() {
        // cargo test assignment_rejects_volume_candidates -- --nocapture
        let stack = slice_stack(&[1, 1]);
        let mut crag = (*stack.crag).clone();
        let node_index = crag.add_node(NodeType::VolumeCandidate);
        let crag = Arc::new(crag);
        let volumes = CragVolumes::new(crag.clone());
        assert_eq!(
            AssignmentSolver::new(crag, &volumes, CragSolverParameters::default()).err(),
            Some(UsageError::IncompatibleNodeType {
                node: node_index,
                node_type: NodeType::VolumeCandidate
            })
        );
        let mut crag = (*stack.crag).clone();
        let edge_index = crag
            .add_adjacency_edge(stack.slices[0][0], stack.slices[1][0], EdgeType::Adjacency)
            .unwrap();
        let crag = Arc::new(crag);
        let volumes = CragVolumes::new(crag.clone());
        assert_eq!(
            AssignmentSolver::new(crag, &volumes, CragSolverParameters::default()).err(),
            Some(UsageError::IncompatibleEdgeType {
                edge: edge_index,
                edge_type: EdgeType::Adjacency
            })
        );
    }

    #[test]
    fn assignment_requires_links_in_both_directions() {
        // cargo test assignment_requires_links_in_both_directions -- --nocapture
        let mut crag = Crag::new();
        let slice = crag.add_node(NodeType::SliceCandidate);
        let null = crag.add_node(NodeType::NullAssignmentCandidate);
        crag.add_adjacency_edge(slice, null, EdgeType::NullAssignmentLink).unwrap();
        let crag = Arc::new(crag);
        let mut volumes = CragVolumes::new(crag.clone());
        volumes.set_volume(slice, Arc::new(CragVolume::new_filled(2, 2, 1, 1))).unwrap();
        let mut null_volume = CragVolume::new_filled(1, 1, 1, 1);
        null_volume.offset = [0., 0., -0.5];
        volumes.set_volume(null, Arc::new(null_volume)).unwrap();
        assert_eq!(
            AssignmentSolver::new(crag.clone(), &volumes, CragSolverParameters::default()).err(),
            Some(UsageError::NoDirectionalLink {
                node: slice,
                direction: 1
            })
        );
        let volumes = CragVolumes::new(crag.clone());
        assert_eq!(
            AssignmentSolver::new(crag, &volumes, CragSolverParameters::default()).err(),
            Some(UsageError::MissingLeafVolume(slice))
        );
    }
}
