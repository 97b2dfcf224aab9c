//! Multi-Cut Solver
//!
//! Selects at most one candidate along every root-to-leaf path of the subset graph and merges selected adjacent
//! candidates, such that the merged edges form a consistent multicut. Cycle constraints are too many to be added
//! upfront; they are separated in a cutting-plane loop on the solution of the previous round.
//!

use crate::costs::*;
use crate::crag::*;
use crate::crag_solver::*;
use crate::cut_graph::*;
use crate::linear_solver::*;
use crate::solution::*;
use crate::util::*;
use std::sync::Arc;
use std::time::Instant;

pub struct MultiCutSolver {
    crag: Arc<Crag>,
    parameters: CragSolverParameters,
    variables: CragVariables,
    backend: Box<dyn LinearSolverBackend>,
    objective: LinearObjective,
    constraints: LinearConstraints,
    /// tree-path constraints not yet given to the backend, with `lazy_tree_path_constraints`
    pending_tree_path_constraints: Vec<LinearConstraint>,
    /// values of the last backend solution
    values: Vec<f64>,
    value: f64,
    /// connected component of every node after the last round, propagated from selected roots to their descendants
    labels: Vec<Option<usize>>,
}

impl MultiCutSolver {
    pub fn new(crag: Arc<Crag>, parameters: CragSolverParameters) -> Self {
        let variables = CragVariables::new(&crag);
        let mut backend = create_linear_solver_backend(&parameters.backend);
        backend.initialize(variables.num_variables(), VariableType::Binary);
        let mut objective = LinearObjective::new(variables.num_variables());
        objective.set_sense(parameters.objective_sense());
        let mut solver = Self {
            labels: vec![None; crag.node_bound()],
            crag,
            parameters,
            variables,
            backend,
            objective,
            constraints: LinearConstraints::new(),
            pending_tree_path_constraints: vec![],
            values: vec![],
            value: 0.,
        };
        if !solver.parameters.no_constraints {
            solver.set_initial_constraints();
        }
        solver
    }

    /// the static constraints: tree-path, rejection and optionally force-parent
    fn set_initial_constraints(&mut self) {
        let crag = self.crag.clone();
        // from all nodes along a path in the subset graph, at most one can be selected
        let mut tree_path_constraints = vec![];
        for node_index in crag.nodes() {
            if crag.is_root_node(node_index) {
                tree_path_constraints.extend(collect_tree_path_constraints(
                    &crag,
                    node_index,
                    &self.variables,
                    self.parameters.tree_path_relation(),
                    1,
                ));
            }
        }
        if self.parameters.lazy_tree_path_constraints {
            tracing::debug!("deferred {} tree-path constraints", tree_path_constraints.len());
            self.pending_tree_path_constraints = tree_path_constraints;
        } else {
            tracing::debug!("added {} tree-path constraints", tree_path_constraints.len());
            for constraint in tree_path_constraints {
                self.constraints.add(constraint);
            }
        }
        // none of the adjacency edges of a rejected node can be selected
        let mut num_rejection_constraints = 0;
        for node_index in crag.nodes() {
            let adjacent_edges = crag.adj_edges(node_index);
            if adjacent_edges.is_empty() {
                continue;
            }
            let mut constraint = LinearConstraint::new();
            for &edge_index in adjacent_edges {
                constraint.set_coefficient(self.variables.edge(edge_index), 1.);
            }
            constraint.set_coefficient(self.variables.node(node_index), -(adjacent_edges.len() as f64));
            constraint.set_relation(Relation::LessEqual);
            constraint.set_value(0.);
            self.constraints.add(constraint);
            num_rejection_constraints += 1;
        }
        tracing::debug!("added {num_rejection_constraints} rejection constraints");
        if self.parameters.force_parent_candidate {
            self.set_force_parent_constraints();
        }
    }

    /// not all adjacency edges among the children of a node may be merged at the same time, take the parent instead
    fn set_force_parent_constraints(&mut self) {
        let crag = self.crag.clone();
        let mut num_force_parent_constraints = 0;
        for node_index in crag.nodes() {
            let mut child_edges = vec![];
            for child in crag.children(node_index) {
                for &edge_index in crag.adj_edges(child) {
                    let neighbor = crag.opposite(child, edge_index);
                    // unique pairs of siblings only
                    if neighbor < child || crag.is_root_node(neighbor) {
                        continue;
                    }
                    if crag.parent(neighbor) == Some(node_index) {
                        child_edges.push(edge_index);
                    }
                }
            }
            if child_edges.is_empty() {
                continue;
            }
            let mut constraint = LinearConstraint::new();
            for &edge_index in child_edges.iter() {
                constraint.set_coefficient(self.variables.edge(edge_index), 1.);
            }
            constraint.set_relation(Relation::LessEqual);
            constraint.set_value(child_edges.len() as f64 - 1.);
            self.constraints.add(constraint);
            num_force_parent_constraints += 1;
        }
        tracing::debug!("added {num_force_parent_constraints} force parent constraints");
    }

    /// solve with the current constraints and read the selection
    fn find_cut(&mut self, solution: &mut CragSolution) {
        // re-set constraints to inform the backend about the new ones
        self.backend.set_constraints(&self.constraints);
        let result = self.backend.solve();
        if !result.optimal {
            tracing::error!("backend did not find optimal solution: {}", result.message);
        }
        self.variables.read_solution(&self.crag, &result, solution);
        self.values = result.values;
        self.value = result.value;
    }

    /// add violated constraints, returning whether any was found
    fn find_violated_constraints(&mut self, solution: &CragSolution) -> bool {
        let crag = self.crag.clone();
        let cut_graph = CutGraph::new(&crag, solution.selected_edges());
        self.update_labels(&cut_graph, solution);
        if self.parameters.no_constraints {
            return false;
        }
        let mut num_tree_path_constraints = 0;
        if !self.pending_tree_path_constraints.is_empty() {
            let values = &self.values;
            let (violated, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_tree_path_constraints)
                .into_iter()
                .partition(|constraint| constraint.is_violated(values));
            self.pending_tree_path_constraints = pending;
            num_tree_path_constraints = violated.len();
            for constraint in violated {
                self.constraints.add(constraint);
            }
            tracing::debug!("added {num_tree_path_constraints} tree-path constraints");
        }
        let variables = &self.variables;
        let cycle_constraints = cut_graph.violated_cycle_constraints(
            &crag,
            crag.edges().filter(|&edge_index| !solution.edge_selected(edge_index)),
            |node_index| solution.node_selected(node_index),
            |edge_index| variables.edge(edge_index),
            self.parameters.max_constraints_per_iteration,
        );
        let num_cycle_constraints = cycle_constraints.len();
        for constraint in cycle_constraints {
            self.constraints.add(constraint);
        }
        tracing::debug!("added {num_cycle_constraints} cycle constraints");
        num_cycle_constraints + num_tree_path_constraints > 0
    }

    fn update_labels(&mut self, cut_graph: &CutGraph, solution: &CragSolution) {
        self.labels = vec![None; self.crag.node_bound()];
        for node_index in self.crag.nodes() {
            if solution.node_selected(node_index) {
                self.labels[node_index] = Some(cut_graph.component(node_index));
            }
        }
        let crag = self.crag.clone();
        for node_index in crag.nodes() {
            if crag.is_root_node(node_index) {
                self.propagate_label(&crag, node_index, None);
            }
        }
    }

    fn propagate_label(&mut self, crag: &Crag, node_index: NodeIndex, inherited: Option<usize>) {
        let label = match inherited {
            Some(label) => {
                self.labels[node_index] = Some(label);
                Some(label)
            }
            None => self.labels[node_index],
        };
        for child in crag.children(node_index) {
            self.propagate_label(crag, child, label);
        }
    }

    /// the connected component of every node id in the last solution, shared by all descendants of a selected node;
    /// `None` for nodes that are neither selected nor below a selected node
    pub fn component_labels(&self) -> &[Option<usize>] {
        &self.labels
    }
}

impl CragSolver for MultiCutSolver {
    fn set_costs(&mut self, costs: &Costs) {
        for node_index in self.crag.nodes() {
            self.objective
                .set_coefficient(self.variables.node(node_index), costs.node[node_index]);
        }
        for edge_index in self.crag.edges() {
            self.objective
                .set_coefficient(self.variables.edge(edge_index), costs.edge[edge_index]);
        }
    }

    fn solve(&mut self, solution: &mut CragSolution) -> CragSolverStatus {
        debug_assert!(Arc::ptr_eq(solution.crag(), &self.crag), "solution belongs to another graph");
        self.backend.set_objective(&self.objective);
        let deadline = self.parameters.deadline();
        for iteration in 0..self.parameters.num_iterations {
            tracing::debug!("------------------------ iteration {iteration}");
            self.find_cut(solution);
            if !self.find_violated_constraints(solution) {
                tracing::info!("optimal solution with value {} found", self.value);
                tracing::info!(
                    "{} candidates selected, {} adjacent candidates merged",
                    solution.selected_nodes().count(),
                    solution.selected_edges().count()
                );
                return CragSolverStatus::SolutionFound;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::info!("time limit reached after {} iterations", iteration + 1);
                return CragSolverStatus::MaxIterationsReached;
            }
        }
        tracing::info!("maximum number of iterations reached");
        CragSolverStatus::MaxIterationsReached
    }

    fn get_value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::example_crags::*;
    use test_case::test_case;

    fn solve_multi_cut(
        crag: Arc<Crag>,
        costs: &Costs,
        parameters: CragSolverParameters,
    ) -> (MultiCutSolver, CragSolution, CragSolverStatus) {
        let mut solver = MultiCutSolver::new(crag.clone(), parameters);
        solver.set_costs(costs);
        let mut solution = CragSolution::new(crag);
        let status = solver.solve(&mut solution);
        (solver, solution, status)
    }

    #[test]
    fn multi_cut_diamond_select_root() {
        // cargo test multi_cut_diamond_select_root -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n7] = -1.;
        let (solver, solution, status) = solve_multi_cut(crag.clone(), &costs, CragSolverParameters::default());
        assert_eq!(status, CragSolverStatus::SolutionFound);
        assert_eq!(solver.get_value(), -1.);
        assert_eq!(solution.selected_nodes().collect::<Vec<_>>(), vec![d.n7]);
        assert_eq!(solution.selected_edges().count(), 0);
        // the label of the root is propagated to all its descendants
        let labels = solver.component_labels();
        assert!(labels[d.n7].is_some());
        for node_index in crag.nodes() {
            assert_eq!(labels[node_index], labels[d.n7]);
        }
    }

    #[test]
    fn multi_cut_diamond_merge_children() {
        // cargo test multi_cut_diamond_merge_children -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n7] = 1.;
        costs.edge[d.d] = -1.;
        let (solver, solution, status) = solve_multi_cut(crag, &costs, CragSolverParameters::default());
        assert_eq!(status, CragSolverStatus::SolutionFound);
        assert_eq!(solver.get_value(), -1.);
        assert_eq!(solution.selected_nodes().collect::<Vec<_>>(), vec![d.n5, d.n6]);
        assert_eq!(solution.selected_edges().collect::<Vec<_>>(), vec![d.d]);
        assert_eq!(solution.label(d.n5), solution.label(d.n6));
    }

    #[test]
    fn multi_cut_triangle_cycle() {
        // cargo test multi_cut_triangle_cycle -- --nocapture
        let mut crag = Crag::new();
        for _ in 0..3 {
            crag.add_node(NodeType::VolumeCandidate);
        }
        for (u, v) in [(0, 1), (1, 2), (0, 2)] {
            crag.add_adjacency_edge(u, v, EdgeType::Adjacency).unwrap();
        }
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.edge = vec![-1., -1., 5.];
        let (solver, solution, status) = solve_multi_cut(crag.clone(), &costs, CragSolverParameters::default());
        assert_eq!(status, CragSolverStatus::SolutionFound);
        assert_eq!(solver.get_value(), -1.);
        assert_eq!(solution.selected_edges().count(), 1);
        assert_multi_cut_consistent(&crag, &solution);
        // without cycle constraints the inconsistent cut is returned
        let parameters = CragSolverParameters {
            no_constraints: true,
            ..Default::default()
        };
        let (solver, solution, status) = solve_multi_cut(crag, &costs, parameters);
        assert_eq!(status, CragSolverStatus::SolutionFound);
        assert_eq!(solver.get_value(), -2.);
        assert_eq!(solution.selected_edges().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn multi_cut_iteration_limit() {
        // cargo test multi_cut_iteration_limit -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n7] = -1.;
        let parameters = CragSolverParameters {
            num_iterations: 0,
            ..Default::default()
        };
        let (_, solution, status) = solve_multi_cut(crag.clone(), &costs, parameters);
        assert_eq!(status, CragSolverStatus::MaxIterationsReached);
        assert_eq!(solution.selected_nodes().count(), 0);
    }

    #[test]
    fn multi_cut_time_limit_still_solves() {
        // cargo test multi_cut_time_limit_still_solves -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n7] = -1.;
        let parameters = CragSolverParameters {
            time_limit: Some(0.),
            ..Default::default()
        };
        let (solver, solution, status) = solve_multi_cut(crag, &costs, parameters);
        // the first round needs no cycle constraint, so the deadline is never consulted
        assert_eq!(status, CragSolverStatus::SolutionFound);
        assert_eq!(solver.get_value(), -1.);
        assert_eq!(solution.selected_nodes().collect::<Vec<_>>(), vec![d.n7]);
    }

    #[test]
    fn multi_cut_time_limit_keeps_first_round() {
        // cargo test multi_cut_time_limit_keeps_first_round -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n7] = 1.;
        costs.edge[d.a] = -1.;
        costs.edge[d.b] = -1.;
        costs.edge[d.f] = 1.;
        costs.edge[d.e] = -1.;
        let parameters = CragSolverParameters {
            time_limit: Some(0.),
            ..Default::default()
        };
        let (solver, solution, status) = solve_multi_cut(crag, &costs, parameters);
        // whether or not a second round was needed, the backend filled the solution
        assert!(solution.selected_nodes().count() > 0);
        assert!(solver.get_value() < 0.);
        if status == CragSolverStatus::SolutionFound {
            assert_multi_cut_consistent(solution.crag(), &solution);
        }
    }

    #[test]
    fn multi_cut_force_parent_candidate() {
        // cargo test multi_cut_force_parent_candidate -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n5] = -0.5;
        costs.edge[d.a] = -1.;
        let (solver, solution, _) = solve_multi_cut(crag.clone(), &costs, CragSolverParameters::default());
        assert_eq!(solver.get_value(), -1.);
        assert!(solution.edge_selected(d.a));
        let parameters = CragSolverParameters {
            force_parent_candidate: true,
            ..Default::default()
        };
        let (solver, solution, status) = solve_multi_cut(crag, &costs, parameters);
        assert_eq!(status, CragSolverStatus::SolutionFound);
        assert_eq!(solver.get_value(), -0.5);
        assert!(solution.node_selected(d.n5));
        assert!(!solution.edge_selected(d.a));
    }

    /// every merged edge joins selected nodes, and no cut edge lies inside a connected component
    pub fn assert_multi_cut_consistent(crag: &Crag, solution: &CragSolution) {
        for edge_index in crag.edges() {
            let (u, v) = (crag.u(edge_index), crag.v(edge_index));
            if solution.edge_selected(edge_index) {
                assert!(solution.node_selected(u) && solution.node_selected(v));
            } else if solution.node_selected(u) && solution.node_selected(v) {
                assert_ne!(solution.label(u), solution.label(v), "edge {edge_index} is cut inside a component");
            }
        }
    }

    /// every root-to-leaf path contains at most one (or exactly one) selected node
    pub fn assert_tree_paths(crag: &Crag, solution: &CragSolution, force_explanation: bool) {
        let variables = CragVariables::new(crag);
        let values: Vec<f64> = crag
            .nodes()
            .map(|node_index| solution.node_selected(node_index) as usize as f64)
            .chain(crag.edges().map(|edge_index| solution.edge_selected(edge_index) as usize as f64))
            .collect();
        let relation = if force_explanation {
            Relation::Equal
        } else {
            Relation::LessEqual
        };
        for root in crag.nodes().filter(|&node_index| crag.is_root_node(node_index)) {
            for constraint in collect_tree_path_constraints(crag, root, &variables, relation, 1) {
                assert!(!constraint.is_violated(&values), "violated tree path {constraint:?}");
            }
        }
    }

    #[test_case(0, false, false; "seed 0")]
    #[test_case(1, false, false; "seed 1")]
    #[test_case(2, true, false; "seed 2 forced explanation")]
    #[test_case(3, false, true; "seed 3 lazy tree paths")]
    #[test_case(4, true, true; "seed 4 forced explanation lazy tree paths")]
    fn multi_cut_random_hierarchy(seed: u64, force_explanation: bool, lazy_tree_path_constraints: bool) {
        // cargo test multi_cut_random_hierarchy -- --nocapture
        let (crag, costs) = random_hierarchy(4, 4, 10, seed);
        let crag = Arc::new(crag);
        let parameters = CragSolverParameters {
            force_explanation,
            lazy_tree_path_constraints,
            num_iterations: 1000,
            ..Default::default()
        };
        let (solver, solution, status) = solve_multi_cut(crag.clone(), &costs, parameters);
        assert_eq!(status, CragSolverStatus::SolutionFound);
        assert_tree_paths(&crag, &solution, force_explanation);
        assert_multi_cut_consistent(&crag, &solution);
        if lazy_tree_path_constraints {
            // lazily added constraints reach the same optimum
            let parameters = CragSolverParameters {
                force_explanation,
                num_iterations: 1000,
                ..Default::default()
            };
            let (eager_solver, _, _) = solve_multi_cut(crag, &costs, parameters);
            assert!((solver.get_value() - eager_solver.get_value()).abs() < 1e-6);
        }
    }
}
