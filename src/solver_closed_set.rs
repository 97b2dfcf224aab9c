//! Closed-Set Solver
//!
//! Selections are closed downwards in the subset graph: a selected candidate implies its children, the adjacency
//! edges between the descendants of any two of its children, and every edge selected implies its end points and all
//! adjacency edges between their descendants.
//!

use crate::costs::*;
use crate::crag::*;
use crate::crag_solver::*;
use crate::cut_graph::*;
use crate::linear_solver::*;
use crate::solution::*;
use itertools::Itertools;
use std::sync::Arc;
use std::time::Instant;

pub struct ClosedSetSolver {
    crag: Arc<Crag>,
    parameters: CragSolverParameters,
    variables: CragVariables,
    backend: Box<dyn LinearSolverBackend>,
    objective: LinearObjective,
    constraints: LinearConstraints,
    value: f64,
}

impl ClosedSetSolver {
    pub fn new(crag: Arc<Crag>, parameters: CragSolverParameters) -> Self {
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
        if !solver.parameters.no_constraints {
            solver.set_initial_constraints();
        }
        solver
    }

    /// `x_p - x_c <= 0` for an implication `p => c`
    fn add_implication(&mut self, premise: usize, conclusion: usize) {
        self.constraints.add(LinearConstraint::from_terms(
            [(premise, 1.), (conclusion, -1.)],
            Relation::LessEqual,
            0.,
        ));
    }

    fn set_initial_constraints(&mut self) {
        let crag = self.crag.clone();
        let mut num_node_node_constraints = 0;
        for node_index in crag.nodes() {
            for child in crag.children(node_index) {
                self.add_implication(self.variables.node(node_index), self.variables.node(child));
                num_node_node_constraints += 1;
            }
        }
        tracing::debug!("added {num_node_node_constraints} node-node constraints");
        let mut num_edge_node_constraints = 0;
        for edge_index in crag.edges() {
            for node_index in [crag.u(edge_index), crag.v(edge_index)] {
                self.add_implication(self.variables.edge(edge_index), self.variables.node(node_index));
                num_edge_node_constraints += 1;
            }
        }
        tracing::debug!("added {num_edge_node_constraints} edge-node constraints");
        let mut num_node_edge_constraints = 0;
        for node_index in crag.nodes() {
            for (&a, &b) in crag.in_arcs(node_index).iter().tuple_combinations() {
                for edge_index in crag.descendant_edges_between(crag.source(a), crag.source(b)) {
                    self.add_implication(self.variables.node(node_index), self.variables.edge(edge_index));
                    num_node_edge_constraints += 1;
                }
            }
        }
        tracing::debug!("added {num_node_edge_constraints} node-edge constraints");
        let mut num_edge_edge_constraints = 0;
        for edge_index in crag.edges() {
            for descendant_edge in crag.descendant_edges(edge_index) {
                self.add_implication(self.variables.edge(edge_index), self.variables.edge(descendant_edge));
                num_edge_edge_constraints += 1;
            }
        }
        tracing::debug!("added {num_edge_edge_constraints} edge-edge constraints");
    }

    fn find_min_closed_set(&mut self, solution: &mut CragSolution) {
        self.backend.set_constraints(&self.constraints);
        let result = self.backend.solve();
        if !result.optimal {
            tracing::error!("backend did not find optimal solution: {}", result.message);
        } else {
            tracing::trace!("backend returned solution with message: {}", result.message);
        }
        self.variables.read_solution(&self.crag, &result, solution);
        self.value = result.value;
    }

    /// the static constraints are the whole model unless `closed_set_cycle_constraints` asks for cycle constraints
    /// between leaf nodes
    fn find_violated_constraints(&mut self, solution: &CragSolution) -> bool {
        if self.parameters.no_constraints || !self.parameters.closed_set_cycle_constraints {
            return false;
        }
        let crag = self.crag.clone();
        let selected_leaf_edges: Vec<_> = solution
            .selected_edges()
            .filter(|&edge_index| crag.is_leaf_edge(edge_index))
            .collect();
        let cut_graph = CutGraph::new(&crag, selected_leaf_edges);
        let variables = &self.variables;
        let cycle_constraints = cut_graph.violated_cycle_constraints(
            &crag,
            crag.edges()
                .filter(|&edge_index| crag.is_leaf_edge(edge_index) && !solution.edge_selected(edge_index)),
            |node_index| solution.node_selected(node_index),
            |edge_index| variables.edge(edge_index),
            self.parameters.max_constraints_per_iteration,
        );
        let num_cycle_constraints = cycle_constraints.len();
        for constraint in cycle_constraints {
            self.constraints.add(constraint);
        }
        tracing::debug!("added {num_cycle_constraints} cycle constraints");
        num_cycle_constraints > 0
    }
}

impl CragSolver for ClosedSetSolver {
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
            self.find_min_closed_set(solution);
            if !self.find_violated_constraints(solution) {
                tracing::info!("optimal solution with value {} found", self.value);
                let (mut num_selected, mut total_level) = (0, 0);
                for node_index in solution.selected_nodes() {
                    num_selected += 1;
                    total_level += self.crag.level(node_index);
                }
                tracing::info!(
                    "{num_selected} candidates selected, {} adjacent candidates merged",
                    solution.selected_edges().count()
                );
                if num_selected > 0 {
                    tracing::info!(
                        "average depth of selected candidates is {}",
                        total_level as f64 / num_selected as f64
                    );
                }
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
    use crate::util::{EdgeType, NodeType};
    use test_case::test_case;

    fn solve_closed_set(crag: Arc<Crag>, costs: &Costs, parameters: CragSolverParameters) -> (f64, CragSolution) {
        let mut solver = ClosedSetSolver::new(crag.clone(), parameters);
        solver.set_costs(costs);
        let mut solution = CragSolution::new(crag);
        assert_eq!(solver.solve(&mut solution), CragSolverStatus::SolutionFound);
        (solver.get_value(), solution)
    }

    #[test_case(false; "static constraints")]
    #[test_case(true; "with cycle constraints")]
    fn closed_set_diamond_select_root(closed_set_cycle_constraints: bool) {
        // cargo test closed_set_diamond_select_root -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n7] = -1.;
        let parameters = CragSolverParameters {
            closed_set_cycle_constraints,
            ..Default::default()
        };
        let (value, solution) = solve_closed_set(crag.clone(), &costs, parameters);
        assert_eq!(value, -1.);
        for node_index in crag.nodes() {
            assert!(solution.node_selected(node_index), "node {node_index} not selected");
        }
        for edge_index in crag.edges() {
            assert!(solution.edge_selected(edge_index), "edge {edge_index} not selected");
        }
        assert_eq!(solution.num_labels(), 1);
    }

    #[test_case(false; "static constraints")]
    #[test_case(true; "with cycle constraints")]
    fn closed_set_diamond_merge_children(closed_set_cycle_constraints: bool) {
        // cargo test closed_set_diamond_merge_children -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        costs.node[d.n7] = 1.;
        costs.edge[d.d] = -1.;
        let parameters = CragSolverParameters {
            closed_set_cycle_constraints,
            ..Default::default()
        };
        let (value, solution) = solve_closed_set(crag.clone(), &costs, parameters);
        assert_eq!(value, -1.);
        for node_index in crag.nodes() {
            assert_eq!(solution.node_selected(node_index), node_index != d.n7);
        }
        for edge_index in crag.edges() {
            assert!(solution.edge_selected(edge_index), "edge {edge_index} not selected");
        }
    }

    #[test]
    fn closed_set_implications() {
        // cargo test closed_set_implications -- --nocapture
        let (crag, d) = diamond();
        let crag = Arc::new(crag);
        let mut costs = Costs::new(&crag);
        // merging along `e` forces `b`, which is too expensive
        costs.node[d.n3] = -1.;
        costs.node[d.n5] = -1.;
        costs.edge[d.e] = -1.;
        costs.edge[d.b] = 2.;
        let (value, solution) = solve_closed_set(crag, &costs, CragSolverParameters::default());
        assert_eq!(value, -2.);
        assert!(solution.node_selected(d.n5) && solution.node_selected(d.n1) && solution.node_selected(d.n2));
        assert!(solution.node_selected(d.n3));
        assert!(solution.edge_selected(d.a));
        assert!(!solution.edge_selected(d.e) && !solution.edge_selected(d.b));
    }

    #[test]
    fn closed_set_leaf_cycle_constraints() {
        // cargo test closed_set_leaf_cycle_constraints -- --nocapture
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
        let (value, _) = solve_closed_set(crag.clone(), &costs, CragSolverParameters::default());
        assert_eq!(value, -2.);
        let parameters = CragSolverParameters {
            closed_set_cycle_constraints: true,
            ..Default::default()
        };
        let (value, solution) = solve_closed_set(crag.clone(), &costs, parameters);
        assert_eq!(value, -1.);
        crate::solver_multi_cut::tests::assert_multi_cut_consistent(&crag, &solution);
    }

    #[test]
    fn closed_set_time_limit_keeps_first_round() {
        // cargo test closed_set_time_limit_keeps_first_round -- --nocapture
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
        let parameters = CragSolverParameters {
            closed_set_cycle_constraints: true,
            time_limit: Some(0.),
            ..Default::default()
        };
        let mut solver = ClosedSetSolver::new(crag.clone(), parameters);
        solver.set_costs(&costs);
        let mut solution = CragSolution::new(crag);
        // the first round violates a cycle constraint, the deadline stops before the second one
        assert_eq!(solver.solve(&mut solution), CragSolverStatus::MaxIterationsReached);
        assert_eq!(solver.get_value(), -2.);
        assert_eq!(solution.selected_edges().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(solution.selected_nodes().count(), 3);
    }
}
