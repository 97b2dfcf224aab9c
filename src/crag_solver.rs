//! CRAG Solver
//!
//! The common interface of all solvers: each one turns the costs of a candidate graph into a consistent selection of
//! candidates and merged adjacency edges, by repeatedly calling a [`LinearSolverBackend`] and adding violated
//! constraints between the calls.
//!

use crate::costs::*;
use crate::crag::*;
use crate::error::*;
use crate::linear_solver::*;
use crate::solution::*;
use crate::solver_assignment::*;
use crate::solver_closed_set::*;
use crate::solver_multi_cut::*;
use crate::util::*;
use crate::volumes::*;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CragSolverStatus {
    /// no more violated constraints, the solution is optimal
    SolutionFound,
    /// the iteration or time limit stopped the cutting-plane loop, the solution may be inconsistent
    MaxIterationsReached,
}

pub trait CragSolver {
    /// objective coefficients, can be called again to re-solve with different costs
    fn set_costs(&mut self, costs: &Costs);
    fn solve(&mut self, solution: &mut CragSolution) -> CragSolverStatus;
    /// objective value of the last backend solution
    fn get_value(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CragSolverParameters {
    /// every root-to-leaf path has exactly one selected candidate instead of at most one
    #[serde(default = "crag_solver_default_configs::force_explanation")]
    pub force_explanation: bool,
    /// maximal number of cutting-plane rounds
    #[serde(default = "crag_solver_default_configs::num_iterations")]
    pub num_iterations: usize,
    /// maximal number of violated constraints added per round, 0 for no limit
    #[serde(default = "crag_solver_default_configs::max_constraints_per_iteration")]
    pub max_constraints_per_iteration: usize,
    /// solve without any constraint
    #[serde(default = "crag_solver_default_configs::no_constraints")]
    pub no_constraints: bool,
    #[serde(default = "crag_solver_default_configs::minimize")]
    pub minimize: bool,
    /// forbid merging all children of a candidate among each other, the candidate itself has to be taken instead
    #[serde(default = "crag_solver_default_configs::force_parent_candidate")]
    pub force_parent_candidate: bool,
    /// add tree-path constraints only once a solution violates them
    #[serde(default = "crag_solver_default_configs::lazy_tree_path_constraints")]
    pub lazy_tree_path_constraints: bool,
    /// let the closed-set solver also separate cycle constraints over leaf edges
    #[serde(default = "crag_solver_default_configs::closed_set_cycle_constraints")]
    pub closed_set_cycle_constraints: bool,
    /// wall clock limit of the whole cutting-plane loop, in seconds
    #[serde(default = "crag_solver_default_configs::time_limit")]
    pub time_limit: Option<f64>,
    #[serde(default = "crag_solver_default_configs::backend")]
    pub backend: LinearSolverBackendConfig,
}

pub mod crag_solver_default_configs {
    use crate::linear_solver::*;

    pub fn force_explanation() -> bool {
        false
    }
    pub fn num_iterations() -> usize {
        100
    }
    pub fn max_constraints_per_iteration() -> usize {
        0 // no limit
    }
    pub fn no_constraints() -> bool {
        false
    }
    pub fn minimize() -> bool {
        true
    }
    pub fn force_parent_candidate() -> bool {
        false
    }
    pub fn lazy_tree_path_constraints() -> bool {
        false
    }
    pub fn closed_set_cycle_constraints() -> bool {
        false
    }
    pub fn time_limit() -> Option<f64> {
        None
    }
    pub fn backend() -> LinearSolverBackendConfig {
        LinearSolverBackendConfig::default()
    }
}

impl Default for CragSolverParameters {
    fn default() -> Self {
        serde_json::from_value(json!({})).unwrap_or_else(|_| unreachable!())
    }
}

impl CragSolverParameters {
    pub fn from_json(config: serde_json::Value) -> CragResult<Self> {
        serde_json::from_value(config).map_err(|error| UsageError::InvalidInput(format!("solver config: {error}")))
    }

    /// the instant at which the cutting-plane loop gives up
    pub fn deadline(&self) -> Option<Instant> {
        self.time_limit
            .map(|time_limit| Instant::now() + Duration::from_secs_f64(time_limit.max(0.)))
    }

    pub fn objective_sense(&self) -> ObjectiveSense {
        if self.minimize {
            ObjectiveSense::Minimize
        } else {
            ObjectiveSense::Maximize
        }
    }

    pub fn tree_path_relation(&self) -> Relation {
        if self.force_explanation {
            Relation::Equal
        } else {
            Relation::LessEqual
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Serialize, Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub enum CragSolverType {
    /// hierarchical multicut with lazy cycle constraints
    MultiCut,
    /// selections closed under taking children and descendant edges
    ClosedSet,
    /// linking slice candidates of a stack of sections, requires volumes
    Assignment,
}

pub fn create_crag_solver(
    solver_type: CragSolverType,
    crag: Arc<Crag>,
    volumes: Option<&CragVolumes>,
    parameters: CragSolverParameters,
) -> CragResult<Box<dyn CragSolver>> {
    Ok(match solver_type {
        CragSolverType::MultiCut => Box::new(MultiCutSolver::new(crag, parameters)),
        CragSolverType::ClosedSet => Box::new(ClosedSetSolver::new(crag, parameters)),
        CragSolverType::Assignment => {
            let volumes = volumes.ok_or_else(|| {
                UsageError::InvalidInput("the assignment solver requires the volumes of the candidates".to_string())
            })?;
            Box::new(AssignmentSolver::new(crag, volumes, parameters)?)
        }
    })
}

/// one binary variable per node followed by one per adjacency edge, both in id order
#[derive(Debug, Clone)]
pub struct CragVariables {
    node_vars: Vec<Option<VarIndex>>,
    edge_vars: Vec<Option<VarIndex>>,
    num_variables: usize,
}

impl CragVariables {
    pub fn new(crag: &Crag) -> Self {
        let mut node_vars = vec![None; crag.node_bound()];
        let mut edge_vars = vec![None; crag.edge_bound()];
        let mut num_variables = 0;
        for node_index in crag.nodes() {
            node_vars[node_index] = Some(num_variables);
            num_variables += 1;
        }
        for edge_index in crag.edges() {
            edge_vars[edge_index] = Some(num_variables);
            num_variables += 1;
        }
        Self {
            node_vars,
            edge_vars,
            num_variables,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn node(&self, node_index: NodeIndex) -> VarIndex {
        self.node_vars[node_index].unwrap_or_else(|| panic!("node {node_index} has no variable"))
    }

    pub fn edge(&self, edge_index: EdgeIndex) -> VarIndex {
        self.edge_vars[edge_index].unwrap_or_else(|| panic!("adjacency edge {edge_index} has no variable"))
    }

    /// write the selection of a backend result into the solution, returning the number of selected nodes and edges
    pub fn read_solution(
        &self,
        crag: &Crag,
        result: &LinearSolveResult,
        solution: &mut CragSolution,
    ) -> (usize, usize) {
        let (mut num_selected, mut num_merged) = (0, 0);
        for node_index in crag.nodes() {
            let selected = result.is_set(self.node(node_index));
            solution.set_node_selected(node_index, selected);
            num_selected += selected as usize;
        }
        for edge_index in crag.edges() {
            let selected = result.is_set(self.edge(edge_index));
            solution.set_edge_selected(edge_index, selected);
            num_merged += selected as usize;
        }
        tracing::trace!("{num_selected} candidates selected, {num_merged} adjacent candidates merged");
        (num_selected, num_merged)
    }
}

/// one constraint per path from `root` down to a leaf: the candidates along the path sum to (at most) one; only paths
/// of at least `min_path_length` nodes are constrained
pub fn collect_tree_path_constraints(
    crag: &Crag,
    root: NodeIndex,
    variables: &CragVariables,
    relation: Relation,
    min_path_length: usize,
) -> Vec<LinearConstraint> {
    let mut constraints = vec![];
    let mut path = vec![];
    collect_tree_path_constraints_recursive(
        crag,
        root,
        variables,
        relation,
        min_path_length,
        &mut path,
        &mut constraints,
    );
    constraints
}

fn collect_tree_path_constraints_recursive(
    crag: &Crag,
    node_index: NodeIndex,
    variables: &CragVariables,
    relation: Relation,
    min_path_length: usize,
    path: &mut Vec<NodeIndex>,
    constraints: &mut Vec<LinearConstraint>,
) {
    path.push(node_index);
    if crag.is_leaf_node(node_index) {
        if path.len() >= min_path_length {
            constraints.push(LinearConstraint::from_terms(
                path.iter().map(|&path_node| (variables.node(path_node), 1.)),
                relation,
                1.,
            ));
        }
    } else {
        for child in crag.children(node_index) {
            collect_tree_path_constraints_recursive(
                crag,
                child,
                variables,
                relation,
                min_path_length,
                path,
                constraints,
            );
        }
    }
    path.pop();
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::example_crags::*;

    #[test]
    fn crag_solver_parameters_defaults() {
        // cargo test crag_solver_parameters_defaults -- --nocapture
        let parameters = CragSolverParameters::default();
        assert!(!parameters.force_explanation);
        assert_eq!(parameters.num_iterations, 100);
        assert_eq!(parameters.max_constraints_per_iteration, 0);
        assert!(!parameters.no_constraints);
        assert!(parameters.minimize);
        assert!(!parameters.closed_set_cycle_constraints);
        assert!(parameters.deadline().is_none());
        let parameters = CragSolverParameters::from_json(json!({"num_iterations": 3, "backend": {"verbose": true}})).unwrap();
        assert_eq!(parameters.num_iterations, 3);
        assert!(parameters.backend.verbose);
        assert!(CragSolverParameters::from_json(json!({"iterations": 3})).is_err());
    }

    #[test]
    fn crag_solver_variables_skip_erased() {
        // cargo test crag_solver_variables_skip_erased -- --nocapture
        let (mut crag, d) = diamond();
        crag.erase_node(d.n1).unwrap();
        let variables = CragVariables::new(&crag);
        // 6 nodes and 5 edges remain
        assert_eq!(variables.num_variables(), 11);
        assert_eq!(variables.node(d.n2), 0);
        assert_eq!(variables.edge(d.b), 6);
    }

    #[test]
    fn crag_solver_tree_paths() {
        // cargo test crag_solver_tree_paths -- --nocapture
        let (crag, d) = diamond();
        let variables = CragVariables::new(&crag);
        let constraints = collect_tree_path_constraints(&crag, d.n7, &variables, Relation::LessEqual, 1);
        assert_eq!(constraints.len(), 4);
        assert_eq!(
            constraints[0],
            LinearConstraint::from_terms([(d.n7, 1.), (d.n5, 1.), (d.n1, 1.)], Relation::LessEqual, 1.)
        );
        let constraints = collect_tree_path_constraints(&crag, d.n1, &variables, Relation::Equal, 2);
        assert!(constraints.is_empty());
    }

    #[test]
    fn crag_solver_factory() {
        // cargo test crag_solver_factory -- --nocapture
        let (crag, _) = diamond();
        let crag = Arc::new(crag);
        for solver_type in [CragSolverType::MultiCut, CragSolverType::ClosedSet] {
            assert!(create_crag_solver(solver_type, crag.clone(), None, CragSolverParameters::default()).is_ok());
        }
        assert!(matches!(
            create_crag_solver(CragSolverType::Assignment, crag.clone(), None, CragSolverParameters::default()),
            Err(UsageError::InvalidInput(_))
        ));
        let volumes = CragVolumes::new(crag.clone());
        assert!(matches!(
            create_crag_solver(CragSolverType::Assignment, crag, Some(&volumes), CragSolverParameters::default()),
            Err(UsageError::IncompatibleNodeType { .. })
        ));
    }
}
