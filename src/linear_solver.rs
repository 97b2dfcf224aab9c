//! Linear Solver Backend
//!
//! Linear objectives and constraints over indexed variables, and the (mixed integer) linear program backend that
//! optimizes them. The only backend is HiGHS; others can be added behind [`LinearSolverBackend`].
//!

use crate::util::*;
use highs::{HighsModelStatus, RowProblem, Sense};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// slack allowed when checking whether a solution violates a constraint
pub const CONSTRAINT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableType {
    Binary,
    /// non-negative integer
    Integer,
    /// non-negative real
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearObjective {
    coefficients: Vec<f64>,
    sense: ObjectiveSense,
}

impl LinearObjective {
    pub fn new(num_variables: usize) -> Self {
        Self {
            coefficients: vec![0.; num_variables],
            sense: ObjectiveSense::Minimize,
        }
    }

    pub fn resize(&mut self, num_variables: usize) {
        self.coefficients.resize(num_variables, 0.);
    }

    pub fn set_coefficient(&mut self, var_index: VarIndex, value: f64) {
        self.coefficients[var_index] = value;
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn set_sense(&mut self, sense: ObjectiveSense) {
        self.sense = sense;
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(values.iter())
            .map(|(coefficient, value)| coefficient * value)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    LessEqual,
    Equal,
    GreaterEqual,
}

/// `Σ c_i x_i ▷ value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    coefficients: BTreeMap<VarIndex, f64>,
    relation: Relation,
    value: f64,
}

impl Default for LinearConstraint {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearConstraint {
    pub fn new() -> Self {
        Self {
            coefficients: BTreeMap::new(),
            relation: Relation::LessEqual,
            value: 0.,
        }
    }

    /// shorthand for a constraint with all coefficients given
    pub fn from_terms(terms: impl IntoIterator<Item = (VarIndex, f64)>, relation: Relation, value: f64) -> Self {
        let mut constraint = Self::new();
        for (var_index, coefficient) in terms {
            constraint.set_coefficient(var_index, coefficient);
        }
        constraint.set_relation(relation);
        constraint.set_value(value);
        constraint
    }

    pub fn set_coefficient(&mut self, var_index: VarIndex, coefficient: f64) {
        self.coefficients.insert(var_index, coefficient);
    }

    pub fn set_relation(&mut self, relation: Relation) {
        self.relation = relation;
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn coefficients(&self) -> &BTreeMap<VarIndex, f64> {
        &self.coefficients
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_violated(&self, values: &[f64]) -> bool {
        let sum: f64 = self
            .coefficients
            .iter()
            .map(|(&var_index, coefficient)| coefficient * values[var_index])
            .sum();
        match self.relation {
            Relation::LessEqual => sum > self.value + CONSTRAINT_TOLERANCE,
            Relation::Equal => (sum - self.value).abs() > CONSTRAINT_TOLERANCE,
            Relation::GreaterEqual => sum < self.value - CONSTRAINT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraints {
    constraints: Vec<LinearConstraint>,
}

impl LinearConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: LinearConstraint) {
        self.constraints.push(constraint);
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LinearConstraint> {
        self.constraints.iter()
    }

    /// whether the values satisfy all constraints
    pub fn is_satisfied(&self, values: &[f64]) -> bool {
        self.constraints.iter().all(|constraint| !constraint.is_violated(values))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSolveResult {
    /// value of every variable, zero if the backend did not return any
    pub values: Vec<f64>,
    /// objective value of `values`
    pub value: f64,
    pub optimal: bool,
    pub message: String,
}

impl LinearSolveResult {
    /// binary variables are read with a threshold of 0.5
    pub fn is_set(&self, var_index: VarIndex) -> bool {
        self.values[var_index] > 0.5
    }
}

pub trait LinearSolverBackend {
    /// declare the variables, dropping objective and constraints
    fn initialize(&mut self, num_variables: usize, variable_type: VariableType);

    fn set_objective(&mut self, objective: &LinearObjective);

    /// replace all constraints
    fn set_constraints(&mut self, constraints: &LinearConstraints);

    /// a non-optimal result is not an error, check [`LinearSolveResult::optimal`]
    fn solve(&mut self) -> LinearSolveResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LinearSolverBackendType {
    #[default]
    Highs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearSolverBackendConfig {
    #[serde(default)]
    pub backend: LinearSolverBackendType,
    /// wall clock limit of a single solve, in seconds
    #[serde(default = "linear_solver_default_configs::time_limit")]
    pub time_limit: Option<f64>,
    /// relative MIP optimality gap, 0 to solve to optimality
    #[serde(default = "linear_solver_default_configs::mip_rel_gap")]
    pub mip_rel_gap: f64,
    /// print the backend output
    #[serde(default = "linear_solver_default_configs::verbose")]
    pub verbose: bool,
}

impl Default for LinearSolverBackendConfig {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap_or_else(|_| unreachable!())
    }
}

pub mod linear_solver_default_configs {
    pub fn time_limit() -> Option<f64> {
        None
    }
    pub fn mip_rel_gap() -> f64 {
        0.
    }
    pub fn verbose() -> bool {
        false
    }
}

pub fn create_linear_solver_backend(config: &LinearSolverBackendConfig) -> Box<dyn LinearSolverBackend> {
    match config.backend {
        LinearSolverBackendType::Highs => Box::new(HighsBackend::new(config.clone())),
    }
}

/// MIP solutions carry integrality slack, snap them to the nearest integer
pub fn round_integral_values(values: &mut [f64], variable_type: VariableType) {
    match variable_type {
        VariableType::Binary => values.iter_mut().for_each(|value| *value = value.round().clamp(0., 1.)),
        VariableType::Integer => values.iter_mut().for_each(|value| *value = value.round().max(0.)),
        VariableType::Continuous => {}
    }
}

#[derive(Debug, Clone)]
pub struct HighsBackend {
    config: LinearSolverBackendConfig,
    variable_type: VariableType,
    objective: LinearObjective,
    constraints: LinearConstraints,
}

impl HighsBackend {
    pub fn new(config: LinearSolverBackendConfig) -> Self {
        Self {
            config,
            variable_type: VariableType::Binary,
            objective: LinearObjective::new(0),
            constraints: LinearConstraints::new(),
        }
    }
}

impl LinearSolverBackend for HighsBackend {
    fn initialize(&mut self, num_variables: usize, variable_type: VariableType) {
        self.variable_type = variable_type;
        self.objective = LinearObjective::new(num_variables);
        self.constraints = LinearConstraints::new();
    }

    fn set_objective(&mut self, objective: &LinearObjective) {
        debug_assert_eq!(objective.coefficients().len(), self.objective.coefficients().len());
        self.objective = objective.clone();
    }

    fn set_constraints(&mut self, constraints: &LinearConstraints) {
        self.constraints = constraints.clone();
    }

    fn solve(&mut self) -> LinearSolveResult {
        let num_variables = self.objective.coefficients().len();
        if num_variables == 0 {
            return LinearSolveResult {
                values: vec![],
                value: 0.,
                optimal: true,
                message: "no variables".to_string(),
            };
        }
        let mut problem = RowProblem::default();
        let columns: Vec<_> = self
            .objective
            .coefficients()
            .iter()
            .map(|&coefficient| match self.variable_type {
                VariableType::Binary => problem.add_integer_column(coefficient, 0.0..=1.0),
                VariableType::Integer => problem.add_integer_column(coefficient, 0.0..),
                VariableType::Continuous => problem.add_column(coefficient, 0.0..),
            })
            .collect();
        for constraint in self.constraints.iter() {
            let row_factors: Vec<_> = constraint
                .coefficients()
                .iter()
                .map(|(&var_index, &coefficient)| (columns[var_index], coefficient))
                .collect();
            let value = constraint.value();
            match constraint.relation() {
                Relation::LessEqual => problem.add_row(..=value, row_factors),
                Relation::Equal => problem.add_row(value..=value, row_factors),
                Relation::GreaterEqual => problem.add_row(value.., row_factors),
            };
        }
        let sense = match self.objective.sense() {
            ObjectiveSense::Minimize => Sense::Minimise,
            ObjectiveSense::Maximize => Sense::Maximise,
        };
        let mut model = problem.optimise(sense);
        model.set_option("output_flag", self.config.verbose);
        model.set_option("mip_rel_gap", self.config.mip_rel_gap);
        if let Some(time_limit) = self.config.time_limit {
            model.set_option("time_limit", time_limit);
        }
        let solved = model.solve();
        let status = solved.status();
        let mut values = solved.get_solution().columns().to_vec();
        if values.len() != num_variables {
            values = vec![0.; num_variables];
        }
        round_integral_values(&mut values, self.variable_type);
        let value = self.objective.evaluate(&values);
        tracing::trace!("HiGHS finished with status {status:?} and value {value}");
        LinearSolveResult {
            values,
            value,
            optimal: status == HighsModelStatus::Optimal,
            message: format!("{status:?}"),
        }
    }
}
