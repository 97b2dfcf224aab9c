use crate::costs::*;
use crate::crag::*;
use crate::crag_solver::*;
use crate::error::*;
use crate::example_crags::*;
use crate::logging::*;
use crate::snapshot::*;
use crate::solution::*;
use crate::util::*;
use crate::volumes::*;
use clap::builder::{StringValueParser, TypedValueParser, ValueParser};
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Parser, Subcommand, ValueEnum};
use more_asserts::assert_le;
use pbr::ProgressBar;
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, RngCore, SeedableRng};
use serde::Serialize;
use serde_variant::to_variant_name;
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const TEST_EACH_ROUNDS: usize = 20;

#[derive(Parser, Clone)]
#[clap(author = clap::crate_authors!(", "))]
#[clap(version = env!("CARGO_PKG_VERSION"))]
#[clap(about = "Solvers for Candidate Region Adjacency Graphs in Hierarchical Volume Segmentation")]
#[clap(color = clap::ColorChoice::Auto)]
#[clap(propagate_version = true)]
#[clap(subcommand_required = true)]
#[clap(arg_required_else_help = true)]
pub struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// solve a candidate graph described in a JSON file
    Solve(SolveParameters),
    /// benchmark the speed (and also correctness if enabled) on random graphs
    Benchmark(BenchmarkParameters),
    /// built-in tests
    Test {
        #[clap(subcommand)]
        command: TestCommands,
    },
}

#[derive(Parser, Clone)]
pub struct SolveParameters {
    /// JSON file with the nodes, edges, arcs and costs of the graph, see `CragInitializer`
    #[clap(value_parser)]
    input: String,
    /// the solver to use
    #[clap(short = 's', long, value_enum, default_value_t = CragSolverType::MultiCut)]
    solver_type: CragSolverType,
    /// the configuration of the solver
    #[clap(long, default_value_t = json!({}), value_parser = ValueParser::new(SerdeJsonParser))]
    solver_config: serde_json::Value,
    /// write the solution snapshot to this file instead of stdout
    #[clap(short = 'o', long)]
    output: Option<String>,
    /// use abbreviated keys in the snapshot
    #[clap(long, action)]
    abbrev: bool,
}

#[derive(Parser, Clone)]
pub struct BenchmarkParameters {
    /// width of the grid of leaf candidates; slices per section for the assignment solver
    #[clap(value_parser)]
    width: usize,
    /// height of the grid of leaf candidates; number of sections for the assignment solver
    #[clap(value_parser)]
    height: usize,
    /// number of random merges on top of the leaves, defaults to half the number of leaves
    #[clap(short = 'm', long)]
    num_merges: Option<usize>,
    /// the solver to benchmark
    #[clap(short = 's', long, value_enum, default_value_t = CragSolverType::MultiCut)]
    solver_type: CragSolverType,
    /// the configuration of the solver
    #[clap(long, default_value_t = json!({}), value_parser = ValueParser::new(SerdeJsonParser))]
    solver_config: serde_json::Value,
    /// the method to verify the correctness of the solution
    #[clap(long, value_enum, default_value_t = Verifier::Invariants)]
    verifier: Verifier,
    /// the number of iterations to run
    #[clap(short = 'r', long, default_value_t = 100)]
    total_rounds: usize,
    /// message on the progress bar
    #[clap(long, default_value_t = format!(""))]
    pb_message: String,
    /// use deterministic seed for debugging purpose (round number is the seed)
    #[clap(long, action)]
    use_deterministic_seed: bool,
    /// apply a deterministic seed for debugging purposes
    #[clap(long, action)]
    apply_deterministic_seed: Option<u64>,
    /// only execute a single seed for debugging purposes
    #[clap(long, action)]
    single_seed: Option<u64>,
    /// print the costs of every round
    #[clap(long, action)]
    print_costs: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum TestCommands {
    /// test common cases
    Common {
        /// print out the command to test
        #[clap(short = 'c', long, action)]
        print_command: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Serialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub enum Verifier {
    /// disable verifier
    None,
    /// check the constraints the solver guarantees on an optimal solution
    Invariants,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error("cannot write {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Clone)]
struct SerdeJsonParser;
impl TypedValueParser for SerdeJsonParser {
    type Value = serde_json::Value;
    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let inner = StringValueParser::new();
        let val = inner.parse_ref(cmd, arg, value)?;
        match serde_json::from_str::<serde_json::Value>(&val) {
            Ok(vector) => Ok(vector),
            Err(error) => {
                let mut err = clap::Error::new(ErrorKind::ValueValidation).with_cmd(cmd);
                if let Some(arg) = arg {
                    err.insert(ContextKind::InvalidArg, ContextValue::String(arg.to_string()));
                }
                err.insert(
                    ContextKind::InvalidValue,
                    ContextValue::String(format!("should be like {{\"a\":1}}, parse error: {error}")),
                );
                Err(err)
            }
        }
    }
}

impl Cli {
    pub fn run(self) -> CliResult<()> {
        match self.command {
            Commands::Solve(parameters) => parameters.run(),
            Commands::Benchmark(parameters) => parameters.run(),
            Commands::Test { command } => match command {
                TestCommands::Common { print_command } => {
                    for solver_type in [CragSolverType::ClosedSet, CragSolverType::MultiCut] {
                        println!("[Common Test] diamond graph with {solver_type:?} solver");
                        diamond_regression(solver_type)?;
                    }
                    let configs = [
                        (CragSolverType::MultiCut, json!({})),
                        (CragSolverType::MultiCut, json!({ "force_explanation": true })),
                        (CragSolverType::MultiCut, json!({ "lazy_tree_path_constraints": true })),
                        (CragSolverType::MultiCut, json!({ "force_parent_candidate": true })),
                        (CragSolverType::ClosedSet, json!({})),
                        (CragSolverType::ClosedSet, json!({ "closed_set_cycle_constraints": true })),
                        (CragSolverType::Assignment, json!({})),
                    ];
                    for (solver_type, solver_config) in configs {
                        let solver_name = to_variant_name(&solver_type).unwrap_or("unknown");
                        let (width, height) = match solver_type {
                            CragSolverType::Assignment => (3, 4),
                            _ => (4, 4),
                        };
                        let command = [
                            format!(""),
                            format!("benchmark"),
                            format!("{width}"),
                            format!("{height}"),
                            format!("--solver-type"),
                            solver_name.to_string(),
                            format!("--solver-config"),
                            serde_json::to_string(&solver_config)?,
                            format!("--total-rounds"),
                            format!("{TEST_EACH_ROUNDS}"),
                            format!("--use-deterministic-seed"),
                            format!("--pb-message"),
                            format!("{solver_name} {solver_config}"),
                        ];
                        execute_in_cli(command.iter(), print_command)?;
                    }
                    Ok(())
                }
            },
        }
    }
}

pub fn execute_in_cli<'a>(iter: impl Iterator<Item = &'a String> + Clone, print_command: bool) -> CliResult<()> {
    if print_command {
        print!("[command]");
        for word in iter.clone() {
            if word.contains(char::is_whitespace) {
                print!("'{word}' ")
            } else {
                print!("{word} ")
            }
        }
        println!();
    }
    Cli::parse_from(iter).run()
}

impl SolveParameters {
    fn run(self) -> CliResult<()> {
        let initializer = CragInitializer::from_file(&self.input)?;
        let (crag, costs, volumes) = initializer.build()?;
        tracing::info!(
            "read {} nodes, {} edges and {} arcs from {}",
            crag.num_nodes(),
            crag.num_edges(),
            crag.num_arcs(),
            self.input
        );
        let parameters = CragSolverParameters::from_json(self.solver_config)?;
        let volumes = (!initializer.leaf_boxes.is_empty()).then_some(&volumes);
        let mut solver = create_crag_solver(self.solver_type, crag.clone(), volumes, parameters)?;
        solver.set_costs(&costs);
        let mut solution = CragSolution::new(crag.clone());
        let begin = Instant::now();
        let status = solver.solve(&mut solution);
        tracing::info!("solved in {:?} with status {status:?}", begin.elapsed());
        let mut snapshot = snapshot_combined(&[crag.as_ref(), &costs, &solution], self.abbrev);
        snapshot_combine_values(
            &mut snapshot,
            json!({
                "status": status,
                "value": solver.get_value(),
            }),
        );
        match &self.output {
            Some(path) => {
                let write = || -> std::io::Result<()> {
                    let mut writer = BufWriter::new(File::create(path)?);
                    serde_json::to_writer(&mut writer, &snapshot)?;
                    writer.flush()
                };
                write().map_err(|source| CliError::Output {
                    path: path.clone(),
                    source,
                })?;
            }
            None => println!("{}", serde_json::to_string(&snapshot)?),
        }
        Ok(())
    }
}

/// one random problem of the benchmark
struct BenchmarkCase {
    crag: Arc<Crag>,
    costs: Costs,
    volumes: Option<CragVolumes>,
}

impl BenchmarkParameters {
    fn generate(&self, seed: u64) -> BenchmarkCase {
        match self.solver_type {
            CragSolverType::Assignment => {
                let stack = slice_stack(&vec![self.width; self.height]);
                let mut rng = DeterministicRng::seed_from_u64(seed);
                let mut costs = Costs::new(&stack.crag);
                for node_index in stack.crag.nodes() {
                    costs.node[node_index] = rng.next_f64() * 2. - 1.;
                }
                for edge_index in stack.crag.edges() {
                    if stack.crag.edge_type(edge_index) == EdgeType::NullAssignmentLink {
                        costs.edge[edge_index] = rng.next_f64();
                    }
                }
                BenchmarkCase {
                    crag: stack.crag,
                    costs,
                    volumes: Some(stack.volumes),
                }
            }
            _ => {
                let num_merges = self.num_merges.unwrap_or(self.width * self.height / 2);
                let (crag, costs) = random_hierarchy(self.width, self.height, num_merges, seed);
                BenchmarkCase {
                    crag: Arc::new(crag),
                    costs,
                    volumes: None,
                }
            }
        }
    }

    fn run_round(
        &self,
        parameters: &CragSolverParameters,
        verifier: &mut dyn ResultVerifier,
        seed: u64,
    ) -> CliResult<(Duration, CragSolverStatus)> {
        let BenchmarkCase { crag, costs, volumes } = self.generate(seed);
        if self.print_costs {
            println!("costs: {}", serde_json::to_string(&costs)?);
        }
        let begin = Instant::now();
        let mut solver = create_crag_solver(self.solver_type, crag.clone(), volumes.as_ref(), parameters.clone())?;
        solver.set_costs(&costs);
        let mut solution = CragSolution::new(crag);
        let status = solver.solve(&mut solution);
        let elapsed = begin.elapsed();
        if status == CragSolverStatus::SolutionFound {
            verifier.verify(&solution, seed);
        }
        Ok((elapsed, status))
    }

    fn run(self) -> CliResult<()> {
        // whether to disable progress bar, useful when running jobs in background
        let disable_progress_bar = env::var("DISABLE_PROGRESS_BAR").is_ok();
        let parameters = CragSolverParameters::from_json(self.solver_config.clone())?;
        let mut verifier = self.verifier.build(self.solver_type, &parameters);
        // single seed mode, intended only execute a single failing round
        if let Some(seed) = self.single_seed {
            let (elapsed, status) = self.run_round(&parameters, verifier.as_mut(), seed)?;
            println!("seed {seed}: {status:?} in {elapsed:?}");
            return Ok(());
        }
        let mut pb = if !disable_progress_bar {
            let mut pb = ProgressBar::on(std::io::stderr(), self.total_rounds as u64);
            pb.message(format!("{} ", self.pb_message).as_str());
            Some(pb)
        } else {
            if !self.pb_message.is_empty() {
                print!("{} ", self.pb_message);
            }
            None
        };
        let mut seed = match self.apply_deterministic_seed {
            Some(seed) => seed,
            None => thread_rng().gen::<u64>(),
        };
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut sum_solve_time = Duration::ZERO;
        let mut num_unfinished = 0;
        for round in 0..(self.total_rounds as u64) {
            if let Some(pb) = pb.as_mut() {
                pb.set(round);
            }
            seed = if self.use_deterministic_seed { round } else { rng.next_u64() };
            let (elapsed, status) = self.run_round(&parameters, verifier.as_mut(), seed)?;
            sum_solve_time += elapsed;
            if status != CragSolverStatus::SolutionFound {
                num_unfinished += 1;
            }
        }
        if let Some(pb) = pb.as_mut() {
            pb.finish();
            eprintln!();
        }
        let rounds = self.total_rounds.max(1) as u32;
        println!(
            "{} rounds, average solve time {:?}, {num_unfinished} without optimal solution",
            self.total_rounds,
            sum_solve_time / rounds
        );
        Ok(())
    }
}

/// the diamond graph has known optima for the closed-set and the multi-cut solver
fn diamond_regression(solver_type: CragSolverType) -> CliResult<()> {
    let (crag, d) = diamond();
    let crag = Arc::new(crag);
    let all_nodes: Vec<NodeIndex> = crag.nodes().collect();
    let all_edges: Vec<EdgeIndex> = crag.edges().collect();
    let (select_root, merge_children): ((Vec<_>, Vec<_>), (Vec<_>, Vec<_>)) = match solver_type {
        CragSolverType::ClosedSet => (
            (all_nodes.clone(), all_edges.clone()),
            (all_nodes.iter().copied().filter(|&node_index| node_index != d.n7).collect(), all_edges),
        ),
        _ => ((vec![d.n7], vec![]), (vec![d.n5, d.n6], vec![d.d])),
    };
    let cases = [
        (vec![(d.n7, -1.)], vec![], select_root),
        (vec![(d.n7, 1.)], vec![(d.d, -1.)], merge_children),
    ];
    for (node_costs, edge_costs, (expected_nodes, expected_edges)) in cases {
        let mut costs = Costs::new(&crag);
        for (node_index, cost) in node_costs {
            costs.node[node_index] = cost;
        }
        for (edge_index, cost) in edge_costs {
            costs.edge[edge_index] = cost;
        }
        let mut solver = create_crag_solver(solver_type, crag.clone(), None, CragSolverParameters::default())?;
        solver.set_costs(&costs);
        let mut solution = CragSolution::new(crag.clone());
        assert_eq!(solver.solve(&mut solution), CragSolverStatus::SolutionFound);
        assert_eq!(solver.get_value(), -1., "unexpected objective value");
        assert_eq!(solution.selected_nodes().collect::<Vec<_>>(), expected_nodes);
        assert_eq!(solution.selected_edges().collect::<Vec<_>>(), expected_edges);
    }
    Ok(())
}

impl Verifier {
    fn build(&self, solver_type: CragSolverType, parameters: &CragSolverParameters) -> Box<dyn ResultVerifier> {
        match self {
            Self::None => Box::new(VerifierNone {}),
            Self::Invariants => Box::new(VerifierInvariants {
                solver_type,
                force_explanation: parameters.force_explanation,
            }),
        }
    }
}

trait ResultVerifier {
    fn verify(&mut self, solution: &CragSolution, seed: u64);
}

struct VerifierNone {}

impl ResultVerifier for VerifierNone {
    fn verify(&mut self, _solution: &CragSolution, _seed: u64) {}
}

struct VerifierInvariants {
    solver_type: CragSolverType,
    force_explanation: bool,
}

impl VerifierInvariants {
    /// every root-to-leaf path contains at most one (exactly one if explanation is forced) selected candidate
    fn verify_tree_paths(&self, crag: &Crag, solution: &CragSolution, seed: u64) {
        let roots: Vec<NodeIndex> = crag.nodes().filter(|&node_index| crag.is_root_node(node_index)).collect();
        let mut stack: Vec<(NodeIndex, usize)> = roots.into_iter().map(|root| (root, 0)).collect();
        while let Some((node_index, num_selected)) = stack.pop() {
            let num_selected = num_selected + solution.node_selected(node_index) as usize;
            assert_le!(num_selected, 1, "bug: more than one candidate selected on a tree path || the seed is {seed:?}");
            if crag.is_leaf_node(node_index) && self.force_explanation {
                assert_eq!(num_selected, 1, "bug: unexplained leaf {node_index} || the seed is {seed:?}");
            }
            stack.extend(crag.children(node_index).map(|child| (child, num_selected)));
        }
    }

    /// merged edges connect selected candidates, and no edge is cut inside a connected component
    fn verify_multi_cut(&self, crag: &Crag, solution: &CragSolution, seed: u64) {
        for edge_index in crag.edges() {
            let (u, v) = (crag.u(edge_index), crag.v(edge_index));
            let both_selected = solution.node_selected(u) && solution.node_selected(v);
            if solution.edge_selected(edge_index) {
                assert!(both_selected, "bug: edge {edge_index} merges unselected nodes || the seed is {seed:?}");
            } else if both_selected {
                assert_ne!(
                    solution.label(u),
                    solution.label(v),
                    "bug: edge {edge_index} is cut inside a component || the seed is {seed:?}"
                );
            }
        }
    }

    /// selections are closed under taking children and descendant edges
    fn verify_closed_set(&self, crag: &Crag, solution: &CragSolution, seed: u64) {
        for node_index in solution.selected_nodes() {
            for child in crag.children(node_index) {
                assert!(
                    solution.node_selected(child),
                    "bug: child {child} of {node_index} not selected || the seed is {seed:?}"
                );
            }
        }
        for edge_index in solution.selected_edges() {
            assert!(solution.node_selected(crag.u(edge_index)) && solution.node_selected(crag.v(edge_index)));
            for descendant_edge in crag.descendant_edges(edge_index) {
                assert!(
                    solution.edge_selected(descendant_edge),
                    "bug: descendant {descendant_edge} of edge {edge_index} not selected || the seed is {seed:?}"
                );
            }
        }
    }

    /// selected slices are linked twice, selected assignments take all their links
    fn verify_assignment(&self, crag: &Crag, solution: &CragSolution, seed: u64) {
        for node_index in crag.nodes() {
            let num_links = crag
                .adj_edges(node_index)
                .iter()
                .filter(|&&edge_index| solution.edge_selected(edge_index))
                .count();
            match crag.node_type(node_index) {
                NodeType::SliceCandidate => {
                    let expected = if solution.node_selected(node_index) { 2 } else { 0 };
                    assert_eq!(
                        num_links, expected,
                        "bug: slice {node_index} is not explained || the seed is {seed:?}"
                    );
                }
                NodeType::AssignmentCandidate if solution.node_selected(node_index) => {
                    assert_eq!(
                        num_links,
                        crag.adj_edges(node_index).len(),
                        "bug: assignment {node_index} misses links || the seed is {seed:?}"
                    );
                }
                _ => {}
            }
        }
    }
}

impl ResultVerifier for VerifierInvariants {
    fn verify(&mut self, solution: &CragSolution, seed: u64) {
        let crag = solution.crag().clone();
        match self.solver_type {
            CragSolverType::MultiCut => {
                self.verify_tree_paths(&crag, solution, seed);
                self.verify_multi_cut(&crag, solution, seed);
            }
            CragSolverType::ClosedSet => self.verify_closed_set(&crag, solution, seed),
            CragSolverType::Assignment => self.verify_assignment(&crag, solution, seed),
        }
    }
}
