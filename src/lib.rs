extern crate serde;
#[macro_use]
extern crate serde_json;
extern crate clap;
extern crate derivative;
extern crate hashbrown;
extern crate itertools;
#[cfg(feature = "cli")]
extern crate more_asserts;
#[cfg(feature = "cli")]
extern crate pbr;
extern crate petgraph;
#[cfg(feature = "cli")]
extern crate rand;
extern crate rand_xoshiro;
extern crate rayon;
#[cfg(feature = "cli")]
extern crate serde_variant;

#[cfg(feature = "cli")]
pub mod cli;
pub mod costs;
pub mod crag;
pub mod crag_solver;
pub mod cut_graph;
pub mod error;
pub mod example_crags;
pub mod linear_solver;
pub mod logging;
pub mod snapshot;
pub mod solution;
pub mod solver_assignment;
pub mod solver_closed_set;
pub mod solver_multi_cut;
pub mod util;
pub mod volumes;

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub fn get_build_timestamp() -> &'static str {
    env!("CRAG_MC_BUILD_RS_TIMESTAMP")
}
