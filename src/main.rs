extern crate clap;

use crate::clap::Parser;
use crag_mc::cli::*;
use crag_mc::logging::*;
use std::process::ExitCode;

pub fn main() -> ExitCode {
    if let Err(error) = init_logging() {
        eprintln!("{error}");
        return ExitCode::FAILURE;
    }
    match Cli::parse().run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}
