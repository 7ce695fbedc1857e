//! `notsimd`: the node and client entry point.
//!
//! Classifies the invocation, builds either the full application with a bound consensus engine
//! or only the client bindings, then runs the selected command.

mod decoder;
mod errors;
mod root;


use std::{env, io::Write, process};

use notsim_simapp::SimTx;

fn run(args: &[String]) -> anyhow::Result<()> {
    let bootstrapped = root::new_root_cmd::<SimTx>(args)?;
    bootstrapped.root.execute(args)?;
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(err) = run(&args) {
        if let Err(write_err) = writeln!(std::io::stderr(), "Error: {err:#}") {
            panic!("failed to report error `{err:#}`: {write_err}");
        }
        process::exit(1);
    }
}
