use std::process::exit;

use clap::Parser as ClapParser;

use kolak::compiler::{Cli, Compiler};

fn main() {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let compiler = Compiler::new(cli);
    if let Err(err) = compiler.run() {
        compiler.report(&err);
        exit(1);
    }
}
