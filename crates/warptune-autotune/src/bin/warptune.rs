use clap::Parser;
use warptune_autotune::cli::{init_tracing, run, Cli};

fn main() -> anyhow::Result<()> {
    init_tracing();
    run(Cli::parse())
}
