use anyhow::Result;
use clap::Parser;

use sync_prof::cli::{self, Args};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    cli::run(args)
}
