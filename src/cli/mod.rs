//! Argument parsing and driver/model wiring.
//!
//! Thin by design: the attach/run/flush lifecycle and breakpoint placement
//! belong to an external debugger driver (spec §1 "Non-goals"). This module
//! only parses arguments, builds the `Model` + `View` + `OpaqueConfig`, and
//! wires in whatever `Driver` is available.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use crate::config::{OpaqueConfig, OutputFormat as ConfigOutputFormat};
use crate::driver::{Driver, NullDriver};
use crate::model::Model;
use crate::view::{Chrome, Text, View};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Chrome,
}

impl From<OutputFormat> for ConfigOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ConfigOutputFormat::Text,
            OutputFormat::Chrome => ConfigOutputFormat::Chrome,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "sync-prof",
    about = "Trace thread/mutex/semaphore/condvar/barrier synchronization in a running program",
    after_help = "\
EXAMPLES:
    sync-prof --attach 1234 --output trace.json --output-format chrome
    sync-prof --command ./a.out --output trace.txt --config opaque.txt"
)]
pub struct Args {
    /// PID of an already-running process to attach to
    #[arg(long, conflicts_with = "command")]
    pub attach: Option<i32>,

    /// Command line to launch and trace (driver-specific syntax)
    #[arg(long, conflicts_with = "attach")]
    pub command: Option<String>,

    /// Newline-delimited opaque-primitive declarations
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Where to write the rendered trace
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Renderer to drive
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Suppress the breakpoint hit-count summary
    #[arg(short, long)]
    pub quiet: bool,
}

fn load_opaque_config(path: Option<&PathBuf>) -> Result<OpaqueConfig> {
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
            OpaqueConfig::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(OpaqueConfig::new()),
    }
}

fn build_view(format: OutputFormat, output: &PathBuf) -> Result<Box<dyn View>> {
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let writer = BufWriter::new(file);
    Ok(match format {
        OutputFormat::Text => Box::new(Text::new(writer)),
        OutputFormat::Chrome => Box::new(Chrome::new(writer)),
    })
}

/// Print the end-of-run breakpoint hit-count summary (`sp_gdb_ctrl.py::printSummary`).
fn print_summary(hits: &[(String, u64)], out: &mut impl Write) -> std::io::Result<()> {
    for (location, count) in hits {
        writeln!(out, "{location}  {count}")?;
    }
    Ok(())
}

/// Resolve the concrete [`Driver`] for this run.
///
/// No real ptrace/GDB backend ships with this crate (spec §1 "Non-goals");
/// the seam exists so one can be swapped in without touching `Model`.
fn build_driver(_args: &Args) -> Box<dyn Driver> {
    Box::new(NullDriver)
}

pub fn run(args: Args) -> Result<()> {
    let opaque_config = load_opaque_config(args.config.as_ref())?;
    let view = build_view(args.output_format, &args.output)?;
    let mut model = Model::new(view, opaque_config);
    let mut driver = build_driver(&args);

    info!("starting driver run");
    driver.run(&mut model).context("driver run failed")?;

    if !args.quiet {
        let hits = driver.breakpoint_hits();
        print_summary(&hits, &mut std::io::stdout()).context("writing summary")?;
    }
    Ok(())
}
