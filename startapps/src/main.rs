//! Start compliance apps using a YAML driver file that specifies apps and data.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use startapps::{exit_codes, logging, run};

#[derive(Parser)]
#[command(
    name = "startapps",
    version,
    about = "Start compliance apps from a YAML data file and render their documents"
)]
struct Cli {
    /// YAML file with `app` and `questions` keys.
    data: PathBuf,
    /// Directory to write rendered documents into (created if missing).
    outdir: PathBuf,
}

fn main() {
    logging::init();
    if let Err(err) = execute() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::FAILED);
    }
}

fn execute() -> Result<()> {
    let cli = Cli::parse();
    run::start_apps(&cli.data, &cli.outdir)?;
    Ok(())
}
