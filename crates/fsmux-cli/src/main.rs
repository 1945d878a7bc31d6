//! fsmux image tool.
//!
//! Usage:
//!   fsmux --image dev.img put ./boot.cfg boot.cfg
//!   fsmux --image dev.img put ./client.pem SL:client.pem
//!   fsmux --image dev.img ls
//!   fsmux --image dev.img cat SL:client.pem
//!
//! Logs go to stderr; set RUST_LOG=fsmux_kernel=debug to trace every call.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use fsmux_cli::{Command, Session};
use fsmux_kernel::WriterDevice;
use fsmux_types::FsmuxConfig;

/// Inspect and edit fsmux storage images.
#[derive(Parser, Debug)]
#[command(name = "fsmux")]
#[command(about = "Inspect and edit fsmux storage images")]
struct Args {
    /// RON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image file holding the secure-store snapshot
    #[arg(short, long, default_value = "fsmux.snap")]
    image: PathBuf,

    /// Run against an empty image and discard the result
    #[arg(long, conflicts_with = "image")]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => FsmuxConfig::load(path)?,
        None => FsmuxConfig::default(),
    };
    let image = (!args.ephemeral).then_some(args.image.as_path());
    let console = Box::new(WriterDevice(std::io::stdout()));
    let mut session = Session::open(&config, image, console)?;

    let mut stdout = std::io::stdout().lock();
    session.run(&args.command, &mut stdout)?;
    session.save()
}

fn main() -> ExitCode {
    if let Err(err) = fsmux_telemetry::init("info") {
        eprintln!("fsmux: tracing init failed: {err}");
    }

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("fsmux: {err:#}");
            ExitCode::FAILURE
        }
    }
}
