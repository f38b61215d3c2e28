//! frametap — command-line front-end for the frametap library.
//!
//! ```text
//! frametap --list-monitors | --list-windows | --check-permissions
//! frametap (--monitor ID | --window ID | --region X,Y,W,H | --interactive) [-o out.bmp]
//! frametap --stream SECS [--monitor ID | --window ID | --region X,Y,W,H]
//! ```

mod args;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use args::{Action, Args};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    match args.action() {
        Action::Help => {
            Args::command().print_help()?;
            Ok(ExitCode::SUCCESS)
        }
        Action::ListMonitors => Ok(commands::list_monitors()),
        Action::ListWindows => Ok(commands::list_windows()),
        Action::CheckPermissions => commands::check_permissions(),
        Action::Screenshot(mode) => {
            let config = commands::load_config(args.config.as_deref())?;
            commands::screenshot(mode, config, &args.output)
        }
        Action::Stream(mode, secs) => {
            let config = commands::load_config(args.config.as_deref())?;
            commands::stream(mode, config, secs)
        }
    }
}
