mod cli;
mod commands;
mod dkvp;
mod dsl;
mod error;

use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use log::debug;

use cli::{Cli, Command};
use error::CliError;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mlr: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = mlr_eval::Context::from_env("mlr");
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let records = dkvp::read_all(input.as_bytes())?;
    debug!("read {} records from stdin", records.len());

    let out = match cli.command {
        Command::Step { steppers, fields, group_by, alphas, float } => {
            commands::step::run(&ctx, steppers, fields, group_by, alphas, float, records)?
        }
        Command::Put { program, infer, color } => {
            commands::dsl::run(&ctx, &program, infer.into(), false, false, color, records)?
        }
        Command::Filter { program, infer, invert, color } => {
            commands::dsl::run(&ctx, &program, infer.into(), true, invert, color, records)?
        }
    };

    let stdout = io::stdout();
    dkvp::write_all(stdout.lock(), &out)?;
    Ok(())
}
