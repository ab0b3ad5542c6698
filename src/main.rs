use std::process::ExitCode;

use clap::Parser;

mod acquire;
mod cli;
mod frame;
mod logging;
mod port;
mod proto;
mod sample;
mod stats;

fn main() -> ExitCode {
    let args = cli::Cli::parse();
    logging::init_logging(args.debug);
    match acquire::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}. Exiting...", e);
            ExitCode::from(1)
        }
    }
}
