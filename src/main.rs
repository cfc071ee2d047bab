use std::process::ExitCode;

use clap::Parser;

use paddleseg_rs::{driver, logger, Cli};

fn main() -> ExitCode {
    // Usage errors exit here with clap's code 2.
    let cli = Cli::parse();
    logger::init(cli.verbose);

    ExitCode::from(driver::run(&cli, driver::open_native))
}
