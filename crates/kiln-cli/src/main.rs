//! kiln - build, watch and serve a project during development.

use clap::Parser;
use kiln_cli::{cli, commands, error, logger, ui};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);
    ui::set_quiet(args.quiet);

    let result = match args.command {
        cli::Command::Build(project) => commands::build_execute(project).await,
        cli::Command::Watch(project) => commands::watch_execute(project).await,
        cli::Command::Run(project) => commands::run_execute(project).await,
    };

    result.map_err(error::cli_error_to_miette)
}
