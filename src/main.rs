// Entrypoint for the CLI application.
// Parses arguments, sets up logging, runs the command and maps errors to
// exit codes (1 configuration or usage, 2 file access, 3 network or API).

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use tracing_subscriber::FmtSubscriber;

use agiletest_cli::cli;
use agiletest_cli::config::ProcessEnv;
use agiletest_cli::error::EXIT_CONFIG;

fn main() -> ExitCode {
    let cli = match cli::parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                return ExitCode::from(EXIT_CONFIG);
            }
        },
    };

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }

    match cli::run(&cli, &ProcessEnv) {
        Ok(output) => match print(&output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Error: {err:#}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli::log_level(verbose, &ProcessEnv))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")?;
    Ok(())
}

fn print(output: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}").context("Failed to write to stdout")?;
    Ok(())
}
