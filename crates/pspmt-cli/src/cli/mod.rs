mod commands;
mod helpers;

use clap::Parser;
use pspmt_core::domain::PspmtError;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let error = error.as_pspmt_error();
            eprintln!("{}", error.diagnostic_line());
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("pspmt-shape".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            helpers::init_tracing(&cli.log_level)?;
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "pspmt-shape",
    version,
    about = "PSPMT pulse-shape fitting and rise-time calibration"
)]
struct Cli {
    /// Log filter directive for stderr output (e.g. "info", "pspmt_core=debug")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Run pass 1, build the rise-time map, run pass 2 and write every artifact
    Calibrate(commands::CalibrateArgs),
    /// Run a single fit pass, optionally seeded from an existing rise-time map
    Fit(commands::FitArgs),
    /// Run pass 1 only and write the rise-time map artifact
    BuildMaps(commands::BuildMapsArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Calibrate(args) => commands::run_calibrate_command(args),
        CliCommand::Fit(args) => commands::run_fit_command(args),
        CliCommand::BuildMaps(args) => commands::run_build_maps_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(PspmtError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<PspmtError> for CliError {
    fn from(error: PspmtError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_pspmt_error(&self) -> PspmtError {
        match self {
            Self::Usage(message) => {
                PspmtError::input_validation("INPUT.CLI_USAGE", message.clone())
            }
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => PspmtError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
