// CLI layer: argument model, command dispatch and the upload spinner.
// `run` returns the text to print so `main` stays a thin wrapper.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};

use crate::api::{ApiClient, ImportOutcome, ImportRequest, MultipartImport};
use crate::auth::{self, AuthInputs};
use crate::config::{ClientSettings, ConfigSource, ENV_LOG_LEVEL};
use crate::error::{Error, Result};
use crate::framework::FrameworkType;

#[derive(Parser, Debug)]
#[command(name = "agiletest")]
#[command(about = "Upload test execution results to AgileTest", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub auth: AuthInputs,

    /// Cloud authentication service URL [env: AGILETEST_AUTH_BASE_URL]
    #[arg(long, global = true)]
    pub auth_base_url: Option<String>,

    /// Request timeout in seconds [env: AGILETEST_TIMEOUT]
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import test execution results
    TestExecution {
        #[command(subcommand)]
        command: TestExecutionCommands,
    },

    /// List supported framework types
    Frameworks,
}

#[derive(Subcommand, Debug)]
pub enum TestExecutionCommands {
    /// Upload a result file as the request body
    Import {
        /// Test framework (junit, nunit, xunit, testng, robot, cucumber, behave)
        #[arg(short = 't', long)]
        framework_type: String,

        /// Jira project key
        #[arg(short = 'p', long)]
        project_key: String,

        /// Existing test execution issue to import into (also `-te`)
        #[arg(long, alias = "te")]
        test_execution_key: Option<String>,

        /// Result file; omit or pass `-` to read stdin
        file: Option<PathBuf>,
    },

    /// Upload a result file together with test execution info (JSON)
    ImportMultipart {
        /// Test framework (junit, nunit, xunit, testng, robot, cucumber, behave)
        #[arg(short = 't', long)]
        framework_type: String,

        /// Result file
        #[arg(long)]
        test_results: PathBuf,

        /// Test execution info JSON file
        #[arg(long)]
        test_execution_info: PathBuf,
    },
}

/// Parses `args`, accepting `-te` as the spelling of `--test-execution-key`.
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    Cli::try_parse_from(args.into_iter().map(|arg| {
        let arg = arg.into();
        if arg == "-te" {
            OsString::from("--test-execution-key")
        } else {
            arg
        }
    }))
}

/// Log level: `--verbose` wins, then `LOG_LEVEL`, then INFO.
pub fn log_level(verbose: bool, source: &impl ConfigSource) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    source
        .get(ENV_LOG_LEVEL)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(Level::INFO)
}

/// Executes the parsed command and returns what should go to stdout.
pub fn run(cli: &Cli, source: &impl ConfigSource) -> Result<String> {
    match &cli.command {
        Commands::Frameworks => Ok(list_frameworks()),
        Commands::TestExecution { command } => {
            let mut api = connect(cli, source)?;
            let outcome = match command {
                TestExecutionCommands::Import {
                    framework_type,
                    project_key,
                    test_execution_key,
                    file,
                } => {
                    let req = ImportRequest {
                        framework: framework_type.parse()?,
                        project_key: project_key.clone(),
                        test_execution_key: test_execution_key.clone(),
                        payload: read_input(file.as_deref())?,
                    };
                    with_spinner("Uploading test results...", || api.import_results(&req))?
                }
                TestExecutionCommands::ImportMultipart {
                    framework_type,
                    test_results,
                    test_execution_info,
                } => {
                    let req = MultipartImport {
                        framework: framework_type.parse()?,
                        results: read_file(test_results)?,
                        test_execution_info: read_file(test_execution_info)?,
                    };
                    with_spinner("Uploading test results...", || api.import_multipart(&req))?
                }
            };
            Ok(render_outcome(&outcome))
        }
    }
}

fn connect(cli: &Cli, source: &impl ConfigSource) -> Result<ApiClient> {
    let ctx = auth::resolve(&cli.auth, source)?;
    let settings = ClientSettings::resolve(cli.auth_base_url.as_deref(), cli.timeout, source)?;
    info!("Using {:?} mode against {}", ctx.mode(), ctx.base_url());
    ApiClient::new(ctx, settings)
}

fn list_frameworks() -> String {
    FrameworkType::ALL
        .iter()
        .map(|f| format!("{:<10} {:<5} {}", f.as_str(), f.extension(), f.mime_type()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_outcome(outcome: &ImportOutcome) -> String {
    serde_json::to_string_pretty(&outcome.raw).unwrap_or_else(|_| outcome.raw.to_string())
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(p) if p != Path::new("-") => read_file(p),
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|source| Error::FileAccess {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
            Ok(buf)
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::FileAccess {
        path: path.to_path_buf(),
        source,
    })
}

/// Runs `f` while a spinner ticks on stderr. Hidden when stderr is not a TTY.
fn with_spinner<T>(message: &'static str, f: impl FnOnce() -> T) -> T {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = f();
    spinner.finish_and_clear();
    result
}
