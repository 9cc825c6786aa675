mod cmd;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use aihub_core::install::Storage;
use aihub_core::AihubError;
use logging::LogConfig;

#[derive(Parser)]
// The version flag stays on the top-level command only: subcommands use -V
// for --verbose.
#[command(
    name = "aihub",
    about = "Install the aihub operator stack onto a Kubernetes cluster via OLM",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Info,
    Error,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StorageArg {
    Nfs,
}

#[derive(Subcommand)]
enum Commands {
    /// List the operators installed in a namespace
    CheckInstalled {
        /// Namespace where the operators are installed
        #[arg(long, short = 'e', default_value = "operators")]
        namespace: String,
    },

    /// Package a local operator bundle and publish it to the catalog
    Register {
        /// Path to the operator bundle
        #[arg(long)]
        path: PathBuf,

        /// Operator name
        #[arg(long)]
        operator: String,

        /// Install on OpenShift instead of plain Kubernetes
        #[arg(long)]
        openshift: bool,

        /// Logging path (default: the bundle path)
        #[arg(long)]
        logpath: Option<PathBuf>,

        /// Logging level
        #[arg(long, short = 'l', value_enum, ignore_case = true, default_value = "error")]
        loglevel: LogLevel,

        /// Print INFO messages, same as --loglevel info
        #[arg(long, short = 'V')]
        verbose: bool,
    },

    /// Install the full aihub platform stack
    Install {
        /// Namespace where the applications will be installed
        #[arg(long, short = 'e', default_value = "operators")]
        namespace: String,

        /// Storage class for pvcs
        #[arg(long, short = 's', value_enum)]
        storage: Option<StorageArg>,

        /// Install on OpenShift instead of plain Kubernetes
        #[arg(long)]
        openshift: bool,

        /// Logging level
        #[arg(long, short = 'l', value_enum, ignore_case = true, default_value = "error")]
        loglevel: LogLevel,

        /// Print INFO messages, same as --loglevel info
        #[arg(long, short = 'V')]
        verbose: bool,
    },

    /// Install one registered operator from the catalog
    InstallOperator {
        /// Name of the operator to be installed
        #[arg(long, short = 'o')]
        operator: String,

        /// Subscription manifest for the operator (generated when omitted)
        #[arg(long = "subscription-file", short = 'f')]
        subscription_file: Option<PathBuf>,

        /// Install on OpenShift instead of plain Kubernetes
        #[arg(long)]
        openshift: bool,

        /// Logging path (default: the current directory)
        #[arg(long)]
        logpath: Option<PathBuf>,

        /// Logging level
        #[arg(long, short = 'l', value_enum, ignore_case = true, default_value = "error")]
        loglevel: LogLevel,

        /// Print INFO messages, same as --loglevel info
        #[arg(long, short = 'V')]
        verbose: bool,
    },
}

fn level_for(loglevel: LogLevel, verbose: bool) -> tracing::Level {
    if verbose || loglevel == LogLevel::Info {
        tracing::Level::INFO
    } else {
        tracing::Level::ERROR
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = dispatch(cli) {
        eprintln!("error: {err:#}");
        let code = err
            .downcast_ref::<AihubError>()
            .map(AihubError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::CheckInstalled { namespace } => {
            logging::init(&LogConfig {
                level: tracing::Level::ERROR,
                file: None,
            })?;
            cmd::check_installed::run(&namespace)
        }
        Commands::Register {
            path,
            operator,
            openshift: _,
            logpath,
            loglevel,
            verbose,
        } => {
            let operator = operator.to_lowercase();
            let log_dir = logpath.unwrap_or_else(|| path.clone());
            let log_file = logging::operator_log_path(&log_dir, &operator);
            logging::init(&LogConfig {
                level: level_for(loglevel, verbose),
                file: Some(&log_file),
            })?;
            cmd::register::run(&path, &operator)
        }
        Commands::Install {
            namespace,
            storage,
            openshift,
            loglevel,
            verbose,
        } => {
            logging::init(&LogConfig {
                level: level_for(loglevel, verbose),
                file: None,
            })?;
            let storage = match storage {
                Some(StorageArg::Nfs) => Storage::Nfs,
                None => Storage::Default,
            };
            cmd::install::run(&namespace, storage, openshift)
        }
        Commands::InstallOperator {
            operator,
            subscription_file,
            openshift: _,
            logpath,
            loglevel,
            verbose,
        } => {
            let operator = operator.to_lowercase();
            let log_dir = match logpath {
                Some(dir) => dir,
                None => std::env::current_dir()?,
            };
            let log_file = logging::operator_log_path(&log_dir, &operator);
            logging::init(&LogConfig {
                level: level_for(loglevel, verbose),
                file: Some(&log_file),
            })?;
            cmd::install_operator::run(&operator, subscription_file.as_deref())
        }
    }
}
