/// Event-management deployer
use clap::{Parser, Subcommand};
use thiserror::Error;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

mod azure;
mod bind;
mod config;
mod deploy;
mod descriptor;
mod kubectl;
mod manifest;
mod pipeline;
mod provision;

/// Provision Azure resources, bind workload credentials and deploy the
/// event-management application to the chosen target environment.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Target environment to deploy to.
    #[arg(long, value_enum)]
    target: pipeline::Target,

    /// Azure resource group holding every provisioned resource.
    #[arg(long)]
    resource_group: String,

    /// Azure region, e.g. westeurope.
    #[arg(long, default_value = "westeurope")]
    region: String,

    /// Path to the emd build configuration file.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the ordered resource graph and template tokens for the
    /// chosen target, without any cloud calls.
    Plan,
    /// Provision, bind and deploy, polling each workload to readiness.
    Up,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration file: {0}")]
    ConfigParse(#[from] config::Error),

    #[error(transparent)]
    Pipeline(#[from] pipeline::Error),
}

impl Error {
    /// Exit codes distinguish where a run stopped so wrapper scripts
    /// can decide between resume and rollback. Setup failures that
    /// precede any cloud mutation share code 1 with config errors.
    fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigParse(_) => 1,
            Error::Pipeline(pipeline::Error::Preflight(_)) => 1,
            Error::Pipeline(pipeline::Error::Provision(_)) => 2,
            Error::Pipeline(pipeline::Error::Bind(_)) => 3,
            Error::Pipeline(pipeline::Error::Render(_)) => 4,
            Error::Pipeline(pipeline::Error::MissingOutput { .. }) => 4,
            Error::Pipeline(pipeline::Error::Deploy(_)) => 5,
        }
    }
}

/// Read the configuration file from disk, falling back to the
/// compiled-in [default config](../default.toml).
///
/// If a configuration file name is not set explicitly, this function
/// detects whether a config file with the default file name exists. If
/// it does, it is used implicitly; if not, read errors are ignored.
fn read_config(args: &Cli) -> Result<config::File, Error> {
    const DEFAULT_CONFIG_FILE: &str = "emd.toml";

    let config_file = match &args.config {
        None => {
            if std::fs::metadata(DEFAULT_CONFIG_FILE)
                .map(|metadata| metadata.is_file())
                .unwrap_or(false)
            {
                Some(DEFAULT_CONFIG_FILE.to_string())
            } else {
                None
            }
        }
        Some(c) => Some(c.clone()),
    };

    Ok(if let Some(config_file) = config_file {
        config::File::from_user_config_file(&config_file)?
    } else {
        config::File::default()
    })
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {err}");
            std::process::exit(err.exit_code())
        }
    }
}

async fn run() -> Result<(), Error> {
    env_logger::init();

    let args = Cli::parse();
    let cfg = read_config(&args)?;

    let params = pipeline::Params {
        target: args.target,
        resource_group: args.resource_group.clone(),
        region: args.region.clone(),
        config: cfg,
    };

    match args.command {
        Commands::Plan => {
            pipeline::plan(&params)?;
            Ok(())
        }
        Commands::Up => {
            let cancel = CancellationToken::new();
            let operator_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, aborting after the current step");
                    operator_cancel.cancel();
                }
            });

            pipeline::up(&params, &cancel).await?;
            info!("deployment finished");
            Ok(())
        }
    }
}
