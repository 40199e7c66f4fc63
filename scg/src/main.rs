use clap::{Parser, Subcommand};
use config::{Config, ConfigError, DEFAULT_CONFIG};
use controller::{Controller, NamespaceError};
use publisher::{DEFAULT_FORWARDER, PublishError};
use run_check::RunCheckError;
use sensu::{SensuClient, SensuError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

mod ack;
mod config;
mod controller;
mod logging;
mod metrics_defs;
mod publisher;
mod run_check;
mod statsd;

#[derive(Parser)]
#[command(name = "scg", about = "Generates and applies Sensu configuration from POEM and WebAPI")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Regenerate and apply the configuration of every tenant, or of one tenant's namespace
    Reload {
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        conf: PathBuf,
    },
    /// Silence a failing check on an entity until it recovers
    Ack {
        #[arg(long)]
        check: String,
        #[arg(long)]
        entity: String,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        conf: PathBuf,
    },
    /// Request an immediate execution of a check
    AdHoc {
        #[arg(long)]
        check: String,
        #[arg(long)]
        namespace: String,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        conf: PathBuf,
    },
    /// Print the command a check runs on an entity, optionally running it
    RunCheck {
        #[arg(long)]
        entity: String,
        #[arg(long)]
        check: String,
        #[arg(long, default_value = "default")]
        namespace: String,
        #[arg(long)]
        execute: bool,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        conf: PathBuf,
    },
    /// Forward the event read from stdin to the metric queue
    Publish {
        #[arg(long)]
        queue: String,
        #[arg(long, default_value = DEFAULT_FORWARDER)]
        forwarder: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Namespace(#[from] NamespaceError),
    #[error("{0}")]
    Sensu(#[from] SensuError),
    #[error("{0}")]
    RunCheck(#[from] RunCheckError),
    #[error("{0}")]
    Publish(#[from] PublishError),
    #[error("configuration skipped for namespaces {}", .0.join(", "))]
    Skipped(Vec<String>),
}

impl CliError {
    fn exit_status(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::Namespace(NamespaceError::Config(_)) => 2,
            _ => 1,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Could not start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_status())
        }
    }
}

/// Loads and validates the configuration, then sets up logging and metrics from it.
fn setup(path: &Path) -> Result<(Config, Option<sentry::ClientInitGuard>), CliError> {
    let config = match Config::from_file(path).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            logging::init(&Default::default());
            return Err(e.into());
        }
    };

    let guard = logging::init(&config.logging);
    if let Some(metrics) = &config.metrics
        && let Err(e) = statsd::init(metrics)
    {
        tracing::warn!("Metrics disabled: {e}");
    }

    Ok((config, guard))
}

fn client(config: &Config) -> SensuClient {
    SensuClient::new(&config.general.sensu_url, &config.general.sensu_token)
}

async fn run(command: CliCommand) -> Result<(), CliError> {
    match command {
        CliCommand::Reload { tenant, conf } => {
            let (config, _guard) = setup(&conf)?;
            let controller = Controller::new(&config, Arc::new(client(&config)));

            let pass = controller.reload(tenant.as_deref()).await?;
            if !pass.skipped.is_empty() {
                return Err(CliError::Skipped(pass.skipped));
            }
            Ok(())
        }
        CliCommand::Ack {
            check,
            entity,
            tenant,
            conf,
        } => {
            let (config, _guard) = setup(&conf)?;
            let namespace = config.tenant_namespace(tenant.as_deref())?;
            let name = ack::ack(&client(&config), namespace, &entity, &check).await?;
            println!("Silenced entry {name} created in namespace {namespace}");
            Ok(())
        }
        CliCommand::AdHoc {
            check,
            namespace,
            conf,
        } => {
            let (config, _guard) = setup(&conf)?;
            ack::ad_hoc(&client(&config), &namespace, &check).await?;
            println!("Check {check} scheduled in namespace {namespace}");
            Ok(())
        }
        CliCommand::RunCheck {
            entity,
            check,
            namespace,
            execute,
            conf,
        } => {
            let (config, _guard) = setup(&conf)?;
            let command = run_check::render(&client(&config), &namespace, &entity, &check).await?;
            println!("{command}");

            if execute {
                let execution = run_check::execute(&command).await?;
                print!("{}", execution.output);
                match execution.status {
                    Some(status) => println!("Exit status: {status}"),
                    None => println!("Terminated by signal"),
                }
            }
            Ok(())
        }
        CliCommand::Publish { queue, forwarder } => {
            logging::init(&Default::default());
            publisher::publish(&forwarder, &queue).await?;
            Ok(())
        }
    }
}
