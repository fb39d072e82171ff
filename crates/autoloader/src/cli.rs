//! Command-line interface.

use autoloader_core::metrics::{self, MetricsSink, NoopSink, PrometheusSink};
use autoloader_core::shutdown_token;
use chrono::Utc;
use clap::{Parser, Subcommand};
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::app;
use crate::config::Config;
use crate::error::{AutoloaderError, BindSnafu, MetricsSnafu, OptionsSnafu};
use crate::nuke::{NukeTarget, nuke};
use crate::options::{LoadOptions, LoadParams};
use crate::server;

/// Discovers archived datatypes and loads them into BigQuery.
#[derive(Debug, Parser)]
#[command(name = "autoloader", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "AUTOLOADER_CONFIG",
        default_value = "autoloader.yaml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the load endpoint until a shutdown signal arrives
    Serve {
        /// Override `server.address`
        #[arg(long, env = "AUTOLOADER_LISTEN_ADDRESS")]
        listen_address: Option<String>,
    },
    /// Run a single load pass and exit
    Run {
        /// Named period: day, month, annual, everything or new
        #[arg(long, env = "AUTOLOADER_PERIOD", default_value = "day")]
        period: String,
        /// Inclusive start date (YYYY/MM/DD); requires --end
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Exclusive end date (YYYY/MM/DD); requires --start
        #[arg(long, requires = "start")]
        end: Option<String>,
    },
    /// Delete a datatype's schema, data and tables
    Nuke {
        /// Datatype to delete, as <experiment>/<datatype> (repeatable)
        #[arg(long = "datatype", required = true)]
        datatypes: Vec<String>,
        /// Actually delete; without this flag only report what would be deleted
        #[arg(long)]
        execute: bool,
    },
}

/// Load the configuration and run the selected command.
pub async fn execute(cli: Cli) -> Result<(), AutoloaderError> {
    info!(path = %cli.config.display(), "Loading config");
    let mut config = Config::from_file(&cli.config)?;

    match cli.command {
        Command::Serve { listen_address } => {
            if let Some(address) = listen_address {
                config.server.address = address;
                config.validate()?;
            }
            serve(&config).await
        }
        Command::Run { period, start, end } => {
            let params = LoadParams {
                start,
                end,
                period: Some(period),
            };
            run(&config, &params).await
        }
        Command::Nuke { datatypes, execute } => {
            let targets = datatypes
                .iter()
                .map(|d| d.parse())
                .collect::<Result<Vec<NukeTarget>, _>>()?;
            nuke_all(&config, &targets, execute).await
        }
    }
}

async fn serve(config: &Config) -> Result<(), AutoloaderError> {
    let shutdown = shutdown_token();

    metrics::init_global(config.metrics.socket_addr()?, shutdown.clone().cancelled_owned())
        .context(MetricsSnafu)?;

    let sink: Arc<dyn MetricsSink> = Arc::new(PrometheusSink);
    let loader = Arc::new(app::loader(config, sink)?);

    let address = config.server_addr()?;
    let listener = TcpListener::bind(address).await.context(BindSnafu {
        address: address.to_string(),
    })?;

    server::serve(listener, loader, shutdown).await
}

async fn run(config: &Config, params: &LoadParams) -> Result<(), AutoloaderError> {
    let options =
        LoadOptions::from_params(params, Utc::now().date_naive()).context(OptionsSnafu)?;
    let loader = app::loader(config, Arc::new(NoopSink))?;

    let report = loader.load(&options).await?;
    info!(
        datatypes = report.datatypes,
        partitions = report.partitions,
        "Load pass succeeded"
    );
    Ok(())
}

async fn nuke_all(
    config: &Config,
    targets: &[NukeTarget],
    execute: bool,
) -> Result<(), AutoloaderError> {
    let discovery = app::discovery(config, Arc::new(NoopSink))?;
    let (warehouse, _) = app::warehouses(&config.warehouse)?;

    for target in targets {
        let report = nuke(&discovery, warehouse.as_ref(), target, execute).await?;
        info!(
            experiment = %target.experiment,
            datatype = %target.datatype,
            objects = report.objects.len(),
            tables = report.tables.len(),
            dry_run = !execute,
            "Nuked datatype"
        );
    }
    Ok(())
}
