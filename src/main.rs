//! sqlrun - run a SQL script statement by statement.

use std::io::{self, Read};
use std::sync::Arc;

use anyhow::Context;
use sqlrun::cli::Cli;
use sqlrun::config::{Config, ConnectionConfig};
use sqlrun::db::{self, DatabaseClient, MockDatabaseClient};
use sqlrun::error::{Error, Result};
use sqlrun::logging;
use sqlrun::output::{write_scan, PrintingSink};
use sqlrun::query::{RunStatus, RunnerConfig, StatementRunner, StatementScanner};
use tracing::{error, info, warn};

/// Exit code when at least one statement failed.
const EXIT_STATEMENT_FAILED: i32 = 2;

/// Exit code after Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            match e.downcast_ref::<Error>() {
                Some(err) => error!("{}: {}", err.category(), err),
                None => error!("{e:#}"),
            }
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let format = cli.parse_output_format().map_err(Error::config)?;
    let mode = cli.run_mode()?;
    let buffer: Arc<str> = Arc::from(read_input(&cli)?);

    let connection = resolve_connection(&cli, &config)?;
    let backend = connection.as_ref().map(|c| c.backend).unwrap_or_default();

    let mut runner_config = RunnerConfig::from_settings(&config.runner, backend);
    if let Some(dialect) = cli.dialect()? {
        runner_config.backend = dialect;
    }
    if let Some(delimiter) = cli.delimiter()? {
        runner_config.delimiter = delimiter.to_string();
    }
    if cli.abort_on_error {
        runner_config.abort_on_error = true;
    }

    if cli.split_only {
        let scan = StatementScanner::new(runner_config.delimiter.as_str())
            .with_options(runner_config.backend.scan_options())
            .scan(&buffer);
        let mut stdout = io::stdout().lock();
        write_scan(&mut stdout, &scan, &buffer, format).context("Failed to write output")?;
        return Ok(0);
    }

    let client: Arc<dyn DatabaseClient> = if cli.mock_db {
        info!("Using mock database");
        Arc::new(MockDatabaseClient::new())
    } else {
        let Some(connection) = connection else {
            return Err(Error::config(
                "No database connection configured. Pass a connection string, \
                 use --connection NAME, or --mock-db.",
            )
            .into());
        };
        info!("Connecting to {}", connection.display_string());
        Arc::from(db::connect(&connection).await?)
    };

    let mut runner = StatementRunner::new(Arc::clone(&client), runner_config);
    let token = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current statement");
            token.cancel();
        }
    });

    let mut sink = PrintingSink::new(io::stdout(), format, Arc::clone(&buffer));
    let outcome = runner.run_script(&buffer, mode, &mut sink).await;
    sink.finish().context("Failed to write output")?;

    if let Err(e) = client.close().await {
        warn!("Error while closing connection: {}", e);
    }

    let summary = outcome?;
    let code = match summary.status {
        RunStatus::Cancelled => EXIT_CANCELLED,
        _ if summary.failed > 0 => EXIT_STATEMENT_FAILED,
        _ => 0,
    };
    Ok(code)
}

/// Reads the script from the file argument or stdin.
fn read_input(cli: &Cli) -> anyhow::Result<String> {
    match cli.input_path() {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            Ok(buffer)
        }
    }
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
///
/// Precedence: connection string argument, then the named connection, then
/// the `default` connection. Backend environment variables fill the gaps.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(Error::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}
