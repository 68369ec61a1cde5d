//! qrun: run queries through the pluggable query runners.
//!
//! Acts as a minimal scheduler: builds the registry once, creates a runner per
//! execution, runs it on its own task and cancels it on timeout or Ctrl-C.

mod cli;

use anyhow::{bail, Context};
use cli::{Cli, Command, Limits, OrgCommand, RunArgs};
use query_runners::config::{Config, SourceConfig};
use query_runners::organization::OrgStore;
use query_runners::runner::{run_query, QueryRunner, Registry, RunOutcome, SchemaEntry};
use query_runners::{logging, RunnerError};
use std::io::Read;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Could not load .env file: {e}");
        }
    }

    let cli = Cli::parse_args();
    let log_to_file = cli.log_file;

    if log_to_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<RunnerError>() {
            Some(runner_error) => error!("{}: {}", runner_error.category(), runner_error),
            None => error!("{:#}", e),
        }
        if log_to_file {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let registry = Registry::with_builtin();

    match cli.command {
        Command::Types => {
            for info in registry.list_all() {
                let status = if info.enabled { "enabled" } else { "disabled" };
                println!("{:<14} {:<16} {}", info.type_name, info.name, status);
            }
        }
        Command::Settings { type_name } => {
            let factory = registry.get(&type_name)?;
            let schema = serde_json::to_string_pretty(&factory.configuration_schema())?;
            println!("{schema}");
        }
        Command::Sources => {
            for (name, source) in &config.sources {
                println!("{:<20} {}", name, source.source_type);
            }
        }
        Command::Run(args) => run_command(&registry, &config, args).await?,
        Command::Tables {
            source,
            json,
            limits,
        } => {
            let schema = tables_command(&registry, config.get_source(&source)?, limits).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                for entry in schema {
                    println!("{}: {}", entry.name, entry.columns.join(", "));
                }
            }
        }
        Command::Test { source, limits } => {
            test_command(&registry, config.get_source(&source)?, limits).await?;
            println!("Connection to '{source}' succeeded");
        }
        Command::Org(command) => org_command(&config, command).await?,
    }

    Ok(())
}

fn create_runner(registry: &Registry, source: &SourceConfig) -> anyhow::Result<Box<dyn QueryRunner>> {
    let settings = source.resolved_settings()?;
    Ok(registry.create(&source.source_type, &settings)?)
}

async fn run_command(registry: &Registry, config: &Config, args: RunArgs) -> anyhow::Result<()> {
    let query = if args.query == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read query from stdin")?;
        buf
    } else {
        args.query.clone()
    };
    if query.trim().is_empty() {
        bail!("Query is empty");
    }

    let runner = create_runner(registry, config.get_source(&args.source)?)?;
    let caller = args.caller();
    let cancel = CancellationToken::new();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { run_query(runner.as_ref(), &query, caller.as_ref(), &cancel).await })
    };

    let outcome = match supervise(task, &cancel, args.limits).await? {
        Ok(outcome) => outcome,
        Err(_) => bail!("Query cancelled"),
    };

    print_outcome(outcome, args.pretty)
}

fn print_outcome(outcome: RunOutcome, pretty: bool) -> anyhow::Result<()> {
    if let Some(error) = outcome.error {
        bail!(error);
    }
    let Some(data) = outcome.data else {
        bail!("Query returned no data");
    };

    if pretty {
        let value: serde_json::Value = serde_json::from_str(&data)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{data}");
    }
    Ok(())
}

async fn tables_command(
    registry: &Registry,
    source: &SourceConfig,
    limits: Limits,
) -> anyhow::Result<Vec<SchemaEntry>> {
    let runner = create_runner(registry, source)?;
    let cancel = CancellationToken::new();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { runner.get_schema(&cancel).await })
    };

    match supervise(task, &cancel, limits).await? {
        Ok(schema) => Ok(schema),
        Err(RunnerError::Cancelled) => bail!("Schema refresh cancelled"),
        Err(e) => Err(e.into()),
    }
}

async fn test_command(registry: &Registry, source: &SourceConfig, limits: Limits) -> anyhow::Result<()> {
    let runner = create_runner(registry, source)?;
    let cancel = CancellationToken::new();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { runner.test_connection(&cancel).await })
    };

    match supervise(task, &cancel, limits).await? {
        Ok(()) => Ok(()),
        Err(RunnerError::Cancelled) => bail!("Connection test cancelled"),
        Err(e) => Err(e.into()),
    }
}

/// Waits for an execution task, cancelling it on timeout or Ctrl-C.
///
/// After cancelling, the task runs to completion so the runner can issue its
/// backend cancel before the process exits. A second Ctrl-C aborts it.
async fn supervise<T>(
    mut task: JoinHandle<T>,
    cancel: &CancellationToken,
    limits: Limits,
) -> anyhow::Result<T> {
    let deadline = tokio::time::sleep(limits.timeout());
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            joined = &mut task => return joined.context("Execution task failed"),
            _ = &mut deadline, if !cancel.is_cancelled() => {
                warn!("Execution exceeded {}s, cancelling", limits.timeout);
                cancel.cancel();
            }
            _ = tokio::signal::ctrl_c() => {
                if cancel.is_cancelled() {
                    warn!("Interrupted again, abandoning execution");
                    task.abort();
                    bail!("Execution abandoned");
                }
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    }
}

async fn org_command(config: &Config, command: OrgCommand) -> anyhow::Result<()> {
    let path = match &config.state_db {
        Some(path) => path.clone(),
        None => OrgStore::default_path()?,
    };
    let store = OrgStore::open(&path).await?;
    let result = org_action(&store, command).await;
    store.close().await;
    result
}

async fn org_action(store: &OrgStore, command: OrgCommand) -> anyhow::Result<()> {
    match command {
        OrgCommand::List => {
            for (i, org) in store.list().await?.iter().enumerate() {
                if i > 0 {
                    println!("{}", "-".repeat(20));
                }
                println!("Id: {}\nName: {}\nSlug: {}", org.id, org.name, org.slug);
            }
        }
        OrgCommand::Create { name, slug } => {
            let org = store.create(&name, &slug).await?;
            println!("Created organization {} ({})", org.name, org.id);
        }
        OrgCommand::Set { setting, values } => {
            let stored = store.set_list_setting(setting, &values).await?;
            println!("Updated list of allowed {} to: {}", setting.label(), stored.join(", "));
        }
        OrgCommand::Show { setting } => {
            let current = store.show_list_setting(setting).await?;
            println!("Current list of {}: {}", setting.label(), current);
        }
    }
    Ok(())
}
