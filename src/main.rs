use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use routebook::api::{AppState, start_server};
use routebook::capability::{Capability, LlmCapability, Unconfigured};
use routebook::config::{Config, StoreBackend};
use routebook::domain::Route;
use routebook::executor::CancelSignal;
use routebook::llm::{AnthropicClient, AnthropicConfig};
use routebook::service::{BundleService, ExecutionService, ServiceConfig};
use routebook::store::{RestStore, RouteStore, SqliteStore};
use routebook::tools::{McpConnector, ToolSourceConfig, ToolSourceConnector};

mod cli;

use cli::Cli;
use cli::commands::{Commands, SourceCommands};

fn setup_logging(config: &Config, verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("routebook")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("routebook.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let level = if verbose {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Long-lived collaborators built once from the config
struct App {
    config: Config,
    store: Arc<dyn RouteStore>,
    connector: Arc<dyn ToolSourceConnector>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let store = open_store(&config)?;
        let connector: Arc<dyn ToolSourceConnector> = Arc::new(McpConnector::new(config.timeouts.catalog()));
        Ok(Self {
            config,
            store,
            connector,
        })
    }

    fn capability(&self) -> Result<Arc<dyn Capability>> {
        let llm_config = AnthropicConfig::from_llm_config(&self.config.llm, self.config.timeouts.llm());
        let client = AnthropicClient::from_env(&self.config.llm.api_key_env, llm_config)
            .context("Failed to create LLM client")?;
        Ok(Arc::new(LlmCapability::new(Arc::new(client))))
    }

    fn bundle_service(&self, capability: Arc<dyn Capability>) -> BundleService {
        BundleService::new(
            self.store.clone(),
            self.connector.clone(),
            capability,
            ServiceConfig::from(&self.config),
        )
    }

    /// Bundle service for commands that never plan, so no API key is needed
    fn reader(&self) -> BundleService {
        self.bundle_service(Arc::new(Unconfigured))
    }

    fn execution_service(&self, capability: Arc<dyn Capability>) -> ExecutionService {
        ExecutionService::new(
            self.store.clone(),
            self.connector.clone(),
            capability,
            ServiceConfig::from(&self.config),
        )
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn RouteStore>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.store.sqlite_path)
                .with_context(|| format!("Failed to open store at {}", config.store.sqlite_path.display()))?;
            Ok(Arc::new(store))
        }
        StoreBackend::Rest => {
            let url = config
                .store
                .rest
                .url
                .as_deref()
                .ok_or_else(|| eyre::eyre!("store.rest.url is not set"))?;
            let key_env = &config.store.rest.api_key_env;
            let key = std::env::var(key_env).with_context(|| format!("{} is not set", key_env))?;
            let store = RestStore::new(url, key, config.timeouts.store()).context("Failed to create REST store")?;
            Ok(Arc::new(store))
        }
    }
}

async fn run_application(cli: &Cli, app: &App) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Serve { bind } => handle_serve(bind.as_deref(), app).await,
        Commands::Bundle {
            project,
            sources,
            description,
        } => handle_bundle_command(project, sources, description, app).await,
        Commands::Exec { bundle, request } => handle_exec_command(bundle, request, app).await,
        Commands::Bundles { project } => handle_bundles_command(project, app).await,
        Commands::Routes { bundle, detailed } => handle_routes_command(bundle, *detailed, app).await,
        Commands::Source { command } => handle_source_command(command, app).await,
    }
}

async fn handle_serve(bind: Option<&str>, app: &App) -> Result<()> {
    let bind = bind.unwrap_or(&app.config.server.bind);
    let addr: SocketAddr = bind.parse().with_context(|| format!("Invalid bind address: {}", bind))?;

    let capability = app.capability()?;
    let state = AppState::new(app.bundle_service(capability.clone()), app.execution_service(capability));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would stop the server
                log::warn!("Ctrl-C handler unavailable: {}", e);
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    println!("{} http://{}", "Routebook API listening on".green(), addr);
    start_server(addr, state, shutdown_rx).await.context("API server failed")?;
    Ok(())
}

async fn handle_bundle_command(project: &str, sources: &[String], description: &str, app: &App) -> Result<()> {
    info!("Creating bundle for project {}: {}", project, description);
    println!("{} {}", "Planning:".green(), description);

    let service = app.bundle_service(app.capability()?);
    let created = service.create_bundle(project, sources, description).await?;

    println!("{} {}", "Bundle:".green(), created.bundle_id.bold());
    for route in service.list_routes(&created.bundle_id).await? {
        print_route(&route, false);
    }
    println!("{} routes created", created.routes_created);
    Ok(())
}

async fn handle_exec_command(bundle: &str, request: &str, app: &App) -> Result<()> {
    info!("Executing on bundle {}: {}", bundle, request);

    let (cancel, signal) = CancelSignal::pair();
    tokio::spawn(cancel.cancel_on(tokio::signal::ctrl_c()));

    let service = app.execution_service(app.capability()?);
    let outcome = service.execute(bundle, request, &signal).await?;

    let marker = if outcome.new_route_created {
        "(new route)".yellow()
    } else {
        "(matched)".cyan()
    };
    println!("{} {} {}", "Route:".green(), outcome.route_used, marker);
    match &outcome.result {
        serde_json::Value::String(text) => println!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

async fn handle_bundles_command(project: &str, app: &App) -> Result<()> {
    let bundles = app.reader().list_bundles(project).await?;

    if bundles.is_empty() {
        println!("{}", "No bundles".yellow());
    }
    for bundle in bundles {
        println!(
            "{} [{}] {}",
            bundle.id.bold(),
            bundle.tool_source_ids.join(", "),
            bundle.description
        );
    }
    Ok(())
}

async fn handle_routes_command(bundle: &str, detailed: bool, app: &App) -> Result<()> {
    let routes = app.reader().list_routes(bundle).await?;
    if routes.is_empty() {
        println!("{}", "No routes".yellow());
    }
    for route in &routes {
        print_route(route, detailed);
    }
    Ok(())
}

async fn handle_source_command(command: &SourceCommands, app: &App) -> Result<()> {
    match command {
        SourceCommands::Add { id, url, name, headers } => {
            let mut source = ToolSourceConfig::new(id, name.as_deref().unwrap_or(id), url);
            for header in headers {
                let (key, value) = header
                    .split_once('=')
                    .ok_or_else(|| eyre::eyre!("Header must be NAME=VALUE: {}", header))?;
                source = source.with_header(key.trim(), value.trim());
            }

            app.reader().register_tool_source(&source).await?;
            println!("{} {} -> {}", "Registered:".green(), source.id, source.url);
        }
    }
    Ok(())
}

fn print_route(route: &Route, detailed: bool) {
    println!(
        "  {} {} {}",
        route.id.dimmed(),
        route.trigger.bold(),
        format!("[{}]", route.provenance.as_str()).cyan()
    );
    if detailed {
        for (i, step) in route.steps.iter().enumerate() {
            println!("      {}. {} {}", i + 1, step.tool, step.arguments);
        }
    } else {
        println!("      {}", route.tool_names().join(" -> "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    setup_logging(&config, cli.is_verbose()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    let app = App::new(config)?;
    if let Err(e) = run_application(&cli, &app).await {
        eprintln!("{}: {:#}", "Error".red(), e);
        std::process::exit(1);
    }

    Ok(())
}
