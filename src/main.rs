//! Cairn CLI entrypoint.
//!
//! This is the main entrypoint for the cairn command-line tool.
//!
//! Exit codes: 0 when every resource is applied or unchanged, 1 when any
//! resource failed or was not attempted, 2 when the run could not start or
//! its state could not be saved.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cairn::cli::{Cli, Commands, OutputFormatter, StateCommands};
use cairn::config::{ConfigParser, ConfigValidator, DEFAULT_STATE_DIR, DeployConfig, find_config_file};
use cairn::deployment::Deployment;
use cairn::error::Result;
use cairn::provider::ProviderRegistry;
use cairn::state::{StateStore, open_store};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for runs that could not complete at all.
const EXIT_FATAL: u8 = 2;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Initializes the logging system.
///
/// `CAIRN_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_env("CAIRN_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<u8> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Preview { detailed } => cmd_preview(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply { yes } => cmd_apply(cli.config.as_ref(), yes, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(cli.config.as_ref(), yes, &formatter).await,
        Commands::Outputs => cmd_outputs(cli.config.as_ref(), &formatter).await,
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<u8> {
    info!("Initializing new Cairn project in: {}", path.display());

    let config_path = path.join("cairn.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(EXIT_FATAL);
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/cairn.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    // Write/update .gitignore
    let state_entry = format!("{DEFAULT_STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_entry.as_str()]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# Cairn")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit cairn.yaml with your resources");
    eprintln!("  2. Run 'cairn validate' to check your configuration");
    eprintln!("  3. Run 'cairn preview' to see what will change");
    eprintln!("  4. Run 'cairn apply' to apply the changes");

    Ok(0)
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<u8> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let (config, base) = load_config(&config_file)?;
    let registry = ProviderRegistry::with_builtins(config.bucket_root(&base));
    let result = ConfigValidator::with_known_types(registry.types()).check(&config);

    println!("{}", formatter.format_validation(&result, show_warnings));

    if !formatter.is_json() && result.is_valid() {
        eprintln!("Configuration summary:");
        eprintln!("  Project: {}", config.project.name);
        eprintln!("  Environment: {}", config.project.environment);
        eprintln!("  Resources: {}", config.resources.len());
        eprintln!("  Outputs: {}", config.outputs.len());
    }

    Ok(if result.is_valid() { 0 } else { EXIT_FATAL })
}

/// Show the change plan.
async fn cmd_preview(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<u8> {
    let workspace = Workspace::load(config_path)?;
    let plan = workspace.deployment().preview().await?;

    println!("{}", formatter.format_plan(&plan, detailed));
    Ok(0)
}

/// Apply the change plan.
async fn cmd_apply(config_path: Option<&PathBuf>, auto_approve: bool, formatter: &OutputFormatter) -> Result<u8> {
    let workspace = Workspace::load(config_path)?;
    let deployment = workspace.deployment();

    let plan = deployment.preview().await?;
    println!("{}", formatter.format_plan(&plan, false));

    if plan.has_changes() && !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(0);
    }

    let summary = deployment.apply_plan(&plan, &cancel_on_interrupt()).await?;
    println!("{}", formatter.format_summary(&summary));

    Ok(exit_code(summary.exit_code()))
}

/// Destroy every recorded resource.
async fn cmd_destroy(config_path: Option<&PathBuf>, auto_approve: bool, formatter: &OutputFormatter) -> Result<u8> {
    let workspace = Workspace::load(config_path)?;
    let deployment = workspace.deployment();

    let plan = deployment.preview_destroy().await?;
    if !plan.has_changes() {
        eprintln!("No resources to destroy.");
        return Ok(0);
    }

    eprintln!("The following resources will be destroyed:");
    for entry in plan.changes() {
        eprintln!("  - {} ({})", entry.name, entry.resource_type);
    }

    if !auto_approve && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")? {
        eprintln!("Destruction cancelled.");
        return Ok(0);
    }

    let summary = deployment.destroy_plan(&plan, &cancel_on_interrupt()).await?;
    println!("{}", formatter.format_summary(&summary));

    Ok(exit_code(summary.exit_code()))
}

/// Show stack outputs.
async fn cmd_outputs(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<u8> {
    let workspace = Workspace::load(config_path)?;
    let outputs = workspace.deployment().outputs().await?;

    print!("{}", formatter.format_outputs(&outputs));
    Ok(0)
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<u8> {
    let workspace = Workspace::load(config_path)?;
    let deployment = workspace.deployment();

    match command {
        StateCommands::Show => {
            let state = deployment.state().await?;
            if state.is_empty() && state.history.is_empty() {
                eprintln!("No state found.");
            } else {
                println!("{}", formatter.format_state(&state));
            }
            if let Some(lock) = deployment.lock_info().await? {
                eprintln!(
                    "Locked by {} since {} (lock {})",
                    lock.holder, lock.acquired_at, lock.lock_id
                );
            }
        }
        StateCommands::History { limit } => {
            let state = deployment.state().await?;
            print!("{}", formatter.format_history(&state, limit));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                deployment.force_unlock().await?;
                eprintln!("State forcefully unlocked.");
            } else if let Some(id) = lock_id {
                workspace.store.release_lock(&deployment.id(), &id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
                return Ok(EXIT_FATAL);
            }
        }
    }

    Ok(0)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Configuration, state store and providers of one project.
struct Workspace {
    config: DeployConfig,
    store: Box<dyn StateStore>,
    registry: ProviderRegistry,
}

impl Workspace {
    /// Loads and validates the configuration and opens its state store.
    fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let config_file = resolve_config_path(config_path)?;
        let (config, base) = load_config(&config_file)?;

        let registry = ProviderRegistry::with_builtins(config.bucket_root(&base));
        let validation = ConfigValidator::with_known_types(registry.types()).validate(&config)?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }

        let store = open_store(&config, &base);
        debug!("Using {} state backend", store.backend_type());

        Ok(Self {
            config,
            store,
            registry,
        })
    }

    fn deployment(&self) -> Deployment<'_, dyn StateStore> {
        Deployment::new(&self.config, self.store.as_ref(), &self.registry)
    }
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.clone()),
        None => find_config_file(std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
    }
}

/// Loads `.env` and the configuration; returns it with its directory.
fn load_config(config_file: &Path) -> Result<(DeployConfig, PathBuf)> {
    debug!("Loading configuration from: {}", config_file.display());

    let base = config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let parser = ConfigParser::new().with_base_path(&base);
    parser.load_dotenv()?;

    let config = parser.load_with_env(config_file)?;
    Ok((config, base))
}

/// Cancels the returned token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; waiting for in-flight operations to finish");
            trigger.cancel();
        }
    });
    token
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case(expected))
}

fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_FATAL)
}
