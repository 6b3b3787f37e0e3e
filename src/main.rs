//! Converge CLI entrypoint.
//!
//! This is the main entrypoint for the converge command-line tool.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use converge::cli::{Cli, Commands, OutputFormatter, StateCommands};
use converge::config::{find_config_file, ConfigParser, ConfigValidator, ModelConfig, StateBackend};
use converge::engine::{Engine, EngineOptions};
use converge::error::{ConfigError, ConvergeError, Result};
use converge::graph::DependencyGraph;
use converge::model::{ReferenceResolver, ResourceKey, ResourceModel};
use converge::planner::{CancellationFlag, FailurePolicy, PlanMode, PlanOptions};
use converge::provider::ProviderRegistry;
use converge::state::{LocalStateStore, MemoryStateStore, StateStore, STATE_DIR};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Everything a command needs once the configuration is loaded.
struct Context {
    config: ModelConfig,
    model: ResourceModel,
    engine: Engine,
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_deref();

    let cancellation = CancellationFlag::new();
    spawn_interrupt_handler(cancellation.clone());

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Plan {
            destroy,
            replace,
            detailed,
        } => cmd_plan(config_path, destroy, &replace, detailed, &formatter).await,
        Commands::Apply {
            yes,
            parallelism,
            continue_on_error,
            replace,
        } => {
            let ctx = load_context(config_path, cancellation)?;
            let mut options = ctx.engine_options();
            if let Some(n) = parallelism {
                options.parallelism = n.max(1);
            }
            if continue_on_error {
                options.failure_policy = FailurePolicy::Continue;
            }
            let plan_options = PlanOptions {
                mode: PlanMode::Normal,
                replace: parse_keys(&replace)?,
            };
            cmd_apply(ctx, options, &plan_options, yes, &formatter).await
        }
        Commands::Destroy { yes } => {
            let ctx = load_context(config_path, cancellation)?;
            let options = ctx.engine_options();
            let plan_options = PlanOptions {
                mode: PlanMode::Destroy,
                replace: BTreeSet::new(),
            };
            cmd_apply(ctx, options, &plan_options, yes, &formatter).await
        }
        Commands::Refresh => cmd_refresh(config_path, &formatter).await,
        Commands::Graph => cmd_graph(config_path, &formatter),
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Stops dispatch on the first Ctrl-C. Running provider calls finish.
fn spawn_interrupt_handler(cancellation: CancellationFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight operations");
            cancellation.cancel();
        }
    });
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<ExitCode> {
    info!("Initializing new converge project in: {}", path.display());

    let config_path = path.join("converge.yaml");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(ExitCode::FAILURE);
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    let config_template = include_str!("../templates/converge.yaml");
    std::fs::write(&config_path, config_template)?;
    eprintln!("Created: {}", config_path.display());

    let state_ignore = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_ignore.as_str()]
            .into_iter()
            .filter(|line| !existing.lines().any(|l| l.trim() == *line))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# converge")?;
            for line in missing {
                writeln!(file, "{line}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_ignore}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit converge.yaml to declare your resources");
    eprintln!("  2. Run 'converge validate' to check the configuration");
    eprintln!("  3. Run 'converge plan' to preview the changes");
    eprintln!("  4. Run 'converge apply' to converge");

    Ok(ExitCode::SUCCESS)
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&Path>, show_warnings: bool, formatter: &OutputFormatter) -> Result<ExitCode> {
    let config_file = resolve_config_path(config_path)?;
    let base_dir = base_dir_of(&config_file);
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let registry = ProviderRegistry::with_builtins(&base_dir);
    let validator = ConfigValidator::new().with_known_types(registry.types());
    let result = validator.check(&config);

    if !result.is_valid() {
        for error in &result.errors {
            eprintln!("  - {error}");
        }
        return Err(ConvergeError::Config(ConfigError::ValidationError {
            message: format!("{} error(s) found", result.error_count()),
            field: None,
        }));
    }

    // Conversion catches what field checks cannot, e.g. dangling references
    let model = config.to_model()?;
    ReferenceResolver::new().resolve(&model)?;

    emit(&formatter.format_validation(&config, &result, show_warnings))?;
    Ok(ExitCode::SUCCESS)
}

/// Show the plan.
async fn cmd_plan(
    config_path: Option<&Path>,
    destroy: bool,
    replace: &[String],
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let ctx = load_context(config_path, CancellationFlag::new())?;
    let options = PlanOptions {
        mode: if destroy { PlanMode::Destroy } else { PlanMode::Normal },
        replace: parse_keys(replace)?,
    };

    let plan = ctx.engine.plan(&ctx.model, &options).await?;
    emit(&formatter.format_plan(&plan, detailed))?;
    Ok(ExitCode::SUCCESS)
}

/// Plan, confirm and apply. Also backs `destroy`.
async fn cmd_apply(
    ctx: Context,
    options: EngineOptions,
    plan_options: &PlanOptions,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let Context { model, engine, .. } = ctx;
    let engine = engine.with_options(options);

    let plan = engine.plan(&model, plan_options).await?;
    if plan.is_converged() {
        emit(&formatter.format_plan(&plan, false))?;
        return Ok(ExitCode::SUCCESS);
    }

    if !auto_approve {
        eprintln!("{}", formatter_text_plan(&plan));
        let destroying = plan_options.mode == PlanMode::Destroy;
        let confirmed = if destroying {
            confirm("This action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")?
        } else {
            confirm("Do you want to apply this plan? [y/N]: ", "y")?
        };
        if !confirmed {
            eprintln!("Apply cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let report = engine.apply_plan(&plan, &model).await?;
    emit(&formatter.format_apply(&report))?;

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Refresh state from the providers.
async fn cmd_refresh(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let ctx = load_context(config_path, CancellationFlag::new())?;
    let report = ctx.engine.refresh().await?;
    emit(&formatter.format_refresh(&report))?;

    Ok(if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Show the dependency graph of the model.
fn cmd_graph(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let config_file = resolve_config_path(config_path)?;
    let config = ConfigParser::new().load_file(&config_file)?;
    let model = config.to_model()?;

    let dependencies = ReferenceResolver::new().resolve(&model)?;
    let graph = DependencyGraph::build(
        model.iter().map(|r| r.key.clone()),
        dependencies.edges().map(|(dependent, dependency)| (dependent.clone(), dependency)),
    )?;
    let layers = graph.layers()?;

    emit(&formatter.format_graph(&layers, &dependencies))?;
    Ok(ExitCode::SUCCESS)
}

/// State management commands.
async fn cmd_state(config_path: Option<&Path>, command: StateCommands, formatter: &OutputFormatter) -> Result<ExitCode> {
    let ctx = load_context(config_path, CancellationFlag::new())?;

    match command {
        StateCommands::List => {
            let snapshot = ctx.engine.snapshot().await?;
            emit(&formatter.format_state_list(&snapshot))?;
        }
        StateCommands::Show { key } => {
            let key: ResourceKey = key.parse()?;
            match ctx.engine.store().get(&key).await? {
                Some(entry) => emit(&formatter.format_state_entry(&key, &entry))?,
                None => {
                    eprintln!("{key} is not in state.");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        StateCommands::Rm { key } => {
            let key: ResourceKey = key.parse()?;
            if ctx.engine.forget(&key).await? {
                emit(&formatter.message(&format!("Removed {key} from state. The remote object was not touched.")))?;
            } else {
                eprintln!("{key} is not in state.");
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.to_path_buf()))
}

fn base_dir_of(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Loads configuration, builds the model and wires up the engine.
fn load_context(config_path: Option<&Path>, cancellation: CancellationFlag) -> Result<Context> {
    let config_file = resolve_config_path(config_path)?;
    let base_dir = base_dir_of(&config_file);
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let registry = ProviderRegistry::with_builtins(&base_dir);
    ConfigValidator::new()
        .with_known_types(registry.types())
        .validate(&config)?;
    let model = config.to_model()?;

    let store: Arc<dyn StateStore> = match config.state.backend {
        StateBackend::Local => match &config.state.path {
            Some(path) => Arc::new(LocalStateStore::with_state_path(base_dir.join(path))),
            None => Arc::new(LocalStateStore::with_base_dir(base_dir.join(STATE_DIR))),
        },
        StateBackend::Memory => Arc::new(MemoryStateStore::new()),
    };
    debug!("Using {} state backend", store.backend_type());

    let options = engine_options(&config);
    let engine = Engine::new(registry, store)
        .with_options(options)
        .with_cancellation(cancellation);
    Ok(Context { config, model, engine })
}

fn engine_options(config: &ModelConfig) -> EngineOptions {
    EngineOptions {
        parallelism: config.execution.parallelism.max(1),
        failure_policy: config.execution.failure_policy(),
    }
}

impl Context {
    fn engine_options(&self) -> EngineOptions {
        engine_options(&self.config)
    }
}

fn parse_keys(keys: &[String]) -> Result<BTreeSet<ResourceKey>> {
    keys.iter()
        .map(|k| k.parse::<ResourceKey>().map_err(ConvergeError::from))
        .collect()
}

/// The plan shown before a confirmation prompt is always text.
fn formatter_text_plan(plan: &converge::planner::Plan) -> String {
    OutputFormatter::new(converge::cli::OutputFormat::Text).format_plan(plan, false)
}

fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
