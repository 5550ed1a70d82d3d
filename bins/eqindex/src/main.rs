//! eqindex CLI binary
//!
//! Entry point for the equal-weight index. Provides commands to initialize
//! and validate configuration, import data, build the index and query it.

mod output;

use anyhow::{Context, Result};
use cache::{CacheBackend, CacheManager, MemoryCacheBackend};
use chrono::NaiveDate;
use cli::{Cli, Commands};
use common::{DailyObservation, Stock};
use config::{
    generate_default_config, load_config, save_config, validate_config, CacheType, MasterConfig,
    StorageType,
};
use index_engine::{CancellationToken, EngineSettings, IndexService};
use observability::{init_logging, init_metrics, LogFormat};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use storage::{InMemoryIndexStore, IndexStore};
use tracing::{debug, error, info, warn};

/// Input of the `import` command
#[derive(Debug, Default, Deserialize)]
struct ImportDocument {
    #[serde(default)]
    stocks: Vec<Stock>,
    #[serde(default)]
    observations: Vec<DailyObservation>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    if let Commands::Init { output } = &cli.command {
        init_logging("eqindex", log_format(cli.log_format.as_deref(), None)?)?;
        return init_command(output);
    }

    let config = load_config(&cli.config)?;
    init_logging("eqindex", log_format(cli.log_format.as_deref(), Some(&config))?)?;
    debug!(?cli, "CLI arguments parsed");

    if let Commands::Validate = &cli.command {
        return validate_command(&config, &cli.config);
    }

    check_config(&config)?;
    if let Some(port) = config.logging.metrics_port {
        init_metrics(port)?;
    }

    let settings = EngineSettings::from_config(&config);
    let store = open_store(&config).await?;
    let cache_required = matches!(cli.command, Commands::Build { .. });
    let cache = open_cache(&config, settings.operation_timeout, cache_required).await?;
    let service = IndexService::new(store, cache, settings);

    if let Some(path) = &cli.data {
        import_command(&service, path).await?;
    }

    match cli.command {
        Commands::Import { file } => import_command(&service, &file).await,
        Commands::Build { range, output } => {
            let (start, end) = range.bounds();
            build_command(&service, start, end, output).await
        }
        Commands::Composition { date, output } => {
            let views = service.get_composition(date).await?;
            output::composition(&views, output)
        }
        Commands::Changes {
            range,
            summary,
            output,
        } => {
            let (start, end) = range.bounds();
            if summary {
                let summary = service.get_composition_change_summary(start, end).await?;
                output::change_summary(&summary, output)
            } else {
                let changes = service.get_composition_changes(start, end).await?;
                output::changes(&changes, output)
            }
        }
        Commands::Performance { range, output } => {
            let (start, end) = range.bounds();
            let summary = service.get_performance_summary(start, end).await?;
            output::performance(&summary, output)
        }
        Commands::Init { .. } | Commands::Validate => Ok(()),
    }
}

/// `--log-format` wins over the configured format
fn log_format(flag: Option<&str>, config: Option<&MasterConfig>) -> Result<LogFormat> {
    match flag.or(config.map(|c| c.logging.format.as_str())) {
        Some(name) => name
            .parse::<LogFormat>()
            .map_err(|e| anyhow::anyhow!(e)),
        None => Ok(LogFormat::default()),
    }
}

/// Refuse to run with configuration errors
fn check_config(config: &MasterConfig) -> Result<()> {
    let report = validate_config(config);

    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }

    if !report.is_valid() {
        error!(error_count = report.errors.len(), "Configuration validation failed");
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot run due to configuration errors");
    }

    Ok(())
}

async fn open_store(config: &MasterConfig) -> Result<Arc<dyn IndexStore>> {
    match config.storage.storage_type {
        StorageType::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(InMemoryIndexStore::new()))
        }
        StorageType::Postgres => open_postgres(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &MasterConfig) -> Result<Arc<dyn IndexStore>> {
    let pg = config
        .storage
        .postgres
        .as_ref()
        .context("storage.type is postgres but storage.postgres is missing")?;

    let store = storage::PostgresIndexStore::connect(pg)
        .await
        .context("Failed to open the index datastore")?;
    store
        .run_migrations()
        .await
        .context("Failed to prepare the index datastore")?;

    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &MasterConfig) -> Result<Arc<dyn IndexStore>> {
    anyhow::bail!("storage.type is postgres but eqindex was built without the `postgres` feature")
}

/// Open the configured cache.
///
/// Queries fall back to an uncached manager when the cache cannot be reached.
/// A build must be able to evict what it supersedes, so it fails instead.
async fn open_cache(
    config: &MasterConfig,
    op_timeout: Duration,
    required: bool,
) -> Result<Arc<CacheManager>> {
    if !config.cache.enabled {
        info!("Query cache disabled");
        return Ok(Arc::new(CacheManager::disabled()));
    }

    let backend: Arc<dyn CacheBackend> = match config.cache.cache_type {
        CacheType::Memory => {
            let max_entries = usize::try_from(config.cache.max_entries).unwrap_or(usize::MAX);
            Arc::new(MemoryCacheBackend::new(max_entries))
        }
        CacheType::Redis => match open_redis(config).await {
            Ok(backend) => backend,
            Err(e) if !required => {
                warn!(error = %e, "Cache unreachable, serving queries from the datastore");
                return Ok(Arc::new(CacheManager::disabled()));
            }
            Err(e) => return Err(e),
        },
    };

    let manager = CacheManager::new(backend, &config.cache, op_timeout);
    if let Err(e) = manager.ping().await {
        if required {
            return Err(e).context("Cache did not answer ping");
        }
        warn!(error = %e, "Cache ping failed; lookups bypass it while it is down");
    }

    Ok(Arc::new(manager))
}

#[cfg(feature = "redis")]
async fn open_redis(config: &MasterConfig) -> Result<Arc<dyn CacheBackend>> {
    let redis = config
        .cache
        .redis
        .as_ref()
        .context("cache.type is redis but cache.redis is missing")?;

    let backend = cache::RedisCacheBackend::connect(redis, &config.cache.key_prefix)
        .await
        .context("Failed to connect to the query cache")?;

    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(_config: &MasterConfig) -> Result<Arc<dyn CacheBackend>> {
    anyhow::bail!("cache.type is redis but eqindex was built without the `redis` feature")
}

// =============================================================================
// Commands
// =============================================================================

async fn build_command(
    service: &IndexService,
    start: NaiveDate,
    end: NaiveDate,
    format: cli::OutputFormat,
) -> Result<()> {
    let cancel = CancellationToken::new();

    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current date");
            on_interrupt.cancel();
        }
    });

    let result = service.build_index_with_cancel(start, end, cancel).await?;
    output::build_result(&result, format)?;

    if let Some(failure) = result.first_failure() {
        anyhow::bail!(
            "Build stopped at {} ({} failure): {}",
            failure.date,
            failure.kind,
            failure.message
        );
    }
    if result.cancelled {
        anyhow::bail!("Build cancelled");
    }

    Ok(())
}

async fn import_command(service: &IndexService, path: &Path) -> Result<()> {
    info!(?path, "Importing data");

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {:?}", path))?;
    let document: ImportDocument = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file: {:?}", path))?;

    let (stocks, observations) = service
        .import(&document.stocks, &document.observations)
        .await?;

    info!(stocks, observations, "Import complete");
    Ok(())
}

fn validate_command(config: &MasterConfig, path: &Path) -> Result<()> {
    info!(?path, "Validating configuration");

    let report = validate_config(config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Index: {}", config.index.name);
    println!("Constituents: {}", config.index.constituents);
    println!("Calendar: {:?}", config.index.calendar);
    println!("Storage: {:?}", config.storage.storage_type);
    if config.cache.enabled {
        println!(
            "Cache: {:?} (ttl {}s)",
            config.cache.cache_type, config.cache.ttl_seconds
        );
    } else {
        println!("Cache: disabled");
    }

    Ok(())
}

fn init_command(output_path: &Path) -> Result<()> {
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();
    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("Next steps:");
    println!("  1. Switch storage to postgres and cache to redis for durable runs");
    println!("  2. Set the environment variables the file references");
    println!(
        "  3. Run 'eqindex validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  4. Run 'eqindex build --config {:?} --start <date> --end <date>'",
        output_path
    );

    Ok(())
}
