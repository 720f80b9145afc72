//! analysis-cli: 产品图片分析、历史查询与结果查看的命令行工具
//!
//! Usage:
//!   analysis-cli analyze <image>... [--variant v] [--param k=v] [--session s] [--lang l]
//!   analysis-cli history <session> [--limit n]
//!   analysis-cli show <id>

use ai_analysis_core::cache::FastCacheClient;
#[cfg(not(feature = "redis"))]
use ai_analysis_core::cache::MemoryCache;
use ai_analysis_core::config_cache::{ConfigCache, ConfigSource, PromptRegistry};
use ai_analysis_core::orchestrator::AnalysisOrchestrator;
use ai_analysis_core::provider::OpenAiProvider;
use ai_analysis_core::resilience::CircuitBreaker;
use ai_analysis_core::store::{AnalysisStore, MemoryAnalysisStore};
use ai_analysis_core::telemetry::{InMemoryMetricsSink, MetricsSink};
use ai_analysis_core::types::{
    AnalysisParams, AnalysisVariant, ContentItem, PARAM_DIETARY_PREFERENCES,
    PARAM_HEALTH_CONDITIONS,
};
use ai_analysis_core::Settings;
use anyhow::{bail, Context};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "analyze" => cmd_analyze(&args[2..]).await,
        "history" => cmd_history(&args[2..]).await,
        "show" => cmd_show(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("analysis-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"analysis-cli: 产品分析命令行工具

USAGE:
    analysis-cli <COMMAND> [OPTIONS]

COMMANDS:
    analyze <image>...          Analyze product images (upload order matters)
        --variant <v>           complete | nutrition | ingredients
        --param <k=v>           Personalization entry, repeatable
        --session <s>           Session reference
        --lang <l>              Content language (es, en)
    history <session>           List recent analyses [--limit n]
    show <id>                   Print a stored analysis
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    OPEN_AI_KEY, OPENAI_MODEL, REDIS_URL, REDIS_ENABLED, DATABASE_URL,
    PROMPT_LANGUAGE, RUST_LOG"#
    );
}

struct Backends {
    store: Arc<dyn AnalysisStore>,
    prompts: Arc<dyn ConfigSource>,
    metrics: Arc<dyn MetricsSink>,
}

#[cfg(feature = "postgres")]
async fn backends(settings: &Settings) -> anyhow::Result<Backends> {
    use ai_analysis_core::store::postgres::{
        connect, ensure_schema, PgAnalysisStore, PgMetricsSink, PgPromptStore,
    };
    let Some(url) = settings.store.database_url.as_deref() else {
        return Ok(memory_backends());
    };
    let pool = connect(url, settings.store_timeout())
        .await
        .context("connecting to the database")?;
    ensure_schema(&pool).await.context("preparing the schema")?;
    Ok(Backends {
        store: Arc::new(PgAnalysisStore::new(pool.clone())),
        prompts: Arc::new(PgPromptStore::new(pool.clone())),
        metrics: Arc::new(PgMetricsSink::new(pool)),
    })
}

#[cfg(not(feature = "postgres"))]
async fn backends(settings: &Settings) -> anyhow::Result<Backends> {
    if settings.store.database_url.is_some() {
        tracing::warn!("DATABASE_URL set but built without the postgres feature; using memory store");
    }
    Ok(memory_backends())
}

fn memory_backends() -> Backends {
    Backends {
        store: Arc::new(MemoryAnalysisStore::new()),
        prompts: Arc::new(PromptRegistry::new()),
        metrics: Arc::new(InMemoryMetricsSink::default()),
    }
}

async fn fast_cache(settings: &Settings) -> FastCacheClient {
    let breaker = Arc::new(CircuitBreaker::new(settings.circuit_breaker.clone()));
    let config = settings.fast_cache_config();
    if !config.enabled {
        return FastCacheClient::disabled();
    }
    #[cfg(feature = "redis")]
    {
        match ai_analysis_core::cache::RedisCache::connect(&settings.fast_cache.url).await {
            Ok(redis) => return FastCacheClient::new(config, Arc::new(redis), breaker),
            Err(e) => tracing::warn!(error = %e, "fast cache unavailable, continuing without it"),
        }
        FastCacheClient::disabled()
    }
    #[cfg(not(feature = "redis"))]
    {
        FastCacheClient::new(config, Arc::new(MemoryCache::default()), breaker)
    }
}

async fn orchestrator(settings: &Settings) -> anyhow::Result<AnalysisOrchestrator> {
    let backends = backends(settings).await?;
    let provider = OpenAiProvider::new(settings.openai_config())?;
    let config_cache = ConfigCache::new(backends.prompts, settings.config_ttl())
        .with_fetch_timeout(settings.store_timeout());
    Ok(AnalysisOrchestrator::builder()
        .settings(settings)
        .store(backends.store)
        .provider(Arc::new(provider))
        .fast_cache(Arc::new(fast_cache(settings).await))
        .config_cache(Arc::new(config_cache))
        .metrics_sink(backends.metrics)
        .build()?)
}

fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .with_context(|| format!("{flag} expects a value"))
}

fn parse_params(args: &[String]) -> anyhow::Result<(Vec<String>, AnalysisParams, Option<String>)> {
    let mut images = Vec::new();
    let mut params = AnalysisParams::default();
    let mut session = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--variant" => {
                let v = flag_value(args, &mut i, "--variant")?;
                params.variant = v.parse::<AnalysisVariant>()?;
            }
            "--session" => session = Some(flag_value(args, &mut i, "--session")?.to_string()),
            "--lang" => params = params.with_language(flag_value(args, &mut i, "--lang")?),
            "--param" => {
                let kv = flag_value(args, &mut i, "--param")?;
                let (k, v) = kv
                    .split_once('=')
                    .with_context(|| format!("--param expects key=value, got '{kv}'"))?;
                params = match k {
                    PARAM_DIETARY_PREFERENCES | PARAM_HEALTH_CONDITIONS => {
                        params.with_list(k, v.split(',').map(str::trim).filter(|s| !s.is_empty()))
                    }
                    _ => params.with(k, serde_json::from_str::<Value>(v).unwrap_or_else(|_| Value::from(v))),
                };
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            path => images.push(path.to_string()),
        }
        i += 1;
    }
    Ok((images, params, session))
}

async fn cmd_analyze(args: &[String]) -> anyhow::Result<()> {
    let (paths, params, session) = parse_params(args)?;
    if paths.is_empty() {
        bail!("analyze needs at least one image path");
    }
    let items = paths
        .iter()
        .map(|p| ContentItem::from_file(p).with_context(|| format!("reading {p}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let settings = Settings::from_env();
    let orchestrator = orchestrator(&settings).await?;
    let result = orchestrator
        .analyze_or_get_cached(&items, &params, session.as_deref())
        .await?;
    orchestrator.write_through().idle().await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_history(args: &[String]) -> anyhow::Result<()> {
    let Some(session) = args.first() else {
        bail!("history needs a session reference");
    };
    let mut limit = 20usize;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => limit = flag_value(args, &mut i, "--limit")?.parse().context("--limit")?,
            other => bail!("unknown option {other}"),
        }
        i += 1;
    }
    let settings = Settings::from_env();
    let history = orchestrator(&settings).await?.get_history(session, limit).await?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}

async fn cmd_show(args: &[String]) -> anyhow::Result<()> {
    let Some(id) = args.first() else {
        bail!("show needs an analysis id");
    };
    let settings = Settings::from_env();
    match orchestrator(&settings).await?.get_by_id(id).await? {
        Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        None => {
            eprintln!("analysis {id} not found");
            std::process::exit(2);
        }
    }
    Ok(())
}
