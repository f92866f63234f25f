use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use windowgate::config::{LoggingConfig, WindowGateConfig};
use windowgate::ratelimit::{LimitRules, RedisStore, WindowRateLimiter, DEFAULT_CLIENT};
use windowgate::WindowGateError;

/// Exit status for a denied hit, distinct from infrastructure failures (1).
const EXIT_RATE_LIMITED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "windowgate", version, about = "Fixed-window rate limiter over Redis")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Redis URL, overriding the configured one
    #[arg(long, global = true)]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count one hit and report whether it was admitted
    Acquire(QuotaArgs),
    /// Show the current window without counting a hit
    Status(QuotaArgs),
}

#[derive(Args, Debug)]
struct QuotaArgs {
    /// Resource being protected
    #[arg(short, long)]
    resource: String,

    /// Principal being limited
    #[arg(long, default_value = DEFAULT_CLIENT)]
    client: String,

    /// Hits allowed per window (taken from the rules file when omitted)
    #[arg(short, long)]
    max_requests: Option<u64>,

    /// Window length in seconds (taken from the rules file when omitted)
    #[arg(short = 'w', long)]
    time_window: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = WindowGateConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.redis_url {
        config.store.url = url;
    }

    init_tracing(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting windowgate");

    let store = Arc::new(RedisStore::connect(&config.store.url).await?);
    info!(url = %config.store.url, "Connected to counter store");

    match cli.command {
        Command::Acquire(args) => {
            let limiter = build_limiter(&config, store, &args)?;
            match limiter.try_acquire().await {
                Ok(permit) => {
                    println!(
                        "{}",
                        json!({
                            "key": limiter.store_key(),
                            "admitted": true,
                            "count": permit.count(),
                            "limit": permit.limit(),
                            "remaining": permit.remaining(),
                        })
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(WindowGateError::TooManyRequests { count, limit, .. }) => {
                    warn!(key = %limiter.store_key(), "Rate limited");
                    println!(
                        "{}",
                        json!({
                            "key": limiter.store_key(),
                            "admitted": false,
                            "count": count,
                            "limit": limit,
                            "remaining": 0,
                        })
                    );
                    Ok(ExitCode::from(EXIT_RATE_LIMITED))
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Status(args) => {
            let limiter = build_limiter(&config, store, &args)?;
            let usage = limiter.usage().await?;
            let remaining = limiter.remaining().await?;
            let reset_after = limiter.reset_after().await?;
            println!(
                "{}",
                json!({
                    "key": limiter.store_key(),
                    "count": usage,
                    "limit": limiter.max_requests(),
                    "remaining": remaining,
                    "reset_after_ms": reset_after.map(|d| d.as_millis() as u64),
                })
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Build a limiter from explicit quota flags, falling back to the rules file.
fn build_limiter(
    config: &WindowGateConfig,
    store: Arc<RedisStore>,
    args: &QuotaArgs,
) -> anyhow::Result<WindowRateLimiter<RedisStore>> {
    if let (Some(max_requests), Some(time_window)) = (args.max_requests, args.time_window) {
        return Ok(WindowRateLimiter::new(
            store,
            &args.resource,
            &args.client,
            max_requests,
            time_window,
        )?);
    }

    let path = config.rules_path.as_deref().ok_or_else(|| {
        anyhow::anyhow!("--max-requests and --time-window are required without a rules file")
    })?;
    let rules = LimitRules::from_file(path)?;
    Ok(rules.limiter_for(store, &args.resource, &args.client)?)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Logs go to stderr so stdout carries only the JSON decision
    if logging.json {
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
