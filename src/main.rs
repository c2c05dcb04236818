//! hostpulse agent
//!
//! Loads the agent configuration, registers the enabled collectors under the
//! `<host_group>.<host_sign>` namespace and runs them until interrupted.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        hostpulse agent                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐            │
//! │  │   system   │   │    proc    │   │   nginx    │ collectors │
//! │  └─────┬──────┘   └─────┬──────┘   └─────┬──────┘            │
//! │        └────────────────┼────────────────┘                   │
//! │                         ▼                                     │
//! │              group.sign.* registry ───▶ log reporter          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hostpulse::collector::{Collector, CollectorManager, ManagerConfig};
use hostpulse::config::AgentConfig;
use hostpulse::context::MetricsContext;
use hostpulse::error::Result;
use hostpulse::metrics::global_registry;
use hostpulse::report::LogReporter;
use hostpulse::shutdown::ShutdownSignal;
use hostpulse::sources::{NginxCollector, ProcessCollector, SystemCollector};

// =============================================================================
// CLI Arguments
// =============================================================================

/// hostpulse - host metrics collection agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to /etc/hostpulse/agent.toml, then ./conf/agent.toml)
    #[arg(long, env = "HOSTPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match AgentConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    init_logging(&args, &config);

    info!("Starting hostpulse agent {}", hostpulse::version());
    info!("  Agent name: {}", config.agent_name);
    info!("  Namespace: {}", config.registry_prefix());
    info!("  Collect interval: {}s", config.collect_seconds);

    let ctx = MetricsContext::new(global_registry()).scoped(&config.registry_prefix());

    let mut manager = CollectorManager::new(
        ManagerConfig::from_seconds(config.collect_seconds),
        Arc::clone(ctx.registry()),
    );
    let mut shutdown = ShutdownSignal::install()?;

    manager.register_collectors(build_collectors(&config, &ctx)?);
    manager.start()?;

    let reporter_cancel = CancellationToken::new();
    let reporter = if config.report.enable {
        let reporter = LogReporter::new(Arc::clone(ctx.registry()), config.report_interval());
        Some(tokio::spawn(reporter.run(reporter_cancel.clone())))
    } else {
        None
    };

    shutdown.recv().await;

    reporter_cancel.cancel();
    if let Some(task) = reporter {
        if let Err(e) = task.await {
            error!("Log reporter failed: {}", e);
        }
    }

    manager.stop().wait().await?;

    info!("Agent shutdown complete");
    Ok(())
}

fn build_collectors(config: &AgentConfig, ctx: &MetricsContext) -> Result<Vec<Arc<dyn Collector>>> {
    let mut collectors: Vec<Arc<dyn Collector>> = vec![Arc::new(SystemCollector::new(
        config.collector.system.clone(),
        ctx,
    ))];

    if config.collector.nginx.enable {
        info!("  nginx status: {}", config.collector.nginx.url);
        collectors.push(Arc::new(NginxCollector::new(&config.collector.nginx, ctx)?));
    }
    if config.collector.proc.enable {
        collectors.push(Arc::new(ProcessCollector::new(&config.collector.proc, ctx)));
    }

    Ok(collectors)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args, config: &AgentConfig) {
    let requested = args
        .log_level
        .as_deref()
        .filter(|_| !config.debug)
        .unwrap_or_else(|| config.log_level());

    let level = match requested.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json || config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
