use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use audit_watcher::fetcher::build_client;
use audit_watcher::{
    interval, status, Credentials, FetchConfig, ManagementClient, MessageProducer, PollCycle,
    RuleTable, TokenProvider, WatcherConfig, WatcherError, WebhookNotifier,
};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audit-watcher")]
#[command(version)]
#[command(about = "Watches an organization's audit trail and posts a summary of administrative changes to a webhook")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config/config.json")]
    config: PathBuf,

    /// Port for the status endpoint
    #[arg(short, long, env = "PORT", default_value_t = 5950)]
    port: u16,

    /// Log filter, e.g. `info` or `audit_watcher=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(WatcherError::Auth(auth)) = e.downcast_ref::<WatcherError>() {
                error!("{}; exiting", auth);
                return ExitCode::from(auth.exit_code() as u8);
            }
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("audit watcher version {}", env!("CARGO_PKG_VERSION"));

    let config = WatcherConfig::load(&cli.config)
        .with_context(|| format!("cannot load {}", cli.config.display()))?;
    let table = RuleTable::for_organization(&config.organization)?;
    info!("{} classification rules for org {}", table.len(), config.organization);

    let timezone = config.timezone();
    info!("alert timestamps in {}", timezone);

    let sleep = config.sleep_duration();
    match &config.sleep_time {
        Some(token) => info!("sleep time is {}", interval::phrase(token)),
        None => info!("defaulting to sleep time of {}", interval::duration_phrase(sleep)),
    }

    let fetch_config = FetchConfig::default();
    let http = build_client(&fetch_config)?;

    let api_host = url::Url::parse(&config.api_base)?
        .host_str()
        .unwrap_or_default()
        .to_string();
    let credentials = Credentials::resolve(config.auth.as_ref(), &api_host)?;
    let tokens = Arc::new(TokenProvider::new(
        http.clone(),
        &config.login_base,
        credentials,
        fetch_config.token_grace_seconds,
    ));
    let management = Arc::new(ManagementClient::new(
        http.clone(),
        &config.api_base,
        &config.organization,
        tokens,
    ));
    let notifier = Arc::new(WebhookNotifier::new(
        http,
        &config.alert.uri,
        config.alert.token.clone(),
    ));

    let shared_status = status::shared(&config.organization);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let server = tokio::spawn(status::serve(addr, shared_status.clone(), shutdown_rx.clone()));

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = signal_tx.send(true);
        }
    });

    let watcher = PollCycle::new(
        management.clone(),
        management,
        notifier,
        MessageProducer::new(&config.alert),
        table,
        shared_status,
        fetch_config.lookback_ms,
        sleep,
    )
    .with_timezone(timezone);
    let result = watcher.run(shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    match server.await {
        Ok(Err(e)) => warn!("status server: {}", e),
        Err(e) => warn!("status server task: {}", e),
        Ok(Ok(())) => {}
    }

    result?;
    Ok(())
}
