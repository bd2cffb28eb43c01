use std::sync::Arc;

use actix_web::web;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use ktjudge::broker::Broker;
use ktjudge::cache::{InMemoryResultCache, ResultCache, spawn_sweeper};
use ktjudge::config::{CliArgs, Config, ProviderConfig};
use ktjudge::judge0::LanguageDescriptor;
use ktjudge::providers::build_providers;
use ktjudge::web_server::build_server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();

    let Config {
        server: server_config,
        broker: broker_config,
        remote: remote_config,
        local: local_config,
        providers: provider_config,
    } = cli.to_config()?;

    let providers = build_providers(&provider_config, &remote_config, &local_config)?;
    log::info!(
        "Provider chain: {}",
        providers
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let runs_locally = provider_config
        .iter()
        .any(|entry| matches!(entry, ProviderConfig::Local));
    let language = LanguageDescriptor::kotlin(runs_locally.then_some(&local_config));

    let cache: Arc<dyn ResultCache> = Arc::new(InMemoryResultCache::default());
    let broker = Broker::new(providers, cache.clone())
        .cache_failed_results(broker_config.cache_failed_results);
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let sweeper = spawn_sweeper(
        cache,
        broker_config.cache_clear_interval.as_duration(),
        shutdown_token.clone(),
    );

    let server = build_server(
        server_config,
        web::Data::new(broker),
        web::Data::new(language),
    )?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // 1. Shutdown actix-web server gracefully, in-flight sandboxes clean up on drop
    server_handle.stop(true).await;

    // 2. Stop the cache sweeper
    shutdown_token.cancel();
    if let Err(e) = sweeper.await {
        log::error!("Cache sweeper finished with error: {:?}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}
