mod alarm;
mod api;
mod config;
mod engine;
mod error;
mod market;
mod notify;
mod storage;
#[cfg(test)]
mod testutil;

use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use env_logger::Builder;
use log::{info, warn, LevelFilter};

use alarm::store::AlarmStore;
use api::binance::BinanceSource;
use api::telegram::TelegramTransport;
use config::Config;
use engine::Engine;
use market::cache::MarketCache;
use notify::Dispatcher;
use storage::JsonFileStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Configure logger
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("cointracker", LevelFilter::Debug)
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();

    info!("Starting CoinTracker...");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = Config::load(Path::new(&config_path))?;

    let storage: Arc<dyn storage::Storage> = Arc::new(JsonFileStorage::new(&config.data_dir)?);
    let store = Arc::new(AlarmStore::load(storage.clone())?);
    info!("Loaded {} alarms", store.list().len());

    let source = Arc::new(BinanceSource::new(
        &config.kline_interval,
        config.kline_limit,
        config.fetch_timeout(),
    )?);
    let cache = Arc::new(MarketCache::new(
        source,
        config.cache_ttl(),
        config.max_fetch_failures,
    ));

    let transport = Arc::new(TelegramTransport::new(
        &config.bot_token,
        config.send_timeout(),
    )?);
    let dispatcher = Dispatcher::new(transport, config.send_timeout(), config.retry_backoff());

    let engine = Arc::new(Engine::new(config, cache, store, dispatcher, storage));
    if let Err(e) = engine.restore_cache().await {
        warn!("could not restore cache snapshot: {}", e);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_handle = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run(shutdown_rx).await }
    });

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    let _ = shutdown_tx.send(true);
    let _ = engine_handle.await;

    info!("Shutdown complete");
    Ok(())
}
