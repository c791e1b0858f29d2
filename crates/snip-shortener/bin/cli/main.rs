mod cli;

use crate::cli::{Command, LogFormat, CLI};
use anyhow::Context;
use clap::Parser;
use serde_json::json;
use snip_core::{Lookup, Repository, ShortKey};
use snip_shortener::{BatchItem, ServiceSettings, ShortenerService};
use snip_storage::StorageConfig;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    let storage = StorageConfig::resolve(config.database_dsn, config.file_storage_path);
    info!(storage_backend = %storage, base_url = %config.base_url, "starting snip");

    let repository = storage.open().await.context("failed to open storage")?;
    let settings = ServiceSettings::builder()
        .base_url(config.base_url)
        .delete_queue_capacity(config.delete_queue_capacity as usize)
        .build();
    let service = ShortenerService::new(repository, settings);

    let result = run(&service, config.command).await;
    service.shutdown().await;
    result
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(service: &ShortenerService<dyn Repository>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Shorten { urls, user } => {
            if let [url] = urls.as_slice() {
                let shortened = service.shorten(url.as_str(), user).await?;
                print_json(&json!({
                    "result": shortened.short_url,
                    "conflict": shortened.conflict,
                }))
            } else {
                let items = urls
                    .into_iter()
                    .enumerate()
                    .map(|(idx, original_url)| BatchItem {
                        correlation_id: (idx + 1).to_string(),
                        original_url,
                    })
                    .collect();
                let results = service.shorten_batch(items, user).await?;
                let body: Vec<_> = results
                    .into_iter()
                    .map(|item| {
                        json!({
                            "correlation_id": item.correlation_id,
                            "short_url": item.short_url,
                            "conflict": item.conflict,
                        })
                    })
                    .collect();
                print_json(&json!(body))
            }
        }
        Command::Get { key } => {
            let key = ShortKey::parse(&key)?;
            let body = match service.resolve(&key).await? {
                Lookup::Found(url) => json!({ "status": "ok", "original_url": url.original_url }),
                Lookup::Deleted => json!({ "status": "deleted" }),
                Lookup::NotFound => json!({ "status": "not_found" }),
            };
            print_json(&body)
        }
        Command::List { user } => {
            let urls = service.user_urls(&user).await?;
            print_json(&json!(urls))
        }
        Command::Delete { keys, user } => {
            let keys = keys
                .iter()
                .map(ShortKey::parse)
                .collect::<Result<Vec<_>, _>>()?;
            let count = keys.len();
            service.delete(user, keys).await?;
            print_json(&json!({ "accepted": count }))
        }
        Command::Stats => {
            let stats = service.stats().await?;
            print_json(&json!(stats))
        }
        Command::Ping { timeout_ms } => {
            service.ping(Duration::from_millis(timeout_ms)).await?;
            print_json(&json!({ "status": "ok" }))
        }
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
