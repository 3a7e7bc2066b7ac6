mod cli;
mod config;
mod render;
mod telemetry;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sitemap_sync::{
    ClientHandle, HttpPageClient, Navigator, PageEvent, ServerProperties, SyncEngine,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{Cli, Command};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_filter);

    let cfg = AppConfig::from_cli(&cli)?;
    let client = cfg.http_client();
    let server = ServerProperties::fetch(&client)
        .await
        .with_context(|| format!("probing {}", cfg.server_url))?;
    info!(
        json_api = server.json_api,
        sse = server.sse,
        invisible_widgets = server.invisible_widgets,
        "server probed"
    );

    match cli.command {
        Command::List => list(&client, &server).await,
        Command::Watch { sitemap, page, json } => {
            watch(&cfg, client, server, &sitemap, page.as_deref(), json).await
        }
    }
}

async fn list(client: &HttpPageClient, server: &ServerProperties) -> Result<()> {
    let sitemaps = server
        .fetch_sitemaps(client)
        .await
        .context("fetching sitemaps")?;
    if sitemaps.is_empty() {
        println!("no sitemaps configured");
    }
    for sitemap in sitemaps {
        println!("{}\t{}\t{}", sitemap.name, sitemap.label, sitemap.homepage_link);
    }
    Ok(())
}

async fn watch(
    cfg: &AppConfig,
    client: HttpPageClient,
    server: ServerProperties,
    name: &str,
    page_id: Option<&str>,
    json: bool,
) -> Result<()> {
    let sitemap = server
        .fetch_sitemaps(&client)
        .await
        .context("fetching sitemaps")?
        .into_iter()
        .find(|s| s.name == name);
    let Some(sitemap) = sitemap else {
        bail!("sitemap {name:?} not found on {}", cfg.server_url);
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<PageEvent>();
    let (engine, task) = SyncEngine::spawn(server, Arc::new(tx), cfg.sync.clone());
    let handle: ClientHandle = Arc::new(client);
    let mut navigator = Navigator::new(engine.clone(), Some(handle));

    navigator.open_sitemap(&sitemap)?;
    if let Some(page_id) = page_id {
        let url = cfg.page_url(&sitemap.homepage_link, &sitemap.name, page_id)?;
        navigator.open_url(&url)?;
    }
    engine.start()?;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    warn!("sync engine closed");
                    break;
                };
                navigator.apply(&event);
                let Some(current) = navigator.stack().current() else { continue };
                if current.url != event.url() || !current.loaded {
                    continue;
                }
                if json {
                    println!("{}", render::page_json(current));
                } else {
                    print!("{}", render::page_text(current));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    if let Err(err) = engine.shutdown().await {
        warn!(error = %err, "sync engine shutdown failed");
    }
    task.await.context("sync engine task")?;
    Ok(())
}
