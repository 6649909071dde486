use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use veb_core::{
    catalog::Catalog, config::Config, dispatch::UpdateDispatcher, longpoll::PollSession,
    scraper::CatalogScraper,
};
use veb_vk::VkApi;
use veb_webdriver::WebDriverRenderer;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), veb_core::Error> {
    veb_core::logging::init("veb")?;

    let cfg = Arc::new(Config::load()?);
    let api = Arc::new(VkApi::new(&cfg));

    let catalog = Arc::new(build_catalog(&cfg).await);
    info!(items = catalog.len(), "catalog ready");

    let dispatcher = UpdateDispatcher::new(cfg.clone(), api.clone(), catalog);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "ctrl-c handler failed");
                return;
            }
            info!("shutdown signal received");
            cancel.cancel();
        }
    });

    PollSession::new(api, cfg.poll_wait)
        .run(&dispatcher, cancel)
        .await;

    // Let queued search replies finish before the process exits.
    dispatcher.shutdown(SHUTDOWN_GRACE).await;
    info!("bye");
    Ok(())
}

/// Scrape the project catalog once at startup. A bot with an empty catalog
/// still answers, it just never finds anything.
async fn build_catalog(cfg: &Config) -> Catalog {
    let renderer = match WebDriverRenderer::connect(&cfg.webdriver_url).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "browser unavailable, starting with an empty catalog");
            return Catalog::new();
        }
    };

    let mut scraper = CatalogScraper::new(renderer, cfg.scrape.clone());
    let catalog = scraper.run().await;
    if let Err(e) = scraper.into_renderer().quit().await {
        warn!(error = %e, "browser session did not close cleanly");
    }
    catalog
}
