use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    catalog::{Catalog, CatalogItem},
    errors::Error,
    render::{Element, Renderer},
    utils::{squash_whitespace, truncate_text},
    Result,
};

const DOC_READY_JS: &str = "return document.readyState === 'complete'";
/// Chars of joined titles kept in each per-page log line.
const TITLES_LOG_LIMIT: usize = 200;

/// Tunables for one scrape run. Defaults match the production listing, a
/// Tilda storefront embedded in an iframe.
#[derive(Clone, Debug)]
pub struct ScrapeConfig {
    pub listing_url: String,
    /// Hard cap on pagination depth.
    pub max_pages: u32,
    /// Parse attempts per page before the listing counts as exhausted.
    pub max_retries: u32,

    // Selectors
    pub frame_selector: String,
    /// Cheap presence probe used by the readiness waits.
    pub card_marker_selector: String,
    /// Full card enumeration, covering both storefront markups.
    pub card_selector: String,
    pub link_selector: String,
    pub title_selector: String,
    pub descr_selector: String,
    pub page_button_selector: String,
    pub next_button_selector: String,
    pub pagination_selector: String,

    // Wait ceilings
    pub init_timeout: Duration,
    pub content_timeout: Duration,
    pub reload_timeout: Duration,
    pub probe_interval: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://education.vk.company/education_projects".to_string(),
            max_pages: 10,
            max_retries: 3,
            frame_selector: "iframe.education_projects__Iframe-sc-1aobee9-0".to_string(),
            card_marker_selector: ".t-store__card__wrap_all".to_string(),
            card_selector: ".t-store__card__wrap_all, .js-product.t-store_card".to_string(),
            link_selector: "a".to_string(),
            title_selector: ".js-store-prod-name, .js-product-name, .t-store__card__title"
                .to_string(),
            descr_selector: ".js-store-prod-descr, .js-product-descr, .t-store__card__descr"
                .to_string(),
            page_button_selector: ".t-store__pagination__item_page".to_string(),
            next_button_selector: ".t-store__pagination__btn_next:not(.t-disabled)".to_string(),
            pagination_selector: ".t-store__pagination__item_page, .t-store__pagination__btn_next"
                .to_string(),
            init_timeout: Duration::from_secs(30),
            content_timeout: Duration::from_secs(15),
            reload_timeout: Duration::from_secs(10),
            probe_interval: Duration::from_millis(500),
        }
    }
}

/// Where a run currently stands: 1-based page number plus the parse attempt
/// counter for that page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    pub attempts: u32,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            page: 1,
            attempts: 0,
        }
    }
}

impl PageCursor {
    fn advance(&mut self) {
        self.page += 1;
        self.attempts = 0;
    }
}

/// Outcome of parsing one page through its retry budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PageOutcome {
    NewItems(usize),
    Exhausted,
}

/// Outcome of one pagination attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Advance {
    Moved,
    End,
}

/// Walks the paginated listing and builds the project catalog.
///
/// All mutable scrape state lives on this struct; a run starts from a fresh
/// cursor and hands the catalog back as a value, so two runs can never
/// interleave state.
pub struct CatalogScraper<R: Renderer> {
    page: R,
    cfg: ScrapeConfig,
    cursor: PageCursor,
}

impl<R: Renderer> CatalogScraper<R> {
    pub fn new(page: R, cfg: ScrapeConfig) -> Self {
        Self {
            page,
            cfg,
            cursor: PageCursor::default(),
        }
    }

    /// Hand the renderer back once the run is over, e.g. to shut it down.
    pub fn into_renderer(self) -> R {
        self.page
    }

    /// Scrape up to `max_pages` listing pages.
    ///
    /// Never fails: an aborted run yields whatever was collected up to that
    /// point, and the browsing context is always restored to the top level.
    pub async fn run(&mut self) -> Catalog {
        let mut catalog = Catalog::new();
        if let Err(e) = self.scrape_into(&mut catalog).await {
            error!(error = %e, page = self.cursor.page, "scrape aborted, keeping partial catalog");
        }
        if let Err(e) = self.page.leave_frame().await {
            warn!(error = %e, "failed to leave the listing frame");
        }
        info!(
            items = catalog.len(),
            pages = self.cursor.page,
            "scrape finished"
        );
        catalog
    }

    async fn scrape_into(&mut self, catalog: &mut Catalog) -> Result<()> {
        self.init().await?;
        loop {
            match self.parse_with_retry(catalog).await? {
                PageOutcome::NewItems(count) => {
                    debug!(page = self.cursor.page, count, "page contributed items");
                }
                PageOutcome::Exhausted => {
                    info!(
                        page = self.cursor.page,
                        "no new items after retries, treating the listing as exhausted"
                    );
                    break;
                }
            }
            if self.cursor.page >= self.cfg.max_pages {
                info!(limit = self.cfg.max_pages, "page cap reached");
                break;
            }
            if let Advance::End = self.advance().await {
                break;
            }
            self.cursor.advance();
        }
        Ok(())
    }

    /// Open the listing and enter its storefront iframe.
    async fn init(&mut self) -> Result<()> {
        self.cursor = PageCursor::default();
        self.page.navigate(&self.cfg.listing_url).await?;
        self.wait_for_script(DOC_READY_JS, self.cfg.init_timeout)
            .await?;

        let frame = self
            .wait_for_element(&self.cfg.frame_selector, self.cfg.init_timeout)
            .await?;
        self.page.enter_frame(&frame).await?;
        self.wait_for_element(&self.cfg.card_marker_selector, self.cfg.init_timeout)
            .await?;
        info!(url = %self.cfg.listing_url, "listing opened");
        Ok(())
    }

    /// Parse the current page, refreshing between attempts, until it yields
    /// new items or the retry budget runs out.
    async fn parse_with_retry(&mut self, catalog: &mut Catalog) -> Result<PageOutcome> {
        self.cursor.attempts = 0;
        while self.cursor.attempts < self.cfg.max_retries {
            self.cursor.attempts += 1;
            let admitted = self.parse_page(catalog).await?;
            if admitted > 0 {
                return Ok(PageOutcome::NewItems(admitted));
            }
            warn!(
                attempt = self.cursor.attempts,
                max = self.cfg.max_retries,
                page = self.cursor.page,
                "no new items on page"
            );
            if self.cursor.attempts < self.cfg.max_retries {
                self.reload_page().await;
            }
        }
        Ok(PageOutcome::Exhausted)
    }

    /// One enumeration pass over the visible cards. Returns how many newly
    /// admitted items the pass produced.
    async fn parse_page(&self, catalog: &mut Catalog) -> Result<usize> {
        let cards = self.page.find_all(&self.cfg.card_selector).await?;
        let mut new_titles: Vec<String> = Vec::new();

        for card in &cards {
            match self.extract_item(card).await {
                Ok(item) => {
                    let title = item.title.clone();
                    if catalog.insert(item) {
                        new_titles.push(title);
                    }
                }
                Err(e) => warn!(page = self.cursor.page, error = %e, "skipping card"),
            }
        }

        if !new_titles.is_empty() {
            info!(
                page = self.cursor.page,
                found = new_titles.len(),
                titles = %truncate_text(&new_titles.join(" | "), TITLES_LOG_LIMIT),
                "page parsed"
            );
        }
        Ok(new_titles.len())
    }

    /// Pull (title, description, url) out of one card.
    async fn extract_item(&self, card: &R::Elem) -> Result<CatalogItem> {
        let link = self.find_in(card, &self.cfg.link_selector, "link").await?;
        let url = link
            .attr("href")
            .await?
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Extraction("card link has no href".to_string()))?;

        let title = self
            .find_in(card, &self.cfg.title_selector, "title")
            .await?
            .text()
            .await?;
        let description = self
            .find_in(card, &self.cfg.descr_selector, "description")
            .await?
            .text()
            .await?;

        Ok(CatalogItem {
            title: squash_whitespace(&title),
            description: squash_whitespace(&description),
            url,
        })
    }

    async fn find_in(&self, card: &R::Elem, css: &str, what: &str) -> Result<R::Elem> {
        card.find(css)
            .await?
            .ok_or_else(|| Error::Extraction(format!("card has no {what}")))
    }

    /// Refresh ahead of a retry; failures here only hurt the next attempt's
    /// odds, so they are logged and swallowed.
    async fn reload_page(&self) {
        info!(page = self.cursor.page, "reloading page before retry");
        if let Err(e) = self.page.refresh().await {
            warn!(error = %e, "page reload failed");
            return;
        }
        if let Err(e) = self
            .wait_for_element(&self.cfg.card_marker_selector, self.cfg.reload_timeout)
            .await
        {
            warn!(error = %e, "cards did not reappear after reload");
        }
    }

    /// Try to move to the next page: the numbered control for `page + 1`
    /// first, then the generic "next" control. Anything that prevents the
    /// move ends the run as a normal end of pagination.
    async fn advance(&self) -> Advance {
        match self.try_advance().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(page = self.cursor.page, error = %e, "pagination attempt failed, stopping");
                Advance::End
            }
        }
    }

    async fn try_advance(&self) -> Result<Advance> {
        let pagination = self.page.find_all(&self.cfg.pagination_selector).await?;
        if pagination.is_empty() {
            debug!("no pagination controls on page");
            return Ok(Advance::End);
        }

        let direct = format!(
            "{}[data-page-num='{}']",
            self.cfg.page_button_selector,
            self.cursor.page + 1
        );
        let mut buttons = self.page.find_all(&direct).await?;
        if buttons.is_empty() {
            buttons = self.page.find_all(&self.cfg.next_button_selector).await?;
        }
        let Some(button) = buttons.first() else {
            info!("no active control for the next page, pagination ends");
            return Ok(Advance::End);
        };

        if !button.is_displayed().await? || !button.is_enabled().await? {
            debug!("next page control is not clickable");
            return Ok(Advance::End);
        }

        self.page.scroll_into_view(button).await?;
        self.page.script_click(button).await?;

        if let Err(e) = self
            .wait_for_script(&self.content_ready_js(), self.cfg.content_timeout)
            .await
        {
            // Not fatal: the next parse pass has its own retry budget.
            warn!(error = %e, "next page content did not settle");
        }
        Ok(Advance::Moved)
    }

    fn content_ready_js(&self) -> String {
        format!(
            "return document.readyState === 'complete' && document.querySelectorAll({}).length > 0",
            js_string(&self.cfg.card_marker_selector)
        )
    }

    /// Poll until `css` matches at least one element; first match wins.
    async fn wait_for_element(&self, css: &str, ceiling: Duration) -> Result<R::Elem> {
        let deadline = Instant::now() + ceiling;
        loop {
            match self.page.find_all(css).await {
                Ok(mut found) if !found.is_empty() => return Ok(found.remove(0)),
                Ok(_) => {}
                // A probe error counts as "not ready yet".
                Err(e) => debug!(selector = css, error = %e, "element probe failed"),
            }
            if Instant::now() >= deadline {
                return Err(Error::RenderTimeout {
                    what: format!("selector {css}"),
                    waited: ceiling,
                });
            }
            sleep(self.cfg.probe_interval).await;
        }
    }

    /// Poll until `js` evaluates to true in the page.
    async fn wait_for_script(&self, js: &str, ceiling: Duration) -> Result<()> {
        let deadline = Instant::now() + ceiling;
        loop {
            match self.page.run_bool_script(js).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!(error = %e, "script probe failed"),
            }
            if Instant::now() >= deadline {
                return Err(Error::RenderTimeout {
                    what: format!("script {js}"),
                    waited: ceiling,
                });
            }
            sleep(self.cfg.probe_interval).await;
        }
    }
}

/// Encode `s` as a JS string literal (JSON escaping is a subset of JS).
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
