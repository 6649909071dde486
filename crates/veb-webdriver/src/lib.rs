//! WebDriver adapter: drives a headless Chrome behind the [`Renderer`] port.

use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tokio::time::sleep;
use tracing::info;

use veb_core::{
    render::{Element, Renderer},
    Error, Result,
};

const SCROLL_JS: &str = "arguments[0].scrollIntoView({behavior: 'smooth', block: 'center'});";
const CLICK_JS: &str = "arguments[0].click();";
/// Give the smooth scroll a moment to settle before clicking.
const SCROLL_SETTLE: Duration = Duration::from_secs(1);

const CHROME_ARGS: &[&str] = &[
    "--headless",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--user-agent=Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
];

/// [`Renderer`] backed by a real browser session.
pub struct WebDriverRenderer {
    driver: WebDriver,
}

impl WebDriverRenderer {
    /// Open a fresh headless Chrome session against a chromedriver or
    /// Selenium endpoint.
    pub async fn connect(webdriver_url: &str) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        for arg in CHROME_ARGS {
            caps.add_arg(arg).map_err(wd_err)?;
        }
        let driver = WebDriver::new(webdriver_url, caps).await.map_err(wd_err)?;
        info!(url = webdriver_url, "browser session opened");
        Ok(Self { driver })
    }

    /// Close the browser session.
    pub async fn quit(self) -> Result<()> {
        self.driver.quit().await.map_err(wd_err)
    }
}

#[derive(Clone)]
pub struct PageElement(WebElement);

#[async_trait]
impl Element for PageElement {
    async fn find(&self, css: &str) -> Result<Option<Self>> {
        let found = self.0.find_all(By::Css(css)).await.map_err(wd_err)?;
        Ok(found.into_iter().next().map(PageElement))
    }

    async fn text(&self) -> Result<String> {
        self.0.text().await.map_err(wd_err)
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        self.0.attr(name).await.map_err(wd_err)
    }

    async fn is_displayed(&self) -> Result<bool> {
        self.0.is_displayed().await.map_err(wd_err)
    }

    async fn is_enabled(&self) -> Result<bool> {
        self.0.is_enabled().await.map_err(wd_err)
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    type Elem = PageElement;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.driver.goto(url).await.map_err(wd_err)
    }

    async fn refresh(&self) -> Result<()> {
        self.driver.refresh().await.map_err(wd_err)
    }

    async fn find_all(&self, css: &str) -> Result<Vec<PageElement>> {
        let found = self.driver.find_all(By::Css(css)).await.map_err(wd_err)?;
        Ok(found.into_iter().map(PageElement).collect())
    }

    async fn run_bool_script(&self, js: &str) -> Result<bool> {
        let ret = self.driver.execute(js, Vec::new()).await.map_err(wd_err)?;
        Ok(ret.json().as_bool().unwrap_or(false))
    }

    async fn scroll_into_view(&self, el: &PageElement) -> Result<()> {
        let args = vec![el.0.to_json().map_err(wd_err)?];
        self.driver.execute(SCROLL_JS, args).await.map_err(wd_err)?;
        sleep(SCROLL_SETTLE).await;
        Ok(())
    }

    async fn script_click(&self, el: &PageElement) -> Result<()> {
        let args = vec![el.0.to_json().map_err(wd_err)?];
        self.driver.execute(CLICK_JS, args).await.map_err(wd_err)?;
        Ok(())
    }

    async fn enter_frame(&self, el: &PageElement) -> Result<()> {
        el.0.clone().enter_frame().await.map_err(wd_err)
    }

    async fn leave_frame(&self) -> Result<()> {
        self.driver.enter_default_frame().await.map_err(wd_err)
    }
}

fn wd_err(e: WebDriverError) -> Error {
    Error::Transport(format!("webdriver: {e}"))
}
