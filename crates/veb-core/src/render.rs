use async_trait::async_trait;

use crate::Result;

/// A handle to one rendered DOM element.
#[async_trait]
pub trait Element: Sized + Send + Sync {
    /// First descendant matching `css`, or `None`.
    async fn find(&self, css: &str) -> Result<Option<Self>>;

    async fn text(&self) -> Result<String>;
    async fn attr(&self, name: &str) -> Result<Option<String>>;

    async fn is_displayed(&self) -> Result<bool>;
    async fn is_enabled(&self) -> Result<bool>;
}

/// Port over a scriptable browser page.
///
/// WebDriver is the first implementation; the scraper only talks to this
/// trait, so its state machine can run against an in-memory fake in tests.
#[async_trait]
pub trait Renderer: Send + Sync {
    type Elem: Element;

    async fn navigate(&self, url: &str) -> Result<()>;
    async fn refresh(&self) -> Result<()>;

    /// All elements matching `css` in the current browsing context.
    async fn find_all(&self, css: &str) -> Result<Vec<Self::Elem>>;

    /// Evaluate a script in the page and coerce its result to bool.
    async fn run_bool_script(&self, js: &str) -> Result<bool>;

    async fn scroll_into_view(&self, el: &Self::Elem) -> Result<()>;

    /// Click via script injection; the listing overlays its buttons, which
    /// makes native clicks flaky.
    async fn script_click(&self, el: &Self::Elem) -> Result<()>;

    /// Switch the browsing context into the iframe `el`.
    async fn enter_frame(&self, el: &Self::Elem) -> Result<()>;

    /// Return to the top-level browsing context.
    async fn leave_frame(&self) -> Result<()>;
}
