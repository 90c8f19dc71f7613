//! Headless-browser capability consumed by the crawler
//!
//! The crawler only needs a narrow slice of a browser: open an isolated
//! context with a given identity, navigate, read the page, run init scripts,
//! move the pointer, scroll, and move cookies in and out. These traits are
//! that slice. `HttpBrowser` implements them over reqwest with a cookie jar;
//! a JS-capable driver can implement the same traits.

mod http;

pub use http::{HttpBrowser, HttpContext, HttpPage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Browser-level failures
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("No document loaded")]
    NoDocument,

    #[error("Browser context is closed")]
    Closed,
}

impl BrowserError {
    /// True for failures caused by the network rather than by the caller
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias for browser operations
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Window size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Authenticated upstream proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// `http://host:port`
    pub server: String,
    pub username: String,
    pub password: String,
}

/// Identity and network settings for a new context
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub user_agent: String,
    pub viewport: Viewport,
    pub locale: String,
    pub timezone: String,
    /// Headers sent with every request, in order
    pub extra_headers: Vec<(String, String)>,
    pub proxy: Option<ProxySettings>,
}

/// Cookie as persisted in session files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".to_string()
}

/// Outcome of a completed navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
}

/// Launches isolated browsing contexts
#[async_trait]
pub trait Browser: Send + Sync {
    type Context: BrowserContext;

    async fn new_context(&self, options: ContextOptions) -> BrowserResult<Self::Context>;
}

/// An isolated cookie and script scope
#[async_trait]
pub trait BrowserContext: Send {
    type Page: Page;

    /// Registers a script that runs before any page script on every navigation
    async fn add_init_script(&mut self, script: &str) -> BrowserResult<()>;

    async fn new_page(&mut self) -> BrowserResult<Self::Page>;

    /// Every cookie held by the context
    async fn cookies(&self) -> BrowserResult<Vec<BrowserCookie>>;

    async fn add_cookies(&mut self, cookies: &[BrowserCookie]) -> BrowserResult<()>;

    async fn close(&mut self) -> BrowserResult<()>;
}

/// A single tab
#[async_trait]
pub trait Page: Send {
    /// Navigates and waits for the document, bounded by `timeout`
    ///
    /// Non-2xx responses are not errors; the caller inspects `status`.
    async fn goto(&mut self, url: &str, timeout: Duration) -> BrowserResult<Navigation>;

    /// Serialized HTML of the current document
    async fn content(&self) -> BrowserResult<String>;

    /// Visible text of the current document body
    async fn body_text(&self) -> BrowserResult<String>;

    fn viewport(&self) -> Viewport;

    /// Scrollable height of the current document
    async fn document_height(&self) -> BrowserResult<u32>;

    async fn mouse_move(&mut self, x: f64, y: f64) -> BrowserResult<()>;

    async fn scroll_to(&mut self, y: u32) -> BrowserResult<()>;
}
