//! Browser capability over a plain HTTP client
//!
//! Navigation is a GET through a reqwest client that carries the context's
//! identity headers, cookie jar and proxy. Init scripts are retained but not
//! evaluated since there is no JS engine; pointer and scroll actions update
//! local state only.

use super::{
    Browser, BrowserContext, BrowserCookie, BrowserError, BrowserResult, ContextOptions,
    Navigation, Page, Viewport,
};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Pixels per estimated line of rendered text
const LINE_HEIGHT_PX: u32 = 24;

/// Words per estimated line of rendered text
const WORDS_PER_LINE: u32 = 12;

/// Launches reqwest-backed contexts
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    connect_timeout: Duration,
}

impl HttpBrowser {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for HttpBrowser {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    type Context = HttpContext;

    async fn new_context(&self, options: ContextOptions) -> BrowserResult<HttpContext> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value("User-Agent", &options.user_agent)?);
        for (name, value) in &options.extra_headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| BrowserError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            headers.insert(header_name, header_value(name, value)?);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .connect_timeout(self.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(&proxy.server)?
                .basic_auth(&proxy.username, &proxy.password);
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        tracing::debug!(
            user_agent = %options.user_agent,
            locale = %options.locale,
            timezone = %options.timezone,
            proxied = options.proxy.is_some(),
            "Opened HTTP browser context"
        );

        Ok(HttpContext {
            client,
            jar,
            origins: Arc::new(Mutex::new(BTreeSet::new())),
            viewport: options.viewport,
            init_scripts: Vec::new(),
            closed: false,
        })
    }
}

fn header_value(name: &str, value: &str) -> BrowserResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| BrowserError::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Cookie scope shared by every page it opens
pub struct HttpContext {
    client: Client,
    jar: Arc<Jar>,
    /// Origins touched by navigation or cookie restore, used to read the jar back
    origins: Arc<Mutex<BTreeSet<String>>>,
    viewport: Viewport,
    init_scripts: Vec<String>,
    closed: bool,
}

impl HttpContext {
    /// Scripts registered with `add_init_script`
    pub fn init_scripts(&self) -> &[String] {
        &self.init_scripts
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed {
            Err(BrowserError::Closed)
        } else {
            Ok(())
        }
    }
}

fn remember_origin(origins: &Mutex<BTreeSet<String>>, url: &Url) {
    if let Ok(mut origins) = origins.lock() {
        origins.insert(url.origin().ascii_serialization());
    }
}

#[async_trait]
impl BrowserContext for HttpContext {
    type Page = HttpPage;

    async fn add_init_script(&mut self, script: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        self.init_scripts.push(script.to_string());
        Ok(())
    }

    async fn new_page(&mut self) -> BrowserResult<HttpPage> {
        self.ensure_open()?;
        Ok(HttpPage {
            client: self.client.clone(),
            origins: self.origins.clone(),
            viewport: self.viewport,
            document: None,
            pointer: (0.0, 0.0),
            scroll_y: 0,
        })
    }

    async fn cookies(&self) -> BrowserResult<Vec<BrowserCookie>> {
        let origins: Vec<String> = match self.origins.lock() {
            Ok(origins) => origins.iter().cloned().collect(),
            Err(_) => Vec::new(),
        };

        let mut cookies = Vec::new();
        for origin in origins {
            let Ok(url) = Url::parse(&origin) else {
                continue;
            };
            let Some(domain) = url.host_str().map(str::to_string) else {
                continue;
            };
            let Some(header) = self.jar.cookies(&url) else {
                continue;
            };
            let Ok(header) = header.to_str() else {
                continue;
            };

            for pair in header.split(';') {
                let Some((name, value)) = pair.trim().split_once('=') else {
                    continue;
                };
                let cookie = BrowserCookie {
                    name: name.to_string(),
                    value: value.to_string(),
                    domain: domain.clone(),
                    path: "/".to_string(),
                };
                if !cookies.contains(&cookie) {
                    cookies.push(cookie);
                }
            }
        }

        Ok(cookies)
    }

    async fn add_cookies(&mut self, cookies: &[BrowserCookie]) -> BrowserResult<()> {
        self.ensure_open()?;

        for cookie in cookies {
            let domain = cookie.domain.trim_start_matches('.');
            let url = Url::parse(&format!("https://{}/", domain))
                .map_err(|_| BrowserError::InvalidUrl(cookie.domain.clone()))?;
            let cookie_str = format!(
                "{}={}; Domain={}; Path={}",
                cookie.name, cookie.value, domain, cookie.path
            );
            self.jar.add_cookie_str(&cookie_str, &url);
            remember_origin(&self.origins, &url);
        }

        Ok(())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.closed = true;
        Ok(())
    }
}

struct Document {
    html: String,
}

/// A single tab backed by the context's client
pub struct HttpPage {
    client: Client,
    origins: Arc<Mutex<BTreeSet<String>>>,
    viewport: Viewport,
    document: Option<Document>,
    pointer: (f64, f64),
    scroll_y: u32,
}

impl HttpPage {
    /// Last pointer position
    pub fn pointer(&self) -> (f64, f64) {
        self.pointer
    }

    /// Current vertical scroll offset
    pub fn scroll_y(&self) -> u32 {
        self.scroll_y
    }

    fn document(&self) -> BrowserResult<&Document> {
        self.document.as_ref().ok_or(BrowserError::NoDocument)
    }
}

#[async_trait]
impl Page for HttpPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> BrowserResult<Navigation> {
        let parsed = Url::parse(url).map_err(|e| BrowserError::InvalidUrl(format!("{}: {}", url, e)))?;
        remember_origin(&self.origins, &parsed);

        let request = async {
            let response = self.client.get(parsed.clone()).send().await?;
            let status = response.status().as_u16();
            let final_url = response.url().clone();
            let html = response.text().await?;
            Ok::<_, reqwest::Error>((status, final_url, html))
        };

        let (status, final_url, html) = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| BrowserError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        remember_origin(&self.origins, &final_url);
        tracing::trace!(url = %final_url, status, bytes = html.len(), "Navigation complete");

        self.document = Some(Document { html });
        self.scroll_y = 0;

        Ok(Navigation {
            url: final_url.to_string(),
            status,
        })
    }

    async fn content(&self) -> BrowserResult<String> {
        Ok(self.document()?.html.clone())
    }

    async fn body_text(&self) -> BrowserResult<String> {
        Ok(visible_text(&self.document()?.html))
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn document_height(&self) -> BrowserResult<u32> {
        let words = visible_text(&self.document()?.html).split_whitespace().count() as u32;
        let estimated = (words / WORDS_PER_LINE).saturating_mul(LINE_HEIGHT_PX);
        Ok(estimated.max(self.viewport.height))
    }

    async fn mouse_move(&mut self, x: f64, y: f64) -> BrowserResult<()> {
        self.pointer = (x, y);
        Ok(())
    }

    async fn scroll_to(&mut self, y: u32) -> BrowserResult<()> {
        self.document()?;
        self.scroll_y = y;
        Ok(())
    }
}

/// Body text without script and style contents, whitespace collapsed
fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    let Some(root) = document.select(&body).next() else {
        return String::new();
    };

    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        if !hidden {
            parts.push(&**text);
        }
    }

    crate::extract::collapse_whitespace(&parts.join(" "))
}
