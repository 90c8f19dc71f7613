//! Shared fixtures for the integration tests
//!
//! `FixtureBrowser` serves canned HTML by exact URL and records every
//! navigation, so full runs can be driven without touching the real sites.

use async_trait::async_trait;
use listing_tracker::browser::{
    Browser, BrowserContext, BrowserCookie, BrowserError, BrowserResult, ContextOptions,
    Navigation, Page, Viewport,
};
use listing_tracker::config::{
    BudgetConfig, CircuitBreakerConfig, Config, CrawlerConfig, DatabaseConfig, HealthcheckConfig,
    ProxyConfig, RetryConfig, SourcesConfig, StealthConfig, TimingConfig,
};
use listing_tracker::search_url::{build_search_url, with_page, SearchCriteria};
use listing_tracker::storage::{NewSavedSearch, SqliteStore, Store};
use listing_tracker::SourceFamily;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const EMPTY_PAGE: &str = "<html><body><p>No listings match your search.</p></body></html>";

#[derive(Default)]
struct Site {
    pages: HashMap<String, (u16, String)>,
    visits: Vec<String>,
    contexts_opened: usize,
    contexts_closed: usize,
    init_scripts: usize,
    user_agents: Vec<String>,
    proxied: Vec<bool>,
    fail_contexts: bool,
}

/// In-memory browser serving fixture pages
#[derive(Clone, Default)]
pub struct FixtureBrowser {
    site: Arc<Mutex<Site>>,
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `html` with status 200 at `url`
    pub fn serve(&self, url: &str, html: impl Into<String>) {
        self.serve_status(url, 200, html);
    }

    pub fn serve_status(&self, url: &str, status: u16, html: impl Into<String>) {
        self.site
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), (status, html.into()));
    }

    /// Makes every `new_context` call fail
    pub fn fail_contexts(&self) {
        self.site.lock().unwrap().fail_contexts = true;
    }

    pub fn visits(&self) -> Vec<String> {
        self.site.lock().unwrap().visits.clone()
    }

    pub fn visit_count(&self, url: &str) -> usize {
        self.visits().iter().filter(|v| v.as_str() == url).count()
    }

    pub fn contexts(&self) -> (usize, usize) {
        let site = self.site.lock().unwrap();
        (site.contexts_opened, site.contexts_closed)
    }

    pub fn init_scripts(&self) -> usize {
        self.site.lock().unwrap().init_scripts
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.site.lock().unwrap().user_agents.clone()
    }

    /// Whether each opened context went through the proxy, in order
    pub fn proxied_contexts(&self) -> Vec<bool> {
        self.site.lock().unwrap().proxied.clone()
    }
}

#[async_trait]
impl Browser for FixtureBrowser {
    type Context = FixtureContext;

    async fn new_context(&self, options: ContextOptions) -> BrowserResult<FixtureContext> {
        let mut site = self.site.lock().unwrap();
        if site.fail_contexts {
            return Err(BrowserError::Closed);
        }
        site.contexts_opened += 1;
        site.user_agents.push(options.user_agent.clone());
        site.proxied.push(options.proxy.is_some());

        Ok(FixtureContext {
            site: self.site.clone(),
            viewport: options.viewport,
            cookies: Vec::new(),
        })
    }
}

pub struct FixtureContext {
    site: Arc<Mutex<Site>>,
    viewport: Viewport,
    cookies: Vec<BrowserCookie>,
}

#[async_trait]
impl BrowserContext for FixtureContext {
    type Page = FixturePage;

    async fn add_init_script(&mut self, _script: &str) -> BrowserResult<()> {
        self.site.lock().unwrap().init_scripts += 1;
        Ok(())
    }

    async fn new_page(&mut self) -> BrowserResult<FixturePage> {
        Ok(FixturePage {
            site: self.site.clone(),
            viewport: self.viewport,
            html: String::new(),
        })
    }

    async fn cookies(&self) -> BrowserResult<Vec<BrowserCookie>> {
        let mut cookies = self.cookies.clone();
        cookies.push(BrowserCookie {
            name: "visited".to_string(),
            value: "1".to_string(),
            domain: "www.realtor.ca".to_string(),
            path: "/".to_string(),
        });
        Ok(cookies)
    }

    async fn add_cookies(&mut self, cookies: &[BrowserCookie]) -> BrowserResult<()> {
        self.cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.site.lock().unwrap().contexts_closed += 1;
        Ok(())
    }
}

pub struct FixturePage {
    site: Arc<Mutex<Site>>,
    viewport: Viewport,
    html: String,
}

#[async_trait]
impl Page for FixturePage {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> BrowserResult<Navigation> {
        let mut site = self.site.lock().unwrap();
        site.visits.push(url.to_string());

        let (status, html) = site
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| (200, EMPTY_PAGE.to_string()));
        self.html = html;

        Ok(Navigation {
            url: url.to_string(),
            status,
        })
    }

    async fn content(&self) -> BrowserResult<String> {
        Ok(self.html.clone())
    }

    async fn body_text(&self) -> BrowserResult<String> {
        let document = scraper::Html::parse_document(&self.html);
        Ok(document.root_element().text().collect::<Vec<_>>().join(" "))
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn document_height(&self) -> BrowserResult<u32> {
        Ok(self.viewport.height * 2)
    }

    async fn mouse_move(&mut self, _x: f64, _y: f64) -> BrowserResult<()> {
        Ok(())
    }

    async fn scroll_to(&mut self, _y: u32) -> BrowserResult<()> {
        Ok(())
    }
}

/// Configuration with fixed, fast settings and no session files
pub fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            path: ":memory:".to_string(),
        },
        crawler: CrawlerConfig {
            max_pages_per_search: 3,
            ..CrawlerConfig::default()
        },
        sources: SourcesConfig::default(),
        stealth: StealthConfig {
            session_persistence: false,
            ..StealthConfig::default()
        },
        timing: TimingConfig {
            time_of_day_aware: false,
            ..TimingConfig::default()
        },
        retry: RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        },
        proxy: ProxyConfig::default(),
        budget: BudgetConfig::default(),
        circuit_breaker: CircuitBreakerConfig::default(),
        healthcheck: HealthcheckConfig::default(),
    }
}

/// Inserts an active saved search with a custom URL
pub fn add_search(store: &mut SqliteStore, name: &str, family: SourceFamily, custom_url: &str) -> i64 {
    store
        .insert_saved_search(&NewSavedSearch {
            name: name.to_string(),
            source: family,
            criteria: SearchCriteria::default(),
            custom_url: Some(custom_url.to_string()),
            is_active: true,
        })
        .unwrap()
}

/// URL the crawler requests for `page` of a custom-URL search
pub fn page_url(family: SourceFamily, custom_url: &str, page: u32) -> String {
    let base = build_search_url(family, &SearchCriteria::default(), Some(custom_url)).unwrap();
    with_page(&base, family, page).to_string()
}

/// Absolute realtor listing URL for `id`
pub fn realtor_listing_url(id: &str) -> String {
    format!("https://www.realtor.ca/real-estate/{}/maison-laval", id)
}

/// A realtor result page with one card per `(id, price)`
pub fn realtor_results(cards: &[(&str, &str)]) -> String {
    let cards: String = cards
        .iter()
        .map(|(id, price)| {
            format!(
                r#"<div class="listingCard">
                     <a href="/real-estate/{id}/maison-laval">View</a>
                     <div class="listingCardPrice">{price}</div>
                     <div class="listingCardAddress">{id} Rue des Pins, Laval, QC H7N 1A1</div>
                     <div class="listingCardBed">3</div>
                   </div>"#
            )
        })
        .collect();
    format!("<html><body><div class=\"results\">{}</div></body></html>", cards)
}

/// A realtor listing page
pub fn realtor_detail(year_built: u32) -> String {
    format!(
        r#"<html><body>
             <h1 data-testid="address">10 Rue des Pins, Laval, QC H7N 1A1</h1>
             <div class="propertyDetailsYearBuilt">Built in {}</div>
             <div data-testid="description">Bungalow with a pool.</div>
           </body></html>"#,
        year_built
    )
}
