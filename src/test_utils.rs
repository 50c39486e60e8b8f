//! Test utilities for catalog-feed
//!
//! [`StaticPageDriver`] serves canned HTML for known URLs, follows scripted
//! redirects and counts open pages, so pipeline tests run without a network.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::Item;
use crate::infrastructure::page_driver::{
    NavigationError, NavigationOptions, PageDriver, PageHandle, PageSnapshot,
};

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, Default)]
struct Site {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, NavigationError>,
}

#[derive(Debug, Default)]
struct Stats {
    open: AtomicUsize,
    opened: AtomicUsize,
    visits: Mutex<Vec<String>>,
}

/// In-memory page driver with scripted pages and redirects
#[derive(Debug, Clone, Default)]
pub struct StaticPageDriver {
    site: Arc<Site>,
    stats: Arc<Stats>,
}

impl StaticPageDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        Arc::make_mut(&mut self.site)
            .pages
            .insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        Arc::make_mut(&mut self.site)
            .redirects
            .insert(from.to_string(), to.to_string());
        self
    }

    /// Navigation to `url` takes `delay` before completing
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        Arc::make_mut(&mut self.site)
            .delays
            .insert(url.to_string(), delay);
        self
    }

    pub fn with_failure(mut self, url: &str, error: NavigationError) -> Self {
        Arc::make_mut(&mut self.site)
            .failures
            .insert(url.to_string(), error);
        self
    }

    /// Pages created and not yet closed
    pub fn open_pages(&self) -> usize {
        self.stats.open.load(Ordering::SeqCst)
    }

    /// Pages created over the driver's lifetime
    pub fn opened_pages(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    /// Every URL passed to `navigate`, in call order
    pub fn visits(&self) -> Vec<String> {
        self.stats
            .visits
            .lock()
            .map(|visits| visits.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageDriver for StaticPageDriver {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, NavigationError> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        self.stats.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticPage {
            site: Arc::clone(&self.site),
            stats: Arc::clone(&self.stats),
            current: None,
            closed: false,
        }))
    }
}

struct StaticPage {
    site: Arc<Site>,
    stats: Arc<Stats>,
    current: Option<(String, String)>,
    closed: bool,
}

#[async_trait]
impl PageHandle for StaticPage {
    async fn navigate(&mut self, url: &str, _options: &NavigationOptions) -> Result<(), NavigationError> {
        if let Ok(mut visits) = self.stats.visits.lock() {
            visits.push(url.to_string());
        }

        if let Some(delay) = self.site.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        if let Some(error) = self.site.failures.get(url) {
            return Err(error.clone());
        }

        let mut target = url.to_string();
        for _ in 0..MAX_REDIRECTS {
            match self.site.redirects.get(&target) {
                Some(next) => target = next.clone(),
                None => break,
            }
        }

        match self.site.pages.get(&target) {
            Some(html) => {
                self.current = Some((target, html.clone()));
                Ok(())
            }
            None => {
                self.current = Some((target.clone(), String::new()));
                Err(NavigationError::Http {
                    url: target,
                    status: 404,
                })
            }
        }
    }

    fn current_url(&self) -> Option<String> {
        self.current.as_ref().map(|(url, _)| url.clone())
    }

    async fn wait_for_settle(&mut self, _timeout: Duration) -> Result<(), NavigationError> {
        Ok(())
    }

    async fn dismiss_dialogs(&mut self, _timeout: Duration) -> Result<usize, NavigationError> {
        Ok(0)
    }

    async fn query_selector_text(&self, selector: &str) -> Option<String> {
        let (_, html) = self.current.as_ref()?;
        let selector = Selector::parse(selector).ok()?;
        let document = Html::parse_document(html);
        let text = document
            .select(&selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string());
        text.filter(|t| !t.is_empty())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, NavigationError> {
        match &self.current {
            Some((url, html)) => Ok(PageSnapshot {
                url: url.clone(),
                html: html.clone(),
            }),
            None => Ok(PageSnapshot {
                url: "about:blank".to_string(),
                html: String::new(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), NavigationError> {
        if !self.closed {
            self.closed = true;
            self.stats.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Product page with JSON-LD metadata
pub fn product_page(title: &str, image: &str, price: &str) -> String {
    format!(
        r#"<html><head><script type="application/ld+json">
        {{"@context":"https://schema.org","@type":"Product","name":"{title}",
          "image":["{image}"],"offers":{{"@type":"Offer","price":"{price}"}}}}
        </script></head><body><h1>{title}</h1></body></html>"#
    )
}

/// Minimal accepted item
pub fn item(id: &str, category: &str) -> Item {
    Item {
        id: id.to_string(),
        title: format!("Item {id}"),
        price: None,
        primary_image: format!("https://img.kwcdn.com/{id}.jpg"),
        images: Vec::new(),
        description: None,
        category: category.to_string(),
        outbound_url: format!("https://www.temu.com/goods.html?goods_id={id}"),
        source_url: format!("https://www.temu.com/goods.html?goods_id={id}"),
        last_seen: None,
    }
}
