//! Page driver over plain HTTP
//!
//! Each page is a GET request whose response body is the rendered content.
//! Redirects are followed by the client and the final URL is reported, which
//! is all the resolver and decoy filter need. Pages rendered by script only
//! need a browser-backed `PageDriver` instead.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::infrastructure::config::ScrapeConfig;
use crate::infrastructure::page_driver::{
    NavigationError, NavigationOptions, PageDriver, PageHandle, PageSnapshot,
};

const MAX_REDIRECTS: usize = 10;

#[derive(Clone)]
pub struct HttpPageDriver {
    client: Client,
}

impl HttpPageDriver {
    pub fn from_scrape_config(config: &ScrapeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| anyhow!("Invalid accept-language '{}': {}", config.accept_language, e))?,
        );

        let client = ClientBuilder::new()
            .timeout(config.navigation_timeout())
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        info!("HTTP page driver ready (user agent: {})", config.user_agent);
        Ok(Self { client })
    }
}

#[async_trait]
impl PageDriver for HttpPageDriver {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, NavigationError> {
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            current: None,
        }))
    }
}

struct HttpPage {
    client: Client,
    current: Option<PageSnapshot>,
}

#[async_trait]
impl PageHandle for HttpPage {
    async fn navigate(&mut self, url: &str, options: &NavigationOptions) -> Result<(), NavigationError> {
        let parsed = Url::parse(url).map_err(|_| NavigationError::InvalidUrl { url: url.to_string() })?;

        debug!("HTTP GET {}", parsed);
        let response = self
            .client
            .get(parsed)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| classify(url, options.timeout, e))?;

        let final_url = response.url().to_string();
        let status = response.status();
        if !status.is_success() {
            warn!("HTTP error {} for {}", status, final_url);
            self.current = Some(PageSnapshot {
                url: final_url.clone(),
                html: String::new(),
            });
            return Err(NavigationError::Http {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| classify(url, options.timeout, e))?;

        if final_url != url {
            debug!("Redirected {} -> {}", url, final_url);
        }
        self.current = Some(PageSnapshot { url: final_url, html });
        Ok(())
    }

    fn current_url(&self) -> Option<String> {
        self.current.as_ref().map(|page| page.url.clone())
    }

    async fn wait_for_settle(&mut self, _timeout: Duration) -> Result<(), NavigationError> {
        // A fetched document has no late network activity
        Ok(())
    }

    async fn dismiss_dialogs(&mut self, _timeout: Duration) -> Result<usize, NavigationError> {
        Ok(0)
    }

    async fn query_selector_text(&self, selector: &str) -> Option<String> {
        let page = self.current.as_ref()?;
        let selector = Selector::parse(selector).ok()?;
        let document = Html::parse_document(&page.html);
        let text = document
            .select(&selector)
            .next()
            .map(|element| element.text().collect::<Vec<_>>().join(" ").trim().to_string());
        text.filter(|t| !t.is_empty())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, NavigationError> {
        self.current.clone().ok_or(NavigationError::Closed)
    }

    async fn close(&mut self) -> Result<(), NavigationError> {
        self.current = None;
        Ok(())
    }
}

fn classify(url: &str, timeout: Duration, error: reqwest::Error) -> NavigationError {
    if error.is_timeout() {
        NavigationError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if let Some(status) = error.status() {
        NavigationError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        NavigationError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::page_driver::WaitCondition;

    #[test]
    fn test_driver_builds_from_defaults() {
        assert!(HttpPageDriver::from_scrape_config(&ScrapeConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_accept_language_is_rejected() {
        let config = ScrapeConfig {
            accept_language: "en\nUS".to_string(),
            ..ScrapeConfig::default()
        };
        assert!(HttpPageDriver::from_scrape_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_request() {
        let driver = HttpPageDriver::from_scrape_config(&ScrapeConfig::default()).unwrap();
        let mut page = driver.new_page().await.unwrap();
        let options = NavigationOptions::new(WaitCondition::DomContentLoaded, Duration::from_secs(1));

        let err = page.navigate("not a url", &options).await.unwrap_err();
        assert_eq!(err, NavigationError::InvalidUrl { url: "not a url".to_string() });
        assert!(page.current_url().is_none());
        page.close().await.unwrap();
    }
}
