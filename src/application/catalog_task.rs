//! Work unit processing against live pages
//!
//! Product units resolve to one item: local identity resolution first, live
//! navigation only when the URL itself carries no identifier. Listing units
//! read product cards straight off a category page and may revisit the first
//! few detail pages to fill descriptions and galleries.

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{Item, ProductId, WorkKind, WorkUnit};
use crate::infrastructure::config::{AppConfig, ScrapeConfig};
use crate::infrastructure::decoy_filter::{DecoyDetected, DecoyFilter};
use crate::infrastructure::identity_resolver::{IdentityResolver, ResolutionError};
use crate::infrastructure::page_driver::{NavigationOptions, PageDriver, PageGuard, WaitCondition};
use crate::infrastructure::parsing::text::dedupe_images;
use crate::infrastructure::parsing::{ExtractedProduct, ExtractionChain, ExtractionError, ListingCard, ListingParser};

use super::affiliate::AffiliateRewriter;
use super::categorizer::Categorizer;
use super::task::{TaskError, TaskRunner, TaskState, TaskTracker};

/// Everything a task needs, built once per run and shared by all tasks
pub struct CatalogTaskRunner {
    driver: Arc<dyn PageDriver>,
    resolver: IdentityResolver,
    filter: DecoyFilter,
    chain: ExtractionChain,
    listing_parser: ListingParser,
    categorizer: Categorizer,
    rewriter: AffiliateRewriter,
    scrape: ScrapeConfig,
    run_started: DateTime<Utc>,
}

impl CatalogTaskRunner {
    pub fn new(config: &AppConfig, driver: Arc<dyn PageDriver>, run_started: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            driver,
            resolver: IdentityResolver::new(&config.identity)?,
            filter: DecoyFilter::new(&config.filter)?,
            chain: ExtractionChain::new(&config.extraction)?,
            listing_parser: ListingParser::with_config(&config.extraction)?,
            categorizer: Categorizer::new(&config.categorizer),
            rewriter: AffiliateRewriter::new(config.affiliate.clone()),
            scrape: config.scrape.clone(),
            run_started,
        })
    }

    fn options(&self, wait_condition: WaitCondition) -> NavigationOptions {
        NavigationOptions::new(wait_condition, self.scrape.navigation_timeout())
    }

    /// Settle wait followed by dialog dismissal, both best-effort
    async fn settle(&self, page: &mut PageGuard) {
        page.settle(self.scrape.settle_timeout()).await;
        let closed = page.dismiss_dialogs(self.scrape.dialog_timeout()).await;
        if closed > 0 {
            debug!("Dismissed {} dialogs", closed);
        }
    }

    /// Denylist and host check of the URL a page landed on
    fn check_landing(&self, url: &str) -> Result<(), DecoyDetected> {
        self.filter.check(url, None)
    }

    fn resolve_landing(&self, page: &PageGuard) -> Option<ProductId> {
        let landed = page.current_url()?;
        self.resolver.resolve(&landed).ok()
    }

    // ---- product units ----

    async fn run_product(&self, unit: &WorkUnit) -> Result<Item, TaskError> {
        let mut tracker = TaskTracker::start(unit.source_url.clone());
        let mut page = PageGuard::open(self.driver.as_ref(), unit.source_url.clone()).await?;
        let result = self.product_body(&mut page, unit, &mut tracker).await;
        page.close().await;
        tracker.finish(result)
    }

    async fn product_body(
        &self,
        page: &mut PageGuard,
        unit: &WorkUnit,
        tracker: &mut TaskTracker,
    ) -> Result<Item, TaskError> {
        let options = self.options(WaitCondition::DomContentLoaded);

        let id = match self.resolver.resolve(&unit.source_url) {
            Ok(id) => id,
            Err(_) => {
                debug!("No local identity for {}, resolving live", unit.source_url);
                let id = self.resolve_live(page, &unit.source_url, &options, tracker).await?;
                tracker.advance(TaskState::Navigating);
                id
            }
        };
        let canonical = self.resolver.canonical_url(&id);

        if page.current_url().as_deref() != Some(canonical.as_str()) {
            self.filter.check_url(&canonical)?;
            page.navigate(&canonical, &options).await?;
        }
        tracker.advance(TaskState::Settling);
        self.settle(page).await;
        self.verify_landing(page, &unit.source_url, &options, tracker).await?;

        tracker.advance(TaskState::Extracting);
        let snapshot = page.snapshot().await?;
        let product = self.chain.extract_product(&snapshot.url, &snapshot.html)?;
        self.filter.check_title(&snapshot.url, &product.title)?;

        let text = match product.description.as_deref() {
            Some(description) => format!("{} {}", product.title, description),
            None => product.title.clone(),
        };
        let category = self.categorizer.assign(unit.category.as_deref(), &text).to_string();

        debug!("Extracted {} from {}", product.title, canonical);
        Ok(self.build_item(id, canonical, category, product))
    }

    /// Navigate the raw input and read the identifier off the final URL; one
    /// more settle period and one retry are allowed for slow client redirects
    async fn resolve_live(
        &self,
        page: &mut PageGuard,
        source_url: &str,
        options: &NavigationOptions,
        tracker: &mut TaskTracker,
    ) -> Result<ProductId, TaskError> {
        self.filter.check_url(source_url)?;

        for attempt in 1..=2 {
            if attempt > 1 {
                debug!("Retrying navigation to {} for identity", source_url);
                tracker.advance(TaskState::Navigating);
            }

            if let Err(e) = page.navigate(source_url, options).await {
                match self.resolve_landing(page) {
                    Some(id) => return Ok(id),
                    None => return Err(e.into()),
                }
            }
            tracker.advance(TaskState::Settling);

            if let Some(id) = self.resolve_landing(page) {
                return Ok(id);
            }
            page.settle(self.scrape.settle_timeout()).await;
            if let Some(id) = self.resolve_landing(page) {
                return Ok(id);
            }
        }

        Err(ResolutionError::NotFound {
            url: page.current_url().unwrap_or_else(|| source_url.to_string()),
        }
        .into())
    }

    /// A decoy landing gets one second chance through the nested redirect
    /// target, if either URL carries one
    async fn verify_landing(
        &self,
        page: &mut PageGuard,
        source_url: &str,
        options: &NavigationOptions,
        tracker: &mut TaskTracker,
    ) -> Result<(), TaskError> {
        let Some(landed) = page.current_url() else {
            return Ok(());
        };
        let Err(decoy) = self.check_landing(&landed) else {
            return Ok(());
        };

        let target = self
            .resolver
            .redirect_target(&landed)
            .or_else(|| self.resolver.redirect_target(source_url))
            .filter(|target| self.filter.check_url(target).is_ok());
        let Some(target) = target else {
            return Err(decoy.into());
        };

        warn!("{}; trying redirect target {}", decoy, target);
        tracker.advance(TaskState::Navigating);
        page.navigate(&target, options).await?;
        tracker.advance(TaskState::Settling);
        self.settle(page).await;

        let landed = page.current_url().unwrap_or(target);
        self.check_landing(&landed)?;
        Ok(())
    }

    fn build_item(&self, id: ProductId, source_url: String, category: String, product: ExtractedProduct) -> Item {
        let outbound_url = self.rewriter.rewrite(&source_url, &category);
        Item {
            id: id.into_inner(),
            title: product.title,
            price: product.price,
            primary_image: product.primary_image,
            images: product.images,
            description: product.description,
            category,
            outbound_url,
            source_url,
            last_seen: Some(self.run_started),
        }
    }

    // ---- listing units ----

    async fn run_listing(&self, unit: &WorkUnit) -> Result<Vec<Item>, TaskError> {
        let started = Instant::now();
        let mut tracker = TaskTracker::start(unit.source_url.clone());
        let mut page = PageGuard::open(self.driver.as_ref(), unit.source_url.clone()).await?;
        let result = self.listing_body(&mut page, unit, &mut tracker, started).await;
        page.close().await;
        tracker.finish(result)
    }

    async fn listing_body(
        &self,
        page: &mut PageGuard,
        unit: &WorkUnit,
        tracker: &mut TaskTracker,
        started: Instant,
    ) -> Result<Vec<Item>, TaskError> {
        self.filter.check_url(&unit.source_url)?;
        page.navigate(&unit.source_url, &self.options(WaitCondition::NetworkIdle))
            .await?;
        tracker.advance(TaskState::Settling);
        self.settle(page).await;

        let landed = page.current_url().unwrap_or_else(|| unit.source_url.clone());
        self.check_landing(&landed)?;

        tracker.advance(TaskState::Extracting);
        let snapshot = page.snapshot().await?;
        let cards = self.listing_parser.parse(&snapshot.url, &snapshot.html);
        let card_count = cards.len();
        let mut items = self.items_from_cards(unit, cards);

        if items.is_empty() {
            return Err(ExtractionError::insufficient(&snapshot.url, vec!["productCards"]).into());
        }
        info!(
            "📦 Listing {}: {} cards, {} items kept",
            unit.source_url,
            card_count,
            items.len()
        );

        if self.scrape.enrich_details && self.scrape.enrich_limit_per_run > 0 {
            self.enrich(page, &mut items, tracker, started).await;
        }
        Ok(items)
    }

    /// Turn cards into items: genuine on-domain links only, deduplicated by
    /// identifier, capped per page and per run
    fn items_from_cards(&self, unit: &WorkUnit, cards: Vec<ListingCard>) -> Vec<Item> {
        let cap = limit(self.scrape.items_per_category_cap).min(limit(self.scrape.max_new_items_per_category));
        let mut seen: HashSet<String> = HashSet::new();
        let mut items = Vec::new();

        for card in cards {
            if items.len() >= cap {
                break;
            }
            let Some(item) = self.item_from_card(unit, card) else {
                continue;
            };
            if seen.insert(item.id.clone()) {
                items.push(item);
            }
        }
        items
    }

    fn item_from_card(&self, unit: &WorkUnit, card: ListingCard) -> Option<Item> {
        if let Some(href) = card.href.as_deref() {
            if let Err(e) = self.check_landing(href) {
                debug!("Skipping card: {}", e);
                return None;
            }
        }

        let id = card
            .id
            .map(ProductId::new)
            .or_else(|| card.href.as_deref().and_then(|href| self.resolver.resolve(href).ok()))?;
        let (Some(title), Some(image)) = (card.title, card.image) else {
            debug!("Skipping card {} without title or image", id);
            return None;
        };

        let source_url = self.resolver.canonical_url(&id);
        if let Err(e) = self.filter.check_title(&source_url, &title) {
            debug!("Skipping card: {}", e);
            return None;
        }

        let category = self.categorizer.assign(unit.category.as_deref(), &title).to_string();
        let product = ExtractedProduct {
            title,
            price: card.price,
            images: vec![image.clone()],
            primary_image: image,
            description: None,
        };
        Some(self.build_item(id, source_url, category, product))
    }

    /// Revisit the first detail pages on the same page, stopping before the
    /// next visit could overrun the task budget
    async fn enrich(&self, page: &mut PageGuard, items: &mut [Item], tracker: &mut TaskTracker, started: Instant) {
        let budget = self.scrape.task_budget();
        let step = self.scrape.navigation_timeout() + self.scrape.settle_timeout();
        let options = self.options(WaitCondition::DomContentLoaded);
        let mut enriched = 0;

        for item in items.iter_mut().take(self.scrape.enrich_limit_per_run) {
            if !budget.is_zero() && started.elapsed() + step > budget {
                info!("Stopping detail enrichment after {} items to stay within budget", enriched);
                break;
            }

            tracker.advance(TaskState::Navigating);
            match self.enrich_item(page, item, &options, tracker).await {
                Ok(()) => enriched += 1,
                Err(e) => warn!("Detail enrichment failed for {}: {}", item.source_url, e),
            }
            if tracker.state() == TaskState::Navigating {
                tracker.advance(TaskState::Settling);
            }
            tracker.advance(TaskState::Extracting);
        }

        debug!("Enriched {} of {} listing items", enriched, items.len());
    }

    async fn enrich_item(
        &self,
        page: &mut PageGuard,
        item: &mut Item,
        options: &NavigationOptions,
        tracker: &mut TaskTracker,
    ) -> Result<(), TaskError> {
        self.filter.check_url(&item.source_url)?;
        page.navigate(&item.source_url, options).await?;
        tracker.advance(TaskState::Settling);
        self.settle(page).await;

        let landed = page.current_url().unwrap_or_else(|| item.source_url.clone());
        self.check_landing(&landed)?;

        tracker.advance(TaskState::Extracting);
        let snapshot = page.snapshot().await?;
        let detail = self.chain.extract(&snapshot.url, &snapshot.html);
        if let Some(title) = detail.title.as_deref() {
            self.filter.check_title(&snapshot.url, title)?;
        }

        if item.description.is_none() {
            item.description = detail.description;
        }
        let primary = std::iter::once(item.primary_image.clone()).filter(|image| !image.is_empty());
        item.images = dedupe_images(primary.chain(detail.images).chain(detail.image));
        Ok(())
    }
}

/// Zero disables a cap
fn limit(cap: usize) -> usize {
    if cap == 0 { usize::MAX } else { cap }
}

#[async_trait]
impl TaskRunner for CatalogTaskRunner {
    async fn run(&self, unit: &WorkUnit) -> Result<Vec<Item>, TaskError> {
        match unit.kind {
            WorkKind::Product => self.run_product(unit).await.map(|item| vec![item]),
            WorkKind::Listing => self.run_listing(unit).await,
        }
    }
}
