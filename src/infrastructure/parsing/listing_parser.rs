//! Product cards on category listing pages
//!
//! The first card selector that matches anything defines the cards; each card
//! yields whatever id, title, image, price and link it carries. Identity
//! resolution, host checks and capping are left to the caller.

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::config::ExtractionSelectors;
use super::dom_heuristics::image_source;
use super::text::{absolutize, clean_title, parse_price};
use super::{attr, compile_selectors, element_text, fixed_selector};

/// Raw fields of one listing card
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingCard {
    /// Identifier carried by a data attribute, if any
    pub id: Option<String>,
    pub title: Option<String>,
    pub image: Option<String>,
    pub price: Option<f64>,
    /// Absolute link to the product page
    pub href: Option<String>,
}

pub struct ListingParser {
    card_selectors: Vec<Selector>,
    title_selectors: Vec<Selector>,
    price_selectors: Vec<Selector>,
    link: Selector,
    image: Selector,
}

const ID_ATTRIBUTES: [&str; 3] = ["data-goods-id", "data-sku-id", "data-id"];

impl ListingParser {
    pub fn new() -> Result<Self> {
        Self::with_config(&ExtractionSelectors::default())
    }

    pub fn with_config(selectors: &ExtractionSelectors) -> Result<Self> {
        Ok(Self {
            card_selectors: compile_selectors(&selectors.listing_card)?,
            title_selectors: compile_selectors(&selectors.listing_title)?,
            price_selectors: compile_selectors(&selectors.listing_price)?,
            link: fixed_selector("a[href]")?,
            image: fixed_selector("img, [style*='background-image']")?,
        })
    }

    /// Read every card on the page in document order
    pub fn parse(&self, page_url: &str, html: &str) -> Vec<ListingCard> {
        let document = Html::parse_document(html);

        for (i, selector) in self.card_selectors.iter().enumerate() {
            let cards: Vec<ListingCard> = document
                .select(selector)
                .map(|element| self.read_card(&element, page_url))
                .collect();

            if !cards.is_empty() {
                debug!("Found {} listing cards using selector {}", cards.len(), i);
                return cards;
            }
        }

        debug!("No listing cards found on {}", page_url);
        Vec::new()
    }

    fn read_card(&self, card: &ElementRef<'_>, page_url: &str) -> ListingCard {
        let id = ID_ATTRIBUTES
            .iter()
            .find_map(|name| attr(card, name))
            .map(str::to_string);

        let href = if card.value().name() == "a" {
            attr(card, "href")
        } else {
            card.select(&self.link).find_map(|a| attr(&a, "href"))
        }
        .and_then(|href| absolutize(page_url, href));

        ListingCard {
            id,
            title: self.card_title(card),
            image: image_source(card, page_url)
                .or_else(|| card.select(&self.image).find_map(|el| image_source(&el, page_url))),
            price: self.card_price(card),
            href,
        }
    }

    /// Title element text, then image alt text, then the card's title attribute
    fn card_title(&self, card: &ElementRef<'_>) -> Option<String> {
        self.title_selectors
            .iter()
            .find_map(|selector| {
                card.select(selector).find_map(|el| {
                    clean_title(&element_text(&el)).or_else(|| attr(&el, "title").and_then(clean_title))
                })
            })
            .or_else(|| card.select(&self.image).find_map(|img| attr(&img, "alt").and_then(clean_title)))
            .or_else(|| attr(card, "title").and_then(clean_title))
    }

    fn card_price(&self, card: &ElementRef<'_>) -> Option<f64> {
        attr(card, "data-price").and_then(parse_price).or_else(|| {
            self.price_selectors.iter().find_map(|selector| {
                card.select(selector).find_map(|el| {
                    attr(&el, "data-price")
                        .and_then(parse_price)
                        .or_else(|| parse_price(&element_text(&el)))
                })
            })
        })
    }
}
