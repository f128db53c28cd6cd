//! Product-page extraction.
//!
//! Turns acquired HTML into a flat [`ProductRecord`]. Each field is an
//! ordered list of rules; the first rule yielding a non-empty value wins and
//! fields no rule can fill read [`NOT_FOUND`]. Extraction never fails.
//!
//! `scraper::Html` is `!Send`, so extraction stays synchronous.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use serde::{Serialize, Serializer};

use crate::core::types::RawContent;

/// Placeholder for fields absent from the page.
pub const NOT_FOUND: &str = "Not found";

const IMAGE_PATH: &str = "/images/I/";
const IMAGE_HOST: &str = "https://m.media-amazon.com/images/I/";

/// Converts acquired content into a domain record.
pub trait ExtractionAdapter {
    type Output;

    fn extract(&self, content: &RawContent) -> Self::Output;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub title: String,
    pub price: String,
    pub mrp: String,
    pub asin: String,
    pub sku_id: String,
    pub percentage_discount: String,
    pub rating: String,
    pub num_ratings: String,
    #[serde(serialize_with = "list_or_not_found")]
    pub about_this_item: Vec<String>,
    pub content_type: String,
    pub images: Vec<String>,
}

fn list_or_not_found<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    if items.is_empty() {
        serializer.serialize_str(NOT_FOUND)
    } else {
        items.serialize(serializer)
    }
}

/// How one field value is read from the document.
#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Text of the first match.
    Text(&'static str),
    /// Attribute of the first match.
    Attr(&'static str, &'static str),
    /// First whitespace-separated word of the first match.
    FirstWord(&'static str),
    /// Value cell of the first row whose text mentions `label`.
    LabelledRow {
        rows: &'static str,
        label: &'static str,
        value: &'static str,
    },
}

const TITLE: &[Rule] = &[Rule::Text("span#productTitle"), Rule::Text("#title")];
const PRICE: &[Rule] = &[
    Rule::Text("span.a-price-whole"),
    Rule::Text("#corePrice_feature_div span.a-offscreen"),
];
const MRP: &[Rule] = &[
    Rule::Text("span.a-price.a-text-price span.a-offscreen"),
    Rule::Text("span.basisPrice span.a-offscreen"),
];
const ASIN: &[Rule] = &[
    Rule::Attr("input[name='ASIN']", "value"),
    Rule::Attr("#averageCustomerReviews[data-asin]", "data-asin"),
];
const SKU: &[Rule] = &[
    Rule::LabelledRow {
        rows: "#productDetails_detailBullets_sections1 tr",
        label: "Item model number",
        value: "td",
    },
    Rule::LabelledRow {
        rows: "table#productDetails_techSpec_section_1 tr",
        label: "Model Number",
        value: "td",
    },
    Rule::Text("tr.po-model_number td.a-span9"),
];
const DISCOUNT: &[Rule] = &[Rule::Text("span.savingsPercentage")];
const RATING: &[Rule] = &[Rule::FirstWord("span.a-icon-alt")];
const NUM_RATINGS: &[Rule] = &[Rule::Text("span#acrCustomerReviewText")];

/// `(list, item)` selector pairs for the feature bullets.
const ABOUT: &[(&str, &str)] = &[
    (
        "ul.a-unordered-list.a-vertical.a-spacing-small",
        "li span.a-list-item.a-size-base.a-color-base",
    ),
    ("#feature-bullets ul", "li span.a-list-item"),
];

/// Extractor for retail product detail pages.
#[derive(Debug, Clone, Default)]
pub struct ProductExtractor;

impl ProductExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_html(&self, html: &str, page_url: Option<&str>) -> ProductRecord {
        let document = Html::parse_document(html);

        let price = first_value(&document, PRICE).map(|p| p.trim_end_matches('.').to_string());
        let mrp = first_value(&document, MRP);
        let percentage_discount = first_value(&document, DISCOUNT).or_else(|| {
            match (&price, &mrp) {
                (Some(price), Some(mrp)) => computed_discount(price, mrp),
                _ => None,
            }
        });
        let asin = first_value(&document, ASIN).or_else(|| page_url.and_then(asin_from_url));

        ProductRecord {
            title: or_not_found(first_value(&document, TITLE)),
            price: or_not_found(price),
            mrp: or_not_found(mrp),
            asin: or_not_found(asin),
            sku_id: or_not_found(first_value(&document, SKU)),
            percentage_discount: or_not_found(percentage_discount),
            rating: or_not_found(first_value(&document, RATING)),
            num_ratings: or_not_found(first_value(&document, NUM_RATINGS)),
            about_this_item: about_items(&document),
            content_type: content_type(&document).to_string(),
            images: image_urls(&document),
        }
    }
}

impl ExtractionAdapter for ProductExtractor {
    type Output = ProductRecord;

    fn extract(&self, content: &RawContent) -> ProductRecord {
        self.extract_html(&content.text(), Some(content.url.as_str()))
    }
}

fn or_not_found(value: Option<String>) -> String {
    value.unwrap_or_else(|| NOT_FOUND.to_string())
}

/// Selectors are static; an unparsable one simply never matches.
fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_match<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    document.select(&selector(css)?).next()
}

fn apply(document: &Html, rule: Rule) -> Option<String> {
    match rule {
        Rule::Text(css) => first_match(document, css).map(element_text),
        Rule::Attr(css, attr) => first_match(document, css)
            .and_then(|el| el.value().attr(attr))
            .map(|value| value.trim().to_string()),
        Rule::FirstWord(css) => first_match(document, css)
            .map(element_text)
            .and_then(|text| text.split_whitespace().next().map(str::to_string)),
        Rule::LabelledRow { rows, label, value } => {
            let value = selector(value)?;
            document
                .select(&selector(rows)?)
                .find(|row| element_text(*row).contains(label))
                .and_then(|row| row.select(&value).next())
                .map(element_text)
        }
    }
}

fn first_value(document: &Html, rules: &[Rule]) -> Option<String> {
    rules
        .iter()
        .filter_map(|rule| apply(document, *rule))
        .find(|value| !value.is_empty())
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.trim_end_matches('.').parse().ok()
}

fn computed_discount(price: &str, mrp: &str) -> Option<String> {
    let price = parse_amount(price)?;
    let mrp = parse_amount(mrp)?;
    if mrp <= 0.0 {
        return None;
    }
    Some(format!("{:.2}%", (mrp - price) / mrp * 100.0))
}

/// Identifier following `/dp/` in a product URL.
fn asin_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/dp/")?;
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!id.is_empty()).then_some(id)
}

fn about_items(document: &Html) -> Vec<String> {
    for (list, item) in ABOUT {
        let (Some(list), Some(item)) = (selector(list), selector(item)) else {
            continue;
        };
        let Some(container) = document.select(&list).next() else {
            continue;
        };
        let items: Vec<String> = container
            .select(&item)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}

fn content_type(document: &Html) -> &'static str {
    if first_match(document, "div#aplus").is_some() {
        "A+ Content"
    } else if first_match(document, "div#productDescription").is_some() {
        "Regular Description"
    } else {
        "No Description"
    }
}

/// Full-size image URLs rebuilt from the thumbnail strip, in page order.
fn image_urls(document: &Html) -> Vec<String> {
    let Some(thumbs) = selector("div#altImages img[src]") else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    document
        .select(&thumbs)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| {
            let (_, tail) = src.split_once(IMAGE_PATH)?;
            let id = tail.split("._").next()?;
            (!id.is_empty()).then(|| format!("{}{}._SY395_.jpg", IMAGE_HOST, id))
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
