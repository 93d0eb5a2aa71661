//! Markup fallback for detail pages whose stream lacks parts of the record.

use std::sync::LazyLock;

use housedb_core::normalize;
use housedb_core::{PropertyCandidate, SaleCandidate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::shape::absolute_url;
use super::ExtractContext;

static FIRST_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid number regex"));

const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid static selector")
}

fn text_of(element: ElementRef<'_>) -> String {
    normalize::collapse_whitespace(&element.text().collect::<String>())
}

/// Everything the page markup states about the property.
///
/// Address from the first `<h1>`, sale history from the first `<table>`,
/// key features from the list after the "Key features" heading, counts and
/// type from `<dt>`/`<dd>` pairs, and floorplan images.
#[must_use]
pub fn property_from_html(html: &str, ctx: &ExtractContext) -> PropertyCandidate {
    let document = Html::parse_document(html);
    let mut candidate = PropertyCandidate::default();

    if let Some(h1) = document.select(&selector("h1")).next() {
        candidate.address = normalize::normalize_address(&text_of(h1));
    }
    candidate.sales = sales_table(&document);
    candidate.extra_features = key_features(&document);
    apply_definition_list(&document, &mut candidate);
    candidate.floorplan_urls = floorplan_images(&document, ctx);
    candidate.postcode = normalize::extract_postcode(&candidate.address)
        .map(|pc| normalize::format_postcode(&pc));
    candidate
}

/// Rows of the first table: `Date sold | Price change % | Price | Tenure`,
/// or with a `Property` column before tenure when the header has five cells.
fn sales_table(document: &Html) -> Vec<SaleCandidate> {
    let Some(table) = document.select(&selector("table")).next() else {
        return Vec::new();
    };
    let row_sel = selector("tr");
    let cell_sel = selector("th, td");
    let mut rows = table.select(&row_sel);
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let has_property_column = header.select(&cell_sel).count() >= 5;

    let mut sales = Vec::new();
    for row in rows {
        let cells: Vec<String> = row.select(&cell_sel).map(text_of).collect();
        if cells.len() < 3 {
            continue;
        }
        let cell = |i: usize| cells.get(i).filter(|c| !c.is_empty()).cloned();
        let (property_type, tenure) = if has_property_column && cells.len() >= 5 {
            (cell(3), cell(4))
        } else {
            (None, cell(3))
        };
        let sale = SaleCandidate {
            date_sold: normalize::normalize_date(&cells[0]),
            price: normalize::normalize_price(&cells[2]),
            price_change_pct: cell(1),
            property_type,
            tenure,
        };
        if !sale.is_empty() {
            sales.push(sale);
        }
    }
    sales
}

fn key_features(document: &Html) -> Vec<String> {
    let heading = document
        .select(&selector("h2"))
        .find(|h2| text_of(*h2).to_lowercase().contains("key features"));
    let Some(heading) = heading else {
        return Vec::new();
    };
    let list = heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "ul");
    let Some(list) = list else {
        return Vec::new();
    };
    list.select(&selector("li"))
        .map(text_of)
        .filter(|text| !text.is_empty())
        .collect()
}

fn apply_definition_list(document: &Html, candidate: &mut PropertyCandidate) {
    let dt_selector = selector("dt");
    let dd_selector = selector("dd");
    let terms = document.select(&dt_selector);
    let definitions = document.select(&dd_selector);
    for (dt, dd) in terms.zip(definitions) {
        let key = text_of(dt).to_lowercase();
        let value = text_of(dd);
        let number = || {
            FIRST_NUMBER_RE
                .find(&value)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .filter(|n| *n > 0)
        };
        if key.contains("bedroom") {
            candidate.bedrooms = candidate.bedrooms.or_else(number);
        } else if key.contains("bathroom") {
            candidate.bathrooms = candidate.bathrooms.or_else(number);
        } else if (key.contains("property type") || key == "type")
            && !value.is_empty()
            && candidate.property_type.is_none()
        {
            candidate.property_type = Some(value);
        }
    }
}

fn floorplan_images(document: &Html, ctx: &ExtractContext) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |link: &str| {
        let link = absolute_url(link, ctx);
        if !link.is_empty() && !urls.contains(&link) {
            urls.push(link);
        }
    };

    for img in document.select(&selector("img")) {
        let attrs = img.value();
        let src = attrs.attr("src").unwrap_or_default();
        let alt = attrs.attr("alt").unwrap_or_default().to_lowercase();
        let class = attrs.attr("class").unwrap_or_default().to_lowercase();
        let mentions = alt.contains("floorplan")
            || class.contains("floorplan")
            || src.to_lowercase().contains("floorplan");
        if mentions && !src.is_empty() {
            push(src);
        }
    }

    let img_sel = selector("img");
    for link in document.select(&selector("a[href]")) {
        let href = link.value().attr("href").unwrap_or_default();
        let text = text_of(link).to_lowercase();
        let lowered = href.to_lowercase();
        if !text.contains("floorplan") && !lowered.contains("floorplan") {
            continue;
        }
        if IMAGE_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
            push(href);
        }
        if let Some(src) = link
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
        {
            push(src);
        }
    }
    urls
}
