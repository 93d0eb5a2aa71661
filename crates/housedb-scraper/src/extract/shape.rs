//! Structural predicates and field readers over resolved maps.
//!
//! The source's payload layout moves around between page versions, so
//! records are recognised by the fields they carry rather than by path.

use std::collections::BTreeMap;

use chrono::Datelike;
use housedb_core::normalize;
use housedb_core::{PropertyCandidate, SaleCandidate};

use super::ExtractContext;
use crate::stream::{Number, ResolvedValue};

pub(crate) type Map = BTreeMap<String, ResolvedValue>;

pub const DATE_KEYS: [&str; 4] = ["dateSold", "date_sold", "soldDate", "date"];
pub const PRICE_KEYS: [&str; 3] = ["price", "displayPrice", "soldPrice"];
pub const ADDRESS_KEYS: [&str; 2] = ["address", "displayAddress"];
pub const LATEST_SALE_KEYS: [&str; 2] = ["latestTransaction", "lastTransaction"];
pub const FEATURE_KEYS: [&str; 2] = ["keyFeatures", "features"];

/// A sale needs a parseable date and a price-like value.
#[must_use]
pub fn looks_like_sale(map: &Map) -> bool {
    sale_date(map).is_some() && sale_price(map).is_some()
}

/// A property needs a non-empty address and at least one sale-shaped
/// record, either in `transactions` or as the latest transaction.
#[must_use]
pub fn looks_like_property(map: &Map) -> bool {
    address_of(map).is_some() && (!transaction_maps(map).is_empty() || latest_sale_map(map).is_some())
}

pub(crate) fn address_of(map: &Map) -> Option<String> {
    ADDRESS_KEYS.iter().find_map(|key| {
        let text = match map.get(*key)? {
            ResolvedValue::String(s) => s.to_string(),
            nested @ ResolvedValue::Map(_) => nested
                .get("displayAddress")
                .and_then(ResolvedValue::as_str)?
                .to_string(),
            _ => return None,
        };
        let text = normalize::normalize_address(&text);
        (!text.is_empty()).then_some(text)
    })
}

fn sale_date(map: &Map) -> Option<String> {
    DATE_KEYS.iter().find_map(|key| {
        let raw = map.get(*key)?.as_str()?;
        let iso = normalize::parse_date_to_iso(raw)?;
        let display = normalize::normalize_date(raw);
        let day_first = display
            .split(' ')
            .next()
            .is_some_and(|day| day.len() <= 2 && day.bytes().all(|b| b.is_ascii_digit()));
        if day_first {
            Some(display)
        } else {
            // ISO timestamps are rendered the way the site displays dates.
            Some(format!("{} {} {}", iso.day(), iso.format("%b"), iso.year()))
        }
    })
}

fn sale_price(map: &Map) -> Option<String> {
    PRICE_KEYS.iter().find_map(|key| match map.get(*key)? {
        ResolvedValue::String(s) if s.chars().any(|c| c.is_ascii_digit()) => {
            Some(normalize::normalize_price(s))
        }
        ResolvedValue::Number(n) => normalize::format_price_number(n.as_f64()),
        nested @ ResolvedValue::Map(_) => nested
            .get("displayPrice")
            .or_else(|| nested.get("amount"))
            .and_then(|inner| match inner {
                ResolvedValue::String(s) if s.chars().any(|c| c.is_ascii_digit()) => {
                    Some(normalize::normalize_price(s))
                }
                ResolvedValue::Number(n) => normalize::format_price_number(n.as_f64()),
                _ => None,
            }),
        _ => None,
    })
}

fn text_field(map: &Map, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        ResolvedValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        ResolvedValue::Number(Number::Int(n)) => Some(n.to_string()),
        ResolvedValue::Number(Number::Float(f)) if f.is_finite() => Some(f.to_string()),
        nested @ ResolvedValue::Map(_) => ["tenureType", "type", "displayName"]
            .iter()
            .find_map(|k| nested.get(k).and_then(ResolvedValue::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    })
}

fn count_field(map: &Map, key: &str) -> Option<u32> {
    map.get(key)
        .and_then(ResolvedValue::as_i64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
}

/// Convert a sale-shaped map. Returns `None` when the map is not one.
#[must_use]
pub fn sale_from_map(map: &Map) -> Option<SaleCandidate> {
    let date_sold = sale_date(map)?;
    let price = sale_price(map)?;
    Some(SaleCandidate {
        date_sold,
        price,
        price_change_pct: text_field(map, &["priceChangePercentage", "priceChange"]),
        property_type: text_field(map, &["propertyType"]),
        tenure: text_field(map, &["tenure"]),
    })
}

pub(crate) fn transaction_maps(map: &Map) -> Vec<&Map> {
    map.get("transactions")
        .and_then(ResolvedValue::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(ResolvedValue::as_map)
                .filter(|m| looks_like_sale(m))
                .collect()
        })
        .unwrap_or_default()
}

fn latest_sale_map(map: &Map) -> Option<&Map> {
    LATEST_SALE_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(ResolvedValue::as_map))
        .find(|m| looks_like_sale(m))
}

pub(crate) fn string_list(value: &ResolvedValue) -> Vec<String> {
    value
        .as_list()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    ResolvedValue::String(s) => Some(s.as_ref()),
                    nested @ ResolvedValue::Map(_) => {
                        nested.get("description").and_then(ResolvedValue::as_str)
                    }
                    _ => None,
                })
                .map(normalize::collapse_whitespace)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn features_of(map: &Map) -> Vec<String> {
    FEATURE_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .map(string_list)
        .find(|list| !list.is_empty())
        .unwrap_or_default()
}

/// Make a site-relative link absolute against the context's base URL.
pub(crate) fn absolute_url(link: &str, ctx: &ExtractContext) -> String {
    let link = link.trim();
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    match (&ctx.base_url, link.starts_with('/')) {
        (Some(base), true) => format!("{}{link}", base.trim_end_matches('/')),
        (Some(base), false) => format!("{}/{link}", base.trim_end_matches('/')),
        (None, _) => link.to_string(),
    }
}

/// Build a candidate from any map with an address. Sales come from the
/// `transactions` list, falling back to the latest transaction.
pub(crate) fn property_from_map(map: &Map, ctx: &ExtractContext) -> Option<PropertyCandidate> {
    let address = address_of(map)?;

    let postcode = map
        .get("postcode")
        .and_then(ResolvedValue::as_str)
        .and_then(normalize::extract_postcode)
        .or_else(|| normalize::extract_postcode(&address))
        .or_else(|| ctx.postcode_hint.clone())
        .map(|pc| normalize::format_postcode(&pc));

    let mut sales: Vec<SaleCandidate> = transaction_maps(map)
        .into_iter()
        .filter_map(sale_from_map)
        .collect();
    if sales.is_empty() {
        sales.extend(latest_sale_map(map).and_then(sale_from_map));
    }

    let url = ["detailUrl", "url", "propertyUrl"]
        .iter()
        .find_map(|key| map.get(*key).and_then(ResolvedValue::as_str))
        .filter(|link| !link.trim().is_empty())
        .map(|link| absolute_url(link, ctx));

    Some(PropertyCandidate {
        address,
        postcode,
        property_type: text_field(map, &["propertyType", "propertySubType"]),
        bedrooms: count_field(map, "bedrooms"),
        bathrooms: count_field(map, "bathrooms"),
        url,
        extra_features: features_of(map),
        floorplan_urls: Vec::new(),
        sales,
    })
}
