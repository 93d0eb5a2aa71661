//! Turning resolved stream values into property candidates.

mod floorplan;
mod html;
mod shape;

pub use floorplan::floorplan_urls;
pub use html::property_from_html;
pub use shape::{looks_like_property, looks_like_sale, sale_from_map};

use housedb_core::{PropertyCandidate, SaleCandidate};

use crate::stream::{ResolvedValue, Visit};
use shape::Map;

/// Which page layout the values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// A paged postcode listing: many properties, latest sale each.
    Listing,
    /// One property's page: full history, features and floorplans.
    Detail,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractContext {
    /// Origin used to make relative links absolute.
    pub base_url: Option<String>,
    /// Postcode assumed for addresses that do not carry one.
    pub postcode_hint: Option<String>,
}

/// Search the values for property records. Records are found by shape, never
/// by path; shapes repeated within the page under the same address are
/// folded into one candidate.
#[must_use]
pub fn extract(
    values: &[ResolvedValue],
    container: Container,
    ctx: &ExtractContext,
) -> Vec<PropertyCandidate> {
    match container {
        Container::Listing => listing(values, ctx),
        Container::Detail => detail(values, ctx).into_iter().collect(),
    }
}

/// Every sale-shaped record in the values, without repeats.
#[must_use]
pub fn find_sales(values: &[ResolvedValue]) -> Vec<SaleCandidate> {
    let mut sales: Vec<SaleCandidate> = Vec::new();
    ResolvedValue::walk_all(values, &mut |node| match node.as_map() {
        Some(map) if looks_like_sale(map) => {
            if let Some(sale) = sale_from_map(map) {
                if !sales.iter().any(|s| s.identity() == sale.identity()) {
                    sales.push(sale);
                }
            }
            Visit::Skip
        }
        _ => Visit::Descend,
    });
    sales
}

/// Property-shaped maps under `roots`. A matched map is not searched
/// further, so its own transactions never count as separate properties.
fn property_maps<'a>(roots: impl IntoIterator<Item = &'a ResolvedValue>) -> Vec<&'a Map> {
    let mut found = Vec::new();
    ResolvedValue::walk_all(roots, &mut |node| match node.as_map() {
        Some(map) if looks_like_property(map) => {
            found.push(map);
            Visit::Skip
        }
        _ => Visit::Descend,
    });
    found
}

fn fold(candidates: impl IntoIterator<Item = PropertyCandidate>) -> Vec<PropertyCandidate> {
    let mut folded: Vec<PropertyCandidate> = Vec::new();
    for candidate in candidates {
        match folded.iter_mut().find(|c| c.address == candidate.address) {
            Some(existing) => existing.absorb(candidate),
            None => folded.push(candidate),
        }
    }
    folded
}

fn listing(values: &[ResolvedValue], ctx: &ExtractContext) -> Vec<PropertyCandidate> {
    let mut lists: Vec<&ResolvedValue> = Vec::new();
    ResolvedValue::walk_all(values, &mut |node| {
        if let Some(list) = node.get("properties").filter(|v| v.as_list().is_some()) {
            lists.push(list);
        }
        Visit::Descend
    });

    let mut maps = property_maps(lists);
    if maps.is_empty() {
        maps = property_maps(values);
    }

    let mut candidates = fold(maps.into_iter().filter_map(|m| shape::property_from_map(m, ctx)));
    for candidate in &mut candidates {
        candidate.sales = candidate.most_recent_sale().cloned().into_iter().collect();
    }
    candidates
}

fn detail(values: &[ResolvedValue], ctx: &ExtractContext) -> Option<PropertyCandidate> {
    let candidates = fold(
        property_maps(values)
            .into_iter()
            .filter_map(|m| shape::property_from_map(m, ctx)),
    );

    let mut best = candidates
        .into_iter()
        .reduce(|best, next| if next.sales.len() > best.sales.len() { next } else { best })
        .or_else(|| loose_detail(values, ctx))?;

    if best.extra_features.is_empty() {
        best.extra_features = first_feature_list(values);
    }
    best.floorplan_urls = floorplan_urls(values, ctx);
    Some(best)
}

/// Detail payloads sometimes keep the address and the transaction list in
/// separate branches. Take the first addressed map and every sale found.
fn loose_detail(values: &[ResolvedValue], ctx: &ExtractContext) -> Option<PropertyCandidate> {
    let mut first: Option<&Map> = None;
    ResolvedValue::walk_all(values, &mut |node| {
        if first.is_some() {
            return Visit::Skip;
        }
        if let Some(map) = node.as_map() {
            if shape::address_of(map).is_some() {
                first = Some(map);
                return Visit::Skip;
            }
        }
        Visit::Descend
    });
    let mut candidate = shape::property_from_map(first?, ctx)?;
    if candidate.sales.is_empty() {
        candidate.sales = find_sales(values);
    }
    Some(candidate)
}

fn first_feature_list(values: &[ResolvedValue]) -> Vec<String> {
    let mut features = Vec::new();
    ResolvedValue::walk_all(values, &mut |node| {
        if !features.is_empty() {
            return Visit::Skip;
        }
        if let Some(map) = node.as_map() {
            features = shape::features_of(map);
        }
        Visit::Descend
    });
    features
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
