use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::normalize;

/// One sale transaction as scraped. Text fields are kept in display form;
/// the numeric and calendar views are derived on demand and never take part
/// in identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCandidate {
    pub date_sold: String,
    pub price: String,
    pub price_change_pct: Option<String>,
    pub property_type: Option<String>,
    pub tenure: Option<String>,
}

impl SaleCandidate {
    #[must_use]
    pub fn new(date_sold: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            date_sold: date_sold.into(),
            price: price.into(),
            ..Self::default()
        }
    }

    /// Canonical form used for persistence: normalized date and price,
    /// upper-cased labels, blank optional text dropped.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            date_sold: normalize::normalize_date(&self.date_sold),
            price: normalize::normalize_price(&self.price),
            price_change_pct: non_blank(self.price_change_pct.as_deref()),
            property_type: self
                .property_type
                .as_deref()
                .and_then(normalize::normalize_label),
            tenure: self.tenure.as_deref().and_then(normalize::normalize_label),
        }
    }

    /// `(date_sold, price)`; together with the owning property this is the
    /// uniqueness key of a sale.
    #[must_use]
    pub fn identity(&self) -> (&str, &str) {
        (&self.date_sold, &self.price)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date_sold.trim().is_empty() && self.price.trim().is_empty()
    }

    #[must_use]
    pub fn price_numeric(&self) -> Option<i64> {
        normalize::parse_price_to_int(&self.price)
    }

    #[must_use]
    pub fn date_sold_iso(&self) -> Option<NaiveDate> {
        normalize::parse_date_to_iso(&self.date_sold)
    }
}

/// A property and its sale history as extracted from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCandidate {
    pub address: String,
    pub postcode: Option<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub url: Option<String>,
    pub extra_features: Vec<String>,
    pub floorplan_urls: Vec<String>,
    pub sales: Vec<SaleCandidate>,
}

impl PropertyCandidate {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Canonical form consumed by the merge engine.
    ///
    /// The postcode falls back to the one embedded in the address, counts of
    /// zero become absent, and sales are normalized with empty rows and
    /// repeated identities dropped (first occurrence wins).
    #[must_use]
    pub fn normalized(&self) -> Self {
        let address = normalize::normalize_address(&self.address);
        let postcode = self
            .postcode
            .as_deref()
            .filter(|pc| !pc.trim().is_empty())
            .map(normalize::format_postcode)
            .or_else(|| normalize::extract_postcode(&address).map(|pc| normalize::format_postcode(&pc)));

        let mut sales: Vec<SaleCandidate> = Vec::with_capacity(self.sales.len());
        for sale in self.sales.iter().filter(|s| !s.is_empty()) {
            let sale = sale.normalized();
            if !sales.iter().any(|s| s.identity() == sale.identity()) {
                sales.push(sale);
            }
        }

        Self {
            address,
            postcode,
            property_type: self
                .property_type
                .as_deref()
                .and_then(normalize::normalize_label),
            bedrooms: self.bedrooms.filter(|n| *n > 0),
            bathrooms: self.bathrooms.filter(|n| *n > 0),
            url: non_blank(self.url.as_deref()),
            extra_features: dedup_non_blank(&self.extra_features),
            floorplan_urls: dedup_non_blank(&self.floorplan_urls),
            sales,
        }
    }

    /// Fold another shape of the same property into this one: gaps are
    /// filled from `other`, list entries and sales are unioned.
    pub fn absorb(&mut self, other: PropertyCandidate) {
        fill(&mut self.postcode, other.postcode);
        fill(&mut self.property_type, other.property_type);
        fill(&mut self.bedrooms, other.bedrooms.filter(|n| *n > 0));
        fill(&mut self.bathrooms, other.bathrooms.filter(|n| *n > 0));
        fill(&mut self.url, other.url);
        union(&mut self.extra_features, other.extra_features);
        union(&mut self.floorplan_urls, other.floorplan_urls);
        for sale in other.sales {
            let key = sale.normalized();
            let seen = self
                .sales
                .iter()
                .any(|s| s.normalized().identity() == key.identity());
            if !seen {
                self.sales.push(sale);
            }
        }
    }

    /// Latest sale by derived calendar date. When no sale has a parseable
    /// date the first listed sale is returned.
    #[must_use]
    pub fn most_recent_sale(&self) -> Option<&SaleCandidate> {
        self.sales
            .iter()
            .filter_map(|s| s.date_sold_iso().map(|d| (d, s)))
            .max_by_key(|(d, _)| *d)
            .map(|(_, s)| s)
            .or_else(|| self.sales.first())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn dedup_non_blank(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = normalize::collapse_whitespace(value);
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn fill<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

fn union(target: &mut Vec<String>, incoming: Vec<String>) {
    for value in incoming {
        if !target.contains(&value) {
            target.push(value);
        }
    }
}
