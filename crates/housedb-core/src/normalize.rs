//! Text normalization for addresses, prices, sale dates and UK postcodes.
//!
//! Everything here is pure and total: malformed input comes back trimmed
//! rather than as an error, since the scraped text is informational and the
//! derived values (`parse_price_to_int`, `parse_date_to_iso`) are optional.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static POSTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[A-Z]{1,2}\d{1,2}[A-Z]?\s?\d[A-Z]{2}").expect("valid postcode regex")
});

static CANONICAL_PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^£\d{1,3}(,\d{3})*$").expect("valid price regex"));

static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid digit regex"));

static SALE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s+([A-Za-z]+)\s+(\d{4})").expect("valid sale date regex")
});

static LEADING_ZERO_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0(\d)\b").expect("valid day regex"));

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Trim and collapse runs of inner whitespace to a single space.
#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Addresses are the natural key of a property, so two spellings differing
/// only in whitespace must normalize to the same string.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    collapse_whitespace(address)
}

/// Normalize a price to the `£N,NNN` display form.
///
/// Already-canonical input is returned as-is. Otherwise the pound sign,
/// the `Â` mojibake that precedes it in mis-decoded pages, and thousands
/// separators are stripped and the first digit run is regrouped. Text with
/// no digits at all (e.g. `"POA"`) is returned trimmed.
///
/// # Examples
///
/// ```
/// use housedb_core::normalize::normalize_price;
///
/// assert_eq!(normalize_price("Â£450000"), "£450,000");
/// assert_eq!(normalize_price("£1,250,000"), "£1,250,000");
/// ```
#[must_use]
pub fn normalize_price(price: &str) -> String {
    let trimmed = price.trim();
    if CANONICAL_PRICE_RE.is_match(trimmed) {
        return trimmed.to_string();
    }
    let cleaned = strip_price_noise(trimmed);
    match DIGIT_RUN_RE.find(&cleaned) {
        Some(m) => format!("£{}", group_thousands(m.as_str())),
        None => trimmed.to_string(),
    }
}

/// Format a numeric price from structured data. Fractional pence are
/// rounded; negative and non-finite values have no sensible display form.
#[must_use]
pub fn format_price_number(value: f64) -> Option<String> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let rounded = format!("{:.0}", value.round());
    Some(format!("£{}", group_thousands(&rounded)))
}

/// `"£450,000"` → `Some(450_000)`. Returns `None` when the text holds no
/// digits or the amount overflows.
#[must_use]
pub fn parse_price_to_int(price: &str) -> Option<i64> {
    let cleaned = strip_price_noise(price);
    DIGIT_RUN_RE
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Normalize a sale date: whitespace collapsed, leading zero of the day
/// dropped (`"04 Nov 2023"` → `"4 Nov 2023"`).
#[must_use]
pub fn normalize_date(date: &str) -> String {
    let collapsed = collapse_whitespace(date);
    LEADING_ZERO_DAY_RE.replace(&collapsed, "$1").into_owned()
}

/// Derive a calendar date from `"4 Nov 2023"`-style text. ISO `2023-11-04`
/// input is accepted too. Impossible dates (`"31 Feb 2020"`) yield `None`.
#[must_use]
pub fn parse_date_to_iso(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }
    if let Some(caps) = SALE_DATE_RE.captures(date) {
        let day: u32 = caps[1].parse().ok()?;
        let month_name = caps[2].to_ascii_lowercase();
        let prefix = month_name.get(..3)?;
        let month = MONTHS.iter().position(|m| *m == prefix)?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()? + 1, day);
    }
    date.get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

/// First UK postcode found in free text, upper-cased. Returned as written
/// (with or without the inner space); use [`format_postcode`] for the
/// canonical form.
#[must_use]
pub fn extract_postcode(text: &str) -> Option<String> {
    POSTCODE_RE
        .find(text)
        .map(|m| m.as_str().trim().to_ascii_uppercase())
}

/// URL form of a postcode: upper-cased, spaces and dashes removed
/// (`"sw20 8ne"` → `"SW208NE"`).
#[must_use]
pub fn postcode_for_url(postcode: &str) -> String {
    postcode
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Canonical display form with a single space before the inward code
/// (`"SW208NE"` → `"SW20 8NE"`). Inputs shorter than five characters are
/// outcodes or fragments and are returned in URL form.
#[must_use]
pub fn format_postcode(postcode: &str) -> String {
    let compact = postcode_for_url(postcode);
    if compact.len() >= 5 && compact.is_ascii() {
        let split = compact.len() - 3;
        format!("{} {}", &compact[..split], &compact[split..])
    } else {
        compact
    }
}

/// Outward half of a postcode (`"SW20 8NE"` → `"SW20"`). A bare outcode is
/// returned unchanged.
#[must_use]
pub fn outcode(postcode: &str) -> Option<String> {
    let formatted = format_postcode(postcode);
    if formatted.is_empty() {
        return None;
    }
    Some(
        formatted
            .split_once(' ')
            .map_or(formatted.as_str(), |(out, _)| out)
            .to_string(),
    )
}

/// Upper-cased, whitespace-collapsed classification text (property type,
/// tenure). Empty input maps to `None`.
#[must_use]
pub fn normalize_label(value: &str) -> Option<String> {
    let collapsed = collapse_whitespace(value);
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_uppercase())
    }
}

fn strip_price_noise(price: &str) -> String {
    price
        .chars()
        .filter(|c| !matches!(c, '£' | 'Â' | ','))
        .collect::<String>()
        .trim()
        .to_string()
}

fn group_thousands(digits: &str) -> String {
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return "0".to_string();
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
