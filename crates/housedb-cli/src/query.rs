//! Read-only commands: stored data by postcode, and offline page inspection.

use std::path::Path;

use anyhow::Context;
use housedb_core::normalize;
use housedb_scraper::{detail_from_html, extract, values_from_html, Container, ExtractContext};

/// Format an optional value for display, returning `"-"` when `None`.
fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Print stored properties for a postcode, newest update first.
pub(crate) async fn run_show(
    pool: &sqlx::PgPool,
    postcode: &str,
    with_sales: bool,
) -> anyhow::Result<()> {
    let properties = housedb_db::list_properties_by_postcode(pool, postcode).await?;
    if properties.is_empty() {
        println!(
            "no properties stored for {}",
            normalize::format_postcode(postcode)
        );
        return Ok(());
    }

    for property in &properties {
        println!(
            "{}  [{} | beds {} | baths {} | updated {}]",
            property.address,
            or_dash(property.property_type.as_deref()),
            or_dash(property.bedrooms),
            or_dash(property.bathrooms),
            property.updated_at.format("%Y-%m-%d %H:%M"),
        );
        if with_sales {
            for sale in housedb_db::list_sales(pool, property.id).await? {
                println!(
                    "    {:<12} {:>12}  {}",
                    sale.date_sold,
                    sale.price,
                    or_dash(sale.tenure.as_deref()),
                );
            }
        }
    }
    println!("{} properties", properties.len());
    Ok(())
}

/// Decode a saved page and print the extracted candidates as JSON.
///
/// Detail pages also get the markup fallback so the output matches what a
/// live property scrape would merge; listing pages need a decodable stream.
pub(crate) fn run_inspect(
    file: &Path,
    detail: bool,
    base_url: Option<&str>,
) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let ctx = ExtractContext {
        base_url: base_url.map(|b| b.trim_end_matches('/').to_string()),
        postcode_hint: None,
    };

    let candidates = if detail {
        let candidate = detail_from_html(&html, &ctx);
        if candidate.address.trim().is_empty() {
            Vec::new()
        } else {
            vec![candidate]
        }
    } else {
        let values = values_from_html(&html)?;
        tracing::info!(values = values.len(), "decoded stream");
        extract(&values, Container::Listing, &ctx)
    };
    tracing::info!(properties = candidates.len(), "extracted candidates");

    println!("{}", serde_json::to_string_pretty(&candidates)?);
    Ok(())
}
