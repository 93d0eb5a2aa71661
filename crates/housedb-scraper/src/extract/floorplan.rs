use crate::stream::{ResolvedValue, Visit};

use super::shape::absolute_url;
use super::ExtractContext;

const URL_KEYS: [&str; 4] = ["url", "src", "href", "imageUrl"];

/// Floorplan image links anywhere in the values, in discovery order without
/// duplicates. Members whose key mentions "floorplan" contribute their URL
/// strings; so does any link whose own text mentions it.
#[must_use]
pub fn floorplan_urls(values: &[ResolvedValue], ctx: &ExtractContext) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |link: &str| {
        let absolute = absolute_url(link, ctx);
        if !found.contains(&absolute) {
            found.push(absolute);
        }
    };

    ResolvedValue::walk_all(values, &mut |node| {
        match node {
            ResolvedValue::Map(map) => {
                for (key, member) in map.iter() {
                    if key.to_ascii_lowercase().contains("floorplan") {
                        for link in links_in(member) {
                            push(link);
                        }
                    }
                }
            }
            ResolvedValue::String(s)
                if is_link(s) && s.to_ascii_lowercase().contains("floorplan") =>
            {
                push(s);
            }
            _ => {}
        }
        Visit::Descend
    });
    found
}

fn is_link(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with('/')
}

fn links_in(value: &ResolvedValue) -> Vec<&str> {
    let mut links = Vec::new();
    value.walk(&mut |node| match node {
        ResolvedValue::String(s) if is_link(s) => {
            links.push(s.as_ref());
            Visit::Skip
        }
        ResolvedValue::List(_) => Visit::Descend,
        ResolvedValue::Map(map) => {
            links.extend(
                URL_KEYS
                    .iter()
                    .filter_map(|k| map.get(*k).and_then(ResolvedValue::as_str))
                    .find(|s| !s.trim().is_empty()),
            );
            Visit::Skip
        }
        _ => Visit::Skip,
    });
    links
}
