pub mod error;
pub mod extract;
pub mod fetch;
pub mod scrape;
pub mod stream;

pub use error::ScrapeError;
pub use extract::{extract, find_sales, property_from_html, Container, ExtractContext};
pub use fetch::{FetchConfig, FetchError, ScraperSession};
pub use scrape::{
    detail_from_html, listing_url, scrape_area, scrape_postcode, scrape_property, AreaOptions,
    AreaReport, FailedItem, PostcodeReport, PostcodeRequest, ScrapeMode,
};
pub use stream::{values_from_html, ResolvedValue, StreamError};
