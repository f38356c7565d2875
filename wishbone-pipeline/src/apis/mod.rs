pub mod epic;
pub mod factory;
pub mod gog;
pub mod steam;

use wishbone_core::common::error::{PipelineError, Result};
use wishbone_core::domain::RawListing;

/// Trait for storefront-specific extraction.
///
/// `fetch_catalog` pulls the storefront's whole tracked range (the daily
/// bulk extract); `search_listing` resolves a single title against the
/// storefront's search endpoint (the per-name fan-out path). Callers treat a
/// failed search as "no result for this item"; errors never abort a whole
/// extraction run.
#[async_trait::async_trait]
pub trait Storefront: Send + Sync {
    /// Platform tag stamped on every listing from this storefront.
    fn platform_name(&self) -> &'static str;

    async fn fetch_catalog(&self) -> Result<Vec<RawListing>>;

    async fn search_listing(&self, query: &str) -> Result<RawListing>;
}

/// Convert a scraped `£x.yz` / `Free` price token to pence.
pub(crate) fn price_token_to_pence(value: &str) -> Result<i64> {
    let token = value
        .split('£')
        .last()
        .unwrap_or(value)
        .trim()
        .replace('.', "");
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        return token.parse::<i64>().map_err(|e| PipelineError::Parse {
            message: format!("Price out of range: {value}: {e}"),
        });
    }
    // if not numeric, assume free
    if token.eq_ignore_ascii_case("free") {
        return Ok(0);
    }
    Err(PipelineError::Parse {
        message: format!("Unexpected price input: {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pounds_to_pence() {
        assert_eq!(price_token_to_pence("£10.99").unwrap(), 1099);
        assert_eq!(price_token_to_pence("10.99").unwrap(), 1099);
        assert_eq!(price_token_to_pence("£0.79").unwrap(), 79);
    }

    #[test]
    fn free_is_zero() {
        assert_eq!(price_token_to_pence("Free").unwrap(), 0);
        assert_eq!(price_token_to_pence("free").unwrap(), 0);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(price_token_to_pence("Coming Soon").is_err());
    }
}
