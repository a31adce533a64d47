use std::sync::Arc;

use chrono::Utc;
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tracing::debug;

use crate::config::QuotesConfig;
use crate::error::SourceError;
use crate::model::{Quote, SourceId};
use crate::source::QuoteSource;

/// Quotes every venue through the criptoya aggregate API:
/// `GET {base_url}/{venue}/{asset}/{fiat}/{volume}`.
pub struct CriptoyaSource {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    base_url: String,
    asset: String,
    fiat: String,
    volume: f64,
}

impl CriptoyaSource {
    pub fn new(config: &QuotesConfig) -> Self {
        // No published limit; one tick fans out to every venue at once, so
        // keep bursts modest.
        let quota = Quota::per_second(nonzero!(10u32));
        Self {
            client: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            asset: config.asset.clone(),
            fiat: config.fiat.clone(),
            volume: config.volume,
        }
    }

    fn url_for(&self, source: &SourceId) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.base_url, source, self.asset, self.fiat, self.volume
        )
    }
}

impl QuoteSource for CriptoyaSource {
    fn fetch(&self, source: &SourceId) -> BoxFuture<'_, Result<Quote, Report<SourceError>>> {
        let source = source.clone();
        Box::pin(async move {
            self.rate_limiter.until_ready().await;

            let url = self.url_for(&source);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .change_context(SourceError::Request {
                    source_id: source.to_string(),
                })
                .attach_with(|| format!("url: {url}"))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Report::new(SourceError::Status {
                    source_id: source.to_string(),
                    status: status.as_u16(),
                }));
            }

            let raw: CriptoyaQuote =
                response
                    .json()
                    .await
                    .change_context(SourceError::ResponseParse {
                        source_id: source.to_string(),
                    })?;

            let quote = raw.into_quote(source)?;
            debug!(
                source = %quote.source,
                ask = quote.ask,
                bid = quote.bid,
                obtained_at = %quote.obtained_at,
                "quote fetched"
            );
            Ok(quote)
        })
    }
}

// ── REST response types ───────────────────────────────────────────────────────

/// Fee-inclusive prices. The API also returns raw `ask`/`bid` and a `time`
/// field, which are ignored.
#[derive(Debug, Deserialize)]
struct CriptoyaQuote {
    #[serde(rename = "totalAsk")]
    total_ask: f64,
    #[serde(rename = "totalBid")]
    total_bid: f64,
}

impl CriptoyaQuote {
    fn into_quote(self, source: SourceId) -> Result<Quote, Report<SourceError>> {
        for (field, value) in [("totalAsk", self.total_ask), ("totalBid", self.total_bid)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Report::new(SourceError::ResponseParse {
                    source_id: source.to_string(),
                })
                .attach(format!("{field} is not a positive price: {value}")));
            }
        }

        Ok(Quote {
            source,
            ask: self.total_ask,
            bid: self.total_bid,
            obtained_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quotes_config() -> QuotesConfig {
        QuotesConfig {
            base_url: "https://criptoya.com/api/".into(),
            asset: "USDT".into(),
            fiat: "PEN".into(),
            volume: 1.0,
        }
    }

    #[test]
    fn url_includes_venue_pair_and_volume() {
        let source = CriptoyaSource::new(&quotes_config());
        assert_eq!(
            source.url_for(&"buenbit".into()),
            "https://criptoya.com/api/buenbit/USDT/PEN/1"
        );
    }

    #[test]
    fn payload_parses_into_quote() {
        let json = r#"{"ask": 3.79, "totalAsk": 3.8, "bid": 3.74, "totalBid": 3.75, "time": 1700000000}"#;
        let raw: CriptoyaQuote = serde_json::from_str(json).unwrap();
        let quote = raw.into_quote("buda".into()).unwrap();
        assert_eq!(quote.source.as_str(), "buda");
        assert_eq!(quote.ask, 3.8);
        assert_eq!(quote.bid, 3.75);
    }

    #[test]
    fn payload_without_totals_is_rejected() {
        let json = r#"{"ask": 3.79, "bid": 3.74}"#;
        assert!(serde_json::from_str::<CriptoyaQuote>(json).is_err());
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let raw = CriptoyaQuote {
            total_ask: 0.0,
            total_bid: 3.75,
        };
        let err = raw.into_quote("buda".into()).unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::ResponseParse { .. }
        ));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_quote() {
        let source = CriptoyaSource::new(&quotes_config());
        let quote = source.fetch(&"binancep2p".into()).await.unwrap();
        assert!(quote.ask > 0.0);
        assert!(quote.bid > 0.0);
    }
}
