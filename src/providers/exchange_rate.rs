//! FX rate feed adapter. Fetches a flat rate table for a base currency;
//! the static fallback on failure lives in the `CurrencyConverter`.

use crate::core::error::FetchError;
use crate::core::fx::{FxRateTable, RateSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

pub struct ExchangeRateApiSource {
    base_url: String,
    client: reqwest::Client,
}

impl ExchangeRateApiSource {
    pub fn new(base_url: &str) -> Self {
        ExchangeRateApiSource {
            base_url: base_url.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
        }
    }
}

#[derive(Deserialize, Debug)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

#[async_trait]
impl RateSource for ExchangeRateApiSource {
    #[instrument(name = "FxRates", skip(self), fields(base = %base))]
    async fn fetch_rates(&self, base: &str) -> Result<FxRateTable, FetchError> {
        let url = format!("{}/v4/latest/{}", self.base_url, base.to_uppercase());
        debug!("Requesting FX rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FetchError::from_request)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Upstream(format!("HTTP {status} for base {base}")));
        }

        let data: RatesResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("rates response for {base}: {e}")))?;

        Ok(FxRateTable::new(base, data.rates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_successful_rates_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/latest/EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"base": "EUR", "rates": {"USD": 1.09, "GBP": 0.85, "EUR": 1.0}}"#,
            ))
            .mount(&server)
            .await;

        let source = ExchangeRateApiSource::new(&server.uri());
        let table = source.fetch_rates("eur").await.unwrap();
        assert_eq!(table.base, "EUR");
        assert_eq!(table.rate("USD"), 1.09);
        assert_eq!(table.rate("EUR"), 1.0);
    }

    #[tokio::test]
    async fn test_server_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = ExchangeRateApiSource::new(&server.uri());
        let result = source.fetch_rates("EUR").await;
        assert!(matches!(result, Err(FetchError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ratez": {}}"#))
            .mount(&server)
            .await;

        let source = ExchangeRateApiSource::new(&server.uri());
        let result = source.fetch_rates("EUR").await;
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }
}
