use crate::capture::CaptureStamp;
use crate::config;
use crate::models::RawChainResponse;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, header};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

// -----------------------------------------------
// PROVIDER CLIENT
// -----------------------------------------------
pub struct ChainClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ChainClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// GET with retry on transport errors, rate limits and server errors
    async fn fetch_json(&self, url: &str) -> Result<String> {
        let backoff = ExponentialBackoff::from_millis(config::RETRY_BASE_DELAY_MS)
            .factor(config::RETRY_FACTOR)
            .max_delay(Duration::from_secs(config::RETRY_MAX_DELAY_SECS))
            .take(config::RETRY_MAX_ATTEMPTS);

        Retry::spawn(backoff, || async {
            let res = self
                .client
                .get(url)
                .send()
                .await
                .context("Request send failed")?;

            let status = res.status();

            if status.is_success() {
                let text = res.text().await.context("Failed to read body")?;

                let trimmed = text.trim();
                if !trimmed.starts_with('{') {
                    let preview: String = text.chars().take(200).collect();
                    anyhow::bail!("Non-JSON response: {}", preview);
                }

                Ok(text)
            } else if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Provider is rate-limiting requests, backing off");
                anyhow::bail!("Rate limited: {}", status)
            } else if status.is_server_error() {
                anyhow::bail!("Retryable error: {}", status)
            } else {
                // Fail fast on client errors (bad key, unknown symbol)
                let body = res.text().await.unwrap_or_default();
                let preview: String = body.chars().take(200).collect();
                anyhow::bail!("Client error {}: {}", status, preview)
            }
        })
        .await
    }

    /// Fetch every strike and contract type expiring on or before `to_date`
    pub async fn fetch_option_chain(&self, ticker: &str, to_date: NaiveDate) -> Result<RawChainResponse> {
        let to_date = to_date.format("%Y-%m-%d").to_string();
        let url = config::option_chain_url(&self.base_url, &self.api_key, ticker, &to_date);

        debug!(ticker, %to_date, "Fetching option chain");
        let text = self.fetch_json(&url).await?;
        parse_chain(&text).with_context(|| format!("Failed to parse option chain for {}", ticker))
    }

    /// Fetch one chain, stamped with the moment the pull started
    pub async fn capture_option_chain(
        &self,
        ticker: &str,
        to_date: NaiveDate,
    ) -> Result<(CaptureStamp, RawChainResponse)> {
        stamped(self.fetch_option_chain(ticker, to_date)).await
    }

    /// Fetch several tickers, at most `max_concurrent` requests in flight.
    /// Each chain carries its own capture stamp, taken once its request slot
    /// opens. Results come back in ticker order.
    pub async fn fetch_all_option_chains(
        self: Arc<Self>,
        tickers: Vec<String>,
        to_date: NaiveDate,
        max_concurrent: usize,
    ) -> Vec<Result<(CaptureStamp, RawChainResponse)>> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut handles = vec![];

        for ticker in tickers {
            let client = Arc::clone(&self);
            let sem = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow::anyhow!("Semaphore error: {}", e))?;

                client.capture_option_chain(&ticker, to_date).await
            });

            handles.push(handle);
        }

        let mut results = vec![];
        for handle in handles {
            match handle.await {
                Ok(res) => results.push(res),
                Err(e) => results.push(Err(anyhow::anyhow!("Task error: {}", e))),
            }
        }

        results
    }
}

/// Stamp the capture time, then drive the fetch. The stamp is read before
/// the future is first polled, so retries and slow responses do not move it.
pub async fn stamped<T, F>(fetch: F) -> Result<(CaptureStamp, T)>
where
    F: Future<Output = Result<T>>,
{
    let stamp = CaptureStamp::now();
    let value = fetch.await?;
    Ok((stamp, value))
}

/// Parse a chain body. The provider answers unknown symbols with
/// `"status": "FAILED"` and a 200, which is not a usable capture.
pub fn parse_chain(text: &str) -> Result<RawChainResponse> {
    let chain: RawChainResponse = serde_json::from_str(text)?;

    if chain.status.as_deref() == Some("FAILED") {
        anyhow::bail!(
            "Provider returned FAILED status for {}",
            chain.symbol.as_deref().unwrap_or("unknown symbol")
        );
    }

    Ok(chain)
}

// -----------------------------------------------
// HTTP CLIENT BUILDER
// -----------------------------------------------
fn build_client() -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

    Client::builder()
        .default_headers(headers)
        .user_agent(config::USER_AGENT)
        .timeout(config::HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionSide;

    #[test]
    fn test_parse_chain() {
        let body = r#"{
            "symbol": "QQQ",
            "status": "SUCCESS",
            "underlyingPrice": 290.5,
            "callExpDateMap": {"2023-01-25:0": {"220.0": [{"symbol": "QQQ_012523C220"}]}},
            "putExpDateMap": {"2023-01-25:0": {"220.0": [{"symbol": "QQQ_012523P220"}]}}
        }"#;

        let chain = parse_chain(body).unwrap();
        assert_eq!(chain.symbol.as_deref(), Some("QQQ"));
        assert_eq!(chain.group(OptionSide::Put).map(|g| g.len()), Some(1));
    }

    #[test]
    fn test_parse_chain_failed_status() {
        let body = r#"{"symbol": "NOPE", "status": "FAILED", "callExpDateMap": {}, "putExpDateMap": {}}"#;
        let err = parse_chain(body).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[tokio::test]
    async fn test_stamp_taken_before_fetch_completes() {
        let before = chrono::Utc::now().timestamp();

        let (stamp, value) = stamped(async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            Ok(7)
        })
        .await
        .unwrap();

        let after = chrono::Utc::now().timestamp();
        assert_eq!(value, 7);
        assert!(stamp.epoch_seconds >= before);
        assert!(stamp.epoch_seconds < after);
    }

    #[tokio::test]
    async fn test_stamped_propagates_fetch_error() {
        let res: Result<(CaptureStamp, ())> = stamped(async { anyhow::bail!("Rate limited: 429") }).await;
        assert!(res.unwrap_err().to_string().contains("429"));
    }

    #[test]
    fn test_client_builds() {
        assert!(ChainClient::new(config::PROVIDER_BASE_URL, "key").is_ok());
    }
}
