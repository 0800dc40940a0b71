use crate::capture::CaptureReport;
use crate::config;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Chat webhooks cap message content at 2000 characters
const MAX_CONTENT_LEN: usize = 2000;
const MAX_LISTED_REJECTIONS: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookMessage {
    pub content: String,
    pub username: String,
}

impl WebhookMessage {
    pub fn new(content: impl Into<String>) -> Self {
        let content: String = content.into();
        Self {
            content: content.chars().take(MAX_CONTENT_LEN).collect(),
            username: config::ALERT_USERNAME.to_string(),
        }
    }
}

/// Message for a capture that produced no records at all
pub fn capture_failed(ticker: &str, captured_at: &str, error: &str) -> WebhookMessage {
    WebhookMessage::new(format!(
        "Options capture for {} failed at {}\n{}",
        ticker, captured_at, error
    ))
}

/// Message for a capture that kept some records but rejected others.
/// `None` when nothing was rejected.
pub fn capture_rejections(report: &CaptureReport) -> Option<WebhookMessage> {
    if report.is_clean() {
        return None;
    }

    let mut content = format!(
        "Options capture for {} at {} rejected {} of {} contracts",
        report.ticker,
        report.stamp.timestamp,
        report.rejected.len(),
        report.rejected.len() + report.records.len()
    );

    for err in report.rejected.iter().take(MAX_LISTED_REJECTIONS) {
        content.push_str("\n- ");
        content.push_str(&err.to_string());
    }
    if report.rejected.len() > MAX_LISTED_REJECTIONS {
        content.push_str(&format!(
            "\n... and {} more",
            report.rejected.len() - MAX_LISTED_REJECTIONS
        ));
    }

    Some(WebhookMessage::new(content))
}

pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(config::HTTP_TIMEOUT)
            .build()
            .context("Failed to build webhook client")?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn send(&self, message: &WebhookMessage) -> Result<()> {
        let res = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .context("Failed to post alert")?;

        let status = res.status();
        if !status.is_success() {
            anyhow::bail!("Webhook rejected alert: {}", status);
        }

        debug!(%status, "Alert delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureStamp;
    use crate::error::ChainError;
    use crate::models::{ChainLocation, OptionSide};

    fn report(rejected: usize) -> CaptureReport {
        let rejected = (0..rejected)
            .map(|i| ChainError::KeyDerivation {
                symbol: format!("BAD{}", i),
                location: ChainLocation::new(OptionSide::Call, "2023-01-25:0", "220.0"),
                reason: "missing '_' separator".to_string(),
            })
            .collect();

        CaptureReport {
            ticker: "QQQ".to_string(),
            stamp: CaptureStamp::new("2023-01-25 10:00:00", 1674658800),
            records: vec![],
            rejected,
            fallback_count: 0,
        }
    }

    #[test]
    fn test_capture_failed_message() {
        let msg = capture_failed("QQQ", "2023-01-25 10:00:00", "Rate limited: 429");
        assert_eq!(msg.username, "OptionsFailure");
        assert!(msg.content.contains("QQQ"));
        assert!(msg.content.contains("429"));

        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("content").is_some());
        assert!(json.get("username").is_some());
    }

    #[test]
    fn test_rejections_message() {
        assert!(capture_rejections(&report(0)).is_none());

        let msg = capture_rejections(&report(7)).unwrap();
        assert!(msg.content.contains("rejected 7 of 7"));
        assert!(msg.content.contains("BAD4"));
        assert!(!msg.content.contains("BAD5"));
        assert!(msg.content.contains("... and 2 more"));
    }

    #[test]
    fn test_content_is_capped() {
        let msg = WebhookMessage::new("x".repeat(5000));
        assert_eq!(msg.content.len(), MAX_CONTENT_LEN);
    }
}
