use crate::config::{CAPTURE_TIMESTAMP_FORMAT, MARKET_TZ};
use crate::error::ChainError;
use crate::flattener::flatten;
use crate::models::{NormalizedContractRecord, RawChainResponse};
use crate::normalizer::normalize_record;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

/// Capture time shared by every record of one pull.
///
/// Both values come from the same instant, so the human readable timestamp
/// and the epoch used in primary keys always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStamp {
    /// Market-local wall clock, second precision
    pub timestamp: String,
    pub epoch_seconds: i64,
}

impl CaptureStamp {
    pub fn new(timestamp: impl Into<String>, epoch_seconds: i64) -> Self {
        Self {
            timestamp: timestamp.into(),
            epoch_seconds,
        }
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        let local = instant.with_timezone(&MARKET_TZ);
        Self {
            timestamp: local.format(CAPTURE_TIMESTAMP_FORMAT).to_string(),
            epoch_seconds: instant.timestamp(),
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }
}

/// Result of one capture: accepted rows plus per-record rejections
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub ticker: String,
    pub stamp: CaptureStamp,
    pub records: Vec<NormalizedContractRecord>,
    pub rejected: Vec<ChainError>,
    /// Fields filled with zero values across the whole capture
    pub fallback_count: usize,
}

impl CaptureReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Flatten and normalize one provider response.
///
/// A structurally broken chain fails the whole capture. Records whose key
/// cannot be derived, or whose key repeats an earlier one, are rejected
/// individually and the rest of the batch is kept.
pub fn run_capture(
    ticker: &str,
    raw: &RawChainResponse,
    stamp: &CaptureStamp,
) -> Result<CaptureReport, ChainError> {
    let flat = flatten(raw)?;

    let mut records = Vec::with_capacity(flat.len());
    let mut rejected = Vec::new();
    let mut fallback_count = 0;
    let mut seen_keys = HashSet::with_capacity(flat.len());

    for rec in &flat {
        match normalize_record(rec, stamp) {
            Ok(normalized) => {
                fallback_count += normalized.fallbacks.len();

                let key = &normalized.record.primary_key;
                if !seen_keys.insert(key.clone()) {
                    let err = ChainError::DuplicatePrimaryKey {
                        key: key.clone(),
                        location: rec.location.clone(),
                    };
                    warn!(ticker, error = %err, "Rejected contract");
                    rejected.push(err);
                    continue;
                }

                records.push(normalized.record);
            }
            Err(err) => {
                warn!(ticker, error = %err, "Rejected contract");
                rejected.push(err);
            }
        }
    }

    info!(
        ticker,
        captured_at = %stamp.timestamp,
        accepted = records.len(),
        rejected = rejected.len(),
        fallbacks = fallback_count,
        "Capture complete"
    );

    Ok(CaptureReport {
        ticker: ticker.to_string(),
        stamp: stamp.clone(),
        records,
        rejected,
        fallback_count,
    })
}
