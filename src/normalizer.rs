use crate::capture::CaptureStamp;
use crate::error::ChainError;
use crate::models::{ChainLocation, FlatContractRecord, NormalizedContractRecord};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

/// Whole-value tokens the provider uses for "no value". Case-sensitive.
pub const NULL_TOKENS: [&str; 5] = ["NaN", "nan", "NULL", "Null", "null"];

/// A field that could not be coerced and was filled with its zero value.
/// Routine for sparse quotes; kept only for auditing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoercionFallback {
    pub field: &'static str,
    pub raw: Value,
}

/// Normalized record plus the fields that fell back to zero values
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedContract {
    pub record: NormalizedContractRecord,
    pub fallbacks: Vec<CoercionFallback>,
}

/// Normalize a batch. Output order follows input order; a malformed symbol
/// fails only its own record.
pub fn normalize(
    records: &[FlatContractRecord],
    stamp: &CaptureStamp,
) -> Vec<Result<NormalizedContractRecord, ChainError>> {
    records
        .iter()
        .map(|rec| normalize_record(rec, stamp).map(|n| n.record))
        .collect()
}

/// Coerce, fill and key a single flat record.
pub fn normalize_record(
    record: &FlatContractRecord,
    stamp: &CaptureStamp,
) -> Result<NormalizedContract, ChainError> {
    let mut c = Coercer::default();

    let provider_symbol = c.text("providerSymbol", &record.provider_symbol);
    let primary_key = derive_primary_key(&provider_symbol, stamp.epoch_seconds, &record.location)?;

    let normalized = NormalizedContractRecord {
        side: c.text("side", &record.side),
        underlying_symbol: c.text("underlyingSymbol", &record.underlying_symbol),
        provider_symbol,
        description: c.text("description", &record.description),

        bid: c.decimal("bid", &record.bid),
        ask: c.decimal("ask", &record.ask),
        last_price: c.decimal("lastPrice", &record.last_price),
        high_price: c.decimal("highPrice", &record.high_price),
        low_price: c.decimal("lowPrice", &record.low_price),
        open_price: c.decimal("openPrice", &record.open_price),
        close_price: c.decimal("closePrice", &record.close_price),

        bid_size: c.integer("bidSize", &record.bid_size),
        ask_size: c.integer("askSize", &record.ask_size),
        last_size: c.integer("lastSize", &record.last_size),
        total_volume: c.integer("totalVolume", &record.total_volume),
        open_interest: c.integer("openInterest", &record.open_interest),

        volatility: c.decimal("volatility", &record.volatility),
        // Puts come signed negative upstream; we store magnitude only
        delta: c.decimal("delta", &record.delta).abs(),
        gamma: c.decimal("gamma", &record.gamma),
        theta: c.decimal("theta", &record.theta),
        vega: c.decimal("vega", &record.vega),
        rho: c.decimal("rho", &record.rho),

        quote_time_in_long: c.integer("quoteTimeInLong", &record.quote_time_in_long),
        expiration_date: c.integer("expirationDate", &record.expiration_date),
        days_to_expiration: c.integer("daysToExpiration", &record.days_to_expiration),

        strike_price: c.decimal("strikePrice", &record.strike_price),

        capture_timestamp: stamp.timestamp.clone(),
        primary_key,
    };

    if !c.fallbacks.is_empty() {
        trace!(
            key = %normalized.primary_key,
            fields = ?c.fallbacks.iter().map(|f| f.field).collect::<Vec<_>>(),
            "Filled empty fields"
        );
    }

    Ok(NormalizedContract {
        record: normalized,
        fallbacks: c.fallbacks,
    })
}

/// Turn a composite symbol like `QQQ_012523P220` into `QQQ230125P220.<epoch>`.
///
/// The six characters after the separator are treated as an opaque `MMDDYY`
/// block and reordered to `YYMMDD`; no date validation happens. A variable
/// width date segment would produce a wrong but well-formed key.
pub fn derive_primary_key(
    provider_symbol: &str,
    capture_epoch_seconds: i64,
    location: &ChainLocation,
) -> Result<String, ChainError> {
    let key_error = |reason: &str| ChainError::KeyDerivation {
        symbol: provider_symbol.to_string(),
        location: location.clone(),
        reason: reason.to_string(),
    };

    let (underlying, suffix) = provider_symbol
        .split_once('_')
        .ok_or_else(|| key_error("missing '_' separator"))?;

    if suffix.contains('_') {
        return Err(key_error("more than one '_' separator"));
    }

    let date = suffix
        .get(..6)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| key_error("expected 6-digit MMDDYY date after separator"))?;

    let (mm, dd, yy) = (&date[0..2], &date[2..4], &date[4..6]);
    let rest = &suffix[6..];

    Ok(format!("{underlying}{yy}{mm}{dd}{rest}.{capture_epoch_seconds}"))
}

// -----------------------------------------------
// COERCION
// -----------------------------------------------

#[derive(Default)]
struct Coercer {
    fallbacks: Vec<CoercionFallback>,
}

impl Coercer {
    fn decimal(&mut self, field: &'static str, raw: &Value) -> f64 {
        let parsed = parse_decimal(raw);
        self.fill(field, raw, parsed)
    }

    fn integer(&mut self, field: &'static str, raw: &Value) -> i64 {
        let parsed = parse_integer(raw);
        self.fill(field, raw, parsed)
    }

    fn text(&mut self, field: &'static str, raw: &Value) -> String {
        let parsed = stringify(raw);
        self.fill(field, raw, parsed)
    }

    /// Single fill policy for every field type: empty becomes the zero value.
    fn fill<T: Default>(&mut self, field: &'static str, raw: &Value, parsed: Option<T>) -> T {
        match parsed {
            Some(v) => v,
            None => {
                self.fallbacks.push(CoercionFallback {
                    field,
                    raw: raw.clone(),
                });
                T::default()
            }
        }
    }
}

fn scrub(s: &str) -> Option<&str> {
    if NULL_TOKENS.contains(&s) {
        None
    } else {
        Some(s.trim())
    }
}

fn parse_decimal(raw: &Value) -> Option<f64> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => scrub(s).and_then(|s| s.parse::<f64>().ok()),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn parse_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = scrub(s)?;
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn truncate(v: f64) -> Option<i64> {
    v.is_finite().then(|| v.trunc() as i64)
}

fn stringify(raw: &Value) -> Option<String> {
    match raw {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionSide;
    use serde_json::json;

    fn loc() -> ChainLocation {
        ChainLocation::new(OptionSide::Put, "2023-01-25:0", "220.0")
    }

    #[test]
    fn test_derive_primary_key() {
        assert_eq!(
            derive_primary_key("QQQ_012523P220", 1700000000, &loc()).unwrap(),
            "QQQ230125P220.1700000000"
        );
        assert_eq!(
            derive_primary_key("SPY_123124C475.5", 1, &loc()).unwrap(),
            "SPY241231C475.5.1"
        );
    }

    #[test]
    fn test_derive_primary_key_rejects_bad_shapes() {
        for symbol in ["QQQ012523P220", "QQQ_0125P220", "QQQ_01252", "A_B_012523P1", "QQQ_01a523P220", ""] {
            let err = derive_primary_key(symbol, 1700000000, &loc()).unwrap_err();
            match err {
                ChainError::KeyDerivation { symbol: s, location, .. } => {
                    assert_eq!(s, symbol);
                    assert_eq!(location, loc());
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(&json!(1.25)), Some(1.25));
        assert_eq!(parse_decimal(&json!("1.25")), Some(1.25));
        assert_eq!(parse_decimal(&json!(" 2 ")), Some(2.0));
        assert_eq!(parse_decimal(&json!("")), None);
        assert_eq!(parse_decimal(&json!("abc")), None);
        assert_eq!(parse_decimal(&json!("inf")), None);
        assert_eq!(parse_decimal(&json!("NAN")), None);
        assert_eq!(parse_decimal(&json!(true)), None);
        assert_eq!(parse_decimal(&Value::Null), None);
        for token in NULL_TOKENS {
            assert_eq!(parse_decimal(&json!(token)), None);
        }
    }

    #[test]
    fn test_parse_integer_truncates() {
        assert_eq!(parse_integer(&json!(7)), Some(7));
        assert_eq!(parse_integer(&json!(7.9)), Some(7));
        assert_eq!(parse_integer(&json!(-7.9)), Some(-7));
        assert_eq!(parse_integer(&json!("12.99")), Some(12));
        assert_eq!(parse_integer(&json!("1674680400000")), Some(1674680400000));
        assert_eq!(parse_integer(&json!("Null")), None);
        assert_eq!(parse_integer(&json!("x1")), None);
    }

    #[test]
    fn test_null_token_is_whole_value_only() {
        // "nullx" is not a token, and also not a number
        assert_eq!(scrub("nullx"), Some("nullx"));
        assert_eq!(scrub("null"), None);
        assert_eq!(scrub("NuLL"), Some("NuLL"));
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!("CALL")), Some("CALL".to_string()));
        assert_eq!(stringify(&json!(220)), Some("220".to_string()));
        assert_eq!(stringify(&json!(false)), Some("false".to_string()));
        assert_eq!(stringify(&Value::Null), None);
    }

    #[test]
    fn test_fill_records_fallbacks() {
        let mut c = Coercer::default();
        assert_eq!(c.decimal("bid", &json!("nan")), 0.0);
        assert_eq!(c.integer("bidSize", &Value::Null), 0);
        assert_eq!(c.text("description", &Value::Null), "");
        assert_eq!(c.decimal("ask", &json!(1.0)), 1.0);

        let fields: Vec<_> = c.fallbacks.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["bid", "bidSize", "description"]);
        assert_eq!(c.fallbacks[0].raw, json!("nan"));
    }
}
