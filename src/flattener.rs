use crate::error::ChainError;
use crate::models::{ChainLocation, ContractDetail, FlatContractRecord, OptionSide, RawChainResponse};
use serde_json::Value;
use tracing::debug;

/// Flatten the nested chain (side -> expiration -> strike -> details) into
/// one record per contract. Calls come first, then puts; inside a side the
/// maps' key order is followed.
///
/// Both side groups must be present and every strike's first detail entry
/// must be an object. Anything beyond the first entry is ignored, whatever
/// its shape.
pub fn flatten(raw: &RawChainResponse) -> Result<Vec<FlatContractRecord>, ChainError> {
    let mut records = Vec::new();

    for side in OptionSide::ALL {
        let group = raw.group(side).ok_or_else(|| ChainError::missing_group(side))?;

        for (expiration, strikes) in group {
            for (strike, details) in strikes {
                let detail = details
                    .first()
                    .ok_or_else(|| ChainError::empty_strike(side, expiration, strike))?
                    .as_object()
                    .ok_or_else(|| ChainError::non_object_detail(side, expiration, strike))?;

                if details.len() > 1 {
                    debug!(%side, %expiration, %strike, extra = details.len() - 1, "Ignoring extra contract entries");
                }

                let location = ChainLocation::new(side, expiration, strike);
                records.push(flatten_detail(location, detail));
            }
        }
    }

    debug!(count = records.len(), "Flattened option chain");
    Ok(records)
}

/// Map one provider detail object into a flat record, field for field.
fn flatten_detail(location: ChainLocation, detail: &ContractDetail) -> FlatContractRecord {
    let field = |name: &str| detail.get(name).cloned().unwrap_or(Value::Null);

    let provider_symbol = field("symbol");
    let side = match detail.get("putCall") {
        Some(v) if !v.is_null() => v.clone(),
        _ => Value::String(location.side.as_str().to_string()),
    };

    FlatContractRecord {
        side,
        underlying_symbol: underlying_of(&provider_symbol),
        provider_symbol,
        description: field("description"),

        bid: field("bid"),
        ask: field("ask"),
        last_price: field("lastPrice"),
        high_price: field("highPrice"),
        low_price: field("lowPrice"),
        open_price: field("openPrice"),
        close_price: field("closePrice"),

        bid_size: field("bidSize"),
        ask_size: field("askSize"),
        last_size: field("lastSize"),
        total_volume: field("totalVolume"),
        open_interest: field("openInterest"),

        volatility: field("volatility"),
        delta: field("delta"),
        gamma: field("gamma"),
        theta: field("theta"),
        vega: field("vega"),
        rho: field("rho"),

        quote_time_in_long: field("quoteTimeInLong"),
        expiration_date: field("expirationDate"),
        days_to_expiration: field("daysToExpiration"),

        strike_price: field("strikePrice"),
        location,
    }
}

/// Text before the `_` of a composite symbol like `QQQ_012523P220`
fn underlying_of(symbol: &Value) -> Value {
    symbol
        .as_str()
        .and_then(|s| s.split_once('_'))
        .map(|(underlying, _)| Value::String(underlying.to_string()))
        .unwrap_or(Value::Null)
}
