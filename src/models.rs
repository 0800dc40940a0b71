use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One contract-detail object as the provider sends it.
pub type ContractDetail = serde_json::Map<String, Value>;

/// strike key (e.g. "220.0") -> contract details. Only the first entry has to
/// be an object; whatever follows it is provider noise.
pub type StrikeMap = BTreeMap<String, Vec<Value>>;

/// expiration key (e.g. "2023-01-25:0") -> strikes
pub type ExpDateMap = BTreeMap<String, StrikeMap>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    pub const ALL: [OptionSide; 2] = [OptionSide::Call, OptionSide::Put];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::Call => "CALL",
            OptionSide::Put => "PUT",
        }
    }

    /// Name of the top-level group holding this side in the provider response
    pub fn group_name(&self) -> &'static str {
        match self {
            OptionSide::Call => "callExpDateMap",
            OptionSide::Put => "putExpDateMap",
        }
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main response structure from the provider's option chain endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawChainResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub symbol: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,

    #[serde(rename = "underlyingPrice", default, deserialize_with = "lenient")]
    pub underlying_price: Option<f64>,

    #[serde(rename = "callExpDateMap", default)]
    pub call_exp_date_map: Option<ExpDateMap>,

    #[serde(rename = "putExpDateMap", default)]
    pub put_exp_date_map: Option<ExpDateMap>,
}

/// Informational fields: a mistyped value reads as absent instead of failing the parse
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl RawChainResponse {
    pub fn group(&self, side: OptionSide) -> Option<&ExpDateMap> {
        match side {
            OptionSide::Call => self.call_exp_date_map.as_ref(),
            OptionSide::Put => self.put_exp_date_map.as_ref(),
        }
    }
}

/// Where a contract sits inside the nested response. Used for error context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChainLocation {
    pub side: OptionSide,
    pub expiration: String,
    pub strike: String,
}

impl ChainLocation {
    pub fn new(side: OptionSide, expiration: &str, strike: &str) -> Self {
        Self {
            side,
            expiration: expiration.to_string(),
            strike: strike.to_string(),
        }
    }
}

impl fmt::Display for ChainLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} exp={} strike={}", self.side, self.expiration, self.strike)
    }
}

/// One contract lifted out of the nested response, still loosely typed.
/// Fields the provider did not send are `Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatContractRecord {
    #[serde(skip)]
    pub location: ChainLocation,

    // identity
    pub side: Value,
    pub underlying_symbol: Value,
    pub provider_symbol: Value,
    pub description: Value,

    // pricing
    pub bid: Value,
    pub ask: Value,
    pub last_price: Value,
    pub high_price: Value,
    pub low_price: Value,
    pub open_price: Value,
    pub close_price: Value,

    // sizes
    pub bid_size: Value,
    pub ask_size: Value,
    pub last_size: Value,
    pub total_volume: Value,
    pub open_interest: Value,

    // greeks
    pub volatility: Value,
    pub delta: Value,
    pub gamma: Value,
    pub theta: Value,
    pub vega: Value,
    pub rho: Value,

    // timing
    pub quote_time_in_long: Value,
    pub expiration_date: Value,
    pub days_to_expiration: Value,

    pub strike_price: Value,
}

/// Fully typed, keyed contract observation. Serialized names match the
/// storage columns (`description` is an SQL keyword, hence `theDescription`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedContractRecord {
    #[serde(rename = "putCall")]
    pub side: String,

    #[serde(rename = "underlyingSymbol")]
    pub underlying_symbol: String,

    #[serde(rename = "symbol")]
    pub provider_symbol: String,

    #[serde(rename = "theDescription")]
    pub description: String,

    pub bid: f64,
    pub ask: f64,

    #[serde(rename = "lastPrice")]
    pub last_price: f64,

    #[serde(rename = "highPrice")]
    pub high_price: f64,

    #[serde(rename = "lowPrice")]
    pub low_price: f64,

    #[serde(rename = "openPrice")]
    pub open_price: f64,

    #[serde(rename = "closePrice")]
    pub close_price: f64,

    #[serde(rename = "bidSize")]
    pub bid_size: i64,

    #[serde(rename = "askSize")]
    pub ask_size: i64,

    #[serde(rename = "lastSize")]
    pub last_size: i64,

    #[serde(rename = "totalVolume")]
    pub total_volume: i64,

    #[serde(rename = "openInterest")]
    pub open_interest: i64,

    pub volatility: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,

    #[serde(rename = "quoteTimeInLong")]
    pub quote_time_in_long: i64,

    #[serde(rename = "expirationDate")]
    pub expiration_date: i64,

    #[serde(rename = "daysToExpiration")]
    pub days_to_expiration: i64,

    #[serde(rename = "strikePrice")]
    pub strike_price: f64,

    #[serde(rename = "theDateTime")]
    pub capture_timestamp: String,

    #[serde(rename = "primaryKey")]
    pub primary_key: String,
}
