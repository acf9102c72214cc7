use serde::{de, Deserialize, Deserializer};
use std::fmt;

/// GraphQL envelope returned by the subgraph gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: Option<String>,
}

/// Summarize an `errors` array into one line for logs.
pub fn summarize_graphql_errors(errors: &[GraphQlError]) -> String {
    if errors.is_empty() {
        return "empty errors array".to_string();
    }
    errors
        .iter()
        .map(|e| e.message.as_deref().unwrap_or("<no message>"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountQueryData {
    pub account: Option<Account>,
}

/// Compound V2 subgraph `Account` entity with its lending history.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Account {
    pub id: String,
    #[serde(rename = "borrowCount", deserialize_with = "de_count")]
    pub borrow_count: u64,
    #[serde(rename = "depositCount", deserialize_with = "de_count")]
    pub deposit_count: u64,
    #[serde(rename = "repayCount", deserialize_with = "de_count")]
    pub repay_count: u64,
    /// Times this account was liquidated.
    #[serde(rename = "liquidationCount", deserialize_with = "de_count")]
    pub liquidation_count: u64,
    /// Times this account acted as liquidator.
    #[serde(rename = "liquidateCount", deserialize_with = "de_count")]
    pub liquidate_count: u64,
    #[serde(rename = "withdrawCount", deserialize_with = "de_count")]
    pub withdraw_count: u64,
    #[serde(deserialize_with = "de_null_as_default")]
    pub borrows: Vec<AccountEvent>,
    #[serde(deserialize_with = "de_null_as_default")]
    pub deposits: Vec<AccountEvent>,
    #[serde(deserialize_with = "de_null_as_default")]
    pub repays: Vec<AccountEvent>,
    #[serde(deserialize_with = "de_null_as_default")]
    pub liquidates: Vec<AccountEvent>,
    #[serde(deserialize_with = "de_null_as_default")]
    pub liquidations: Vec<AccountEvent>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AccountEvent {
    /// `None` when the field is absent, null or not a number.
    #[serde(rename = "amountUSD", deserialize_with = "de_lenient_f64")]
    pub amount_usd: Option<f64>,
    #[serde(deserialize_with = "de_opt_i64_any")]
    pub timestamp: Option<i64>,
}

impl AccountEvent {
    pub fn new(amount_usd: f64, timestamp: Option<i64>) -> Self {
        Self {
            amount_usd: Some(amount_usd),
            timestamp,
        }
    }
}

fn de_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Amounts arrive as BigDecimal strings. Anything unparseable becomes `None`.
fn de_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

struct IntegerOrString;

impl<'de> de::Visitor<'de> for IntegerOrString {
    type Value = Option<i64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "an integer or an integer string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .map(Some)
            .map_err(|_| E::custom(format!("integer {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v.is_finite() && v.fract() == 0.0 {
            #[allow(clippy::cast_possible_truncation)]
            Ok(Some(v as i64))
        } else {
            Err(E::custom(format!("expected an integer, got {v}")))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| E::custom(format!("expected an integer string, got {v:?}")))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

/// Counters are GraphQL `Int`s; null counts as zero, garbage is a malformed response.
fn de_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserializer.deserialize_any(IntegerOrString)?;
    Ok(value.map_or(0, |v| u64::try_from(v).unwrap_or(0)))
}

/// Timestamps are BigInt strings. Unparseable timestamps are treated as missing.
fn de_opt_i64_any<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}
