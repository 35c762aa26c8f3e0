//! Trading action payloads and their validation.
//!
//! The backend proposes orders as loosely shaped JSON. [`TradingAction`] keeps
//! that shape verbatim so a malformed proposal never breaks frame parsing;
//! [`TradingAction::validate`] is the single gate that turns it into a
//! strongly typed [`ValidatedOrder`] before anything is shown to the user.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

static STOCK_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("stock code pattern is valid"));

/// Order proposal as received from the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingAction {
    /// `"buy"` or `"sell"` when well-formed.
    #[serde(
        default,
        alias = "side",
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub order_side: Option<String>,
    /// `"market"` or `"limit"`; informational only.
    #[serde(
        default,
        alias = "orderType",
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub order_type: Option<String>,
    /// Exchange code, digits only when well-formed.
    #[serde(
        default,
        alias = "stockCode",
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub stock_code: Option<String>,
    /// Limit price. Numbers or numeric strings are accepted.
    #[serde(default, alias = "price", skip_serializing_if = "Option::is_none")]
    pub order_price: Option<Value>,
    /// Share count. Numbers or numeric strings are accepted.
    #[serde(default, alias = "quantity", skip_serializing_if = "Option::is_none")]
    pub order_quantity: Option<Value>,
}

/// Buy or sell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Purchase shares.
    Buy,
    /// Dispose of shares.
    Sell,
}

impl OrderSide {
    /// Korean verb used in the confirmation question.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Buy => "매수",
            Self::Sell => "매도",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

/// Why a trading action was rejected.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TradingActionError {
    /// `stock_code` absent or empty.
    #[error("trading action has no stock code")]
    MissingStockCode,
    /// `order_side` absent or empty.
    #[error("trading action has no order side")]
    MissingSide,
    /// `order_side` is neither buy nor sell.
    #[error("unsupported order side: {0}")]
    InvalidSide(String),
    /// Quantity present but not a positive number.
    #[error("order quantity must be a positive number")]
    InvalidQuantity,
    /// Price present but not a positive number.
    #[error("order price must be a positive number")]
    InvalidPrice,
    /// Stock code contains something other than digits.
    #[error("stock code must contain digits only: {0}")]
    InvalidStockCode(String),
}

/// A trading action that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedOrder {
    /// Buy or sell.
    pub side: OrderSide,
    /// Digits-only exchange code.
    pub stock_code: String,
    /// Positive share count, if specified.
    pub quantity: Option<f64>,
    /// Positive limit price, if specified.
    pub price: Option<f64>,
    /// Order type as sent by the backend.
    pub order_type: Option<String>,
}

impl ValidatedOrder {
    /// Question asking the user to confirm this order.
    pub fn confirmation_prompt(&self) -> String {
        let quantity = self.quantity.map(|q| q.to_string()).unwrap_or_default();
        format!(
            "이 분석 결과에 따라 {} {}주를 {}하시겠습니까?",
            self.stock_code,
            quantity,
            self.side.verb()
        )
    }
}

impl TradingAction {
    /// Check every field and produce a typed order.
    ///
    /// Rules: side is `buy`/`sell`; stock code matches `^[0-9]+$`; quantity
    /// and price, when present, are positive finite numbers. `null` counts as
    /// absent.
    pub fn validate(&self) -> Result<ValidatedOrder, TradingActionError> {
        let stock_code = self
            .stock_code
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(TradingActionError::MissingStockCode)?;
        let side = match self.order_side.as_deref() {
            None | Some("") => return Err(TradingActionError::MissingSide),
            Some("buy") => OrderSide::Buy,
            Some("sell") => OrderSide::Sell,
            Some(other) => return Err(TradingActionError::InvalidSide(other.to_owned())),
        };
        let quantity = positive(self.order_quantity.as_ref())
            .map_err(|()| TradingActionError::InvalidQuantity)?;
        let price =
            positive(self.order_price.as_ref()).map_err(|()| TradingActionError::InvalidPrice)?;
        if !STOCK_CODE.is_match(stock_code) {
            return Err(TradingActionError::InvalidStockCode(stock_code.to_owned()));
        }
        Ok(ValidatedOrder {
            side,
            stock_code: stock_code.to_owned(),
            quantity,
            price,
            order_type: self.order_type.clone(),
        })
    }

    /// Pure validity predicate.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

fn positive(value: Option<&Value>) -> Result<Option<f64>, ()> {
    let Some(value) = value else {
        return Ok(None);
    };
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n.is_finite() && n > 0.0 => Ok(Some(n)),
        _ => Err(()),
    }
}

/// Accept strings, numbers or anything else as text; `null` becomes `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
