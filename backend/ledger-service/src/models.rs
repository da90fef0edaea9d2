//! Transaction event model and the validation predicate applied by consumers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Transaction kind tag carried in the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Transfer,
    /// Any tag not listed above; accepted as-is
    #[serde(other)]
    Other,
}

/// Structured view of a transaction payload.
///
/// Fields are read independently from the JSON object: a field that is missing
/// or has an unexpected type is left as `None` and never fails the parse. Only
/// a body that is not a JSON object is malformed. `ville`/`montant` are
/// accepted as aliases for `city`/`amount`; the English key wins when both
/// are present.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TransactionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionType>,
}

const CITY_KEYS: [&str; 2] = ["city", "ville"];
const AMOUNT_KEYS: [&str; 2] = ["amount", "montant"];

impl TransactionPayload {
    pub fn parse(raw: &str) -> Result<Self, RejectReason> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| RejectReason::MalformedPayload(e.to_string()))?;
        let fields = value.as_object().ok_or_else(|| {
            RejectReason::MalformedPayload("payload is not a JSON object".to_string())
        })?;

        Ok(Self {
            client: fields
                .get("client")
                .and_then(Value::as_str)
                .map(str::to_string),
            city: CITY_KEYS
                .iter()
                .find_map(|key| fields.get(*key)?.as_str())
                .map(str::to_string),
            amount: AMOUNT_KEYS
                .iter()
                .find_map(|key| fields.get(*key)?.as_f64()),
            kind: fields
                .get("type")
                .and_then(|kind| TransactionType::deserialize(kind).ok()),
        })
    }

    /// True iff the payload declares an amount and that amount is below zero
    pub fn declares_negative_amount(&self) -> bool {
        self.amount.is_some_and(|amount| amount < 0.0)
    }
}

/// A transaction as submitted: unique ID plus the serialized payload.
///
/// Immutable once built; consumers only ever read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    id: String,
    payload: String,
}

impl TransactionEvent {
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Why a record was diverted to the dead-letter topic
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NegativeAmount(f64),
    MalformedPayload(String),
    MissingTransactionId,
    InvalidTransactionId(String),
}

impl RejectReason {
    /// Stable short code written to the `dlq_reason` header
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NegativeAmount(_) => "negative_amount",
            RejectReason::MalformedPayload(_) => "malformed_payload",
            RejectReason::MissingTransactionId => "missing_transaction_id",
            RejectReason::InvalidTransactionId(_) => "invalid_transaction_id",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NegativeAmount(amount) => write!(f, "negative amount {}", amount),
            RejectReason::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
            RejectReason::MissingTransactionId => write!(f, "missing transaction id"),
            RejectReason::InvalidTransactionId(msg) => {
                write!(f, "invalid transaction id: {}", msg)
            }
        }
    }
}

/// Apply the business rule to a raw payload.
///
/// A body that is not a JSON object is rejected as malformed; an object is
/// rejected only when it declares a negative amount.
pub fn validate_payload(raw: &str) -> Result<TransactionPayload, RejectReason> {
    let payload = TransactionPayload::parse(raw)?;

    match payload.amount {
        Some(amount) if payload.declares_negative_amount() => {
            Err(RejectReason::NegativeAmount(amount))
        }
        _ => Ok(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_positive_and_zero_amounts() {
        let payload = validate_payload(r#"{"city":"CityA","amount":200}"#).unwrap();
        assert_eq!(payload.city.as_deref(), Some("CityA"));
        assert_eq!(payload.amount, Some(200.0));

        assert!(validate_payload(r#"{"amount":0}"#).is_ok());
        assert!(validate_payload(r#"{"amount":-0.0}"#).is_ok());
    }

    #[test]
    fn test_rejects_negative_amount() {
        let err = validate_payload(r#"{"city":"CityA","amount":-50}"#).unwrap_err();
        assert_eq!(err, RejectReason::NegativeAmount(-50.0));
        assert_eq!(err.code(), "negative_amount");

        // Structured check, not a text match: the fractional case is caught too
        assert!(validate_payload(r#"{"amount": -0.01}"#).is_err());
    }

    #[test]
    fn test_missing_amount_is_valid() {
        let payload = validate_payload(r#"{"client":"Alice","type":"DEPOSIT"}"#).unwrap();
        assert_eq!(payload.amount, None);
        assert_eq!(payload.kind, Some(TransactionType::Deposit));
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        for raw in ["", "not json", "[1,2]", "42", r#""text""#] {
            let err = validate_payload(raw).unwrap_err();
            assert!(
                matches!(err, RejectReason::MalformedPayload(_)),
                "expected malformed for {raw:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_french_aliases() {
        let payload = TransactionPayload::parse(
            r#"{"client":"Eve","ville":"Montréal","montant":-100,"type":"WITHDRAW"}"#,
        )
        .unwrap();

        assert_eq!(payload.city.as_deref(), Some("Montréal"));
        assert!(payload.declares_negative_amount());
        assert_eq!(payload.kind, Some(TransactionType::Withdraw));
    }

    #[test]
    fn test_unrelated_field_types_do_not_reject() {
        let payload = validate_payload(r#"{"client":123,"city":"CityA","amount":10}"#).unwrap();
        assert_eq!(payload.client, None);
        assert_eq!(payload.city.as_deref(), Some("CityA"));

        let payload = validate_payload(r#"{"city":"CityA","amount":10,"type":7}"#).unwrap();
        assert_eq!(payload.kind, None);
        assert_eq!(payload.amount, Some(10.0));

        // Non-numeric amount does not declare a negative amount
        let payload = validate_payload(r#"{"city":"CityA","amount":"-5"}"#).unwrap();
        assert_eq!(payload.amount, None);
    }

    #[test]
    fn test_both_city_keys_present() {
        let payload = validate_payload(r#"{"city":"CityB","ville":"CityC","amount":10}"#).unwrap();
        assert_eq!(payload.city.as_deref(), Some("CityB"));

        // A negative amount under either key still rejects
        assert!(validate_payload(r#"{"city":"CityA","ville":"CityA","montant":-1}"#).is_err());
    }

    #[test]
    fn test_unknown_type_tag_is_kept() {
        let payload = TransactionPayload::parse(r#"{"type":"REFUND"}"#).unwrap();
        assert_eq!(payload.kind, Some(TransactionType::Other));
    }
}
