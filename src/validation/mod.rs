//! Schema validation for extracted proposals
//!
//! Pure functions only. A missing or wrongly-typed field is a violation,
//! never a default.

use crate::models::{EnvironmentSnapshot, ProcurementRecord, RawProposal};
use serde_json::Value;
use thiserror::Error;

pub const FIELD_MATERIAL: &str = "material";
pub const FIELD_PRICE: &str = "price";
pub const FIELD_CURRENCY: &str = "currency";
pub const FIELD_ACTION_IDENTIFIER: &str = "actionIdentifier";

/// The specific constraint a proposal violated
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("price {0:?} is not a plain decimal number")]
    NotNumeric(String),

    #[error("price must be a finite number")]
    NonFinitePrice,

    #[error("price must be >= 0, got {0}")]
    NegativePrice(f64),

    #[error("currency {0:?} is not a three-letter uppercase code")]
    InvalidCurrency(String),

    #[error("actionIdentifier {0:?} does not name an affordance in the observed snapshot")]
    UnknownAffordance(String),
}

/// Coerces raw extraction output into a typed record
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate a raw proposal into a record
    pub fn validate(raw: &RawProposal) -> Result<ProcurementRecord, SchemaViolation> {
        let material = require_text(raw, FIELD_MATERIAL)?;
        let price = require_price(raw)?;
        let currency = require_currency(raw)?;
        let action_identifier = require_text(raw, FIELD_ACTION_IDENTIFIER)?;

        Ok(ProcurementRecord::new(
            material,
            price,
            currency,
            action_identifier,
        ))
    }

    /// Validate and check the target affordance exists in the producing snapshot
    pub fn validate_for_snapshot(
        raw: &RawProposal,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<ProcurementRecord, SchemaViolation> {
        let record = Self::validate(raw)?;

        if !snapshot.has_affordance(record.action_identifier()) {
            return Err(SchemaViolation::UnknownAffordance(
                record.action_identifier().to_string(),
            ));
        }

        Ok(record)
    }
}

fn require_field<'a>(raw: &'a RawProposal, field: &'static str) -> Result<&'a Value, SchemaViolation> {
    match raw.get(field) {
        None | Some(Value::Null) => Err(SchemaViolation::MissingField(field)),
        Some(value) => Ok(value),
    }
}

fn require_text(raw: &RawProposal, field: &'static str) -> Result<String, SchemaViolation> {
    let text = require_field(raw, field)?
        .as_str()
        .ok_or(SchemaViolation::WrongType {
            field,
            expected: "a string",
        })?;

    if text.trim().is_empty() {
        return Err(SchemaViolation::EmptyField(field));
    }

    Ok(text.to_string())
}

fn require_price(raw: &RawProposal) -> Result<f64, SchemaViolation> {
    let price = match require_field(raw, FIELD_PRICE)? {
        Value::Number(n) => n.as_f64().ok_or(SchemaViolation::NonFinitePrice)?,
        Value::String(s) => parse_decimal(s)?,
        _ => {
            return Err(SchemaViolation::WrongType {
                field: FIELD_PRICE,
                expected: "a number",
            })
        }
    };

    if !price.is_finite() {
        return Err(SchemaViolation::NonFinitePrice);
    }
    if price < 0.0 {
        return Err(SchemaViolation::NegativePrice(price));
    }

    // Normalise -0.0
    Ok(price + 0.0)
}

/// Accepts plain decimals such as `45`, `45.00`, `.5`. Rejects symbols,
/// separators, exponents and the special float spellings.
fn parse_decimal(text: &str) -> Result<f64, SchemaViolation> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);

    let plain = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits.chars().any(|c| c.is_ascii_digit());

    if !plain {
        return Err(SchemaViolation::NotNumeric(text.to_string()));
    }

    trimmed
        .parse::<f64>()
        .map_err(|_| SchemaViolation::NotNumeric(text.to_string()))
}

fn require_currency(raw: &RawProposal) -> Result<String, SchemaViolation> {
    let currency = require_field(raw, FIELD_CURRENCY)?
        .as_str()
        .ok_or(SchemaViolation::WrongType {
            field: FIELD_CURRENCY,
            expected: "a string",
        })?;

    if currency.is_empty() {
        return Err(SchemaViolation::EmptyField(FIELD_CURRENCY));
    }

    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(SchemaViolation::InvalidCurrency(currency.to_string()));
    }

    Ok(currency.to_string())
}
