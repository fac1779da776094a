//! Boundary validation for the save path.
//!
//! Raw input arrives as `"<room-device>,<temperature><F|C>,<humidity>"`
//! plus a customer id. Keys are sanitised before they enter the engine
//! (lower-cased, anything outside `[a-z0-9-]` replaced with `-`), so the
//! storage layers below treat keys as opaque ordered strings.
//!
//! Nothing rejected here ever reaches the WAL or the memtable.

use serde_json::{Value, json};
use thiserror::Error;

/// Errors for malformed save input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Customer id missing or blank.
    #[error("customer id must be set")]
    CustomerId,

    /// Wrong csv arity.
    #[error("expected 3 comma-separated values, got {0}")]
    FieldCount(usize),

    /// Temperature did not match `<number><F|C>`.
    #[error("temperature must be a number followed by F or C (e.g. 72.5F or 22c)")]
    Temperature,

    /// Humidity missing, non-numeric, or outside `[1, 100]`.
    #[error("humidity must be a number between 1 and 100")]
    Humidity,
}

/// Lower-cases and replaces every character outside `[a-z0-9-]` with
/// `-`.
pub fn sanitize_key(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '-',
        })
        .collect()
}

/// Builds the engine key `"<customer>#<room-device>"`, both parts
/// sanitised.
pub fn make_key(customer_id: &str, room_device: &str) -> String {
    format!("{}#{}", sanitize_key(customer_id), sanitize_key(room_device))
}

/// Validates and normalises one save request into `(key, value)`.
///
/// The value keeps the user's spellings: temperature stays the digits
/// they typed, the scale is upper-cased, humidity is the raw numeric
/// string.
pub fn parse_save_input(customer_id: &str, raw: &str) -> Result<(String, Value), ValidationError> {
    let customer_id = customer_id.trim();
    if customer_id.is_empty() {
        return Err(ValidationError::CustomerId);
    }

    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(ValidationError::FieldCount(parts.len()));
    }
    let (room_device, temperature_raw, humidity_raw) = (parts[0], parts[1], parts[2]);

    let (temperature, scale) = parse_temperature(temperature_raw)?;

    let humidity: f64 = humidity_raw
        .parse()
        .map_err(|_| ValidationError::Humidity)?;
    if !(1.0..=100.0).contains(&humidity) {
        return Err(ValidationError::Humidity);
    }

    let key = make_key(customer_id, room_device);
    let value = json!({
        "temperature": temperature,
        "scale": scale,
        "humidity": humidity_raw,
    });

    Ok((key, value))
}

/// Splits `<number><F|C>` into the number text and the upper-cased
/// scale letter.
fn parse_temperature(raw: &str) -> Result<(&str, String), ValidationError> {
    let Some(scale) = raw.chars().last() else {
        return Err(ValidationError::Temperature);
    };
    if !matches!(scale, 'f' | 'F' | 'c' | 'C') {
        return Err(ValidationError::Temperature);
    }

    let number = &raw[..raw.len() - 1];
    if !is_plain_number(number) {
        return Err(ValidationError::Temperature);
    }

    Ok((number, String::from(scale.to_ascii_uppercase())))
}

/// `-?\d+(\.\d+)?` — no exponents, no leading/trailing dot.
fn is_plain_number(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() {
        return false;
    }

    match digits.split_once('.') {
        None => digits.bytes().all(|b| b.is_ascii_digit()),
        Some((whole, frac)) => {
            !whole.is_empty()
                && !frac.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
