//! Type conversion utilities.
//!
//! Subgraphs publish `BigDecimal` and `BigInt` fields as JSON strings, while
//! cached values are written back as plain numbers. The deserializers here
//! accept either form.

use serde::{de, Deserialize, Deserializer};

// ============================================
// Lenient numeric deserializers
// ============================================

#[derive(Deserialize)]
#[serde(untagged)]
enum FloatRepr {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntegerRepr {
    Number(u64),
    Text(String),
}

/// Deserialize an `f64` from a JSON number or a decimal string.
pub fn f64_from_any<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match FloatRepr::deserialize(deserializer)? {
        FloatRepr::Number(value) => Ok(value),
        FloatRepr::Text(text) => str_to_f64(&text).map_err(de::Error::custom),
    }
}

/// Deserialize a `u64` (block numbers, unix timestamps) from a JSON number or string.
pub fn u64_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match IntegerRepr::deserialize(deserializer)? {
        IntegerRepr::Number(value) => Ok(value),
        IntegerRepr::Text(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|e| de::Error::custom(format!("invalid integer {:?}: {}", text, e))),
    }
}

/// Parse a decimal string into a finite `f64`.
pub fn str_to_f64(text: &str) -> Result<f64, String> {
    let value = text
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid decimal {:?}: {}", text, e))?;

    if !value.is_finite() {
        return Err(format!("non-finite decimal {:?}", text));
    }

    Ok(value)
}
