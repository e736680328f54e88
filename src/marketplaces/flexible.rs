//! Lenient numeric deserializers
//!
//! Both marketplaces send numbers as JSON numbers in one response variant and
//! as strings in another.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Float(f64),
    Int(i64),
    String(String),
    Bool(#[allow(dead_code)] bool),
}

/// Deserialize an optional value that could be a string, an integer or a float
pub fn opt_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberLike>::deserialize(deserializer)? {
        Some(NumberLike::Float(f)) => Ok(Some(f)),
        Some(NumberLike::Int(i)) => Ok(Some(i as f64)),
        Some(NumberLike::String(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberLike::String(s)) => s
            .trim()
            .replace(',', ".")
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(NumberLike::Bool(_)) | None => Ok(None),
    }
}

/// Deserialize an optional identifier or count that could be a string or a number
pub fn opt_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberLike>::deserialize(deserializer)? {
        Some(NumberLike::Int(i)) => Ok(Some(i)),
        Some(NumberLike::Float(f)) if f.fract() == 0.0 => Ok(Some(f as i64)),
        Some(NumberLike::Float(f)) => Err(serde::de::Error::custom(format!(
            "expected an integer, got {}",
            f
        ))),
        Some(NumberLike::String(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberLike::String(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
        Some(NumberLike::Bool(_)) | None => Ok(None),
    }
}
