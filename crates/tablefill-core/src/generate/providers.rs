use chrono::{Local, Utc};
use rand::distr::Alphabetic;
use rand::Rng;

use crate::generate::value::Value;
use crate::schema::types::TypeFamily;

/// Length of generated text and binary placeholders.
pub const TEXT_LENGTH: usize = 10;

/// Bounds for the smallest integer family.
pub const TINYINT_RANGE: (i64, i64) = (0, 255);

/// Bounds for smallint, kept inside the column's storage range.
pub const SMALLINT_RANGE: (i64, i64) = (1, 32_767);

/// Bounds for every other numeric family.
pub const NUMERIC_RANGE: (i64, i64) = (1, 100_000);

/// Generate one value for a type family.
///
/// Unsupported families produce `Value::Unsupported` rather than failing;
/// the caller decides whether that column is fatal.
pub fn generate_value(family: &TypeFamily, rng: &mut impl Rng) -> Value {
    match family {
        TypeFamily::TinyInt => Value::Int(rng.random_range(TINYINT_RANGE.0..=TINYINT_RANGE.1)),
        TypeFamily::SmallInt => {
            Value::Int(rng.random_range(SMALLINT_RANGE.0..=SMALLINT_RANGE.1))
        }
        TypeFamily::Integer
        | TypeFamily::BigInt
        | TypeFamily::Numeric
        | TypeFamily::Real
        | TypeFamily::Double => Value::Int(rng.random_range(NUMERIC_RANGE.0..=NUMERIC_RANGE.1)),

        TypeFamily::VarChar | TypeFamily::Text | TypeFamily::Bytea => {
            Value::Text(random_letters(rng, TEXT_LENGTH))
        }

        TypeFamily::Timestamp => Value::Timestamp(Local::now().naive_local()),
        TypeFamily::TimestampTz => Value::TimestampTz(Utc::now()),
        TypeFamily::Time | TypeFamily::TimeTz => Value::Time(Local::now().time()),
        TypeFamily::Date => Value::Date(Local::now().date_naive()),

        TypeFamily::Boolean => Value::Bool(rng.random_bool(0.5)),
        TypeFamily::Uuid => {
            Value::Uuid(uuid::Builder::from_random_bytes(rng.random()).into_uuid())
        }
        TypeFamily::Json | TypeFamily::Jsonb => Value::Json(placeholder_document()),

        TypeFamily::Unsupported(_) => Value::Unsupported,
    }
}

/// Turn a sampled text value into a row value.
///
/// JSON families are re-parsed so the row carries canonical JSON text;
/// everything else keeps the sampled text as-is.
pub fn sample_value(raw: &str, family: &TypeFamily) -> Value {
    if family.is_json() {
        if let Ok(doc) = serde_json::from_str::<serde_json::Value>(raw) {
            return Value::Json(doc);
        }
    }
    Value::Text(raw.to_string())
}

/// Fixed structured document used for JSON columns.
pub fn placeholder_document() -> serde_json::Value {
    serde_json::json!({ "foo": "bar" })
}

fn random_letters(rng: &mut impl Rng, len: usize) -> String {
    (0..len).map(|_| rng.sample(Alphabetic) as char).collect()
}
