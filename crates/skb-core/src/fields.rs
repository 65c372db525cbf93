// SPDX-License-Identifier: MIT OR Apache-2.0
//! Field-type taxonomy and the coercion policy shared by every mapper.
//!
//! Vendors hand us custom-field values in whatever shape their API produces:
//! numbers as strings, booleans as `0`/`1`, dates as epoch milliseconds, and
//! multi-selects as pipe-separated strings. The [`coerce`] table turns those
//! into typed [`FieldValue`]s so the dynamic custom-field region has a
//! declared type at the canonical boundary. Coercion is total: no input
//! shape panics, and anything unrecognisable is preserved as
//! [`FieldValue::Raw`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// FieldType
// ---------------------------------------------------------------------------

/// Canonical type of a (custom) field, as declared by a
/// [`FieldDefinition`](crate::FieldDefinition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    /// Short single-line text.
    String,
    /// Long / rich text.
    Text,
    /// Floating-point number.
    Number,
    /// Whole number.
    Integer,
    /// Calendar date.
    Date,
    /// Date with time of day.
    DateTime,
    /// True/false flag.
    Boolean,
    /// One value out of a fixed set.
    Enum,
    /// List of values.
    Array,
    /// A single user reference.
    User,
    /// A list of user references.
    MultiUser,
    /// A URL.
    Url,
    /// Vendor-specific type with no canonical equivalent.
    Custom,
}

impl FieldType {
    /// All canonical field types, in declaration order.
    pub const ALL: &'static [Self] = &[
        Self::String,
        Self::Text,
        Self::Number,
        Self::Integer,
        Self::Date,
        Self::DateTime,
        Self::Boolean,
        Self::Enum,
        Self::Array,
        Self::User,
        Self::MultiUser,
        Self::Url,
        Self::Custom,
    ];
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A typed canonical custom-field value, the output of [`coerce`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// STRING / TEXT.
    Text(String),
    /// NUMBER.
    Number(f64),
    /// INTEGER.
    Integer(i64),
    /// BOOLEAN.
    Boolean(bool),
    /// DATE / DATETIME.
    Date(DateTime<Utc>),
    /// ENUM token (canonicalised by the owning vendor's enum table).
    Enum(String),
    /// ARRAY of element values.
    Array(Vec<FieldValue>),
    /// USER: display name when available, else id.
    User(String),
    /// MULTIUSER.
    MultiUser(Vec<String>),
    /// URL.
    Url(String),
    /// Unrecognised shape, preserved verbatim.
    Raw(Value),
}

impl FieldValue {
    /// Render the value back into the JSON shape a vendor payload expects.
    ///
    /// Dates come out as RFC 3339 with millisecond precision; arrays recurse.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) | Self::Enum(s) | Self::User(s) | Self::Url(s) => {
                Value::String(s.clone())
            }
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Date(d) => Value::String(d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            Self::Array(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            Self::MultiUser(users) => {
                Value::Array(users.iter().cloned().map(Value::String).collect())
            }
            Self::Raw(v) => v.clone(),
        }
    }

    /// Convenience accessor for text-like variants.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Enum(s) | Self::User(s) | Self::Url(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Coercion policy
// ---------------------------------------------------------------------------

/// Coerce a raw vendor value into a typed [`FieldValue`] per the canonical
/// coercion table.
///
/// | declared type | accepted vendor shapes | output |
/// |---|---|---|
/// | STRING / TEXT | string, null, scalar | `Text` (empty for null) |
/// | NUMBER / INTEGER | number, numeric string | `Number` / `Integer` (floor) |
/// | BOOLEAN | bool, `0`/`1`, strings | `Boolean`; any **non-empty** string is `true`, including `"false"` |
/// | DATE / DATETIME | ISO-8601 string, epoch ms | `Date` |
/// | ENUM | token | `Enum` (vendor table applies upstream) |
/// | ARRAY | array, pipe-separated string | `Array` of `Text` elements |
/// | USER | object with name/id, string | `User` |
/// | MULTIUSER | array of user shapes | `MultiUser` |
/// | URL | string | `Url` |
/// | CUSTOM / unrecognised | anything | `Raw` |
#[must_use]
pub fn coerce(field_type: FieldType, raw: &Value) -> FieldValue {
    match field_type {
        FieldType::String | FieldType::Text => coerce_text(raw),
        FieldType::Number => match parse_number(raw) {
            Some(n) => FieldValue::Number(n),
            None => FieldValue::Raw(raw.clone()),
        },
        FieldType::Integer => match parse_number(raw) {
            Some(n) => FieldValue::Integer(n.floor() as i64),
            None => FieldValue::Raw(raw.clone()),
        },
        FieldType::Boolean => FieldValue::Boolean(coerce_bool(raw)),
        FieldType::Date | FieldType::DateTime => match parse_date(raw) {
            Some(d) => FieldValue::Date(d),
            None => FieldValue::Raw(raw.clone()),
        },
        FieldType::Enum => match raw {
            Value::String(s) => FieldValue::Enum(s.clone()),
            Value::Null => FieldValue::Enum(String::new()),
            other => FieldValue::Raw(other.clone()),
        },
        FieldType::Array => coerce_array(FieldType::String, raw),
        FieldType::User => match user_label(raw) {
            Some(label) => FieldValue::User(label),
            None => FieldValue::Raw(raw.clone()),
        },
        FieldType::MultiUser => match raw {
            Value::Array(items) => FieldValue::MultiUser(
                items
                    .iter()
                    .map(|v| user_label(v).unwrap_or_default())
                    .collect(),
            ),
            other => match user_label(other) {
                Some(label) => FieldValue::MultiUser(vec![label]),
                None => FieldValue::Raw(other.clone()),
            },
        },
        FieldType::Url => match raw {
            Value::String(s) => FieldValue::Url(s.clone()),
            other => FieldValue::Raw(other.clone()),
        },
        FieldType::Custom => FieldValue::Raw(raw.clone()),
    }
}

/// Coerce an ARRAY value whose elements are declared as `element_type`.
///
/// Accepts a JSON array or a pipe-separated string (`"a|b|c"`).
#[must_use]
pub fn coerce_array(element_type: FieldType, raw: &Value) -> FieldValue {
    match raw {
        Value::Array(items) => {
            FieldValue::Array(items.iter().map(|v| coerce(element_type, v)).collect())
        }
        Value::String(s) if s.contains('|') => FieldValue::Array(
            s.split('|')
                .map(|part| coerce(element_type, &Value::String(part.trim().to_string())))
                .collect(),
        ),
        Value::String(s) => FieldValue::Array(vec![coerce(
            element_type,
            &Value::String(s.clone()),
        )]),
        Value::Null => FieldValue::Array(Vec::new()),
        other => FieldValue::Raw(other.clone()),
    }
}

/// Infer a [`FieldValue`] from a raw value whose declared type is unknown.
///
/// Used by mappers for vendors that ship custom fields as an untyped bag:
/// booleans and boolean-looking strings go through the BOOLEAN coercion
/// (so the non-empty-string quirk applies), whole numbers become INTEGER,
/// other numbers NUMBER, RFC 3339 strings become DATETIME, arrays recurse,
/// user-shaped objects become USER, everything else stays TEXT or raw.
#[must_use]
pub fn infer(raw: &Value) -> FieldValue {
    match raw {
        Value::Bool(_) => coerce(FieldType::Boolean, raw),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                coerce(FieldType::Integer, raw)
            } else {
                coerce(FieldType::Number, raw)
            }
        }
        Value::String(s) => {
            if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
                return coerce(FieldType::Boolean, raw);
            }
            if DateTime::parse_from_rfc3339(s).is_ok() {
                return coerce(FieldType::DateTime, raw);
            }
            FieldValue::Text(s.clone())
        }
        Value::Array(items) => FieldValue::Array(items.iter().map(infer).collect()),
        Value::Object(map)
            if map.contains_key("displayName")
                || map.contains_key("display_name")
                || (map.contains_key("id") && map.len() <= 2) =>
        {
            coerce(FieldType::User, raw)
        }
        Value::Null => FieldValue::Text(String::new()),
        other => FieldValue::Raw(other.clone()),
    }
}

fn coerce_text(raw: &Value) -> FieldValue {
    match raw {
        Value::String(s) => FieldValue::Text(s.clone()),
        Value::Null => FieldValue::Text(String::new()),
        Value::Number(n) => FieldValue::Text(n.to_string()),
        Value::Bool(b) => FieldValue::Text(b.to_string()),
        other => FieldValue::Raw(other.clone()),
    }
}

fn parse_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Boolean coercion.
///
/// Quirk carried over from the original mapping suite: any non-empty string
/// coerces to `true`, including the literal `"false"`. Only the empty string,
/// `false`, `0`, and `null` coerce to `false`.
fn coerce_bool(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn parse_date(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            // Date-only form, midnight UTC.
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
            }
            None
        }
        // Epoch milliseconds.
        Value::Number(n) => n.as_i64().and_then(|ms| DateTime::from_timestamp_millis(ms)),
        _ => None,
    }
}

fn user_label(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            for key in ["displayName", "display_name", "name", "fullName"] {
                if let Some(Value::String(s)) = map.get(key) {
                    if !s.is_empty() {
                        return Some(s.clone());
                    }
                }
            }
            match map.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        }
        _ => None,
    }
}
