//! JWT claims structure.
//!
//! Claims are kept as a map from claim name to a small tagged union instead of a
//! fixed struct: the policy claim name is configurable and issuers add fields
//! freely. Registered time claims (`exp`, `iat`, `nbf`) are converted to
//! timestamps when they hold a numeric date. The `sub` claim is redacted in
//! Debug output to prevent exposure in logs.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Registered claims holding a NumericDate (RFC 7519 section 2).
const TIME_CLAIMS: [&str; 3] = ["exp", "iat", "nbf"];

/// A single claim value.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Numeric date of a registered time claim.
    Timestamp(DateTime<Utc>),
    /// Arrays, objects and null, kept verbatim.
    Other(Value),
}

impl ClaimValue {
    /// Short type name used in error reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimValue::String(_) => "string",
            ClaimValue::Integer(_) => "integer",
            ClaimValue::Float(_) => "float",
            ClaimValue::Bool(_) => "bool",
            ClaimValue::Timestamp(_) => "timestamp",
            ClaimValue::Other(_) => "other",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClaimValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ClaimValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    fn from_json(name: &str, value: Value) -> Self {
        if TIME_CLAIMS.contains(&name) {
            if let Some(ts) = numeric_date(&value) {
                return ClaimValue::Timestamp(ts);
            }
        }

        match value {
            Value::String(s) => ClaimValue::String(s),
            Value::Bool(b) => ClaimValue::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => ClaimValue::Integer(i),
                (None, Some(f)) => ClaimValue::Float(f),
                (None, None) => ClaimValue::Other(Value::Number(n)),
            },
            other => ClaimValue::Other(other),
        }
    }
}

/// Convert a JSON number of seconds since the epoch into a timestamp.
fn numeric_date(value: &Value) -> Option<DateTime<Utc>> {
    let number = value.as_number()?;
    if let Some(secs) = number.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }

    let secs = number.as_f64()?;
    if !secs.is_finite() {
        return None;
    }
    // Out-of-range values are rejected by from_timestamp_millis
    #[allow(clippy::cast_possible_truncation)]
    let millis = (secs * 1000.0).floor() as i64;
    DateTime::from_timestamp_millis(millis)
}

/// Validated token claims.
///
/// The `sub` claim contains user or client identifiers which should not
/// be exposed in logs. A custom Debug implementation redacts it.
#[derive(Clone, Default, PartialEq)]
pub struct Claims {
    entries: HashMap<String, ClaimValue>,
}

impl Claims {
    /// Build claims from a decoded JSON payload object.
    pub fn from_json_object(object: Map<String, Value>) -> Self {
        let entries = object
            .into_iter()
            .map(|(name, value)| {
                let claim = ClaimValue::from_json(&name, value);
                (name, claim)
            })
            .collect();

        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.entries.get(name)
    }

    /// String value of a claim, or `None` if absent or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ClaimValue::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Expiration instant from the `exp` claim.
    ///
    /// `None` when `exp` is absent or is not a numeric date.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.get("exp").and_then(ClaimValue::as_timestamp)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.get("iat").and_then(ClaimValue::as_timestamp)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClaimValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();

        let mut map = f.debug_map();
        for name in names {
            if name == "sub" {
                map.entry(name, &"[REDACTED]");
            } else if let Some(value) = self.entries.get(name) {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}
