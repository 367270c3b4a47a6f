//! Search constraints.
//!
//! A [`Constraint`] is one `{key, constraint_type, value?}` predicate. Values
//! are formatted to their wire representation when the constraint is built,
//! so a constraint is immutable and serializes the same way every time.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Wire format for datetimes: microsecond precision, always UTC.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// The operator of a constraint, as understood by the data API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConstraintType {
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "not equal")]
    NotEquals,
    #[serde(rename = "is_empty")]
    IsEmpty,
    #[serde(rename = "is_not_empty")]
    IsNotEmpty,
    #[serde(rename = "text contains")]
    TextContains,
    #[serde(rename = "not text contains")]
    NotTextContains,
    #[serde(rename = "greater than")]
    GreaterThan,
    #[serde(rename = "less than")]
    LessThan,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not contains")]
    NotContains,
    #[serde(rename = "geographic_search")]
    GeographicSearch,
}

impl ConstraintType {
    /// The operator string sent to the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintType::Equals => "equals",
            ConstraintType::NotEquals => "not equal",
            ConstraintType::IsEmpty => "is_empty",
            ConstraintType::IsNotEmpty => "is_not_empty",
            ConstraintType::TextContains => "text contains",
            ConstraintType::NotTextContains => "not text contains",
            ConstraintType::GreaterThan => "greater than",
            ConstraintType::LessThan => "less than",
            ConstraintType::In => "in",
            ConstraintType::NotIn => "not in",
            ConstraintType::Contains => "contains",
            ConstraintType::NotContains => "not contains",
            ConstraintType::GeographicSearch => "geographic_search",
        }
    }

    /// `false` for the emptiness checks, which never carry a value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, ConstraintType::IsEmpty | ConstraintType::IsNotEmpty)
    }
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pre-formatted constraint value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    /// Scalar value in its string form.
    Text(String),
    /// Values for `in` / `not in`, each formatted as a scalar.
    List(Vec<String>),
    /// Structured value passed through untouched (e.g. geographic search).
    Json(Value),
}

impl fmt::Display for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintValue::Text(s) => f.write_str(s),
            ConstraintValue::List(items) => write!(f, "[{}]", items.join(", ")),
            ConstraintValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Conversion into an optional [`ConstraintValue`].
///
/// `None` means "no value": the `value` key is then omitted from the wire
/// form instead of being sent as `null`.
pub trait ToConstraintValue {
    /// Formats `self` for transmission.
    fn to_constraint_value(self) -> Option<ConstraintValue>;
}

impl ToConstraintValue for ConstraintValue {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        Some(self)
    }
}

impl ToConstraintValue for &str {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        Some(ConstraintValue::Text(self.to_string()))
    }
}

impl ToConstraintValue for String {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        Some(ConstraintValue::Text(self))
    }
}

impl ToConstraintValue for &String {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        Some(ConstraintValue::Text(self.clone()))
    }
}

macro_rules! display_constraint_value {
    ($($ty:ty),*) => {
        $(
            impl ToConstraintValue for $ty {
                fn to_constraint_value(self) -> Option<ConstraintValue> {
                    Some(ConstraintValue::Text(self.to_string()))
                }
            }
        )*
    };
}

display_constraint_value!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool);

impl ToConstraintValue for NaiveDate {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        Some(ConstraintValue::Text(self.format(DATE_FORMAT).to_string()))
    }
}

impl ToConstraintValue for NaiveDateTime {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        Some(ConstraintValue::Text(self.format(DATETIME_FORMAT).to_string()))
    }
}

impl<Tz: TimeZone> ToConstraintValue for DateTime<Tz> {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        self.with_timezone(&Utc).naive_utc().to_constraint_value()
    }
}

impl ToConstraintValue for Value {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(ConstraintValue::Text(s)),
            Value::Number(n) => Some(ConstraintValue::Text(n.to_string())),
            Value::Bool(b) => Some(ConstraintValue::Text(b.to_string())),
            // Objects and arrays (e.g. geographic search) go out as JSON.
            other => Some(ConstraintValue::Json(other)),
        }
    }
}

impl<T: ToConstraintValue> ToConstraintValue for Option<T> {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        self.and_then(ToConstraintValue::to_constraint_value)
    }
}

impl<T: ToConstraintValue> ToConstraintValue for Vec<T> {
    fn to_constraint_value(self) -> Option<ConstraintValue> {
        let items = self
            .into_iter()
            .filter_map(ToConstraintValue::to_constraint_value)
            .map(|value| match value {
                ConstraintValue::Text(s) => s,
                ConstraintValue::Json(v) => v.to_string(),
                ConstraintValue::List(inner) => inner.join(","),
            })
            .collect();
        Some(ConstraintValue::List(items))
    }
}

/// One search predicate.
///
/// Build constraints through [`Field`](crate::Field); the constructor here is
/// for operators or values the field helpers do not cover.
///
/// # Examples
///
/// ```
/// use bubble_api::{Constraint, ConstraintType};
///
/// let c = Constraint::new("age", ConstraintType::GreaterThan, 18);
/// assert_eq!(
///     c.to_representation(),
///     serde_json::json!({"key": "age", "constraint_type": "greater than", "value": "18"})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    key: String,
    constraint_type: ConstraintType,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<ConstraintValue>,
}

impl Constraint {
    /// Creates a constraint, formatting `value` to its wire form.
    pub fn new(
        key: impl Into<String>,
        constraint_type: ConstraintType,
        value: impl ToConstraintValue,
    ) -> Self {
        Self {
            key: key.into(),
            constraint_type,
            value: value.to_constraint_value(),
        }
    }

    /// Creates a constraint that carries no value.
    pub fn without_value(key: impl Into<String>, constraint_type: ConstraintType) -> Self {
        Self {
            key: key.into(),
            constraint_type,
            value: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn constraint_type(&self) -> ConstraintType {
        self.constraint_type
    }

    pub fn value(&self) -> Option<&ConstraintValue> {
        self.value.as_ref()
    }

    /// The JSON object sent to the API for this constraint.
    pub fn to_representation(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("key".to_string(), Value::String(self.key.clone()));
        map.insert(
            "constraint_type".to_string(),
            Value::String(self.constraint_type.as_str().to_string()),
        );
        if let Some(value) = &self.value {
            let value = match value {
                ConstraintValue::Text(s) => Value::String(s.clone()),
                ConstraintValue::List(items) => {
                    Value::Array(items.iter().cloned().map(Value::String).collect())
                }
                ConstraintValue::Json(v) => v.clone(),
            };
            map.insert("value".to_string(), value);
        }
        Value::Object(map)
    }
}

/// Encodes a list of constraints as the JSON array used for the `constraints`
/// query parameter. An empty list matches every thing.
pub fn encode_constraints(constraints: &[Constraint]) -> Result<String> {
    serde_json::to_string(constraints).map_err(|e| Error::SerializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn text(value: impl ToConstraintValue) -> String {
        match value.to_constraint_value() {
            Some(ConstraintValue::Text(s)) => s,
            other => panic!("Expected text value, got {:?}", other),
        }
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(text(8), "8");
        assert_eq!(text(8.6), "8.6");
        assert_eq!(text(-3i64), "-3");
    }

    #[test]
    fn test_date_formatting() {
        let date = NaiveDate::from_ymd_opt(2023, 5, 19).unwrap();
        assert_eq!(text(date), "2023-05-19");
    }

    #[test]
    fn test_datetime_formatting() {
        let datetime = NaiveDate::from_ymd_opt(2023, 5, 19)
            .unwrap()
            .and_hms_micro_opt(22, 47, 46, 477590)
            .unwrap();
        assert_eq!(text(datetime), "2023-05-19T22:47:46.477590Z");
        assert_eq!(text(datetime.and_utc()), "2023-05-19T22:47:46.477590Z");
    }

    #[test]
    fn test_zoned_datetime_is_converted_to_utc() {
        let offset = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        let datetime = offset.with_ymd_and_hms(2023, 5, 20, 0, 47, 46).unwrap();
        assert_eq!(text(datetime), "2023-05-19T22:47:46.000000Z");
    }

    #[test]
    fn test_missing_value_is_omitted() {
        let c = Constraint::new("name", ConstraintType::Equals, None::<&str>);
        assert_eq!(
            c.to_representation(),
            json!({"key": "name", "constraint_type": "equals"})
        );
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({"key": "name", "constraint_type": "equals"})
        );
    }

    #[test]
    fn test_list_value() {
        let c = Constraint::new("age", ConstraintType::In, vec![1, 2, 3]);
        assert_eq!(
            c.to_representation(),
            json!({"key": "age", "constraint_type": "in", "value": ["1", "2", "3"]})
        );
    }

    #[test]
    fn test_encode_constraints() {
        let encoded = encode_constraints(&[
            Constraint::new("name", ConstraintType::Equals, "Bob"),
            Constraint::without_value("email", ConstraintType::IsNotEmpty),
        ])
        .unwrap();
        assert_eq!(
            encoded,
            r#"[{"key":"name","constraint_type":"equals","value":"Bob"},{"key":"email","constraint_type":"is_not_empty"}]"#
        );
        assert_eq!(encode_constraints(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_json_scalars_are_formatted_as_text() {
        assert_eq!(text(json!(8)), "8");
        assert_eq!(text(json!(8.6)), "8.6");
        assert_eq!(text(json!(true)), "true");
        assert_eq!(
            Constraint::new("age", ConstraintType::Equals, json!(8)).to_representation(),
            json!({"key": "age", "constraint_type": "equals", "value": "8"})
        );
        assert_eq!(
            json!({"range": 5}).to_constraint_value(),
            Some(ConstraintValue::Json(json!({"range": 5})))
        );
    }

    #[test]
    fn test_serde_matches_representation() {
        let c = Constraint::new(
            "location",
            ConstraintType::GeographicSearch,
            json!({"range": 10, "origin_address": "Paris"}),
        );
        assert_eq!(serde_json::to_value(&c).unwrap(), c.to_representation());
    }
}
