//! Field references used to build constraints.

use crate::constraint::{Constraint, ConstraintType, ToConstraintValue};
use std::fmt;

/// A column of a thing type, normalized the way the data API expects
/// (lower-cased, spaces removed).
///
/// Every operator is an ordinary method returning a [`Constraint`]. Rust's
/// comparison operators must return `bool`, so they are not overloaded;
/// `value < field` is written `field.greater_than(value)`. There is no
/// "greater or equal" / "less or equal": the API has no such operators.
///
/// # Examples
///
/// ```
/// use bubble_api::Field;
///
/// let adults = Field::new("Age").greater_than(17);
/// let named = Field::new("First Name").equals("Ada");
/// assert_eq!(named.key(), "firstname");
/// # let _ = adults;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: String,
}

/// Normalizes a column or thing-type name: lower-cased, spaces removed.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != ' ')
        .flat_map(char::to_lowercase)
        .collect()
}

impl Field {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: normalize_name(name.as_ref()),
        }
    }

    /// The normalized field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn with_value(&self, constraint_type: ConstraintType, value: impl ToConstraintValue) -> Constraint {
        Constraint::new(self.name.clone(), constraint_type, value)
    }

    pub fn equals(&self, value: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::Equals, value)
    }

    pub fn not_equals(&self, value: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::NotEquals, value)
    }

    pub fn is_empty(&self) -> Constraint {
        Constraint::without_value(self.name.clone(), ConstraintType::IsEmpty)
    }

    pub fn is_not_empty(&self) -> Constraint {
        Constraint::without_value(self.name.clone(), ConstraintType::IsNotEmpty)
    }

    pub fn text_contains(&self, text: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::TextContains, text)
    }

    pub fn not_text_contains(&self, text: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::NotTextContains, text)
    }

    pub fn greater_than(&self, value: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::GreaterThan, value)
    }

    pub fn less_than(&self, value: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::LessThan, value)
    }

    /// Matches when the field's value is one of `values`.
    pub fn is_in(&self, values: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::In, values)
    }

    pub fn is_not_in(&self, values: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::NotIn, values)
    }

    /// Matches list fields containing `value`.
    pub fn contains(&self, value: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::Contains, value)
    }

    pub fn not_contains(&self, value: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::NotContains, value)
    }

    /// Geographic search; `value` is usually `{"range": .., "origin_address": ..}`.
    pub fn geographic_search(&self, value: impl ToConstraintValue) -> Constraint {
        self.with_value(ConstraintType::GeographicSearch, value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::new(name)
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Field::new(name)
    }
}
