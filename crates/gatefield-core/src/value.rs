//! Field value domain.
//!
//! Every field value is an `i32`. Boolean fields hold `0` or `1`; enum
//! fields hold an index in `[0, cardinality)`. [`EMPTY`] marks a field that
//! has not been computed yet.

use serde::{Deserialize, Serialize};

/// Sentinel for "not yet computed".
pub const EMPTY: i32 = -1;

/// The value domain of a field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Enum { cardinality: u32 },
}

impl ValueKind {
    /// The value a field of this kind takes when nothing contributes to it.
    pub fn default_value(self) -> i32 {
        0
    }

    /// Returns true if `value` lies inside this kind's domain.
    pub fn contains(self, value: i32) -> bool {
        match self {
            ValueKind::Bool => value == 0 || value == 1,
            ValueKind::Enum { cardinality } => value >= 0 && (value as u32) < cardinality,
        }
    }

    /// Maps an arbitrary integer into this kind's domain.
    ///
    /// Booleans read any positive value as true. Enum values outside the
    /// declared range (including [`EMPTY`]) collapse to the default.
    pub fn normalize(self, value: i32) -> i32 {
        match self {
            ValueKind::Bool => i32::from(value > 0),
            ValueKind::Enum { .. } if self.contains(value) => value,
            ValueKind::Enum { .. } => self.default_value(),
        }
    }

    pub fn is_bool(self) -> bool {
        matches!(self, ValueKind::Bool)
    }
}

/// Reads a raw field value as a boolean.
pub fn as_bool(value: i32) -> bool {
    value > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_domain() {
        assert!(ValueKind::Bool.contains(0));
        assert!(ValueKind::Bool.contains(1));
        assert!(!ValueKind::Bool.contains(2));
        assert!(!ValueKind::Bool.contains(EMPTY));
    }

    #[test]
    fn enum_domain() {
        let kind = ValueKind::Enum { cardinality: 3 };
        assert!(kind.contains(0));
        assert!(kind.contains(2));
        assert!(!kind.contains(3));
        assert!(!kind.contains(EMPTY));
    }

    #[test]
    fn normalize_collapses_out_of_range() {
        let kind = ValueKind::Enum { cardinality: 4 };
        assert_eq!(kind.normalize(3), 3);
        assert_eq!(kind.normalize(7), 0);
        assert_eq!(kind.normalize(EMPTY), 0);
        assert_eq!(ValueKind::Bool.normalize(5), 1);
        assert_eq!(ValueKind::Bool.normalize(EMPTY), 0);
    }

    #[test]
    fn serde_shape() {
        let json = serde_json::to_string(&ValueKind::Enum { cardinality: 5 }).unwrap();
        assert_eq!(json, r#"{"enum":{"cardinality":5}}"#);
        let back: ValueKind = serde_json::from_str(r#""bool""#).unwrap();
        assert_eq!(back, ValueKind::Bool);
    }
}
