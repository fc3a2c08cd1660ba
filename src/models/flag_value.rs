//! Typed feature-state value.
//!
//! Change-request feature states carry values as a typed object
//! (`{"type": "int", "integer_value": 3, ...}`) while environment flags carry
//! a bare JSON scalar. Both decode into [`FlagValue`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A feature-state value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlagValue {
    #[default]
    None,
    String(String),
    Integer(i64),
    Boolean(bool),
}

/// Wire form used by the feature-state value endpoints.
#[derive(Debug, Serialize, Deserialize)]
struct TypedValue {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    string_value: Option<String>,
    #[serde(default)]
    integer_value: Option<i64>,
    #[serde(default)]
    boolean_value: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Typed(TypedValue),
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<TypedValue> for FlagValue {
    fn from(typed: TypedValue) -> Self {
        Self::from_parts(
            typed.kind.as_deref(),
            typed.string_value,
            typed.integer_value,
            typed.boolean_value,
        )
    }
}

impl From<RawValue> for FlagValue {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Typed(typed) => typed.into(),
            RawValue::Boolean(b) => Self::Boolean(b),
            RawValue::Integer(i) => Self::Integer(i),
            RawValue::Float(f) => Self::String(f.to_string()),
            RawValue::String(s) => Self::String(s),
        }
    }
}

impl<'de> Deserialize<'de> for FlagValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<RawValue>::deserialize(deserializer)?;
        Ok(raw.map(Self::from).unwrap_or_default())
    }
}

impl Serialize for FlagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let typed = TypedValue {
            kind: Some(self.type_name().to_string()),
            string_value: match self {
                Self::String(s) => Some(s.clone()),
                _ => None,
            },
            integer_value: match self {
                Self::Integer(i) => Some(*i),
                _ => None,
            },
            boolean_value: match self {
                Self::Boolean(b) => Some(*b),
                _ => None,
            },
        };
        typed.serialize(serializer)
    }
}

impl FlagValue {
    /// Build a value from the typed wire fields, picking the one `kind` names.
    pub fn from_parts(
        kind: Option<&str>,
        string_value: Option<String>,
        integer_value: Option<i64>,
        boolean_value: Option<bool>,
    ) -> Self {
        let value = match kind {
            Some("int") => integer_value.map(Self::Integer),
            Some("bool") => boolean_value.map(Self::Boolean),
            Some(_) => string_value.map(Self::String),
            None => string_value
                .map(Self::String)
                .or(integer_value.map(Self::Integer))
                .or(boolean_value.map(Self::Boolean)),
        };

        value.unwrap_or_default()
    }

    /// Wire type name: `unicode`, `int` or `bool`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "int",
            Self::Boolean(_) => "bool",
            Self::None | Self::String(_) => "unicode",
        }
    }

    /// Decode a value from its stored string representation.
    ///
    /// `"true"`/`"false"` become booleans and plain integer literals become
    /// integers. Literals with leading zeros (`"007"`) stay strings.
    pub fn from_stored_str(s: &str) -> Self {
        match s {
            "" => return Self::None,
            "true" => return Self::Boolean(true),
            "false" => return Self::Boolean(false),
            _ => {}
        }

        let digits = s.strip_prefix('-').unwrap_or(s);
        let leading_zero = digits.len() > 1 && digits.starts_with('0');
        if !leading_zero && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(i) = s.parse::<i64>() {
                return Self::Integer(i);
            }
        }

        Self::String(s.to_string())
    }

    /// The value with string contents decoded into their natural type.
    pub fn decoded(&self) -> Self {
        match self {
            Self::String(s) => Self::from_stored_str(s),
            other => other.clone(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl std::fmt::Display for FlagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::String(s) => write!(f, "{}", s),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for FlagValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_typed_object() {
        let v: FlagValue = serde_json::from_str(
            r#"{"type": "int", "string_value": null, "integer_value": 12, "boolean_value": null}"#,
        )
        .unwrap();
        assert_eq!(v, FlagValue::Integer(12));

        let v: FlagValue =
            serde_json::from_str(r#"{"type": "unicode", "string_value": "blue"}"#).unwrap();
        assert_eq!(v, FlagValue::String("blue".into()));
    }

    #[test]
    fn test_deserialize_bare_scalars() {
        assert_eq!(serde_json::from_str::<FlagValue>("true").unwrap(), FlagValue::Boolean(true));
        assert_eq!(serde_json::from_str::<FlagValue>("42").unwrap(), FlagValue::Integer(42));
        assert_eq!(serde_json::from_str::<FlagValue>("\"x\"").unwrap(), FlagValue::from("x"));
        assert_eq!(serde_json::from_str::<FlagValue>("null").unwrap(), FlagValue::None);
        assert_eq!(serde_json::from_str::<FlagValue>("1.5").unwrap(), FlagValue::from("1.5"));
    }

    #[test]
    fn test_serializes_typed_form() {
        let json = serde_json::to_value(FlagValue::Boolean(false)).unwrap();
        assert_eq!(json["type"], "bool");
        assert_eq!(json["boolean_value"], false);
        assert!(json["string_value"].is_null());
    }

    #[test]
    fn test_from_stored_str() {
        assert_eq!(FlagValue::from_stored_str("true"), FlagValue::Boolean(true));
        assert_eq!(FlagValue::from_stored_str("-15"), FlagValue::Integer(-15));
        assert_eq!(FlagValue::from_stored_str("0"), FlagValue::Integer(0));
        assert_eq!(FlagValue::from_stored_str("007"), FlagValue::from("007"));
        assert_eq!(FlagValue::from_stored_str("1.5"), FlagValue::from("1.5"));
        assert_eq!(FlagValue::from_stored_str("-"), FlagValue::from("-"));
        assert_eq!(FlagValue::from_stored_str(""), FlagValue::None);
    }

    #[test]
    fn test_display() {
        assert_eq!(FlagValue::Integer(3).to_string(), "3");
        assert_eq!(FlagValue::None.to_string(), "");
        assert_eq!(FlagValue::from("on").to_string(), "on");
    }
}
