use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Decoded input of one request part, field name to value.
pub type Fields = Map<String, Value>;

/// The request part a schema constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RequestPart {
    #[default]
    Body,
    Params,
    Query,
}

impl fmt::Display for RequestPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestPart::Body => "body",
            RequestPart::Params => "params",
            RequestPart::Query => "query",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    Object,
}

/// What was wrong with a field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("is required")]
    Missing,
    #[error("must be of type {0:?}")]
    WrongType(FieldType),
    #[error("must be at least {0} characters")]
    TooShort(usize),
    #[error("must be at most {0} characters")]
    TooLong(usize),
    #[error("does not match the expected pattern")]
    PatternMismatch,
    #[error("could not be decoded")]
    Malformed,
}

/// ValidationError
///
/// A precise report of the first failing constraint. `field` is empty when the part as a
/// whole could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{part} field `{field}` {violation}")]
pub struct ValidationError {
    pub part: RequestPart,
    pub field: String,
    pub violation: Violation,
}

impl ValidationError {
    pub fn malformed(part: RequestPart) -> Self {
        Self {
            part,
            field: String::new(),
            violation: Violation::Malformed,
        }
    }
}

/// FieldRule
///
/// Type plus optional length bounds (in characters) and an unanchored pattern. Length and
/// pattern only apply to string values.
#[derive(Debug, Clone)]
pub struct FieldRule {
    kind: FieldType,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
}

impl FieldRule {
    fn of(kind: FieldType) -> Self {
        Self {
            kind,
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    /// Integers arrive as text from paths and forms; numeric strings are accepted.
    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn object() -> Self {
        Self::of(FieldType::Object)
    }

    pub fn length(self, min: usize, max: usize) -> Self {
        self.min_length(min).max_length(max)
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    fn check(&self, value: &Value) -> Result<(), Violation> {
        let type_ok = match (self.kind, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Integer, Value::String(s)) => s.parse::<i64>().is_ok(),
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Boolean, Value::String(s)) => s == "true" || s == "false",
            (FieldType::Object, Value::Object(_)) => true,
            _ => false,
        };
        if !type_ok {
            return Err(Violation::WrongType(self.kind));
        }

        if let (FieldType::String, Value::String(text)) = (self.kind, value) {
            let chars = text.chars().count();
            if let Some(min) = self.min_length.filter(|&min| chars < min) {
                return Err(Violation::TooShort(min));
            }
            if let Some(max) = self.max_length.filter(|&max| chars > max) {
                return Err(Violation::TooLong(max));
            }
            if self.pattern.as_ref().is_some_and(|p| !p.is_match(text)) {
                return Err(Violation::PatternMismatch);
            }
        }
        Ok(())
    }
}

/// Schema
///
/// Declarative shape of one request part: required field names plus per-field rules.
/// Properties not mentioned are allowed through untouched.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    required: Vec<String>,
    properties: BTreeMap<String, FieldRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, rule: FieldRule) -> Self {
        self.required.push(name.to_string());
        self.properties.insert(name.to_string(), rule);
        self
    }

    pub fn optional(mut self, name: &str, rule: FieldRule) -> Self {
        self.properties.insert(name.to_string(), rule);
        self
    }

    /// Accumulates `other` into this schema: required lists are concatenated and property
    /// maps merged, `other` winning on a name collision.
    pub fn merge(&mut self, other: Schema) {
        self.required.extend(other.required);
        self.properties.extend(other.properties);
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    pub fn validate(&self, part: RequestPart, input: &Fields) -> Result<(), ValidationError> {
        let fail = |field: &str, violation| ValidationError {
            part,
            field: field.to_string(),
            violation,
        };

        for name in &self.required {
            if !input.contains_key(name) {
                return Err(fail(name, Violation::Missing));
            }
        }

        for (name, rule) in &self.properties {
            if let Some(value) = input.get(name) {
                rule.check(value).map_err(|v| fail(name, v))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test input must be an object"),
        }
    }

    fn login_schema() -> Schema {
        Schema::new()
            .required(
                "email",
                FieldRule::string()
                    .length(6, 320)
                    .pattern(Regex::new(r"\S+@\S{1,64}.\S{2,64}").unwrap()),
            )
            .required("password", FieldRule::string().length(1, 500))
    }

    #[test]
    fn accepts_conforming_input_with_extra_fields() {
        let input = fields(json!({"email": "ada@example.org", "password": "x", "extra": 1}));
        assert!(login_schema().validate(RequestPart::Body, &input).is_ok());
    }

    #[test]
    fn reports_missing_field() {
        let input = fields(json!({"email": "ada@example.org"}));
        let err = login_schema().validate(RequestPart::Body, &input).unwrap_err();
        assert_eq!(err.field, "password");
        assert_eq!(err.violation, Violation::Missing);
    }

    #[test]
    fn reports_length_and_pattern_violations() {
        let schema = login_schema();
        let short = fields(json!({"email": "a@b.c", "password": "x"}));
        assert_eq!(
            schema.validate(RequestPart::Body, &short).unwrap_err().violation,
            Violation::TooShort(6)
        );

        let no_at = fields(json!({"email": "nobody.example.org", "password": "x"}));
        assert_eq!(
            schema.validate(RequestPart::Body, &no_at).unwrap_err().violation,
            Violation::PatternMismatch
        );

        let long = fields(json!({"email": "ada@example.org", "password": "p".repeat(501)}));
        assert_eq!(
            schema.validate(RequestPart::Body, &long).unwrap_err().violation,
            Violation::TooLong(500)
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let schema = Schema::new().required("name", FieldRule::string().length(3, 3));
        let input = fields(json!({"name": "äöü"}));
        assert!(schema.validate(RequestPart::Body, &input).is_ok());
    }

    #[test]
    fn integers_accept_numeric_text() {
        let schema = Schema::new().required("id", FieldRule::integer());
        assert!(schema.validate(RequestPart::Params, &fields(json!({"id": "17"}))).is_ok());
        assert!(schema.validate(RequestPart::Params, &fields(json!({"id": 17}))).is_ok());
        let err = schema
            .validate(RequestPart::Params, &fields(json!({"id": "seventeen"})))
            .unwrap_err();
        assert_eq!(err.violation, Violation::WrongType(FieldType::Integer));
        assert_eq!(err.part, RequestPart::Params);
    }

    #[test]
    fn merge_concatenates_required_and_later_property_wins() {
        let mut base = Schema::new().required("token", FieldRule::string().length(32, 32));
        base.merge(
            Schema::new()
                .required("password", FieldRule::string())
                .required("token", FieldRule::string().length(1, 2)),
        );

        assert_eq!(base.required_fields(), ["token", "password", "token"]);
        let input = fields(json!({"token": "ab", "password": "x"}));
        assert!(base.validate(RequestPart::Body, &input).is_ok());
    }
}
